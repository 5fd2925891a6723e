// Champion draft entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, not terminal)
// 2. Load config
// 3. Open database
// 4. Build backend (HTTP, or in-process when no base URL is set)
// 5. Recover an in-progress session
// 6. Create mpsc channels, spawn app logic task
// 7. Read commands from stdin, print updates
// 8. Cleanup on exit

use std::sync::Arc;

use champ_draft::app;
use champ_draft::backend::{ChampionBackend, HttpBackend, InMemoryBackend};
use champ_draft::config;
use champ_draft::db;
use champ_draft::protocol::{self, UiUpdate, UserCommand};
use champ_draft::sync::Reconciler;

use anyhow::Context;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing (log to file, not terminal)
    init_tracing()?;
    info!("Champion draft starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: backend={}, reload every {}s",
        if config.backend.base_url.is_empty() {
            "in-process"
        } else {
            config.backend.base_url.as_str()
        },
        config.sync.reload_interval_secs
    );

    // 3. Open database
    let db_path = config::resolve_db_path(&config).context("failed to resolve database path")?;
    let db_path = db_path.to_string_lossy().into_owned();
    let db = Arc::new(db::Database::open(&db_path).context("failed to open database")?);
    info!("Database opened at {}", db_path);

    // 4. Build backend
    let backend: Arc<dyn ChampionBackend> =
        match HttpBackend::from_config(&config).context("failed to build backend client")? {
            Some(http) => Arc::new(http),
            None => {
                info!("No backend URL configured, running against in-process store");
                Arc::new(InMemoryBackend::from_pool(&config.fallback_pool))
            }
        };

    let reconciler = Reconciler::new(
        backend,
        db,
        config.fallback_pool.clone(),
        config.sync.max_write_attempts,
    )
    .context("failed to load local state")?
    .with_server_side_fan_out(config.sync.server_side_fan_out);

    let mut app_state = app::AppState::new(
        config.clone(),
        Arc::new(reconciler),
        StdRng::from_os_rng(),
    );

    // 5. Check for crash recovery
    match app::recover_from_db(&mut app_state) {
        Ok(true) => info!("Draft session restored from previous run"),
        Ok(false) => info!("Starting fresh draft session"),
        Err(e) => {
            error!("Crash recovery failed: {}", e);
            return Err(e.context("crash recovery failed"));
        }
    }

    // 6. Channels and app task
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (ui_tx, mut ui_rx) = mpsc::channel(256);

    let app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(cmd_rx, ui_tx, app_state).await {
            error!("Application loop error: {}", e);
        }
    });

    let printer = tokio::spawn(async move {
        while let Some(update) = ui_rx.recv().await {
            print_update(&update);
        }
    });

    // 7. Command loop
    println!("champ-draft ready. Commands: pick, reroll, choose, resolve, lock, discard,");
    println!("session, sessions, teams, available, delete, reset, admin, clear, sync, quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        match protocol::parse_command(&line) {
            Ok(cmd) => {
                let quit = cmd == UserCommand::Quit;
                if cmd_tx.send(cmd).await.is_err() || quit {
                    break;
                }
            }
            Err(message) => eprintln!("error: {message}"),
        }
    }
    drop(cmd_tx);

    // 8. Cleanup: wait for app task to finish (with timeout)
    let _ = tokio::time::timeout(std::time::Duration::from_secs(10), async {
        let _ = app_handle.await;
        let _ = printer.await;
    })
    .await;

    info!("Champion draft shut down cleanly");
    Ok(())
}

fn print_update(update: &UiUpdate) {
    match update {
        UiUpdate::Session(view) => {
            let id = view.session_id.as_deref().unwrap_or("-");
            println!("session {id} [{:?}]", view.phase);
            for (role, champion) in &view.selections {
                println!("  {role:<8} {}", champion.as_deref().unwrap_or("-"));
            }
            if let Some(offer) = &view.reroll {
                println!(
                    "  reroll {}: {} or {}",
                    offer.role, offer.original, offer.rerolled
                );
            }
            if !view.can_lock_in {
                println!("  (resolve the reroll before locking in)");
            }
        }
        UiUpdate::Picked { role, champion } => println!("{role}: {champion}"),
        UiUpdate::RerollOffered(offer) => println!(
            "reroll {}: keep {} or take {}",
            offer.role, offer.original, offer.rerolled
        ),
        UiUpdate::LockedIn(team) => {
            let picks: Vec<String> = team
                .picks()
                .map(|(role, champion)| format!("{role}={champion}"))
                .collect();
            let admin = if team.is_admin_created { " (admin)" } else { "" };
            println!("locked team {}{admin}: {}", team.timestamp, picks.join(" "));
        }
        UiUpdate::Teams(teams) => {
            if teams.is_empty() {
                println!("no saved teams");
            }
            for team in teams {
                let picks: Vec<String> = team
                    .picks()
                    .map(|(role, champion)| format!("{role}={champion}"))
                    .collect();
                println!("{} {}", team.timestamp, picks.join(" "));
            }
        }
        UiUpdate::Available { role, champions } => {
            println!("{role} ({}): {}", champions.len(), champions.join(", "))
        }
        UiUpdate::Sessions(sessions) => {
            if sessions.is_empty() {
                println!("no sessions in progress");
            }
            for session in sessions {
                let held: Vec<String> = session.held_champions().into_iter().collect();
                println!("{} holds {}", session.session_id, held.join(", "));
            }
        }
        UiUpdate::Synced { pending_writes } => {
            if *pending_writes > 0 {
                println!("synced, {pending_writes} writes still pending");
            }
        }
        UiUpdate::Ignored(reason) => println!("ignored: {reason}"),
        UiUpdate::Error(message) => eprintln!("error: {message}"),
    }
}

/// Initialize tracing to log to a file (stdout carries the command output).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("champ-draft.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("champ_draft=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
