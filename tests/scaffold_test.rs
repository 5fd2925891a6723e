// Layout and shipped-defaults checks.

use std::path::Path;

/// Verify that defaults/draft.toml is valid TOML.
#[test]
fn draft_toml_is_valid() {
    let content =
        std::fs::read_to_string("defaults/draft.toml").expect("defaults/draft.toml should exist");
    let parsed: Result<toml::Value, _> = toml::from_str(&content);
    assert!(parsed.is_ok(), "defaults/draft.toml is not valid TOML: {:?}", parsed.err());
}

/// Verify that defaults/credentials.toml.example is valid TOML.
#[test]
fn credentials_example_is_valid_toml() {
    let content = std::fs::read_to_string("defaults/credentials.toml.example")
        .expect("defaults/credentials.toml.example should exist");
    let parsed: Result<toml::Value, _> = toml::from_str(&content);
    assert!(
        parsed.is_ok(),
        "defaults/credentials.toml.example is not valid TOML: {:?}",
        parsed.err()
    );
}

/// Verify that all expected source files exist.
#[test]
fn source_files_exist() {
    let expected_files = [
        "src/main.rs",
        "src/lib.rs",
        "src/app.rs",
        "src/config.rs",
        "src/protocol.rs",
        "src/db.rs",
        "src/backend/mod.rs",
        "src/backend/http.rs",
        "src/backend/memory.rs",
        "src/draft/mod.rs",
        "src/draft/role.rs",
        "src/draft/pool.rs",
        "src/draft/team.rs",
        "src/draft/session.rs",
        "src/sync/mod.rs",
        "src/sync/merge.rs",
        "src/sync/retry.rs",
    ];
    for file in expected_files {
        assert!(Path::new(file).is_file(), "Expected source file '{}' to exist", file);
    }
}

/// Verify draft.toml ships the expected sections and a pool for every role.
#[test]
fn draft_toml_has_expected_settings() {
    let content = std::fs::read_to_string("defaults/draft.toml").unwrap();
    let config: toml::Value = toml::from_str(&content).unwrap();

    let backend = config.get("backend").expect("backend section should exist");
    assert_eq!(backend.get("base_url").unwrap().as_str().unwrap(), "");

    let sync = config.get("sync").expect("sync section should exist");
    assert!(sync.get("reload_interval_secs").unwrap().as_integer().unwrap() > 0);
    assert!(sync.get("max_write_attempts").unwrap().as_integer().unwrap() > 0);

    let pools = config
        .get("fallback_pools")
        .expect("fallback_pools section should exist");
    for role in ["top", "jungle", "mid", "adc", "support"] {
        let champions = pools
            .get(role)
            .unwrap_or_else(|| panic!("fallback pool for {role} should exist"))
            .as_array()
            .unwrap();
        assert!(!champions.is_empty(), "fallback pool for {role} is empty");
    }
}
