// REST client for the remote document store.
//
// Routes (all JSON):
//   GET    /api/champion-pools                  -> { role: [champion] }
//   GET    /api/available                       -> { role: [champion] }
//   GET    /api/available/{role}                -> [champion]
//   DELETE /api/available/{role}/{champion}
//   POST   /api/available/{role}/{champion}     (restore)
//   POST   /api/available/{role}/reset
//   POST   /api/champions/{champion}/unavailable
//   GET    /api/teams | POST /api/teams | DELETE /api/teams | DELETE /api/teams/{ts}
//   GET    /api/champion-roles | PUT /api/champion-roles

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{AvailabilityBatch, BackendError, ChampionBackend};
use crate::config::Config;
use crate::draft::pool::{ChampionPool, ChampionRoles};
use crate::draft::role::Role;
use crate::draft::team::SavedTeam;

/// Header carrying the shared admin passphrase on mutating requests.
pub const PASSPHRASE_HEADER: &str = "x-admin-passphrase";

/// Error body returned by the store on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

pub struct HttpBackend {
    http: reqwest::Client,
    base_url: Url,
    passphrase: Option<String>,
}

impl HttpBackend {
    pub fn new(
        base_url: &str,
        passphrase: Option<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let base_url = Url::parse(base_url).map_err(|e| BackendError::Url(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(BackendError::Url(format!("{base_url} cannot be a base url")));
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url,
            passphrase: passphrase.filter(|p| !p.is_empty()),
        })
    }

    /// Build a client from config. Returns `None` when no base URL is set
    /// (offline mode).
    pub fn from_config(config: &Config) -> Result<Option<Self>, BackendError> {
        let base_url = config.backend.base_url.trim();
        if base_url.is_empty() {
            return Ok(None);
        }
        Self::new(
            base_url,
            config.credentials.admin_passphrase.clone(),
            Duration::from_secs(config.backend.request_timeout_secs),
        )
        .map(Some)
    }

    /// `base_url` joined with percent-encoded path segments.
    pub(crate) fn url(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::Url(self.base_url.to_string()))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, BackendError> {
        let url = self.url(segments)?;
        debug!(%method, %url, "backend request");
        let mut builder = self.http.request(method.clone(), url);
        if method != Method::GET {
            if let Some(passphrase) = &self.passphrase {
                builder = builder.header(PASSPHRASE_HEADER, passphrase);
            }
        }
        Ok(builder)
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, BackendError> {
        let response = self.request(Method::GET, segments)?.send().await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn send_empty(&self, method: Method, segments: &[&str]) -> Result<(), BackendError> {
        let response = self.request(method, segments)?.send().await?;
        check_status(response).await?;
        Ok(())
    }
}

/// Map non-2xx responses to `BackendError::Status`, preferring the store's
/// `{ "error": ... }` message when present.
async fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = match response.json::<ErrorResponse>().await {
        Ok(body) => body.error,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
    };
    Err(BackendError::Status {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl ChampionBackend for HttpBackend {
    async fn get_champion_pools(&self) -> Result<ChampionPool, BackendError> {
        self.get_json(&["champion-pools"]).await
    }

    async fn get_available_champions(&self, role: Role) -> Result<Vec<String>, BackendError> {
        self.get_json(&["available", role.as_str()]).await
    }

    async fn get_available_champions_batch(&self) -> Result<AvailabilityBatch, BackendError> {
        self.get_json(&["available"]).await
    }

    async fn remove_available_champion(
        &self,
        role: Role,
        champion: &str,
    ) -> Result<(), BackendError> {
        self.send_empty(Method::DELETE, &["available", role.as_str(), champion])
            .await
    }

    async fn restore_available_champion(
        &self,
        role: Role,
        champion: &str,
    ) -> Result<(), BackendError> {
        self.send_empty(Method::POST, &["available", role.as_str(), champion])
            .await
    }

    async fn reset_available_champions(&self, role: Role) -> Result<(), BackendError> {
        self.send_empty(Method::POST, &["available", role.as_str(), "reset"])
            .await
    }

    async fn set_champion_unavailable(&self, champion: &str) -> Result<(), BackendError> {
        self.send_empty(Method::POST, &["champions", champion, "unavailable"])
            .await
    }

    async fn get_saved_teams(&self) -> Result<Vec<SavedTeam>, BackendError> {
        self.get_json(&["teams"]).await
    }

    async fn save_team(&self, team: &SavedTeam) -> Result<SavedTeam, BackendError> {
        let response = self
            .request(Method::POST, &["teams"])?
            .json(team)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn delete_team(&self, timestamp: i64) -> Result<(), BackendError> {
        self.send_empty(Method::DELETE, &["teams", &timestamp.to_string()])
            .await
    }

    async fn delete_all_teams(&self) -> Result<(), BackendError> {
        self.send_empty(Method::DELETE, &["teams"]).await
    }

    async fn get_champion_roles(&self) -> Result<ChampionRoles, BackendError> {
        self.get_json(&["champion-roles"]).await
    }

    async fn save_champion_roles(&self, roles: &ChampionRoles) -> Result<(), BackendError> {
        let response = self
            .request(Method::PUT, &["champion-roles"])?
            .json(roles)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}
