use super::IdentityProvider;
use crate::config::FirebaseConfig;
use crate::error::{ClientError, Result};
use crate::session::persist::{self, SavedSession};
use crate::session::Identity;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;

const REFRESH_MARGIN: Duration = Duration::from_secs(60);
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

struct Credentials {
    identity: Identity,
    id_token: String,
    refresh_token: String,
    expires_at: Instant,
}

impl Credentials {
    fn needs_refresh(&self) -> bool {
        Instant::now() + REFRESH_MARGIN >= self.expires_at
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    user_id: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

pub struct FirebaseAuth {
    client: Client,
    config: FirebaseConfig,
    identity: watch::Sender<Option<Identity>>,
    credentials: Mutex<Option<Credentials>>,
    session_path: Option<PathBuf>,
}

impl FirebaseAuth {
    pub fn new(config: FirebaseConfig) -> Self {
        let (identity, _) = watch::channel(None);
        Self {
            client: Client::new(),
            config,
            identity,
            credentials: Mutex::new(None),
            session_path: None,
        }
    }

    pub fn with_session_path(mut self, path: PathBuf) -> Self {
        self.session_path = Some(path);
        self
    }

    pub async fn restore(&self, saved: SavedSession) -> Result<Identity> {
        tracing::info!(uid = %saved.uid, "restoring saved session");
        let refreshed = self.refresh(&saved.refresh_token).await?;
        if refreshed.user_id != saved.uid {
            return Err(ClientError::Auth(
                "saved session belongs to a different user".to_string(),
            ));
        }
        let identity = Identity {
            uid: refreshed.user_id,
            email: saved.email,
        };
        self.install(Credentials {
            identity: identity.clone(),
            id_token: refreshed.id_token,
            refresh_token: refreshed.refresh_token,
            expires_at: expiry(refreshed.expires_in.as_deref()),
        })
        .await;
        Ok(identity)
    }

    async fn password_flow(&self, operation: &str, email: &str, password: &str) -> Result<Identity> {
        let url = format!(
            "{}/accounts:{operation}?key={}",
            self.config.auth_endpoint, self.config.api_key
        );
        let response = self
            .client
            .post(url)
            .json(&PasswordRequest {
                email,
                password,
                return_secure_token: true,
            })
            .send()
            .await?;
        let body: PasswordResponse = read_json(response).await?;

        let identity = Identity {
            uid: body.local_id,
            email: body.email.or_else(|| Some(email.to_string())),
        };
        tracing::info!(uid = %identity.uid, operation, "authenticated");
        self.install(Credentials {
            identity: identity.clone(),
            id_token: body.id_token,
            refresh_token: body.refresh_token,
            expires_at: expiry(body.expires_in.as_deref()),
        })
        .await;
        Ok(identity)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse> {
        let url = format!(
            "{}/token?key={}",
            self.config.token_endpoint, self.config.api_key
        );
        let response = self
            .client
            .post(url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;
        read_json(response).await
    }

    async fn install(&self, credentials: Credentials) {
        self.persist(&credentials);
        let identity = credentials.identity.clone();
        *self.credentials.lock().await = Some(credentials);
        self.identity
            .send_if_modified(|current| match current {
                Some(existing) if *existing == identity => false,
                _ => {
                    *current = Some(identity);
                    true
                }
            });
    }

    fn persist(&self, credentials: &Credentials) {
        let Some(path) = &self.session_path else {
            return;
        };
        let saved = SavedSession::new(
            &credentials.identity.uid,
            credentials.identity.email.as_deref(),
            &credentials.refresh_token,
        );
        if let Err(err) = persist::save(path, &saved) {
            tracing::warn!("failed to persist session: {err}");
        }
    }
}

#[async_trait]
impl IdentityProvider for FirebaseAuth {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        self.password_flow("signInWithPassword", email, password)
            .await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity> {
        self.password_flow("signUp", email, password).await
    }

    async fn sign_out(&self) -> Result<()> {
        self.credentials.lock().await.take();
        self.identity.send_replace(None);
        tracing::info!("signed out");
        // The identity is already gone; a stale file only fails the next restore.
        if let Some(path) = &self.session_path {
            if let Err(err) = persist::clear(path) {
                tracing::warn!(path = %path.display(), "failed to remove saved session: {err}");
            }
        }
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.identity.subscribe()
    }

    async fn id_token(&self) -> Result<String> {
        let mut guard = self.credentials.lock().await;
        let credentials = guard.as_mut().ok_or(ClientError::NotSignedIn)?;
        if !credentials.needs_refresh() {
            return Ok(credentials.id_token.clone());
        }

        tracing::debug!(uid = %credentials.identity.uid, "refreshing id token");
        let refreshed = self.refresh(&credentials.refresh_token).await?;
        credentials.id_token = refreshed.id_token;
        credentials.refresh_token = refreshed.refresh_token;
        credentials.expires_at = expiry(refreshed.expires_in.as_deref());
        self.persist(credentials);
        Ok(credentials.id_token.clone())
    }
}

fn expiry(expires_in: Option<&str>) -> Instant {
    let seconds = expires_in
        .and_then(|raw| raw.parse::<u64>().ok())
        .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
    Instant::now() + Duration::from_secs(seconds)
}

async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Auth(provider_message(&body, status.as_str())))
}

fn provider_message(body: &str, fallback: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| format!("identity provider returned {fallback}"))
}
