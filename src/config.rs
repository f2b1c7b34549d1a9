use crate::error::ConfigError;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "http://localhost:8000/v1";
pub const DEFAULT_AUTH_ENDPOINT: &str = "https://identitytoolkit.googleapis.com/v1";
pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://securetoken.googleapis.com/v1";
pub const DEFAULT_FIRESTORE_ENDPOINT: &str = "https://firestore.googleapis.com/v1";
const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base: String,
    pub firebase: FirebaseConfig,
    pub poll_interval: Duration,
    pub download_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    pub api_key: String,
    pub project_id: String,
    pub auth_endpoint: String,
    pub token_endpoint: String,
    pub firestore_endpoint: String,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let or_default =
            |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let poll_interval = match lookup("CASEBRIEF_POLL_INTERVAL_MS") {
            Some(raw) => {
                let millis = raw
                    .trim()
                    .parse::<u64>()
                    .ok()
                    .filter(|millis| *millis > 0)
                    .ok_or_else(|| ConfigError::Invalid {
                        name: "CASEBRIEF_POLL_INTERVAL_MS",
                        value: raw.clone(),
                    })?;
                Duration::from_millis(millis)
            }
            None => Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        };

        Ok(Self {
            api_base: trim_base(or_default("CASEBRIEF_API_BASE", DEFAULT_API_BASE)),
            firebase: FirebaseConfig {
                api_key: required("FIREBASE_API_KEY")?,
                project_id: required("FIREBASE_PROJECT_ID")?,
                auth_endpoint: trim_base(or_default(
                    "FIREBASE_AUTH_ENDPOINT",
                    DEFAULT_AUTH_ENDPOINT,
                )),
                token_endpoint: trim_base(or_default(
                    "FIREBASE_TOKEN_ENDPOINT",
                    DEFAULT_TOKEN_ENDPOINT,
                )),
                firestore_endpoint: trim_base(or_default(
                    "FIRESTORE_ENDPOINT",
                    DEFAULT_FIRESTORE_ENDPOINT,
                )),
            },
            poll_interval,
            download_dir: lookup("CASEBRIEF_DOWNLOAD_DIR").map(PathBuf::from),
        })
    }

    pub fn export_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .or_else(dirs::download_dir)
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

fn trim_base(value: String) -> String {
    value.trim().trim_end_matches('/').to_string()
}
