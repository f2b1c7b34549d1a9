use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedSession {
    pub schema_version: u32,
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    pub refresh_token: String,
    pub saved_at: String,
}

impl SavedSession {
    pub fn new(uid: &str, email: Option<&str>, refresh_token: &str) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            uid: uid.to_string(),
            email: email.map(str::to_string),
            refresh_token: refresh_token.to_string(),
            saved_at: timestamp(),
        }
    }
}

fn timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_secs().to_string(),
        Err(_) => "0".to_string(),
    }
}

pub fn default_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".casebrief")
        .join("session.json")
}

fn read_session_file(path: &Path) -> Result<SavedSession, String> {
    let data = fs::read(path).map_err(|err| format!("failed to read {}: {err}", path.display()))?;
    let session: SavedSession = serde_json::from_slice(&data)
        .map_err(|err| format!("failed to parse {}: {err}", path.display()))?;

    if session.schema_version != SCHEMA_VERSION {
        return Err(format!(
            "unknown schema_version in {}: {}",
            path.display(),
            session.schema_version
        ));
    }
    if session.refresh_token.is_empty() {
        return Err(format!("empty refresh token in {}", path.display()));
    }
    Ok(session)
}

pub fn save(path: &Path, session: &SavedSession) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(session)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;

    fs::write(&tmp_path, bytes)?;
    match fs::rename(&tmp_path, path) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            if path.exists() {
                fs::remove_file(path)?;
                fs::rename(&tmp_path, path)?;
                Ok(())
            } else {
                Err(rename_err)
            }
        }
    }
}

pub fn load(path: &Path) -> (Option<SavedSession>, Option<String>) {
    if !path.exists() {
        return (None, None);
    }

    match read_session_file(path) {
        Ok(session) => (Some(session), None),
        Err(err) => (None, Some(err)),
    }
}

pub fn clear(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}
