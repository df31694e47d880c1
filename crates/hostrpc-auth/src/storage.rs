//! Password file I/O.
//!
//! Reads and writes `~/.hostrpc/auth.json` with secure file permissions (0o600).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::AuthError;

/// Default password file name.
const AUTH_FILE_NAME: &str = "auth.json";

/// Supplies the digest-auth password.
///
/// Called on every validation so that a changed password takes effect
/// without a restart.
pub trait PasswordSource: Send + Sync {
    /// Current password, `None` when none is configured.
    fn password(&self) -> Option<String>;
}

/// On-disk shape of the password file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthFile {
    /// Digest password.
    pub password: Option<String>,
}

/// Get the password file path under the given data directory.
pub fn auth_file_path(data_dir: &Path) -> PathBuf {
    data_dir.join(AUTH_FILE_NAME)
}

/// Load the password file.
///
/// Returns `None` if the file doesn't exist or is invalid.
pub fn load_auth_file(path: &Path) -> Option<AuthFile> {
    let data = match std::fs::read_to_string(path) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!("failed to read auth file: {e}");
            return None;
        }
    };

    match serde_json::from_str::<AuthFile>(&data) {
        Ok(file) => Some(file),
        Err(e) => {
            tracing::warn!("failed to parse auth file: {e}");
            None
        }
    }
}

/// Save the password file.
///
/// Creates parent directories if needed. Sets file permissions to 0o600.
pub fn save_auth_file(path: &Path, file: &AuthFile) -> Result<(), AuthError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(file)?;
    std::fs::write(path, &json)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        let _ = std::fs::set_permissions(path, perms);
    }

    Ok(())
}

/// Password read from a JSON file on each request.
#[derive(Clone, Debug)]
pub struct FilePasswordStore {
    path: PathBuf,
}

impl FilePasswordStore {
    /// Store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the stored password.
    pub fn set_password(&self, password: &str) -> Result<(), AuthError> {
        let mut file = load_auth_file(&self.path).unwrap_or_default();
        file.password = Some(password.to_string());
        save_auth_file(&self.path, &file)
    }

    /// The stored password, or an error naming the file.
    pub fn require_password(&self) -> Result<String, AuthError> {
        self.password()
            .ok_or_else(|| AuthError::NotConfigured(self.path.display().to_string()))
    }
}

impl PasswordSource for FilePasswordStore {
    fn password(&self) -> Option<String> {
        load_auth_file(&self.path)?
            .password
            .filter(|p| !p.is_empty())
    }
}

/// Fixed in-memory password.
#[derive(Clone)]
pub struct StaticPassword(String);

impl StaticPassword {
    /// Wrap `password`.
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }
}

impl std::fmt::Debug for StaticPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticPassword(..)")
    }
}

impl PasswordSource for StaticPassword {
    fn password(&self) -> Option<String> {
        Some(self.0.clone())
    }
}
