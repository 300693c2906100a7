//! Universal identity token file

use crate::api::SecretsApi;
use crate::api::models::UidRotateToken;
use crate::error::Result;
use crate::prompts::Prompter;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Token file used when none is given.
pub const DEFAULT_TOKEN_FILE: &str = "./.vault-token";

#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored token. A missing file asks the operator for the token
    /// and stores it.
    pub fn read_or_prompt(&self, prompter: &mut Prompter, access_id: &str) -> Result<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(token) => Ok(token.trim().to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let token = prompter.text(&format!(
                    "Enter your UID token provided by the secrets management team for Access ID {access_id}: "
                ))?;
                self.write(&token)?;
                Ok(token)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the stored token atomically, readable by the owner only.
    pub fn write(&self, token: &str) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut temp_file = NamedTempFile::new_in(&dir)?;
        temp_file.write_all(token.as_bytes())?;
        temp_file.flush()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            temp_file
                .as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }

        temp_file.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Trade `current` for a fresh token and store it.
    pub async fn rotate(&self, api: &SecretsApi, current: &str) -> Result<String> {
        let body = UidRotateToken {
            uid_token: current.to_string(),
        };
        let new_token = api.uid_rotate_token(&body).await?.token;
        self.write(&new_token)?;
        tracing::debug!(file = %self.path.display(), "UID token rotated");
        Ok(new_token)
    }
}

impl Default for TokenFile {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_filled_from_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let file = TokenFile::new(dir.path().join(".vault-token"));
        let mut prompter = Prompter::scripted("u-first\n");

        assert_eq!(file.read_or_prompt(&mut prompter, "p-1").unwrap(), "u-first");
        assert_eq!(std::fs::read_to_string(file.path()).unwrap(), "u-first");
    }

    #[test]
    fn existing_file_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let file = TokenFile::new(dir.path().join(".vault-token"));
        std::fs::write(file.path(), "u-stored\n").unwrap();

        let mut prompter = Prompter::scripted("");
        assert_eq!(file.read_or_prompt(&mut prompter, "p-1").unwrap(), "u-stored");
    }

    #[cfg(unix)]
    #[test]
    fn written_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let file = TokenFile::new(dir.path().join("tok"));
        file.write("u-1").unwrap();
        file.write("u-2").unwrap();

        let mode = std::fs::metadata(file.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(std::fs::read_to_string(file.path()).unwrap(), "u-2");
    }
}
