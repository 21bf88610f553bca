// Credential store: reads the `username:` / `password:` pair used to
// obtain a session token.

use crate::error::{Error, Result};
use std::fmt;
use std::path::Path;

/// Login for the collection API. `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Read credentials from a plaintext file of `key: value` lines.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read credentials file {}: {e}", path.display()))
        })?;
        Self::parse(&text)
    }

    /// Parse the file contents. Unknown keys are ignored, the last
    /// occurrence of a key wins and blank values count as absent.
    pub fn parse(text: &str) -> Result<Self> {
        let mut username = None;
        let mut password = None;

        for line in text.lines() {
            let line = line.trim_start();
            if let Some(value) = line.strip_prefix("username:") {
                username = Some(value.trim().to_string());
            } else if let Some(value) = line.strip_prefix("password:") {
                password = Some(value.trim().to_string());
            }
        }

        let username = username.filter(|u| !u.is_empty());
        let password = password.filter(|p| !p.is_empty());
        match (username, password) {
            (Some(username), Some(password)) => Ok(Credentials { username, password }),
            (None, _) => Err(Error::Configuration("credentials file is missing username".into())),
            (_, None) => Err(Error::Configuration("credentials file is missing password".into())),
        }
    }
}
