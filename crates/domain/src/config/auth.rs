use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    /// `user:password` entries checked against the HTTPS listener's
    /// basic-auth header. The check result is logged, not enforced.
    #[serde(default)]
    pub users: Vec<String>,
}

impl AuthConfig {
    pub fn is_enabled(&self) -> bool {
        !self.users.is_empty()
    }
}
