use serde::{Deserialize, Serialize};

/// Default account level for regular users
fn default_level() -> i32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    pub username: String,
    #[serde(default)]
    pub fullname: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "default_level")]
    pub level: i32,
    #[serde(default)]
    pub saldo: f64,
    #[serde(default)]
    pub expiration_date: Option<String>,
    #[serde(default)]
    pub level_text: Option<String>,
    #[serde(default)]
    pub total_keys: Option<i64>,
    /// Only present on login responses
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
    #[serde(default, skip_serializing)]
    pub refresh_token: Option<String>,
}

impl User {
    pub fn display_name(&self) -> &str {
        self.fullname
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.username)
    }
}
