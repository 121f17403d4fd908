use serde::{Deserialize, Serialize};

/// Absolute session lifetime settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Session lifetime from login, regardless of activity.
    pub max_age_ms: u64,
    /// Durable store key holding the login time.
    pub login_at_key: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_age_ms: 2 * 60 * 60 * 1000,
            login_at_key: "auth:loginAt".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_two_hours() {
        let s = SessionSettings::default();
        assert_eq!(s.max_age_ms, 7_200_000);
        assert_eq!(s.login_at_key, "auth:loginAt");
    }
}
