use serde::{Deserialize, Serialize};

/// Password policy verdict from the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct PasswordStrength {
    pub is_valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl PasswordStrength {
    /// First policy violation, for inline display under the password field.
    pub fn first_error(&self) -> Option<&str> {
        self.errors.first().map(String::as_str)
    }
}
