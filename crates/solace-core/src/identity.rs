use serde::{Deserialize, Serialize};

/// Read-only view of the signed-in user, used to personalise the greeting.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Identity {
    pub authenticated: bool,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn named(display_name: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            display_name: Some(display_name.into()),
            email: None,
        }
    }

    /// Display name when the user is authenticated and the name is non-blank.
    pub fn greeting_name(&self) -> Option<&str> {
        if !self.authenticated {
            return None;
        }
        self.display_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }
}
