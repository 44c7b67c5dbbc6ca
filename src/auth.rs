//! Actor attribution.
//!
//! The recovery core never authorizes anything; it only records who asked.

use serde::{Deserialize, Serialize};

/// Actor recorded on audit entries when no identity is supplied.
pub const SYSTEM_ACTOR: &str = "system";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    pub actor_email: Option<String>,
}

impl ActorContext {
    pub fn system() -> Self {
        Self::default()
    }

    /// Blank emails are treated as absent.
    pub fn from_email(email: Option<&str>) -> Self {
        Self {
            actor_email: email
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
        }
    }

    pub fn actor(&self) -> &str {
        self.actor_email.as_deref().unwrap_or(SYSTEM_ACTOR)
    }
}
