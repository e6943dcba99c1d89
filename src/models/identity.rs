use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum accepted length of a guest token (session token or contact email).
pub const MAX_GUEST_TOKEN_LEN: usize = 255;

/// Who a cart or an order belongs to.
///
/// A registered customer is identified by their user id. A guest is
/// identified by an opaque token: the anonymous session token for carts and
/// the contact email for orders. Every consumer has to handle both cases.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
    Registered { user_id: i32 },
    Guest { token: String },
}

impl Identity {
    pub fn registered(user_id: i32) -> Self {
        Identity::Registered { user_id }
    }

    pub fn guest(token: impl Into<String>) -> Self {
        Identity::Guest {
            token: token.into(),
        }
    }

    /// Stable storage key, unique per identity.
    pub fn owner_key(&self) -> String {
        match self {
            Identity::Registered { user_id } => format!("user:{}", user_id),
            Identity::Guest { token } => format!("guest:{}", token),
        }
    }

    pub fn user_id(&self) -> Option<i32> {
        match self {
            Identity::Registered { user_id } => Some(*user_id),
            Identity::Guest { .. } => None,
        }
    }

    pub fn guest_token(&self) -> Option<&str> {
        match self {
            Identity::Registered { .. } => None,
            Identity::Guest { token } => Some(token.as_str()),
        }
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, Identity::Guest { .. })
    }

    /// Rebuilds an identity from its persisted columns; exactly one must be set.
    pub fn from_columns(user_id: Option<i32>, guest_token: Option<String>) -> Option<Self> {
        match (user_id, guest_token) {
            (Some(user_id), None) => Some(Identity::Registered { user_id }),
            (None, Some(token)) => Some(Identity::Guest { token }),
            _ => None,
        }
    }

    /// Checks the identity is usable as a storage key.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Identity::Registered { user_id } if *user_id <= 0 => {
                Err(format!("invalid user id {}", user_id))
            }
            Identity::Guest { token } if token.trim().is_empty() => {
                Err("guest token must not be empty".to_string())
            }
            Identity::Guest { token } if token.len() > MAX_GUEST_TOKEN_LEN => Err(format!(
                "guest token exceeds {} characters",
                MAX_GUEST_TOKEN_LEN
            )),
            _ => Ok(()),
        }
    }
}

/// Canonical form of a contact email used for storage and comparison.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Registered { user_id } => write!(f, "user:{}", user_id),
            Identity::Guest { .. } => write!(f, "guest"),
        }
    }
}
