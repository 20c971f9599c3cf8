use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Shared error type for store and bus seams between the TaskRelay crates.
#[derive(Debug, Error, Clone)]
pub enum RelayError {
    #[error("{message}")]
    Message { message: String },
}

impl RelayError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
        #[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Live environment (browser) session that perception and actions target.
    SessionId
);
string_id!(
    /// Identifier of one task handed to the agent loop.
    TaskId
);
string_id!(
    /// Identifier of an inbound request (e.g. a chat message id).
    RequestId
);
string_id!(
    /// Identifier of whoever sent the request (chat or user id).
    OriginatorId
);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Session bound to a single originator.
    pub fn for_originator(originator: &OriginatorId) -> Self {
        Self(format!("originator:{}", originator.0))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}
