//! Identifier types used throughout the gateway.
//!
//! Clients send ids either as JSON numbers or strings; both decode to the
//! same canonical string form so `1` and `"1"` address the same object.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Wire form accepted for any identifier.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Unsigned(u64),
    Signed(i64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(s) => s,
            RawId::Unsigned(n) => n.to_string(),
            RawId::Signed(n) => n.to_string(),
        }
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw identifier.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the canonical string form.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True for the empty or whitespace-only id, which clients send
            /// in place of a missing field.
            #[must_use]
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                RawId::deserialize(deserializer).map(|raw| Self(raw.into_string()))
            }
        }
    };
}

string_id! {
    /// Identifies a tenant application; every schema, subscription and
    /// event is scoped to one.
    ApplicationId
}

string_id! {
    /// Identifies a context (a top-level partition of objects inside an
    /// application).
    ContextId
}

string_id! {
    /// Identifies a registered client device.
    DeviceId
}

string_id! {
    /// Identifies a stored object.
    ObjectId
}

string_id! {
    /// Identifies an end-user account (the owner of created objects and
    /// the `user` narrowing of a collection channel).
    UserId
}
