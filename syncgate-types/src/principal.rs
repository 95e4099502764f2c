//! Authenticated caller and the access-control vocabulary.

use crate::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An already-authenticated caller. Token validation happens upstream;
/// the gateway only consumes the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub is_admin: bool,
}

impl Principal {
    /// A regular (non-admin) user.
    pub fn user(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            user_id: None,
            is_admin: false,
        }
    }

    /// An application administrator.
    pub fn admin(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            user_id: None,
            is_admin: true,
        }
    }

    /// Sets the account id resolved by the authenticator.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<UserId>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// The six request workflows exposed under `/object`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Subscribe,
    Unsubscribe,
    Create,
    Update,
    Delete,
    Count,
}

impl Operation {
    /// Route-style name, also used as the tracing span field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Subscribe => "subscribe",
            Operation::Unsubscribe => "unsubscribe",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Count => "count",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability the external ACL evaluator is asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Read,
    Write,
    MetaRead,
}

impl Capability {
    /// Name of the ACL field on the model definition.
    pub fn acl_field(&self) -> &'static str {
        match self {
            Capability::Read => "read_acl",
            Capability::Write => "write_acl",
            Capability::MetaRead => "meta_read_acl",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.acl_field())
    }
}
