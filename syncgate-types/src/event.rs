//! Lifecycle events sent to the message bus.
//!
//! Events are immutable once built and never persisted by the gateway.
//! Downstream workers consume them from one of two logical topics:
//! [`Topic::Mutation`] drives materialization of object changes and
//! [`Topic::Track`] drives analytics and subscription bookkeeping.

use crate::{ApplicationId, ContextId, ObjectId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Logical message-bus destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Mutation,
    Track,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Mutation => f.write_str("mutation"),
            Topic::Track => f.write_str("track"),
        }
    }
}

/// The operation an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOp {
    Sub,
    Unsub,
    Add,
    Edit,
    Delete,
}

/// A message for one topic.
///
/// The wire shape is `{op, id?, context?, type?, object, applicationId, isAdmin?}`.
/// `object` carries the full object for `add`, the patch list for `edit`,
/// and a small descriptor for everything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub op: EventOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextId>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub object: Value,
    pub application_id: ApplicationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
}

impl LifecycleEvent {
    /// Creates an event with only the required fields set.
    pub fn new(op: EventOp, application_id: ApplicationId, object: Value) -> Self {
        Self {
            op,
            id: None,
            context: None,
            model: None,
            object,
            application_id,
            is_admin: None,
        }
    }

    /// Addresses the event at a single object.
    #[must_use]
    pub fn with_target(mut self, id: ObjectId, context: ContextId, model: impl Into<String>) -> Self {
        self.id = Some(id);
        self.context = Some(context);
        self.model = Some(model.into());
        self
    }

    /// Marks whether the acting principal was an administrator.
    #[must_use]
    pub fn with_admin(mut self, is_admin: bool) -> Self {
        self.is_admin = Some(is_admin);
        self
    }

    /// Serializes to the JSON payload handed to the bus.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
