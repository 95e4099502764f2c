//! Inbound request shapes and the field checks that run before any
//! collaborator is contacted.

use crate::error::{GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use syncgate_types::{ApplicationId, ContextId, DeviceId, ObjectId, Principal};

/// Who is calling, resolved by the transport layer.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    pub application_id: ApplicationId,
    pub device_id: Option<DeviceId>,
    pub principal: Option<Principal>,
}

impl RequestContext {
    pub fn new(application_id: impl Into<ApplicationId>) -> Self {
        Self {
            application_id: application_id.into(),
            device_id: None,
            principal: None,
        }
    }

    #[must_use]
    pub fn with_device(mut self, device_id: impl Into<DeviceId>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    #[must_use]
    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn principal(&self) -> GatewayResult<&Principal> {
        self.principal.as_ref().ok_or(GatewayError::Unauthenticated)
    }

    pub fn device(&self) -> GatewayResult<&DeviceId> {
        self.device_id
            .as_ref()
            .filter(|id| !id.is_blank())
            .ok_or_else(|| GatewayError::InvalidRequest("Device identifier is not provided.".into()))
    }
}

/// Body of every `/object` request. Fields not used by a workflow are
/// ignored by it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[serde(default, alias = "context_id", skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Parsed by the channel resolver; kept raw so it can be echoed into
    /// tracking events unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<Value>,
}

impl ObjectRequest {
    pub fn context(&self) -> GatewayResult<&ContextId> {
        self.context
            .as_ref()
            .filter(|c| !c.is_blank())
            .ok_or(GatewayError::MissingContext)
    }

    pub fn model(&self) -> GatewayResult<&str> {
        self.model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| GatewayError::InvalidRequest("Requested model is not provided.".into()))
    }

    pub fn id(&self) -> GatewayResult<&ObjectId> {
        self.id
            .as_ref()
            .filter(|id| !id.is_blank())
            .ok_or_else(|| GatewayError::InvalidRequest("Requested object id is not provided.".into()))
    }

    /// A blank id counts as absent.
    pub fn optional_id(&self) -> Option<&ObjectId> {
        self.id.as_ref().filter(|id| !id.is_blank())
    }

    /// Create payload; must be a JSON object.
    pub fn content(&self) -> GatewayResult<&serde_json::Map<String, Value>> {
        match &self.content {
            Some(Value::Object(map)) => Ok(map),
            Some(_) => Err(GatewayError::InvalidRequest("Content must be an object.".into())),
            None => Err(GatewayError::InvalidRequest("Content is not provided.".into())),
        }
    }

    /// Update payload; must be a non-empty array of patch operations.
    pub fn patch(&self) -> GatewayResult<Vec<PatchOperation>> {
        let Some(Value::Array(items)) = &self.patch else {
            return Err(GatewayError::InvalidRequest("Patch must be an array".into()));
        };
        if items.is_empty() {
            return Err(GatewayError::InvalidRequest("Patch must not be empty".into()));
        }
        items
            .iter()
            .map(|item| {
                serde_json::from_value(item.clone())
                    .map_err(|e| GatewayError::InvalidRequest(format!("invalid patch operation: {e}")))
            })
            .collect()
    }
}

/// One step of an update patch, applied downstream in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: PatchOp,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Replace,
    Increment,
    Append,
    Remove,
}
