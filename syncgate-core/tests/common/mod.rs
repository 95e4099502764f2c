#![allow(dead_code)]

use serde_json::Value;
use syncgate_core::memory::MemoryBackend;
use syncgate_core::{GatewayConfig, ObjectRequest, Orchestrator, RequestContext};
use syncgate_model::{ApplicationSchema, ModelDefinition};
use syncgate_types::Principal;

pub const APP: &str = "app-1";
pub const DEVICE: &str = "device-1";
pub const USER_EMAIL: &str = "alice@example.com";
pub const ADMIN_EMAIL: &str = "root@example.com";

/// `event` is a root model, `comment` belongs to `event`.
pub fn schema() -> ApplicationSchema {
    ApplicationSchema::new()
        .with_model("event", ModelDefinition::new("events"))
        .with_model("comment", ModelDefinition::new("comments").belongs_to("event"))
}

/// Backend seeded with the schema, one device and two accounts.
pub async fn backend() -> MemoryBackend {
    seed(MemoryBackend::new()).await
}

/// Seeds `backend` the same way as [`backend`].
pub async fn seed(backend: MemoryBackend) -> MemoryBackend {
    backend.schemas.insert(APP, schema()).await;
    backend.registry.register_device(DEVICE).await;
    backend.accounts.add_user(USER_EMAIL, "user-1").await;
    backend.accounts.add_admin(ADMIN_EMAIL, "admin-1").await;
    backend
}

pub fn orchestrator(backend: &MemoryBackend) -> Orchestrator {
    Orchestrator::new(backend.collaborators(), GatewayConfig::default())
}

pub fn orchestrator_with(backend: &MemoryBackend, config: GatewayConfig) -> Orchestrator {
    Orchestrator::new(backend.collaborators(), config)
}

pub fn user_ctx() -> RequestContext {
    RequestContext::new(APP)
        .with_device(DEVICE)
        .with_principal(Principal::user(USER_EMAIL).with_user_id("user-1"))
}

pub fn admin_ctx() -> RequestContext {
    RequestContext::new(APP)
        .with_device(DEVICE)
        .with_principal(Principal::admin(ADMIN_EMAIL).with_user_id("admin-1"))
}

pub fn request(body: Value) -> ObjectRequest {
    serde_json::from_value(body).unwrap()
}
