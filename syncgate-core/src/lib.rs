//! Request-facing orchestration for the syncgate real-time sync backend.
//!
//! This crate handles:
//! - Per-application schema caching with a coarse size-based flush
//! - ACL checks mapping each operation to the capability it needs
//! - Channel resolution from `id` / `model` / `filters` request fields
//! - Subscribe, unsubscribe, create, update, delete and count workflows
//! - Lifecycle event publishing to the mutation and tracking topics
//!
//! # Design Principles
//!
//! - **No hidden state**: the registry, store and bus are the source of
//!   truth; the only process-wide state here is the schema cache
//! - **Validate first**: malformed requests are rejected before any
//!   collaborator is contacted
//! - **Ordered side effects**: each workflow is a fixed list of steps, and
//!   mutation-topic events always go out before tracking-topic events
//! - **Injected collaborators**: every external system sits behind a trait
//!   in [`ports`], with in-memory implementations in [`memory`]

pub mod acl;
pub mod channel;
pub mod config;
mod error;
pub mod memory;
pub mod orchestrator;
pub mod pipeline;
pub mod ports;
pub mod publisher;
pub mod request;
pub mod schema_cache;
pub mod workflow;

pub use acl::{required_capability, AclGate};
pub use channel::{Channel, ChannelResolver, ChannelTarget, Filters, ParentFilter, ResolvedChannel, Snapshot};
pub use config::{FailurePolicy, GatewayConfig};
pub use error::{GatewayError, GatewayResult, PortError, PortResult};
pub use orchestrator::Orchestrator;
pub use pipeline::{Completed, StepWarning};
pub use ports::{Collaborators, ObjectMap};
pub use publisher::EventPublisher;
pub use request::{ObjectRequest, PatchOp, PatchOperation, RequestContext};
pub use schema_cache::SchemaCache;
