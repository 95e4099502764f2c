//! Core type definitions for syncgate.
//!
//! This crate defines the small, dependency-light types shared by the
//! gateway core and its HTTP surface:
//! - Identifiers for applications, contexts, devices, objects and users
//! - The authenticated [`Principal`] and the [`Operation`]/[`Capability`] pair
//!   used by access control
//! - [`LifecycleEvent`], the message shape sent to the message bus
//!
//! Schema types live in `syncgate-model`; everything with control flow lives
//! in `syncgate-core`.

mod event;
mod ids;
mod principal;

pub use event::{EventOp, LifecycleEvent, Topic};
pub use ids::{ApplicationId, ContextId, DeviceId, ObjectId, UserId};
pub use principal::{Capability, Operation, Principal};
