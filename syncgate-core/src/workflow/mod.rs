//! Step pipelines for the request workflows.
//!
//! Step order is fixed per workflow. For every workflow that publishes to
//! both topics, the mutation-topic step comes before the tracking-topic
//! step, so downstream materialization sees a change before analytics
//! events that reference it.

mod mutation;
mod subscribe;

pub use mutation::{MutationStep, PublishStep};
pub use subscribe::{SubscribeStep, UnsubscribeStep};

pub(crate) use mutation::{CreateWorkflow, PublishWorkflow};
pub(crate) use subscribe::{SubscribeWorkflow, UnsubscribeWorkflow};
