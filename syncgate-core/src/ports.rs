//! Collaborator boundaries.
//!
//! Every external system the gateway talks to is reached through one of
//! these traits, injected as `Arc<dyn ...>` so the orchestrator can be run
//! against in-memory fakes (see [`crate::memory`]) or real backends.
//! Each call is a suspension point; implementations must not assume any
//! ordering between calls from different requests.

use crate::channel::{Channel, ParentFilter};
use crate::error::PortResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use syncgate_model::ApplicationSchema;
use syncgate_types::{ApplicationId, Capability, ContextId, DeviceId, ObjectId, Principal, UserId};

/// Objects keyed by id, as returned by bulk store reads and delivered in
/// snapshots.
pub type ObjectMap = BTreeMap<ObjectId, Value>;

/// Loads application schemas for the schema cache.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    async fn load_schema(&self, application_id: &ApplicationId) -> PortResult<ApplicationSchema>;
}

/// The external ACL capability evaluator.
#[async_trait]
pub trait AccessEvaluator: Send + Sync {
    /// Returns whether `principal` holds `capability` on `model`.
    async fn check(
        &self,
        capability: Capability,
        application_id: &ApplicationId,
        model: &str,
        principal: &Principal,
    ) -> PortResult<bool>;
}

/// Durable store of devices, subscriptions and per-channel object counts.
///
/// The registry is the source of truth for subscription state; the
/// gateway never caches it.
#[async_trait]
pub trait SubscriptionRegistry: Send + Sync {
    /// `NotFound` when the device was never registered.
    async fn get_device(&self, device_id: &DeviceId) -> PortResult<Device>;

    /// Duplicate handling is up to the registry.
    async fn add_subscription(&self, subscription: &Subscription) -> PortResult<()>;

    /// `NotFound` when no matching subscription exists.
    async fn remove_subscription(&self, subscription: &Subscription) -> PortResult<()>;

    async fn set_object_count(
        &self,
        application_id: &ApplicationId,
        context: &ContextId,
        channel: &Channel,
        count: u64,
    ) -> PortResult<()>;

    async fn get_object_count(&self, query: &CountQuery) -> PortResult<u64>;
}

/// The persistent object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// `NotFound` when the object does not exist.
    async fn get_by_id(
        &self,
        application_id: &ApplicationId,
        model: &str,
        id: &ObjectId,
        context: &ContextId,
    ) -> PortResult<Value>;

    /// Every object of `model` in `context`, restricted to objects owned
    /// by `owner` when one is given. Unbounded.
    async fn get_all(
        &self,
        application_id: &ApplicationId,
        model: &str,
        context: &ContextId,
        owner: Option<&UserId>,
    ) -> PortResult<ObjectMap>;

    /// Ids of the `model` objects whose parent is `parent`, restricted to
    /// `owner` when one is given.
    async fn lookup_by_parent(
        &self,
        application_id: &ApplicationId,
        model: &str,
        context: &ContextId,
        parent: &ParentFilter,
        owner: Option<&UserId>,
    ) -> PortResult<Vec<ObjectId>>;

    /// Bulk fetch; ids that no longer exist are left out of the result.
    async fn multi_get(
        &self,
        application_id: &ApplicationId,
        model: &str,
        ids: &[ObjectId],
        context: &ContextId,
    ) -> PortResult<ObjectMap>;
}

/// Translates the client boolean/range/substring query language into a
/// search-engine filter.
#[async_trait]
pub trait QueryTranslator: Send + Sync {
    /// `Invalid` for queries the translator cannot parse.
    async fn translate(&self, query: &Value) -> PortResult<Value>;
}

/// The search/index service.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> PortResult<SearchPage>;
}

/// The message bus transport.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Resolves once the bus has accepted the message (at-least-once).
    async fn send(&self, topic: &str, payload: String) -> PortResult<()>;
}

/// Looks up the account behind an authenticated principal.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn find_admin(&self, email: &str) -> PortResult<UserId>;
    async fn find_user(&self, email: &str) -> PortResult<UserId>;
}

/// The full set of collaborators an orchestrator needs.
#[derive(Clone)]
pub struct Collaborators {
    pub schemas: Arc<dyn SchemaSource>,
    pub access: Arc<dyn AccessEvaluator>,
    pub registry: Arc<dyn SubscriptionRegistry>,
    pub store: Arc<dyn ObjectStore>,
    pub translator: Arc<dyn QueryTranslator>,
    pub search: Arc<dyn SearchIndex>,
    pub bus: Arc<dyn MessageBus>,
    pub accounts: Arc<dyn AccountDirectory>,
}

/// A registered client device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
}

/// One device's registered interest in a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub application_id: ApplicationId,
    pub context: ContextId,
    pub device_id: DeviceId,
    pub channel: Channel,
}

impl Subscription {
    /// Owning-user narrowing of a collection channel.
    pub fn user_filter(&self) -> Option<&UserId> {
        match &self.channel {
            Channel::Collection { user, .. } => user.as_ref(),
            Channel::Object { .. } => None,
        }
    }

    /// Parent narrowing of a collection channel.
    pub fn parent_filter(&self) -> Option<&ParentFilter> {
        match &self.channel {
            Channel::Collection { parent, .. } => parent.as_ref(),
            Channel::Object { .. } => None,
        }
    }

    /// Query narrowing of a collection channel.
    pub fn query(&self) -> Option<&Value> {
        match &self.channel {
            Channel::Collection { query, .. } => query.as_ref(),
            Channel::Object { .. } => None,
        }
    }
}

/// Arguments of a registry object-count read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountQuery {
    pub application_id: ApplicationId,
    pub context: ContextId,
    pub channel: Channel,
    pub user_id: Option<UserId>,
    pub parent: Option<ParentFilter>,
}

/// A search request scoped to one model inside one context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub model: String,
    pub context: ContextId,
    /// Filter produced by the [`QueryTranslator`].
    pub filter: Value,
}

impl SearchQuery {
    /// Request body for the search service: a bool query pinning the
    /// document type and context, filtered by the translated query.
    pub fn to_body(&self) -> Value {
        json!({
            "query": {
                "filtered": {
                    "query": {
                        "bool": {
                            "must": [
                                {"term": {"doc.type": self.model}},
                                {"term": {"doc.context_id": self.context}},
                            ]
                        }
                    },
                    "filter": self.filter,
                }
            }
        })
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    /// Total matches, which may exceed `hits.len()`.
    pub total: u64,
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: ObjectId,
    pub doc: Value,
}
