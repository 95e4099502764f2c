//! In-memory collaborators.
//!
//! Used by the test suites and by the development server. Every component
//! shares a [`CallJournal`] so callers can assert which collaborators were
//! contacted and in what order. Failure switches let a component be made
//! to fail on demand.
//!
//! History (the journal plus recorded bus and search traffic) grows with every call, so
//! long-running processes build the backend with
//! [`MemoryBackend::without_history`].

use crate::channel::{Channel, ParentFilter};
use crate::error::{PortError, PortResult};
use crate::ports::{
    AccessEvaluator, AccountDirectory, Collaborators, CountQuery, Device, MessageBus, ObjectMap,
    ObjectStore, QueryTranslator, SchemaSource, SearchIndex, SearchPage, SearchQuery,
    Subscription, SubscriptionRegistry,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use syncgate_model::ApplicationSchema;
use syncgate_types::{ApplicationId, Capability, ContextId, DeviceId, ObjectId, Principal, UserId};
use tokio::sync::Mutex;
use tracing::debug;

/// Ordered record of collaborator calls, as `component.method` strings.
#[derive(Debug)]
pub struct CallJournal {
    enabled: bool,
    calls: Mutex<Vec<String>>,
}

impl CallJournal {
    pub fn new() -> Self {
        Self {
            enabled: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A journal that records nothing.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub async fn record(&self, call: impl Into<String>) {
        if self.enabled {
            self.calls.lock().await.push(call.into());
        }
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    pub async fn is_empty(&self) -> bool {
        self.calls.lock().await.is_empty()
    }

    /// Index of the first call equal to `call`.
    pub async fn position(&self, call: &str) -> Option<usize> {
        self.calls.lock().await.iter().position(|c| c == call)
    }

    pub async fn clear(&self) {
        self.calls.lock().await.clear();
    }
}

impl Default for CallJournal {
    fn default() -> Self {
        Self::new()
    }
}

fn unavailable(component: &str) -> PortError {
    PortError::Unavailable(format!("{component} switched to failing"))
}

// ── Schemas ──────────────────────────────────────────────────────

pub struct MemorySchemaSource {
    journal: Arc<CallJournal>,
    schemas: Mutex<HashMap<ApplicationId, ApplicationSchema>>,
    loads: AtomicU64,
    load_delay_ms: AtomicU64,
    failing: AtomicBool,
}

impl MemorySchemaSource {
    pub fn new(journal: Arc<CallJournal>) -> Self {
        Self {
            journal,
            schemas: Mutex::new(HashMap::new()),
            loads: AtomicU64::new(0),
            load_delay_ms: AtomicU64::new(0),
            failing: AtomicBool::new(false),
        }
    }

    pub async fn insert(&self, application_id: impl Into<ApplicationId>, schema: ApplicationSchema) {
        self.schemas.lock().await.insert(application_id.into(), schema);
    }

    /// Number of `load_schema` calls so far, including failed ones.
    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }

    /// Makes each load sleep before answering.
    pub fn set_load_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.load_delay_ms.store(millis, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl SchemaSource for MemorySchemaSource {
    async fn load_schema(&self, application_id: &ApplicationId) -> PortResult<ApplicationSchema> {
        self.journal.record("schemas.load").await;
        self.loads.fetch_add(1, Ordering::SeqCst);

        let delay = self.load_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable("schema source"));
        }

        self.schemas
            .lock()
            .await
            .get(application_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("application {application_id}")))
    }
}

// ── Access control ───────────────────────────────────────────────

/// Allows everything except explicitly denied `(capability, model)` pairs.
pub struct MemoryAccessEvaluator {
    journal: Arc<CallJournal>,
    denied: Mutex<HashSet<(Capability, String)>>,
    failing: AtomicBool,
}

impl MemoryAccessEvaluator {
    pub fn new(journal: Arc<CallJournal>) -> Self {
        Self {
            journal,
            denied: Mutex::new(HashSet::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub async fn deny(&self, capability: Capability, model: impl Into<String>) {
        self.denied.lock().await.insert((capability, model.into()));
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl AccessEvaluator for MemoryAccessEvaluator {
    async fn check(
        &self,
        capability: Capability,
        _application_id: &ApplicationId,
        model: &str,
        _principal: &Principal,
    ) -> PortResult<bool> {
        self.journal.record("access.check").await;
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable("access evaluator"));
        }
        let denied = self.denied.lock().await;
        Ok(!denied.contains(&(capability, model.to_string())))
    }
}

// ── Subscription registry ────────────────────────────────────────

pub struct MemoryRegistry {
    journal: Arc<CallJournal>,
    devices: Mutex<HashSet<DeviceId>>,
    subscriptions: Mutex<Vec<Subscription>>,
    counts: Mutex<HashMap<String, u64>>,
    fail_subscriptions: AtomicBool,
    fail_counts: AtomicBool,
}

impl MemoryRegistry {
    pub fn new(journal: Arc<CallJournal>) -> Self {
        Self {
            journal,
            devices: Mutex::new(HashSet::new()),
            subscriptions: Mutex::new(Vec::new()),
            counts: Mutex::new(HashMap::new()),
            fail_subscriptions: AtomicBool::new(false),
            fail_counts: AtomicBool::new(false),
        }
    }

    pub async fn register_device(&self, device_id: impl Into<DeviceId>) {
        self.devices.lock().await.insert(device_id.into());
    }

    pub async fn subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions.lock().await.clone()
    }

    /// Stored count for a channel, if one was ever set.
    pub async fn stored_count(
        &self,
        application_id: &ApplicationId,
        context: &ContextId,
        channel: &Channel,
    ) -> Option<u64> {
        let key = count_key(application_id, context, channel).ok()?;
        self.counts.lock().await.get(&key).copied()
    }

    /// Makes subscription adds and removes fail.
    pub fn set_subscriptions_failing(&self, failing: bool) {
        self.fail_subscriptions.store(failing, Ordering::SeqCst);
    }

    /// Makes object-count reads and writes fail.
    pub fn set_counts_failing(&self, failing: bool) {
        self.fail_counts.store(failing, Ordering::SeqCst);
    }
}

fn count_key(application_id: &ApplicationId, context: &ContextId, channel: &Channel) -> PortResult<String> {
    let channel = serde_json::to_string(channel).map_err(|e| PortError::Invalid(e.to_string()))?;
    Ok(format!("{application_id}/{context}/{channel}"))
}

#[async_trait]
impl SubscriptionRegistry for MemoryRegistry {
    async fn get_device(&self, device_id: &DeviceId) -> PortResult<Device> {
        self.journal.record("registry.get_device").await;
        if self.devices.lock().await.contains(device_id) {
            Ok(Device {
                id: device_id.clone(),
            })
        } else {
            Err(PortError::NotFound(format!("device {device_id}")))
        }
    }

    async fn add_subscription(&self, subscription: &Subscription) -> PortResult<()> {
        self.journal.record("registry.add_subscription").await;
        if self.fail_subscriptions.load(Ordering::SeqCst) {
            return Err(unavailable("registry"));
        }
        let mut subscriptions = self.subscriptions.lock().await;
        if !subscriptions.contains(subscription) {
            subscriptions.push(subscription.clone());
        }
        Ok(())
    }

    async fn remove_subscription(&self, subscription: &Subscription) -> PortResult<()> {
        self.journal.record("registry.remove_subscription").await;
        if self.fail_subscriptions.load(Ordering::SeqCst) {
            return Err(unavailable("registry"));
        }
        let mut subscriptions = self.subscriptions.lock().await;
        match subscriptions.iter().position(|s| s == subscription) {
            Some(index) => {
                subscriptions.remove(index);
                Ok(())
            }
            None => Err(PortError::NotFound("subscription".into())),
        }
    }

    async fn set_object_count(
        &self,
        application_id: &ApplicationId,
        context: &ContextId,
        channel: &Channel,
        count: u64,
    ) -> PortResult<()> {
        self.journal.record("registry.set_object_count").await;
        if self.fail_counts.load(Ordering::SeqCst) {
            return Err(unavailable("registry"));
        }
        let key = count_key(application_id, context, channel)?;
        self.counts.lock().await.insert(key, count);
        Ok(())
    }

    async fn get_object_count(&self, query: &CountQuery) -> PortResult<u64> {
        self.journal.record("registry.get_object_count").await;
        if self.fail_counts.load(Ordering::SeqCst) {
            return Err(unavailable("registry"));
        }
        let key = count_key(&query.application_id, &query.context, &query.channel)?;
        Ok(self.counts.lock().await.get(&key).copied().unwrap_or(0))
    }
}

// ── Object store ─────────────────────────────────────────────────

type StoreKey = (ApplicationId, String, ContextId);

/// Objects grouped by application, model and context. Child objects refer
/// to their parent through a `<parent>_id` field and to their owner through
/// `user_id`.
pub struct MemoryStore {
    journal: Arc<CallJournal>,
    objects: Mutex<HashMap<StoreKey, ObjectMap>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new(journal: Arc<CallJournal>) -> Self {
        Self {
            journal,
            objects: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub async fn insert(
        &self,
        application_id: impl Into<ApplicationId>,
        model: impl Into<String>,
        context: impl Into<ContextId>,
        id: impl Into<ObjectId>,
        object: Value,
    ) {
        self.objects
            .lock()
            .await
            .entry((application_id.into(), model.into(), context.into()))
            .or_default()
            .insert(id.into(), object);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    async fn bucket(
        &self,
        application_id: &ApplicationId,
        model: &str,
        context: &ContextId,
    ) -> PortResult<ObjectMap> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable("object store"));
        }
        let key = (application_id.clone(), model.to_string(), context.clone());
        Ok(self.objects.lock().await.get(&key).cloned().unwrap_or_default())
    }
}

fn id_matches(value: Option<&Value>, id: &str) -> bool {
    match value {
        Some(Value::String(s)) => s == id,
        Some(Value::Number(n)) => n.to_string() == id,
        _ => false,
    }
}

fn owned_by(object: &Value, owner: Option<&UserId>) -> bool {
    owner.is_none_or(|owner| id_matches(object.get("user_id"), owner.as_str()))
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_by_id(
        &self,
        application_id: &ApplicationId,
        model: &str,
        id: &ObjectId,
        context: &ContextId,
    ) -> PortResult<Value> {
        self.journal.record("store.get_by_id").await;
        self.bucket(application_id, model, context)
            .await?
            .remove(id)
            .ok_or_else(|| PortError::NotFound(format!("{model}/{id}")))
    }

    async fn get_all(
        &self,
        application_id: &ApplicationId,
        model: &str,
        context: &ContextId,
        owner: Option<&UserId>,
    ) -> PortResult<ObjectMap> {
        self.journal.record("store.get_all").await;
        let mut bucket = self.bucket(application_id, model, context).await?;
        bucket.retain(|_, object| owned_by(object, owner));
        Ok(bucket)
    }

    async fn lookup_by_parent(
        &self,
        application_id: &ApplicationId,
        model: &str,
        context: &ContextId,
        parent: &ParentFilter,
        owner: Option<&UserId>,
    ) -> PortResult<Vec<ObjectId>> {
        self.journal.record("store.lookup_by_parent").await;
        let field = format!("{}_id", parent.model);
        Ok(self
            .bucket(application_id, model, context)
            .await?
            .into_iter()
            .filter(|(_, object)| id_matches(object.get(&field), parent.id.as_str()))
            .filter(|(_, object)| owned_by(object, owner))
            .map(|(id, _)| id)
            .collect())
    }

    async fn multi_get(
        &self,
        application_id: &ApplicationId,
        model: &str,
        ids: &[ObjectId],
        context: &ContextId,
    ) -> PortResult<ObjectMap> {
        self.journal.record("store.multi_get").await;
        let mut bucket = self.bucket(application_id, model, context).await?;
        Ok(ids
            .iter()
            .filter_map(|id| bucket.remove(id).map(|object| (id.clone(), object)))
            .collect())
    }
}

// ── Query translation and search ─────────────────────────────────

/// Passes object queries through unchanged.
pub struct IdentityTranslator {
    journal: Arc<CallJournal>,
}

impl IdentityTranslator {
    pub fn new(journal: Arc<CallJournal>) -> Self {
        Self { journal }
    }
}

#[async_trait]
impl QueryTranslator for IdentityTranslator {
    async fn translate(&self, query: &Value) -> PortResult<Value> {
        self.journal.record("translator.translate").await;
        if query.is_object() {
            Ok(query.clone())
        } else {
            Err(PortError::Invalid("query must be an object".into()))
        }
    }
}

/// Answers every search with a preset page. Queries are recorded while the
/// journal is enabled.
pub struct MemorySearch {
    journal: Arc<CallJournal>,
    page: Mutex<SearchPage>,
    queries: Mutex<Vec<SearchQuery>>,
}

impl MemorySearch {
    pub fn new(journal: Arc<CallJournal>) -> Self {
        Self {
            journal,
            page: Mutex::new(SearchPage::default()),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub async fn set_page(&self, page: SearchPage) {
        *self.page.lock().await = page;
    }

    pub async fn queries(&self) -> Vec<SearchQuery> {
        self.queries.lock().await.clone()
    }
}

#[async_trait]
impl SearchIndex for MemorySearch {
    async fn search(&self, query: &SearchQuery) -> PortResult<SearchPage> {
        self.journal.record("search.search").await;
        if self.journal.is_enabled() {
            self.queries.lock().await.push(query.clone());
        }
        Ok(self.page.lock().await.clone())
    }
}

// ── Message bus ──────────────────────────────────────────────────

/// Logs every accepted message and, when its journal is enabled, keeps it
/// in send order.
pub struct MemoryBus {
    journal: Arc<CallJournal>,
    messages: Mutex<Vec<(String, String)>>,
    failing_topics: Mutex<HashSet<String>>,
}

impl MemoryBus {
    pub fn new(journal: Arc<CallJournal>) -> Self {
        Self {
            journal,
            messages: Mutex::new(Vec::new()),
            failing_topics: Mutex::new(HashSet::new()),
        }
    }

    /// Rejects every later send to `topic`.
    pub async fn fail_topic(&self, topic: impl Into<String>) {
        self.failing_topics.lock().await.insert(topic.into());
    }

    /// Accepted `(topic, payload)` pairs.
    pub async fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().await.clone()
    }

    /// Decoded payloads accepted on `topic`. Undecodable payloads are skipped.
    pub async fn events_on(&self, topic: &str) -> Vec<Value> {
        self.messages
            .lock()
            .await
            .iter()
            .filter(|(t, _)| t == topic)
            .filter_map(|(_, payload)| serde_json::from_str(payload).ok())
            .collect()
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn send(&self, topic: &str, payload: String) -> PortResult<()> {
        self.journal.record(format!("bus.send:{topic}")).await;
        if self.failing_topics.lock().await.contains(topic) {
            return Err(PortError::Unavailable(format!("topic {topic} rejected the message")));
        }
        debug!(topic, bytes = payload.len(), payload = %payload, "bus accepted message");
        if self.journal.is_enabled() {
            self.messages.lock().await.push((topic.to_string(), payload));
        }
        Ok(())
    }
}

// ── Accounts ─────────────────────────────────────────────────────

pub struct MemoryDirectory {
    journal: Arc<CallJournal>,
    admins: Mutex<BTreeMap<String, UserId>>,
    users: Mutex<BTreeMap<String, UserId>>,
}

impl MemoryDirectory {
    pub fn new(journal: Arc<CallJournal>) -> Self {
        Self {
            journal,
            admins: Mutex::new(BTreeMap::new()),
            users: Mutex::new(BTreeMap::new()),
        }
    }

    pub async fn add_admin(&self, email: impl Into<String>, user_id: impl Into<UserId>) {
        self.admins.lock().await.insert(email.into(), user_id.into());
    }

    pub async fn add_user(&self, email: impl Into<String>, user_id: impl Into<UserId>) {
        self.users.lock().await.insert(email.into(), user_id.into());
    }
}

#[async_trait]
impl AccountDirectory for MemoryDirectory {
    async fn find_admin(&self, email: &str) -> PortResult<UserId> {
        self.journal.record("accounts.find_admin").await;
        self.admins
            .lock()
            .await
            .get(email)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("admin {email}")))
    }

    async fn find_user(&self, email: &str) -> PortResult<UserId> {
        self.journal.record("accounts.find_user").await;
        self.users
            .lock()
            .await
            .get(email)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("user {email}")))
    }
}

// ── Bundle ───────────────────────────────────────────────────────

/// One of each in-memory collaborator, sharing a journal.
pub struct MemoryBackend {
    pub journal: Arc<CallJournal>,
    pub schemas: Arc<MemorySchemaSource>,
    pub access: Arc<MemoryAccessEvaluator>,
    pub registry: Arc<MemoryRegistry>,
    pub store: Arc<MemoryStore>,
    pub translator: Arc<IdentityTranslator>,
    pub search: Arc<MemorySearch>,
    pub bus: Arc<MemoryBus>,
    pub accounts: Arc<MemoryDirectory>,
}

impl MemoryBackend {
    /// A backend that records calls, bus messages and search queries.
    pub fn new() -> Self {
        Self::with_journal(Arc::new(CallJournal::new()))
    }

    /// A backend that keeps no history, for long-running processes. Bus
    /// messages are only logged.
    pub fn without_history() -> Self {
        Self::with_journal(Arc::new(CallJournal::disabled()))
    }

    fn with_journal(journal: Arc<CallJournal>) -> Self {
        Self {
            schemas: Arc::new(MemorySchemaSource::new(journal.clone())),
            access: Arc::new(MemoryAccessEvaluator::new(journal.clone())),
            registry: Arc::new(MemoryRegistry::new(journal.clone())),
            store: Arc::new(MemoryStore::new(journal.clone())),
            translator: Arc::new(IdentityTranslator::new(journal.clone())),
            search: Arc::new(MemorySearch::new(journal.clone())),
            bus: Arc::new(MemoryBus::new(journal.clone())),
            accounts: Arc::new(MemoryDirectory::new(journal.clone())),
            journal,
        }
    }

    /// Trait-object handles for [`crate::Orchestrator::new`].
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            schemas: self.schemas.clone(),
            access: self.access.clone(),
            registry: self.registry.clone(),
            store: self.store.clone(),
            translator: self.translator.clone(),
            search: self.search.clone(),
            bus: self.bus.clone(),
            accounts: self.accounts.clone(),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}
