//! Subscription workflow orchestrator.
//!
//! Each public method handles one request end to end:
//!
//! 1. Local checks: principal present, required fields present and well
//!    formed. Nothing external has been contacted if these fail.
//! 2. Schema lookup through the [`SchemaCache`] (may reload or evict).
//! 3. ACL check for the operation's capability.
//! 4. Channel resolution or payload validation against the schema.
//! 5. The workflow's step pipeline (see [`crate::workflow`]).
//!
//! No state is shared between requests apart from the schema cache.

use crate::acl::AclGate;
use crate::channel::{Channel, ChannelResolver, Snapshot};
use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::pipeline::{self, Completed};
use crate::ports::{AccountDirectory, Collaborators, CountQuery, Subscription, SubscriptionRegistry};
use crate::publisher::EventPublisher;
use crate::request::{ObjectRequest, RequestContext};
use crate::schema_cache::SchemaCache;
use crate::workflow::{CreateWorkflow, PublishWorkflow, SubscribeWorkflow, UnsubscribeWorkflow};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use syncgate_model::ApplicationSchema;
use syncgate_types::{EventOp, LifecycleEvent, Operation, Principal};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Runs the six `/object` workflows against injected collaborators.
pub struct Orchestrator {
    config: GatewayConfig,
    pub(crate) schema_cache: SchemaCache,
    pub(crate) acl: AclGate,
    pub(crate) resolver: ChannelResolver,
    pub(crate) publisher: EventPublisher,
    pub(crate) registry: Arc<dyn SubscriptionRegistry>,
    pub(crate) accounts: Arc<dyn AccountDirectory>,
}

impl Orchestrator {
    pub fn new(collaborators: Collaborators, config: GatewayConfig) -> Self {
        Self {
            schema_cache: SchemaCache::new(collaborators.schemas, config.schema_cache_limit_bytes),
            acl: AclGate::new(collaborators.access),
            resolver: ChannelResolver::new(
                collaborators.store,
                collaborators.translator,
                collaborators.search,
                config.parent_snapshot_limit,
                config.collection_snapshot_limit,
            ),
            publisher: EventPublisher::new(
                collaborators.bus,
                config.mutation_topic.clone(),
                config.track_topic.clone(),
            ),
            registry: collaborators.registry,
            accounts: collaborators.accounts,
            config,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn schema_cache(&self) -> &SchemaCache {
        &self.schema_cache
    }

    /// Registers the calling device on a channel and returns its snapshot.
    pub async fn subscribe(
        &self,
        ctx: &RequestContext,
        request: &ObjectRequest,
    ) -> GatewayResult<Completed<Snapshot>> {
        self.traced(Operation::Subscribe, ctx, async {
            let principal = ctx.principal()?;
            let context = request.context()?;
            let model = request.model()?;
            let device_id = ctx.device()?;

            let schema = self.admit(Operation::Subscribe, ctx, principal, model).await?;
            let resolved = self.resolver.resolve(&schema, request)?;
            let subscription = Subscription {
                application_id: ctx.application_id.clone(),
                context: context.clone(),
                device_id: device_id.clone(),
                channel: resolved.channel.clone(),
            };

            pipeline::run(SubscribeWorkflow::new(
                self,
                principal,
                subscription,
                resolved,
                request.optional_id().cloned(),
                request.filters.clone(),
            ))
            .await
        })
        .await
    }

    /// Removes the calling device's subscription to a channel.
    pub async fn unsubscribe(
        &self,
        ctx: &RequestContext,
        request: &ObjectRequest,
    ) -> GatewayResult<Completed<()>> {
        self.traced(Operation::Unsubscribe, ctx, async {
            let principal = ctx.principal()?;
            let context = request.context()?;
            let model = request.model()?;
            let device_id = ctx.device()?;

            let schema = self.admit(Operation::Unsubscribe, ctx, principal, model).await?;
            let resolved = self.resolver.resolve(&schema, request)?;
            let subscription = Subscription {
                application_id: ctx.application_id.clone(),
                context: context.clone(),
                device_id: device_id.clone(),
                channel: resolved.channel,
            };

            pipeline::run(UnsubscribeWorkflow::new(
                self,
                subscription,
                request.optional_id().cloned(),
                request.filters.clone(),
            ))
            .await
        })
        .await
    }

    /// Announces a new object. Returns the stamped object as published.
    pub async fn create(
        &self,
        ctx: &RequestContext,
        request: &ObjectRequest,
    ) -> GatewayResult<Completed<Value>> {
        self.traced(Operation::Create, ctx, async {
            let principal = ctx.principal()?;
            let model = request.model()?;
            let mut content = request.content()?.clone();

            let schema = self.admit(Operation::Create, ctx, principal, model).await?;
            if let Some(relation) = schema.model(model).and_then(|def| def.primary_parent()) {
                let key = relation.foreign_key();
                if content.get(&key).is_none_or(is_unset_reference) {
                    return Err(GatewayError::InvalidRequest(format!("'{key}' is required")));
                }
            }

            content.insert("type".into(), json!(model));
            if let Some(context) = request.context.as_ref().filter(|c| !c.is_blank()) {
                content.insert("context_id".into(), json!(context));
            }

            pipeline::run(CreateWorkflow::new(
                self,
                ctx.application_id.clone(),
                principal,
                content,
            ))
            .await
        })
        .await
    }

    /// Announces a patch to an existing object.
    pub async fn update(
        &self,
        ctx: &RequestContext,
        request: &ObjectRequest,
    ) -> GatewayResult<Completed<()>> {
        self.traced(Operation::Update, ctx, async {
            let principal = ctx.principal()?;
            let context = request.context()?;
            let model = request.model()?;
            let id = request.id()?;
            let patch = request.patch()?;

            self.admit(Operation::Update, ctx, principal, model).await?;

            let event = LifecycleEvent::new(EventOp::Edit, ctx.application_id.clone(), json!(patch))
                .with_target(id.clone(), context.clone(), model);

            pipeline::run(PublishWorkflow::new("update", self, event.clone(), event)).await
        })
        .await
    }

    /// Announces the removal of an object.
    pub async fn delete(
        &self,
        ctx: &RequestContext,
        request: &ObjectRequest,
    ) -> GatewayResult<Completed<()>> {
        self.traced(Operation::Delete, ctx, async {
            let principal = ctx.principal()?;
            let context = request.context()?;
            let model = request.model()?;
            let id = request.id()?;

            self.admit(Operation::Delete, ctx, principal, model).await?;

            let mutation = LifecycleEvent::new(
                EventOp::Delete,
                ctx.application_id.clone(),
                json!({"id": id, "type": model, "context": context}),
            );
            let track = LifecycleEvent::new(
                EventOp::Delete,
                ctx.application_id.clone(),
                json!({"op": "remove", "path": format!("{model}/{id}")}),
            );

            pipeline::run(PublishWorkflow::new("delete", self, mutation, track)).await
        })
        .await
    }

    /// Reads the registry's object count for a channel.
    pub async fn count(&self, ctx: &RequestContext, request: &ObjectRequest) -> GatewayResult<u64> {
        self.traced(Operation::Count, ctx, async {
            let principal = ctx.principal()?;
            let context = request.context()?;
            let model = request.model()?;

            let schema = self.admit(Operation::Count, ctx, principal, model).await?;
            let resolved = self.resolver.resolve(&schema, request)?;
            let parent = match &resolved.channel {
                Channel::Collection { parent, .. } => parent.clone(),
                Channel::Object { .. } => None,
            };
            let query = CountQuery {
                application_id: ctx.application_id.clone(),
                context: context.clone(),
                channel: resolved.channel,
                user_id: principal.user_id.clone(),
                parent,
            };

            self.registry
                .get_object_count(&query)
                .await
                .map_err(GatewayError::collaborator)
        })
        .await
    }

    /// Loads the schema, checks the model exists, then runs the ACL gate.
    async fn admit(
        &self,
        operation: Operation,
        ctx: &RequestContext,
        principal: &Principal,
        model: &str,
    ) -> GatewayResult<Arc<ApplicationSchema>> {
        let schema = self.schema_cache.get(&ctx.application_id).await?;
        if schema.model(model).is_none() {
            return Err(GatewayError::InvalidRequest(format!("unknown model '{model}'")));
        }
        self.acl
            .authorize(operation, &ctx.application_id, model, principal)
            .await?;
        Ok(schema)
    }

    async fn traced<T, F>(&self, operation: Operation, ctx: &RequestContext, work: F) -> GatewayResult<T>
    where
        F: Future<Output = GatewayResult<T>>,
    {
        let span = info_span!(
            "workflow",
            op = %operation,
            app = %ctx.application_id,
            request_id = %Uuid::now_v7(),
        );

        async move {
            let result = work.await;
            match &result {
                Ok(_) => info!("workflow completed"),
                Err(e) if e.is_client_error() => debug!(status = e.status_code(), error = %e, "request rejected"),
                Err(e) => warn!(status = e.status_code(), error = %e, "workflow failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

/// Null, `false`, zero and blank strings do not name a parent.
fn is_unset_reference(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.trim().is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}
