use crate::channel::{ResolvedChannel, Snapshot};
use crate::error::{GatewayError, GatewayResult, PortError};
use crate::orchestrator::Orchestrator;
use crate::pipeline::{PipelineStep, StepOutcome, Workflow};
use crate::ports::Subscription;
use async_trait::async_trait;
use serde_json::{json, Value};
use syncgate_types::{EventOp, LifecycleEvent, ObjectId, Principal, Topic};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeStep {
    /// The device must already be registered.
    VerifyDevice,
    Register,
    Snapshot,
    /// `sub` event on the tracking topic.
    Track,
    /// Stores the snapshot count on the channel.
    RecordCount,
}

impl PipelineStep for SubscribeStep {
    fn name(&self) -> &'static str {
        match self {
            SubscribeStep::VerifyDevice => "verify_device",
            SubscribeStep::Register => "register",
            SubscribeStep::Snapshot => "snapshot",
            SubscribeStep::Track => "track",
            SubscribeStep::RecordCount => "record_count",
        }
    }
}

const SUBSCRIBE_STEPS: &[SubscribeStep] = &[
    SubscribeStep::VerifyDevice,
    SubscribeStep::Register,
    SubscribeStep::Snapshot,
    SubscribeStep::Track,
    SubscribeStep::RecordCount,
];

pub(crate) struct SubscribeWorkflow<'a> {
    orchestrator: &'a Orchestrator,
    principal: &'a Principal,
    subscription: Subscription,
    resolved: ResolvedChannel,
    requested_id: Option<ObjectId>,
    filters: Option<Value>,
    snapshot: Option<Snapshot>,
}

impl<'a> SubscribeWorkflow<'a> {
    pub(crate) fn new(
        orchestrator: &'a Orchestrator,
        principal: &'a Principal,
        subscription: Subscription,
        resolved: ResolvedChannel,
        requested_id: Option<ObjectId>,
        filters: Option<Value>,
    ) -> Self {
        Self {
            orchestrator,
            principal,
            subscription,
            resolved,
            requested_id,
            filters,
            snapshot: None,
        }
    }

    fn track_event(&self) -> LifecycleEvent {
        let sub = &self.subscription;
        LifecycleEvent::new(
            EventOp::Sub,
            sub.application_id.clone(),
            json!({
                "id": self.requested_id,
                "context": sub.context,
                "device_id": sub.device_id,
                "user_id": self.principal.email,
                "filters": self.filters,
            }),
        )
    }
}

#[async_trait]
impl<'a> Workflow for SubscribeWorkflow<'a> {
    type Step = SubscribeStep;
    type Output = Snapshot;

    fn name(&self) -> &'static str {
        "subscribe"
    }

    fn steps(&self) -> &'static [SubscribeStep] {
        SUBSCRIBE_STEPS
    }

    async fn run_step(&mut self, step: SubscribeStep) -> StepOutcome {
        let orch = self.orchestrator;
        let policy = orch.config().failure_policy;

        match step {
            SubscribeStep::VerifyDevice => StepOutcome::fatal_on_err(
                orch.registry
                    .get_device(&self.subscription.device_id)
                    .await
                    .map(drop)
                    .map_err(|e| match e {
                        PortError::NotFound(_) => GatewayError::DeviceNotRegistered,
                        other => GatewayError::collaborator(other),
                    }),
            ),
            SubscribeStep::Register => StepOutcome::fatal_on_err(
                orch.registry
                    .add_subscription(&self.subscription)
                    .await
                    .map_err(GatewayError::collaborator),
            ),
            SubscribeStep::Snapshot => {
                match orch
                    .resolver
                    .snapshot(&self.subscription.application_id, &self.resolved)
                    .await
                {
                    Ok(snapshot) => {
                        self.snapshot = Some(snapshot);
                        StepOutcome::Continue
                    }
                    Err(e) => StepOutcome::Fatal(e),
                }
            }
            SubscribeStep::Track => StepOutcome::tolerate(
                orch.publisher.publish(Topic::Track, &self.track_event()).await,
                policy.strict_tracking,
            ),
            SubscribeStep::RecordCount => {
                let count = self.snapshot.as_ref().map_or(0, |s| s.count);
                let sub = &self.subscription;
                StepOutcome::tolerate(
                    orch.registry
                        .set_object_count(&sub.application_id, &sub.context, &sub.channel, count)
                        .await
                        .map_err(GatewayError::collaborator),
                    policy.strict_object_count,
                )
            }
        }
    }

    fn finish(self) -> GatewayResult<Snapshot> {
        self.snapshot
            .ok_or_else(|| GatewayError::Collaborator("subscribe finished without a snapshot".into()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeStep {
    Remove,
    /// `unsub` event on the tracking topic.
    Track,
}

impl PipelineStep for UnsubscribeStep {
    fn name(&self) -> &'static str {
        match self {
            UnsubscribeStep::Remove => "remove",
            UnsubscribeStep::Track => "track",
        }
    }
}

const UNSUBSCRIBE_STEPS: &[UnsubscribeStep] = &[UnsubscribeStep::Remove, UnsubscribeStep::Track];

pub(crate) struct UnsubscribeWorkflow<'a> {
    orchestrator: &'a Orchestrator,
    subscription: Subscription,
    requested_id: Option<ObjectId>,
    filters: Option<Value>,
}

impl<'a> UnsubscribeWorkflow<'a> {
    pub(crate) fn new(
        orchestrator: &'a Orchestrator,
        subscription: Subscription,
        requested_id: Option<ObjectId>,
        filters: Option<Value>,
    ) -> Self {
        Self {
            orchestrator,
            subscription,
            requested_id,
            filters,
        }
    }

    fn track_event(&self) -> LifecycleEvent {
        let sub = &self.subscription;
        LifecycleEvent::new(
            EventOp::Unsub,
            sub.application_id.clone(),
            json!({
                "id": self.requested_id,
                "context": sub.context,
                "device_id": sub.device_id,
                "filters": self.filters,
            }),
        )
    }
}

#[async_trait]
impl<'a> Workflow for UnsubscribeWorkflow<'a> {
    type Step = UnsubscribeStep;
    type Output = ();

    fn name(&self) -> &'static str {
        "unsubscribe"
    }

    fn steps(&self) -> &'static [UnsubscribeStep] {
        UNSUBSCRIBE_STEPS
    }

    async fn run_step(&mut self, step: UnsubscribeStep) -> StepOutcome {
        let orch = self.orchestrator;

        match step {
            UnsubscribeStep::Remove => StepOutcome::fatal_on_err(
                orch.registry
                    .remove_subscription(&self.subscription)
                    .await
                    .map_err(|e| match e {
                        PortError::NotFound(_) => GatewayError::SubscriptionNotFound,
                        other => GatewayError::collaborator(other),
                    }),
            ),
            UnsubscribeStep::Track => StepOutcome::tolerate(
                orch.publisher.publish(Topic::Track, &self.track_event()).await,
                orch.config().failure_policy.strict_tracking,
            ),
        }
    }

    fn finish(self) -> GatewayResult<()> {
        Ok(())
    }
}
