use crate::error::{GatewayError, GatewayResult, PortError};
use crate::orchestrator::Orchestrator;
use crate::pipeline::{PipelineStep, StepOutcome, Workflow};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use syncgate_types::{ApplicationId, EventOp, LifecycleEvent, Principal, Topic};

/// Steps of the create workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStep {
    /// Looks up the acting account and stamps `user_id` on the object.
    ResolveAccount,
    PublishMutation,
    PublishTrack,
}

impl PipelineStep for MutationStep {
    fn name(&self) -> &'static str {
        match self {
            MutationStep::ResolveAccount => "resolve_account",
            MutationStep::PublishMutation => "publish_mutation",
            MutationStep::PublishTrack => "publish_track",
        }
    }
}

const CREATE_STEPS: &[MutationStep] = &[
    MutationStep::ResolveAccount,
    MutationStep::PublishMutation,
    MutationStep::PublishTrack,
];

/// Steps of the update and delete workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStep {
    PublishMutation,
    PublishTrack,
}

impl PipelineStep for PublishStep {
    fn name(&self) -> &'static str {
        match self {
            PublishStep::PublishMutation => "publish_mutation",
            PublishStep::PublishTrack => "publish_track",
        }
    }
}

const PUBLISH_STEPS: &[PublishStep] = &[PublishStep::PublishMutation, PublishStep::PublishTrack];

/// Create: the same `add` event goes to both topics once the owner is known.
pub(crate) struct CreateWorkflow<'a> {
    orchestrator: &'a Orchestrator,
    application_id: ApplicationId,
    principal: &'a Principal,
    content: Map<String, Value>,
}

impl<'a> CreateWorkflow<'a> {
    pub(crate) fn new(
        orchestrator: &'a Orchestrator,
        application_id: ApplicationId,
        principal: &'a Principal,
        content: Map<String, Value>,
    ) -> Self {
        Self {
            orchestrator,
            application_id,
            principal,
            content,
        }
    }

    fn event(&self) -> LifecycleEvent {
        LifecycleEvent::new(
            EventOp::Add,
            self.application_id.clone(),
            Value::Object(self.content.clone()),
        )
        .with_admin(self.principal.is_admin)
    }
}

#[async_trait]
impl<'a> Workflow for CreateWorkflow<'a> {
    type Step = MutationStep;
    type Output = Value;

    fn name(&self) -> &'static str {
        "create"
    }

    fn steps(&self) -> &'static [MutationStep] {
        CREATE_STEPS
    }

    async fn run_step(&mut self, step: MutationStep) -> StepOutcome {
        let orch = self.orchestrator;

        match step {
            MutationStep::ResolveAccount => {
                let email = self.principal.email.as_str();
                let found = if self.principal.is_admin {
                    orch.accounts.find_admin(email).await
                } else {
                    orch.accounts.find_user(email).await
                };
                match found {
                    Ok(user_id) => {
                        self.content.insert("user_id".into(), json!(user_id));
                        StepOutcome::Continue
                    }
                    Err(PortError::NotFound(_)) => {
                        StepOutcome::Fatal(GatewayError::AccountNotFound(email.to_string()))
                    }
                    Err(other) => StepOutcome::Fatal(GatewayError::collaborator(other)),
                }
            }
            MutationStep::PublishMutation => StepOutcome::fatal_on_err(
                orch.publisher.publish(Topic::Mutation, &self.event()).await,
            ),
            MutationStep::PublishTrack => StepOutcome::tolerate(
                orch.publisher.publish(Topic::Track, &self.event()).await,
                orch.config().failure_policy.strict_tracking,
            ),
        }
    }

    fn finish(self) -> GatewayResult<Value> {
        Ok(Value::Object(self.content))
    }
}

/// Update and delete: one prepared event per topic, mutation first.
pub(crate) struct PublishWorkflow<'a> {
    name: &'static str,
    orchestrator: &'a Orchestrator,
    mutation: LifecycleEvent,
    track: LifecycleEvent,
}

impl<'a> PublishWorkflow<'a> {
    pub(crate) fn new(
        name: &'static str,
        orchestrator: &'a Orchestrator,
        mutation: LifecycleEvent,
        track: LifecycleEvent,
    ) -> Self {
        Self {
            name,
            orchestrator,
            mutation,
            track,
        }
    }
}

#[async_trait]
impl<'a> Workflow for PublishWorkflow<'a> {
    type Step = PublishStep;
    type Output = ();

    fn name(&self) -> &'static str {
        self.name
    }

    fn steps(&self) -> &'static [PublishStep] {
        PUBLISH_STEPS
    }

    async fn run_step(&mut self, step: PublishStep) -> StepOutcome {
        let orch = self.orchestrator;

        match step {
            PublishStep::PublishMutation => StepOutcome::fatal_on_err(
                orch.publisher.publish(Topic::Mutation, &self.mutation).await,
            ),
            PublishStep::PublishTrack => StepOutcome::tolerate(
                orch.publisher.publish(Topic::Track, &self.track).await,
                orch.config().failure_policy.strict_tracking,
            ),
        }
    }

    fn finish(self) -> GatewayResult<()> {
        Ok(())
    }
}
