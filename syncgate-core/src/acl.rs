//! ACL gate: maps each operation to the capability it needs and asks the
//! external evaluator before any workflow step runs.

use crate::error::{GatewayError, GatewayResult};
use crate::ports::AccessEvaluator;
use std::sync::Arc;
use syncgate_types::{ApplicationId, Capability, Operation, Principal};
use tracing::debug;

/// Capability required by an operation.
pub fn required_capability(operation: Operation) -> Capability {
    match operation {
        Operation::Subscribe | Operation::Unsubscribe => Capability::Read,
        Operation::Create | Operation::Update | Operation::Delete => Capability::Write,
        Operation::Count => Capability::MetaRead,
    }
}

/// Checks operations against an [`AccessEvaluator`].
pub struct AclGate {
    evaluator: Arc<dyn AccessEvaluator>,
}

impl AclGate {
    pub fn new(evaluator: Arc<dyn AccessEvaluator>) -> Self {
        Self { evaluator }
    }

    /// `Ok(())` when allowed, [`GatewayError::PermissionDenied`] when the
    /// evaluator says no. Evaluator failures are collaborator errors.
    pub async fn authorize(
        &self,
        operation: Operation,
        application_id: &ApplicationId,
        model: &str,
        principal: &Principal,
    ) -> GatewayResult<()> {
        let capability = required_capability(operation);
        let allowed = self
            .evaluator
            .check(capability, application_id, model, principal)
            .await
            .map_err(GatewayError::collaborator)?;

        if allowed {
            Ok(())
        } else {
            debug!(%operation, %capability, model, email = %principal.email, "acl denied");
            Err(GatewayError::PermissionDenied {
                capability,
                model: model.to_string(),
            })
        }
    }
}
