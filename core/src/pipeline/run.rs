use chrono::Utc;
use serde_json::{json, Value};

use crate::error::{CoreError, CoreResult};
use crate::model::{
    new_id, Artifact, AuditLogEntry, AuditOutcome, Explanation, GenerationResult, PipelineStage,
    StageFailure, Task, ValidationResults,
};
use crate::queue::JobPayload;
use crate::util::with_timeout;

use super::collaborators::Severity;
use super::context::AgentExecutionContext;
use super::executor::{CapabilityExecutor, ExecutionRequest};

/// Progress of one attempt. Every state may move to `Failed`, which ends the attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Bound,
    ContractLoaded,
    ContractSkipped,
    FailureModeDeclared,
    FailureModeWarned,
    ExplanationAccepted,
    EmissionAuthorized,
    ContractConformant,
    InvariantsHold,
    PureOrExempt,
    Stored,
    Failed { stage: PipelineStage, reason: String },
}

/// Runs the eight gated stages for `task` and persists the outcome.
///
/// Stage failures come back as `Ok` with `success == false`; the partial audit
/// trail is stored either way. `Err` means the run could not start (no bound
/// context) or the outcome could not be persisted.
pub async fn run_pipeline(
    context: Option<&AgentExecutionContext>,
    executor: &dyn CapabilityExecutor,
    task: &Task,
    payload: &JobPayload,
) -> CoreResult<GenerationResult> {
    let Some(ctx) = context else {
        return Err(CoreError::Config(format!(
            "pipeline for task {} invoked before its context was bound",
            task.id
        )));
    };

    let mut run = Run::new(ctx, executor, task, payload);
    let outcome = run.execute().await;
    run.finish(outcome).await
}

struct Run<'a> {
    ctx: &'a AgentExecutionContext,
    executor: &'a dyn CapabilityExecutor,
    request: ExecutionRequest,
    state: PipelineState,
    results: ValidationResults,
    explanation: Option<Explanation>,
    accepted_explanation: Option<String>,
    audit: Vec<AuditLogEntry>,
}

impl<'a> Run<'a> {
    fn new(
        ctx: &'a AgentExecutionContext,
        executor: &'a dyn CapabilityExecutor,
        task: &Task,
        payload: &JobPayload,
    ) -> Self {
        Self {
            ctx,
            executor,
            request: ExecutionRequest {
                task: task.clone(),
                payload: payload.clone(),
                contract: None,
                failure_modes: None,
            },
            state: PipelineState::Bound,
            results: ValidationResults::default(),
            explanation: None,
            accepted_explanation: None,
            audit: Vec::new(),
        }
    }

    async fn execute(&mut self) -> Result<Artifact, StageFailure> {
        self.bind()?;
        self.load_contract().await?;
        self.declare_failure_modes().await;
        self.accept_explanation().await?;
        self.authorize_emission().await?;
        let artifact = self.check_conformance().await?;
        self.check_invariants(&artifact)?;
        self.check_purity(&artifact)?;
        Ok(artifact)
    }

    fn bind(&mut self) -> Result<(), StageFailure> {
        let stage = PipelineStage::ContextBind;
        let task = &self.request.task;
        if self.executor.capability() != task.agent_type
            || self.request.payload.capability() != task.agent_type
        {
            let reason = format!(
                "executor {} / payload {} cannot run a {} task",
                self.executor.capability(),
                self.request.payload.capability(),
                task.agent_type
            );
            return Err(self.fail(stage, reason, false));
        }
        let details = json!({
            "contracts": self.ctx.contracts.name(),
            "failure_modes": self.ctx.failure_modes.name(),
            "invariants": self.ctx.invariants.names(),
            "capability": task.agent_type,
        });
        self.pass(stage, PipelineState::Bound, "collaborators bound", details);
        Ok(())
    }

    async fn load_contract(&mut self) -> Result<(), StageFailure> {
        let stage = PipelineStage::ContractLoad;
        let require = self.ctx.require_contract;
        let Some(entity) = self.request.task.entity.clone() else {
            if require {
                return Err(self.fail(stage, "task names no entity to load a contract for", false));
            }
            self.warn(stage, PipelineState::ContractSkipped, "no entity; contract skipped", Value::Null);
            return Ok(());
        };

        match self.ctx.contracts.get_contract(&entity).await {
            Ok(Some(contract)) => {
                let details = json!({ "entity": entity, "required_fields": contract.required_fields });
                self.request.contract = Some(contract);
                self.pass(stage, PipelineState::ContractLoaded, "contract loaded", details);
                Ok(())
            }
            Ok(None) if require => Err(self.fail(
                stage,
                format!("no contract registered for {entity}"),
                false,
            )),
            Ok(None) => {
                self.warn(
                    stage,
                    PipelineState::ContractSkipped,
                    "no contract registered; conformance will pass through",
                    json!({ "entity": entity }),
                );
                Ok(())
            }
            Err(e) if require => {
                let retryable = e.is_retryable();
                Err(self.fail(stage, format!("contract lookup failed: {e}"), retryable))
            }
            Err(e) => {
                self.warn(
                    stage,
                    PipelineState::ContractSkipped,
                    "contract lookup failed; skipped",
                    json!({ "entity": entity, "error": e.to_string() }),
                );
                Ok(())
            }
        }
    }

    // Never fails the attempt; gaps are recorded as warnings.
    async fn declare_failure_modes(&mut self) {
        let stage = PipelineStage::FailureModeDeclaration;
        let feature = self.request.task.target_module.clone();
        match self.ctx.failure_modes.get_failure_modes(&feature).await {
            Ok(Some(spec)) => {
                let missing = spec.missing_parts();
                self.request.failure_modes = Some(spec);
                if missing.is_empty() {
                    self.pass(
                        stage,
                        PipelineState::FailureModeDeclared,
                        "failure modes declared",
                        json!({ "feature": feature }),
                    );
                } else {
                    self.warn(
                        stage,
                        PipelineState::FailureModeWarned,
                        "failure-mode declaration incomplete",
                        json!({ "feature": feature, "missing": missing }),
                    );
                }
            }
            Ok(None) => self.warn(
                stage,
                PipelineState::FailureModeWarned,
                "no failure modes declared",
                json!({ "feature": feature }),
            ),
            Err(e) => self.warn(
                stage,
                PipelineState::FailureModeWarned,
                "failure-mode lookup failed",
                json!({ "feature": feature, "error": e.to_string() }),
            ),
        }
    }

    async fn accept_explanation(&mut self) -> Result<(), StageFailure> {
        let stage = PipelineStage::Explanation;
        let produced = with_timeout(
            "produce_explanation",
            self.ctx.generation_timeout,
            self.executor.produce_explanation(&self.request),
        )
        .await;
        let draft = match produced {
            Ok(draft) => draft,
            Err(e) => {
                let retryable = e.is_retryable();
                return Err(self.fail(stage, format!("explanation request failed: {e}"), retryable));
            }
        };

        let missing = self.ctx.explanations.missing_sections(&draft);
        let explanation = Explanation {
            id: new_id(),
            task_id: self.request.task.id.clone(),
            approach: draft.approach,
            sections: draft.sections,
            complete: missing.is_empty(),
            missing_sections: missing.clone(),
            created_at: Utc::now(),
        };
        self.explanation = Some(explanation.clone());
        if !explanation.complete {
            return Err(self.fail(
                stage,
                format!("explanation incomplete; missing {}", missing.join(", ")),
                false,
            ));
        }

        let id = match self.ctx.ledger.record(explanation).await {
            Ok(id) => id,
            Err(e) => return Err(self.fail(stage, format!("explanation not recorded: {e}"), false)),
        };
        self.results.explanation_complete = true;
        self.pass(
            stage,
            PipelineState::ExplanationAccepted,
            "explanation accepted",
            json!({ "explanation_id": id }),
        );
        self.accepted_explanation = Some(id);
        Ok(())
    }

    async fn authorize_emission(&mut self) -> Result<(), StageFailure> {
        let stage = PipelineStage::EmissionPermission;
        let Some(id) = self.accepted_explanation.clone() else {
            return Err(self.fail(stage, "no accepted explanation to authorize against", false));
        };
        let granted = match self.ctx.ledger.authorize(&id, &self.request.task.id).await {
            Ok(granted) => granted,
            Err(e) => return Err(self.fail(stage, format!("emission refused: {e}"), false)),
        };
        self.pass(
            stage,
            PipelineState::EmissionAuthorized,
            "emission authorized",
            json!({ "explanation_id": id, "sections": granted.sections.len() }),
        );
        // artifacts are generated against the ledger's copy
        self.explanation = Some(granted);
        Ok(())
    }

    async fn check_conformance(&mut self) -> Result<Artifact, StageFailure> {
        let stage = PipelineStage::ContractConformance;
        let Some(explanation) = self.explanation.clone() else {
            return Err(self.fail(stage, "artifact requested without explanation", false));
        };
        let generated = with_timeout(
            "generate_artifact",
            self.ctx.generation_timeout,
            self.executor.generate_artifact(&self.request, &explanation),
        )
        .await;
        let artifact = match generated {
            Ok(artifact) => artifact,
            Err(e) => {
                let retryable = e.is_retryable();
                return Err(self.fail(stage, format!("artifact generation failed: {e}"), retryable));
            }
        };

        match self.request.contract.clone() {
            Some(contract) => {
                let violations = self.ctx.conformance.violations(&contract, &artifact.code);
                if !violations.is_empty() {
                    return Err(self.fail_with(
                        stage,
                        format!("{} contract violation(s)", violations.len()),
                        false,
                        json!({ "violations": violations }),
                    ));
                }
                self.results.contract_valid = true;
                self.pass(
                    stage,
                    PipelineState::ContractConformant,
                    "required fields present",
                    json!({ "module": artifact.module_name }),
                );
            }
            None => {
                self.results.contract_valid = true;
                self.pass(
                    stage,
                    PipelineState::ContractConformant,
                    "no contract loaded; passed through",
                    json!({ "module": artifact.module_name }),
                );
            }
        }
        Ok(artifact)
    }

    fn check_invariants(&mut self, artifact: &Artifact) -> Result<(), StageFailure> {
        let stage = PipelineStage::InvariantCheck;
        let violations = self.ctx.invariants.evaluate(&super::collaborators::InvariantState {
            task: &self.request.task,
            explanation: self.explanation.as_ref(),
            artifact: Some(artifact),
        });

        let (critical, minor): (Vec<_>, Vec<_>) = violations
            .into_iter()
            .partition(|v| v.severity == Severity::Critical);
        for v in &minor {
            self.record(
                stage,
                AuditOutcome::Warning,
                &v.message,
                json!({ "invariant": v.invariant }),
            );
        }
        if !critical.is_empty() {
            let names: Vec<&str> = critical.iter().map(|v| v.invariant.as_str()).collect();
            return Err(self.fail_with(
                stage,
                format!("critical invariant(s) violated: {}", names.join(", ")),
                false,
                json!({ "violations": critical }),
            ));
        }
        self.results.invariants_hold = true;
        self.pass(
            stage,
            PipelineState::InvariantsHold,
            "invariants hold",
            json!({ "warnings": minor.len() }),
        );
        Ok(())
    }

    fn check_purity(&mut self, artifact: &Artifact) -> Result<(), StageFailure> {
        let stage = PipelineStage::PurityCheck;
        let report = self.ctx.purity.check(&artifact.module_name, &artifact.code);
        if !report.is_clean() {
            return Err(self.fail_with(
                stage,
                report.violations.join("; "),
                false,
                json!({ "kind": report.kind, "violations": report.violations }),
            ));
        }
        self.results.purity_valid = true;
        self.pass(
            stage,
            PipelineState::PureOrExempt,
            "purity rules satisfied",
            json!({ "kind": report.kind }),
        );
        Ok(())
    }

    async fn finish(mut self, outcome: Result<Artifact, StageFailure>) -> CoreResult<GenerationResult> {
        let task = &self.request.task;
        let (success, module_name, code, failure) = match outcome {
            Ok(artifact) => (true, Some(artifact.module_name), Some(artifact.code), None),
            Err(failure) => (false, Some(task.target_module.clone()), None, Some(failure)),
        };

        if success {
            self.record(
                PipelineStage::Persist,
                AuditOutcome::Success,
                "generation result stored",
                Value::Null,
            );
            self.state = PipelineState::Stored;
        }

        let task = &self.request.task;
        let result = GenerationResult {
            id: new_id(),
            task_id: task.id.clone(),
            workflow_id: task.workflow_id.clone(),
            success,
            explanation_id: self.accepted_explanation.clone(),
            module_name,
            code,
            validation_results: self.results,
            failure,
            audit_log: self.audit,
            created_at: Utc::now(),
        };

        self.ctx.store.insert_generation_result(&result).await?;
        self.ctx.store.append_audit_logs(&result.audit_log).await?;

        match &result.failure {
            None => tracing::info!(
                target: "forgeflow.pipeline",
                task_id = %result.task_id,
                result_id = %result.id,
                stages = result.audit_log.len(),
                state = ?self.state,
                "pipeline succeeded"
            ),
            Some(f) => tracing::warn!(
                target: "forgeflow.pipeline",
                task_id = %result.task_id,
                result_id = %result.id,
                stage = %f.stage,
                retryable = f.retryable,
                reason = %f.reason,
                state = ?self.state,
                "pipeline stopped"
            ),
        }
        Ok(result)
    }

    fn pass(&mut self, stage: PipelineStage, state: PipelineState, message: &str, details: Value) {
        self.record(stage, AuditOutcome::Success, message, details);
        self.state = state;
    }

    fn warn(&mut self, stage: PipelineStage, state: PipelineState, message: &str, details: Value) {
        self.record(stage, AuditOutcome::Warning, message, details);
        self.state = state;
    }

    fn fail(&mut self, stage: PipelineStage, reason: impl Into<String>, retryable: bool) -> StageFailure {
        self.fail_with(stage, reason, retryable, Value::Null)
    }

    fn fail_with(
        &mut self,
        stage: PipelineStage,
        reason: impl Into<String>,
        retryable: bool,
        details: Value,
    ) -> StageFailure {
        let reason = reason.into();
        self.record(stage, AuditOutcome::Failure, &reason, details);
        self.state = PipelineState::Failed {
            stage,
            reason: reason.clone(),
        };
        StageFailure {
            stage,
            reason,
            retryable,
        }
    }

    fn record(&mut self, stage: PipelineStage, outcome: AuditOutcome, message: &str, details: Value) {
        tracing::debug!(
            target: "forgeflow.pipeline",
            task_id = %self.request.task.id,
            stage = %stage,
            outcome = ?outcome,
            message,
            "stage recorded"
        );
        self.audit.push(AuditLogEntry {
            id: new_id(),
            task_id: self.request.task.id.clone(),
            stage,
            outcome,
            message: message.to_string(),
            details,
            timestamp: Utc::now(),
        });
    }
}
