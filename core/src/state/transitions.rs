use crate::error::CoreError;
use crate::model::{TaskStatus, WorkflowStatus};

/// Workflow status rules: strictly forward, one gate at a time.
pub struct WorkflowTransition;

impl WorkflowTransition {
    pub fn validate(from: WorkflowStatus, to: WorkflowStatus) -> Result<(), CoreError> {
        if from.is_terminal() {
            return Err(invalid("workflow", from.as_str(), to.as_str()));
        }

        // failed is reachable from any live state
        if to == WorkflowStatus::Failed {
            return Ok(());
        }

        if Self::next(from) == Some(to) {
            Ok(())
        } else {
            Err(invalid("workflow", from.as_str(), to.as_str()))
        }
    }

    pub fn next(current: WorkflowStatus) -> Option<WorkflowStatus> {
        match current {
            WorkflowStatus::Created => Some(WorkflowStatus::Validating),
            WorkflowStatus::Validating => Some(WorkflowStatus::Planning),
            WorkflowStatus::Planning => Some(WorkflowStatus::Executing),
            WorkflowStatus::Executing => Some(WorkflowStatus::Testing),
            WorkflowStatus::Testing => Some(WorkflowStatus::Reviewing),
            WorkflowStatus::Reviewing => Some(WorkflowStatus::Completed),
            WorkflowStatus::Completed | WorkflowStatus::Failed => None,
        }
    }

    pub fn description(status: WorkflowStatus) -> &'static str {
        match status {
            WorkflowStatus::Created => "accepted, not yet validated",
            WorkflowStatus::Validating => "checking requirement completeness",
            WorkflowStatus::Planning => "plan built, tasks materialized",
            WorkflowStatus::Executing => "capability tasks dispatched",
            WorkflowStatus::Testing => "test generation gate",
            WorkflowStatus::Reviewing => "quality and integration gate",
            WorkflowStatus::Completed => "all gates passed",
            WorkflowStatus::Failed => "stopped; artifacts retained",
        }
    }
}

/// Task status rules.
pub struct TaskTransition;

impl TaskTransition {
    pub fn validate(from: TaskStatus, to: TaskStatus) -> Result<(), CoreError> {
        if from.is_terminal() {
            return Err(invalid("task", from.as_str(), to.as_str()));
        }

        let is_valid = match (from, to) {
            (_, TaskStatus::Failed) => true,

            (TaskStatus::Pending, TaskStatus::Assigned) => true,
            (TaskStatus::Pending, TaskStatus::Blocked) => true,

            // released by the coordinator once dependencies complete
            (TaskStatus::Blocked, TaskStatus::Pending) => true,

            (TaskStatus::Assigned, TaskStatus::InProgress) => true,

            (TaskStatus::InProgress, TaskStatus::Completed) => true,
            (TaskStatus::InProgress, TaskStatus::Retry) => true,
            (TaskStatus::InProgress, TaskStatus::Blocked) => true,

            (TaskStatus::Retry, TaskStatus::Assigned) => true,

            _ => false,
        };

        if is_valid {
            Ok(())
        } else {
            Err(invalid("task", from.as_str(), to.as_str()))
        }
    }

    pub fn is_dispatchable(status: TaskStatus) -> bool {
        matches!(status, TaskStatus::Pending | TaskStatus::Retry)
    }
}

fn invalid(entity: &'static str, from: &str, to: &str) -> CoreError {
    CoreError::InvalidTransition {
        entity,
        from: from.to_string(),
        to: to.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_moves_forward_only() {
        assert!(
            WorkflowTransition::validate(WorkflowStatus::Created, WorkflowStatus::Validating)
                .is_ok()
        );
        assert!(
            WorkflowTransition::validate(WorkflowStatus::Executing, WorkflowStatus::Testing)
                .is_ok()
        );
        // no skipping
        assert!(
            WorkflowTransition::validate(WorkflowStatus::Created, WorkflowStatus::Planning)
                .is_err()
        );
        // no going back
        assert!(
            WorkflowTransition::validate(WorkflowStatus::Testing, WorkflowStatus::Executing)
                .is_err()
        );
    }

    #[test]
    fn workflow_can_fail_from_any_live_state() {
        for status in [
            WorkflowStatus::Created,
            WorkflowStatus::Validating,
            WorkflowStatus::Planning,
            WorkflowStatus::Executing,
            WorkflowStatus::Testing,
            WorkflowStatus::Reviewing,
        ] {
            assert!(WorkflowTransition::validate(status, WorkflowStatus::Failed).is_ok());
        }
        assert!(
            WorkflowTransition::validate(WorkflowStatus::Completed, WorkflowStatus::Failed)
                .is_err()
        );
    }

    #[test]
    fn task_transitions() {
        assert!(TaskTransition::validate(TaskStatus::Pending, TaskStatus::Assigned).is_ok());
        assert!(TaskTransition::validate(TaskStatus::Assigned, TaskStatus::InProgress).is_ok());
        assert!(TaskTransition::validate(TaskStatus::InProgress, TaskStatus::Retry).is_ok());
        assert!(TaskTransition::validate(TaskStatus::Retry, TaskStatus::Assigned).is_ok());
        assert!(TaskTransition::validate(TaskStatus::Pending, TaskStatus::Completed).is_err());
        assert!(TaskTransition::validate(TaskStatus::Completed, TaskStatus::Pending).is_err());
        assert!(TaskTransition::validate(TaskStatus::Failed, TaskStatus::Retry).is_err());
    }

    #[test]
    fn next_workflow_status() {
        assert_eq!(
            WorkflowTransition::next(WorkflowStatus::Reviewing),
            Some(WorkflowStatus::Completed)
        );
        assert_eq!(WorkflowTransition::next(WorkflowStatus::Failed), None);
    }
}
