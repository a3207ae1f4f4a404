use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::model::{AgentType, Requirement, Task};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendJob {
    pub task_id: String,
    pub workflow_id: String,
    pub target_module: String,
    #[serde(default)]
    pub entity: Option<String>,
    pub story_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontendJob {
    pub task_id: String,
    pub workflow_id: String,
    pub component: String,
    pub story_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestJob {
    pub task_id: String,
    pub workflow_id: String,
    pub target_module: String,
    /// Acceptance criterion ids the generated suite must cover.
    #[serde(default)]
    pub criteria: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityJob {
    pub task_id: String,
    pub workflow_id: String,
    pub target_module: String,
    #[serde(default)]
    pub scan_scope: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfrastructureJob {
    pub task_id: String,
    pub workflow_id: String,
    pub resources: Vec<String>,
}

/// Job data carried through a lane, one shape per capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "capability", rename_all = "kebab-case")]
pub enum JobPayload {
    Backend(BackendJob),
    Frontend(FrontendJob),
    Test(TestJob),
    Security(SecurityJob),
    Infrastructure(InfrastructureJob),
}

impl JobPayload {
    /// Derives the payload for `task` from the task record and its workflow's requirement.
    pub fn for_task(task: &Task, requirement: &Requirement) -> Self {
        let task_id = task.id.clone();
        let workflow_id = task.workflow_id.clone();
        match task.agent_type {
            AgentType::Backend => Self::Backend(BackendJob {
                task_id,
                workflow_id,
                target_module: task.target_module.clone(),
                entity: task.entity.clone(),
                story_ids: task.story_ids.clone(),
            }),
            AgentType::Frontend => Self::Frontend(FrontendJob {
                task_id,
                workflow_id,
                component: task.target_module.clone(),
                story_ids: task.story_ids.clone(),
            }),
            AgentType::Test => Self::Test(TestJob {
                task_id,
                workflow_id,
                target_module: task.target_module.clone(),
                criteria: requirement
                    .acceptance_criteria
                    .iter()
                    .filter(|c| match &c.story_id {
                        Some(story) => task.story_ids.contains(story),
                        None => true,
                    })
                    .map(|c| c.id.clone())
                    .collect(),
            }),
            AgentType::Security => Self::Security(SecurityJob {
                task_id,
                workflow_id,
                target_module: task.target_module.clone(),
                scan_scope: requirement.constraints.clone(),
            }),
            AgentType::Infrastructure => Self::Infrastructure(InfrastructureJob {
                task_id,
                workflow_id,
                resources: if task.target_module.is_empty() {
                    Vec::new()
                } else {
                    vec![task.target_module.clone()]
                },
            }),
        }
    }

    pub fn capability(&self) -> AgentType {
        match self {
            Self::Backend(_) => AgentType::Backend,
            Self::Frontend(_) => AgentType::Frontend,
            Self::Test(_) => AgentType::Test,
            Self::Security(_) => AgentType::Security,
            Self::Infrastructure(_) => AgentType::Infrastructure,
        }
    }

    pub fn task_id(&self) -> &str {
        match self {
            Self::Backend(j) => &j.task_id,
            Self::Frontend(j) => &j.task_id,
            Self::Test(j) => &j.task_id,
            Self::Security(j) => &j.task_id,
            Self::Infrastructure(j) => &j.task_id,
        }
    }

    pub fn workflow_id(&self) -> &str {
        match self {
            Self::Backend(j) => &j.workflow_id,
            Self::Frontend(j) => &j.workflow_id,
            Self::Test(j) => &j.workflow_id,
            Self::Security(j) => &j.workflow_id,
            Self::Infrastructure(j) => &j.workflow_id,
        }
    }

    /// Checks required fields, reporting every missing one.
    pub fn validate(&self) -> CoreResult<()> {
        let mut missing = Vec::new();
        if self.task_id().trim().is_empty() {
            missing.push("task_id".to_string());
        }
        if self.workflow_id().trim().is_empty() {
            missing.push("workflow_id".to_string());
        }
        match self {
            Self::Backend(j) => {
                if j.target_module.trim().is_empty() {
                    missing.push("target_module".to_string());
                }
                if j.story_ids.is_empty() {
                    missing.push("story_ids".to_string());
                }
            }
            Self::Frontend(j) => {
                if j.component.trim().is_empty() {
                    missing.push("component".to_string());
                }
                if j.story_ids.is_empty() {
                    missing.push("story_ids".to_string());
                }
            }
            Self::Test(j) => {
                if j.target_module.trim().is_empty() {
                    missing.push("target_module".to_string());
                }
            }
            Self::Security(j) => {
                if j.target_module.trim().is_empty() {
                    missing.push("target_module".to_string());
                }
            }
            Self::Infrastructure(j) => {
                if j.resources.is_empty() {
                    missing.push("resources".to_string());
                }
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CoreError::missing_fields(missing))
        }
    }

    /// Validates the payload and that it belongs to `task`.
    pub fn validate_for(&self, task: &Task) -> CoreResult<()> {
        if self.capability() != task.agent_type {
            return Err(CoreError::validation(format!(
                "payload capability {} does not match task capability {}",
                self.capability(),
                task.agent_type
            )));
        }
        if self.task_id() != task.id {
            return Err(CoreError::validation(format!(
                "payload task id {} does not match task {}",
                self.task_id(),
                task.id
            )));
        }
        self.validate()
    }
}
