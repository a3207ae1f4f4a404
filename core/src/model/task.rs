use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::capability::AgentType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Failed,
    Blocked,
    Retry,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
            Self::Retry => "retry",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deserializes leniently: unknown labels become `Medium`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl TaskPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Dispatch score. Higher scores are released first.
    pub fn score(self) -> u32 {
        match self {
            Self::Critical => 100,
            Self::High => 50,
            Self::Medium => 25,
            Self::Low => 10,
        }
    }

    /// Lenient parse used for untyped inputs; unknown values fall back to `Medium`.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "critical" => Self::Critical,
            "high" => Self::High,
            "low" => Self::Low,
            _ => Self::Medium,
        }
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TaskPriority {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse_lenient(&raw))
    }
}

/// One dispatchable unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub workflow_id: String,
    pub agent_type: AgentType,
    pub title: String,
    /// Execution plan phase this task belongs to (1-based).
    pub phase: u32,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    /// Predecessor task ids; all must be `completed` before assignment.
    pub dependencies: Vec<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Module the generated artifact targets; drives purity classification.
    pub target_module: String,
    /// Entity whose contract governs the emitted code, if any.
    pub entity: Option<String>,
    pub story_ids: Vec<String>,
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(workflow_id: impl Into<String>, agent_type: AgentType, title: impl Into<String>) -> Self {
        Self {
            id: super::new_id(),
            workflow_id: workflow_id.into(),
            agent_type,
            title: title.into(),
            phase: 1,
            status: TaskStatus::Pending,
            priority: TaskPriority::default(),
            dependencies: Vec::new(),
            retry_count: 0,
            max_retries: 3,
            target_module: String::new(),
            entity: None,
            story_ids: Vec::new(),
            error: None,
            metadata: BTreeMap::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependencies(mut self, deps: Vec<String>) -> Self {
        self.dependencies = deps;
        self
    }

    pub fn with_target_module(mut self, module: impl Into<String>) -> Self {
        self.target_module = module.into();
        self
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_scores_are_ordered() {
        assert!(TaskPriority::Critical.score() > TaskPriority::High.score());
        assert!(TaskPriority::High.score() > TaskPriority::Medium.score());
        assert!(TaskPriority::Medium.score() > TaskPriority::Low.score());
        assert_eq!(TaskPriority::parse_lenient("urgent").score(), 25);
    }

    #[test]
    fn status_serializes_kebab_case() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"in-progress\"");
    }

    #[test]
    fn priority_round_trips_its_label() {
        assert_eq!(TaskPriority::High.as_str(), "high");
        assert_eq!(TaskPriority::Critical.to_string(), "critical");
        let parsed: TaskPriority = serde_json::from_str("\"critical\"").unwrap();
        assert_eq!(parsed, TaskPriority::Critical);
    }

    #[test]
    fn unknown_priority_label_deserializes_as_medium() {
        let parsed: TaskPriority = serde_json::from_str("\"urgent\"").unwrap();
        assert_eq!(parsed, TaskPriority::Medium);
    }
}
