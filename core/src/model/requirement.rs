use serde::{Deserialize, Serialize};

use super::task::TaskPriority;
use crate::error::CoreError;

/// Structured requirement document produced by the (external) requirement parser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub user_stories: Vec<UserStory>,
    #[serde(default)]
    pub acceptance_criteria: Vec<AcceptanceCriterion>,
    /// Domain entities touched by the feature; each may have a registered contract.
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStory {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceCriterion {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub story_id: Option<String>,
}

impl Requirement {
    /// Structural completeness check. Collects every gap before failing.
    pub fn validate(&self) -> Result<(), CoreError> {
        let mut missing = Vec::new();
        if self.id.trim().is_empty() {
            missing.push("id".to_string());
        }
        if self.title.trim().is_empty() {
            missing.push("title".to_string());
        }
        if self.user_stories.is_empty() {
            missing.push("user_stories".to_string());
        }
        if self.acceptance_criteria.is_empty() {
            missing.push("acceptance_criteria".to_string());
        }
        for (idx, story) in self.user_stories.iter().enumerate() {
            if story.id.trim().is_empty() {
                missing.push(format!("user_stories[{idx}].id"));
            }
            if story.title.trim().is_empty() {
                missing.push(format!("user_stories[{idx}].title"));
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(CoreError::missing_fields(missing))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_requirement_reports_every_gap() {
        let err = Requirement::default().validate().unwrap_err();
        let CoreError::Validation { fields, .. } = err else {
            panic!("expected validation error");
        };
        assert_eq!(
            fields,
            vec!["id", "title", "user_stories", "acceptance_criteria"]
        );
    }

    #[test]
    fn story_fields_are_checked() {
        let req = Requirement {
            id: "r1".into(),
            title: "Checkout".into(),
            user_stories: vec![UserStory::default()],
            acceptance_criteria: vec![AcceptanceCriterion {
                id: "ac1".into(),
                description: "works".into(),
                story_id: None,
            }],
            ..Default::default()
        };
        let CoreError::Validation { fields, .. } = req.validate().unwrap_err() else {
            panic!("expected validation error");
        };
        assert_eq!(fields, vec!["user_stories[0].id", "user_stories[0].title"]);
    }

    #[test]
    fn unknown_story_priority_falls_back_to_medium() {
        let req: Requirement = serde_json::from_str(
            r#"{
                "id": "r1",
                "title": "Checkout",
                "user_stories": [
                    {"id": "US-1", "title": "pay", "priority": "urgent"},
                    {"id": "US-2", "title": "refund", "priority": "HIGH"}
                ],
                "acceptance_criteria": [{"id": "AC-1", "description": "paid"}]
            }"#,
        )
        .unwrap();
        assert_eq!(req.user_stories[0].priority, Some(TaskPriority::Medium));
        assert_eq!(req.user_stories[1].priority, Some(TaskPriority::High));
        assert!(req.validate().is_ok());
    }
}
