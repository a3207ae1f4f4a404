use serde::{Deserialize, Serialize};

/// Ordered phases of a workflow. Phase numbers are dense from 1.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub phases: Vec<Phase>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub number: u32,
    pub name: String,
    pub task_ids: Vec<String>,
    pub estimated_minutes: u32,
    /// Phases that must fully complete before this one starts.
    pub prerequisites: Vec<u32>,
}

impl ExecutionPlan {
    pub fn phase(&self, number: u32) -> Option<&Phase> {
        self.phases.iter().find(|p| p.number == number)
    }

    pub fn phase_mut(&mut self, number: u32) -> Option<&mut Phase> {
        self.phases.iter_mut().find(|p| p.number == number)
    }

    pub fn total_estimated_minutes(&self) -> u32 {
        self.phases.iter().map(|p| p.estimated_minutes).sum()
    }
}
