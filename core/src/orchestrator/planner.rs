use std::collections::{BTreeMap, HashSet};

use crate::error::{CoreError, CoreResult};
use crate::model::{AgentType, ExecutionPlan, Phase, Requirement, Task, TaskPriority, UserStory};

/// (name, prerequisites, minutes per story)
const PHASES: [(&str, &[u32], u32); 5] = [
    ("capability-development", &[], 30),
    ("dependent-capability-development", &[1], 20),
    ("test-generation", &[1, 2], 15),
    ("quality-validation", &[3], 10),
    ("integration", &[3, 4], 10),
];

/// Builds the fixed five-phase plan; task ids are filled in after chunking.
pub fn build_plan(requirement: &Requirement) -> ExecutionPlan {
    let stories = requirement.user_stories.len().max(1) as u32;
    let phases = PHASES
        .iter()
        .enumerate()
        .map(|(idx, (name, prerequisites, per_story))| Phase {
            number: idx as u32 + 1,
            name: (*name).to_string(),
            task_ids: Vec::new(),
            estimated_minutes: per_story * stories,
            prerequisites: prerequisites.to_vec(),
        })
        .collect();
    ExecutionPlan { phases }
}

/// Phases must be numbered `1..=n` and their prerequisites must form a DAG.
pub fn validate_plan(plan: &ExecutionPlan) -> CoreResult<()> {
    for (idx, phase) in plan.phases.iter().enumerate() {
        let expected = idx as u32 + 1;
        if phase.number != expected {
            return Err(CoreError::validation(format!(
                "phase numbering is not dense: expected {expected}, found {}",
                phase.number
            )));
        }
    }

    let known: HashSet<u32> = plan.phases.iter().map(|p| p.number).collect();
    for phase in &plan.phases {
        for prerequisite in &phase.prerequisites {
            if !known.contains(prerequisite) {
                return Err(CoreError::not_found("phase", prerequisite.to_string()));
            }
        }
    }

    // Kahn over phases
    let mut remaining: BTreeMap<u32, HashSet<u32>> = plan
        .phases
        .iter()
        .map(|p| (p.number, p.prerequisites.iter().copied().collect()))
        .collect();
    while !remaining.is_empty() {
        let ready: Vec<u32> = remaining
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(n, _)| *n)
            .collect();
        if ready.is_empty() {
            let cycle: Vec<String> = remaining.keys().map(|n| n.to_string()).collect();
            return Err(CoreError::CycleDetected(format!(
                "phases {}",
                cycle.join(" -> ")
            )));
        }
        for n in ready {
            remaining.remove(&n);
            for deps in remaining.values_mut() {
                deps.remove(&n);
            }
        }
    }
    Ok(())
}

/// Splits stories into work units of `chunk_size` and derives one chained task per unit.
pub fn derive_phase_one_tasks(
    workflow_id: &str,
    requirement: &Requirement,
    agent_type: AgentType,
    chunk_size: usize,
    max_retries: u32,
) -> Vec<Task> {
    let base = module_base(requirement);
    let mut tasks: Vec<Task> = Vec::new();

    for (idx, chunk) in requirement.user_stories.chunks(chunk_size.max(1)).enumerate() {
        let entity = if requirement.entities.is_empty() {
            None
        } else {
            Some(requirement.entities[idx % requirement.entities.len()].clone())
        };
        let module = match &entity {
            Some(entity) => target_module(agent_type, &slug(entity)),
            None => target_module(agent_type, &base),
        };
        let titles: Vec<&str> = chunk.iter().map(|s| s.title.as_str()).collect();

        let mut task = Task::new(
            workflow_id,
            agent_type,
            format!("{} unit {}: {}", agent_type, idx + 1, titles.join("; ")),
        )
        .with_priority(chunk_priority(chunk))
        .with_target_module(module);
        if let Some(entity) = entity {
            task = task.with_entity(entity);
        }
        if let Some(prev) = tasks.last() {
            task = task.with_dependencies(vec![prev.id.clone()]);
        }
        task.max_retries = max_retries;
        task.story_ids = chunk.iter().map(|s| s.id.clone()).collect();
        task.metadata
            .insert("chunk_index".into(), serde_json::json!(idx));
        task.metadata
            .insert("story_titles".into(), serde_json::json!(titles));
        tasks.push(task);
    }
    tasks
}

/// Highest story priority in the chunk, medium when none is given.
fn chunk_priority(chunk: &[UserStory]) -> TaskPriority {
    chunk
        .iter()
        .filter_map(|s| s.priority)
        .max()
        .unwrap_or_default()
}

fn target_module(agent_type: AgentType, base: &str) -> String {
    let suffix = match agent_type {
        AgentType::Backend => "service",
        AgentType::Frontend => "component",
        AgentType::Test => "tests",
        AgentType::Security => "audit",
        AgentType::Infrastructure => "infra",
    };
    format!("{base}_{suffix}")
}

fn module_base(requirement: &Requirement) -> String {
    let from_title = slug(&requirement.title);
    if from_title.is_empty() {
        slug(&requirement.id)
    } else {
        from_title
    }
}

fn slug(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.ends_with('_') && !out.is_empty() {
            out.push('_');
        }
    }
    out.trim_end_matches('_').to_string()
}
