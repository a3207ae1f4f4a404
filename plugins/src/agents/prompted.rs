use std::sync::Arc;

use async_trait::async_trait;
use forgeflow_core::api::{
    AgentType, Artifact, CapabilityExecutor, CoreError, CoreResult, ExecutionRequest, Explanation,
    ExplanationDraft, JobPayload, TextGenerator,
};

/// Capability executor that turns a job into two generator prompts.
///
/// The first prompt asks for an explanation (JSON, or markdown with `##`
/// headings); the second asks for code and is only sent once the pipeline
/// has accepted that explanation.
pub struct PromptedExecutor {
    capability: AgentType,
    generator: Arc<dyn TextGenerator>,
    sections: Vec<String>,
}

impl PromptedExecutor {
    pub fn new(
        capability: AgentType,
        generator: Arc<dyn TextGenerator>,
        sections: Vec<String>,
    ) -> Self {
        Self {
            capability,
            generator,
            sections,
        }
    }

    fn role(&self) -> &'static str {
        match self.capability {
            AgentType::Backend => "You implement backend service modules.",
            AgentType::Frontend => "You implement user interface components.",
            AgentType::Test => "You write automated tests for acceptance criteria.",
            AgentType::Security => "You write security checks and hardening code.",
            AgentType::Infrastructure => "You write infrastructure definitions.",
        }
    }

    fn headers(&self, mode: &str, request: &ExecutionRequest) -> String {
        let task = &request.task;
        let mut out = format!("MODE: {mode}\nMODULE: {}\n", task.target_module);
        if let Some(entity) = &task.entity {
            out.push_str(&format!("ENTITY: {entity}\n"));
        }
        if let Some(contract) = &request.contract {
            out.push_str(&format!("FIELDS: {}\n", contract.required_fields.join(", ")));
        }
        out.push_str(&format!("SECTIONS: {}\n", self.sections.join(", ")));
        out
    }

    fn job_details(payload: &JobPayload) -> String {
        match payload {
            JobPayload::Backend(job) => format!("User stories: {}", job.story_ids.join(", ")),
            JobPayload::Frontend(job) => format!(
                "Component: {}\nUser stories: {}",
                job.component,
                job.story_ids.join(", ")
            ),
            JobPayload::Test(job) => format!("Acceptance criteria: {}", job.criteria.join(", ")),
            JobPayload::Security(job) => format!("Scan scope: {}", job.scan_scope.join(", ")),
            JobPayload::Infrastructure(job) => format!("Resources: {}", job.resources.join(", ")),
        }
    }

    fn explanation_prompt(&self, request: &ExecutionRequest) -> String {
        let mut prompt = self.headers("explanation", request);
        prompt.push('\n');
        prompt.push_str(&format!("Task: {}\n", request.task.title));
        prompt.push_str(&Self::job_details(&request.payload));
        prompt.push('\n');
        if let Some(spec) = &request.failure_modes {
            for mode in &spec.modes {
                prompt.push_str(&format!(
                    "Failure mode {}: on {} then {}\n",
                    mode.name, mode.trigger, mode.handling
                ));
            }
        }
        prompt.push_str(
            "\nBefore writing any code, explain your approach. Answer with JSON \
             {\"approach\": ..., \"sections\": {...}} covering every listed section.\n",
        );
        prompt
    }

    fn code_prompt(&self, request: &ExecutionRequest, explanation: &Explanation) -> String {
        let mut prompt = self.headers("code", request);
        prompt.push('\n');
        prompt.push_str(&format!("Task: {}\n", request.task.title));
        prompt.push_str(&Self::job_details(&request.payload));
        prompt.push_str(&format!("\nApproved approach: {}\n", explanation.approach));
        for (name, body) in &explanation.sections {
            prompt.push_str(&format!("{name}: {body}\n"));
        }
        prompt.push_str("\nWrite the module. Reply with code only.\n");
        prompt
    }
}

/// Accepts `{"approach", "sections"}` JSON anywhere in the reply, else `##` markdown sections.
fn parse_explanation(raw: &str) -> ExplanationDraft {
    if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) {
        if start < end {
            if let Ok(draft) = serde_json::from_str::<ExplanationDraft>(&raw[start..=end]) {
                return draft;
            }
        }
    }

    let mut draft = ExplanationDraft::default();
    let mut current: Option<String> = None;
    let mut body = String::new();
    for line in raw.lines() {
        if let Some(heading) = line.trim().strip_prefix("## ") {
            flush_section(current.take(), &mut body, &mut draft);
            current = Some(heading.trim().to_lowercase().replace(' ', "_"));
        } else {
            body.push_str(line);
            body.push('\n');
        }
    }
    flush_section(current, &mut body, &mut draft);
    draft
}

fn flush_section(name: Option<String>, body: &mut String, draft: &mut ExplanationDraft) {
    let text = body.trim().to_string();
    body.clear();
    match name {
        Some(name) => {
            draft.sections.insert(name, text);
        }
        None if draft.approach.is_empty() => draft.approach = text,
        None => {}
    }
}

/// Drops a surrounding markdown fence if the generator added one.
fn strip_fence(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.trim_end().trim_end_matches("```").trim_end().to_string()
}

#[async_trait]
impl CapabilityExecutor for PromptedExecutor {
    fn capability(&self) -> AgentType {
        self.capability
    }

    async fn produce_explanation(&self, request: &ExecutionRequest) -> CoreResult<ExplanationDraft> {
        let reply = self
            .generator
            .generate(&self.explanation_prompt(request), Some(self.role()))
            .await?;
        Ok(parse_explanation(&reply))
    }

    async fn generate_artifact(
        &self,
        request: &ExecutionRequest,
        explanation: &Explanation,
    ) -> CoreResult<Artifact> {
        let reply = self
            .generator
            .generate(&self.code_prompt(request, explanation), Some(self.role()))
            .await?;
        let code = strip_fence(&reply);
        if code.is_empty() {
            return Err(CoreError::external(
                self.generator.name().to_string(),
                "generator returned no code",
            ));
        }
        Ok(Artifact {
            module_name: request.task.target_module.clone(),
            language: "rust".to_string(),
            code,
        })
    }
}
