use async_trait::async_trait;
use forgeflow_core::api::{CoreResult, TextGenerator};
use serde_json::json;

/// Offline generator that answers prompts from their header lines.
///
/// Understands the `MODE`, `MODULE`, `ENTITY`, `FIELDS` and `SECTIONS` headers
/// written by [`crate::agents::PromptedExecutor`]. Explanations come back as
/// JSON with every requested section filled; code comes back as a plain
/// struct with a validating constructor.
#[derive(Debug, Default, Clone)]
pub struct TemplateGenerator;

impl TemplateGenerator {
    pub fn new() -> Self {
        Self
    }
}

struct Headers<'a> {
    mode: &'a str,
    module: &'a str,
    entity: Option<&'a str>,
    fields: Vec<&'a str>,
    sections: Vec<&'a str>,
}

fn parse_headers(prompt: &str) -> Headers<'_> {
    let mut headers = Headers {
        mode: "code",
        module: "module",
        entity: None,
        fields: Vec::new(),
        sections: Vec::new(),
    };
    for line in prompt.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "MODE" => headers.mode = value,
            "MODULE" if !value.is_empty() => headers.module = value,
            "ENTITY" if !value.is_empty() => headers.entity = Some(value),
            "FIELDS" => headers.fields = split_list(value),
            "SECTIONS" => headers.sections = split_list(value),
            _ => {}
        }
    }
    headers
}

fn split_list(raw: &str) -> Vec<&str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).collect()
}

fn ident(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if out.starts_with(|c: char| c.is_ascii_digit()) || out.is_empty() {
        out.insert(0, '_');
    }
    out
}

fn type_name(raw: &str) -> String {
    raw.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

fn render_explanation(h: &Headers<'_>) -> String {
    let subject = h.entity.unwrap_or(h.module);
    let sections: serde_json::Map<String, serde_json::Value> = h
        .sections
        .iter()
        .map(|name| {
            (
                name.to_string(),
                json!(format!("{} for {subject} in {}", name.replace('_', " "), h.module)),
            )
        })
        .collect();
    json!({
        "approach": format!("model {subject} as a plain record and validate it before use"),
        "sections": sections,
    })
    .to_string()
}

fn render_code(h: &Headers<'_>) -> String {
    let ty = type_name(h.entity.unwrap_or(h.module));
    let fields: Vec<String> = if h.fields.is_empty() {
        vec!["id".to_string()]
    } else {
        h.fields.iter().map(|f| ident(f)).collect()
    };

    let mut code = format!("//! {}\n\n#[derive(Debug, Clone, PartialEq)]\npub struct {ty} {{\n", h.module);
    for field in &fields {
        code.push_str(&format!("    pub {field}: String,\n"));
    }
    code.push_str("}\n\n");
    code.push_str(&format!("pub fn validate(value: &{ty}) -> Result<(), String> {{\n"));
    for field in &fields {
        code.push_str(&format!(
            "    if value.{field}.trim().is_empty() {{\n        return Err(\"{field} is required\".to_string());\n    }}\n"
        ));
    }
    code.push_str("    Ok(())\n}\n");
    code
}

#[async_trait]
impl TextGenerator for TemplateGenerator {
    fn name(&self) -> &str {
        "template"
    }

    async fn generate(&self, prompt: &str, _system: Option<&str>) -> CoreResult<String> {
        let headers = parse_headers(prompt);
        let out = match headers.mode {
            "explanation" => render_explanation(&headers),
            _ => render_code(&headers),
        };
        tracing::debug!(
            target: "forgeflow.generator",
            stage = "generator.template",
            mode = headers.mode,
            module = headers.module,
            len = out.len()
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn explanation_fills_every_requested_section() {
        let prompt = "MODE: explanation\nMODULE: order_service\nENTITY: Order\nSECTIONS: assumptions, risks\n";
        let out = TemplateGenerator::new().generate(prompt, None).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert!(value["approach"].as_str().unwrap().contains("Order"));
        assert_eq!(value["sections"].as_object().unwrap().len(), 2);
        assert!(value["sections"]["risks"].as_str().is_some());
    }

    #[tokio::test]
    async fn code_mentions_every_contract_field() {
        let prompt = "MODE: code\nMODULE: order_service\nENTITY: purchase-order\nFIELDS: id, Total Amount\n";
        let code = TemplateGenerator::new().generate(prompt, None).await.unwrap();
        assert!(code.contains("pub struct PurchaseOrder"));
        assert!(code.contains("pub id: String"));
        assert!(code.contains("pub total_amount: String"));
        assert!(code.contains("Result<(), String>"));
    }

    #[test]
    fn identifiers_are_sanitized() {
        assert_eq!(ident("2fa code"), "_2fa_code");
        assert_eq!(type_name("user_profile"), "UserProfile");
    }
}
