use std::{error::Error as StdError, fmt, time::Duration};

use async_trait::async_trait;
use forgeflow_core::api::{CoreError, CoreResult, TextGenerator};
use serde_json::{json, Value};

const BODY_PREVIEW_LIMIT: usize = 512;
const SERVICE: &str = "generator";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorHttpErrorKind {
    Timeout,
    Connect,
    Request,
    Body,
    Decode,
    Status,
    Unknown,
}

impl GeneratorHttpErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Request => "request",
            Self::Body => "body",
            Self::Decode => "decode",
            Self::Status => "status",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for GeneratorHttpErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct GeneratorHttpError {
    kind: GeneratorHttpErrorKind,
    status: Option<u16>,
    url: String,
    message: String,
    source: Option<anyhow::Error>,
}

impl GeneratorHttpError {
    pub fn kind(&self) -> GeneratorHttpErrorKind {
        self.kind
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    fn from_reqwest(err: reqwest::Error, url: &str) -> Self {
        let kind = if err.is_timeout() {
            GeneratorHttpErrorKind::Timeout
        } else if err.is_connect() {
            GeneratorHttpErrorKind::Connect
        } else if err.is_request() {
            GeneratorHttpErrorKind::Request
        } else if err.is_body() {
            GeneratorHttpErrorKind::Body
        } else if err.is_decode() {
            GeneratorHttpErrorKind::Decode
        } else {
            GeneratorHttpErrorKind::Unknown
        };
        GeneratorHttpError {
            kind,
            status: err.status().map(|s| s.as_u16()),
            url: url.to_string(),
            message: err.to_string(),
            source: Some(anyhow::Error::new(err)),
        }
    }

    fn status_error(status: u16, url: &str, preview: String) -> Self {
        GeneratorHttpError {
            kind: GeneratorHttpErrorKind::Status,
            status: Some(status),
            url: url.to_string(),
            message: preview,
            source: None,
        }
    }

    fn decode_error(status: u16, url: &str, message: String) -> Self {
        GeneratorHttpError {
            kind: GeneratorHttpErrorKind::Decode,
            status: Some(status),
            url: url.to_string(),
            message,
            source: None,
        }
    }
}

impl fmt::Display for GeneratorHttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "generator http error kind={}", self.kind)?;
        if let Some(status) = self.status {
            write!(f, " status={}", status)?;
        }
        write!(f, " url={}: {}", self.url, self.message)
    }
}

impl StdError for GeneratorHttpError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|err| &**err as &(dyn StdError + 'static))
    }
}

/// 429 is a rate limit, 5xx and transport failures are retryable outages,
/// rejected credentials are a configuration problem, any other 4xx is a bad request.
impl From<GeneratorHttpError> for CoreError {
    fn from(err: GeneratorHttpError) -> Self {
        match (err.kind, err.status) {
            (GeneratorHttpErrorKind::Timeout, _) => CoreError::Timeout {
                operation: "generate".to_string(),
                after_ms: 0,
            },
            (_, Some(429)) => CoreError::rate_limited(SERVICE, err.to_string()),
            (GeneratorHttpErrorKind::Status, Some(401 | 403)) => {
                CoreError::Config(format!("generator rejected credentials: {err}"))
            }
            (GeneratorHttpErrorKind::Status, Some(code)) if (400..500).contains(&code) => {
                CoreError::validation(err.to_string())
            }
            _ => CoreError::external(SERVICE, err.to_string()),
        }
    }
}

fn preview_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    let mut out: String = trimmed.chars().take(BODY_PREVIEW_LIMIT).collect();
    if trimmed.chars().count() > BODY_PREVIEW_LIMIT {
        out.push_str("...");
    }
    out
}

/// Pulls the generated text out of the common completion response shapes.
fn extract_text(body: &Value) -> Option<String> {
    let candidates = [
        body.get("text"),
        body.get("output"),
        body.pointer("/choices/0/message/content"),
        body.pointer("/choices/0/text"),
        body.pointer("/content/0/text"),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str())
        .map(str::to_string)
}

/// Completion endpoint client: POSTs `{model, prompt, system}` and reads back text.
#[derive(Clone)]
pub struct HttpTextGenerator {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout_ms: u64,
}

impl HttpTextGenerator {
    pub fn new(
        endpoint: String,
        api_key: String,
        model: String,
        timeout_ms: u64,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            model,
            timeout_ms,
        })
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.trim().is_empty() {
            req
        } else {
            req.bearer_auth(&self.api_key)
        }
    }

    async fn call(&self, prompt: &str, system: Option<&str>) -> Result<String, GeneratorHttpError> {
        let url = &self.endpoint;
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "system": system,
        });
        let resp = self
            .auth(self.http.post(url).json(&body))
            .send()
            .await
            .map_err(|err| GeneratorHttpError::from_reqwest(err, url))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|err| GeneratorHttpError::from_reqwest(err, url))?;
        if !status.is_success() {
            return Err(GeneratorHttpError::status_error(
                status.as_u16(),
                url,
                preview_body(&text),
            ));
        }

        let value: Value = serde_json::from_str(&text).map_err(|err| {
            GeneratorHttpError::decode_error(
                status.as_u16(),
                url,
                format!("failed to decode response body: {err} | body={}", preview_body(&text)),
            )
        })?;
        extract_text(&value).ok_or_else(|| {
            GeneratorHttpError::decode_error(
                status.as_u16(),
                url,
                format!("response carries no text | body={}", preview_body(&text)),
            )
        })
    }
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    fn name(&self) -> &str {
        "http"
    }

    async fn generate(&self, prompt: &str, system: Option<&str>) -> CoreResult<String> {
        tracing::debug!(
            target: "forgeflow.generator",
            stage = "generator.http.in",
            url = %self.endpoint,
            model = %self.model,
            prompt_len = prompt.len()
        );
        match self.call(prompt, system).await {
            Ok(text) => {
                tracing::debug!(
                    target: "forgeflow.generator",
                    stage = "generator.http.out",
                    text_len = text.len()
                );
                Ok(text)
            }
            Err(err) => {
                tracing::warn!(
                    target: "forgeflow.generator",
                    stage = "generator.http.error",
                    kind = %err.kind(),
                    status = ?err.status(),
                    error = %err
                );
                Err(match CoreError::from(err) {
                    CoreError::Timeout { operation, .. } => CoreError::Timeout {
                        operation,
                        after_ms: self.timeout_ms,
                    },
                    other => other,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn generator(url: String) -> HttpTextGenerator {
        HttpTextGenerator::new(url, "secret".into(), "m1".into(), 5_000).unwrap()
    }

    #[test]
    fn preview_body_truncates() {
        assert_eq!(preview_body("   "), "<empty body>");
        let preview = preview_body(&"a".repeat(BODY_PREVIEW_LIMIT + 10));
        assert!(preview.ends_with("..."));
        assert_eq!(preview.len(), BODY_PREVIEW_LIMIT + 3);
    }

    #[test]
    fn extract_text_accepts_chat_shape() {
        let body = json!({ "choices": [{ "message": { "content": "fn main() {}" } }] });
        assert_eq!(extract_text(&body).as_deref(), Some("fn main() {}"));
        assert_eq!(extract_text(&json!({ "id": 1 })), None);
    }

    #[tokio::test]
    async fn posts_prompt_with_bearer_auth() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/generate")
            .match_header("authorization", "Bearer secret")
            .match_body(Matcher::PartialJson(json!({
                "model": "m1",
                "prompt": "write it",
                "system": "be brief",
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"text":"pub fn f() {}"}"#)
            .create_async()
            .await;

        let out = generator(format!("{}/v1/generate", server.url()))
            .generate("write it", Some("be brief"))
            .await
            .unwrap();
        assert_eq!(out, "pub fn f() {}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rate_limit_is_retryable_and_flagged() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(429)
            .with_body("slow down")
            .create_async()
            .await;

        let err = generator(server.url()).generate("p", None).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(
            err,
            CoreError::ExternalService {
                rate_limited: true,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn server_error_is_retryable_but_bad_request_is_not() {
        let mut server = Server::new_async().await;
        let _outage = server
            .mock("POST", "/outage")
            .with_status(503)
            .create_async()
            .await;
        let _bad = server
            .mock("POST", "/bad")
            .with_status(400)
            .with_body("prompt too long")
            .create_async()
            .await;

        let outage = generator(format!("{}/outage", server.url()))
            .generate("p", None)
            .await
            .unwrap_err();
        assert!(outage.is_retryable());

        let bad = generator(format!("{}/bad", server.url()))
            .generate("p", None)
            .await
            .unwrap_err();
        assert!(!bad.is_retryable());
        assert!(bad.to_string().contains("prompt too long"));
    }

    #[tokio::test]
    async fn unauthorized_is_a_config_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(401)
            .create_async()
            .await;
        let err = generator(server.url()).generate("p", None).await.unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }
}
