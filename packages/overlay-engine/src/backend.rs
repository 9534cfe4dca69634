//! Prompt analysis service.
//!
//! The orchestrator talks to the service through [`AnalysisBackend`] so the
//! widget can run against a scripted backend in tests. [`HttpAnalysisBackend`]
//! is the JSON-over-HTTP implementation the extension ships with.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::quality::QualityMetrics;

/// Suggestions shown when the service cannot be reached.
pub const FALLBACK_SUGGESTIONS: [&str; 3] = [
    "Say who the answer is for and what they already know.",
    "Add the format you want back (list, table, short paragraph).",
    "Include one concrete example of what a good answer looks like.",
];

pub fn fallback_suggestions() -> Vec<String> {
    FALLBACK_SUGGESTIONS.iter().map(|s| s.to_string()).collect()
}

/// One clarifying question and the user's answer, fed to `refine`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

impl QaPair {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// Remote prompt analysis. `token` is the cached auth token, when valid.
#[async_trait(?Send)]
pub trait AnalysisBackend {
    async fn suggestions(&self, prompt: &str, token: Option<&str>) -> Result<Vec<String>>;

    async fn refine(&self, prompt: &str, answers: &[QaPair], token: Option<&str>) -> Result<String>;

    async fn quality(&self, prompt: &str, token: Option<&str>) -> Result<QualityMetrics>;
}

#[derive(Serialize)]
struct PromptBody<'a> {
    prompt: &'a str,
}

#[derive(Serialize)]
struct RefineBody<'a> {
    prompt: &'a str,
    answers: &'a [QaPair],
}

#[derive(Deserialize)]
struct SuggestionsResponse {
    suggestions: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefineResponse {
    refined_prompt: String,
}

/// JSON-over-HTTP analysis backend.
#[derive(Clone)]
pub struct HttpAnalysisBackend {
    http_client: Client,
    base_url: String,
}

impl HttpAnalysisBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post_json<B, R>(&self, path: &str, body: &B, token: Option<&str>) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let start = std::time::Instant::now();

        let mut request = self.http_client.post(self.endpoint(path)).json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            warn!(error = %e, path, "analysis request failed");
            EngineError::Backend(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, path, "analysis service error");
            return Err(EngineError::Backend(format!(
                "analysis service returned {}",
                status
            )));
        }

        let parsed = response
            .json::<R>()
            .await
            .map_err(|e| EngineError::Backend(format!("invalid response body: {}", e)))?;

        debug!(path, duration_ms = start.elapsed().as_millis() as u64, "analysis call");
        Ok(parsed)
    }
}

#[async_trait(?Send)]
impl AnalysisBackend for HttpAnalysisBackend {
    async fn suggestions(&self, prompt: &str, token: Option<&str>) -> Result<Vec<String>> {
        let response: SuggestionsResponse = self
            .post_json("suggestions", &PromptBody { prompt }, token)
            .await?;
        Ok(response.suggestions)
    }

    async fn refine(
        &self,
        prompt: &str,
        answers: &[QaPair],
        token: Option<&str>,
    ) -> Result<String> {
        let response: RefineResponse = self
            .post_json("refine", &RefineBody { prompt, answers }, token)
            .await?;
        Ok(response.refined_prompt)
    }

    async fn quality(&self, prompt: &str, token: Option<&str>) -> Result<QualityMetrics> {
        let metrics: QualityMetrics = self
            .post_json("quality", &PromptBody { prompt }, token)
            .await?;
        Ok(metrics.clamped())
    }
}

impl std::fmt::Debug for HttpAnalysisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAnalysisBackend")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let backend = HttpAnalysisBackend::new("https://api.example.test/v1/");
        assert_eq!(backend.base_url(), "https://api.example.test/v1");
        assert_eq!(backend.endpoint("quality"), "https://api.example.test/v1/quality");
    }

    #[test]
    fn test_refine_body_shape() {
        let answers = vec![QaPair::new("Audience?", "Beginners")];
        let body = serde_json::to_value(RefineBody {
            prompt: "explain rust",
            answers: &answers,
        })
        .unwrap();
        assert_eq!(body["answers"][0]["answer"], "Beginners");
    }

    #[test]
    fn test_refine_response_is_camel_case() {
        let parsed: RefineResponse =
            serde_json::from_str(r#"{"refinedPrompt":"Explain Rust ownership to beginners"}"#)
                .unwrap();
        assert!(parsed.refined_prompt.starts_with("Explain"));
    }

    #[test]
    fn test_fallback_suggestions_are_stable() {
        assert_eq!(fallback_suggestions().len(), 3);
    }

    #[tokio::test]
    async fn test_unreachable_service_is_backend_error() {
        let backend = HttpAnalysisBackend::new("http://127.0.0.1:9");
        let err = backend.quality("hello", None).await.unwrap_err();
        assert!(matches!(err, EngineError::Backend(_)));
    }
}
