use crate::infrastructure::config::{DEFAULT_GENERATION_ENDPOINT, DEFAULT_GENERATION_MODEL};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Single-shot text generation. Any error is treated as a failed attempt by callers.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(&self, api_key: &str, prompt: &str) -> Result<String, InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestGenerationClient {
    client: Client,
    endpoint: String,
    model: String,
}

impl ReqwestGenerationClient {
    pub fn new(endpoint: &str, model: &str, timeout: Duration) -> Result<Self, InfraError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| InfraError::Generation(format!("failed to build http client: {error}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim().trim_end_matches('/').to_string(),
            model: model.trim().to_string(),
        })
    }

    pub fn with_defaults(timeout: Duration) -> Result<Self, InfraError> {
        Self::new(DEFAULT_GENERATION_ENDPOINT, DEFAULT_GENERATION_MODEL, timeout)
    }

    fn generate_endpoint(&self, api_key: &str) -> Result<Url, InfraError> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|error| InfraError::Generation(format!("invalid generation endpoint: {error}")))?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::Generation("generation endpoint cannot be a base".to_string())
            })?;
            segments.pop_if_empty();
            segments.push(&format!("{}:generateContent", self.model));
        }
        url.query_pairs_mut().append_pair("key", api_key);
        Ok(url)
    }

    fn http_error(status: reqwest::StatusCode, body: &str) -> InfraError {
        let message = if body.trim().is_empty() {
            format!("generation api error: http {}", status.as_u16())
        } else {
            format!("generation api error: http {}; body={body}", status.as_u16())
        };
        InfraError::Generation(message)
    }
}

#[derive(Debug, serde::Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, serde::Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, serde::Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, serde::Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, serde::Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, serde::Deserialize)]
struct CandidateContent {
    parts: Option<Vec<CandidatePart>>,
}

#[derive(Debug, serde::Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

fn primary_text(response: GenerateResponse) -> Option<String> {
    response
        .candidates?
        .into_iter()
        .next()?
        .content?
        .parts?
        .into_iter()
        .next()?
        .text
}

#[async_trait]
impl GenerationClient for ReqwestGenerationClient {
    async fn generate(&self, api_key: &str, prompt: &str) -> Result<String, InfraError> {
        if api_key.trim().is_empty() {
            return Err(InfraError::Generation("api key must not be empty".to_string()));
        }

        let request = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
        };
        let response = self
            .client
            .post(self.generate_endpoint(api_key.trim())?)
            .json(&request)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    InfraError::GenerationTimeout
                } else {
                    InfraError::Generation(format!("network error while generating: {error}"))
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            if error.is_timeout() {
                InfraError::GenerationTimeout
            } else {
                InfraError::Generation(format!("failed reading generation response: {error}"))
            }
        })?;

        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }

        let parsed: GenerateResponse = serde_json::from_str(&body).map_err(|error| {
            InfraError::Generation(format!("invalid generation payload: {error}"))
        })?;

        primary_text(parsed)
            .ok_or_else(|| InfraError::Generation("generation response had no candidate text".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, timeout: Duration) -> ReqwestGenerationClient {
        ReqwestGenerationClient::new(&format!("{}/v1beta/models", server.uri()), "gemini-test", timeout)
            .expect("build client")
    }

    #[tokio::test]
    async fn generate_returns_first_candidate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-test:generateContent"))
            .and(query_param("key", "test-key"))
            .and(body_partial_json(serde_json::json!({
                "contents": [{ "parts": [{ "text": "say hi" }] }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [
                    { "content": { "parts": [{ "text": "\"Hi there!\"" }] } },
                    { "content": { "parts": [{ "text": "ignored" }] } }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = client_for(&server, Duration::from_secs(5))
            .generate("test-key", "say hi")
            .await
            .expect("generate");
        assert_eq!(text, "\"Hi there!\"");
    }

    #[tokio::test]
    async fn empty_candidates_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let result = client_for(&server, Duration::from_secs(5))
            .generate("test-key", "prompt")
            .await;
        assert!(matches!(result, Err(InfraError::Generation(_))));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        match client_for(&server, Duration::from_secs(5))
            .generate("test-key", "prompt")
            .await
        {
            Err(InfraError::Generation(message)) => {
                assert!(message.contains("429"));
                assert!(message.contains("quota exceeded"));
            }
            other => panic!("expected generation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_payload_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let result = client_for(&server, Duration::from_secs(5))
            .generate("test-key", "prompt")
            .await;
        assert!(matches!(result, Err(InfraError::Generation(_))));
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(500))
                    .set_body_json(serde_json::json!({ "candidates": [] })),
            )
            .mount(&server)
            .await;

        let result = client_for(&server, Duration::from_millis(50))
            .generate("test-key", "prompt")
            .await;
        assert!(matches!(result, Err(InfraError::GenerationTimeout)));
    }

    #[tokio::test]
    async fn blank_api_key_is_rejected_without_a_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let result = client_for(&server, Duration::from_secs(5)).generate(" ", "prompt").await;
        assert!(result.is_err());
    }
}
