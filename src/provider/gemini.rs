//! Gemini REST adapter: resumable file upload, `generateContent`, and file deletion.

use super::{ProviderError, ReasoningProvider, RemoteFile};
use crate::config::Config;
use crate::prompt::{Prompt, PromptPart};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;

const API_KEY_HEADER: &str = "x-goog-api-key";
const UPLOAD_PROTOCOL_HEADER: &str = "x-goog-upload-protocol";
const UPLOAD_COMMAND_HEADER: &str = "x-goog-upload-command";
const UPLOAD_OFFSET_HEADER: &str = "x-goog-upload-offset";
const UPLOAD_LENGTH_HEADER: &str = "x-goog-upload-header-content-length";
const UPLOAD_TYPE_HEADER: &str = "x-goog-upload-header-content-type";
const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";

/// HTTP client for the Gemini API.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    /// Build a client for `model` at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .user_agent("docchat/gemini")
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Client configured from the `GEMINI_*` settings.
    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        Self::new(
            config.gemini_base_url.clone(),
            config.gemini_api_key.clone(),
            config.gemini_model.clone(),
            config.provider_timeout,
        )
    }

    fn upload_endpoint(&self) -> String {
        format!("{}/upload/v1beta/files", self.base_url)
    }

    fn generate_endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    fn file_endpoint(&self, name: &str) -> String {
        format!("{}/v1beta/{}", self.base_url, name)
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: UploadedFile,
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    uri: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

#[async_trait]
impl ReasoningProvider for GeminiClient {
    async fn upload_file(
        &self,
        path: &Path,
        mime_type: &str,
        display_name: &str,
    ) -> Result<RemoteFile, ProviderError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ProviderError::LocalFile {
                path: path.to_path_buf(),
                source,
            })?;

        let start = self
            .http
            .post(self.upload_endpoint())
            .header(API_KEY_HEADER, &self.api_key)
            .header(UPLOAD_PROTOCOL_HEADER, "resumable")
            .header(UPLOAD_COMMAND_HEADER, "start")
            .header(UPLOAD_LENGTH_HEADER, bytes.len().to_string())
            .header(UPLOAD_TYPE_HEADER, mime_type)
            .json(&json!({ "file": { "display_name": display_name } }))
            .send()
            .await?;
        let start = ensure_success(start).await?;
        let session_url = start
            .headers()
            .get(UPLOAD_URL_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                ProviderError::InvalidResponse("upload session URL missing from response".into())
            })?;

        let size = bytes.len();
        let finalize = self
            .http
            .post(session_url)
            .header(UPLOAD_OFFSET_HEADER, "0")
            .header(UPLOAD_COMMAND_HEADER, "upload, finalize")
            .body(bytes)
            .send()
            .await?;
        let finalize = ensure_success(finalize).await?;
        let uploaded: UploadResponse = finalize.json().await.map_err(|error| {
            ProviderError::InvalidResponse(format!("failed to decode upload response: {error}"))
        })?;

        if uploaded.file.uri.trim().is_empty() {
            return Err(ProviderError::InvalidResponse(
                "upload response carried an empty file URI".into(),
            ));
        }
        tracing::info!(
            uri = %uploaded.file.uri,
            mime_type,
            bytes = size,
            "Uploaded document to Gemini file storage"
        );
        Ok(RemoteFile {
            uri: uploaded.file.uri,
        })
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        let payload = json!({
            "contents": [{
                "role": "user",
                "parts": request_parts(prompt),
            }],
            "generationConfig": {
                // Low temperature keeps answers close to the document.
                "temperature": 0.1,
                "responseMimeType": "application/json",
            }
        });

        let response = self
            .http
            .post(self.generate_endpoint())
            .header(API_KEY_HEADER, &self.api_key)
            .json(&payload)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let body: GenerateResponse = response.json().await.map_err(|error| {
            ProviderError::InvalidResponse(format!("failed to decode generate response: {error}"))
        })?;

        let text = body
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<String>()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            let reason = body
                .prompt_feedback
                .and_then(|feedback| feedback.block_reason)
                .unwrap_or_else(|| "no candidate text".into());
            return Err(ProviderError::InvalidResponse(format!(
                "Gemini returned no answer: {reason}"
            )));
        }
        Ok(text)
    }

    async fn delete_file(&self, uri: &str) -> Result<(), ProviderError> {
        let name = file_name_from_uri(uri).ok_or_else(|| {
            ProviderError::InvalidResponse(format!("not a Gemini file URI: {uri}"))
        })?;
        let response = self
            .http
            .delete(self.file_endpoint(name))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(uri, "Remote file already gone");
            return Ok(());
        }
        ensure_success(response).await?;
        tracing::info!(uri, "Deleted remote file");
        Ok(())
    }
}

fn request_parts(prompt: &Prompt) -> Vec<Value> {
    prompt
        .parts
        .iter()
        .map(|part| match part {
            PromptPart::FileRef { uri, mime_type } => json!({
                "file_data": { "mime_type": mime_type, "file_uri": uri }
            }),
            PromptPart::Text(text) => json!({ "text": text }),
        })
        .collect()
}

async fn ensure_success(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_failure(status, &body))
}

/// Map an unsuccessful Gemini response onto a [`ProviderError`] kind.
pub(crate) fn classify_failure(status: StatusCode, body: &str) -> ProviderError {
    let (message, reason) = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => (envelope.error.message, envelope.error.status.unwrap_or_default()),
        Err(_) => (body.trim().to_string(), String::new()),
    };
    let code = status.as_u16();

    if code == 503 || code == 429 || reason == "UNAVAILABLE" || reason == "RESOURCE_EXHAUSTED" {
        ProviderError::Overloaded {
            status: code,
            message,
        }
    } else if code == 404
        || reason == "NOT_FOUND"
        || (matches!(code, 400 | 403) && mentions_missing_file(&message))
    {
        ProviderError::HandleUnavailable { message }
    } else if matches!(code, 401 | 403)
        || reason == "PERMISSION_DENIED"
        || reason == "UNAUTHENTICATED"
    {
        ProviderError::Unauthorized {
            status: code,
            message,
        }
    } else if status.is_client_error() {
        ProviderError::InvalidRequest {
            status: code,
            message,
        }
    } else {
        ProviderError::Upstream {
            status: code,
            message,
        }
    }
}

fn mentions_missing_file(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    lowered.contains("file")
        && (lowered.contains("not exist")
            || lowered.contains("expired")
            || lowered.contains("not found"))
}

/// Resource name (`files/<id>`) embedded in a Gemini file URI.
pub(crate) fn file_name_from_uri(uri: &str) -> Option<&str> {
    let start = uri.rfind("files/")?;
    let name = &uri[start..];
    (name.len() > "files/".len()).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::{DELETE, POST};
    use httpmock::MockServer;

    fn client(server: &MockServer) -> GeminiClient {
        GeminiClient::new(
            server.base_url(),
            "test-key",
            "gemini-test",
            Duration::from_secs(5),
        )
        .expect("client")
    }

    fn text_prompt(text: &str) -> Prompt {
        Prompt {
            parts: vec![PromptPart::Text(text.into())],
        }
    }

    #[tokio::test]
    async fn upload_runs_resumable_session() {
        let server = MockServer::start_async().await;
        let session_url = format!("{}/upload/session/abc", server.base_url());
        let start = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/upload/v1beta/files")
                    .header("x-goog-api-key", "test-key")
                    .header("x-goog-upload-command", "start")
                    .header("x-goog-upload-header-content-type", "application/pdf")
                    .header("x-goog-upload-header-content-length", "8");
                then.status(200).header("x-goog-upload-url", session_url.as_str());
            })
            .await;
        let finalize = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/upload/session/abc")
                    .header("x-goog-upload-command", "upload, finalize")
                    .header("x-goog-upload-offset", "0")
                    .body("%PDF-1.7");
                then.status(200).json_body(json!({
                    "file": {
                        "name": "files/abc",
                        "uri": "https://generativelanguage.googleapis.com/v1beta/files/abc",
                        "mimeType": "application/pdf"
                    }
                }));
            })
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.pdf");
        tokio::fs::write(&path, b"%PDF-1.7").await.expect("write");

        let remote = client(&server)
            .upload_file(&path, "application/pdf", "report.pdf")
            .await
            .expect("upload");

        start.assert_async().await;
        finalize.assert_async().await;
        assert_eq!(
            remote.uri,
            "https://generativelanguage.googleapis.com/v1beta/files/abc"
        );
    }

    #[tokio::test]
    async fn upload_of_missing_file_fails_locally() {
        let server = MockServer::start_async().await;
        let error = client(&server)
            .upload_file(Path::new("/nonexistent/report.pdf"), "application/pdf", "r")
            .await
            .expect_err("missing file");
        assert!(matches!(error, ProviderError::LocalFile { .. }));
    }

    #[tokio::test]
    async fn generate_joins_candidate_text() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1beta/models/gemini-test:generateContent")
                    .header("x-goog-api-key", "test-key")
                    .body_contains("\"responseMimeType\":\"application/json\"")
                    .body_contains("What is the deadline?");
                then.status(200).json_body(json!({
                    "candidates": [{
                        "content": {
                            "role": "model",
                            "parts": [{ "text": "{\"answer\": " }, { "text": "\"Friday\"}" }]
                        }
                    }]
                }));
            })
            .await;

        let text = client(&server)
            .generate(&text_prompt("What is the deadline?"))
            .await
            .expect("generate");

        mock.assert_async().await;
        assert_eq!(text, "{\"answer\": \"Friday\"}");
    }

    #[tokio::test]
    async fn generate_sends_file_reference_before_text() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1beta/models/gemini-test:generateContent")
                    .body_contains("\"file_uri\":\"https://files.example/v1beta/files/xyz\"");
                then.status(200).json_body(json!({
                    "candidates": [{ "content": { "parts": [{ "text": "ok" }] } }]
                }));
            })
            .await;

        let prompt = Prompt {
            parts: vec![
                PromptPart::FileRef {
                    uri: "https://files.example/v1beta/files/xyz".into(),
                    mime_type: "application/pdf".into(),
                },
                PromptPart::Text("Question".into()),
            ],
        };
        client(&server).generate(&prompt).await.expect("generate");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn generate_reports_overload() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1beta/models/gemini-test:generateContent");
                then.status(503).json_body(json!({
                    "error": {
                        "code": 503,
                        "message": "The model is overloaded. Please try again later.",
                        "status": "UNAVAILABLE"
                    }
                }));
            })
            .await;

        let error = client(&server)
            .generate(&text_prompt("Q"))
            .await
            .expect_err("overloaded");
        assert!(error.is_overloaded());
    }

    #[tokio::test]
    async fn generate_reports_expired_file() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1beta/models/gemini-test:generateContent");
                then.status(403).json_body(json!({
                    "error": {
                        "code": 403,
                        "message": "You do not have permission to access the File xyz or it may not exist.",
                        "status": "PERMISSION_DENIED"
                    }
                }));
            })
            .await;

        let error = client(&server)
            .generate(&text_prompt("Q"))
            .await
            .expect_err("expired");
        assert!(error.is_handle_unavailable());
    }

    #[tokio::test]
    async fn generate_with_empty_candidates_is_invalid() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1beta/models/gemini-test:generateContent");
                then.status(200).json_body(json!({
                    "candidates": [],
                    "promptFeedback": { "blockReason": "SAFETY" }
                }));
            })
            .await;

        let error = client(&server)
            .generate(&text_prompt("Q"))
            .await
            .expect_err("blocked");
        assert!(matches!(error, ProviderError::InvalidResponse(message) if message.contains("SAFETY")));
    }

    #[tokio::test]
    async fn delete_targets_file_resource_and_tolerates_missing() {
        let server = MockServer::start_async().await;
        let present = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/v1beta/files/abc");
                then.status(200).json_body(json!({}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(DELETE).path("/v1beta/files/gone");
                then.status(404).json_body(json!({
                    "error": { "code": 404, "message": "not found", "status": "NOT_FOUND" }
                }));
            })
            .await;

        let client = client(&server);
        client
            .delete_file("https://generativelanguage.googleapis.com/v1beta/files/abc")
            .await
            .expect("delete");
        present.assert_async().await;
        client
            .delete_file("https://generativelanguage.googleapis.com/v1beta/files/gone")
            .await
            .expect("missing file is fine");
    }

    #[test]
    fn classification_follows_status_and_reason() {
        let unauthorized = classify_failure(
            StatusCode::UNAUTHORIZED,
            r#"{"error":{"code":401,"message":"API key not valid","status":"UNAUTHENTICATED"}}"#,
        );
        assert!(matches!(unauthorized, ProviderError::Unauthorized { status: 401, .. }));

        let throttled = classify_failure(StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(throttled.is_overloaded());

        let invalid = classify_failure(
            StatusCode::BAD_REQUEST,
            r#"{"error":{"code":400,"message":"Invalid JSON payload","status":"INVALID_ARGUMENT"}}"#,
        );
        assert!(matches!(invalid, ProviderError::InvalidRequest { status: 400, .. }));

        let upstream = classify_failure(StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert!(matches!(upstream, ProviderError::Upstream { status: 500, .. }));

        let expired = classify_failure(
            StatusCode::BAD_REQUEST,
            r#"{"error":{"code":400,"message":"The File abc has expired","status":"FAILED_PRECONDITION"}}"#,
        );
        assert!(expired.is_handle_unavailable());
    }

    #[test]
    fn file_names_are_derived_from_uris() {
        assert_eq!(
            file_name_from_uri("https://generativelanguage.googleapis.com/v1beta/files/abc"),
            Some("files/abc")
        );
        assert_eq!(file_name_from_uri("files/abc"), Some("files/abc"));
        assert_eq!(file_name_from_uri("https://example.com/other"), None);
        assert_eq!(file_name_from_uri("files/"), None);
    }
}
