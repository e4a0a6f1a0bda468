//! HTTP surface for Docchat.
//!
//! This module exposes a compact Axum router under `/api`:
//!
//! - `POST /api/upload` – Store a multipart `file` field and register it as a document.
//! - `GET /api/documents` – List the caller's documents, newest first.
//! - `DELETE /api/documents/:id` – Delete a document with its conversation and stored file.
//! - `GET /api/documents/:id/preview` – Locally extracted text (`{ available, text? }`).
//! - `GET /api/documents/:id/file` – Raw stored bytes with the recorded MIME type.
//! - `POST /api/chat` – Ask a grounded question (`{ documentId, question }`).
//! - `GET /api/chat/:documentId` – Conversation history for a document.
//! - `GET /api/metrics` – Ingestion and provider counters.
//! - `GET /api/commands` – Machine-readable command catalog.
//!
//! Callers are identified by the `x-owner-id` header, which the authenticating gateway in
//! front of this service sets. Errors are returned as `{ "kind", "message" }`.

use crate::document::OwnerId;
use crate::pipeline::{DocumentApi, PipelineError, Preview, UploadRequest};
use axum::{
    Json, Router, async_trait,
    extract::{
        DefaultBodyLimit, FromRequestParts, Multipart, Path, State,
        multipart::MultipartError, rejection::JsonRejection,
    },
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Header carrying the caller identity.
pub const OWNER_HEADER: &str = "x-owner-id";

const UPLOAD_FIELD: &str = "file";
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;
const FALLBACK_MIME: &str = "application/octet-stream";

/// Build the HTTP router exposing the document API surface.
///
/// `max_upload_bytes` bounds the size of an uploaded file.
pub fn create_router<S>(service: Arc<S>, max_upload_bytes: usize) -> Router
where
    S: DocumentApi + 'static,
{
    Router::new()
        .route(
            "/api/upload",
            post(upload_document::<S>).layer(DefaultBodyLimit::max(
                max_upload_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES),
            )),
        )
        .route("/api/documents", get(list_documents::<S>))
        .route("/api/documents/:id", delete(delete_document::<S>))
        .route("/api/documents/:id/preview", get(preview_document::<S>))
        .route("/api/documents/:id/file", get(download_document::<S>))
        .route("/api/chat", post(ask_question::<S>))
        .route("/api/chat/:document_id", get(chat_history::<S>))
        .route("/api/metrics", get(get_metrics::<S>))
        .route("/api/commands", get(get_commands))
        .with_state(service)
}

/// Caller identity extracted from [`OWNER_HEADER`].
pub struct Owner(pub OwnerId);

#[async_trait]
impl<St> FromRequestParts<St> for Owner
where
    St: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(OwnerId::new)
            .map(Owner)
            .ok_or_else(|| {
                ApiError::new(
                    StatusCode::UNAUTHORIZED,
                    "Unauthorized",
                    format!("Missing {OWNER_HEADER} header."),
                )
            })
    }
}

/// Store an uploaded file and register it for the caller.
async fn upload_document<S>(
    State(service): State<Arc<S>>,
    Owner(owner): Owner,
    mut multipart: Multipart,
) -> Result<Response, ApiError>
where
    S: DocumentApi,
{
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(ApiError::from_multipart)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let mime_type = field.content_type().unwrap_or(FALLBACK_MIME).to_string();
        let bytes = field.bytes().await.map_err(ApiError::from_multipart)?;
        upload = Some(UploadRequest {
            file_name,
            mime_type,
            bytes: bytes.to_vec(),
        });
        break;
    }
    let upload = upload.ok_or_else(|| {
        ApiError::invalid_request(format!("Multipart field '{UPLOAD_FIELD}' is required."))
    })?;

    let document = service.ingest(&owner, upload).await?;
    Ok((StatusCode::CREATED, Json(document)).into_response())
}

/// List the caller's documents.
async fn list_documents<S>(
    State(service): State<Arc<S>>,
    Owner(owner): Owner,
) -> Result<Response, ApiError>
where
    S: DocumentApi,
{
    let documents = service.list(&owner).await?;
    Ok(Json(documents).into_response())
}

/// Delete a document owned by the caller.
async fn delete_document<S>(
    State(service): State<Arc<S>>,
    Owner(owner): Owner,
    Path(id): Path<String>,
) -> Result<Response, ApiError>
where
    S: DocumentApi,
{
    let document_id = parse_document_id(&id)?;
    service.delete(&owner, document_id).await?;
    Ok(Json(json!({ "message": "Document deleted." })).into_response())
}

/// Response body for `GET /api/documents/:id/preview`.
#[derive(Serialize)]
struct PreviewResponse {
    available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

/// Return the extracted text of an inline-format document.
async fn preview_document<S>(
    State(service): State<Arc<S>>,
    Owner(owner): Owner,
    Path(id): Path<String>,
) -> Result<Json<PreviewResponse>, ApiError>
where
    S: DocumentApi,
{
    let document_id = parse_document_id(&id)?;
    let response = match service.preview(&owner, document_id).await? {
        Preview::Inline(text) => PreviewResponse {
            available: true,
            text: Some(text),
        },
        Preview::NotAvailable => PreviewResponse {
            available: false,
            text: None,
        },
    };
    Ok(Json(response))
}

/// Stream back the stored file with its recorded MIME type.
async fn download_document<S>(
    State(service): State<Arc<S>>,
    Owner(owner): Owner,
    Path(id): Path<String>,
) -> Result<Response, ApiError>
where
    S: DocumentApi,
{
    let document_id = parse_document_id(&id)?;
    let file = service.download(&owner, document_id).await?;
    let disposition = format!("inline; filename=\"{}\"", header_safe(&file.file_name));
    Ok((
        [
            (header::CONTENT_TYPE, file.mime_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        file.bytes,
    )
        .into_response())
}

/// Request body for `POST /api/chat`.
#[derive(Deserialize)]
struct ChatRequest {
    /// Identifier of the document to question.
    #[serde(rename = "documentId", alias = "docId")]
    document_id: String,
    /// Question text.
    question: String,
}

/// Answer a question grounded in one document.
async fn ask_question<S>(
    State(service): State<Arc<S>>,
    Owner(owner): Owner,
    request: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError>
where
    S: DocumentApi,
{
    let Json(request) =
        request.map_err(|rejection| ApiError::invalid_request(rejection.body_text()))?;
    let document_id = parse_document_id(&request.document_id)?;
    let answer = service
        .ask(&owner, document_id, &request.question)
        .await?;
    Ok(Json(answer).into_response())
}

/// Return the conversation recorded for a document.
async fn chat_history<S>(
    State(service): State<Arc<S>>,
    Owner(owner): Owner,
    Path(document_id): Path<String>,
) -> Result<Response, ApiError>
where
    S: DocumentApi,
{
    let document_id = parse_document_id(&document_id)?;
    let messages = service.history(&owner, document_id).await?;
    Ok(Json(messages).into_response())
}

/// Return ingestion and provider counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Response
where
    S: DocumentApi,
{
    Json(service.metrics_snapshot()).into_response()
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /api/commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery by tools and hosts.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "upload",
                method: "POST",
                path: "/api/upload",
                description: "Upload a PDF, plain text, or DOCX file as multipart field 'file'. Returns the stored document record.",
                request_example: None,
            },
            CommandDescriptor {
                name: "list_documents",
                method: "GET",
                path: "/api/documents",
                description: "List the caller's documents, newest first.",
                request_example: None,
            },
            CommandDescriptor {
                name: "delete_document",
                method: "DELETE",
                path: "/api/documents/:id",
                description: "Delete a document together with its conversation and stored file.",
                request_example: None,
            },
            CommandDescriptor {
                name: "preview_document",
                method: "GET",
                path: "/api/documents/:id/preview",
                description: "Return the extracted text of a plain text or DOCX document as { \"available\": bool, \"text\": string }.",
                request_example: None,
            },
            CommandDescriptor {
                name: "download_document",
                method: "GET",
                path: "/api/documents/:id/file",
                description: "Return the stored file with its original MIME type.",
                request_example: None,
            },
            CommandDescriptor {
                name: "chat",
                method: "POST",
                path: "/api/chat",
                description: "Ask a question answered only from the document. Returns { \"answer\": string, \"excerpt\": string }.",
                request_example: Some(json!({
                    "documentId": "6f1c2a9e-8a47-4c1b-9d0e-2b7f3f5e1a10",
                    "question": "What is the notice period?"
                })),
            },
            CommandDescriptor {
                name: "chat_history",
                method: "GET",
                path: "/api/chat/:documentId",
                description: "Return the conversation for a document as [{ \"role\", \"content\", \"timestamp\" }].",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/api/metrics",
                description: "Return ingestion, answer, and provider retry counters.",
                request_example: None,
            },
        ],
    })
}

fn parse_document_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError::new(StatusCode::NOT_FOUND, "NotFound", "Document not found."))
}

fn header_safe(file_name: &str) -> String {
    file_name
        .chars()
        .map(|ch| {
            if ch == ' ' || (ch.is_ascii_graphic() && ch != '"' && ch != '\\') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

/// Error response rendered as `{ "kind", "message" }`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
        }
    }

    fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "InvalidRequest", message)
    }

    fn from_multipart(error: MultipartError) -> Self {
        let status = error.status();
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            Self::new(status, "InvalidRequest", "The uploaded file is too large.")
        } else {
            Self::new(status, "InvalidRequest", error.body_text())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "kind": self.kind, "message": self.message })),
        )
            .into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        let (status, kind) = match &error {
            PipelineError::UnsupportedFormat { .. } => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "UnsupportedFormat")
            }
            PipelineError::DocumentNotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
            PipelineError::PermissionDenied(_) => (StatusCode::FORBIDDEN, "PermissionDenied"),
            PipelineError::ProviderOverloaded { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "Overloaded")
            }
            PipelineError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "InvalidRequest"),
            PipelineError::ExtractionFailed(_)
            | PipelineError::ProviderRejected { .. }
            | PipelineError::PersistenceFailed(_)
            | PipelineError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ProcessingFailed"),
        };
        if status.is_server_error() {
            tracing::error!(error = %error, kind, "Request failed");
        } else {
            tracing::debug!(error = %error, kind, "Request rejected");
        }
        Self::new(status, kind, error.user_message())
    }
}

#[cfg(test)]
mod tests {
    use super::{OWNER_HEADER, create_router, get_commands};
    use crate::document::{ContentRef, Document, DocumentFormat, OwnerId};
    use crate::metrics::MetricsSnapshot;
    use crate::pipeline::{
        ChatAnswer, DocumentApi, DownloadedFile, PipelineError, Preview, UploadRequest,
    };
    use crate::store::Message;
    use async_trait::async_trait;
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{Value, json};
    use std::sync::Arc;
    use time::OffsetDateTime;
    use tokio::sync::Mutex;
    use tower::ServiceExt;
    use uuid::Uuid;

    #[tokio::test]
    async fn commands_catalog_exposes_chat_endpoint() {
        let response = get_commands().await;
        let commands = response.0.commands;
        let chat = commands
            .iter()
            .find(|cmd| cmd.name == "chat")
            .expect("chat command present");

        assert_eq!(chat.method, "POST");
        assert_eq!(chat.path, "/api/chat");
        assert!(commands.iter().any(|cmd| cmd.path == "/api/upload"));
    }

    #[tokio::test]
    async fn requests_without_owner_are_unauthorized() {
        let app = router(StubDocumentService::default());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/documents")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["kind"], "Unauthorized");
    }

    #[tokio::test]
    async fn chat_route_accepts_doc_id_alias() {
        let service = StubDocumentService::default();
        let app = router(service.clone());
        let document_id = Uuid::new_v4();

        let response = app
            .oneshot(chat_request(json!({
                "docId": document_id.to_string(),
                "question": "What is the deadline?"
            })))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["answer"], "Friday\n\n> due Friday");
        assert_eq!(body["excerpt"], "due Friday");

        let questions = service.questions.lock().await.clone();
        assert_eq!(
            questions,
            vec![("alice".to_string(), document_id, "What is the deadline?".to_string())]
        );
    }

    #[tokio::test]
    async fn pipeline_errors_map_to_kinds_and_statuses() {
        let cases = [
            (StubMode::Foreign, StatusCode::FORBIDDEN, "PermissionDenied"),
            (StubMode::Overloaded, StatusCode::SERVICE_UNAVAILABLE, "Overloaded"),
            (StubMode::Missing, StatusCode::NOT_FOUND, "NotFound"),
        ];
        for (mode, status, kind) in cases {
            let app = router(StubDocumentService::with_mode(mode));
            let response = app
                .oneshot(chat_request(json!({
                    "documentId": Uuid::new_v4().to_string(),
                    "question": "Q"
                })))
                .await
                .expect("router response");
            assert_eq!(response.status(), status);
            assert_eq!(json_body(response).await["kind"], kind);
        }
    }

    #[tokio::test]
    async fn malformed_chat_body_is_invalid_request() {
        let app = router(StubDocumentService::default());
        let response = app
            .oneshot(chat_request(json!({ "question": "Q" })))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["kind"], "InvalidRequest");
    }

    #[tokio::test]
    async fn upload_route_forwards_multipart_file() {
        let service = StubDocumentService::default();
        let app = router(service.clone());
        let body = "--BOUNDARY\r\n\
            Content-Disposition: form-data; name=\"file\"; filename=\"notes.txt\"\r\n\
            Content-Type: text/plain\r\n\
            \r\n\
            hello world\r\n\
            --BOUNDARY--\r\n";

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/upload")
                    .header(OWNER_HEADER, "alice")
                    .header("content-type", "multipart/form-data; boundary=BOUNDARY")
                    .body(Body::from(body))
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::CREATED);
        let json = json_body(response).await;
        assert_eq!(json["originalName"], "notes.txt");
        assert_eq!(json["format"], "text");

        let uploads = service.uploads.lock().await.clone();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].mime_type, "text/plain");
        assert_eq!(uploads[0].bytes, b"hello world");
    }

    #[tokio::test]
    async fn upload_without_file_field_is_rejected() {
        let app = router(StubDocumentService::default());
        let body = "--BOUNDARY\r\n\
            Content-Disposition: form-data; name=\"other\"\r\n\
            \r\n\
            value\r\n\
            --BOUNDARY--\r\n";

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/upload")
                    .header(OWNER_HEADER, "alice")
                    .header("content-type", "multipart/form-data; boundary=BOUNDARY")
                    .body(Body::from(body))
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn preview_reports_unavailable_for_remote_formats() {
        let app = router(StubDocumentService::default());
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/documents/{}/preview", Uuid::new_v4()))
                    .header(OWNER_HEADER, "alice")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "available": false }));
    }

    #[tokio::test]
    async fn download_sets_content_type() {
        let app = router(StubDocumentService::default());
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/documents/{}/file", Uuid::new_v4()))
                    .header(OWNER_HEADER, "alice")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "application/pdf"
        );
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        assert_eq!(&bytes[..], b"%PDF-1.7");
    }

    #[tokio::test]
    async fn invalid_document_id_is_not_found() {
        let app = router(StubDocumentService::default());
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri("/api/documents/not-a-uuid")
                    .header(OWNER_HEADER, "alice")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    fn router(service: StubDocumentService) -> Router {
        create_router(Arc::new(service), 1024 * 1024)
    }

    fn chat_request(body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/api/chat")
            .header(OWNER_HEADER, "alice")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&body).expect("json body")
    }

    #[derive(Clone, Copy, Default)]
    enum StubMode {
        #[default]
        Answer,
        Foreign,
        Overloaded,
        Missing,
    }

    #[derive(Clone, Default)]
    struct StubDocumentService {
        mode: StubMode,
        questions: Arc<Mutex<Vec<(String, Uuid, String)>>>,
        uploads: Arc<Mutex<Vec<UploadRequest>>>,
    }

    impl StubDocumentService {
        fn with_mode(mode: StubMode) -> Self {
            Self {
                mode,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl DocumentApi for StubDocumentService {
        async fn ingest(
            &self,
            owner: &OwnerId,
            upload: UploadRequest,
        ) -> Result<Document, PipelineError> {
            let format = DocumentFormat::from_mime(&upload.mime_type).ok_or_else(|| {
                PipelineError::UnsupportedFormat {
                    mime_type: upload.mime_type.clone(),
                }
            })?;
            let document = Document {
                id: Uuid::new_v4(),
                owner_id: owner.clone(),
                stored_name: format!("1-{}", upload.file_name),
                original_name: upload.file_name.clone(),
                format,
                content: ContentRef::ExtractLocally,
                size_bytes: upload.bytes.len() as u64,
                sha256: String::new(),
                created_at: OffsetDateTime::now_utc(),
            };
            self.uploads.lock().await.push(upload);
            Ok(document)
        }

        async fn list(&self, _owner: &OwnerId) -> Result<Vec<Document>, PipelineError> {
            Ok(Vec::new())
        }

        async fn ask(
            &self,
            owner: &OwnerId,
            document_id: Uuid,
            question: &str,
        ) -> Result<ChatAnswer, PipelineError> {
            self.questions.lock().await.push((
                owner.to_string(),
                document_id,
                question.to_string(),
            ));
            match self.mode {
                StubMode::Answer => Ok(ChatAnswer {
                    answer: "Friday\n\n> due Friday".into(),
                    excerpt: Some("due Friday".into()),
                }),
                StubMode::Foreign => Err(PipelineError::PermissionDenied(document_id)),
                StubMode::Overloaded => Err(PipelineError::ProviderOverloaded { attempts: 4 }),
                StubMode::Missing => Err(PipelineError::DocumentNotFound(document_id)),
            }
        }

        async fn history(
            &self,
            _owner: &OwnerId,
            _document_id: Uuid,
        ) -> Result<Vec<Message>, PipelineError> {
            Ok(Vec::new())
        }

        async fn preview(
            &self,
            _owner: &OwnerId,
            _document_id: Uuid,
        ) -> Result<Preview, PipelineError> {
            Ok(Preview::NotAvailable)
        }

        async fn download(
            &self,
            _owner: &OwnerId,
            _document_id: Uuid,
        ) -> Result<DownloadedFile, PipelineError> {
            Ok(DownloadedFile {
                bytes: b"%PDF-1.7".to_vec(),
                mime_type: "application/pdf",
                file_name: "report.pdf".into(),
            })
        }

        async fn delete(&self, _owner: &OwnerId, document_id: Uuid) -> Result<(), PipelineError> {
            Err(PipelineError::DocumentNotFound(document_id))
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot::default()
        }
    }
}
