//! Question-answering pipeline: ingestion, grounded turns, and document lifecycle.

mod service;
pub mod types;

pub use service::{DocumentApi, DocumentService};
pub use types::{
    ChatAnswer, DownloadedFile, PipelineError, Preview, TurnStage, UploadRequest,
};
