#![deny(missing_docs)]

//! Core library for the Docchat grounded document assistant.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Document records, format classification, and text extraction.
pub mod document;
/// On-disk storage for uploaded files.
pub mod files;
/// Structured logging and tracing setup.
pub mod logging;
/// Service counters exposed for observability.
pub mod metrics;
/// Request orchestration: ingestion, grounded answers, history, deletion.
pub mod pipeline;
/// Grounding prompt construction and answer parsing.
pub mod prompt;
/// Reasoning provider abstraction, Gemini adapter, and retry policy.
pub mod provider;
/// Document and conversation persistence backends.
pub mod store;
