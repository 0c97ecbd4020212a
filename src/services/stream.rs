//! Message-level view of a client-streaming upload call.
//!
//! The ingest controller only talks to [`UploadStream`]; framing and transport
//! live in the adapters (the HTTP handler, the in-memory streams in tests).

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

/// Metadata sent once, as the first message of an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub file_name: String,
    pub file_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadRequest {
    Info(FileInfo),
    Chunk(Bytes),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub id: String,
    pub size: u32,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct StreamError(pub String);

impl StreamError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Why a call context stopped accepting work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    Canceled,
    DeadlineExceeded,
}

/// Cancellation signal and optional deadline of one call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    pub fn new(cancel: CancellationToken, deadline: Option<Instant>) -> Self {
        Self { cancel, deadline }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancellation wins over an expired deadline.
    pub fn err(&self) -> Option<ContextError> {
        if self.cancel.is_cancelled() {
            return Some(ContextError::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }
}

#[async_trait]
pub trait UploadStream: Send {
    /// Next message, or `Ok(None)` once the sender closed the stream.
    async fn recv(&mut self) -> Result<Option<UploadRequest>, StreamError>;

    /// Sends the single response of the call.
    async fn send_and_close(&mut self, response: UploadResponse) -> Result<(), StreamError>;

    fn context(&self) -> &CallContext;
}
