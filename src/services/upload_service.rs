use crate::services::dispatcher::{PostUploadDispatcher, TransformOutcome};
use crate::services::registry::{RegistryError, UploadRegistry};
use crate::services::stream::{
    ContextError, StreamError, UploadRequest, UploadResponse, UploadStream,
};
use crate::utils::ids::IdGenerator;
use crate::utils::validation::validate_file_type;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Coarse classification surfaced to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidArgument,
    Internal,
    Unknown,
    Canceled,
    DeadlineExceeded,
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("file info not received: {0}")]
    InfoNotReceived(String),

    #[error("invalid file type: {0}")]
    InvalidFileType(String),

    #[error("could not create file: {0}")]
    CreateFile(#[source] RegistryError),

    #[error("request canceled")]
    Canceled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("cannot receive file chunk: {0}")]
    Receive(#[source] StreamError),

    #[error("file size too large: {size} > {max}")]
    FileTooLarge { size: u64, max: u64 },

    #[error("cannot write chunk data: {0}")]
    WriteChunk(#[source] RegistryError),

    #[error("cannot send response: {0}")]
    SendResponse(#[source] StreamError),
}

impl UploadError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            UploadError::InvalidFileType(_) | UploadError::FileTooLarge { .. } => {
                ErrorCategory::InvalidArgument
            }
            UploadError::CreateFile(_) | UploadError::WriteChunk(_) => ErrorCategory::Internal,
            UploadError::InfoNotReceived(_)
            | UploadError::Receive(_)
            | UploadError::SendResponse(_) => ErrorCategory::Unknown,
            UploadError::Canceled => ErrorCategory::Canceled,
            UploadError::DeadlineExceeded => ErrorCategory::DeadlineExceeded,
        }
    }
}

impl From<ContextError> for UploadError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::Canceled => UploadError::Canceled,
            ContextError::DeadlineExceeded => UploadError::DeadlineExceeded,
        }
    }
}

// Every failure goes through here exactly once, at the point it is detected.
fn log_error(err: UploadError) -> UploadError {
    tracing::error!("upload failed: {}", err);
    err
}

pub struct UploadService {
    registry: Arc<UploadRegistry>,
    dispatcher: PostUploadDispatcher,
    ids: Arc<dyn IdGenerator>,
    max_file_size: u64,
}

impl UploadService {
    pub fn new(
        registry: Arc<UploadRegistry>,
        dispatcher: PostUploadDispatcher,
        ids: Arc<dyn IdGenerator>,
        max_file_size: u64,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            ids,
            max_file_size,
        }
    }

    pub fn registry(&self) -> &Arc<UploadRegistry> {
        &self.registry
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Generates a storage identifier for `file_type` and opens it.
    pub async fn init(&self, file_type: &str) -> Result<String, RegistryError> {
        let identifier = format!("{}{}", self.ids.generate(), file_type);
        self.registry.open(&identifier).await?;
        Ok(identifier)
    }

    pub async fn save_chunk(&self, identifier: &str, chunk: &[u8]) -> Result<(), RegistryError> {
        self.registry.write(identifier, chunk).await
    }

    /// Releases the session and hands JSON uploads to the dispatcher.
    ///
    /// Returns the supervising task of a dispatched transform; nothing waits on it
    /// during an upload.
    pub async fn close(&self, identifier: &str) -> Option<JoinHandle<TransformOutcome>> {
        if !self.registry.close(identifier).await {
            return None;
        }
        self.dispatcher.dispatch(identifier)
    }

    /// Runs one client-streaming upload to completion.
    ///
    /// The first message must be the file info; every following chunk is appended
    /// in arrival order. The session is closed on every exit from the chunk loop,
    /// before the response is sent.
    pub async fn upload<S>(&self, stream: &mut S) -> Result<UploadResponse, UploadError>
    where
        S: UploadStream + ?Sized,
    {
        let info = match stream.recv().await {
            Ok(Some(UploadRequest::Info(info))) => info,
            Ok(Some(UploadRequest::Chunk(_))) => {
                return Err(log_error(UploadError::InfoNotReceived(
                    "first message carried a chunk".to_string(),
                )));
            }
            Ok(None) => {
                return Err(log_error(UploadError::InfoNotReceived(
                    "stream closed before file info".to_string(),
                )));
            }
            Err(e) => return Err(log_error(UploadError::InfoNotReceived(e.to_string()))),
        };

        tracing::info!("upload request received for {}", info.file_name);

        validate_file_type(&info.file_type)
            .map_err(|e| log_error(UploadError::InvalidFileType(e.to_string())))?;

        let identifier = self
            .init(&info.file_type)
            .await
            .map_err(|e| log_error(UploadError::CreateFile(e)))?;

        let received = self.receive_chunks(stream, &identifier).await;
        self.close(&identifier).await;
        let size = received?;

        let response = UploadResponse {
            id: identifier.clone(),
            size: u32::try_from(size).unwrap_or(u32::MAX),
        };

        stream
            .send_and_close(response.clone())
            .await
            .map_err(|e| log_error(UploadError::SendResponse(e)))?;

        tracing::info!(
            "saved file {} as {} and size {}",
            info.file_name,
            identifier,
            size
        );

        Ok(response)
    }

    async fn receive_chunks<S>(&self, stream: &mut S, identifier: &str) -> Result<u64, UploadError>
    where
        S: UploadStream + ?Sized,
    {
        let mut file_size: u64 = 0;

        loop {
            if let Some(e) = stream.context().err() {
                return Err(log_error(e.into()));
            }

            tracing::debug!("waiting for next chunk");

            let chunk = match stream.recv().await {
                Ok(None) => {
                    tracing::debug!("end of file upload");
                    break;
                }
                Ok(Some(UploadRequest::Chunk(chunk))) => chunk,
                Ok(Some(UploadRequest::Info(_))) => {
                    tracing::warn!("ignoring repeated file info for {}", identifier);
                    continue;
                }
                Err(e) => return Err(log_error(UploadError::Receive(e))),
            };

            tracing::debug!("received chunk with size: {}", chunk.len());

            file_size += chunk.len() as u64;
            if file_size > self.max_file_size {
                return Err(log_error(UploadError::FileTooLarge {
                    size: file_size,
                    max: self.max_file_size,
                }));
            }

            self.save_chunk(identifier, &chunk)
                .await
                .map_err(|e| log_error(UploadError::WriteChunk(e)))?;
        }

        Ok(file_size)
    }
}
