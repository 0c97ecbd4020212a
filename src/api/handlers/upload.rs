use crate::AppState;
use crate::api::error::AppError;
// Only referenced from `#[utoipa::path]` below; the bare name keeps the $ref at #/components/schemas/ErrorResponse.
#[allow(unused_imports)]
use crate::api::error::ErrorResponse;
use crate::services::stream::{
    CallContext, FileInfo, StreamError, UploadRequest, UploadResponse, UploadStream,
};
use async_trait::async_trait;
use axum::{
    Json,
    body::{Body, BodyDataStream},
    extract::State,
    http::HeaderMap,
};
use futures::StreamExt;
use std::path::Path;
use tokio::time::Instant;

pub const FILE_NAME_HEADER: &str = "x-file-name";
pub const FILE_TYPE_HEADER: &str = "x-file-type";

/// Reads the file info of an HTTP upload from its headers.
///
/// `x-file-type` falls back to the extension of `x-file-name` when absent.
pub fn file_info_from_headers(headers: &HeaderMap) -> Result<FileInfo, StreamError> {
    let header = |name: &str| -> Result<Option<String>, StreamError> {
        headers
            .get(name)
            .map(|v| {
                v.to_str()
                    .map(str::to_string)
                    .map_err(|_| StreamError::new(format!("{} header is not valid text", name)))
            })
            .transpose()
    };

    let file_name = header(FILE_NAME_HEADER)?
        .filter(|name| !name.is_empty())
        .ok_or_else(|| StreamError::new(format!("missing {} header", FILE_NAME_HEADER)))?;

    let file_type = match header(FILE_TYPE_HEADER)? {
        Some(file_type) => file_type,
        None => Path::new(&file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default(),
    };

    Ok(FileInfo {
        file_name,
        file_type,
    })
}

/// An HTTP request body seen as an upload stream: the headers form the info
/// message and every body frame is one chunk.
pub struct BodyUploadStream {
    info: Option<Result<FileInfo, StreamError>>,
    body: BodyDataStream,
    context: CallContext,
    response: Option<UploadResponse>,
}

impl BodyUploadStream {
    pub fn new(info: Result<FileInfo, StreamError>, body: Body, context: CallContext) -> Self {
        Self {
            info: Some(info),
            body: body.into_data_stream(),
            context,
            response: None,
        }
    }

    pub fn response(&self) -> Option<&UploadResponse> {
        self.response.as_ref()
    }
}

#[async_trait]
impl UploadStream for BodyUploadStream {
    async fn recv(&mut self) -> Result<Option<UploadRequest>, StreamError> {
        if let Some(info) = self.info.take() {
            return info.map(|info| Some(UploadRequest::Info(info)));
        }

        match self.body.next().await {
            None => Ok(None),
            Some(Ok(chunk)) => Ok(Some(UploadRequest::Chunk(chunk))),
            Some(Err(e)) => Err(StreamError::new(e.to_string())),
        }
    }

    async fn send_and_close(&mut self, response: UploadResponse) -> Result<(), StreamError> {
        if self.response.is_some() {
            return Err(StreamError::new("response already sent"));
        }
        self.response = Some(response);
        Ok(())
    }

    fn context(&self) -> &CallContext {
        &self.context
    }
}

#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = Vec<u8>, description = "Raw file content, streamed", content_type = "application/octet-stream"),
    params(
        ("x-file-name" = String, Header, description = "Original file name"),
        ("x-file-type" = Option<String>, Header, description = "File extension including the dot, e.g. .json")
    ),
    responses(
        (status = 200, description = "File uploaded successfully", body = UploadResponse),
        (status = 400, description = "Missing file info or broken stream", body = ErrorResponse),
        (status = 408, description = "Upload deadline exceeded", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse),
        (status = 503, description = "Server shutting down", body = ErrorResponse)
    ),
    tag = "files"
)]
pub async fn upload_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<UploadResponse>, AppError> {
    let context = CallContext::new(
        state.shutdown.child_token(),
        Some(Instant::now() + state.config.upload_timeout),
    );
    let mut stream = BodyUploadStream::new(file_info_from_headers(&headers), body, context);

    let response = state.upload_service.upload(&mut stream).await?;
    Ok(Json(response))
}
