use crate::config::{JSON_EXT, TRANSFORM_TIMEOUT};
use crate::services::transform::Transformer;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// What the supervising task observed before it stopped waiting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformOutcome {
    Completed(String),
    Failed(String),
    TimedOut,
}

/// Launches post-upload work for closed sessions without blocking the closer.
#[derive(Clone)]
pub struct PostUploadDispatcher {
    transformer: Arc<dyn Transformer>,
    timeout: Duration,
}

impl PostUploadDispatcher {
    pub fn new(transformer: Arc<dyn Transformer>) -> Self {
        Self::with_timeout(transformer, TRANSFORM_TIMEOUT)
    }

    pub fn with_timeout(transformer: Arc<dyn Transformer>, timeout: Duration) -> Self {
        Self {
            transformer,
            timeout,
        }
    }

    pub fn is_json(identifier: &str) -> bool {
        identifier.ends_with(JSON_EXT) && identifier.len() > JSON_EXT.len()
    }

    /// Schedules the JSON transform for `identifier` and returns at once.
    ///
    /// Non-JSON uploads are ignored and yield `None`. The returned handle resolves
    /// when the supervisor stops waiting; callers are free to drop it. On timeout
    /// the transform is not cancelled and keeps running on the blocking pool.
    pub fn dispatch(&self, identifier: &str) -> Option<JoinHandle<TransformOutcome>> {
        if !Self::is_json(identifier) {
            return None;
        }

        let transformer = self.transformer.clone();
        let timeout = self.timeout;
        let identifier = identifier.to_string();

        Some(tokio::spawn(async move {
            let source = identifier.clone();
            let work = tokio::task::spawn_blocking(move || transformer.transform(&source));

            tokio::select! {
                res = work => match res {
                    Ok(Ok(processed)) => {
                        tracing::info!("processed JSON for file {} into {}", identifier, processed);
                        TransformOutcome::Completed(processed)
                    }
                    Ok(Err(e)) => {
                        tracing::error!("error in processing JSON for file {}: {}", identifier, e);
                        TransformOutcome::Failed(e.to_string())
                    }
                    Err(e) => {
                        tracing::error!("JSON processing task for file {} panicked: {}", identifier, e);
                        TransformOutcome::Failed(e.to_string())
                    }
                },
                _ = sleep(timeout) => {
                    tracing::warn!("could not process JSON for file {} due to timeout", identifier);
                    TransformOutcome::TimedOut
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_json() {
        assert!(PostUploadDispatcher::is_json("abc.json"));
        assert!(!PostUploadDispatcher::is_json("abc.JSON"));
        assert!(!PostUploadDispatcher::is_json("abc.txt"));
        assert!(!PostUploadDispatcher::is_json("abcjson"));
        assert!(!PostUploadDispatcher::is_json(".json"));
        assert!(!PostUploadDispatcher::is_json("abc"));
    }
}
