//! Invocation entry point.
//!
//! One call handles one trigger: parse the source name, run the resize
//! pipeline, then clean up. Every failure goes through the coordinator's
//! failure path and comes back as a value; nothing here panics on bad input.

use crate::{
    models::request::RequestDescriptor,
    services::{
        cleanup_service::{CleanupCoordinator, CleanupError},
        notifier::Notifier,
        object_store::ObjectStore,
        request_parser::{ValidationError, parse_identifier},
        resize_service::{ImageProcessingError, ResizePipeline},
        storage_service::StorageError,
    },
};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument};

/// What the host hands to the worker: the source name (if it has one) and
/// the source bytes.
#[derive(Debug, Clone)]
pub struct Trigger {
    pub name: Option<String>,
    pub payload: Bytes,
}

impl Trigger {
    pub fn new(name: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            name: Some(name.into()),
            payload: payload.into(),
        }
    }
}

/// Result of a successful invocation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Completed {
    pub source_key: String,
    /// Destination keys in upload order (largest size first).
    pub derivatives: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("error getting file properties: {0}")]
    Validation(#[from] ValidationError),
    #[error("error reading source image: {0}")]
    Source(#[source] StorageError),
    #[error("error converting image: {0}")]
    ImageProcessing(#[from] ImageProcessingError),
    #[error("error removing source image: {0}")]
    Cleanup(#[from] CleanupError),
}

#[derive(Clone)]
pub struct ResizeWorker {
    store: Arc<dyn ObjectStore>,
    raw_container: String,
    pipeline: ResizePipeline,
    coordinator: CleanupCoordinator,
}

impl ResizeWorker {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        notifier: Arc<dyn Notifier>,
        raw_container: impl Into<String>,
    ) -> Self {
        let raw_container = raw_container.into();
        Self {
            store: store.clone(),
            raw_container: raw_container.clone(),
            pipeline: ResizePipeline::new(store.clone()),
            coordinator: CleanupCoordinator::new(store, notifier, raw_container),
        }
    }

    /// Handle a source already stored in the raw-uploads container under `key`.
    ///
    /// A failed read takes the same failure path as any other error.
    pub async fn handle_stored(&self, key: String) -> Result<Completed, ProcessError> {
        match self.store.read(&self.raw_container, &key).await {
            Ok(payload) => self.handle(Trigger::new(key, payload)).await,
            Err(err) => Err(self.fail(Some(&key), ProcessError::Source(err)).await),
        }
    }

    #[instrument(skip_all, fields(source = trigger.name.as_deref().unwrap_or_default()))]
    pub async fn handle(&self, trigger: Trigger) -> Result<Completed, ProcessError> {
        let Trigger { name, payload } = trigger;
        let name = name.filter(|n| !n.is_empty());

        let request = match parse(name.as_deref(), payload.len()) {
            Ok(request) => request,
            Err(err) => return Err(self.fail(name.as_deref(), err.into()).await),
        };

        let derivatives = match self.pipeline.run(&request, payload).await {
            Ok(keys) => keys,
            Err(err) => return Err(self.fail(Some(&request.source_key), err.into()).await),
        };

        if let Err(err) = self.coordinator.complete(&request.source_key).await {
            return Err(self.fail(Some(&request.source_key), err.into()).await);
        }

        info!(count = derivatives.len(), "completed: {}", request.source_key);
        Ok(Completed {
            source_key: request.source_key,
            derivatives,
        })
    }

    async fn fail(&self, source_key: Option<&str>, err: ProcessError) -> ProcessError {
        let err = self.coordinator.fail(source_key, err).await;
        error!(error = %err, "invocation failed");
        err
    }
}

fn parse(name: Option<&str>, payload_len: usize) -> Result<RequestDescriptor, ValidationError> {
    match name {
        Some(name) => parse_identifier(name, payload_len),
        None if payload_len == 0 => Err(ValidationError::EmptyPayload),
        None => Err(ValidationError::MissingIdentifier),
    }
}
