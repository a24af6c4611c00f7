//! Completion/failure notifications sent once per invocation.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

/// What happened to a source object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// All derivatives were written and the source was removed.
    Completed { source_key: String },
    /// The invocation failed. `source_key` is `None` when the trigger carried
    /// no identifier.
    Failed { source_key: Option<String> },
}

#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Notifier that only records the event in the log.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        match &notification {
            Notification::Completed { source_key } => {
                info!(source_key = %source_key, "notify: conversion completed");
            }
            Notification::Failed { source_key } => {
                info!(source_key = ?source_key, "notify: conversion failed");
            }
        }
        Ok(())
    }
}
