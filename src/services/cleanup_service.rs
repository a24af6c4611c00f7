//! Source removal and notifications once an invocation has an outcome.
//!
//! Errors raised here never replace the error that sent an invocation down
//! the failure path; they are logged and dropped.

use crate::services::{
    notifier::{Notification, Notifier, NotifyError},
    object_store::ObjectStore,
    storage_service::StorageError,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("failed to delete source `{key}`: {source}")]
    DeleteSource {
        key: String,
        #[source]
        source: StorageError,
    },
    #[error(transparent)]
    Notify(#[from] NotifyError),
}

#[derive(Clone)]
pub struct CleanupCoordinator {
    store: Arc<dyn ObjectStore>,
    notifier: Arc<dyn Notifier>,
    raw_container: String,
}

impl CleanupCoordinator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        notifier: Arc<dyn Notifier>,
        raw_container: impl Into<String>,
    ) -> Self {
        Self {
            store,
            notifier,
            raw_container: raw_container.into(),
        }
    }

    /// Success path: remove the source, then announce completion.
    ///
    /// Only the deletion can fail this call; a failed notification is logged.
    pub async fn complete(&self, source_key: &str) -> Result<(), CleanupError> {
        self.delete_source(source_key).await?;

        let notification = Notification::Completed {
            source_key: source_key.to_string(),
        };
        if let Err(err) = self.notifier.notify(notification).await {
            warn!(error = %CleanupError::from(err), source_key, "completion notification failed");
        }
        Ok(())
    }

    /// Failure path: best-effort source removal and a failure notification.
    /// Hands `error` back untouched.
    pub async fn fail<E>(&self, source_key: Option<&str>, error: E) -> E {
        match source_key {
            Some(key) => {
                if let Err(err) = self.delete_source(key).await {
                    warn!(error = %err, "could not remove source after failure");
                }
            }
            None => warn!("source name unknown, nothing to delete"),
        }

        let notification = Notification::Failed {
            source_key: source_key.map(str::to_string),
        };
        if let Err(err) = self.notifier.notify(notification).await {
            warn!(error = %CleanupError::from(err), "failure notification failed");
        }

        error
    }

    /// A source that is already gone counts as deleted.
    async fn delete_source(&self, key: &str) -> Result<(), CleanupError> {
        match self.store.delete(&self.raw_container, key).await {
            Ok(()) => {
                debug!(container = %self.raw_container, key, "source removed");
                Ok(())
            }
            Err(StorageError::ObjectNotFound { .. }) => {
                debug!(container = %self.raw_container, key, "source already removed");
                Ok(())
            }
            Err(source) => Err(CleanupError::DeleteSource {
                key: key.to_string(),
                source,
            }),
        }
    }
}
