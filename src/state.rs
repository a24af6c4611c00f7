use crate::services::{storage_service::StorageService, worker_service::ResizeWorker};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub storage: StorageService,
    pub worker: ResizeWorker,
    /// Uploads into this container trigger the worker.
    pub raw_container: String,
}
