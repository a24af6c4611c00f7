pub mod cleanup_service;
pub mod notifier;
pub mod object_store;
pub mod request_parser;
pub mod resize_service;
pub mod storage_service;
pub mod worker_service;
