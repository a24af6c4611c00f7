#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use image_resizer::{
    models::{container::Container, object::Object},
    services::{
        notifier::{Notification, Notifier, NotifyError},
        object_store::ObjectStore,
        storage_service::{StorageError, StorageResult},
        worker_service::ResizeWorker,
    },
};
use std::{
    collections::{BTreeMap, HashSet},
    io::{self, Cursor},
    sync::{Arc, Mutex},
};
use uuid::Uuid;

pub const RAW: &str = "raw-images";
pub const USER: &str = "12345678";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Upload { container: String, key: String },
    Delete { container: String, key: String },
}

struct Stored {
    data: Bytes,
    content_type: String,
}

/// In-memory object store that records every mutating call.
#[derive(Default)]
pub struct MemoryStore {
    containers: Mutex<BTreeMap<String, BTreeMap<String, Stored>>>,
    calls: Mutex<Vec<Call>>,
    failing_uploads: Mutex<HashSet<String>>,
    failing_deletes: Mutex<bool>,
    failing_reads: Mutex<bool>,
}

impl MemoryStore {
    pub fn with_containers(names: &[&str]) -> Arc<Self> {
        let store = Self::default();
        {
            let mut containers = store.containers.lock().unwrap();
            for name in names {
                containers.insert(name.to_string(), BTreeMap::new());
            }
        }
        Arc::new(store)
    }

    pub fn fail_upload_of(&self, key: &str) {
        self.failing_uploads.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_deletes(&self) {
        *self.failing_deletes.lock().unwrap() = true;
    }

    pub fn fail_reads(&self) {
        *self.failing_reads.lock().unwrap() = true;
    }

    pub fn put(&self, container: &str, key: &str, data: impl Into<Bytes>) {
        self.containers
            .lock()
            .unwrap()
            .get_mut(container)
            .expect("container exists")
            .insert(
                key.to_string(),
                Stored {
                    data: data.into(),
                    content_type: "application/octet-stream".into(),
                },
            );
    }

    pub fn keys(&self, container: &str) -> Vec<String> {
        self.containers
            .lock()
            .unwrap()
            .get(container)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn content_type(&self, container: &str, key: &str) -> Option<String> {
        self.containers
            .lock()
            .unwrap()
            .get(container)?
            .get(key)
            .map(|s| s.content_type.clone())
    }

    pub fn data(&self, container: &str, key: &str) -> Option<Bytes> {
        self.containers
            .lock()
            .unwrap()
            .get(container)?
            .get(key)
            .map(|s| s.data.clone())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn uploaded_keys(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Upload { key, .. } => Some(key),
                Call::Delete { .. } => None,
            })
            .collect()
    }

    pub fn deleted_keys(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Delete { container, key } => Some((container, key)),
                Call::Upload { .. } => None,
            })
            .collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn upload(
        &self,
        container: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<Object> {
        self.calls.lock().unwrap().push(Call::Upload {
            container: container.to_string(),
            key: key.to_string(),
        });
        if self.failing_uploads.lock().unwrap().contains(key) {
            return Err(StorageError::Io(io::Error::other("injected upload failure")));
        }

        let mut containers = self.containers.lock().unwrap();
        let objects = containers
            .get_mut(container)
            .ok_or_else(|| StorageError::ContainerNotFound(container.to_string()))?;
        let size_bytes = data.len() as i64;
        objects.insert(
            key.to_string(),
            Stored {
                data,
                content_type: content_type.to_string(),
            },
        );

        Ok(Object {
            id: Uuid::new_v4(),
            container_id: Uuid::nil(),
            key: key.to_string(),
            content_type: Some(content_type.to_string()),
            size_bytes,
            etag: None,
            last_modified: Utc::now(),
            is_deleted: false,
        })
    }

    async fn read(&self, container: &str, key: &str) -> StorageResult<Bytes> {
        if *self.failing_reads.lock().unwrap() {
            return Err(StorageError::Io(io::Error::other("injected read failure")));
        }
        self.data(container, key)
            .ok_or_else(|| StorageError::ObjectNotFound {
                container: container.to_string(),
                key: key.to_string(),
            })
    }

    async fn delete(&self, container: &str, key: &str) -> StorageResult<()> {
        self.calls.lock().unwrap().push(Call::Delete {
            container: container.to_string(),
            key: key.to_string(),
        });
        if *self.failing_deletes.lock().unwrap() {
            return Err(StorageError::Io(io::Error::other("injected delete failure")));
        }

        let mut containers = self.containers.lock().unwrap();
        containers
            .get_mut(container)
            .and_then(|objects| objects.remove(key))
            .map(|_| ())
            .ok_or_else(|| StorageError::ObjectNotFound {
                container: container.to_string(),
                key: key.to_string(),
            })
    }

    async fn list(&self, container: &str) -> StorageResult<Vec<Object>> {
        let containers = self.containers.lock().unwrap();
        let objects = containers
            .get(container)
            .ok_or_else(|| StorageError::ContainerNotFound(container.to_string()))?;
        Ok(objects
            .iter()
            .map(|(key, stored)| Object {
                id: Uuid::new_v4(),
                container_id: Uuid::nil(),
                key: key.clone(),
                content_type: Some(stored.content_type.clone()),
                size_bytes: stored.data.len() as i64,
                etag: None,
                last_modified: Utc::now(),
                is_deleted: false,
            })
            .collect())
    }

    async fn create_container(&self, name: &str) -> StorageResult<Container> {
        let mut containers = self.containers.lock().unwrap();
        if containers.contains_key(name) {
            return Err(StorageError::ContainerAlreadyExists(name.to_string()));
        }
        containers.insert(name.to_string(), BTreeMap::new());
        Ok(Container {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: Utc::now(),
        })
    }

    async fn delete_container(&self, name: &str) -> StorageResult<()> {
        self.containers
            .lock()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::ContainerNotFound(name.to_string()))
    }
}

/// Notifier that remembers what it was told.
#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
    failing: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn fail(&self) {
        *self.failing.lock().unwrap() = true;
    }

    pub fn seen(&self) -> Vec<Notification> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        self.seen.lock().unwrap().push(notification);
        if *self.failing.lock().unwrap() {
            return Err(NotifyError("injected notify failure".into()));
        }
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub worker: ResizeWorker,
}

pub fn harness() -> Harness {
    let store = MemoryStore::with_containers(&[RAW, USER]);
    let notifier = Arc::new(RecordingNotifier::default());
    let worker = ResizeWorker::new(store.clone(), notifier.clone(), RAW);
    Harness {
        store,
        notifier,
        worker,
    }
}

pub fn sample_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
    }))
}

pub fn png_bytes(width: u32, height: u32) -> Bytes {
    encode(sample_image(width, height), ImageFormat::Png)
}

pub fn jpeg_bytes(width: u32, height: u32) -> Bytes {
    let rgb = DynamicImage::ImageRgb8(sample_image(width, height).to_rgb8());
    encode(rgb, ImageFormat::Jpeg)
}

pub fn bmp_bytes(width: u32, height: u32) -> Bytes {
    encode(sample_image(width, height), ImageFormat::Bmp)
}

fn encode(image: DynamicImage, format: ImageFormat) -> Bytes {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, format).unwrap();
    Bytes::from(buf.into_inner())
}
