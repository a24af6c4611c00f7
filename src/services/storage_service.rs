//! src/services/storage_service.rs
//!
//! StorageService — local object store backed by SQLite for metadata and
//! local disk for payloads. Payloads are sharded beneath
//! `base_path/{container}/{shard}/{shard}/{key}`.

use crate::{
    models::{container::Container, object::Object},
    services::object_store::ObjectStore,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut, stream};
use md5::Context;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

/// Schema applied by [`run_migrations`].
const INIT_SQL: &str = include_str!("../../migrations/0001_init.sql");

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("container `{0}` not found")]
    ContainerNotFound(String),
    #[error("container `{0}` already exists")]
    ContainerAlreadyExists(String),
    #[error("container `{name}` invalid: {reason}")]
    InvalidContainerName { name: String, reason: String },
    #[error("object `{key}` not found in container `{container}`")]
    ObjectNotFound { container: String, key: String },
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Apply the embedded schema. Every statement is idempotent.
pub async fn run_migrations(db: &SqlitePool) -> StorageResult<()> {
    let statements = INIT_SQL
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    debug!("running {} migration statements", statements.len());

    for stmt in statements {
        sqlx::query(stmt).execute(db).await?;
    }

    Ok(())
}

/// StorageService provides the container/object operations the worker and
/// the HTTP host need:
/// - Upload an object (writes bytes to disk and upserts metadata)
/// - Read an object (metadata from SQLite, payload from disk)
/// - List live objects of a container
/// - Delete an object (soft-delete in SQLite and remove the file)
/// - Create and delete containers
#[derive(Clone)]
pub struct StorageService {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,
}

const MAX_OBJECT_KEY_LEN: usize = 1024;
const CONTAINER_NAME_MIN_LEN: usize = 3;
const CONTAINER_NAME_MAX_LEN: usize = 63;

impl StorageService {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Rejects empty or oversized keys, keys starting with `/`, keys
    /// containing `..`, backslashes or control characters.
    ///
    /// Source keys carry the request in their name, so `:` is allowed.
    fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(StorageError::InvalidObjectKey);
        }
        if key.starts_with('/') || key.contains("..") {
            return Err(StorageError::InvalidObjectKey);
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(StorageError::InvalidObjectKey);
        }
        Ok(())
    }

    /// Validate container name format.
    ///
    /// - 3–63 characters
    /// - lowercase letters, digits, dots, hyphens only
    /// - cannot start/end with dot or hyphen
    /// - cannot contain consecutive dots or dot-hyphen patterns
    /// - cannot look like an IPv4 address
    fn ensure_container_name_safe(&self, name: &str) -> StorageResult<()> {
        let invalid = |reason: &str| {
            Err(StorageError::InvalidContainerName {
                name: name.to_string(),
                reason: reason.into(),
            })
        };

        let len = name.len();
        if !(CONTAINER_NAME_MIN_LEN..=CONTAINER_NAME_MAX_LEN).contains(&len) {
            return invalid("must be between 3 and 63 characters");
        }

        if !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
        {
            return invalid("allowed characters are lowercase letters, digits, dots, and hyphens");
        }

        if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
            return invalid("must start and end with a lowercase letter or digit");
        }

        if name.contains("..") || name.contains("-.") || name.contains(".-") {
            return invalid("cannot contain consecutive dots or dot-hyphen combinations");
        }

        if is_ipv4_like(name) {
            return invalid("must not be formatted like an IP address");
        }

        Ok(())
    }

    fn container_root(&self, container: &str) -> PathBuf {
        self.base_path.join(container)
    }

    /// Two-level shard directories from MD5(container/key), as lowercase hex.
    fn object_shards(container: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", container, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// `base_path/container/{shard}/{shard}/{key}`. Parents may not exist yet.
    fn object_path(&self, container: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(container, key);
        let mut path = self.container_root(container);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    async fn fetch_container(&self, name: &str) -> StorageResult<Container> {
        self.ensure_container_name_safe(name)?;
        sqlx::query_as::<_, Container>(
            "SELECT id, name, created_at FROM containers WHERE name = ?",
        )
        .bind(name)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StorageError::ContainerNotFound(name.to_string()),
            other => StorageError::Sqlx(other),
        })
    }

    async fn fetch_object(&self, container: &Container, key: &str) -> StorageResult<Object> {
        sqlx::query_as::<_, Object>(
            "SELECT id, container_id, key, content_type, size_bytes, etag,
                    last_modified, is_deleted
             FROM objects
             WHERE key = ? AND container_id = ? AND is_deleted = 0",
        )
        .bind(key)
        .bind(container.id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StorageError::ObjectNotFound {
                container: container.name.clone(),
                key: key.to_string(),
            },
            other => StorageError::Sqlx(other),
        })
    }

    /// Stream an object to disk and upsert its metadata.
    ///
    /// Bytes go to a temp file first (size and MD5 computed on the way),
    /// are fsynced, then renamed into place. Temp files are removed on error.
    pub async fn upload_object_stream<S>(
        &self,
        container: &str,
        key: &str,
        content_type: Option<String>,
        stream: S,
    ) -> StorageResult<Object>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        self.ensure_key_safe(key)?;
        let container_rec = self.fetch_container(container).await?;

        let file_path = self.object_path(&container_rec.name, key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let written = write_temp_file(&tmp_path, stream).await;
        let (size_bytes, etag) = match written {
            Ok(v) => v,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        };

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }

        let insert_result = sqlx::query_as::<_, Object>(
            r#"
            INSERT INTO objects (
                id, container_id, key, content_type, size_bytes,
                etag, last_modified, is_deleted
            ) VALUES (?, ?, ?, ?, ?, ?, ?, 0)
            ON CONFLICT(container_id, key) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                last_modified = excluded.last_modified,
                is_deleted = 0
            RETURNING id, container_id, key, content_type, size_bytes,
                      etag, last_modified, is_deleted
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(container_rec.id)
        .bind(key)
        .bind(content_type)
        .bind(size_bytes)
        .bind(&etag)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await;

        match insert_result {
            Ok(obj) => {
                debug!(container, key, size_bytes, "object stored");
                Ok(obj)
            }
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(StorageError::Sqlx(err))
            }
        }
    }

    /// Metadata plus an open file handle ready for streaming out.
    pub async fn get_object_reader(
        &self,
        container: &str,
        key: &str,
    ) -> StorageResult<(Object, File)> {
        self.ensure_key_safe(key)?;
        let container_rec = self.fetch_container(container).await?;
        let object = self.fetch_object(&container_rec, key).await?;

        let file_path = self.object_path(&container_rec.name, key);
        let file = File::open(&file_path)
            .await
            .map_err(|err| missing_as_not_found(err, container, key))?;

        Ok((object, file))
    }

    pub async fn get_object_metadata(&self, container: &str, key: &str) -> StorageResult<Object> {
        self.ensure_key_safe(key)?;
        let container_rec = self.fetch_container(container).await?;
        self.fetch_object(&container_rec, key).await
    }

    /// Soft-delete an object and remove its payload.
    ///
    /// Repeated calls return ObjectNotFound once the object is gone.
    pub async fn delete_object(&self, container: &str, key: &str) -> StorageResult<Object> {
        self.ensure_key_safe(key)?;
        let container_rec = self.fetch_container(container).await?;
        let object = self.fetch_object(&container_rec, key).await?;

        let result =
            sqlx::query("UPDATE objects SET is_deleted = 1 WHERE key = ? AND container_id = ?")
                .bind(key)
                .bind(container_rec.id)
                .execute(&*self.db)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::ObjectNotFound {
                container: container.to_string(),
                key: key.to_string(),
            });
        }

        let file_path = self.object_path(&container_rec.name, key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(StorageError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            let root = self.container_root(&container_rec.name);
            self.prune_empty_dirs(parent, &root).await;
        }

        Ok(object)
    }

    /// Live objects of a container, ordered by key.
    pub async fn list_objects(&self, container: &str) -> StorageResult<Vec<Object>> {
        let container_rec = self.fetch_container(container).await?;
        let rows = sqlx::query_as::<_, Object>(
            "SELECT id, container_id, key, content_type, size_bytes, etag,
                    last_modified, is_deleted
             FROM objects
             WHERE container_id = ? AND is_deleted = 0
             ORDER BY key ASC",
        )
        .bind(container_rec.id)
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }

    /// Create a container and its directory.
    pub async fn create_container(&self, name: &str) -> StorageResult<Container> {
        self.ensure_container_name_safe(name)?;
        fs::create_dir_all(self.container_root(name)).await?;

        let container = Container {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: Utc::now(),
        };

        match sqlx::query("INSERT INTO containers (id, name, created_at) VALUES (?, ?, ?)")
            .bind(container.id)
            .bind(&container.name)
            .bind(container.created_at)
            .execute(&*self.db)
            .await
        {
            Ok(_) => Ok(container),
            Err(err) if is_unique_violation(&err) => {
                Err(StorageError::ContainerAlreadyExists(name.to_string()))
            }
            Err(err) => Err(StorageError::Sqlx(err)),
        }
    }

    /// Create the container unless it already exists.
    pub async fn ensure_container(&self, name: &str) -> StorageResult<()> {
        match self.create_container(name).await {
            Ok(_) | Err(StorageError::ContainerAlreadyExists(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Delete a container with all of its objects, then its directory.
    pub async fn delete_container(&self, name: &str) -> StorageResult<()> {
        let container = self.fetch_container(name).await?;

        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM objects WHERE container_id = ?")
            .bind(container.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM containers WHERE id = ?")
            .bind(container.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        let root = self.container_root(name);
        if let Err(err) = fs::remove_dir_all(&root).await {
            if err.kind() != ErrorKind::NotFound {
                debug!(
                    "failed to remove container directory {} after delete: {}",
                    root.display(),
                    err
                );
            }
        }

        Ok(())
    }

    /// Remove empty directories from `start` up to (not including) `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err)
                    if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::DirectoryNotEmpty) =>
                {
                    break;
                }
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStore for StorageService {
    async fn upload(
        &self,
        container: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<Object> {
        let body = stream::once(async move { Ok::<_, io::Error>(data) });
        self.upload_object_stream(container, key, Some(content_type.to_string()), body)
            .await
    }

    async fn read(&self, container: &str, key: &str) -> StorageResult<Bytes> {
        self.ensure_key_safe(key)?;
        let container_rec = self.fetch_container(container).await?;
        self.fetch_object(&container_rec, key).await?;

        let file_path = self.object_path(&container_rec.name, key);
        let data = fs::read(&file_path)
            .await
            .map_err(|err| missing_as_not_found(err, container, key))?;
        Ok(Bytes::from(data))
    }

    async fn delete(&self, container: &str, key: &str) -> StorageResult<()> {
        self.delete_object(container, key).await.map(|_| ())
    }

    async fn list(&self, container: &str) -> StorageResult<Vec<Object>> {
        self.list_objects(container).await
    }

    async fn create_container(&self, name: &str) -> StorageResult<Container> {
        StorageService::create_container(self, name).await
    }

    async fn delete_container(&self, name: &str) -> StorageResult<()> {
        StorageService::delete_container(self, name).await
    }
}

/// Write the stream into a fresh file, returning (size, md5 hex).
async fn write_temp_file<S>(path: &Path, stream: S) -> io::Result<(i64, String)>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    let mut file = File::create(path).await?;
    let mut size_bytes: i64 = 0;
    let mut digest = Context::new();

    pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        size_bytes += chunk.len() as i64;
        digest.consume(&chunk);
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;

    Ok((size_bytes, format!("{:x}", digest.compute())))
}

fn missing_as_not_found(err: io::Error, container: &str, key: &str) -> StorageError {
    if err.kind() == ErrorKind::NotFound {
        StorageError::ObjectNotFound {
            container: container.to_string(),
            key: key.to_string(),
        }
    } else {
        StorageError::Io(err)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

/// True for dotted-decimal names like `1.2.3.4`.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}
