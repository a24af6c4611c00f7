//! Routes of the resizer host.
//!
//! - `GET    /healthz`, `GET /readyz` — probes
//! - `POST   /invocations/{*name}` — run one invocation, body is the source image
//! - `GET    /{container}` — list objects
//! - `PUT    /{container}` — create container
//! - `DELETE /{container}` — delete container
//! - `PUT    /{container}/{*key}` — upload object (triggers the worker in the
//!   raw-uploads container)
//! - `GET    /{container}/{*key}` — download object
//! - `HEAD   /{container}/{*key}` — metadata only
//! - `DELETE /{container}/{*key}` — soft-delete object

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        invocation_handlers::{MAX_INVOCATION_BYTES, invoke},
        object_handlers::{
            create_container, delete_container, delete_object, get_object, head_object,
            list_objects, upload_object,
        },
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route(
            "/invocations/{*name}",
            post(invoke).layer(DefaultBodyLimit::max(MAX_INVOCATION_BYTES)),
        )
        .route(
            "/{container}/{*key}",
            put(upload_object)
                .get(get_object)
                .head(head_object)
                .delete(delete_object),
        )
        .route(
            "/{container}",
            get(list_objects)
                .put(create_container)
                .delete(delete_container),
        )
}
