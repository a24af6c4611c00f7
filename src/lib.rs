//! Image resizer: turns one uploaded source image into per-size derivatives
//! in the owner's container, then removes the source.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
