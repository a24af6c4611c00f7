//! Core data models for the image resizer.
//!
//! `container` and `object` map to database tables via `sqlx::FromRow`;
//! `request` is the validated resize request the worker operates on.

pub mod container;
pub mod object;
pub mod request;
