//! KeelFS Common - Shared types and utilities
//!
//! This crate provides the error model and the local-filesystem
//! capability used across KeelFS metadata components.

pub mod error;
pub mod fs;

pub use error::{Error, QuotaKind, Result};
pub use fs::{DiskFileSystem, LocalFileSystem};
