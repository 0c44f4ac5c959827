//! Core types for the tablekit data-access layer.
//!
//! This crate has no AWS dependency. It defines:
//!
//! - [`model`]: the plain storage value representation, record schemas,
//!   coercion and explicit validation.
//! - [`storage`]: the native item-store contract implemented by the storage
//!   backends, plus the error taxonomy shared by every layer.

pub mod model;
pub mod storage;
