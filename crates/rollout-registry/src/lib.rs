//! Rollout Registry - the set of known deployment targets
//!
//! This crate provides the target registry:
//!
//! - **TargetRegistry**: get / upsert / list / decommission of [`Target`] records
//! - **InMemoryTargetRegistry**: `DashMap` arena for tests and embedding
//! - **FileTargetRegistry**: one JSON document per target, written durably
//!   before `upsert` returns
//!
//! Writers are serialized per target by the reconciler's lock together with
//! the registry's [`TargetClaim`], which extends that lock across processes
//! for the file registry. Each `upsert` replaces the whole record
//! atomically.
//!
//! [`Target`]: rollout_types::Target

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod error;
pub mod file;
pub mod memory;
pub mod registry;

// Re-exports
pub use error::{RegistryError, Result};
pub use file::FileTargetRegistry;
pub use memory::InMemoryTargetRegistry;
pub use registry::{TargetClaim, TargetFilter, TargetRegistry, TargetSnapshot};
