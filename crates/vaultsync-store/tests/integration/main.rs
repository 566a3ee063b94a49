//! Integration tests for vaultsync-store
//!
//! Exercises the object_store adapter against the local filesystem and
//! in-memory backends, and runs the directory sync engine end to end
//! through it.

mod common;
