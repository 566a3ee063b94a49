//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the sync and schedule
//! core depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IObjectStore`] - Key-addressed blob storage (S3 and friends)
//! - [`IObjectStoreFactory`] - Builds an [`IObjectStore`] for a resolved config
//! - [`IDumpProducer`] - Produces a database dump as bytes

pub mod dump_producer;
pub mod object_store;

pub use dump_producer::IDumpProducer;
pub use object_store::{
    is_not_found, IObjectStore, IObjectStoreFactory, ObjectMetadata, ObjectNotFound,
};
