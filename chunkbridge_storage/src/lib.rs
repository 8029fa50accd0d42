//! The storage driver API for the `chunkbridge` crate.
//!
//! A chunked array is persisted as a set of flat objects: one text metadata record, one object per
//! chunk, and a handful of coordinate index objects. A [`StorageDriver`] moves these objects
//! between memory and a backend (a local directory tree, an S3-compatible bucket, ...).
//!
//! This crate holds everything the backends share:
//!  - the [`Metadata`] record and its wire format,
//!  - the [`ArraySchema`] parsed from the metadata `schema` value,
//!  - the [`StorageDriver`] trait and the [`DriverMode`] initialisation contract,
//!  - the [`CoordinateIndex`] catalog of stored chunks,
//!  - an in-memory driver ([`store::MemoryDriver`]) and driver adapters.
//!
//! ## Licence
//! `chunkbridge_storage` is licensed under either of
//! - the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> or
//! - the MIT license <http://opensource.org/licenses/MIT>, at your option.
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod coordinate_index;
mod driver;
pub mod driver_adapter;
pub mod metadata;
pub mod schema;
pub mod store;


use thiserror::Error;

pub use coordinate_index::{
    read_index, write_index, CoordinateIndex, CoordinateIndexError, Coordinates,
};
pub use driver::{
    check_object_size, DriverMode, StorageDriver, CHUNK_PREFIX, INDEX_PREFIX, MAX_OBJECT_SIZE,
    METADATA_SUFFIX,
};
pub use metadata::{
    coordinate_to_object_name, grid_indices_to_object_name, Compression, Format, Metadata,
    MetadataError,
};
pub use schema::{
    ArraySchema, Attribute, Dimension, SchemaError, SchemaInference, SchemaSession,
    TextSchemaInference, MAX_COORDINATE,
};

/// The type for bytes used in driver read and write methods.
///
/// An alias for [`bytes::Bytes`].
pub type Bytes = bytes::Bytes;

/// A reusable, resizable buffer for [`StorageDriver::read_bytes_into`].
///
/// An alias for [`bytes::BytesMut`].
pub type BytesMut = bytes::BytesMut;

/// A storage driver error.
#[derive(Debug, Error)]
pub enum DriverError {
    /// An unrecognised URL scheme or an invalid driver configuration.
    #[error("{0}")]
    Config(String),
    /// A URL with a malformed bucket, key, or path.
    #[error("{0}")]
    Url(String),
    /// A missing, malformed, or unsupported metadata record.
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    /// A missing or unparsable array schema.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// A backend request failed.
    #[error("{operation} operation on {location} failed. {message}")]
    Storage {
        /// The operation name, e.g. `Get`.
        operation: &'static str,
        /// The object location, e.g. `s3://bucket/prefix/metadata`.
        location: String,
        /// The backend message.
        message: String,
    },
    /// An object exceeds [`MAX_OBJECT_SIZE`].
    #[error("Object {location} size {size} exceeds max allowed {limit}")]
    SizeLimit {
        /// The object location.
        location: String,
        /// The object size in bytes.
        size: u64,
        /// The maximum permitted size in bytes.
        limit: u64,
    },
    /// The array metadata is missing in [`DriverMode::Read`] or [`DriverMode::Update`] mode.
    #[error("Array not found, missing metadata {0}")]
    ArrayNotFound(String),
    /// The array metadata already exists in [`DriverMode::Write`] mode.
    #[error("Array found, metadata exists {0}")]
    ArrayExists(String),
    /// A malformed or mismatched coordinate index.
    #[error(transparent)]
    Index(#[from] CoordinateIndexError),
}

impl DriverError {
    /// Create a [`DriverError::Storage`] from an operation name, location, and any displayable message.
    pub fn storage(
        operation: &'static str,
        location: impl Into<String>,
        message: impl std::fmt::Display,
    ) -> Self {
        Self::Storage {
            operation,
            location: location.into(),
            message: message.to_string(),
        }
    }
}
