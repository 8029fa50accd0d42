//! `chunkbridge` moves chunked multidimensional arrays between memory and durable storage.
//!
//! An array is persisted as a set of flat objects under a URL:
//! - `metadata`: a text record of `key<TAB>value` lines (the array schema, compression, format, ...),
//! - `chunks/c_<i0>_<i1>...`: one object per chunk grid cell, and
//! - `index/<n>`: the coordinate index, the sorted list of grid cells that hold a chunk.
//!
//! The metadata record is always written last, so an array without one is incomplete.
//!
//! ## Storage Support
//! | URL scheme          | Driver                                      | Feature        |
//! |---------------------|---------------------------------------------|----------------|
//! | `file://<path>`     | [`filesystem::FilesystemDriver`]            | `filesystem`   |
//! | `s3://<bucket>/<prefix>` | [`object_store::ObjectStoreDriver`]   | `object_store` |
//!
//! Drivers are created from a URL with [`make_driver`], and further schemes can be added with
//! [`register_driver`]. Any type implementing [`storage::StorageDriver`] can be used directly.
//!
//! ## Example
//! ```rust
//! # use std::sync::Arc;
//! use chunkbridge::array::{ArrayReader, ArrayWriter, ArrayWriterOptions};
//! use chunkbridge::storage::{store::MemoryDriver, ArraySchema, Bytes, DriverMode};
//!
//! let schema: ArraySchema = "<v:double> [i=0:99:0:10; j=0:99:0:10]".parse()?;
//! let driver = Arc::new(MemoryDriver::new("memory://example", DriverMode::Write));
//!
//! let mut writer = ArrayWriter::create(driver.clone(), schema, &ArrayWriterOptions::default())?;
//! writer.write_chunk(&[15, 42], Bytes::from_static(b"chunk"))?;
//! writer.finish()?;
//!
//! let reader = ArrayReader::open(Arc::new(driver.with_mode(DriverMode::Read)))?;
//! assert_eq!(reader.read_chunk(&[1, 4])?, Some(Bytes::from_static(b"chunk")));
//! assert_eq!(reader.read_chunk(&[0, 0])?, None);
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Crate Features
//! #### Default
//!  - `filesystem`: Re-export `chunkbridge_filesystem` as `chunkbridge::filesystem` and register `file://`.
//!  - `object_store`: Re-export `chunkbridge_object_store` as `chunkbridge::object_store` and register `s3://`.
//!
//! ## Logging
//! `chunkbridge` logs through the [`log`] facade and never installs a logger.
//! Backend requests are logged at `debug`, failed retry attempts at `warn`, and client
//! initialisation and array finalisation at `info`.
//!
//! ## Licence
//! `chunkbridge` is licensed under either of
//! - the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> or
//! - the MIT license <http://opensource.org/licenses/MIT>, at your option.
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod array;
pub mod registry;

#[cfg(feature = "filesystem")]
pub use chunkbridge_filesystem as filesystem;
#[cfg(feature = "object_store")]
pub use chunkbridge_object_store as object_store;
pub use chunkbridge_storage as storage;

pub use registry::{
    get_global_registry, make_driver, register_driver, Driver, DriverBuilder, DriverRegistry,
};
