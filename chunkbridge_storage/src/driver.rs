use std::fmt::Debug;

use auto_impl::auto_impl;
use derive_more::Display;

use crate::{Bytes, BytesMut, DriverError, Metadata, MetadataError};

/// The maximum size of a single object: 2 GiB.
pub const MAX_OBJECT_SIZE: u64 = 2_147_483_648;

/// The suffix of the metadata object.
pub const METADATA_SUFFIX: &str = "metadata";

/// The prefix of chunk objects.
pub const CHUNK_PREFIX: &str = "chunks/";

/// The prefix of coordinate index objects.
pub const INDEX_PREFIX: &str = "index/";

/// The access mode of a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum DriverMode {
    /// Read an existing array.
    #[display("read")]
    Read,
    /// Create a new array.
    #[display("write")]
    Write,
    /// Modify an existing array.
    #[display("update")]
    Update,
}

impl DriverMode {
    /// Returns true if the mode permits writes.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        matches!(self, Self::Write | Self::Update)
    }

    /// Check whether the existence of the metadata object at `location` is permitted in this mode.
    ///
    /// # Errors
    /// Returns [`DriverError::ArrayNotFound`] if the metadata is absent in [`Read`](DriverMode::Read)
    /// or [`Update`](DriverMode::Update) mode, and [`DriverError::ArrayExists`] if it is present in
    /// [`Write`](DriverMode::Write) mode.
    pub fn check_metadata(self, exists: bool, location: &str) -> Result<(), DriverError> {
        match (self, exists) {
            (Self::Read | Self::Update, false) => {
                Err(DriverError::ArrayNotFound(location.to_string()))
            }
            (Self::Write, true) => Err(DriverError::ArrayExists(location.to_string())),
            _ => Ok(()),
        }
    }
}

/// Check an object size against [`MAX_OBJECT_SIZE`].
///
/// # Errors
/// Returns [`DriverError::SizeLimit`] if `size` exceeds [`MAX_OBJECT_SIZE`].
pub fn check_object_size(location: &str, size: u64) -> Result<(), DriverError> {
    if size > MAX_OBJECT_SIZE {
        Err(DriverError::SizeLimit {
            location: location.to_string(),
            size,
            limit: MAX_OBJECT_SIZE,
        })
    } else {
        Ok(())
    }
}

/// A storage driver.
///
/// A driver moves whole objects between memory and a backend. Objects are addressed by a suffix
/// relative to the driver URL, e.g. `metadata` or `chunks/c_0_1`.
///
/// [`init`](StorageDriver::init) must be called once before any other request.
#[auto_impl(Arc, Box)]
pub trait StorageDriver: Send + Sync + Debug {
    /// Probe the backend for the metadata object and check the result against the [`DriverMode`].
    ///
    /// # Errors
    /// Returns [`DriverError::ArrayNotFound`] or [`DriverError::ArrayExists`] if the mode check fails,
    /// or a [`DriverError::Storage`] if the backend cannot be reached.
    fn init(&self) -> Result<(), DriverError>;

    /// Read the object at `suffix`.
    ///
    /// # Errors
    /// Returns [`DriverError::SizeLimit`] if the object exceeds [`MAX_OBJECT_SIZE`] or a
    /// [`DriverError::Storage`] if the request fails.
    fn read_bytes(&self, suffix: &str) -> Result<Bytes, DriverError>;

    /// Read the object at `suffix` into `buffer`, returning its length.
    ///
    /// `buffer` is resized to the object length and can be reused across calls.
    ///
    /// # Errors
    /// See [`read_bytes`](StorageDriver::read_bytes).
    fn read_bytes_into(&self, suffix: &str, buffer: &mut BytesMut) -> Result<usize, DriverError> {
        let bytes = self.read_bytes(suffix)?;
        buffer.clear();
        buffer.extend_from_slice(&bytes);
        Ok(bytes.len())
    }

    /// Write `bytes` as the object at `suffix`, replacing any existing object.
    ///
    /// # Errors
    /// Returns [`DriverError::SizeLimit`] if `bytes` exceeds [`MAX_OBJECT_SIZE`] or a
    /// [`DriverError::Storage`] if the request fails.
    fn write_bytes(&self, suffix: &str, bytes: Bytes) -> Result<(), DriverError>;

    /// Read and parse the metadata object without validating it.
    ///
    /// # Errors
    /// Returns a [`DriverError::Metadata`] if the record is not UTF-8 or a line is malformed, or a
    /// storage error.
    fn read_metadata_record(&self) -> Result<Metadata, DriverError> {
        let bytes = self.read_bytes(METADATA_SUFFIX)?;
        let text = std::str::from_utf8(&bytes)
            .map_err(|err| MetadataError::InvalidEncoding(err.to_string()))?;
        Ok(Metadata::from_text(text)?)
    }

    /// Read, parse, and validate the metadata object.
    ///
    /// # Errors
    /// Returns a [`DriverError::Metadata`] if the record is malformed or fails validation, or a storage error.
    fn read_metadata(&self) -> Result<Metadata, DriverError> {
        let metadata = self.read_metadata_record()?;
        metadata.validate()?;
        Ok(metadata)
    }

    /// Serialise `metadata` and persist it atomically as the metadata object.
    ///
    /// # Errors
    /// Returns a [`DriverError::Metadata`] if the record cannot be serialised or a storage error.
    fn write_metadata(&self, metadata: &Metadata) -> Result<(), DriverError> {
        self.write_bytes(METADATA_SUFFIX, Bytes::from(metadata.to_text()?))
    }

    /// Count the objects whose suffix starts with `prefix`.
    ///
    /// # Errors
    /// Returns a [`DriverError::Storage`] if the request fails.
    fn count(&self, prefix: &str) -> Result<usize, DriverError>;

    /// The display URL of the driver.
    fn url(&self) -> &str;

    /// The display URL of the object at `suffix`.
    fn object_url(&self, suffix: &str) -> String {
        format!("{}/{suffix}", self.url().trim_end_matches('/'))
    }

    /// The access mode.
    fn mode(&self) -> DriverMode;
}
