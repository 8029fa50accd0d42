//! An in-memory driver.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    check_object_size, Bytes, DriverError, DriverMode, StorageDriver, METADATA_SUFFIX,
};

/// An in-memory driver.
///
/// Drivers derived with [`with_mode`](MemoryDriver::with_mode) share the same objects, so an array
/// written by one handle can be read back by another.
#[derive(Debug)]
pub struct MemoryDriver {
    url: String,
    mode: DriverMode,
    objects: Arc<Mutex<BTreeMap<String, Bytes>>>,
}

impl MemoryDriver {
    /// Create a new, empty memory driver.
    #[must_use]
    pub fn new(url: impl Into<String>, mode: DriverMode) -> Self {
        Self {
            url: url.into(),
            mode,
            objects: Arc::default(),
        }
    }

    /// Create a driver sharing the objects of this driver with a different `mode`.
    #[must_use]
    pub fn with_mode(&self, mode: DriverMode) -> Self {
        Self {
            url: self.url.clone(),
            mode,
            objects: self.objects.clone(),
        }
    }

    /// The suffixes of all stored objects, in order.
    #[must_use]
    pub fn suffixes(&self) -> Vec<String> {
        self.objects.lock().keys().cloned().collect()
    }
}

impl StorageDriver for MemoryDriver {
    fn init(&self) -> Result<(), DriverError> {
        let exists = self.objects.lock().contains_key(METADATA_SUFFIX);
        self.mode
            .check_metadata(exists, &self.object_url(METADATA_SUFFIX))
    }

    fn read_bytes(&self, suffix: &str) -> Result<Bytes, DriverError> {
        let objects = self.objects.lock();
        let bytes = objects
            .get(suffix)
            .ok_or_else(|| DriverError::storage("Get", self.object_url(suffix), "not found"))?;
        check_object_size(&self.object_url(suffix), bytes.len() as u64)?;
        Ok(bytes.clone())
    }

    fn write_bytes(&self, suffix: &str, bytes: Bytes) -> Result<(), DriverError> {
        check_object_size(&self.object_url(suffix), bytes.len() as u64)?;
        self.objects.lock().insert(suffix.to_string(), bytes);
        Ok(())
    }

    fn count(&self, prefix: &str) -> Result<usize, DriverError> {
        Ok(self
            .objects
            .lock()
            .range(prefix.to_string()..)
            .take_while(|(suffix, _)| suffix.starts_with(prefix))
            .count())
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn mode(&self) -> DriverMode {
        self.mode
    }
}
