//! A driver adapter which records performance metrics.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crate::{Bytes, BytesMut, DriverError, DriverMode, Metadata, StorageDriver};

/// A driver adapter counting the bytes and requests that pass through it.
///
/// Useful in tests to check how many objects an operation touched, e.g. that reading an absent
/// chunk issues no request at all.
///
/// ### Example
/// ```rust
/// # use std::sync::Arc;
/// # use chunkbridge_storage::{store::MemoryDriver, DriverMode, StorageDriver};
/// # use chunkbridge_storage::driver_adapter::performance_metrics::PerformanceMetricsDriverAdapter;
/// let driver = Arc::new(MemoryDriver::new("memory://array", DriverMode::Write));
/// let driver = PerformanceMetricsDriverAdapter::new(driver);
/// driver.write_bytes("chunks/c_0", vec![0u8; 4].into())?;
/// assert_eq!(driver.bytes_written(), 4);
/// assert_eq!(driver.writes(), 1);
/// # Ok::<_, chunkbridge_storage::DriverError>(())
/// ```
#[derive(Debug)]
pub struct PerformanceMetricsDriverAdapter<TDriver: ?Sized> {
    driver: Arc<TDriver>,
    bytes_read: AtomicUsize,
    bytes_written: AtomicUsize,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl<TDriver: ?Sized> PerformanceMetricsDriverAdapter<TDriver> {
    /// Create a new performance metrics driver adapter.
    #[must_use]
    pub fn new(driver: Arc<TDriver>) -> Self {
        Self {
            driver,
            bytes_read: AtomicUsize::default(),
            bytes_written: AtomicUsize::default(),
            reads: AtomicUsize::default(),
            writes: AtomicUsize::default(),
        }
    }

    /// Reset the performance metrics.
    pub fn reset(&self) {
        self.bytes_read.store(0, Ordering::Relaxed);
        self.bytes_written.store(0, Ordering::Relaxed);
        self.reads.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
    }

    /// Returns the number of bytes read.
    pub fn bytes_read(&self) -> usize {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// Returns the number of bytes written.
    pub fn bytes_written(&self) -> usize {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Returns the number of read requests, including failed requests.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// Returns the number of write requests, including failed requests.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    fn record_read(&self, bytes_read: usize) {
        self.bytes_read.fetch_add(bytes_read, Ordering::Relaxed);
        self.reads.fetch_add(1, Ordering::Relaxed);
    }
}

impl<TDriver: ?Sized + StorageDriver> StorageDriver for PerformanceMetricsDriverAdapter<TDriver> {
    fn init(&self) -> Result<(), DriverError> {
        self.driver.init()
    }

    fn read_bytes(&self, suffix: &str) -> Result<Bytes, DriverError> {
        let value = self.driver.read_bytes(suffix);
        self.record_read(value.as_ref().map_or(0, Bytes::len));
        value
    }

    fn read_bytes_into(&self, suffix: &str, buffer: &mut BytesMut) -> Result<usize, DriverError> {
        let value = self.driver.read_bytes_into(suffix, buffer);
        self.record_read(*value.as_ref().unwrap_or(&0));
        value
    }

    fn write_bytes(&self, suffix: &str, bytes: Bytes) -> Result<(), DriverError> {
        self.bytes_written.fetch_add(bytes.len(), Ordering::Relaxed);
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.driver.write_bytes(suffix, bytes)
    }

    fn write_metadata(&self, metadata: &Metadata) -> Result<(), DriverError> {
        let text = metadata.to_text()?;
        self.bytes_written.fetch_add(text.len(), Ordering::Relaxed);
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.driver.write_metadata(metadata)
    }

    fn count(&self, prefix: &str) -> Result<usize, DriverError> {
        self.driver.count(prefix)
    }

    fn url(&self) -> &str {
        self.driver.url()
    }

    fn mode(&self) -> DriverMode {
        self.driver.mode()
    }
}
