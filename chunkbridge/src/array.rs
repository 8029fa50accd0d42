//! Array write and read paths.
//!
//! An [`ArrayWriter`] stores chunks under `chunks/`, records their grid cells in a
//! [`CoordinateIndex`], and on [`finish`](ArrayWriter::finish) persists the index followed by the
//! metadata record. An [`ArrayReader`] loads the metadata and index and serves chunks by grid cell.
//!
//! Chunk payloads are opaque: the writer stores the bytes it is given and the reader returns them
//! unchanged. The `compression` metadata key describes how the producer encoded them, and is also
//! applied to the index objects.

use std::sync::Arc;

use chunkbridge_storage::{
    grid_indices_to_object_name,
    metadata::{KEY_INDEX_SPLIT, KEY_SCHEMA},
    read_index, write_index, ArraySchema, Bytes, BytesMut, Compression, CoordinateIndex,
    CoordinateIndexError, Coordinates, DriverError, DriverMode, Metadata, StorageDriver,
    CHUNK_PREFIX,
};

/// The default maximum number of coordinate values per index object.
pub const DEFAULT_INDEX_SPLIT: usize = 100_000;

/// The minimum permitted [`ArrayWriterOptions::index_split`].
pub const MIN_INDEX_SPLIT: usize = 100;

/// The object suffix of the chunk at `grid_indices`, e.g. `chunks/c_0_1`.
#[must_use]
pub fn chunk_suffix(grid_indices: &[i64]) -> String {
    format!(
        "{CHUNK_PREFIX}{}",
        grid_indices_to_object_name(grid_indices.iter().copied())
    )
}

/// Options for use with [`ArrayWriter`].
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ArrayWriterOptions {
    compression: Compression,
    index_split: usize,
}

impl Default for ArrayWriterOptions {
    fn default() -> Self {
        Self {
            compression: Compression::None,
            index_split: DEFAULT_INDEX_SPLIT,
        }
    }
}

impl ArrayWriterOptions {
    /// Set the compression recorded in the metadata and applied to index objects.
    ///
    /// Ignored when updating an existing array, which keeps its compression.
    pub fn compression(&mut self, compression: Compression) -> &mut Self {
        self.compression = compression;
        self
    }

    /// Set the maximum number of coordinate values per index object.
    ///
    /// Ignored when updating an existing array which records its own `index_split`.
    pub fn index_split(&mut self, index_split: usize) -> &mut Self {
        self.index_split = index_split;
        self
    }

    /// Validate the options.
    ///
    /// # Errors
    /// Returns [`DriverError::Config`] if `index_split` is below [`MIN_INDEX_SPLIT`].
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.index_split < MIN_INDEX_SPLIT {
            return Err(DriverError::Config(format!(
                "index_split must be at or above {MIN_INDEX_SPLIT}"
            )));
        }
        Ok(())
    }
}

/// Writes the chunks, index, and metadata of an array.
///
/// Nothing marks the array as complete until [`finish`](ArrayWriter::finish) writes the
/// metadata record. A writer dropped without finishing leaves chunk objects but no index or
/// metadata (or the previous ones, in [`DriverMode::Update`]).
#[derive(Debug)]
pub struct ArrayWriter<TDriver: ?Sized> {
    driver: Arc<TDriver>,
    schema: ArraySchema,
    metadata: Metadata,
    index: CoordinateIndex,
    compression: Compression,
    index_split: usize,
}

impl<TDriver: ?Sized + StorageDriver> ArrayWriter<TDriver> {
    /// Create a writer for the array at `driver`.
    ///
    /// The driver is initialised, so it must not already hold an array in [`DriverMode::Write`].
    /// In [`DriverMode::Update`] the existing metadata and index are loaded, `schema` must match the
    /// stored schema, and the stored compression and `index_split` take precedence over `options`.
    ///
    /// # Errors
    /// Returns [`DriverError::Config`] if the driver is in [`DriverMode::Read`], the options are
    /// invalid, or `schema` does not match the stored schema. Returns any error of
    /// [`StorageDriver::init`] or of loading the existing array.
    pub fn create(
        driver: Arc<TDriver>,
        schema: ArraySchema,
        options: &ArrayWriterOptions,
    ) -> Result<Self, DriverError> {
        if !driver.mode().is_writable() {
            return Err(DriverError::Config(format!(
                "cannot write the array at {} in {} mode",
                driver.url(),
                driver.mode()
            )));
        }
        options.validate()?;
        driver.init()?;

        if driver.mode() == DriverMode::Update {
            let metadata = driver.read_metadata()?;
            if metadata.schema()? != &schema {
                return Err(DriverError::Config(format!(
                    "schema {schema} does not match the schema {} of the array at {}",
                    metadata.get(KEY_SCHEMA).unwrap_or_default(),
                    driver.url()
                )));
            }
            let compression = metadata.compression()?;
            let index_split = metadata.index_split()?.unwrap_or(options.index_split);
            let index = read_index(&*driver, schema.dimensions(), compression)?;
            log::debug!(
                "updating the array at {} with {} chunks",
                driver.url(),
                index.len()
            );
            Ok(Self {
                driver,
                schema,
                metadata,
                index,
                compression,
                index_split,
            })
        } else {
            let mut metadata = Metadata::for_array(schema.clone(), options.compression);
            metadata.set(KEY_INDEX_SPLIT, options.index_split.to_string());
            Ok(Self {
                index: CoordinateIndex::new(schema.dimensions()),
                driver,
                schema,
                metadata,
                compression: options.compression,
                index_split: options.index_split,
            })
        }
    }

    /// The array schema.
    #[must_use]
    pub fn schema(&self) -> &ArraySchema {
        &self.schema
    }

    /// The metadata record that [`finish`](ArrayWriter::finish) will write.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Mutable access to the metadata record, for adding application keys.
    ///
    /// The record is validated when the array is read, so the standard keys should not be removed.
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// The index of chunks written so far (including existing chunks in [`DriverMode::Update`]).
    #[must_use]
    pub fn index(&self) -> &CoordinateIndex {
        &self.index
    }

    /// Write the chunk holding the array position `position`.
    ///
    /// Returns the grid indices of the chunk.
    ///
    /// # Errors
    /// Returns [`DriverError::Index`] if `position` does not match the array dimensionality, or any
    /// error of [`StorageDriver::write_bytes`].
    pub fn write_chunk(&mut self, position: &[i64], bytes: Bytes) -> Result<Coordinates, DriverError> {
        if position.len() != self.schema.dimensionality() {
            return Err(CoordinateIndexError::Dimensionality {
                expected: self.schema.dimensionality(),
                actual: position.len(),
            }
            .into());
        }
        let grid_indices = self.schema.chunk_grid_indices(position);
        self.write_chunk_at(&grid_indices, bytes)?;
        Ok(grid_indices)
    }

    /// Write the chunk at `grid_indices`, replacing any existing chunk.
    ///
    /// # Errors
    /// Returns [`DriverError::Index`] if `grid_indices` does not match the array dimensionality, or
    /// any error of [`StorageDriver::write_bytes`].
    pub fn write_chunk_at(&mut self, grid_indices: &[i64], bytes: Bytes) -> Result<(), DriverError> {
        if grid_indices.len() != self.schema.dimensionality() {
            return Err(CoordinateIndexError::Dimensionality {
                expected: self.schema.dimensionality(),
                actual: grid_indices.len(),
            }
            .into());
        }
        self.driver.write_bytes(&chunk_suffix(grid_indices), bytes)?;
        self.index.insert(grid_indices.to_vec())?;
        Ok(())
    }

    /// Persist the index and then the metadata record, completing the array.
    ///
    /// Returns the metadata record written.
    ///
    /// # Errors
    /// Returns a [`DriverError`] if the index or metadata cannot be written. The metadata is not
    /// written if the index fails.
    pub fn finish(mut self) -> Result<Metadata, DriverError> {
        self.index.sort_dedup();
        let objects = write_index(
            &*self.driver,
            &mut self.index,
            self.compression,
            self.index_split,
        )?;
        self.driver.write_metadata(&self.metadata)?;
        log::info!(
            "finalised the array at {} with {} chunks and {objects} index objects",
            self.driver.url(),
            self.index.len()
        );
        Ok(self.metadata)
    }
}

/// Reads the chunks of an array.
#[derive(Debug)]
pub struct ArrayReader<TDriver: ?Sized> {
    driver: Arc<TDriver>,
    schema: ArraySchema,
    metadata: Metadata,
    index: CoordinateIndex,
}

impl<TDriver: ?Sized + StorageDriver> ArrayReader<TDriver> {
    /// Open the array at `driver`.
    ///
    /// The driver is initialised, then the metadata is read and validated and the index is loaded.
    ///
    /// # Errors
    /// Returns [`DriverError::Config`] if the driver is in [`DriverMode::Write`]. Returns
    /// [`DriverError::ArrayNotFound`] if there is no metadata, or any error of reading the metadata,
    /// schema, or index.
    pub fn open(driver: Arc<TDriver>) -> Result<Self, DriverError> {
        if driver.mode() == DriverMode::Write {
            return Err(DriverError::Config(format!(
                "cannot read the array at {} in {} mode",
                driver.url(),
                driver.mode()
            )));
        }
        driver.init()?;
        let metadata = driver.read_metadata()?;
        let schema = metadata.schema()?.clone();
        let index = read_index(&*driver, schema.dimensions(), metadata.compression()?)?;
        Ok(Self {
            driver,
            schema,
            metadata,
            index,
        })
    }

    /// The driver.
    #[must_use]
    pub fn driver(&self) -> &Arc<TDriver> {
        &self.driver
    }

    /// The validated metadata record.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// The array schema.
    #[must_use]
    pub fn schema(&self) -> &ArraySchema {
        &self.schema
    }

    /// The coordinate index.
    #[must_use]
    pub fn index(&self) -> &CoordinateIndex {
        &self.index
    }

    /// The grid indices of every stored chunk, sorted.
    pub fn chunks(&self) -> impl Iterator<Item = &[i64]> {
        self.index.iter().map(Vec::as_slice)
    }

    /// The coordinate index entries assigned to `worker` of `workers`.
    ///
    /// # Errors
    /// Returns [`CoordinateIndexError::InvalidPartition`] if `worker` is not below `workers`.
    pub fn worker_chunks(
        &self,
        workers: usize,
        worker: usize,
    ) -> Result<CoordinateIndex, CoordinateIndexError> {
        let mut index = self.index.clone();
        index.filter_trim(workers, worker)?;
        Ok(index)
    }

    /// Returns true if the chunk at `grid_indices` is stored.
    #[must_use]
    pub fn contains_chunk(&self, grid_indices: &[i64]) -> bool {
        self.index.contains(grid_indices)
    }

    /// Read the chunk at `grid_indices`.
    ///
    /// Returns [`None`] without a storage request if the chunk is not in the index.
    ///
    /// # Errors
    /// Returns any error of [`StorageDriver::read_bytes`].
    pub fn read_chunk(&self, grid_indices: &[i64]) -> Result<Option<Bytes>, DriverError> {
        if !self.contains_chunk(grid_indices) {
            return Ok(None);
        }
        self.driver
            .read_bytes(&chunk_suffix(grid_indices))
            .map(Some)
    }

    /// Read the chunk at `grid_indices` into `buffer`, replacing its contents.
    ///
    /// Returns the chunk size, or [`None`] without a storage request (leaving `buffer` untouched)
    /// if the chunk is not in the index.
    ///
    /// # Errors
    /// Returns any error of [`StorageDriver::read_bytes_into`].
    pub fn read_chunk_into(
        &self,
        grid_indices: &[i64],
        buffer: &mut BytesMut,
    ) -> Result<Option<usize>, DriverError> {
        if !self.contains_chunk(grid_indices) {
            return Ok(None);
        }
        self.driver
            .read_bytes_into(&chunk_suffix(grid_indices), buffer)
            .map(Some)
    }

    /// Read the chunk holding the array position `position`.
    ///
    /// # Errors
    /// Returns [`DriverError::Index`] if `position` does not match the array dimensionality, or any
    /// error of [`StorageDriver::read_bytes`].
    pub fn read_chunk_at_position(&self, position: &[i64]) -> Result<Option<Bytes>, DriverError> {
        if position.len() != self.schema.dimensionality() {
            return Err(CoordinateIndexError::Dimensionality {
                expected: self.schema.dimensionality(),
                actual: position.len(),
            }
            .into());
        }
        self.read_chunk(&self.schema.chunk_grid_indices(position))
    }
}
