use std::io::{Read, Write};

use flate2::{read::GzDecoder, write::GzEncoder};

use super::{CoordinateIndex, CoordinateIndexError};
use crate::{
    metadata::Compression, schema::Dimension, Bytes, DriverError, StorageDriver, INDEX_PREFIX,
};

fn compress(bytes: &[u8]) -> Result<Vec<u8>, CoordinateIndexError> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(bytes)
        .and_then(|()| encoder.finish())
        .map_err(|err| CoordinateIndexError::Codec(err.to_string()))
}

fn decompress(bytes: &[u8]) -> Result<Vec<u8>, CoordinateIndexError> {
    let mut decoded = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut decoded)
        .map_err(|err| CoordinateIndexError::Codec(err.to_string()))?;
    Ok(decoded)
}

/// Sort `index` and persist it as the objects `index/0`, `index/1`, ...
///
/// Each object holds at most `index_split` coordinate values (entries times dimensionality) and
/// at least one entry. Objects are gzip compressed if `compression` is [`Compression::Gzip`].
/// Returns the number of objects written.
///
/// # Errors
/// Returns a [`DriverError`] if an object cannot be encoded or written.
pub fn write_index<TDriver: StorageDriver + ?Sized>(
    driver: &TDriver,
    index: &mut CoordinateIndex,
    compression: Compression,
    index_split: usize,
) -> Result<usize, DriverError> {
    index.sort();
    let entries_per_object = (index_split / index.dimensionality().max(1)).max(1);
    let mut objects = 0;
    for entries in index.coordinates.chunks(entries_per_object) {
        let encoded = index.encode(&entries.iter().collect::<Vec<_>>());
        let bytes = match compression {
            Compression::None => encoded,
            Compression::Gzip => Bytes::from(compress(&encoded)?),
        };
        driver.write_bytes(&format!("{INDEX_PREFIX}{objects}"), bytes)?;
        objects += 1;
    }
    log::debug!(
        "wrote coordinate index of {} entries to {objects} objects under {}",
        index.len(),
        driver.object_url(INDEX_PREFIX)
    );
    Ok(objects)
}

/// Load the coordinate index persisted by [`write_index`].
///
/// The returned index is sorted and free of duplicates.
///
/// # Errors
/// Returns a [`DriverError`] if an index object cannot be read or decoded.
pub fn read_index<TDriver: StorageDriver + ?Sized>(
    driver: &TDriver,
    dimensions: &[Dimension],
    compression: Compression,
) -> Result<CoordinateIndex, DriverError> {
    let mut index = CoordinateIndex::new(dimensions);
    let objects = driver.count(INDEX_PREFIX)?;
    for object in 0..objects {
        let bytes = driver.read_bytes(&format!("{INDEX_PREFIX}{object}"))?;
        match compression {
            Compression::None => index.deserialize_insert(&bytes)?,
            Compression::Gzip => index.deserialize_insert(&decompress(&bytes)?)?,
        };
    }
    index.sort_dedup();
    log::debug!(
        "read coordinate index of {} entries from {objects} objects under {}",
        index.len(),
        driver.object_url(INDEX_PREFIX)
    );
    Ok(index)
}
