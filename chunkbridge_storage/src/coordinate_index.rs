//! The coordinate index.
//!
//! A [`CoordinateIndex`] lists the chunk grid cells that hold data for one array, so readers can
//! locate chunk objects without listing the store.
//!
//! ### Wire format
//! [`CoordinateIndex::serialize`] produces a `u64` little-endian entry count followed by the `i64`
//! little-endian grid indices of each entry. The dimensionality is not encoded; it is fixed by the
//! array schema.
//!
//! ### Partitioning
//! Cooperating workers split an index with [`CoordinateIndex::filter_serialize`] and
//! [`CoordinateIndex::filter_trim`]. An entry is owned by worker
//! `crc32c(little-endian grid indices) % workers` (see [`partition_owner`]). Every worker must use
//! this rule or entries are lost or duplicated.

mod persistence;

pub use persistence::{read_index, write_index};

use bytes::{Buf, BufMut};
use thiserror::Error;

use crate::{schema::Dimension, Bytes, BytesMut};

/// The grid indices of one chunk.
pub type Coordinates = Vec<i64>;

/// A coordinate index error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoordinateIndexError {
    /// A coordinate has the wrong number of dimensions.
    #[error("coordinate has {actual} dimensions, expected {expected}")]
    Dimensionality {
        /// The array dimensionality.
        expected: usize,
        /// The coordinate dimensionality.
        actual: usize,
    },
    /// A serialised index does not match its entry count.
    #[error("serialised coordinate index has {actual} bytes, expected {expected}")]
    InvalidLength {
        /// The expected length in bytes.
        expected: u64,
        /// The actual length in bytes.
        actual: u64,
    },
    /// The worker count or worker index is invalid.
    #[error("invalid partition: worker {worker} of {workers}")]
    InvalidPartition {
        /// The number of workers.
        workers: usize,
        /// The worker index.
        worker: usize,
    },
    /// An index object could not be compressed or decompressed.
    #[error("coordinate index codec error: {0}")]
    Codec(String),
}

/// The worker owning `coordinates` when partitioned across `workers`.
///
/// # Errors
/// Returns [`CoordinateIndexError::InvalidPartition`] if `workers` is zero.
pub fn partition_owner(coordinates: &[i64], workers: usize) -> Result<usize, CoordinateIndexError> {
    if workers == 0 {
        return Err(CoordinateIndexError::InvalidPartition { workers, worker: 0 });
    }
    let crc = coordinates
        .iter()
        .fold(0, |crc, index| crc32c::crc32c_append(crc, &index.to_le_bytes()));
    // u32 to usize is lossless on all supported targets
    Ok(crc as usize % workers)
}

fn check_partition(workers: usize, worker: usize) -> Result<(), CoordinateIndexError> {
    if worker < workers {
        Ok(())
    } else {
        Err(CoordinateIndexError::InvalidPartition { workers, worker })
    }
}

/// An ordered catalog of the chunk grid cells stored for one array.
///
/// Lookups with [`find`](CoordinateIndex::find) require [`sort`](CoordinateIndex::sort) to have
/// been called after the last insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinateIndex {
    dimensions: Vec<Dimension>,
    coordinates: Vec<Coordinates>,
}

impl CoordinateIndex {
    /// Create an empty index for an array with `dimensions`.
    #[must_use]
    pub fn new(dimensions: &[Dimension]) -> Self {
        Self {
            dimensions: dimensions.to_vec(),
            coordinates: Vec::new(),
        }
    }

    /// The array dimensions.
    #[must_use]
    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    /// The array dimensionality.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.dimensions.len()
    }

    /// The number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    /// Returns true if the index has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    /// Iterate over the entries.
    pub fn iter(&self) -> std::slice::Iter<'_, Coordinates> {
        self.coordinates.iter()
    }

    fn check_dimensionality(&self, coordinates: &[i64]) -> Result<(), CoordinateIndexError> {
        if coordinates.len() == self.dimensionality() {
            Ok(())
        } else {
            Err(CoordinateIndexError::Dimensionality {
                expected: self.dimensionality(),
                actual: coordinates.len(),
            })
        }
    }

    /// Append the chunk grid indices `coordinates`. Duplicates are not detected.
    ///
    /// # Errors
    /// Returns [`CoordinateIndexError::Dimensionality`] if `coordinates` has the wrong length.
    pub fn insert(&mut self, coordinates: Coordinates) -> Result<(), CoordinateIndexError> {
        self.check_dimensionality(&coordinates)?;
        self.coordinates.push(coordinates);
        Ok(())
    }

    /// Append the chunk holding the array position `position`.
    ///
    /// # Errors
    /// Returns [`CoordinateIndexError::Dimensionality`] if `position` has the wrong length.
    pub fn insert_position(&mut self, position: &[i64]) -> Result<(), CoordinateIndexError> {
        self.check_dimensionality(position)?;
        let coordinates = std::iter::zip(&self.dimensions, position)
            .map(|(dimension, &position)| dimension.chunk_grid_index(position))
            .collect();
        self.coordinates.push(coordinates);
        Ok(())
    }

    /// Sort the entries in lexicographic order over dimensions.
    pub fn sort(&mut self) {
        self.coordinates.sort_unstable();
    }

    /// Sort the entries and remove duplicates.
    pub fn sort_dedup(&mut self) {
        self.sort();
        self.coordinates.dedup();
    }

    /// The position of `coordinates` in the sorted index, [`None`] if absent.
    ///
    /// The result is meaningless if the index is not sorted.
    #[must_use]
    pub fn find(&self, coordinates: &[i64]) -> Option<usize> {
        self.coordinates
            .binary_search_by(|entry| entry.as_slice().cmp(coordinates))
            .ok()
    }

    /// Returns true if the sorted index holds `coordinates`.
    #[must_use]
    pub fn contains(&self, coordinates: &[i64]) -> bool {
        self.find(coordinates).is_some()
    }

    fn encode(&self, coordinates: &[&Coordinates]) -> Bytes {
        let mut bytes =
            BytesMut::with_capacity(8 + coordinates.len() * self.dimensionality() * 8);
        bytes.put_u64_le(coordinates.len() as u64);
        for entry in coordinates {
            for &index in *entry {
                bytes.put_i64_le(index);
            }
        }
        bytes.freeze()
    }

    /// Serialise every entry.
    #[must_use]
    pub fn serialize(&self) -> Bytes {
        self.encode(&self.coordinates.iter().collect::<Vec<_>>())
    }

    /// Serialise the entries owned by `worker` out of `workers`.
    ///
    /// # Errors
    /// Returns [`CoordinateIndexError::InvalidPartition`] if `worker >= workers`.
    pub fn filter_serialize(
        &self,
        workers: usize,
        worker: usize,
    ) -> Result<Bytes, CoordinateIndexError> {
        check_partition(workers, worker)?;
        let owned: Vec<_> = self
            .coordinates
            .iter()
            .filter(|entry| partition_owner(entry, workers).is_ok_and(|owner| owner == worker))
            .collect();
        Ok(self.encode(&owned))
    }

    /// Decode a serialised index and append its entries, returning the number appended.
    ///
    /// # Errors
    /// Returns [`CoordinateIndexError::InvalidLength`] if `bytes` does not hold exactly the
    /// encoded number of entries for this dimensionality.
    pub fn deserialize_insert(&mut self, mut bytes: &[u8]) -> Result<usize, CoordinateIndexError> {
        let actual = bytes.len() as u64;
        if bytes.remaining() < 8 {
            return Err(CoordinateIndexError::InvalidLength {
                expected: 8,
                actual,
            });
        }
        let count = bytes.get_u64_le();
        let expected = count
            .checked_mul(self.dimensionality() as u64 * 8)
            .and_then(|len| len.checked_add(8));
        if expected != Some(actual) {
            return Err(CoordinateIndexError::InvalidLength {
                expected: expected.unwrap_or(u64::MAX),
                actual,
            });
        }
        let count = usize::try_from(count).map_err(|_| CoordinateIndexError::InvalidLength {
            expected: u64::MAX,
            actual,
        })?;
        self.coordinates.reserve(count);
        for _ in 0..count {
            let entry = (0..self.dimensionality())
                .map(|_| bytes.get_i64_le())
                .collect();
            self.coordinates.push(entry);
        }
        Ok(count)
    }

    /// Retain only the entries owned by `worker` out of `workers`.
    ///
    /// # Errors
    /// Returns [`CoordinateIndexError::InvalidPartition`] if `worker >= workers`.
    pub fn filter_trim(&mut self, workers: usize, worker: usize) -> Result<(), CoordinateIndexError> {
        check_partition(workers, worker)?;
        self.coordinates
            .retain(|entry| partition_owner(entry, workers).is_ok_and(|owner| owner == worker));
        Ok(())
    }
}

impl<'a> IntoIterator for &'a CoordinateIndex {
    type Item = &'a Coordinates;
    type IntoIter = std::slice::Iter<'a, Coordinates>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dimensions() -> Vec<Dimension> {
        vec![
            Dimension::new("i", 0, Some(999), 0, 10).unwrap(),
            Dimension::new("j", -100, None, 0, 7).unwrap(),
        ]
    }

    /// Deterministic pseudo-random grid cells.
    fn cells(count: usize) -> Vec<Coordinates> {
        let mut state = 0x2545_f491_4f6c_dd1d_u64;
        (0..count)
            .map(|_| {
                (0..2)
                    .map(|_| {
                        state ^= state << 13;
                        state ^= state >> 7;
                        state ^= state << 17;
                        i64::try_from(state % 1000).unwrap() - 500
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn index_insert_sort_find() {
        for count in [0, 1, 2, 17, 500] {
            let mut index = CoordinateIndex::new(&dimensions());
            let cells = cells(count);
            for cell in &cells {
                index.insert(cell.clone()).unwrap();
            }
            index.sort();
            assert_eq!(index.len(), count);
            assert!(index.iter().is_sorted());
            for cell in &cells {
                let position = index.find(cell).unwrap();
                assert_eq!(&index.iter().as_slice()[position], cell);
            }
            assert!(!index.contains(&[10_000, 10_000]));
            assert_eq!(index.find(&[-10_000, 0]), None);
        }
    }

    #[test]
    fn index_insert_position() {
        let mut index = CoordinateIndex::new(&dimensions());
        index.insert_position(&[25, -100]).unwrap();
        index.insert_position(&[9, -93]).unwrap();
        index.sort();
        assert_eq!(
            index.iter().cloned().collect::<Vec<_>>(),
            vec![vec![0, 1], vec![2, 0]]
        );
        assert_eq!(
            index.insert_position(&[1]),
            Err(CoordinateIndexError::Dimensionality {
                expected: 2,
                actual: 1
            })
        );
        assert!(index.insert(vec![1, 2, 3]).is_err());
    }

    #[test]
    fn index_serialize() {
        let mut index = CoordinateIndex::new(&dimensions());
        index.insert(vec![1, -2]).unwrap();
        index.insert(vec![3, 4]).unwrap();
        let bytes = index.serialize();
        assert_eq!(bytes.len(), 8 + 2 * 2 * 8);
        assert_eq!(&bytes[..8], &2u64.to_le_bytes());
        assert_eq!(&bytes[8..16], &1i64.to_le_bytes());
        assert_eq!(&bytes[16..24], &(-2i64).to_le_bytes());

        let mut merged = CoordinateIndex::new(&dimensions());
        merged.insert(vec![0, 0]).unwrap();
        assert_eq!(merged.deserialize_insert(&bytes), Ok(2));
        merged.sort();
        assert_eq!(merged.len(), 3);
        assert!(merged.contains(&[1, -2]));
        assert!(merged.contains(&[3, 4]));

        let empty = CoordinateIndex::new(&dimensions()).serialize();
        assert_eq!(merged.deserialize_insert(&empty), Ok(0));
    }

    #[test]
    fn index_deserialize_invalid() {
        let mut index = CoordinateIndex::new(&dimensions());
        assert!(matches!(
            index.deserialize_insert(&[0, 0, 0]),
            Err(CoordinateIndexError::InvalidLength { .. })
        ));
        let mut source = CoordinateIndex::new(&dimensions());
        source.insert(vec![1, 2]).unwrap();
        let bytes = source.serialize();
        assert!(matches!(
            index.deserialize_insert(&bytes[..bytes.len() - 1]),
            Err(CoordinateIndexError::InvalidLength { .. })
        ));
        let mut bytes = bytes.to_vec();
        bytes[..8].copy_from_slice(&u64::MAX.to_le_bytes());
        assert!(matches!(
            index.deserialize_insert(&bytes),
            Err(CoordinateIndexError::InvalidLength { .. })
        ));
        assert!(index.is_empty());
    }

    #[test]
    fn index_partition() {
        let mut index = CoordinateIndex::new(&dimensions());
        for cell in cells(300) {
            index.insert(cell).unwrap();
        }
        index.sort_dedup();
        for workers in [1, 2, 3, 8] {
            let mut merged = CoordinateIndex::new(&dimensions());
            let mut total = 0;
            for worker in 0..workers {
                let bytes = index.filter_serialize(workers, worker).unwrap();
                let mut shard = CoordinateIndex::new(&dimensions());
                total += shard.deserialize_insert(&bytes).unwrap();
                for entry in &shard {
                    assert_eq!(partition_owner(entry, workers), Ok(worker));
                }

                let mut trimmed = index.clone();
                trimmed.filter_trim(workers, worker).unwrap();
                assert_eq!(trimmed.len(), shard.len());

                merged.deserialize_insert(&bytes).unwrap();
            }
            assert_eq!(total, index.len());
            merged.sort();
            assert_eq!(merged, index);
        }
    }

    #[test]
    fn index_partition_invalid() {
        let mut index = CoordinateIndex::new(&dimensions());
        assert_eq!(
            index.filter_serialize(0, 0),
            Err(CoordinateIndexError::InvalidPartition {
                workers: 0,
                worker: 0
            })
        );
        assert!(index.filter_serialize(2, 2).is_err());
        assert!(index.filter_trim(3, 5).is_err());
        assert!(partition_owner(&[1, 2], 0).is_err());
    }

    #[test]
    fn partition_owner_stable() {
        // crc32c of 16 zero bytes
        let crc = crc32c::crc32c(&[0; 16]);
        assert_eq!(partition_owner(&[0, 0], 1 << 20), Ok(crc as usize % (1 << 20)));
        assert_eq!(partition_owner(&[5, 7], 4), partition_owner(&[5, 7], 4));
    }
}
