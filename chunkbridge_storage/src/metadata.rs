//! The array metadata record.
//!
//! Every stored array carries exactly one metadata object. It is a flat text record of
//! `key<TAB>value<NEWLINE>` lines, written in sorted key order:
//! ```text
//! attribute	ALL
//! compression	gzip
//! format	arrow
//! index_split	100000
//! namespace	public
//! schema	<v:int64> [i=0:9:0:5]
//! version	1
//! ```
//! Tab and newline characters cannot appear in keys or values since the format has no escaping.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::OnceLock;

use derive_more::Display;
use itertools::Itertools;
use thiserror::Error;

use crate::schema::{
    ArraySchema, Dimension, SchemaError, SchemaInference, SchemaSession, TextSchemaInference,
};

/// The `schema` key.
pub const KEY_SCHEMA: &str = "schema";
/// The `version` key.
pub const KEY_VERSION: &str = "version";
/// The `attribute` key.
pub const KEY_ATTRIBUTE: &str = "attribute";
/// The `format` key.
pub const KEY_FORMAT: &str = "format";
/// The `compression` key.
pub const KEY_COMPRESSION: &str = "compression";
/// The `index_split` key.
pub const KEY_INDEX_SPLIT: &str = "index_split";
/// The `namespace` key.
pub const KEY_NAMESPACE: &str = "namespace";

/// The keys every metadata record must hold.
pub const REQUIRED_KEYS: [&str; 5] = [
    KEY_SCHEMA,
    KEY_VERSION,
    KEY_ATTRIBUTE,
    KEY_FORMAT,
    KEY_COMPRESSION,
];

/// The metadata record version written by this crate.
pub const METADATA_VERSION: &str = "1";

/// A metadata error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MetadataError {
    /// A required key is absent.
    #[error("Key '{0}' missing from metadata")]
    MissingKey(&'static str),
    /// The `compression` value is not recognised.
    #[error("Unsupported compression '{0}'")]
    UnsupportedCompression(String),
    /// The `format` value is not recognised.
    #[error("Unsupported format '{0}'")]
    UnsupportedFormat(String),
    /// A metadata line lacks a tab-separated key and value.
    #[error("Invalid metadata line '{0}'")]
    InvalidLine(String),
    /// A key or value contains a tab or newline and cannot be serialised.
    #[error("Metadata key or value '{0}' contains a tab or newline")]
    InvalidCharacter(String),
    /// A key has an empty value and cannot be serialised.
    #[error("Metadata key '{0}' has an empty value")]
    EmptyValue(String),
    /// The record is not valid UTF-8.
    #[error("Metadata is not valid UTF-8: {0}")]
    InvalidEncoding(String),
    /// A value could not be interpreted.
    #[error("Invalid value '{value}' for metadata key '{key}'")]
    InvalidValue {
        /// The key.
        key: &'static str,
        /// The value.
        value: String,
    },
}

/// Chunk compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum Compression {
    /// Uncompressed.
    #[default]
    #[display("none")]
    None,
    /// Gzip compressed.
    #[display("gzip")]
    Gzip,
}

impl FromStr for Compression {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "gzip" => Ok(Self::Gzip),
            _ => Err(MetadataError::UnsupportedCompression(s.to_string())),
        }
    }
}

/// Chunk encoding format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum Format {
    /// Apache Arrow IPC stream.
    #[default]
    #[display("arrow")]
    Arrow,
}

impl FromStr for Format {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "arrow" => Ok(Self::Arrow),
            _ => Err(MetadataError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// An array metadata record.
///
/// The structured [`ArraySchema`] is parsed from the `schema` value on first access and memoised.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    entries: BTreeMap<String, String>,
    schema: OnceLock<ArraySchema>,
}

impl PartialEq for Metadata {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for Metadata {}

impl Metadata {
    /// Create an empty metadata record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a metadata record for a new array holding every standard key.
    #[must_use]
    pub fn for_array(schema: ArraySchema, compression: Compression) -> Self {
        let mut metadata = Self::new();
        metadata.set(KEY_VERSION, METADATA_VERSION);
        metadata.set(KEY_ATTRIBUTE, "ALL");
        metadata.set(KEY_FORMAT, Format::Arrow.to_string());
        metadata.set(KEY_COMPRESSION, compression.to_string());
        metadata.set(KEY_NAMESPACE, "public");
        metadata.set_schema(schema);
        metadata
    }

    /// Set `key` to `value`. No validation is performed.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if key == KEY_SCHEMA {
            self.schema.take();
        }
        self.entries.insert(key, value.into());
    }

    /// Get the value of `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Remove `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        if key == KEY_SCHEMA {
            self.schema.take();
        }
        self.entries.remove(key)
    }

    /// Returns true if `key` is set.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// The number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Validate the record.
    ///
    /// Must be called before a record read from storage is trusted.
    ///
    /// # Errors
    /// Returns [`MetadataError::MissingKey`] if a required key is absent, or
    /// [`MetadataError::UnsupportedCompression`] if `compression` is neither `none` nor `gzip`.
    pub fn validate(&self) -> Result<(), MetadataError> {
        if let Some(key) = REQUIRED_KEYS.iter().find(|key| !self.contains_key(key)) {
            return Err(MetadataError::MissingKey(key));
        }
        self.compression()?;
        Ok(())
    }

    /// The chunk compression.
    ///
    /// # Errors
    /// Returns [`MetadataError::MissingKey`] or [`MetadataError::UnsupportedCompression`].
    pub fn compression(&self) -> Result<Compression, MetadataError> {
        self.get(KEY_COMPRESSION)
            .ok_or(MetadataError::MissingKey(KEY_COMPRESSION))?
            .parse()
    }

    /// The chunk format.
    ///
    /// # Errors
    /// Returns [`MetadataError::MissingKey`] or [`MetadataError::UnsupportedFormat`].
    pub fn format(&self) -> Result<Format, MetadataError> {
        self.get(KEY_FORMAT)
            .ok_or(MetadataError::MissingKey(KEY_FORMAT))?
            .parse()
    }

    /// The maximum number of coordinate values per index object, if recorded.
    ///
    /// # Errors
    /// Returns [`MetadataError::InvalidValue`] if `index_split` is not an unsigned integer.
    pub fn index_split(&self) -> Result<Option<usize>, MetadataError> {
        self.get(KEY_INDEX_SPLIT)
            .map(|value| {
                value.parse().map_err(|_| MetadataError::InvalidValue {
                    key: KEY_INDEX_SPLIT,
                    value: value.to_string(),
                })
            })
            .transpose()
    }

    /// Store the canonical text of `schema` under `schema` and memoise it.
    pub fn set_schema(&mut self, schema: ArraySchema) {
        self.entries
            .insert(KEY_SCHEMA.to_string(), schema.to_string());
        self.schema = OnceLock::from(schema);
    }

    /// The array schema, parsed with [`TextSchemaInference`].
    ///
    /// # Errors
    /// Returns [`SchemaError::MissingSchema`] if `schema` is absent or an error if it cannot be parsed.
    pub fn schema(&self) -> Result<&ArraySchema, SchemaError> {
        self.schema_with(&TextSchemaInference)
    }

    /// The array schema, inferred by `inference` on first access and memoised.
    ///
    /// The inference session is dropped as soon as the schema has been extracted.
    ///
    /// # Errors
    /// Returns [`SchemaError::MissingSchema`] if `schema` is absent or the inference error.
    pub fn schema_with<I: SchemaInference>(
        &self,
        inference: &I,
    ) -> Result<&ArraySchema, SchemaError> {
        if let Some(schema) = self.schema.get() {
            return Ok(schema);
        }
        let text = self.get(KEY_SCHEMA).ok_or(SchemaError::MissingSchema)?;
        let schema = {
            let mut session = inference.open_session()?;
            session.infer(text)?
        };
        Ok(self.schema.get_or_init(|| schema))
    }

    /// Serialise the record as `key<TAB>value<NEWLINE>` lines in key order.
    ///
    /// # Errors
    /// Returns [`MetadataError::InvalidCharacter`] if a key or value contains a tab or newline, or
    /// [`MetadataError::EmptyValue`] if a value is empty.
    pub fn to_text(&self) -> Result<String, MetadataError> {
        let invalid = |s: &str| s.contains(['\t', '\n', '\r']);
        if let Some((key, value)) = self
            .iter()
            .find(|(key, value)| invalid(key) || invalid(value))
        {
            let offending = if invalid(key) { key } else { value };
            return Err(MetadataError::InvalidCharacter(offending.to_string()));
        }
        if let Some((key, _)) = self.iter().find(|(_, value)| value.is_empty()) {
            return Err(MetadataError::EmptyValue(key.to_string()));
        }
        Ok(self
            .iter()
            .map(|(key, value)| format!("{key}\t{value}\n"))
            .join(""))
    }

    /// Parse a record serialised by [`Metadata::to_text`].
    ///
    /// Blank lines are skipped. The record is not validated.
    ///
    /// # Errors
    /// Returns [`MetadataError::InvalidLine`] for a non-empty line without a tab, with an empty key,
    /// or with an empty value.
    pub fn from_text(text: &str) -> Result<Self, MetadataError> {
        let mut metadata = Self::new();
        for line in text.lines().filter(|line| !line.is_empty()) {
            match line.split_once('\t') {
                Some((key, value)) if !key.is_empty() && !value.is_empty() => {
                    metadata.set(key, value);
                }
                _ => return Err(MetadataError::InvalidLine(line.to_string())),
            }
        }
        Ok(metadata)
    }
}

/// The object name of the chunk holding the array position `position`.
///
/// # Panics
/// Panics if `position` and `dimensions` differ in length.
#[must_use]
pub fn coordinate_to_object_name(position: &[i64], dimensions: &[Dimension]) -> String {
    assert_eq!(position.len(), dimensions.len());
    grid_indices_to_object_name(
        std::iter::zip(position, dimensions)
            .map(|(&position, dimension)| dimension.chunk_grid_index(position)),
    )
}

/// The object name of the chunk at `grid_indices`, e.g. `c_3_7`.
pub fn grid_indices_to_object_name(grid_indices: impl IntoIterator<Item = i64>) -> String {
    grid_indices
        .into_iter()
        .fold(String::from("c"), |mut name, index| {
            name.push('_');
            name.push_str(&index.to_string());
            name
        })
}
