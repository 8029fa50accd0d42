//! Array schemas.
//!
//! An [`ArraySchema`] is the structured form of the array-definition text stored under the
//! `schema` metadata key, for example `<v:int64,w:double> [i=0:9:0:5; j=10:19:0:5]`.
//!
//! Turning schema text into an [`ArraySchema`] is the job of a [`SchemaInference`] collaborator.
//! Each inference runs in a [`SchemaSession`] that is opened for a single schema and released
//! when it goes out of scope, on success and on failure alike.
//! [`TextSchemaInference`] parses the text directly and is what [`Metadata::schema`](crate::Metadata::schema) uses.

use std::fmt::Display;
use std::str::FromStr;

use itertools::Itertools;
use thiserror::Error;

/// The chunk interval of a dimension declared without one.
pub const DEFAULT_CHUNK_INTERVAL: i64 = 1_000_000;

/// The largest magnitude of a dimension bound, `2^62 - 1`.
///
/// Offsets between any two in-range coordinates fit in an [`i64`].
pub const MAX_COORDINATE: i64 = (1 << 62) - 1;

/// A schema error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// The metadata record has no `schema` key.
    #[error("Schema missing from metadata")]
    MissingSchema,
    /// The schema text could not be parsed.
    #[error("invalid schema '{schema}': {reason}")]
    Parse {
        /// The schema text.
        schema: String,
        /// Why parsing failed.
        reason: String,
    },
    /// The schema inference collaborator failed.
    #[error("schema inference failed: {0}")]
    Inference(String),
}

/// An array attribute (a named, typed cell value).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    name: String,
    data_type: String,
    nullable: bool,
}

impl Attribute {
    /// Create a new attribute.
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
        }
    }

    /// The attribute name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The attribute data type, e.g. `int64`.
    #[must_use]
    pub fn data_type(&self) -> &str {
        &self.data_type
    }

    /// Returns true if the attribute accepts null values.
    #[must_use]
    pub const fn nullable(&self) -> bool {
        self.nullable
    }
}

impl Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.name, self.data_type)?;
        if !self.nullable {
            write!(f, " NOT NULL")?;
        }
        Ok(())
    }
}

/// An array dimension.
///
/// A dimension spans `start_min..=end_max` (`end_max` is [`None`] for an unbounded dimension)
/// and is split into chunks of `chunk_interval` cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    name: String,
    start_min: i64,
    end_max: Option<i64>,
    chunk_overlap: i64,
    chunk_interval: i64,
}

impl Dimension {
    /// Create a new dimension.
    ///
    /// # Errors
    /// Returns [`SchemaError::Parse`] if `chunk_interval` is not positive, `chunk_overlap` is negative,
    /// a bound exceeds [`MAX_COORDINATE`] in magnitude, or `end_max` is less than `start_min`.
    pub fn new(
        name: impl Into<String>,
        start_min: i64,
        end_max: Option<i64>,
        chunk_overlap: i64,
        chunk_interval: i64,
    ) -> Result<Self, SchemaError> {
        let dimension = Self {
            name: name.into(),
            start_min,
            end_max,
            chunk_overlap,
            chunk_interval,
        };
        let invalid = |reason: &str| SchemaError::Parse {
            schema: dimension.to_string(),
            reason: reason.to_string(),
        };
        if chunk_interval <= 0 {
            return Err(invalid("chunk interval must be positive"));
        }
        if chunk_overlap < 0 {
            return Err(invalid("chunk overlap must not be negative"));
        }
        let in_range = |coordinate: i64| (-MAX_COORDINATE..=MAX_COORDINATE).contains(&coordinate);
        if !in_range(start_min) || !end_max.is_none_or(in_range) {
            return Err(invalid("dimension bound out of range"));
        }
        if end_max.is_some_and(|end_max| end_max < start_min) {
            return Err(invalid("dimension end is before its start"));
        }
        Ok(dimension)
    }

    /// The dimension name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The first coordinate of the dimension.
    #[must_use]
    pub const fn start_min(&self) -> i64 {
        self.start_min
    }

    /// The last coordinate of the dimension, [`None`] if unbounded.
    #[must_use]
    pub const fn end_max(&self) -> Option<i64> {
        self.end_max
    }

    /// The chunk overlap.
    #[must_use]
    pub const fn chunk_overlap(&self) -> i64 {
        self.chunk_overlap
    }

    /// The number of cells per chunk along this dimension.
    #[must_use]
    pub const fn chunk_interval(&self) -> i64 {
        self.chunk_interval
    }

    /// The chunk grid index holding `position`.
    ///
    /// Integer division truncates toward zero, so every implementation sharing the object naming
    /// scheme maps positions identically. Positions far outside the dimension saturate.
    #[must_use]
    pub const fn chunk_grid_index(&self, position: i64) -> i64 {
        position.saturating_sub(self.start_min) / self.chunk_interval
    }

    /// The first position of the chunk at `chunk_grid_index`.
    #[must_use]
    pub const fn chunk_origin(&self, chunk_grid_index: i64) -> i64 {
        self.start_min
            .saturating_add(chunk_grid_index.saturating_mul(self.chunk_interval))
    }
}

impl Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}:", self.name, self.start_min)?;
        match self.end_max {
            Some(end_max) => write!(f, "{end_max}")?,
            None => write!(f, "*")?,
        }
        write!(f, ":{}:{}", self.chunk_overlap, self.chunk_interval)
    }
}

/// An array schema: its attributes and dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArraySchema {
    attributes: Vec<Attribute>,
    dimensions: Vec<Dimension>,
}

impl ArraySchema {
    /// Create a new array schema.
    ///
    /// # Errors
    /// Returns [`SchemaError::Parse`] if there are no attributes or no dimensions.
    pub fn new(attributes: Vec<Attribute>, dimensions: Vec<Dimension>) -> Result<Self, SchemaError> {
        let schema = Self {
            attributes,
            dimensions,
        };
        if schema.attributes.is_empty() || schema.dimensions.is_empty() {
            return Err(SchemaError::Parse {
                schema: schema.to_string(),
                reason: "an array needs at least one attribute and one dimension".to_string(),
            });
        }
        Ok(schema)
    }

    /// The attributes.
    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// The dimensions.
    #[must_use]
    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    /// The number of dimensions.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.dimensions.len()
    }

    /// Map an array position to its chunk grid indices.
    ///
    /// # Panics
    /// Panics if `position` does not have one element per dimension.
    #[must_use]
    pub fn chunk_grid_indices(&self, position: &[i64]) -> Vec<i64> {
        assert_eq!(position.len(), self.dimensions.len());
        std::iter::zip(&self.dimensions, position)
            .map(|(dimension, &position)| dimension.chunk_grid_index(position))
            .collect()
    }
}

impl Display for ArraySchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<{}> [{}]",
            self.attributes.iter().join(","),
            self.dimensions.iter().join("; ")
        )
    }
}

impl FromStr for ArraySchema {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| SchemaError::Parse {
            schema: s.to_string(),
            reason,
        };

        let rest = s
            .trim()
            .strip_prefix('<')
            .ok_or_else(|| invalid("expected '<' before the attributes".to_string()))?;
        let (attributes, rest) = rest
            .split_once('>')
            .ok_or_else(|| invalid("expected '>' after the attributes".to_string()))?;
        let dimensions = rest
            .trim()
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(|| invalid("expected the dimensions in '[...]'".to_string()))?;

        let attributes = attributes
            .split(',')
            .map(parse_attribute)
            .collect::<Result<Vec<_>, _>>()
            .map_err(invalid)?;
        let dimensions = dimensions
            .split([';', ','])
            .map(parse_dimension)
            .collect::<Result<Vec<_>, _>>()
            .map_err(invalid)?;

        Self::new(attributes, dimensions)
    }
}

fn parse_name(name: &str) -> Result<&str, String> {
    let name = name.trim();
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(format!("invalid name '{name}'"))
    }
}

fn parse_attribute(attribute: &str) -> Result<Attribute, String> {
    let (name, rest) = attribute
        .split_once(':')
        .ok_or_else(|| format!("attribute '{}' has no type", attribute.trim()))?;
    let name = parse_name(name)?;
    let mut tokens = rest.split_whitespace();
    let data_type = tokens
        .next()
        .ok_or_else(|| format!("attribute '{name}' has no type"))?;
    let nullability = tokens.map(str::to_ascii_uppercase).join(" ");
    let nullable = match nullability.as_str() {
        "" | "NULL" => true,
        "NOT NULL" => false,
        other => return Err(format!("unsupported attribute option '{other}'")),
    };
    Ok(Attribute::new(name, data_type, nullable))
}

fn parse_coordinate(value: &str) -> Result<i64, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("invalid coordinate '{}'", value.trim()))
}

fn parse_dimension(dimension: &str) -> Result<Dimension, String> {
    let Some((name, range)) = dimension.split_once('=') else {
        let name = parse_name(dimension)?;
        return Dimension::new(name, 0, None, 0, DEFAULT_CHUNK_INTERVAL)
            .map_err(|err| err.to_string());
    };
    let name = parse_name(name)?;
    let parts: Vec<&str> = range.split(':').map(str::trim).collect();
    if !(2..=4).contains(&parts.len()) {
        return Err(format!("invalid dimension '{}'", dimension.trim()));
    }
    let start_min = parse_coordinate(parts[0])?;
    let end_max = match parts[1] {
        "*" => None,
        end_max => Some(parse_coordinate(end_max)?),
    };
    let chunk_overlap = parts.get(2).map_or(Ok(0), |overlap| parse_coordinate(overlap))?;
    let chunk_interval = match parts.get(3) {
        None | Some(&"*") => DEFAULT_CHUNK_INTERVAL,
        Some(interval) => parse_coordinate(interval)?,
    };
    Dimension::new(name, start_min, end_max, chunk_overlap, chunk_interval)
        .map_err(|err| err.to_string())
}

/// A disposable schema inference session.
///
/// A session is opened for one schema and dropped straight after, which releases whatever the
/// collaborator acquired for it.
pub trait SchemaSession {
    /// Infer the [`ArraySchema`] described by `schema`.
    ///
    /// # Errors
    /// Returns a [`SchemaError`] if the schema text cannot be interpreted.
    fn infer(&mut self, schema: &str) -> Result<ArraySchema, SchemaError>;
}

/// A schema inference collaborator.
pub trait SchemaInference {
    /// The session type.
    type Session: SchemaSession;

    /// Open a new inference session.
    ///
    /// # Errors
    /// Returns a [`SchemaError`] if a session cannot be opened.
    fn open_session(&self) -> Result<Self::Session, SchemaError>;
}

/// Schema inference which parses the array-definition text directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextSchemaInference;

/// The [`SchemaSession`] of [`TextSchemaInference`].
#[derive(Debug)]
pub struct TextSchemaSession;

impl SchemaSession for TextSchemaSession {
    fn infer(&mut self, schema: &str) -> Result<ArraySchema, SchemaError> {
        schema.parse()
    }
}

impl SchemaInference for TextSchemaInference {
    type Session = TextSchemaSession;

    fn open_session(&self) -> Result<Self::Session, SchemaError> {
        Ok(TextSchemaSession)
    }
}
