//! Typed lookups over a parsed document.

use crate::{parser, Error, Object, Value};
use std::{path::Path, time::Duration};

/// A parsed object-text document addressed with dotted paths (`network.timeout`).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Document {
    root: Object,
}

impl Document {
    /// Parses a document from text.
    pub fn parse(input: &str) -> Result<Self, Error> {
        Ok(Self {
            root: parser::parse(input)?,
        })
    }

    /// Reads and parses a document from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)
            .map_err(|err| Error::Io(path.display().to_string(), err))?;
        Self::parse(&input)
    }

    pub fn root(&self) -> &Object {
        &self.root
    }

    /// Resolves a dotted path to an object.
    pub fn object(&self, path: &str) -> Option<&Object> {
        path.split('.')
            .filter(|segment| !segment.is_empty())
            .try_fold(&self.root, |object, segment| object.object(segment))
    }

    /// Resolves a dotted path to a field value.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let (parent, name) = match path.rsplit_once('.') {
            Some((parent, name)) => (self.object(parent)?, name),
            None => (&self.root, path),
        };
        parent.field(name)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    fn require(&self, path: &str) -> Result<&Value, Error> {
        self.get(path).ok_or_else(|| Error::Missing(path.to_string()))
    }

    pub fn get_bool(&self, path: &str) -> Result<bool, Error> {
        match self.require(path)? {
            Value::Bool(value) => Ok(*value),
            _ => Err(Error::InvalidType(path.to_string(), "bool")),
        }
    }

    pub fn get_int(&self, path: &str) -> Result<i64, Error> {
        match self.require(path)? {
            Value::Integer(value) => Ok(*value),
            _ => Err(Error::InvalidType(path.to_string(), "integer")),
        }
    }

    /// Returns a non-negative integer.
    pub fn get_u64(&self, path: &str) -> Result<u64, Error> {
        let value = self.get_int(path)?;
        u64::try_from(value).map_err(|_| Error::InvalidType(path.to_string(), "unsigned integer"))
    }

    /// Returns a non-negative integer that fits in a `usize`.
    pub fn get_usize(&self, path: &str) -> Result<usize, Error> {
        let value = self.get_u64(path)?;
        usize::try_from(value).map_err(|_| Error::InvalidType(path.to_string(), "usize"))
    }

    /// Returns a float, widening integers.
    pub fn get_float(&self, path: &str) -> Result<f64, Error> {
        match self.require(path)? {
            Value::Float(value) => Ok(*value),
            Value::Integer(value) => Ok(*value as f64),
            _ => Err(Error::InvalidType(path.to_string(), "float")),
        }
    }

    pub fn get_str(&self, path: &str) -> Result<&str, Error> {
        match self.require(path)? {
            Value::Text(value) => Ok(value),
            _ => Err(Error::InvalidType(path.to_string(), "text")),
        }
    }

    /// Returns a duration expressed as an integer number of milliseconds.
    pub fn get_duration_ms(&self, path: &str) -> Result<Duration, Error> {
        self.get_u64(path).map(Duration::from_millis)
    }

    /// Applies `lookup` only if `path` is present, otherwise returns `None`.
    ///
    /// A present but mistyped value is still an error.
    pub fn optional<'a, T>(
        &'a self,
        path: &str,
        lookup: impl FnOnce(&'a Self, &str) -> Result<T, Error>,
    ) -> Result<Option<T>, Error> {
        if !self.contains(path) {
            return Ok(None);
        }
        lookup(self, path).map(Some)
    }
}

impl From<Object> for Document {
    fn from(root: Object) -> Self {
        Self { root }
    }
}
