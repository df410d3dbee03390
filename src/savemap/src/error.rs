//! Error types shared across the interpreter.

use thiserror::Error;

/// Structural errors: the template, the buffer, or a hook could not be
/// interpreted. These abort the operation that raised them.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Buffer does not match any region declared by template '{template}'")]
    Validation { template: String },

    #[error("Offset 0x{offset:x} (+{length} bytes) is outside the buffer (0x{buffer_len:x} bytes)")]
    Bounds {
        offset: usize,
        length: usize,
        buffer_len: usize,
    },

    #[error("Unsupported data type: {0}")]
    UnsupportedType(String),

    #[error("Value {value} does not fit in {data_type}")]
    Overflow { value: i64, data_type: String },

    #[error("Text needs {needed} characters but only {capacity} fit")]
    TextOverflow { needed: usize, capacity: usize },

    #[error("Malformed template at {path}: {reason}")]
    MalformedTemplate { path: String, reason: String },

    #[error("Unknown hook set: {0}")]
    UnknownHooks(String),

    #[error("Unknown item: {0}")]
    UnknownItem(String),

    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    #[error("Override hooks recursed deeper than {0} levels")]
    RecursionLimit(usize),

    #[error("Item {item}: {source}")]
    Item {
        item: String,
        #[source]
        source: Box<Error>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse JSON template: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse YAML template: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    pub(crate) fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MalformedTemplate {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Attach the id of the item being processed.
    pub(crate) fn in_item(self, item: &str) -> Self {
        match self {
            Error::Item { .. } => self,
            other => Error::Item {
                item: item.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The underlying error, with any item context stripped.
    pub fn root(&self) -> &Error {
        match self {
            Error::Item { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_bounds(&self) -> bool {
        matches!(self.root(), Error::Bounds { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A rejected `set_value`. The buffer is left untouched whenever one of the
/// constraint variants is returned.
#[derive(Error, Debug)]
pub enum EditError {
    #[error("{item} is disabled")]
    Disabled { item: String },

    #[error("{value} is outside the allowed range {min}..={max}")]
    OutOfRange { value: f64, min: f64, max: f64 },

    #[error("{value} is not a multiple of {step}")]
    Step { value: f64, step: f64 },

    #[error("'{value}' does not match {pattern}")]
    Pattern { value: String, pattern: String },

    #[error("'{label}' is not a label of resource {resource}")]
    UnknownLabel { label: String, resource: String },

    #[error("Invalid value for {item}: {reason}")]
    InvalidValue { item: String, reason: String },

    #[error(transparent)]
    Engine(#[from] Error),
}

impl EditError {
    pub(crate) fn invalid(item: &str, reason: impl Into<String>) -> Self {
        EditError::InvalidValue {
            item: item.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_strips_item_context() {
        let err = Error::Bounds {
            offset: 0x10,
            length: 2,
            buffer_len: 8,
        }
        .in_item("party[0].hp");

        assert!(err.is_bounds());
        assert!(err.to_string().contains("party[0].hp"));
        assert!(matches!(err.root(), Error::Bounds { offset: 0x10, .. }));
    }

    #[test]
    fn test_in_item_does_not_nest() {
        let err = Error::UnknownResource("items".into())
            .in_item("a")
            .in_item("b");
        match err {
            Error::Item { item, .. } => assert_eq!(item, "a"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
