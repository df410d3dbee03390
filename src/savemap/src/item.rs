//! Flattened, concretely addressed items.
//!
//! An [`Item`] is what the walker produces for each leaf of a template once
//! every ancestor shift has been applied: its `offset` is absolute within the
//! buffer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

use crate::checksum::{Algorithm, ChecksumStatus};
use crate::codec::text::TextField;
use crate::codec::Field;
use crate::template::node::GroupMode;
use crate::template::operation::Operation;

/// Numeric leaf description shared by variables and group parts
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Number {
    pub field: Field,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    /// Absolute offsets receiving a copy of the raw value on write
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mirrors: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ItemKind {
    Variable(Number),
    #[serde(rename_all = "camelCase")]
    Flag {
        bit: u8,
        reversed: bool,
        separator: bool,
        /// Id of the bitflags node this flag belongs to
        group: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        mirrors: Vec<usize>,
    },
    #[serde(rename_all = "camelCase")]
    Checksum {
        field: Field,
        /// Absolute checked range
        control: Range<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        algorithm: Option<Algorithm>,
        /// `None` when the stored value or the range could not be read
        status: Option<ChecksumStatus>,
    },
    #[serde(rename_all = "camelCase")]
    GroupPart {
        group: String,
        mode: GroupMode,
        /// Position of this part within its group
        part: usize,
        number: Number,
    },
    #[serde(rename_all = "camelCase")]
    String {
        text: TextField,
        letters: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        regex: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Stable address, e.g. `slots[2].party[0].level`
    pub id: String,
    pub name: String,
    /// Names of the enclosing sections, tabs and instances
    pub path: Vec<String>,
    /// Instance index of every enclosing container, outermost first
    pub instances: Vec<usize>,
    /// Accumulated shift the declared offset was moved by
    pub shift: usize,
    /// Effective offset in the buffer
    pub offset: usize,
    #[serde(flatten)]
    pub kind: ItemKind,
    pub disabled: bool,
    pub hidden: bool,
}

impl Item {
    /// Codec field for numeric kinds
    pub fn field(&self) -> Option<Field> {
        match &self.kind {
            ItemKind::Variable(n) | ItemKind::GroupPart { number: n, .. } => Some(n.field),
            ItemKind::Checksum { field, .. } => Some(*field),
            ItemKind::Flag { bit, .. } => {
                Some(Field::new(crate::DataType::Bit).with_bit(*bit))
            }
            ItemKind::String { .. } => None,
        }
    }

    pub fn number(&self) -> Option<&Number> {
        match &self.kind {
            ItemKind::Variable(n) | ItemKind::GroupPart { number: n, .. } => Some(n),
            _ => None,
        }
    }

    /// Bytes this item occupies in the buffer
    pub fn span(&self) -> Range<usize> {
        let len = match &self.kind {
            ItemKind::String { text, .. } => text.byte_len().unwrap_or(usize::MAX),
            _ => self.field().map_or(0, |f| f.width()),
        };
        self.offset..self.offset.saturating_add(len)
    }

    pub fn is_checksum(&self) -> bool {
        matches!(self.kind, ItemKind::Checksum { .. })
    }
}

/// A displayed value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Integral floats collapse to [`Value::Int`]
    pub fn number(value: f64) -> Self {
        if value.fract() == 0.0 && value.abs() < 9.0e15 {
            Value::Int(value as i64)
        } else {
            Value::Float(value)
        }
    }

    /// Interpret user input: booleans, decimal or `0x` integers, floats,
    /// otherwise text.
    pub fn parse(input: &str) -> Self {
        match input {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            _ => {}
        }
        if let Some(int) = crate::template::de::parse_int(input) {
            return Value::Int(int);
        }
        match input.trim().parse::<f64>() {
            Ok(float) if float.is_finite() => Value::number(float),
            _ => Value::Text(input.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}
