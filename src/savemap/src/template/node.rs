//! Template node kinds.
//!
//! A template is a closed tagged union: the `"type"` key picks the variant and
//! each variant carries only the fields that make sense for it.

use serde::Deserialize;

use super::de::{Code, Offset};
use super::operation::Operation;
use crate::checksum::Algorithm;
use crate::codec::text::TextField;
use crate::codec::{BitRange, DataType, Field};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Node {
    Section(Section),
    Tabs(Tabs),
    Container(Container),
    Variable(Variable),
    Bitflags(Bitflags),
    Checksum(Checksum),
    Group(Group),
    String(Text),
}

impl Node {
    pub fn id(&self) -> Option<&str> {
        match self {
            Node::Section(n) => n.id.as_deref(),
            Node::Tabs(n) => n.id.as_deref(),
            Node::Container(n) => n.id.as_deref(),
            Node::Variable(n) => n.id.as_deref(),
            Node::Bitflags(n) => n.id.as_deref(),
            Node::Checksum(n) => n.id.as_deref(),
            Node::Group(n) => n.id.as_deref(),
            Node::String(n) => n.id.as_deref(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Node::Section(_) => "section",
            Node::Tabs(_) => "tabs",
            Node::Container(_) => "container",
            Node::Variable(_) => "variable",
            Node::Bitflags(_) => "bitflags",
            Node::Checksum(_) => "checksum",
            Node::Group(_) => "group",
            Node::String(_) => "string",
        }
    }
}

/// Purely organisational grouping
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub flex: bool,
    pub items: Vec<Node>,
}

/// Grouping whose children are mutually exclusive pages
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tabs {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    pub items: Vec<Node>,
}

/// Comparison used by `disableSubinstanceIf`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Operator {
    #[serde(rename = "=", alias = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    /// True when any bit of `value` is set
    #[serde(rename = "&")]
    And,
}

/// Single-field predicate evaluated relative to an instance's shift
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub offset: Offset,
    pub data_type: DataType,
    #[serde(default)]
    pub big_endian: Option<bool>,
    #[serde(default)]
    pub binary: Option<BitRange>,
    pub operator: Operator,
    pub value: i64,
}

impl Condition {
    pub fn field(&self, default_big_endian: bool) -> Field {
        Field {
            data_type: self.data_type,
            big_endian: self.big_endian.unwrap_or(default_big_endian),
            bit: None,
            binary: self.binary,
            bcd: false,
        }
    }

    pub fn holds(&self, actual: i64) -> bool {
        match self.operator {
            Operator::Eq => actual == self.value,
            Operator::Ne => actual != self.value,
            Operator::Gt => actual > self.value,
            Operator::Ge => actual >= self.value,
            Operator::Lt => actual < self.value,
            Operator::Le => actual <= self.value,
            Operator::And => actual & self.value != 0,
        }
    }
}

/// How a container's instances are presented
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceType {
    #[default]
    Section,
    Tabs,
}

/// Repeated structural unit: `items` is applied `instances` times, each time
/// shifted by `index * length` bytes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub instance_type: InstanceType,
    pub instances: usize,
    pub length: Offset,
    /// Resource labelling each instance (e.g. character names)
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub prepend_subinstance: Vec<Node>,
    #[serde(default)]
    pub append_subinstance: Vec<Node>,
    #[serde(default)]
    pub disable_subinstance_if: Option<Condition>,
    pub items: Vec<Node>,
}

/// Single addressable value
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    pub offset: Offset,
    pub data_type: DataType,
    #[serde(default)]
    pub big_endian: Option<bool>,
    #[serde(default)]
    pub bit: Option<u8>,
    #[serde(default)]
    pub binary: Option<BitRange>,
    #[serde(default)]
    pub binary_coded_decimal: bool,
    #[serde(default)]
    pub operations: Vec<Operation>,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub step: Option<f64>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub hidden: bool,
    /// Offsets (same shift) that receive a copy of every written raw value
    #[serde(default)]
    pub mirrors: Vec<Offset>,
}

impl Variable {
    pub fn field(&self, default_big_endian: bool) -> Field {
        Field {
            data_type: self.data_type,
            big_endian: self.big_endian.unwrap_or(default_big_endian),
            bit: self.bit,
            binary: self.binary,
            bcd: self.binary_coded_decimal,
        }
    }
}

/// One independently addressable bit
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flag {
    #[serde(default)]
    pub id: Option<String>,
    pub offset: Offset,
    pub bit: u8,
    #[serde(default)]
    pub label: String,
    /// The flag reads as set when the bit is clear
    #[serde(default)]
    pub reversed: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub separator: bool,
    #[serde(default)]
    pub mirrors: Vec<Offset>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bitflags {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub disabled: bool,
    pub flags: Vec<Flag>,
}

/// Checked byte range `[offsetStart, offsetEnd)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Control {
    pub offset_start: Offset,
    pub offset_end: Offset,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checksum {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    pub offset: Offset,
    pub data_type: DataType,
    #[serde(default)]
    pub big_endian: Option<bool>,
    pub control: Control,
    /// Declarative algorithm; omitted when a hook generates the value
    #[serde(default)]
    pub algorithm: Option<Algorithm>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub disabled: bool,
}

/// How a group's parts compose into one displayed value
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupMode {
    /// Hours, minutes, seconds as separate fields
    Time,
    /// Numerator and denominator
    Fraction,
    /// Day count plus a time of day
    Chrono,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    pub mode: GroupMode,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub disabled: bool,
    pub items: Vec<Variable>,
}

/// Fixed-length string of custom character codes
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Text {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    pub offset: Offset,
    pub length: usize,
    #[serde(default = "default_letter_type")]
    pub letter_data_type: DataType,
    #[serde(default)]
    pub big_endian: Option<bool>,
    /// Resource mapping codes to glyphs
    pub letters: String,
    #[serde(default)]
    pub end_code: Option<Code>,
    #[serde(default)]
    pub fallback: Code,
    /// Regular expression the whole value must match on write
    #[serde(default)]
    pub regex: Option<String>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub disabled: bool,
}

fn default_letter_type() -> DataType {
    DataType::Uint8
}

impl Text {
    pub fn text_field(&self, default_big_endian: bool) -> TextField {
        TextField {
            length: self.length,
            letter: Field::new(self.letter_data_type)
                .big_endian(self.big_endian.unwrap_or(default_big_endian)),
            end_code: self.end_code.map(|Code(c)| c),
            fallback: self.fallback.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_node() {
        let node: Node = serde_json::from_str(
            r#"{
                "type": "variable",
                "id": "gil",
                "name": "Gil",
                "offset": "0x2dc",
                "dataType": "uint24",
                "bigEndian": true,
                "operations": [{"*": 10}],
                "max": 9999990
            }"#,
        )
        .unwrap();
        let Node::Variable(var) = node else {
            panic!("expected a variable");
        };
        assert_eq!(var.offset, Offset(0x2dc));
        assert_eq!(var.field(false).big_endian, true);
        assert_eq!(var.operations, vec![Operation::Multiply(10.0)]);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let err = serde_json::from_str::<Node>(r#"{"type": "sprite", "items": []}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_unknown_data_type_is_rejected() {
        let err = serde_json::from_str::<Node>(
            r#"{"type": "variable", "offset": 0, "dataType": "uint12"}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_condition() {
        let cond: Condition = serde_json::from_str(
            r#"{"offset": 0, "dataType": "uint8", "operator": "=", "value": 0}"#,
        )
        .unwrap();
        assert!(cond.holds(0));
        assert!(!cond.holds(1));

        let mask: Condition = serde_json::from_str(
            r#"{"offset": 0, "dataType": "uint8", "operator": "&", "value": 128}"#,
        )
        .unwrap();
        assert!(mask.holds(0x81));
        assert!(!mask.holds(0x7f));
    }

    #[test]
    fn test_string_defaults() {
        let node: Node = serde_json::from_str(
            r#"{"type": "string", "offset": 4, "length": 6, "letters": "charset", "endCode": "0xff"}"#,
        )
        .unwrap();
        let Node::String(text) = node else {
            panic!("expected a string");
        };
        let field = text.text_field(false);
        assert_eq!(field.letter.data_type, DataType::Uint8);
        assert_eq!(field.end_code, Some(0xff));
        assert_eq!(field.fallback, 0);
    }
}
