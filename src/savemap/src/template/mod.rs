//! Declarative template documents.
//!
//! A template describes one game's layout. It is deserialized once, checked
//! with [`Template::validate`], and then shared read-only by every session
//! editing a buffer of that game.

pub mod de;
pub mod node;
pub mod operation;

pub use node::Node;

use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::resource::{ResourceDef, ResourceGroup};
use crate::{Error, Result};
use de::{Bytes, Offset};

/// Byte pattern that must appear at a fixed offset
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Pattern {
    pub offset: Offset,
    pub bytes: Bytes,
}

impl Pattern {
    /// Out-of-bounds patterns never match
    pub fn matches(&self, buffer: &[u8], shift: usize) -> bool {
        let start = self.offset.0 + shift;
        buffer
            .get(start..start + self.bytes.0.len())
            .is_some_and(|window| window == self.bytes.0.as_slice())
    }
}

/// Boolean tree of byte patterns identifying one region
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Validator {
    All {
        #[serde(rename = "$and")]
        all: Vec<Validator>,
    },
    Any {
        #[serde(rename = "$or")]
        any: Vec<Validator>,
    },
    Pattern(Pattern),
}

impl Validator {
    pub fn matches(&self, buffer: &[u8], shift: usize) -> bool {
        match self {
            Validator::All { all } => all.iter().all(|v| v.matches(buffer, shift)),
            Validator::Any { any } => any.iter().any(|v| v.matches(buffer, shift)),
            Validator::Pattern(p) => p.matches(buffer, shift),
        }
    }
}

/// Platform header in front of the actual save data (emulator headers,
/// memory card frames)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HeaderRule {
    pub size: Offset,
    /// Pattern at the start of the file identifying the header
    #[serde(default)]
    pub signature: Option<Bytes>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Identifier of the hook set in the [`crate::HookRegistry`]
    #[serde(default)]
    pub hooks: Option<String>,
    /// Default byte order for leaves that do not declare one
    #[serde(default)]
    pub big_endian: bool,
    /// Length of the save data without any platform header
    #[serde(default)]
    pub expected_size: Option<usize>,
    #[serde(default)]
    pub headers: Vec<HeaderRule>,
    /// Region name to validator. Order of regions is the key order.
    #[serde(default)]
    pub validator: BTreeMap<String, Validator>,
    /// Extra shift applied to every item when the region is active
    #[serde(default)]
    pub region_shifts: BTreeMap<String, Offset>,
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceDef>,
    #[serde(default)]
    pub resources_groups: BTreeMap<String, Vec<ResourceGroup>>,
    #[serde(default)]
    pub resources_order: BTreeMap<String, Vec<i64>>,
    pub items: Vec<Node>,
}

impl Template {
    pub fn from_json(text: &str) -> Result<Self> {
        let template: Template = serde_json::from_str(text)?;
        template.validate()?;
        Ok(template)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let template: Template = serde_yaml::from_str(text)?;
        template.validate()?;
        Ok(template)
    }

    /// Load a `.json`, `.yaml` or `.yml` document. Other extensions are
    /// sniffed: a leading `{` means JSON.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => Self::from_json(&text),
            Some("yaml") | Some("yml") => Self::from_yaml(&text),
            _ if text.trim_start().starts_with('{') => Self::from_json(&text),
            _ => Self::from_yaml(&text),
        }
    }

    /// Shift produced by the declarative header rules
    pub fn header_shift(&self, buffer: &[u8]) -> usize {
        for rule in &self.headers {
            let hit = match &rule.signature {
                Some(Bytes(signature)) => buffer.starts_with(signature),
                None => self
                    .expected_size
                    .is_some_and(|size| size + rule.size.0 == buffer.len()),
            };
            if hit {
                tracing::debug!(template = %self.id, size = rule.size.0, "header detected");
                return rule.size.0;
            }
        }
        0
    }

    pub fn region_shift(&self, region: Option<&str>) -> usize {
        region
            .and_then(|r| self.region_shifts.get(r))
            .map_or(0, |o| o.0)
    }

    /// Check cross references and field shapes that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let mut checker = Checker {
            template: self,
            ids: HashSet::new(),
        };
        checker.nodes(&self.items, "items")?;

        for id in self
            .resources_groups
            .keys()
            .chain(self.resources_order.keys())
        {
            if !self.resources.contains_key(id) {
                return Err(Error::malformed(
                    format!("resources.{id}"),
                    "metadata for an undeclared resource",
                ));
            }
        }
        Ok(())
    }
}

struct Checker<'a> {
    template: &'a Template,
    /// Ids declared at the top level of each scope, used to catch duplicates
    ids: HashSet<String>,
}

impl Checker<'_> {
    fn resource(&self, path: &str, id: &str) -> Result<()> {
        if self.template.resources.contains_key(id) {
            Ok(())
        } else {
            Err(Error::malformed(path, format!("unknown resource '{id}'")))
        }
    }

    fn unique(&mut self, path: &str, id: Option<&str>) -> Result<()> {
        if let Some(id) = id {
            if !self.ids.insert(format!("{path}/{id}")) {
                return Err(Error::malformed(path, format!("duplicate id '{id}'")));
            }
        }
        Ok(())
    }

    fn variable(&self, path: &str, var: &node::Variable) -> Result<()> {
        var.field(self.template.big_endian)
            .check()
            .map_err(|reason| Error::malformed(path, reason))?;
        if let Some(resource) = &var.resource {
            self.resource(path, resource)?;
        }
        for op in &var.operations {
            if let Some(reason) = op.check() {
                return Err(Error::malformed(path, reason));
            }
        }
        if let (Some(min), Some(max)) = (var.min, var.max) {
            if min > max {
                return Err(Error::malformed(path, format!("min {min} > max {max}")));
            }
        }
        if var.step.is_some_and(|s| s <= 0.0) {
            return Err(Error::malformed(path, "step must be positive"));
        }
        Ok(())
    }

    fn nodes(&mut self, nodes: &[Node], scope: &str) -> Result<()> {
        for (index, node) in nodes.iter().enumerate() {
            let path = format!("{scope}[{index}]");
            self.node(node, &path, scope)?;
        }
        Ok(())
    }

    fn node(&mut self, node: &Node, path: &str, scope: &str) -> Result<()> {
        match node {
            // Structural nodes without an id share their parent's id scope
            Node::Section(n) => {
                self.unique(scope, n.id.as_deref())?;
                self.nodes(&n.items, &scoped(scope, path, n.id.as_deref()))
            }
            Node::Tabs(n) => {
                self.unique(scope, n.id.as_deref())?;
                self.nodes(&n.items, &scoped(scope, path, n.id.as_deref()))
            }
            Node::Container(c) => {
                self.unique(scope, c.id.as_deref())?;
                if c.length.0 == 0 {
                    return Err(Error::malformed(path, "container length must be > 0"));
                }
                if let Some(resource) = &c.resource {
                    self.resource(path, resource)?;
                }
                if let Some(cond) = &c.disable_subinstance_if {
                    cond.field(self.template.big_endian)
                        .check()
                        .map_err(|reason| Error::malformed(path, reason))?;
                }
                let inner = format!("{path}.instance");
                self.nodes(&c.prepend_subinstance, &format!("{path}.prepend"))?;
                self.nodes(&c.items, &inner)?;
                self.nodes(&c.append_subinstance, &format!("{path}.append"))
            }
            Node::Variable(var) => {
                self.unique(scope, var.id.as_deref())?;
                self.variable(path, var)
            }
            Node::Bitflags(b) => {
                self.unique(scope, b.id.as_deref())?;
                for (i, flag) in b.flags.iter().enumerate() {
                    if flag.bit > 7 {
                        return Err(Error::malformed(
                            format!("{path}.flags[{i}]"),
                            format!("bit {} is outside a byte", flag.bit),
                        ));
                    }
                }
                Ok(())
            }
            Node::Checksum(c) => {
                self.unique(scope, c.id.as_deref())?;
                if c.control.offset_start > c.control.offset_end {
                    return Err(Error::malformed(path, "control start is after its end"));
                }
                if c.data_type.is_signed() || c.data_type == crate::DataType::Float32 {
                    return Err(Error::malformed(
                        path,
                        format!("checksum cannot be stored as {}", c.data_type),
                    ));
                }
                Ok(())
            }
            Node::Group(g) => {
                self.unique(scope, g.id.as_deref())?;
                if g.items.is_empty() {
                    return Err(Error::malformed(path, "group has no parts"));
                }
                for (i, var) in g.items.iter().enumerate() {
                    self.variable(&format!("{path}.items[{i}]"), var)?;
                }
                Ok(())
            }
            Node::String(s) => {
                self.unique(scope, s.id.as_deref())?;
                self.resource(path, &s.letters)?;
                if s.letter_data_type == crate::DataType::Float32 {
                    return Err(Error::malformed(path, "letters cannot be float32"));
                }
                if let Some(pattern) = &s.regex {
                    regex::Regex::new(pattern)
                        .map_err(|e| Error::malformed(path, format!("invalid regex: {e}")))?;
                }
                Ok(())
            }
        }
    }
}

fn scoped(scope: &str, path: &str, id: Option<&str>) -> String {
    match id {
        Some(_) => path.to_string(),
        None => scope.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEMO: &str = r#"{
        "id": "demo",
        "name": "Demo",
        "bigEndian": true,
        "expectedSize": 8,
        "headers": [{"size": 4, "signature": "4d 43 4d 43"}, {"size": 2}],
        "validator": {
            "europe": {"$and": [{"offset": 0, "bytes": "41"}, {"offset": 1, "bytes": [69]}]},
            "usa": {"offset": 0, "bytes": "41"}
        },
        "regionShifts": {"europe": 2},
        "resources": {"items": {"0": "-", "0x1": "Potion"}},
        "items": [
            {"type": "variable", "id": "item", "offset": "0x4", "dataType": "uint8", "resource": "items"}
        ]
    }"#;

    #[test]
    fn test_load_json() {
        let template = Template::from_json(DEMO).unwrap();
        assert_eq!(template.id, "demo");
        assert_eq!(template.items.len(), 1);
        assert_eq!(template.region_shift(Some("europe")), 2);
        assert_eq!(template.region_shift(Some("usa")), 0);
        assert_eq!(template.region_shift(None), 0);
    }

    #[test]
    fn test_load_yaml() {
        let yaml = r#"
id: demo
items:
  - type: container
    id: slots
    instances: 3
    length: "0x28"
    items:
      - type: checksum
        offset: 0
        dataType: uint16
        control: {offsetStart: 2, offsetEnd: "0x28"}
        algorithm: {kind: sum}
"#;
        let template = Template::from_yaml(yaml).unwrap();
        let Node::Container(c) = &template.items[0] else {
            panic!("expected a container");
        };
        assert_eq!(c.length, Offset(0x28));
    }

    #[test]
    fn test_validators() {
        let template = Template::from_json(DEMO).unwrap();
        let europe = &template.validator["europe"];
        let usa = &template.validator["usa"];
        assert!(europe.matches(b"AE", 0));
        assert!(!europe.matches(b"AB", 0));
        assert!(usa.matches(b"AB", 0));
        assert!(!usa.matches(b"", 0));
        assert!(europe.matches(b"xxAE", 2));
    }

    #[test]
    fn test_header_shift() {
        let template = Template::from_json(DEMO).unwrap();
        assert_eq!(template.header_shift(b"MCMC0123"), 4);
        // No signature: sized rule matches expectedSize + 2
        assert_eq!(template.header_shift(&[0u8; 10]), 2);
        assert_eq!(template.header_shift(&[0u8; 8]), 0);
    }

    #[test]
    fn test_unknown_resource_is_malformed() {
        let text = DEMO.replace(r#""resource": "items""#, r#""resource": "weapons""#);
        let err = Template::from_json(&text).unwrap_err();
        assert!(matches!(err, Error::MalformedTemplate { .. }), "{err}");
    }

    #[test]
    fn test_bad_shapes_are_malformed() {
        let cases = [
            r#"{"type": "variable", "offset": 0, "dataType": "uint8", "bit": 9}"#,
            r#"{"type": "variable", "offset": 0, "dataType": "uint8", "operations": [{"/": 0}]}"#,
            r#"{"type": "container", "instances": 2, "length": 0, "items": []}"#,
            r#"{"type": "group", "mode": "time", "items": []}"#,
            r#"{"type": "checksum", "offset": 0, "dataType": "uint8", "control": {"offsetStart": 4, "offsetEnd": 2}}"#,
            r#"{"type": "string", "offset": 0, "length": 4, "letters": "charset", "regex": "[a-"}"#,
        ];
        for case in cases {
            let text = format!(
                r#"{{"id": "t", "resources": {{"charset": {{"65": "A"}}}}, "items": [{case}]}}"#
            );
            let err = Template::from_json(&text).unwrap_err();
            assert!(matches!(err, Error::MalformedTemplate { .. }), "{case}: {err}");
        }
    }

    #[test]
    fn test_duplicate_ids() {
        let text = r#"{"id": "t", "items": [
            {"type": "variable", "id": "a", "offset": 0, "dataType": "uint8"},
            {"type": "section", "items": [
                {"type": "variable", "id": "a", "offset": 1, "dataType": "uint8"}
            ]}
        ]}"#;
        assert!(Template::from_json(text).is_err());
    }

    #[test]
    fn test_from_path_sniffs_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.tpl");
        std::fs::write(&path, DEMO).unwrap();
        assert_eq!(Template::from_path(&path).unwrap().id, "demo");
    }
}
