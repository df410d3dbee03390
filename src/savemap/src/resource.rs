//! Resource tables: raw integer codes to human-readable labels.
//!
//! Tables come from the template (static, optionally one per region) or are
//! pushed at runtime by override hooks (dynamic). Grouping and display order
//! are carried for presentation and never change how a code resolves.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::template::de::parse_int;
use crate::{Error, Result};

/// A named subset of codes, used by front-ends for categorised pickers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGroup {
    pub name: String,
    pub codes: Vec<i64>,
}

/// One code to label table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resource {
    entries: BTreeMap<i64, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    order: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    groups: Vec<ResourceGroup>,
}

impl Resource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (i64, S)>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ..Self::default()
        }
    }

    pub fn insert(&mut self, code: i64, label: impl Into<String>) {
        self.entries.insert(code, label.into());
    }

    pub fn with_order(mut self, order: Vec<i64>) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_groups(mut self, groups: Vec<ResourceGroup>) -> Self {
        self.groups = groups;
        self
    }

    pub fn label(&self, code: i64) -> Option<&str> {
        self.entries.get(&code).map(String::as_str)
    }

    /// First code (in key order) whose label is exactly `label`
    pub fn code(&self, label: &str) -> Option<i64> {
        self.entries
            .iter()
            .find(|(_, l)| l.as_str() == label)
            .map(|(code, _)| *code)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (i64, &str)> {
        self.entries.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Entries in display order: the explicit order first, then any codes it
    /// did not mention in key order.
    pub fn ordered(&self) -> Vec<(i64, &str)> {
        let Some(order) = &self.order else {
            return self.iter().collect();
        };
        let mut out: Vec<(i64, &str)> = order
            .iter()
            .filter_map(|code| self.label(*code).map(|label| (*code, label)))
            .collect();
        for (code, label) in self.iter() {
            if !order.contains(&code) {
                out.push((code, label));
            }
        }
        out
    }

    pub fn groups(&self) -> &[ResourceGroup] {
        &self.groups
    }
}

/// Raw table as written in a template: keys are decimal or `0x` hex strings
pub type RawTable = BTreeMap<String, String>;

/// Resource declaration inside a template document
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ResourceDef {
    Regional { regions: BTreeMap<String, RawTable> },
    Dynamic { dynamic: bool },
    Static(RawTable),
}

fn parse_table(id: &str, raw: &RawTable) -> Result<Resource> {
    let mut resource = Resource::new();
    for (key, label) in raw {
        let code = parse_int(key).ok_or_else(|| {
            Error::malformed(
                format!("resources.{id}"),
                format!("'{key}' is not an integer code"),
            )
        })?;
        resource.insert(code, label.clone());
    }
    Ok(resource)
}

#[derive(Debug, Clone)]
enum Table {
    Static(Resource),
    Regional(BTreeMap<String, Resource>),
    Dynamic,
}

/// Every resource a session can resolve against.
///
/// Dynamic tables start empty and are filled (and refreshed) only when an
/// override hook calls [`ResourceRegistry::set_dynamic`].
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    tables: HashMap<String, Table>,
    dynamic: HashMap<String, Resource>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from template declarations plus their group and
    /// order metadata.
    pub fn from_defs(
        defs: &BTreeMap<String, ResourceDef>,
        groups: &BTreeMap<String, Vec<ResourceGroup>>,
        orders: &BTreeMap<String, Vec<i64>>,
    ) -> Result<Self> {
        let decorate = |id: &str, mut resource: Resource| {
            if let Some(order) = orders.get(id) {
                resource = resource.with_order(order.clone());
            }
            if let Some(groups) = groups.get(id) {
                resource = resource.with_groups(groups.clone());
            }
            resource
        };

        let mut registry = Self::new();
        for (id, def) in defs {
            let table = match def {
                ResourceDef::Static(raw) => Table::Static(decorate(id, parse_table(id, raw)?)),
                ResourceDef::Regional { regions } => {
                    let mut tables = BTreeMap::new();
                    for (region, raw) in regions {
                        tables.insert(region.clone(), decorate(id, parse_table(id, raw)?));
                    }
                    Table::Regional(tables)
                }
                ResourceDef::Dynamic { dynamic: true } => Table::Dynamic,
                ResourceDef::Dynamic { dynamic: false } => Table::Static(Resource::new()),
            };
            registry.tables.insert(id.clone(), table);
        }
        Ok(registry)
    }

    pub fn insert_static(&mut self, id: impl Into<String>, resource: Resource) {
        self.tables.insert(id.into(), Table::Static(resource));
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tables.contains_key(id)
    }

    pub fn is_dynamic(&self, id: &str) -> bool {
        matches!(self.tables.get(id), Some(Table::Dynamic))
    }

    /// Replace the contents of a dynamic table (registering it if needed)
    pub fn set_dynamic(&mut self, id: impl Into<String>, resource: Resource) {
        let id = id.into();
        tracing::debug!(resource = %id, entries = resource.len(), "dynamic resource refreshed");
        self.tables.insert(id.clone(), Table::Dynamic);
        self.dynamic.insert(id, resource);
    }

    /// The table `id` resolves to for `region`.
    ///
    /// Regional tables fall back to their first region when the session has
    /// no region or the region has no table of its own. Dynamic tables that
    /// have not been computed yet resolve to an empty table.
    pub fn get(&self, id: &str, region: Option<&str>) -> Result<&Resource> {
        static EMPTY: Resource = Resource {
            entries: BTreeMap::new(),
            order: None,
            groups: Vec::new(),
        };

        match self.tables.get(id) {
            Some(Table::Static(resource)) => Ok(resource),
            Some(Table::Regional(tables)) => region
                .and_then(|r| tables.get(r))
                .or_else(|| tables.values().next())
                .ok_or_else(|| Error::UnknownResource(id.to_string())),
            Some(Table::Dynamic) => Ok(self.dynamic.get(id).unwrap_or(&EMPTY)),
            None => Err(Error::UnknownResource(id.to_string())),
        }
    }

    pub fn resolve(&self, id: &str, code: i64, region: Option<&str>) -> Result<Option<&str>> {
        Ok(self.get(id, region)?.label(code))
    }

    pub fn reverse_resolve(&self, id: &str, label: &str, region: Option<&str>) -> Result<Option<i64>> {
        Ok(self.get(id, region)?.code(label))
    }
}
