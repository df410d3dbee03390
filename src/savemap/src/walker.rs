//! Template tree walker.
//!
//! Resolves a template into a flat list of [`Item`]s with absolute offsets.
//! Traversal is depth first in document order; containers multiply their
//! subtree by `instances` and inject `index * length` into every descendant's
//! shift. Flattening is a pure function of (template, buffer, region, header
//! shift, hooks): two calls on the same inputs yield identical items.

use std::collections::{HashMap, HashSet};

use crate::checksum::{self, ChecksumStatus};
use crate::codec::{self, Field};
use crate::hooks::{Hooks, InstanceShift, ParseContext};
use crate::item::{Item, ItemKind, Number};
use crate::template::node::{self, Container, Node};
use crate::{Error, Result};

/// Flatten the context's template against its buffer.
pub fn flatten(hooks: &dyn Hooks, ctx: &ParseContext) -> Result<Vec<Item>> {
    let mut walker = Walker {
        hooks,
        ctx,
        big_endian: ctx.template.big_endian,
        items: Vec::new(),
        seen: HashSet::new(),
        unnamed: HashMap::new(),
    };
    let root = Scope {
        shift: ctx.base_shift(),
        ..Scope::default()
    };
    walker.nodes(&ctx.template.items, &root)?;

    tracing::debug!(
        template = %ctx.template.id,
        region = ?ctx.region,
        shift = root.shift,
        items = walker.items.len(),
        "template flattened"
    );
    Ok(walker.items)
}

/// Stored and computed value of a checksum item.
///
/// `None` when there is nothing to compare against: no algorithm and no hook,
/// or the checksum or its range lies outside the buffer.
pub fn checksum_status(hooks: &dyn Hooks, item: &Item, buffer: &[u8]) -> Option<ChecksumStatus> {
    let ItemKind::Checksum { field, .. } = &item.kind else {
        return None;
    };
    let stored = codec::read_int(buffer, item.offset, field).ok()? as u32;
    let computed = generate_checksum(hooks, item, buffer).ok()??;
    Some(ChecksumStatus { stored, computed })
}

/// Checksum value for `item` from the hooks or its declared algorithm,
/// truncated to the stored width.
pub(crate) fn generate_checksum(hooks: &dyn Hooks, item: &Item, buffer: &[u8]) -> Result<Option<u32>> {
    let ItemKind::Checksum {
        field,
        control,
        algorithm,
        ..
    } = &item.kind
    else {
        return Ok(None);
    };
    let value = match hooks.generate_checksum(item, buffer) {
        Some(value) => value,
        None => match algorithm {
            Some(algorithm) => checksum::compute(algorithm, buffer, control.clone())?,
            None => return Ok(None),
        },
    };
    Ok(Some(value & field.data_type.mask()))
}

#[derive(Debug, Clone, Default)]
struct Scope {
    shift: usize,
    /// Id prefix, e.g. `slots[1].party[0]`
    prefix: String,
    path: Vec<String>,
    instances: Vec<usize>,
    disabled: bool,
    hidden: bool,
}

impl Scope {
    fn child_id(&self, local: &str) -> String {
        if self.prefix.is_empty() {
            local.to_string()
        } else {
            format!("{}.{local}", self.prefix)
        }
    }

    fn nest(&self, id: &str, name: &str) -> Scope {
        let mut scope = self.clone();
        scope.prefix = self.child_id(id);
        if !name.is_empty() {
            scope.path.push(name.to_string());
        }
        scope
    }
}

struct Walker<'a, 'b> {
    hooks: &'a dyn Hooks,
    ctx: &'a ParseContext<'b>,
    big_endian: bool,
    items: Vec<Item>,
    seen: HashSet<String>,
    /// Counter of id-less nodes per prefix, for generated ids
    unnamed: HashMap<String, usize>,
}

impl Walker<'_, '_> {
    fn local_id(&mut self, scope: &Scope, id: Option<&str>, kind: &str) -> String {
        match id {
            Some(id) => id.to_string(),
            None => {
                let counter = self.unnamed.entry(scope.prefix.clone()).or_default();
                *counter += 1;
                format!("{kind}{}", *counter - 1)
            }
        }
    }

    fn nodes(&mut self, nodes: &[Node], scope: &Scope) -> Result<()> {
        for node in nodes {
            self.node(node, scope)?;
        }
        Ok(())
    }

    fn node(&mut self, node: &Node, scope: &Scope) -> Result<()> {
        match node {
            Node::Section(section) => {
                let mut inner = match &section.id {
                    Some(id) => scope.nest(id, &section.name),
                    None => scope.clone(),
                };
                inner.hidden |= section.hidden;
                self.nodes(&section.items, &inner)
            }
            Node::Tabs(tabs) => {
                let inner = match &tabs.id {
                    Some(id) => scope.nest(id, &tabs.name),
                    None => scope.clone(),
                };
                self.nodes(&tabs.items, &inner)
            }
            Node::Container(container) => self.container(container, scope),
            Node::Variable(var) => {
                let id = self.local_id(scope, var.id.as_deref(), "variable");
                let kind = ItemKind::Variable(self.number(var, scope));
                self.leaf(scope, &id, &var.name, var.offset.0, kind, var.disabled, var.hidden)
            }
            Node::Bitflags(flags) => self.bitflags(flags, scope),
            Node::Checksum(sum) => {
                let id = self.local_id(scope, sum.id.as_deref(), "checksum");
                let start = scope.shift.saturating_add(sum.control.offset_start.0);
                let end = scope.shift.saturating_add(sum.control.offset_end.0);
                let kind = ItemKind::Checksum {
                    field: Field::new(sum.data_type)
                        .big_endian(sum.big_endian.unwrap_or(self.big_endian)),
                    control: start..end,
                    algorithm: sum.algorithm.clone(),
                    status: None,
                };
                self.leaf(scope, &id, &sum.name, sum.offset.0, kind, sum.disabled, sum.hidden)
            }
            Node::Group(group) => {
                let gid = self.local_id(scope, group.id.as_deref(), "group");
                let inner = scope.nest(&gid, &group.name);
                let group_id = inner.prefix.clone();
                for (part, var) in group.items.iter().enumerate() {
                    let id = var.id.clone().unwrap_or_else(|| format!("part{part}"));
                    let kind = ItemKind::GroupPart {
                        group: group_id.clone(),
                        mode: group.mode,
                        part,
                        number: self.number(var, scope),
                    };
                    self.leaf(
                        &inner,
                        &id,
                        &var.name,
                        var.offset.0,
                        kind,
                        group.disabled || var.disabled,
                        group.hidden || var.hidden,
                    )?;
                }
                Ok(())
            }
            Node::String(text) => {
                let id = self.local_id(scope, text.id.as_deref(), "string");
                let kind = ItemKind::String {
                    text: text.text_field(self.big_endian),
                    letters: text.letters.clone(),
                    regex: text.regex.clone(),
                };
                self.leaf(scope, &id, &text.name, text.offset.0, kind, text.disabled, text.hidden)
            }
        }
    }

    fn number(&self, var: &node::Variable, scope: &Scope) -> Number {
        Number {
            field: var.field(self.big_endian),
            operations: var.operations.clone(),
            resource: var.resource.clone(),
            min: var.min,
            max: var.max,
            step: var.step,
            mirrors: var
                .mirrors
                .iter()
                .map(|m| scope.shift.saturating_add(m.0))
                .collect(),
        }
    }

    fn bitflags(&mut self, flags: &node::Bitflags, scope: &Scope) -> Result<()> {
        let gid = self.local_id(scope, flags.id.as_deref(), "bitflags");
        let inner = scope.nest(&gid, &flags.name);
        let group = inner.prefix.clone();
        for (index, flag) in flags.flags.iter().enumerate() {
            let id = flag.id.clone().unwrap_or_else(|| format!("flag{index}"));
            let kind = ItemKind::Flag {
                bit: flag.bit,
                reversed: flag.reversed,
                separator: flag.separator,
                group: group.clone(),
                mirrors: flag
                    .mirrors
                    .iter()
                    .map(|m| scope.shift.saturating_add(m.0))
                    .collect(),
            };
            self.leaf(
                &inner,
                &id,
                &flag.label,
                flag.offset.0,
                kind,
                flags.disabled || flag.disabled,
                flags.hidden || flag.hidden,
            )?;
        }
        Ok(())
    }

    fn container(&mut self, container: &Container, scope: &Scope) -> Result<()> {
        let cid = self.local_id(scope, container.id.as_deref(), "container");
        let outer = scope.nest(&cid, &container.name);
        let length = container.length.0;

        self.nodes(&container.prepend_subinstance, &outer)?;

        for index in 0..container.instances {
            let natural = index
                .checked_mul(length)
                .and_then(|offset| scope.shift.checked_add(offset))
                .ok_or_else(|| {
                    Error::malformed(outer.prefix.clone(), "instance shift overflows")
                })?;
            let shift = match self
                .hooks
                .parse_container_shift(self.ctx, container, index, natural)
            {
                InstanceShift::Keep => natural,
                InstanceShift::Replace(shift) => shift,
                InstanceShift::Skip => {
                    tracing::trace!(container = %outer.prefix, index, "instance skipped");
                    continue;
                }
            };

            let mut inner = scope.clone();
            inner.prefix = format!("{}[{index}]", outer.prefix);
            inner.path.push(self.instance_name(container, index));
            inner.instances.push(index);
            inner.shift = shift;
            if let Some(condition) = &container.disable_subinstance_if {
                let field = condition.field(self.big_endian);
                let disabled = match codec::read_int(
                    self.ctx.buffer,
                    shift.saturating_add(condition.offset.0),
                    &field,
                ) {
                    Ok(value) => condition.holds(value),
                    Err(e) => {
                        tracing::debug!(container = %outer.prefix, index, "instance predicate unreadable: {e}");
                        true
                    }
                };
                inner.disabled |= disabled;
            }

            self.nodes(&container.items, &inner)?;
        }

        self.nodes(&container.append_subinstance, &outer)
    }

    fn instance_name(&self, container: &Container, index: usize) -> String {
        if let Some(resource) = &container.resource {
            if let Ok(Some(label)) = self
                .ctx
                .resources
                .resolve(resource, index as i64, self.ctx.region)
            {
                return label.to_string();
            }
        }
        if container.name.is_empty() {
            format!("#{}", index + 1)
        } else {
            format!("{} {}", container.name, index + 1)
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn leaf(
        &mut self,
        scope: &Scope,
        local: &str,
        name: &str,
        offset: usize,
        kind: ItemKind,
        disabled: bool,
        hidden: bool,
    ) -> Result<()> {
        let id = scope.child_id(local);
        let mut item = Item {
            id: id.clone(),
            name: name.to_string(),
            path: scope.path.clone(),
            instances: scope.instances.clone(),
            shift: scope.shift,
            offset: scope.shift.saturating_add(offset),
            kind,
            disabled: disabled || scope.disabled,
            hidden: hidden || scope.hidden,
        };

        self.hooks
            .parse_item(&mut item, self.ctx)
            .map_err(|e| e.in_item(&id))?;

        if item.is_checksum() {
            let status = checksum_status(self.hooks, &item, self.ctx.buffer);
            if let Some(status) = status.filter(|s| !s.is_valid()) {
                tracing::debug!(
                    item = %item.id,
                    stored = status.stored,
                    computed = status.computed,
                    "checksum mismatch"
                );
            }
            if let ItemKind::Checksum { status: slot, .. } = &mut item.kind {
                *slot = status;
            }
        }

        if !self.seen.insert(item.id.clone()) {
            return Err(Error::malformed(item.id, "duplicate item id"));
        }
        self.items.push(item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::NoHooks;
    use crate::resource::ResourceRegistry;
    use crate::template::node::GroupMode;
    use crate::template::Template;

    fn context<'a>(
        template: &'a Template,
        buffer: &'a [u8],
        resources: &'a ResourceRegistry,
    ) -> ParseContext<'a> {
        ParseContext {
            template,
            buffer,
            region: None,
            resources,
            header_shift: 0,
            slot: None,
        }
    }

    fn slots() -> Template {
        Template::from_json(
            r#"{
                "id": "slots",
                "bigEndian": true,
                "items": [
                    {"type": "variable", "id": "header", "offset": 0, "dataType": "uint8"},
                    {
                        "type": "container",
                        "id": "slots",
                        "name": "Slot",
                        "instances": 3,
                        "length": "0x28",
                        "disableSubinstanceIf": {"offset": "0x2", "dataType": "uint8", "operator": "=", "value": 0},
                        "items": [
                            {
                                "type": "checksum",
                                "id": "checksum",
                                "offset": "0x0",
                                "dataType": "uint16",
                                "control": {"offsetStart": "0x2", "offsetEnd": "0x28"},
                                "algorithm": {"kind": "sum"}
                            },
                            {"type": "variable", "id": "level", "offset": "0x2", "dataType": "uint8"},
                            {
                                "type": "container",
                                "id": "party",
                                "instances": 2,
                                "length": 4,
                                "items": [
                                    {"type": "variable", "id": "hp", "offset": "0x4", "dataType": "uint16"}
                                ]
                            }
                        ]
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    fn find<'a>(items: &'a [Item], id: &str) -> &'a Item {
        items
            .iter()
            .find(|i| i.id == id)
            .unwrap_or_else(|| panic!("no item {id}"))
    }

    #[test]
    fn test_container_shift() {
        let template = slots();
        let buffer = vec![0u8; 0x80];
        let resources = ResourceRegistry::new();
        let items = flatten(&NoHooks, &context(&template, &buffer, &resources)).unwrap();

        assert_eq!(find(&items, "slots[2].checksum").offset, 0x50);
        for i in 0..3 {
            let level = find(&items, &format!("slots[{i}].level"));
            assert_eq!(level.offset, 0x2 + i * 0x28);
            assert_eq!(level.instances, vec![i]);
        }
        let hp = find(&items, "slots[1].party[1].hp");
        assert_eq!(hp.offset, 0x28 + 4 + 0x4);
        assert_eq!(hp.instances, vec![1, 1]);
        assert_eq!(hp.path, vec!["Slot 2".to_string(), "#2".to_string()]);
        assert_eq!(items.len(), 1 + 3 * 4);
    }

    #[test]
    fn test_flatten_is_deterministic() {
        let template = slots();
        let mut buffer = vec![0u8; 0x80];
        buffer[0x2a] = 7;
        let resources = ResourceRegistry::new();
        let ctx = context(&template, &buffer, &resources);
        let first = flatten(&NoHooks, &ctx).unwrap();
        let second = flatten(&NoHooks, &ctx).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_disable_subinstance_if() {
        let template = slots();
        let mut buffer = vec![0u8; 0x80];
        buffer[0x2a] = 1;
        let resources = ResourceRegistry::new();
        let items = flatten(&NoHooks, &context(&template, &buffer, &resources)).unwrap();

        assert!(find(&items, "slots[0].level").disabled);
        assert!(!find(&items, "slots[1].level").disabled);
        assert!(!find(&items, "slots[1].party[0].hp").disabled);
        // Disabled instances stay addressable
        assert!(find(&items, "slots[2].party[1].hp").disabled);
        assert!(!find(&items, "header").disabled);
    }

    #[test]
    fn test_out_of_bounds_predicate_disables() {
        let template = slots();
        // Third slot starts at 0x50 and its predicate byte 0x52 is missing
        let mut buffer = vec![1u8; 0x52];
        buffer[0x2] = 1;
        let resources = ResourceRegistry::new();
        let items = flatten(&NoHooks, &context(&template, &buffer, &resources)).unwrap();
        assert!(!find(&items, "slots[1].level").disabled);
        assert!(find(&items, "slots[2].level").disabled);
        let ItemKind::Checksum { status, .. } = &find(&items, "slots[2].checksum").kind else {
            panic!("expected a checksum");
        };
        assert_eq!(*status, None);
    }

    #[test]
    fn test_checksum_status() {
        let template = slots();
        let mut buffer = vec![0u8; 0x80];
        buffer[0x10] = 3;
        buffer[0x11] = 4;
        buffer[0x1] = 7;
        let resources = ResourceRegistry::new();
        let items = flatten(&NoHooks, &context(&template, &buffer, &resources)).unwrap();
        let ItemKind::Checksum { status, control, .. } = &find(&items, "slots[0].checksum").kind else {
            panic!("expected a checksum");
        };
        assert_eq!(*control, 0x2..0x28);
        assert_eq!(
            *status,
            Some(ChecksumStatus {
                stored: 7,
                computed: 7
            })
        );
    }

    struct SkipOdd;

    impl Hooks for SkipOdd {
        fn parse_container_shift(
            &self,
            _ctx: &ParseContext,
            container: &Container,
            index: usize,
            shift: usize,
        ) -> InstanceShift {
            match (container.id.as_deref(), index) {
                (Some("slots"), 1) => InstanceShift::Skip,
                (Some("slots"), 2) => InstanceShift::Replace(shift + 1),
                _ => InstanceShift::Keep,
            }
        }

        fn parse_item(&self, item: &mut Item, _ctx: &ParseContext) -> Result<()> {
            if item.id == "header" {
                item.hidden = true;
                item.name = "Header".into();
            }
            Ok(())
        }
    }

    #[test]
    fn test_hooks_shape_instances_and_items() {
        let template = slots();
        let buffer = vec![0u8; 0x80];
        let resources = ResourceRegistry::new();
        let items = flatten(&SkipOdd, &context(&template, &buffer, &resources)).unwrap();

        assert!(items.iter().all(|i| !i.id.starts_with("slots[1]")));
        assert_eq!(find(&items, "slots[2].level").offset, 0x53);
        let header = find(&items, "header");
        assert!(header.hidden);
        assert_eq!(header.name, "Header");
    }

    #[test]
    fn test_generated_ids_and_region_shift() {
        let template = Template::from_json(
            r#"{
                "id": "t",
                "regionShifts": {"japan": 16},
                "items": [
                    {"type": "section", "items": [
                        {"type": "variable", "offset": 0, "dataType": "uint8"},
                        {"type": "bitflags", "id": "events", "flags": [
                            {"offset": 1, "bit": 0, "label": "Met Zell"},
                            {"id": "boss", "offset": 1, "bit": 7, "reversed": true, "mirrors": [2]}
                        ]}
                    ]},
                    {"type": "variable", "offset": 3, "dataType": "uint8"}
                ]
            }"#,
        )
        .unwrap();
        let buffer = vec![0u8; 0x20];
        let resources = ResourceRegistry::new();
        let mut ctx = context(&template, &buffer, &resources);
        ctx.region = Some("japan");
        let items = flatten(&NoHooks, &ctx).unwrap();

        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["variable0", "events.flag0", "events.boss", "variable1"]
        );
        assert_eq!(find(&items, "variable1").offset, 19);
        let ItemKind::Flag { mirrors, group, .. } = &find(&items, "events.boss").kind else {
            panic!("expected a flag");
        };
        assert_eq!(mirrors, &vec![18]);
        assert_eq!(group, "events");
    }

    #[test]
    fn test_group_parts_share_mode() {
        let template = Template::from_json(
            r#"{"id": "t", "items": [
                {"type": "container", "id": "slots", "instances": 2, "length": "0x10", "items": [
                    {"type": "group", "id": "playtime", "mode": "time", "items": [
                        {"id": "hours", "offset": "0x4", "dataType": "uint16"},
                        {"id": "minutes", "offset": "0x6", "dataType": "uint8"},
                        {"offset": "0x7", "dataType": "uint8"}
                    ]}
                ]}
            ]}"#,
        )
        .unwrap();
        let buffer = vec![0u8; 0x20];
        let resources = ResourceRegistry::new();
        let items = flatten(&NoHooks, &context(&template, &buffer, &resources)).unwrap();
        assert_eq!(items.len(), 6);

        for (part, (name, offset)) in [("hours", 0x4), ("minutes", 0x6), ("part2", 0x7)]
            .into_iter()
            .enumerate()
        {
            let item = find(&items, &format!("slots[1].playtime.{name}"));
            assert_eq!(item.offset, 0x10 + offset);
            let ItemKind::GroupPart { group, mode, part: index, .. } = &item.kind else {
                panic!("expected a group part");
            };
            assert_eq!(group, "slots[1].playtime");
            assert_eq!(*mode, GroupMode::Time);
            assert_eq!(*index, part);
        }
    }

    #[test]
    fn test_prepend_append_emitted_once() {
        let template = Template::from_json(
            r#"{"id": "t", "items": [
                {"type": "container", "id": "save", "instances": 2, "length": "0x40", "items": [
                    {"type": "container", "id": "slots", "instances": 3, "length": "0x10",
                     "prependSubinstance": [
                        {"type": "variable", "id": "count", "offset": "0x1", "dataType": "uint8"}
                     ],
                     "appendSubinstance": [
                        {"type": "variable", "id": "footer", "offset": "0x3f", "dataType": "uint8"}
                     ],
                     "items": [
                        {"type": "variable", "id": "x", "offset": "0x2", "dataType": "uint8"}
                     ]}
                ]}
            ]}"#,
        )
        .unwrap();
        let buffer = vec![0u8; 0x80];
        let resources = ResourceRegistry::new();
        let items = flatten(&NoHooks, &context(&template, &buffer, &resources)).unwrap();

        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "save[0].slots.count",
                "save[0].slots[0].x",
                "save[0].slots[1].x",
                "save[0].slots[2].x",
                "save[0].slots.footer",
                "save[1].slots.count",
                "save[1].slots[0].x",
                "save[1].slots[1].x",
                "save[1].slots[2].x",
                "save[1].slots.footer",
            ]
        );
        let count = find(&items, "save[1].slots.count");
        assert_eq!(count.offset, 0x41);
        assert_eq!(count.instances, vec![1]);
        assert_eq!(find(&items, "save[1].slots.footer").offset, 0x7f);
        assert_eq!(find(&items, "save[0].slots.footer").offset, 0x3f);
        assert_eq!(find(&items, "save[1].slots[2].x").offset, 0x40 + 0x22);
    }

    #[test]
    fn test_duplicate_generated_id_is_malformed() {
        let template = Template::from_json(
            r#"{"id": "t", "items": [
                {"type": "variable", "offset": 0, "dataType": "uint8"},
                {"type": "variable", "id": "variable0", "offset": 1, "dataType": "uint8"}
            ]}"#,
        )
        .unwrap();
        let buffer = vec![0u8; 4];
        let resources = ResourceRegistry::new();
        let err = flatten(&NoHooks, &context(&template, &buffer, &resources)).unwrap_err();
        assert!(matches!(err, Error::MalformedTemplate { .. }));
    }
}
