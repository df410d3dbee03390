//! Editing session: one buffer, one template, one hook set.
//!
//! This is the consumer API: [`Session::load`], [`Session::items`],
//! [`Session::value`], [`Session::set_value`] and [`Session::save`].
//! A session owns its buffer exclusively and is single threaded; hooks run
//! synchronously inside the call that triggered them.

use std::collections::HashMap;
use std::ops::Range;
use std::rc::Rc;

use regex::Regex;

use crate::codec::{self, text, DataType, Field};
use crate::error::EditError;
use crate::hooks::{HookRegistry, Hooks, ParseContext};
use crate::item::{Item, ItemKind, Number, Value};
use crate::region;
use crate::resource::ResourceRegistry;
use crate::template::operation;
use crate::template::Template;
use crate::walker;
use crate::{Error, Result};

/// Tolerance when checking `step` against a displayed value
const STEP_EPSILON: f64 = 1e-9;

/// Knobs for [`Session::load_with`]
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Skip detection and use this region
    pub region: Option<String>,
    /// Deepest allowed nesting of `set_value` calls made from hooks
    pub max_hook_depth: usize,
    /// Rewrite every checksum whose range covers a written byte
    pub auto_checksum: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            region: None,
            max_hook_depth: 16,
            auto_checksum: true,
        }
    }
}

pub struct Session {
    template: Rc<Template>,
    hooks: Rc<dyn Hooks>,
    buffer: Vec<u8>,
    region: Option<String>,
    regions: Vec<String>,
    header_shift: usize,
    slot: Option<usize>,
    resources: ResourceRegistry,
    items: Vec<Item>,
    index: HashMap<String, usize>,
    options: SessionOptions,
    /// Current nesting of `set_value`
    depth: usize,
    /// Byte ranges written since the outermost `set_value` started
    written: Vec<Range<usize>>,
    /// Compiled string validators, keyed by pattern
    patterns: HashMap<String, Regex>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("template", &self.template.id)
            .field("region", &self.region)
            .field("header_shift", &self.header_shift)
            .field("buffer_len", &self.buffer.len())
            .field("items", &self.items.len())
            .finish()
    }
}

impl Session {
    pub fn load(bytes: Vec<u8>, template: Rc<Template>, registry: &HookRegistry) -> Result<Self> {
        Self::load_with(bytes, template, registry, SessionOptions::default())
    }

    /// Load a buffer: transform it, find the header shift and region, build
    /// the resource tables, flatten and fire `on_ready`.
    ///
    /// Fails with [`Error::Validation`] when the template declares regions and
    /// none matches; nothing is parsed in that case.
    pub fn load_with(
        bytes: Vec<u8>,
        template: Rc<Template>,
        registry: &HookRegistry,
        options: SessionOptions,
    ) -> Result<Self> {
        let hooks = registry.resolve(template.hooks.as_deref())?;
        let buffer = hooks.before_init_data_view(bytes);
        let header_shift = hooks
            .init_header_shift(&buffer)
            .unwrap_or_else(|| template.header_shift(&buffer));

        let regions = match &options.region {
            Some(forced) => vec![forced.clone()],
            None => match region::detect_regions(&template, hooks.as_ref(), &buffer, header_shift) {
                None => Vec::new(),
                Some(regions) if regions.is_empty() => {
                    return Err(Error::Validation {
                        template: template.id.clone(),
                    });
                }
                Some(regions) => regions,
            },
        };
        let region = regions.first().cloned();

        let resources = ResourceRegistry::from_defs(
            &template.resources,
            &template.resources_groups,
            &template.resources_order,
        )?;

        let mut session = Session {
            template,
            hooks,
            buffer,
            region,
            regions,
            header_shift,
            slot: None,
            resources,
            items: Vec::new(),
            index: HashMap::new(),
            options,
            depth: 0,
            written: Vec::new(),
            patterns: HashMap::new(),
        };
        session.reflatten()?;

        let hooks = Rc::clone(&session.hooks);
        hooks.on_ready(&mut session)?;
        session.finish_writes()?;
        session.reflatten()?;

        let invalid = session
            .items
            .iter()
            .filter(|i| !i.disabled)
            .filter(|i| matches!(&i.kind, ItemKind::Checksum { status: Some(s), .. } if !s.is_valid()))
            .count();
        if invalid > 0 {
            tracing::warn!(template = %session.template.id, invalid, "checksums do not match");
        }
        tracing::debug!(
            template = %session.template.id,
            region = ?session.region,
            header_shift = session.header_shift,
            items = session.items.len(),
            "session loaded"
        );
        Ok(session)
    }

    /// Read-only view handed to parse and read hooks
    pub fn context(&self) -> ParseContext<'_> {
        ParseContext {
            template: &self.template,
            buffer: &self.buffer,
            region: self.region.as_deref(),
            resources: &self.resources,
            header_shift: self.header_shift,
            slot: self.slot,
        }
    }

    fn reflatten(&mut self) -> Result<()> {
        let items = walker::flatten(self.hooks.as_ref(), &self.context())?;
        self.index = items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.id.clone(), i))
            .collect();
        self.items = items;
        Ok(())
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        self.index.get(id).map(|&i| &self.items[i])
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// Every region the buffer matched; the first one is active
    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    pub fn header_shift(&self) -> usize {
        self.header_shift
    }

    pub fn slot(&self) -> Option<usize> {
        self.slot
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    /// For hooks maintaining dynamic resources
    pub fn resources_mut(&mut self) -> &mut ResourceRegistry {
        &mut self.resources
    }

    /// Buffer as it should be written to disk
    pub fn save(&self) -> Vec<u8> {
        self.hooks.before_saving(self.buffer.clone())
    }

    fn lookup(&self, id: &str) -> Result<&Item> {
        self.item(id)
            .ok_or_else(|| Error::UnknownItem(id.to_string()))
    }

    /// Raw integer of a numeric item: hook first, then the codec
    fn raw_int(&self, item: &Item, field: &Field) -> Result<i64> {
        match self.hooks.get_int(item, &self.context())? {
            Some(value) => Ok(value),
            None => codec::read_int(&self.buffer, item.offset, field),
        }
    }

    /// Displayed value of an item
    pub fn value(&self, id: &str) -> Result<Value> {
        let item = self.lookup(id)?;
        self.read(item).map_err(|e| e.in_item(id))
    }

    fn read(&self, item: &Item) -> Result<Value> {
        match &item.kind {
            ItemKind::Variable(number) | ItemKind::GroupPart { number, .. } => {
                let raw = if number.field.data_type == DataType::Float32 {
                    codec::read_number(&self.buffer, item.offset, &number.field)?
                } else {
                    self.raw_int(item, &number.field)? as f64
                };
                Ok(Value::number(operation::apply(&number.operations, raw)))
            }
            ItemKind::Flag { bit, reversed, .. } => {
                let field = Field::new(DataType::Bit).with_bit(*bit);
                let set = self.raw_int(item, &field)? != 0;
                Ok(Value::Bool(set != *reversed))
            }
            ItemKind::Checksum { field, .. } => {
                Ok(Value::Int(codec::read_int(&self.buffer, item.offset, field)?))
            }
            ItemKind::String {
                text: layout,
                letters,
                ..
            } => {
                if let Some(value) = self.hooks.get_string(item, &self.context())? {
                    return Ok(Value::Text(value));
                }
                let letters = self.resources.get(letters, self.region.as_deref())?;
                Ok(Value::Text(text::decode(&self.buffer, item.offset, layout, letters)?))
            }
        }
    }

    /// Label of a numeric item's current value in its resource
    pub fn label(&self, id: &str) -> Result<Option<String>> {
        let item = self.lookup(id)?;
        let Some(Number {
            resource: Some(resource),
            ..
        }) = item.number()
        else {
            return Ok(None);
        };
        let Value::Int(code) = self.read(item).map_err(|e| e.in_item(id))? else {
            return Ok(None);
        };
        Ok(self
            .resources
            .resolve(resource, code, self.region.as_deref())?
            .map(str::to_string))
    }

    /// Write a displayed value.
    ///
    /// Every constraint is checked and every target offset bounds checked
    /// before the first byte is written; a rejected value leaves the buffer
    /// untouched. On success, declared mirrors are written, `after_set_*`
    /// hooks run, covering checksums are regenerated and the item list is
    /// refreshed.
    pub fn set_value(&mut self, id: &str, value: Value) -> std::result::Result<(), EditError> {
        let item = self.lookup(id)?.clone();
        if item.disabled {
            return Err(EditError::Disabled { item: item.id });
        }
        if self.depth >= self.options.max_hook_depth {
            tracing::warn!(item = %id, depth = self.depth, "hook recursion ceiling reached");
            return Err(Error::RecursionLimit(self.options.max_hook_depth).into());
        }

        // Hook writes nested under this call roll back with it
        let snapshot = (self.depth == 0).then(|| self.buffer.clone());

        self.depth += 1;
        let result = self.write(&item, value);
        self.depth -= 1;

        let Some(snapshot) = snapshot else {
            return result;
        };
        match result.and_then(|()| self.finish_writes().map_err(EditError::from)) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.buffer = snapshot;
                self.written.clear();
                Err(e)
            }
        }
    }

    fn write(&mut self, item: &Item, value: Value) -> std::result::Result<(), EditError> {
        match &item.kind {
            ItemKind::Variable(number) | ItemKind::GroupPart { number, .. } => {
                self.write_number(item, number, &value)
            }
            ItemKind::Flag {
                bit,
                reversed,
                mirrors,
                ..
            } => {
                let set = match value {
                    Value::Bool(b) => b,
                    Value::Int(0) => false,
                    Value::Int(1) => true,
                    other => {
                        return Err(EditError::invalid(&item.id, format!("{other} is not a flag value")));
                    }
                };
                let field = Field::new(DataType::Bit).with_bit(*bit);
                self.write_int_checked(item, &field, mirrors, i64::from(set != *reversed))
            }
            ItemKind::Checksum { .. } => Err(EditError::invalid(
                &item.id,
                "checksums are regenerated from their range, not set",
            )),
            ItemKind::String {
                text: layout,
                letters,
                regex,
            } => {
                let Value::Text(value) = value else {
                    return Err(EditError::invalid(&item.id, "expected text"));
                };
                if let Some(pattern) = regex {
                    if !self.pattern(&item.id, pattern)?.is_match(&value) {
                        return Err(EditError::Pattern {
                            value,
                            pattern: pattern.clone(),
                        });
                    }
                }
                let table = self.resources.get(letters, self.region.as_deref())?;
                let codes = text::tokenize(&value, table, layout.fallback);
                if codes.len() > layout.length {
                    return Err(EditError::invalid(
                        &item.id,
                        format!("needs {} characters, {} fit", codes.len(), layout.length),
                    ));
                }
                layout.checked_span(self.buffer.len(), item.offset)?;

                let hooks = Rc::clone(&self.hooks);
                if !hooks.set_string(item, &value, self)? {
                    let table = self.resources.get(letters, self.region.as_deref())?.clone();
                    text::encode(&mut self.buffer, item.offset, layout, &table, &value)?;
                    self.written.push(item.span());
                }
                hooks.after_set_string(item, self)?;
                Ok(())
            }
        }
    }

    fn pattern(&mut self, item: &str, pattern: &str) -> Result<&Regex> {
        if !self.patterns.contains_key(pattern) {
            let re = Regex::new(pattern).map_err(|e| Error::malformed(item, e.to_string()))?;
            self.patterns.insert(pattern.to_string(), re);
        }
        Ok(&self.patterns[pattern])
    }

    fn write_number(&mut self, item: &Item, number: &Number, value: &Value) -> std::result::Result<(), EditError> {
        let display = match value {
            Value::Text(label) => match &number.resource {
                Some(resource) => self
                    .resources
                    .reverse_resolve(resource, label, self.region.as_deref())?
                    .map(|code| code as f64)
                    .ok_or_else(|| EditError::UnknownLabel {
                        label: label.clone(),
                        resource: resource.clone(),
                    })?,
                None => label
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| EditError::invalid(&item.id, format!("'{label}' is not a number")))?,
            },
            other => other
                .as_f64()
                .ok_or_else(|| EditError::invalid(&item.id, "expected a number"))?,
        };
        if !display.is_finite() {
            return Err(EditError::invalid(&item.id, "value must be finite"));
        }

        let min = number.min.unwrap_or(f64::NEG_INFINITY);
        let max = number.max.unwrap_or(f64::INFINITY);
        if display < min || display > max {
            return Err(EditError::OutOfRange {
                value: display,
                min,
                max,
            });
        }
        if let Some(step) = number.step {
            let steps = (display - number.min.unwrap_or(0.0)) / step;
            if (steps - steps.round()).abs() > STEP_EPSILON {
                return Err(EditError::Step {
                    value: display,
                    step,
                });
            }
        }

        let raw = operation::invert(&number.operations, display);
        if number.field.data_type == DataType::Float32 {
            self.check_targets(item, &number.field, &number.mirrors)?;
            for offset in std::iter::once(item.offset).chain(number.mirrors.iter().copied()) {
                codec::write_float(&mut self.buffer, offset, number.field.big_endian, raw as f32)?;
                self.written.push(offset..offset + 4);
            }
            let hooks = Rc::clone(&self.hooks);
            hooks.after_set_int(item, self)?;
            return Ok(());
        }

        let raw = raw.round();
        let (lo, hi) = number.field.limits();
        if !number.field.bcd && (raw < lo as f64 || raw > hi as f64) {
            return Err(EditError::OutOfRange {
                value: display,
                min: operation::apply(&number.operations, lo as f64),
                max: operation::apply(&number.operations, hi as f64),
            });
        }
        self.write_int_checked(item, &number.field, &number.mirrors, raw as i64)
    }

    fn check_targets(&self, item: &Item, field: &Field, mirrors: &[usize]) -> Result<()> {
        for offset in std::iter::once(item.offset).chain(mirrors.iter().copied()) {
            codec::span(self.buffer.len(), offset, field.width()).map_err(|e| e.in_item(&item.id))?;
        }
        Ok(())
    }

    /// Bounds check every target, then hand the write to the hooks or the
    /// codec, copy it to the mirrors and run `after_set_int`.
    fn write_int_checked(
        &mut self,
        item: &Item,
        field: &Field,
        mirrors: &[usize],
        raw: i64,
    ) -> std::result::Result<(), EditError> {
        self.check_targets(item, field, mirrors)?;

        let hooks = Rc::clone(&self.hooks);
        if !hooks.set_int(item, raw, self)? {
            for offset in std::iter::once(item.offset).chain(mirrors.iter().copied()) {
                codec::write_int(&mut self.buffer, offset, field, raw)?;
                self.written.push(offset..offset + field.width());
            }
        }
        hooks.after_set_int(item, self)?;
        Ok(())
    }

    /// Raw codec read at an absolute offset, for hooks
    pub fn read_int(&self, offset: usize, field: &Field) -> Result<i64> {
        codec::read_int(&self.buffer, offset, field)
    }

    /// Raw codec write at an absolute offset, for hooks. Bypasses item
    /// constraints; covering checksums are still regenerated.
    pub fn write_int(&mut self, offset: usize, field: &Field, value: i64) -> Result<()> {
        codec::write_int(&mut self.buffer, offset, field, value)?;
        self.written.push(offset..offset + field.width());
        if self.depth == 0 {
            self.finish_writes()?;
        }
        Ok(())
    }

    /// Regenerate covering checksums for everything written so far and
    /// refresh the item list.
    fn finish_writes(&mut self) -> Result<()> {
        if self.written.is_empty() {
            return Ok(());
        }
        let mut pending = std::mem::take(&mut self.written);
        if self.options.auto_checksum {
            self.settle_checksums(&mut pending, false)?;
        }
        self.reflatten()
    }

    /// Rewrite checksums until none that is dirty (every one with `all`,
    /// otherwise those overlapping `written`) differs from its computed
    /// value. A rewritten checksum is a written span itself, so a checksum
    /// covering another one is recomputed after it whatever their order.
    /// Returns how many checksums produced a value.
    fn settle_checksums(&mut self, written: &mut Vec<Range<usize>>, all: bool) -> Result<usize> {
        let mut settled = vec![false; self.items.len()];
        for _ in 0..=self.items.len() {
            let mut changed = false;
            for i in 0..self.items.len() {
                let item = &self.items[i];
                let ItemKind::Checksum { field, control, .. } = &item.kind else {
                    continue;
                };
                if item.disabled || !(all || written.iter().any(|w| overlaps(w, control))) {
                    continue;
                }
                let Some(value) = walker::generate_checksum(self.hooks.as_ref(), item, &self.buffer)
                    .map_err(|e| e.in_item(&item.id))?
                else {
                    continue;
                };
                settled[i] = true;
                let (field, offset, span) = (*field, item.offset, item.span());
                if codec::read_int(&self.buffer, offset, &field)? == i64::from(value) {
                    continue;
                }
                codec::write_int(&mut self.buffer, offset, &field, i64::from(value))?;
                tracing::trace!(item = %self.items[i].id, value, "checksum regenerated");
                written.push(span);
                changed = true;
            }
            if !changed {
                return Ok(settled.iter().filter(|s| **s).count());
            }
        }
        tracing::warn!(template = %self.template.id, "checksums cover each other and never settle");
        Ok(settled.iter().filter(|s| **s).count())
    }

    /// Recompute and write every checksum that has an algorithm or a hook.
    /// Returns how many there are.
    pub fn refresh_checksums(&mut self) -> Result<usize> {
        let count = self.settle_checksums(&mut Vec::new(), true)?;
        self.reflatten()?;
        Ok(count)
    }

    /// Make `index` the active slot and let the hooks refresh dynamic state
    pub fn select_slot(&mut self, index: usize) -> Result<()> {
        self.slot = Some(index);
        let hooks = Rc::clone(&self.hooks);
        hooks.on_slot_change(self, index)?;
        self.finish_writes()?;
        self.reflatten()
    }
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}
