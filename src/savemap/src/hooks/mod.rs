//! Override hooks: per-game logic plugged into the generic interpreter.
//!
//! A template names its hook set by id; the [`HookRegistry`] turns that id
//! into a [`Hooks`] object. Every method has a no-op default, so a hook set
//! only implements the extension points its game needs.

mod builtin;

pub use builtin::{ByteSwap16, NoHooks};

use phf::phf_map;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::item::Item;
use crate::resource::ResourceRegistry;
use crate::session::Session;
use crate::template::node::Container;
use crate::template::Template;
use crate::{Error, Result};

/// Read-only view of a session handed to parse-time and read hooks
#[derive(Clone, Copy)]
pub struct ParseContext<'a> {
    pub template: &'a Template,
    pub buffer: &'a [u8],
    pub region: Option<&'a str>,
    pub resources: &'a ResourceRegistry,
    pub header_shift: usize,
    /// Slot selected through [`Session::select_slot`]
    pub slot: Option<usize>,
}

impl ParseContext<'_> {
    /// Shift applied to every item before container shifts
    pub fn base_shift(&self) -> usize {
        self.header_shift + self.template.region_shift(self.region)
    }
}

/// Decision of [`Hooks::parse_container_shift`] for one instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceShift {
    /// Use `base + index * length`
    Keep,
    /// Use this shift instead
    Replace(usize),
    /// The instance does not exist and produces no items
    Skip,
}

/// Extension points of the interpreter.
///
/// Read hooks receive a [`ParseContext`]; write and lifecycle hooks receive
/// the [`Session`] itself and may perform further reads, writes and
/// [`Session::set_value`] calls. Cascades deeper than
/// [`crate::SessionOptions::max_hook_depth`] fail with
/// [`Error::RecursionLimit`].
#[allow(unused_variables)]
pub trait Hooks {
    /// Regions the buffer belongs to, or `None` to use the template's
    /// declarative validators
    fn get_regions(&self, buffer: &[u8], shift: usize) -> Option<Vec<String>> {
        None
    }

    /// Size of a platform header in front of the save data, or `None` to use
    /// the template's header rules
    fn init_header_shift(&self, buffer: &[u8]) -> Option<usize> {
        None
    }

    /// Transform the whole buffer before parsing. Must be undone exactly by
    /// [`Hooks::before_saving`].
    fn before_init_data_view(&self, buffer: Vec<u8>) -> Vec<u8> {
        buffer
    }

    /// Adjust an item before it is finalized: resource, flags, bounds, name
    /// or offset.
    fn parse_item(&self, item: &mut Item, ctx: &ParseContext) -> Result<()> {
        Ok(())
    }

    fn parse_container_shift(
        &self,
        ctx: &ParseContext,
        container: &Container,
        index: usize,
        shift: usize,
    ) -> InstanceShift {
        InstanceShift::Keep
    }

    /// Replace the codec read of a numeric item
    fn get_int(&self, item: &Item, ctx: &ParseContext) -> Result<Option<i64>> {
        Ok(None)
    }

    /// Replace the codec write of a numeric item. Return `true` when handled.
    fn set_int(&self, item: &Item, value: i64, session: &mut Session) -> Result<bool> {
        Ok(false)
    }

    fn get_string(&self, item: &Item, ctx: &ParseContext) -> Result<Option<String>> {
        Ok(None)
    }

    fn set_string(&self, item: &Item, value: &str, session: &mut Session) -> Result<bool> {
        Ok(false)
    }

    /// Side effects after a numeric item was written
    fn after_set_int(&self, item: &Item, session: &mut Session) -> Result<()> {
        Ok(())
    }

    fn after_set_string(&self, item: &Item, session: &mut Session) -> Result<()> {
        Ok(())
    }

    /// Checksum of a checksum item, when the template declares no algorithm
    /// or the game needs its own
    fn generate_checksum(&self, item: &Item, buffer: &[u8]) -> Option<u32> {
        None
    }

    fn before_saving(&self, buffer: Vec<u8>) -> Vec<u8> {
        buffer
    }

    /// Fired once after the initial load
    fn on_ready(&self, session: &mut Session) -> Result<()> {
        Ok(())
    }

    fn on_slot_change(&self, session: &mut Session, index: usize) -> Result<()> {
        Ok(())
    }
}

/// Constructor of a hook set
pub type HookFactory = fn() -> Rc<dyn Hooks>;

fn no_hooks() -> Rc<dyn Hooks> {
    Rc::new(NoHooks)
}

fn byteswap16() -> Rc<dyn Hooks> {
    Rc::new(ByteSwap16)
}

/// Hook sets shipped with the library
static BUILTIN: phf::Map<&'static str, HookFactory> = phf_map! {
    "none" => no_hooks as HookFactory,
    "byteswap16" => byteswap16 as HookFactory,
};

/// Hook sets by id: built-ins plus anything registered at runtime.
/// Registered sets shadow built-ins of the same id.
#[derive(Default)]
pub struct HookRegistry {
    custom: HashMap<String, Box<dyn Fn() -> Rc<dyn Hooks>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn() -> Rc<dyn Hooks> + 'static,
    {
        self.custom.insert(id.into(), Box::new(factory));
    }

    pub fn contains(&self, id: &str) -> bool {
        self.custom.contains_key(id) || BUILTIN.contains_key(id)
    }

    /// Every known id, sorted
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = BUILTIN
            .keys()
            .copied()
            .chain(self.custom.keys().map(String::as_str))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Instantiate the hook set a template names. No id means no hooks.
    pub fn resolve(&self, id: Option<&str>) -> Result<Rc<dyn Hooks>> {
        let Some(id) = id else {
            return Ok(no_hooks());
        };
        if let Some(factory) = self.custom.get(id) {
            return Ok(factory());
        }
        BUILTIN
            .get(id)
            .map(|factory| factory())
            .ok_or_else(|| Error::UnknownHooks(id.to_string()))
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Marker;

    impl Hooks for Marker {
        fn init_header_shift(&self, _buffer: &[u8]) -> Option<usize> {
            Some(0x200)
        }
    }

    #[test]
    fn test_resolve_builtin_and_default() {
        let registry = HookRegistry::new();
        assert!(registry.resolve(None).is_ok());
        assert!(registry.resolve(Some("byteswap16")).is_ok());
        assert!(matches!(
            registry.resolve(Some("ff8")),
            Err(Error::UnknownHooks(id)) if id == "ff8"
        ));
    }

    #[test]
    fn test_register_shadows_builtin() {
        let mut registry = HookRegistry::new();
        registry.register("none", || Rc::new(Marker));
        registry.register("ff8", || Rc::new(Marker));
        assert!(registry.contains("ff8"));
        assert_eq!(registry.ids(), vec!["byteswap16", "ff8", "none"]);

        let hooks = registry.resolve(Some("none")).unwrap();
        assert_eq!(hooks.init_header_shift(&[]), Some(0x200));
    }

    #[test]
    fn test_defaults_are_identity() {
        let hooks = NoHooks;
        let data = vec![1, 2, 3];
        assert_eq!(hooks.before_init_data_view(data.clone()), data);
        assert_eq!(hooks.before_saving(data.clone()), data);
        assert_eq!(hooks.get_regions(&data, 0), None);
        assert_eq!(hooks.init_header_shift(&data), None);
    }
}
