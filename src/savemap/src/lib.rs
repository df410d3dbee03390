//! # savemap
//!
//! Template-driven interpreter for binary game save files and ROM images.
//!
//! A template is a declarative tree describing where every field of a save
//! lives: offsets, data types, bit ranges, checksums, fixed-charset strings and
//! the resource tables used to label raw codes. This library walks that tree
//! against a raw byte buffer and exposes a flat list of addressable items that
//! can be read and written back.
//!
//! This library provides functionality to:
//! - Decode and encode typed fields (integers of any width/endianness,
//!   bit ranges, BCD, float32, custom-charset strings)
//! - Verify and regenerate checksums over byte ranges
//! - Detect which release (region) of a game a buffer belongs to
//! - Plug per-game logic into the interpreter through [`Hooks`]
//!
//! ## Example
//!
//! ```no_run
//! use std::fs;
//! use std::rc::Rc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let template = Rc::new(savemap::Template::from_path("templates/demo.json")?);
//! let bytes = fs::read("demo.sav")?;
//!
//! let registry = savemap::HookRegistry::new();
//! let mut session = savemap::Session::load(bytes, template, &registry)?;
//!
//! for item in session.items() {
//!     println!("{}: {:?}", item.id, session.value(&item.id)?);
//! }
//!
//! session.set_value("party[0].level", savemap::Value::Int(99))?;
//! fs::write("demo.sav", session.save())?;
//! # Ok(())
//! # }
//! ```

pub mod backup;
pub mod checksum;
pub mod codec;
mod error;
pub mod hooks;
pub mod item;
pub mod region;
pub mod resource;
pub mod session;
pub mod template;
pub mod walker;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export commonly used items
#[doc(inline)]
pub use backup::{smart_backup, update_after_edit, BackupError};
#[doc(inline)]
pub use checksum::{Algorithm, ChecksumStatus};
#[doc(inline)]
pub use codec::{BitRange, DataType, Field};
#[doc(inline)]
pub use error::{EditError, Error, Result};
#[doc(inline)]
pub use hooks::{HookRegistry, Hooks, InstanceShift, ParseContext};
#[doc(inline)]
pub use item::{Item, ItemKind, Value};
#[doc(inline)]
pub use region::{detect_region, detect_regions};
#[doc(inline)]
pub use resource::{Resource, ResourceRegistry};
#[doc(inline)]
pub use session::{Session, SessionOptions};
#[doc(inline)]
pub use template::{Node, Template};
#[doc(inline)]
pub use walker::flatten;
