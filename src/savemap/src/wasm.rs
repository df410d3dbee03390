//! WebAssembly bindings for savemap
//!
//! Front-ends load a template document and a buffer into an [`Editor`], list
//! its items as JSON, and read or write values by item id.

use std::rc::Rc;

use crate::item::Value;
use crate::session::Session;
use crate::template::Template;
use crate::HookRegistry;
use wasm_bindgen::prelude::*;

fn js_error(context: &str, e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&format!("{context}: {e}"))
}

/// JavaScript-friendly editing session
#[wasm_bindgen]
pub struct Editor {
    inner: Session,
}

#[wasm_bindgen]
impl Editor {
    /// Parse `template` (JSON or YAML) and load `bytes` against it
    #[wasm_bindgen(js_name = loadBuffer)]
    pub fn load_buffer(template: &str, bytes: &[u8]) -> Result<Editor, JsValue> {
        let template = if template.trim_start().starts_with('{') {
            Template::from_json(template)
        } else {
            Template::from_yaml(template)
        }
        .map_err(|e| js_error("Template failed", e))?;
        let inner = Session::load(bytes.to_vec(), Rc::new(template), &HookRegistry::new())
            .map_err(|e| js_error("Load failed", e))?;
        Ok(Editor { inner })
    }

    /// Flattened items as a JSON array
    #[wasm_bindgen(js_name = getItems)]
    pub fn get_items(&self) -> Result<String, JsValue> {
        serde_json::to_string(self.inner.items()).map_err(|e| js_error("Serialize failed", e))
    }

    /// Displayed value of an item as JSON (`42`, `true`, `"Potion"`)
    #[wasm_bindgen(js_name = getValue)]
    pub fn get_value(&self, id: &str) -> Result<String, JsValue> {
        let value = self
            .inner
            .value(id)
            .map_err(|e| js_error("Read failed", e))?;
        serde_json::to_string(&value).map_err(|e| js_error("Serialize failed", e))
    }

    #[wasm_bindgen(js_name = getLabel)]
    pub fn get_label(&self, id: &str) -> Result<Option<String>, JsValue> {
        self.inner
            .label(id)
            .map_err(|e| js_error("Read failed", e))
    }

    /// Set a value from user input (auto-parsed)
    #[wasm_bindgen(js_name = setValue)]
    pub fn set_value(&mut self, id: &str, value: &str) -> Result<(), JsValue> {
        self.inner
            .set_value(id, Value::parse(value))
            .map_err(|e| js_error("Set failed", e))
    }

    #[wasm_bindgen(js_name = selectSlot)]
    pub fn select_slot(&mut self, index: usize) -> Result<(), JsValue> {
        self.inner
            .select_slot(index)
            .map_err(|e| js_error("Slot change failed", e))
    }

    /// Matched regions, active one first
    #[wasm_bindgen(js_name = getRegions)]
    pub fn get_regions(&self) -> js_sys::Array {
        self.inner
            .regions()
            .iter()
            .map(|r| JsValue::from_str(r))
            .collect()
    }

    /// Buffer ready to be written to disk
    #[wasm_bindgen(js_name = saveBuffer)]
    pub fn save_buffer(&self) -> Vec<u8> {
        self.inner.save()
    }
}
