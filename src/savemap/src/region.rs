//! Region detection.
//!
//! A region is the release variant (territory, language, revision) a buffer
//! belongs to. Detection runs before any offset-dependent parsing and only
//! looks at raw bytes: the hook set first, then the template's validators.

use crate::hooks::Hooks;
use crate::template::Template;

/// Every region the buffer matches, in declaration order.
///
/// Returns `None` when neither the hooks nor the template know about regions
/// at all, in which case any buffer is accepted.
pub fn detect_regions(
    template: &Template,
    hooks: &dyn Hooks,
    buffer: &[u8],
    shift: usize,
) -> Option<Vec<String>> {
    if let Some(regions) = hooks.get_regions(buffer, shift) {
        tracing::debug!(template = %template.id, ?regions, "regions from hooks");
        return Some(regions);
    }
    if template.validator.is_empty() {
        return None;
    }

    let regions: Vec<String> = template
        .validator
        .iter()
        .filter(|(_, validator)| validator.matches(buffer, shift))
        .map(|(region, _)| region.clone())
        .collect();
    tracing::debug!(template = %template.id, ?regions, "regions from validators");
    Some(regions)
}

/// First matching region, if any
pub fn detect_region(
    template: &Template,
    hooks: &dyn Hooks,
    buffer: &[u8],
    shift: usize,
) -> Option<String> {
    detect_regions(template, hooks, buffer, shift)?.into_iter().next()
}
