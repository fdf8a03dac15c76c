//! Key activity listeners: the host forwards keycode and position press
//! events here so temp layers can gate activation and tear down on foreign
//! key activity.

use crate::keymap::{binding_matches, BehaviorBinding, BehaviorHost, KeymapHost};
use crate::processor::{Processor, ProcessorConfig};
use crate::registry::ProcessorRegistry;
use crate::types::{usage_id, usage_page, HID_USAGE_PAGE_KEYBOARD};

const TRANSPARENT_NAME: &str = "trans";
const KEY_PRESS_NAME: &str = "kp";

/// A key press was reported anywhere on the board; stamps the keypress
/// timestamp every instance uses to gate temp-layer activation.
pub fn on_keycode_pressed(registry: &mut ProcessorRegistry, now_ms: u64) {
    for processor in registry.iter_mut() {
        processor.note_keypress(now_ms);
    }
}

/// A physical position was pressed; tears down any active temp layer whose
/// resolved binding is not benign for that position.
pub fn on_position_pressed(
    registry: &mut ProcessorRegistry,
    position: u32,
    keymap: &mut dyn KeymapHost,
    behaviors: &mut dyn BehaviorHost,
) {
    for processor in registry.iter_mut() {
        maybe_teardown(processor, position, keymap, behaviors);
    }
}

fn maybe_teardown(
    processor: &mut Processor,
    position: u32,
    keymap: &mut dyn KeymapHost,
    behaviors: &mut dyn BehaviorHost,
) {
    let settings = processor.temp_layer_settings();
    {
        let controller = processor.temp_layer();
        if !settings.enabled || !controller.layer_active() || controller.keep_active() {
            return;
        }
    }

    if keeps_layer(processor.config(), settings.layer, position, keymap, behaviors) {
        return;
    }

    log::debug!(
        "deactivating temp-layer layer {} due to key press at position {position}",
        settings.layer
    );
    processor.temp_layer().teardown(keymap);
}

/// The tear-down policy: a press keeps the layer when the temp layer itself
/// defines the key, or when the press resolves to a keep keycode (or a
/// modifier when no keep list is configured).
fn keeps_layer(
    config: &ProcessorConfig,
    temp_layer: u8,
    position: u32,
    keymap: &dyn KeymapHost,
    behaviors: &dyn BehaviorHost,
) -> bool {
    // A non-transparent binding on the temp layer belongs to the layer's own
    // function set; pressing it must not drop the layer.
    if let Some(binding) = keymap.binding_at(temp_layer, position) {
        if !is_transparent(&binding, config, behaviors) {
            log::debug!("temp-layer has non-transparent binding at position {position}");
            return true;
        }
    }

    let Some(resolved) = resolve_binding(config, position, keymap, behaviors) else {
        return false;
    };

    if !binding_matches(&resolved, config.kp_behavior, KEY_PRESS_NAME, behaviors) {
        return false;
    }

    let encoded = resolved.param1;
    let mut page = usage_page(encoded);
    let id = usage_id(encoded);
    if page == 0 {
        page = HID_USAGE_PAGE_KEYBOARD;
    }

    let keep = if config.temp_layer_keep_keycodes.is_empty() {
        keymap.is_modifier(page, id)
    } else {
        config.temp_layer_keep_keycodes.contains(&id)
    };
    if keep {
        log::debug!("resolved binding is a keep keycode, layer stays up");
    }
    keep
}

/// Resolves the effective binding for a position by scanning active layers
/// from the highest index down, skipping transparent slots.
fn resolve_binding(
    config: &ProcessorConfig,
    position: u32,
    keymap: &dyn KeymapHost,
    behaviors: &dyn BehaviorHost,
) -> Option<BehaviorBinding> {
    for index in (0..keymap.layers_len()).rev() {
        let Some(layer) = keymap.layer_index_to_id(index) else {
            continue;
        };
        if !keymap.layer_active(layer) {
            continue;
        }
        let Some(binding) = keymap.binding_at(layer, position) else {
            continue;
        };
        if !is_transparent(&binding, config, behaviors) {
            return Some(binding);
        }
    }
    None
}

fn is_transparent(
    binding: &BehaviorBinding,
    config: &ProcessorConfig,
    behaviors: &dyn BehaviorHost,
) -> bool {
    binding_matches(binding, config.transparent_behavior, TRANSPARENT_NAME, behaviors)
}
