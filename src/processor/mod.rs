//! Processor instance: per-device pipeline state, stage sequencing and the
//! runtime control surface.

mod keybind;
mod rotation;
mod scale;
mod snap;
pub(crate) mod temp_layer;

use crate::config::{MAX_KEYBIND_BEHAVIORS, SETTINGS_SAVE_DEBOUNCE_MS};
use crate::error::Error;
use crate::events;
use crate::keymap::{BehaviorHost, KeymapHost};
use crate::settings::{settings_key, SettingsStore, TunableSettings};
use crate::types::{AxisSnapMode, EventVerdict, InputEvent, REL_HWHEEL, REL_WHEEL, REL_X, REL_Y};

use keybind::KeybindState;
use rotation::RotationState;
use snap::SnapState;
use temp_layer::{TempLayerController, TempLayerSettings};

/// Immutable per-instance configuration, fixed at initialization.
#[derive(Clone, Copy, Debug)]
pub struct ProcessorConfig {
    /// Stable identifier for lookup and the persistence key.
    pub name: &'static str,
    /// Event kind this instance processes; anything else passes through.
    pub event_type: u8,
    /// Codes classified as the X axis, in match order.
    pub x_codes: &'static [u16],
    /// Codes classified as the Y axis, in match order.
    pub y_codes: &'static [u16],
    /// Direction binding names for keybind mode, up to eight.
    pub keybind_behaviors: &'static [&'static str],
    /// Identity of the transparent behavior; name-match fallback when unset.
    pub transparent_behavior: Option<&'static str>,
    /// Identity of the key-press behavior; name-match fallback when unset.
    pub kp_behavior: Option<&'static str>,
    /// Usage ids that never tear the temp layer down. Empty list falls back
    /// to the host's modifier check.
    pub temp_layer_keep_keycodes: &'static [u16],
    /// Initial tunables; overwritten by a persisted record on load.
    pub defaults: TunableSettings,
}

/// A configured processor instance. Owns all mutable pipeline state; the
/// config is shared by reference.
pub struct Processor {
    config: &'static ProcessorConfig,
    current: TunableSettings,
    persistent: TunableSettings,
    rotation: RotationState,
    snap: SnapState,
    keybind: KeybindState,
    temp_layer: TempLayerController,
    save_due: Option<u64>,
}

impl Processor {
    pub fn new(config: &'static ProcessorConfig) -> Self {
        log::info!("input processor '{}' initialized", config.name);
        Self {
            config,
            current: config.defaults,
            persistent: config.defaults,
            rotation: RotationState::new(config.defaults.rotation_degrees),
            snap: SnapState::default(),
            keybind: KeybindState::default(),
            temp_layer: TempLayerController::new(),
            save_due: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.config.name
    }

    pub fn config(&self) -> &'static ProcessorConfig {
        self.config
    }

    /// The tunables driving the pipeline right now.
    pub fn current_settings(&self) -> TunableSettings {
        self.current
    }

    /// The tunables that survive a restart; this is the public config view.
    pub fn persistent_settings(&self) -> TunableSettings {
        self.persistent
    }

    pub fn temp_layer_active(&self) -> bool {
        self.temp_layer.layer_active()
    }

    pub(crate) fn temp_layer(&mut self) -> &mut TempLayerController {
        &mut self.temp_layer
    }

    pub(crate) fn temp_layer_settings(&self) -> TempLayerSettings {
        TempLayerSettings {
            enabled: self.current.temp_layer_enabled,
            layer: self.current.temp_layer_layer,
            activation_delay_ms: self.current.temp_layer_activation_delay_ms,
            deactivation_delay_ms: self.current.temp_layer_deactivation_delay_ms,
        }
    }

    /// Stamps foreign key activity; gates temp-layer activation.
    pub fn note_keypress(&mut self, now_ms: u64) {
        self.temp_layer.note_keypress(now_ms);
    }

    /// Runs one event through the pipeline, transforming it in place.
    pub fn handle_event(
        &mut self,
        event: &mut InputEvent,
        now_ms: u64,
        remainder: Option<&mut i32>,
        keymap: &mut dyn KeymapHost,
        behaviors: &mut dyn BehaviorHost,
    ) -> EventVerdict {
        if event.event_type != self.config.event_type {
            return EventVerdict::Forward;
        }

        let is_x = self.config.x_codes.contains(&event.code);
        let is_y = !is_x && self.config.y_codes.contains(&event.code);
        if !is_x && !is_y {
            return EventVerdict::Forward;
        }

        if !layer_gate_open(self.current.active_layers, keymap) {
            return EventVerdict::Forward;
        }

        if self.keybind.process(
            self.config.keybind_behaviors,
            self.current.keybind_enabled,
            self.current.keybind_count,
            self.current.keybind_degree_offset,
            self.current.keybind_tick,
            is_x,
            event.value,
            now_ms,
            &*keymap,
            behaviors,
        ) {
            return EventVerdict::Consumed;
        }

        // Code remap; scroll wins over swap.
        if self.current.xy_to_scroll {
            event.code = if is_x { REL_HWHEEL } else { REL_WHEEL };
        } else if self.current.xy_swap {
            event.code = if is_x {
                self.config.y_codes.first().copied().unwrap_or(REL_Y)
            } else {
                self.config.x_codes.first().copied().unwrap_or(REL_X)
            };
        }

        if self.current.temp_layer_enabled && event.value != 0 {
            let settings = self.temp_layer_settings();
            self.temp_layer.on_motion(now_ms, settings, keymap);
        }

        if self.current.rotation_degrees != 0 {
            event.value = self.rotation.apply(is_x, event.value);
        }

        if (is_x && self.current.x_invert) || (is_y && self.current.y_invert) {
            event.value = event.value.saturating_neg();
        }

        self.snap.apply(
            self.current.axis_snap_mode,
            self.current.axis_snap_threshold,
            self.current.axis_snap_timeout_ms,
            is_x,
            &mut event.value,
            now_ms,
        );

        if self.current.scale_multiplier > 0 && self.current.scale_divisor > 0 {
            event.value = scale::scale_value(
                event.value,
                self.current.scale_multiplier,
                self.current.scale_divisor,
                remainder,
            );
        }

        if self.current.temp_layer_enabled
            && self.temp_layer.layer_active()
            && !self.temp_layer.keep_active()
        {
            let settings = self.temp_layer_settings();
            self.temp_layer.on_settled(now_ms, settings, keymap);
        }

        EventVerdict::Forward
    }

    /// Executes any deferred work whose deadline has passed: temp-layer
    /// activation/deactivation and the debounced settings save.
    pub fn service(
        &mut self,
        now_ms: u64,
        keymap: &mut dyn KeymapHost,
        store: &mut dyn SettingsStore,
    ) {
        let settings = self.temp_layer_settings();
        self.temp_layer.run_due(now_ms, settings, keymap);

        if self.save_due.is_some_and(|due| now_ms >= due) {
            self.save_due = None;
            self.write_settings(store);
        }
    }

    /// Earliest pending deadline across deferred work, for host sleep
    /// scheduling.
    pub fn next_wake_ms(&self) -> Option<u64> {
        match (self.temp_layer.next_deadline_ms(), self.save_due) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }

    // --- control surface -------------------------------------------------

    pub fn set_scaling(
        &mut self,
        multiplier: u32,
        divisor: u32,
        persistent: bool,
        now_ms: u64,
    ) -> Result<(), Error> {
        if multiplier == 0 || divisor == 0 {
            return Err(Error::InvalidArgument);
        }
        log::info!(
            "set scaling to {multiplier}/{divisor}{}",
            persistence_tag(persistent)
        );
        self.apply(persistent, now_ms, |s| {
            s.scale_multiplier = multiplier;
            s.scale_divisor = divisor;
        })
    }

    pub fn set_rotation(
        &mut self,
        degrees: i32,
        persistent: bool,
        now_ms: u64,
    ) -> Result<(), Error> {
        log::info!("set rotation to {degrees} degrees{}", persistence_tag(persistent));
        self.apply(persistent, now_ms, |s| s.rotation_degrees = degrees)?;
        self.rotation.set_angle(self.current.rotation_degrees);
        Ok(())
    }

    pub fn set_temp_layer(
        &mut self,
        enabled: bool,
        layer: u8,
        activation_delay_ms: u16,
        deactivation_delay_ms: u16,
        persistent: bool,
        now_ms: u64,
    ) -> Result<(), Error> {
        log::info!(
            "temp-layer config: enabled={enabled}, layer={layer}, act_delay={activation_delay_ms}, deact_delay={deactivation_delay_ms}{}",
            persistence_tag(persistent)
        );
        self.apply(persistent, now_ms, |s| {
            s.temp_layer_enabled = enabled;
            s.temp_layer_layer = layer;
            s.temp_layer_activation_delay_ms = activation_delay_ms;
            s.temp_layer_deactivation_delay_ms = deactivation_delay_ms;
        })
    }

    pub fn set_temp_layer_enabled(
        &mut self,
        enabled: bool,
        persistent: bool,
        now_ms: u64,
    ) -> Result<(), Error> {
        log::info!("temp-layer enabled: {enabled}{}", persistence_tag(persistent));
        self.apply(persistent, now_ms, |s| s.temp_layer_enabled = enabled)
    }

    pub fn set_temp_layer_layer(
        &mut self,
        layer: u8,
        persistent: bool,
        now_ms: u64,
    ) -> Result<(), Error> {
        log::info!("temp-layer layer: {layer}{}", persistence_tag(persistent));
        self.apply(persistent, now_ms, |s| s.temp_layer_layer = layer)
    }

    pub fn set_temp_layer_activation_delay(
        &mut self,
        activation_delay_ms: u16,
        persistent: bool,
        now_ms: u64,
    ) -> Result<(), Error> {
        log::info!(
            "temp-layer activation delay: {activation_delay_ms}ms{}",
            persistence_tag(persistent)
        );
        self.apply(persistent, now_ms, |s| {
            s.temp_layer_activation_delay_ms = activation_delay_ms;
        })
    }

    pub fn set_temp_layer_deactivation_delay(
        &mut self,
        deactivation_delay_ms: u16,
        persistent: bool,
        now_ms: u64,
    ) -> Result<(), Error> {
        log::info!(
            "temp-layer deactivation delay: {deactivation_delay_ms}ms{}",
            persistence_tag(persistent)
        );
        self.apply(persistent, now_ms, |s| {
            s.temp_layer_deactivation_delay_ms = deactivation_delay_ms;
        })
    }

    /// Keep-active latch; releasing it while the layer is up schedules an
    /// immediate deactivation. Not persisted.
    pub fn set_temp_layer_keep_active(&mut self, keep: bool, now_ms: u64) {
        self.temp_layer.set_keep_active(keep, now_ms);
    }

    pub fn set_active_layers(
        &mut self,
        layers: u32,
        persistent: bool,
        now_ms: u64,
    ) -> Result<(), Error> {
        log::info!("active layers: {layers:#010x}{}", persistence_tag(persistent));
        self.apply(persistent, now_ms, |s| s.active_layers = layers)
    }

    pub fn set_axis_snap(
        &mut self,
        mode: AxisSnapMode,
        threshold: u16,
        timeout_ms: u16,
        persistent: bool,
        now_ms: u64,
    ) -> Result<(), Error> {
        log::info!(
            "axis snap config: mode={}, threshold={threshold}, timeout={timeout_ms}ms{}",
            mode.as_u8(),
            persistence_tag(persistent)
        );
        self.apply(persistent, now_ms, |s| {
            s.axis_snap_mode = mode;
            s.axis_snap_threshold = threshold;
            s.axis_snap_timeout_ms = timeout_ms;
        })?;
        self.snap.reset();
        Ok(())
    }

    pub fn set_axis_snap_mode(
        &mut self,
        mode: AxisSnapMode,
        persistent: bool,
        now_ms: u64,
    ) -> Result<(), Error> {
        log::info!("axis snap mode: {}{}", mode.as_u8(), persistence_tag(persistent));
        self.apply(persistent, now_ms, |s| s.axis_snap_mode = mode)?;
        self.snap.reset();
        Ok(())
    }

    pub fn set_axis_snap_threshold(
        &mut self,
        threshold: u16,
        persistent: bool,
        now_ms: u64,
    ) -> Result<(), Error> {
        log::info!("axis snap threshold: {threshold}{}", persistence_tag(persistent));
        self.apply(persistent, now_ms, |s| s.axis_snap_threshold = threshold)?;
        self.snap.reset();
        Ok(())
    }

    pub fn set_axis_snap_timeout(
        &mut self,
        timeout_ms: u16,
        persistent: bool,
        now_ms: u64,
    ) -> Result<(), Error> {
        log::info!("axis snap timeout: {timeout_ms}ms{}", persistence_tag(persistent));
        self.apply(persistent, now_ms, |s| s.axis_snap_timeout_ms = timeout_ms)?;
        self.snap.reset();
        Ok(())
    }

    pub fn set_xy_to_scroll(
        &mut self,
        enabled: bool,
        persistent: bool,
        now_ms: u64,
    ) -> Result<(), Error> {
        log::info!("xy-to-scroll enabled: {enabled}{}", persistence_tag(persistent));
        self.apply(persistent, now_ms, |s| s.xy_to_scroll = enabled)
    }

    pub fn set_xy_swap(
        &mut self,
        enabled: bool,
        persistent: bool,
        now_ms: u64,
    ) -> Result<(), Error> {
        log::info!("xy-swap enabled: {enabled}{}", persistence_tag(persistent));
        self.apply(persistent, now_ms, |s| s.xy_swap = enabled)
    }

    pub fn set_x_invert(
        &mut self,
        invert: bool,
        persistent: bool,
        now_ms: u64,
    ) -> Result<(), Error> {
        log::info!("x axis invert: {invert}{}", persistence_tag(persistent));
        self.apply(persistent, now_ms, |s| s.x_invert = invert)
    }

    pub fn set_y_invert(
        &mut self,
        invert: bool,
        persistent: bool,
        now_ms: u64,
    ) -> Result<(), Error> {
        log::info!("y axis invert: {invert}{}", persistence_tag(persistent));
        self.apply(persistent, now_ms, |s| s.y_invert = invert)
    }

    pub fn set_keybind_enabled(
        &mut self,
        enabled: bool,
        persistent: bool,
        now_ms: u64,
    ) -> Result<(), Error> {
        log::info!("keybind enabled: {enabled}{}", persistence_tag(persistent));
        self.apply(persistent, now_ms, |s| s.keybind_enabled = enabled)?;
        self.keybind.reset();
        Ok(())
    }

    pub fn set_keybind_count(
        &mut self,
        count: u8,
        persistent: bool,
        now_ms: u64,
    ) -> Result<(), Error> {
        if count < 1 || count as usize > MAX_KEYBIND_BEHAVIORS {
            log::error!("invalid keybind direction count {count} (must be 1-{MAX_KEYBIND_BEHAVIORS})");
            return Err(Error::InvalidArgument);
        }
        log::info!("keybind direction count: {count}{}", persistence_tag(persistent));
        self.apply(persistent, now_ms, |s| s.keybind_count = count)?;
        self.keybind.reset();
        Ok(())
    }

    pub fn set_keybind_degree_offset(
        &mut self,
        degree_offset: u16,
        persistent: bool,
        now_ms: u64,
    ) -> Result<(), Error> {
        if degree_offset >= 360 {
            log::error!("invalid keybind degree offset {degree_offset} (must be 0-359)");
            return Err(Error::InvalidArgument);
        }
        log::info!("keybind degree offset: {degree_offset}{}", persistence_tag(persistent));
        self.apply(persistent, now_ms, |s| s.keybind_degree_offset = degree_offset)
    }

    pub fn set_keybind_tick(
        &mut self,
        tick: u16,
        persistent: bool,
        now_ms: u64,
    ) -> Result<(), Error> {
        if tick == 0 {
            log::error!("invalid keybind tick {tick} (must be > 0)");
            return Err(Error::InvalidArgument);
        }
        log::info!("keybind tick: {tick}{}", persistence_tag(persistent));
        self.apply(persistent, now_ms, |s| s.keybind_tick = tick)
    }

    /// Restores every tunable to the config defaults, clears all
    /// accumulators and schedules a save. Nothing in flight is cancelled: a
    /// pending temp-layer deactivation keeps its deadline and observes the
    /// restored settings when it fires.
    pub fn reset(&mut self, now_ms: u64) {
        self.temp_layer.reset();

        self.current = self.config.defaults;
        self.persistent = self.config.defaults;
        self.rotation = RotationState::new(self.current.rotation_degrees);
        self.snap.reset();
        self.keybind.reset();

        log::info!("reset processor '{}' to defaults", self.config.name);
        self.schedule_save(now_ms);
        events::publish_config_changed(self.config.name, self.persistent);
    }

    /// Snaps the current view back to the persistent one after a temporary
    /// override, clearing the snap and keybind accumulators.
    pub fn restore_persistent(&mut self) {
        self.current = self.persistent;
        self.rotation.set_angle(self.current.rotation_degrees);
        self.snap.reset();
        self.keybind.reset();
        log::debug!("restored persistent values");
    }

    /// Applies a loaded settings record: both views take the stored values.
    /// Records with an unexpected size or shape are rejected and the
    /// defaults stay in place.
    pub fn apply_persisted(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let Some(loaded) = TunableSettings::from_record(bytes) else {
            log::warn!(
                "rejecting persisted settings for '{}' ({} bytes)",
                self.config.name,
                bytes.len()
            );
            return Err(Error::InvalidArgument);
        };
        self.persistent = loaded;
        self.current = loaded;
        self.rotation.set_angle(self.current.rotation_degrees);
        log::info!(
            "loaded settings for '{}': scale={}/{}, rotation={}, temp_layer={}, active_layers={:#010x}, axis_snap={}",
            self.config.name,
            loaded.scale_multiplier,
            loaded.scale_divisor,
            loaded.rotation_degrees,
            loaded.temp_layer_enabled,
            loaded.active_layers,
            loaded.axis_snap_mode.as_u8()
        );
        Ok(())
    }

    fn apply<F: Fn(&mut TunableSettings)>(
        &mut self,
        persistent: bool,
        now_ms: u64,
        update: F,
    ) -> Result<(), Error> {
        update(&mut self.current);
        if persistent {
            update(&mut self.persistent);
            self.schedule_save(now_ms);
            events::publish_config_changed(self.config.name, self.persistent);
        }
        Ok(())
    }

    fn schedule_save(&mut self, now_ms: u64) {
        self.save_due = Some(now_ms.saturating_add(SETTINGS_SAVE_DEBOUNCE_MS));
    }

    fn write_settings(&mut self, store: &mut dyn SettingsStore) {
        let key = settings_key(self.config.name);
        match store.save(key.as_str(), &self.persistent.record_bytes()) {
            Ok(()) => log::info!("saved settings for {}", self.config.name),
            Err(err) => log::error!("failed to save settings for {}: {err}", self.config.name),
        }
    }
}

/// True when the instance applies on the currently active keymap layers.
/// A zero mask applies everywhere; invalid layer indices are skipped.
fn layer_gate_open(active_layers: u32, keymap: &dyn KeymapHost) -> bool {
    if active_layers == 0 {
        return true;
    }
    let mut remaining = active_layers;
    let mut index = 0u8;
    while remaining != 0 && index < keymap.layers_len() {
        if remaining & 1 != 0 {
            if let Some(layer) = keymap.layer_index_to_id(index) {
                if keymap.layer_active(layer) {
                    return true;
                }
            }
        }
        remaining >>= 1;
        index += 1;
    }
    false
}

fn persistence_tag(persistent: bool) -> &'static str {
    if persistent {
        " (persistent)"
    } else {
        " (temporary)"
    }
}

#[cfg(test)]
mod tests;
