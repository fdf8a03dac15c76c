//! Gesture-to-keybind dispatch: accumulate 2D motion, fire one of up to
//! eight direction bindings once the squared distance crosses the tick
//! threshold, and consume the motion either way.

use crate::config::MAX_KEYBIND_BEHAVIORS;
use crate::keymap::{
    BehaviorBinding, BehaviorHost, BindingEvent, KeymapHost, SYNTHETIC_POSITION,
};
use crate::trig::atan2_deci_deg;

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct KeybindState {
    x_accum: i32,
    y_accum: i32,
}

impl KeybindState {
    pub(crate) fn reset(&mut self) {
        self.x_accum = 0;
        self.y_accum = 0;
    }

    #[cfg(test)]
    pub(crate) fn accums(&self) -> (i32, i32) {
        (self.x_accum, self.y_accum)
    }

    /// Runs the dispatcher over one classified event. Returns `true` when
    /// the event is consumed (always, while the dispatcher is enabled).
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn process(
        &mut self,
        behaviors_list: &[&'static str],
        enabled: bool,
        count: u8,
        degree_offset: u16,
        tick: u16,
        is_x: bool,
        value: i16,
        now_ms: u64,
        keymap: &dyn KeymapHost,
        behaviors: &mut dyn BehaviorHost,
    ) -> bool {
        if !enabled || count == 0 || behaviors_list.is_empty() {
            return false;
        }

        let count = (count as usize).min(behaviors_list.len()).min(MAX_KEYBIND_BEHAVIORS);

        if is_x {
            self.x_accum = self.x_accum.saturating_add(i32::from(value));
        } else {
            self.y_accum = self.y_accum.saturating_add(i32::from(value));
        }

        let travel_sq = i64::from(self.x_accum) * i64::from(self.x_accum)
            + i64::from(self.y_accum) * i64::from(self.y_accum);
        let tick_sq = i64::from(tick) * i64::from(tick);
        if travel_sq < tick_sq {
            // Not enough motion yet; still swallow the event.
            return true;
        }

        let idx = direction_index(self.x_accum, self.y_accum, degree_offset, count);
        log::debug!(
            "keybind: accum=({}, {}) offset={degree_offset} -> {idx}/{count}",
            self.x_accum,
            self.y_accum
        );
        trigger(behaviors_list, idx, now_ms, keymap, behaviors);

        self.x_accum = 0;
        self.y_accum = 0;
        true
    }
}

/// Picks the direction segment for the accumulated vector. Segments are
/// half-segment centered, so with no offset the first segment straddles 0
/// degrees.
fn direction_index(x_accum: i32, y_accum: i32, degree_offset: u16, count: usize) -> usize {
    if count <= 1 {
        return 0;
    }
    let angle = atan2_deci_deg(y_accum, x_accum);
    let shifted = (angle + i32::from(degree_offset) * 10).rem_euclid(3600);
    ((shifted as usize * count + 1800) / 3600) % count
}

fn trigger(
    behaviors_list: &[&'static str],
    idx: usize,
    now_ms: u64,
    keymap: &dyn KeymapHost,
    behaviors: &mut dyn BehaviorHost,
) {
    let Some(&name) = behaviors_list.get(idx) else {
        log::error!("keybind direction {idx} has no behavior");
        return;
    };
    if behaviors.lookup(name).is_none() {
        log::error!("keybind behavior '{name}' not registered");
        return;
    }

    let binding = BehaviorBinding::bare(name);
    let event = BindingEvent {
        layer: keymap.highest_active_layer(),
        position: SYNTHETIC_POSITION,
        timestamp_ms: now_ms,
    };

    if let Err(err) = behaviors.invoke(&binding, event, true) {
        log::error!("keybind press for '{name}' failed: {err}");
        return;
    }
    log::info!("triggered keybind behavior {idx} ({name})");
    if let Err(err) = behaviors.invoke(&binding, event, false) {
        log::error!("keybind release for '{name}' failed: {err}");
    }
}
