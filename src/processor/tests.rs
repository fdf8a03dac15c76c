use std::string::String;
use std::vec::Vec;

use super::*;
use crate::events::CONFIG_EVENTS;
use crate::keymap::{BehaviorBinding, BehaviorId, BindingEvent};
use crate::settings::RECORD_LEN;
use crate::types::{EV_REL, REL_X, REL_Y};

static TRACKBALL: ProcessorConfig = ProcessorConfig {
    name: "trackball",
    event_type: EV_REL,
    x_codes: &[REL_X],
    y_codes: &[REL_Y],
    keybind_behaviors: &["up", "left", "down", "right"],
    transparent_behavior: None,
    kp_behavior: None,
    temp_layer_keep_keycodes: &[],
    defaults: TunableSettings::DEFAULT,
};

struct FakeKeymap {
    active: [bool; 8],
}

impl FakeKeymap {
    fn new() -> Self {
        let mut active = [false; 8];
        active[0] = true;
        Self { active }
    }
}

impl KeymapHost for FakeKeymap {
    fn layers_len(&self) -> u8 {
        8
    }
    fn layer_index_to_id(&self, index: u8) -> Option<u8> {
        (index < 8).then_some(index)
    }
    fn layer_active(&self, layer: u8) -> bool {
        self.active[layer as usize]
    }
    fn layer_activate(&mut self, layer: u8) -> Result<(), Error> {
        self.active[layer as usize] = true;
        Ok(())
    }
    fn layer_deactivate(&mut self, layer: u8) -> Result<(), Error> {
        self.active[layer as usize] = false;
        Ok(())
    }
    fn highest_active_layer(&self) -> u8 {
        (0..8u8).rev().find(|&i| self.active[i as usize]).unwrap_or(0)
    }
    fn binding_at(&self, _layer: u8, _position: u32) -> Option<BehaviorBinding> {
        None
    }
    fn is_modifier(&self, _page: u16, _id: u16) -> bool {
        false
    }
}

struct FakeBehaviors {
    invocations: Vec<(&'static str, bool)>,
}

impl FakeBehaviors {
    fn new() -> Self {
        Self {
            invocations: Vec::new(),
        }
    }
}

impl BehaviorHost for FakeBehaviors {
    fn lookup(&self, name: &str) -> Option<BehaviorId> {
        ["up", "left", "down", "right"]
            .iter()
            .position(|&n| n == name)
            .map(|i| BehaviorId(i as u16))
    }
    fn invoke(
        &mut self,
        binding: &BehaviorBinding,
        _event: BindingEvent,
        pressed: bool,
    ) -> Result<(), Error> {
        self.invocations.push((binding.behavior, pressed));
        Ok(())
    }
}

#[derive(Default)]
struct MemoryStore {
    saved: Vec<(String, Vec<u8>)>,
}

impl SettingsStore for MemoryStore {
    fn save(&mut self, key: &str, bytes: &[u8]) -> Result<(), Error> {
        self.saved.push((String::from(key), Vec::from(bytes)));
        Ok(())
    }
}

struct Harness {
    processor: Processor,
    keymap: FakeKeymap,
    behaviors: FakeBehaviors,
    store: MemoryStore,
}

impl Harness {
    fn new() -> Self {
        Self {
            processor: Processor::new(&TRACKBALL),
            keymap: FakeKeymap::new(),
            behaviors: FakeBehaviors::new(),
            store: MemoryStore::default(),
        }
    }

    fn feed(&mut self, code: u16, value: i16, now_ms: u64) -> (InputEvent, EventVerdict) {
        let mut event = InputEvent::rel(code, value);
        let verdict = self.processor.handle_event(
            &mut event,
            now_ms,
            None,
            &mut self.keymap,
            &mut self.behaviors,
        );
        (event, verdict)
    }

    fn feed_with_remainder(
        &mut self,
        code: u16,
        value: i16,
        now_ms: u64,
        remainder: &mut i32,
    ) -> (InputEvent, EventVerdict) {
        let mut event = InputEvent::rel(code, value);
        let verdict = self.processor.handle_event(
            &mut event,
            now_ms,
            Some(remainder),
            &mut self.keymap,
            &mut self.behaviors,
        );
        (event, verdict)
    }
}

#[test]
fn foreign_event_type_passes_through() {
    let mut harness = Harness::new();
    let mut event = InputEvent {
        event_type: 0x01,
        code: REL_X,
        value: 9,
    };
    let original = event;
    harness.processor.set_x_invert(true, false, 0).unwrap();
    let verdict = harness.processor.handle_event(
        &mut event,
        0,
        None,
        &mut harness.keymap,
        &mut harness.behaviors,
    );
    assert_eq!(verdict, EventVerdict::Forward);
    assert_eq!(event, original);
}

#[test]
fn unknown_code_passes_through() {
    let mut harness = Harness::new();
    harness.processor.set_x_invert(true, false, 0).unwrap();
    harness.processor.set_y_invert(true, false, 0).unwrap();
    let (event, verdict) = harness.feed(0x20, 9, 0);
    assert_eq!(verdict, EventVerdict::Forward);
    assert_eq!(event, InputEvent::rel(0x20, 9));
}

#[test]
fn layer_gate_blocks_on_inactive_mask() {
    let mut harness = Harness::new();
    harness.processor.set_x_invert(true, false, 0).unwrap();
    // Only layer 2 in the mask; layer 2 is inactive.
    harness.processor.set_active_layers(0b100, false, 0).unwrap();
    let (event, verdict) = harness.feed(REL_X, 9, 0);
    assert_eq!(verdict, EventVerdict::Forward);
    assert_eq!(event.value, 9);

    // Activating layer 2 opens the gate.
    harness.keymap.active[2] = true;
    let (event, _) = harness.feed(REL_X, 9, 0);
    assert_eq!(event.value, -9);
}

#[test]
fn zero_mask_gates_everything_in() {
    let mut harness = Harness::new();
    harness.processor.set_x_invert(true, false, 0).unwrap();
    let (event, _) = harness.feed(REL_X, 9, 0);
    assert_eq!(event.value, -9);
}

#[test]
fn scroll_remap_wins_over_swap() {
    let mut harness = Harness::new();
    harness.processor.set_xy_to_scroll(true, false, 0).unwrap();
    harness.processor.set_xy_swap(true, false, 0).unwrap();
    let (event, _) = harness.feed(REL_X, 3, 0);
    assert_eq!(event.code, crate::types::REL_HWHEEL);
    let (event, _) = harness.feed(REL_Y, 3, 0);
    assert_eq!(event.code, crate::types::REL_WHEEL);
}

#[test]
fn swap_exchanges_axis_codes() {
    let mut harness = Harness::new();
    harness.processor.set_xy_swap(true, false, 0).unwrap();
    let (event, _) = harness.feed(REL_X, 3, 0);
    assert_eq!(event.code, REL_Y);
    let (event, _) = harness.feed(REL_Y, 3, 0);
    assert_eq!(event.code, REL_X);
}

#[test]
fn invert_twice_cancels_out() {
    let mut harness = Harness::new();
    for value in [5i16, -7, 0, 123] {
        harness.processor.set_x_invert(true, false, 0).unwrap();
        let (once, _) = harness.feed(REL_X, value, 0);
        harness.processor.set_x_invert(false, false, 0).unwrap();
        let (plain, _) = harness.feed(REL_X, value, 0);
        assert_eq!(once.value, -plain.value);
    }
}

#[test]
fn rotation_ninety_degrees_pairs_events() {
    let mut harness = Harness::new();
    harness.processor.set_rotation(90, false, 0).unwrap();
    // X arrives unpaired: suppressed to zero.
    let (event, verdict) = harness.feed(REL_X, 5, 0);
    assert_eq!(verdict, EventVerdict::Forward);
    assert_eq!(event.value, 0);
    // Y completes the pair (5, 7) -> (-7, 5).
    let (event, _) = harness.feed(REL_Y, 7, 0);
    assert_eq!(event.value, 5);
    let (event, _) = harness.feed(REL_X, 5, 0);
    assert_eq!(event.value, -7);
}

#[test]
fn scaling_carries_remainder_through_pipeline() {
    let mut harness = Harness::new();
    harness.processor.set_scaling(3, 2, false, 0).unwrap();
    let mut remainder = 0i32;
    let (event, _) = harness.feed_with_remainder(REL_X, 3, 0, &mut remainder);
    assert_eq!(event.value, 4);
    assert_eq!(remainder, 1);
    let (event, _) = harness.feed_with_remainder(REL_X, 5, 0, &mut remainder);
    assert_eq!(event.value, 8);
    assert_eq!(remainder, 0);
}

#[test]
fn keybind_consumes_all_motion_while_enabled() {
    let mut harness = Harness::new();
    harness.processor.set_keybind_enabled(true, false, 0).unwrap();
    let (_, verdict) = harness.feed(REL_X, 2, 0);
    assert_eq!(verdict, EventVerdict::Consumed);
    assert!(harness.behaviors.invocations.is_empty());

    // Crossing the tick fires and still consumes.
    let (_, verdict) = harness.feed(REL_X, 20, 10);
    assert_eq!(verdict, EventVerdict::Consumed);
    assert_eq!(
        harness.behaviors.invocations,
        [("up", true), ("up", false)]
    );
}

#[test]
fn snap_gates_cross_axis_through_pipeline() {
    let mut harness = Harness::new();
    harness
        .processor
        .set_axis_snap(AxisSnapMode::SnapX, 100, 1_000, false, 0)
        .unwrap();
    let mut now = 10;
    for _ in 0..9 {
        let (event, _) = harness.feed(REL_Y, 10, now);
        assert_eq!(event.value, 0);
        now += 10;
    }
    let (event, _) = harness.feed(REL_Y, 10, now);
    assert_eq!(event.value, 10);
    // Primary axis was never gated.
    let (event, _) = harness.feed(REL_X, 5, now);
    assert_eq!(event.value, 5);
}

#[test]
fn setter_validation_rejects_out_of_range() {
    let mut harness = Harness::new();
    let p = &mut harness.processor;
    assert_eq!(p.set_scaling(0, 2, true, 0), Err(Error::InvalidArgument));
    assert_eq!(p.set_scaling(2, 0, true, 0), Err(Error::InvalidArgument));
    assert_eq!(p.set_keybind_count(0, true, 0), Err(Error::InvalidArgument));
    assert_eq!(p.set_keybind_count(9, true, 0), Err(Error::InvalidArgument));
    assert_eq!(
        p.set_keybind_degree_offset(360, true, 0),
        Err(Error::InvalidArgument)
    );
    assert_eq!(p.set_keybind_tick(0, true, 0), Err(Error::InvalidArgument));

    // No partial writes and no scheduled save on failure.
    assert_eq!(p.current_settings(), TunableSettings::DEFAULT);
    assert_eq!(p.persistent_settings(), TunableSettings::DEFAULT);
    assert_eq!(p.next_wake_ms(), None);
}

#[test]
fn temporary_change_leaves_persistent_view() {
    let mut harness = Harness::new();
    harness.processor.set_scaling(5, 3, false, 0).unwrap();
    assert_eq!(harness.processor.current_settings().scale_multiplier, 5);
    assert_eq!(harness.processor.persistent_settings().scale_multiplier, 1);
    // Nothing to save for a temporary change.
    assert_eq!(harness.processor.next_wake_ms(), None);
}

#[test]
fn restore_persistent_snaps_every_tunable_back() {
    let mut harness = Harness::new();
    let p = &mut harness.processor;
    p.set_scaling(5, 3, false, 0).unwrap();
    p.set_rotation(45, false, 0).unwrap();
    p.set_temp_layer(true, 4, 50, 900, false, 0).unwrap();
    p.set_active_layers(0b10, false, 0).unwrap();
    p.set_axis_snap(AxisSnapMode::SnapY, 42, 700, false, 0).unwrap();
    p.set_xy_to_scroll(true, false, 0).unwrap();
    p.set_xy_swap(true, false, 0).unwrap();
    p.set_x_invert(true, false, 0).unwrap();
    p.set_y_invert(true, false, 0).unwrap();
    p.set_keybind_enabled(true, false, 0).unwrap();
    p.set_keybind_count(2, false, 0).unwrap();
    p.set_keybind_degree_offset(90, false, 0).unwrap();
    p.set_keybind_tick(33, false, 0).unwrap();

    p.restore_persistent();
    assert_eq!(p.current_settings(), p.persistent_settings());
    assert_eq!(p.current_settings(), TunableSettings::DEFAULT);
}

#[test]
fn persistent_save_waits_for_debounce() {
    let mut harness = Harness::new();
    harness.processor.set_scaling(7, 4, true, 1_000).unwrap();

    harness
        .processor
        .service(1_000, &mut harness.keymap, &mut harness.store);
    assert!(harness.store.saved.is_empty());

    harness.processor.service(
        1_000 + SETTINGS_SAVE_DEBOUNCE_MS,
        &mut harness.keymap,
        &mut harness.store,
    );
    assert_eq!(harness.store.saved.len(), 1);
    let (key, bytes) = &harness.store.saved[0];
    assert_eq!(key, "input_proc/trackball");
    assert_eq!(bytes.len(), RECORD_LEN);
    assert_eq!(
        TunableSettings::from_record(bytes),
        Some(harness.processor.persistent_settings())
    );
}

#[test]
fn repeated_persistent_changes_coalesce() {
    let mut harness = Harness::new();
    harness.processor.set_scaling(7, 4, true, 1_000).unwrap();
    harness.processor.set_rotation(30, true, 2_000).unwrap();

    // First deadline was replaced by the second change.
    harness.processor.service(
        1_000 + SETTINGS_SAVE_DEBOUNCE_MS,
        &mut harness.keymap,
        &mut harness.store,
    );
    assert!(harness.store.saved.is_empty());

    harness.processor.service(
        2_000 + SETTINGS_SAVE_DEBOUNCE_MS,
        &mut harness.keymap,
        &mut harness.store,
    );
    assert_eq!(harness.store.saved.len(), 1);
}

#[test]
fn persistent_change_raises_observer_event() {
    while CONFIG_EVENTS.try_receive().is_ok() {}
    let mut harness = Harness::new();
    harness.processor.set_scaling(9, 5, true, 0).unwrap();

    let mut seen = false;
    while let Ok(change) = CONFIG_EVENTS.try_receive() {
        if change.name == "trackball"
            && change.settings.scale_multiplier == 9
            && change.settings.scale_divisor == 5
        {
            seen = true;
        }
    }
    assert!(seen);
}

#[test]
fn loaded_record_overwrites_both_views() {
    let mut harness = Harness::new();
    let mut stored = TunableSettings::DEFAULT;
    stored.scale_multiplier = 7;
    stored.scale_divisor = 4;
    stored.rotation_degrees = 90;

    harness
        .processor
        .apply_persisted(&stored.record_bytes())
        .unwrap();
    assert_eq!(harness.processor.current_settings(), stored);
    assert_eq!(harness.processor.persistent_settings(), stored);

    // The refreshed rotation terms are live immediately.
    let _ = harness.feed(REL_X, 5, 0);
    let (event, _) = harness.feed(REL_Y, 4, 0);
    // (5, 4) rotated by 90 degrees -> (-4, 5); value is scaled by 7/4.
    assert_eq!(event.value, 8);
}

#[test]
fn bad_record_is_rejected_and_defaults_stay() {
    let mut harness = Harness::new();
    let record = TunableSettings::DEFAULT.record_bytes();
    assert_eq!(
        harness.processor.apply_persisted(&record[..RECORD_LEN - 3]),
        Err(Error::InvalidArgument)
    );
    assert_eq!(harness.processor.current_settings(), TunableSettings::DEFAULT);
}

#[test]
fn reset_restores_defaults_without_cancelling_work() {
    let mut harness = Harness::new();
    harness
        .processor
        .set_temp_layer(true, 3, 100, 500, false, 0)
        .unwrap();
    harness.processor.set_scaling(9, 2, true, 0).unwrap();

    // Bring the layer up and arm deactivation.
    let _ = harness.feed(REL_X, 5, 1_000);
    harness
        .processor
        .service(1_000, &mut harness.keymap, &mut harness.store);
    let _ = harness.feed(REL_X, 2, 1_100);
    assert!(harness.processor.temp_layer_active());

    harness.processor.reset(1_200);
    assert_eq!(harness.processor.current_settings(), TunableSettings::DEFAULT);
    assert_eq!(harness.processor.persistent_settings(), TunableSettings::DEFAULT);
    // Nothing in flight was cancelled: the layer is still up and the
    // scheduled deactivation keeps its deadline; reset queues its own save.
    assert!(harness.processor.temp_layer_active());
    assert!(harness.keymap.active[3]);
    assert_eq!(harness.processor.next_wake_ms(), Some(1_600));

    // The deactivation fires on its original deadline, observes the
    // post-reset state and retires the layer it activated.
    harness
        .processor
        .service(1_600, &mut harness.keymap, &mut harness.store);
    assert!(!harness.processor.temp_layer_active());
    assert!(!harness.keymap.active[3]);
    assert_eq!(
        harness.processor.next_wake_ms(),
        Some(1_200 + SETTINGS_SAVE_DEBOUNCE_MS)
    );
}

#[test]
fn temp_layer_auto_deactivates_after_idle() {
    let mut harness = Harness::new();
    harness
        .processor
        .set_temp_layer(true, 3, 100, 500, false, 0)
        .unwrap();

    let _ = harness.feed(REL_X, 5, 1_000);
    harness
        .processor
        .service(1_000, &mut harness.keymap, &mut harness.store);
    assert!(harness.processor.temp_layer_active());

    // Motion while active pushes the deadline out.
    let _ = harness.feed(REL_X, 2, 1_100);
    assert_eq!(harness.processor.next_wake_ms(), Some(1_600));

    harness
        .processor
        .service(1_600, &mut harness.keymap, &mut harness.store);
    assert!(!harness.processor.temp_layer_active());
    assert!(!harness.keymap.active[3]);
}

#[test]
fn keep_active_blocks_scheduled_deactivation() {
    let mut harness = Harness::new();
    harness
        .processor
        .set_temp_layer(true, 3, 100, 500, false, 0)
        .unwrap();

    let _ = harness.feed(REL_X, 5, 1_000);
    harness
        .processor
        .service(1_000, &mut harness.keymap, &mut harness.store);
    let _ = harness.feed(REL_X, 2, 1_100);

    harness.processor.set_temp_layer_keep_active(true, 1_200);
    harness
        .processor
        .service(5_000, &mut harness.keymap, &mut harness.store);
    assert!(harness.processor.temp_layer_active());

    // Releasing the latch retires the layer on the next pass.
    harness.processor.set_temp_layer_keep_active(false, 5_100);
    harness
        .processor
        .service(5_100, &mut harness.keymap, &mut harness.store);
    assert!(!harness.processor.temp_layer_active());
}
