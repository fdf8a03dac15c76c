//! Crate-wide tuning constants.

/// Maximum number of processor instances a registry can hold.
pub const MAX_PROCESSORS: usize = 8;

/// Maximum number of keybind directions per instance.
pub const MAX_KEYBIND_BEHAVIORS: usize = 8;

/// Debounce window for persistent settings writes. Repeated persistent
/// changes inside the window coalesce into a single store write.
pub const SETTINGS_SAVE_DEBOUNCE_MS: u64 = 60_000;

/// Settings key prefix; the full key is `input_proc/<instance name>`.
pub const SETTINGS_ROOT: &str = "input_proc";

/// Maximum settings key length, prefix and separator included.
pub const SETTINGS_KEY_MAX_LEN: usize = 48;

/// Axis-snap accumulator decay granularity.
pub const AXIS_SNAP_DECAY_PERIOD_MS: u64 = 50;

/// Default temp-layer activation delay when a config leaves it unset.
pub const DEFAULT_TEMP_LAYER_ACTIVATION_DELAY_MS: u16 = 100;

/// Default temp-layer deactivation delay when a config leaves it unset.
pub const DEFAULT_TEMP_LAYER_DEACTIVATION_DELAY_MS: u16 = 500;

/// Default axis-snap release threshold.
pub const DEFAULT_AXIS_SNAP_THRESHOLD: u16 = 100;

/// Default axis-snap decay window.
pub const DEFAULT_AXIS_SNAP_TIMEOUT_MS: u16 = 1_000;

/// Default keybind direction count.
pub const DEFAULT_KEYBIND_COUNT: u8 = 4;

/// Default keybind squared-distance trigger threshold.
pub const DEFAULT_KEYBIND_TICK: u16 = 10;
