//! Tunable settings and their persisted form.
//!
//! `TunableSettings` is the full set of runtime tunables. A processor keeps
//! two copies (current and persistent); the persistent copy is what gets
//! packed into the store record and published to observers.

use core::fmt::Write as _;

use heapless::String;

use crate::config::{
    DEFAULT_AXIS_SNAP_THRESHOLD, DEFAULT_AXIS_SNAP_TIMEOUT_MS, DEFAULT_KEYBIND_COUNT,
    DEFAULT_KEYBIND_TICK, DEFAULT_TEMP_LAYER_ACTIVATION_DELAY_MS,
    DEFAULT_TEMP_LAYER_DEACTIVATION_DELAY_MS, SETTINGS_KEY_MAX_LEN, SETTINGS_ROOT,
};
use crate::error::Error;
use crate::types::AxisSnapMode;

/// Packed record length in bytes. Loads with any other length are rejected.
pub const RECORD_LEN: usize = 37;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TunableSettings {
    pub scale_multiplier: u32,
    pub scale_divisor: u32,
    pub rotation_degrees: i32,
    pub temp_layer_enabled: bool,
    pub temp_layer_layer: u8,
    pub temp_layer_activation_delay_ms: u16,
    pub temp_layer_deactivation_delay_ms: u16,
    pub active_layers: u32,
    pub axis_snap_mode: AxisSnapMode,
    pub axis_snap_threshold: u16,
    pub axis_snap_timeout_ms: u16,
    pub xy_to_scroll: bool,
    pub xy_swap: bool,
    pub x_invert: bool,
    pub y_invert: bool,
    pub keybind_enabled: bool,
    pub keybind_count: u8,
    pub keybind_degree_offset: u16,
    pub keybind_tick: u16,
}

impl TunableSettings {
    pub const DEFAULT: Self = Self {
        scale_multiplier: 1,
        scale_divisor: 1,
        rotation_degrees: 0,
        temp_layer_enabled: false,
        temp_layer_layer: 0,
        temp_layer_activation_delay_ms: DEFAULT_TEMP_LAYER_ACTIVATION_DELAY_MS,
        temp_layer_deactivation_delay_ms: DEFAULT_TEMP_LAYER_DEACTIVATION_DELAY_MS,
        active_layers: 0,
        axis_snap_mode: AxisSnapMode::None,
        axis_snap_threshold: DEFAULT_AXIS_SNAP_THRESHOLD,
        axis_snap_timeout_ms: DEFAULT_AXIS_SNAP_TIMEOUT_MS,
        xy_to_scroll: false,
        xy_swap: false,
        x_invert: false,
        y_invert: false,
        keybind_enabled: false,
        keybind_count: DEFAULT_KEYBIND_COUNT,
        keybind_degree_offset: 0,
        keybind_tick: DEFAULT_KEYBIND_TICK,
    };

    pub fn record_bytes(&self) -> [u8; RECORD_LEN] {
        let mut record = [0u8; RECORD_LEN];
        record[0..4].copy_from_slice(&self.scale_multiplier.to_le_bytes());
        record[4..8].copy_from_slice(&self.scale_divisor.to_le_bytes());
        record[8..12].copy_from_slice(&self.rotation_degrees.to_le_bytes());
        record[12] = self.temp_layer_enabled as u8;
        record[13] = self.temp_layer_layer;
        record[14..16].copy_from_slice(&self.temp_layer_activation_delay_ms.to_le_bytes());
        record[16..18].copy_from_slice(&self.temp_layer_deactivation_delay_ms.to_le_bytes());
        record[18..22].copy_from_slice(&self.active_layers.to_le_bytes());
        record[22] = self.axis_snap_mode.as_u8();
        record[23..25].copy_from_slice(&self.axis_snap_threshold.to_le_bytes());
        record[25..27].copy_from_slice(&self.axis_snap_timeout_ms.to_le_bytes());
        record[27] = self.xy_to_scroll as u8;
        record[28] = self.xy_swap as u8;
        record[29] = self.x_invert as u8;
        record[30] = self.y_invert as u8;
        record[31] = self.keybind_enabled as u8;
        record[32] = self.keybind_count;
        record[33..35].copy_from_slice(&self.keybind_degree_offset.to_le_bytes());
        record[35..37].copy_from_slice(&self.keybind_tick.to_le_bytes());
        record
    }

    pub fn from_record(bytes: &[u8]) -> Option<Self> {
        let record: &[u8; RECORD_LEN] = bytes.try_into().ok()?;
        let u32_at = |at: usize| {
            u32::from_le_bytes([record[at], record[at + 1], record[at + 2], record[at + 3]])
        };
        let u16_at = |at: usize| u16::from_le_bytes([record[at], record[at + 1]]);
        Some(Self {
            scale_multiplier: u32_at(0),
            scale_divisor: u32_at(4),
            rotation_degrees: u32_at(8) as i32,
            temp_layer_enabled: record[12] != 0,
            temp_layer_layer: record[13],
            temp_layer_activation_delay_ms: u16_at(14),
            temp_layer_deactivation_delay_ms: u16_at(16),
            active_layers: u32_at(18),
            axis_snap_mode: AxisSnapMode::from_u8(record[22])?,
            axis_snap_threshold: u16_at(23),
            axis_snap_timeout_ms: u16_at(25),
            xy_to_scroll: record[27] != 0,
            xy_swap: record[28] != 0,
            x_invert: record[29] != 0,
            y_invert: record[30] != 0,
            keybind_enabled: record[31] != 0,
            keybind_count: record[32],
            keybind_degree_offset: u16_at(33),
            keybind_tick: u16_at(35),
        })
    }
}

impl Default for TunableSettings {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Debounced key/value blob store supplied by the host.
pub trait SettingsStore {
    fn save(&mut self, key: &str, bytes: &[u8]) -> Result<(), Error>;
}

/// Builds the store key for an instance: `input_proc/<name>`.
pub(crate) fn settings_key(name: &str) -> String<SETTINGS_KEY_MAX_LEN> {
    let mut key = String::new();
    let _ = write!(key, "{SETTINGS_ROOT}/{name}");
    key
}
