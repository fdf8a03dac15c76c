//! Observer notifications for persistent configuration changes.

use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};

use crate::settings::TunableSettings;

/// Raised whenever a persistent tunable changes; carries the persistent view
/// an observer (UI, RPC bridge) would display.
#[derive(Clone, Copy, Debug)]
pub struct ConfigChanged {
    pub name: &'static str,
    pub settings: TunableSettings,
}

pub static CONFIG_EVENTS: Channel<CriticalSectionRawMutex, ConfigChanged, 8> = Channel::new();

pub(crate) fn publish_config_changed(name: &'static str, settings: TunableSettings) {
    if CONFIG_EVENTS.try_send(ConfigChanged { name, settings }).is_err() {
        log::warn!("config event queue full, dropping notification for {name}");
    }
}
