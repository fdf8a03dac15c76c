#![no_std]

#[cfg(test)]
extern crate std;

// Host tests need a critical-section implementation for the observer channel.
#[cfg(test)]
use critical_section as _;

pub mod config;
pub mod error;
pub mod events;
pub mod keymap;
pub mod listeners;
pub mod processor;
pub mod registry;
pub mod settings;
pub mod trig;
pub mod types;

pub use error::Error;
pub use processor::{Processor, ProcessorConfig};
pub use registry::ProcessorRegistry;
pub use settings::TunableSettings;
pub use types::{AxisSnapMode, EventVerdict, InputEvent};
