//! Host seams: keymap layer control and behavior invocation.
//!
//! The pipeline never owns a keymap or a behavior registry; the firmware
//! integration supplies both through these traits and tests supply fakes.

use crate::error::Error;

pub type LayerId = u8;

/// A keymap binding as stored in a layer slot: a named behavior plus its two
/// encoded parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BehaviorBinding {
    pub behavior: &'static str,
    pub param1: u32,
    pub param2: u32,
}

impl BehaviorBinding {
    pub const fn bare(behavior: &'static str) -> Self {
        Self {
            behavior,
            param1: 0,
            param2: 0,
        }
    }
}

/// Invocation context handed to a behavior on press and release.
#[derive(Clone, Copy, Debug)]
pub struct BindingEvent {
    pub layer: LayerId,
    pub position: u32,
    pub timestamp_ms: u64,
}

/// Position sentinel for invocations that do not originate from a key.
pub const SYNTHETIC_POSITION: u32 = u32::MAX;

/// Opaque identity token for a resolved behavior handler. Two lookups of the
/// same handler return equal tokens.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BehaviorId(pub u16);

pub trait KeymapHost {
    /// Number of layers the keymap defines.
    fn layers_len(&self) -> u8;
    /// Maps a layer index to its id; `None` when the index has no layer.
    fn layer_index_to_id(&self, index: u8) -> Option<LayerId>;
    fn layer_active(&self, layer: LayerId) -> bool;
    fn layer_activate(&mut self, layer: LayerId) -> Result<(), Error>;
    fn layer_deactivate(&mut self, layer: LayerId) -> Result<(), Error>;
    fn highest_active_layer(&self) -> LayerId;
    /// The binding stored at `(layer, position)`, if any.
    fn binding_at(&self, layer: LayerId, position: u32) -> Option<BehaviorBinding>;
    /// Whether `(page, usage_id)` names a modifier key.
    fn is_modifier(&self, page: u16, usage_id: u16) -> bool;
}

pub trait BehaviorHost {
    /// Resolves a behavior name to its handler identity.
    fn lookup(&self, name: &str) -> Option<BehaviorId>;
    /// Invokes a binding; `pressed` selects press or release.
    fn invoke(
        &mut self,
        binding: &BehaviorBinding,
        event: BindingEvent,
        pressed: bool,
    ) -> Result<(), Error>;
}

/// Whether `binding` resolves to the configured identity token; falls back
/// to a case-insensitive name match when no token is configured.
pub(crate) fn binding_matches(
    binding: &BehaviorBinding,
    configured: Option<&'static str>,
    fallback_name: &str,
    behaviors: &dyn BehaviorHost,
) -> bool {
    match configured {
        Some(reference) => {
            let resolved = behaviors.lookup(binding.behavior);
            resolved.is_some() && resolved == behaviors.lookup(reference)
        }
        None => binding.behavior.eq_ignore_ascii_case(fallback_name),
    }
}
