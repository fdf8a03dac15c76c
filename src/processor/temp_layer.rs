//! Temp-layer controller: opportunistically activates a keymap layer while
//! pointer motion is present and deactivates it on inactivity or foreign key
//! activity.
//!
//! The machine owns the `layer_active` flag and only flips it on a confirmed
//! keymap transition: state handlers push `Activate`/`Deactivate` actions
//! into the dispatch context, the controller executes them against the
//! keymap host and feeds the result back in as `Activated`/`Deactivated`
//! (or their failure twins). Deferred work is a pair of deadline fields the
//! host polls through `run_due`.

use statig::{blocking::IntoStateMachineExt as _, prelude::*};

use crate::keymap::KeymapHost;

/// Snapshot of the temp-layer tunables taken at dispatch time.
#[derive(Clone, Copy, Debug)]
pub(crate) struct TempLayerSettings {
    pub(crate) enabled: bool,
    pub(crate) layer: u8,
    pub(crate) activation_delay_ms: u16,
    pub(crate) deactivation_delay_ms: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LayerAction {
    Activate { layer: u8 },
    Deactivate { layer: u8 },
}

#[derive(Clone, Copy, Debug, Default)]
struct DispatchContext {
    actions: [Option<LayerAction>; 2],
    len: usize,
}

impl DispatchContext {
    fn push(&mut self, action: LayerAction) {
        if self.len < self.actions.len() {
            self.actions[self.len] = Some(action);
            self.len += 1;
        }
    }

    fn iter(&self) -> impl Iterator<Item = &LayerAction> {
        self.actions[..self.len].iter().filter_map(Option::as_ref)
    }
}

#[derive(Clone, Copy, Debug)]
enum TempLayerEvent {
    /// Qualifying pointer motion (non-zero value), before the transform
    /// stages run.
    Motion {
        now_ms: u64,
        settings: TempLayerSettings,
        last_keypress_ms: u64,
    },
    /// Pipeline finished processing an event for this instance.
    Settled {
        now_ms: u64,
        settings: TempLayerSettings,
    },
    ActivationDue {
        settings: TempLayerSettings,
    },
    DeactivationDue,
    /// Foreign key activity decided against keeping the layer.
    Teardown,
    KeepActive {
        keep: bool,
        now_ms: u64,
    },
    Activated,
    ActivationFailed,
    Deactivated,
    DeactivationFailed,
}

struct TempLayerHsm {
    layer_active: bool,
    keep_active: bool,
    // The layer that was actually activated; deactivation targets this even
    // if the layer setting changed in the meantime.
    active_layer: u8,
    activate_at: Option<u64>,
    deactivate_at: Option<u64>,
}

impl TempLayerHsm {
    fn new() -> Self {
        Self {
            layer_active: false,
            keep_active: false,
            active_layer: 0,
            activate_at: None,
            deactivate_at: None,
        }
    }
}

#[state_machine(initial = "State::idle()")]
impl TempLayerHsm {
    #[state(superstate = "running")]
    fn idle(&mut self, context: &mut DispatchContext, event: &TempLayerEvent) -> Outcome<State> {
        let _ = context;
        match event {
            TempLayerEvent::Motion {
                now_ms,
                settings,
                last_keypress_ms,
            } => {
                if !settings.enabled || self.layer_active {
                    return Handled;
                }
                let quiet = *last_keypress_ms == 0
                    || now_ms.saturating_sub(*last_keypress_ms)
                        >= u64::from(settings.activation_delay_ms);
                if quiet {
                    // Next scheduler pass picks this up immediately.
                    self.activate_at = Some(*now_ms);
                    return Transition(State::pending_activation());
                }
                Handled
            }
            _ => Super,
        }
    }

    #[state(superstate = "running")]
    fn pending_activation(
        &mut self,
        context: &mut DispatchContext,
        event: &TempLayerEvent,
    ) -> Outcome<State> {
        match event {
            TempLayerEvent::ActivationDue { settings } => {
                self.activate_at = None;
                if !settings.enabled || self.layer_active {
                    return Transition(State::idle());
                }
                self.active_layer = settings.layer;
                context.push(LayerAction::Activate {
                    layer: settings.layer,
                });
                Handled
            }
            TempLayerEvent::ActivationFailed => Transition(State::idle()),
            _ => Super,
        }
    }

    #[state(superstate = "engaged")]
    fn active(&mut self, context: &mut DispatchContext, event: &TempLayerEvent) -> Outcome<State> {
        let _ = context;
        match event {
            TempLayerEvent::Settled { now_ms, settings } => {
                if self.keep_active {
                    return Handled;
                }
                self.deactivate_at =
                    Some(now_ms.saturating_add(u64::from(settings.deactivation_delay_ms)));
                Transition(State::pending_deactivation())
            }
            _ => Super,
        }
    }

    #[state(superstate = "engaged")]
    fn pending_deactivation(
        &mut self,
        context: &mut DispatchContext,
        event: &TempLayerEvent,
    ) -> Outcome<State> {
        match event {
            TempLayerEvent::Settled { now_ms, settings } => {
                if !self.keep_active {
                    self.deactivate_at =
                        Some(now_ms.saturating_add(u64::from(settings.deactivation_delay_ms)));
                }
                Handled
            }
            TempLayerEvent::DeactivationDue => {
                self.deactivate_at = None;
                if !self.layer_active {
                    return Transition(State::idle());
                }
                if self.keep_active {
                    return Transition(State::active());
                }
                context.push(LayerAction::Deactivate {
                    layer: self.active_layer,
                });
                Handled
            }
            TempLayerEvent::DeactivationFailed => Transition(State::active()),
            _ => Super,
        }
    }

    #[superstate(superstate = "running")]
    fn engaged(&mut self, context: &mut DispatchContext, event: &TempLayerEvent) -> Outcome<State> {
        match event {
            TempLayerEvent::Teardown => {
                if self.keep_active {
                    return Handled;
                }
                self.deactivate_at = None;
                context.push(LayerAction::Deactivate {
                    layer: self.active_layer,
                });
                Handled
            }
            _ => Super,
        }
    }

    #[superstate]
    fn running(&mut self, context: &mut DispatchContext, event: &TempLayerEvent) -> Outcome<State> {
        match event {
            TempLayerEvent::Activated => {
                self.layer_active = true;
                Transition(State::active())
            }
            TempLayerEvent::ActivationFailed => Transition(State::idle()),
            TempLayerEvent::Deactivated => {
                self.layer_active = false;
                Transition(State::idle())
            }
            TempLayerEvent::DeactivationFailed => Handled,
            TempLayerEvent::KeepActive { keep, now_ms } => {
                self.keep_active = *keep;
                if !keep && self.layer_active {
                    // Released while the layer is up: retire it on the next
                    // scheduler pass.
                    self.deactivate_at = Some(*now_ms);
                    return Transition(State::pending_deactivation());
                }
                Handled
            }
            _ => Handled,
        }
    }
}

pub(crate) struct TempLayerController {
    machine: statig::blocking::StateMachine<TempLayerHsm>,
    last_input_ms: u64,
    last_keypress_ms: u64,
}

impl TempLayerController {
    pub(crate) fn new() -> Self {
        Self {
            machine: TempLayerHsm::new().state_machine(),
            last_input_ms: 0,
            last_keypress_ms: 0,
        }
    }

    pub(crate) fn layer_active(&self) -> bool {
        self.machine.inner().layer_active
    }

    pub(crate) fn keep_active(&self) -> bool {
        self.machine.inner().keep_active
    }

    #[cfg(test)]
    pub(crate) fn last_input_ms(&self) -> u64 {
        self.last_input_ms
    }

    pub(crate) fn note_keypress(&mut self, now_ms: u64) {
        self.last_keypress_ms = now_ms;
    }

    /// Earliest pending deadline, if any.
    pub(crate) fn next_deadline_ms(&self) -> Option<u64> {
        let inner = self.machine.inner();
        match (inner.activate_at, inner.deactivate_at) {
            (Some(a), Some(d)) => Some(a.min(d)),
            (Some(a), None) => Some(a),
            (None, Some(d)) => Some(d),
            (None, None) => None,
        }
    }

    /// Pointer motion with a non-zero value, before the transform stages.
    pub(crate) fn on_motion(
        &mut self,
        now_ms: u64,
        settings: TempLayerSettings,
        keymap: &mut dyn KeymapHost,
    ) {
        self.last_input_ms = now_ms;
        self.dispatch(
            &TempLayerEvent::Motion {
                now_ms,
                settings,
                last_keypress_ms: self.last_keypress_ms,
            },
            keymap,
        );
    }

    /// End of the pipeline for one event; pushes the deactivation deadline
    /// out while motion keeps flowing.
    pub(crate) fn on_settled(
        &mut self,
        now_ms: u64,
        settings: TempLayerSettings,
        keymap: &mut dyn KeymapHost,
    ) {
        self.dispatch(&TempLayerEvent::Settled { now_ms, settings }, keymap);
    }

    /// Fires any deadline that has come due.
    pub(crate) fn run_due(
        &mut self,
        now_ms: u64,
        settings: TempLayerSettings,
        keymap: &mut dyn KeymapHost,
    ) {
        let inner = self.machine.inner();
        let activation_due = inner.activate_at.is_some_and(|at| now_ms >= at);
        let deactivation_due = inner.deactivate_at.is_some_and(|at| now_ms >= at);
        if activation_due {
            self.dispatch(&TempLayerEvent::ActivationDue { settings }, keymap);
        }
        if deactivation_due {
            self.dispatch(&TempLayerEvent::DeactivationDue, keymap);
        }
    }

    /// Foreign key activity resolved to a non-benign binding: drop the layer
    /// now.
    pub(crate) fn teardown(&mut self, keymap: &mut dyn KeymapHost) {
        self.dispatch(&TempLayerEvent::Teardown, keymap);
    }

    pub(crate) fn set_keep_active(&mut self, keep: bool, now_ms: u64) {
        log::debug!("temp-layer keep_active set to {keep}");
        let mut context = DispatchContext::default();
        self.machine
            .handle_with_context(&TempLayerEvent::KeepActive { keep, now_ms }, &mut context);
        debug_assert_eq!(context.len, 0);
    }

    /// Clears the input timestamps. Scheduled work is left untouched: a
    /// pending deactivation fires on its existing deadline and observes
    /// whatever state it finds then.
    pub(crate) fn reset(&mut self) {
        self.last_input_ms = 0;
        self.last_keypress_ms = 0;
    }

    fn dispatch(&mut self, event: &TempLayerEvent, keymap: &mut dyn KeymapHost) {
        let mut context = DispatchContext::default();
        self.machine.handle_with_context(event, &mut context);
        for action in context.iter() {
            match *action {
                LayerAction::Activate { layer } => match keymap.layer_activate(layer) {
                    Ok(()) => {
                        log::info!("temp-layer layer {layer} activated");
                        self.confirm(&TempLayerEvent::Activated);
                    }
                    Err(err) => {
                        log::error!("failed to activate temp-layer layer {layer}: {err}");
                        self.confirm(&TempLayerEvent::ActivationFailed);
                    }
                },
                LayerAction::Deactivate { layer } => match keymap.layer_deactivate(layer) {
                    Ok(()) => {
                        log::info!("temp-layer layer {layer} deactivated");
                        self.confirm(&TempLayerEvent::Deactivated);
                    }
                    Err(err) => {
                        log::error!("failed to deactivate temp-layer layer {layer}: {err}");
                        self.confirm(&TempLayerEvent::DeactivationFailed);
                    }
                },
            }
        }
    }

    fn confirm(&mut self, event: &TempLayerEvent) {
        let mut context = DispatchContext::default();
        self.machine.handle_with_context(event, &mut context);
        debug_assert_eq!(context.len, 0);
    }
}
