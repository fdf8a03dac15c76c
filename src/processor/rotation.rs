//! 2D rotation over paired axis events.
//!
//! The pipeline sees X and Y deltas as separate events, so the stage pairs
//! each event with the most recent value of the opposite axis and emits the
//! rotated component only once the pair is complete; the unpaired event
//! emits zero. Downstream consumes X-then-Y (or Y-then-X) report sequences,
//! so motion vectors survive at the cost of one event of latency after the
//! angle changes.

use crate::trig::{cos_milli, sin_milli};

#[derive(Clone, Copy, Debug)]
pub(crate) struct RotationState {
    cos_milli: i32,
    sin_milli: i32,
    last_x: i16,
    last_y: i16,
    has_x: bool,
    has_y: bool,
}

impl RotationState {
    pub(crate) fn new(rotation_degrees: i32) -> Self {
        let mut state = Self {
            cos_milli: 1000,
            sin_milli: 0,
            last_x: 0,
            last_y: 0,
            has_x: false,
            has_y: false,
        };
        state.set_angle(rotation_degrees);
        state
    }

    /// Refreshes the precomputed terms. Zero skips the table lookup.
    pub(crate) fn set_angle(&mut self, rotation_degrees: i32) {
        if rotation_degrees == 0 {
            self.cos_milli = 1000;
            self.sin_milli = 0;
            return;
        }
        self.cos_milli = cos_milli(rotation_degrees);
        self.sin_milli = sin_milli(rotation_degrees);
        log::debug!(
            "rotation {} degrees: cos={}, sin={}",
            rotation_degrees,
            self.cos_milli,
            self.sin_milli
        );
    }

    /// Feeds one axis event through the stage and returns the value to emit.
    pub(crate) fn apply(&mut self, is_x: bool, value: i16) -> i16 {
        if is_x {
            self.last_x = value;
            self.has_x = true;
            if self.has_y {
                self.has_y = false;
                rotated_x(self.last_x, self.last_y, self.cos_milli, self.sin_milli)
            } else {
                0
            }
        } else {
            self.last_y = value;
            self.has_y = true;
            if self.has_x {
                self.has_x = false;
                rotated_y(self.last_x, self.last_y, self.cos_milli, self.sin_milli)
            } else {
                0
            }
        }
    }
}

fn rotated_x(x: i16, y: i16, cos_milli: i32, sin_milli: i32) -> i16 {
    let rotated = (i32::from(x) * cos_milli - i32::from(y) * sin_milli) / 1000;
    rotated as i16
}

fn rotated_y(x: i16, y: i16, cos_milli: i32, sin_milli: i32) -> i16 {
    let rotated = (i32::from(x) * sin_milli + i32::from(y) * cos_milli) / 1000;
    rotated as i16
}
