//! Axis snapping: lock motion to a primary axis until enough cross-axis
//! motion accumulates inside the decay window.

use crate::config::AXIS_SNAP_DECAY_PERIOD_MS;
use crate::types::AxisSnapMode;

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct SnapState {
    cross_axis_accum: i32,
    last_decay_ms: u64,
}

impl SnapState {
    pub(crate) fn reset(&mut self) {
        self.cross_axis_accum = 0;
        self.last_decay_ms = 0;
    }

    #[cfg(test)]
    pub(crate) fn accum(&self) -> i32 {
        self.cross_axis_accum
    }

    /// Runs the stage over one event value, zeroing it while the cross axis
    /// is locked. No-op for `AxisSnapMode::None` and for zero values.
    pub(crate) fn apply(
        &mut self,
        mode: AxisSnapMode,
        threshold: u16,
        timeout_ms: u16,
        is_x: bool,
        value: &mut i16,
        now_ms: u64,
    ) {
        if mode == AxisSnapMode::None || *value == 0 {
            return;
        }

        let is_primary_axis = match mode {
            AxisSnapMode::SnapX => is_x,
            AxisSnapMode::SnapY => !is_x,
            AxisSnapMode::None => return,
        };

        self.decay(threshold, timeout_ms, now_ms);

        if is_primary_axis {
            return;
        }

        let threshold = i32::from(threshold);
        if self.cross_axis_accum.abs() >= threshold {
            // Already unsnapped: grow the magnitude, keep the sign.
            let grown = self.cross_axis_accum.abs() + i32::from(value.unsigned_abs());
            self.cross_axis_accum = if self.cross_axis_accum < 0 { -grown } else { grown };
        } else {
            self.cross_axis_accum += i32::from(*value);
        }
        self.last_decay_ms = now_ms;

        if self.cross_axis_accum.abs() >= threshold {
            // Cap at twice the threshold so an idle lock reacquires within
            // one timeout.
            if self.cross_axis_accum.abs() > threshold * 2 {
                self.cross_axis_accum = self.cross_axis_accum.signum() * threshold * 2;
            }
            log::debug!(
                "axis snap: unlocked (threshold={threshold}, accum={})",
                self.cross_axis_accum
            );
        } else {
            log::debug!(
                "axis snap: suppressing cross-axis movement (accum={}, threshold={threshold})",
                self.cross_axis_accum
            );
            *value = 0;
        }
    }

    fn decay(&mut self, threshold: u16, timeout_ms: u16, now_ms: u64) {
        if timeout_ms == 0 || self.last_decay_ms == 0 {
            return;
        }
        let elapsed = now_ms.saturating_sub(self.last_decay_ms);
        let periods = elapsed / AXIS_SNAP_DECAY_PERIOD_MS;
        if periods == 0 {
            return;
        }

        let periods_per_timeout =
            (u64::from(timeout_ms) / AXIS_SNAP_DECAY_PERIOD_MS).max(1);
        let decay_per_period = (u64::from(threshold) / periods_per_timeout).max(1);
        let total_decay = (decay_per_period * periods).min(i32::MAX as u64) as i32;

        if self.cross_axis_accum > 0 {
            self.cross_axis_accum = (self.cross_axis_accum - total_decay).max(0);
        } else {
            self.cross_axis_accum = (self.cross_axis_accum + total_decay).min(0);
        }
        self.last_decay_ms = now_ms;
        log::debug!(
            "axis snap: decayed accum to {} (decay={total_decay})",
            self.cross_axis_accum
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: u16 = 100;
    const TIMEOUT_MS: u16 = 1_000;

    fn apply_y(state: &mut SnapState, value: i16, now_ms: u64) -> i16 {
        let mut v = value;
        state.apply(AxisSnapMode::SnapX, THRESHOLD, TIMEOUT_MS, false, &mut v, now_ms);
        v
    }

    #[test]
    fn cross_axis_locked_until_threshold() {
        let mut state = SnapState::default();
        let mut now = 0;
        for _ in 0..9 {
            assert_eq!(apply_y(&mut state, 10, now), 0);
            now += 10;
        }
        // The tenth event reaches the threshold and passes through.
        assert_eq!(apply_y(&mut state, 10, now), 10);
        assert_eq!(state.accum(), 100);
        // Once unsnapped, further cross-axis motion keeps flowing.
        assert_eq!(apply_y(&mut state, 10, now + 10), 10);
        assert_eq!(state.accum(), 110);
    }

    #[test]
    fn primary_axis_always_passes() {
        let mut state = SnapState::default();
        let mut v = 12i16;
        state.apply(AxisSnapMode::SnapX, THRESHOLD, TIMEOUT_MS, true, &mut v, 0);
        assert_eq!(v, 12);
        assert_eq!(state.accum(), 0);
    }

    #[test]
    fn opposite_signs_cancel_while_locked() {
        let mut state = SnapState::default();
        assert_eq!(apply_y(&mut state, 60, 0), 0);
        assert_eq!(apply_y(&mut state, -60, 10), 0);
        assert_eq!(state.accum(), 0);
    }

    #[test]
    fn unsnapped_growth_keeps_sign() {
        let mut state = SnapState::default();
        assert_eq!(apply_y(&mut state, -120, 0), -120);
        assert_eq!(state.accum(), -120);
        // Opposite-direction motion still grows the magnitude while free.
        assert_eq!(apply_y(&mut state, 30, 10), 30);
        assert_eq!(state.accum(), -150);
    }

    #[test]
    fn accumulator_caps_at_twice_threshold() {
        let mut state = SnapState::default();
        assert_eq!(apply_y(&mut state, 500, 0), 500);
        assert_eq!(state.accum(), 200);
    }

    #[test]
    fn lock_reacquired_after_decay() {
        let mut state = SnapState::default();
        assert_eq!(apply_y(&mut state, 150, 40), 150);
        assert_eq!(state.accum(), 150);
        // One full timeout of idleness decays the accumulator back under the
        // threshold: 20 periods x 5/period = 100.
        assert_eq!(apply_y(&mut state, 10, 1_040), 0);
        assert_eq!(state.accum(), 60);
    }

    #[test]
    fn short_timeout_decays_at_least_one_per_period() {
        let mut state = SnapState::default();
        let mut v = 10i16;
        // timeout shorter than one decay period must not divide by zero.
        state.apply(AxisSnapMode::SnapX, 4, 40, false, &mut v, 10);
        assert_eq!(state.accum(), 8);
        let mut v = 0i16;
        // Zero value skips the stage entirely.
        state.apply(AxisSnapMode::SnapX, 4, 40, false, &mut v, 100);
        assert_eq!(state.accum(), 8);
        let mut v = 1i16;
        state.apply(AxisSnapMode::SnapX, 4, 40, false, &mut v, 110);
        assert!(state.accum() < 8);
    }

    #[test]
    fn zero_timeout_never_decays() {
        let mut state = SnapState::default();
        let mut v = 50i16;
        state.apply(AxisSnapMode::SnapX, THRESHOLD, 0, false, &mut v, 0);
        let mut v = 10i16;
        state.apply(AxisSnapMode::SnapX, THRESHOLD, 0, false, &mut v, 10_000);
        assert_eq!(state.accum(), 60);
    }

    #[test]
    fn reset_clears_runtime_state() {
        let mut state = SnapState::default();
        let _ = apply_y(&mut state, 150, 0);
        state.reset();
        assert_eq!(state.accum(), 0);
        assert_eq!(apply_y(&mut state, 10, 1_000), 0);
        assert_eq!(state.accum(), 10);
    }
}
