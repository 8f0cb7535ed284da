//! PID law used by the avoidance loop.
//!
//! The controller drives a measured value toward a set-point and reports each
//! of its terms so they can be published in telemetry. In this crate the
//! measurement is the left/right obstacle imbalance and the set-point is
//! zero, but nothing here depends on that.
//!
//! # Example
//!
//! ```rust
//! use rover_firmware::pid::{PidController, PidGains};
//!
//! let mut pid = PidController::new(PidGains::default());
//! let terms = pid.update(-0.5, 0.1); // imbalance toward the left
//! assert!(terms.output > 0.0); // steer right, away from it
//! ```

use rover_types::PidTerms;

/// Proportional, integral and derivative gains.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 1.0,
            ki: 0.1,
            kd: 0.05,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PidController {
    gains: PidGains,
    set_point: f32,
    integral: f32,
    last_error: Option<f32>,
    output_min: f32,
    output_max: f32,
    last_terms: PidTerms,
}

impl PidController {
    /// A controller with set-point 0 and output limited to `[-1, 1]`.
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            set_point: 0.0,
            integral: 0.0,
            last_error: None,
            output_min: -1.0,
            output_max: 1.0,
            last_terms: PidTerms::default(),
        }
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    pub fn set_gains(&mut self, gains: PidGains) {
        self.gains = gains;
    }

    pub fn set_set_point(&mut self, set_point: f32) {
        self.set_point = set_point;
    }

    /// Clamp the output, and the integral contribution, to `[min, max]`.
    pub fn set_output_limits(&mut self, min: f32, max: f32) {
        self.output_min = min;
        self.output_max = max;
    }

    /// Terms of the most recent [`update`][Self::update], zero after a reset.
    pub fn last_terms(&self) -> PidTerms {
        self.last_terms
    }

    /// Advance the controller by `dt` seconds.
    ///
    /// A non-positive `dt` leaves the state untouched and returns zero terms.
    pub fn update(&mut self, measurement: f32, dt: f32) -> PidTerms {
        if dt <= 0.0 {
            return PidTerms::default();
        }
        let PidGains { kp, ki, kd } = self.gains;
        let error = self.set_point - measurement;

        let p = kp * error;

        self.integral += error * dt;
        let i = (ki * self.integral).clamp(self.output_min, self.output_max);
        // Back-calculation keeps the accumulator inside the clamped range.
        if ki.abs() > f32::EPSILON {
            self.integral = i / ki;
        }

        let d = match self.last_error {
            Some(prev) => kd * (error - prev) / dt,
            None => 0.0,
        };
        self.last_error = Some(error);

        let output = (p + i + d).clamp(self.output_min, self.output_max);
        self.last_terms = PidTerms { p, i, d, output };
        self.last_terms
    }

    /// Forget the integral and derivative history.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = None;
        self.last_terms = PidTerms::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gains(kp: f32, ki: f32, kd: f32) -> PidGains {
        PidGains { kp, ki, kd }
    }

    #[test]
    fn proportional_term_tracks_error() {
        let mut pid = PidController::new(gains(0.5, 0.0, 0.0));
        let terms = pid.update(-1.0, 0.1);
        assert!((terms.p - 0.5).abs() < 1e-6);
        assert!((terms.output - 0.5).abs() < 1e-6);
    }

    #[test]
    fn output_saturates_at_limits() {
        let mut pid = PidController::new(gains(10.0, 0.0, 0.0));
        assert!((pid.update(-1.0, 0.1).output - 1.0).abs() < 1e-6);
        assert!((pid.update(1.0, 0.1).output + 1.0).abs() < 1e-6);
    }

    #[test]
    fn integral_is_clamped_by_back_calculation() {
        let mut pid = PidController::new(gains(0.0, 1.0, 0.0));
        for _ in 0..100 {
            pid.update(-1.0, 0.5);
        }
        // Wound up to the limit; a single opposite step must pull it back.
        let terms = pid.update(1.0, 0.5);
        assert!(terms.i < 1.0);
    }

    #[test]
    fn derivative_needs_a_previous_sample() {
        let mut pid = PidController::new(gains(0.0, 0.0, 1.0));
        assert_eq!(pid.update(-0.2, 0.1).d, 0.0);
        let d = pid.update(-0.4, 0.1).d;
        assert!((d - 2.0).abs() < 1e-4);
    }

    #[test]
    fn reset_matches_a_fresh_controller() {
        let mut pid = PidController::new(PidGains::default());
        pid.update(-0.7, 0.1);
        pid.update(-0.3, 0.1);
        pid.reset();
        assert_eq!(pid.last_terms(), PidTerms::default());

        let mut fresh = PidController::new(PidGains::default());
        assert_eq!(pid.update(-0.5, 0.1), fresh.update(-0.5, 0.1));
    }

    #[test]
    fn non_positive_dt_is_a_no_op() {
        let mut pid = PidController::new(PidGains::default());
        assert_eq!(pid.update(-1.0, 0.0), PidTerms::default());
        let mut fresh = PidController::new(PidGains::default());
        assert_eq!(pid.update(-1.0, 0.1), fresh.update(-1.0, 0.1));
    }
}
