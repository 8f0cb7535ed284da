//! Differential-drive motor output.
//!
//! Drivers implement [`MotorDriver`]; the control loop only ever talks to the
//! trait, so a real H-bridge, the simulated room and the recording test
//! double are interchangeable.

use rover_types::{MotorCommand, RoverError, SpeedLevel};

/// Largest wheel speed a driver accepts, in PWM duty units.
pub const MAX_WHEEL_SPEED: i16 = 255;

/// Signed left/right wheel speeds. Positive drives the wheel forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WheelSpeeds {
    pub left: i16,
    pub right: i16,
}

impl WheelSpeeds {
    pub const STOP: Self = Self { left: 0, right: 0 };

    pub fn new(left: i16, right: i16) -> Self {
        Self { left, right }
    }

    /// Saturate both wheels to `±limit`.
    pub fn saturate(self, limit: i16) -> Self {
        let limit = limit.abs();
        Self {
            left: self.left.clamp(-limit, limit),
            right: self.right.clamp(-limit, limit),
        }
    }
}

pub trait MotorDriver: Send {
    /// Apply wheel speeds. The new speeds replace the previous ones at once.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::MotorFault`] when the output stage rejects
    /// the command.
    fn set_speeds(&mut self, speeds: WheelSpeeds) -> Result<(), RoverError>;

    /// Speeds most recently applied.
    fn speeds(&self) -> WheelSpeeds;
}

/// Base wheel speed for a speed level: `255 · (10 − L) / 10`.
pub fn base_speed(level: SpeedLevel) -> i16 {
    MAX_WHEEL_SPEED * (10 - i16::from(level.get())) / 10
}

/// Wheel speeds for a motion command in Manual mode.
///
/// Non-motion commands map to a stop.
pub fn manual_mix(motion: MotorCommand, base: i16) -> WheelSpeeds {
    let half = base / 2;
    match motion {
        MotorCommand::Forward => WheelSpeeds::new(base, base),
        MotorCommand::Backward => WheelSpeeds::new(-base, -base),
        MotorCommand::TurnLeft => WheelSpeeds::new(-half, half),
        MotorCommand::TurnRight => WheelSpeeds::new(half, -half),
        _ => WheelSpeeds::STOP,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(l: u8) -> SpeedLevel {
        SpeedLevel::new(l).unwrap()
    }

    #[test]
    fn level_zero_is_fastest() {
        assert_eq!(base_speed(level(0)), 255);
        assert_eq!(base_speed(level(5)), 127);
        assert_eq!(base_speed(level(9)), 25);
    }

    #[test]
    fn manual_turns_spin_in_place_at_half_speed() {
        assert_eq!(
            manual_mix(MotorCommand::TurnLeft, 200),
            WheelSpeeds::new(-100, 100)
        );
        assert_eq!(
            manual_mix(MotorCommand::TurnRight, 200),
            WheelSpeeds::new(100, -100)
        );
        assert_eq!(manual_mix(MotorCommand::Stop, 200), WheelSpeeds::STOP);
        assert_eq!(
            manual_mix(MotorCommand::Backward, 200),
            WheelSpeeds::new(-200, -200)
        );
    }

    #[test]
    fn saturate_clamps_both_wheels() {
        let s = WheelSpeeds::new(300, -300).saturate(127);
        assert_eq!(s, WheelSpeeds::new(127, -127));
    }
}
