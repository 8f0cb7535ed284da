//! Single-byte command dispatch.
//!
//! The loop's mutable state (mode, speed level, last motion) lives in one
//! owned [`ControlState`] that the loop passes to [`dispatch`] for every
//! received byte.

use rover_types::{ControlMode, MotorCommand, SpeedLevel};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlState {
    pub mode: ControlMode,
    pub level: SpeedLevel,
    /// Last motion command. Always one of the motion variants.
    pub motion: MotorCommand,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            mode: ControlMode::AutonomousPid,
            level: SpeedLevel::default(),
            motion: MotorCommand::Stop,
        }
    }
}

/// What a single byte did to the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Applied {
        command: MotorCommand,
        /// Set when the command moved the controller to another mode.
        mode_change: Option<ControlMode>,
    },
    /// Line-end or space.
    Whitespace,
    Unrecognised(u8),
}

pub fn dispatch(state: &mut ControlState, byte: u8) -> Dispatch {
    if matches!(byte, b'\r' | b'\n' | b' ') {
        return Dispatch::Whitespace;
    }
    let Some(command) = MotorCommand::from_byte(byte) else {
        debug!(byte, "ignoring unrecognised command byte");
        return Dispatch::Unrecognised(byte);
    };

    let before = state.mode;
    match command {
        MotorCommand::ToggleAutoMode => state.mode = state.mode.toggled(),
        MotorCommand::SetBaseSpeed(level) => state.level = level,
        motion => {
            state.motion = motion;
            state.mode = ControlMode::Manual;
        }
    }
    let mode_change = (state.mode != before).then_some(state.mode);
    Dispatch::Applied {
        command,
        mode_change,
    }
}
