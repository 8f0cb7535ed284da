//! Simulated hardware for running the control loop without a robot.
//!
//! - [`SimRoom`] – a square room (plus optional round obstacles) that
//!   ray-casts the sensor array and integrates differential-drive motion.
//!   Hand out its [`SimRangeBus`] and [`SimDrive`] to a
//!   [`ControlLoop`][crate::ControlLoop] and call [`SimRoom::advance`] from
//!   the driving thread.
//! - [`ScriptedBus`] – fixed readings with per-channel fault injection.
//! - [`RecordingMotor`] – records every applied speed pair.
//! - [`BufferPort`] – an in-memory serial port.
//!
//! # Example
//!
//! ```rust
//! use rover_firmware::sim::{BufferPort, RoomConfig, SimRoom};
//! use rover_firmware::{ControlLoop, LoopConfig};
//!
//! let room = SimRoom::new(RoomConfig::default());
//! let mut lp = ControlLoop::new(
//!     room.sensors(),
//!     room.drive(),
//!     BufferPort::default(),
//!     LoopConfig::default(),
//! );
//! for t in (0..1000).step_by(10) {
//!     lp.tick(t);
//!     room.advance(10);
//! }
//! assert!(room.pose().x_mm > RoomConfig::default().size_mm / 2.0);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use rover_types::{RANGE_SENTINEL_MM, RoverError, SensorLayout};

use crate::bus::SensorBus;
use crate::motor::{MotorDriver, WheelSpeeds};
use crate::port::SerialPort;

// ────────────────────────────────────────────────────────────────────────────
// Simulated room
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub x_mm: f32,
    pub y_mm: f32,
    /// Counter-clockwise from the +x axis.
    pub heading_rad: f32,
}

#[derive(Debug, Clone)]
pub struct RoomConfig {
    pub size_mm: f32,
    pub max_range_mm: f32,
    /// Distance between the wheels.
    pub track_mm: f32,
    /// Ground speed of one wheel-speed unit, in mm/s.
    pub mm_per_unit_s: f32,
    pub robot_radius_mm: f32,
    pub layout: SensorLayout,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            size_mm: 3000.0,
            max_range_mm: 2000.0,
            track_mm: 150.0,
            mm_per_unit_s: 1.0,
            robot_radius_mm: 100.0,
            layout: SensorLayout::default(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Obstacle {
    x_mm: f32,
    y_mm: f32,
    radius_mm: f32,
}

#[derive(Debug)]
struct RoomState {
    config: RoomConfig,
    pose: Pose,
    wheels: WheelSpeeds,
    obstacles: Vec<Obstacle>,
    selected: Option<u8>,
}

impl RoomState {
    fn range_along(&self, angle: f32) -> f32 {
        let Pose { x_mm: x, y_mm: y, .. } = self.pose;
        let (dx, dy) = (angle.cos(), angle.sin());
        let size = self.config.size_mm;

        let mut t = f32::INFINITY;
        if dx > f32::EPSILON {
            t = t.min((size - x) / dx);
        } else if dx < -f32::EPSILON {
            t = t.min(-x / dx);
        }
        if dy > f32::EPSILON {
            t = t.min((size - y) / dy);
        } else if dy < -f32::EPSILON {
            t = t.min(-y / dy);
        }

        for ob in &self.obstacles {
            let (ox, oy) = (ob.x_mm - x, ob.y_mm - y);
            let along = ox * dx + oy * dy;
            if along <= 0.0 {
                continue;
            }
            let perp_sq = ox * ox + oy * oy - along * along;
            let r_sq = ob.radius_mm * ob.radius_mm;
            if perp_sq > r_sq {
                continue;
            }
            let hit = along - (r_sq - perp_sq).sqrt();
            if hit >= 0.0 {
                t = t.min(hit);
            }
        }
        t.max(0.0)
    }

    fn advance(&mut self, dt_ms: u64) {
        let dt = dt_ms as f32 / 1000.0;
        let scale = self.config.mm_per_unit_s;
        let left = f32::from(self.wheels.left) * scale;
        let right = f32::from(self.wheels.right) * scale;
        let v = (left + right) / 2.0;
        let omega = (right - left) / self.config.track_mm;

        self.pose.heading_rad += omega * dt;
        let margin = self.config.robot_radius_mm;
        let limit = self.config.size_mm - margin;
        self.pose.x_mm = (self.pose.x_mm + v * dt * self.pose.heading_rad.cos()).clamp(margin, limit);
        self.pose.y_mm = (self.pose.y_mm + v * dt * self.pose.heading_rad.sin()).clamp(margin, limit);
    }
}

/// Shared handle to the simulated world.
#[derive(Debug, Clone)]
pub struct SimRoom {
    inner: Arc<Mutex<RoomState>>,
}

impl SimRoom {
    /// A room with the robot in the centre facing +x.
    pub fn new(config: RoomConfig) -> Self {
        let centre = config.size_mm / 2.0;
        Self {
            inner: Arc::new(Mutex::new(RoomState {
                config,
                pose: Pose {
                    x_mm: centre,
                    y_mm: centre,
                    heading_rad: 0.0,
                },
                wheels: WheelSpeeds::STOP,
                obstacles: Vec::new(),
                selected: None,
            })),
        }
    }

    pub fn with_obstacle(self, x_mm: f32, y_mm: f32, radius_mm: f32) -> Self {
        self.lock().obstacles.push(Obstacle {
            x_mm,
            y_mm,
            radius_mm,
        });
        self
    }

    fn lock(&self) -> MutexGuard<'_, RoomState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn pose(&self) -> Pose {
        self.lock().pose
    }

    pub fn set_pose(&self, pose: Pose) {
        self.lock().pose = pose;
    }

    pub fn wheels(&self) -> WheelSpeeds {
        self.lock().wheels
    }

    /// Integrate the current wheel speeds over `dt_ms`.
    pub fn advance(&self, dt_ms: u64) {
        self.lock().advance(dt_ms);
    }

    pub fn sensors(&self) -> SimRangeBus {
        SimRangeBus { room: self.clone() }
    }

    pub fn drive(&self) -> SimDrive {
        SimDrive { room: self.clone() }
    }
}

/// Sensor bus view of a [`SimRoom`].
#[derive(Debug, Clone)]
pub struct SimRangeBus {
    room: SimRoom,
}

impl SensorBus for SimRangeBus {
    fn select(&mut self, channel: u8) -> Result<(), RoverError> {
        let mut state = self.room.lock();
        if usize::from(channel) >= state.config.layout.len() {
            return Err(RoverError::SensorReadFault {
                channel,
                details: "no sensor on this channel".into(),
            });
        }
        state.selected = Some(channel);
        Ok(())
    }

    fn read_range(&mut self) -> Result<u16, RoverError> {
        let state = self.room.lock();
        let channel = state.selected.ok_or_else(|| RoverError::SensorReadFault {
            channel: u8::MAX,
            details: "read without select".into(),
        })?;
        let bearing = state
            .config
            .layout
            .bearing(usize::from(channel))
            .unwrap_or_default();
        // Positive bearings look right, i.e. clockwise.
        let angle = state.pose.heading_rad - bearing.to_radians();
        let range = state.range_along(angle);
        if range > state.config.max_range_mm {
            Ok(RANGE_SENTINEL_MM)
        } else {
            Ok(range.round() as u16)
        }
    }
}

/// Motor view of a [`SimRoom`].
#[derive(Debug, Clone)]
pub struct SimDrive {
    room: SimRoom,
}

impl MotorDriver for SimDrive {
    fn set_speeds(&mut self, speeds: WheelSpeeds) -> Result<(), RoverError> {
        self.room.lock().wheels = speeds;
        Ok(())
    }

    fn speeds(&self) -> WheelSpeeds {
        self.room.wheels()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Scripted bus
// ────────────────────────────────────────────────────────────────────────────

/// Returns programmed readings; selected channels can be made to fail.
#[derive(Debug, Clone, Default)]
pub struct ScriptedBus {
    readings: Vec<u16>,
    failing: Vec<u8>,
    selected: Option<u8>,
}

impl ScriptedBus {
    pub fn new(readings: Vec<u16>) -> Self {
        Self {
            readings,
            failing: Vec::new(),
            selected: None,
        }
    }

    pub fn set_readings(&mut self, readings: Vec<u16>) {
        self.readings = readings;
    }

    pub fn fail_channel(&mut self, channel: u8) {
        if !self.failing.contains(&channel) {
            self.failing.push(channel);
        }
    }

    pub fn heal_channel(&mut self, channel: u8) {
        self.failing.retain(|c| *c != channel);
    }
}

impl SensorBus for ScriptedBus {
    fn select(&mut self, channel: u8) -> Result<(), RoverError> {
        if self.failing.contains(&channel) {
            self.selected = None;
            return Err(RoverError::SensorReadFault {
                channel,
                details: "bus transaction timed out".into(),
            });
        }
        self.selected = Some(channel);
        Ok(())
    }

    fn read_range(&mut self) -> Result<u16, RoverError> {
        let channel = self.selected.ok_or_else(|| RoverError::SensorReadFault {
            channel: u8::MAX,
            details: "read without select".into(),
        })?;
        self.readings
            .get(usize::from(channel))
            .copied()
            .ok_or_else(|| RoverError::SensorReadFault {
                channel,
                details: "no reading scripted".into(),
            })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Recording motor
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct RecordingMotor {
    current: WheelSpeeds,
    history: Vec<WheelSpeeds>,
    failing: bool,
}

impl RecordingMotor {
    pub fn history(&self) -> &[WheelSpeeds] {
        &self.history
    }

    /// Make every subsequent `set_speeds` fail (or succeed again).
    pub fn fail_always(&mut self, failing: bool) {
        self.failing = failing;
    }
}

impl MotorDriver for RecordingMotor {
    fn set_speeds(&mut self, speeds: WheelSpeeds) -> Result<(), RoverError> {
        if self.failing {
            return Err(RoverError::MotorFault("driver not responding".into()));
        }
        self.current = speeds;
        self.history.push(speeds);
        Ok(())
    }

    fn speeds(&self) -> WheelSpeeds {
        self.current
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Buffer port
// ────────────────────────────────────────────────────────────────────────────

/// In-memory serial port: tests push input bytes and collect output lines.
#[derive(Debug, Clone, Default)]
pub struct BufferPort {
    input: VecDeque<u8>,
    output: Vec<String>,
    severed: bool,
}

impl BufferPort {
    pub fn push_input(&mut self, bytes: &[u8]) {
        self.input.extend(bytes.iter().copied());
    }

    /// Drain every line written so far.
    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    /// Simulate a disconnected cable: reads return nothing, writes fail.
    pub fn sever(&mut self) {
        self.severed = true;
    }

    pub fn restore(&mut self) {
        self.severed = false;
    }
}

impl SerialPort for BufferPort {
    fn read_byte(&mut self) -> Option<u8> {
        if self.severed {
            return None;
        }
        self.input.pop_front()
    }

    fn write_line(&mut self, line: &str) -> Result<(), RoverError> {
        if self.severed {
            return Err(RoverError::LinkIo("port disconnected".into()));
        }
        self.output.push(line.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ControlLoop, LoopConfig};
    use rover_types::MotorCommand;

    #[test]
    fn ray_cast_hits_the_nearest_wall() {
        let room = SimRoom::new(RoomConfig::default());
        let mut bus = room.sensors();
        // Channel 2 faces straight ahead: 1500 mm to the +x wall.
        bus.select(2).unwrap();
        assert_eq!(bus.read_range().unwrap(), 1500);
    }

    #[test]
    fn far_walls_read_as_sentinel() {
        let config = RoomConfig {
            max_range_mm: 1000.0,
            ..RoomConfig::default()
        };
        let room = SimRoom::new(config);
        let mut bus = room.sensors();
        bus.select(2).unwrap();
        assert_eq!(bus.read_range().unwrap(), RANGE_SENTINEL_MM);
    }

    #[test]
    fn obstacle_shadows_the_wall() {
        let room = SimRoom::new(RoomConfig::default()).with_obstacle(1800.0, 1500.0, 100.0);
        let mut bus = room.sensors();
        bus.select(2).unwrap();
        assert_eq!(bus.read_range().unwrap(), 200);
    }

    #[test]
    fn right_wheel_faster_turns_left() {
        let room = SimRoom::new(RoomConfig::default());
        let mut drive = room.drive();
        drive.set_speeds(WheelSpeeds::new(-50, 50)).unwrap();
        room.advance(100);
        assert!(room.pose().heading_rad > 0.0);
    }

    #[test]
    fn autonomous_robot_keeps_clear_of_an_obstacle_ahead() {
        let room = SimRoom::new(RoomConfig::default()).with_obstacle(2200.0, 1500.0, 150.0);
        let mut lp = ControlLoop::new(
            room.sensors(),
            room.drive(),
            BufferPort::default(),
            LoopConfig::default(),
        );
        let mut closest = f32::MAX;
        for t in (0..20_000).step_by(20) {
            lp.tick(t);
            room.advance(20);
            let pose = room.pose();
            closest = closest.min((pose.x_mm - 2200.0).hypot(pose.y_mm - 1500.0));
        }
        assert!(closest > 150.0, "robot centre reached the obstacle: {closest}");
        assert_eq!(lp.state().mode, rover_types::ControlMode::AutonomousPid);
    }

    #[test]
    fn buffer_port_roundtrips_commands() {
        let mut port = BufferPort::default();
        port.push_input(&[MotorCommand::Forward.to_byte()]);
        assert_eq!(port.read_byte(), Some(b'w'));
        assert_eq!(port.read_byte(), None);
        port.write_line("!x\n").unwrap();
        assert_eq!(port.take_output(), vec!["!x\n".to_string()]);
    }
}
