//! One pass of the onboard control loop.
//!
//! Each call to [`ControlLoop::tick`] runs, in order:
//!
//! 1. drain at most `max_input_bytes` from the serial port into the
//!    [`interpreter`][crate::interpreter],
//! 2. check the link watchdog (Manual → AutonomousPid on silence),
//! 3. poll every sensor on the bus,
//! 4. compute wheel speeds (PID avoidance or manual mix) and apply them,
//! 5. emit a telemetry frame if one is due.
//!
//! Nothing in a pass waits on input, and no single failure (sensor, motor or
//! port write) ends the pass.

use rover_types::{
    ControlMode, MotorCommand, PidTerms, SensorLayout, TelemetryFrame, telemetry::status_line,
};
use tracing::{debug, info, warn};

use crate::avoidance::{self, AvoidanceConfig, Assessment};
use crate::bus::{SensorArray, SensorBus};
use crate::interpreter::{self, ControlState, Dispatch};
use crate::motor::{self, MotorDriver, WheelSpeeds};
use crate::pid::{PidController, PidGains};
use crate::port::SerialPort;
use crate::telemetry::{self as schedule, TelemetryScheduler};
use crate::watchdog::{self, LinkHealth, LinkWatchdog};

/// PID time step used on the very first autonomous pass.
const FIRST_PASS_DT_S: f32 = 0.01;

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub layout: SensorLayout,
    pub avoidance: AvoidanceConfig,
    pub gains: PidGains,
    pub watchdog_timeout_ms: u64,
    pub telemetry_period_ms: u64,
    pub max_input_bytes: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            layout: SensorLayout::default(),
            avoidance: AvoidanceConfig::default(),
            gains: PidGains::default(),
            watchdog_timeout_ms: watchdog::DEFAULT_TIMEOUT_MS,
            telemetry_period_ms: schedule::DEFAULT_PERIOD_MS,
            max_input_bytes: 64,
        }
    }
}

/// What happened during one pass, for tests and the simulator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub commands: Vec<MotorCommand>,
    pub watchdog_reverted: bool,
    pub wheels: WheelSpeeds,
    pub telemetry: Option<TelemetryFrame>,
}

pub struct ControlLoop<B, M, P> {
    bus: B,
    motor: M,
    port: P,
    config: LoopConfig,
    state: ControlState,
    sensors: SensorArray,
    pid: PidController,
    watchdog: LinkWatchdog,
    scheduler: TelemetryScheduler,
    last_tick_ms: Option<u64>,
}

impl<B: SensorBus, M: MotorDriver, P: SerialPort> ControlLoop<B, M, P> {
    pub fn new(bus: B, motor: M, port: P, config: LoopConfig) -> Self {
        let sensors = SensorArray::new(config.layout.clone());
        let pid = PidController::new(config.gains);
        let watchdog = LinkWatchdog::new(config.watchdog_timeout_ms, 0);
        let scheduler = TelemetryScheduler::new(config.telemetry_period_ms);
        Self {
            bus,
            motor,
            port,
            config,
            state: ControlState::default(),
            sensors,
            pid,
            watchdog,
            scheduler,
            last_tick_ms: None,
        }
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    pub fn sensors(&self) -> &SensorArray {
        &self.sensors
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn motor(&self) -> &M {
        &self.motor
    }

    pub fn motor_mut(&mut self) -> &mut M {
        &mut self.motor
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    pub fn tick(&mut self, now_ms: u64) -> TickReport {
        let mut report = TickReport::default();
        if self.last_tick_ms.is_none() {
            self.watchdog = LinkWatchdog::new(self.config.watchdog_timeout_ms, now_ms);
        }

        self.drain_input(now_ms, &mut report);

        if self.state.mode == ControlMode::Manual
            && self.watchdog.health(now_ms) == LinkHealth::Stale
        {
            info!(
                silence_ms = self.watchdog.silence_ms(now_ms),
                "host silent, reverting to autonomous mode"
            );
            self.enter_autonomous();
            report.watchdog_reverted = true;
            self.send_line(&status_line("watchdog revert"));
        }

        for event in self.sensors.poll(&mut self.bus) {
            self.send_line(&status_line(&event.status_text()));
        }

        let assessment = avoidance::assess(
            &self.config.layout,
            self.sensors.ranging(),
            &self.config.avoidance,
        );
        let (forward, terms, wheels) = self.compute_wheels(&assessment, now_ms);
        if let Err(e) = self.motor.set_speeds(wheels) {
            warn!(error = %e, ?wheels, "motor driver rejected speeds");
        }
        report.wheels = wheels;

        if let Some(seq) = self.scheduler.poll(now_ms) {
            let frame = TelemetryFrame {
                seq,
                mode: self.state.mode,
                level: self.state.level,
                ranging: self.sensors.ranging().clone(),
                imbalance: assessment.imbalance(),
                pid: terms,
                forward,
                left: wheels.left,
                right: wheels.right,
            };
            self.send_line(&frame.encode());
            report.telemetry = Some(frame);
        }

        self.last_tick_ms = Some(now_ms);
        report
    }

    fn drain_input(&mut self, now_ms: u64, report: &mut TickReport) {
        for _ in 0..self.config.max_input_bytes {
            let Some(byte) = self.port.read_byte() else {
                break;
            };
            if let Dispatch::Applied {
                command,
                mode_change,
            } = interpreter::dispatch(&mut self.state, byte)
            {
                self.watchdog.heartbeat(now_ms);
                if mode_change == Some(ControlMode::AutonomousPid) {
                    self.pid.reset();
                }
                debug!(%command, mode = ?self.state.mode, "command applied");
                report.commands.push(command);
            }
        }
    }

    fn enter_autonomous(&mut self) {
        self.state.mode = ControlMode::AutonomousPid;
        self.state.motion = MotorCommand::Stop;
        self.pid.reset();
    }

    fn compute_wheels(&mut self, assessment: &Assessment, now_ms: u64) -> (i16, PidTerms, WheelSpeeds) {
        let base = motor::base_speed(self.state.level);
        match self.state.mode {
            ControlMode::Manual => {
                let wheels = motor::manual_mix(self.state.motion, base);
                let forward = (wheels.left + wheels.right) / 2;
                (forward, PidTerms::default(), wheels)
            }
            ControlMode::AutonomousPid => {
                let dt = match self.last_tick_ms {
                    Some(last) if now_ms > last => (now_ms - last) as f32 / 1000.0,
                    _ => FIRST_PASS_DT_S,
                };
                let terms = self.pid.update(assessment.imbalance(), dt);
                let forward = f32::from(base)
                    * avoidance::forward_scale(assessment.front_min_mm, &self.config.avoidance);
                let wheels = avoidance::mix(forward, terms.output, base);
                (forward.round() as i16, terms, wheels)
            }
        }
    }

    fn send_line(&mut self, line: &str) {
        if let Err(e) = self.port.write_line(line) {
            debug!(error = %e, "serial write failed, continuing");
        }
    }
}
