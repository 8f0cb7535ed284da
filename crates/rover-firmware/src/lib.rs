//! `rover-firmware` – the onboard control loop.
//!
//! Everything in this crate runs on a single thread with no allocation-heavy
//! work in the hot path:
//!
//! - [`bus`] – [`SensorBus`][bus::SensorBus] (multiplexed ranging bus) and
//!   [`SensorArray`][bus::SensorArray], which turns one poll into a
//!   [`RangingVector`][rover_types::RangingVector].
//! - [`avoidance`] – obstacle pressure, forward scaling and wheel mixing.
//! - [`pid`] – the PID law that regulates the left/right imbalance.
//! - [`motor`] – [`MotorDriver`][motor::MotorDriver] and manual mixing.
//! - [`interpreter`] – single-byte command dispatch on an owned
//!   [`ControlState`][interpreter::ControlState].
//! - [`watchdog`] – reverts Manual to AutonomousPid when the host goes quiet.
//! - [`telemetry`] – the fixed-cadence frame scheduler.
//! - [`port`] – the controller's end of the serial link.
//! - [`control_loop`] – one pass of the loop, wired from the pieces above.
//! - [`sim`] – simulated room, scripted bus, recording motor and buffer port.

pub mod avoidance;
pub mod bus;
pub mod control_loop;
pub mod interpreter;
pub mod motor;
pub mod pid;
pub mod port;
pub mod sim;
pub mod telemetry;
pub mod watchdog;

pub use control_loop::{ControlLoop, LoopConfig, TickReport};
pub use interpreter::ControlState;
