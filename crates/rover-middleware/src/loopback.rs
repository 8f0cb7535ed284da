//! In-process link to a simulated controller.
//!
//! [`loopback_pair`] creates a duplex byte pipe: the host holds a
//! [`LoopbackLink`] (a [`SerialLink`]), the controller side holds a
//! [`DeviceEnd`] (a firmware [`SerialPort`]). [`SimulatedDevice`] runs a
//! complete [`ControlLoop`] over a [`SimRoom`] on its own thread, so
//! `rover run --sim` and the integration tests exercise the same code path
//! as real hardware.
//!
//! A [`LinkFault`] handle severs and restores the pipe to inject link
//! failures.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rover_firmware::port::SerialPort;
use rover_firmware::sim::{RoomConfig, SimDrive, SimRangeBus, SimRoom};
use rover_firmware::{ControlLoop, LoopConfig};
use rover_types::{MotorCommand, RoverError};
use tracing::{debug, info, warn};

use crate::link::{LineAssembler, SerialLink};

/// Severs or restores a loopback pipe.
#[derive(Debug, Clone, Default)]
pub struct LinkFault {
    severed: Arc<AtomicBool>,
}

impl LinkFault {
    pub fn sever(&self) {
        self.severed.store(true, Ordering::SeqCst);
    }

    pub fn restore(&self) {
        self.severed.store(false, Ordering::SeqCst);
    }

    pub fn is_severed(&self) -> bool {
        self.severed.load(Ordering::SeqCst)
    }
}

pub struct LoopbackLink {
    to_device: Sender<u8>,
    from_device: Receiver<Vec<u8>>,
    assembler: LineAssembler,
    fault: LinkFault,
    closed: bool,
}

pub struct DeviceEnd {
    from_host: Receiver<u8>,
    to_host: Sender<Vec<u8>>,
    fault: LinkFault,
}

pub fn loopback_pair() -> (LoopbackLink, DeviceEnd, LinkFault) {
    let (host_tx, device_rx) = mpsc::channel();
    let (device_tx, host_rx) = mpsc::channel();
    let fault = LinkFault::default();
    let link = LoopbackLink {
        to_device: host_tx,
        from_device: host_rx,
        assembler: LineAssembler::default(),
        fault: fault.clone(),
        closed: false,
    };
    let device = DeviceEnd {
        from_host: device_rx,
        to_host: device_tx,
        fault: fault.clone(),
    };
    (link, device, fault)
}

impl SerialLink for LoopbackLink {
    fn send(&mut self, command: MotorCommand) -> Result<(), RoverError> {
        if self.closed {
            return Err(RoverError::LinkIo("loopback closed".into()));
        }
        if self.fault.is_severed() {
            return Err(RoverError::LinkIo("loopback severed".into()));
        }
        self.to_device
            .send(command.to_byte())
            .map_err(|_| RoverError::LinkIo("simulated device has exited".into()))
    }

    fn poll_line(&mut self) -> Result<Option<String>, RoverError> {
        if self.closed || self.fault.is_severed() {
            return Ok(None);
        }
        loop {
            match self.from_device.try_recv() {
                Ok(chunk) => self.assembler.push(&chunk),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if let Some(line) = self.assembler.next_line() {
                        return Ok(Some(line));
                    }
                    return Err(RoverError::LinkIo("simulated device has exited".into()));
                }
            }
        }
        Ok(self.assembler.next_line())
    }

    fn reconnect(&mut self) -> Result<(), RoverError> {
        if self.fault.is_severed() {
            return Err(RoverError::LinkIo("loopback severed".into()));
        }
        self.assembler.clear();
        self.closed = false;
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn describe(&self) -> String {
        "loopback".to_string()
    }
}

impl SerialPort for DeviceEnd {
    fn read_byte(&mut self) -> Option<u8> {
        if self.fault.is_severed() {
            return None;
        }
        self.from_host.try_recv().ok()
    }

    fn write_line(&mut self, line: &str) -> Result<(), RoverError> {
        if self.fault.is_severed() {
            return Err(RoverError::LinkIo("loopback severed".into()));
        }
        self.to_host
            .send(line.as_bytes().to_vec())
            .map_err(|_| RoverError::LinkIo("host end dropped".into()))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated device thread
// ────────────────────────────────────────────────────────────────────────────

/// A [`ControlLoop`] driving a [`SimRoom`] on a background thread.
pub struct SimulatedDevice {
    room: SimRoom,
    fault: LinkFault,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SimulatedDevice {
    /// Start the device thread, ticking every `tick`, and return the host end
    /// of its link.
    pub fn spawn(
        room_config: RoomConfig,
        loop_config: LoopConfig,
        tick: Duration,
    ) -> Result<(Self, LoopbackLink), RoverError> {
        let room = SimRoom::new(room_config);
        let (link, device_end, fault) = loopback_pair();
        let stop = Arc::new(AtomicBool::new(false));

        let mut control: ControlLoop<SimRangeBus, SimDrive, DeviceEnd> =
            ControlLoop::new(room.sensors(), room.drive(), device_end, loop_config);
        let thread_room = room.clone();
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("rover-sim-device".into())
            .spawn(move || {
                let started = Instant::now();
                let mut last_ms = 0u64;
                while !thread_stop.load(Ordering::Relaxed) {
                    let now_ms = started.elapsed().as_millis() as u64;
                    let report = control.tick(now_ms);
                    if report.watchdog_reverted {
                        debug!("simulated controller reverted to autonomous mode");
                    }
                    thread_room.advance(now_ms.saturating_sub(last_ms));
                    last_ms = now_ms;
                    thread::sleep(tick);
                }
                debug!("simulated device stopped");
            })
            .map_err(|e| RoverError::LinkIo(format!("spawn simulated device: {e}")))?;

        info!(tick_ms = tick.as_millis() as u64, "simulated device running");
        Ok((
            Self {
                room,
                fault,
                stop,
                handle: Some(handle),
            },
            link,
        ))
    }

    pub fn room(&self) -> &SimRoom {
        &self.room
    }

    pub fn fault(&self) -> &LinkFault {
        &self.fault
    }

    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("simulated device thread panicked");
            }
        }
    }
}

impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_types::{ControlMode, Inbound};

    #[test]
    fn bytes_cross_the_pipe_in_both_directions() {
        let (mut link, mut device, _fault) = loopback_pair();
        link.send(MotorCommand::Forward).unwrap();
        assert_eq!(device.read_byte(), Some(b'w'));
        assert_eq!(device.read_byte(), None);

        device.write_line("!hello\n").unwrap();
        assert_eq!(link.poll_line().unwrap().as_deref(), Some("!hello"));
        assert_eq!(link.poll_line().unwrap(), None);
    }

    #[test]
    fn severed_pipe_fails_writes_until_restored() {
        let (mut link, mut device, fault) = loopback_pair();
        fault.sever();
        assert!(link.send(MotorCommand::Stop).is_err());
        assert!(device.write_line("!x\n").is_err());
        assert!(link.reconnect().is_err());

        fault.restore();
        link.reconnect().unwrap();
        link.send(MotorCommand::Stop).unwrap();
        assert_eq!(device.read_byte(), Some(b'x'));
    }

    #[test]
    fn closed_link_rejects_sends() {
        let (mut link, _device, _fault) = loopback_pair();
        link.close();
        assert!(link.send(MotorCommand::Stop).is_err());
        link.reconnect().unwrap();
        assert!(link.send(MotorCommand::Stop).is_ok());
    }

    #[test]
    fn simulated_device_streams_telemetry_and_obeys_commands() {
        let (mut device, mut link) = SimulatedDevice::spawn(
            RoomConfig::default(),
            LoopConfig::default(),
            Duration::from_millis(5),
        )
        .unwrap();

        link.send(MotorCommand::Forward).unwrap();
        let deadline = Instant::now() + Duration::from_secs(3);
        let mut manual_seen = false;
        while Instant::now() < deadline && !manual_seen {
            match link.poll_line().unwrap() {
                Some(line) => {
                    if let Ok(Inbound::Telemetry(frame)) = Inbound::parse(&line) {
                        manual_seen = frame.mode == ControlMode::Manual;
                    }
                }
                None => thread::sleep(Duration::from_millis(5)),
            }
        }
        assert!(manual_seen, "no Manual-mode telemetry within 3 s");
        device.shutdown();
    }
}
