//! Ranging sensors behind a shared multiplexed bus.
//!
//! A [`SensorBus`] exposes one sensor at a time: the caller selects a channel
//! on the multiplexer, then performs a single range read. [`SensorArray`]
//! walks every channel once per pass. A channel that fails to select or read
//! is written as [`RANGE_SENTINEL_MM`] for this pass and the loop moves on to
//! the next channel.

use rover_types::{RANGE_SENTINEL_MM, RangingVector, RoverError, SensorLayout};
use tracing::{debug, warn};

/// A multiplexed bus of distance sensors.
///
/// Each call is expected to complete within one bus-transaction timeout and
/// return an error rather than block past it.
pub trait SensorBus: Send {
    /// Route the bus to `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::SensorReadFault`] when the multiplexer does not
    /// acknowledge.
    fn select(&mut self, channel: u8) -> Result<(), RoverError>;

    /// Read the distance seen by the selected sensor, in millimetres.
    fn read_range(&mut self) -> Result<u16, RoverError>;
}

/// A change in a channel's fault status seen during [`SensorArray::poll`].
#[derive(Debug, Clone, PartialEq)]
pub enum SensorEvent {
    Faulted { channel: u8, error: RoverError },
    Recovered { channel: u8 },
}

impl SensorEvent {
    /// Status text emitted on the serial link for this event.
    pub fn status_text(&self) -> String {
        match self {
            Self::Faulted { channel, .. } => format!("fault sensor {channel}"),
            Self::Recovered { channel } => format!("recovered sensor {channel}"),
        }
    }
}

/// The array of ranging sensors and its latest readings.
#[derive(Debug, Clone)]
pub struct SensorArray {
    layout: SensorLayout,
    ranging: RangingVector,
    faulted: Vec<bool>,
}

impl SensorArray {
    pub fn new(layout: SensorLayout) -> Self {
        let n = layout.len();
        Self {
            layout,
            ranging: RangingVector::new(n),
            faulted: vec![false; n],
        }
    }

    pub fn layout(&self) -> &SensorLayout {
        &self.layout
    }

    pub fn ranging(&self) -> &RangingVector {
        &self.ranging
    }

    pub fn is_faulted(&self, channel: usize) -> bool {
        self.faulted.get(channel).copied().unwrap_or(false)
    }

    /// Read every channel once, replacing readings in place.
    ///
    /// Returns only the fault transitions of this pass, so a channel that
    /// stays broken is reported once.
    pub fn poll<B: SensorBus + ?Sized>(&mut self, bus: &mut B) -> Vec<SensorEvent> {
        let mut events = Vec::new();
        for index in 0..self.ranging.len() {
            let channel = index as u8;
            let result = bus.select(channel).and_then(|()| bus.read_range());
            match result {
                Ok(mm) => {
                    self.ranging.set(index, mm.min(RANGE_SENTINEL_MM));
                    if self.faulted[index] {
                        self.faulted[index] = false;
                        debug!(channel, "sensor recovered");
                        events.push(SensorEvent::Recovered { channel });
                    }
                }
                Err(error) => {
                    self.ranging.mark_sentinel(index);
                    if !self.faulted[index] {
                        self.faulted[index] = true;
                        warn!(channel, error = %error, "sensor read failed, using sentinel");
                        events.push(SensorEvent::Faulted { channel, error });
                    }
                }
            }
        }
        events
    }
}
