use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod telemetry;

pub use telemetry::{Inbound, PidTerms, TelemetryFrame};

/// Reading written for a channel that produced no echo, was out of range, or
/// failed to read this pass.
pub const RANGE_SENTINEL_MM: u16 = 8190;

/// Upper bound on the number of sensors a frame may carry.
pub const MAX_SENSORS: usize = 16;

// ────────────────────────────────────────────────────────────────────────────
// Sensors
// ────────────────────────────────────────────────────────────────────────────

/// One distance reading per sensor position, in millimetres.
///
/// The length is fixed when the vector is created. Fresh readings replace
/// stale ones in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangingVector {
    readings: Vec<u16>,
}

impl RangingVector {
    /// A vector of `len` readings, all set to [`RANGE_SENTINEL_MM`].
    pub fn new(len: usize) -> Self {
        Self {
            readings: vec![RANGE_SENTINEL_MM; len],
        }
    }

    pub fn from_readings(readings: Vec<u16>) -> Self {
        Self { readings }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn get(&self, channel: usize) -> Option<u16> {
        self.readings.get(channel).copied()
    }

    /// Overwrite the reading for `channel`. Returns `false` (and changes
    /// nothing) when the channel is out of range.
    pub fn set(&mut self, channel: usize, mm: u16) -> bool {
        match self.readings.get_mut(channel) {
            Some(slot) => {
                *slot = mm;
                true
            }
            None => false,
        }
    }

    pub fn mark_sentinel(&mut self, channel: usize) -> bool {
        self.set(channel, RANGE_SENTINEL_MM)
    }

    pub fn is_sentinel(&self, channel: usize) -> bool {
        self.get(channel) == Some(RANGE_SENTINEL_MM)
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.readings
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.readings.iter().copied()
    }
}

/// Mounting bearings of the sensor array, in degrees.
///
/// Negative bearings face left, `0` straight ahead, positive bearings face
/// right. Sensors beyond ±90° are not forward-facing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorLayout {
    pub bearings_deg: Vec<f32>,
}

impl SensorLayout {
    pub fn new(bearings_deg: Vec<f32>) -> Self {
        Self { bearings_deg }
    }

    pub fn len(&self) -> usize {
        self.bearings_deg.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bearings_deg.is_empty()
    }

    pub fn bearing(&self, channel: usize) -> Option<f32> {
        self.bearings_deg.get(channel).copied()
    }
}

impl Default for SensorLayout {
    fn default() -> Self {
        Self::new(vec![-90.0, -45.0, 0.0, 45.0, 90.0])
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Motor commands
// ────────────────────────────────────────────────────────────────────────────

/// Base speed level: `0` is the fastest, `9` the slowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SpeedLevel(u8);

impl SpeedLevel {
    pub const FASTEST: Self = Self(0);
    pub const SLOWEST: Self = Self(9);

    pub fn new(level: u8) -> Option<Self> {
        (level <= 9).then_some(Self(level))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Parse an ASCII digit byte (`b'0'..=b'9'`).
    pub fn from_digit(byte: u8) -> Option<Self> {
        byte.is_ascii_digit().then(|| Self(byte - b'0'))
    }

    pub fn as_digit(self) -> u8 {
        b'0' + self.0
    }
}

impl Default for SpeedLevel {
    fn default() -> Self {
        Self(5)
    }
}

impl TryFrom<u8> for SpeedLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("speed level {value} is outside 0-9"))
    }
}

impl From<SpeedLevel> for u8 {
    fn from(level: SpeedLevel) -> Self {
        level.0
    }
}

impl fmt::Display for SpeedLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single-character command on the serial link. The most recently issued
/// command supersedes the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MotorCommand {
    Forward,
    Backward,
    TurnLeft,
    TurnRight,
    Stop,
    SetBaseSpeed(SpeedLevel),
    ToggleAutoMode,
}

impl MotorCommand {
    /// Wire byte sent to the controller.
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Forward => b'w',
            Self::Backward => b's',
            Self::TurnLeft => b'a',
            Self::TurnRight => b'd',
            Self::Stop => b'x',
            Self::ToggleAutoMode => b'p',
            Self::SetBaseSpeed(level) => level.as_digit(),
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'w' => Some(Self::Forward),
            b's' => Some(Self::Backward),
            b'a' => Some(Self::TurnLeft),
            b'd' => Some(Self::TurnRight),
            b'x' => Some(Self::Stop),
            b'p' => Some(Self::ToggleAutoMode),
            other => SpeedLevel::from_digit(other).map(Self::SetBaseSpeed),
        }
    }

    /// Commands that set wheel motion directly.
    pub fn is_motion(self) -> bool {
        matches!(
            self,
            Self::Forward | Self::Backward | Self::TurnLeft | Self::TurnRight | Self::Stop
        )
    }
}

impl fmt::Display for MotorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forward => f.write_str("forward"),
            Self::Backward => f.write_str("backward"),
            Self::TurnLeft => f.write_str("turn-left"),
            Self::TurnRight => f.write_str("turn-right"),
            Self::Stop => f.write_str("stop"),
            Self::SetBaseSpeed(level) => write!(f, "speed {level}"),
            Self::ToggleAutoMode => f.write_str("toggle-auto"),
        }
    }
}

/// Whether wheel speeds come from host commands or from the PID avoidance law.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlMode {
    Manual,
    AutonomousPid,
}

impl ControlMode {
    /// Single-letter flag used in telemetry lines.
    pub fn as_flag(self) -> char {
        match self {
            Self::Manual => 'M',
            Self::AutonomousPid => 'A',
        }
    }

    pub fn from_flag(flag: &str) -> Option<Self> {
        match flag {
            "M" => Some(Self::Manual),
            "A" => Some(Self::AutonomousPid),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Manual => Self::AutonomousPid,
            Self::AutonomousPid => Self::Manual,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Mailbox signals
// ────────────────────────────────────────────────────────────────────────────

/// The kinds of message exchanged with the speech-capture process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    /// Companion heard the wake word.
    WakeDetected,
    /// Companion finished transcribing an utterance.
    TranscriptReady,
    /// Host acknowledged a wake and is now listening.
    Ack,
    /// Host asked a question and wants the next utterance captured.
    ListenRequest,
}

impl SignalKind {
    pub const ALL: [SignalKind; 4] = [
        SignalKind::WakeDetected,
        SignalKind::TranscriptReady,
        SignalKind::Ack,
        SignalKind::ListenRequest,
    ];

    /// File name of the marker for this kind inside the mailbox directory.
    pub fn marker_name(self) -> &'static str {
        match self {
            Self::WakeDetected => "wake_detected.flag",
            Self::TranscriptReady => "transcript_ready.txt",
            Self::Ack => "ack.flag",
            Self::ListenRequest => "listen_request.flag",
        }
    }

    pub fn carries_payload(self) -> bool {
        matches!(self, Self::TranscriptReady)
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WakeDetected => "WakeDetected",
            Self::TranscriptReady => "TranscriptReady",
            Self::Ack => "Ack",
            Self::ListenRequest => "ListenRequest",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalMessage {
    WakeDetected,
    TranscriptReady(String),
    Ack,
    ListenRequest,
}

impl SignalMessage {
    pub fn kind(&self) -> SignalKind {
        match self {
            Self::WakeDetected => SignalKind::WakeDetected,
            Self::TranscriptReady(_) => SignalKind::TranscriptReady,
            Self::Ack => SignalKind::Ack,
            Self::ListenRequest => SignalKind::ListenRequest,
        }
    }

    /// Marker content. Presence-only kinds have an empty payload.
    pub fn payload(&self) -> &str {
        match self {
            Self::TranscriptReady(text) => text,
            _ => "",
        }
    }

    /// Rebuild a message from a consumed marker. The payload of presence-only
    /// kinds is discarded.
    pub fn from_payload(kind: SignalKind, payload: String) -> Self {
        match kind {
            SignalKind::WakeDetected => Self::WakeDetected,
            SignalKind::TranscriptReady => Self::TranscriptReady(payload),
            SignalKind::Ack => Self::Ack,
            SignalKind::ListenRequest => Self::ListenRequest,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Orchestration
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RobotState {
    Idle,
    Surveying,
    Deciding,
    Acting,
    Speaking,
    ErrorRecovery,
    ShuttingDown,
}

impl fmt::Display for RobotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Directions captured during a survey, in capture order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Front,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 3] = [Direction::Front, Direction::Left, Direction::Right];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Front => "front",
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

/// Result of one directional capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Observation {
    Seen(String),
    /// Placeholder substituted when the capture failed or timed out.
    Unavailable(String),
}

impl Observation {
    pub fn describe(&self) -> String {
        match self {
            Self::Seen(text) => text.clone(),
            Self::Unavailable(reason) => format!("no data ({reason})"),
        }
    }
}

/// Directional observations collected in one survey. Empty when the cycle
/// skipped surveying.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerceptionBundle {
    pub observations: Vec<(Direction, Observation)>,
}

impl PerceptionBundle {
    pub fn record(&mut self, direction: Direction, observation: Observation) {
        self.observations.retain(|(d, _)| *d != direction);
        self.observations.push((direction, observation));
    }

    pub fn get(&self, direction: Direction) -> Option<&Observation> {
        self.observations
            .iter()
            .find(|(d, _)| *d == direction)
            .map(|(_, o)| o)
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// One sentence per direction, suitable for a prompt.
    pub fn describe(&self) -> String {
        if self.observations.is_empty() {
            return "No survey was taken this cycle.".to_string();
        }
        self.observations
            .iter()
            .map(|(d, o)| format!("To my {}: {}.", d.as_str(), o.describe()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Closed set of actions the decision collaborator may choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActionName {
    MoveForward,
    MoveBackward,
    TurnLeft,
    TurnRight,
    Stop,
    /// Hand control back to the onboard obstacle-avoidance loop.
    Explore,
    Survey,
    SetSpeed,
    /// Ask the speech-capture process for the user's answer.
    Listen,
    Wait,
}

impl ActionName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MoveForward => "move_forward",
            Self::MoveBackward => "move_backward",
            Self::TurnLeft => "turn_left",
            Self::TurnRight => "turn_right",
            Self::Stop => "stop",
            Self::Explore => "explore",
            Self::Survey => "survey",
            Self::SetSpeed => "set_speed",
            Self::Listen => "listen",
            Self::Wait => "wait",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ActionParams {
    /// How long to hold a move or turn, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Speed level for `set_speed`, 0 (fastest) to 9 (slowest).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
}

/// Structured reply expected from the decision collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DecisionReply {
    pub action: ActionName,
    #[serde(default)]
    pub params: ActionParams,
    /// Private reasoning, logged but never spoken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub think: Option<String>,
    /// Text to say out loud after acting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speak: Option<String>,
    /// Replacement goal, when the user asked for something new.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directive: Option<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Event bus
// ────────────────────────────────────────────────────────────────────────────

/// Unified event wrapper for the in-process event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "rover-runtime::orchestrator"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Telemetry(TelemetryFrame),
    /// A `!`-prefixed status line from the controller.
    DeviceStatus(String),
    StateChanged { from: RobotState, to: RobotState },
    Fault { kind: String, message: String },
    Decision { summary: String },
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RoverError {
    #[error("Sensor read fault on channel {channel}: {details}")]
    SensorReadFault { channel: u8, details: String },

    #[error("Motor driver fault: {0}")]
    MotorFault(String),

    #[error("Serial link I/O fault: {0}")]
    LinkIo(String),

    #[error("Malformed telemetry line: {0}")]
    MalformedTelemetry(String),

    #[error("{collaborator} timed out after {timeout_ms} ms")]
    CollaboratorTimeout { collaborator: String, timeout_ms: u64 },

    #[error("{collaborator} failed: {details}")]
    Collaborator { collaborator: String, details: String },

    #[error("Malformed directive: {0}")]
    MalformedDirective(String),

    #[error("Unreadable {kind} payload: {details}")]
    MailboxCorruption { kind: SignalKind, details: String },

    #[error("Mailbox I/O error: {0}")]
    Mailbox(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cancelled by shutdown request")]
    Cancelled,

    #[error("Operational halt in {state}: {details}")]
    OperationalHalt { state: RobotState, details: String },
}

impl RoverError {
    /// Stable short label for logs and fault events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SensorReadFault { .. } => "sensor_read_fault",
            Self::MotorFault(_) => "motor_fault",
            Self::LinkIo(_) => "link_io",
            Self::MalformedTelemetry(_) => "malformed_telemetry",
            Self::CollaboratorTimeout { .. } => "collaborator_timeout",
            Self::Collaborator { .. } => "collaborator",
            Self::MalformedDirective(_) => "malformed_directive",
            Self::MailboxCorruption { .. } => "mailbox_corruption",
            Self::Mailbox(_) => "mailbox",
            Self::Storage(_) => "storage",
            Self::Config(_) => "config",
            Self::Cancelled => "cancelled",
            Self::OperationalHalt { .. } => "operational_halt",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motor_command_bytes_follow_wire_table() {
        let table = [
            (b'w', MotorCommand::Forward),
            (b's', MotorCommand::Backward),
            (b'a', MotorCommand::TurnLeft),
            (b'd', MotorCommand::TurnRight),
            (b'x', MotorCommand::Stop),
            (b'p', MotorCommand::ToggleAutoMode),
        ];
        for (byte, cmd) in table {
            assert_eq!(MotorCommand::from_byte(byte), Some(cmd));
            assert_eq!(cmd.to_byte(), byte);
        }
        assert_eq!(
            MotorCommand::from_byte(b'7'),
            Some(MotorCommand::SetBaseSpeed(SpeedLevel::new(7).unwrap()))
        );
        assert_eq!(MotorCommand::from_byte(b'q'), None);
        assert_eq!(MotorCommand::from_byte(b'W'), None);
    }

    #[test]
    fn speed_level_rejects_out_of_range() {
        assert!(SpeedLevel::new(10).is_none());
        assert_eq!(SpeedLevel::default().get(), 5);
        assert!(serde_json::from_str::<SpeedLevel>("12").is_err());
        let level: SpeedLevel = serde_json::from_str("3").unwrap();
        assert_eq!(level.get(), 3);
    }

    #[test]
    fn ranging_vector_never_changes_length() {
        let mut v = RangingVector::new(4);
        assert!(v.set(2, 120));
        assert!(!v.set(4, 120));
        assert_eq!(v.len(), 4);
        assert_eq!(v.get(2), Some(120));
        assert!(v.mark_sentinel(2));
        assert!(v.is_sentinel(2));
    }

    #[test]
    fn control_mode_toggle_is_an_involution() {
        for mode in [ControlMode::Manual, ControlMode::AutonomousPid] {
            assert_ne!(mode.toggled(), mode);
            assert_eq!(mode.toggled().toggled(), mode);
        }
    }

    #[test]
    fn signal_markers_are_distinct() {
        let mut names: Vec<_> = SignalKind::ALL.iter().map(|k| k.marker_name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), SignalKind::ALL.len());
    }

    #[test]
    fn presence_only_signals_drop_payload() {
        let msg = SignalMessage::from_payload(SignalKind::Ack, "junk".into());
        assert_eq!(msg, SignalMessage::Ack);
        assert_eq!(msg.payload(), "");
        let msg = SignalMessage::from_payload(SignalKind::TranscriptReady, "hello".into());
        assert_eq!(msg.payload(), "hello");
    }

    #[test]
    fn decision_reply_uses_snake_case_action_names() {
        let reply: DecisionReply =
            serde_json::from_str(r#"{"action":"turn_left","params":{"duration_ms":800}}"#)
                .unwrap();
        assert_eq!(reply.action, ActionName::TurnLeft);
        assert_eq!(reply.params.duration_ms, Some(800));
        assert!(serde_json::from_str::<DecisionReply>(r#"{"action":"dance"}"#).is_err());
        assert_eq!(ActionName::SetSpeed.as_str(), "set_speed");
    }

    #[test]
    fn perception_bundle_describes_each_direction() {
        let mut bundle = PerceptionBundle::default();
        assert!(bundle.describe().contains("No survey"));
        bundle.record(Direction::Front, Observation::Seen("a couch".into()));
        bundle.record(Direction::Left, Observation::Unavailable("timeout".into()));
        let text = bundle.describe();
        assert!(text.contains("front: a couch"));
        assert!(text.contains("left: no data (timeout)"));
    }

    #[test]
    fn error_kind_labels_are_stable() {
        assert_eq!(RoverError::LinkIo("x".into()).kind(), "link_io");
        assert_eq!(RoverError::Cancelled.kind(), "cancelled");
        let err = RoverError::OperationalHalt {
            state: RobotState::ErrorRecovery,
            details: "stop undeliverable".into(),
        };
        assert!(err.to_string().contains("ErrorRecovery"));
    }
}
