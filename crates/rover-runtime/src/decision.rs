//! Turning decider output into something the orchestrator can act on.
//!
//! The decider is a generative model, so its reply is untrusted text.
//! [`parse_reply`] is the only way in: it either yields a validated
//! [`DecisionReply`] or a [`RoverError::MalformedDirective`], never a
//! half-understood action.
//!
//! [`route_transcript`] decides whether a spoken request needs a fresh look
//! at the surroundings before deciding.

use std::fmt;
use std::time::Duration;

use rover_memory::{Directive, Exchange};
use rover_types::{ActionName, DecisionReply, PerceptionBundle, RoverError, SpeedLevel};
use serde_json::Value;

/// Longest move or turn a single decision may ask for.
pub const MAX_HOLD: Duration = Duration::from_secs(10);

// ─────────────────────────────────────────────────────────────────────────────
// Triggers and requests
// ─────────────────────────────────────────────────────────────────────────────

/// Why a decision cycle started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// The periodic cycle timer fired.
    Periodic,
    /// The companion heard the wake word.
    Wake,
    /// The companion transcribed an utterance.
    Transcript(String),
    /// The controller stopped itself in front of an obstacle.
    ObstacleHalt,
    /// The decider asked for another look.
    Requested,
}

impl Trigger {
    /// Compact form kept in the directive history.
    pub fn summary(&self) -> String {
        match self {
            Self::Periodic => "periodic survey".to_string(),
            Self::Wake => "wake word".to_string(),
            Self::Transcript(text) => format!("heard \"{text}\""),
            Self::ObstacleHalt => "obstacle halt".to_string(),
            Self::Requested => "survey requested".to_string(),
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Everything the decider gets to see for one decision.
#[derive(Debug, Clone)]
pub struct DecisionRequest {
    pub goal: String,
    /// Oldest first.
    pub history: Vec<Exchange>,
    pub trigger: Trigger,
    pub perception: PerceptionBundle,
    /// Latest raw telemetry line, if the controller has reported.
    pub telemetry: Option<String>,
}

impl DecisionRequest {
    pub fn new(
        directive: &Directive,
        trigger: Trigger,
        perception: PerceptionBundle,
        telemetry: Option<String>,
    ) -> Self {
        Self {
            goal: directive.goal().to_string(),
            history: directive.history().cloned().collect(),
            trigger,
            perception,
            telemetry,
        }
    }

    /// The user-turn message for this decision.
    pub fn prompt(&self) -> String {
        let mut prompt = match &self.trigger {
            Trigger::Transcript(text) => {
                format!("A voice addressing you has said \"{text}\". How do you respond?")
            }
            Trigger::Wake => "Someone just called your name.".to_string(),
            Trigger::ObstacleHalt => {
                "Your obstacle sensors stopped you and you backed away.".to_string()
            }
            Trigger::Periodic | Trigger::Requested => {
                "You have surveyed your surroundings.".to_string()
            }
        };
        if !self.perception.is_empty() {
            prompt.push(' ');
            prompt.push_str(&self.perception.describe());
        }
        prompt.push_str(&format!(
            " What should you do next, keeping in mind your current directive is '{}'?",
            self.goal
        ));
        if let Some(line) = &self.telemetry {
            prompt.push_str(&format!("\nLatest controller telemetry: {line}"));
        }
        prompt
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reply parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Parse and validate the decider's raw reply.
///
/// The JSON object may be wrapped in prose or a Markdown code fence; the
/// outermost `{ … }` span is taken.
///
/// # Errors
///
/// [`RoverError::MalformedDirective`] when there is no JSON object, the
/// `action` is missing or not one of the known names, `set_speed` lacks a
/// level in 0–9, or a hold exceeds [`MAX_HOLD`].
pub fn parse_reply(raw: &str) -> Result<DecisionReply, RoverError> {
    let body = extract_object(raw)
        .ok_or_else(|| RoverError::MalformedDirective(format!("no JSON object in {raw:?}")))?;
    let value: Value = serde_json::from_str(body)
        .map_err(|e| RoverError::MalformedDirective(format!("invalid JSON: {e}")))?;

    match value.get("action") {
        None | Some(Value::Null) => {
            return Err(RoverError::MalformedDirective("missing action".into()));
        }
        Some(Value::String(name)) => {
            if serde_json::from_value::<ActionName>(Value::String(name.clone())).is_err() {
                return Err(RoverError::MalformedDirective(format!(
                    "unknown action {name:?}"
                )));
            }
        }
        Some(other) => {
            return Err(RoverError::MalformedDirective(format!(
                "action must be a string, got {other}"
            )));
        }
    }

    let reply: DecisionReply = serde_json::from_value(value)
        .map_err(|e| RoverError::MalformedDirective(format!("bad fields: {e}")))?;
    validate(&reply)?;
    Ok(reply)
}

fn validate(reply: &DecisionReply) -> Result<(), RoverError> {
    if reply.action == ActionName::SetSpeed {
        match reply.params.level {
            Some(level) if SpeedLevel::new(level).is_some() => {}
            Some(level) => {
                return Err(RoverError::MalformedDirective(format!(
                    "speed level {level} out of range 0-9"
                )));
            }
            None => {
                return Err(RoverError::MalformedDirective(
                    "set_speed without a level".into(),
                ));
            }
        }
    }
    if let Some(ms) = reply.params.duration_ms {
        if ms > MAX_HOLD.as_millis() as u64 {
            return Err(RoverError::MalformedDirective(format!(
                "duration {ms} ms exceeds {} ms",
                MAX_HOLD.as_millis()
            )));
        }
    }
    Ok(())
}

fn extract_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

/// One-line description of an action, e.g. `move_forward 1000ms`.
pub fn describe_action(reply: &DecisionReply) -> String {
    let name = reply.action.as_str();
    match (reply.action, reply.params.duration_ms, reply.params.level) {
        (ActionName::SetSpeed, _, Some(level)) => format!("{name} {level}"),
        (
            ActionName::MoveForward
            | ActionName::MoveBackward
            | ActionName::TurnLeft
            | ActionName::TurnRight,
            Some(ms),
            _,
        ) => format!("{name} {ms}ms"),
        _ => name.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transcript routing
// ─────────────────────────────────────────────────────────────────────────────

/// Where a transcript goes after Idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// The request depends on the surroundings: look first.
    Survey,
    /// A question, chit-chat or a new goal: decide straight away.
    Decide,
}

const ENVIRONMENT_WORDS: &[&str] = &[
    "look", "see", "find", "search", "explore", "go", "move", "drive", "come", "follow", "turn",
    "around", "forward", "backward", "left", "right", "where", "front", "behind", "room",
];

/// Route a transcript: [`Route::Survey`] iff any word is an environment
/// keyword (case-insensitive, whole words only).
///
/// ```
/// use rover_runtime::decision::{route_transcript, Route};
///
/// assert_eq!(route_transcript("Come here, please"), Route::Survey);
/// assert_eq!(route_transcript("what is your name?"), Route::Decide);
/// ```
pub fn route_transcript(text: &str) -> Route {
    let lower = text.to_lowercase();
    let mentions_surroundings = lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| ENVIRONMENT_WORDS.contains(&word));
    if mentions_surroundings {
        Route::Survey
    } else {
        Route::Decide
    }
}
