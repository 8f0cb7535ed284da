//! The external services the orchestrator leans on: vision, decision and
//! speech.
//!
//! Each is a narrow async trait so the state machine can be driven by test
//! doubles. Timeouts are applied by the orchestrator, not here; adapters
//! that spawn processes set `kill_on_drop` so an abandoned call does not
//! leave a child running.

use async_trait::async_trait;
use rover_types::{ActionName, Direction, RoverError};
use tokio::process::Command;
use tracing::{debug, info};

use crate::decision::DecisionRequest;
use crate::llm_driver::{ChatMessage, LlmDriver, Role};

#[async_trait]
pub trait Vision: Send + Sync {
    /// Describe what the camera sees in `direction`.
    async fn capture(&self, direction: Direction) -> Result<String, RoverError>;
}

#[async_trait]
pub trait Decider: Send + Sync {
    /// Return the raw reply text; parsing is the caller's job.
    async fn decide(&self, request: &DecisionRequest) -> Result<String, RoverError>;
}

#[async_trait]
pub trait Speaker: Send + Sync {
    async fn speak(&self, text: &str) -> Result<(), RoverError>;
}

/// The three collaborators handed to the orchestrator.
pub struct Collaborators {
    pub vision: Box<dyn Vision>,
    pub decider: Box<dyn Decider>,
    pub speaker: Box<dyn Speaker>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Process-backed adapters
// ─────────────────────────────────────────────────────────────────────────────

/// A program plus leading arguments, parsed from a config string such as
/// `"python3 vision.py --model moondream"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    /// `None` for a blank string.
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(Self {
            program,
            args: words.collect(),
        })
    }

    /// Run with `last` appended and return trimmed stdout.
    async fn run(&self, collaborator: &str, last: &str) -> Result<String, RoverError> {
        let fail = |details: String| RoverError::Collaborator {
            collaborator: collaborator.to_string(),
            details,
        };
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(last)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| fail(format!("spawn {}: {e}", self.program)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(fail(format!("{} exited with {}: {}", self.program, output.status, stderr.trim())));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Runs `<command> <direction>` and takes stdout as the description.
pub struct ProcessVision {
    command: CommandLine,
}

impl ProcessVision {
    pub fn new(command: CommandLine) -> Self {
        Self { command }
    }
}

#[async_trait]
impl Vision for ProcessVision {
    async fn capture(&self, direction: Direction) -> Result<String, RoverError> {
        let text = self.command.run("vision", direction.as_str()).await?;
        if text.is_empty() {
            return Err(RoverError::Collaborator {
                collaborator: "vision".into(),
                details: "empty description".into(),
            });
        }
        debug!(direction = direction.as_str(), chars = text.len(), "captured");
        Ok(text)
    }
}

/// Used when no camera is configured: every capture fails, so surveys carry
/// placeholders.
pub struct NoVision;

#[async_trait]
impl Vision for NoVision {
    async fn capture(&self, _direction: Direction) -> Result<String, RoverError> {
        Err(RoverError::Collaborator {
            collaborator: "vision".into(),
            details: "no camera configured".into(),
        })
    }
}

/// Runs `<command> <text>`.
pub struct ProcessSpeaker {
    command: CommandLine,
}

impl ProcessSpeaker {
    pub fn new(command: CommandLine) -> Self {
        Self { command }
    }
}

#[async_trait]
impl Speaker for ProcessSpeaker {
    async fn speak(&self, text: &str) -> Result<(), RoverError> {
        self.command.run("speaker", text).await.map(|_| ())
    }
}

/// Speech sink that only logs; for headless runs.
pub struct LogSpeaker;

#[async_trait]
impl Speaker for LogSpeaker {
    async fn speak(&self, text: &str) -> Result<(), RoverError> {
        info!(%text, "say");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM decider
// ─────────────────────────────────────────────────────────────────────────────

pub const DEFAULT_PERSONA: &str =
    "You are the brain of a small, cheerful wheeled robot. You speak briefly and only use periods and exclamation points.";

/// Asks a chat model for the next action.
///
/// The conversation sent is: system prompt (persona, current directive, the
/// action menu), then each history exchange as a user/assistant pair, then
/// the new prompt.
pub struct LlmDecider {
    driver: LlmDriver,
    persona: String,
}

impl LlmDecider {
    pub fn new(driver: LlmDriver) -> Self {
        Self {
            driver,
            persona: DEFAULT_PERSONA.to_string(),
        }
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = persona.into();
        self
    }

    pub fn messages(&self, request: &DecisionRequest) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(request.history.len() * 2 + 2);
        messages.push(ChatMessage::new(Role::System, self.system_prompt(&request.goal)));
        for exchange in &request.history {
            messages.push(ChatMessage::new(Role::User, exchange.prompt.clone()));
            messages.push(ChatMessage::new(Role::Assistant, exchange.response.clone()));
        }
        messages.push(ChatMessage::new(Role::User, request.prompt()));
        messages
    }

    fn system_prompt(&self, goal: &str) -> String {
        let menu = ACTION_MENU
            .iter()
            .map(|(action, what)| format!("- `{}`: {what}", action.as_str()))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "{}\nYour current directive is: {goal}.\n\
             Reply in JSON with fields `action`, `params`, `think`, `speak` and `directive`.\n\
             Actions:\n{menu}",
            self.persona
        )
    }
}

const ACTION_MENU: [(ActionName, &str); 10] = [
    (ActionName::MoveForward, "drive forward for params.duration_ms"),
    (ActionName::MoveBackward, "back up for params.duration_ms"),
    (ActionName::TurnLeft, "turn left in place for params.duration_ms"),
    (ActionName::TurnRight, "turn right in place for params.duration_ms"),
    (ActionName::Stop, "stop moving"),
    (ActionName::Explore, "wander on your own, avoiding obstacles"),
    (ActionName::Survey, "look front, left and right before deciding again"),
    (ActionName::SetSpeed, "set speed level params.level, 0 fastest to 9 slowest"),
    (ActionName::Listen, "ask the user something and wait for the answer"),
    (ActionName::Wait, "do nothing this time"),
];

#[async_trait]
impl Decider for LlmDecider {
    async fn decide(&self, request: &DecisionRequest) -> Result<String, RoverError> {
        let reply = self.driver.complete(&self.messages(request)).await?;
        debug!(model = self.driver.model(), chars = reply.len(), "decider replied");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::Trigger;
    use rover_memory::Directive;
    use rover_types::PerceptionBundle;

    #[test]
    fn command_line_splits_program_and_args() {
        let cmd = CommandLine::parse("  python3 vision.py --fast ").unwrap();
        assert_eq!(cmd.program, "python3");
        assert_eq!(cmd.args, vec!["vision.py", "--fast"]);
        assert!(CommandLine::parse("   ").is_none());
    }

    #[test]
    fn decider_replays_history_as_turns() {
        let mut directive = Directive::new("find the cat", 10);
        directive.record("wake word", "stop -> ok");
        directive.record("periodic survey", "turn_left 1000ms -> ok");
        let request = DecisionRequest::new(
            &directive,
            Trigger::Periodic,
            PerceptionBundle::default(),
            None,
        );
        let decider = LlmDecider::new(LlmDriver::new("http://localhost:11434", "gemma3"));
        let messages = decider.messages(&request);

        assert_eq!(messages.len(), 6);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("find the cat"));
        assert!(messages[0].content.contains("`set_speed`"));
        assert_eq!(messages[1].content, "wake word");
        assert_eq!(messages[2].role, Role::Assistant);
        assert_eq!(messages[4].content, "turn_left 1000ms -> ok");
        assert_eq!(messages[5].role, Role::User);
    }

    #[tokio::test]
    async fn no_vision_always_fails() {
        assert!(NoVision.capture(Direction::Front).await.is_err());
        assert!(LogSpeaker.speak("hello").await.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_adapters_use_stdout_and_exit_status() {
        let vision = ProcessVision::new(CommandLine::parse("echo a chair to the").unwrap());
        assert_eq!(
            vision.capture(Direction::Left).await.unwrap(),
            "a chair to the left"
        );

        let speaker = ProcessSpeaker::new(CommandLine::parse("false").unwrap());
        assert_eq!(speaker.speak("hi").await.unwrap_err().kind(), "collaborator");

        let missing = ProcessSpeaker::new(CommandLine::parse("/nonexistent/tts").unwrap());
        assert!(missing.speak("hi").await.is_err());
    }
}
