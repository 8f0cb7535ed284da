//! Reads and writes `~/.rover/config.toml`.
//!
//! Every field has a default, so a partial (or missing) file is fine.
//! `ROVER_*` environment variables override the file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rover_memory::{DEFAULT_CAPACITY, DEFAULT_GOAL};
use rover_middleware::RetryPolicy;
use rover_middleware::link::DEFAULT_BAUD;
use rover_runtime::OrchestratorConfig;
use rover_types::RoverError;
use serde::{Deserialize, Serialize};

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Serial device of the motor controller.
    #[serde(default = "default_serial_port")]
    pub serial_port: String,

    #[serde(default = "default_baud")]
    pub baud: u32,

    /// Directory shared with the speech-capture process.
    #[serde(default = "default_mailbox_dir")]
    pub mailbox_dir: PathBuf,

    /// Base URL of the Ollama / OpenAI-compatible server.
    #[serde(default = "default_llm_url")]
    pub llm_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Bearer token for hosted endpoints. Empty for a local Ollama.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub llm_api_key: String,

    /// Program run as `<command> <direction>`; prints a scene description.
    /// Empty disables vision.
    #[serde(default)]
    pub vision_command: String,

    /// Program run as `<command> <text>`. Empty logs speech instead.
    #[serde(default)]
    pub speech_command: String,

    /// SQLite journal for the directive. Empty keeps it in memory.
    #[serde(default = "default_journal_path")]
    pub journal_path: String,

    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    #[serde(default = "default_goal")]
    pub initial_goal: String,

    #[serde(default = "default_capture_timeout_secs")]
    pub capture_timeout_secs: u64,

    #[serde(default = "default_decide_timeout_secs")]
    pub decide_timeout_secs: u64,

    #[serde(default = "default_speech_timeout_secs")]
    pub speech_timeout_secs: u64,

    /// Seconds between unprompted survey cycles; 0 disables them.
    #[serde(default = "default_cycle_interval_secs")]
    pub cycle_interval_secs: u64,

    /// Survey turn toward the left view; 0 surveys without turning.
    #[serde(default = "default_survey_turn_ms")]
    pub survey_turn_ms: u64,

    #[serde(default = "default_recovery_cooldown_ms")]
    pub recovery_cooldown_ms: u64,

    #[serde(default = "default_link_retry_attempts")]
    pub link_retry_attempts: u32,

    #[serde(default = "default_link_retry_backoff_ms")]
    pub link_retry_backoff_ms: u64,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("serial_port", &self.serial_port)
            .field("baud", &self.baud)
            .field("mailbox_dir", &self.mailbox_dir)
            .field("llm_url", &self.llm_url)
            .field("model", &self.model)
            .field(
                "llm_api_key",
                if self.llm_api_key.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("vision_command", &self.vision_command)
            .field("speech_command", &self.speech_command)
            .field("journal_path", &self.journal_path)
            .field("history_capacity", &self.history_capacity)
            .field("initial_goal", &self.initial_goal)
            .field("capture_timeout_secs", &self.capture_timeout_secs)
            .field("decide_timeout_secs", &self.decide_timeout_secs)
            .field("speech_timeout_secs", &self.speech_timeout_secs)
            .field("cycle_interval_secs", &self.cycle_interval_secs)
            .field("survey_turn_ms", &self.survey_turn_ms)
            .field("recovery_cooldown_ms", &self.recovery_cooldown_ms)
            .field("link_retry_attempts", &self.link_retry_attempts)
            .field("link_retry_backoff_ms", &self.link_retry_backoff_ms)
            .finish()
    }
}

fn rover_home() -> PathBuf {
    home_dir().join(".rover")
}

fn home_dir() -> PathBuf {
    PathBuf::from(
        std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

fn default_serial_port() -> String {
    "/dev/ttyUSB0".to_string()
}
fn default_baud() -> u32 {
    DEFAULT_BAUD
}
fn default_mailbox_dir() -> PathBuf {
    rover_home().join("mailbox")
}
fn default_llm_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    "gemma3".to_string()
}
fn default_journal_path() -> String {
    rover_home().join("journal.db").to_string_lossy().into_owned()
}
fn default_history_capacity() -> usize {
    DEFAULT_CAPACITY
}
fn default_goal() -> String {
    DEFAULT_GOAL.to_string()
}
fn default_capture_timeout_secs() -> u64 {
    10
}
fn default_decide_timeout_secs() -> u64 {
    30
}
fn default_speech_timeout_secs() -> u64 {
    15
}
fn default_cycle_interval_secs() -> u64 {
    60
}
fn default_survey_turn_ms() -> u64 {
    1500
}
fn default_recovery_cooldown_ms() -> u64 {
    2000
}
fn default_link_retry_attempts() -> u32 {
    3
}
fn default_link_retry_backoff_ms() -> u64 {
    200
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial_port: default_serial_port(),
            baud: default_baud(),
            mailbox_dir: default_mailbox_dir(),
            llm_url: default_llm_url(),
            model: default_model(),
            llm_api_key: String::new(),
            vision_command: String::new(),
            speech_command: String::new(),
            journal_path: default_journal_path(),
            history_capacity: default_history_capacity(),
            initial_goal: default_goal(),
            capture_timeout_secs: default_capture_timeout_secs(),
            decide_timeout_secs: default_decide_timeout_secs(),
            speech_timeout_secs: default_speech_timeout_secs(),
            cycle_interval_secs: default_cycle_interval_secs(),
            survey_turn_ms: default_survey_turn_ms(),
            recovery_cooldown_ms: default_recovery_cooldown_ms(),
            link_retry_attempts: default_link_retry_attempts(),
            link_retry_backoff_ms: default_link_retry_backoff_ms(),
        }
    }
}

impl Config {
    /// Orchestrator timings derived from this config.
    pub fn orchestrator(&self) -> OrchestratorConfig {
        let nonzero = |ms: u64| (ms > 0).then(|| Duration::from_millis(ms));
        OrchestratorConfig {
            capture_timeout: Duration::from_secs(self.capture_timeout_secs),
            decide_timeout: Duration::from_secs(self.decide_timeout_secs),
            speech_timeout: Duration::from_secs(self.speech_timeout_secs),
            recovery_cooldown: Duration::from_millis(self.recovery_cooldown_ms),
            cycle_interval: nonzero(self.cycle_interval_secs.saturating_mul(1000)),
            survey_turn: nonzero(self.survey_turn_ms),
            link_retry: RetryPolicy::new(
                self.link_retry_attempts,
                Duration::from_millis(self.link_retry_backoff_ms),
                Duration::from_secs(2),
            ),
            ..OrchestratorConfig::default()
        }
    }
}

/// `~/.rover/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

pub(crate) fn config_path_for_home(home: &Path) -> PathBuf {
    home.join(".rover").join("config.toml")
}

/// Load `path`, or the defaults when it does not exist, then apply
/// environment overrides.
pub fn load_or_default(path: &Path) -> Result<Config, RoverError> {
    let mut cfg = load_from(path)?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// `Ok(None)` when the file does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, RoverError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| RoverError::Config(format!("read {}: {e}", path.display())))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| RoverError::Config(format!("parse {}: {e}", path.display())))?;
    Ok(Some(cfg))
}

/// Apply `ROVER_*` overrides.
///
/// | Variable | Config field |
/// |---|---|
/// | `ROVER_SERIAL_PORT` | `serial_port` |
/// | `ROVER_BAUD` | `baud` |
/// | `ROVER_MAILBOX_DIR` | `mailbox_dir` |
/// | `ROVER_LLM_URL` | `llm_url` |
/// | `ROVER_MODEL` | `model` |
/// | `ROVER_LLM_API_KEY` | `llm_api_key` |
/// | `ROVER_VISION_COMMAND` | `vision_command` |
/// | `ROVER_SPEECH_COMMAND` | `speech_command` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("ROVER_SERIAL_PORT") {
        cfg.serial_port = v;
    }
    if let Ok(v) = std::env::var("ROVER_BAUD")
        && let Ok(baud) = v.parse::<u32>()
    {
        cfg.baud = baud;
    }
    if let Ok(v) = std::env::var("ROVER_MAILBOX_DIR") {
        cfg.mailbox_dir = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("ROVER_LLM_URL") {
        cfg.llm_url = v;
    }
    if let Ok(v) = std::env::var("ROVER_MODEL") {
        cfg.model = v;
    }
    if let Ok(v) = std::env::var("ROVER_LLM_API_KEY") {
        cfg.llm_api_key = v;
    }
    if let Ok(v) = std::env::var("ROVER_VISION_COMMAND") {
        cfg.vision_command = v;
    }
    if let Ok(v) = std::env::var("ROVER_SPEECH_COMMAND") {
        cfg.speech_command = v;
    }
}

/// Write `cfg` to `path` with owner-only permissions on Unix.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), RoverError> {
    let fail = |what: &str, e: &dyn std::fmt::Display| RoverError::Config(format!("{what}: {e}"));
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| fail("create config directory", &e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| fail("restrict config directory", &e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| fail("serialize config", &e))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| fail(&format!("write {}", path.display()), &e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| fail(&format!("write {}", path.display()), &e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_the_api_key() {
        let cfg = Config {
            llm_api_key: "sk-very-secret".to_string(),
            ..Config::default()
        };
        let shown = format!("{cfg:?}");
        assert!(!shown.contains("sk-very-secret"));
        assert!(shown.contains("<redacted>"));
        assert!(format!("{:?}", Config::default()).contains("<not set>"));
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "serial_port = \"/dev/ttyACM0\"\ncycle_interval_secs = 0\n").unwrap();

        let cfg = load_from(&path).unwrap().unwrap();
        assert_eq!(cfg.serial_port, "/dev/ttyACM0");
        assert_eq!(cfg.baud, 115_200);
        assert_eq!(cfg.initial_goal, DEFAULT_GOAL);
        assert_eq!(cfg.orchestrator().cycle_interval, None);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_from(&dir.path().join("absent.toml")).unwrap().is_none());
    }

    #[test]
    fn garbage_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "baud = \"fast\"").unwrap();
        assert_eq!(load_from(&path).unwrap_err().kind(), "config");
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = config_path_for_home(dir.path());
        let cfg = Config {
            model: "llama3.2".into(),
            vision_command: "python3 look.py".into(),
            ..Config::default()
        };
        save_to(&cfg, &path).unwrap();
        assert_eq!(load_from(&path).unwrap(), Some(cfg));
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = config_path_for_home(dir.path());
        save_to(&Config::default(), &path).unwrap();

        let file_mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = fs::metadata(path.parent().unwrap()).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn orchestrator_config_follows_fields() {
        let cfg = Config {
            survey_turn_ms: 0,
            link_retry_attempts: 5,
            recovery_cooldown_ms: 750,
            ..Config::default()
        };
        let oc = cfg.orchestrator();
        assert_eq!(oc.survey_turn, None);
        assert_eq!(oc.cycle_interval, Some(Duration::from_secs(60)));
        assert_eq!(oc.link_retry.attempts, 5);
        assert_eq!(oc.recovery_cooldown, Duration::from_millis(750));
        assert_eq!(oc.capture_timeout, Duration::from_secs(10));
    }

    #[test]
    fn env_overrides_win() {
        // SAFETY: the only test that touches these variables.
        unsafe {
            std::env::set_var("ROVER_MODEL", "phi3");
            std::env::set_var("ROVER_BAUD", "not-a-number");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.model, "phi3");
        assert_eq!(cfg.baud, DEFAULT_BAUD);
        unsafe {
            std::env::remove_var("ROVER_MODEL");
            std::env::remove_var("ROVER_BAUD");
        }
    }
}
