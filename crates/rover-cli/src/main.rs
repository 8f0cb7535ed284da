//! `rover` – command line for the companion robot host.
//!
//! | Command | What it does |
//! |---|---|
//! | `rover run` | Open the serial link and run the orchestrator until Ctrl-C. |
//! | `rover run --sim` | Same, against a simulated controller in a simulated room. |
//! | `rover signal <kind>` | Drop a marker into the mailbox, as the speech process would. |
//! | `rover doctor` | Check serial ports, mailbox, journal and the LLM server. |
//! | `rover config` | Show the effective config, or write the defaults with `--write-default`. |

mod config;
mod ollama;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use rover_firmware::LoopConfig;
use rover_firmware::sim::RoomConfig;
use rover_memory::{DirectiveJournal, DirectiveStore};
use rover_middleware::link::available_ports;
use rover_middleware::{
    EventBus, FileMailbox, Mailbox, SerialLink, SerialPortLink, SimulatedDevice, Topic,
};
use rover_runtime::{
    Collaborators, CommandLine, LlmDecider, LlmDriver, LogSpeaker, NoVision, Orchestrator,
    ProcessSpeaker, ProcessVision, ShutdownSignal, Speaker, Vision,
};
use rover_types::{Event, EventPayload, RoverError, SignalMessage};

use config::Config;

/// Tick of the simulated controller under `--sim`.
const SIM_TICK: Duration = Duration::from_millis(20);

#[derive(Parser, Debug)]
#[command(name = "rover", version, about = "Companion robot host")]
struct Cli {
    /// Config file to use instead of ~/.rover/config.toml.
    #[arg(long, global = true, env = "ROVER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the orchestrator until Ctrl-C.
    Run {
        /// Drive a simulated controller instead of the serial port.
        #[arg(long)]
        sim: bool,
    },
    /// Publish a signal into the mailbox.
    Signal {
        #[command(subcommand)]
        signal: SignalArg,
    },
    /// Check the robot's surroundings: ports, mailbox, journal, LLM.
    Doctor,
    /// Show the effective configuration.
    Config {
        /// Write the default config if none exists yet.
        #[arg(long)]
        write_default: bool,
    },
}

#[derive(Subcommand, Debug)]
enum SignalArg {
    /// The wake word was heard.
    Wake,
    /// Acknowledge a wake.
    Ack,
    /// Ask the speech process to listen.
    Listen,
    /// A finished transcript.
    Transcript {
        #[arg(required = true)]
        words: Vec<String>,
    },
}

impl SignalArg {
    fn message(self) -> SignalMessage {
        match self {
            Self::Wake => SignalMessage::WakeDetected,
            Self::Ack => SignalMessage::Ack,
            Self::Listen => SignalMessage::ListenRequest,
            Self::Transcript { words } => SignalMessage::TranscriptReady(words.join(" ")),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _tracing = rover_runtime::init_tracing("rover");

    let path = cli.config.clone().unwrap_or_else(config::config_path);
    let result = config::load_or_default(&path).and_then(|cfg| match cli.command {
        Command::Run { sim } => run(&cfg, sim),
        Command::Signal { signal } => publish_signal(&cfg, signal.message()),
        Command::Doctor => {
            doctor(&cfg);
            Ok(())
        }
        Command::Config { write_default } => show_config(&cfg, &path, write_default),
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ RoverError::OperationalHalt { .. }) => {
            eprintln!("{} {e}", "✗ operational halt:".red().bold());
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("{} {e}", "✗ error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// rover run
// ─────────────────────────────────────────────────────────────────────────────

fn run(cfg: &Config, sim: bool) -> Result<(), RoverError> {
    print_banner();
    probe_llm(cfg);

    let shutdown = ShutdownSignal::new();
    install_ctrlc(shutdown.clone());

    let mailbox = FileMailbox::open(&cfg.mailbox_dir)?;
    // Markers left by a previous run would fire as soon as the loop starts.
    mailbox.clear()?;
    println!("  Mailbox: {}", mailbox.dir().display().to_string().bold());

    let directive = open_directive(cfg)?;
    let collaborators = build_collaborators(cfg);

    let (link, device): (Box<dyn SerialLink>, Option<SimulatedDevice>) = if sim {
        let (device, link) = SimulatedDevice::spawn(RoomConfig::default(), LoopConfig::default(), SIM_TICK)?;
        println!("  Link: {}", "simulated controller".yellow());
        (Box::new(link), Some(device))
    } else {
        let link = SerialPortLink::open(&cfg.serial_port, cfg.baud)?;
        println!("  Link: {} @ {} baud", cfg.serial_port.bold(), cfg.baud);
        (Box::new(link), None)
    };

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| RoverError::Config(format!("start async runtime: {e}")))?;

    let bus = EventBus::default();
    for topic in [Topic::StateChanges, Topic::Decisions, Topic::Faults] {
        let mut rx = bus.subscribe_to(topic);
        runtime.spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => print_event(&event),
                    Err(RecvError::Lagged(n)) => warn!(?topic, skipped = n, "event printer fell behind"),
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    println!("\n  Press {} to stop.\n", "Ctrl-C".bold());
    let mut orchestrator = Orchestrator::new(
        link,
        Arc::new(mailbox),
        directive,
        collaborators,
        cfg.orchestrator(),
    )
    .with_bus(bus)
    .with_shutdown(shutdown);
    let outcome = runtime.block_on(orchestrator.run());

    drop(orchestrator);
    drop(device);
    runtime.shutdown_timeout(Duration::from_millis(200));
    if outcome.is_ok() {
        println!("{}", "  ✓ Robot stopped. Bye.".green());
    }
    outcome
}

fn install_ctrlc(shutdown: ShutdownSignal) {
    if let Err(e) = ctrlc::set_handler(move || {
        if shutdown.is_triggered() {
            eprintln!("{}", "  Second Ctrl-C – exiting without a clean stop.".red().bold());
            std::process::exit(130);
        }
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the robot …".yellow().bold());
        shutdown.trigger();
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; only a halt will end the run");
    }
}

fn open_directive(cfg: &Config) -> Result<DirectiveStore, RoverError> {
    if cfg.journal_path.trim().is_empty() {
        return Ok(DirectiveStore::in_memory(&cfg.initial_goal, cfg.history_capacity));
    }
    let path = PathBuf::from(&cfg.journal_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| RoverError::Storage(format!("create {}: {e}", parent.display())))?;
    }
    let journal = DirectiveJournal::open(&path)?;
    DirectiveStore::open(journal, &cfg.initial_goal, cfg.history_capacity)
}

fn build_collaborators(cfg: &Config) -> Collaborators {
    let vision: Box<dyn Vision> = match CommandLine::parse(&cfg.vision_command) {
        Some(command) => Box::new(ProcessVision::new(command)),
        None => {
            warn!("no vision_command configured; surveys will report every view as unavailable");
            Box::new(NoVision)
        }
    };
    let speaker: Box<dyn Speaker> = match CommandLine::parse(&cfg.speech_command) {
        Some(command) => Box::new(ProcessSpeaker::new(command)),
        None => Box::new(LogSpeaker),
    };
    let driver = LlmDriver::new(&cfg.llm_url, &cfg.model).with_api_key(Some(cfg.llm_api_key.clone()));
    Collaborators {
        vision,
        decider: Box::new(LlmDecider::new(driver)),
        speaker,
    }
}

fn print_event(event: &Event) {
    match &event.payload {
        EventPayload::StateChanged { from, to } => {
            println!("  {} {from} → {}", "▸".cyan(), to.to_string().cyan().bold());
        }
        EventPayload::Decision { summary } => println!("  {} {summary}", "◆".green()),
        EventPayload::Fault { kind, message } => {
            println!("  {} [{kind}] {message}", "✗".red().bold());
        }
        EventPayload::DeviceStatus(status) => println!("  {}", status.dimmed()),
        EventPayload::Telemetry(_) => {}
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// rover signal / doctor / config
// ─────────────────────────────────────────────────────────────────────────────

fn publish_signal(cfg: &Config, message: SignalMessage) -> Result<(), RoverError> {
    let mailbox = FileMailbox::open(&cfg.mailbox_dir)?;
    mailbox.publish(&message)?;
    println!(
        "  {} {} → {}",
        "✓".green().bold(),
        message.kind(),
        mailbox.marker_path(message.kind()).display()
    );
    Ok(())
}

fn doctor(cfg: &Config) {
    println!("\n  {}", "Serial ports".bold());
    match available_ports() {
        Ok(ports) if ports.is_empty() => println!("    {}", "none found".yellow()),
        Ok(ports) => {
            for port in ports {
                let marker = if port == cfg.serial_port { "●".green() } else { "•".normal() };
                println!("    {marker} {port}");
            }
        }
        Err(e) => println!("    {} {e}", "✗".red()),
    }

    println!("\n  {}", "Mailbox".bold());
    match FileMailbox::open(&cfg.mailbox_dir) {
        Ok(mailbox) => println!("    {} {}", "✓".green(), mailbox.dir().display()),
        Err(e) => println!("    {} {e}", "✗".red()),
    }

    println!("\n  {}", "Directive".bold());
    match open_directive(cfg) {
        Ok(store) => {
            let directive = store.directive();
            println!("    {} goal: {}", "✓".green(), directive.goal());
            println!("      {} exchange(s) restored", directive.history().len());
        }
        Err(e) => println!("    {} {e}", "✗".red()),
    }

    println!("\n  {}", "Collaborators".bold());
    let show = |name: &str, command: &str, fallback: &str| {
        if command.trim().is_empty() {
            println!("    {} {name}: {}", "•".yellow(), fallback.dimmed());
        } else {
            println!("    {} {name}: {command}", "✓".green());
        }
    };
    show("vision", &cfg.vision_command, "not configured");
    show("speech", &cfg.speech_command, "logged only");
    probe_llm(cfg);
    println!();
}

fn probe_llm(cfg: &Config) {
    print!("\n  Probing LLM at {} … ", cfg.llm_url.dimmed());
    match ollama::fetch_models(&cfg.llm_url) {
        Ok(models) => {
            println!("{} ({} model(s) available)", "online".green(), models.len());
            if !ollama::has_model(&models, &cfg.model) {
                println!(
                    "  {} model {} is not pulled; run `{}`",
                    "⚠".yellow(),
                    cfg.model.bold(),
                    format!("ollama pull {}", cfg.model).bold()
                );
            }
        }
        Err(_) => {
            println!("{}", "offline".yellow());
            println!(
                "  {}  Every decision will fail until `{}` is running.",
                "No Ollama instance detected.".dimmed(),
                "ollama serve".bold()
            );
        }
    }
}

fn show_config(cfg: &Config, path: &std::path::Path, write_default: bool) -> Result<(), RoverError> {
    if write_default {
        if path.exists() {
            println!("  {} already exists; leaving it alone.", path.display());
        } else {
            config::save_to(&Config::default(), path)?;
            println!("  {} Config saved to {}", "✓".green().bold(), path.display().to_string().bold());
        }
        return Ok(());
    }
    println!("  Config file: {}", path.display().to_string().bold());
    println!("{cfg:#?}");
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ____                      "#.bold().cyan());
    println!("{}", r#"  / __ \____ _   _____  _____"#.bold().cyan());
    println!("{}", r#" / /_/ / __ \ | / / _ \/ ___/"#.bold().cyan());
    println!("{}", r#"/ _, _/ /_/ / |/ /  __/ /    "#.bold().cyan());
    println!("{}", r#"/_/ |_|\____/|___/\___/_/     "#.bold().cyan());
    println!();
    println!("  {}", format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_types::SignalKind;

    #[test]
    fn transcript_words_are_joined() {
        let cli = Cli::try_parse_from(["rover", "signal", "transcript", "go", "find", "the", "cat"]).unwrap();
        let Command::Signal { signal } = cli.command else {
            panic!("expected signal command");
        };
        assert_eq!(
            signal.message(),
            SignalMessage::TranscriptReady("go find the cat".into())
        );
    }

    #[test]
    fn transcript_needs_text() {
        assert!(Cli::try_parse_from(["rover", "signal", "transcript"]).is_err());
    }

    #[test]
    fn global_config_flag_parses_after_subcommand() {
        let cli = Cli::try_parse_from(["rover", "run", "--sim", "--config", "/tmp/r.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/r.toml")));
        assert!(matches!(cli.command, Command::Run { sim: true }));
    }

    #[test]
    fn signal_lands_in_the_mailbox() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config {
            mailbox_dir: dir.path().join("mailbox"),
            ..Config::default()
        };
        publish_signal(&cfg, SignalMessage::WakeDetected).unwrap();
        let mailbox = FileMailbox::open(&cfg.mailbox_dir).unwrap();
        assert!(mailbox.is_pending(SignalKind::WakeDetected));
    }

    #[test]
    fn blank_journal_path_keeps_directive_in_memory() {
        let cfg = Config {
            journal_path: String::new(),
            initial_goal: "guard the door".into(),
            ..Config::default()
        };
        assert_eq!(open_directive(&cfg).unwrap().directive().goal(), "guard the door");
    }

    #[test]
    fn journal_restores_goal_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config {
            journal_path: dir.path().join("nested/journal.db").to_string_lossy().into_owned(),
            ..Config::default()
        };
        let mut store = open_directive(&cfg).unwrap();
        store.set_goal("follow the user");
        drop(store);
        assert_eq!(open_directive(&cfg).unwrap().directive().goal(), "follow the user");
    }
}
