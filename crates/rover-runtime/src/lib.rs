//! `rover-runtime` – the host brain.
//!
//! Runs the decision cycle that ties perception, cognition and action
//! together on top of the serial link and the signal mailbox.
//!
//! # Modules
//!
//! - [`orchestrator`] – [`Orchestrator`][orchestrator::Orchestrator]: the
//!   Idle → Surveying → Deciding → Acting → Speaking state machine with its
//!   single recovery funnel and cooperative shutdown.
//! - [`decision`] – decision requests, validated parsing of the decider's
//!   reply ([`parse_reply`][decision::parse_reply]) and the deterministic
//!   transcript routing rule ([`route_transcript`][decision::route_transcript]).
//! - [`collaborators`] – the [`Vision`], [`Decider`] and [`Speaker`] traits
//!   plus process-backed and LLM-backed adapters.
//! - [`llm_driver`] – [`LlmDriver`][llm_driver::LlmDriver], an
//!   OpenAI-compatible chat client (Ollama by default) that injects the
//!   [`DecisionReply`][rover_types::DecisionReply] JSON Schema through
//!   `response_format`.
//! - [`shutdown`] – [`ShutdownSignal`], the latch every blocking call races.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: console or
//!   JSON logs plus optional OTLP span export.

pub mod collaborators;
pub mod decision;
pub mod llm_driver;
pub mod orchestrator;
pub mod shutdown;
pub mod telemetry;

pub use collaborators::{
    Collaborators, CommandLine, Decider, LlmDecider, LogSpeaker, NoVision, ProcessSpeaker,
    ProcessVision, Speaker, Vision,
};
pub use decision::{DecisionRequest, Route, Trigger, parse_reply, route_transcript};
pub use llm_driver::{ChatMessage, LlmDriver, LlmError, Role};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use shutdown::ShutdownSignal;
pub use telemetry::{TracerProviderGuard, init_tracing};
