//! [`Orchestrator`] – the host-side decision cycle.
//!
//! One logical thread of control walks the robot through
//!
//! ```text
//!            ┌──────────────── cooldown ───────────────┐
//!            ▼                                         │
//!  Idle ─► Surveying ─► Deciding ─► Acting ─► Speaking ┤
//!   │  └──────────────────────▲        │               │
//!   │   (question transcript) ┘        └─► Idle        │
//!   │                                                  │
//!   └──── any phase fault ──────────────────► ErrorRecovery
//!
//!  any state ── shutdown ──► ShuttingDown
//! ```
//!
//! Each call to [`Orchestrator::step`] runs exactly one phase and returns the
//! state the machine moved to. A phase performs at most one bounded
//! collaborator call at a time, and every call or sleep is raced against the
//! [`ShutdownSignal`].
//!
//! # Fault funnel
//!
//! Every phase error other than cancellation lands in `ErrorRecovery`, which
//! sends Stop, drops the cycle's decision and cools down before returning
//! to `Idle`. When even Stop cannot be delivered the machine shuts down and
//! [`Orchestrator::run`] returns [`RoverError::OperationalHalt`] with the
//! state that failed and the last telemetry line seen.
//!
//! # Holding still
//!
//! A Stop puts the controller in Manual, and its link watchdog hands control
//! back to autonomous driving once the host goes quiet. Every collaborator
//! call outside Idle, and the recovery cooldown, therefore re-sends Stop each
//! `keep_alive` while it waits, unless the robot was told to explore.
//!
//! # Idle priorities
//!
//! Shutdown, then a ready transcript, then a wake signal, then an expired
//! listen request, then an obstacle halt reported by the controller, then
//! the periodic cycle timer.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rover_memory::DirectiveStore;
use rover_middleware::{EventBus, Mailbox, RetryPolicy, SerialLink};
use rover_types::{
    ActionName, DecisionReply, Direction, EventPayload, Inbound, MotorCommand, Observation,
    PerceptionBundle, RobotState, RoverError, SignalKind, SignalMessage, SpeedLevel,
    TelemetryFrame,
};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::collaborators::Collaborators;
use crate::decision::{
    DecisionRequest, Route, Trigger, describe_action, parse_reply, route_transcript,
};
use crate::shutdown::ShutdownSignal;

const SOURCE: &str = "rover-runtime::orchestrator";

/// Inbound lines handled per step before the phase runs.
const MAX_LINES_PER_DRAIN: usize = 64;

const NOTICE_NOT_HEARD: &str = "I didn't catch that, please try again after the wake word.";
const NOTICE_NO_ANSWER: &str = "I didn't hear a response. Going back to what I was doing.";
const NOTICE_LOOKING: &str = "Let me take a look around.";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub capture_timeout: Duration,
    pub decide_timeout: Duration,
    /// Decider calls per decision when the call itself fails or times out.
    /// A reply that arrives but does not parse is never retried.
    pub decide_attempts: u32,
    pub speech_timeout: Duration,
    pub recovery_cooldown: Duration,
    pub idle_poll: Duration,
    /// `None` disables periodic cycles.
    pub cycle_interval: Option<Duration>,
    /// Turn time toward the left capture; the right capture turns twice as
    /// long. `None` captures all directions without moving.
    pub survey_turn: Option<Duration>,
    pub obstacle_backoff: Duration,
    pub default_hold: Duration,
    /// Re-send interval for a held motion command.
    pub keep_alive: Duration,
    pub listen_timeout: Duration,
    pub link_retry: RetryPolicy,
    /// Narrate the survey out loud.
    pub narrate: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            capture_timeout: Duration::from_secs(10),
            decide_timeout: Duration::from_secs(30),
            decide_attempts: 2,
            speech_timeout: Duration::from_secs(15),
            recovery_cooldown: Duration::from_secs(2),
            idle_poll: Duration::from_millis(250),
            cycle_interval: Some(Duration::from_secs(60)),
            survey_turn: Some(Duration::from_millis(1500)),
            obstacle_backoff: Duration::from_millis(1500),
            default_hold: Duration::from_millis(1000),
            keep_alive: Duration::from_millis(500),
            listen_timeout: Duration::from_secs(20),
            link_retry: RetryPolicy::default(),
            narrate: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-cycle context
// ─────────────────────────────────────────────────────────────────────────────

/// What one trip from Idle back to Idle has accumulated. Dropped wholesale by
/// recovery.
#[derive(Debug, Default)]
struct Cycle {
    trigger: Option<Trigger>,
    perception: PerceptionBundle,
    surveyed: bool,
    backed_off: bool,
    prompt: String,
    reply: Option<DecisionReply>,
    listen_requested: bool,
}

impl Cycle {
    fn new(trigger: Trigger) -> Self {
        Self {
            trigger: Some(trigger),
            ..Self::default()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────────────────────────────────────

pub struct Orchestrator<L: SerialLink> {
    link: L,
    mailbox: Arc<dyn Mailbox>,
    directive: DirectiveStore,
    collaborators: Collaborators,
    bus: EventBus,
    shutdown: ShutdownSignal,
    config: OrchestratorConfig,

    state: RobotState,
    cycle: Cycle,
    last_telemetry: Option<TelemetryFrame>,
    last_telemetry_line: Option<String>,
    /// Set after `explore`; cleared by any command that takes control back.
    exploring: bool,
    obstacle_pending: bool,
    listen_deadline: Option<Instant>,
    next_periodic: Option<Instant>,
    fault_origin: RobotState,
    halt: Option<RoverError>,
    finished: bool,
}

impl<L: SerialLink> Orchestrator<L> {
    pub fn new(
        link: L,
        mailbox: Arc<dyn Mailbox>,
        directive: DirectiveStore,
        collaborators: Collaborators,
        config: OrchestratorConfig,
    ) -> Self {
        let next_periodic = config.cycle_interval.map(|every| Instant::now() + every);
        Self {
            link,
            mailbox,
            directive,
            collaborators,
            bus: EventBus::default(),
            shutdown: ShutdownSignal::new(),
            config,
            state: RobotState::Idle,
            cycle: Cycle::default(),
            last_telemetry: None,
            last_telemetry_line: None,
            exploring: false,
            obstacle_pending: false,
            listen_deadline: None,
            next_periodic,
            fault_origin: RobotState::Idle,
            halt: None,
            finished: false,
        }
    }

    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn state(&self) -> RobotState {
        self.state
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    pub fn directive(&self) -> &DirectiveStore {
        &self.directive
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn last_telemetry(&self) -> Option<&TelemetryFrame> {
        self.last_telemetry.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Step until shut down.
    ///
    /// # Errors
    ///
    /// [`RoverError::OperationalHalt`] when recovery could not stop the
    /// robot; `Ok(())` after a requested shutdown.
    pub async fn run(&mut self) -> Result<(), RoverError> {
        info!(link = %self.link.describe(), goal = %self.directive.directive().goal(), "orchestrator running");
        while !self.finished {
            self.step().await;
        }
        match self.halt.take() {
            Some(halt) => Err(halt),
            None => Ok(()),
        }
    }

    /// Run one phase and return the resulting state.
    pub async fn step(&mut self) -> RobotState {
        if self.finished {
            return self.state;
        }
        self.drain_link();
        if self.shutdown.is_triggered() && self.state != RobotState::ShuttingDown {
            self.transition(RobotState::ShuttingDown);
        }

        let origin = self.state;
        let outcome = match origin {
            RobotState::Idle => self.idle().await,
            RobotState::Surveying => self.survey().await,
            RobotState::Deciding => self.deliberate().await,
            RobotState::Acting => self.act().await,
            RobotState::Speaking => self.speak_reply().await,
            RobotState::ErrorRecovery => self.recover().await,
            RobotState::ShuttingDown => {
                self.shut_down().await;
                Ok(RobotState::ShuttingDown)
            }
        };
        let next = match outcome {
            Ok(next) => next,
            Err(RoverError::Cancelled) => RobotState::ShuttingDown,
            Err(e) => {
                self.fault(origin, &e);
                RobotState::ErrorRecovery
            }
        };
        self.transition(next);
        self.state
    }

    // ── Phases ────────────────────────────────────────────────────────────────

    async fn idle(&mut self) -> Result<RobotState, RoverError> {
        if let Some(message) = self.take_signal(SignalKind::TranscriptReady) {
            let text = message.payload().trim().to_string();
            if text.is_empty() {
                info!("empty transcript");
                self.say(NOTICE_NOT_HEARD).await?;
                return Ok(RobotState::Idle);
            }
            self.listen_deadline = None;
            self.send(MotorCommand::Stop).await?;
            self.directive.hear(&text);
            let route = route_transcript(&text);
            info!(%text, ?route, "transcript received");
            self.cycle = Cycle::new(Trigger::Transcript(text));
            return Ok(match route {
                Route::Survey => RobotState::Surveying,
                Route::Decide => RobotState::Deciding,
            });
        }

        if self.take_signal(SignalKind::WakeDetected).is_some() {
            info!("wake word acknowledged");
            self.send(MotorCommand::Stop).await?;
            self.publish_signal(&SignalMessage::Ack);
            self.cycle = Cycle::new(Trigger::Wake);
            return Ok(RobotState::Surveying);
        }

        if self.listen_deadline.is_some_and(|at| Instant::now() >= at) {
            self.listen_deadline = None;
            info!("no answer to listen request");
            if let Err(e) = self.mailbox.poll(SignalKind::ListenRequest) {
                warn!(error = %e, "could not withdraw listen request");
            }
            self.say(NOTICE_NO_ANSWER).await?;
            return Ok(RobotState::Idle);
        }

        if std::mem::take(&mut self.obstacle_pending) {
            info!("controller halted at an obstacle");
            self.cycle = Cycle::new(Trigger::ObstacleHalt);
            return Ok(RobotState::Surveying);
        }

        if self.next_periodic.is_some_and(|at| Instant::now() >= at) {
            debug!("periodic cycle");
            self.cycle = Cycle::new(Trigger::Periodic);
            return Ok(RobotState::Surveying);
        }

        self.shutdown.sleep(self.config.idle_poll).await?;
        Ok(RobotState::Idle)
    }

    async fn survey(&mut self) -> Result<RobotState, RoverError> {
        self.cycle.surveyed = true;
        if self.cycle.trigger == Some(Trigger::ObstacleHalt) && !self.cycle.backed_off {
            self.cycle.backed_off = true;
            self.hold(MotorCommand::Backward, self.config.obstacle_backoff).await?;
        }
        if self.config.narrate {
            self.say(NOTICE_LOOKING).await?;
        }

        let mut perception = PerceptionBundle::default();
        for direction in Direction::ALL {
            if let Some(turn) = self.config.survey_turn {
                match direction {
                    Direction::Front => {}
                    Direction::Left => self.hold(MotorCommand::TurnLeft, turn).await?,
                    Direction::Right => self.hold(MotorCommand::TurnRight, turn * 2).await?,
                }
            }
            let capture = bounded(
                &self.shutdown,
                "vision",
                self.config.capture_timeout,
                self.collaborators.vision.capture(direction),
            );
            let observation = match keep_still(
                &mut self.link,
                !self.exploring,
                self.config.keep_alive,
                capture,
            )
            .await
            {
                Ok(text) => Observation::Seen(text),
                Err(RoverError::Cancelled) => return Err(RoverError::Cancelled),
                Err(e) => {
                    warn!(direction = direction.as_str(), error = %e, "capture failed, using placeholder");
                    Observation::Unavailable(e.to_string())
                }
            };
            perception.record(direction, observation);
        }
        if let Some(turn) = self.config.survey_turn {
            self.hold(MotorCommand::TurnLeft, turn).await?;
        }

        debug!(summary = %perception.describe(), "survey complete");
        self.cycle.perception = perception;
        Ok(RobotState::Deciding)
    }

    async fn deliberate(&mut self) -> Result<RobotState, RoverError> {
        let trigger = self.cycle.trigger.clone().unwrap_or(Trigger::Requested);
        let request = DecisionRequest::new(
            self.directive.directive(),
            trigger,
            self.cycle.perception.clone(),
            self.last_telemetry_line.clone(),
        );
        self.cycle.prompt = request.trigger.summary();

        let raw = self.consult(&request).await?;
        let reply = match parse_reply(&raw) {
            Ok(reply) => reply,
            Err(e) => {
                self.directive.record(&self.cycle.prompt, "unreadable reply -> failed");
                return Err(e);
            }
        };

        if let Some(think) = &reply.think {
            info!(%think, "decider reasoning");
        }
        if let Some(goal) = &reply.directive {
            self.directive.set_goal(goal);
        }
        let summary = describe_action(&reply);
        info!(action = %summary, "decision");
        self.bus.emit(SOURCE, EventPayload::Decision { summary });
        self.cycle.reply = Some(reply);
        Ok(RobotState::Acting)
    }

    async fn act(&mut self) -> Result<RobotState, RoverError> {
        let Some(reply) = self.cycle.reply.take() else {
            return Err(RoverError::MalformedDirective("no decision to act on".into()));
        };
        let result = self.execute(&reply).await;
        let outcome = if result.is_ok() { "ok" } else { "failed" };
        let entry = format!("{} -> {outcome}", describe_action(&reply));
        self.directive.record(&self.cycle.prompt, &entry);
        let resurvey = result?;

        if resurvey {
            if let Some(text) = &reply.speak {
                self.say(text).await?;
            }
            return Ok(RobotState::Surveying);
        }
        let speaks = reply.speak.is_some();
        self.cycle.reply = Some(reply);
        if speaks {
            Ok(RobotState::Speaking)
        } else {
            self.finish_cycle();
            Ok(RobotState::Idle)
        }
    }

    /// Carry out `reply`. `Ok(true)` means "survey again before deciding".
    async fn execute(&mut self, reply: &DecisionReply) -> Result<bool, RoverError> {
        let hold = reply
            .params
            .duration_ms
            .map(Duration::from_millis)
            .unwrap_or(self.config.default_hold);
        match reply.action {
            ActionName::MoveForward => self.hold(MotorCommand::Forward, hold).await?,
            ActionName::MoveBackward => self.hold(MotorCommand::Backward, hold).await?,
            ActionName::TurnLeft => self.hold(MotorCommand::TurnLeft, hold).await?,
            ActionName::TurnRight => self.hold(MotorCommand::TurnRight, hold).await?,
            ActionName::Stop => self.send(MotorCommand::Stop).await?,
            ActionName::Explore => {
                // Stop forces Manual, so the toggle always lands in autonomous mode.
                self.send(MotorCommand::Stop).await?;
                self.send(MotorCommand::ToggleAutoMode).await?;
                self.exploring = true;
            }
            ActionName::SetSpeed => {
                let level = reply
                    .params
                    .level
                    .and_then(SpeedLevel::new)
                    .ok_or_else(|| RoverError::MalformedDirective("set_speed without a level".into()))?;
                self.send(MotorCommand::SetBaseSpeed(level)).await?;
            }
            ActionName::Survey => {
                if !self.cycle.surveyed {
                    return Ok(true);
                }
                debug!("already surveyed this cycle, waiting instead");
            }
            ActionName::Listen => self.cycle.listen_requested = true,
            ActionName::Wait => {}
        }
        Ok(false)
    }

    async fn speak_reply(&mut self) -> Result<RobotState, RoverError> {
        let text = self.cycle.reply.as_ref().and_then(|r| r.speak.clone());
        if let Some(text) = text {
            self.say(&text).await?;
        }
        self.finish_cycle();
        Ok(RobotState::Idle)
    }

    async fn recover(&mut self) -> Result<RobotState, RoverError> {
        self.cycle = Cycle::default();
        match self.send(MotorCommand::Stop).await {
            Ok(()) => {}
            Err(RoverError::Cancelled) => return Err(RoverError::Cancelled),
            Err(e) => {
                let last = self.last_telemetry_line.as_deref().unwrap_or("none");
                error!(state = %self.fault_origin, error = %e, "cannot stop the robot, halting");
                self.halt = Some(RoverError::OperationalHalt {
                    state: self.fault_origin,
                    details: format!("{e}; last telemetry: {last}"),
                });
                return Ok(RobotState::ShuttingDown);
            }
        }
        let cooldown = self.shutdown.sleep(self.config.recovery_cooldown);
        keep_still(&mut self.link, true, self.config.keep_alive, cooldown).await?;
        Ok(RobotState::Idle)
    }

    async fn shut_down(&mut self) {
        info!("stopping robot and releasing link");
        if let Err(e) = self.send_stop_uninterruptible().await {
            error!(error = %e, "final stop could not be delivered");
        }
        if let Err(e) = self.mailbox.clear() {
            warn!(error = %e, "could not clear mailbox markers");
        }
        self.link.close();
        self.finished = true;
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn transition(&mut self, next: RobotState) {
        if next == self.state {
            return;
        }
        let from = self.state;
        self.state = next;
        info!(from = %from, to = %next, "state change");
        if next == RobotState::Idle {
            if let Some(every) = self.config.cycle_interval {
                self.next_periodic = Some(Instant::now() + every);
            }
        }
        self.bus.emit(SOURCE, EventPayload::StateChanged { from, to: next });
    }

    fn fault(&mut self, origin: RobotState, error: &RoverError) {
        warn!(state = %origin, kind = error.kind(), error = %error, "phase failed, recovering");
        self.fault_origin = origin;
        self.bus.emit(
            SOURCE,
            EventPayload::Fault {
                kind: error.kind().to_string(),
                message: error.to_string(),
            },
        );
    }

    /// Consume pending controller output.
    fn drain_link(&mut self) {
        for _ in 0..MAX_LINES_PER_DRAIN {
            let line = match self.link.poll_line() {
                Ok(Some(line)) => line,
                Ok(None) => return,
                Err(e) => {
                    debug!(error = %e, "link read failed");
                    return;
                }
            };
            match Inbound::parse(&line) {
                Ok(Inbound::Telemetry(frame)) => {
                    if self.exploring && frame.is_obstacle_halt() {
                        self.exploring = false;
                        self.obstacle_pending = true;
                    }
                    self.last_telemetry_line = Some(line);
                    self.last_telemetry = Some(frame.clone());
                    self.bus.emit(SOURCE, EventPayload::Telemetry(frame));
                }
                Ok(Inbound::Status(text)) => {
                    info!(status = %text, "controller");
                    self.bus.emit(SOURCE, EventPayload::DeviceStatus(text));
                }
                Err(e) => debug!(error = %e, "ignoring controller line"),
            }
        }
    }

    fn take_signal(&self, kind: SignalKind) -> Option<SignalMessage> {
        match self.mailbox.poll(kind) {
            Ok(message) => message,
            Err(e) => {
                warn!(%kind, error = %e, "mailbox poll failed");
                None
            }
        }
    }

    fn publish_signal(&self, message: &SignalMessage) {
        if let Err(e) = self.mailbox.publish(message) {
            warn!(kind = %message.kind(), error = %e, "mailbox publish failed");
        }
    }

    fn finish_cycle(&mut self) {
        if self.cycle.listen_requested {
            self.publish_signal(&SignalMessage::ListenRequest);
            self.listen_deadline = Some(Instant::now() + self.config.listen_timeout);
        }
        self.cycle = Cycle::default();
    }

    /// Ask the decider, retrying calls that fail or time out.
    async fn consult(&mut self, request: &DecisionRequest) -> Result<String, RoverError> {
        let attempts = self.config.decide_attempts.max(1);
        let mut attempt = 1;
        loop {
            let call = bounded(
                &self.shutdown,
                "decider",
                self.config.decide_timeout,
                self.collaborators.decider.decide(request),
            );
            let result =
                keep_still(&mut self.link, !self.exploring, self.config.keep_alive, call).await;
            match result {
                Err(e) if e != RoverError::Cancelled && attempt < attempts => {
                    warn!(attempt, error = %e, "decider call failed, retrying");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Best-effort speech: only cancellation is an error.
    async fn say(&mut self, text: &str) -> Result<(), RoverError> {
        let still = !self.exploring && self.state != RobotState::Idle;
        let call = bounded(
            &self.shutdown,
            "speaker",
            self.config.speech_timeout,
            self.collaborators.speaker.speak(text),
        );
        match keep_still(&mut self.link, still, self.config.keep_alive, call).await {
            Ok(()) => Ok(()),
            Err(RoverError::Cancelled) => Err(RoverError::Cancelled),
            Err(e) => {
                warn!(error = %e, "speech failed");
                Ok(())
            }
        }
    }

    /// Send `command`, hold it for `duration` with keep-alive re-sends, then
    /// Stop.
    async fn hold(&mut self, command: MotorCommand, duration: Duration) -> Result<(), RoverError> {
        self.send(command).await?;
        let deadline = Instant::now() + duration;
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            self.shutdown
                .sleep((deadline - now).min(self.config.keep_alive))
                .await?;
            self.drain_link();
            if Instant::now() < deadline {
                self.send(command).await?;
            }
        }
        self.send(MotorCommand::Stop).await
    }

    async fn send(&mut self, command: MotorCommand) -> Result<(), RoverError> {
        self.deliver(command, true).await
    }

    async fn send_stop_uninterruptible(&mut self) -> Result<(), RoverError> {
        self.deliver(MotorCommand::Stop, false).await
    }

    /// Write with retry and reconnect. Exhausting the policy is a link fault.
    async fn deliver(&mut self, command: MotorCommand, interruptible: bool) -> Result<(), RoverError> {
        let policy = self.config.link_retry;
        let mut delays = policy.delays();
        loop {
            let error = match self.link.send(command) {
                Ok(()) => {
                    debug!(%command, "sent");
                    if command.is_motion() {
                        self.exploring = false;
                    }
                    return Ok(());
                }
                Err(e) => e,
            };
            let Some(wait) = delays.next() else {
                return Err(RoverError::LinkIo(format!(
                    "{command} undeliverable after {} attempts: {error}",
                    policy.attempts
                )));
            };
            warn!(%command, error = %error, backoff_ms = wait.as_millis() as u64, "link write failed");
            if interruptible {
                self.shutdown.sleep(wait).await?;
            } else {
                tokio::time::sleep(wait).await;
            }
            if let Err(e) = self.link.reconnect() {
                debug!(error = %e, "reconnect failed");
            }
        }
    }
}

/// Run a collaborator call under a timeout, abandoning it on shutdown.
async fn bounded<T, F>(
    shutdown: &ShutdownSignal,
    collaborator: &str,
    limit: Duration,
    call: F,
) -> Result<T, RoverError>
where
    F: Future<Output = Result<T, RoverError>>,
{
    match shutdown.guard(tokio::time::timeout(limit, call)).await? {
        Ok(result) => result,
        Err(_) => Err(RoverError::CollaboratorTimeout {
            collaborator: collaborator.to_string(),
            timeout_ms: limit.as_millis() as u64,
        }),
    }
}

/// Await `call`, re-sending Stop every `every` while `active`.
///
/// Keep-alive writes are single attempts; a failed one is logged and the
/// next command that matters goes through the full retry policy.
async fn keep_still<L, T, F>(
    link: &mut L,
    active: bool,
    every: Duration,
    call: F,
) -> Result<T, RoverError>
where
    L: SerialLink + ?Sized,
    F: Future<Output = Result<T, RoverError>>,
{
    if !active {
        return call.await;
    }
    let every = every.max(Duration::from_millis(1));
    tokio::pin!(call);
    let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            result = &mut call => return result,
            _ = ticker.tick() => {
                if let Err(e) = link.send(MotorCommand::Stop) {
                    debug!(error = %e, "keep-still stop not delivered");
                }
            }
        }
    }
}
