// Operator control loop: intent -> command, liveness polling, latest camera frame
// Turns go through the micro-step controller, straight moves and stops are
// sent directly every tick so the robot's watchdog keeps getting fed.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use tracing::{info, warn};

use crate::channel::RobotLink;
use crate::config::{KEY_HOLD_TIMEOUT, Speeds, StepTiming};
use crate::messages::{Action, Command};
use crate::stepper::{RotationPhase, StepRotationController};
use crate::stream::{Frame, StreamReceiver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorInput {
    /// Current intent; `None` means no input
    Intent(Option<Action>),
    Quit,
}

/// Where control intents come from (keyboard here, gesture recognition elsewhere)
pub trait IntentSource {
    /// Non-blocking: report the intent for this tick
    fn poll_input(&mut self) -> io::Result<OperatorInput>;
}

/// Map a key to an input. Unmapped keys mean "stop".
pub fn key_input(code: KeyCode) -> OperatorInput {
    match code {
        KeyCode::Char('w') | KeyCode::Char('W') | KeyCode::Up => {
            OperatorInput::Intent(Some(Action::Forward))
        }
        KeyCode::Char('s') | KeyCode::Char('S') | KeyCode::Down => {
            OperatorInput::Intent(Some(Action::Backward))
        }
        KeyCode::Char('a') | KeyCode::Char('A') | KeyCode::Left => {
            OperatorInput::Intent(Some(Action::Left))
        }
        KeyCode::Char('d') | KeyCode::Char('D') | KeyCode::Right => {
            OperatorInput::Intent(Some(Action::Right))
        }
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => OperatorInput::Quit,
        _ => OperatorInput::Intent(Some(Action::Stop)),
    }
}

/// Keyboard teleop via crossterm. Terminal must be in raw mode.
pub struct KeyboardIntent {
    held: Option<Action>,
    last_input: Instant,
    hold_timeout: Duration,
}

impl Default for KeyboardIntent {
    fn default() -> Self {
        Self::new(KEY_HOLD_TIMEOUT)
    }
}

impl KeyboardIntent {
    pub fn new(hold_timeout: Duration) -> Self {
        Self {
            held: None,
            last_input: Instant::now(),
            hold_timeout,
        }
    }
}

impl IntentSource for KeyboardIntent {
    fn poll_input(&mut self) -> io::Result<OperatorInput> {
        // Drain everything queued since the last tick
        while event::poll(Duration::ZERO)? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                if kind == KeyEventKind::Release {
                    continue;
                }
                match key_input(code) {
                    OperatorInput::Quit => return Ok(OperatorInput::Quit),
                    OperatorInput::Intent(intent) => {
                        self.held = intent;
                        self.last_input = Instant::now();
                    }
                }
            }
        }

        if self.last_input.elapsed() > self.hold_timeout {
            self.held = None;
        }
        Ok(OperatorInput::Intent(self.held))
    }
}

pub struct Operator<L: RobotLink> {
    link: L,
    speeds: Speeds,
    stepper: StepRotationController,
    receiver: Option<StreamReceiver>,
    ping_period: Duration,
    last_ping: tokio::time::Instant,
    connected: bool,
    stream_connected: bool,
    last_frame: Option<Arc<Frame>>,
}

impl<L: RobotLink> Operator<L> {
    pub fn new(link: L, speeds: Speeds, timing: StepTiming, ping_period: Duration) -> Self {
        Self {
            link,
            speeds,
            stepper: StepRotationController::new(timing, speeds.rotation),
            receiver: None,
            ping_period,
            last_ping: tokio::time::Instant::now(),
            connected: false,
            stream_connected: false,
            last_frame: None,
        }
    }

    pub fn with_stream(mut self, receiver: StreamReceiver) -> Self {
        self.receiver = Some(receiver);
        self
    }

    /// Command-link liveness from the last ping
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Last camera frame received, kept until a newer one arrives
    pub fn last_frame(&self) -> Option<&Arc<Frame>> {
        self.last_frame.as_ref()
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Initial liveness check
    pub async fn connect(&mut self) -> bool {
        self.connected = self.link.ping().await;
        self.last_ping = tokio::time::Instant::now();
        if self.connected {
            info!("[operator] robot ONLINE");
        } else {
            warn!("[operator] robot OFFLINE - commands suspended until it answers");
        }
        self.connected
    }

    /// One control cycle
    pub async fn tick(&mut self, intent: Option<Action>) -> RotationPhase {
        let mut phase = RotationPhase::Idle;

        if self.connected {
            match intent {
                Some(action) if action.is_turn() => {
                    phase = self.stepper.update(intent, &self.link).await;
                }
                other => {
                    self.stepper.update(None, &self.link).await;
                    let command = match other {
                        Some(Action::Forward) => Command::new(Action::Forward, self.speeds.forward),
                        Some(Action::Backward) => {
                            Command::new(Action::Backward, self.speeds.backward)
                        }
                        _ => Command::stop(),
                    };
                    self.link.send(command).await;
                }
            }
        }

        if self.last_ping.elapsed() >= self.ping_period {
            let alive = self.link.ping().await;
            self.last_ping = tokio::time::Instant::now();
            if alive != self.connected {
                if alive {
                    info!("[operator] robot back ONLINE");
                } else {
                    warn!("[operator] robot stopped answering");
                }
            }
            self.connected = alive;
        }

        if let Some(receiver) = &self.receiver {
            if let Some(frame) = receiver.take_frame() {
                self.last_frame = Some(frame);
            }
            let streaming = receiver.is_connected();
            if streaming != self.stream_connected {
                info!(
                    "[operator] camera {}",
                    if streaming { "live" } else { "lost" }
                );
                self.stream_connected = streaming;
            }
        }

        phase
    }

    /// Tick at `hz` until the source asks to quit
    pub async fn run<S: IntentSource>(&mut self, source: &mut S, hz: u64) -> io::Result<()> {
        let period = Duration::from_secs_f64(1.0 / hz.max(1) as f64);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match source.poll_input()? {
                OperatorInput::Quit => break,
                OperatorInput::Intent(intent) => {
                    self.tick(intent).await;
                }
            }
        }
        Ok(())
    }

    /// Stop the robot and the stream receiver
    pub async fn shutdown(self) {
        if !self.link.send(Command::stop()).await {
            warn!("[operator] final stop not acknowledged");
        }
        if let Some(receiver) = self.receiver {
            receiver.shutdown().await;
        }
        info!("[operator] shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeLink {
        alive: AtomicBool,
        pings: AtomicUsize,
        sent: Mutex<Vec<Command>>,
    }

    impl FakeLink {
        fn alive() -> Self {
            let link = Self::default();
            link.alive.store(true, Ordering::SeqCst);
            link
        }

        fn sent(&self) -> Vec<Command> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RobotLink for FakeLink {
        async fn send(&self, command: Command) -> bool {
            self.sent.lock().unwrap().push(command);
            self.alive.load(Ordering::SeqCst)
        }

        async fn ping(&self) -> bool {
            self.pings.fetch_add(1, Ordering::SeqCst);
            self.alive.load(Ordering::SeqCst)
        }
    }

    fn operator(link: FakeLink) -> Operator<FakeLink> {
        Operator::new(
            link,
            Speeds::default(),
            StepTiming::default(),
            Duration::from_secs(3),
        )
    }

    #[test]
    fn test_key_mapping() {
        assert_eq!(
            key_input(KeyCode::Char('w')),
            OperatorInput::Intent(Some(Action::Forward))
        );
        assert_eq!(
            key_input(KeyCode::Char('d')),
            OperatorInput::Intent(Some(Action::Right))
        );
        assert_eq!(key_input(KeyCode::Esc), OperatorInput::Quit);
        assert_eq!(
            key_input(KeyCode::Char('x')),
            OperatorInput::Intent(Some(Action::Stop))
        );
    }

    #[tokio::test]
    async fn test_offline_robot_gets_no_commands() {
        let mut op = operator(FakeLink::default());
        assert!(!op.connect().await);

        op.tick(Some(Action::Forward)).await;
        op.tick(Some(Action::Left)).await;
        assert!(op.link().sent().is_empty());
    }

    #[tokio::test]
    async fn test_straight_moves_sent_every_tick() {
        let mut op = operator(FakeLink::alive());
        assert!(op.connect().await);

        op.tick(Some(Action::Forward)).await;
        op.tick(Some(Action::Backward)).await;
        op.tick(None).await;

        assert_eq!(
            op.link().sent(),
            vec![
                Command::new(Action::Forward, 80),
                Command::new(Action::Backward, 80),
                Command::stop(),
            ]
        );
    }

    #[tokio::test]
    async fn test_turn_goes_through_stepper() {
        let mut op = operator(FakeLink::alive());
        op.connect().await;

        assert_eq!(op.tick(Some(Action::Left)).await, RotationPhase::Pulsing);
        // Mid-pulse: nothing new to send
        op.tick(Some(Action::Left)).await;
        // Release: stepper stops once, then the direct stop
        op.tick(Some(Action::Stop)).await;

        assert_eq!(
            op.link().sent(),
            vec![Command::new(Action::Left, 60), Command::stop(), Command::stop()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_ping_tracks_liveness() {
        let mut op = operator(FakeLink::alive());
        op.connect().await;

        op.tick(None).await;
        assert_eq!(op.link().pings.load(Ordering::SeqCst), 1);

        op.link().alive.store(false, Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(3)).await;
        op.tick(None).await;
        assert_eq!(op.link().pings.load(Ordering::SeqCst), 2);
        assert!(!op.is_connected());

        // Offline: ticks send nothing
        let before = op.link().sent().len();
        op.tick(Some(Action::Forward)).await;
        assert_eq!(op.link().sent().len(), before);

        op.link().alive.store(true, Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(3)).await;
        op.tick(None).await;
        assert!(op.is_connected());
    }

    struct Script(VecDeque<OperatorInput>);

    impl IntentSource for Script {
        fn poll_input(&mut self) -> io::Result<OperatorInput> {
            Ok(self.0.pop_front().unwrap_or(OperatorInput::Quit))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_quit_then_stop() {
        let link = Arc::new(FakeLink::alive());
        let mut op = Operator::new(
            Arc::clone(&link),
            Speeds::default(),
            StepTiming::default(),
            Duration::from_secs(3),
        );
        op.connect().await;

        let mut script = Script(VecDeque::from([
            OperatorInput::Intent(Some(Action::Forward)),
            OperatorInput::Intent(Some(Action::Forward)),
            OperatorInput::Quit,
            OperatorInput::Intent(Some(Action::Backward)),
        ]));
        op.run(&mut script, 30).await.unwrap();
        assert_eq!(script.0.len(), 1);

        op.shutdown().await;
        assert_eq!(
            link.sent(),
            vec![
                Command::new(Action::Forward, 80),
                Command::new(Action::Forward, 80),
                Command::stop(),
            ]
        );
    }
}
