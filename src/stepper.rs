// Micro-step rotation
// At the AlphaBot's lowest reliable duty cycle a continuous spin overshoots,
// so a held turn is sent as short drive pulses separated by stops.

use std::time::Instant;

use tracing::debug;

use crate::channel::RobotLink;
use crate::config::StepTiming;
use crate::messages::{Action, Command};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationPhase {
    Idle,
    Pulsing,
    Pausing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnDirection {
    Left,
    Right,
}

impl TurnDirection {
    pub fn from_action(action: Action) -> Option<Self> {
        match action {
            Action::Left => Some(TurnDirection::Left),
            Action::Right => Some(TurnDirection::Right),
            _ => None,
        }
    }

    pub fn action(self) -> Action {
        match self {
            TurnDirection::Left => Action::Left,
            TurnDirection::Right => Action::Right,
        }
    }
}

pub struct StepRotationController {
    timing: StepTiming,
    speed: u8,
    phase: RotationPhase,
    direction: Option<TurnDirection>,
    phase_start: Instant,
}

impl StepRotationController {
    pub fn new(timing: StepTiming, speed: u8) -> Self {
        Self {
            timing,
            speed,
            phase: RotationPhase::Idle,
            direction: None,
            phase_start: Instant::now(),
        }
    }

    pub fn phase(&self) -> RotationPhase {
        self.phase
    }

    pub fn direction(&self) -> Option<TurnDirection> {
        self.direction
    }

    fn drive(&self, direction: TurnDirection) -> Command {
        Command::new(direction.action(), self.speed)
    }

    fn enter(&mut self, phase: RotationPhase, now: Instant) {
        self.phase = phase;
        self.phase_start = now;
    }

    /// Advance the state machine to `now`.
    ///
    /// Returns the phase after this tick and the command to send, if any.
    /// Any intent other than Left/Right counts as no turn.
    pub fn tick(
        &mut self,
        intent: Option<Action>,
        now: Instant,
    ) -> (RotationPhase, Option<Command>) {
        let Some(direction) = intent.and_then(TurnDirection::from_action) else {
            if self.phase == RotationPhase::Idle {
                return (RotationPhase::Idle, None);
            }
            self.phase = RotationPhase::Idle;
            self.direction = None;
            return (RotationPhase::Idle, Some(Command::stop()));
        };

        // New direction preempts whatever pulse or pause is in progress
        if self.direction != Some(direction) {
            self.direction = Some(direction);
            self.enter(RotationPhase::Pulsing, now);
            return (RotationPhase::Pulsing, Some(self.drive(direction)));
        }

        let elapsed = now.saturating_duration_since(self.phase_start);
        let command = match self.phase {
            RotationPhase::Pulsing if elapsed >= self.timing.pulse => {
                self.enter(RotationPhase::Pausing, now);
                Some(Command::stop())
            }
            RotationPhase::Pausing if elapsed >= self.timing.pause => {
                self.enter(RotationPhase::Pulsing, now);
                Some(self.drive(direction))
            }
            _ => None,
        };
        (self.phase, command)
    }

    /// Tick against the wall clock and send whatever the tick produced
    pub async fn update<L: RobotLink + ?Sized>(
        &mut self,
        intent: Option<Action>,
        link: &L,
    ) -> RotationPhase {
        let (phase, command) = self.tick(intent, Instant::now());
        if let Some(command) = command {
            if !link.send(command).await {
                debug!("[stepper] {} not acknowledged", command.action);
            }
        }
        phase
    }
}
