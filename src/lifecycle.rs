//! Lifecycle / State Machine (C3, spec §4.8): a strict, table-driven
//! `created → initializing → ready → running → completed | failed`
//! machine. Grounded in `Process`'s small closed-enum-with-`Display` style,
//! generalized into an explicit transition table rather than exception
//! control flow, per the runtime's design note.

use std::fmt;

use crate::errors::InvalidTransition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Created,
    Initializing,
    Ready,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            State::Created => "created",
            State::Initializing => "initializing",
            State::Ready => "ready",
            State::Running => "running",
            State::Completed => "completed",
            State::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Initialize,
    Start,
    Complete,
    Fail,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Initialize => "initialize",
            Action::Start => "start",
            Action::Complete => "complete",
            Action::Fail => "fail",
        };
        write!(f, "{s}")
    }
}

fn transition_table(state: State, action: Action) -> Option<State> {
    use Action::*;
    use State::*;
    match (state, action) {
        (Created, Initialize) => Some(Initializing),
        (Initializing, Start) => Some(Ready),
        (Ready, Start) => Some(Running),
        (Running, Complete) => Some(Completed),
        // `fail` is reachable from any non-terminal state.
        (Created | Initializing | Ready | Running, Fail) => Some(Failed),
        _ => None,
    }
}

/// The outcome of a finished or failed run.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub success: bool,
    pub reason: String,
    pub iterations: u32,
}

/// The strict state machine wrapping one agent run. `stop()` is idempotent
/// once a terminal state is reached.
pub struct Lifecycle {
    state: State,
    result: Option<RunResult>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: State::Created,
            result: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, State::Completed | State::Failed)
    }

    fn transition(&mut self, action: Action) -> Result<State, InvalidTransition> {
        match transition_table(self.state, action) {
            Some(next) => {
                self.state = next;
                Ok(next)
            }
            None => Err(InvalidTransition {
                from: self.state.to_string(),
                action: action.to_string(),
            }),
        }
    }

    pub fn initialize(&mut self) -> Result<(), InvalidTransition> {
        self.transition(Action::Initialize).map(|_| ())
    }

    pub fn start(&mut self) -> Result<(), InvalidTransition> {
        self.transition(Action::Start).map(|_| ())
    }

    pub fn complete(&mut self, reason: impl Into<String>, iterations: u32) -> Result<(), InvalidTransition> {
        self.transition(Action::Complete)?;
        self.result = Some(RunResult {
            success: true,
            reason: reason.into(),
            iterations,
        });
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>, iterations: u32) -> Result<(), InvalidTransition> {
        self.transition(Action::Fail)?;
        self.result = Some(RunResult {
            success: false,
            reason: reason.into(),
            iterations,
        });
        Ok(())
    }

    /// Returns the recorded result if the machine has reached a terminal
    /// state, idempotently.
    pub fn stop(&self) -> Option<RunResult> {
        self.result.clone()
    }
}
