//! Pomodoro cycles: work phases separated by short breaks, with a long break
//! after every few work phases.
//!
//! `PomodoroTimer` is a pure state machine driven by `tick`; it never reads the
//! clock itself, so clients and tests control time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Corresponds to the `pomodoro_phase` SQL enum.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "pomodoro_phase", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PomodoroPhase {
    Work,
    ShortBreak,
    LongBreak,
}

impl PomodoroPhase {
    pub fn is_break(&self) -> bool {
        !matches!(self, PomodoroPhase::Work)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PomodoroSettings {
    pub work_minutes: u32,
    pub short_break_minutes: u32,
    pub long_break_minutes: u32,
    /// A long break replaces the short one after this many work phases.
    pub sessions_before_long_break: u32,
    /// Start breaks automatically when a work phase ends.
    pub auto_start_breaks: bool,
}

impl Default for PomodoroSettings {
    fn default() -> Self {
        Self {
            work_minutes: 25,
            short_break_minutes: 5,
            long_break_minutes: 15,
            sessions_before_long_break: 4,
            auto_start_breaks: false,
        }
    }
}

impl PomodoroSettings {
    pub fn check(&self) -> Result<(), String> {
        if !(1..=180).contains(&self.work_minutes) {
            return Err("work_minutes must be between 1 and 180".into());
        }
        if !(1..=60).contains(&self.short_break_minutes) {
            return Err("short_break_minutes must be between 1 and 60".into());
        }
        if !(1..=120).contains(&self.long_break_minutes) {
            return Err("long_break_minutes must be between 1 and 120".into());
        }
        if !(1..=12).contains(&self.sessions_before_long_break) {
            return Err("sessions_before_long_break must be between 1 and 12".into());
        }
        Ok(())
    }

    pub fn duration_of(&self, phase: PomodoroPhase) -> Duration {
        let minutes = match phase {
            PomodoroPhase::Work => self.work_minutes,
            PomodoroPhase::ShortBreak => self.short_break_minutes,
            PomodoroPhase::LongBreak => self.long_break_minutes,
        };
        Duration::from_secs(u64::from(minutes) * 60)
    }

    /// Phase that follows `current`, given the number of work phases completed so far
    /// (including `current` if it was a work phase).
    pub fn phase_after(&self, current: PomodoroPhase, completed_work_sessions: u32) -> PomodoroPhase {
        match current {
            PomodoroPhase::Work => {
                let every = self.sessions_before_long_break.max(1);
                if completed_work_sessions > 0 && completed_work_sessions % every == 0 {
                    PomodoroPhase::LongBreak
                } else {
                    PomodoroPhase::ShortBreak
                }
            }
            PomodoroPhase::ShortBreak | PomodoroPhase::LongBreak => PomodoroPhase::Work,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerState {
    Idle,
    Running,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    AlreadyRunning,
    NotRunning,
    NotPaused,
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TimerError::AlreadyRunning => write!(f, "timer is already running"),
            TimerError::NotRunning => write!(f, "timer is not running"),
            TimerError::NotPaused => write!(f, "timer is not paused"),
        }
    }
}

impl std::error::Error for TimerError {}

/// A phase ended, either by running out or by being skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTransition {
    pub from: PomodoroPhase,
    pub to: PomodoroPhase,
    /// `false` when the phase was skipped.
    pub completed: bool,
}

#[derive(Debug, Clone)]
pub struct PomodoroTimer {
    settings: PomodoroSettings,
    phase: PomodoroPhase,
    state: TimerState,
    remaining: Duration,
    completed_work_sessions: u32,
}

impl PomodoroTimer {
    pub fn new(settings: PomodoroSettings) -> Self {
        let remaining = settings.duration_of(PomodoroPhase::Work);
        Self {
            settings,
            phase: PomodoroPhase::Work,
            state: TimerState::Idle,
            remaining,
            completed_work_sessions: 0,
        }
    }

    pub fn phase(&self) -> PomodoroPhase {
        self.phase
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    pub fn completed_work_sessions(&self) -> u32 {
        self.completed_work_sessions
    }

    pub fn start(&mut self) -> Result<(), TimerError> {
        match self.state {
            TimerState::Idle => {
                self.state = TimerState::Running;
                Ok(())
            }
            TimerState::Running | TimerState::Paused => Err(TimerError::AlreadyRunning),
        }
    }

    pub fn pause(&mut self) -> Result<(), TimerError> {
        match self.state {
            TimerState::Running => {
                self.state = TimerState::Paused;
                Ok(())
            }
            _ => Err(TimerError::NotRunning),
        }
    }

    pub fn resume(&mut self) -> Result<(), TimerError> {
        match self.state {
            TimerState::Paused => {
                self.state = TimerState::Running;
                Ok(())
            }
            _ => Err(TimerError::NotPaused),
        }
    }

    /// Rebuilds a timer from phases already recorded, oldest first. The timer ends
    /// idle on the phase that should come next.
    pub fn replay(settings: PomodoroSettings, history: &[(PomodoroPhase, bool)]) -> Self {
        let mut timer = Self::new(settings);
        for &(phase, completed) in history {
            timer.phase = phase;
            timer.advance(completed);
        }
        timer.state = TimerState::Idle;
        timer
    }

    /// Back to an idle work phase with the cycle counter cleared.
    pub fn reset(&mut self) {
        *self = Self::new(self.settings.clone());
    }

    /// Ends the current phase early. Skipped work phases don't count towards a long break.
    pub fn skip(&mut self) -> PhaseTransition {
        self.advance(false)
    }

    /// Advances a running timer by `elapsed`. Time beyond the end of the phase is dropped.
    pub fn tick(&mut self, elapsed: Duration) -> Option<PhaseTransition> {
        if self.state != TimerState::Running {
            return None;
        }
        self.remaining = self.remaining.saturating_sub(elapsed);
        if self.remaining.is_zero() {
            Some(self.advance(true))
        } else {
            None
        }
    }

    fn advance(&mut self, completed: bool) -> PhaseTransition {
        let from = self.phase;
        if completed && from == PomodoroPhase::Work {
            self.completed_work_sessions += 1;
        }
        let to = if from == PomodoroPhase::Work && !completed {
            PomodoroPhase::ShortBreak
        } else {
            self.settings.phase_after(from, self.completed_work_sessions)
        };
        self.phase = to;
        self.remaining = self.settings.duration_of(to);
        self.state = if to.is_break() && self.settings.auto_start_breaks {
            TimerState::Running
        } else {
            TimerState::Idle
        };
        PhaseTransition {
            from,
            to,
            completed,
        }
    }
}
