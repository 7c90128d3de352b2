//! Tracking lifecycle of one session.
//!
//! ```text
//! Uninitialized --start--> Acquiring --fix--> Tracking <--fix-- Degraded
//!                                                 \--no fix > 3 s--^
//! any --stop / fatal--> Stopped
//! ```

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingState {
    /// Session created but not started
    Uninitialized,
    /// Started, waiting for the first valid fix
    Acquiring,
    Tracking,
    /// No real fix for longer than the staleness window; output is dead-reckoned
    Degraded,
    /// Terminal
    Stopped,
}

impl TrackingState {
    pub fn is_running(self) -> bool {
        matches!(
            self,
            TrackingState::Acquiring | TrackingState::Tracking | TrackingState::Degraded
        )
    }
}

impl std::fmt::Display for TrackingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Uninitialized => "uninitialized",
            Self::Acquiring => "acquiring",
            Self::Tracking => "tracking",
            Self::Degraded => "degraded",
            Self::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TrackingEvent {
    Start,
    /// A fix passed the position filter
    RealFix { timestamp: f64 },
    Tick { now: f64 },
    Stop,
    /// Unrecoverable acquisition failure
    Fatal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateTransition {
    pub from: TrackingState,
    pub to: TrackingState,
}

pub struct TrackingStateMachine {
    state: TrackingState,
    last_fix_at: Option<f64>,
    staleness_secs: f64,
}

impl TrackingStateMachine {
    pub fn new(staleness_secs: f64) -> Self {
        Self {
            state: TrackingState::Uninitialized,
            last_fix_at: None,
            staleness_secs,
        }
    }

    pub fn state(&self) -> TrackingState {
        self.state
    }

    pub fn last_fix_at(&self) -> Option<f64> {
        self.last_fix_at
    }

    /// Apply an event; returns the transition if the state changed.
    pub fn handle(&mut self, event: TrackingEvent) -> Option<StateTransition> {
        use TrackingState::*;

        let next = match (self.state, event) {
            (Stopped, _) => None,
            (_, TrackingEvent::Stop) | (_, TrackingEvent::Fatal) => Some(Stopped),

            (Uninitialized, TrackingEvent::Start) => Some(Acquiring),
            (Uninitialized, _) => None,

            (Acquiring | Degraded | Tracking, TrackingEvent::RealFix { timestamp }) => {
                self.last_fix_at = Some(timestamp);
                (self.state != Tracking).then_some(Tracking)
            }

            (Tracking, TrackingEvent::Tick { now }) => match self.last_fix_at {
                Some(at) if now - at > self.staleness_secs => Some(Degraded),
                _ => None,
            },

            (Acquiring | Tracking | Degraded, TrackingEvent::Start | TrackingEvent::Tick { .. }) => None,
        };

        let to = next?;
        let transition = StateTransition {
            from: self.state,
            to,
        };
        self.state = to;
        log::info!("tracking state {} -> {}", transition.from, transition.to);
        Some(transition)
    }
}

impl Default for TrackingStateMachine {
    fn default() -> Self {
        Self::new(3.0)
    }
}
