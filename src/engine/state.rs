//! Engine lifecycle state machine.
//!
//! Every public engine operation is gated on this machine; the adjacency
//! table below is the single source of truth for which transitions are
//! legal.  `transition_to` never panics on an illegal request: it logs a
//! warning, leaves the state unchanged and returns `false`, so callers can
//! treat a refused transition as a recoverable condition.

use std::fmt;

use crate::error::EngineError;
use crate::events::{EngineEvent, EventBus};

// ---------------------------------------------------------------------------
// EngineState
// ---------------------------------------------------------------------------

/// Lifecycle states of the noise-suppression engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum EngineState {
    /// Fresh engine, nothing allocated.
    Uninitialized,
    /// `initialize` is running its pre-flight checks.
    Initializing,
    /// Allocating the processing context (audio plumbing, worker pool).
    CreatingContext,
    /// The denoising model is being loaded and warmed up.
    LoadingModel,
    /// Fully initialized, no active sessions.
    Ready,
    /// At least one session is streaming.
    Processing,
    /// All sessions paused; the graph stays wired.
    Paused,
    /// Model load failed but the energy-gate fallback is active.
    Degraded,
    /// Teardown in progress.
    Destroying,
    /// Terminal: all resources released.
    Destroyed,
    /// A lifecycle operation failed; recovery is re-init or destroy.
    Error,
}

impl EngineState {
    /// The states reachable from `self` in one legal transition.
    pub fn legal_targets(self) -> &'static [EngineState] {
        use EngineState::*;
        match self {
            Uninitialized => &[Initializing, Error],
            Initializing => &[CreatingContext, LoadingModel, Ready, Degraded, Error],
            CreatingContext => &[LoadingModel, Ready, Degraded, Error],
            LoadingModel => &[Ready, Degraded, Error],
            Ready => &[Processing, Destroying, Error],
            Processing => &[Ready, Paused, Destroying, Error],
            Paused => &[Processing, Ready, Destroying, Error],
            Degraded => &[Processing, Destroying, Error],
            Destroying => &[Destroyed, Error],
            Destroyed => &[],
            Error => &[Initializing, Destroying],
        }
    }

    /// Pure adjacency lookup.
    pub fn can_transition_to(self, target: EngineState) -> bool {
        self.legal_targets().contains(&target)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Initializing => "initializing",
            EngineState::CreatingContext => "creating-context",
            EngineState::LoadingModel => "loading-model",
            EngineState::Ready => "ready",
            EngineState::Processing => "processing",
            EngineState::Paused => "paused",
            EngineState::Degraded => "degraded",
            EngineState::Destroying => "destroying",
            EngineState::Destroyed => "destroyed",
            EngineState::Error => "error",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// StateMachine
// ---------------------------------------------------------------------------

/// Current state plus the event channel transitions are announced on.
pub struct StateMachine {
    state: EngineState,
    events: EventBus,
}

impl StateMachine {
    pub fn new(events: EventBus) -> Self {
        Self {
            state: EngineState::Uninitialized,
            events,
        }
    }

    pub fn current(&self) -> EngineState {
        self.state
    }

    /// Attempt a transition.  On success the state is updated and exactly
    /// one `StateChanged { from, to }` event fires; an illegal request is
    /// logged and refused with the state unchanged.
    pub fn transition_to(&mut self, target: EngineState) -> bool {
        if !self.state.can_transition_to(target) {
            log::warn!(
                "illegal state transition refused: {} -> {}",
                self.state,
                target
            );
            return false;
        }
        let from = self.state;
        self.state = target;
        log::debug!("engine state: {from} -> {target}");
        self.events.emit(&EngineEvent::StateChanged { from, to: target });
        true
    }

    /// Guard for public operations: errors unless the current state is one
    /// of `allowed`.
    pub fn require(&self, allowed: &[EngineState]) -> Result<(), EngineError> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        Err(EngineError::NotInitialized {
            current: self.state.to_string(),
            required: allowed
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use EngineState::*;

    const ALL_STATES: [EngineState; 11] = [
        Uninitialized,
        Initializing,
        CreatingContext,
        LoadingModel,
        Ready,
        Processing,
        Paused,
        Degraded,
        Destroying,
        Destroyed,
        Error,
    ];

    #[test]
    fn full_transition_matrix_matches_the_table() {
        // Exhaustive check: every (from, to) pair behaves exactly as the
        // adjacency table says, nothing more and nothing less.
        for from in ALL_STATES {
            for to in ALL_STATES {
                let expected = from.legal_targets().contains(&to);
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "mismatch for {from} -> {to}"
                );

                let mut sm = StateMachine::new(EventBus::new());
                sm.state = from;
                assert_eq!(sm.transition_to(to), expected, "{from} -> {to}");
                let end = if expected { to } else { from };
                assert_eq!(sm.current(), end, "state after {from} -> {to}");
            }
        }
    }

    #[test]
    fn destroyed_is_terminal() {
        assert!(Destroyed.legal_targets().is_empty());
    }

    #[test]
    fn error_state_allows_reinit_and_destroy_only() {
        assert_eq!(Error.legal_targets(), &[Initializing, Destroying]);
    }

    #[test]
    fn successful_transition_emits_exactly_one_state_change() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        bus.subscribe(move |event| {
            if let EngineEvent::StateChanged { from, to } = event {
                assert_eq!(*from, Uninitialized);
                assert_eq!(*to, Initializing);
                hits2.fetch_add(1, Ordering::SeqCst);
            }
        });

        let mut sm = StateMachine::new(bus);
        assert!(sm.transition_to(Initializing));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn refused_transition_emits_nothing() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        bus.subscribe(move |_| {
            hits2.fetch_add(1, Ordering::SeqCst);
        });

        let mut sm = StateMachine::new(bus);
        assert!(!sm.transition_to(Ready)); // uninitialized -> ready is illegal
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(sm.current(), Uninitialized);
    }

    #[test]
    fn require_passes_for_allowed_states() {
        let mut sm = StateMachine::new(EventBus::new());
        sm.state = Ready;
        assert!(sm.require(&[Ready, Processing]).is_ok());
    }

    #[test]
    fn require_names_current_and_allowed_states() {
        let sm = StateMachine::new(EventBus::new());
        let err = sm.require(&[Ready, Processing]).unwrap_err();
        match err {
            EngineError::NotInitialized { current, required } => {
                assert_eq!(current, "uninitialized");
                assert!(required.contains("ready"));
                assert!(required.contains("processing"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn display_uses_kebab_case_names() {
        assert_eq!(CreatingContext.to_string(), "creating-context");
        assert_eq!(LoadingModel.to_string(), "loading-model");
    }
}
