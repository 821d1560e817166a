use bit_set::BitSet;
use tracing::trace;

use crate::dfa::DfaStateId;
use crate::nfa::{StateId, Symbol};

/// Checkpoints reported by the construction algorithms.
#[derive(Debug, Clone, Copy)]
pub enum TraceEvent<'a> {
    NfaStateCreated(StateId),
    NfaTransitionAdded {
        from: StateId,
        symbol: Symbol,
        to: StateId,
    },
    DfaStateCreated {
        id: DfaStateId,
        nfa_states: &'a BitSet,
        accepting: bool,
    },
    DfaStateReused {
        id: DfaStateId,
        nfa_states: &'a BitSet,
    },
    DfaTransitionAdded {
        from: DfaStateId,
        symbol: char,
        to: DfaStateId,
    },
    PartitionSplit {
        round: usize,
        block: &'a BitSet,
        into: usize,
    },
    RefinementRound {
        round: usize,
        blocks: usize,
    },
}

/// Receives [`TraceEvent`]s while an expression is being compiled.
pub trait Observer {
    fn observe(&mut self, event: TraceEvent<'_>);
}

impl<F> Observer for F
where
    F: FnMut(TraceEvent<'_>),
{
    fn observe(&mut self, event: TraceEvent<'_>) {
        self(event)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn observe(&mut self, _event: TraceEvent<'_>) {}
}

/// Forwards every event to `tracing` at trace level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn observe(&mut self, event: TraceEvent<'_>) {
        match event {
            TraceEvent::NfaStateCreated(id) => trace!("created nfa state {}", id),
            TraceEvent::NfaTransitionAdded { from, symbol, to } => {
                trace!("nfa transition {} --{}--> {}", from, symbol, to)
            }
            TraceEvent::DfaStateCreated {
                id,
                nfa_states,
                accepting,
            } => trace!(
                "created dfa state {} for nfa states {:?} (accepting: {})",
                id,
                nfa_states,
                accepting
            ),
            TraceEvent::DfaStateReused { id, nfa_states } => {
                trace!("found existing dfa state {} for nfa states {:?}", id, nfa_states)
            }
            TraceEvent::DfaTransitionAdded { from, symbol, to } => {
                trace!("dfa transition {} --{}--> {}", from, symbol, to)
            }
            TraceEvent::PartitionSplit { round, block, into } => {
                trace!("round {}: split block {:?} into {} blocks", round, block, into)
            }
            TraceEvent::RefinementRound { round, blocks } => {
                trace!("round {} finished with {} blocks", round, blocks)
            }
        }
    }
}
