// partition refinement: start from {accepting, non-accepting} and split blocks
// whose members disagree on which block each symbol leads to, until a round
// leaves the partition unchanged

use std::collections::BTreeMap;

use bit_set::BitSet;
use thiserror::Error;
use tracing::debug;

use crate::dfa::{Dfa, DfaState, DfaStateId};
use crate::observe::{Observer, TraceEvent};

/// Broken minimizer preconditions. A dfa produced by subset construction never
/// triggers any of these. They are returned instead of panicking when a
/// hand-built dfa or partition is malformed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("transition {state} --{symbol}--> {target} leads outside every partition block")]
    UnpartitionedTarget {
        state: DfaStateId,
        symbol: char,
        target: DfaStateId,
    },
    /// Internal guard: the start state is outside the partition, only possible
    /// when the dfa names a start it does not contain.
    #[error("state {0} belongs to no partition block")]
    UnpartitionedState(DfaStateId),
    /// Internal guard: refinement never produces an empty block.
    #[error("partition block {0} is empty")]
    EmptyBlock(usize),
}

type Signature = Vec<(usize, char)>;

/// Disjoint blocks of dfa states that together cover the whole automaton.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    blocks: Vec<BitSet>,
    block_of: Vec<Option<usize>>,
}

impl Partition {
    fn from_blocks(blocks: Vec<BitSet>, states: usize) -> Self {
        let mut block_of = vec![None; states];
        for (i, block) in blocks.iter().enumerate() {
            for state in block.iter() {
                if let Some(slot) = block_of.get_mut(state) {
                    *slot = Some(i);
                }
            }
        }
        Self { blocks, block_of }
    }

    // accepting states first, empty blocks left out
    pub fn initial(dfa: &Dfa) -> Self {
        let mut accepting = BitSet::with_capacity(dfa.len());
        let mut rejecting = BitSet::with_capacity(dfa.len());
        for state in dfa.states() {
            if state.is_accepting() {
                accepting.insert(state.id().index());
            } else {
                rejecting.insert(state.id().index());
            }
        }

        let blocks = [accepting, rejecting]
            .into_iter()
            .filter(|block| !block.is_empty())
            .collect();
        Self::from_blocks(blocks, dfa.len())
    }

    pub fn blocks(&self) -> &[BitSet] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block_of(&self, state: DfaStateId) -> Option<usize> {
        self.block_of.get(state.index()).copied().flatten()
    }

    fn signature(&self, state: &DfaState) -> Result<Signature, InvariantViolation> {
        // BTreeMap iteration keeps the signature sorted by symbol
        state
            .transitions
            .iter()
            .map(|(symbol, target)| {
                self.block_of(*target)
                    .map(|block| (block, *symbol))
                    .ok_or(InvariantViolation::UnpartitionedTarget {
                        state: state.id,
                        symbol: *symbol,
                        target: *target,
                    })
            })
            .collect()
    }

    fn refine(
        &self,
        dfa: &Dfa,
        round: usize,
        observer: &mut impl Observer,
    ) -> Result<Partition, InvariantViolation> {
        let mut blocks: Vec<BitSet> = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            let mut groups: BTreeMap<Signature, BitSet> = BTreeMap::new();
            for state in block.iter() {
                let signature = self.signature(&dfa.states[state])?;
                groups
                    .entry(signature)
                    .or_insert_with(|| BitSet::with_capacity(dfa.len()))
                    .insert(state);
            }

            if groups.len() > 1 {
                observer.observe(TraceEvent::PartitionSplit {
                    round,
                    block,
                    into: groups.len(),
                });
            }
            blocks.extend(groups.into_values());
        }

        Ok(Self::from_blocks(blocks, dfa.len()))
    }
}

// use partition refinement to minimize a DFA
pub fn minimize_dfa(dfa: &Dfa, observer: &mut impl Observer) -> Result<Dfa, InvariantViolation> {
    let mut partition = Partition::initial(dfa);
    let mut round = 0;

    // refinement only ever splits blocks, so comparing whole partitions is
    // exact where a block count could hide a reshuffle
    loop {
        round += 1;
        let refined = partition.refine(dfa, round, observer)?;
        observer.observe(TraceEvent::RefinementRound {
            round,
            blocks: refined.len(),
        });

        if refined == partition {
            break;
        }
        partition = refined;
    }

    let minimized = rebuild(dfa, &partition)?;
    debug!(
        "minimized {} dfa states to {} after {} rounds",
        dfa.len(),
        minimized.len(),
        round
    );
    Ok(minimized)
}

fn rebuild(dfa: &Dfa, partition: &Partition) -> Result<Dfa, InvariantViolation> {
    let mut states: Vec<DfaState> = Vec::with_capacity(partition.len());

    for (i, block) in partition.blocks().iter().enumerate() {
        let representative = block
            .iter()
            .next()
            .ok_or(InvariantViolation::EmptyBlock(i))?;
        let representative = &dfa.states[representative];

        let mut transitions = BTreeMap::new();
        for (symbol, target) in &representative.transitions {
            let block = partition
                .block_of(*target)
                .ok_or(InvariantViolation::UnpartitionedTarget {
                    state: representative.id,
                    symbol: *symbol,
                    target: *target,
                })?;
            transitions.insert(*symbol, DfaStateId::from_index(block));
        }

        let mut nfa_states = BitSet::new();
        for member in block.iter() {
            nfa_states.union_with(&dfa.states[member].nfa_states);
        }

        DfaStateId::from_push(
            &mut states,
            DfaState {
                id: DfaStateId::from_index(i),
                accepting: representative.accepting,
                nfa_states,
                transitions,
            },
        );
    }

    let start = partition
        .block_of(dfa.start)
        .ok_or(InvariantViolation::UnpartitionedState(dfa.start))?;

    Ok(Dfa {
        states,
        start: DfaStateId::from_index(start),
        alphabet: dfa.alphabet.clone(),
    })
}
