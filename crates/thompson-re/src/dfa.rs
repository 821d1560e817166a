use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use bit_set::BitSet;
use thompson_util::make_type_idx;
use tracing::debug;

use crate::nfa::Nfa;
use crate::observe::{Observer, TraceEvent};

#[derive(Debug, Clone)]
pub struct DfaState {
    pub(crate) id: DfaStateId,
    pub(crate) accepting: bool,
    // nfa states this state stands for, only kept for labelling
    pub(crate) nfa_states: BitSet,
    pub(crate) transitions: BTreeMap<char, DfaStateId>,
}

make_type_idx!(pub DfaStateId, DfaState);

impl DfaState {
    pub fn id(&self) -> DfaStateId {
        self.id
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    pub fn nfa_states(&self) -> &BitSet {
        &self.nfa_states
    }

    pub fn transitions(&self) -> &BTreeMap<char, DfaStateId> {
        &self.transitions
    }
}

/// Deterministic automaton with a partial transition function: a missing
/// transition rejects.
#[derive(Debug, Clone)]
pub struct Dfa {
    pub(crate) states: Vec<DfaState>,
    pub(crate) start: DfaStateId,
    pub(crate) alphabet: BTreeSet<char>,
}

impl Dfa {
    pub fn from_nfa(nfa: &Nfa, observer: &mut impl Observer) -> Dfa {
        SubsetConstruction::new(nfa, observer).run()
    }

    pub fn start(&self) -> DfaStateId {
        self.start
    }

    pub fn states(&self) -> &[DfaState] {
        &self.states
    }

    pub fn state(&self, id: DfaStateId) -> &DfaState {
        &self.states[id]
    }

    pub fn alphabet(&self) -> &BTreeSet<char> {
        &self.alphabet
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn accepting_states(&self) -> impl Iterator<Item = DfaStateId> + '_ {
        self.states.iter().filter(|s| s.accepting).map(|s| s.id)
    }

    pub fn next_state(&self, state: DfaStateId, c: char) -> Option<DfaStateId> {
        self.states[state].transitions.get(&c).copied()
    }

    pub fn simulate(&self, input: &str) -> bool {
        let mut state = self.start;
        for c in input.chars() {
            match self.next_state(state, c) {
                Some(next) => state = next,
                None => return false,
            }
        }
        self.states[state].accepting
    }
}

/// Subset label -> dfa state, scoped to one construction run.
#[derive(Debug, Default)]
pub struct DeduplicationTable {
    subsets: HashMap<BitSet, DfaStateId>,
}

impl DeduplicationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, set: &BitSet) -> Option<DfaStateId> {
        self.subsets.get(set).copied()
    }

    pub fn insert(&mut self, set: BitSet, id: DfaStateId) {
        self.subsets.insert(set, id);
    }

    pub fn len(&self) -> usize {
        self.subsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subsets.is_empty()
    }
}

// creates a DFA from an NFA using subset construction
pub struct SubsetConstruction<'n, 'o, O: Observer> {
    nfa: &'n Nfa,
    observer: &'o mut O,
    table: DeduplicationTable,
    states: Vec<DfaState>,
    // unexpanded states, paired with their nfa subset
    work_queue: VecDeque<(DfaStateId, BitSet)>,
}

impl<'n, 'o, O: Observer> SubsetConstruction<'n, 'o, O> {
    pub fn new(nfa: &'n Nfa, observer: &'o mut O) -> Self {
        Self {
            nfa,
            observer,
            table: DeduplicationTable::new(),
            states: Vec::new(),
            work_queue: VecDeque::new(),
        }
    }

    // returns the dfa state for `set`, creating and enqueueing it if unseen
    fn get_or_create(&mut self, set: BitSet) -> DfaStateId {
        if let Some(id) = self.table.get(&set) {
            self.observer.observe(TraceEvent::DfaStateReused {
                id,
                nfa_states: &set,
            });
            return id;
        }

        let accepting = self.nfa.is_accepting_set(&set);
        let id = DfaStateId::from_index(self.states.len());
        self.states.push(DfaState {
            id,
            accepting,
            nfa_states: set.clone(),
            transitions: BTreeMap::new(),
        });
        self.observer.observe(TraceEvent::DfaStateCreated {
            id,
            nfa_states: &set,
            accepting,
        });
        self.table.insert(set.clone(), id);
        self.work_queue.push_back((id, set));
        id
    }

    pub fn run(mut self) -> Dfa {
        let alphabet = self.nfa.alphabet();
        let start = self.get_or_create(self.nfa.start_closure());

        while let Some((current, current_set)) = self.work_queue.pop_front() {

            for c in alphabet.iter().copied() {
                let mut next_set = self.nfa.step(&current_set, c);
                if next_set.is_empty() {
                    continue;
                }
                self.nfa.epsilon_closure(&mut next_set);

                let target = self.get_or_create(next_set);
                self.states[current].transitions.insert(c, target);
                self.observer.observe(TraceEvent::DfaTransitionAdded {
                    from: current,
                    symbol: c,
                    to: target,
                });
            }
        }

        debug!(
            "subset construction produced {} dfa states over alphabet {:?}",
            self.states.len(),
            alphabet
        );

        Dfa {
            states: self.states,
            start,
            alphabet,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observe::NoopObserver;
    use crate::{postfix, Config};

    fn subset_dfa(expr: &str) -> (Nfa, Dfa) {
        let postfix = postfix::parse(expr, &Config::default()).expect("should parse");
        let nfa = Nfa::from_postfix(&postfix, &mut NoopObserver).expect("should build");
        let dfa = Dfa::from_nfa(&nfa, &mut NoopObserver);
        (nfa, dfa)
    }

    #[test_log::test]
    fn single_literal() {
        let (nfa, dfa) = subset_dfa("a");
        assert_eq!(dfa.len(), 2);
        assert_eq!(dfa.accepting_states().count(), 1);
        let start = dfa.state(dfa.start());
        assert!(!start.is_accepting());
        assert!(start.nfa_states().contains(nfa.start().index()));
        let next = dfa.next_state(dfa.start(), 'a').expect("transition on a");
        assert!(dfa.state(next).is_accepting());
        assert!(dfa.state(next).transitions().is_empty());
    }

    #[test]
    fn start_state_accepts_empty_word() {
        let (_, dfa) = subset_dfa("a*");
        assert!(dfa.state(dfa.start()).is_accepting());
        assert!(dfa.simulate(""));
        assert!(dfa.simulate("aaaa"));
        assert!(!dfa.simulate("ab"));
    }

    #[test]
    fn labels_are_unique() {
        let (_, dfa) = subset_dfa("(a|b)*abb");
        let labels: std::collections::HashSet<_> =
            dfa.states().iter().map(|s| s.nfa_states().clone()).collect();
        assert_eq!(labels.len(), dfa.len());
        for (i, state) in dfa.states().iter().enumerate() {
            assert_eq!(state.id().index(), i);
        }
    }

    #[test]
    fn partial_transition_function() {
        let (_, dfa) = subset_dfa("ab");
        assert_eq!(dfa.alphabet().iter().copied().collect::<Vec<_>>(), vec!['a', 'b']);
        assert_eq!(dfa.next_state(dfa.start(), 'b'), None);
        assert!(dfa.simulate("ab"));
        assert!(!dfa.simulate("a"));
        assert!(!dfa.simulate("ba"));
    }

    #[test]
    fn observer_sees_reuse() {
        let postfix = postfix::parse("(a|b)*", &Config::default()).expect("should parse");
        let nfa = Nfa::from_postfix(&postfix, &mut NoopObserver).expect("should build");
        let mut created = 0;
        let mut reused = 0;
        let mut observer = |event: TraceEvent<'_>| match event {
            TraceEvent::DfaStateCreated { .. } => created += 1,
            TraceEvent::DfaStateReused { .. } => reused += 1,
            _ => {}
        };
        let dfa = Dfa::from_nfa(&nfa, &mut observer);
        assert_eq!(created, dfa.len());
        assert!(reused > 0);
    }

    #[test]
    fn every_state_is_expanded() {
        let (nfa, dfa) = subset_dfa("(a|b)*abb|b*a");
        let mut expanded = std::collections::HashSet::new();
        let mut observer = |event: TraceEvent<'_>| {
            if let TraceEvent::DfaTransitionAdded { from, .. } = event {
                expanded.insert(from);
            }
        };
        let observed = Dfa::from_nfa(&nfa, &mut observer);
        assert_eq!(observed.len(), dfa.len());

        // each state's transitions are exactly the non-empty closed moves of its subset
        for state in dfa.states() {
            for c in dfa.alphabet().iter().copied() {
                let mut next = nfa.step(state.nfa_states(), c);
                let target = dfa.next_state(state.id(), c);
                if next.is_empty() {
                    assert_eq!(target, None, "{} on {}", state.id(), c);
                    continue;
                }
                nfa.epsilon_closure(&mut next);
                let target = target.expect("non-empty move needs a transition");
                assert_eq!(dfa.state(target).nfa_states(), &next);
                assert!(expanded.contains(&state.id()));
            }
        }
    }
}
