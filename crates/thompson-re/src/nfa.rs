use std::collections::{BTreeSet, VecDeque};
use std::fmt::{self, Display};

use bit_set::BitSet;
use thiserror::Error;
use thompson_util::make_type_idx;
use tracing::debug;

use crate::observe::{Observer, TraceEvent};
use crate::postfix::{Postfix, Token};

/// Transition label. Epsilon is its own variant so no input character can be
/// mistaken for a free move.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Symbol {
    Epsilon,
    Char(char),
}

impl Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Epsilon => write!(f, "ε"),
            Symbol::Char(c) => write!(f, "{}", c),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NfaState {
    pub(crate) accepting: bool,
    pub(crate) transitions: Vec<(Symbol, StateId)>,
}

impl NfaState {
    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    pub fn transitions(&self) -> &[(Symbol, StateId)] {
        &self.transitions
    }
}

make_type_idx!(pub StateId, NfaState);

/// Owns every state created while building one NFA. Ids are handed out in
/// creation order and are only meaningful for this arena.
#[derive(Debug, Default)]
pub struct StateArena {
    states: Vec<NfaState>,
}

impl StateArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn create(&mut self, accepting: bool, observer: &mut impl Observer) -> StateId {
        let id = StateId::from_push(
            &mut self.states,
            NfaState {
                accepting,
                transitions: Vec::new(),
            },
        );
        observer.observe(TraceEvent::NfaStateCreated(id));
        id
    }

    fn connect(&mut self, from: StateId, symbol: Symbol, to: StateId, observer: &mut impl Observer) {
        self.states[from].transitions.push((symbol, to));
        observer.observe(TraceEvent::NfaTransitionAdded { from, symbol, to });
    }

    fn demote(&mut self, id: StateId) {
        self.states[id].accepting = false;
    }
}

/// Partially built automaton with exactly one start and one accept state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment {
    pub start: StateId,
    pub accept: StateId,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConstructionError {
    #[error("postfix expression is empty")]
    Empty,
    #[error("operator '{operator}' at postfix position {position} is missing an operand")]
    StackUnderflow { operator: char, position: usize },
    #[error("{0} fragments left after construction, expected exactly one")]
    DanglingFragments(usize),
    /// Internal guard: the parser never leaves parentheses in its output, so
    /// this only comes from a hand-built `Postfix`.
    #[error("unexpected token {0:?} in postfix expression")]
    UnexpectedToken(Token),
}

/// Thompson NFA for a whole expression.
#[derive(Debug)]
pub struct Nfa {
    pub(crate) states: Vec<NfaState>,
    pub(crate) start: StateId,
    pub(crate) accept: StateId,
}

/// Evaluates a postfix expression with a stack of [`Fragment`]s.
pub struct NfaBuilder<'o, O: Observer> {
    arena: StateArena,
    stack: Vec<Fragment>,
    observer: &'o mut O,
}

impl<'o, O: Observer> NfaBuilder<'o, O> {
    pub fn new(observer: &'o mut O) -> Self {
        Self {
            arena: StateArena::new(),
            stack: Vec::new(),
            observer,
        }
    }

    pub fn build(mut self, postfix: &Postfix) -> Result<Nfa, ConstructionError> {
        if postfix.tokens.is_empty() {
            return Err(ConstructionError::Empty);
        }

        for (position, token) in postfix.tokens.iter().copied().enumerate() {
            let fragment = match token {
                Token::Literal(c) => self.atom(Symbol::Char(c)),
                // the blank atom always matches the empty string
                Token::Blank => self.atom(Symbol::Epsilon),
                Token::Concat => {
                    let (a, b) = self.pop_pair('.', position)?;
                    self.concatenate(a, b)
                }
                Token::Alternate => {
                    let (a, b) = self.pop_pair('|', position)?;
                    self.alternate(a, b)
                }
                Token::Star => {
                    let a = self.pop('*', position)?;
                    self.kleene_star(a)
                }
                Token::LParen | Token::RParen => {
                    return Err(ConstructionError::UnexpectedToken(token))
                }
            };
            self.stack.push(fragment);
        }

        if self.stack.len() != 1 {
            return Err(ConstructionError::DanglingFragments(self.stack.len()));
        }
        let Fragment { start, accept } = self.stack[0];

        debug!(
            "built nfa with {} states from postfix {}",
            self.arena.len(),
            postfix
        );

        Ok(Nfa {
            states: self.arena.states,
            start,
            accept,
        })
    }

    fn pop(&mut self, operator: char, position: usize) -> Result<Fragment, ConstructionError> {
        self.stack
            .pop()
            .ok_or(ConstructionError::StackUnderflow { operator, position })
    }

    // right operand is on top of the stack
    fn pop_pair(
        &mut self,
        operator: char,
        position: usize,
    ) -> Result<(Fragment, Fragment), ConstructionError> {
        let b = self.pop(operator, position)?;
        let a = self.pop(operator, position)?;
        Ok((a, b))
    }

    fn atom(&mut self, symbol: Symbol) -> Fragment {
        let start = self.arena.create(false, self.observer);
        let accept = self.arena.create(true, self.observer);
        self.arena.connect(start, symbol, accept, self.observer);
        Fragment { start, accept }
    }

    // b's start state is left behind in the arena with no transitions
    fn concatenate(&mut self, a: Fragment, b: Fragment) -> Fragment {
        let spliced = std::mem::take(&mut self.arena.states[b.start].transitions);
        for (symbol, to) in spliced {
            self.arena.connect(a.accept, symbol, to, self.observer);
        }
        self.arena.demote(a.accept);
        Fragment {
            start: a.start,
            accept: b.accept,
        }
    }

    fn alternate(&mut self, a: Fragment, b: Fragment) -> Fragment {
        let start = self.arena.create(false, self.observer);
        let accept = self.arena.create(true, self.observer);
        self.arena.connect(start, Symbol::Epsilon, a.start, self.observer);
        self.arena.connect(start, Symbol::Epsilon, b.start, self.observer);
        self.arena.connect(a.accept, Symbol::Epsilon, accept, self.observer);
        self.arena.connect(b.accept, Symbol::Epsilon, accept, self.observer);
        self.arena.demote(a.accept);
        self.arena.demote(b.accept);
        Fragment { start, accept }
    }

    fn kleene_star(&mut self, a: Fragment) -> Fragment {
        let start = self.arena.create(false, self.observer);
        let accept = self.arena.create(true, self.observer);
        self.arena.connect(start, Symbol::Epsilon, accept, self.observer);
        self.arena.connect(start, Symbol::Epsilon, a.start, self.observer);
        self.arena.connect(a.accept, Symbol::Epsilon, accept, self.observer);
        self.arena.connect(a.accept, Symbol::Epsilon, a.start, self.observer);
        self.arena.demote(a.accept);
        Fragment { start, accept }
    }
}

impl Nfa {
    pub fn from_postfix(postfix: &Postfix, observer: &mut impl Observer) -> Result<Nfa, ConstructionError> {
        NfaBuilder::new(observer).build(postfix)
    }

    pub fn start(&self) -> StateId {
        self.start
    }

    pub fn accept(&self) -> StateId {
        self.accept
    }

    pub fn states(&self) -> &[NfaState] {
        &self.states
    }

    pub fn state(&self, id: StateId) -> &NfaState {
        &self.states[id]
    }

    // states spliced away during concatenation are still in the arena but
    // can't be reached from the start state
    pub fn reachable(&self) -> BitSet {
        let mut visited = BitSet::with_capacity(self.states.len());
        let mut stack = vec![self.start];
        while let Some(id) = stack.pop() {
            if !visited.insert(id.index()) {
                continue;
            }
            for (_, next) in &self.states[id].transitions {
                if !visited.contains(next.index()) {
                    stack.push(*next);
                }
            }
        }
        visited
    }

    /// Literal symbols on the transitions of every reachable state.
    pub fn alphabet(&self) -> BTreeSet<char> {
        self.reachable()
            .iter()
            .flat_map(|i| self.states[i].transitions.iter())
            .filter_map(|(symbol, _)| match symbol {
                Symbol::Char(c) => Some(*c),
                Symbol::Epsilon => None,
            })
            .collect()
    }

    pub fn is_accepting_set(&self, set: &BitSet) -> bool {
        set.iter().any(|i| self.states[i].accepting)
    }

    // basic BFS to compute epsilon closure in place
    pub fn epsilon_closure(&self, set: &mut BitSet) {
        let mut queue: VecDeque<usize> = set.iter().collect();

        while let Some(i) = queue.pop_front() {
            for (symbol, next) in &self.states[i].transitions {
                if *symbol == Symbol::Epsilon && set.insert(next.index()) {
                    queue.push_back(next.index());
                }
            }
        }
    }

    /// States reachable from `set` by one transition labelled `c`.
    pub fn step(&self, set: &BitSet, c: char) -> BitSet {
        let mut result = BitSet::with_capacity(self.states.len());

        for i in set.iter() {
            for (symbol, next) in &self.states[i].transitions {
                if *symbol == Symbol::Char(c) {
                    result.insert(next.index());
                }
            }
        }

        result
    }

    pub fn start_closure(&self) -> BitSet {
        let mut set = BitSet::with_capacity(self.states.len());
        set.insert(self.start.index());
        self.epsilon_closure(&mut set);
        set
    }

    pub fn simulate(&self, input: &str) -> bool {
        let mut current = self.start_closure();
        for c in input.chars() {
            current = self.step(&current, c);
            if current.is_empty() {
                return false;
            }
            self.epsilon_closure(&mut current);
        }
        self.is_accepting_set(&current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observe::NoopObserver;
    use crate::{postfix, Config};

    fn build(expr: &str) -> Nfa {
        let postfix = postfix::parse(expr, &Config::default()).expect("should parse");
        Nfa::from_postfix(&postfix, &mut NoopObserver).expect("should build")
    }

    fn accepting_states(nfa: &Nfa) -> Vec<StateId> {
        (0..nfa.states.len())
            .map(StateId::from_index)
            .filter(|id| nfa.states[*id].accepting)
            .collect()
    }

    #[test_log::test]
    fn single_literal() {
        let nfa = build("a");
        assert_eq!(nfa.states().len(), 2);
        assert_eq!(nfa.state(nfa.start()).transitions(), &[(Symbol::Char('a'), nfa.accept())]);
        assert_eq!(accepting_states(&nfa), vec![nfa.accept()]);
    }

    #[test]
    fn one_accept_state_after_every_operator() {
        for expr in ["ab", "a|b", "a*", "(a|b)*abb", "a b", "(ab)*|c"] {
            let nfa = build(expr);
            assert_eq!(accepting_states(&nfa), vec![nfa.accept()], "{}", expr);
        }
    }

    #[test]
    fn concatenation_splices_right_start() {
        let nfa = build("ab");
        // a: S0 -> S1, b: S2 -> S3, S2 is orphaned by the splice
        assert_eq!(nfa.states().len(), 4);
        assert!(nfa.state(StateId::from_index(2)).transitions().is_empty());
        assert_eq!(
            nfa.state(StateId::from_index(1)).transitions(),
            &[(Symbol::Char('b'), StateId::from_index(3))]
        );
        assert_eq!(nfa.reachable().len(), 3);
    }

    #[test]
    fn blank_atom_is_epsilon() {
        let nfa = build(" ");
        assert_eq!(
            nfa.state(nfa.start()).transitions(),
            &[(Symbol::Epsilon, nfa.accept())]
        );
        assert!(nfa.alphabet().is_empty());
        assert!(nfa.simulate(""));
        assert!(!nfa.simulate(" "));
    }

    #[test]
    fn closure_and_step() {
        let nfa = build("a*");
        let closure = nfa.start_closure();
        assert!(closure.contains(nfa.accept().index()));
        let mut next = nfa.step(&closure, 'a');
        assert_eq!(next.len(), 1);
        nfa.epsilon_closure(&mut next);
        assert!(next.contains(nfa.accept().index()));
        assert!(nfa.step(&closure, 'b').is_empty());
        assert_eq!(nfa.alphabet().into_iter().collect::<Vec<_>>(), vec!['a']);
    }

    #[test]
    fn simulation() {
        let nfa = build("(a|b)*abb");
        assert!(nfa.simulate("abb"));
        assert!(nfa.simulate("babaabb"));
        assert!(!nfa.simulate("ab"));
        assert!(!nfa.simulate("abba"));
    }

    #[test]
    fn malformed_postfix() {
        let config = Config::default();
        let cases = [
            ("a|", ConstructionError::StackUnderflow { operator: '|', position: 1 }),
            ("*", ConstructionError::StackUnderflow { operator: '*', position: 0 }),
            ("|b", ConstructionError::StackUnderflow { operator: '|', position: 1 }),
        ];
        for (expr, expected) in cases {
            let postfix = postfix::parse(expr, &config).expect("should parse");
            let err = Nfa::from_postfix(&postfix, &mut NoopObserver).expect_err("should fail");
            assert_eq!(err, expected, "{}", expr);
        }

        let postfix = postfix::parse("()", &config).expect("should parse");
        assert_eq!(
            Nfa::from_postfix(&postfix, &mut NoopObserver).expect_err("should fail"),
            ConstructionError::Empty
        );
    }

    #[test]
    fn parenthesis_in_postfix_is_rejected() {
        let postfix = Postfix {
            tokens: vec![Token::Literal('a'), Token::LParen],
            blank: ' ',
        };
        assert_eq!(
            Nfa::from_postfix(&postfix, &mut NoopObserver).expect_err("should fail"),
            ConstructionError::UnexpectedToken(Token::LParen)
        );
    }

    #[test]
    fn observer_sees_every_state() {
        let postfix = postfix::parse("a|b", &Config::default()).expect("should parse");
        let mut created = 0;
        let mut transitions = 0;
        let mut observer = |event: TraceEvent<'_>| match event {
            TraceEvent::NfaStateCreated(_) => created += 1,
            TraceEvent::NfaTransitionAdded { .. } => transitions += 1,
            _ => {}
        };
        let nfa = Nfa::from_postfix(&postfix, &mut observer).expect("should build");
        assert_eq!(created, nfa.states().len());
        assert_eq!(transitions, 6);
    }
}
