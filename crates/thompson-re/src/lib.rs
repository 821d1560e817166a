// regex -> postfix -> thompson nfa -> subset dfa -> minimal dfa

pub mod dfa;
pub mod graph;
pub mod minimize;
pub mod nfa;
pub mod observe;
pub mod postfix;


use thiserror::Error;
use tracing::debug;

pub use dfa::{DeduplicationTable, Dfa, DfaState, DfaStateId};
pub use graph::{render_dot, AutomatonGraph, DotFile, GraphNode, StateLabels};
pub use minimize::{minimize_dfa, InvariantViolation, Partition};
pub use nfa::{ConstructionError, Fragment, Nfa, NfaState, StateArena, StateId, Symbol};
pub use observe::{NoopObserver, Observer, TraceEvent, TracingObserver};
pub use postfix::{Postfix, SyntaxError, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Character parsed as the blank atom, which matches the empty string.
    pub blank: char,
}

impl Default for Config {
    fn default() -> Self {
        Self { blank: ' ' }
    }
}

impl Config {
    /// Rejects a blank that the tokenizer would otherwise read as a literal or
    /// an operator.
    pub fn validate(&self) -> Result<(), SyntaxError> {
        if self.blank.is_ascii_alphabetic() || "|*.()".contains(self.blank) {
            return Err(SyntaxError::InvalidBlank(self.blank));
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompileError {
    // the stage error is reported through `source()`
    #[error("syntax error")]
    Syntax(#[from] SyntaxError),
    #[error("nfa construction failed")]
    Construction(#[from] ConstructionError),
    #[error("internal error during minimization")]
    Internal(#[from] InvariantViolation),
}

/// Output of every pipeline stage for one expression.
#[derive(Debug)]
pub struct Compilation {
    pub postfix: Postfix,
    pub nfa: Nfa,
    pub dfa: Dfa,
    pub minimized: Dfa,
}

pub fn compile(expr: &str) -> Result<Compilation, CompileError> {
    compile_with(expr, &Config::default(), &mut NoopObserver)
}

pub fn compile_with(
    expr: &str,
    config: &Config,
    observer: &mut impl Observer,
) -> Result<Compilation, CompileError> {
    let postfix = postfix::parse(expr, config)?;
    let nfa = Nfa::from_postfix(&postfix, observer)?;
    let dfa = Dfa::from_nfa(&nfa, observer);
    let minimized = minimize_dfa(&dfa, observer)?;

    debug!(
        "compiled {:?}: nfa {} states, dfa {} states, minimized {} states",
        expr,
        nfa.states().len(),
        dfa.len(),
        minimized.len()
    );

    Ok(Compilation {
        postfix,
        nfa,
        dfa,
        minimized,
    })
}
