// read-only views of each automaton as petgraph graphs, plus graphviz output

use std::fmt::{self, Display};

use bit_set::BitSet;
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};

use crate::dfa::Dfa;
use crate::nfa::{Nfa, StateId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub label: String,
    pub accepting: bool,
    pub initial: bool,
}

impl Display for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

pub type AutomatonGraph = DiGraph<GraphNode, String>;

/// How dfa nodes are named in the exported graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateLabels {
    /// `S<id>`
    Id,
    /// the nfa states the dfa state was built from, `{S0,S3}`
    Subset,
}

fn subset_label(set: &BitSet) -> String {
    let mut label = String::from("{");
    for (i, state) in set.iter().enumerate() {
        if i > 0 {
            label.push(',');
        }
        label.push_str(&StateId::from_index(state).to_string());
    }
    label.push('}');
    label
}

impl Nfa {
    /// Reachable part of the nfa, epsilon edges labelled `ε`.
    pub fn to_graph(&self) -> AutomatonGraph {
        let mut graph = AutomatonGraph::new();
        let mut node_to_index: Vec<Option<NodeIndex>> = vec![None; self.states.len()];

        let reachable = self.reachable();
        for state in reachable.iter() {
            let id = StateId::from_index(state);
            let index = graph.add_node(GraphNode {
                label: id.to_string(),
                accepting: self.states[id].accepting,
                initial: id == self.start,
            });
            node_to_index[state] = Some(index);
        }

        for state in reachable.iter() {
            let Some(from) = node_to_index[state] else {
                continue;
            };
            for (symbol, next) in &self.states[state].transitions {
                if let Some(to) = node_to_index[next.index()] {
                    graph.add_edge(from, to, symbol.to_string());
                }
            }
        }

        graph
    }
}

impl Dfa {
    pub fn to_graph(&self, labels: StateLabels) -> AutomatonGraph {
        let mut graph = AutomatonGraph::new();

        // states are stored in id order, so node i is state i
        for state in &self.states {
            let label = match labels {
                StateLabels::Id => state.id.to_string(),
                StateLabels::Subset => subset_label(&state.nfa_states),
            };
            graph.add_node(GraphNode {
                label,
                accepting: state.accepting,
                initial: state.id == self.start,
            });
        }

        for state in &self.states {
            for (symbol, next) in &state.transitions {
                graph.add_edge(
                    NodeIndex::new(state.id.index()),
                    NodeIndex::new(next.index()),
                    symbol.to_string(),
                );
            }
        }

        graph
    }
}

/// Graphviz source for an automaton graph, left to right, accepting states
/// double circled.
pub struct DotFile<'a> {
    pub name: &'a str,
    pub graph: &'a AutomatonGraph,
}

impl Display for DotFile<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dot = Dot::with_attr_getters(
            self.graph,
            &[Config::GraphContentOnly],
            &|_, _| String::new(),
            &|_, (_, node)| {
                let shape = if node.accepting { "doublecircle" } else { "circle" };
                if node.initial {
                    format!("shape = {} style = bold", shape)
                } else {
                    format!("shape = {}", shape)
                }
            },
        );

        writeln!(f, "digraph {} {{", self.name)?;
        writeln!(f, "    rankdir=LR;")?;
        writeln!(f, "    node [shape = circle];")?;
        write!(f, "{}", dot)?;
        writeln!(f, "}}")
    }
}

pub fn render_dot(name: &str, graph: &AutomatonGraph) -> String {
    DotFile { name, graph }.to_string()
}

#[cfg(test)]
mod tests {
    use std::fmt::Write;

    use super::*;
    use crate::compile;

    #[test]
    fn nfa_graph_skips_orphaned_states() {
        let compilation = compile("ab").expect("should compile");
        let graph = compilation.nfa.to_graph();
        assert_eq!(compilation.nfa.states().len(), 4);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn epsilon_edges_are_labelled() {
        let compilation = compile("a*").expect("should compile");
        let graph = compilation.nfa.to_graph();
        let labels: Vec<&str> = graph.edge_weights().map(|w| w.as_str()).collect();
        assert!(labels.contains(&"ε"));
        assert!(labels.contains(&"a"));
        assert_eq!(graph.node_weights().filter(|n| n.initial).count(), 1);
        assert_eq!(graph.node_weights().filter(|n| n.accepting).count(), 1);
    }

    #[test]
    fn dfa_labels() {
        let compilation = compile("a|b").expect("should compile");
        let subsets = compilation.dfa.to_graph(StateLabels::Subset);
        let start = &subsets[NodeIndex::new(compilation.dfa.start().index())];
        assert!(start.label.starts_with('{') && start.label.ends_with('}'));
        assert!(start.initial);

        let ids = compilation.minimized.to_graph(StateLabels::Id);
        assert_eq!(ids.node_count(), compilation.minimized.len());
        assert!(ids.node_weights().all(|n| n.label.starts_with('S')));
    }

    #[test]
    fn dot_output() {
        let compilation = compile("a|b").expect("should compile");
        let dot = render_dot("MinimizedDFA", &compilation.minimized.to_graph(StateLabels::Id));
        assert!(dot.starts_with("digraph MinimizedDFA {"));
        assert!(dot.contains("rankdir=LR;"));
        assert!(dot.contains("doublecircle"));
        assert!(dot.contains("label = \"a\""));
        assert!(dot.trim_end().ends_with('}'));
    }

    #[test]
    fn dot_file_writes_into_any_sink() {
        let compilation = compile("a*b").expect("should compile");
        let graph = compilation.dfa.to_graph(StateLabels::Subset);
        let mut sink = String::from("// generated\n");
        let file = DotFile {
            name: "DFA",
            graph: &graph,
        };
        write!(sink, "{}", file).expect("writing to a String");
        assert!(sink.starts_with("// generated\ndigraph DFA {\n    rankdir=LR;\n"));
        assert_eq!(&sink["// generated\n".len()..], render_dot("DFA", &graph));
        assert_eq!(sink.matches("digraph").count(), 1);
    }
}
