//! Node transitions of the run graph.

use agentry_types::run::{AgentState, RunNode};

/// Node that follows `node` once it has finished.
///
/// The router continues to the tool node only while the last message asks
/// for tools. `End` is absorbing.
pub fn transition(node: RunNode, state: &AgentState) -> RunNode {
    match node {
        RunNode::Llm => RunNode::Router,
        RunNode::Router => {
            if state.last_message().is_some_and(|m| m.requests_tools()) {
                RunNode::Tools
            } else {
                RunNode::End
            }
        }
        RunNode::Tools => RunNode::Llm,
        RunNode::End => RunNode::End,
    }
}
