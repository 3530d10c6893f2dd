use crate::models::test_state::TestState;
use crate::store::domains::directory_store::NodeDirectory;
use shared::models::Node;
use std::collections::HashMap;
use std::fmt::Write;

const RUN_ALL_LABEL: &str = "Run All Sequentially";
const RUNNING_ALL_LABEL: &str = "Running Tests...";
const LOADING_TEXT: &str = "Scanning network for nodes...";
const EMPTY_TEXT: &str = "No speedtest nodes discovered yet.";
const EMPTY_HINT: &str = "Ensure client servers are running and on the same network.";

/// Renders the node dashboard as plain text.
///
/// Cards follow directory order and are numbered from 1, the same numbers
/// [`find_node`] accepts. States of nodes that are no longer in the directory
/// are not shown.
pub fn render_dashboard(
    directory: &NodeDirectory,
    states: &HashMap<String, TestState>,
    running_all: bool,
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Discovered Nodes ({})    {}",
        directory.len(),
        run_all_control(directory.len(), running_all)
    );

    if directory.loading {
        let _ = writeln!(out, "{LOADING_TEXT}");
        return out;
    }
    if directory.is_empty() {
        let _ = writeln!(out, "{EMPTY_TEXT}");
        let _ = writeln!(out, "{EMPTY_HINT}");
        return out;
    }

    for (index, node) in directory.nodes.iter().enumerate() {
        let state = states.get(&node.name).cloned().unwrap_or_default();
        let _ = writeln!(out, "{:>2}. {}", index + 1, node.display_name());
        let _ = writeln!(
            out,
            "    IP: {}  Port: {}  Status: {}",
            node.info.ip,
            node.info.port,
            node_status(&node.info.status)
        );
        let _ = writeln!(out, "    {}", state_line(&state));
    }
    out
}

fn run_all_control(node_count: usize, running_all: bool) -> String {
    let label = if running_all {
        RUNNING_ALL_LABEL
    } else {
        RUN_ALL_LABEL
    };
    if running_all || node_count == 0 {
        format!("[{label}] (disabled)")
    } else {
        format!("[{label}]")
    }
}

fn node_status(status: &str) -> &str {
    if status.is_empty() {
        "unknown"
    } else {
        status
    }
}

pub fn state_line(state: &TestState) -> String {
    match state {
        TestState::Error(_) => format!("error: {state}"),
        _ => state.to_string(),
    }
}

/// Resolves dashboard input to a node: a card number, the full node name or
/// its display name.
pub fn find_node<'a>(directory: &'a NodeDirectory, input: &str) -> Option<&'a Node> {
    let input = input.trim();
    if let Ok(number) = input.parse::<usize>() {
        return number
            .checked_sub(1)
            .and_then(|index| directory.nodes.get(index));
    }
    directory
        .get(input)
        .or_else(|| directory.nodes.iter().find(|n| n.display_name() == input))
}
