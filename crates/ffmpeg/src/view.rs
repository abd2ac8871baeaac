use std::collections::HashMap;

use crate::compile::GraphIndex;
use crate::graph::{Command, FilterNode, InputNode, NodeKind, Output, Stream};

const INPUT_COLOR: &str = "#99cc00";
const FILTER_COLOR: &str = "#ffcc00";
const OUTPUT_COLOR: &str = "#99ccff";

fn dot_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '"' || c == '\\' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn input_label(input: &InputNode, detail: bool) -> String {
    let mut lines = vec![dot_escape(&format!("input: {}", input.path))];
    if detail {
        for (key, value) in input.opts.iter() {
            lines.push(dot_escape(&format!("{key}={value}")));
        }
    }
    lines.join("\\n")
}

fn filter_label(filter: &FilterNode, detail: bool) -> String {
    let mut lines = vec![dot_escape(&filter.name)];
    if detail {
        for arg in &filter.args {
            lines.push(dot_escape(&arg.to_string()));
        }
        for (key, value) in filter.opts.iter() {
            lines.push(dot_escape(&format!("{key}={value}")));
        }
    }
    lines.join("\\n")
}

fn output_label(output: &Output, detail: bool) -> String {
    let mut lines = vec![dot_escape(&format!("output: {}", output.path))];
    if detail {
        for (key, value) in output.opts.iter() {
            lines.push(dot_escape(&format!("{key}={value}")));
        }
    }
    lines.join("\\n")
}

fn edge_label(stream: &Stream) -> String {
    match (stream.pad, stream.selector.as_deref()) {
        (None, None) => String::new(),
        (Some(pad), None) => pad.to_string(),
        (None, Some(selector)) => format!(":{selector}"),
        (Some(pad), Some(selector)) => format!("{pad}:{selector}"),
    }
}

fn push_node(dot: &mut String, id: &str, label: &str, color: &str) {
    dot.push_str(&format!(
        "  {id} [label=\"{label}\" shape=box style=filled fillcolor=\"{color}\"]\n"
    ));
}

fn push_edge(dot: &mut String, from: &str, to: &str, label: &str) {
    if label.is_empty() {
        dot.push_str(&format!("  {from} -> {to}\n"));
    } else {
        dot.push_str(&format!("  {from} -> {to} [label=\"{label}\"]\n"));
    }
}

impl Command {
    /// Renders the graph in Graphviz DOT form, one filled box per node.
    ///
    /// `detail` adds every node's parameters to its box. Node ids follow
    /// dependency order, so the same graph always renders the same text.
    pub fn dot(&self, detail: bool) -> String {
        let index = GraphIndex::build(self);

        let mut ids = HashMap::new();
        for (position, node) in index.sorted.iter().enumerate() {
            ids.insert(node.digest, format!("n{position}"));
        }

        let mut dot = String::from("digraph {\n  rankdir=LR\n");

        for (position, node) in index.sorted.iter().enumerate() {
            let (label, color) = match &node.kind {
                NodeKind::Input(input) => (input_label(input, detail), INPUT_COLOR),
                NodeKind::Filter(filter) => (filter_label(filter, detail), FILTER_COLOR),
            };
            push_node(&mut dot, &format!("n{position}"), &label, color);
        }
        for (position, output) in self.outputs.iter().enumerate() {
            push_node(&mut dot, &format!("o{position}"), &output_label(output, detail), OUTPUT_COLOR);
        }

        for node in &index.sorted {
            if let NodeKind::Filter(filter) = &node.kind {
                for input in &filter.inputs {
                    push_edge(
                        &mut dot,
                        &ids[&input.node.digest],
                        &ids[&node.digest],
                        &dot_escape(&edge_label(input)),
                    );
                }
            }
        }
        for (position, output) in self.outputs.iter().enumerate() {
            for stream in &output.streams {
                push_edge(
                    &mut dot,
                    &ids[&stream.node.digest],
                    &format!("o{position}"),
                    &dot_escape(&edge_label(stream)),
                );
            }
        }

        dot.push_str("}\n");
        dot
    }
}

impl Output {
    /// [`Command::dot`] for a single output.
    pub fn dot(&self, detail: bool) -> String {
        Command::from(self).dot(detail)
    }
}
