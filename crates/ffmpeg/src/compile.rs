use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::error::GraphError;
use crate::graph::{Command, FilterNode, InputNode, Node, NodeKind, Output, Stream};
use crate::opts::OptValue;

/// Characters escaped inside a single filter parameter value.
const FILTER_VALUE_ESCAPE: &str = "\\'=:";

/// Characters escaped in an assembled filter spec before it joins the
/// `-filter_complex` string.
const FILTER_SPEC_ESCAPE: &str = "\\'[],;";

/// Characters escaped in drawtext text, which passes through one more parser
/// than ordinary parameter values.
pub(crate) const DRAWTEXT_ESCAPE: &str = "\\'%";

/// Prefixes every occurrence of a `special` character with a backslash.
pub(crate) fn escape_chars(text: &str, special: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if special.contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

type Labels = HashMap<(u64, Option<usize>), String>;

/// The flattened form of a command's graph: nodes in dependency order plus,
/// per node and output pad, how many downstream edges consume it.
///
/// Nodes with equal digests are collapsed while building the index, which is
/// what makes repeated `input` calls for the same file (or structurally
/// identical filter chains) share one node in the compiled command.
pub(crate) struct GraphIndex {
    pub(crate) sorted: Vec<Arc<Node>>,
    pub(crate) outgoing: HashMap<u64, BTreeMap<Option<usize>, usize>>,
    visited: HashSet<u64>,
}

impl GraphIndex {
    pub(crate) fn build(command: &Command) -> Self {
        let mut index = Self {
            sorted: Vec::new(),
            outgoing: HashMap::new(),
            visited: HashSet::new(),
        };

        for output in &command.outputs {
            for stream in &output.streams {
                index.record_edge(stream);
                index.visit(&stream.node);
            }
        }

        index
    }

    fn record_edge(&mut self, stream: &Stream) {
        *self
            .outgoing
            .entry(stream.node.digest)
            .or_default()
            .entry(consumed_pad(stream))
            .or_insert(0) += 1;
    }

    fn visit(&mut self, node: &Arc<Node>) {
        if !self.visited.insert(node.digest) {
            return;
        }

        if let NodeKind::Filter(filter) = &node.kind {
            for input in &filter.inputs {
                self.record_edge(input);
                self.visit(&input.node);
            }
        }

        self.sorted.push(node.clone());
    }

    /// Assigns link labels: inputs are numbered `0`, `1`, ... and filter pads
    /// `s0`, `s1`, ..., both in dependency order with pads ascending.
    ///
    /// A filter pad consumed by more than one downstream edge is rejected
    /// here; ffmpeg requires an explicit `split` for fan-out.
    fn allocate_labels(&self) -> Result<Labels, GraphError> {
        let mut labels = Labels::new();
        let mut input_count = 0usize;
        let mut stream_count = 0usize;

        for node in &self.sorted {
            match &node.kind {
                NodeKind::Input(_) => {
                    labels.insert((node.digest, None), input_count.to_string());
                    input_count += 1;
                }
                NodeKind::Filter(filter) => {
                    if filter.name.is_empty() {
                        return Err(GraphError::EmptyFilterName);
                    }

                    let Some(pads) = self.outgoing.get(&node.digest) else {
                        continue;
                    };

                    for (pad, edges) in pads {
                        if *edges > 1 {
                            return Err(GraphError::MultipleOutgoingEdges {
                                filter: filter.name.clone(),
                                pad: pad.unwrap_or(0),
                                consumers: *edges,
                            });
                        }

                        labels.insert((node.digest, *pad), format!("s{stream_count}"));
                        stream_count += 1;
                    }
                }
            }
        }

        Ok(labels)
    }
}

// Inputs carry a single implicit pad, so pad indices on input streams are
// folded away when looking up labels.
fn consumed_pad(stream: &Stream) -> Option<usize> {
    match stream.node.kind {
        NodeKind::Input(_) => None,
        NodeKind::Filter(_) => stream.pad,
    }
}

fn link_label(labels: &Labels, stream: &Stream) -> String {
    let mut label = labels[&(stream.node.digest, consumed_pad(stream))].clone();
    if let Some(selector) = &stream.selector {
        label.push(':');
        label.push_str(selector);
    }
    label
}

/// Renders `name=arg:arg:key=value:...` for one filter, value-escaped per
/// parameter and spec-escaped as a whole.
///
/// `split` and `asplit` ignore their declared arguments and take the number
/// of consumed output pads instead.
fn filter_params(filter: &FilterNode, outgoing_edges: usize) -> String {
    let mut params: Vec<String> = Vec::new();

    if matches!(filter.name.as_str(), "split" | "asplit") {
        params.push(outgoing_edges.to_string());
    } else {
        for arg in &filter.args {
            params.push(escape_chars(&arg.to_string(), FILTER_VALUE_ESCAPE));
        }
    }

    for (key, value) in filter.opts.iter() {
        params.push(format!(
            "{}={}",
            escape_chars(key, FILTER_VALUE_ESCAPE),
            escape_chars(&value.to_string(), FILTER_VALUE_ESCAPE)
        ));
    }

    let mut text = escape_chars(&filter.name, FILTER_VALUE_ESCAPE);
    if !params.is_empty() {
        text.push('=');
        text.push_str(&params.join(":"));
    }

    escape_chars(&text, FILTER_SPEC_ESCAPE)
}

fn filter_spec(node: &Arc<Node>, filter: &FilterNode, pads: &BTreeMap<Option<usize>, usize>, labels: &Labels) -> String {
    let mut spec = String::new();

    for input in &filter.inputs {
        spec.push('[');
        spec.push_str(&link_label(labels, input));
        spec.push(']');
    }

    spec.push_str(&filter_params(filter, pads.len()));

    for pad in pads.keys() {
        spec.push('[');
        spec.push_str(&labels[&(node.digest, *pad)]);
        spec.push(']');
    }

    spec
}

fn video_size_value(value: OptValue) -> String {
    match value {
        OptValue::Seq(parts) if parts.len() == 2 => format!("{}x{}", parts[0], parts[1]),
        other => other.to_string(),
    }
}

fn append_input_args(args: &mut Vec<String>, input: &InputNode) {
    let mut opts = input.opts.clone();

    if let Some(format) = opts.remove("format") {
        args.push("-f".into());
        args.push(format.to_string());
    }
    if let Some(size) = opts.remove("video_size") {
        args.push("-video_size".into());
        args.push(video_size_value(size));
    }

    opts.append_args(args);
    args.push("-i".into());
    args.push(input.path.clone());
}

fn append_output_args(args: &mut Vec<String>, output: &Output, labels: &Labels) -> Result<(), GraphError> {
    if output.streams.is_empty() {
        return Err(GraphError::NoMappedStreams(output.path.clone()));
    }

    let multiple = output.streams.len() > 1;
    for stream in &output.streams {
        let mut label = link_label(labels, stream);
        if matches!(stream.node.kind, NodeKind::Filter(_)) {
            label = format!("[{label}]");
        }

        // The lone default mapping of bare input 0 is what ffmpeg picks
        // anyway, so `-map` is dropped for it.
        if label != "0" || multiple {
            args.push("-map".into());
            args.push(label);
        }
    }

    let mut opts = output.opts.clone();
    if let Some(format) = opts.remove("format") {
        args.push("-f".into());
        args.push(format.to_string());
    }
    if let Some(bitrate) = opts.remove("video_bitrate") {
        args.push("-b:v".into());
        args.push(bitrate.to_string());
    }
    if let Some(bitrate) = opts.remove("audio_bitrate") {
        args.push("-b:a".into());
        args.push(bitrate.to_string());
    }
    if let Some(size) = opts.remove("video_size") {
        args.push("-s".into());
        args.push(video_size_value(size));
    }

    opts.append_args(args);
    args.push(output.path.clone());
    Ok(())
}

impl Output {
    /// Compiles this output into the argument list handed to `ffmpeg`,
    /// everything after the program name.
    pub fn compile(&self) -> Result<Vec<String>, GraphError> {
        Command::from(self).compile()
    }
}

impl Command {
    /// Compiles the invocation into the argument list handed to `ffmpeg`,
    /// everything after the program name.
    ///
    /// Inputs come first in dependency order, then `-filter_complex` if any
    /// filters are involved, then each output's mapping, options and path,
    /// then trailing arguments and `-y`.
    pub fn compile(&self) -> Result<Vec<String>, GraphError> {
        let index = GraphIndex::build(self);
        let labels = index.allocate_labels()?;

        let mut args = Vec::new();
        for node in &index.sorted {
            if let NodeKind::Input(input) = &node.kind {
                append_input_args(&mut args, input);
            }
        }

        let mut specs = Vec::new();
        for node in &index.sorted {
            if let NodeKind::Filter(filter) = &node.kind {
                if let Some(pads) = index.outgoing.get(&node.digest) {
                    specs.push(filter_spec(node, filter, pads, &labels));
                }
            }
        }
        if !specs.is_empty() {
            args.push("-filter_complex".into());
            args.push(specs.join(";"));
        }

        for output in &self.outputs {
            append_output_args(&mut args, output, &labels)?;
        }

        for output in &self.outputs {
            args.extend(output.global_args.iter().cloned());
        }
        args.extend(self.global_args.iter().cloned());

        if self.wants_overwrite() {
            args.push("-y".into());
        }

        Ok(args)
    }

    /// Like [`compile`](Command::compile) with the program name prepended,
    /// handy for logging the full command line.
    pub fn compile_with(&self, program: &str) -> Result<Vec<String>, GraphError> {
        let mut args = vec![program.to_string()];
        args.extend(self.compile()?);
        Ok(args)
    }
}
