use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::GraphError;
use crate::opts::{OptValue, Opts};

/// One node of the filter graph.
///
/// Nodes carry a content digest folding in their own fields and the digests
/// of everything upstream. Two structurally identical chains therefore get
/// equal digests, and the compiler collapses them into a single node.
#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) digest: u64,
}

#[derive(Debug)]
pub(crate) enum NodeKind {
    Input(InputNode),
    Filter(FilterNode),
}

#[derive(Debug)]
pub(crate) struct InputNode {
    pub(crate) path: String,
    pub(crate) opts: Opts,
}

#[derive(Debug)]
pub(crate) struct FilterNode {
    pub(crate) name: String,
    pub(crate) args: Vec<OptValue>,
    pub(crate) opts: Opts,
    pub(crate) inputs: Vec<Stream>,
}

fn hash_opts(state: &mut DefaultHasher, opts: &Opts) {
    for (key, value) in opts.iter() {
        key.hash(state);
        value.to_string().hash(state);
    }
}

impl Node {
    fn input(path: String, opts: Opts) -> Arc<Self> {
        let mut state = DefaultHasher::new();
        state.write_u8(0);
        path.hash(&mut state);
        hash_opts(&mut state, &opts);

        Arc::new(Self {
            digest: state.finish(),
            kind: NodeKind::Input(InputNode { path, opts }),
        })
    }

    fn filter(name: String, args: Vec<OptValue>, opts: Opts, inputs: Vec<Stream>) -> Arc<Self> {
        let mut state = DefaultHasher::new();
        state.write_u8(1);
        name.hash(&mut state);
        for arg in &args {
            arg.to_string().hash(&mut state);
        }
        hash_opts(&mut state, &opts);
        for input in &inputs {
            input.node.digest.hash(&mut state);
            input.pad.hash(&mut state);
            input.selector.hash(&mut state);
        }

        Arc::new(Self {
            digest: state.finish(),
            kind: NodeKind::Filter(FilterNode { name, args, opts, inputs }),
        })
    }
}

/// A single stream flowing out of an input or filter node.
///
/// Streams are cheap to clone and clones share their node, so one upstream
/// can feed several places, subject to ffmpeg's split rules.
#[derive(Debug, Clone)]
pub struct Stream {
    pub(crate) node: Arc<Node>,
    pub(crate) pad: Option<usize>,
    pub(crate) selector: Option<String>,
}

pub(crate) fn filter_node(inputs: Vec<Stream>, name: String, args: Vec<OptValue>, opts: Opts, pad: Option<usize>) -> Stream {
    Stream {
        node: Node::filter(name, args, opts, inputs),
        pad,
        selector: None,
    }
}

/// Opens an input file, or any url `ffmpeg` accepts, as the root of a stream
/// pipeline.
pub fn input(path: impl Into<String>) -> Stream {
    input_with(path, Opts::new())
}

/// Opens an input with per-input options.
///
/// The `format` option compiles to `-f` and a two-element `video_size`
/// sequence to `-video_size WxH`; everything else is passed through as
/// `-key value` ahead of `-i`.
pub fn input_with(path: impl Into<String>, opts: Opts) -> Stream {
    Stream {
        node: Node::input(path.into(), opts),
        pad: None,
        selector: None,
    }
}

impl Stream {
    /// Applies a single-output filter and returns its stream.
    ///
    /// The filter name and parameters are not validated here; ffmpeg itself
    /// rejects unknown filters when the command runs.
    pub fn filter(&self, name: impl Into<String>, opts: Opts) -> Stream {
        filter_node(vec![self.clone()], name.into(), Vec::new(), opts, None)
    }

    /// Applies a filter with positional arguments ahead of the named ones,
    /// e.g. `aecho=0.8:0.9:1000:0.3`.
    pub fn filter_args<I, V>(&self, name: impl Into<String>, args: I, opts: Opts) -> Stream
    where
        I: IntoIterator<Item = V>,
        V: Into<OptValue>,
    {
        let args = args.into_iter().map(Into::into).collect();
        filter_node(vec![self.clone()], name.into(), args, opts, None)
    }

    /// Applies a multi-output filter and returns its first pad.
    ///
    /// The remaining pads are reached with [`pad`](Stream::pad).
    pub fn filter_multi(&self, name: impl Into<String>, opts: Opts) -> Stream {
        filter_node(vec![self.clone()], name.into(), Vec::new(), opts, Some(0))
    }

    /// Returns output pad `pad` of this stream's node.
    pub fn pad(&self, pad: usize) -> Stream {
        Stream {
            node: self.node.clone(),
            pad: Some(pad),
            selector: None,
        }
    }

    /// Narrows the stream with an ffmpeg stream specifier: `a`, `v`, `a:0`,
    /// `2`, `m:language:eng`, ...
    ///
    /// The selector ends up as the `:spec` suffix of the compiled link label,
    /// `[0:a]` style.
    pub fn select(&self, selector: impl Into<String>) -> Result<Stream, GraphError> {
        if let Some(existing) = &self.selector {
            return Err(GraphError::SelectorAlreadySet(existing.clone()));
        }

        let selector = selector.into();
        if selector.is_empty() || selector.chars().any(|c| c.is_whitespace() || "[],;".contains(c)) {
            return Err(GraphError::InvalidSelector(selector));
        }

        Ok(Stream {
            node: self.node.clone(),
            pad: self.pad,
            selector: Some(selector),
        })
    }

    /// Shorthand for [`select`](Stream::select) with `a`.
    pub fn audio(&self) -> Result<Stream, GraphError> {
        self.select("a")
    }

    /// Shorthand for [`select`](Stream::select) with `v`.
    pub fn video(&self) -> Result<Stream, GraphError> {
        self.select("v")
    }

    /// Maps this stream into an output file.
    pub fn output(&self, path: impl Into<String>) -> Output {
        self.output_with(path, Opts::new())
    }

    /// Maps this stream into an output file with per-output options.
    ///
    /// `format`, `video_bitrate`, `audio_bitrate` and `video_size` compile to
    /// `-f`, `-b:v`, `-b:a` and `-s`; everything else is passed through as
    /// `-key value` ahead of the path.
    pub fn output_with(&self, path: impl Into<String>, opts: Opts) -> Output {
        output([self.clone()], path, opts)
    }
}

/// Maps several streams into one output file.
pub fn output(streams: impl IntoIterator<Item = Stream>, path: impl Into<String>, opts: Opts) -> Output {
    Output {
        streams: streams.into_iter().collect(),
        path: path.into(),
        opts,
        global_args: Vec::new(),
        overwrite: false,
    }
}

/// One output file: its mapped streams, destination path and options.
#[derive(Debug, Clone)]
pub struct Output {
    pub(crate) streams: Vec<Stream>,
    pub(crate) path: String,
    pub(crate) opts: Opts,
    pub(crate) global_args: Vec<String>,
    pub(crate) overwrite: bool,
}

impl Output {
    /// Appends raw arguments placed after all per-file arguments, e.g.
    /// `-progress url` or `-loglevel error`.
    pub fn global_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.global_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Requests `-y`, overwriting existing files without asking.
    pub fn overwrite_output(mut self) -> Self {
        self.overwrite = true;
        self
    }

    /// The destination path.
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// A whole `ffmpeg` invocation: one or more outputs plus shared arguments.
#[derive(Debug, Clone)]
pub struct Command {
    pub(crate) outputs: Vec<Output>,
    pub(crate) global_args: Vec<String>,
    pub(crate) overwrite: bool,
}

/// Combines several outputs into a single invocation.
pub fn merge_outputs(outputs: impl IntoIterator<Item = Output>) -> Command {
    Command {
        outputs: outputs.into_iter().collect(),
        global_args: Vec::new(),
        overwrite: false,
    }
}

impl From<Output> for Command {
    fn from(output: Output) -> Self {
        merge_outputs([output])
    }
}

impl From<&Output> for Command {
    fn from(output: &Output) -> Self {
        output.clone().into()
    }
}

impl From<&Command> for Command {
    fn from(command: &Command) -> Self {
        command.clone()
    }
}

impl Command {
    /// Adds another output to the invocation.
    pub fn and_output(mut self, output: Output) -> Self {
        self.outputs.push(output);
        self
    }

    /// Appends raw arguments placed after all per-file arguments.
    pub fn global_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.global_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Requests `-y` for the whole invocation.
    pub fn overwrite_output(mut self) -> Self {
        self.overwrite = true;
        self
    }

    pub(crate) fn wants_overwrite(&self) -> bool {
        self.overwrite || self.outputs.iter().any(|output| output.overwrite)
    }
}
