use bytes::Bytes;

/// An error raised while building or compiling a filter graph.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum GraphError {
    /// A selector was applied to a stream that already carries one.
    #[error("stream already has selector {0:?}")]
    SelectorAlreadySet(String),
    /// A selector was empty or contained characters that cannot appear in a
    /// link label.
    #[error("invalid stream selector {0:?}")]
    InvalidSelector(String),
    /// A filter node was given an empty name.
    #[error("filter name is empty")]
    EmptyFilterName,
    /// An output maps no streams.
    #[error("output {0:?} has no mapped streams")]
    NoMappedStreams(String),
    /// One filter output feeds more than one downstream. ffmpeg requires an
    /// explicit `split`/`asplit` to fan a stream out.
    #[error("output pad {pad} of filter {filter:?} feeds {consumers} downstreams, insert a split")]
    MultipleOutgoingEdges {
        /// Name of the filter whose output is consumed more than once.
        filter: String,
        /// Index of the contested output pad.
        pad: usize,
        /// How many downstreams consume the pad.
        consumers: usize,
    },
    /// `concat` was given a stream count that does not divide evenly into
    /// groups of `v + a` streams.
    #[error("concat takes a multiple of {per_group} streams, got {given}")]
    ConcatStreamCount {
        /// Streams per concatenated segment (`v + a`).
        per_group: usize,
        /// Number of streams actually given.
        given: usize,
    },
}

/// An error raised by process supervision or probing.
#[derive(Debug, thiserror::Error)]
pub enum FfmpegError {
    /// The filter graph could not be compiled.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// The child process could not be started.
    #[error("failed to spawn {program:?}: {source}")]
    Spawn {
        /// The program that was invoked.
        program: String,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },
    /// The child process finished with a non-zero exit status. The captured
    /// output is attached in full.
    #[error("{program} exited with {status} (see captured stderr for detail)")]
    Exit {
        /// The program that failed.
        program: String,
        /// The exit status reported by the OS.
        status: std::process::ExitStatus,
        /// Everything the process wrote to stdout, empty if not captured.
        stdout: Bytes,
        /// Everything the process wrote to stderr, empty if not captured.
        stderr: Bytes,
    },
    /// A standard stream was used without being piped at spawn time.
    #[error("child has no piped {0}")]
    MissingPipe(&'static str),
    /// Reading from or writing to the child failed.
    #[error("child i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// `ffprobe` returned JSON that could not be decoded.
    #[error("failed to decode ffprobe output: {0}")]
    ProbeJson(#[from] serde_json::Error),
    /// The child did not finish within the allowed time.
    #[error("timed out waiting for the child process")]
    Timeout,
    /// The `-version` banner did not have the expected shape.
    #[error("could not parse a version from {0:?}")]
    VersionParse(String),
}

impl FfmpegError {
    /// The captured stderr of a failed process, lossily decoded.
    ///
    /// Returns `None` for every other error kind.
    pub fn stderr_lossy(&self) -> Option<String> {
        match self {
            Self::Exit { stderr, .. } => Some(String::from_utf8_lossy(stderr).into_owned()),
            _ => None,
        }
    }
}
