use crate::compile::{escape_chars, DRAWTEXT_ESCAPE};
use crate::error::GraphError;
use crate::graph::{filter_node, Stream};
use crate::opts::{OptValue, Opts};

impl Stream {
    /// Splits a video stream so it can feed several downstream filters.
    ///
    /// The number of output pads is derived from how many pads are actually
    /// consumed, so `split.pad(0)` and `split.pad(1)` compile to `split=2`.
    pub fn split(&self) -> Stream {
        self.filter_multi("split", Opts::new())
    }

    /// The audio counterpart of [`split`](Stream::split).
    pub fn asplit(&self) -> Stream {
        self.filter_multi("asplit", Opts::new())
    }

    /// Flips the video horizontally.
    pub fn hflip(&self) -> Stream {
        self.filter("hflip", Opts::new())
    }

    /// Flips the video vertically.
    pub fn vflip(&self) -> Stream {
        self.filter("vflip", Opts::new())
    }

    /// Adjusts hue, saturation and brightness; see the `hue` filter options.
    pub fn hue(&self, opts: Opts) -> Stream {
        self.filter("hue", opts)
    }

    /// Crops the video to `width`x`height` with its top-left corner at
    /// (`x`, `y`).
    pub fn crop(
        &self,
        x: impl Into<OptValue>,
        y: impl Into<OptValue>,
        width: impl Into<OptValue>,
        height: impl Into<OptValue>,
    ) -> Stream {
        // ffmpeg's crop takes w:h:x:y positionally.
        self.filter_args("crop", [width.into(), height.into(), x.into(), y.into()], Opts::new())
    }

    /// Trims the input so the output contains one continuous subpart,
    /// selected with options such as `start_frame` or `end`.
    pub fn trim(&self, opts: Opts) -> Stream {
        self.filter("trim", opts)
    }

    /// Changes the presentation timestamps of frames with expression `expr`,
    /// e.g. `PTS-STARTPTS`.
    pub fn setpts(&self, expr: impl Into<OptValue>) -> Stream {
        self.filter_args("setpts", [expr.into()], Opts::new())
    }

    /// Adjusts video colors by mixing color channels.
    pub fn colorchannelmixer(&self, opts: Opts) -> Stream {
        self.filter("colorchannelmixer", opts)
    }

    /// Draws a colored box of `width`x`height` at (`x`, `y`); thickness and
    /// the like go in `opts`.
    pub fn drawbox(
        &self,
        x: impl Into<OptValue>,
        y: impl Into<OptValue>,
        width: impl Into<OptValue>,
        height: impl Into<OptValue>,
        color: impl Into<OptValue>,
        opts: Opts,
    ) -> Stream {
        let args = vec![x.into(), y.into(), width.into(), height.into(), color.into()];
        self.filter_args("drawbox", args, opts)
    }

    /// Draws text onto the video.
    ///
    /// `text` is escaped for the drawtext parser (backslash, quote and `%`),
    /// so plain strings render verbatim. Position, font and so on go in
    /// `opts`. Use [`drawtext_raw`](Stream::drawtext_raw) to pass expansion
    /// sequences like `%{pts}` through unescaped.
    pub fn drawtext(&self, text: impl AsRef<str>, opts: Opts) -> Stream {
        let mut opts = opts;
        opts.set("text", escape_chars(text.as_ref(), DRAWTEXT_ESCAPE));
        self.filter("drawtext", opts)
    }

    /// [`drawtext`](Stream::drawtext) without the text-level escaping.
    pub fn drawtext_raw(&self, text: impl Into<OptValue>, opts: Opts) -> Stream {
        let mut opts = opts;
        opts.set("text", text);
        self.filter("drawtext", opts)
    }

    /// Overlays `other` on top of this stream.
    ///
    /// `eof_action` defaults to `repeat` as that is almost always what a
    /// watermark or picture-in-picture pipeline wants; set it in `opts` to
    /// override.
    pub fn overlay(&self, other: &Stream, opts: Opts) -> Stream {
        let mut opts = opts;
        if opts.get("eof_action").is_none() {
            opts.set("eof_action", "repeat");
        }
        filter_node(vec![self.clone(), other.clone()], "overlay".into(), Vec::new(), opts, None)
    }
}

/// Concatenates audio and video segments back to back.
///
/// Streams are grouped per segment: with `v` video streams and `a` audio
/// streams per segment (options `v`, default 1, and `a`, default 0), every
/// consecutive `v + a` input streams form one segment. The segment count `n`
/// is derived and filled in here; a stream count that does not divide evenly
/// is rejected.
pub fn concat(streams: impl IntoIterator<Item = Stream>, opts: Opts) -> Result<Stream, GraphError> {
    let streams: Vec<Stream> = streams.into_iter().collect();

    let video = opts.get("v").and_then(OptValue::as_int).unwrap_or(1);
    let audio = opts.get("a").and_then(OptValue::as_int).unwrap_or(0);
    let per_group = usize::try_from(video + audio).unwrap_or(0);

    if per_group == 0 || streams.len() % per_group != 0 {
        return Err(GraphError::ConcatStreamCount {
            per_group,
            given: streams.len(),
        });
    }

    let mut opts = opts;
    opts.set("n", (streams.len() / per_group) as i64);

    Ok(filter_node(streams, "concat".into(), Vec::new(), opts, Some(0)))
}

/// Applies an arbitrary filter to several input streams, the escape hatch
/// for multi-input filters without a named helper.
pub fn filter_inputs(streams: impl IntoIterator<Item = Stream>, name: impl Into<String>, opts: Opts) -> Stream {
    filter_node(streams.into_iter().collect(), name.into(), Vec::new(), opts, None)
}
