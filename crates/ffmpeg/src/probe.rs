use std::process::Stdio;

use serde::Deserialize;

use crate::error::FfmpegError;
use crate::opts::Opts;

/// Runs `ffprobe` and decodes its JSON report.
///
/// ```no_run
/// # async fn example() -> Result<(), ffmpeg_async::FfmpegError> {
/// let report = ffmpeg_async::probe("in.mp4").await?;
/// if let Some(video) = report.video() {
///     println!("{}x{}", video.width.unwrap_or(0), video.height.unwrap_or(0));
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, bon::Builder)]
pub struct Ffprobe {
    /// The executable to launch, `ffprobe` from `PATH` unless overridden.
    #[builder(into, default = String::from("ffprobe"))]
    program: String,
    /// Arguments inserted ahead of the generated ones.
    #[builder(default)]
    prepend_args: Vec<String>,
    /// Extra options such as `select_streams`, passed as `-key value`.
    #[builder(default)]
    extra: Opts,
    /// Kills the child when the probe future is dropped before it finishes.
    #[builder(default = true)]
    kill_on_drop: bool,
}

impl Default for Ffprobe {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Ffprobe {
    /// The argument list handed to the program for `target`.
    pub fn argv(&self, target: &str) -> Vec<String> {
        let mut args = self.prepend_args.clone();
        args.extend(
            ["-show_format", "-show_streams", "-of", "json"]
                .into_iter()
                .map(str::to_owned),
        );
        self.extra.append_args(&mut args);
        args.push(target.to_owned());
        args
    }

    /// Probes `target`, which can be a path or any url ffprobe accepts.
    pub async fn probe(&self, target: &str) -> Result<ProbeOutput, FfmpegError> {
        let mut builder = tokio::process::Command::new(&self.program);
        builder
            .args(self.argv(target))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(self.kill_on_drop);

        let output = builder.output().await.map_err(|source| FfmpegError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(FfmpegError::Exit {
                program: self.program.clone(),
                status: output.status,
                stdout: output.stdout.into(),
                stderr: output.stderr.into(),
            });
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

/// Probes a media file with the default [`Ffprobe`].
pub async fn probe(target: &str) -> Result<ProbeOutput, FfmpegError> {
    Ffprobe::default().probe(target).await
}

/// The decoded `ffprobe -of json` report.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeOutput {
    /// One entry per stream in the container.
    #[serde(default)]
    pub streams: Vec<ProbeStream>,
    /// Container-level facts.
    pub format: Option<ProbeFormat>,
}

impl ProbeOutput {
    /// The first stream in the report.
    pub fn first_stream(&self) -> Option<&ProbeStream> {
        self.streams.first()
    }

    /// The first video stream.
    pub fn video(&self) -> Option<&ProbeStream> {
        self.streams.iter().find(|s| s.codec_type.as_deref() == Some("video"))
    }

    /// The first audio stream.
    pub fn audio(&self) -> Option<&ProbeStream> {
        self.streams.iter().find(|s| s.codec_type.as_deref() == Some("audio"))
    }
}

/// One stream of a probed file.
///
/// ffprobe reports many numbers as JSON strings and the field set varies by
/// codec type, so everything is optional; the typed accessors below parse
/// the common ones. Fields without a typed counterpart land in `extra`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeStream {
    /// Index of the stream in the container.
    pub index: Option<u32>,
    /// Codec name, e.g. `h264` or `aac`.
    pub codec_name: Option<String>,
    /// `video`, `audio`, `subtitle`, ...
    pub codec_type: Option<String>,
    /// Width in pixels, video only.
    pub width: Option<u32>,
    /// Height in pixels, video only.
    pub height: Option<u32>,
    /// Pixel format, video only.
    pub pix_fmt: Option<String>,
    /// Average frame rate as a ratio, e.g. `30000/1001`.
    pub avg_frame_rate: Option<String>,
    /// Base frame rate as a ratio.
    pub r_frame_rate: Option<String>,
    /// Sample rate in Hz, audio only.
    pub sample_rate: Option<String>,
    /// Channel count, audio only.
    pub channels: Option<u32>,
    /// Channel layout name, e.g. `stereo`, audio only.
    pub channel_layout: Option<String>,
    /// Unit of the stream's timestamps, e.g. `1/44100`.
    pub time_base: Option<String>,
    /// Stream duration in seconds.
    pub duration: Option<String>,
    /// Stream bitrate in bits per second.
    pub bit_rate: Option<String>,
    /// Total frames, when the container records it.
    pub nb_frames: Option<String>,
    /// Everything reported without a typed field.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ProbeStream {
    /// The average frame rate as a number, `None` when unknown or `0/0`.
    pub fn frame_rate(&self) -> Option<f64> {
        parse_ratio(self.avg_frame_rate.as_deref()?)
    }

    /// The duration in seconds.
    pub fn duration_secs(&self) -> Option<f64> {
        self.duration.as_deref()?.parse().ok()
    }

    /// The sample rate in Hz.
    pub fn sample_rate_hz(&self) -> Option<u32> {
        self.sample_rate.as_deref()?.parse().ok()
    }
}

/// Container-level facts of a probed file.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeFormat {
    /// The probed path or url.
    pub filename: Option<String>,
    /// Demuxer name, e.g. `mov,mp4,m4a,3gp,3g2,mj2`.
    pub format_name: Option<String>,
    /// Number of streams in the container.
    pub nb_streams: Option<u32>,
    /// Duration in seconds.
    pub duration: Option<String>,
    /// Size in bytes.
    pub size: Option<String>,
    /// Bitrate in bits per second.
    pub bit_rate: Option<String>,
    /// Tags and anything else not modeled.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ProbeFormat {
    /// The duration in seconds.
    pub fn duration_secs(&self) -> Option<f64> {
        self.duration.as_deref()?.parse().ok()
    }
}

fn parse_ratio(ratio: &str) -> Option<f64> {
    match ratio.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                None
            } else {
                Some(num / den)
            }
        }
        None => ratio.parse().ok(),
    }
}
