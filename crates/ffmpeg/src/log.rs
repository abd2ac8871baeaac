use std::time::Duration;

/// Log levels as ffmpeg numbers them.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(i32)]
pub enum LogLevel {
    /// -8
    Quiet = -8,
    /// 0
    Panic = 0,
    /// 8
    Fatal = 8,
    /// 16
    Error = 16,
    /// 24
    Warning = 24,
    /// 32, the default
    Info = 32,
    /// 40
    Verbose = 40,
    /// 48
    Debug = 48,
    /// 56
    Trace = 56,
}

impl LogLevel {
    /// Converts ffmpeg's numeric level, out-of-range values map to `Info`.
    pub const fn from_i32(value: i32) -> Self {
        match value {
            -8 => Self::Quiet,
            0 => Self::Panic,
            8 => Self::Fatal,
            16 => Self::Error,
            24 => Self::Warning,
            32 => Self::Info,
            40 => Self::Verbose,
            48 => Self::Debug,
            56 => Self::Trace,
            _ => Self::Info,
        }
    }

    /// Parses the level names ffmpeg prints and accepts for `-loglevel`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "quiet" => Some(Self::Quiet),
            "panic" => Some(Self::Panic),
            "fatal" => Some(Self::Fatal),
            "error" => Some(Self::Error),
            "warning" => Some(Self::Warning),
            "info" => Some(Self::Info),
            "verbose" => Some(Self::Verbose),
            "debug" => Some(Self::Debug),
            "trace" => Some(Self::Trace),
            _ => None,
        }
    }

    /// The name ffmpeg uses for this level.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quiet => "quiet",
            Self::Panic => "panic",
            Self::Fatal => "fatal",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Verbose => "verbose",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded line of ffmpeg stderr.
#[derive(Debug, Clone, PartialEq)]
pub enum StderrEvent {
    /// A log line, with the `[component @ 0x...]` and `[level]` prefixes
    /// split off when present.
    Log {
        /// Parsed from a `[level]` prefix, `Info` when ffmpeg does not say.
        level: LogLevel,
        /// The emitting component, e.g. `libx264` or `mp4`.
        component: Option<String>,
        /// The line with recognized prefixes removed.
        message: String,
    },
    /// A `frame=... fps=... time=...` status line.
    Progress(Progress),
}

impl StderrEvent {
    /// Classifies one stderr line.
    ///
    /// This never fails; anything unrecognized comes back as an info-level
    /// log event with the text untouched.
    pub fn parse(line: &str) -> Self {
        let line = line.trim_end();
        if is_progress(line.trim_start()) {
            return Self::Progress(Progress::parse(line));
        }

        let mut level = None;
        let mut component = None;
        let mut rest = line;

        loop {
            let Some(stripped) = rest.strip_prefix('[') else { break };
            let Some((token, tail)) = stripped.split_once(']') else { break };

            if let Some((name, _)) = token.split_once(" @ ") {
                if component.is_some() {
                    break;
                }
                component = Some(name.trim().to_owned());
            } else if let Some(parsed) = LogLevel::from_name(token.trim()) {
                if level.is_some() {
                    break;
                }
                level = Some(parsed);
            } else {
                break;
            }

            rest = tail.trim_start();
        }

        Self::Log {
            level: level.unwrap_or(LogLevel::Info),
            component,
            message: rest.to_owned(),
        }
    }

    /// Forwards the event to `tracing`, mapping ffmpeg's levels onto the
    /// nearest tracing levels. Progress lines go out at debug.
    #[cfg(feature = "tracing")]
    pub fn emit_tracing(&self) {
        match self {
            Self::Progress(progress) => {
                tracing::debug!("progress: {progress:?}");
            }
            Self::Log { level, component, message } => {
                let component = component.as_deref().unwrap_or("ffmpeg");
                match level {
                    LogLevel::Trace | LogLevel::Verbose => tracing::trace!("{}: {component} @ {message}", level.as_str()),
                    LogLevel::Debug => tracing::debug!("{}: {component} @ {message}", level.as_str()),
                    LogLevel::Info => tracing::info!("{}: {component} @ {message}", level.as_str()),
                    LogLevel::Warning => tracing::warn!("{}: {component} @ {message}", level.as_str()),
                    LogLevel::Quiet | LogLevel::Error | LogLevel::Panic | LogLevel::Fatal => {
                        tracing::error!("{}: {component} @ {message}", level.as_str())
                    }
                }
            }
        }
    }
}

fn is_progress(line: &str) -> bool {
    line.starts_with("frame=") || line.starts_with("size=") || line.starts_with("Lsize=")
}

/// The fields of an encoding status line. Everything is optional since
/// ffmpeg prints `N/A` freely and the set of fields varies by stream kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Progress {
    /// Frames encoded so far.
    pub frame: Option<u64>,
    /// Current encoding rate in frames per second.
    pub fps: Option<f64>,
    /// Current quantizer scale.
    pub q: Option<f64>,
    /// Output written so far, in kilobytes.
    pub size_kb: Option<u64>,
    /// Position in the output stream.
    pub out_time: Option<Duration>,
    /// Current output bitrate in kilobits per second.
    pub bitrate_kbits: Option<f64>,
    /// Encoding speed relative to realtime, `1.0` is realtime.
    pub speed: Option<f64>,
}

impl Progress {
    fn parse(line: &str) -> Self {
        let mut progress = Self::default();

        // Values are padded left, so `fps= 25` tokenizes as `fps=` and `25`.
        let mut tokens = line.split_whitespace();
        while let Some(token) = tokens.next() {
            let Some((key, value)) = token.split_once('=') else { continue };
            let value = if value.is_empty() { tokens.next().unwrap_or("") } else { value };

            match key {
                "frame" => progress.frame = value.parse().ok(),
                "fps" => progress.fps = value.parse().ok(),
                "q" => progress.q = value.parse().ok(),
                "size" | "Lsize" => progress.size_kb = numeric_prefix(value).map(|v| v as u64),
                "time" => progress.out_time = parse_timecode(value),
                "bitrate" => progress.bitrate_kbits = numeric_prefix(value),
                "speed" => progress.speed = numeric_prefix(value),
                _ => {}
            }
        }

        progress
    }
}

// Reads the leading number out of values like `1024KiB`, `2097.2kbits/s`
// or `0.998x`. `N/A` has no leading number and maps to `None`.
fn numeric_prefix(value: &str) -> Option<f64> {
    let digits = value
        .char_indices()
        .take_while(|(_, c)| c.is_ascii_digit() || *c == '.')
        .map(|(i, c)| i + c.len_utf8())
        .last()?;
    value[..digits].parse().ok()
}

fn parse_timecode(value: &str) -> Option<Duration> {
    let mut parts = value.splitn(3, ':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;

    // Values a `Duration` cannot represent (overflowing hours, negative or
    // non-finite seconds) degrade to `None` rather than panicking.
    let whole = hours.checked_mul(3600)?.checked_add(minutes.checked_mul(60)?)?;
    Duration::try_from_secs_f64(whole as f64 + seconds).ok()
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use std::time::Duration;

    use crate::log::{LogLevel, Progress, StderrEvent};

    #[test]
    fn test_log_level_as_str_using_from_i32() {
        let test_cases = [
            (-8, "quiet"),
            (0, "panic"),
            (8, "fatal"),
            (16, "error"),
            (24, "warning"),
            (32, "info"),
            (40, "verbose"),
            (48, "debug"),
            (56, "trace"),
            (100, "info"),
            (-1, "info"),
        ];

        for &(input, expected) in &test_cases {
            let log_level = LogLevel::from_i32(input);
            assert_eq!(
                log_level.as_str(),
                expected,
                "Expected '{}' for input {}, but got '{}'",
                expected,
                input,
                log_level.as_str()
            );
        }
    }

    #[test]
    fn test_log_level_from_name() {
        assert_eq!(LogLevel::from_name("warning"), Some(LogLevel::Warning));
        assert_eq!(LogLevel::from_name("trace"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::from_name("libx264"), None, "component names are not levels");
        assert_eq!(LogLevel::from_name(""), None);
    }

    #[test]
    fn test_log_level_orders_by_verbosity() {
        assert!(LogLevel::Error < LogLevel::Warning);
        assert!(LogLevel::Warning < LogLevel::Info);
        assert!(LogLevel::Quiet < LogLevel::Trace);
    }

    #[test]
    fn test_parse_component_prefix() {
        let event = StderrEvent::parse("[libx264 @ 0x55d3c88b8a00] using SAR=1/1");
        assert_eq!(
            event,
            StderrEvent::Log {
                level: LogLevel::Info,
                component: Some("libx264".into()),
                message: "using SAR=1/1".into(),
            }
        );
    }

    #[test]
    fn test_parse_level_prefix() {
        let event = StderrEvent::parse("[error] Output file does not contain any stream");
        assert_eq!(
            event,
            StderrEvent::Log {
                level: LogLevel::Error,
                component: None,
                message: "Output file does not contain any stream".into(),
            }
        );
    }

    #[test]
    fn test_parse_component_and_level_prefixes() {
        let event = StderrEvent::parse("[mp4 @ 0x5560] [warning] pts has no value");
        assert_eq!(
            event,
            StderrEvent::Log {
                level: LogLevel::Warning,
                component: Some("mp4".into()),
                message: "pts has no value".into(),
            }
        );
    }

    #[test]
    fn test_parse_plain_line() {
        let event = StderrEvent::parse("Press [q] to stop, [?] for help");
        assert_eq!(
            event,
            StderrEvent::Log {
                level: LogLevel::Info,
                component: None,
                message: "Press [q] to stop, [?] for help".into(),
            }
        );
    }

    #[test]
    fn test_parse_progress_line() {
        let line = "frame=  100 fps= 25 q=28.0 size=    1024kB time=00:00:04.00 bitrate=2097.2kbits/s speed=   1x";
        assert_eq!(
            StderrEvent::parse(line),
            StderrEvent::Progress(Progress {
                frame: Some(100),
                fps: Some(25.0),
                q: Some(28.0),
                size_kb: Some(1024),
                out_time: Some(Duration::from_secs(4)),
                bitrate_kbits: Some(2097.2),
                speed: Some(1.0),
            })
        );
    }

    #[test]
    fn test_parse_progress_with_unknown_values() {
        let line = "size=N/A time=N/A bitrate=N/A speed=N/A";
        assert_eq!(StderrEvent::parse(line), StderrEvent::Progress(Progress::default()));
    }

    #[test]
    fn test_parse_final_progress_line() {
        let line = "frame=  250 fps=0.0 q=-1.0 Lsize=     150KiB time=00:00:09.88 bitrate= 124.3kbits/s speed=44.8x";
        let StderrEvent::Progress(progress) = StderrEvent::parse(line) else {
            panic!("expected a progress event");
        };

        assert_eq!(progress.frame, Some(250));
        assert_eq!(progress.q, Some(-1.0));
        assert_eq!(progress.size_kb, Some(150));
        assert_eq!(progress.speed, Some(44.8));
    }

    #[test]
    fn test_parse_timecode() {
        assert_eq!(super::parse_timecode("00:00:04.00"), Some(Duration::from_secs(4)));
        assert_eq!(
            super::parse_timecode("01:02:03.50"),
            Some(Duration::from_secs_f64(3723.5))
        );
        assert_eq!(super::parse_timecode("N/A"), None);
    }

    #[test]
    fn test_parse_timecode_rejects_unrepresentable_values() {
        let test_cases = [
            "00:00:-1.00",
            "00:00:inf",
            "00:00:nan",
            "9999999999999999999:00:00.00",
            "1:2",
            "",
        ];

        for value in test_cases {
            assert_eq!(super::parse_timecode(value), None, "expected None for {value:?}");
        }

        let line = "frame=    3 fps=0.0 q=0.0 time=00:00:-1.00 bitrate=N/A speed=N/A";
        let StderrEvent::Progress(progress) = StderrEvent::parse(line) else {
            panic!("expected a progress event");
        };
        assert_eq!(progress.frame, Some(3));
        assert_eq!(progress.out_time, None);
    }

    #[cfg(feature = "tracing")]
    #[test]
    #[tracing_test::traced_test]
    fn test_emit_tracing() {
        for line in [
            "[error] Conversion failed!",
            "[libx264 @ 0x55aa] using cpu capabilities: none!",
        ] {
            StderrEvent::parse(line).emit_tracing();
        }

        assert!(logs_contain("error: ffmpeg @ Conversion failed!"));
        assert!(logs_contain("info: libx264 @ using cpu capabilities: none!"));
    }
}
