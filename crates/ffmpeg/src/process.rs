use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};

use crate::error::FfmpegError;
use crate::graph::Command;
use crate::log::StderrEvent;

/// Launches compiled commands as `ffmpeg` child processes.
///
/// The zero-configuration form runs `ffmpeg` from `PATH`:
///
/// ```no_run
/// # async fn example() -> Result<(), ffmpeg_async::FfmpegError> {
/// use ffmpeg_async::{input, Ffmpeg};
///
/// let command = input("in.mp4").hflip().output("out.mp4");
/// Ffmpeg::default().run(command).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, bon::Builder)]
pub struct Ffmpeg {
    /// The executable to launch, `ffmpeg` from `PATH` unless overridden.
    #[builder(into, default = String::from("ffmpeg"))]
    program: String,
    /// Adds `-y` even when the command itself does not ask for it.
    #[builder(default)]
    overwrite: bool,
    /// Arguments inserted ahead of the compiled ones, e.g. `-hide_banner`
    /// or `-nostdin`.
    #[builder(default)]
    prepend_args: Vec<String>,
    /// Kills the child when its handle is dropped before it exits.
    #[builder(default = true)]
    kill_on_drop: bool,
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Which standard streams of the child get pipes; the rest are inherited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pipes {
    /// Pipe the child's stdin.
    pub stdin: bool,
    /// Pipe the child's stdout.
    pub stdout: bool,
    /// Pipe the child's stderr.
    pub stderr: bool,
}

impl Pipes {
    /// Inherit all three streams from the parent process.
    pub const NONE: Self = Self {
        stdin: false,
        stdout: false,
        stderr: false,
    };

    /// Pipe all three streams.
    pub const ALL: Self = Self {
        stdin: true,
        stdout: true,
        stderr: true,
    };
}

impl Default for Pipes {
    fn default() -> Self {
        Self::NONE
    }
}

fn stdio(piped: bool) -> Stdio {
    if piped {
        Stdio::piped()
    } else {
        Stdio::inherit()
    }
}

impl Ffmpeg {
    /// The argument list [`spawn`](Ffmpeg::spawn) and [`run`](Ffmpeg::run)
    /// hand to the program.
    pub fn argv(&self, command: impl Into<Command>) -> Result<Vec<String>, FfmpegError> {
        let command = command.into();

        let mut args = self.prepend_args.clone();
        args.extend(command.compile()?);
        if self.overwrite && !args.iter().any(|arg| arg == "-y") {
            args.push("-y".into());
        }

        Ok(args)
    }

    /// Starts the command with the given pipe setup.
    pub fn spawn(&self, command: impl Into<Command>, pipes: Pipes) -> Result<FfmpegChild, FfmpegError> {
        let args = self.argv(command)?;

        let mut builder = tokio::process::Command::new(&self.program);
        builder
            .args(&args)
            .stdin(stdio(pipes.stdin))
            .stdout(stdio(pipes.stdout))
            .stderr(stdio(pipes.stderr))
            .kill_on_drop(self.kill_on_drop);

        let child = builder.spawn().map_err(|source| FfmpegError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        Ok(FfmpegChild {
            program: self.program.clone(),
            child,
        })
    }

    /// [`spawn`](Ffmpeg::spawn) with every stream piped.
    pub fn spawn_piped(&self, command: impl Into<Command>) -> Result<FfmpegChild, FfmpegError> {
        self.spawn(command, Pipes::ALL)
    }

    /// Runs the command to completion, capturing stdout and stderr.
    ///
    /// A non-zero exit becomes [`FfmpegError::Exit`] carrying both captured
    /// streams, so the caller never has to re-run a failed command to see
    /// what ffmpeg printed.
    pub async fn run(&self, command: impl Into<Command>) -> Result<RunOutput, FfmpegError> {
        self.run_inner(command.into(), None).await
    }

    /// Like [`run`](Ffmpeg::run) with `data` fed to the child's stdin, for
    /// `-i pipe:0` style commands.
    pub async fn run_with_input(&self, command: impl Into<Command>, data: Bytes) -> Result<RunOutput, FfmpegError> {
        self.run_inner(command.into(), Some(data)).await
    }

    async fn run_inner(&self, command: Command, data: Option<Bytes>) -> Result<RunOutput, FfmpegError> {
        let pipes = Pipes {
            stdin: data.is_some(),
            stdout: true,
            stderr: true,
        };

        let mut child = self.spawn(command, pipes)?;
        let stdin = data.and_then(|data| child.take_stdin().map(|pipe| (pipe, data)));

        // Writing stdin and draining the output pipes have to overlap or a
        // child that fills its stdout buffer deadlocks against us.
        let (output, ()) = tokio::try_join!(child.child.wait_with_output(), feed_stdin(stdin))?;

        let stdout = Bytes::from(output.stdout);
        let stderr = Bytes::from(output.stderr);
        if !output.status.success() {
            return Err(FfmpegError::Exit {
                program: self.program.clone(),
                status: output.status,
                stdout,
                stderr,
            });
        }

        Ok(RunOutput {
            status: output.status,
            stdout,
            stderr,
        })
    }

    /// Asks the program for its version, parsed out of the first banner
    /// line (`ffmpeg version 6.1.1-... Copyright ...`).
    pub async fn version(&self) -> Result<String, FfmpegError> {
        let mut builder = tokio::process::Command::new(&self.program);
        builder
            .args(&self.prepend_args)
            .arg("-version")
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

        let banner = String::from_utf8_lossy(&output.stdout);
        parse_version(&banner)
            .ok_or_else(|| FfmpegError::VersionParse(banner.lines().next().unwrap_or_default().to_owned()))
    }
}

fn parse_version(banner: &str) -> Option<String> {
    let first = banner.lines().next()?;
    let mut words = first.split_whitespace();
    while let Some(word) = words.next() {
        if word == "version" {
            return words.next().map(str::to_owned);
        }
    }
    None
}

async fn feed_stdin(stdin: Option<(ChildStdin, Bytes)>) -> std::io::Result<()> {
    let Some((mut pipe, data)) = stdin else {
        return Ok(());
    };

    let done = async move {
        pipe.write_all(&data).await?;
        pipe.shutdown().await
    };

    // ffmpeg closes stdin as soon as it has decided the input is broken;
    // the exit status is the error that matters then, not the pipe.
    match done.await {
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

/// A running ffmpeg process.
#[derive(Debug)]
pub struct FfmpegChild {
    program: String,
    child: Child,
}

impl FfmpegChild {
    /// The child's process id while it is still running.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Takes the stdin pipe; `None` when it was not piped or already taken.
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    /// Takes the stdout pipe.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Takes the stderr pipe.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Writes `data` to the child's stdin and flushes it.
    pub async fn write_stdin(&mut self, data: &[u8]) -> Result<(), FfmpegError> {
        let stdin = self.child.stdin.as_mut().ok_or(FfmpegError::MissingPipe("stdin"))?;
        stdin.write_all(data).await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Closes stdin so the child sees end of input.
    pub async fn close_stdin(&mut self) -> Result<(), FfmpegError> {
        let mut stdin = self.child.stdin.take().ok_or(FfmpegError::MissingPipe("stdin"))?;
        stdin.shutdown().await?;
        Ok(())
    }

    /// Asks ffmpeg to finish up and stop by pressing `q` on its stdin, the
    /// graceful counterpart of [`kill`](FfmpegChild::kill).
    pub async fn quit(&mut self) -> Result<(), FfmpegError> {
        self.write_stdin(b"q").await
    }

    /// Kills the process immediately and reaps it.
    pub async fn kill(&mut self) -> Result<(), FfmpegError> {
        self.child.kill().await?;
        Ok(())
    }

    /// Waits for the process to exit.
    ///
    /// Non-zero statuses are returned, not turned into errors; a streaming
    /// caller has already seen the diagnostics go by.
    pub async fn wait(&mut self) -> Result<ExitStatus, FfmpegError> {
        Ok(self.child.wait().await?)
    }

    /// [`wait`](FfmpegChild::wait) bounded by `timeout`; the child keeps
    /// running if the timeout fires.
    pub async fn wait_timeout(&mut self, timeout: Duration) -> Result<ExitStatus, FfmpegError> {
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(status) => Ok(status?),
            Err(_) => Err(FfmpegError::Timeout),
        }
    }

    /// Waits for exit and collects whatever remains on the piped streams,
    /// with a non-zero exit reported as [`FfmpegError::Exit`].
    pub async fn wait_with_output(self) -> Result<RunOutput, FfmpegError> {
        let program = self.program;
        let output = self.child.wait_with_output().await?;

        let stdout = Bytes::from(output.stdout);
        let stderr = Bytes::from(output.stderr);
        if !output.status.success() {
            return Err(FfmpegError::Exit {
                program,
                status: output.status,
                stdout,
                stderr,
            });
        }

        Ok(RunOutput {
            status: output.status,
            stdout,
            stderr,
        })
    }

    /// Streams parsed stderr events; takes the stderr pipe.
    pub fn stderr_events(&mut self) -> Result<StderrEvents, FfmpegError> {
        let stderr = self.take_stderr().ok_or(FfmpegError::MissingPipe("stderr"))?;
        Ok(StderrEvents {
            lines: BufReader::new(stderr).lines(),
            pending: VecDeque::new(),
        })
    }

    /// Spawns a task that forwards stderr to `tracing` until the pipe
    /// closes.
    #[cfg(feature = "tracing")]
    pub fn forward_stderr(&mut self) -> Result<tokio::task::JoinHandle<()>, FfmpegError> {
        let mut events = self.stderr_events()?;
        Ok(tokio::spawn(async move {
            while let Ok(Some(event)) = events.next_event().await {
                event.emit_tracing();
            }
        }))
    }
}

/// The stderr of a child broken into [`StderrEvent`]s.
///
/// Status lines ffmpeg overwrites in place with carriage returns are split
/// into individual events too.
#[derive(Debug)]
pub struct StderrEvents {
    lines: Lines<BufReader<ChildStderr>>,
    pending: VecDeque<String>,
}

impl StderrEvents {
    /// The next event, `None` once stderr closes.
    pub async fn next_event(&mut self) -> Result<Option<StderrEvent>, FfmpegError> {
        loop {
            if let Some(segment) = self.pending.pop_front() {
                return Ok(Some(StderrEvent::parse(&segment)));
            }

            match self.lines.next_line().await? {
                Some(line) => {
                    self.pending
                        .extend(line.split('\r').filter(|s| !s.trim().is_empty()).map(str::to_owned));
                }
                None => return Ok(None),
            }
        }
    }
}

/// What a finished process left behind.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// The exit status, always successful when coming from
    /// [`Ffmpeg::run`].
    pub status: ExitStatus,
    /// Captured standard output.
    pub stdout: Bytes,
    /// Captured standard error.
    pub stderr: Bytes,
}

impl RunOutput {
    /// Stderr decoded for display.
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use bytes::Bytes;

    use crate::error::FfmpegError;
    use crate::graph::{input, input_with};
    use crate::process::{Ffmpeg, Pipes};

    #[test]
    fn test_builder_defaults() {
        let ffmpeg = Ffmpeg::default();
        assert_eq!(ffmpeg.program, "ffmpeg");
        assert!(!ffmpeg.overwrite);
        assert!(ffmpeg.prepend_args.is_empty());
        assert!(ffmpeg.kill_on_drop);
    }

    #[test]
    fn test_argv_prepends_and_adds_overwrite() {
        let ffmpeg = Ffmpeg::builder()
            .overwrite(true)
            .prepend_args(vec!["-hide_banner".into()])
            .build();

        let args = ffmpeg.argv(input("in.mp4").output("out.mp4")).unwrap();
        assert_eq!(args, ["-hide_banner", "-i", "in.mp4", "out.mp4", "-y"]);

        let args = ffmpeg.argv(input("in.mp4").output("out.mp4").overwrite_output()).unwrap();
        assert_eq!(args, ["-hide_banner", "-i", "in.mp4", "out.mp4", "-y"], "-y is not doubled");
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(
            super::parse_version("ffmpeg version 6.1.1 Copyright (c) 2000-2023 the FFmpeg developers"),
            Some("6.1.1".into())
        );
        assert_eq!(super::parse_version("ffprobe version n7.0"), Some("n7.0".into()));
        assert_eq!(super::parse_version("garbage"), None);
        assert_eq!(super::parse_version(""), None);
    }

    #[tokio::test]
    async fn test_spawn_failure_names_the_program() {
        let ffmpeg = Ffmpeg::builder().program("definitely-missing-binary-xyz").build();
        let err = ffmpeg
            .run(input("in.mp4").output("out.mp4"))
            .await
            .expect_err("the program does not exist");

        let FfmpegError::Spawn { program, .. } = err else {
            panic!("expected a spawn error, got {err}");
        };
        assert_eq!(program, "definitely-missing-binary-xyz");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_error_message() {
        let ffmpeg = Ffmpeg::builder().program("definitely-missing-binary-xyz").build();
        let err = ffmpeg
            .run(input("in.mp4").output("out.mp4"))
            .await
            .expect_err("the program does not exist");

        insta::with_settings!({ filters => vec![(r"os error \d+", "os error N")] }, {
            insta::assert_snapshot!(err, @r#"failed to spawn "definitely-missing-binary-xyz": No such file or directory (os error N)"#);
        });
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_success_and_failure_statuses() {
        let ok = Ffmpeg::builder().program("true").build();
        let output = ok.run(input("in.mp4").output("out.mp4")).await.expect("true exits zero");
        assert!(output.status.success());
        assert!(output.stdout.is_empty());

        let fail = Ffmpeg::builder().program("false").build();
        let err = fail
            .run(input("in.mp4").output("out.mp4"))
            .await
            .expect_err("false exits non-zero");

        let FfmpegError::Exit { status, .. } = err else {
            panic!("expected an exit error, got {err}");
        };
        assert_eq!(status.code(), Some(1));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_with_input_feeds_stdin() {
        let ffmpeg = Ffmpeg::builder()
            .program("sh")
            .prepend_args(vec!["-c".into(), "cat".into(), "sh".into()])
            .build();

        let output = ffmpeg
            .run_with_input(input("pipe:0").output("pipe:1"), Bytes::from_static(b"raw frames"))
            .await
            .expect("cat copies stdin to stdout");
        assert_eq!(output.stdout.as_ref(), b"raw frames");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_quit_reaches_the_child() {
        let ffmpeg = Ffmpeg::builder()
            .program("sh")
            .prepend_args(vec!["-c".into(), "head -c1 >/dev/null".into(), "sh".into()])
            .build();

        let mut child = ffmpeg
            .spawn(input("in.mp4").output("out.mp4"), Pipes { stdin: true, ..Pipes::NONE })
            .expect("spawn sh");

        child.quit().await.expect("write q");
        let status = child.wait().await.expect("wait");
        assert!(status.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_wait_timeout_then_kill() {
        let ffmpeg = Ffmpeg::builder()
            .program("sh")
            .prepend_args(vec!["-c".into(), "sleep 5".into(), "sh".into()])
            .build();

        let mut child = ffmpeg
            .spawn(input("in.mp4").output("out.mp4"), Pipes::NONE)
            .expect("spawn sh");

        let err = child
            .wait_timeout(std::time::Duration::from_millis(50))
            .await
            .expect_err("sleep outlives the timeout");
        assert!(matches!(err, FfmpegError::Timeout), "got {err}");

        child.kill().await.expect("kill");
        let status = child.wait().await.expect("wait after kill");
        assert!(!status.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stderr_events_stream() {
        use crate::log::{LogLevel, StderrEvent};

        let script = "printf '[error] boom\\nframe=  10 fps= 5 q=2.0 size=     256kB time=00:00:01.00 bitrate= 500.0kbits/s speed=   2x\\n' >&2";
        let ffmpeg = Ffmpeg::builder()
            .program("sh")
            .prepend_args(vec!["-c".into(), script.into(), "sh".into()])
            .build();

        let mut child = ffmpeg
            .spawn(input("in.mp4").output("out.mp4"), Pipes { stderr: true, ..Pipes::NONE })
            .expect("spawn sh");
        let mut events = child.stderr_events().expect("stderr is piped");

        let first = events.next_event().await.expect("read").expect("first line");
        assert_eq!(
            first,
            StderrEvent::Log {
                level: LogLevel::Error,
                component: None,
                message: "boom".into(),
            }
        );

        let second = events.next_event().await.expect("read").expect("second line");
        let StderrEvent::Progress(progress) = second else {
            panic!("expected progress, got {second:?}");
        };
        assert_eq!(progress.frame, Some(10));

        assert_eq!(events.next_event().await.expect("read"), None);
        child.wait().await.expect("wait");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_version_parses_the_banner() {
        let ffmpeg = Ffmpeg::builder()
            .program("sh")
            .prepend_args(vec![
                "-c".into(),
                "printf 'ffmpeg version 6.1.1-static https://johnvansickle.com/ffmpeg/\\n'".into(),
                "sh".into(),
            ])
            .build();

        assert_eq!(ffmpeg.version().await.expect("banner parses"), "6.1.1-static");
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg on PATH"]
    async fn test_real_transcode_smoke() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dest = dir.path().join("out.mp4").to_string_lossy().into_owned();

        let source = input_with("testsrc=duration=1:size=64x64:rate=10", crate::opts! { "f" => "lavfi" });
        let command = source
            .output_with(dest.as_str(), crate::opts! { "pix_fmt" => "yuv420p" })
            .overwrite_output();

        let output = Ffmpeg::default().run(command).await.expect("ffmpeg transcodes the test source");
        assert!(output.status.success());
        assert!(std::fs::metadata(&dest).expect("output file exists").len() > 0);
    }
}
