//! Async bindings for the `ffmpeg` command line, with complex filtering support.
//!
//! ## Why do we need this?
//!
//! Driving ffmpeg from code usually means formatting argument strings by hand,
//! and `-filter_complex` is where that breaks down: link labels, escaping and
//! stream mapping are easy to get wrong and hard to read back.
//!
//! This crate builds the filter graph as a value instead. Streams flow from
//! [`input`] through filter methods into [`Output`]s, the compiler assigns
//! labels and escaping, and the process layer runs the result on tokio with
//! the child's pipes under your control.
//!
//! ## Examples
//!
//! ### Building and compiling a filter graph
//!
//! ```rust
//! # fn test_fn() -> Result<(), ffmpeg_async::GraphError> {
//! use ffmpeg_async::{concat, input, opts, Opts};
//!
//! // 1. Open the inputs. Per-input options compile to flags ahead of `-i`.
//! let main = input("input.mp4");
//! let logo = input("overlay.png").hflip();
//!
//! // 2. Cut two pieces out of the main input and join them back to back.
//! let part1 = main.trim(opts! { "start_frame" => 10, "end_frame" => 20 });
//! let part2 = main.trim(opts! { "start_frame" => 30, "end_frame" => 40 });
//! let joined = concat([part1, part2], Opts::new())?;
//!
//! // 3. Put the flipped logo on top and declare the output file.
//! let command = joined.overlay(&logo, Opts::new()).output("out.mp4");
//!
//! // 4. Compile to the argument list ffmpeg would receive.
//! let args = command.compile()?;
//! assert_eq!(args[..4], ["-i", "input.mp4", "-i", "overlay.png"]);
//! assert_eq!(args[4], "-filter_complex");
//! # Ok(())
//! # }
//! # test_fn().expect("failed to run test");
//! ```
//!
//! ### Running ffmpeg and probing the result
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), ffmpeg_async::FfmpegError> {
//! use ffmpeg_async::{input, opts, probe, Ffmpeg};
//!
//! // 1. Transcode, overwriting any existing output.
//! let command = input("in.mp4")
//!     .hflip()
//!     .output_with("out.mp4", opts! { "video_bitrate" => "1000k" });
//! Ffmpeg::builder().overwrite(true).build().run(command).await?;
//!
//! // 2. Ask ffprobe what came out.
//! let report = probe("out.mp4").await?;
//! if let Some(video) = report.video() {
//!     println!("encoded {} frames", video.nb_frames.as_deref().unwrap_or("?"));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Watching progress
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), ffmpeg_async::FfmpegError> {
//! use ffmpeg_async::{input, Ffmpeg, Pipes, StderrEvent};
//!
//! let command = input("in.mp4").output("out.mp4");
//! let mut child = Ffmpeg::default().spawn(command, Pipes { stderr: true, ..Pipes::NONE })?;
//!
//! let mut events = child.stderr_events()?;
//! while let Some(event) = events.next_event().await? {
//!     if let StderrEvent::Progress(progress) = event {
//!         println!("frame {:?} at {:?}x realtime", progress.frame, progress.speed);
//!     }
//! }
//! child.wait().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! - `tracing`: enables `StderrEvent::emit_tracing` and
//!   `FfmpegChild::forward_stderr` for handing child stderr to the
//!   [tracing](https://docs.rs/tracing) ecosystem.
//!
//! ## Status
//!
//! This crate is currently under development and is not yet stable.
//!
//! Use at your own risk.
//!
//! ## License
//!
//! This project is licensed under the [MIT](./LICENSE.MIT) or [Apache-2.0](./LICENSE.Apache-2.0) license.
//! You can choose between one of them if you use this work.
//!
//! `SPDX-License-Identifier: MIT OR Apache-2.0`
#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(unsafe_code)]

/// Error handling.
pub mod error;
/// Filter graph construction.
pub mod graph;
/// Log levels and stderr classification.
pub mod log;
/// Key-value option collections.
pub mod opts;
/// Media probing via ffprobe.
pub mod probe;
/// Process launching and supervision.
pub mod process;

pub use error::{FfmpegError, GraphError};
pub use filters::{concat, filter_inputs};
pub use graph::{input, input_with, merge_outputs, output, Command, Output, Stream};
pub use log::{LogLevel, Progress, StderrEvent};
pub use opts::{OptValue, Opts};
pub use probe::{probe, Ffprobe, ProbeFormat, ProbeOutput, ProbeStream};
pub use process::{Ffmpeg, FfmpegChild, Pipes, RunOutput, StderrEvents};

mod compile;
mod filters;
mod view;
