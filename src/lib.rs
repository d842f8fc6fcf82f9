// THEORY:
// This file is the main entry point for the `vigil_vision` library crate.
// It follows the standard Rust convention of using `lib.rs` to define the public
// API that will be exposed to external consumers (a camera loop, a UI, a
// recording replayer).
//
// The primary goal is to export `MonitorPipeline` and its associated data
// structures (`MonitorConfig`, `FrameReport`, `Snapshot`, etc.) as the clean,
// high-level interface of the tracking engine, with `MonitorSession` for hosts
// that drive it asynchronously. The tracking internals live in `core_modules`.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;
pub mod session;

pub use config::MonitorConfig;
pub use error::{DetectionError, MonitorError};
pub use pipeline::{Frame, FrameReport, MonitorPipeline};
pub use session::MonitorSession;
