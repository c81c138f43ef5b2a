//! prism: a deterministic capture/replay core for GPU frame debugging.
//!
//! Captures record a command stream per frame into a binary container
//! ([`trace`]); replay executes it on a CPU rasterizer and exposes event
//! lookup, pipeline-state snapshots, pixel readback and pixel history
//! ([`replay`]). The wire layout of the command stream itself lives in
//! [`protocol`].

pub use prism_protocol as protocol;
pub use prism_replay as replay;
pub use prism_trace as trace;
