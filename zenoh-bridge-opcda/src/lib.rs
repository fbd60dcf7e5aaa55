//! Zenoh bridge for classic DA tag servers.
//!
//! This bridge polls tags from a DA-style source on a fixed interval and
//! republishes the latest reading of each tag, either as messages on the
//! Zenoh fabric or as a served attribute table with optional write-back.
//!
//! # Key Expressions
//!
//! ```text
//! <key_prefix>/<tag_path>            latest reading / served attribute
//! <key_prefix>/@/status              bridge status (publish sink)
//! <key_prefix>/@/health              health snapshot (publish sink)
//! <key_prefix>/@/write/<tag_path>    write-back endpoint (serve sink, readonly=false)
//! ```
//!
//! Where `<tag_path>` is the source tag path, e.g. `line1/temp`.

pub mod config;
pub mod console;
pub mod memory;
pub mod publish;
pub mod serve;
pub mod sim;
