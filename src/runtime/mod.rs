//! Runtime: configuration, the invocation loop, and entry points.

pub mod config;
pub mod dispatcher;
pub mod entry;
pub mod invoke_loop;
pub mod options;

pub use config::RuntimeConfig;
pub use dispatcher::run_concurrent;
pub use entry::{run, run_with_options, serve, start, start_with_options};
pub use invoke_loop::Runtime;
pub use options::HandlerOptions;
