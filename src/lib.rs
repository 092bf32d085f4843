//! smina-driver: job configuration, command building and result parsing for
//! smina docking runs
//!
//! This library turns docking options into smina and Open Babel command
//! lines, names the files those programs produce, and reads their scores
//! back into result sets. The programs themselves run as external processes.

pub mod command;
pub mod flex;
pub mod geometry;
pub mod io;
pub mod job;
pub mod naming;
pub mod paths;
pub mod results;
pub mod runner;
pub mod scoring;
pub mod session;

// Re-export commonly used types and functions
pub use command::{build_dock_command, CommandLine};
pub use geometry::BoxSpec;
pub use job::{JobConfig, RefineConfig};
pub use naming::ArtifactNamer;
pub use paths::{PathStyle, PathTranslator};
pub use results::{merge_flexres, parse_poses, PoseRecord, PoseSet};
pub use runner::{Executor, ProcessExecutor, RunError};
pub use session::Session;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
