//! devloop - a local development orchestrator
//!
//! Keeps a running application server in sync with its source tree: bundles
//! the app and its discovered tools, supervises the server process, and runs
//! one coordinated rebuild-and-restart per burst of source changes.

pub mod bootstrap;
pub mod bundler;
pub mod discovery;
pub mod error;
pub mod orchestrator;
pub mod supervisor;
pub mod watcher;

pub use error::{DevError, ErrorClass, Result};
