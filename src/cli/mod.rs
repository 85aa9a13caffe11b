//! Command-line surface: argument types and one runner per subcommand.

pub mod args;
pub mod count;
pub mod dump;
pub mod histo;
pub mod info;
pub mod merge;

pub use args::{Cli, Command};
