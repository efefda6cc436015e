//! CLI engine: argument parsing, option layering and the demo runner

pub mod arg_parser;
pub mod cli;
pub mod progress;

pub use arg_parser::Cli;
pub use cli::handle_run;
