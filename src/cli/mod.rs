pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{CliArgs, Commands, ExportArgs, RunArgs, ScanArgs, StatusArgs};
pub use output::{OutputFormat, OutputFormatter};
