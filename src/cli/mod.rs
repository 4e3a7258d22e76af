pub mod commands;
pub mod output;

pub use commands::{Cli, run_command};
pub use output::{error_message, info_message, success_message, warning_message};
