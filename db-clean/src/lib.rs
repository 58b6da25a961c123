pub mod api;
pub mod commands;
pub mod drain;

pub mod cmd {
    pub use super::commands::Cli;
}
