//! Command handlers, one module per subcommand group

pub mod config;
pub mod rebuild;
pub mod records;
pub mod status;
pub mod user;
