pub mod commands;
pub mod server;
