//! CLI argument definitions for quotegate.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `serve` | Run the HTTP gateway |
//! | `token` | Acquire the bearer credential ahead of serving |
//!
//! Connection settings come from the environment (`DC_DB_STRING`, `QUOTEGATE_BACKEND`,
//! ...) or a local `.env` file.
//!
//! # Examples
//!
//! ```bash
//! # Sign in once, then serve on the default port
//! quotegate token
//! quotegate serve --port 5001
//!
//! # Force a new credential even if the cached one is valid
//! quotegate token --refresh
//! ```

use std::net::IpAddr;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "quotegate",
    author,
    version,
    about = "Read-only gateway for equity price records"
)]
pub struct Cli {
    /// Log filter used when `RUST_LOG` is unset (e.g. `debug`, `quotegate_core=trace`).
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the HTTP API.
    Serve(ServeArgs),
    /// Acquire (or refresh) the bearer credential and print its expiry.
    Token(TokenArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    #[arg(long, default_value = "0.0.0.0")]
    pub host: IpAddr,

    #[arg(long, default_value_t = 5001)]
    pub port: u16,
}

#[derive(Debug, Args)]
pub struct TokenArgs {
    /// Ignore cached credentials and sign in again.
    #[arg(long)]
    pub refresh: bool,
}
