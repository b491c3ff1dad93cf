use super::commands::{RequestCommand, ScopeCommand};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ppc")]
#[command(about = "Resilient HTTP client for the Power Platform administration APIs")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the authorization scope resolved for a URL
    Scope(ScopeCommand),
    /// Print the credential strategy selected by the current configuration
    Strategy,
    /// Execute a request, optionally following the operation it starts
    Request(RequestCommand),
}
