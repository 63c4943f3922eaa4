use clap::{Parser, Subcommand};

/// reactgate: chat reaction approvals for your applications
#[derive(Parser)]
#[command(name = "reactgate", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the API server and reaction intake
    Serve {
        /// Port to bind (overrides REACTGATE_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Inspect registered applications
    Apps {
        #[command(subcommand)]
        command: AppsCommands,
    },

    /// Inspect pending requests
    Requests {
        #[command(subcommand)]
        command: RequestsCommands,
    },
}

#[derive(Subcommand)]
pub enum AppsCommands {
    /// List applications stored in the state file
    List,
}

#[derive(Subcommand)]
pub enum RequestsCommands {
    /// List pending requests stored in the state file
    List,
}
