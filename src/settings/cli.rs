use super::Parser;
use clap::Subcommand;

#[derive(Parser, Debug)]
#[command(name = "coursehub", about = "Authenticated client for the course backend")]
pub struct Cli {
    #[arg(long)]
    pub settings: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign in and store the session.
    SignIn {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the stored session.
    SignOut,
    /// Report whether a session is stored.
    Status,
    /// GET a resource and print it as JSON.
    Get {
        path: String,
        /// Query parameters as key=value.
        #[arg(long = "query", short = 'q')]
        query: Vec<String>,
    },
    /// Send an arbitrary request.
    Send {
        method: String,
        path: String,
        /// JSON request body.
        #[arg(long)]
        body: Option<String>,
    },
}
