use clap::{Args, Subcommand};

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Port the server listens on
    #[arg(long, short)]
    pub port: Option<u16>,

    /// Address the server binds to
    #[arg(long, short)]
    pub address: Option<String>,

    /// Path prefix the web interface is served under
    #[arg(long, short = 'r')]
    pub root_path: Option<String>,

    /// Log every request
    #[arg(long)]
    pub access_log: bool,
}

#[derive(Subcommand, Debug)]
pub enum AccountCommands {
    /// Create an account
    Add {
        /// Username for the new account
        username: String,

        /// Password; prompted for when omitted
        #[arg(long, short)]
        password: Option<String>,

        /// Give the account owner (admin) rights
        #[arg(long)]
        owner: bool,
    },

    /// List accounts
    #[command(alias = "ls")]
    List {
        /// Only show accounts whose username contains this
        #[arg(long, short)]
        search: Option<String>,
    },

    /// Delete an account
    #[command(alias = "rm")]
    Delete {
        /// Account ID
        id: i64,

        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
}
