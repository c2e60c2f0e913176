use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use shiori::cli::{
    AccountCommands, OpenMode, ServeArgs, init_deps, run_account_add, run_account_delete,
    run_account_list, run_add, run_check, run_delete, run_export, run_import, run_migrate,
    run_open, run_pocket, run_print, run_serve, run_update, run_version,
};
use shiori::config::Config;

#[derive(Parser)]
#[command(name = "shiori")]
#[command(about = "Simple bookmark manager built with Rust", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the web interface and REST API
    Serve(ServeArgs),

    /// Apply pending database migrations
    Migrate,

    /// Bookmark a URL
    Add {
        /// URL to bookmark
        url: String,

        /// Custom title
        #[arg(long, short)]
        title: Option<String>,

        /// Custom excerpt
        #[arg(long, short)]
        excerpt: Option<String>,

        /// Tags for this bookmark
        #[arg(long = "tags", short = 'T', num_args = 1..)]
        tags: Vec<String>,

        /// Save the bookmark without fetching the page
        #[arg(long, short = 'o')]
        offline: bool,

        /// Skip creating the offline archive
        #[arg(long)]
        no_archival: bool,

        /// Make the bookmark visible to anonymous visitors
        #[arg(long)]
        public: bool,
    },

    /// Print saved bookmarks
    #[command(aliases = ["list", "ls"])]
    Print {
        /// Indices such as `1 5 7-9`; all bookmarks when empty
        indices: Vec<String>,

        /// Output as JSON
        #[arg(long, short)]
        json: bool,

        /// Only print bookmark indices
        #[arg(long, short)]
        index_only: bool,

        /// Only bookmarks matching this keyword
        #[arg(long, short)]
        search: Option<String>,

        /// Only bookmarks with all of these tags
        #[arg(long, short, num_args = 1..)]
        tags: Vec<String>,

        /// Skip bookmarks with any of these tags
        #[arg(long, short, num_args = 1..)]
        exclude: Vec<String>,
    },

    /// Open saved bookmarks in the browser
    Open {
        /// Indices such as `1 5 7-9`; all bookmarks when empty
        indices: Vec<String>,

        /// Skip confirmation prompt and open ALL bookmarks
        #[arg(long, short = 'y')]
        yes: bool,

        /// Serve the bookmark's archive locally and open that
        #[arg(long, short, conflicts_with = "text_cache")]
        archive: bool,

        /// Port the archive is served on; a free one when 0
        #[arg(long, short = 'p', default_value_t = 0)]
        archive_port: u16,

        /// Print the cached readable text in the terminal
        #[arg(long, short)]
        text_cache: bool,
    },

    /// Re-fetch bookmark content and edit tags
    Update {
        /// Indices such as `1 5 7-9`; all bookmarks when empty
        indices: Vec<String>,

        /// Do not fetch anything, only apply tag edits
        #[arg(long, short = 'o')]
        offline: bool,

        /// Keep the stored title and excerpt
        #[arg(long, short)]
        keep_metadata: bool,

        /// Tags to add; prefix with `-` to remove
        #[arg(long = "tags", short = 'T', num_args = 1.., allow_hyphen_values = true)]
        tags: Vec<String>,

        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Delete bookmarks
    #[command(alias = "rm")]
    Delete {
        /// Indices such as `1 5 7-9`; all bookmarks when empty
        indices: Vec<String>,

        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Import bookmarks from a Netscape bookmark file
    Import {
        file: PathBuf,

        /// Tag each bookmark with the name of its folder
        #[arg(long, short)]
        generate_tag: bool,

        /// Fetch every imported page
        #[arg(long)]
        online: bool,
    },

    /// Import bookmarks from a Pocket export
    Pocket { file: PathBuf },

    /// Export bookmarks to a Netscape bookmark file
    Export { file: PathBuf },

    /// Find bookmarks whose pages are no longer reachable
    Check {
        /// Indices such as `1 5 7-9`; all bookmarks when empty
        indices: Vec<String>,

        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Manage accounts
    Account {
        #[command(subcommand)]
        command: AccountCommands,
    },

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("shiori=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if matches!(cli.command, Commands::Version) {
        run_version();
        return Ok(());
    }

    let config = Config::from_env()?;

    if let Commands::Serve(args) = cli.command {
        return run_serve(config, args).await;
    }

    let deps = init_deps(config).await?;
    let result = match cli.command {
        Commands::Serve(_) | Commands::Version => Ok(()),
        Commands::Migrate => run_migrate(&deps).await,
        Commands::Add {
            url,
            title,
            excerpt,
            tags,
            offline,
            no_archival,
            public,
        } => run_add(&deps, url, title, excerpt, tags, offline, no_archival, public).await,
        Commands::Print {
            indices,
            json,
            index_only,
            search,
            tags,
            exclude,
        } => run_print(&deps, indices, json, index_only, search, tags, exclude).await,
        Commands::Update {
            indices,
            offline,
            keep_metadata,
            tags,
            yes,
        } => run_update(&deps, indices, offline, keep_metadata, tags, yes).await,
        Commands::Open {
            indices,
            yes,
            archive,
            archive_port,
            text_cache,
        } => {
            let mode = if archive {
                OpenMode::Archive { port: archive_port }
            } else if text_cache {
                OpenMode::TextCache
            } else {
                OpenMode::Browser
            };
            run_open(&deps, indices, mode, yes).await
        }
        Commands::Delete { indices, yes } => run_delete(&deps, indices, yes).await,
        Commands::Import {
            file,
            generate_tag,
            online,
        } => run_import(&deps, &file, generate_tag, online).await,
        Commands::Pocket { file } => run_pocket(&deps, &file).await,
        Commands::Export { file } => run_export(&deps, &file).await,
        Commands::Check { indices, yes } => run_check(&deps, indices, yes).await,
        Commands::Account { command } => match command {
            AccountCommands::Add {
                username,
                password,
                owner,
            } => run_account_add(&deps, username, password, owner).await,
            AccountCommands::List { search } => run_account_list(&deps, search).await,
            AccountCommands::Delete { id, yes } => run_account_delete(&deps, id, yes).await,
        },
    };

    if let Err(e) = deps.store.close().await {
        tracing::warn!("Failed to close database: {e}");
    }
    result
}
