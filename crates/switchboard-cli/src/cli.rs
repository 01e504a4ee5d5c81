use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands::ask::handle_ask;
use crate::commands::ingest::handle_ingest;
use crate::commands::plan::handle_plan;
use crate::commands::session::handle_session;
use crate::logging::setup_logging;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "FILE",
        help = "Settings file (toml, yaml or json)",
        long_help = "Settings file layered over the defaults. SWITCHBOARD_* environment variables still take precedence."
    )]
    config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Log debug output to stderr")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer a single query
    #[command(about = "Answer a single query")]
    Ask {
        #[arg(help = "The question to answer")]
        query: String,

        #[arg(long, value_name = "DIR", help = "Vector index folder for retrieval")]
        index: Option<PathBuf>,

        #[arg(long, help = "Print the executed steps after the answer")]
        trace: bool,

        #[arg(long, help = "Print the whole result as JSON", conflicts_with = "trace")]
        json: bool,
    },

    /// Show the plan that runs when no model plan is available
    #[command(about = "Print the deterministic fallback plan as JSON")]
    Plan {
        #[arg(help = "The question to plan for")]
        query: String,
    },

    /// Build the local document index
    #[command(about = "Build the vector index from a folder of documents")]
    Ingest {
        #[arg(
            long,
            value_name = "DIR",
            default_value = "data/docs",
            help = "Folder of .txt and .md documents"
        )]
        docs: PathBuf,

        #[arg(long, value_name = "DIR", help = "Output index folder")]
        index: Option<PathBuf>,
    },

    /// Answer queries read from stdin, one per line
    #[command(
        about = "Answer queries from stdin until a blank line or 'exit'",
        visible_alias = "s"
    )]
    Session {
        #[arg(long, value_name = "DIR", help = "Vector index folder for retrieval")]
        index: Option<PathBuf>,
    },
}

pub async fn cli() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;
    let config = cli.config.as_deref();

    match cli.command {
        Command::Ask {
            query,
            index,
            trace,
            json,
        } => handle_ask(config, index, &query, trace, json).await,
        Command::Plan { query } => handle_plan(&query),
        Command::Ingest { docs, index } => handle_ingest(config, &docs, index).await,
        Command::Session { index } => handle_session(config, index).await,
    }
}
