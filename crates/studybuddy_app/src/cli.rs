use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::platform::logging::LogDestination;

#[derive(Parser, Debug)]
#[command(name = "studybuddy")]
#[command(about = "Upload PDFs and chat about them with the Study Buddy backend", long_about = None)]
pub struct Cli {
    /// RON config file (default: ./studybuddy.ron if present)
    #[arg(long, env = "STUDYBUDDY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Backend base URL, overrides the config file
    #[arg(long, env = "STUDYBUDDY_BASE_URL")]
    pub base_url: Option<String>,

    /// Retrieved chunks per chat turn, overrides the config file
    #[arg(long, env = "STUDYBUDDY_N_RESULTS")]
    pub n_results: Option<u32>,

    #[arg(long, value_enum, default_value_t = LogDestination::File)]
    pub log: LogDestination,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check that the backend is reachable
    Health,
    /// Upload a PDF and follow its processing
    Upload {
        file: PathBuf,
        /// Give up on processing after this many seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },
    /// Ask one question and print the answer
    Ask {
        /// Only search this document
        #[arg(short, long)]
        document: Option<String>,
        query: String,
    },
    /// Interactive chat on stdin; Ctrl-D ends it
    Chat {
        /// Only search this document
        #[arg(short, long)]
        document: Option<String>,
    },
    /// List processed documents
    Documents,
    /// Delete a document from the backend
    Delete { document_id: String },
}
