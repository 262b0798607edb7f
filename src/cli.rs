use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the paragraphs extracted from a document as a JSON array
    Paragraphs {
        /// Counterparty document (.docx or plain text)
        document: PathBuf,
    },

    /// Retrieve the closest document paragraphs for every template clause
    Retrieve {
        /// Counterparty document (.docx or plain text)
        document: PathBuf,

        /// Template clause library (JSON)
        #[clap(short, long)]
        template: PathBuf,

        /// Paragraphs retrieved per clause (overrides config)
        #[clap(short = 'k', long)]
        top_k: Option<usize>,

        /// Embedding model (overrides config)
        #[clap(short, long)]
        model: Option<String>,

        /// Write records here instead of stdout
        #[clap(short, long)]
        output: Option<PathBuf>,

        /// Don't read or write the document index cache
        #[clap(long, default_value = "false")]
        no_cache: bool,
    },

    /// Print the best retrieved paragraph of every record
    Best {
        /// Clause records (JSON)
        records: PathBuf,
    },

    /// Keep only the records whose answer matches a label
    Filter {
        /// Clause records (JSON)
        records: PathBuf,

        /// Answer label, compared case-insensitively (e.g. "missing")
        #[clap(short, long)]
        answer: String,

        /// Write filtered records here instead of stdout
        #[clap(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the top retrieved paragraphs of every record
    Show {
        /// Clause records (JSON)
        records: PathBuf,

        /// How many retrieved paragraphs to show per record
        #[clap(long)]
        top: Option<usize>,
    },
}
