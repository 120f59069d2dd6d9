use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use docrefine::{Category, batch, search, workflow};

#[derive(Debug, Parser)]
#[command(
    name = "docrefine",
    version,
    about = "Keep a small business-document library and refine search \
             queries against it"
)]
pub struct Cli {
    /// Override the data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Override the refiner model
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Defaults to `interactive`
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Import a single file (txt, md, csv, json, pdf)
    Import(ImportArgs),
    /// Import every supported file under a directory
    ImportDir(ImportDirArgs),
    /// Add a document from inline text
    Add(AddArgs),
    /// Show a document
    Show(ShowArgs),
    /// Add or overwrite attributes on a document
    Tag {
        /// Document id
        id: String,
        /// Attributes as key=value
        #[arg(required = true)]
        attributes: Vec<String>,
    },
    /// Delete a document and its content file
    Delete {
        /// Document id
        id: String,
    },
    /// List indexed documents
    List(ListArgs),
    /// Keyword search over document contents
    Search(SearchArgs),
    /// Document counts by category
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Refine a search query (or a file of queries) using matching
    /// documents as context
    Query(QueryArgs),
    /// Interactive prompt
    Interactive,
    /// Reconcile the index with the content folders
    Repair(RepairArgs),
    /// Manage the refiner model setting
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
    /// Read and write stored settings (model, api_base)
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Import --

#[derive(Debug, Parser)]
pub struct ImportArgs {
    /// File to import
    pub file: PathBuf,

    /// Category; inferred from the path and content when omitted
    #[arg(short = 't', long = "type")]
    pub category: Option<Category>,

    /// Extra attributes as key=value (repeatable)
    #[arg(short, long = "metadata")]
    pub metadata: Vec<String>,

    /// Use this id instead of generating one
    #[arg(long)]
    pub id: Option<String>,
}

#[derive(Debug, Parser)]
pub struct ImportDirArgs {
    /// Directory to walk
    pub dir: PathBuf,

    /// Category for every file; inferred per file when omitted
    #[arg(short = 't', long = "type")]
    pub category: Option<Category>,

    /// Only import files whose relative path matches this glob
    #[arg(short, long)]
    pub glob: Option<String>,

    /// List what would be imported without touching the index
    #[arg(long)]
    pub dry_run: bool,

    /// Output the report as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Add --

#[derive(Debug, Parser)]
pub struct AddArgs {
    /// Category of the document
    #[arg(short = 't', long = "type")]
    pub category: Category,

    /// Attributes as key=value (repeatable)
    #[arg(short, long = "metadata")]
    pub metadata: Vec<String>,

    /// Use this id instead of generating one
    #[arg(long)]
    pub id: Option<String>,

    /// Document text
    pub text: String,
}

// -- Show --

#[derive(Debug, Parser)]
pub struct ShowArgs {
    /// Document id
    pub id: String,

    /// Output as JSON with metadata
    #[arg(long)]
    pub json: bool,

    /// Print only metadata
    #[arg(long)]
    pub meta: bool,

    /// First line to print (1-indexed)
    #[arg(long, default_value = "1")]
    pub from_line: usize,

    /// Maximum number of lines to print
    #[arg(long)]
    pub max_lines: Option<usize>,

    /// Prefix each line with its number
    #[arg(long)]
    pub line_numbers: bool,
}

// -- List --

#[derive(Debug, Parser)]
pub struct ListArgs {
    /// Only list this category
    #[arg(short = 't', long = "type")]
    pub category: Option<Category>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// Keywords, whitespace separated
    pub query: String,

    /// Number of results to return
    #[arg(short = 'n', long, default_value_t = search::DEFAULT_LIMIT)]
    pub count: usize,

    /// Search only within this category
    #[arg(short = 't', long = "type")]
    pub category: Option<Category>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Query --

#[derive(Debug, Parser)]
pub struct QueryArgs {
    /// The raw query
    #[arg(required_unless_present = "batch", conflicts_with = "batch")]
    pub query: Option<String>,

    /// Refine every query in this file (one per line, `#` comments)
    #[arg(long, value_name = "FILE")]
    pub batch: Option<PathBuf>,

    /// Write the batch report (markdown) here instead of stdout
    #[arg(short, long, value_name = "FILE", requires = "batch")]
    pub output: Option<PathBuf>,

    /// Seconds to wait between batch queries
    #[arg(long, default_value_t = batch::DEFAULT_BATCH_PAUSE.as_secs_f64())]
    pub pause: f64,

    /// Do not send matching documents as context
    #[arg(long)]
    pub no_context: bool,

    /// Maximum number of documents used as context
    #[arg(long, default_value_t = workflow::DEFAULT_MAX_DOCS)]
    pub max_docs: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Repair --

#[derive(Debug, Parser)]
pub struct RepairArgs {
    /// Only print what would change
    #[arg(long)]
    pub dry_run: bool,

    /// Discard the existing index and rebuild it from the content folders
    #[arg(long)]
    pub reset: bool,
}

// -- Model --

#[derive(Debug, Subcommand)]
pub enum ModelAction {
    /// Show the currently resolved model
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Persist a default model in config.redb
    Set {
        /// Model name, e.g. gemini-1.5-pro
        model: String,
    },
    /// Clear the stored model setting (revert to default)
    Clear,
}

// -- Config --

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// List stored settings
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print one stored setting
    Get {
        /// Setting key
        key: String,
    },
    /// Store a setting
    Set {
        /// Setting key (model or api_base)
        key: String,
        /// New value
        value: String,
    },
    /// Remove a stored setting
    Clear {
        /// Setting key
        key: String,
    },
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "docrefine",
            &mut std::io::stdout(),
        );
    }
}
