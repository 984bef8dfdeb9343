use std::net::SocketAddr;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::{
    embedding::{DEFAULT_BATCH_SIZE, DEFAULT_PASSAGE_PREFIX},
    glance::DEFAULT_WINDOW_SIZE,
    server::{DEFAULT_CACHE_CAPACITY, DEFAULT_SERVER_WINDOW_SIZE},
};

#[derive(Debug, Parser)]
#[command(
    name = "glance",
    about = "Find the most important line windows of a source file"
)]
pub struct Cli {
    /// Encoder model ID on the HuggingFace Hub or local model directory
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Compute device: auto, cpu, cuda[:N] or metal[:N]
    #[arg(long, global = true, default_value = "auto")]
    pub device: String,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Rank the line windows of a file and print the best ones
    Glance(GlanceArgs),
    /// Serve ranked windows for Sourcegraph files over HTTP
    Serve(ServeArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Glance --

#[derive(Debug, Parser)]
pub struct GlanceArgs {
    /// Local path or Sourcegraph blob URL
    #[arg(long)]
    pub file: String,

    /// Number of lines per window
    #[arg(short = 'w', long, default_value_t = DEFAULT_WINDOW_SIZE)]
    pub window_size: usize,

    /// Number of windows to print
    #[arg(short = 'n', long, default_value = "5")]
    pub top: usize,

    /// Print every window as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub embed: EmbedArgs,
}

// -- Serve --

#[derive(Debug, Parser)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:5000")]
    pub bind: SocketAddr,

    /// Number of lines per window
    #[arg(short = 'w', long, default_value_t = DEFAULT_SERVER_WINDOW_SIZE)]
    pub window_size: usize,

    /// Maximum number of cached responses
    #[arg(long, default_value_t = DEFAULT_CACHE_CAPACITY)]
    pub cache_capacity: usize,

    #[command(flatten)]
    pub embed: EmbedArgs,
}

// -- Embedding options --

#[derive(Debug, Clone, clap::Args)]
pub struct EmbedArgs {
    /// Texts per encoder forward pass
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Truncate windows to this many tokens (default: model setting or 512)
    #[arg(long)]
    pub max_seq_length: Option<usize>,

    /// Marker prepended to every window before encoding
    #[arg(long, default_value = DEFAULT_PASSAGE_PREFIX)]
    pub prefix: String,
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
            "glance",
            &mut std::io::stdout(),
        );
    }
}
