use clap::{Parser, Subcommand, ValueEnum};
use genai::adapter::AdapterKind;
use std::path::PathBuf;

/// Contact extraction and classification over personal mbox archives
#[derive(Parser, Debug)]
#[command(
    name = "siftbox",
    about = "Extracts and classifies real contacts from mbox email archives",
    version,
    author,
    long_about = "siftbox streams through mbox archives, keeps only addresses with a \
                  genuine two-way exchange, enriches them from signature blocks and an \
                  optional local LLM, classifies each relationship, and exports a \
                  CRM-ready contact list. Runs are resumable; answers given during \
                  review are never asked again."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Increase verbosity")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Run the full extraction pipeline",
        long_about = "Runs every stage: index, exchange validation, enrichment, \
                      classification with review, and export.\n\n\
                      Examples:\n  \
                      siftbox run ~/mail/archive.mbox\n  \
                      siftbox run ~/mail/*.mbox --auto-accept\n  \
                      siftbox run archive.mbox --no-llm --resume"
    )]
    Run(RunArgs),

    #[command(
        about = "Build or refresh the exchange index only",
        long_about = "Streams the archives once and writes the exchange index, without \
                      enriching or classifying anything.\n\n\
                      Examples:\n  \
                      siftbox scan ~/mail/archive.mbox"
    )]
    Scan(ScanArgs),

    #[command(about = "Show the state of the current or last run")]
    Status(StatusArgs),

    #[command(
        about = "Re-export the contact partition from stored state",
        long_about = "Rebuilds the confirmed/unassigned/spam partition from the stored \
                      enrichment cache and index. Pure projection: no archive access, \
                      no LLM calls.\n\n\
                      Examples:\n  \
                      siftbox export --format yaml\n  \
                      siftbox export -o contacts.json"
    )]
    Export(ExportArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    #[arg(
        value_name = "ARCHIVE",
        help = "Mbox archive file(s); falls back to SIFTBOX_ARCHIVE"
    )]
    pub archives: Vec<PathBuf>,

    #[arg(long, value_name = "DIR", help = "State directory override")]
    pub state_dir: Option<PathBuf>,

    #[arg(long, help = "Accept every classifier proposal without prompting")]
    pub auto_accept: bool,

    #[arg(long, help = "Skip LLM-assisted extraction; regex layer only")]
    pub no_llm: bool,

    #[arg(long, help = "Resume the previous run if the archive is unchanged")]
    pub resume: bool,

    #[arg(
        short = 'b',
        long,
        value_parser = parse_adapter_kind,
        help = "LLM provider (default: ollama)"
    )]
    pub backend: Option<AdapterKind>,

    #[arg(
        short = 'm',
        long,
        value_name = "MODEL",
        help = "Model name (provider-specific, e.g. 'qwen2.5:14b' for Ollama)"
    )]
    pub model: Option<String>,

    #[arg(
        long,
        value_name = "SECONDS",
        help = "LLM request timeout in seconds"
    )]
    pub timeout: Option<u64>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format for the final partition"
    )]
    pub format: OutputFormatArg,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write output to file instead of stdout"
    )]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct ScanArgs {
    #[arg(
        value_name = "ARCHIVE",
        help = "Mbox archive file(s); falls back to SIFTBOX_ARCHIVE"
    )]
    pub archives: Vec<PathBuf>,

    #[arg(long, value_name = "DIR", help = "State directory override")]
    pub state_dir: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, value_name = "DIR", help = "State directory override")]
    pub state_dir: Option<PathBuf>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct ExportArgs {
    #[arg(long, value_name = "DIR", help = "State directory override")]
    pub state_dir: Option<PathBuf>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write output to file instead of stdout"
    )]
    pub output: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}

fn parse_adapter_kind(s: &str) -> Result<AdapterKind, String> {
    AdapterKind::from_lower_str(&s.to_lowercase()).ok_or_else(|| {
        format!(
            "Invalid provider: {}. Valid options: ollama, openai, anthropic, gemini, xai, groq",
            s
        )
    })
}
