use anyhow::Result;
use clap::{Parser, Subcommand};

mod common;
mod error;
mod format;
mod ifempty;
mod ifexists;
mod join;
mod key;
mod merge;
mod reader;
mod writer;

#[derive(Parser)]
#[command(
    name = "kgtkit",
    version,
    about = "Set-relational operations on KGTK edge and node files.",
    long_about = "kgtkit filters, partitions, and joins tab-separated KGTK files by key. Keys default to the node1 column of edge files and the id column of node files; column names resolve through the KGTK alias tables (from/subject, predicate/relation, to/object, ID). Every subcommand reads from files or standard input and writes to files or standard output."
)]
struct Cli {
    /// Log progress and run statistics to stderr (honours RUST_LOG)
    #[arg(short = 'v', long = "verbose", global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output
    #[arg(short = 'q', long = "quiet", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Keep input rows whose key appears in the filter file
    #[command(name = "ifexists")]
    IfExists(ifexists::IfExistsArgs),
    /// Keep input rows whose key does not appear in the filter file
    #[command(name = "ifnotexists")]
    IfNotExists(ifexists::IfNotExistsArgs),
    /// Join two KGTK files on their key columns
    Join(join::JoinArgs),
    /// Keep rows whose selected columns are empty
    #[command(name = "ifempty")]
    IfEmpty(ifempty::EmptyArgs),
    /// Keep rows whose selected columns are not empty
    #[command(name = "ifnotempty")]
    IfNotEmpty(ifempty::EmptyArgs),
}

fn init_tracing(cli: &Cli) {
    let filter = if cli.quiet {
        tracing_subscriber::EnvFilter::new("off")
    } else if cli.verbose {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
    } else {
        tracing_subscriber::EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    if let Err(err) = run(cli) {
        eprintln!("kgtkit: {:#}", err);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::IfExists(args) => ifexists::run_ifexists(args),
        Commands::IfNotExists(args) => ifexists::run_ifnotexists(args),
        Commands::Join(args) => join::run(args),
        Commands::IfEmpty(args) => ifempty::run_ifempty(args),
        Commands::IfNotEmpty(args) => ifempty::run_ifnotempty(args),
    }
}
