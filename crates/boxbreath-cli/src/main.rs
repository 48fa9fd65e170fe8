use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "boxbreath", version, about = "Boxbreath guided breathing CLI")]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a breathing session in real time
    Run(commands::session::RunArgs),
    /// Simulate a session on a virtual clock and print its timeline
    Simulate(commands::session::SimulateArgs),
    /// Read or store patterns on the config server
    Pattern {
        #[command(subcommand)]
        action: commands::pattern::PatternAction,
    },
    /// Talk to the breathing companion
    Chat(commands::chat::ChatArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// List built-in presets
    Presets,
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Run(args) => commands::session::run(args),
        Commands::Simulate(args) => commands::session::simulate(args),
        Commands::Pattern { action } => commands::pattern::run(action),
        Commands::Chat(args) => commands::chat::run(args),
        Commands::Config { action } => commands::config::run(action),
        Commands::Presets => commands::pattern::presets(),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
