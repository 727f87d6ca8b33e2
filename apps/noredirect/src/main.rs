mod app;
mod config;

use app::App;
use clap::Parser;
use clap::Subcommand;
use config::AppConfig;
use config::LoggingConfig;
use nr_core::GuardError;
use nr_core::GuardResult;
use nr_core::SystemClock;
use nr_core::TabId;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Headless redirect shield: classify URLs, scan pages, run page scripts and
/// replay browser navigation events.
#[derive(Debug, Parser)]
#[command(name = "noredirect", version, about, long_about = None)]
struct Cli {
    /// TOML configuration (defaults to ./noredirect.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log at debug level regardless of the configured level
    #[arg(short, long)]
    verbose: bool,

    /// Keep state in memory only
    #[arg(long)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Classify a navigation target against a page
    Classify {
        url: String,
        #[arg(long)]
        page: String,
    },

    /// Run the page observer over an HTML file
    Scan {
        file: PathBuf,
        #[arg(long)]
        page: String,
        #[arg(long)]
        tab: Option<TabId>,
        /// Insert the markup after load instead of parsing it as the document
        #[arg(long)]
        dynamic: bool,
    },

    /// Execute a script in a shielded page realm
    RunScript {
        file: PathBuf,
        #[arg(long)]
        page: String,
        #[arg(long)]
        tab: Option<TabId>,
    },

    /// Show protection state, counters and recent blocks
    Status,

    /// Flip protection on or off
    Toggle,

    /// Empty the block history (counters are kept)
    ClearHistory,

    /// Reset every stored value to its defaults
    Reset,

    /// Feed a JSON array of navigation events to the coordinator
    Replay {
        file: PathBuf,
        /// Treat the replay as a browser start (session counter reset)
        #[arg(long)]
        startup: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(output) => {
            print!("{output}");
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("noredirect: {error}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> GuardResult<String> {
    let config = AppConfig::load(cli.config.as_deref())?;
    init_logging(&config.logging, cli.verbose)?;

    let storage = config.storage_for(cli.ephemeral);
    let mut app = App::open(config, &storage, Arc::new(SystemClock))?;

    match cli.command {
        Command::Classify { url, page } => app.classify(&url, &page),
        Command::Scan {
            file,
            page,
            tab,
            dynamic,
        } => {
            let html = read_input(&file)?;
            app.scan(&html, &page, tab, dynamic)
        }
        Command::RunScript { file, page, tab } => {
            let source = read_input(&file)?;
            Ok(app.run_script(&file.display().to_string(), &source, &page, tab))
        }
        Command::Status => app.status(),
        Command::Toggle => app.toggle(),
        Command::ClearHistory => app.clear_history(),
        Command::Reset => app.reset(),
        Command::Replay { file, startup } => {
            let events = read_input(&file)?;
            app.replay(&events, startup)
        }
    }
}

fn init_logging(config: &LoggingConfig, verbose: bool) -> GuardResult<()> {
    let level = if verbose {
        Level::DEBUG
    } else {
        config.max_level()?
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).map_err(|error| {
        GuardError::new(
            "app.logging_init_failed",
            format!("failed to install log subscriber: {error}"),
        )
    })
}

fn read_input(path: &Path) -> GuardResult<String> {
    std::fs::read_to_string(path).map_err(|error| {
        GuardError::new(
            "app.input_read_failed",
            format!("failed reading `{}`: {error}", path.display()),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use super::Command;
    use super::read_input;
    use clap::CommandFactory;
    use clap::Parser;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_scan_arguments() {
        let cli = Cli::try_parse_from([
            "noredirect",
            "--ephemeral",
            "scan",
            "page.html",
            "--page",
            "https://site.test/",
            "--tab",
            "4",
            "--dynamic",
        ])
        .unwrap_or_else(|_| unreachable!());
        assert!(cli.ephemeral);
        let Command::Scan { tab, dynamic, .. } = cli.command else {
            unreachable!();
        };
        assert_eq!(tab, Some(4));
        assert!(dynamic);
    }

    #[test]
    fn replay_file_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let path = dir.path().join("events.json");
        std::fs::write(&path, "[]").unwrap_or_else(|_| unreachable!());
        assert_eq!(read_input(&path).unwrap_or_else(|_| unreachable!()), "[]");
        assert!(read_input(&dir.path().join("missing.json")).is_err());
    }
}
