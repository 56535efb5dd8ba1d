use std::{error::Error, process, sync::Arc, time::Duration};

use clap::{command, Parser, Subcommand, ValueHint};
use log::{debug, error, info, warn, LevelFilter};
use tokio::io::{self, AsyncBufReadExt, BufReader};

use scrobbler::{
    auth::Authenticator,
    client::Client,
    config::Config,
    error::ErrorKind,
    observer::Observation,
    scrobbler::Scrobbler,
    secrets::Secrets,
    signal,
    state::{EngineState, Handle, Session},
    track::ScrobbleAt,
    transport::HttpTransport,
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when not built release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, PartialEq, Eq, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Secrets file
    ///
    /// Ensure that this file is kept secure and not shared publicly, as it
    /// contains sensitive information that can grant access to your Last.fm
    /// account.
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath, default_value_t = String::from("secrets.toml"))]
    secrets_file: String,

    /// When to scrobble: after half of a track, or near its end
    #[arg(long, value_name = "POINT", default_value_t = ScrobbleAt::Half)]
    scrobble_at: ScrobbleAt,

    /// Announce tracks as playing but never scrobble them
    #[arg(long, default_value_t = false)]
    no_scrobble: bool,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, PartialEq, Eq, Subcommand)]
enum Command {
    /// Allow scrobbling to your account
    ///
    /// Prints a page to open in the browser. Press Enter after approving
    /// access there; the session is then written to the secrets file.
    Auth {
        /// Seconds to wait for approval
        #[arg(long, value_name = "SECONDS", default_value_t = 600)]
        timeout: u64,
    },

    /// Scrobble observations read from standard input
    ///
    /// Reads one JSON observation per line, for instance:
    /// {"type":"playing","artist":"Björk","title":"Jóga","elapsed_ms":12000,"duration_ms":305000}
    Run,

    /// Remove the session from the secrets file
    Logout,
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
///
/// # Panics
///
/// Panics when a logger facade is already initialized.
fn init_logger(config: &Args) {
    let mut logger = env_logger::Builder::from_env(
        // Note: if you change the default logging level here, then you should
        // probably also change the verbosity levels below.
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if config.quiet || config.verbose > 0 {
        let level = match config.verbose {
            0 => {
                // Quiet and verbose are mutually exclusive, and `verbose` is 0
                // by default. So this arm means: quiet mode.
                LevelFilter::Warn
            }
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module(module_path!(), level);
    }

    logger.init();
}

/// Loads the secrets file, hinting at the documentation when it is missing.
fn load_secrets(secrets_file: &str) -> scrobbler::error::Result<Secrets> {
    let secrets = Secrets::from_file(secrets_file);

    if let Err(ref e) = secrets {
        if e.kind == ErrorKind::FailedPrecondition {
            info!("copy secrets.toml.example to {secrets_file} and fill in your API account");
        }
    }

    secrets
}

/// Writes the session held by the engine into the secrets file.
fn save_session(
    secrets_file: &str,
    secrets: &mut Secrets,
    session: &Session,
) -> scrobbler::error::Result<()> {
    secrets.session_key.clone_from(&session.key);
    secrets.username.clone_from(&session.username);
    secrets.to_file(secrets_file)
}

async fn auth(
    args: &Args,
    timeout: Duration,
    client: Arc<Client<HttpTransport>>,
    state: Handle,
    mut secrets: Secrets,
) -> Result<(), Box<dyn Error>> {
    let mut authenticator = Authenticator::new(client, state.clone());
    let url = authenticator.request_token().await?;

    println!("Open this page and allow access:\n\n    {url}\n\nThen press Enter.");

    let mut lines = BufReader::new(io::stdin()).lines();
    tokio::time::timeout(timeout, lines.next_line()).await??;

    let event = authenticator.approve().await?;
    info!("{event}");

    save_session(&args.secrets_file, &mut secrets, &state.snapshot().session)?;
    info!("session written to {}", args.secrets_file);

    Ok(())
}

async fn run_observer(
    args: &Args,
    client: Arc<Client<HttpTransport>>,
    state: Handle,
    mut secrets: Secrets,
) -> Result<(), Box<dyn Error>> {
    if !state.lock().session.is_authenticated() {
        warn!("not authenticated: tracks will not be scrobbled; run `scrobbler auth` first");
    }

    let scrobbler = Scrobbler::new(client, state.clone());
    let mut signals = signal::Signals::new()?;
    let mut lines = BufReader::new(io::stdin()).lines();

    loop {
        tokio::select! {
            // Prioritize shutdown signals.
            biased;

            signal = signals.recv() => {
                if signal.is_shutdown() {
                    info!("received {signal}, shutting down gracefully");
                    break;
                }

                info!("received {signal}, reloading session");
                match load_secrets(&args.secrets_file) {
                    Ok(reloaded) => {
                        state.with(|state| {
                            state.session.key.clone_from(&reloaded.session_key);
                            state.session.username.clone_from(&reloaded.username);
                        });
                        secrets = reloaded;
                    }
                    Err(e) => error!("{e}"),
                }
            }

            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("end of input, shutting down");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }

                let observation = match Observation::parse(&line) {
                    Ok(observation) => observation,
                    Err(e) => {
                        warn!("{e}");
                        continue;
                    }
                };

                match observation.apply(&scrobbler).await {
                    Ok(events) => {
                        for event in events {
                            debug!("{event}");
                        }
                    }
                    Err(e) if e.is_invalid_session() => {
                        error!("{e}; run `scrobbler auth` to log in again");
                        save_session(&args.secrets_file, &mut secrets, &state.snapshot().session)?;
                    }
                    Err(e) => warn!("{e}"),
                }
            }
        }
    }

    Ok(())
}

/// Main application logic.
///
/// # Errors
///
/// This function returns an error when the secrets file cannot be read or
/// written, or when authorization fails.
async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let mut secrets = load_secrets(&args.secrets_file)?;

    if args.command == Command::Logout {
        secrets.session_key = None;
        secrets.username = None;
        secrets.to_file(&args.secrets_file)?;
        info!("session removed from {}", args.secrets_file);
        return Ok(());
    }

    let mut config = Config::new(secrets.api_key.as_str(), secrets.api_secret.as_str())?;
    config.preferences.scrobble_at = args.scrobble_at;
    config.preferences.scrobble_enabled = !args.no_scrobble;

    let state = Handle::new(EngineState {
        session: Session {
            key: secrets.session_key.clone(),
            username: secrets.username.clone(),
            ..Session::default()
        },
        preferences: config.preferences,
        ..EngineState::default()
    });

    let client = Arc::new(Client::new(&config, HttpTransport::new(&config)?));

    match args.command {
        Command::Auth { timeout } => {
            auth(&args, Duration::from_secs(timeout), client, state, secrets).await
        }
        Command::Run => run_observer(&args, client, state, secrets).await,
        Command::Logout => Ok(()),
    }
}

/// Main entry point of the application.
///
/// This function initializes the logger facade, parses the command line
/// arguments, and starts the main application loop.
#[tokio::main]
async fn main() {
    // `clap` handles our command line arguments and help text.
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    // This aids in debugging of whatever comes next.
    debug!("Command {:#?}", args);

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();

    info!("starting {name}/{version}; {BUILD_PROFILE}");

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}
