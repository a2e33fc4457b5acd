//! Airlink CLI
//!
//! Thin wrapper around airlink-core for command-line usage.
//!
//! ## Usage
//!
//! ```bash
//! # Show local data and profile summary
//! airlink info
//!
//! # Fetch and verify flights and news
//! airlink sync
//!
//! # Keep syncing on a schedule until Ctrl+C
//! airlink watch
//!
//! # List stored flights, favorites first
//! airlink flights list --favorites
//!
//! # Relay local data to a nearby device
//! airlink share serve
//!
//! # Receive data from a device sharing under code 482913
//! airlink share join 482913 --addr 192.168.1.20:40123
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rand::Rng;
use tokio_util::sync::CancellationToken;

use airlink_core::config::{default_data_dir, StaticPeer};
use airlink_core::{
    Airlink, AirlinkConfig, DataSource, Flight, NewsItem, PeerEvent, PeerEvents,
    PeerLinkManager, ProfileStore, ProfileWriter, Snapshot, SnapshotReader, StaticDirectory,
    SyncOutcome, SyncReport,
};

/// Points awarded per completed relay, at most once per cooldown window
const SHARE_POINTS: i64 = 5;

const CONFIG_FILE: &str = "airlink.toml";

/// Airlink - verified flight data that keeps working offline
#[derive(Parser)]
#[command(name = "airlink")]
#[command(version = "0.1.0")]
#[command(about = "Airlink - verified flight data that keeps working offline")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Data directory (default: ~/.airlink/data)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file (default: <data-dir>/airlink.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show local data and profile summary
    Info,

    /// Print the effective configuration as TOML
    Config,

    /// Fetch, verify and store authority data once
    Sync {
        #[arg(value_enum, default_value_t = SyncTarget::All)]
        target: SyncTarget,
    },

    /// Sync on a schedule until interrupted
    Watch,

    /// Stored flights
    Flights {
        #[command(subcommand)]
        action: FlightsAction,
    },

    /// Stored news
    News {
        #[command(subcommand)]
        action: NewsAction,
    },

    /// Device profile
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },

    /// Device-to-device relay
    Share {
        #[command(subcommand)]
        action: ShareAction,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SyncTarget {
    Flights,
    News,
    All,
}

#[derive(Subcommand)]
enum FlightsAction {
    /// List stored flights
    List {
        /// Only favorites
        #[arg(long)]
        favorites: bool,
    },
    /// Mark a flight as favorite
    Favorite {
        flight_number: String,
        /// Remove the mark instead
        #[arg(long)]
        off: bool,
    },
}

#[derive(Subcommand)]
enum NewsAction {
    /// List stored news
    List {
        /// Only news about this flight
        #[arg(long)]
        flight: Option<String>,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// Show the device profile
    Show,
    /// Add points
    AddPoints { points: i64 },
    /// Turn sharing mode on or off
    Sharing {
        #[arg(value_enum)]
        mode: Toggle,
    },
    /// Turn the extra-battery relay role on or off
    Battery {
        #[arg(value_enum)]
        mode: Toggle,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

impl Toggle {
    fn is_on(self) -> bool {
        matches!(self, Toggle::On)
    }
}

#[derive(Subcommand)]
enum ShareAction {
    /// Wait for one peer and send it the local data
    Serve {
        /// Pairing code (default: random 6 digits)
        code: Option<String>,
    },
    /// Connect to a sharing peer and print what it sends
    Join {
        code: String,
        /// Peer address, when not listed in the config
        #[arg(long)]
        addr: Option<String>,
    },
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Explicit `--config`, else `<data_dir>/airlink.toml` when it exists.
fn load_config(explicit: Option<&Path>, data_dir: &Path) -> Result<AirlinkConfig> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => Some(data_dir.join(CONFIG_FILE)).filter(|p| p.exists()),
    };
    AirlinkConfig::load_or_default(path.as_deref())
        .with_context(|| format!("loading config from {:?}", path))
}

fn generate_code() -> String {
    format!("{:06}", rand::rng().random_range(0..1_000_000))
}

fn print_flight(flight: &Flight) {
    let star = if flight.favorite { "*" } else { " " };
    println!(
        "{} {:<8} {} -> {}  dep {}  arr {}  {} ({})",
        star,
        flight.flight_number,
        flight.from_short,
        flight.to_short,
        flight.depart_time,
        flight.arrive_time,
        flight.status,
        flight.update_time,
    );
}

fn print_news(item: &NewsItem) {
    println!("  [{}] {} - {}", item.date, item.flight_number, item.title);
    if !item.content.is_empty() {
        println!("      {}", item.content);
    }
}

fn print_outcome<T>(label: &str, outcome: &SyncOutcome<T>) {
    match outcome {
        SyncOutcome::Success { payload, source } => {
            println!("  {}: {} records ({})", label, payload.len(), source);
        }
        SyncOutcome::Failure(reason) => {
            println!("  {}: failed ({})", label, reason);
        }
    }
}

fn print_snapshot(snapshot: &Snapshot) {
    println!("Flights ({}):", snapshot.flights.len());
    for flight in &snapshot.flights {
        print_flight(flight);
    }
    println!();
    println!("News ({}):", snapshot.news.len());
    for item in &snapshot.news {
        print_news(item);
    }
}

/// Whether a report should be retried sooner than the regular interval
fn needs_retry(report: &SyncReport) -> bool {
    let stale = |source: Option<DataSource>| source.map_or(true, |s| s.is_stale());
    stale(report.flights.source()) || stale(report.news.source())
}

/// Stats, cleanup and pending profile writes. Failures are logged and the
/// next pass tries again.
async fn run_housekeeping<S: ProfileStore>(writer: &ProfileWriter<S>) {
    if let Err(e) = writer.update_user_stats().await {
        tracing::warn!(error = %e, "Updating user stats failed");
    }
    if let Err(e) = writer.cleanup_old_data().await {
        tracing::warn!(error = %e, "Cleaning up old data failed");
    }
    if let Err(e) = writer.flush_if_needed().await {
        tracing::warn!(error = %e, "Flushing profile changes failed");
    }
}

async fn run_watch(airlink: &Airlink) -> Result<()> {
    let scheduler = airlink.config().scheduler.clone();
    let cancel = CancellationToken::new();

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    println!("Watching (Ctrl+C to stop)");
    let mut attempt = 0u32;
    loop {
        airlink.sync().invalidate_all();
        let report = airlink.sync().sync_all().await;
        println!("Sync at {}:", chrono::Local::now().format("%H:%M:%S"));
        print_outcome("Flights", &report.flights);
        print_outcome("News", &report.news);

        run_housekeeping(airlink.writer()).await;

        let delay = if needs_retry(&report) {
            let delay = scheduler.backoff(attempt);
            attempt = attempt.saturating_add(1);
            delay
        } else {
            attempt = 0;
            scheduler.interval()
        };
        tracing::debug!(?delay, attempt, "Next sync scheduled");

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    println!("Stopped");
    Ok(())
}

/// Send the snapshot to the first peer and award points once it leaves.
async fn serve_one_peer(
    airlink: &Airlink,
    link: &PeerLinkManager,
    events: &mut PeerEvents,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("Stopping");
                return Ok(());
            }
            event = events.recv() => match event {
                Some(PeerEvent::Connected(peer)) => {
                    let snapshot = airlink.snapshot()?;
                    link.send(&snapshot.to_frame()?)?;
                    println!(
                        "Sent {} flights and {} news to {}",
                        snapshot.flights.len(),
                        snapshot.news.len(),
                        peer
                    );
                }
                Some(PeerEvent::Data(_)) => {}
                Some(PeerEvent::Disconnected(peer)) => {
                    println!("{} disconnected", peer);
                    if airlink.writer().add_points_with_cooldown(SHARE_POINTS).await? {
                        println!("  Earned {} points", SHARE_POINTS);
                    }
                    return Ok(());
                }
                Some(PeerEvent::Error(code, message)) => {
                    bail!("link failed ({:?}): {}", code, message);
                }
                None => return Ok(()),
            },
        }
    }
}

async fn receive_snapshot(events: &mut PeerEvents) -> Result<Snapshot> {
    let mut reader = SnapshotReader::new();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => bail!("interrupted"),
            event = events.recv() => match event {
                Some(PeerEvent::Connected(peer)) => println!("Connected to {}", peer),
                Some(PeerEvent::Data(chunk)) => {
                    if let Some(snapshot) = reader.push(&chunk)? {
                        return Ok(snapshot);
                    }
                }
                Some(PeerEvent::Disconnected(_)) | None => {
                    bail!("peer closed the link before sending its data");
                }
                Some(PeerEvent::Error(code, message)) => {
                    bail!("link failed ({:?}): {}", code, message);
                }
            },
        }
    }
}

async fn run_serve(airlink: &Airlink, code: Option<String>) -> Result<()> {
    let code = code.unwrap_or_else(generate_code);
    let directory = StaticDirectory::from_config(&airlink.config().link.peers)
        .context("resolving configured peers")?;
    let link = airlink.link_manager(Arc::new(directory));

    let was_sharing = airlink
        .store()
        .load_user()?
        .is_some_and(|profile| profile.is_sharing_mode);

    // Sharing mode is only recorded once the server is actually up
    let mut events = link.start_server(&code)?;
    if let Err(e) = airlink.writer().set_sharing_mode(true).await {
        link.stop();
        return Err(e.into());
    }
    println!("Sharing local data");
    println!("  Code: {}", code);
    if let Some(addr) = link.local_addr() {
        println!("  Address: {}", addr);
    }
    println!();
    println!("Waiting for a peer (Ctrl+C to stop)...");

    let result = serve_one_peer(airlink, &link, &mut events).await;

    link.stop();
    if !was_sharing {
        airlink.writer().set_sharing_mode(false).await?;
    }
    result
}

async fn run_join(airlink: &Airlink, code: String, addr: Option<String>) -> Result<()> {
    let mut peers = airlink.config().link.peers.clone();
    if let Some(addr) = addr {
        peers.push(StaticPeer {
            name: code.clone(),
            addr,
        });
    }
    let directory = StaticDirectory::from_config(&peers).context("resolving peer address")?;
    let link = airlink.link_manager(Arc::new(directory));

    let mut events = link.connect(&code)?;
    println!("Looking for peer with code {}...", code);

    let result = receive_snapshot(&mut events).await;
    link.stop();

    let snapshot = result?;
    println!();
    println!("Relayed data (not verified, not stored):");
    println!();
    print_snapshot(&snapshot);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    let config = load_config(cli.config.as_deref(), &data_dir)?;

    if let Commands::Config = cli.command {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let airlink = Airlink::open(&data_dir, config)?;

    match cli.command {
        Commands::Config => {}

        Commands::Info => {
            let info = airlink.info()?;

            println!("Airlink v0.1.0");
            println!();
            println!("Authority:");
            match info.authority_fingerprint {
                Some(fingerprint) => println!("  Key: {}", fingerprint),
                None => println!("  Key: (invalid, every payload will be rejected)"),
            }
            println!("  Endpoint: {}", airlink.config().remote.base_url);
            println!();
            println!("Profile:");
            match info.profile {
                Some(profile) => {
                    println!("  Points: {}", profile.points);
                    println!("  Sharing: {}", profile.is_sharing_mode);
                    println!("  More battery: {}", profile.more_battery_guy);
                }
                None => println!("  (none)"),
            }
            println!();
            println!("Data directory: {}", info.data_dir.display());
            println!("Flights: {}", info.flight_count);
            println!("News: {}", info.news_count);
        }

        Commands::Sync { target } => {
            println!("Syncing...");
            let ok = match target {
                SyncTarget::Flights => {
                    let outcome = airlink.sync().sync_flights().await;
                    print_outcome("Flights", &outcome);
                    outcome.is_success()
                }
                SyncTarget::News => {
                    let outcome = airlink.sync().sync_news().await;
                    print_outcome("News", &outcome);
                    outcome.is_success()
                }
                SyncTarget::All => {
                    let report = airlink.sync().sync_all().await;
                    print_outcome("Flights", &report.flights);
                    print_outcome("News", &report.news);
                    report.all_succeeded()
                }
            };
            airlink.writer().update_user_stats().await?;
            airlink.shutdown().await?;
            if !ok {
                bail!("sync failed");
            }
        }

        Commands::Watch => {
            run_watch(&airlink).await?;
            airlink.shutdown().await?;
        }

        Commands::Flights { action } => match action {
            FlightsAction::List { favorites } => {
                let flights = if favorites {
                    airlink.store().list_favorite_flights()?
                } else {
                    airlink.store().list_flights()?
                };
                if flights.is_empty() {
                    println!("No flights stored. Run 'airlink sync' first.");
                } else {
                    println!("Flights ({}):", flights.len());
                    for flight in &flights {
                        print_flight(flight);
                    }
                }
            }
            FlightsAction::Favorite { flight_number, off } => {
                if !airlink.store().set_favorite(&flight_number, !off)? {
                    bail!("flight {} is not stored", flight_number);
                }
                if off {
                    println!("Removed {} from favorites", flight_number);
                } else {
                    println!("Added {} to favorites", flight_number);
                }
            }
        },

        Commands::News { action } => match action {
            NewsAction::List { flight } => {
                let news = match &flight {
                    Some(number) => airlink.store().news_for_flight(number)?,
                    None => airlink.store().list_news()?,
                };
                if news.is_empty() {
                    println!("No news stored.");
                } else {
                    println!("News ({}):", news.len());
                    for item in &news {
                        print_news(item);
                    }
                }
            }
        },

        Commands::Profile { action } => {
            match action {
                ProfileAction::Show => {}
                ProfileAction::AddPoints { points } => {
                    airlink.writer().add_points(points).await?;
                }
                ProfileAction::Sharing { mode } => {
                    airlink.writer().set_sharing_mode(mode.is_on()).await?;
                }
                ProfileAction::Battery { mode } => {
                    airlink.writer().set_more_battery(mode.is_on()).await?;
                }
            }
            airlink.shutdown().await?;

            let profile = airlink.store().load_user()?.unwrap_or_default();
            println!("Profile:");
            println!("  Points: {}", profile.points);
            println!("  Sharing: {}", profile.is_sharing_mode);
            println!("  More battery: {}", profile.more_battery_guy);
            match profile.last_sync.and_then(chrono::DateTime::from_timestamp_millis) {
                Some(at) => println!("  Last sync: {}", at.with_timezone(&chrono::Local)),
                None => println!("  Last sync: never"),
            }
        }

        Commands::Share { action } => {
            match action {
                ShareAction::Serve { code } => run_serve(&airlink, code).await?,
                ShareAction::Join { code, addr } => run_join(&airlink, code, addr).await?,
            }
            airlink.shutdown().await?;
        }
    }

    Ok(())
}
