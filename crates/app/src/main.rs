use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use chrono::{Local, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rifas::server::{AppState, run_server};
use rifas_config::Config;
use rifas_export::{Artifact, Exporter, image_data_url};
use rifas_models::{GridPreset, ParticipantDraft, Raffle, RaffleDraft, TicketStatus, parse_ticket_number};
use rifas_store::{FileStorage, Outcome, RaffleStore, StoreError};
use tracing::error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::OffsetTime;

// --- CLI definition ---

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Parser)]
#[command(name = "rifas")]
#[command(about = "Las rifas de Echeverry: 100-number raffle manager")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("RIFAS_GIT_HASH"), ")"))]
struct Cli {
    /// Log level (default: config file, then info)
    #[arg(short, long, global = true)]
    log_level: Option<LogLevel>,

    /// Display log timestamps in UTC (default: local time)
    #[arg(long, global = true)]
    utc: bool,

    /// Directory holding the stored raffle
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Raffle fields. On update, flags left out keep their current value.
#[derive(Debug, Default, Args)]
struct RaffleArgs {
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    description: Option<String>,
    /// Item image: a local image file or an http(s) URL
    #[arg(long)]
    image: Option<String>,
    /// Ticket price (e.g. "5" or "2.50")
    #[arg(long)]
    price: Option<String>,
    /// Draw date, YYYY-MM-DD (must be in the future)
    #[arg(long)]
    date: Option<String>,
    /// Lottery the draw plays with
    #[arg(long)]
    lottery: Option<String>,
    /// Grid size: compact, regular or large
    #[arg(long, value_parser = parse_grid)]
    grid: Option<GridPreset>,
}

fn parse_grid(value: &str) -> Result<GridPreset, String> {
    GridPreset::parse(value).ok_or_else(|| format!("unknown grid size {value:?} (compact, regular, large)"))
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on (default: config, then 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Show the active raffle and its ticket grid
    Show,
    /// Replace the active raffle with a new one (all 100 tickets available)
    Create(RaffleArgs),
    /// Change the active raffle's details, keeping its tickets
    Update(RaffleArgs),
    /// Reserve an available ticket
    Reserve {
        /// Ticket number, 0-99 (e.g. 7 or 07)
        number: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        email: String,
    },
    /// Mark a reserved ticket as paid and export its PDF
    MarkPaid {
        number: String,
        /// Output directory (default: configured export dir)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List reserved and paid tickets with their participants
    Report,
    /// Export the PDF of a reserved or paid ticket
    ExportTicket {
        number: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Export the ticket grid as PNG
    ExportGrid {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Export the participate view as PNG
    ExportBoard {
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

/// Layer 4 of the configuration: global CLI flags.
fn merge_cli(config: &mut Config, cli: &Cli) {
    if let Some(level) = &cli.log_level {
        config.log_level = level.to_string();
    }
    if cli.utc {
        config.utc = true;
    }
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
}

// --- Logging ---

fn init_logging(config: &Config) {
    let filter = EnvFilter::new(&config.log_level);

    if config.utc {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_timer(OffsetTime::new(
                time::UtcOffset::UTC,
                time::macros::format_description!(
                    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
                ),
            ))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_timer(LocalTimer)
            .init();
    }
}

struct LocalTimer;

impl tracing_subscriber::fmt::time::FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

// --- Command helpers ---

fn ticket_number(input: &str) -> anyhow::Result<String> {
    parse_ticket_number(input).ok_or_else(|| anyhow!("ticket number must be 0-99, got {input:?}"))
}

/// Prints field errors one per line; other store errors pass through.
fn explain(e: StoreError) -> anyhow::Error {
    match e {
        StoreError::Validation(errors) => {
            for (field, message) in &errors.errors {
                eprintln!("  {field}: {message}");
            }
            anyhow!("{} invalid field(s), nothing saved", errors.errors.len())
        }
        other => other.into(),
    }
}

/// Local files become embedded images; URLs are stored as given.
fn item_image(source: &str) -> anyhow::Result<String> {
    if ["http://", "https://", "data:"].iter().any(|p| source.starts_with(p)) {
        return Ok(source.to_string());
    }
    let bytes = std::fs::read(source).with_context(|| format!("cannot read image {source}"))?;
    Ok(image_data_url(&bytes)?)
}

impl RaffleArgs {
    fn apply(self, draft: &mut RaffleDraft) -> anyhow::Result<()> {
        if let Some(v) = self.title { draft.title = v; }
        if let Some(v) = self.description { draft.description = v; }
        if let Some(v) = self.image { draft.item_image = Some(item_image(&v)?); }
        if let Some(v) = self.price { draft.ticket_price = v; }
        if let Some(v) = self.date { draft.raffle_date = v; }
        if let Some(v) = self.lottery { draft.lottery_name = v; }
        if let Some(v) = self.grid { draft.grid_size_preset = Some(v); }
        Ok(())
    }
}

fn save(artifact: &Artifact, out: Option<PathBuf>, config: &Config) -> anyhow::Result<PathBuf> {
    let dir = out.unwrap_or_else(|| config.export_dir.clone());
    let path = artifact
        .write_to(&dir)
        .with_context(|| format!("cannot write {} to {}", artifact.file_name, dir.display()))?;
    println!("Saved {}", path.display());
    Ok(path)
}

fn print_raffle(raffle: &Raffle) {
    let counts = raffle.counts();
    println!("{}", raffle.title);
    println!("{}", raffle.description);
    println!("{}", "-".repeat(60));
    println!("{:<20} {}", "Id", raffle.id);
    println!("{:<20} {}", "Ticket price", raffle.formatted_price());
    println!("{:<20} {}", "Draw date", raffle.formatted_date());
    println!("{:<20} {}", "Lottery", raffle.lottery_name);
    println!("{:<20} {}", "Grid size", raffle.grid_size_preset.label());
    println!(
        "{:<20} {} available, {} reserved, {} paid",
        "Tickets", counts.available, counts.reserved, counts.paid
    );
    println!();
    for row in raffle.tickets.chunks(rifas_models::GRID_COLS) {
        let cells: Vec<String> = row
            .iter()
            .map(|t| {
                let mark = match t.status() {
                    TicketStatus::Available => ' ',
                    TicketStatus::Reserved => 'R',
                    TicketStatus::Paid => 'P',
                };
                format!("{}{mark}", t.number)
            })
            .collect();
        println!("  {}", cells.join(" "));
    }
    println!("\n  R = reserved, P = paid");
}

fn print_report(raffle: &Raffle) {
    let tickets = raffle.participant_tickets();
    if tickets.is_empty() {
        println!("No reserved or paid tickets yet.");
        return;
    }
    println!("{:<6} {:<25} {:<16} {:<30} {}", "Number", "Name", "Phone", "Email", "Status");
    println!("{}", "-".repeat(90));
    for t in &tickets {
        if let Some(p) = t.participant() {
            println!(
                "{:<6} {:<25} {:<16} {:<30} {}",
                t.number,
                p.name,
                p.phone,
                p.email,
                t.status().label()
            );
        }
    }
    let counts = raffle.counts();
    println!(
        "\n{} reserved, {} paid, {} available",
        counts.reserved, counts.paid, counts.available
    );
}

// --- Main ---

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load();
    merge_cli(&mut config, &cli);
    init_logging(&config);

    let storage = Arc::new(FileStorage::open(&config.data_dir)?);
    let mut store = RaffleStore::open(storage)?;
    let exporter = Exporter::new(&config.font_path);
    let today = Local::now().date_naive();

    match cli.command {
        Commands::Serve { port } => {
            let port = port.unwrap_or(config.port);
            let state = AppState::new(store, exporter).with_body_limit(config.max_body_bytes);
            run_server(port, state).await?;
        }
        Commands::Show => print_raffle(store.raffle()),
        Commands::Create(args) => {
            let mut draft = RaffleDraft::default();
            args.apply(&mut draft)?;
            let raffle = store.create(&draft, Utc::now()).map_err(explain)?;
            println!("Created raffle \"{}\" ({})", raffle.title, raffle.id);
        }
        Commands::Update(args) => {
            let mut draft = RaffleDraft::from_raffle(store.raffle());
            args.apply(&mut draft)?;
            let raffle = store.update(&draft, Utc::now()).map_err(explain)?;
            println!("Updated raffle \"{}\"", raffle.title);
        }
        Commands::Reserve { number, name, phone, email } => {
            let number = ticket_number(&number)?;
            let draft = ParticipantDraft { name, phone, email };
            match store.reserve(&number, &draft).map_err(explain)? {
                Outcome::Applied => println!("Ticket {number} reserved for {}", draft.name.trim()),
                Outcome::Unchanged => bail!("ticket {number} is not available"),
            }
        }
        Commands::MarkPaid { number, out } => {
            let number = ticket_number(&number)?;
            match store.mark_paid(&number).map_err(explain)? {
                Outcome::Applied => println!("Ticket {number} marked as paid"),
                Outcome::Unchanged => bail!("ticket {number} is not reserved"),
            }
            match exporter.ticket_pdf(store.raffle(), &number).await {
                Ok(artifact) => {
                    save(&artifact, out, &config)?;
                }
                Err(e) => {
                    error!("Ticket {number} export failed: {e}");
                    bail!("payment recorded, but the ticket PDF could not be generated: {e}");
                }
            }
        }
        Commands::Report => print_report(store.raffle()),
        Commands::ExportTicket { number, out } => {
            let number = ticket_number(&number)?;
            let artifact = exporter.ticket_pdf(store.raffle(), &number).await.inspect_err(|e| {
                error!("Ticket {number} export failed: {e}");
            })?;
            save(&artifact, out, &config)?;
        }
        Commands::ExportGrid { out } => {
            let artifact = exporter.grid_png(store.raffle(), today).await.inspect_err(|e| {
                error!("Grid export failed: {e}");
            })?;
            save(&artifact, out, &config)?;
        }
        Commands::ExportBoard { out } => {
            let artifact = exporter.board_png(store.raffle(), today).await.inspect_err(|e| {
                error!("Board export failed: {e}");
            })?;
            save(&artifact, out, &config)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn global_flags_override_config() {
        let cli = parse(&["rifas", "--data-dir", "/tmp/rifas", "--utc", "-l", "debug", "show"]);
        let mut config = Config::defaults();
        merge_cli(&mut config, &cli);
        assert_eq!(config.data_dir, Path::new("/tmp/rifas"));
        assert!(config.utc);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn absent_flags_keep_config() {
        let cli = parse(&["rifas", "report"]);
        let mut config = Config::defaults();
        let before = config.clone();
        merge_cli(&mut config, &cli);
        assert_eq!(config, before);
    }

    #[test]
    fn update_only_touches_given_fields() {
        let raffle = Raffle::default();
        let mut draft = RaffleDraft::from_raffle(&raffle);
        let Commands::Update(args) = parse(&["rifas", "update", "--price", "7.5", "--grid", "large"]).command else {
            panic!("expected update");
        };
        args.apply(&mut draft).unwrap();

        assert_eq!(draft.ticket_price, "7.5");
        assert_eq!(draft.grid_size_preset, Some(GridPreset::Large));
        assert_eq!(draft.title, raffle.title);
        assert_eq!(draft.item_image, raffle.item_image);
    }

    #[test]
    fn unknown_grid_is_a_usage_error() {
        assert!(Cli::try_parse_from(["rifas", "create", "--grid", "huge"]).is_err());
    }

    #[test]
    fn ticket_numbers_accept_short_form() {
        assert_eq!(ticket_number("7").unwrap(), "07");
        assert_eq!(ticket_number("07").unwrap(), "07");
        assert!(ticket_number("100").is_err());
    }

    #[test]
    fn remote_images_are_kept_as_given() {
        assert_eq!(
            item_image("https://picsum.photos/600/400").unwrap(),
            "https://picsum.photos/600/400"
        );
        assert!(item_image("/nonexistent/prize.png").is_err());
    }
}
