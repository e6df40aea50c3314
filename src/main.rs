//! CLI entry point for `slowpost`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};

use slowpost::config::{self, Config};
use slowpost::intake::{resolve_letter_path, LetterDraft};
use slowpost::mail::oauth::{OAuthClient, TokenProvider};
use slowpost::mail::SmtpMailer;
use slowpost::model::letter::{format_timestamp, Letter, LetterStatus, LetterSummary};
use slowpost::model::postal::PostalInfo;
use slowpost::post_office::{PostOffice, PostSettings};
use slowpost::render::Templates;
use slowpost::store::SqliteStore;
use slowpost::textgen::OpenAiGenerator;

#[derive(Parser)]
#[command(
    name = "slowpost",
    version,
    about = "Post letters that arrive days later, by email"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to $SLOWPOST_CONFIG, then the user config dir)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Post a letter by name (from the letters directory) or by path
    Submit {
        #[arg(value_name = "NAME|PATH")]
        letter: String,
    },
    /// Send every letter whose delivery time has passed
    SendPending,
    /// Send one letter now, regardless of its schedule
    Send {
        id: String,
    },
    /// List letters
    List {
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
        /// Only in-transit letters not yet due
        #[arg(long, conflicts_with = "status")]
        upcoming: bool,
        #[arg(long)]
        json: bool,
    },
    /// Show one letter
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Show the next letter in line for delivery
    Next,
    /// Delete a letter record
    Delete {
        id: String,
    },
    /// Authorize mail sending through OAuth2 (one-time, interactive)
    Authorize,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    InTransit,
    Delivered,
}

impl From<StatusArg> for LetterStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::InTransit => LetterStatus::InTransit,
            StatusArg::Delivered => LetterStatus::Delivered,
        }
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version land here too
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Run a command. `Ok(false)` means it ran but did not fully succeed.
fn run(cli: Cli) -> anyhow::Result<bool> {
    match cli.command {
        Commands::Completions { shell } => return cmd_completions(shell),
        Commands::Manpage => return cmd_manpage(),
        _ => {}
    }

    let config = match &cli.config {
        Some(path) => config::load_config_from(path)?,
        None => config::load_config()?,
    };

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Init { force } => cmd_init(&config, cli.config, force),
        Commands::Submit { letter } => cmd_submit(&config, &letter),
        Commands::SendPending => cmd_send_pending(&config),
        Commands::Send { id } => cmd_send(&config, &id),
        Commands::List {
            status,
            upcoming,
            json,
        } => cmd_list(&config, status.map(Into::into), upcoming, json),
        Commands::Show { id, json } => cmd_show(&config, &id, json),
        Commands::Next => cmd_next(&config),
        Commands::Delete { id } => cmd_delete(&config, &id),
        Commands::Authorize => cmd_authorize(&config),
        Commands::Completions { .. } | Commands::Manpage => Ok(true),
    }
}

/// Set up tracing with stderr output and a log file in the data directory.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = config::data_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "slowpost.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Open the store and build a post office without a mail transport.
fn open_post_office(config: &Config) -> anyhow::Result<PostOffice> {
    let store = SqliteStore::open(&config.resolve(&config.paths.database))?;
    let templates = Templates::from_config(config)?;
    let settings = PostSettings::from_config(config)?;
    Ok(PostOffice::new(
        Box::new(store),
        Box::new(templates),
        settings,
    ))
}

/// A post office that can send. Configuration problems surface here,
/// before any letter is touched.
fn open_sending_post_office(config: &Config) -> anyhow::Result<PostOffice> {
    let mailer = SmtpMailer::from_config(config)?;
    let mut office = open_post_office(config)?.with_mailer(Box::new(mailer));
    if let Some(generator) = OpenAiGenerator::from_config(config)? {
        office = office.with_text_generator(Box::new(generator));
    }
    Ok(office)
}

fn cmd_init(config: &Config, explicit: Option<PathBuf>, force: bool) -> anyhow::Result<bool> {
    if explicit.is_some() {
        anyhow::bail!("init writes to the default location; unset --config");
    }
    let path = config::config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    config::save_config(config)?;
    println!("  Wrote {}", path.display());
    println!("  Data directory: {}", config::data_dir(config).display());
    Ok(true)
}

fn cmd_submit(config: &Config, letter: &str) -> anyhow::Result<bool> {
    let letters_dir = config.resolve(&config.paths.letters_dir);
    let path = resolve_letter_path(letter, &letters_dir);
    let draft = LetterDraft::read(&path)?;
    let postal = PostalInfo::load(&config.resolve(&config.paths.postal_info))?;

    let office = open_post_office(config)?;
    let id = office.submit(&draft, &postal)?;
    let stored = office
        .get(&id)?
        .ok_or_else(|| anyhow::anyhow!("letter {id} vanished after submission"))?;

    println!("  Posted '{}'", stored.name);
    println!("  {:<12} {}", "Id", stored.id);
    println!(
        "  {:<12} {}",
        "Arrives",
        format_timestamp(stored.scheduled_delivery_time)
    );
    Ok(true)
}

fn cmd_send_pending(config: &Config) -> anyhow::Result<bool> {
    let office = open_sending_post_office(config)?;

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Delivering [{bar:40.cyan/blue}] {pos}/{len}")?
            .progress_chars("#>-"),
    );

    let report = office.sweep(Some(&|done, total| {
        pb.set_length(total as u64);
        pb.set_position(done as u64);
    }))?;
    pb.finish_and_clear();

    if report.delivered.is_empty() && report.failed.is_empty() {
        println!("  No letters due.");
        return Ok(true);
    }
    for id in &report.delivered {
        println!("  delivered  {id}");
    }
    for id in &report.failed {
        println!("  failed     {id}");
    }
    Ok(report.failed.is_empty())
}

fn cmd_send(config: &Config, id: &str) -> anyhow::Result<bool> {
    let office = open_sending_post_office(config)?;
    let sent = office.send(id);
    if sent {
        println!("  delivered  {id}");
    }
    Ok(sent)
}

fn cmd_list(
    config: &Config,
    status: Option<LetterStatus>,
    upcoming: bool,
    json: bool,
) -> anyhow::Result<bool> {
    let office = open_post_office(config)?;
    let rows: Vec<LetterSummary> = if upcoming {
        office.upcoming()?
    } else {
        office.list(status)?.iter().map(Letter::summary).collect()
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(true);
    }
    print_summary_table(&rows);
    Ok(true)
}

fn cmd_show(config: &Config, id: &str, json: bool) -> anyhow::Result<bool> {
    let office = open_post_office(config)?;
    let letter = office
        .get(id)?
        .ok_or_else(|| anyhow::anyhow!("no letter with id {id}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&letter)?);
    } else {
        print_letter(&letter);
    }
    Ok(true)
}

fn cmd_next(config: &Config) -> anyhow::Result<bool> {
    let office = open_post_office(config)?;
    match office.next_to_deliver()? {
        Some(letter) => print_letter(&letter),
        None => println!("  No letters in transit."),
    }
    Ok(true)
}

fn cmd_delete(config: &Config, id: &str) -> anyhow::Result<bool> {
    let office = open_post_office(config)?;
    if office.delete(id)? {
        println!("  Deleted {id}");
        Ok(true)
    } else {
        eprintln!("  No letter with id {id}");
        Ok(false)
    }
}

fn cmd_authorize(config: &Config) -> anyhow::Result<bool> {
    let client = OAuthClient::load(&config.resolve(&config.mail.client_secret))?;
    let tokens = TokenProvider::new(client, config.resolve(&config.mail.token_cache))?;

    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut output = std::io::stdout();
    let token = tokens.authorize_interactive(&mut input, &mut output, chrono::Utc::now())?;

    println!();
    println!("  Token cached at {}", tokens.cache_path().display());
    println!("  {:<12} {}", "Expires", format_timestamp(token.expires_at));
    if token.refresh_token.is_none() {
        println!("  No refresh token was issued; you will need to authorize again when it expires.");
    }
    Ok(true)
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<bool> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "slowpost", &mut std::io::stdout());
    Ok(true)
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<bool> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(true)
}

fn print_summary_table(rows: &[LetterSummary]) {
    println!();
    println!("  {} letter(s)", rows.len());
    if rows.is_empty() {
        println!();
        return;
    }
    println!();
    println!(
        "  {:<36}  {:<10}  {:<19}  Name",
        "Id", "Status", "Scheduled"
    );
    println!("  {}", "-".repeat(90));
    for row in rows {
        println!(
            "  {:<36}  {:<10}  {:<19}  {}",
            row.id,
            row.status,
            format_timestamp(row.scheduled_delivery_time),
            row.name
        );
    }
    println!();
}

fn print_letter(letter: &Letter) {
    use humansize::{format_size, BINARY};

    let recipient = &letter.postal_info.recipient;
    println!();
    println!("  {:<20} {}", "Id", letter.id);
    println!("  {:<20} {}", "Name", letter.name);
    println!("  {:<20} {}", "Status", letter.status);
    println!(
        "  {:<20} {} <{}>",
        "To", recipient.name, recipient.email
    );
    println!("  {:<20} {}", "Written", format_timestamp(letter.creation_time));
    println!("  {:<20} {}", "Received", format_timestamp(letter.received_time));
    println!(
        "  {:<20} {}",
        "Scheduled",
        format_timestamp(letter.scheduled_delivery_time)
    );
    if let Some(delivered) = letter.delivery_time {
        println!("  {:<20} {}", "Delivered", format_timestamp(delivered));
    }
    println!(
        "  {:<20} {}",
        "Contents",
        format_size(letter.contents.len() as u64, BINARY)
    );
    if let Some(html) = &letter.rendered_html {
        println!(
            "  {:<20} {}",
            "Rendered",
            format_size(html.len() as u64, BINARY)
        );
    }
    println!();
}
