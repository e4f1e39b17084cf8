//! Command-line entry point
//!
//! Runs one notification per invocation, the way the site's background jobs do:
//!
//! ```bash
//! lab-mailer machine --name Cicada --os Windows --difficulty Easy
//! lab-mailer writeup --title Blue --platform HackTheBox --category Windows --difficulty Easy
//! lab-mailer access --title "Heap Feng Shui" --ctf "DEF CON Quals" \
//!     --email reader@example.com --name Reader --ip 203.0.113.7
//! lab-mailer welcome --email new@example.com --name "New Reader"
//! lab-mailer quota
//! lab-mailer providers
//! ```
//!
//! Credentials and limits come from the environment (or a `.env` file).

use anyhow::Result;
use clap::{Parser, Subcommand};
use lab_mailer::{DispatchOutcome, Mailer, MailerConfig};
use tracing::info;

#[derive(Parser)]
#[command(name = "lab-mailer")]
#[command(about = "Send 0xJerry's Lab notification emails")]
#[command(version)]
struct Cli {
    /// Emit JSON log lines
    #[arg(long, global = true)]
    json: bool,

    /// SQLite database URL (overrides DATABASE_URL)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Notify members and subscribers about a new machine
    Machine {
        #[arg(long)]
        name: String,
        #[arg(long)]
        os: String,
        #[arg(long)]
        difficulty: String,
    },

    /// Notify members and subscribers about a new writeup
    Writeup {
        #[arg(long)]
        title: String,
        #[arg(long)]
        platform: String,
        #[arg(long)]
        category: String,
        #[arg(long)]
        difficulty: String,
    },

    /// Notify the admin that a protected writeup was opened
    Access {
        #[arg(long)]
        title: String,
        #[arg(long)]
        ctf: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        ip: String,
    },

    /// Send the newsletter welcome email
    Welcome {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
    },

    /// Show today's primary provider quota
    Quota,

    /// List the provider chain in dispatch order
    Providers,
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("lab_mailer=info".parse()?);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_current_span(false)
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

fn print_outcome(outcome: &DispatchOutcome) {
    if outcome.success {
        println!(
            "sent via {}",
            outcome.provider.as_deref().unwrap_or("unknown")
        );
    } else {
        println!(
            "not sent: {}",
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.json)?;

    let mut config = MailerConfig::from_env()?;
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }

    info!(version = lab_mailer::VERSION, "Starting lab-mailer");
    let mailer = Mailer::from_config(&config).await?;

    match cli.command {
        Command::Machine {
            name,
            os,
            difficulty,
        } => {
            let report = mailer.notify_new_machine(&name, &os, &difficulty).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Writeup {
            title,
            platform,
            category,
            difficulty,
        } => {
            let report = mailer
                .notify_new_writeup(&title, &platform, &category, &difficulty)
                .await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Access {
            title,
            ctf,
            email,
            name,
            ip,
        } => {
            let outcome = mailer
                .notify_writeup_access(&title, &ctf, &email, &name, &ip)
                .await;
            print_outcome(&outcome);
        }
        Command::Welcome { email, name } => {
            let outcome = mailer.send_welcome(&email, &name).await;
            print_outcome(&outcome);
        }
        Command::Quota => match mailer.quota_usage().await {
            Some(usage) => println!("{}", serde_json::to_string_pretty(&usage)?),
            None => println!("no quota-limited provider configured"),
        },
        Command::Providers => {
            for (position, slot) in mailer.dispatcher().slots().iter().enumerate() {
                let provider = slot.provider();
                let status = if provider.is_configured() {
                    "configured"
                } else {
                    "missing credentials"
                };
                match slot.quota() {
                    Some(quota) => println!(
                        "{}. {} ({status}, daily limit {})",
                        position + 1,
                        provider.name(),
                        quota.daily_limit()
                    ),
                    None => println!("{}. {} ({status})", position + 1, provider.name()),
                }
            }
        }
    }

    Ok(())
}
