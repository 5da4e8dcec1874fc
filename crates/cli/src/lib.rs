pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use peerbook_core::config::{AppConfig, ConfigOverrides, LoadOptions};

use crate::commands::book::BookArgs;
use crate::commands::quote::QuoteArgs;
use crate::commands::transition::{ReviewArgs, TransitionArgs};

#[derive(Debug, Parser)]
#[command(
    name = "peerbook",
    about = "Peerbook booking CLI",
    long_about = "Price, book and manage consulting sessions between students and peer \
                  consultants.",
    after_help = "Examples:
  peerbook migrate
  peerbook seed
  peerbook quote --service-id svc-essay-review --submission essay.json
  peerbook book --student student-1 --submission essay.json
  peerbook transition --booking-id <id> --to confirmed --actor consultant"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a peerbook.toml config file")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Database URL; overrides file and environment")]
    database_url: Option<String>,
    #[arg(long, global = true, help = "Log level (trace, debug, info, warn, error)")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations")]
    Migrate,
    #[command(about = "Check form templates, configuration, connectivity and schema state")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Save the demo catalog, or services from a JSON file")]
    Seed {
        #[arg(long, help = "JSON array of services to save instead of the demo catalog")]
        file: Option<PathBuf>,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Print the default intake form for a service type")]
    FormTemplate {
        #[arg(long)]
        service_type: String,
    },
    #[command(about = "Validate a submission and show its price and delivery estimate")]
    Quote {
        #[arg(long)]
        service_id: String,
        #[arg(long, help = "Path to the submission JSON")]
        submission: PathBuf,
        #[arg(long, help = "Pricing instant as RFC 3339; defaults to now")]
        at: Option<String>,
    },
    #[command(about = "Create a booking for a student from a submission")]
    Book {
        #[arg(long)]
        student: String,
        #[arg(long, help = "Path to the submission JSON")]
        submission: PathBuf,
    },
    #[command(about = "Move a booking to a new status")]
    Transition {
        #[arg(long)]
        booking_id: String,
        #[arg(long, help = "Target status, e.g. confirmed or cancelled")]
        to: String,
        #[arg(long, help = "student, consultant or system")]
        actor: String,
        #[arg(long)]
        reason: Option<String>,
    },
    #[command(about = "Leave a review on a completed booking")]
    Review {
        #[arg(long)]
        booking_id: String,
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        rating: u8,
        #[arg(long)]
        text: Option<String>,
    },
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                database_url: self.database_url.clone(),
                log_level: self.log_level.clone(),
                ..ConfigOverrides::default()
            },
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.load_options();

    // Invalid config still gets logging; the command reports the config error itself.
    let logging_config = AppConfig::load(options.clone())
        .map(|config| config.logging)
        .unwrap_or_else(|_| AppConfig::default().logging);
    logging::init_logging(&logging_config);

    let result = match &cli.command {
        Command::Migrate => commands::migrate::run(&options),
        Command::Doctor { json } => commands::doctor::run(&options, *json),
        Command::Seed { file } => commands::seed::run(&options, file.as_deref()),
        Command::Config => commands::config::run(&options),
        Command::FormTemplate { service_type } => commands::form_template::run(service_type),
        Command::Quote { service_id, submission, at } => commands::quote::run(
            &options,
            &QuoteArgs { service_id, submission_file: submission, at: at.as_deref() },
        ),
        Command::Book { student, submission } => commands::book::run(
            &options,
            &BookArgs { student_id: student, submission_file: submission },
        ),
        Command::Transition { booking_id, to, actor, reason } => commands::transition::run(
            &options,
            &TransitionArgs { booking_id, to, actor, reason: reason.as_deref() },
        ),
        Command::Review { booking_id, rating, text } => commands::transition::run_review(
            &options,
            &ReviewArgs { booking_id, rating: *rating, text: text.as_deref() },
        ),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;

    #[test]
    fn global_flags_feed_load_options() {
        let cli = Cli::parse_from([
            "peerbook",
            "--database-url",
            "sqlite::memory:",
            "migrate",
            "--log-level",
            "debug",
        ]);
        let options = cli.load_options();

        assert_eq!(options.overrides.database_url.as_deref(), Some("sqlite::memory:"));
        assert_eq!(options.overrides.log_level.as_deref(), Some("debug"));
        assert!(!options.require_file);
    }

    #[test]
    fn review_rating_is_bounded() {
        let parsed = Cli::try_parse_from([
            "peerbook",
            "review",
            "--booking-id",
            "bk-1",
            "--rating",
            "6",
        ]);
        assert!(parsed.is_err());
    }
}
