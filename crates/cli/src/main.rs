use anyhow::Result;
use clap::{Parser, Subcommand};
use cli::commands::{self, CheckArgs};
use cli::output::parse_list;
use compliance_core::config;
use compliance_core::pipeline;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;
    let mut stdout = std::io::stdout().lock();

    match cli.command {
        Commands::Rules { category, json } => {
            commands::rules(&cfg, category.as_deref(), json, &mut stdout)
        }
        Commands::Check {
            path,
            rules,
            json,
            csv,
            out,
            no_save,
        } => {
            let registry = pipeline::build_registry(&cfg);
            let args = CheckArgs {
                path,
                rules: rules.as_deref().map(parse_list).unwrap_or_default(),
                json,
                csv,
                out,
                save: !no_save,
                progress: std::io::stderr().is_terminal(),
            };
            commands::check(&cfg, &registry, &args, &mut stdout).await?;
            Ok(())
        }
        Commands::Report {
            document,
            status,
            json,
            csv,
        } => {
            let statuses = status.as_deref().map(parse_list).unwrap_or_default();
            commands::report(&cfg, &document, &statuses, json, csv.as_ref(), &mut stdout).await
        }
        Commands::Show {
            path,
            status,
            json,
            csv,
        } => {
            let statuses = status.as_deref().map(parse_list).unwrap_or_default();
            commands::show(&cfg, &path, &statuses, json, csv.as_ref(), &mut stdout)
        }
        Commands::Remediation { document } => {
            commands::remediation(&cfg, &document, &mut stdout).await
        }
        Commands::Documents { json } => commands::documents(&cfg, json, &mut stdout).await,
        Commands::Forget { document } => {
            commands::forget(&cfg, &document, &mut stdout).await?;
            Ok(())
        }
    }
}

#[derive(Parser)]
#[command(name = "contract-check")]
#[command(about = "Check contracts against compliance rules with a language model", long_about = None)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the rule catalog grouped by category
    Rules {
        /// Only rules in this category
        #[arg(long)]
        category: Option<String>,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Check a contract against the selected rules
    Check {
        /// Contract file (PDF, or plain text with form feeds between pages)
        path: PathBuf,
        /// Comma separated rule ids (default: all)
        #[arg(long)]
        rules: Option<String>,
        /// Print the report as JSON instead of a table
        #[arg(long)]
        json: bool,
        /// Write the table as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Write the full report as JSON
        #[arg(long)]
        out: Option<PathBuf>,
        /// Do not store verdicts in the database
        #[arg(long)]
        no_save: bool,
    },
    /// Show the stored report for a document
    Report {
        /// Document name as stored (file name of the checked contract)
        document: String,
        /// Comma separated statuses to keep, e.g. "Non-Compliant,Error"
        #[arg(long)]
        status: Option<String>,
        /// Output JSON
        #[arg(long)]
        json: bool,
        /// Write the table as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Render a JSON report written by `check --out`
    Show {
        /// Exported report file
        path: PathBuf,
        /// Comma separated statuses to keep
        #[arg(long)]
        status: Option<String>,
        /// Output JSON
        #[arg(long)]
        json: bool,
        /// Write the table as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Evidence and remediation for non-compliant and partially compliant rules
    Remediation { document: String },
    /// List documents with stored reports
    Documents {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete the stored report for a document
    Forget { document: String },
}
