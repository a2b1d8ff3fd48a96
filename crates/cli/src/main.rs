use chrono::NaiveDate;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "rollcall", about = "District attendance sync and aggregation engine", version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "rollcall.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Initialize Rollcall data directory and configuration
    Init {
        /// Data directory path
        #[arg(long, default_value = "/var/lib/rollcall")]
        data_dir: String,
        /// Fetch the school registry from the source after initializing
        #[arg(long)]
        discover: bool,
    },
    /// Sync attendance from the source SIS
    Sync {
        /// Start of the date range (YYYY-MM-DD); defaults to today
        #[arg(long)]
        from: Option<NaiveDate>,
        /// End of the date range (YYYY-MM-DD); defaults to `from`
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Limit the sync to specific school ids (repeatable)
        #[arg(long)]
        school: Vec<String>,
        /// Resume a previous operation by id instead of starting fresh
        #[arg(long)]
        resume: Option<i64>,
    },
    /// Rebuild daily summaries from stored events
    Recompute {
        /// Limit the recompute to one school id
        #[arg(long)]
        school: Option<String>,
        /// Start of the date range (YYYY-MM-DD)
        #[arg(long)]
        from: NaiveDate,
        /// End of the date range (YYYY-MM-DD)
        #[arg(long)]
        to: NaiveDate,
    },
    /// Show the status of a sync operation
    Status {
        /// Operation id; defaults to the most recent
        #[arg(long)]
        operation: Option<i64>,
    },
    /// Register an additional source code for a school
    Alias {
        /// Canonical school id
        #[arg(long)]
        school: String,
        /// Source code to map to the school
        #[arg(long)]
        code: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { data_dir, discover } => {
            commands::init::run(&data_dir, discover).await?;
        }
        Commands::Sync {
            from,
            to,
            school,
            resume,
        } => {
            commands::sync::run(&cli.config, from, to, school, resume).await?;
        }
        Commands::Recompute { school, from, to } => {
            commands::recompute::run(&cli.config, school, from, to).await?;
        }
        Commands::Status { operation } => {
            commands::status::run(&cli.config, operation).await?;
        }
        Commands::Alias { school, code } => {
            commands::alias::run(&cli.config, &school, &code).await?;
        }
    }

    Ok(())
}
