use clap::{Args, Parser, Subcommand};
use trendetl_core::{AppConfig, LoadAtomicity};

mod run;
mod runs;

#[derive(Debug, Parser)]
#[command(name = "trendetl")]
#[command(about = "Windowed ETL over YouTube trending observations")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Replace one date window in the destination tables
    Run(RunArgs),
    /// Database operations
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Inspect recorded pipeline runs
    Runs {
        #[command(subcommand)]
        command: RunsCommands,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    /// First day of the window, inclusive (YYYY-MM-DD)
    #[arg(short = 's', long)]
    start_dt: String,

    /// Last day of the window, inclusive (YYYY-MM-DD)
    #[arg(short = 'e', long)]
    end_dt: String,

    /// Extract and aggregate without writing destination tables
    #[arg(long)]
    dry_run: bool,

    /// Transaction boundary for the load: statement, table or run
    #[arg(long)]
    atomicity: Option<LoadAtomicity>,

    /// Skip the advisory run lock
    #[arg(long)]
    no_lock: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check connectivity
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[derive(Debug, Subcommand)]
enum RunsCommands {
    /// Show the most recent runs
    List {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn connect(config: &AppConfig) -> anyhow::Result<sqlx::PgPool> {
    let pool = trendetl_db::connect_pool(
        &config.database_url,
        trendetl_db::PoolConfig::from_app_config(config),
    )
    .await?;
    Ok(pool)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = trendetl_core::load_app_config()?;
    init_tracing(&config.log_level);

    match cli.command {
        Commands::Run(args) => run::run_etl(&config, &args).await?,
        Commands::Db { command } => {
            let pool = connect(&config).await?;
            match command {
                DbCommands::Ping => {
                    trendetl_db::ping(&pool).await?;
                    println!("database ok");
                }
                DbCommands::Migrate => {
                    let applied = trendetl_db::run_migrations(&pool).await?;
                    println!("applied {applied} migration(s)");
                }
            }
        }
        Commands::Runs {
            command: RunsCommands::List { limit },
        } => {
            let pool = connect(&config).await?;
            runs::list_runs(&pool, limit).await?;
        }
    }

    Ok(())
}
