//! metricregistry CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use metricregistry::{
    commands::{
        cmd_init, cmd_list_metrics, cmd_register, cmd_register_json, cmd_status, cmd_versions,
        print_history, print_metric_completions, print_metrics, print_registration, print_status,
    },
    config::Config,
    error::{Error, Result},
    meta::RegistryDb,
    request::{RegistrationRequest, VersionPayload},
};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "metricregistry")]
#[command(version, about = "Registry of versioned metric models", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "METRICREGISTRY_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the config file and registry database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Register a metric model, creating it or adding a new version
    Register(RegisterArgs),

    /// List registered metric models
    List {
        /// Output metric names with descriptions for shell completions
        #[arg(long, value_enum, hide = true)]
        completion: Option<Shell>,
    },

    /// Show the version history of a metric model
    Versions {
        /// Metric model name (case-insensitive)
        name: String,
    },

    /// Show registry status
    Status,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(clap::Args)]
struct RegisterArgs {
    /// Read the raw request mapping from a JSON file ('-' for stdin)
    #[arg(
        long,
        conflicts_with_all = [
            "name",
            "filename",
            "description",
            "target_table",
            "count",
            "metrics",
            "dimensions",
            "measures",
            "identifiers",
            "depends_on",
            "tables_used",
        ]
    )]
    from_json: Option<PathBuf>,

    /// Metric model name
    #[arg(short, long, required_unless_present = "from_json")]
    name: Option<String>,

    /// Artifact file name stored under the version directory
    #[arg(short, long, required_unless_present = "from_json")]
    filename: Option<String>,

    /// Description of the metric model
    #[arg(long)]
    description: Option<String>,

    /// Table the metric model writes to
    #[arg(long)]
    target_table: Option<String>,

    /// Row count recorded with this version
    #[arg(long, default_value = "0")]
    count: i64,

    /// Metric names (comma separated)
    #[arg(long, value_delimiter = ',')]
    metrics: Vec<String>,

    /// Dimension names (comma separated)
    #[arg(long, value_delimiter = ',')]
    dimensions: Vec<String>,

    /// Measure names (comma separated)
    #[arg(long, value_delimiter = ',')]
    measures: Vec<String>,

    /// Identifier columns (comma separated)
    #[arg(long, value_delimiter = ',')]
    identifiers: Vec<String>,

    /// Upstream models this version depends on (comma separated)
    #[arg(long, value_delimiter = ',')]
    depends_on: Vec<String>,

    /// Tables read by this version (comma separated)
    #[arg(long, value_delimiter = ',')]
    tables_used: Vec<String>,
}

impl RegisterArgs {
    fn into_request(self) -> RegistrationRequest {
        let mut request = RegistrationRequest::new(
            self.name.unwrap_or_default(),
            self.filename.unwrap_or_default(),
        )
        .with_payload(VersionPayload {
            count: self.count,
            metrics: self.metrics,
            dimensions: self.dimensions,
            measures: self.measures,
            identifiers: self.identifiers,
            depends_on: self.depends_on,
            tables_used: self.tables_used,
        });
        request.metadata.description = self.description;
        request.metadata.target_table = self.target_table;
        request
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }

    let config_path = cli.config.clone().unwrap_or_else(Config::default_config_path);

    match cli.command {
        Commands::Init { force } => {
            let config = cmd_init(config_path, force).await?;
            println!("✓ metricregistry initialized successfully");
            println!("  Config: {}", config.paths.config_file.display());
            println!("  Database: {}", config.paths.db_file.display());
            return Ok(());
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "metricregistry", &mut std::io::stdout());
            return Ok(());
        }
        _ => {}
    }

    if !config_path.exists() {
        return Err(Error::NotInitialized);
    }
    let config = Config::load(&config_path)?;
    if !config.is_initialized() {
        return Err(Error::NotInitialized);
    }
    let db = RegistryDb::connect(&config).await?;
    if !db.is_initialized().await? {
        db.close().await;
        return Err(Error::NotInitialized);
    }

    let outcome = dispatch(cli.command, cli.json, &config, &db).await;
    db.close().await;
    outcome
}

async fn dispatch(command: Commands, json: bool, config: &Config, db: &RegistryDb) -> Result<()> {
    match command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Register(args) => {
            let result = match args.from_json.clone() {
                Some(path) => cmd_register_json(config, db, &path).await?,
                None => cmd_register(config, db, &args.into_request()).await?,
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_registration(&result);
            }
        }

        Commands::List { completion } => {
            let metrics = cmd_list_metrics(db).await?;

            if let Some(shell) = completion {
                print_metric_completions(&metrics, shell);
            } else if json {
                println!("{}", serde_json::to_string_pretty(&metrics)?);
            } else {
                print_metrics(&metrics);
            }
        }

        Commands::Versions { name } => {
            let history = cmd_versions(db, &name).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&history)?);
            } else {
                print_history(&history);
            }
        }

        Commands::Status => {
            let status = cmd_status(config, db).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }
    }

    Ok(())
}
