//! mysql-migrate CLI - FK-ordered MySQL to MySQL table migration.

mod prompt;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use mysql_migrate::config::{
    ConnectionConfig, SelectionConfig, SelectionMode, TableOverride, SOURCE_ENV_PREFIX,
    TARGET_ENV_PREFIX,
};
use mysql_migrate::{DatabaseSpec, GlobalReport, MigrateError, MysqlConnector, Orchestrator, RunConfig};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "mysql-migrate")]
#[command(about = "FK-ordered, streaming MySQL to MySQL table migration")]
#[command(version)]
struct Cli {
    /// Output JSON result to stdout
    #[arg(long, global = true)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text", global = true)]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info", global = true)]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every database of a configuration file
    Run {
        /// Path to YAML configuration file
        config: PathBuf,

        /// Plan only: no row data is read or written and no DDL is issued
        #[arg(long)]
        dry_run: bool,

        /// Migrate one database and one table at a time
        #[arg(long)]
        no_parallel: bool,

        /// Override number of databases migrated at once
        #[arg(long)]
        max_workers: Option<usize>,

        /// Override number of tables migrated at once per database
        #[arg(long)]
        max_table_workers: Option<usize>,

        /// Override rows per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Create missing target databases without asking
        #[arg(long, short)]
        yes: bool,

        #[command(flatten)]
        connections: ConnectionArgs,
    },

    /// Migrate a single database
    Migrate {
        /// Source database
        #[arg(short, long)]
        database: String,

        /// Target database [default: same as source]
        #[arg(long)]
        target_database: Option<String>,

        /// Migrate every table (the default when no --table is given)
        #[arg(long, conflicts_with = "tables")]
        all: bool,

        /// Migrate only these tables, in this order
        #[arg(long = "table", short = 't', num_args = 1..)]
        tables: Vec<String>,

        /// Tables to skip
        #[arg(long, num_args = 1..)]
        exclude: Vec<String>,

        /// WHERE predicate applied to every table
        #[arg(long = "where")]
        where_clause: Option<String>,

        /// Maximum rows read per table
        #[arg(long)]
        limit: Option<u64>,

        /// Empty target tables before copying
        #[arg(long)]
        truncate: bool,

        /// Fail tables whose target does not exist instead of creating them
        #[arg(long)]
        no_create_table: bool,

        /// Copy tables in the given order, ignoring foreign keys
        #[arg(long)]
        no_auto_order: bool,

        /// Keep date-suffixed tables such as orders_20240101
        #[arg(long)]
        include_date_tables: bool,

        /// Override number of tables migrated at once
        #[arg(long)]
        max_table_workers: Option<usize>,

        /// Override rows per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Plan only: no row data is read or written and no DDL is issued
        #[arg(long)]
        dry_run: bool,

        /// Create the target database without asking
        #[arg(long, short)]
        yes: bool,

        #[command(flatten)]
        connections: ConnectionArgs,
    },

    /// Write an example configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "migrate.yaml")]
        output: PathBuf,

        /// Force overwrite existing file without confirmation
        #[arg(long, short)]
        force: bool,
    },

    /// Show the resolved connection settings (passwords masked)
    ShowConfig {
        #[command(flatten)]
        connections: ConnectionArgs,
    },
}

/// Connection overrides on top of `SOURCE_DB_*` / `TARGET_DB_*`.
#[derive(Args, Default)]
struct ConnectionArgs {
    #[arg(long)]
    source_host: Option<String>,
    #[arg(long)]
    source_port: Option<u16>,
    #[arg(long)]
    source_user: Option<String>,
    #[arg(long)]
    source_password: Option<String>,
    #[arg(long)]
    target_host: Option<String>,
    #[arg(long)]
    target_port: Option<u16>,
    #[arg(long)]
    target_user: Option<String>,
    #[arg(long)]
    target_password: Option<String>,
}

impl ConnectionArgs {
    /// Environment settings with command-line overrides applied.
    fn resolve(self) -> Result<(ConnectionConfig, ConnectionConfig), MigrateError> {
        let mut source = ConnectionConfig::from_env(SOURCE_ENV_PREFIX)?;
        let mut target = ConnectionConfig::from_env(TARGET_ENV_PREFIX)?;

        apply_overrides(
            &mut source,
            self.source_host,
            self.source_port,
            self.source_user,
            self.source_password,
        );
        apply_overrides(
            &mut target,
            self.target_host,
            self.target_port,
            self.target_user,
            self.target_password,
        );
        Ok((source, target))
    }
}

fn apply_overrides(
    config: &mut ConnectionConfig,
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
) {
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(user) = user {
        config.user = user;
    }
    if let Some(password) = password {
        config.password = password;
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

/// Returns whether the run succeeded as a whole.
async fn run() -> Result<bool, MigrateError> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { output, force } => {
            if prompt::write_example_config(&output, force)? {
                println!("Configuration written to {}", output.display());
                println!("Run 'mysql-migrate run {}' to start the migration.", output.display());
            } else {
                println!("Kept existing {}", output.display());
            }
            Ok(true)
        }

        Commands::ShowConfig { connections } => {
            let (source, target) = connections.resolve()?;
            let (source, target) = (source.masked(), target.masked());

            if cli.output_json {
                let value = serde_json::json!({ "source": source, "target": target });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                for (label, conn) in [("Source", &source), ("Target", &target)] {
                    println!("{}:", label);
                    println!("  Host: {}:{}", conn.host, conn.port);
                    println!("  User: {}", conn.user);
                    println!("  Password: {}", conn.password);
                    println!("  Charset: {}", conn.charset);
                }
            }
            Ok(true)
        }

        Commands::Run {
            config,
            dry_run,
            no_parallel,
            max_workers,
            max_table_workers,
            batch_size,
            yes,
            connections,
        } => {
            setup_logging(&cli.verbosity, &cli.log_format);

            let path = config;
            let mut config = RunConfig::load(&path)?;
            info!("Loaded configuration from {:?}", path);

            // Apply overrides
            config.dry_run |= dry_run;
            if no_parallel {
                config.parallel = false;
            }
            if let Some(w) = max_workers {
                config.max_workers = w;
            }
            if let Some(w) = max_table_workers {
                config.max_table_workers = w;
            }
            if let Some(b) = batch_size {
                config.batch_size = b;
            }

            execute(config, connections, yes, cli.output_json).await
        }

        Commands::Migrate {
            database,
            target_database,
            all: _,
            tables,
            exclude,
            where_clause,
            limit,
            truncate,
            no_create_table,
            no_auto_order,
            include_date_tables,
            max_table_workers,
            batch_size,
            dry_run,
            yes,
            connections,
        } => {
            setup_logging(&cli.verbosity, &cli.log_format);

            let mode = if tables.is_empty() {
                SelectionMode::All
            } else {
                SelectionMode::Tables
            };

            let mut config = RunConfig {
                auto_order: !no_auto_order,
                truncate,
                create_tables: !no_create_table,
                exclude_date_tables: !include_date_tables,
                dry_run,
                databases: vec![DatabaseSpec {
                    name: database,
                    target_name: target_database,
                    selection: SelectionConfig {
                        mode,
                        exclude,
                        tables: tables.into_iter().map(TableOverride::Name).collect(),
                        where_clause,
                        limit,
                        ..SelectionConfig::default()
                    },
                }],
                ..RunConfig::default()
            };
            if let Some(w) = max_table_workers {
                config.max_table_workers = w;
            }
            if let Some(b) = batch_size {
                config.batch_size = b;
            }

            execute(config, connections, yes, cli.output_json).await
        }
    }
}

async fn execute(
    config: RunConfig,
    connections: ConnectionArgs,
    assume_yes: bool,
    output_json: bool,
) -> Result<bool, MigrateError> {
    config.validate()?;
    let (source, target) = connections.resolve()?;
    info!("Source: {}:{} as {}", source.host, source.port, source.user);
    info!("Target: {}:{} as {}", target.host, target.port, target.user);

    let connector = Arc::new(MysqlConnector::new(source, target)?);
    let orchestrator = Orchestrator::new(config, connector.clone())
        .with_confirmation(prompt::confirmation(assume_yes));

    let report = orchestrator.run().await;
    connector.close().await;
    let report = report?;

    if output_json {
        println!("{}", report.to_json()?);
    } else {
        print_summary(&report);
    }

    Ok(report.is_success())
}

fn print_summary(report: &GlobalReport) {
    let status_msg = if report.dry_run {
        "Dry run completed!"
    } else if report.is_success() {
        "Migration completed!"
    } else {
        "Migration completed with errors!"
    };
    println!("\n{}", status_msg);
    println!("  Run ID: {}", report.run_id);
    println!("  Duration: {:.2}s", report.duration().as_secs_f64());

    for plan in &report.plans {
        println!(
            "  {} -> {}: {} table(s) in {} stratum/strata{}",
            plan.database,
            plan.target_database,
            plan.table_count(),
            plan.strata.len(),
            if plan.unordered_fallback {
                " (FK cycle fallback)"
            } else {
                ""
            }
        );
        if report.dry_run {
            for (depth, stratum) in plan.stratum_specs().enumerate() {
                let names: Vec<&str> = stratum.iter().map(|s| s.name.as_str()).collect();
                println!("    [{}] {}", depth, names.join(", "));
            }
        }
    }

    if !report.dry_run {
        let succeeded = report.results.iter().filter(|r| r.is_success()).count();
        println!("  Tables: {}/{}", succeeded, report.results.len());
        println!(
            "  Rows: {} read, {} written, {} skipped",
            report.rows_read(),
            report.rows_written(),
            report.rows_skipped()
        );
    }

    for warning in &report.warnings {
        println!("  Warning: {}", warning);
    }
    for failed in report.failed_results() {
        println!(
            "  Failed table {}.{}: {}",
            failed.database,
            failed.table,
            failed.error.as_deref().unwrap_or_default()
        );
    }
    for failure in &report.database_failures {
        println!(
            "  Failed database {} ({}): {}",
            failure.database, failure.kind, failure.error
        );
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so --output-json stays parseable
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
