//! mysql-sqlite-migrate CLI - Transfer a MySQL/MariaDB database to SQLite.

use clap::Parser;
use mysql_sqlite_migrate::{
    Collation, Config, MigrateError, MigrationConfig, Orchestrator, SourceConfig, TargetConfig,
};
use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "mysql-sqlite-migrate")]
#[command(about = "Transfer a MySQL/MariaDB database to SQLite")]
#[command(version, disable_version_flag = true)]
struct Cli {
    /// SQLite database file
    #[arg(short = 'f', long)]
    sqlite_file: Option<PathBuf>,

    /// MySQL database name
    #[arg(short = 'd', long)]
    mysql_database: Option<String>,

    /// MySQL user
    #[arg(short = 'u', long)]
    mysql_user: Option<String>,

    /// MySQL password
    #[arg(short = 'p', long, env = "MYSQL_PASSWORD", hide_env_values = true)]
    mysql_password: Option<String>,

    /// Transfer only these tables
    #[arg(short = 't', long, num_args = 1.., conflicts_with = "exclude_mysql_tables")]
    mysql_tables: Vec<String>,

    /// Transfer all tables except these
    #[arg(short = 'e', long, num_args = 1..)]
    exclude_mysql_tables: Vec<String>,

    /// Transfer only a limited number of rows from each table
    #[arg(short = 'L', long)]
    limit_rows: Option<u64>,

    /// Collating sequence for textual columns: BINARY, NOCASE or RTRIM
    #[arg(short = 'C', long)]
    collation: Option<Collation>,

    /// Prefix every index name with its table name
    #[arg(short = 'K', long)]
    prefix_indices: bool,

    /// Do not create foreign keys
    #[arg(short = 'X', long)]
    without_foreign_keys: bool,

    /// Do not create tables, only transfer data
    #[arg(short = 'Z', long)]
    without_tables: bool,

    /// Do not transfer data, only create tables
    #[arg(short = 'W', long)]
    without_data: bool,

    /// Create STRICT tables (SQLite 3.37.0+)
    #[arg(short = 'M', long)]
    strict: bool,

    /// MySQL host
    #[arg(short = 'H', long)]
    mysql_host: Option<String>,

    /// MySQL port
    #[arg(short = 'P', long)]
    mysql_port: Option<u16>,

    /// MySQL connection character set
    #[arg(long)]
    mysql_charset: Option<String>,

    /// MySQL connection collation
    #[arg(long)]
    mysql_collation: Option<String>,

    /// Disable MySQL TLS
    #[arg(short = 'S', long)]
    skip_ssl: bool,

    /// CA certificate for the MySQL server
    #[arg(long)]
    mysql_ssl_ca: Option<PathBuf>,

    /// Client certificate for MySQL
    #[arg(long)]
    mysql_ssl_cert: Option<PathBuf>,

    /// Client key for MySQL
    #[arg(long)]
    mysql_ssl_key: Option<PathBuf>,

    /// Rows per chunk; 0 reads each table in one go
    #[arg(short = 'c', long)]
    chunk: Option<u64>,

    /// Materialize views as tables with their data
    #[arg(short = 'A', long)]
    views_as_tables: bool,

    /// Store JSON columns as TEXT
    #[arg(long)]
    json_as_text: bool,

    /// VACUUM the SQLite file after the transfer
    #[arg(short = 'V', long)]
    vacuum: bool,

    /// YAML configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Only log errors
    #[arg(short = 'q', long, conflicts_with = "debug")]
    quiet: bool,

    /// Log debug output
    #[arg(long)]
    debug: bool,

    /// Print version
    #[arg(long, action = clap::ArgAction::Version)]
    version: Option<bool>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli)?;

    let config = build_config(&cli)?;
    info!(
        "Migrating MySQL database {} to {}",
        config.source.database,
        config.target.sqlite_file.display()
    );

    let cancel_token = setup_signal_handler().await?;

    let mut orchestrator = Orchestrator::connect(config).await?;
    let result = orchestrator.run(Some(cancel_token)).await?;

    if cli.output_json {
        println!("{}", result.to_json()?);
    } else if !cli.quiet {
        println!("\nMigration completed!");
        println!("  Run ID: {}", result.run_id);
        println!("  Duration: {:.2}s", result.duration_seconds);
        println!("  Tables: {}", result.tables_created);
        println!("  Views: {}", result.views_created);
        println!("  Rows: {}", result.rows_transferred);
        if !result.cyclic_edges.is_empty() {
            println!("  Cyclic foreign keys: {}", result.cyclic_edges.len());
        }
    }

    Ok(())
}

/// Start from `--config` (if any) and apply every flag on top.
fn build_config(cli: &Cli) -> Result<Config, MigrateError> {
    let mut config = match &cli.config {
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => Config {
            source: SourceConfig::new(String::new(), String::new()),
            target: TargetConfig {
                sqlite_file: PathBuf::new(),
            },
            migration: MigrationConfig::default(),
        },
    };

    let source = &mut config.source;
    if let Some(database) = &cli.mysql_database {
        source.database = database.clone();
    }
    if let Some(user) = &cli.mysql_user {
        source.user = user.clone();
    }
    if let Some(password) = &cli.mysql_password {
        source.password = Some(password.clone());
    }
    if let Some(host) = &cli.mysql_host {
        source.host = host.clone();
    }
    if let Some(port) = cli.mysql_port {
        source.port = port;
    }
    if let Some(charset) = &cli.mysql_charset {
        source.charset = charset.clone();
    }
    if let Some(collation) = &cli.mysql_collation {
        source.collation = collation.clone();
    }
    source.ssl_disabled |= cli.skip_ssl;
    if cli.mysql_ssl_ca.is_some() {
        source.ssl_ca = cli.mysql_ssl_ca.clone();
    }
    if cli.mysql_ssl_cert.is_some() {
        source.ssl_cert = cli.mysql_ssl_cert.clone();
    }
    if cli.mysql_ssl_key.is_some() {
        source.ssl_key = cli.mysql_ssl_key.clone();
    }

    if let Some(file) = &cli.sqlite_file {
        config.target.sqlite_file = file.clone();
    }

    let migration = &mut config.migration;
    if !cli.mysql_tables.is_empty() {
        migration.include_tables = cli.mysql_tables.clone();
    }
    if !cli.exclude_mysql_tables.is_empty() {
        migration.exclude_tables = cli.exclude_mysql_tables.clone();
    }
    if cli.limit_rows.is_some() {
        migration.limit_rows = cli.limit_rows;
    }
    if let Some(collation) = cli.collation {
        migration.collation = collation;
    }
    if cli.chunk.is_some() {
        migration.chunk_size = cli.chunk;
    }
    migration.prefix_indices |= cli.prefix_indices;
    migration.without_foreign_keys |= cli.without_foreign_keys;
    migration.without_tables |= cli.without_tables;
    migration.without_data |= cli.without_data;
    migration.strict |= cli.strict;
    migration.json_as_text |= cli.json_as_text;
    migration.vacuum |= cli.vacuum;
    if cli.views_as_tables {
        migration.views_as_views = false;
    }

    config.validate()?;
    Ok(config)
}

fn setup_logging(cli: &Cli) -> Result<(), MigrateError> {
    let level = if cli.debug {
        LevelFilter::DEBUG
    } else if cli.quiet {
        LevelFilter::ERROR
    } else {
        match cli.verbosity.to_lowercase().as_str() {
            "debug" => LevelFilter::DEBUG,
            "info" => LevelFilter::INFO,
            "warn" => LevelFilter::WARN,
            "error" => LevelFilter::ERROR,
            _ => LevelFilter::INFO,
        }
    };

    let json = cli.log_format == "json";
    let stderr_json = json.then(|| {
        fmt::layer()
            .json()
            .with_target(false)
            .with_writer(std::io::stderr)
    });
    let stderr_text = (!json).then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    let file_layer = match &cli.log_file {
        Some(path) => {
            let file = File::options().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(level)
        .with(stderr_json)
        .with(stderr_text)
        .with(file_layer)
        .try_init()
        .map_err(|e| MigrateError::Config(e.to_string()))
}

/// Cancel the returned token on SIGINT or SIGTERM. The run stops at the next
/// table or chunk boundary.
#[cfg(unix)]
async fn setup_signal_handler() -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => eprintln!("\nReceived SIGINT. Stopping after the current chunk..."),
            _ = sigterm.recv() => eprintln!("\nReceived SIGTERM. Stopping after the current chunk..."),
        }
        token.cancel();
    });

    Ok(cancel_token)
}

#[cfg(not(unix))]
async fn setup_signal_handler() -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Stopping after the current chunk...");
            token.cancel();
        }
    });

    Ok(cancel_token)
}
