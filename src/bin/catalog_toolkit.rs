//! catalog-toolkit command line.
//!
//! ```bash
//! # Capture an environment
//! catalog_toolkit create-snapshot --url https://catalog:9047 --user admin \
//!     --output prod.json
//!
//! # Re-apply it elsewhere, reporting failures to a TSV file
//! catalog_toolkit push-snapshot --url https://staging:9047 --input prod.json \
//!     --report push.tsv
//!
//! # Compare two captures
//! catalog_toolkit diff-snapshot --base prod.json --comp staging.json --output diff.md
//! ```
//!
//! Connection settings fall back to `CATALOG_URL`, `CATALOG_USER` and
//! `CATALOG_PASSWORD`, read from the environment or a `.env` file.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, Instrument};

use catalog_client::CatalogClient;
use catalog_toolkit::config::{ConnectionConfig, DEFAULT_TIMEOUT_SECS};
use catalog_toolkit::context::RunContext;
use catalog_toolkit::diff::diff_snapshots;
use catalog_toolkit::logging::{self, LogLevel};
use catalog_toolkit::push::SnapshotPusher;
use catalog_toolkit::reader::{read_environment, ReadScope};
use catalog_toolkit::rebuild::rebuild_metadata;
use catalog_toolkit::report::{write_json_report, ExceptionReport, EXIT_FATAL, EXIT_OK};
use catalog_toolkit::sql::{exec_sql, DEFAULT_POLL_INTERVAL};
use catalog_toolkit::storage::{self, SnapshotFormat};

#[derive(Parser)]
#[command(name = "catalog_toolkit")]
#[command(version)]
#[command(about = "Snapshot, compare and re-apply analytics catalog metadata")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, default_value = "warn", value_enum)]
    log_level: LogLevel,

    /// Append log output to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Args)]
struct Connection {
    /// Catalog base URL
    #[arg(long, env = "CATALOG_URL")]
    url: String,

    #[arg(long, env = "CATALOG_USER")]
    user: String,

    #[arg(long, env = "CATALOG_PASSWORD", hide_env_values = true)]
    password: String,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// Skip TLS certificate verification
    #[arg(long)]
    insecure: bool,
}

impl Connection {
    fn config(&self) -> Result<ConnectionConfig> {
        Ok(ConnectionConfig::new(&self.url, &self.user, &self.password)?
            .with_timeout(Duration::from_secs(self.timeout))
            .with_verify_ssl(!self.insecure))
    }
}

#[derive(Args)]
struct ReportArgs {
    /// Write the exception report to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Field delimiter of the exception report (default: tab)
    #[arg(long)]
    report_delimiter: Option<char>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read an environment into a snapshot
    CreateSnapshot {
        #[command(flatten)]
        connection: Connection,

        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, value_enum, default_value = "file")]
        format: SnapshotFormat,

        /// Only read these spaces (repeatable); sources are always read
        #[arg(long = "space")]
        spaces: Vec<String>,

        /// Do not follow VDS lineage out of the selected spaces
        #[arg(long)]
        no_dependencies: bool,

        #[command(flatten)]
        report: ReportArgs,
    },

    /// Apply a snapshot to a target environment
    PushSnapshot {
        #[command(flatten)]
        connection: Connection,

        /// Snapshot file or directory
        #[arg(short, long)]
        input: PathBuf,

        /// Log the writes instead of sending them
        #[arg(long)]
        dry_run: bool,

        #[command(flatten)]
        report: ReportArgs,
    },

    /// Compare two snapshots
    DiffSnapshot {
        #[arg(long)]
        base: PathBuf,

        #[arg(long)]
        comp: PathBuf,

        /// Write the difference table here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Convert a snapshot file into a directory tree
    ExplodeSnapshot {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Convert a snapshot directory tree into a single file
    ImplodeSnapshot {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Run a `;`-separated SQL script
    ExecSql {
        #[command(flatten)]
        connection: Connection,

        /// Script file
        #[arg(long, conflicts_with = "sql")]
        sql_file: Option<PathBuf>,

        /// Inline script
        #[arg(long)]
        sql: Option<String>,

        /// Stop at the first failed statement
        #[arg(long)]
        fail_on_error: bool,

        /// JSON status report
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Forget and refresh metadata of physical datasets
    RebuildMetadata {
        #[command(flatten)]
        connection: Connection,

        /// Limit to one datasource and everything below it
        #[arg(long)]
        datasource: Option<String>,

        #[arg(long, default_value_t = 1)]
        concurrency: usize,

        /// JSON status report
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Self::CreateSnapshot { .. } => "create-snapshot",
            Self::PushSnapshot { .. } => "push-snapshot",
            Self::DiffSnapshot { .. } => "diff-snapshot",
            Self::ExplodeSnapshot { .. } => "explode-snapshot",
            Self::ImplodeSnapshot { .. } => "implode-snapshot",
            Self::ExecSql { .. } => "exec-sql",
            Self::RebuildMetadata { .. } => "rebuild-metadata",
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.log_level, cli.log_file.as_deref()) {
        eprintln!("error: {e}");
        return ExitCode::from(EXIT_FATAL);
    }

    let ctx = RunContext::new(cli.command.name());
    let span = logging::run_span(&ctx);
    match run(cli.command, ctx).instrument(span).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

async fn run(command: Commands, ctx: RunContext) -> Result<ExitCode> {
    info!(command = %ctx.command, "Starting");
    match command {
        Commands::CreateSnapshot {
            connection,
            output,
            format,
            spaces,
            no_dependencies,
            report,
        } => {
            let ctx = ctx.with_report(report.report, report.report_delimiter);
            let client = connection.config()?.connect().await?;
            let mut scope = if spaces.is_empty() {
                ReadScope::default()
            } else {
                ReadScope::spaces(spaces)
            };
            scope.collect_dependencies = !no_dependencies;

            let (snapshot, exceptions) = read_environment(&client, &scope).await?;
            storage::write_snapshot(&snapshot, &output, format)
                .with_context(|| format!("writing snapshot to {}", output.display()))?;
            finish(&ctx, exceptions)
        }

        Commands::PushSnapshot {
            connection,
            input,
            dry_run,
            report,
        } => {
            let ctx = ctx.with_report(report.report, report.report_delimiter);
            let snapshot = storage::read_snapshot(&input)
                .with_context(|| format!("reading snapshot {}", input.display()))?;
            let config = connection.config()?.with_dry_run(dry_run);
            let client: Arc<dyn CatalogClient> = Arc::new(config.connect().await?);

            let outcome = SnapshotPusher::new(client).push(snapshot).await?;
            finish(&ctx, outcome.report)
        }

        Commands::DiffSnapshot { base, comp, output } => {
            let base_snapshot = storage::read_snapshot(&base)
                .with_context(|| format!("reading base snapshot {}", base.display()))?;
            let comp_snapshot = storage::read_snapshot(&comp)
                .with_context(|| format!("reading comp snapshot {}", comp.display()))?;
            let diff = diff_snapshots(&base_snapshot, &comp_snapshot);
            info!(differences = diff.len(), "Snapshots compared");
            match output {
                Some(path) => diff.write_table(&path)?,
                None => print!("{}", diff.to_table()),
            }
            Ok(ExitCode::from(EXIT_OK))
        }

        Commands::ExplodeSnapshot { input, output } => {
            storage::explode(&input, &output)?;
            Ok(ExitCode::from(EXIT_OK))
        }

        Commands::ImplodeSnapshot { input, output } => {
            storage::implode(&input, &output)?;
            Ok(ExitCode::from(EXIT_OK))
        }

        Commands::ExecSql {
            connection,
            sql_file,
            sql,
            fail_on_error,
            output,
        } => {
            let script = match (sql_file, sql) {
                (Some(path), _) => read_script(&path)?,
                (None, Some(sql)) => sql,
                (None, None) => anyhow::bail!("either --sql-file or --sql is required"),
            };
            let client = connection.config()?.connect().await?;
            let outcome = exec_sql(&client, &script, &ctx, fail_on_error, DEFAULT_POLL_INTERVAL).await?;
            if let Some(path) = output {
                write_json_report(&path, &outcome.statuses)?;
            }
            if outcome.aborted {
                error!("Script aborted on a failed statement");
                return Ok(ExitCode::from(EXIT_FATAL));
            }
            Ok(outcome.report.exit_code())
        }

        Commands::RebuildMetadata {
            connection,
            datasource,
            concurrency,
            output,
        } => {
            let client: Arc<dyn CatalogClient> = Arc::new(connection.config()?.connect().await?);
            let outcome = rebuild_metadata(
                client,
                datasource.as_deref(),
                concurrency,
                &ctx.sql_comment(),
                DEFAULT_POLL_INTERVAL,
            )
            .await?;
            if let Some(path) = output {
                write_json_report(&path, &outcome.statuses)?;
            }
            Ok(outcome.report.exit_code())
        }
    }
}

fn read_script(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading SQL script {}", path.display()))
}

/// Write the exception report if one was requested and map it to an exit code.
fn finish(ctx: &RunContext, report: ExceptionReport) -> Result<ExitCode> {
    if let Some(path) = &ctx.report_path {
        report.write_delimited(path, ctx.report_delimiter)?;
    }
    info!(errors = report.len(), "Finished");
    Ok(report.exit_code())
}
