//! Command dispatch for the coauthors binary.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::json;

use crate::cli::{CacheAction, Cli, Commands, OutputFormat, PruneArgs, QueryArgs};
use crate::config::Config;
use crate::error::ExitCode;
use crate::logging::init_logging;
use crate::output::{CsvOutput, JsonOutput};
use crate::query::{PairMatrixResult, PairQueryRequest, QueryEngine};
use crate::signature::DbSignature;

const SECONDS_PER_DAY: u64 = 86_400;

/// Run the parsed command line and return the process exit code.
///
/// # Errors
///
/// Returns any configuration, I/O or query error. Query errors keep their
/// [`crate::error::QueryError`] type so the caller can map them to exit codes.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    init_logging(cli.verbose, cli.quiet);

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(db) = cli.db {
        config.db_path = Some(db);
    }
    if let Some(cache_db) = cli.cache_db {
        config.cache_db_path = Some(cache_db);
    }

    let code = match cli.command {
        Commands::Config => {
            print!("{}", config.to_toml()?);
            ExitCode::Success
        }
        Commands::Query(args) => with_engine(&config, |engine| run_query(engine, &args))?,
        Commands::Health => with_engine(&config, run_health)?,
        Commands::Stats => with_engine(&config, |engine| {
            let (stats, cache_hit) = engine.stats()?;
            print_json(&json!({ "stats": stats, "cache_hit": cache_hit }))?;
            Ok(ExitCode::Success)
        })?,
        Commands::Cache(args) => with_engine(&config, |engine| {
            run_cache(engine, args.action)?;
            Ok(ExitCode::Success)
        })?,
    };
    Ok(code)
}

/// Build the engine, run `f` and close the cache whatever `f` returned.
fn with_engine<F>(config: &Config, f: F) -> Result<ExitCode>
where
    F: FnOnce(&QueryEngine) -> Result<ExitCode>,
{
    let engine = QueryEngine::new(config);
    log::debug!(
        "Dataset: {}, cache: {}",
        engine.db_path().display(),
        engine.cache().path().display()
    );
    let result = f(&engine);
    engine.cache().close();
    result
}

fn run_health(engine: &QueryEngine) -> Result<ExitCode> {
    let report = engine.health();
    print_json(&report)?;
    Ok(if report.healthy {
        ExitCode::Success
    } else {
        ExitCode::Unavailable
    })
}

fn run_query(engine: &QueryEngine, args: &QueryArgs) -> Result<ExitCode> {
    let request = build_request(args)?;
    let result = engine.compute_pair_matrix(&request)?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    write_result(&mut out, &result, args.output, args.pretty)?;
    out.flush()?;
    Ok(ExitCode::Success)
}

fn write_result<W: Write>(
    out: &mut W,
    result: &PairMatrixResult,
    format: OutputFormat,
    pretty: bool,
) -> Result<()> {
    match format {
        OutputFormat::Json => JsonOutput::new(result).write_to(out, pretty)?,
        OutputFormat::Csv => CsvOutput::new(result).write_to(out)?,
    }
    Ok(())
}

/// Assemble a request from `--request`, the name flags and list files.
///
/// Names from flags and files are appended to the request's lists; numeric
/// flags replace the request's values.
fn build_request(args: &QueryArgs) -> Result<PairQueryRequest> {
    let mut request = match &args.request {
        Some(path) => read_request(path)?,
        None => PairQueryRequest::default(),
    };

    request.left.extend(args.left.iter().cloned());
    request.right.extend(args.right.iter().cloned());
    if let Some(path) = &args.left_file {
        request.left.extend(read_entries(path)?);
    }
    if let Some(path) = &args.right_file {
        request.right.extend(read_entries(path)?);
    }

    if let Some(limit) = args.limit_per_pair {
        request.limit_per_pair = Some(limit);
    }
    if let Some(limit) = args.author_limit {
        request.author_limit = Some(limit);
    }
    if let Some(year) = args.year_min {
        request.year_min = Some(year);
    }
    if args.fuzzy {
        request.exact_base_match = false;
    }
    Ok(request)
}

fn read_request(path: &Path) -> Result<PairQueryRequest> {
    if path.as_os_str() == "-" {
        return serde_json::from_reader(io::stdin().lock())
            .context("Failed to parse request from stdin");
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read request file: {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse request file: {}", path.display()))
}

/// One entry per line. Blank lines are dropped later by sanitization.
fn read_entries(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read author list: {}", path.display()))?;
    Ok(text.lines().map(str::to_string).collect())
}

fn run_cache(engine: &QueryEngine, action: CacheAction) -> Result<()> {
    let cache = engine.cache();
    match action {
        CacheAction::Stats => {
            let stats = cache.stats()?;
            print_json(&stats)?;
        }
        CacheAction::Prune(PruneArgs { stale, idle_days }) => {
            if !stale && idle_days.is_none() {
                bail!("cache prune needs --stale, --idle-days or both");
            }
            let mut deleted = 0;
            if stale {
                let sig = DbSignature::read(engine.db_path())?;
                deleted += cache.prune_stale(&sig)?;
            }
            if let Some(days) = idle_days {
                let idle = Duration::from_secs(u64::from(days) * SECONDS_PER_DAY);
                deleted += cache.prune_idle(idle)?;
            }
            log::info!("Pruned {} cache entries", deleted);
            print_json(&json!({ "deleted": deleted }))?;
        }
        CacheAction::Clear => {
            let deleted = cache.clear()?;
            log::info!("Cleared {} cache entries", deleted);
            print_json(&json!({ "deleted": deleted }))?;
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    JsonOutput::new(value).write_to(&mut out, true)?;
    Ok(())
}
