//! Command-line inspector for `livequery_core`.
//!
//! # Responsibility
//! - Verify core linkage (`ping`).
//! - Seed a collection from a JSON document and print one projection with
//!   its count and optional sum (`show`).

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use livequery_core::{
    import_seed_if_empty, init_logging, open_db, open_db_in_memory, CoreConfig, FetchRequest,
    FieldValue, Filter, NoopSubscriber, ProjectionLayout, QueryService, Record, SectionKey,
    SortField, SqliteRecordRepository,
};
use log::info;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "livequery")]
#[command(about = "Inspect live query projections over a record store")]
struct Cli {
    /// JSON config file (`db_path`, `log_level`, `log_dir`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// SQLite database file; overrides the config value.
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Absolute log directory; overrides the config value.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Ping,
    Show {
        /// JSON array of objects imported when the collection is empty.
        #[arg(long)]
        seed: Option<PathBuf>,
        #[arg(long)]
        kind: String,
        /// Field whose value names each section.
        #[arg(long)]
        section: Option<String>,
        /// Sort field, `name` or `name:desc`. Repeatable.
        #[arg(long)]
        sort: Vec<String>,
        /// Equality filter, `name=value`. Repeatable; combined with AND.
        #[arg(long)]
        filter: Vec<String>,
        /// Numeric field summed over the filtered records.
        #[arg(long)]
        sum: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    if let Some(log_dir) = &config.log_dir {
        let log_dir = log_dir
            .to_str()
            .ok_or_else(|| anyhow!("log directory is not valid UTF-8"))?;
        init_logging(&config.log_level, log_dir).map_err(|err| anyhow!(err))?;
    }

    match cli.command {
        Command::Ping => {
            println!("livequery_core ping={}", livequery_core::ping());
            println!("livequery_core version={}", livequery_core::core_version());
            Ok(())
        }
        Command::Show {
            seed,
            kind,
            section,
            sort,
            filter,
            sum,
        } => {
            let mut request = FetchRequest::new(kind.as_str()).with_filter(parse_filters(&filter)?);
            for spec in &sort {
                request = request.sorted_by(parse_sort(spec)?);
            }
            if let Some(field) = section {
                request = request.sectioned_by(SectionKey::field(field));
            }
            show(&config, seed.as_ref(), request, sum.as_deref())
        }
    }
}

fn load_config(cli: &Cli) -> Result<CoreConfig> {
    let mut config = match &cli.config {
        Some(path) => CoreConfig::load(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => CoreConfig::default(),
    };
    if let Some(db) = &cli.db {
        config = config.with_db_path(db);
    }
    if let Some(log_dir) = &cli.log_dir {
        config = config.with_log_dir(log_dir);
    }
    Ok(config)
}

fn show(
    config: &CoreConfig,
    seed: Option<&PathBuf>,
    request: FetchRequest,
    sum_field: Option<&str>,
) -> Result<()> {
    let conn = match &config.db_path {
        Some(path) => open_db(path)
            .with_context(|| format!("Failed to open database '{}'", path.display()))?,
        None => open_db_in_memory().context("Failed to open in-memory database")?,
    };
    let repo = SqliteRecordRepository::try_new(&conn)?;
    let mut service = QueryService::new(repo);

    if let Some(path) = seed {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read seed '{}'", path.display()))?;
        let report = import_seed_if_empty(&mut service, &request.kind, &json)?;
        println!("seed imported={}", report.imported_count());
    }

    let filter = request.filter.clone();
    let kind = request.kind.clone();
    let handle = service.open(request, Box::new(NoopSubscriber))?;
    let layout = service.layout(handle)?;
    print_layout(layout);
    info!(
        "event=cli_show module=cli status=ok kind={} sections={} rows={}",
        kind,
        layout.sections().len(),
        layout.len()
    );

    println!("count={}", service.count(&kind, &filter)?);
    if let Some(field) = sum_field {
        println!("sum({field})={}", service.sum(&kind, &filter, field)?);
    }
    service.close(handle)?;
    Ok(())
}

fn print_layout(layout: &ProjectionLayout) {
    for (index, section) in layout.sections().iter().enumerate() {
        println!("[{index}] {} ({} rows)", section.name(), section.len());
        for id in section.rows() {
            if let Some(record) = layout.record(*id) {
                println!("    {}", describe(record));
            }
        }
    }
}

fn describe(record: &Record) -> String {
    let fields = record
        .fields
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(" ");
    format!("{} {fields}", record.id)
}

fn parse_sort(spec: &str) -> Result<SortField> {
    match spec.split_once(':') {
        None => Ok(SortField::ascending(spec.trim())),
        Some((field, "asc")) => Ok(SortField::ascending(field.trim())),
        Some((field, "desc")) => Ok(SortField::descending(field.trim())),
        Some((_, direction)) => bail!("Unknown sort direction '{direction}', expected asc|desc"),
    }
}

fn parse_filters(specs: &[String]) -> Result<Filter> {
    let mut filter = Filter::All;
    for spec in specs {
        let (field, raw) = spec
            .split_once('=')
            .ok_or_else(|| anyhow!("Invalid filter '{spec}', expected name=value"))?;
        filter = filter.and(Filter::equals(field.trim(), parse_value(raw.trim())));
    }
    Ok(filter)
}

fn parse_value(raw: &str) -> FieldValue {
    if let Ok(integer) = raw.parse::<i64>() {
        return FieldValue::Integer(integer);
    }
    if let Some(real) = raw.parse::<f64>().ok().filter(|real| real.is_finite()) {
        return FieldValue::Real(real);
    }
    match raw {
        "true" => FieldValue::Bool(true),
        "false" => FieldValue::Bool(false),
        "null" => FieldValue::Null,
        _ => FieldValue::Text(raw.to_string()),
    }
}
