//! Binary entry point for the graphsync CLI.
#![forbid(unsafe_code)]

mod ui;

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use graphsync::config::default_config_path;
use graphsync::query::{
    build_cleanup_queries, build_create_index_queries, build_ingestion_query, Statement,
};
use graphsync::sync::GraphJob;
use graphsync::{NodeSchema, RelKey, RelSelection, RunParams, SyncConfig, Value};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::ui::{Theme, Tone, Ui};

#[derive(Parser, Debug)]
#[command(
    name = "graphsync",
    version,
    about = "Compile entity schemas into graph sync statements",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        env = "GRAPHSYNC_CONFIG",
        help = "Config file (defaults to the user config directory)"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = Theme::Auto,
        help = "Color theme for text output"
    )]
    theme: Theme,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a schema file and summarize it
    Validate(SchemaArg),
    /// Print the upsert statement for a schema
    Compile(CompileCmd),
    /// Print the index statements for a schema
    Indexes(SchemaArg),
    /// Print the cleanup statements for a schema
    Cleanup(CleanupCmd),
    /// Show the effective configuration
    Config,
}

#[derive(Args, Debug)]
struct SchemaArg {
    #[arg(value_name = "SCHEMA", help = "Schema file (.toml or .json)")]
    schema: PathBuf,
}

#[derive(Args, Debug)]
struct CompileCmd {
    #[command(flatten)]
    schema: SchemaArg,

    #[arg(
        long = "rel",
        value_name = "REL:Target",
        help = "Merge only these relationships (repeatable)"
    )]
    rels: Vec<RelKey>,

    #[arg(long, conflicts_with = "rels", help = "Merge nodes without relationships")]
    no_rels: bool,
}

#[derive(Args, Debug)]
struct CleanupCmd {
    #[command(flatten)]
    schema: SchemaArg,

    #[arg(long, value_name = "TAG", help = "Bind the job to this run tag")]
    update_tag: Option<i64>,

    #[arg(
        long = "param",
        value_name = "KEY=VALUE",
        value_parser = parse_param,
        requires = "update_tag",
        help = "Run parameter bound into the job (repeatable)"
    )]
    params: Vec<(String, Value)>,
}

#[derive(Copy, Clone, Debug, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let ui = Ui::new(cli.theme);

    match cli.command {
        Command::Validate(arg) => {
            let schema = load_schema(&arg.schema)?;
            let summary = SchemaSummary::from(&schema);
            emit(&cli.format, &summary, |_| print_summary_text(&ui, &summary))?;
        }
        Command::Compile(cmd) => {
            let schema = load_schema(&cmd.schema.schema)?;
            let selection = if cmd.no_rels {
                RelSelection::none()
            } else if cmd.rels.is_empty() {
                RelSelection::All
            } else {
                RelSelection::only(cmd.rels)
            };
            let statement = build_ingestion_query(&schema, &selection)?;
            let output = Compiled {
                label: schema.label(),
                statements: vec![statement],
            };
            emit(&cli.format, &output, |_| {
                print_statements_text(&ui, &format!("Upsert {}", output.label), &output.statements)
            })?;
        }
        Command::Indexes(arg) => {
            let schema = load_schema(&arg.schema)?;
            let output = Compiled {
                label: schema.label(),
                statements: build_create_index_queries(&schema),
            };
            emit(&cli.format, &output, |_| {
                print_statements_text(&ui, &format!("Indexes {}", output.label), &output.statements)
            })?;
        }
        Command::Cleanup(cmd) => {
            let schema = load_schema(&cmd.schema.schema)?;
            match cmd.update_tag {
                Some(tag) => {
                    let config = SyncConfig::load(cli.config)?;
                    let mut run_params = RunParams::new(tag);
                    for (name, value) in cmd.params {
                        run_params.insert(name, value);
                    }
                    let job = GraphJob::cleanup(&schema, &run_params, config.cleanup_iteration_size)?;
                    emit(&cli.format, &job, |_| print_job_text(&ui, &job))?;
                }
                None => {
                    let output = Compiled {
                        label: schema.label(),
                        statements: build_cleanup_queries(&schema)?,
                    };
                    emit(&cli.format, &output, |_| {
                        print_statements_text(
                            &ui,
                            &format!("Cleanup {}", output.label),
                            &output.statements,
                        )
                    })?;
                }
            }
        }
        Command::Config => {
            let path = cli.config.clone().or_else(default_config_path);
            let config = SyncConfig::load(cli.config)?;
            emit(&cli.format, &config, |_| {
                print_config_text(&ui, path.as_deref(), &config)
            })?;
        }
    }

    Ok(())
}

fn load_schema(path: &Path) -> Result<NodeSchema, Box<dyn Error>> {
    let contents = fs::read_to_string(path)
        .map_err(|err| format!("failed to read schema {}: {err}", path.display()))?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let schema = if is_json {
        serde_json::from_str(&contents)
            .map_err(|err| format!("invalid schema {}: {err}", path.display()))?
    } else {
        toml::from_str(&contents)
            .map_err(|err| format!("invalid schema {}: {err}", path.display()))?
    };
    Ok(schema)
}

fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (name, value) = raw
        .split_once('=')
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let value = if let Ok(int) = value.parse::<i64>() {
        Value::Int(int)
    } else {
        match value {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            other => Value::from(other),
        }
    };
    Ok((name.to_owned(), value))
}

#[derive(Serialize)]
struct Compiled<'a> {
    label: &'a str,
    statements: Vec<Statement>,
}

#[derive(Serialize)]
struct SchemaSummary {
    label: String,
    extra_labels: Vec<String>,
    properties: Vec<String>,
    sub_resource: Option<String>,
    relationships: Vec<String>,
}

impl From<&NodeSchema> for SchemaSummary {
    fn from(schema: &NodeSchema) -> Self {
        Self {
            label: schema.label().to_owned(),
            extra_labels: schema.extra_labels().to_vec(),
            properties: schema
                .properties()
                .iter()
                .map(|(attribute, _)| attribute.to_owned())
                .collect(),
            sub_resource: schema
                .sub_resource_relationship()
                .map(|rel| rel.key().to_string()),
            relationships: schema
                .other_relationships()
                .iter()
                .map(|rel| rel.key().to_string())
                .collect(),
        }
    }
}

fn emit<T, F>(format: &OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: Serialize,
    F: Fn(OutputFormat),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(OutputFormat::Text),
    }
    Ok(())
}

fn print_summary_text(ui: &Ui, summary: &SchemaSummary) {
    let extra = if summary.extra_labels.is_empty() {
        "-".to_owned()
    } else {
        summary.extra_labels.join(", ")
    };
    ui.section(
        "Schema",
        [
            ("label", summary.label.clone()),
            ("extra labels", extra),
            (
                "sub resource",
                summary.sub_resource.clone().unwrap_or_else(|| "-".to_owned()),
            ),
        ],
    );
    ui.list("Properties", summary.properties.iter().cloned());
    ui.list("Relationships", summary.relationships.iter().cloned());
    if summary.sub_resource.is_none() {
        ui.notice(Tone::Warn, "no sub resource relationship; this schema cannot be swept");
    }
    ui.notice(Tone::Success, &format!("{} is valid", summary.label));
}

fn print_statements_text(ui: &Ui, title: &str, statements: &[Statement]) {
    if statements.is_empty() {
        ui.notice(Tone::Info, &format!("{title}: nothing to run"));
        return;
    }
    ui.heading(title);
    for (idx, statement) in statements.iter().enumerate() {
        if idx > 0 {
            ui.spacer();
        }
        ui.block(statement.query());
        ui.list(
            "Parameters",
            statement.parameters().iter().map(|name| format!("${name}")),
        );
    }
}

fn print_job_text(ui: &Ui, job: &GraphJob) {
    ui.heading(job.name());
    for (idx, statement) in job.statements().iter().enumerate() {
        if idx > 0 {
            ui.spacer();
        }
        ui.block(statement.statement().query());
        ui.section(
            "Bound",
            statement
                .parameters()
                .iter()
                .map(|(name, value)| (name.as_str(), value)),
        );
    }
}

fn print_config_text(ui: &Ui, path: Option<&Path>, config: &SyncConfig) {
    match path {
        Some(path) if path.exists() => ui.notice(Tone::Info, &format!("loaded {}", path.display())),
        Some(path) => ui.notice(Tone::Info, &format!("{} not found, using defaults", path.display())),
        None => ui.notice(Tone::Info, "no config directory, using defaults"),
    }
    ui.section(
        "Sync",
        [
            ("batch_size", config.batch_size.to_string()),
            (
                "cleanup_iteration_size",
                config.cleanup_iteration_size.to_string(),
            ),
            ("max_workers", config.max_workers.to_string()),
            (
                "statement_cache_size",
                config.statement_cache_size.to_string(),
            ),
        ],
    );
    ui.section(
        "Retry",
        [
            ("max_attempts", config.retry.max_attempts.to_string()),
            ("base_delay_ms", config.retry.base_delay_ms.to_string()),
            ("max_delay_ms", config.retry.max_delay_ms.to_string()),
            ("max_elapsed_ms", config.retry.max_elapsed_ms.to_string()),
        ],
    );
}
