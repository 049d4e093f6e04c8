//! formcalc - command-line tool for form formulas
//!
//! Evaluate expressions, check them, inspect field dependency graphs and
//! run recalculation passes over JSON form data.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use formcalc::prelude::*;
use formcalc::{Row, StaticApiProvider, StaticDatabaseProvider};
use formcalc_formula::functions::parse_datetime;
use serde_json::{json, Map, Value as Json};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "formcalc", author, version, about = "Evaluate and check form formulas")]
struct Cli {
    /// Log more (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate an expression and print the result as JSON
    Eval {
        /// Expression text
        expression: String,

        /// JSON object with form data
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Clock used by NOW() and TODAY(), e.g. 2024-01-31T12:00:00
        #[arg(long)]
        now: Option<String>,
    },

    /// Check an expression without evaluating it
    Validate {
        /// Expression text
        expression: String,

        /// Field names the expression may reference
        #[arg(long, value_delimiter = ',')]
        variables: Option<Vec<String>>,
    },

    /// List the built-in functions
    Functions,

    /// List the supported operators
    Operators,

    /// Print the dependency graph of a field list
    Graph {
        /// JSON array of field definitions
        fields: PathBuf,
    },

    /// Recalculate the calculated fields of a form
    Recalc {
        /// JSON array of field definitions
        fields: PathBuf,

        /// JSON object with form data
        data: PathBuf,

        /// Only recompute fields depending on this one
        #[arg(short, long)]
        changed: Option<String>,
    },

    /// Resolve an options expression
    Options {
        /// Options expression text
        expression: String,

        /// JSON object with form data
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// JSON object with canned `api` responses and `database` rows
        #[arg(long)]
        fixtures: Option<PathBuf>,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Eval { expression, data, now } => eval(&expression, data.as_deref(), now.as_deref()),
        Commands::Validate {
            expression,
            variables,
        } => validate(&expression, variables.as_deref()),
        Commands::Functions => {
            print_json(&json!(FormulaEngine::new().available_functions()))?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Operators => {
            print_json(&json!(FormulaEngine::new().supported_operators()))?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Graph { fields } => graph(&fields),
        Commands::Recalc { fields, data, changed } => recalc(&fields, &data, changed.as_deref()),
        Commands::Options {
            expression,
            data,
            fixtures,
        } => options(&expression, data.as_deref(), fixtures.as_deref()),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn eval(expression: &str, data: Option<&Path>, now: Option<&str>) -> Result<ExitCode> {
    let data = match data {
        Some(path) => load_data(path)?,
        None => FormData::new(),
    };

    let mut engine = FormulaEngine::new();
    if let Some(now) = now {
        let now = parse_datetime(now).with_context(|| format!("Invalid --now value: {}", now))?;
        engine = engine.with_clock(now);
    }

    let value = engine
        .evaluate_expression(expression, &data)
        .with_context(|| format!("Failed to evaluate: {}", expression))?;
    print_json(&value.to_json())?;
    Ok(ExitCode::SUCCESS)
}

fn validate(expression: &str, variables: Option<&[String]>) -> Result<ExitCode> {
    let engine = FormulaEngine::new();
    let report = match variables {
        Some(names) => {
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            engine.validate_with_variables(expression, &names)
        }
        None => engine.validate_expression(expression),
    };

    print_json(&json!({
        "is_valid": report.is_valid,
        "errors": report.messages(),
        "security_issues": report.security_issues,
    }))?;

    Ok(if report.is_valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn graph(fields: &Path) -> Result<ExitCode> {
    let fields = load_fields(fields)?;
    let engine = FormulaEngine::new();

    let graph = match engine.build_dependency_graph(&fields) {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let edges: Vec<Json> = graph
        .edges()
        .iter()
        .map(|edge| json!({ "field": edge.field, "depends_on": edge.depends_on, "kind": edge.kind.name() }))
        .collect();
    let skipped: Vec<Json> = graph
        .skipped()
        .iter()
        .map(|s| json!({ "field": s.field, "kind": s.kind.name(), "error": s.error.to_string() }))
        .collect();
    let stats = graph.stats();

    print_json(&json!({
        "order": graph.topological_order(),
        "calculation_order": graph.calculation_order(None),
        "edges": edges,
        "skipped": skipped,
        "stats": {
            "total_fields": stats.total_fields,
            "calculated_fields": stats.calculated_fields,
            "total_dependencies": stats.total_dependencies,
            "max_depth": stats.max_depth,
            "root_fields": stats.root_fields,
            "leaf_fields": stats.leaf_fields,
        },
    }))?;
    Ok(ExitCode::SUCCESS)
}

fn recalc(fields: &Path, data: &Path, changed: Option<&str>) -> Result<ExitCode> {
    let fields = load_fields(fields)?;
    let data = load_data(data)?;
    let engine = FormulaEngine::new();

    let outcome = match engine.recalculate(&data, &fields, changed) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let failures: Vec<Json> = outcome
        .failures
        .iter()
        .map(|f| json!({ "field": f.field, "error": f.error.to_string() }))
        .collect();

    print_json(&json!({
        "data": data_to_json(&outcome.data),
        "recomputed": outcome.recomputed,
        "failures": failures,
    }))?;
    Ok(ExitCode::SUCCESS)
}

fn options(expression: &str, data: Option<&Path>, fixtures: Option<&Path>) -> Result<ExitCode> {
    let data = match data {
        Some(path) => load_data(path)?,
        None => FormData::new(),
    };

    let mut engine = FormulaEngine::new();
    if let Some(path) = fixtures {
        let (api, database) = load_fixtures(path)?;
        engine = engine.with_api_provider(api).with_database_provider(database);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let options = runtime
        .block_on(engine.resolve_dynamic_options(expression, &data))
        .with_context(|| format!("Failed to resolve options: {}", expression))?;

    print_json(&json!(options
        .iter()
        .map(|o| json!({ "value": o.value, "label": o.label }))
        .collect::<Vec<_>>()))?;
    Ok(ExitCode::SUCCESS)
}

fn read_json(path: &Path) -> Result<Json> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read: {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in: {}", path.display()))
}

fn load_fields(path: &Path) -> Result<Vec<FieldDefinition>> {
    serde_json::from_value(read_json(path)?)
        .with_context(|| format!("Invalid field definitions in: {}", path.display()))
}

fn load_data(path: &Path) -> Result<FormData> {
    let Json::Object(map) = read_json(path)? else {
        bail!("Form data must be a JSON object: {}", path.display());
    };
    map.iter()
        .map(|(name, json)| {
            Value::from_json(json)
                .map(|value| (name.clone(), value))
                .with_context(|| format!("Invalid value for field '{}'", name))
        })
        .collect()
}

fn load_fixtures(path: &Path) -> Result<(StaticApiProvider, StaticDatabaseProvider)> {
    let fixtures = read_json(path)?;
    let mut api = StaticApiProvider::new();
    let mut database = StaticDatabaseProvider::new();

    if let Some(responses) = fixtures.get("api").and_then(Json::as_object) {
        for (endpoint, response) in responses {
            api = api.with_response(endpoint.clone(), response.clone());
        }
    }
    if let Some(queries) = fixtures.get("database").and_then(Json::as_object) {
        for (query, rows) in queries {
            let rows: Vec<Row> = serde_json::from_value(rows.clone())
                .with_context(|| format!("Rows for '{}' must be an array of objects", query))?;
            database = database.with_rows(query.clone(), rows);
        }
    }
    Ok((api, database))
}

fn data_to_json(data: &FormData) -> Json {
    Json::Object(
        data.iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect::<Map<String, Json>>(),
    )
}

fn print_json(json: &Json) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(json)?);
    Ok(())
}
