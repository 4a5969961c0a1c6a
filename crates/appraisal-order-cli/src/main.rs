use anyhow::{Context, Result};
use appraisal_order::config::{load_value, merge_values};
use appraisal_order::mapping::{mapping, MappingId};
use appraisal_order::{run_order, RunConfig, RunReport};
use clap::Parser;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

/// Exit status when no run could be attempted (bad arguments or config).
const EXIT_USAGE: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "appraisal-order", version)]
#[command(about = "Fill the appraisal order form and report the quoted lender fee")]
struct Args {
    /// Run configuration file (.json, .yaml or .yml)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Entry point of the order application
    #[arg(long, env = "APPRAISAL_TARGET_URL")]
    target_url: Option<String>,

    #[arg(long, env = "APPRAISAL_USERNAME")]
    username: Option<String>,

    #[arg(long, env = "APPRAISAL_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Run the browser without a window (`--headless false` to show it)
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    headless: Option<bool>,

    /// JSON object of field values and settings, applied over the config file
    #[arg(long)]
    vars: Option<String>,

    /// Also write the report to this file
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Print the label to code tables and exit
    #[arg(long)]
    list_mappings: bool,
}

fn init_logging() {
    let log_level = std::env::var("LOG_LEVEL")
        .map(|level| match level.to_lowercase().as_str() {
            "error" => Level::ERROR,
            "warn" => Level::WARN,
            "info" => Level::INFO,
            "debug" => Level::DEBUG,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    let mut filter = EnvFilter::from_default_env().add_directive(log_level.into());
    for noisy in ["tungstenite=warn", "tokio_tungstenite=warn", "hyper=warn", "reqwest=warn"] {
        if let Ok(directive) = noisy.parse() {
            filter = filter.add_directive(directive);
        }
    }

    // stdout carries only the report
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

/// Layer config file, `--vars` and explicit flags, in that order.
fn build_config(args: &Args) -> Result<RunConfig> {
    let mut value = match &args.config {
        Some(path) => load_value(path)?,
        None => Value::Object(Map::new()),
    };

    if let Some(vars) = &args.vars {
        let overlay: Value = serde_json::from_str(vars).context("--vars is not valid JSON")?;
        value = merge_values(value, overlay)?;
    }

    let mut flags = Map::new();
    if let Some(url) = &args.target_url {
        flags.insert("target_url".into(), url.clone().into());
    }
    if let Some(username) = &args.username {
        flags.insert("username".into(), username.clone().into());
    }
    if let Some(password) = &args.password {
        flags.insert("password".into(), password.clone().into());
    }
    if let Some(headless) = args.headless {
        flags.insert("headless".into(), headless.into());
    }
    let value = merge_values(value, Value::Object(flags))?;

    Ok(RunConfig::from_value(value)?)
}

fn mapping_tables() -> Value {
    let tables: Map<String, Value> = MappingId::ALL
        .iter()
        .map(|id| {
            let table = mapping(*id);
            let options: Vec<Value> = table
                .entries
                .iter()
                .map(|(label, code)| json!({ "label": label, "code": code }))
                .collect();
            (
                id.to_string(),
                json!({ "default": table.default_code, "options": options }),
            )
        })
        .collect();
    Value::Object(tables)
}

async fn run(args: Args) -> Result<u8> {
    if args.list_mappings {
        println!("{}", serde_json::to_string_pretty(&mapping_tables())?);
        return Ok(0);
    }

    let config = build_config(&args).context("Invalid run configuration")?;
    info!(target_url = %config.target_url, headless = config.headless, "Starting run");

    let report = run_order(&config).await;
    Ok(emit_report(&report, args.output.as_deref()))
}

/// Print the report, then copy it to `output`. The exit status always
/// reflects the run, even when the copy cannot be written.
fn emit_report(report: &RunReport, output: Option<&Path>) -> u8 {
    let json = match serde_json::to_string_pretty(report) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize report: {}", e);
            return report.exit_code() as u8;
        }
    };
    println!("{json}");

    if let Some(path) = output {
        if let Err(e) = std::fs::write(path, &json) {
            error!("Failed to write report to {}: {}", path.display(), e);
        }
    }
    report.exit_code() as u8
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    init_logging();

    let args = Args::parse();
    match run(args).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {e:#}");
            ExitCode::from(EXIT_USAGE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appraisal_order::report::RunRecord;
    use appraisal_order::{ExtractionError, SessionError};

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("appraisal-order").chain(argv.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_flags_override_file_and_vars() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.yaml");
        std::fs::write(
            &path,
            "target_url: https://a.example.com\nzip: '07751'\nheadless: true\n",
        )
        .unwrap();

        let args = parse(&[
            "--config",
            path.to_str().unwrap(),
            "--vars",
            r#"{"zip": "08701", "borrower": "Jane Doe"}"#,
            "--target-url",
            "https://b.example.com",
            "--headless",
            "false",
        ]);
        let config = build_config(&args).unwrap();

        assert_eq!(config.target_url, "https://b.example.com");
        assert!(!config.headless);
        assert_eq!(config.value_for(&["zip"]).as_deref(), Some("08701"));
        assert_eq!(config.value_for(&["borrower"]).as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn test_bare_headless_flag() {
        let args = parse(&["--target-url", "https://a.example.com", "--headless"]);
        assert_eq!(args.headless, Some(true));
    }

    #[test]
    fn test_invalid_vars_is_an_error() {
        let args = parse(&["--target-url", "https://a.example.com", "--vars", "{zip"]);
        assert!(build_config(&args).is_err());
    }

    fn finished(error: Option<SessionError>) -> RunReport {
        let mut record = RunRecord::new();
        record.fee = Some(Err(ExtractionError::NoStrategyMatched));
        record.session_error = error;
        record.finish()
    }

    #[test]
    fn test_unwritable_output_keeps_run_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("missing/dir/report.json");

        let failed = finished(Some(SessionError::Launch("no browser".into())));
        assert_eq!(emit_report(&failed, Some(&bad)), 1);

        let partial = finished(None);
        assert_eq!(emit_report(&partial, Some(&bad)), 0);
        assert!(!bad.exists());
    }

    #[test]
    fn test_report_written_to_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        assert_eq!(emit_report(&finished(None), Some(&path)), 0);

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["status"], "partial");
    }

    #[test]
    fn test_mapping_tables_cover_every_field() {
        let tables = mapping_tables();
        for id in MappingId::ALL {
            assert!(tables[id.as_str()]["options"].is_array(), "{id}");
        }
        assert_eq!(tables["transaction_type"]["default"], "1");
    }
}
