//! Churn pipeline CLI
//!
//! Runs the offline pipeline (whole or one stage), scores a single record
//! and starts the web server.

use clap::{Args, Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::{ConfigurationManager, Schema, CONFIG_FILE_PATH, PARAMS_FILE_PATH, SCHEMA_FILE_PATH};
use crate::pipeline::{StageName, StageReport, TrainingPipeline};
use crate::prediction::{FieldValue, ModelPredictor, PredictionOutcome, Record};

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }
fn bad(s: &str) -> ColoredString    { s.truecolor(230, 100, 100) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }
fn line_box_sep()    { println!("  {}", dim("├─────────────────────────────────────────────────────────┤")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn line_box_center(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let total_pad = W.saturating_sub(visible_len);
    let left = total_pad / 2;
    let right = total_pad - left;
    println!("  {}  {}{}{} {}", dim("│"), " ".repeat(left), content, " ".repeat(right), dim("│"));
}

fn line_box_empty() { line_box(""); }

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

fn row(key: &str, val: String) {
    println!("  {:<18} {}", muted(key), val.white());
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "churn")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Customer churn training pipeline and prediction server")]
#[command(long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub documents: DocumentArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Locations of the three configuration documents
#[derive(Args, Debug, Clone)]
pub struct DocumentArgs {
    /// Pipeline config (artifact paths)
    #[arg(long, global = true, default_value = CONFIG_FILE_PATH)]
    pub config: PathBuf,

    /// Params document (split, balancing, model grids)
    #[arg(long, global = true, default_value = PARAMS_FILE_PATH)]
    pub params: PathBuf,

    /// Column schema
    #[arg(long, global = true, default_value = SCHEMA_FILE_PATH)]
    pub schema: PathBuf,
}

impl DocumentArgs {
    pub fn load(&self) -> anyhow::Result<ConfigurationManager> {
        Ok(ConfigurationManager::new(&self.config, &self.params, &self.schema)?)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run every offline stage in order
    Run,

    /// Run a single offline stage against the artifacts on disk
    Stage {
        /// ingestion, validation, transformation, training or evaluation
        name: StageName,
    },

    /// Score one customer record
    Predict {
        /// JSON file holding the record
        #[arg(short, long)]
        record: Option<PathBuf>,

        /// Field as key=value; repeatable, overrides the file
        #[arg(short, long = "field", value_name = "KEY=VALUE")]
        fields: Vec<String>,
    },

    /// Start the web server
    Serve {
        /// Server port
        #[arg(short, long, default_value = "8080")]
        port: u16,

        /// Server host
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
    },
}

// ─── Record input ──────────────────────────────────────────────────────────────

/// Split `key=value`; the value may itself contain `=`.
pub fn parse_field(raw: &str) -> anyhow::Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => anyhow::bail!("expected KEY=VALUE, got '{}'", raw),
    }
}

/// Record from an optional JSON file plus `key=value` overrides parsed by
/// the schema's declared kinds.
pub fn build_record(schema: &Schema, file: Option<&Path>, fields: &[String]) -> anyhow::Result<Record> {
    let mut record = match file {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str::<Record>(&content)?
        }
        None => Record::new(),
    };
    for raw in fields {
        let (key, value) = parse_field(raw)?;
        let parsed = FieldValue::parse_as(&value, schema.kind_of(&key));
        record.insert(key, parsed);
    }
    if record.is_empty() {
        anyhow::bail!("no record given; use --record <file> or --field KEY=VALUE");
    }
    Ok(record)
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_run(documents: &DocumentArgs) -> anyhow::Result<()> {
    section("Run pipeline");
    let start = Instant::now();
    let mut pipeline = TrainingPipeline::new(documents.load()?);
    let report = pipeline.run()?;

    let t = &report.transformation;
    row("Rows", format!("{} ({} duplicates removed)", t.input_rows, t.duplicates_removed));
    row("Train / test", format!("{} / {}", t.train_rows, t.test_rows));
    row("Trials", report.training.trials.len().to_string());
    row("Best model", format!("{} ({})", report.training.alias, report.training.family));
    row("Recall", format!("{:.4}", report.evaluation.recall));
    row("Accuracy", format!("{:.4}", report.evaluation.accuracy));
    row("ROC AUC", format!("{:.4}", report.evaluation.roc_auc));
    row("Time", format!("{:.2?}", start.elapsed()));
    println!();
    Ok(())
}

pub fn cmd_stage(documents: &DocumentArgs, stage: StageName) -> anyhow::Result<()> {
    section(&format!("Stage {}", stage.title()));
    let start = Instant::now();
    let mut pipeline = TrainingPipeline::new(documents.load()?);
    match pipeline.run_stage(stage)? {
        StageReport::Ingestion(outcome) => row("Dataset", format!("{:?}", outcome)),
        StageReport::Validation { passed, message } => {
            row("Passed", if passed { ok("yes").to_string() } else { bad("no").to_string() });
            for line in message.lines() {
                println!("  {}", dim(line));
            }
        }
        StageReport::Transformation(t) => {
            row("Train / test", format!("{} / {}", t.train_rows, t.test_rows));
            row("Balancing", serde_json::to_string(&t.balance)?);
        }
        StageReport::Training(t) => {
            row("Trials", t.trials.len().to_string());
            row("Best model", format!("{} ({})", t.alias, t.family));
            row("Recall", format!("{:.4}", t.best_recall));
            row("Saved to", t.model_path.display().to_string());
        }
        StageReport::Evaluation(e) => {
            row("Accuracy", format!("{:.4}", e.accuracy));
            row("Precision", format!("{:.4}", e.precision));
            row("Recall", format!("{:.4}", e.recall));
            row("F-beta", format!("{:.4}", e.fbeta));
            row("ROC AUC", format!("{:.4}", e.roc_auc));
            row("AUC area", format!("{:.4}", e.auc_area));
        }
    }
    row("Time", format!("{:.2?}", start.elapsed()));
    println!();
    Ok(())
}

pub fn cmd_predict(
    documents: &DocumentArgs,
    record_file: Option<&Path>,
    fields: &[String],
) -> anyhow::Result<PredictionOutcome> {
    section("Predict");
    let manager = documents.load()?;
    let record = build_record(manager.schema(), record_file, fields)?;
    let predictor = ModelPredictor::new(manager.model_prediction_config()?);
    let outcome = predictor.predict(&record);

    if outcome.success {
        let verdict = match outcome.churn {
            Some(true) => bad("likely to churn"),
            _ => ok("likely to stay"),
        };
        row("Verdict", verdict.to_string());
        row("Label", outcome.label.clone().unwrap_or_else(|| "-".to_string()));
    } else {
        row("Failed", bad(&format!("{:?}", outcome.state)).to_string());
        for line in outcome.message.lines() {
            println!("  {}", dim(line));
        }
    }
    println!();
    Ok(outcome)
}

pub async fn cmd_serve(documents: &DocumentArgs, host: &str, port: u16) -> anyhow::Result<()> {
    use crate::server::{run_server, AppState, ServerConfig};

    let state = AppState::new(documents.load()?)?;

    println!();
    line_box_top();
    line_box_empty();
    line_box_center(&format!("{}", "Churn Prediction".white().bold()));
    line_box_center(&format!("{}", dim(&format!("v{}", env!("CARGO_PKG_VERSION")))));
    line_box_empty();
    line_box_sep();
    line_box_empty();
    line_box(&kv("Form   ", &format!("http://{}:{}", host, port)));
    line_box(&kv("API    ", &format!("http://{}:{}/api", host, port)));
    line_box(&kv("Health ", &format!("http://{}:{}/api/health", host, port)));
    line_box_empty();
    line_box_sep();
    line_box_empty();
    line_box_center(&format!("{}", dim("ctrl+c to stop")));
    line_box_empty();
    line_box_bottom();
    println!();

    let config = ServerConfig {
        host: host.to_string(),
        port,
    };
    run_server(config, state).await
}
