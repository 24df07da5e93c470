//! HTTP request handlers

use axum::{
    extract::{Form, State},
    response::Html,
    Json,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{ColumnKind, Schema};
use crate::pipeline::{PipelineReport, TrainingPipeline};
use crate::prediction::{FieldValue, PredictionOutcome, Record};
use crate::transformation::EncoderSet;

use super::error::{Result, ServerError};
use super::state::AppState;

// ============================================================================
// Prediction Handlers
// ============================================================================

/// Prediction from the HTML form; always renders a page
pub async fn predict_form(
    State(state): State<Arc<AppState>>,
    Form(fields): Form<HashMap<String, String>>,
) -> Result<Html<String>> {
    let record = record_from_form(state.manager.schema(), fields);
    let outcome = predict_blocking(&state, record).await?;
    Ok(Html(render_outcome(&outcome)))
}

/// Prediction from a JSON record
pub async fn predict_json(
    State(state): State<Arc<AppState>>,
    Json(record): Json<Record>,
) -> Result<Json<PredictionOutcome>> {
    let outcome = predict_blocking(&state, record).await?;
    Ok(Json(outcome))
}

/// Typed record from raw form fields, each parsed as its declared kind
pub fn record_from_form(schema: &Schema, fields: HashMap<String, String>) -> Record {
    fields
        .into_iter()
        .map(|(name, raw)| {
            let value = FieldValue::parse_as(&raw, schema.kind_of(&name));
            (name, value)
        })
        .collect()
}

async fn predict_blocking(state: &Arc<AppState>, record: Record) -> Result<PredictionOutcome> {
    let state = Arc::clone(state);
    let outcome = tokio::task::spawn_blocking(move || state.predictor.predict(&record)).await?;
    if !outcome.success {
        warn!(state = ?outcome.state, message = %outcome.message, "prediction request failed");
    }
    Ok(outcome)
}

// ============================================================================
// Training Handlers
// ============================================================================

/// Run the offline pipeline and report the winner as JSON
pub async fn start_training(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>> {
    let report = run_training(&state).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "model": report.training.alias,
        "family": report.training.family,
        "best_recall": report.training.best_recall,
        "trials": report.training.trials.len(),
        "transformation": report.transformation,
        "evaluation": report.evaluation,
    })))
}

/// Run the offline pipeline from the browser
pub async fn train_page(State(state): State<Arc<AppState>>) -> Html<String> {
    match run_training(&state).await {
        Ok(report) => Html(render_message(&format!(
            "Training successful. Best model: {} (recall {:.4})",
            report.training.alias, report.training.best_recall
        ))),
        Err(e) => Html(render_message(&format!("Training failed: {}", e))),
    }
}

async fn run_training(state: &Arc<AppState>) -> Result<PipelineReport> {
    let _running = state
        .training
        .try_lock()
        .map_err(|_| ServerError::Conflict("a training run is already in progress".to_string()))?;

    info!("Training requested over HTTP");
    let worker = Arc::clone(state);
    let report = tokio::task::spawn_blocking(move || {
        let mut pipeline =
            TrainingPipeline::new(worker.manager.clone()).with_registry(worker.registry.clone());
        if let Some(tracker) = &worker.tracker {
            pipeline = pipeline.with_tracker(Arc::clone(tracker));
        }
        pipeline.run()
    })
    .await?
    .map_err(|e| ServerError::Training(e.to_string()))?;
    Ok(report)
}

// ============================================================================
// System Handlers
// ============================================================================

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "model_available": state.predictor.config().model_path.exists(),
    }))
}

// ============================================================================
// UI Handlers
// ============================================================================

pub async fn serve_index(State(state): State<Arc<AppState>>) -> Html<String> {
    let encoders = EncoderSet::load(&state.predictor.config().encoder_file).ok();
    Html(render_index(state.manager.schema(), encoders.as_ref()))
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Form with one input per feature column. Categorical columns become
/// drop-downs when the fitted encoders are available.
pub fn render_index(schema: &Schema, encoders: Option<&EncoderSet>) -> String {
    let mut fields = String::new();
    for (name, kind) in schema.features() {
        let label = escape_html(name);
        let classes = encoders.and_then(|e| e.get(name)).map(|enc| enc.classes());
        let input = match (kind, classes) {
            (ColumnKind::Categorical, Some(classes)) => {
                let options: String = classes
                    .iter()
                    .map(|c| format!("<option value=\"{0}\">{0}</option>", escape_html(c)))
                    .collect();
                format!("<select name=\"{}\" required>{}</select>", label, options)
            }
            (ColumnKind::Integer, _) => {
                format!("<input type=\"number\" step=\"1\" name=\"{}\" required>", label)
            }
            (ColumnKind::Float, _) => {
                format!("<input type=\"number\" step=\"any\" name=\"{}\" required>", label)
            }
            (ColumnKind::Boolean, _) => format!(
                "<select name=\"{}\" required><option>true</option><option>false</option></select>",
                label
            ),
            (ColumnKind::Categorical, None) => {
                format!("<input type=\"text\" name=\"{}\" required>", label)
            }
        };
        fields.push_str(&format!(
            "      <label>{}<br>{}</label><br>\n",
            label, input
        ));
    }
    INDEX_TEMPLATE.replace("{fields}", &fields)
}

pub fn render_outcome(outcome: &PredictionOutcome) -> String {
    if !outcome.success {
        return render_message(&outcome.message);
    }
    let verdict = match outcome.churn {
        Some(true) => "The customer is likely to churn.",
        Some(false) => "The customer is likely to stay.",
        None => "No verdict.",
    };
    let label = outcome.label.as_deref().unwrap_or("-");
    PAGE_TEMPLATE
        .replace("{title}", "Prediction")
        .replace(
            "{body}",
            &format!(
                "<p>{}</p>\n    <p>Predicted label: <strong>{}</strong></p>",
                verdict,
                escape_html(label)
            ),
        )
}

pub fn render_message(message: &str) -> String {
    let body: String = message
        .lines()
        .map(|line| format!("<p>{}</p>", escape_html(line)))
        .collect::<Vec<_>>()
        .join("\n    ");
    PAGE_TEMPLATE.replace("{title}", "Message").replace("{body}", &body)
}

const INDEX_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Customer Churn Prediction</title>
</head>
<body>
    <h1>Customer Churn Prediction</h1>
    <form action="/predict" method="post">
{fields}      <button type="submit">Predict</button>
    </form>
    <p><a href="/train">Train the model</a></p>
</body>
</html>
"#;

const PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>{title}</title>
</head>
<body>
    {body}
    <p><a href="/">Back</a></p>
</body>
</html>
"#;
