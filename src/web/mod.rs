// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Web UI for uploading, configuring and viewing comparisons

use axum::{
    extract::{DefaultBodyLimit, Form, Multipart, Path, State},
    http::StatusCode,
    response::{Html, Json, Redirect},
    routing::{get, post},
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::client::{AnalysisClient, AnalysisService};
use crate::config::AppConfig;
use crate::options::{AnalysisConfig, OptionKey, OptionValue, Preset, Sensitivity};
use crate::render::ResultView;
use crate::session::{Event, Session, SessionSnapshot, Transition};
use crate::upload::{decode_upload, Slot, SlotState};
use crate::FrameShiftError;

/// Shared application state
pub struct AppState {
    pub session: Mutex<Session>,
    pub service: Arc<dyn AnalysisService>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(config: AppConfig, service: Arc<dyn AnalysisService>) -> Self {
        Self {
            session: Mutex::new(Session::new(config.analysis)),
            service,
            config,
        }
    }
}

type HandlerResult = std::result::Result<Redirect, (StatusCode, String)>;

fn bad_request(e: FrameShiftError) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, e.to_string())
}

/// Create the web application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.web.max_upload_bytes;

    Router::new()
        // Pages
        .route("/", get(index_page))
        // Form actions
        .route("/upload/:slot", post(upload_image))
        .route("/config", post(update_config))
        .route("/preset/:name", post(apply_preset))
        .route("/analyze", post(analyze))
        .route("/reset", post(reset))
        // API endpoints
        .route("/api/state", get(api_state))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// === Page Handlers ===

async fn index_page(State(state): State<Arc<AppState>>) -> Html<String> {
    let session = state.session.lock().await;
    Html(render_index(&session))
}

// === Form Handlers ===

async fn upload_image(
    State(state): State<Arc<AppState>>,
    Path(slot): Path<String>,
    mut multipart: Multipart,
) -> HandlerResult {
    let slot: Slot = slot.parse().map_err(bad_request)?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field
            .file_name()
            .filter(|n| !n.is_empty())
            .unwrap_or(slot.field_name())
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
        upload = Some((file_name, bytes.to_vec()));
    }

    let (file_name, bytes) = upload
        .filter(|(_, b)| !b.is_empty())
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "No file selected".to_string()))?;

    // Decode before taking the lock so a slow decode never blocks the page.
    let event = match decode_upload(slot, file_name.clone(), bytes, state.config.preview.max_dimension).await {
        Ok(image) => Event::ImageSelected(slot, image),
        Err(e) => Event::ImageFailed {
            slot,
            file_name,
            reason: e.to_string(),
        },
    };

    state.session.lock().await.apply(event);
    Ok(Redirect::to("/"))
}

/// Checkboxes are only submitted when ticked, so a missing toggle is false.
fn config_from_form(form: &HashMap<String, String>, current: &AnalysisConfig) -> crate::Result<AnalysisConfig> {
    let mut config = *current;
    for key in OptionKey::ALL {
        let value = if key.is_toggle() {
            OptionValue::Bool(form.contains_key(key.as_str()))
        } else {
            match form.get(key.as_str()) {
                Some(raw) => OptionValue::parse_for(key, raw)?,
                None => continue,
            }
        };
        config = config.set_option(key, value)?;
    }
    Ok(config)
}

async fn update_config(
    State(state): State<Arc<AppState>>,
    Form(form): Form<HashMap<String, String>>,
) -> HandlerResult {
    let mut session = state.session.lock().await;
    let config = config_from_form(&form, session.config()).map_err(bad_request)?;
    session.apply(Event::ReplaceConfig(config));
    Ok(Redirect::to("/"))
}

async fn apply_preset(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> HandlerResult {
    let preset = <Preset as clap::ValueEnum>::from_str(&name, true)
        .map_err(|_| (StatusCode::NOT_FOUND, format!("Unknown preset: {}", name)))?;

    let mut session = state.session.lock().await;
    let config = preset.apply(session.config());
    session.apply(Event::ReplaceConfig(config));
    Ok(Redirect::to("/"))
}

async fn analyze(State(state): State<Arc<AppState>>) -> Redirect {
    let transition = state.session.lock().await.apply(Event::Submit);

    let ticket = match transition {
        Transition::Dispatch(ticket) => ticket,
        Transition::Rejected(e) => {
            warn!("Analyze refused: {}", e);
            return Redirect::to("/");
        }
        other => {
            warn!("Unexpected transition on submit: {:?}", other);
            return Redirect::to("/");
        }
    };

    // Runs detached so a dropped connection cannot leave the session loading.
    let task_state = state.clone();
    let request_id = ticket.request_id;
    let handle = tokio::spawn(async move {
        let outcome = ticket.execute(task_state.service.as_ref()).await;
        task_state
            .session
            .lock()
            .await
            .apply(Event::Completed { request_id, outcome })
    });

    match handle.await {
        Ok(Transition::Succeeded) => info!("Analysis #{} rendered", request_id),
        Ok(Transition::Failed(e)) => warn!("Analysis #{} failed: {}", request_id, e),
        Ok(other) => warn!("Analysis #{} finished as {:?}", request_id, other),
        Err(e) => {
            error!("Analysis task #{} aborted: {}", request_id, e);
            state.session.lock().await.apply(Event::Completed {
                request_id,
                outcome: Err(FrameShiftError::Task(e.to_string())),
            });
        }
    }

    Redirect::to("/")
}

async fn reset(State(state): State<Arc<AppState>>) -> Redirect {
    state.session.lock().await.apply(Event::Reset);
    Redirect::to("/")
}

// === API Handlers ===

async fn api_state(State(state): State<Arc<AppState>>) -> Json<SessionSnapshot> {
    Json(state.session.lock().await.snapshot())
}

// === Template Rendering ===

// Pages are built with format!, so every user-supplied string goes through here.
fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn base_template(title: &str, content: &str) -> String {
    format!(r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{} - FrameShift</title>
    <style>
        :root {{
            --bg-primary: #eef2ff;
            --bg-card: #ffffff;
            --text-primary: #111827;
            --text-secondary: #6b7280;
            --accent: #2563eb;
            --success: #16a34a;
            --danger: #dc2626;
            --border: #d1d5db;
        }}
        * {{ box-sizing: border-box; margin: 0; padding: 0; }}
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: var(--bg-primary);
            color: var(--text-primary);
            line-height: 1.6;
        }}
        header {{ background: var(--bg-card); padding: 20px; box-shadow: 0 1px 4px rgba(0,0,0,0.1); }}
        header h1 {{ font-size: 1.8em; }}
        header p {{ color: var(--text-secondary); }}
        .container {{ max-width: 1280px; margin: 0 auto; padding: 20px; }}
        .layout {{ display: grid; grid-template-columns: 2fr 1fr; gap: 20px; }}
        .card {{ background: var(--bg-card); border-radius: 12px; padding: 20px; margin-bottom: 20px; }}
        .card h2 {{ margin-bottom: 15px; }}
        .slots {{ display: grid; grid-template-columns: 1fr 1fr; gap: 15px; }}
        .slot {{ border: 2px dashed var(--border); border-radius: 8px; padding: 12px; }}
        .slot img {{ width: 100%; max-height: 200px; object-fit: cover; border-radius: 4px; }}
        .ok {{ color: var(--success); }}
        .error {{ background: #fef2f2; border: 1px solid #fecaca; color: var(--danger); padding: 12px; border-radius: 8px; margin-bottom: 20px; }}
        .metrics {{ display: grid; grid-template-columns: 1fr 1fr; gap: 15px; margin-bottom: 20px; }}
        .metric {{ background: var(--bg-primary); border-radius: 8px; padding: 15px; }}
        .metric .number {{ font-size: 2em; font-weight: bold; color: var(--accent); }}
        .artifacts {{ display: grid; grid-template-columns: 1fr 1fr; gap: 15px; }}
        .artifacts img {{ width: 100%; border: 1px solid var(--border); border-radius: 8px; }}
        .change {{ background: var(--bg-primary); border-radius: 4px; padding: 8px; margin: 4px 0; }}
        .change .rank {{ color: var(--accent); font-weight: bold; margin-right: 10px; }}
        .toggle {{ display: block; padding: 8px 0; }}
        .toggle small {{ display: block; color: var(--text-secondary); margin-left: 24px; }}
        button {{ padding: 8px 14px; border-radius: 8px; border: none; background: var(--accent); color: white; cursor: pointer; }}
        button:disabled {{ background: var(--border); cursor: not-allowed; }}
        .analyze {{ width: 100%; padding: 14px; font-size: 1.1em; }}
    </style>
</head>
<body>
    <header>
        <h1>FrameShift</h1>
        <p>Visual Comparison Engine for Time-Series Images</p>
    </header>
    <main class="container">
        {}
    </main>
</body>
</html>"#, escape_html(title), content)
}

fn render_slot(slot: Slot, state: &SlotState) -> String {
    let body = match state {
        SlotState::Empty => format!("<p>Upload {}</p>", slot.label()),
        SlotState::Ready(img) => format!(
            r#"<img src="{}" alt="Preview {}">
            <p class="ok">✓ {} loaded ({}x{})</p>"#,
            img.preview,
            slot,
            escape_html(&img.file_name),
            img.width,
            img.height
        ),
        SlotState::DecodeFailed { file_name, reason } => format!(
            r#"<p class="error">Could not read {}: {}</p>"#,
            escape_html(file_name),
            escape_html(reason)
        ),
    };

    format!(r#"
        <div class="slot">
            {}
            <form method="post" action="/upload/{}" enctype="multipart/form-data">
                <input type="file" name="file" accept="image/*" required>
                <button type="submit">Upload</button>
            </form>
        </div>
    "#, body, slot)
}

fn render_results(view: &ResultView<'_>) -> String {
    let mut metrics = String::new();
    if let Some(count) = view.changes_count {
        metrics.push_str(&format!(
            r#"<div class="metric"><p>Changes Detected</p><p class="number">{}</p></div>"#,
            count
        ));
    }
    if let Some(ssim) = view.ssim_display() {
        metrics.push_str(&format!(
            r#"<div class="metric"><p>SSIM Score</p><p class="number">{}</p></div>"#,
            ssim
        ));
    }

    let artifacts: String = view.artifacts.iter()
        .map(|a| format!(
            r#"<div><p>{}</p><img src="{}" alt="{}"></div>"#,
            a.title,
            escape_html(&a.data_uri()),
            a.title
        ))
        .collect();

    let changes = if view.top_changes.is_empty() {
        String::new()
    } else {
        let rows: String = view.top_changes.iter()
            .map(|row| {
                let size = row.size
                    .map(|(w, h)| format!(" • {}x{}", w, h))
                    .unwrap_or_default();
                format!(
                    r#"<div class="change"><span class="rank">#{}</span>{}{}</div>"#,
                    row.rank,
                    row.summary(),
                    size
                )
            })
            .collect();
        format!("<h3>Top Changes:</h3>{}", rows)
    };

    format!(r#"
        <div class="card">
            <h2>Analysis Results</h2>
            <div class="metrics">{}</div>
            <div class="artifacts">{}</div>
            {}
        </div>
    "#, metrics, artifacts, changes)
}

fn render_config(config: &AnalysisConfig) -> String {
    let toggles: String = OptionKey::ALL.iter()
        .filter(|k| k.is_toggle())
        .map(|key| {
            let checked = matches!(config.get(*key), OptionValue::Bool(true));
            format!(
                r#"<label class="toggle"><input type="checkbox" name="{}"{}> {}<small>{}</small></label>"#,
                key.as_str(),
                if checked { " checked" } else { "" },
                key.label(),
                key.description()
            )
        })
        .collect();

    let presets: String = [Preset::TireWear, Preset::DifferentPov, Preset::Broadcast].iter()
        .filter_map(|p| clap::ValueEnum::to_possible_value(p).map(|v| (p, v)))
        .map(|(p, v)| format!(
            r#"<form method="post" action="/preset/{}" style="display:inline"><button type="submit">{}</button></form> "#,
            v.get_name(),
            p.title()
        ))
        .collect();

    format!(r#"
        <div class="card">
            <h2>Configuration</h2>
            <form method="post" action="/config">
                {}
                <label class="toggle">Sensitivity: {}
                    <input type="range" name="sensitivity" min="{}" max="{}" step="{}" value="{}">
                    <small>More sensitive ← → Less sensitive</small>
                </label>
                <button type="submit">Apply</button>
            </form>
        </div>
        <div class="card">
            <h2>Quick Guide</h2>
            {}
        </div>
    "#,
        toggles,
        config.sensitivity,
        Sensitivity::MIN,
        Sensitivity::MAX,
        Sensitivity::STEP,
        config.sensitivity,
        presets,
    )
}

fn render_index(session: &Session) -> String {
    let error = session.error()
        .map(|e| format!(r#"<div class="error">{}</div>"#, escape_html(e)))
        .unwrap_or_default();

    let slots: String = Slot::BOTH.iter()
        .map(|s| render_slot(*s, session.slot(*s)))
        .collect();

    let results = session.result()
        .map(|done| render_results(&ResultView::new(&done.result)))
        .unwrap_or_default();

    let button = if session.is_loading() {
        r#"<button class="analyze" disabled>Analyzing...</button>"#
    } else if session.can_submit() {
        r#"<button class="analyze" type="submit">Analyze Images</button>"#
    } else {
        r#"<button class="analyze" disabled>Analyze Images</button>"#
    };

    let content = format!(r#"
        {}
        <div class="layout">
            <div>
                <div class="card">
                    <h2>Upload Images</h2>
                    <div class="slots">{}</div>
                </div>
                {}
            </div>
            <div>
                {}
                <form method="post" action="/analyze">{}</form>
                <form method="post" action="/reset" style="margin-top:10px"><button type="submit">Start Over</button></form>
            </div>
        </div>
    "#, error, slots, results, render_config(session.config()), button);

    base_template("Compare", &content)
}

/// Start the web server with config and the analysis service it should call
pub async fn start_server(config: AppConfig) -> crate::Result<()> {
    let endpoint = config.service.endpoint_url()?;
    info!("Analysis endpoint: {}", endpoint);
    let service: Arc<dyn AnalysisService> = Arc::new(AnalysisClient::new(endpoint)?);

    let addr = format!("{}:{}", config.web.host, config.web.port);
    let state = Arc::new(AppState::new(config, service));
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Web UI available at http://{}", addr);

    let router = create_router(state);
    axum::serve(listener, router).await
        .map_err(|e| FrameShiftError::Config(format!("Server error: {}", e)))?;

    Ok(())
}
