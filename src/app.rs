#![cfg(feature = "web")]

use axum::{
    Form, Json, Router,
    body::Body,
    extract::State,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use handlebars::Handlebars;
use log::{error, info};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::Mutex as SessionLock;
use tower_http::services::ServeDir;
use uuid::Uuid;

use crate::config::Args;
use crate::form::{Choice, FieldInput};
use crate::reconcile::{Extras, SampleReconciler};
use crate::report::PdfReport;
use crate::schema::{self, FORM_SCHEMA, FieldKind, IDENTIFIER_LABEL};
use crate::session::{LookupState, SessionContext};
use crate::store::SharedStore;

const SESSION_COOKIE: &str = "session";

#[derive(Clone, Debug, Serialize)]
pub struct Notice {
    pub kind: &'static str,
    pub text: String,
}

impl Notice {
    fn success(text: String) -> Self {
        Notice { kind: "success", text }
    }

    fn warning(text: String) -> Self {
        Notice { kind: "warning", text }
    }

    fn error(text: String) -> Self {
        Notice { kind: "error", text }
    }
}

/// Session plus the messages waiting to be shown on the next render.
#[derive(Default)]
pub struct WebSession {
    pub ctx: SessionContext,
    pub notices: Vec<Notice>,
}

/// One user's session. Requests on the same cookie queue on this lock.
type SessionHandle = Arc<SessionLock<WebSession>>;

pub struct AppState {
    engine: SampleReconciler<SharedStore>,
    renderer: PdfReport,
    sessions: Mutex<HashMap<String, SessionHandle>>,
    templates: Handlebars<'static>,
}

impl AppState {
    pub fn new(store: SharedStore, sheet: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let mut templates = Handlebars::new();
        templates.register_template_string("form", include_str!("./static/form.hbs"))?;
        Ok(AppState {
            engine: SampleReconciler::new(store, sheet),
            renderer: PdfReport::default(),
            sessions: Mutex::new(HashMap::new()),
            templates,
        })
    }

    /// The session for `id`, created on first use. The map lock is only held
    /// for the lookup, never across store calls.
    fn session(&self, id: &str) -> SessionHandle {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(id.to_string())
            .or_default()
            .clone()
    }
}

pub fn router(state: Arc<AppState>, static_dir: &std::path::Path) -> Router {
    Router::new()
        .route("/", get(serve_form))
        .route("/lookup", post(handle_lookup))
        .route("/submit", post(handle_submit))
        .route("/reset", post(handle_reset))
        .route("/report.pdf", get(download_report))
        .route("/api/session", get(session_summary))
        .nest_service("/static", ServeDir::new(static_dir))
        .with_state(state)
}

pub async fn run(args: Args, store: SharedStore) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState::new(store, &args.sheet_name)?);
    let app = router(state, &args.static_dir);

    let listener = TcpListener::bind(args.listen).await?;
    info!("Listening on http://{}", args.listen);
    axum::serve(listener, app).await?;

    Ok(())
}

fn session_id(jar: CookieJar) -> (CookieJar, String) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        let id = cookie.value().to_string();
        return (jar, id);
    }
    let id = Uuid::new_v4().to_string();
    let cookie = Cookie::build((SESSION_COOKIE, id.clone()))
        .path("/")
        .http_only(true);
    (jar.add(cookie), id)
}

/// Run `f` against the caller's session on the blocking pool, holding the
/// session lock until it returns.
async fn with_session<T, F>(state: Arc<AppState>, id: &str, f: F) -> Result<T, StatusCode>
where
    T: Send + 'static,
    F: FnOnce(&AppState, &mut WebSession) -> T + Send + 'static,
{
    let mut session = state.session(id).lock_owned().await;
    let worker_state = state.clone();
    tokio::task::spawn_blocking(move || f(&worker_state, &mut *session))
        .await
        .map_err(|e| {
            error!("session task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

/// Form inputs are named `f<index>` after the field's position in the schema.
fn field_key(index: usize) -> String {
    format!("f{}", index)
}

fn identifier_key() -> String {
    let index = schema::fields()
        .position(|def| def.label == IDENTIFIER_LABEL)
        .unwrap_or_default();
    field_key(index)
}

/// Copy posted values into the form. Yes/no fields missing from the post
/// (neither box ticked) become unset.
fn apply_posted(session: &mut SessionContext, posted: &HashMap<String, String>, with_identifier: bool) {
    for (index, def) in schema::fields().enumerate() {
        if def.label == IDENTIFIER_LABEL && !with_identifier {
            continue;
        }
        let value = posted.get(&field_key(index));
        match def.kind() {
            FieldKind::Text => {
                if let Some(value) = value {
                    session.form_mut().set_text(def.label, value);
                }
            }
            FieldKind::Flag => {
                let choice = value.map_or(Choice::Unset, |v| Choice::from_form(v));
                session.form_mut().set_choice(def.label, choice);
            }
        }
    }
}

fn page_context(session: &WebSession) -> serde_json::Value {
    let form = session.ctx.form();
    let mut index = 0;
    let sections: Vec<serde_json::Value> = FORM_SCHEMA
        .iter()
        .map(|section| {
            let fields: Vec<serde_json::Value> = section
                .fields
                .iter()
                .map(|def| {
                    let key = field_key(index);
                    index += 1;
                    match form.input(def.label) {
                        Some(FieldInput::Choice(choice)) => json!({
                            "key": key,
                            "label": def.label,
                            "flag": true,
                            "yes": *choice == Choice::Yes,
                            "no": *choice == Choice::No,
                        }),
                        Some(FieldInput::Text(text)) => json!({
                            "key": key,
                            "label": def.label,
                            "flag": false,
                            "value": text,
                            "identifier": def.label == IDENTIFIER_LABEL,
                        }),
                        None => json!({ "key": key, "label": def.label, "flag": false, "value": "" }),
                    }
                })
                .collect();
            json!({ "title": section.title, "fields": fields })
        })
        .collect();

    let status = match session.ctx.state() {
        LookupState::Empty => None,
        LookupState::New => Some("Nova amostra: será criado um novo registro.".to_string()),
        LookupState::Loaded { row, .. } => Some(format!("Amostra carregada da linha {}.", row)),
        LookupState::Error { message } => Some(format!("Falha ao consultar a planilha: {}", message)),
    };

    json!({
        "sections": sections,
        "identifier_key": identifier_key(),
        "status": status,
        "notices": session.notices,
        "report": session.ctx.report().map(|r| r.file_name.clone()),
    })
}

async fn serve_form(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let (jar, id) = session_id(jar);
    let handle = state.session(&id);
    let mut session = handle.lock().await;
    let rendered = state.templates.render("form", &page_context(&session));
    session.notices.clear();
    drop(session);

    match rendered {
        Ok(html) => (jar, Html(html)).into_response(),
        Err(e) => {
            error!("template error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "template error").into_response()
        }
    }
}

async fn handle_lookup(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(posted): Form<HashMap<String, String>>,
) -> Response {
    let (jar, id) = session_id(jar);
    let identifier = posted.get(&identifier_key()).cloned().unwrap_or_default();
    let result = with_session(state, &id, move |app, session| {
        apply_posted(&mut session.ctx, &posted, false);
        let state = session.ctx.edit_identifier(&app.engine, &identifier).clone();
        if let LookupState::Loaded { match_count, .. } = state {
            if match_count > 1 {
                session.notices.push(Notice::warning(format!(
                    "A amostra {} aparece em {} linhas; usando a última.",
                    identifier.trim(),
                    match_count
                )));
            }
        }
    })
    .await;

    match result {
        Ok(()) => (jar, Redirect::to("/")).into_response(),
        Err(status) => status.into_response(),
    }
}

async fn handle_submit(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(posted): Form<HashMap<String, String>>,
) -> Response {
    let (jar, id) = session_id(jar);
    let result = with_session(state, &id, move |app, session| {
        apply_posted(&mut session.ctx, &posted, true);
        let notice = match session.ctx.submit(&app.engine, &app.renderer) {
            Ok(outcome) if outcome.updated => Notice::success(format!(
                "Registro atualizado na linha {}. PDF gerado.",
                outcome.row
            )),
            Ok(outcome) => Notice::success(format!(
                "Dados gravados na linha {}. PDF gerado.",
                outcome.row
            )),
            Err(e) => {
                error!("submit failed: {}", e);
                Notice::error(e.to_string())
            }
        };
        session.notices.push(notice);
    })
    .await;

    match result {
        Ok(()) => (jar, Redirect::to("/")).into_response(),
        Err(status) => status.into_response(),
    }
}

async fn handle_reset(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let (jar, id) = session_id(jar);
    *state.session(&id).lock().await = WebSession::default();
    (jar, Redirect::to("/")).into_response()
}

async fn download_report(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let (_, id) = session_id(jar);
    let report = state.session(&id).lock().await.ctx.report().cloned();

    let Some(report) = report else {
        return (StatusCode::NOT_FOUND, "no report generated yet").into_response();
    };
    let disposition = format!(
        "attachment; filename*=UTF-8''{}",
        urlencoding::encode(&report.file_name)
    );
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from(report.bytes))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[derive(Serialize)]
struct SessionSummary {
    identifier: String,
    #[serde(flatten)]
    state: LookupState,
    bound_row: Option<u32>,
    extras: Extras,
    report: Option<String>,
}

async fn session_summary(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let (jar, id) = session_id(jar);
    let handle = state.session(&id);
    let session = handle.lock().await;
    let summary = SessionSummary {
        identifier: session.ctx.form().identifier(),
        state: session.ctx.state().clone(),
        bound_row: session.ctx.bound_row(),
        extras: session.ctx.extras().clone(),
        report: session.ctx.report().map(|r| r.file_name.clone()),
    };
    drop(session);
    (jar, Json(summary)).into_response()
}
