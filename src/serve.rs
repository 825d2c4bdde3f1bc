//! Purpose: Provide the HTTP front end for browsing and editing one SQLite file.
//! Exports: `ServeConfig`, `serve`, `router`, `init_tracing`.
//! Role: Axum-based loopback server; maps routes onto `core::db::Database` operations.
//! Invariants: Reads answer `text/html`; successful writes answer `303` to `/t/{table}`.
//! Invariants: Errors keep their text visible in the body; status follows `ErrorKind`.
//! Notes: Database work runs on the blocking pool; shutdown drains within `DRAIN_TIMEOUT`.
use axum::extract::rejection::FormRejection;
use axum::extract::{Form, Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{any, get, post};
use axum::Router;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use krd::core::db::Database;
use krd::core::error::{Error, ErrorKind};
use krd::core::page::Page;
use krd::core::query::parse_rowid;
use krd::html::{error_html, index_fragment, page_html, route_path};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

type FormFields = Vec<(String, String)>;

#[derive(Clone)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub database: Database,
}

#[derive(Clone)]
struct AppState {
    db: Database,
}

pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    let app = router(config.database);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message(format!("failed to bind {}", config.bind))
                .with_source(err)
        })?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("server failed")
                    .with_source(err)
            })?;
        }
        _ = shutdown_signal() => {
            info!("received signal, shutting down");
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(DRAIN_TIMEOUT, &mut server).await {
                Ok(result) => result.map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("server failed")
                        .with_source(err)
                })?,
                Err(_) => {
                    return Err(Error::new(ErrorKind::Io).with_message("server shutdown timed out"));
                }
            }
        }
    };
    Ok(())
}

pub fn router(db: Database) -> Router {
    let state = Arc::new(AppState { db });
    Router::new()
        .route("/", any(list_objects))
        .route("/t/:table", any(show_table))
        .route("/v/:name", any(show_view))
        .route("/s/:table/:column", any(show_sorted))
        .route("/a", post(add_row).fallback(ignore_method))
        .route("/u", post(update_row).fallback(ignore_method))
        .route("/d/:table/:rowid", get(delete_row))
        .route("/dup/:table/:rowid", get(duplicate_row))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        let mut signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler");
        signal.recv().await;
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}

async fn with_db<T, F>(state: &AppState, op: F) -> Result<T, Error>
where
    F: FnOnce(&Database) -> Result<T, Error> + Send + 'static,
    T: Send + 'static,
{
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || op(&db))
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("database task failed")
                .with_source(err)
        })?
}

async fn list_objects(State(state): State<Arc<AppState>>) -> Response {
    match with_db(&state, |db| db.list_objects()).await {
        Ok(objects) => Html(index_fragment(&objects)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn show_table(
    State(state): State<Arc<AppState>>,
    AxumPath(table): AxumPath<String>,
) -> Response {
    page_response(with_db(&state, move |db| db.table_page(&table)).await)
}

async fn show_view(
    State(state): State<Arc<AppState>>,
    AxumPath(name): AxumPath<String>,
) -> Response {
    page_response(with_db(&state, move |db| db.view_page(&name)).await)
}

async fn show_sorted(
    State(state): State<Arc<AppState>>,
    AxumPath((table, column)): AxumPath<(String, String)>,
) -> Response {
    page_response(with_db(&state, move |db| db.sorted_page(&table, &column)).await)
}

async fn add_row(
    State(state): State<Arc<AppState>>,
    form: Result<Form<FormFields>, FormRejection>,
) -> Response {
    let fields = match form_fields(form) {
        Ok(fields) => fields,
        Err(err) => return error_response(err),
    };
    let table = match required_field(&fields, "table") {
        Ok(table) => table,
        Err(err) => return error_response(err),
    };
    redirect_response(with_db(&state, move |db| db.insert_row(&table, &fields)).await)
}

async fn update_row(
    State(state): State<Arc<AppState>>,
    form: Result<Form<FormFields>, FormRejection>,
) -> Response {
    let fields = match form_fields(form) {
        Ok(fields) => fields,
        Err(err) => return error_response(err),
    };
    let target = required_field(&fields, "table").and_then(|table| {
        let rowid = parse_rowid(&required_field(&fields, "rowid")?)?;
        Ok((table, rowid))
    });
    let (table, rowid) = match target {
        Ok(target) => target,
        Err(err) => return error_response(err),
    };
    redirect_response(with_db(&state, move |db| db.update_row(&table, rowid, &fields)).await)
}

async fn delete_row(
    State(state): State<Arc<AppState>>,
    AxumPath((table, rowid)): AxumPath<(String, String)>,
) -> Response {
    let rowid = match parse_rowid(&rowid) {
        Ok(rowid) => rowid,
        Err(err) => return error_response(err),
    };
    redirect_response(with_db(&state, move |db| db.delete_row(&table, rowid)).await)
}

async fn duplicate_row(
    State(state): State<Arc<AppState>>,
    AxumPath((table, rowid)): AxumPath<(String, String)>,
) -> Response {
    let rowid = match parse_rowid(&rowid) {
        Ok(rowid) => rowid,
        Err(err) => return error_response(err),
    };
    redirect_response(with_db(&state, move |db| db.duplicate_row(&table, rowid)).await)
}

async fn ignore_method() -> StatusCode {
    StatusCode::OK
}

fn form_fields(form: Result<Form<FormFields>, FormRejection>) -> Result<FormFields, Error> {
    match form {
        Ok(Form(fields)) => Ok(fields),
        Err(rejection) => Err(Error::new(ErrorKind::Usage)
            .with_message(format!("invalid form body: {}", rejection.body_text()))),
    }
}

fn required_field(fields: &[(String, String)], name: &str) -> Result<String, Error> {
    fields
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.clone())
        .ok_or_else(|| {
            Error::new(ErrorKind::Usage).with_message(format!("missing form field: {name}"))
        })
}

fn page_response(result: Result<Page, Error>) -> Response {
    match result {
        Ok(page) => Html(page_html(&page)).into_response(),
        Err(err) => error_response(err),
    }
}

fn redirect_response(result: Result<String, Error>) -> Response {
    match result {
        Ok(table) => Redirect::to(&route_path(&["t", &table])).into_response(),
        Err(err) => error_response(err),
    }
}

fn error_response(err: Error) -> Response {
    let status = match err.kind() {
        ErrorKind::Usage => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Constraint => StatusCode::CONFLICT,
        ErrorKind::Busy => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal | ErrorKind::Io => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(status = status.as_u16(), error = %err, "request failed");
    (status, Html(error_html(&err))).into_response()
}
