use anyhow::{anyhow, Result};
use common::ServerConfig;
use rocket::data::{Data, ToByteUnit};
use rocket::http::{ContentType, Status};
use rocket::{delete, get, options, patch, post, put, routes, Build, Rocket, State};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::ser::PrettyFormatter;

use crate::store::{Article, ArticleStore, CategoryFilter};

/// Application state stored inside Rocket managed state.
#[derive(Clone)]
pub struct AppState {
    pub store: ArticleStore,
}

impl AppState {
    pub fn new(store: ArticleStore) -> Self {
        Self { store }
    }
}

/// Largest request body read by `POST /news`.
pub const MAX_REQUEST_BYTES: u64 = 1024 * 1024;

/// Request body for `POST /news`. Missing or `null` fields fall back to zero / no categories.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientRequest {
    #[serde(rename = "MaxItems", default, deserialize_with = "null_as_default")]
    pub max_items: i64,
    #[serde(rename = "Categories", default, deserialize_with = "null_as_default")]
    pub categories: Vec<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

type NewsResponse = (Status, (ContentType, String));

/// The `max_items` most recent matching articles, returned oldest first.
/// A non-positive `max_items` yields nothing.
pub fn select_articles(store: &ArticleStore, request: &ClientRequest) -> Vec<Article> {
    let filter = CategoryFilter::from_labels(&request.categories);
    let mut articles = store.query(&filter);

    let cap = usize::try_from(request.max_items).unwrap_or(0);
    articles.truncate(cap);
    articles.sort_by(|a, b| a.published_date.cmp(&b.published_date));
    articles
}

/// Serialize with four-space indentation.
pub fn to_pretty_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    // serde_json only ever emits valid UTF-8
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn error_body(status: Status, message: String) -> NewsResponse {
    (status, (ContentType::Plain, message))
}

fn bad_request(detail: impl std::fmt::Display) -> NewsResponse {
    tracing::warn!("rejecting news request: {}", detail);
    error_body(Status::BadRequest, format!("Error parsing json: {}", detail))
}

/// Filtered, capped news list.
#[post("/news", data = "<data>")]
async fn news(state: &State<AppState>, data: Data<'_>) -> NewsResponse {
    let body = match data.open(MAX_REQUEST_BYTES.bytes()).into_bytes().await {
        Ok(body) if body.is_complete() => body.into_inner(),
        Ok(_) => {
            return bad_request(format!(
                "request body exceeds {} bytes",
                MAX_REQUEST_BYTES
            ))
        }
        Err(e) => return bad_request(e),
    };

    let request: ClientRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => return bad_request(e),
    };

    let articles = select_articles(&state.store, &request);
    match to_pretty_json(&articles) {
        Ok(json) => {
            tracing::info!(items = articles.len(), "Client fetched news");
            (Status::Ok, (ContentType::JSON, json))
        }
        Err(e) => {
            tracing::error!("failed to encode news response: {}", e);
            error_body(
                Status::InternalServerError,
                format!("Error encoding json: {}", e),
            )
        }
    }
}

// Only POST is served on /news; other methods get an empty 400.
#[get("/news")]
async fn news_get() -> (Status, ()) {
    (Status::BadRequest, ())
}

#[put("/news")]
async fn news_put() -> (Status, ()) {
    (Status::BadRequest, ())
}

#[delete("/news")]
async fn news_delete() -> (Status, ()) {
    (Status::BadRequest, ())
}

#[patch("/news")]
async fn news_patch() -> (Status, ()) {
    (Status::BadRequest, ())
}

#[options("/news")]
async fn news_options() -> (Status, ()) {
    (Status::BadRequest, ())
}

#[get("/health")]
async fn health() -> &'static str {
    "OK"
}

/// Build the Rocket instance with managed state and routes, bound to `config`.
pub fn build_rocket(config: &ServerConfig, state: AppState) -> Rocket<Build> {
    let fig = rocket::Config::figment()
        .merge(("address", config.address.clone()))
        .merge(("port", config.port));

    rocket::custom(fig).manage(state).mount(
        "/",
        routes![
            news,
            news_get,
            news_put,
            news_delete,
            news_patch,
            news_options,
            health
        ],
    )
}

/// Build and launch the HTTP server.
///
/// Blocks until Rocket shuts down and returns an error if it fails to start
/// (e.g. the port is already taken).
pub async fn launch_rocket(config: &ServerConfig, store: ArticleStore) -> Result<()> {
    let rocket = build_rocket(config, AppState::new(store));

    tracing::info!(address = %config.address, port = config.port, "Starting Rocket HTTP server");
    rocket
        .launch()
        .await
        .map_err(|e| anyhow!("Rocket failed: {}", e))?;

    tracing::info!("Rocket HTTP server has shut down");
    Ok(())
}
