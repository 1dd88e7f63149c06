//! REST API for the vehicle storage search.
//!
//! Provides HTTP endpoints for search clients.
//! Uses Axum as the web framework and supports CORS.

use std::sync::{Arc, OnceLock};

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
#[allow(unused_imports)]
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use utoipa::{OpenApi, ToSchema};

use crate::config::ApiConfig;
use crate::model::{Offer, RequestError, VehicleRequestItem, VehicleSet};
use crate::monitor::SearchStats;
use crate::optimizer::SearchEngine;

#[derive(Clone)]
struct ApiState {
    engine: Arc<SearchEngine>,
    max_quantity: u32,
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>vehicle-search API Docs</title>
        <link
            rel="stylesheet"
            href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css"
            integrity="sha384-wxLW6kwyHktdDGr6Pv1zgm/VGJh99lfUbzSn6HNHBENZlCN7W602k9VkGdxuFvPn"
            crossorigin="anonymous"
        />
    </head>
    <body>
        <div id="swagger-ui"></div>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"
            integrity="sha384-wmyclcVGX/WhUkdkATwhaK1X1JtiNrr2EoYJ+diV3vj4v6OC5yCeSu+yW13SYJep"
            crossorigin="anonymous"
        ></script>
        <script>
            window.onload = function () {
                window.ui = SwaggerUIBundle({
                    url: "/docs/openapi.json",
                    dom_id: "#swagger-ui",
                });
            };
        </script>
    </body>
    </html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

/// Catalog statistics returned by the health endpoint.
#[derive(Serialize, ToSchema)]
#[schema(example = json!({ "status": "ok", "sites": 12, "listings": 48 }))]
pub struct HealthResponse {
    pub status: String,
    pub sites: usize,
    pub listings: usize,
}

#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
    details: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }
}

fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    details: impl Into<String>,
) -> Response {
    (status, Json(ErrorResponse::new(error, details))).into_response()
}

fn json_deserialize_error(err: JsonRejection) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid JSON data",
        err.to_string(),
    )
}

fn invalid_request(err: &RequestError) -> Response {
    error_response(StatusCode::BAD_REQUEST, err.to_string(), err.to_string())
}

fn parse_search_request(
    payload: Result<Json<Vec<VehicleRequestItem>>, JsonRejection>,
    max_quantity: u32,
) -> Result<VehicleSet, Response> {
    let Json(items) = payload.map_err(json_deserialize_error)?;
    VehicleSet::from_requests(&items, max_quantity).map_err(|err| invalid_request(&err))
}

#[derive(OpenApi)]
#[openapi(
    paths(handle_search, handle_search_stream, handle_health),
    components(
        schemas(
            VehicleRequestItem,
            Offer,
            ErrorResponse,
            HealthResponse,
            SearchStats
        )
    ),
    tags((name = "search", description = "Endpoints for vehicle storage search"))
)]
struct ApiDoc;

/// Starts the API server.
///
/// Configures CORS for cross-origin requests.
/// Blocks until the server is terminated.
pub async fn start_api_server(
    config: ApiConfig,
    engine: Arc<SearchEngine>,
    max_quantity: u32,
) -> std::io::Result<()> {
    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|err| {
        error!("❌ Could not bind API server to {}: {}", addr, err);
        err
    })?;

    info!(
        "🚀 Server running on http://{}:{}",
        config.display_host(),
        config.port()
    );
    if config.binds_to_all_interfaces() && config.uses_default_host() {
        info!("💡 Local access: http://localhost:{}", config.port());
    }
    info!("🔎 API Endpoints:");
    info!("   - POST /");
    info!("   - POST /search");
    info!("   - POST /search_stream");
    info!("   - GET /health");
    info!("📑 Documentation:");
    info!("   - GET /docs");
    info!("   - GET /docs/openapi.json");

    axum::serve(listener, router(engine, max_quantity)).await
}

fn router(engine: Arc<SearchEngine>, max_quantity: u32) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let state = ApiState {
        engine,
        max_quantity,
    };

    Router::new()
        .route("/", post(handle_search))
        .route("/search", post(handle_search))
        .route("/search_stream", post(handle_search_stream))
        .route("/health", get(handle_health))
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(cors)
        .with_state(state)
}

/// Handler for POST /search (also mounted at POST /).
///
/// Takes the requested vehicles and returns the cheapest offer of every
/// location that can hold all of them, ordered by price.
#[utoipa::path(
    post,
    path = "/search",
    request_body = Vec<VehicleRequestItem>,
    responses(
        (status = 200, description = "Offers ordered by ascending price", body = Vec<Offer>),
        (status = BAD_REQUEST, description = "Empty request or too many vehicles", body = ErrorResponse),
        (status = UNPROCESSABLE_ENTITY, description = "Malformed JSON", body = ErrorResponse)
    ),
    tag = "search"
)]
async fn handle_search(
    State(state): State<ApiState>,
    payload: Result<Json<Vec<VehicleRequestItem>>, JsonRejection>,
) -> Response {
    let vehicles = match parse_search_request(payload, state.max_quantity) {
        Ok(vehicles) => vehicles,
        Err(response) => return response,
    };

    info!("📥 New search request: {} vehicles", vehicles.len());
    let engine = Arc::clone(&state.engine);
    let report = match tokio::task::spawn_blocking(move || engine.search(&vehicles)).await {
        Ok(report) => report,
        Err(err) => {
            error!("❌ Search task failed: {}", err);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Search failed",
                err.to_string(),
            );
        }
    };
    info!(
        "🏷️ Result: {} offers from {} locations",
        report.offers().len(),
        report.sites().len()
    );

    (StatusCode::OK, Json(report.into_offers())).into_response()
}

/// Handler for POST /search_stream endpoint (SSE).
///
/// Streams search events in real-time as Server-Sent Events (text/event-stream).
#[utoipa::path(
    post,
    path = "/search_stream",
    request_body = Vec<VehicleRequestItem>,
    responses(
        (
            status = 200,
            description = "Streams search events in real-time",
            content_type = "text/event-stream",
            body = String
        ),
        (status = BAD_REQUEST, description = "Empty request or too many vehicles", body = ErrorResponse),
        (status = UNPROCESSABLE_ENTITY, description = "Malformed JSON", body = ErrorResponse)
    ),
    tag = "search"
)]
async fn handle_search_stream(
    State(state): State<ApiState>,
    payload: Result<Json<Vec<VehicleRequestItem>>, JsonRejection>,
) -> Response {
    let vehicles = match parse_search_request(payload, state.max_quantity) {
        Ok(vehicles) => vehicles,
        Err(response) => return response,
    };

    let (tx, rx) = mpsc::channel::<String>(32);
    let engine = Arc::clone(&state.engine);

    tokio::task::spawn_blocking(move || {
        engine.search_with_progress(&vehicles, |evt| {
            if let Ok(json) = serde_json::to_string(evt) {
                // receiver gone: remaining events are discarded
                let _ = tx.blocking_send(json);
            }
        });
    });

    let stream = ReceiverStream::new(rx)
        .map(|msg| Ok::<_, std::convert::Infallible>(Event::default().data(msg)));
    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(std::time::Duration::from_secs(10))
                .text("keep-alive"),
        )
        .into_response()
}

/// Handler for GET /health.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse)),
    tag = "search"
)]
async fn handle_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let catalog = state.engine.catalog();
    Json(HealthResponse {
        status: "ok".to_string(),
        sites: catalog.site_count(),
        listings: catalog.listing_count(),
    })
}

async fn serve_openapi_json() -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui() -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::model::Listing;
    use crate::optimizer::SearchConfig;

    fn state() -> ApiState {
        let catalog = Catalog::from_listings(vec![
            Listing::new("a", "north", 10, 10, 300).unwrap(),
            Listing::new("b", "north", 30, 10, 1000).unwrap(),
            Listing::new("c", "south", 20, 10, 500).unwrap(),
        ])
        .unwrap();
        ApiState {
            engine: Arc::new(SearchEngine::new(
                Arc::new(catalog),
                SearchConfig::default(),
            )),
            max_quantity: 5,
        }
    }

    fn items(lines: &[(u32, u32)]) -> Json<Vec<VehicleRequestItem>> {
        Json(
            lines
                .iter()
                .map(|&(length, quantity)| VehicleRequestItem { length, quantity })
                .collect(),
        )
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("readable body");
        serde_json::from_slice(&bytes).expect("JSON body")
    }

    #[test]
    fn openapi_doc_lists_expected_paths() {
        let doc = openapi_doc();
        let paths = &doc.paths.paths;
        for path in ["/search", "/search_stream", "/health"] {
            assert!(
                paths.contains_key(path),
                "OpenAPI documentation is missing the {} path",
                path
            );
        }
    }

    #[test]
    fn openapi_doc_contains_key_schemas() {
        let doc = openapi_doc();
        let components = doc
            .components
            .as_ref()
            .expect("OpenAPI documentation contains no components");
        let schemas = &components.schemas;
        for name in ["VehicleRequestItem", "Offer", "ErrorResponse", "HealthResponse"] {
            assert!(
                schemas.contains_key(name),
                "Expected schema '{}' is missing from OpenAPI spec",
                name
            );
        }
    }

    #[test]
    fn search_request_parses_item_list() {
        let json = r#"[{"length": 20, "quantity": 2}, {"length": 10, "quantity": 1}]"#;
        let request: Vec<VehicleRequestItem> =
            serde_json::from_str(json).expect("Should parse valid JSON");
        assert_eq!(request.len(), 2);
        assert_eq!(request[0], VehicleRequestItem { length: 20, quantity: 2 });
    }

    #[test]
    fn search_request_rejects_negative_quantity() {
        let json = r#"[{"length": 20, "quantity": -1}]"#;
        assert!(serde_json::from_str::<Vec<VehicleRequestItem>>(json).is_err());
    }

    #[tokio::test]
    async fn search_returns_single_listing_offer() {
        let response = handle_search(State(state()), Ok(items(&[(10, 3)]))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(
            body,
            json!([
                {"location_id": "north", "listing_ids": ["b"], "total_price_in_cents": 1000},
            ])
        );
    }

    #[tokio::test]
    async fn search_lists_every_feasible_location() {
        let response = handle_search(State(state()), Ok(items(&[(20, 1)]))).await;
        let body = body_json(response).await;
        let prices: Vec<u64> = body
            .as_array()
            .expect("array")
            .iter()
            .map(|offer| offer["total_price_in_cents"].as_u64().expect("price"))
            .collect();
        assert_eq!(prices, vec![500, 1000]);
    }

    #[tokio::test]
    async fn empty_request_is_bad_request() {
        let response = handle_search(State(state()), Ok(items(&[(10, 0)]))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "No vehicles requested.");
    }

    #[tokio::test]
    async fn too_many_vehicles_is_bad_request() {
        let response = handle_search(State(state()), Ok(items(&[(10, 4), (20, 2)]))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Total quantity must be <= 5.");
    }

    #[tokio::test]
    async fn no_feasible_location_yields_empty_list() {
        let response = handle_search(State(state()), Ok(items(&[(40, 1)]))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!([]));
    }

    #[tokio::test]
    async fn health_reports_catalog_size() {
        let Json(health) = handle_health(State(state())).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.sites, 2);
        assert_eq!(health.listings, 3);
    }
}
