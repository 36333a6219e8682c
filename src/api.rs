// Family Basket - REST API
// Axum router behind `basket-server`. Every request loads its own ListState, applies one
// action and answers with the resulting list; mutations are serialised in-process.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::household::Member;
use crate::recipe::{GenerationError, RecipeError, Season};
use crate::session::{ActionError, ListState, Services};
use crate::store::{ListError, ListVersion, StoreError};
use crate::DEFAULT_OWNER_LABEL;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    services: Services,
    write_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(services: Services) -> Self {
        AppState {
            services,
            write_lock: Arc::new(Mutex::new(())),
        }
    }
}

/// API Response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    fn failed(data: T, error: String) -> Self {
        Self {
            success: false,
            data,
            error: Some(error),
        }
    }
}

/// One row of the list as shown to clients
#[derive(Debug, Serialize, Deserialize)]
pub struct ItemResponse {
    pub position: usize,
    pub owner: String,
    pub glyph: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse {
    pub version: String,
    /// The backing resource could not be read; the list is an empty stand-in
    pub degraded: bool,
    pub items: Vec<ItemResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HouseholdResponse {
    pub default_label: String,
    pub default_glyph: String,
    pub members: Vec<Member>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecipeResponse {
    pub recipe: String,
    pub season: String,
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub owner: String,
    pub name: String,
    /// Version the client rendered; stale clients get 409
    pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VersionQuery {
    pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecipeRequest {
    pub items: Vec<String>,
    pub date: Option<NaiveDate>,
}

fn list_response(services: &Services, list: &ListState) -> ListResponse {
    let household = services.household();
    ListResponse {
        version: list.version().to_string(),
        degraded: list.is_degraded(),
        items: list
            .entries()
            .iter()
            .enumerate()
            .map(|(position, entry)| ItemResponse {
                position,
                owner: entry.owner.label().to_string(),
                glyph: household.glyph_for(&entry.owner).to_string(),
                name: entry.name.clone(),
            })
            .collect(),
    }
}

fn status_for(error: &ActionError) -> StatusCode {
    match error {
        ActionError::List(ListError::EmptyName)
        | ActionError::Household(_)
        | ActionError::Store(StoreError::Encode(_))
        | ActionError::Recipe(RecipeError::EmptySelection) => StatusCode::BAD_REQUEST,
        ActionError::List(ListError::IndexOutOfRange { .. }) => StatusCode::NOT_FOUND,
        ActionError::Store(StoreError::Conflict) => StatusCode::CONFLICT,
        ActionError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        ActionError::Recipe(RecipeError::Generation(GenerationError::NotConfigured)) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ActionError::Recipe(RecipeError::Generation(GenerationError::Timeout(_))) => {
            StatusCode::GATEWAY_TIMEOUT
        }
        ActionError::Recipe(RecipeError::Generation(_)) => StatusCode::BAD_GATEWAY,
    }
}

/// Load the request's list, pinned to the client's version when it sent one
async fn load_list(services: &Services, version: Option<String>) -> ListState {
    let list = services.open().await;
    match version {
        Some(version) => list.at_version(ListVersion::from(version)),
        None => list,
    }
}

/// Answer a mutation with the list as it stands afterwards
fn mutation_response(
    services: &Services,
    list: &ListState,
    outcome: Result<StatusCode, ActionError>,
) -> Response {
    let body = list_response(services, list);
    match outcome {
        Ok(status) => (status, Json(ApiResponse::ok(body))).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Request failed");
            (status_for(&e), Json(ApiResponse::failed(body, e.user_message()))).into_response()
        }
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/household - Members and their glyphs
async fn get_household(State(state): State<AppState>) -> impl IntoResponse {
    let household = state.services.household();
    Json(ApiResponse::ok(HouseholdResponse {
        default_label: DEFAULT_OWNER_LABEL.to_string(),
        default_glyph: household.default_glyph().to_string(),
        members: household.members().to_vec(),
    }))
}

/// GET /api/items - The whole list
async fn get_items(State(state): State<AppState>) -> impl IntoResponse {
    let list = state.services.open().await;
    Json(ApiResponse::ok(list_response(&state.services, &list)))
}

/// POST /api/items - Add one item
async fn add_item(
    State(state): State<AppState>,
    Json(request): Json<AddItemRequest>,
) -> Response {
    let _guard = state.write_lock.lock().await;
    let mut list = load_list(&state.services, request.version).await;

    let outcome = state
        .services
        .add(&mut list, &request.owner, &request.name)
        .await
        .map(|_| StatusCode::CREATED);

    mutation_response(&state.services, &list, outcome)
}

/// DELETE /api/items/:position - Delete one item
async fn delete_item(
    State(state): State<AppState>,
    Path(position): Path<usize>,
    Query(query): Query<VersionQuery>,
) -> Response {
    let _guard = state.write_lock.lock().await;
    let mut list = load_list(&state.services, query.version).await;

    let outcome = state
        .services
        .delete(&mut list, position)
        .await
        .map(|_| StatusCode::OK);

    mutation_response(&state.services, &list, outcome)
}

/// DELETE /api/items - Clear the list
async fn clear_items(
    State(state): State<AppState>,
    Query(query): Query<VersionQuery>,
) -> Response {
    let _guard = state.write_lock.lock().await;
    let mut list = load_list(&state.services, query.version).await;

    let outcome = state.services.clear(&mut list).await.map(|_| StatusCode::OK);

    mutation_response(&state.services, &list, outcome)
}

/// POST /api/recipe - Recipe for the checked item names
async fn suggest_recipe(
    State(state): State<AppState>,
    Json(request): Json<RecipeRequest>,
) -> Response {
    let date = request.date.unwrap_or_else(|| Local::now().date_naive());

    match state.services.recipe_for(&request.items, date).await {
        Ok(recipe) => {
            let response = RecipeResponse {
                recipe,
                season: Season::of(date).label().to_string(),
                date,
            };
            (StatusCode::OK, Json(ApiResponse::ok(Some(response)))).into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Recipe request failed");
            (
                status_for(&e),
                Json(ApiResponse::<Option<RecipeResponse>>::failed(None, e.user_message())),
            )
                .into_response()
        }
    }
}

/// GET / - Serve the list widget
async fn serve_index() -> impl IntoResponse {
    Html(include_str!("../web/index.html"))
}

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/household", get(get_household))
        .route("/items", get(get_items).post(add_item).delete(clear_items))
        .route("/items/:position", delete(delete_item))
        .route("/recipe", post(suggest_recipe))
        .with_state(state);

    Router::new()
        .route("/", get(serve_index))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// ============================================================================
// TESTS
// ============================================================================
