use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, RawQuery, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use uuid::Uuid;

use crate::{
    cache::ResponseCache,
    dto::products::{CreateProductRequest, ProductInfo, ProductList, UpdateProductRequest},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Product,
    response::ApiResponse,
    routes::params::ProductQuery,
    services::product_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products))
        .route("/", post(create_product))
        .route("/available", get(list_available))
        .route("/out-of-stock", get(list_out_of_stock))
        .route("/info", get(product_info))
        .route("/{id}", get(get_product))
        .route("/{id}", put(update_product))
        .route("/{id}", delete(delete_product))
}

fn json_bytes_response(body: Bytes) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

/// Serves from the response cache when the same path + query + Authorization
/// combination was answered within the TTL; otherwise computes and stores.
async fn cached_list<T: serde::Serialize>(
    state: &AppState,
    path: &str,
    raw_query: Option<&str>,
    authorization: Option<&str>,
    compute: impl Future<Output = AppResult<ApiResponse<T>>>,
) -> AppResult<Response> {
    let key = ResponseCache::list_key(path, raw_query, authorization);
    if let Some(body) = state.cache.get(&key).await {
        tracing::debug!(%key, "product list served from cache");
        return Ok(json_bytes_response(body));
    }

    let resp = compute.await?;
    let body = Bytes::from(
        serde_json::to_vec(&resp).map_err(|e| AppError::Internal(anyhow::Error::from(e)))?,
    );
    state.cache.insert(key, body.clone()).await;
    Ok(json_bytes_response(body))
}

#[utoipa::path(
    get,
    path = "/api/products",
    params(
        ("limit" = Option<i64>, Query, description = "Page size, default 10, max 100"),
        ("offset" = Option<i64>, Query, description = "Rows to skip, default 0"),
        ("name" = Option<String>, Query, description = "Case-insensitive exact name"),
        ("name_contains" = Option<String>, Query, description = "Case-insensitive name substring"),
        ("price" = Option<i64>, Query, description = "Exact price"),
        ("price_lt" = Option<i64>, Query, description = "Price below"),
        ("price_gt" = Option<i64>, Query, description = "Price above"),
        ("price_min" = Option<i64>, Query, description = "Range lower bound"),
        ("price_max" = Option<i64>, Query, description = "Range upper bound"),
        ("search" = Option<String>, Query, description = "Exact name or description substring"),
        ("in_stock" = Option<bool>, Query, description = "true: stock > 0, false: stock = 0"),
        ("ordering" = Option<String>, Query, description = "name, price, stock or created_at"),
        ("sort" = Option<String>, Query, description = "asc or desc"),
    ),
    responses(
        (status = 200, description = "List products", body = ApiResponse<ProductList>),
        (status = 429, description = "Throttled"),
    ),
    tag = "Products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    RawQuery(raw_query): RawQuery,
    Query(query): Query<ProductQuery>,
) -> AppResult<Response> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    cached_list(
        &state,
        "/api/products",
        raw_query.as_deref(),
        authorization,
        product_service::list_products(&state, query),
    )
    .await
}

#[utoipa::path(
    get,
    path = "/api/products/available",
    responses(
        (status = 200, description = "Products with stock > 0", body = ApiResponse<ProductList>),
    ),
    tag = "Products"
)]
pub async fn list_available(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
) -> AppResult<Response> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    cached_list(
        &state,
        "/api/products/available",
        None,
        authorization,
        product_service::list_available(&state),
    )
    .await
}

#[utoipa::path(
    get,
    path = "/api/products/out-of-stock",
    responses(
        (status = 200, description = "Products with stock = 0", body = ApiResponse<ProductList>),
    ),
    tag = "Products"
)]
pub async fn list_out_of_stock(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
) -> AppResult<Response> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    cached_list(
        &state,
        "/api/products/out-of-stock",
        None,
        authorization,
        product_service::list_out_of_stock(&state),
    )
    .await
}

#[utoipa::path(
    get,
    path = "/api/products/info",
    responses(
        (status = 200, description = "Catalog aggregate", body = ApiResponse<ProductInfo>),
    ),
    tag = "Products"
)]
pub async fn product_info(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<ProductInfo>>> {
    let resp = product_service::product_info(&state).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/products/{id}",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Get product", body = ApiResponse<Product>),
        (status = 404, description = "Product not found"),
    ),
    tag = "Products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let resp = product_service::get_product(&state, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/products",
    request_body = CreateProductRequest,
    responses(
        (status = 200, description = "Create product", body = ApiResponse<Product>),
        (status = 403, description = "Admin only"),
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateProductRequest>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let resp = product_service::create_product(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/products/{id}",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Updated product", body = ApiResponse<Product>),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Product not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn update_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProductRequest>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let resp = product_service::update_product(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/products/{id}",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Deleted product"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Product not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn delete_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = product_service::delete_product(&state, &user, id).await?;
    Ok(Json(resp))
}
