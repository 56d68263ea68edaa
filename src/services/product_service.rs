use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::products::{CreateProductRequest, ProductInfo, ProductList, UpdateProductRequest},
    entity::products::{ActiveModel, Column, Entity as Products, Model as ProductModel},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Product,
    response::{ApiResponse, Meta},
    routes::params::{ProductOrdering, ProductQuery, SortOrder},
    state::AppState,
};

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (limit, offset) = query.pagination().normalize();
    let condition = build_filter(&query);

    let sort_col = match query.ordering {
        Some(ProductOrdering::Name) => Column::Name,
        Some(ProductOrdering::Price) => Column::Price,
        Some(ProductOrdering::Stock) => Column::Stock,
        Some(ProductOrdering::CreatedAt) | None => Column::CreatedAt,
    };
    // An explicit ordering field defaults to ascending; the fallback
    // created_at ordering shows newest products first.
    let sort_order = query.sort.unwrap_or(if query.ordering.is_some() {
        SortOrder::Asc
    } else {
        SortOrder::Desc
    });

    let mut finder = Products::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(product_from_entity)
        .collect();

    let meta = Meta::new(limit, offset, total);
    Ok(ApiResponse::success("Products", ProductList { items }, Some(meta)))
}

fn build_filter(query: &ProductQuery) -> Condition {
    let mut condition = Condition::all();

    if let Some(name) = query.name.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(Expr::col(Column::Name).ilike(escape_like(name)));
    }
    if let Some(fragment) = query.name_contains.as_ref().filter(|s| !s.is_empty()) {
        condition =
            condition.add(Expr::col(Column::Name).ilike(format!("%{}%", escape_like(fragment))));
    }
    if let Some(price) = query.price {
        condition = condition.add(Column::Price.eq(price));
    }
    if let Some(price_lt) = query.price_lt {
        condition = condition.add(Column::Price.lt(price_lt));
    }
    if let Some(price_gt) = query.price_gt {
        condition = condition.add(Column::Price.gt(price_gt));
    }
    if let Some(price_min) = query.price_min {
        condition = condition.add(Column::Price.gte(price_min));
    }
    if let Some(price_max) = query.price_max {
        condition = condition.add(Column::Price.lte(price_max));
    }
    if let Some(search) = query.search.as_ref().filter(|s| !s.is_empty()) {
        // Exact name hit or a description substring, case-insensitive.
        condition = condition.add(
            Condition::any()
                .add(Expr::col(Column::Name).ilike(escape_like(search)))
                .add(Expr::col(Column::Description).ilike(format!("%{}%", escape_like(search)))),
        );
    }
    match query.in_stock {
        Some(true) => condition = condition.add(Column::Stock.gt(0)),
        Some(false) => condition = condition.add(Column::Stock.lte(0)),
        None => {}
    }

    condition
}

// ILIKE treats \, % and _ specially; filter input has to match literally.
fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

pub async fn list_available(state: &AppState) -> AppResult<ApiResponse<ProductList>> {
    list_by_stock(state, true).await
}

pub async fn list_out_of_stock(state: &AppState) -> AppResult<ApiResponse<ProductList>> {
    list_by_stock(state, false).await
}

async fn list_by_stock(state: &AppState, in_stock: bool) -> AppResult<ApiResponse<ProductList>> {
    let filter = if in_stock {
        Column::Stock.gt(0)
    } else {
        Column::Stock.lte(0)
    };

    let items: Vec<Product> = Products::find()
        .filter(filter)
        .order_by_desc(Column::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(product_from_entity)
        .collect();

    let message = if in_stock {
        "Available products"
    } else {
        "Out of stock products"
    };
    Ok(ApiResponse::success(
        message,
        ProductList { items },
        Some(Meta::empty()),
    ))
}

pub async fn product_info(state: &AppState) -> AppResult<ApiResponse<ProductInfo>> {
    let products: Vec<Product> = Products::find()
        .order_by_desc(Column::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(product_from_entity)
        .collect();

    let count = products.len() as i64;
    let max_price = products.iter().map(|p| p.price).max();

    Ok(ApiResponse::success(
        "Product info",
        ProductInfo {
            products,
            count,
            max_price,
        },
        Some(Meta::empty()),
    ))
}

pub async fn get_product(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Product>> {
    let result = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .map(product_from_entity);
    let result = match result {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };
    Ok(ApiResponse::success("Product", result, None))
}

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    validate_price_and_stock(payload.price, payload.stock)?;

    let active = ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name),
        description: Set(payload.description),
        price: Set(payload.price),
        stock: Set(payload.stock),
        created_at: NotSet,
    };
    let product = active.insert(&state.orm).await?;

    state.cache.invalidate_product_lists();

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "product_create",
        Some("products"),
        Some(serde_json::json!({ "product_id": product.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Product created",
        product_from_entity(product),
        Some(Meta::empty()),
    ))
}

pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    let existing = Products::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };

    validate_price_and_stock(
        payload.price.unwrap_or(existing.price),
        payload.stock.unwrap_or(existing.stock),
    )?;

    let mut active: ActiveModel = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name);
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(price) = payload.price {
        active.price = Set(price);
    }
    if let Some(stock) = payload.stock {
        active.stock = Set(stock);
    }

    let product = active.update(&state.orm).await?;

    state.cache.invalidate_product_lists();

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "product_update",
        Some("products"),
        Some(serde_json::json!({ "product_id": product.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Updated",
        product_from_entity(product),
        Some(Meta::empty()),
    ))
}

pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = Products::delete_by_id(id).exec(&state.orm).await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    state.cache.invalidate_product_lists();

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "product_delete",
        Some("products"),
        Some(serde_json::json!({ "product_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

fn validate_price_and_stock(price: i64, stock: i32) -> AppResult<()> {
    if price < 0 {
        return Err(AppError::BadRequest("price must not be negative".into()));
    }
    if stock < 0 {
        return Err(AppError::BadRequest("stock must not be negative".into()));
    }
    Ok(())
}

pub(crate) fn product_from_entity(model: ProductModel) -> Product {
    Product {
        id: model.id,
        name: model.name,
        description: model.description,
        price: model.price,
        stock: model.stock,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
