use std::collections::HashMap;

use chrono::{Days, NaiveTime, Utc};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::{
        CreateOrderRequest, OrderItemInput, OrderList, OrderWithItems, UpdateOrderRequest,
        UpdateOrderStatusRequest,
    },
    entity::{
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{
            ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel,
        },
        products::{Column as ProdCol, Entity as Products},
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Order, OrderItem},
    notify::OrderConfirmation,
    response::{ApiResponse, Meta},
    routes::params::OrderListQuery,
    state::AppState,
};

const VALID_STATUSES: [&str; 4] = ["pending", "confirmed", "shipped", "cancelled"];

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let mut condition = Condition::all();
    // Ownership filter: admins see every order.
    if !user.is_admin() {
        condition = condition.add(OrderCol::UserId.eq(user.user_id));
    }
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(OrderCol::Status.eq(status.clone()));
    }
    if let Some(date) = query.created_date {
        let start = date.and_time(NaiveTime::MIN).and_utc();
        condition = condition.add(OrderCol::CreatedAt.gte(start));
        if let Some(next) = date.checked_add_days(Days::new(1)) {
            let end = next.and_time(NaiveTime::MIN).and_utc();
            condition = condition.add(OrderCol::CreatedAt.lt(end));
        }
    }
    if let Some(before) = query.created_before {
        condition = condition.add(OrderCol::CreatedAt.lt(before));
    }
    if let Some(after) = query.created_after {
        condition = condition.add(OrderCol::CreatedAt.gt(after));
    }

    let orders: Vec<Order> = Orders::find()
        .filter(condition)
        .order_by_desc(OrderCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect();

    let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let mut grouped: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    if !order_ids.is_empty() {
        for item in OrderItems::find()
            .filter(OrderItemCol::OrderId.is_in(order_ids))
            .all(&state.orm)
            .await?
        {
            grouped
                .entry(item.order_id)
                .or_default()
                .push(order_item_from_entity(item));
        }
    }

    let items = orders
        .into_iter()
        .map(|order| {
            let items = grouped.remove(&order.id).unwrap_or_default();
            with_total(order, items)
        })
        .collect();

    Ok(ApiResponse::success(
        "Orders",
        OrderList { items },
        Some(Meta::empty()),
    ))
}

pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    validate_items(&payload.items)?;

    let txn = state.orm.begin().await?;

    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        // The order always belongs to the caller, never to an id from the body.
        user_id: Set(user.user_id),
        status: Set("pending".into()),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let items = insert_items(&txn, order.id, &payload.items).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "order_create",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let order = order_from_entity(order);
    let data = with_total(order, items);

    // Confirmation mail goes through the background queue; the request never
    // waits on it.
    match Users::find_by_id(user.user_id).one(&state.orm).await {
        Ok(Some(account)) => state.notifier.order_created(OrderConfirmation {
            order_id: data.order.id,
            user_id: user.user_id,
            email: account.email,
            total: data.total_price,
            item_count: data.items.len(),
        }),
        Ok(None) => tracing::warn!(user_id = %user.user_id, "order owner not found, skipping email"),
        Err(err) => tracing::warn!(error = %err, "failed to load order owner, skipping email"),
    }

    Ok(ApiResponse::success("Order created", data, Some(Meta::empty())))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = find_owned(&state.orm, user, id).await?;

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    let data = with_total(order_from_entity(order), items);
    Ok(ApiResponse::success("OK", data, Some(Meta::empty())))
}

pub async fn update_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    validate_items(&payload.items)?;
    if payload.status.is_some() {
        ensure_admin(user)?;
    }
    if let Some(status) = payload.status.as_deref() {
        validate_status(status)?;
    }

    let txn = state.orm.begin().await?;

    let mut finder = Orders::find().filter(OrderCol::Id.eq(id));
    if !user.is_admin() {
        finder = finder.filter(OrderCol::UserId.eq(user.user_id));
    }
    let order = finder.lock(LockType::Update).one(&txn).await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    if !user.is_admin() && order.status != "pending" {
        return Err(AppError::BadRequest(
            "only pending orders can be changed".into(),
        ));
    }

    OrderItems::delete_many()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .exec(&txn)
        .await?;

    let items = insert_items(&txn, order.id, &payload.items).await?;

    let mut active: OrderActive = order.into();
    if let Some(status) = payload.status {
        active.status = Set(status);
    }
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "order_update",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let data = with_total(order_from_entity(order), items);
    Ok(ApiResponse::success("Order updated", data, Some(Meta::empty())))
}

pub async fn update_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;
    validate_status(&payload.status)?;

    let existing = Orders::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let mut active: OrderActive = existing.into();
    active.status = Set(payload.status);
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "order_status_update",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "status": order.status })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order updated",
        order_from_entity(order),
        Some(Meta::empty()),
    ))
}

pub async fn delete_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let txn = state.orm.begin().await?;

    let mut finder = Orders::find().filter(OrderCol::Id.eq(id));
    if !user.is_admin() {
        finder = finder.filter(OrderCol::UserId.eq(user.user_id));
    }
    let order = finder.lock(LockType::Update).one(&txn).await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    OrderItems::delete_many()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .exec(&txn)
        .await?;
    Orders::delete_by_id(order.id).exec(&txn).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "order_delete",
        Some("orders"),
        Some(serde_json::json!({ "order_id": id })),
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

async fn find_owned(
    orm: &sea_orm::DatabaseConnection,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<OrderModel> {
    let mut finder = Orders::find().filter(OrderCol::Id.eq(id));
    if !user.is_admin() {
        finder = finder.filter(OrderCol::UserId.eq(user.user_id));
    }
    match finder.one(orm).await? {
        Some(order) => Ok(order),
        None => Err(AppError::NotFound),
    }
}

/// Inserts order items, snapshotting each product's current price.
async fn insert_items<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    inputs: &[OrderItemInput],
) -> AppResult<Vec<OrderItem>> {
    let mut items = Vec::with_capacity(inputs.len());
    for input in inputs {
        let product = Products::find()
            .filter(ProdCol::Id.eq(input.product_id))
            .one(conn)
            .await?;
        let product = match product {
            Some(p) => p,
            None => {
                return Err(AppError::BadRequest(format!(
                    "unknown product {}",
                    input.product_id
                )));
            }
        };

        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            product_id: Set(product.id),
            quantity: Set(input.quantity),
            price: Set(product.price),
            created_at: NotSet,
        }
        .insert(conn)
        .await?;

        items.push(order_item_from_entity(item));
    }
    Ok(items)
}

fn validate_items(items: &[OrderItemInput]) -> AppResult<()> {
    if items.is_empty() {
        return Err(AppError::BadRequest("order needs at least one item".into()));
    }
    for item in items {
        if item.quantity <= 0 {
            return Err(AppError::BadRequest("quantity must be positive".into()));
        }
    }
    Ok(())
}

fn validate_status(status: &str) -> AppResult<()> {
    if !VALID_STATUSES.contains(&status) {
        return Err(AppError::BadRequest(format!(
            "invalid status {status:?}, expected one of {VALID_STATUSES:?}"
        )));
    }
    Ok(())
}

fn with_total(order: Order, items: Vec<OrderItem>) -> OrderWithItems {
    let total_price = items
        .iter()
        .map(|i| i.price * i.quantity as i64)
        .sum();
    OrderWithItems {
        order,
        items,
        total_price,
    }
}

fn order_from_entity(model: OrderModel) -> Order {
    Order {
        id: model.id,
        user_id: model.user_id,
        status: model.status,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        quantity: model.quantity,
        price: model.price,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
