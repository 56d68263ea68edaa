use std::time::Duration;

use axum::body::Bytes;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set, Statement};
use uuid::Uuid;

use storefront_api::{
    cache::ResponseCache,
    db::{create_orm_conn, run_migrations},
    dto::products::{CreateProductRequest, UpdateProductRequest},
    entity::products::ActiveModel as ProductActive,
    error::AppError,
    middleware::auth::AuthUser,
    notify::Notifier,
    routes::params::{ProductOrdering, ProductQuery, SortOrder},
    services::product_service,
    state::AppState,
    throttle::{ThrottleConfig, Throttles},
};

// Integration flow: filtering, search, ordering, pagination, stock views,
// the catalog aggregate and admin-gated mutations with cache invalidation.
#[tokio::test]
async fn product_filters_and_admin_mutations_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let state = setup_state(&database_url).await?;

    let widget = seed_product(&state, "Widget", Some("A useful widget"), 1000, 5).await?;
    let _gadget = seed_product(&state, "Gadget", Some("Widget-adjacent gadget"), 2500, 0).await?;
    let _doohickey = seed_product(&state, "Doohickey", None, 500, 3).await?;

    // Search matches the exact name and description substrings, not name fragments.
    let resp = product_service::list_products(
        &state,
        ProductQuery {
            search: Some("widget".into()),
            ..ProductQuery::default()
        },
    )
    .await?;
    let items = resp.data.unwrap().items;
    let names: Vec<&str> = items.iter().map(|p| p.name.as_str()).collect();
    assert!(names.contains(&"Widget"), "exact name match expected");
    assert!(names.contains(&"Gadget"), "description substring expected");
    assert_eq!(items.len(), 2);

    // Case-insensitive exact name filter.
    let resp = product_service::list_products(
        &state,
        ProductQuery {
            name: Some("wIdGeT".into()),
            ..ProductQuery::default()
        },
    )
    .await?;
    assert_eq!(resp.data.unwrap().items.len(), 1);

    // ILIKE wildcards in filter input match literally, not as patterns.
    let resp = product_service::list_products(
        &state,
        ProductQuery {
            name_contains: Some("%".into()),
            ..ProductQuery::default()
        },
    )
    .await?;
    assert!(resp.data.unwrap().items.is_empty());

    let resp = product_service::list_products(
        &state,
        ProductQuery {
            name: Some("w_dget".into()),
            ..ProductQuery::default()
        },
    )
    .await?;
    assert!(resp.data.unwrap().items.is_empty());

    // Price range plus ordering.
    let resp = product_service::list_products(
        &state,
        ProductQuery {
            price_min: Some(500),
            price_max: Some(1500),
            ordering: Some(ProductOrdering::Price),
            ..ProductQuery::default()
        },
    )
    .await?;
    let prices: Vec<i64> = resp.data.unwrap().items.iter().map(|p| p.price).collect();
    assert_eq!(prices, vec![500, 1000]);

    // Descending ordering by price.
    let resp = product_service::list_products(
        &state,
        ProductQuery {
            ordering: Some(ProductOrdering::Price),
            sort: Some(SortOrder::Desc),
            ..ProductQuery::default()
        },
    )
    .await?;
    let prices: Vec<i64> = resp.data.unwrap().items.iter().map(|p| p.price).collect();
    assert_eq!(prices, vec![2500, 1000, 500]);

    // Limit/offset pagination reports the full total.
    let resp = product_service::list_products(
        &state,
        ProductQuery {
            limit: Some(2),
            offset: Some(2),
            ordering: Some(ProductOrdering::Price),
            ..ProductQuery::default()
        },
    )
    .await?;
    let meta = resp.meta.clone().unwrap();
    assert_eq!(meta.total, Some(3));
    assert_eq!(resp.data.unwrap().items.len(), 1);

    // Stock views.
    let resp = product_service::list_products(
        &state,
        ProductQuery {
            in_stock: Some(true),
            ..ProductQuery::default()
        },
    )
    .await?;
    assert_eq!(resp.data.unwrap().items.len(), 2);

    let available = product_service::list_available(&state).await?;
    assert!(
        available
            .data
            .unwrap()
            .items
            .iter()
            .all(|p| p.stock > 0)
    );

    let out = product_service::list_out_of_stock(&state).await?;
    let out_items = out.data.unwrap().items;
    assert_eq!(out_items.len(), 1);
    assert_eq!(out_items[0].name, "Gadget");

    // Catalog aggregate.
    let info = product_service::product_info(&state).await?.data.unwrap();
    assert_eq!(info.count, 3);
    assert_eq!(info.max_price, Some(2500));

    let admin = AuthUser {
        user_id: Uuid::new_v4(),
        role: "admin".into(),
    };
    let customer = AuthUser {
        user_id: Uuid::new_v4(),
        role: "user".into(),
    };

    // Product mutations are admin only.
    let err = product_service::create_product(
        &state,
        &customer,
        CreateProductRequest {
            name: "Nope".into(),
            description: None,
            price: 1,
            stock: 1,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    // A cached product list page is dropped by any product mutation.
    let key = ResponseCache::list_key("/api/products", None, None);
    state
        .cache
        .insert(key.clone(), Bytes::from_static(b"{}"))
        .await;

    let created = product_service::create_product(
        &state,
        &admin,
        CreateProductRequest {
            name: "Thingamajig".into(),
            description: Some("Fresh from the factory".into()),
            price: 750,
            stock: 9,
        },
    )
    .await?
    .data
    .unwrap();
    assert!(state.cache.get(&key).await.is_none());

    let err = product_service::create_product(
        &state,
        &admin,
        CreateProductRequest {
            name: "Negative".into(),
            description: None,
            price: -1,
            stock: 1,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    // Partial update keeps unspecified fields.
    let updated = product_service::update_product(
        &state,
        &admin,
        created.id,
        UpdateProductRequest {
            price: Some(800),
            name: None,
            description: None,
            stock: None,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(updated.price, 800);
    assert_eq!(updated.name, "Thingamajig");

    product_service::delete_product(&state, &admin, created.id).await?;
    let err = product_service::get_product(&state, created.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    product_service::delete_product(&state, &admin, widget.id).await?;
    let err = product_service::delete_product(&state, &admin, widget.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    Ok(())
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    // Clean tables between runs.
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE order_items, orders, audit_logs, products, users RESTART IDENTITY CASCADE",
    ))
    .await?;

    Ok(AppState {
        cache: ResponseCache::new(Duration::from_secs(60)),
        throttles: Throttles::new(ThrottleConfig::default()),
        notifier: Notifier::spawn(orm.clone()),
        orm,
    })
}

async fn seed_product(
    state: &AppState,
    name: &str,
    description: Option<&str>,
    price: i64,
    stock: i32,
) -> anyhow::Result<storefront_api::entity::products::Model> {
    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        description: Set(description.map(str::to_string)),
        price: Set(price),
        stock: Set(stock),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(product)
}
