use chrono::Utc;
use sea_orm::{EntityTrait, QueryOrder};

use crate::{
    dto::users::UserList,
    entity::users::{Column as UserCol, Entity as Users},
    error::AppResult,
    middleware::auth::{AuthUser, ensure_admin},
    models::User,
    response::{ApiResponse, Meta},
    state::AppState,
};

/// Full user listing, admin only, unpaginated. Password hashes stay behind.
pub async fn list_users(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<UserList>> {
    ensure_admin(user)?;

    let items = Users::find()
        .order_by_asc(UserCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|u| User {
            id: u.id,
            email: u.email,
            role: u.role,
            created_at: u.created_at.with_timezone(&Utc),
        })
        .collect();

    Ok(ApiResponse::success(
        "Users",
        UserList { items },
        Some(Meta::empty()),
    ))
}
