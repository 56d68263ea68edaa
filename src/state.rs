use sea_orm::DatabaseConnection;

use crate::{cache::ResponseCache, notify::Notifier, throttle::Throttles};

#[derive(Clone)]
pub struct AppState {
    pub orm: DatabaseConnection,
    pub cache: ResponseCache,
    pub throttles: Throttles,
    pub notifier: Notifier,
}
