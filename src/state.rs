// src/state.rs

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use sqlx::PgPool;
use uuid::Uuid;

use crate::category_cache::CategoryCache;
use crate::models::Product;

const PRODUCT_CACHE_CAPACITY: u64 = 10_000;
const PRODUCT_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

pub struct AppState {
    pub db_pool: PgPool,
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,
    pub category_cache: Arc<CategoryCache>,
    pub product_cache: Cache<Uuid, Product>,
}

impl AppState {
    pub fn new(
        db_pool: PgPool,
        jwt_secret: String,
        jwt_expiration_hours: i64,
        category_cache_ttl: Duration,
    ) -> Self {
        AppState {
            db_pool,
            jwt_secret,
            jwt_expiration_hours,
            category_cache: Arc::new(CategoryCache::new(category_cache_ttl)),
            product_cache: Cache::builder()
                .max_capacity(PRODUCT_CACHE_CAPACITY)
                .time_to_live(PRODUCT_CACHE_TTL)
                .build(),
        }
    }
}
