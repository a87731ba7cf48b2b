// src/router.rs

use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderValue, Method, header, header::InvalidHeaderValue},
    middleware,
    routing::{get, patch, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::cms_handlers::*;
use crate::handlers::*;
use crate::middleware::activity_log_middleware;
use crate::state::AppState;

pub fn cors_layer(allowed_origin: Option<&str>) -> Result<CorsLayer, InvalidHeaderValue> {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
    Ok(match allowed_origin {
        Some(origin) => layer.allow_origin(origin.parse::<HeaderValue>()?),
        None => layer.allow_origin(Any),
    })
}

fn cms_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/cms/categories",
            get(list_categories_handler).post(create_category_handler),
        )
        .route(
            "/api/cms/categories/parents",
            get(list_parent_categories_handler),
        )
        .route("/api/cms/categories/subs", get(list_sub_categories_handler))
        .route(
            "/api/cms/categories/{id}",
            get(get_category_handler)
                .put(update_category_handler)
                .delete(delete_category_handler),
        )
        .route(
            "/api/cms/categories/{id}/status",
            patch(update_category_status_handler),
        )
        .route(
            "/api/cms/categories/{id}/reassign-delete",
            post(reassign_and_delete_category_handler),
        )
        .route(
            "/api/cms/products",
            get(cms_list_products_handler).post(create_product_handler),
        )
        .route(
            "/api/cms/products/{id}",
            patch(update_product_handler).delete(delete_product_handler),
        )
        .route("/api/cms/customers", get(list_customers_handler))
        .route("/api/cms/analytics/summary", get(analytics_summary_handler))
        .route("/api/cms/activity-logs", get(list_activity_logs_handler))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            activity_log_middleware,
        ))
}

fn store_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/register", post(register_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/me", get(me_handler))
        .route("/api/store/categories", get(store_categories_handler))
        .route("/api/store/products", get(store_list_products_handler))
        .route(
            "/api/store/products/{id}",
            get(store_product_details_handler),
        )
}

pub fn build_router(app_state: Arc<AppState>, cors: CorsLayer) -> Router {
    Router::new()
        .merge(store_routes())
        .merge(cms_routes(app_state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}
