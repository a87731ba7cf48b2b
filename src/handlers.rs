// src/handlers.rs
// Handlery sklepu (katalog) i konta klienta

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{create_jwt, hash_password, verify_password};
use crate::auth_models::{LoginPayload, LoginResponse, RegistrationPayload, TokenClaims};
use crate::category_utils::active_tree_nodes;
use crate::errors::AppError;
use crate::filters::ProductListingParams;
use crate::models::{
    CategoryStatus, CategoryTreeNode, Product, ProductStatus, ProductWithTotalCount, Role, User,
    UserPublic,
};
use crate::pagination::PaginatedResponse;
use crate::services::category_tree;
use crate::state::AppState;

pub const PRODUCT_COLUMNS: &str =
    "id, name, description, price, category_id, status, created_at, updated_at";

// --- KONTO ---

pub async fn register_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<RegistrationPayload>,
) -> Result<(StatusCode, Json<UserPublic>), AppError> {
    payload.validate()?;
    let email = payload.email.trim().to_lowercase();

    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
        .bind(&email)
        .fetch_one(&app_state.db_pool)
        .await?;
    if exists {
        tracing::warn!("Próba rejestracji z istniejącym emailem: {}", email);
        return Err(AppError::EmailAlreadyExists(
            "Podany adres email jest już zarejestrowany".to_string(),
        ));
    }

    let password_hash = hash_password(&payload.password)?;

    let new_user = sqlx::query_as::<_, User>(
        r#"
            INSERT INTO users (id, email, password_hash, role)
            VALUES ($1, $2, $3, $4)
            RETURNING id, email, password_hash, role, created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&email)
    .bind(&password_hash)
    .bind(Role::Customer)
    .fetch_one(&app_state.db_pool)
    .await?;

    tracing::info!(
        "Zarejestrowano nowego użytkownika: {} (ID: {})",
        new_user.email,
        new_user.id
    );
    Ok((StatusCode::CREATED, Json(new_user.into())))
}

pub async fn login_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<LoginPayload>,
) -> Result<Json<LoginResponse>, AppError> {
    payload.validate()?;
    let email = payload.email.trim().to_lowercase();

    let user = sqlx::query_as::<_, User>(
        r#"
            SELECT id, email, password_hash, role, created_at, updated_at
            FROM users
            WHERE email = $1
        "#,
    )
    .bind(&email)
    .fetch_optional(&app_state.db_pool)
    .await?
    .ok_or_else(|| {
        tracing::warn!("Nieudana próba logowania: użytkownik {} nie znaleziony.", email);
        AppError::InvalidLoginCredentials
    })?;

    if !verify_password(&user.password_hash, &payload.password)? {
        tracing::warn!("Nieudana próba logowania dla {}: nieprawidłowe hasło.", email);
        return Err(AppError::InvalidLoginCredentials);
    }

    let token = create_jwt(
        user.id,
        user.role,
        &app_state.jwt_secret,
        app_state.jwt_expiration_hours,
    )?;

    tracing::info!("Użytkownik {} ({}) zalogowany pomyślnie.", user.email, user.id);
    Ok(Json(LoginResponse {
        token,
        token_type: "Bearer",
        expires_in_hours: app_state.jwt_expiration_hours,
    }))
}

pub async fn me_handler(
    State(app_state): State<Arc<AppState>>,
    claims: TokenClaims,
) -> Result<Json<UserPublic>, AppError> {
    let user = sqlx::query_as::<_, UserPublic>(
        "SELECT id, email, role, created_at, updated_at FROM users WHERE id = $1",
    )
    .bind(claims.sub)
    .fetch_optional(&app_state.db_pool)
    .await?
    .ok_or(AppError::NotFound)?;
    Ok(Json(user))
}

// --- KATALOG ---

pub async fn store_categories_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<CategoryTreeNode>>, AppError> {
    let tree = category_tree(&app_state.category_cache, &app_state.db_pool).await?;
    Ok(Json(active_tree_nodes(&tree)))
}

/// Kto przegląda listę produktów: sklep widzi tylko dostępne produkty, CMS wszystkie
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductScope {
    Storefront,
    Cms,
}

pub async fn fetch_product_page(
    pool: &PgPool,
    params: &ProductListingParams,
    scope: ProductScope,
) -> Result<PaginatedResponse<Product>, AppError> {
    let limit = params.limit();
    let offset = params.offset();

    let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
        "SELECT {PRODUCT_COLUMNS}, COUNT(*) OVER() AS total_count FROM products WHERE TRUE"
    ));

    let status = match scope {
        ProductScope::Storefront => Some(ProductStatus::Available),
        ProductScope::Cms => params.status(),
    };
    if let Some(status) = status {
        query_builder.push(" AND status = ").push_bind(status);
    }
    // Sklep nie pokazuje produktów z nieaktywnych kategorii
    if scope == ProductScope::Storefront {
        query_builder
            .push(" AND (category_id IS NULL OR category_id IN ")
            .push("(SELECT id FROM categories WHERE status = ")
            .push_bind(CategoryStatus::Active)
            .push("))");
    }
    // Kategoria główna obejmuje też produkty swoich podkategorii
    if let Some(category_id) = params.category_id() {
        query_builder
            .push(" AND (category_id = ")
            .push_bind(category_id)
            .push(" OR category_id IN (SELECT id FROM categories WHERE parent_id = ")
            .push_bind(category_id)
            .push("))");
    }
    if let Some(price_min) = params.price_min() {
        query_builder.push(" AND price >= ").push_bind(price_min);
    }
    if let Some(price_max) = params.price_max() {
        query_builder.push(" AND price <= ").push_bind(price_max);
    }
    if let Some(search_term) = params.search() {
        let like_pattern = format!("%{}%", search_term);
        query_builder
            .push(" AND (name ILIKE ")
            .push_bind(like_pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(like_pattern)
            .push(")");
    }

    query_builder.push(format!(
        " ORDER BY {} {}, id ASC",
        params.sort_column(),
        params.order()
    ));
    query_builder.push(" LIMIT ").push_bind(limit);
    query_builder.push(" OFFSET ").push_bind(offset);

    let rows: Vec<ProductWithTotalCount> = query_builder.build_query_as().fetch_all(pool).await?;

    let total_items = rows
        .first()
        .map_or(0, |row| row.total_count.unwrap_or(0));
    let products = rows.into_iter().map(|row| row.product).collect();

    Ok(PaginatedResponse::new(products, total_items, limit, offset))
}

pub async fn store_list_products_handler(
    State(app_state): State<Arc<AppState>>,
    Query(params): Query<ProductListingParams>,
) -> Result<Json<PaginatedResponse<Product>>, AppError> {
    tracing::debug!("GET /api/store/products z parametrami: {:?}", params);
    let page = fetch_product_page(&app_state.db_pool, &params, ProductScope::Storefront).await?;
    Ok(Json(page))
}

pub async fn store_product_details_handler(
    State(app_state): State<Arc<AppState>>,
    Path(product_id): Path<Uuid>,
) -> Result<Json<Product>, AppError> {
    // KROK 1: Sprawdź cache
    let product = match app_state.product_cache.get(&product_id).await {
        Some(product) => {
            tracing::debug!("Cache HIT dla produktu o ID: {}", product_id);
            product
        }
        None => {
            // KROK 2: Pobierz z bazy i zapisz w cache'u
            tracing::info!(
                "Cache MISS dla produktu o ID: {}. Pobieranie z bazy danych.",
                product_id
            );
            let product = sqlx::query_as::<_, Product>(&format!(
                "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
            ))
            .bind(product_id)
            .fetch_optional(&app_state.db_pool)
            .await?
            .ok_or_else(|| {
                tracing::warn!("Nie znaleziono produktu o ID: {}", product_id);
                AppError::NotFound
            })?;
            app_state
                .product_cache
                .insert(product.id, product.clone())
                .await;
            product
        }
    };

    // Ukryte produkty i produkty z nieaktywnych kategorii nie istnieją dla sklepu
    if product.status == ProductStatus::Hidden {
        return Err(AppError::NotFound);
    }
    if let Some(category_id) = product.category_id {
        let tree = category_tree(&app_state.category_cache, &app_state.db_pool).await?;
        if !tree.is_active(&category_id) {
            tracing::debug!(
                "Produkt {} należy do nieaktywnej kategorii {}",
                product_id,
                category_id
            );
            return Err(AppError::NotFound);
        }
    }
    Ok(Json(product))
}
