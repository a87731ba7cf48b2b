// src/cms_handlers.rs
// Handlery panelu administracyjnego (CMS). Każdy wymaga tokenu z rolą admin.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use sqlx::{PgConnection, Postgres, QueryBuilder};
use uuid::Uuid;
use validator::Validate;

use crate::auth_models::AdminClaims;
use crate::category_utils::{filter_subs, filtered_tree_nodes, parent_summaries, top_categories};
use crate::errors::AppError;
use crate::filters::{
    ActivityLogParams, CategoryListingParams, PageParams, ProductListingParams, SubCategoryParams,
};
use crate::handlers::{PRODUCT_COLUMNS, ProductScope, fetch_product_page};
use crate::models::{
    ActivityLog, ActivityLogWithTotalCount, AnalyticsSummary, Category, CategoryStatus,
    CategoryStatusChangeResponse, CategoryTreeNode, CreateCategoryPayload, CreateProductPayload,
    ParentCategorySummary, Product, ProductStatus, ReassignDeletePayload, ReassignDeleteResponse,
    Role, StatusCount, SubCategory, UpdateCategoryPayload, UpdateCategoryStatusPayload,
    UpdateProductPayload, UserPublic, UserPublicWithTotalCount,
};
use crate::pagination::PaginatedResponse;
use crate::services::{CATEGORY_COLUMNS, category_tree, sub_categories};
use crate::state::AppState;

const TOP_CATEGORIES_LIMIT: usize = 5;

// --- KATEGORIE: ODCZYT (przez cache) ---

pub async fn list_categories_handler(
    State(app_state): State<Arc<AppState>>,
    _admin: AdminClaims,
    Query(params): Query<CategoryListingParams>,
) -> Result<Json<PaginatedResponse<CategoryTreeNode>>, AppError> {
    let tree = category_tree(&app_state.category_cache, &app_state.db_pool).await?;
    let nodes = filtered_tree_nodes(&tree, &params);
    Ok(Json(PaginatedResponse::from_items(
        nodes,
        params.limit(),
        params.offset(),
    )))
}

pub async fn list_parent_categories_handler(
    State(app_state): State<Arc<AppState>>,
    _admin: AdminClaims,
) -> Result<Json<Vec<ParentCategorySummary>>, AppError> {
    let tree = category_tree(&app_state.category_cache, &app_state.db_pool).await?;
    Ok(Json(parent_summaries(&tree)))
}

pub async fn list_sub_categories_handler(
    State(app_state): State<Arc<AppState>>,
    _admin: AdminClaims,
    Query(params): Query<SubCategoryParams>,
) -> Result<Json<Vec<SubCategory>>, AppError> {
    let subs = sub_categories(&app_state.category_cache, &app_state.db_pool).await?;
    Ok(Json(filter_subs(&subs, &params)))
}

pub async fn get_category_handler(
    State(app_state): State<Arc<AppState>>,
    _admin: AdminClaims,
    Path(category_id): Path<Uuid>,
) -> Result<Json<Category>, AppError> {
    let mut conn = app_state.db_pool.acquire().await?;
    let category = fetch_category(&mut conn, category_id, RowLock::None)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(category))
}

// --- KATEGORIE: ZAPIS (każdy kończy się unieważnieniem cache'u) ---

/// Blokada wiersza kategorii zakładana przy odczycie wewnątrz transakcji
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowLock {
    None,
    /// Rodzic pod którego trafia podkategoria: blokuje równoległe przeniesienie lub zmianę statusu
    Share,
    Update,
}

impl RowLock {
    fn clause(self) -> &'static str {
        match self {
            RowLock::None => "",
            RowLock::Share => " FOR SHARE",
            RowLock::Update => " FOR UPDATE",
        }
    }
}

async fn fetch_category(
    conn: &mut PgConnection,
    category_id: Uuid,
    lock: RowLock,
) -> Result<Option<Category>, AppError> {
    let category = sqlx::query_as::<_, Category>(&format!(
        "SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1{}",
        lock.clause()
    ))
    .bind(category_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(category)
}

async fn count_children(conn: &mut PgConnection, category_id: Uuid) -> Result<i64, AppError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM categories WHERE parent_id = $1")
        .bind(category_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

async fn count_products(conn: &mut PgConnection, category_id: Uuid) -> Result<i64, AppError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM products WHERE category_id = $1")
        .bind(category_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

/// Sprawdza, czy `parent_id` może być rodzicem (kategoria istnieje i sama jest kategorią główną).
/// Wiersz rodzica pozostaje zablokowany do końca transakcji.
async fn load_valid_parent(
    conn: &mut PgConnection,
    parent_id: Uuid,
    child_id: Option<Uuid>,
) -> Result<Category, AppError> {
    if child_id == Some(parent_id) {
        return Err(AppError::UnprocessableEntity(
            "Kategoria nie może być swoim własnym rodzicem".to_string(),
        ));
    }
    let parent = fetch_category(conn, parent_id, RowLock::Share)
        .await?
        .ok_or_else(|| {
            AppError::UnprocessableEntity("Kategoria nadrzędna nie istnieje".to_string())
        })?;
    if parent.parent_id.is_some() {
        return Err(AppError::UnprocessableEntity(
            "Dozwolony jest tylko jeden poziom zagnieżdżenia kategorii".to_string(),
        ));
    }
    Ok(parent)
}

fn inactive_parent_error() -> AppError {
    AppError::UnprocessableEntity(
        "Nie można aktywować podkategorii, której rodzic jest nieaktywny".to_string(),
    )
}

fn normalized_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

pub async fn create_category_handler(
    State(app_state): State<Arc<AppState>>,
    AdminClaims(claims): AdminClaims,
    Json(payload): Json<CreateCategoryPayload>,
) -> Result<(StatusCode, Json<Category>), AppError> {
    payload.validate()?;
    let mut tx = app_state.db_pool.begin().await?;

    let parent = match payload.parent_id {
        Some(parent_id) => Some(load_valid_parent(&mut tx, parent_id, None).await?),
        None => None,
    };
    let parent_status = parent.as_ref().map(|p| p.status);

    // Bez jawnego statusu podkategoria dziedziczy status rodzica
    let status = payload
        .status
        .or(parent_status)
        .unwrap_or(CategoryStatus::Active);
    if status == CategoryStatus::Active && parent_status == Some(CategoryStatus::Inactive) {
        return Err(inactive_parent_error());
    }

    let category = sqlx::query_as::<_, Category>(&format!(
        r#"
            INSERT INTO categories (id, name, description, status, parent_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {CATEGORY_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(payload.name.trim())
    .bind(normalized_description(payload.description))
    .bind(status)
    .bind(payload.parent_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    app_state.category_cache.invalidate();

    tracing::info!(
        "Admin {} utworzył kategorię '{}' (ID: {})",
        claims.sub,
        category.name,
        category.id
    );
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update_category_handler(
    State(app_state): State<Arc<AppState>>,
    AdminClaims(claims): AdminClaims,
    Path(category_id): Path<Uuid>,
    Json(payload): Json<UpdateCategoryPayload>,
) -> Result<Json<Category>, AppError> {
    payload.validate()?;
    let mut tx = app_state.db_pool.begin().await?;

    let current = fetch_category(&mut tx, category_id, RowLock::Update)
        .await?
        .ok_or(AppError::NotFound)?;

    if payload.parent_id != current.parent_id {
        if let Some(parent_id) = payload.parent_id {
            let parent = load_valid_parent(&mut tx, parent_id, Some(category_id)).await?;
            if parent.status == CategoryStatus::Inactive && current.status == CategoryStatus::Active
            {
                return Err(inactive_parent_error());
            }
            if count_children(&mut tx, category_id).await? > 0 {
                return Err(AppError::UnprocessableEntity(
                    "Kategoria posiadająca podkategorie nie może zostać podkategorią".to_string(),
                ));
            }
        }
    }

    let updated = sqlx::query_as::<_, Category>(&format!(
        r#"
            UPDATE categories
            SET name = $1, description = $2, parent_id = $3, updated_at = NOW()
            WHERE id = $4
            RETURNING {CATEGORY_COLUMNS}
        "#
    ))
    .bind(payload.name.trim())
    .bind(normalized_description(payload.description))
    .bind(payload.parent_id)
    .bind(category_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    app_state.category_cache.invalidate();

    tracing::info!(
        "Admin {} zaktualizował kategorię {} (rodzic: {:?} -> {:?})",
        claims.sub,
        category_id,
        current.parent_id,
        updated.parent_id
    );
    Ok(Json(updated))
}

pub async fn update_category_status_handler(
    State(app_state): State<Arc<AppState>>,
    AdminClaims(claims): AdminClaims,
    Path(category_id): Path<Uuid>,
    Json(payload): Json<UpdateCategoryStatusPayload>,
) -> Result<Json<CategoryStatusChangeResponse>, AppError> {
    let mut tx = app_state.db_pool.begin().await?;

    let current = fetch_category(&mut tx, category_id, RowLock::Update)
        .await?
        .ok_or(AppError::NotFound)?;

    if let Some(parent_id) = current.parent_id {
        if payload.status == CategoryStatus::Active {
            let parent = fetch_category(&mut tx, parent_id, RowLock::Share)
                .await?
                .ok_or(AppError::NotFound)?;
            if parent.status == CategoryStatus::Inactive {
                return Err(inactive_parent_error());
            }
        }
    }

    let category = sqlx::query_as::<_, Category>(&format!(
        "UPDATE categories SET status = $1, updated_at = NOW() WHERE id = $2 RETURNING {CATEGORY_COLUMNS}"
    ))
    .bind(payload.status)
    .bind(category_id)
    .fetch_one(&mut *tx)
    .await?;

    // Status kategorii głównej przechodzi na wszystkie jej podkategorie
    let cascaded_children = if current.parent_id.is_none() {
        sqlx::query(
            "UPDATE categories SET status = $1, updated_at = NOW() WHERE parent_id = $2 AND status <> $1",
        )
        .bind(payload.status)
        .bind(category_id)
        .execute(&mut *tx)
        .await?
        .rows_affected()
    } else {
        0
    };

    tx.commit().await?;
    app_state.category_cache.invalidate();

    tracing::info!(
        "Admin {} zmienił status kategorii {} na {} (podkategorie: {})",
        claims.sub,
        category_id,
        payload.status,
        cascaded_children
    );
    Ok(Json(CategoryStatusChangeResponse {
        category,
        cascaded_children,
    }))
}

pub async fn delete_category_handler(
    State(app_state): State<Arc<AppState>>,
    AdminClaims(claims): AdminClaims,
    Path(category_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let mut tx = app_state.db_pool.begin().await?;

    fetch_category(&mut tx, category_id, RowLock::Update)
        .await?
        .ok_or(AppError::NotFound)?;

    if count_children(&mut tx, category_id).await? > 0 {
        return Err(AppError::Conflict(
            "Kategoria posiada podkategorie. Usuń je lub przenieś przed usunięciem.".to_string(),
        ));
    }
    if count_products(&mut tx, category_id).await? > 0 {
        return Err(AppError::Conflict(
            "Kategoria posiada produkty. Użyj usuwania z przeniesieniem produktów.".to_string(),
        ));
    }

    sqlx::query("DELETE FROM categories WHERE id = $1")
        .bind(category_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    app_state.category_cache.invalidate();

    tracing::info!("Admin {} usunął kategorię {}", claims.sub, category_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reassign_and_delete_category_handler(
    State(app_state): State<Arc<AppState>>,
    AdminClaims(claims): AdminClaims,
    Path(category_id): Path<Uuid>,
    Json(payload): Json<ReassignDeletePayload>,
) -> Result<Json<ReassignDeleteResponse>, AppError> {
    let target_id = payload.target_category_id;
    if target_id == category_id {
        return Err(AppError::UnprocessableEntity(
            "Kategoria docelowa musi być inna niż usuwana".to_string(),
        ));
    }

    let mut tx = app_state.db_pool.begin().await?;

    fetch_category(&mut tx, category_id, RowLock::Update)
        .await?
        .ok_or(AppError::NotFound)?;
    let target = fetch_category(&mut tx, target_id, RowLock::Update)
        .await?
        .ok_or_else(|| {
            AppError::UnprocessableEntity("Kategoria docelowa nie istnieje".to_string())
        })?;

    if target.parent_id == Some(category_id) {
        return Err(AppError::UnprocessableEntity(
            "Kategoria docelowa nie może być podkategorią usuwanej kategorii".to_string(),
        ));
    }

    let children = count_children(&mut tx, category_id).await?;
    if children > 0 && target.parent_id.is_some() {
        return Err(AppError::Conflict(
            "Podkategorie można przenieść tylko do kategorii głównej".to_string(),
        ));
    }

    // Pod nieaktywnym celem przenoszone podkategorie również stają się nieaktywne
    let moved_children = if children > 0 {
        sqlx::query(
            r#"
                UPDATE categories
                SET parent_id = $1,
                    status = CASE WHEN $3 THEN 'inactive'::category_status ELSE status END,
                    updated_at = NOW()
                WHERE parent_id = $2
            "#,
        )
        .bind(target_id)
        .bind(category_id)
        .bind(target.status == CategoryStatus::Inactive)
        .execute(&mut *tx)
        .await?
        .rows_affected()
    } else {
        0
    };

    let moved_products =
        sqlx::query("UPDATE products SET category_id = $1, updated_at = NOW() WHERE category_id = $2")
            .bind(target_id)
            .bind(category_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

    sqlx::query("DELETE FROM categories WHERE id = $1")
        .bind(category_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    app_state.category_cache.invalidate();
    if moved_products > 0 {
        app_state.product_cache.invalidate_all();
    }

    tracing::info!(
        "Admin {} usunął kategorię {} z przeniesieniem do {} (produkty: {}, podkategorie: {})",
        claims.sub,
        category_id,
        target_id,
        moved_products,
        moved_children
    );
    Ok(Json(ReassignDeleteResponse {
        deleted_category_id: category_id,
        target_category_id: target_id,
        moved_products,
        moved_children,
    }))
}

// --- PRODUKTY ---

async fn ensure_category_exists(
    conn: &mut PgConnection,
    category_id: Option<Uuid>,
) -> Result<(), AppError> {
    if let Some(category_id) = category_id {
        let category = fetch_category(conn, category_id, RowLock::Share).await?;
        if category.is_none() {
            return Err(AppError::UnprocessableEntity(format!(
                "Kategoria {} nie istnieje",
                category_id
            )));
        }
    }
    Ok(())
}

pub async fn cms_list_products_handler(
    State(app_state): State<Arc<AppState>>,
    _admin: AdminClaims,
    Query(params): Query<ProductListingParams>,
) -> Result<Json<PaginatedResponse<Product>>, AppError> {
    let page = fetch_product_page(&app_state.db_pool, &params, ProductScope::Cms).await?;
    Ok(Json(page))
}

pub async fn create_product_handler(
    State(app_state): State<Arc<AppState>>,
    AdminClaims(claims): AdminClaims,
    Json(payload): Json<CreateProductPayload>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    payload.validate()?;
    let mut tx = app_state.db_pool.begin().await?;
    ensure_category_exists(&mut tx, payload.category_id).await?;

    let product = sqlx::query_as::<_, Product>(&format!(
        r#"
            INSERT INTO products (id, name, description, price, category_id, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {PRODUCT_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(payload.name.trim())
    .bind(payload.description.trim())
    .bind(payload.price)
    .bind(payload.category_id)
    .bind(payload.status.unwrap_or(ProductStatus::Available))
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    if product.category_id.is_some() {
        // Liczniki produktów są częścią migawki drzewa
        app_state.category_cache.invalidate();
    }

    tracing::info!("Admin {} utworzył produkt o ID: {}", claims.sub, product.id);
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update_product_handler(
    State(app_state): State<Arc<AppState>>,
    AdminClaims(claims): AdminClaims,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<UpdateProductPayload>,
) -> Result<Json<Product>, AppError> {
    payload.validate()?;
    let mut tx = app_state.db_pool.begin().await?;

    let current = sqlx::query_as::<_, Product>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE"
    ))
    .bind(product_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound)?;

    let category_id = payload.category_id.unwrap_or(current.category_id);
    if category_id != current.category_id {
        ensure_category_exists(&mut tx, category_id).await?;
    }

    let updated = sqlx::query_as::<_, Product>(&format!(
        r#"
            UPDATE products
            SET name = $1, description = $2, price = $3, category_id = $4, status = $5, updated_at = NOW()
            WHERE id = $6
            RETURNING {PRODUCT_COLUMNS}
        "#
    ))
    .bind(payload.name.as_deref().map(str::trim).unwrap_or(&current.name))
    .bind(
        payload
            .description
            .as_deref()
            .map(str::trim)
            .unwrap_or(&current.description),
    )
    .bind(payload.price.unwrap_or(current.price))
    .bind(category_id)
    .bind(payload.status.unwrap_or(current.status))
    .bind(product_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    app_state.product_cache.invalidate(&product_id).await;
    if updated.category_id != current.category_id {
        app_state.category_cache.invalidate();
    }

    tracing::info!("Admin {} zaktualizował produkt o ID: {}", claims.sub, product_id);
    Ok(Json(updated))
}

pub async fn delete_product_handler(
    State(app_state): State<Arc<AppState>>,
    AdminClaims(claims): AdminClaims,
    Path(product_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let deleted_category = sqlx::query_scalar::<_, Option<Uuid>>(
        "DELETE FROM products WHERE id = $1 RETURNING category_id",
    )
    .bind(product_id)
    .fetch_optional(&app_state.db_pool)
    .await?
    .ok_or(AppError::NotFound)?;

    app_state.product_cache.invalidate(&product_id).await;
    if deleted_category.is_some() {
        app_state.category_cache.invalidate();
    }

    tracing::info!("Admin {} usunął produkt o ID: {}", claims.sub, product_id);
    Ok(StatusCode::NO_CONTENT)
}

// --- KLIENCI ---

pub async fn list_customers_handler(
    State(app_state): State<Arc<AppState>>,
    _admin: AdminClaims,
    Query(params): Query<PageParams>,
) -> Result<Json<PaginatedResponse<UserPublic>>, AppError> {
    let limit = params.limit();
    let offset = params.offset();

    let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT id, email, role, created_at, updated_at, COUNT(*) OVER() AS total_count FROM users WHERE role = ",
    );
    query_builder.push_bind(Role::Customer);
    if let Some(search_term) = params.search() {
        query_builder
            .push(" AND email ILIKE ")
            .push_bind(format!("%{}%", search_term));
    }
    query_builder.push(" ORDER BY created_at DESC, id ASC");
    query_builder.push(" LIMIT ").push_bind(limit);
    query_builder.push(" OFFSET ").push_bind(offset);

    let rows: Vec<UserPublicWithTotalCount> = query_builder
        .build_query_as()
        .fetch_all(&app_state.db_pool)
        .await?;
    let total_items = rows
        .first()
        .map_or(0, |row| row.total_count.unwrap_or(0));
    let customers = rows.into_iter().map(|row| row.user).collect();

    Ok(Json(PaginatedResponse::new(
        customers,
        total_items,
        limit,
        offset,
    )))
}

// --- ANALITYKA ---

pub async fn analytics_summary_handler(
    State(app_state): State<Arc<AppState>>,
    _admin: AdminClaims,
) -> Result<Json<AnalyticsSummary>, AppError> {
    let categories_by_status = sqlx::query_as::<_, StatusCount>(
        "SELECT status::text AS status, COUNT(*) AS count FROM categories GROUP BY status ORDER BY status",
    )
    .fetch_all(&app_state.db_pool)
    .await?;

    let products_by_status = sqlx::query_as::<_, StatusCount>(
        "SELECT status::text AS status, COUNT(*) AS count FROM products GROUP BY status ORDER BY status",
    )
    .fetch_all(&app_state.db_pool)
    .await?;

    let customers_total =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE role = $1")
            .bind(Role::Customer)
            .fetch_one(&app_state.db_pool)
            .await?;

    let tree = category_tree(&app_state.category_cache, &app_state.db_pool).await?;

    Ok(Json(AnalyticsSummary {
        categories_by_status,
        products_by_status,
        customers_total,
        top_categories: top_categories(&tree, TOP_CATEGORIES_LIMIT),
    }))
}

// --- DZIENNIK AKTYWNOŚCI ---

pub async fn list_activity_logs_handler(
    State(app_state): State<Arc<AppState>>,
    _admin: AdminClaims,
    Query(params): Query<ActivityLogParams>,
) -> Result<Json<PaginatedResponse<ActivityLog>>, AppError> {
    let limit = params.limit();
    let offset = params.offset();

    let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
        r#"
            SELECT id, actor_id, method, path, resource, resource_id, action, changes, created_at,
                   COUNT(*) OVER() AS total_count
            FROM activity_logs
        "#,
    );
    if let Some(resource) = params.resource() {
        query_builder.push(" WHERE resource = ").push_bind(resource.to_owned());
    }
    query_builder.push(" ORDER BY created_at DESC, id DESC");
    query_builder.push(" LIMIT ").push_bind(limit);
    query_builder.push(" OFFSET ").push_bind(offset);

    let rows: Vec<ActivityLogWithTotalCount> = query_builder
        .build_query_as()
        .fetch_all(&app_state.db_pool)
        .await?;
    let total_items = rows
        .first()
        .map_or(0, |row| row.total_count.unwrap_or(0));
    let logs = rows.into_iter().map(|row| row.log).collect();

    Ok(Json(PaginatedResponse::new(logs, total_items, limit, offset)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::create_jwt;
    use crate::router::{build_router, cors_layer};
    use axum::body::Body;
    use axum::http::{Method, Request, header};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use sqlx::PgPool;
    use std::time::Duration;
    use tower::ServiceExt;

    const SECRET: &str = "testowy-sekret";

    fn state_with(pool: PgPool) -> Arc<AppState> {
        Arc::new(AppState::new(
            pool,
            SECRET.to_string(),
            1,
            Duration::from_secs(300),
        ))
    }

    async fn send(
        state: Arc<AppState>,
        method: Method,
        uri: String,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let token = create_jwt(Uuid::new_v4(), Role::Admin, SECRET, 1).unwrap();
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"));
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let app = build_router(state, cors_layer(None).unwrap());
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn get(state: &Arc<AppState>, uri: &str) -> Value {
        let (status, body) = send(state.clone(), Method::GET, uri.to_string(), None).await;
        assert_eq!(status, StatusCode::OK, "GET {uri}: {body}");
        body
    }

    async fn insert_category(
        pool: &PgPool,
        name: &str,
        parent_id: Option<Uuid>,
        status: CategoryStatus,
    ) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO categories (id, name, status, parent_id) VALUES ($1, $2, $3, $4)")
            .bind(id)
            .bind(name)
            .bind(status)
            .bind(parent_id)
            .execute(pool)
            .await
            .unwrap();
        id
    }

    async fn insert_product(pool: &PgPool, name: &str, category_id: Option<Uuid>) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO products (id, name, price, category_id) VALUES ($1, $2, $3, $4)")
            .bind(id)
            .bind(name)
            .bind(1_000_i64)
            .bind(category_id)
            .execute(pool)
            .await
            .unwrap();
        id
    }

    async fn activity_for(pool: &PgPool, resource_id: Uuid) -> Vec<(String, Value)> {
        sqlx::query_as::<_, (String, Value)>(
            "SELECT action, changes FROM activity_logs WHERE resource_id = $1 ORDER BY id",
        )
        .bind(resource_id)
        .fetch_all(pool)
        .await
        .unwrap()
    }

    fn find<'a>(items: &'a Value, id: Uuid) -> &'a Value {
        items
            .as_array()
            .unwrap()
            .iter()
            .find(|item| item["id"] == id.to_string())
            .unwrap_or_else(|| panic!("brak {id} w {items}"))
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn creating_child_refreshes_parent_summary(pool: PgPool) {
        let state = state_with(pool.clone());
        let parent = insert_category(&pool, "Odzież", None, CategoryStatus::Active).await;

        let parents = get(&state, "/api/cms/categories/parents").await;
        assert_eq!(find(&parents, parent)["children_count"], 0);

        let (status, created) = send(
            state.clone(),
            Method::POST,
            "/api/cms/categories".to_string(),
            Some(json!({ "name": "Koszule", "parent_id": parent })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(state.category_cache.get_tree().is_none());
        assert!(state.category_cache.get_subs().is_none());

        let parents = get(&state, "/api/cms/categories/parents").await;
        assert_eq!(find(&parents, parent)["children_count"], 1);

        let child_id: Uuid = serde_json::from_value(created["id"].clone()).unwrap();
        let log = activity_for(&pool, child_id).await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].0, "create");
        assert_eq!(log[0].1["name"]["new"], "Koszule");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn child_of_inactive_parent_inherits_status(pool: PgPool) {
        let state = state_with(pool.clone());
        let parent = insert_category(&pool, "Archiwum", None, CategoryStatus::Inactive).await;

        let (status, created) = send(
            state.clone(),
            Method::POST,
            "/api/cms/categories".to_string(),
            Some(json!({ "name": "Stare", "parent_id": parent })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], "inactive");

        let (status, _) = send(
            state.clone(),
            Method::POST,
            "/api/cms/categories".to_string(),
            Some(json!({ "name": "Nowe", "parent_id": parent, "status": "active" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn rename_is_visible_in_next_tree_read(pool: PgPool) {
        let state = state_with(pool.clone());
        let parent = insert_category(&pool, "Obuwie", None, CategoryStatus::Active).await;

        let tree = get(&state, "/api/cms/categories").await;
        assert_eq!(find(&tree["data"], parent)["name"], "Obuwie");

        let (status, _) = send(
            state.clone(),
            Method::PUT,
            format!("/api/cms/categories/{parent}"),
            Some(json!({ "name": "Buty" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let tree = get(&state, "/api/cms/categories").await;
        assert_eq!(find(&tree["data"], parent)["name"], "Buty");

        let log = activity_for(&pool, parent).await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].0, "update");
        assert_eq!(log[0].1, json!({ "name": { "old": "Obuwie", "new": "Buty" } }));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn nesting_rules_are_enforced_on_update(pool: PgPool) {
        let state = state_with(pool.clone());
        let parent = insert_category(&pool, "Odzież", None, CategoryStatus::Active).await;
        let child = insert_category(&pool, "Koszule", Some(parent), CategoryStatus::Active).await;
        let other = insert_category(&pool, "Dodatki", None, CategoryStatus::Active).await;
        let archive = insert_category(&pool, "Archiwum", None, CategoryStatus::Inactive).await;

        let cases = [
            (parent, json!({ "name": "Odzież", "parent_id": other })),
            (other, json!({ "name": "Dodatki", "parent_id": child })),
            (other, json!({ "name": "Dodatki", "parent_id": other })),
            (child, json!({ "name": "Koszule", "parent_id": archive })),
        ];
        for (id, body) in cases {
            let (status, _) = send(
                state.clone(),
                Method::PUT,
                format!("/api/cms/categories/{id}"),
                Some(body.clone()),
            )
            .await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{id}: {body}");
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn new_child_waits_for_parent_being_moved(pool: PgPool) {
        let state = state_with(pool.clone());
        let outer = insert_category(&pool, "Dom", None, CategoryStatus::Active).await;
        let moving = insert_category(&pool, "Kuchnia", None, CategoryStatus::Active).await;

        // Niezatwierdzone przeniesienie `moving` pod `outer`
        let mut tx = pool.begin().await.unwrap();
        sqlx::query("UPDATE categories SET parent_id = $1 WHERE id = $2")
            .bind(outer)
            .bind(moving)
            .execute(&mut *tx)
            .await
            .unwrap();

        let create = tokio::spawn(send(
            state.clone(),
            Method::POST,
            "/api/cms/categories".to_string(),
            Some(json!({ "name": "Garnki", "parent_id": moving })),
        ));
        tokio::time::sleep(Duration::from_millis(300)).await;
        tx.commit().await.unwrap();

        let (status, _) = create.await.unwrap();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let grandchildren = sqlx::query_scalar::<_, i64>(
            r#"
                SELECT COUNT(*) FROM categories c
                JOIN categories p ON p.id = c.parent_id
                WHERE p.parent_id IS NOT NULL
            "#,
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(grandchildren, 0);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn status_change_cascades_and_logs_every_child(pool: PgPool) {
        let state = state_with(pool.clone());
        let parent = insert_category(&pool, "Odzież", None, CategoryStatus::Active).await;
        let shirts = insert_category(&pool, "Koszule", Some(parent), CategoryStatus::Active).await;
        let coats = insert_category(&pool, "Płaszcze", Some(parent), CategoryStatus::Active).await;

        get(&state, "/api/cms/categories/subs").await;
        let store = get(&state, "/api/store/categories").await;
        assert_eq!(store.as_array().unwrap().len(), 1);

        let (status, body) = send(
            state.clone(),
            Method::PATCH,
            format!("/api/cms/categories/{parent}/status"),
            Some(json!({ "status": "inactive" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cascaded_children"], 2);

        let subs = get(&state, "/api/cms/categories/subs").await;
        assert_eq!(find(&subs, shirts)["status"], "inactive");
        assert_eq!(find(&subs, coats)["status"], "inactive");
        let store = get(&state, "/api/store/categories").await;
        assert!(store.as_array().unwrap().is_empty());

        for id in [parent, shirts, coats] {
            let log = activity_for(&pool, id).await;
            assert_eq!(log.len(), 1, "{id}");
            assert_eq!(
                log[0].1["status"],
                json!({ "old": "active", "new": "inactive" })
            );
        }

        let (status, _) = send(
            state.clone(),
            Method::PATCH,
            format!("/api/cms/categories/{shirts}/status"),
            Some(json!({ "status": "active" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn delete_refuses_categories_in_use(pool: PgPool) {
        let state = state_with(pool.clone());
        let parent = insert_category(&pool, "Odzież", None, CategoryStatus::Active).await;
        let child = insert_category(&pool, "Koszule", Some(parent), CategoryStatus::Active).await;
        let empty = insert_category(&pool, "Puste", None, CategoryStatus::Active).await;
        insert_product(&pool, "Koszula", Some(child)).await;

        for id in [parent, child] {
            let (status, _) = send(
                state.clone(),
                Method::DELETE,
                format!("/api/cms/categories/{id}"),
                None,
            )
            .await;
            assert_eq!(status, StatusCode::CONFLICT);
        }

        let parents = get(&state, "/api/cms/categories/parents").await;
        assert_eq!(parents.as_array().unwrap().len(), 2);

        let (status, _) = send(
            state.clone(),
            Method::DELETE,
            format!("/api/cms/categories/{empty}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let parents = get(&state, "/api/cms/categories/parents").await;
        assert_eq!(parents.as_array().unwrap().len(), 1);
        let log = activity_for(&pool, empty).await;
        assert_eq!(log[0].0, "delete");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn reassign_delete_moves_children_and_products(pool: PgPool) {
        let state = state_with(pool.clone());
        let old = insert_category(&pool, "Stara", None, CategoryStatus::Active).await;
        let child = insert_category(&pool, "Dziecko", Some(old), CategoryStatus::Active).await;
        let target = insert_category(&pool, "Docelowa", None, CategoryStatus::Active).await;
        let product = insert_product(&pool, "Produkt", Some(old)).await;

        get(&state, "/api/cms/categories/subs").await;

        let (status, body) = send(
            state.clone(),
            Method::POST,
            format!("/api/cms/categories/{old}/reassign-delete"),
            Some(json!({ "target_category_id": target })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["moved_children"], 1);
        assert_eq!(body["moved_products"], 1);

        let subs = get(&state, "/api/cms/categories/subs").await;
        assert_eq!(find(&subs, child)["parent_name"], "Docelowa");
        assert_eq!(find(&subs, child)["status"], "active");

        let parents = get(&state, "/api/cms/categories/parents").await;
        assert_eq!(find(&parents, target)["total_product_count"], 1);

        let moved_to = sqlx::query_scalar::<_, Option<Uuid>>(
            "SELECT category_id FROM products WHERE id = $1",
        )
        .bind(product)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(moved_to, Some(target));

        assert_eq!(activity_for(&pool, old).await[0].0, "delete");
        let child_log = activity_for(&pool, child).await;
        assert_eq!(child_log.len(), 1);
        assert_eq!(child_log[0].1["parent_id"]["new"], target.to_string());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn children_moved_under_inactive_target_are_deactivated(pool: PgPool) {
        let state = state_with(pool.clone());
        let old = insert_category(&pool, "Stara", None, CategoryStatus::Active).await;
        let child = insert_category(&pool, "Dziecko", Some(old), CategoryStatus::Active).await;
        let target = insert_category(&pool, "Archiwum", None, CategoryStatus::Inactive).await;

        let (status, _) = send(
            state.clone(),
            Method::POST,
            format!("/api/cms/categories/{old}/reassign-delete"),
            Some(json!({ "target_category_id": target })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let subs = get(&state, "/api/cms/categories/subs").await;
        assert_eq!(find(&subs, child)["parent_name"], "Archiwum");
        assert_eq!(find(&subs, child)["status"], "inactive");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn reassign_delete_rejects_invalid_targets(pool: PgPool) {
        let state = state_with(pool.clone());
        let old = insert_category(&pool, "Stara", None, CategoryStatus::Active).await;
        let child = insert_category(&pool, "Dziecko", Some(old), CategoryStatus::Active).await;
        let other = insert_category(&pool, "Inna", None, CategoryStatus::Active).await;
        let nested =
            insert_category(&pool, "Zagnieżdżona", Some(other), CategoryStatus::Active).await;

        let cases = [
            (old, StatusCode::UNPROCESSABLE_ENTITY),
            (child, StatusCode::UNPROCESSABLE_ENTITY),
            (Uuid::new_v4(), StatusCode::UNPROCESSABLE_ENTITY),
            (nested, StatusCode::CONFLICT),
        ];
        for (target, expected) in cases {
            let (status, _) = send(
                state.clone(),
                Method::POST,
                format!("/api/cms/categories/{old}/reassign-delete"),
                Some(json!({ "target_category_id": target })),
            )
            .await;
            assert_eq!(status, expected, "cel {target}");
        }

        let remaining = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM categories")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, 4);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn product_can_be_detached_from_category(pool: PgPool) {
        let state = state_with(pool.clone());
        let category = insert_category(&pool, "Odzież", None, CategoryStatus::Active).await;
        let product = insert_product(&pool, "Koszula", Some(category)).await;

        let parents = get(&state, "/api/cms/categories/parents").await;
        assert_eq!(find(&parents, category)["product_count"], 1);

        let (status, body) = send(
            state.clone(),
            Method::PATCH,
            format!("/api/cms/products/{product}"),
            Some(json!({ "category_id": null })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["category_id"], Value::Null);

        let parents = get(&state, "/api/cms/categories/parents").await;
        assert_eq!(find(&parents, category)["product_count"], 0);

        let (status, body) = send(
            state.clone(),
            Method::PATCH,
            format!("/api/cms/products/{product}"),
            Some(json!({ "price": 2_500 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["category_id"], Value::Null);
        assert_eq!(body["price"], 2_500);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn storefront_skips_products_of_inactive_categories(pool: PgPool) {
        let state = state_with(pool.clone());
        let active = insert_category(&pool, "Odzież", None, CategoryStatus::Active).await;
        let inactive = insert_category(&pool, "Archiwum", None, CategoryStatus::Inactive).await;
        let shown = insert_product(&pool, "Koszula", Some(active)).await;
        let uncategorized = insert_product(&pool, "Gadżet", None).await;
        let hidden = insert_product(&pool, "Stary płaszcz", Some(inactive)).await;

        let page = get(&state, "/api/store/products").await;
        assert_eq!(page["total_items"], 2);
        find(&page["data"], shown);
        find(&page["data"], uncategorized);

        let (status, _) = send(
            state.clone(),
            Method::GET,
            format!("/api/store/products/{hidden}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let cms_page = get(&state, "/api/cms/products").await;
        assert_eq!(cms_page["total_items"], 3);
    }
}
