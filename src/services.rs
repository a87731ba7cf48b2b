// src/services.rs

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::category_cache::{CategoryCache, CategoryTree};
use crate::errors::AppError;
use crate::models::{Category, CategoryWithChildren, SubCategory};

pub const CATEGORY_COLUMNS: &str =
    "id, name, description, status, parent_id, created_at, updated_at";

/// Źródło prawdy dla danych kategorii, z którego cache jest uzupełniany przy chybieniu.
#[async_trait]
pub trait CategorySource: Send + Sync {
    async fn fetch_tree(&self) -> Result<CategoryTree, AppError>;
    async fn fetch_subs(&self) -> Result<Vec<SubCategory>, AppError>;
}

#[async_trait]
impl CategorySource for PgPool {
    async fn fetch_tree(&self) -> Result<CategoryTree, AppError> {
        let parents = sqlx::query_as::<_, Category>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE parent_id IS NULL ORDER BY name ASC"
        ))
        .fetch_all(self)
        .await?;

        // Jeden poziom zagnieżdżenia: dzieci wszystkich rodziców jednym zapytaniem
        let parent_ids: Vec<Uuid> = parents.iter().map(|p| p.id).collect();
        let children = sqlx::query_as::<_, Category>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE parent_id = ANY($1) ORDER BY name ASC"
        ))
        .bind(&parent_ids)
        .fetch_all(self)
        .await?;

        let mut children_by_parent: HashMap<Uuid, Vec<Category>> = HashMap::new();
        for child in children {
            if let Some(parent_id) = child.parent_id {
                children_by_parent.entry(parent_id).or_default().push(child);
            }
        }

        let parents = parents
            .into_iter()
            .map(|category| {
                let children = children_by_parent.remove(&category.id).unwrap_or_default();
                CategoryWithChildren { category, children }
            })
            .collect();

        let product_counts: HashMap<String, i64> = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT category_id::text, COUNT(*)
            FROM products
            WHERE category_id IS NOT NULL
            GROUP BY category_id
            "#,
        )
        .fetch_all(self)
        .await?
        .into_iter()
        .collect();

        Ok(CategoryTree {
            parents,
            product_counts,
        })
    }

    async fn fetch_subs(&self) -> Result<Vec<SubCategory>, AppError> {
        let subs = sqlx::query_as::<_, SubCategory>(
            r#"
            SELECT c.id, c.name, c.description, c.status, c.parent_id,
                   c.created_at, c.updated_at, p.name AS parent_name
            FROM categories c
            JOIN categories p ON p.id = c.parent_id
            ORDER BY p.name ASC, c.name ASC
            "#,
        )
        .fetch_all(self)
        .await?;
        Ok(subs)
    }
}

/// Zwraca drzewo kategorii.
///
/// 1. Najpierw sprawdza cache.
/// 2. Przy chybieniu pobiera całe drzewo i liczniki produktów ze źródła.
/// 3. Dopiero po udanym pobraniu zapisuje wynik w cache'u; błąd zostawia cache nietknięty.
pub async fn category_tree<S>(
    cache: &CategoryCache,
    source: &S,
) -> Result<Arc<CategoryTree>, AppError>
where
    S: CategorySource + ?Sized,
{
    if let Some(tree) = cache.get_tree() {
        tracing::debug!("Cache HIT dla drzewa kategorii");
        return Ok(tree);
    }

    tracing::info!("Cache MISS dla drzewa kategorii. Pobieranie z bazy.");
    let fetched = source.fetch_tree().await.map_err(|e| {
        tracing::error!("Nie udało się pobrać drzewa kategorii: {:?}", e);
        e
    })?;

    Ok(cache.set_tree(fetched.parents, fetched.product_counts))
}

/// Zwraca listę podkategorii z nazwami rodziców (ta sama zasada co `category_tree`).
pub async fn sub_categories<S>(
    cache: &CategoryCache,
    source: &S,
) -> Result<Arc<Vec<SubCategory>>, AppError>
where
    S: CategorySource + ?Sized,
{
    if let Some(subs) = cache.get_subs() {
        tracing::debug!("Cache HIT dla listy podkategorii");
        return Ok(subs);
    }

    tracing::info!("Cache MISS dla listy podkategorii. Pobieranie z bazy.");
    let fetched = source.fetch_subs().await.map_err(|e| {
        tracing::error!("Nie udało się pobrać podkategorii: {:?}", e);
        e
    })?;

    Ok(cache.set_subs(fetched))
}
