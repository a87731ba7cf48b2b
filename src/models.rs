// src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Type;
use strum::Display;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Type, Display)]
#[sqlx(type_name = "category_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CategoryStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Type, Display)]
#[sqlx(type_name = "product_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProductStatus {
    Available,
    Hidden,
    Sold,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Customer,
}

// --- KATEGORIE ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: CategoryStatus,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Kategoria główna z wczytanymi podkategoriami (tylko jeden poziom zagnieżdżenia)
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategoryWithChildren {
    #[serde(flatten)]
    pub category: Category,
    pub children: Vec<Category>,
}

/// Podkategoria z nazwą rodzica pobraną z bazy
#[derive(Debug, Clone, Serialize, PartialEq, sqlx::FromRow)]
pub struct SubCategory {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub category: Category,
    pub parent_name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCategoryPayload {
    #[validate(length(min = 1, max = 100, message = "Nazwa kategorii musi mieć od 1 do 100 znaków"))]
    pub name: String,
    #[validate(length(max = 2000, message = "Opis kategorii jest za długi"))]
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub status: Option<CategoryStatus>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCategoryPayload {
    #[validate(length(min = 1, max = 100, message = "Nazwa kategorii musi mieć od 1 do 100 znaków"))]
    pub name: String,
    #[validate(length(max = 2000, message = "Opis kategorii jest za długi"))]
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCategoryStatusPayload {
    pub status: CategoryStatus,
}

#[derive(Debug, Deserialize)]
pub struct ReassignDeletePayload {
    pub target_category_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CategoryStatusChangeResponse {
    pub category: Category,
    pub cascaded_children: u64,
}

#[derive(Debug, Serialize)]
pub struct ReassignDeleteResponse {
    pub deleted_category_id: Uuid,
    pub target_category_id: Uuid,
    pub moved_products: u64,
    pub moved_children: u64,
}

// --- ODPOWIEDZI DRZEWA KATEGORII ---

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategoryNode {
    #[serde(flatten)]
    pub category: Category,
    pub product_count: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategoryTreeNode {
    #[serde(flatten)]
    pub category: Category,
    pub product_count: i64,
    /// Produkty kategorii razem z produktami jej dzieci
    pub total_product_count: i64,
    pub children: Vec<CategoryNode>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ParentCategorySummary {
    #[serde(flatten)]
    pub category: Category,
    pub product_count: i64,
    pub total_product_count: i64,
    pub children_count: usize,
}

// --- PRODUKTY ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub price: i64,
    pub category_id: Option<Uuid>,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductWithTotalCount {
    #[sqlx(flatten)]
    pub product: Product,
    pub total_count: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductPayload {
    #[validate(length(min = 1, max = 255, message = "Nazwa produktu musi mieć od 1 do 255 znaków"))]
    pub name: String,
    #[validate(length(max = 5000, message = "Opis produktu jest za długi"))]
    #[serde(default)]
    pub description: String,
    #[validate(range(min = 0, message = "Cena nie może być ujemna"))]
    pub price: i64,
    pub category_id: Option<Uuid>,
    pub status: Option<ProductStatus>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProductPayload {
    #[validate(length(min = 1, max = 255, message = "Nazwa produktu musi mieć od 1 do 255 znaków"))]
    pub name: Option<String>,
    #[validate(length(max = 5000, message = "Opis produktu jest za długi"))]
    pub description: Option<String>,
    #[validate(range(min = 0, message = "Cena nie może być ujemna"))]
    pub price: Option<i64>,
    /// Brak pola: bez zmian, `null`: odłączenie od kategorii
    #[serde(default, deserialize_with = "deserialize_present")]
    pub category_id: Option<Option<Uuid>>,
    pub status: Option<ProductStatus>,
}

// Odróżnia pole pominięte (None) od pola z wartością null (Some(None))
fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::deserialize(deserializer).map(Some)
}

// --- UŻYTKOWNICY ---

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct UserPublic {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct UserPublicWithTotalCount {
    #[sqlx(flatten)]
    pub user: UserPublic,
    pub total_count: Option<i64>,
}

impl From<User> for UserPublic {
    fn from(user: User) -> Self {
        UserPublic {
            id: user.id,
            email: user.email,
            role: user.role,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

// --- DZIENNIK AKTYWNOŚCI ---

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ActivityLog {
    pub id: i64,
    pub actor_id: Option<Uuid>,
    pub method: String,
    pub path: String,
    pub resource: String,
    pub resource_id: Option<Uuid>,
    pub action: String,
    pub changes: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct ActivityLogWithTotalCount {
    #[sqlx(flatten)]
    pub log: ActivityLog,
    pub total_count: Option<i64>,
}

// --- ANALITYKA ---

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct TopCategory {
    pub id: Uuid,
    pub name: String,
    pub product_count: i64,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsSummary {
    pub categories_by_status: Vec<StatusCount>,
    pub products_by_status: Vec<StatusCount>,
    pub customers_total: i64,
    pub top_categories: Vec<TopCategory>,
}
