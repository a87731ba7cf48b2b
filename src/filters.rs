// src/filters.rs
use crate::models::{CategoryStatus, ProductStatus};
use serde::Deserialize;
use uuid::Uuid;

const DEFAULT_PAGE_LIMIT: i64 = 10;
const MAX_PAGE_LIMIT: i64 = 50;
const DEFAULT_SORT_BY: &str = "name";
const DEFAULT_SORT_ORDER: &str = "asc";

fn clamp_limit(limit: Option<i64>) -> i64 {
    match limit {
        Some(limit) if limit > 0 && limit <= MAX_PAGE_LIMIT => limit,
        Some(_) => MAX_PAGE_LIMIT,
        None => DEFAULT_PAGE_LIMIT,
    }
}

fn non_negative_offset(offset: Option<i64>) -> i64 {
    offset.unwrap_or(0).max(0)
}

fn trimmed_search(search: &Option<String>) -> Option<&str> {
    search.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Parametry listy kategorii w CMS (filtrowanie i paginacja w pamięci)
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CategoryListingParams {
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    offset: Option<i64>,
    #[serde(default)]
    search: Option<String>,
    #[serde(default)]
    status: Option<CategoryStatus>,
}

impl CategoryListingParams {
    pub fn limit(&self) -> i64 {
        clamp_limit(self.limit)
    }

    pub fn offset(&self) -> i64 {
        non_negative_offset(self.offset)
    }

    /// Fraza wyszukiwania zamieniona na małe litery
    pub fn search(&self) -> Option<String> {
        trimmed_search(&self.search).map(str::to_lowercase)
    }

    pub fn status(&self) -> Option<CategoryStatus> {
        self.status
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SubCategoryParams {
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub status: Option<CategoryStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProductListingParams {
    // Paginacja
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    offset: Option<i64>,

    // Filtry
    #[serde(default)]
    category_id: Option<Uuid>,
    #[serde(default)]
    status: Option<ProductStatus>,
    #[serde(default)]
    price_min: Option<i64>,
    #[serde(default)]
    price_max: Option<i64>,
    #[serde(default)]
    search: Option<String>,

    // Sortowanie
    #[serde(default)]
    sort_by: Option<String>,
    #[serde(default)]
    order: Option<String>,
}

impl ProductListingParams {
    pub fn limit(&self) -> i64 {
        clamp_limit(self.limit)
    }

    pub fn offset(&self) -> i64 {
        non_negative_offset(self.offset)
    }

    pub fn category_id(&self) -> Option<Uuid> {
        self.category_id
    }
    pub fn status(&self) -> Option<ProductStatus> {
        self.status
    }
    pub fn price_min(&self) -> Option<i64> {
        self.price_min
    }
    pub fn price_max(&self) -> Option<i64> {
        self.price_max
    }
    pub fn search(&self) -> Option<&str> {
        trimmed_search(&self.search)
    }

    /// Kolumna sortowania z białej listy
    pub fn sort_column(&self) -> &'static str {
        match self.sort_by.as_deref().unwrap_or(DEFAULT_SORT_BY) {
            "price" => "price",
            "created_at" => "created_at",
            _ => "name",
        }
    }

    pub fn order(&self) -> &'static str {
        self.order.as_deref().map_or(DEFAULT_SORT_ORDER, |o| {
            if o.eq_ignore_ascii_case("desc") {
                "desc"
            } else {
                "asc"
            }
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PageParams {
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    offset: Option<i64>,
    #[serde(default)]
    search: Option<String>,
}

impl PageParams {
    pub fn limit(&self) -> i64 {
        clamp_limit(self.limit)
    }

    pub fn offset(&self) -> i64 {
        non_negative_offset(self.offset)
    }

    pub fn search(&self) -> Option<&str> {
        trimmed_search(&self.search)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ActivityLogParams {
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    offset: Option<i64>,
    #[serde(default)]
    resource: Option<String>,
}

impl ActivityLogParams {
    pub fn limit(&self) -> i64 {
        clamp_limit(self.limit)
    }

    pub fn offset(&self) -> i64 {
        non_negative_offset(self.offset)
    }

    pub fn resource(&self) -> Option<&str> {
        trimmed_search(&self.resource)
    }
}
