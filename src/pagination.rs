// src/pagination.rs
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub total_items: i64,
    pub total_pages: i64,
    pub current_page: i64,
    pub per_page: i64,
    pub data: Vec<T>,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, total_items: i64, limit: i64, offset: i64) -> Self {
        let total_pages = if total_items == 0 {
            0
        } else {
            (total_items as f64 / limit as f64).ceil() as i64
        };
        let current_page = (offset as f64 / limit as f64).floor() as i64 + 1;

        PaginatedResponse {
            total_items,
            total_pages,
            current_page,
            per_page: limit,
            data,
        }
    }

    /// Paginacja w pamięci nad już pobranymi danymi (np. z cache'u kategorii)
    pub fn from_items(items: Vec<T>, limit: i64, offset: i64) -> Self {
        let total_items = items.len() as i64;
        let data = items
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Self::new(data, total_items, limit, offset)
    }
}
