// src/category_cache.rs
//! Cache drzewa kategorii i listy podkategorii.
//!
//! Dwa niezależne sloty, każdy z własnym `RwLock` i własnym zegarem TTL.
//! Cache niczego sam nie pobiera: przy chybieniu wywołujący czyta bazę
//! i zapisuje wynik przez `set_tree` / `set_subs`. Każda zmiana kategorii
//! kończy się wywołaniem `invalidate`, które czyści oba sloty.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::time::Instant;

use crate::models::{CategoryStatus, CategoryWithChildren, SubCategory};

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Migawka drzewa: rodzice z dziećmi oraz liczba produktów per kategoria.
/// Oba pola zapisywane są razem, więc czytelnik nigdy nie zobaczy ich z dwóch różnych zapisów.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryTree {
    pub parents: Vec<CategoryWithChildren>,
    /// Klucz: UUID kategorii jako tekst (zarówno rodzice, jak i dzieci)
    pub product_counts: HashMap<String, i64>,
}

impl CategoryTree {
    pub fn product_count(&self, category_id: &uuid::Uuid) -> i64 {
        self.product_counts
            .get(&category_id.to_string())
            .copied()
            .unwrap_or(0)
    }

    /// Czy kategoria jest widoczna w sklepie: aktywna i, dla podkategorii, z aktywnym rodzicem.
    pub fn is_active(&self, category_id: &uuid::Uuid) -> bool {
        self.parents.iter().any(|parent| {
            if parent.category.status != CategoryStatus::Active {
                return false;
            }
            parent.category.id == *category_id
                || parent
                    .children
                    .iter()
                    .any(|c| c.id == *category_id && c.status == CategoryStatus::Active)
        })
    }
}

struct Entry<T> {
    value: Arc<T>,
    fetched_at: Instant,
}

/// Pojedynczy slot z czasem życia. Nieaktualny wpis zostaje w pamięci do nadpisania,
/// ale odczyt traktuje go jak brak.
pub struct TtlSlot<T> {
    entry: RwLock<Option<Entry<T>>>,
    ttl: Duration,
}

impl<T> TtlSlot<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entry: RwLock::new(None),
            ttl,
        }
    }

    pub fn get(&self) -> Option<Arc<T>> {
        let guard = self.entry.read().unwrap_or_else(PoisonError::into_inner);
        let entry = guard.as_ref()?;
        if entry.fetched_at.elapsed() < self.ttl {
            Some(Arc::clone(&entry.value))
        } else {
            None
        }
    }

    /// Bezwarunkowo zastępuje zawartość slotu (wygrywa ostatni zapis).
    pub fn set(&self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        let mut guard = self.entry.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(Entry {
            value: Arc::clone(&value),
            fetched_at: Instant::now(),
        });
        value
    }

    pub fn clear(&self) {
        let mut guard = self.entry.write().unwrap_or_else(PoisonError::into_inner);
        *guard = None;
    }
}

pub struct CategoryCache {
    tree: TtlSlot<CategoryTree>,
    subs: TtlSlot<Vec<SubCategory>>,
}

impl Default for CategoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl CategoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            tree: TtlSlot::new(ttl),
            subs: TtlSlot::new(ttl),
        }
    }

    pub fn get_tree(&self) -> Option<Arc<CategoryTree>> {
        self.tree.get()
    }

    pub fn set_tree(
        &self,
        parents: Vec<CategoryWithChildren>,
        product_counts: HashMap<String, i64>,
    ) -> Arc<CategoryTree> {
        self.tree.set(CategoryTree {
            parents,
            product_counts,
        })
    }

    pub fn get_subs(&self) -> Option<Arc<Vec<SubCategory>>> {
        self.subs.get()
    }

    pub fn set_subs(&self, subs: Vec<SubCategory>) -> Arc<Vec<SubCategory>> {
        self.subs.set(subs)
    }

    /// Czyści oba sloty: najpierw drzewo, potem podkategorie.
    pub fn invalidate(&self) {
        self.tree.clear();
        self.subs.clear();
        tracing::debug!("Cache kategorii unieważniony");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{Category, CategoryStatus};
    use chrono::Utc;
    use uuid::Uuid;

    pub(crate) fn category(name: &str, parent_id: Option<Uuid>) -> Category {
        Category {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            status: CategoryStatus::Active,
            parent_id,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub(crate) fn parent_with_child(parent: &str, child: &str) -> CategoryWithChildren {
        let parent = category(parent, None);
        let child = category(child, Some(parent.id));
        CategoryWithChildren {
            category: parent,
            children: vec![child],
        }
    }

    fn sub_of(parent: &CategoryWithChildren) -> SubCategory {
        SubCategory {
            category: parent.children[0].clone(),
            parent_name: parent.category.name.clone(),
        }
    }

    fn counts(pairs: &[(&str, i64)]) -> HashMap<String, i64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn inactive_parent_hides_its_children() {
        let active = parent_with_child("A", "A1");
        let mut inactive = parent_with_child("B", "B1");
        inactive.category.status = CategoryStatus::Inactive;
        let mut with_inactive_child = parent_with_child("C", "C1");
        with_inactive_child.children[0].status = CategoryStatus::Inactive;

        let tree = CategoryTree {
            parents: vec![active.clone(), inactive.clone(), with_inactive_child.clone()],
            product_counts: HashMap::new(),
        };

        assert!(tree.is_active(&active.category.id));
        assert!(tree.is_active(&active.children[0].id));
        assert!(!tree.is_active(&inactive.category.id));
        assert!(!tree.is_active(&inactive.children[0].id));
        assert!(tree.is_active(&with_inactive_child.category.id));
        assert!(!tree.is_active(&with_inactive_child.children[0].id));
        assert!(!tree.is_active(&Uuid::new_v4()));
    }

    #[tokio::test(start_paused = true)]
    async fn tree_is_returned_while_fresh() {
        let cache = CategoryCache::default();
        let parent = parent_with_child("A", "A1");
        cache.set_tree(vec![parent.clone()], counts(&[("A", 2), ("A1", 2)]));

        let tree = cache.get_tree().expect("drzewo powinno być w cache");
        assert_eq!(tree.parents, vec![parent]);
        assert_eq!(tree.product_counts, counts(&[("A", 2), ("A1", 2)]));
    }

    #[tokio::test(start_paused = true)]
    async fn tree_expires_after_ttl() {
        let cache = CategoryCache::default();
        cache.set_tree(vec![parent_with_child("A", "A1")], counts(&[("A", 2)]));

        tokio::time::advance(DEFAULT_TTL - Duration::from_secs(1)).await;
        assert!(cache.get_tree().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get_tree().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn entry_is_stale_exactly_at_ttl() {
        let cache = CategoryCache::new(Duration::from_secs(10));
        cache.set_subs(vec![]);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(cache.get_subs().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn subs_expire_after_ttl() {
        let cache = CategoryCache::default();
        let parent = parent_with_child("A", "A1");
        cache.set_subs(vec![sub_of(&parent)]);

        tokio::time::advance(DEFAULT_TTL + Duration::from_secs(1)).await;
        assert!(cache.get_subs().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_clears_both_slots() {
        let cache = CategoryCache::default();
        let parent = parent_with_child("A", "A1");
        cache.set_tree(vec![parent.clone()], counts(&[("A", 1)]));
        cache.set_subs(vec![sub_of(&parent)]);

        cache.invalidate();

        assert!(cache.get_tree().is_none());
        assert!(cache.get_subs().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn slots_expire_independently() {
        let cache = CategoryCache::default();
        let parent = parent_with_child("A", "A1");
        cache.set_tree(vec![parent.clone()], counts(&[]));

        tokio::time::advance(Duration::from_secs(4 * 60)).await;
        cache.set_subs(vec![sub_of(&parent)]);

        tokio::time::advance(Duration::from_secs(2 * 60)).await;
        assert!(cache.get_tree().is_none());
        let subs = cache.get_subs().expect("podkategorie nadal świeże");
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].parent_name, "A");
    }

    #[tokio::test(start_paused = true)]
    async fn setting_tree_does_not_touch_subs() {
        let cache = CategoryCache::default();
        let first = parent_with_child("A", "A1");
        cache.set_subs(vec![sub_of(&first)]);
        cache.set_tree(vec![parent_with_child("B", "B1")], counts(&[("B", 3)]));

        let subs = cache.get_subs().unwrap();
        assert_eq!(subs[0].category, first.children[0]);
    }

    #[tokio::test(start_paused = true)]
    async fn last_writer_wins() {
        let cache = CategoryCache::default();
        cache.set_tree(vec![parent_with_child("A", "A1")], counts(&[("A", 1)]));
        let second = parent_with_child("B", "B1");
        cache.set_tree(vec![second.clone()], counts(&[("B", 7)]));

        let tree = cache.get_tree().unwrap();
        assert_eq!(tree.parents, vec![second]);
        assert_eq!(tree.product_counts, counts(&[("B", 7)]));
    }

    #[tokio::test(start_paused = true)]
    async fn set_after_invalidate_populates_again() {
        let cache = CategoryCache::default();
        cache.invalidate();
        cache.set_subs(vec![]);
        assert!(cache.get_subs().is_some());
    }

    #[test]
    fn concurrent_readers_never_see_mixed_snapshots() {
        let cache = Arc::new(CategoryCache::default());
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let parent = parent_with_child(&format!("{w}-{i}"), "dziecko");
                        let key = parent.category.id.to_string();
                        cache.set_tree(vec![parent], counts(&[(key.as_str(), i)]));
                    }
                })
            })
            .collect();
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        if let Some(tree) = cache.get_tree() {
                            let key = tree.parents[0].category.id.to_string();
                            assert_eq!(tree.product_counts.len(), 1);
                            assert!(tree.product_counts.contains_key(&key));
                        }
                    }
                })
            })
            .collect();

        for handle in writers.into_iter().chain(readers) {
            handle.join().unwrap();
        }
    }

    #[test]
    fn product_count_defaults_to_zero() {
        let tree = CategoryTree::default();
        assert_eq!(tree.product_count(&Uuid::new_v4()), 0);
    }
}
