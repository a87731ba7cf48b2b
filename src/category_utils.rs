// src/category_utils.rs

use crate::category_cache::CategoryTree;
use crate::filters::{CategoryListingParams, SubCategoryParams};
use crate::models::{
    Category, CategoryNode, CategoryStatus, CategoryTreeNode, CategoryWithChildren,
    ParentCategorySummary, SubCategory, TopCategory,
};

fn node(tree: &CategoryTree, category: &Category) -> CategoryNode {
    CategoryNode {
        category: category.clone(),
        product_count: tree.product_count(&category.id),
    }
}

fn tree_node(
    tree: &CategoryTree,
    parent: &CategoryWithChildren,
    children: Vec<CategoryNode>,
) -> CategoryTreeNode {
    let product_count = tree.product_count(&parent.category.id);
    let total_product_count = product_count
        + parent
            .children
            .iter()
            .map(|c| tree.product_count(&c.id))
            .sum::<i64>();
    CategoryTreeNode {
        category: parent.category.clone(),
        product_count,
        total_product_count,
        children,
    }
}

fn name_matches(category: &Category, needle: &str) -> bool {
    category.name.to_lowercase().contains(needle)
}

/// Buduje węzły drzewa dla listy w CMS.
/// Filtr statusu dotyczy kategorii głównych; wyszukiwanie dopasowuje rodzica albo dowolne dziecko.
/// Gdy pasuje tylko dziecko, w węźle zostają jedynie pasujące dzieci.
pub fn filtered_tree_nodes(
    tree: &CategoryTree,
    params: &CategoryListingParams,
) -> Vec<CategoryTreeNode> {
    let search = params.search();
    let status = params.status();

    tree.parents
        .iter()
        .filter(|parent| status.is_none_or(|s| parent.category.status == s))
        .filter_map(|parent| {
            let children: Vec<CategoryNode> = match search.as_deref() {
                None => parent.children.iter().map(|c| node(tree, c)).collect(),
                Some(needle) if name_matches(&parent.category, needle) => {
                    parent.children.iter().map(|c| node(tree, c)).collect()
                }
                Some(needle) => {
                    let matching: Vec<CategoryNode> = parent
                        .children
                        .iter()
                        .filter(|c| name_matches(c, needle))
                        .map(|c| node(tree, c))
                        .collect();
                    if matching.is_empty() {
                        return None;
                    }
                    matching
                }
            };
            Some(tree_node(tree, parent, children))
        })
        .collect()
}

pub fn parent_summaries(tree: &CategoryTree) -> Vec<ParentCategorySummary> {
    tree.parents
        .iter()
        .map(|parent| {
            let full = tree_node(tree, parent, Vec::new());
            ParentCategorySummary {
                category: full.category,
                product_count: full.product_count,
                total_product_count: full.total_product_count,
                children_count: parent.children.len(),
            }
        })
        .collect()
}

/// Drzewo widoczne w sklepie: tylko aktywni rodzice i ich aktywne dzieci
pub fn active_tree_nodes(tree: &CategoryTree) -> Vec<CategoryTreeNode> {
    tree.parents
        .iter()
        .filter(|parent| parent.category.status == CategoryStatus::Active)
        .map(|parent| {
            let children = parent
                .children
                .iter()
                .filter(|c| c.status == CategoryStatus::Active)
                .map(|c| node(tree, c))
                .collect();
            tree_node(tree, parent, children)
        })
        .collect()
}

pub fn filter_subs(subs: &[SubCategory], params: &SubCategoryParams) -> Vec<SubCategory> {
    subs.iter()
        .filter(|s| {
            params
                .parent_id
                .is_none_or(|parent_id| s.category.parent_id == Some(parent_id))
        })
        .filter(|s| params.status.is_none_or(|status| s.category.status == status))
        .cloned()
        .collect()
}

/// Kategorie (rodzice i dzieci) z największą liczbą produktów
pub fn top_categories(tree: &CategoryTree, limit: usize) -> Vec<TopCategory> {
    let mut all: Vec<TopCategory> = tree
        .parents
        .iter()
        .flat_map(|parent| std::iter::once(&parent.category).chain(parent.children.iter()))
        .map(|c| TopCategory {
            id: c.id,
            name: c.name.clone(),
            product_count: tree.product_count(&c.id),
        })
        .filter(|c| c.product_count > 0)
        .collect();
    all.sort_by(|a, b| {
        b.product_count
            .cmp(&a.product_count)
            .then_with(|| a.name.cmp(&b.name))
    });
    all.truncate(limit);
    all
}
