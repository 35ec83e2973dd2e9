//! Load-time product index and type-filtered views over it.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shopsearch_embeddings::{EmbeddingError, normalize};
use tracing::{debug, info, warn};

use crate::error::{Result, RetrievalError};
use crate::product::{CatalogEntry, ProductRecord};

/// A product category and the phrases that identify it in queries, titles
/// and tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductType {
    pub label: String,
    pub synonyms: Vec<String>,
}

impl ProductType {
    pub fn new<I, S>(label: impl Into<String>, synonyms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            label: label.into(),
            synonyms: synonyms.into_iter().map(Into::into).collect(),
        }
    }

    /// The cosmetics catalog's categories, most specific first.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("bar soap", ["bar soap", "bar-soap", "soap bar"]),
            Self::new("liquid soap", ["liquid soap", "liquid-soap"]),
            Self::new("moisturizing soap", ["moisturizing soap", "moisturizing-soap"]),
            Self::new(
                "fragrance-free soap",
                ["fragrance-free soap", "fragrance free soap"],
            ),
            Self::new("body wash", ["body wash", "bodywash"]),
            Self::new("serum", ["serum"]),
            Self::new("lotion", ["lotion"]),
            Self::new("cream", ["cream"]),
        ]
    }

    fn matches_query(&self, query_lower: &str) -> bool {
        self.synonyms
            .iter()
            .any(|s| query_lower.contains(&s.to_lowercase()))
    }

    fn matches_record(&self, record: &ProductRecord) -> bool {
        self.synonyms
            .iter()
            .any(|s| record.mentions(&s.to_lowercase()))
    }
}

/// Immutable collection of catalog products with unit-length embeddings.
///
/// Built once at startup; every method takes `&self`, so the index can be
/// shared across tasks behind an `Arc` without locking.
#[derive(Debug)]
pub struct ProductIndex {
    records: Vec<Arc<ProductRecord>>,
    by_handle: HashMap<String, usize>,
    dimension: usize,
    product_types: Vec<ProductType>,
}

impl ProductIndex {
    /// Build an index, normalizing every embedding once.
    ///
    /// Entries with no embedding, a degenerate embedding, an empty handle or
    /// an already indexed handle are dropped with a warning. A vector whose
    /// dimension differs from the first accepted one fails the whole load, as
    /// does a catalog with nothing indexable.
    pub fn load(entries: Vec<CatalogEntry>, product_types: Vec<ProductType>) -> Result<Self> {
        Self::load_with_dimension(entries, product_types, None)
    }

    /// Like [`ProductIndex::load`], but every indexed vector must have
    /// `dimension`.
    pub fn load_with_dimension(
        entries: Vec<CatalogEntry>,
        product_types: Vec<ProductType>,
        dimension: Option<usize>,
    ) -> Result<Self> {
        let total = entries.len();
        let mut records = Vec::with_capacity(total);
        let mut by_handle = HashMap::with_capacity(total);
        let mut dimension = dimension;

        for mut entry in entries {
            if entry.handle.trim().is_empty() {
                warn!("Dropping product {:?}: empty handle", entry.title);
                continue;
            }
            if by_handle.contains_key(&entry.handle) {
                warn!("Dropping product {:?}: duplicate handle {}", entry.title, entry.handle);
                continue;
            }
            let Some(raw) = entry.embedding.take() else {
                warn!("Dropping product {:?}: no embedding", entry.title);
                continue;
            };

            let embedding = match normalize(raw) {
                Ok(embedding) => embedding,
                Err(EmbeddingError::DegenerateVector { norm }) => {
                    warn!("Dropping product {:?}: embedding norm {norm}", entry.title);
                    continue;
                }
                Err(other) => return Err(other.into()),
            };

            // Only indexed vectors decide the dimension.
            let expected = *dimension.get_or_insert(embedding.len());
            if embedding.len() != expected {
                return Err(RetrievalError::Load(format!(
                    "product {} has a {}-dimension embedding, expected {expected}",
                    entry.handle,
                    embedding.len()
                )));
            }

            by_handle.insert(entry.handle.clone(), records.len());
            records.push(Arc::new(ProductRecord::from_entry(entry, embedding)));
        }

        let dimension = match dimension {
            Some(d) if !records.is_empty() => d,
            _ => {
                return Err(RetrievalError::Load(format!(
                    "none of {total} catalog entries could be indexed"
                )));
            }
        };

        info!(
            "Indexed {} of {total} products ({dimension} dimensions)",
            records.len()
        );

        Ok(Self {
            records,
            by_handle,
            dimension,
            product_types,
        })
    }

    /// Embedding dimension shared by every record.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of indexed products.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the index holds no products.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Configured product types, in priority order.
    pub fn product_types(&self) -> &[ProductType] {
        &self.product_types
    }

    /// Get a product by handle.
    pub fn get(&self, handle: &str) -> Option<&Arc<ProductRecord>> {
        self.by_handle.get(handle).map(|&i| &self.records[i])
    }

    /// First product whose title contains `name`, ignoring case.
    pub fn find_by_title(&self, name: &str) -> Option<&Arc<ProductRecord>> {
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.records
            .iter()
            .find(|r| r.title_lower().contains(&needle))
    }

    /// Products whose title or tags mention `brand`, in load order.
    pub fn find_by_brand(&self, brand: &str) -> Vec<&Arc<ProductRecord>> {
        let needle = brand.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.records.iter().filter(|r| r.mentions(&needle)).collect()
    }

    /// All records in load order.
    pub fn records(&self) -> &[Arc<ProductRecord>] {
        &self.records
    }

    /// A view over every record.
    pub fn all(&self) -> TypeFilteredView<'_> {
        TypeFilteredView {
            index: self,
            members: None,
            label: None,
        }
    }

    /// Narrow the index by the first product type mentioned in `query`.
    ///
    /// Only the first matching type in declaration order is considered. If
    /// no type matches, or the matching type has no products, the full index
    /// is returned.
    pub fn filter_by_type(&self, query: &str) -> TypeFilteredView<'_> {
        let query_lower = query.to_lowercase();
        match self
            .product_types
            .iter()
            .find(|t| t.matches_query(&query_lower))
        {
            Some(product_type) => self.view_for(product_type),
            None => self.all(),
        }
    }

    /// View for a configured label, or `None` if the label is unknown.
    pub fn filter_by_label(&self, label: &str) -> Option<TypeFilteredView<'_>> {
        self.product_types
            .iter()
            .find(|t| t.label.eq_ignore_ascii_case(label))
            .map(|t| self.view_for(t))
    }

    fn view_for<'a>(&'a self, product_type: &'a ProductType) -> TypeFilteredView<'a> {
        let members: Vec<usize> = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| product_type.matches_record(r))
            .map(|(i, _)| i)
            .collect();

        if members.is_empty() {
            debug!(
                "No products for type {:?}, using full index",
                product_type.label
            );
            return self.all();
        }

        debug!(
            "Type {:?} narrows index to {} products",
            product_type.label,
            members.len()
        );
        TypeFilteredView {
            index: self,
            members: Some(members),
            label: Some(&product_type.label),
        }
    }
}

/// A subset of the index, referenced by position; vectors are not copied.
#[derive(Debug, Clone)]
pub struct TypeFilteredView<'a> {
    index: &'a ProductIndex,
    members: Option<Vec<usize>>,
    label: Option<&'a str>,
}

impl<'a> TypeFilteredView<'a> {
    /// Label of the product type that produced this view, if filtered.
    pub fn label(&self) -> Option<&'a str> {
        self.label
    }

    /// Whether the view is narrower than the full index.
    pub fn is_filtered(&self) -> bool {
        self.members.is_some()
    }

    /// Number of products in the view.
    pub fn len(&self) -> usize {
        match &self.members {
            Some(members) => members.len(),
            None => self.index.len(),
        }
    }

    /// Whether the view is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Products in index order.
    pub fn iter(&self) -> impl Iterator<Item = &'a Arc<ProductRecord>> + '_ {
        let records = self.index.records();
        let positions: Box<dyn Iterator<Item = usize> + '_> = match &self.members {
            Some(members) => Box::new(members.iter().copied()),
            None => Box::new(0..records.len()),
        };
        positions.map(move |i| &records[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(handle: &str, title: &str, embedding: Vec<f32>) -> CatalogEntry {
        CatalogEntry::new(handle, title, handle).with_embedding(embedding)
    }

    fn sample_index() -> ProductIndex {
        ProductIndex::load(
            vec![
                entry("shea-bar-soap", "Shea Bar Soap", vec![1.0, 0.0, 0.0]),
                entry("rose-liquid-soap", "Rose Liquid Soap", vec![0.0, 1.0, 0.0]),
                entry("vitamin-c-serum", "Vitamin C Serum", vec![0.0, 0.0, 1.0]),
                entry("night-cream", "Night Cream", vec![1.0, 1.0, 0.0]),
            ],
            ProductType::defaults(),
        )
        .unwrap()
    }

    #[test]
    fn test_load_normalizes_vectors() {
        let index = sample_index();
        let cream = index.get("night-cream").unwrap();
        let norm: f32 = cream.embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert_eq!(index.dimension(), 3);
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn test_load_drops_bad_records() {
        let index = ProductIndex::load(
            vec![
                entry("ok", "Good Lotion", vec![1.0, 0.0]),
                CatalogEntry::new("no-vector", "No Vector", "no-vector"),
                entry("zero", "Zero Vector", vec![0.0, 0.0]),
                entry("", "No Handle", vec![1.0, 0.0]),
                entry("ok", "Duplicate Handle", vec![0.0, 1.0]),
            ],
            ProductType::defaults(),
        )
        .unwrap();

        assert_eq!(index.len(), 1);
        assert_eq!(index.records()[0].title, "Good Lotion");
    }

    #[test]
    fn test_load_rejects_dimension_mismatch() {
        let err = ProductIndex::load(
            vec![
                entry("a", "A", vec![1.0, 0.0]),
                entry("b", "B", vec![1.0, 0.0, 0.0]),
            ],
            Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(err, RetrievalError::Load(_)));

        let err = ProductIndex::load_with_dimension(
            vec![entry("a", "A", vec![1.0, 0.0])],
            Vec::new(),
            Some(3),
        )
        .unwrap_err();
        assert!(matches!(err, RetrievalError::Load(_)));
    }

    #[test]
    fn test_dropped_leading_record_does_not_fix_dimension() {
        for leading in [Vec::new(), vec![0.0, 0.0]] {
            let index = ProductIndex::load(
                vec![
                    entry("broken", "Broken Export Row", leading),
                    entry("shea", "Shea Bar Soap", vec![1.0, 0.0, 0.0]),
                    entry("cream", "Night Cream", vec![0.0, 1.0, 0.0]),
                ],
                ProductType::defaults(),
            )
            .unwrap();

            assert_eq!(index.len(), 2);
            assert_eq!(index.dimension(), 3);
            assert!(index.get("broken").is_none());
        }

        let pinned = ProductIndex::load_with_dimension(
            vec![
                entry("broken", "Broken Export Row", vec![0.0, 0.0]),
                entry("shea", "Shea Bar Soap", vec![1.0, 0.0, 0.0]),
            ],
            Vec::new(),
            Some(3),
        )
        .unwrap();
        assert_eq!(pinned.len(), 1);
    }

    #[test]
    fn test_load_rejects_empty_catalog() {
        let err = ProductIndex::load(
            vec![CatalogEntry::new("x", "X", "x")],
            ProductType::defaults(),
        )
        .unwrap_err();
        assert!(matches!(err, RetrievalError::Load(_)));
    }

    #[test]
    fn test_filter_by_type() {
        let index = sample_index();

        let view = index.filter_by_type("any good SERUM?");
        assert_eq!(view.label(), Some("serum"));
        let titles: Vec<&str> = view.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Vitamin C Serum"]);
    }

    #[test]
    fn test_filter_first_declared_label_wins() {
        let index = sample_index();

        let view = index.filter_by_type("liquid soap or bar soap?");
        assert_eq!(view.label(), Some("bar soap"));
        let titles: Vec<&str> = view.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Shea Bar Soap"]);
    }

    #[test]
    fn test_filter_matches_tags() {
        let index = ProductIndex::load(
            vec![
                entry("plain", "Plain Soap", vec![1.0, 0.0]),
                entry("cocoa", "Cocoa Butter Soap", vec![0.0, 1.0]).with_tag("Bar Soap"),
            ],
            ProductType::defaults(),
        )
        .unwrap();

        let view = index.filter_by_type("bar soap please");
        let titles: Vec<&str> = view.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Cocoa Butter Soap"]);
    }

    #[test]
    fn test_filter_falls_back_to_full_index() {
        let index = sample_index();

        let none = index.filter_by_type("something for dry skin");
        assert!(!none.is_filtered());
        assert_eq!(none.len(), 4);

        // "lotion" is a known type but nothing in the catalog carries it.
        let empty = index.filter_by_type("a lotion");
        assert!(!empty.is_filtered());
        assert_eq!(empty.label(), None);
        assert_eq!(empty.len(), 4);
    }

    #[test]
    fn test_filter_by_label() {
        let index = sample_index();
        assert_eq!(index.filter_by_label("Cream").unwrap().len(), 1);
        assert!(index.filter_by_label("sunscreen").is_none());
    }

    #[test]
    fn test_find_by_brand_checks_title_and_tags() {
        let index = ProductIndex::load(
            vec![
                entry("nivea-cream", "Nivea Soft Cream", vec![1.0, 0.0]),
                entry("plain", "Plain Lotion", vec![0.0, 1.0]),
                entry("tagged", "Body Lotion", vec![1.0, 1.0]).with_tag("Nivea"),
            ],
            ProductType::defaults(),
        )
        .unwrap();

        let handles: Vec<&str> = index
            .find_by_brand(" NIVEA ")
            .into_iter()
            .map(|r| r.handle.as_str())
            .collect();
        assert_eq!(handles, vec!["nivea-cream", "tagged"]);
        assert!(index.find_by_brand("").is_empty());
    }

    #[test]
    fn test_find_by_title() {
        let index = sample_index();
        assert_eq!(
            index.find_by_title("vitamin c").map(|r| r.handle.as_str()),
            Some("vitamin-c-serum")
        );
        assert!(index.find_by_title("  ").is_none());
    }
}
