//! Catalog records as supplied by the loader and as held by the index.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use shopsearch_embeddings::Embedding;
use tracing::info;

use crate::error::Result;

/// One catalog item as delivered by the external catalog loader.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Store identifier; numeric ids are accepted and kept as text.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,

    /// Display title.
    pub title: String,

    /// Stable URL handle.
    #[serde(default)]
    pub handle: String,

    /// Tags, either a list or a comma-separated string.
    #[serde(default, deserialize_with = "tag_set")]
    pub tags: BTreeSet<String>,

    /// Free-text description.
    #[serde(default)]
    pub description: Option<String>,

    /// Raw embedding, not necessarily unit length.
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

impl CatalogEntry {
    /// Create an entry with the required fields.
    pub fn new(id: impl Into<String>, title: impl Into<String>, handle: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            handle: handle.into(),
            ..Self::default()
        }
    }

    /// Add a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the raw embedding.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// An indexed product. Immutable once the index is built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductRecord {
    pub id: String,
    pub title: String,
    pub handle: String,
    pub tags: BTreeSet<String>,
    pub description: Option<String>,

    /// Unit-length embedding.
    #[serde(skip)]
    pub embedding: Embedding,

    #[serde(skip)]
    search_text: SearchText,
}

/// Lower-cased title and tags, computed once for substring matching.
#[derive(Debug, Clone, Default, PartialEq)]
struct SearchText {
    title: String,
    tags: Vec<String>,
}

impl ProductRecord {
    pub(crate) fn from_entry(entry: CatalogEntry, embedding: Embedding) -> Self {
        let search_text = SearchText {
            title: entry.title.to_lowercase(),
            tags: entry.tags.iter().map(|t| t.to_lowercase()).collect(),
        };
        Self {
            id: entry.id,
            title: entry.title,
            handle: entry.handle,
            tags: entry.tags,
            description: entry.description,
            embedding,
            search_text,
        }
    }

    /// Lower-cased title.
    pub fn title_lower(&self) -> &str {
        &self.search_text.title
    }

    /// Whether the title or any tag contains `needle` (already lower-cased).
    pub fn mentions(&self, needle: &str) -> bool {
        self.search_text.title.contains(needle)
            || self.search_text.tags.iter().any(|t| t.contains(needle))
    }
}

/// Read a JSON array of catalog entries.
pub async fn load_catalog_file(path: impl AsRef<Path>) -> Result<Vec<CatalogEntry>> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path).await?;
    let entries: Vec<CatalogEntry> = serde_json::from_str(&content)?;
    info!("Read {} catalog entries from {}", entries.len(), path.display());
    Ok(entries)
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

fn tag_set<'de, D>(deserializer: D) -> std::result::Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Tags {
        Csv(String),
        List(Vec<String>),
        Missing(()),
    }

    let raw: Vec<String> = match Tags::deserialize(deserializer)? {
        Tags::Csv(s) => s.split(',').map(str::to_string).collect(),
        Tags::List(list) => list,
        Tags::Missing(()) => Vec::new(),
    };
    Ok(raw
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect())
}
