// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Category → candidate brand table

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read brand catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid brand catalog TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Category '{0}' has no candidate brands")]
    EmptyCandidates(String),

    #[error("Brand catalog has no categories")]
    Empty,
}

/// On-disk shape: `[categories]` table of `name = ["Brand", ...]`
#[derive(Debug, Deserialize)]
struct CatalogFile {
    categories: BTreeMap<String, Vec<String>>,
}

/// Immutable lookup from detector category to an ordered candidate set
///
/// Built once at start-up and shared read-only. Every stored candidate set
/// is non-empty.
#[derive(Debug, Clone, PartialEq)]
pub struct BrandCatalog {
    entries: HashMap<String, Vec<String>>,
}

const DEFAULT_TABLE: &[(&str, [&str; 5])] = &[
    ("electronics", ["Samsung", "Apple", "Sony", "LG", "Panasonic"]),
    ("furniture", ["Ikea", "Ashley", "La-Z-Boy", "Wayfair", "West Elm"]),
    ("appliances", ["Whirlpool", "GE", "Samsung", "LG", "Bosch"]),
    ("vehicles", ["Tesla", "Toyota", "Ford", "Honda", "Chevrolet"]),
    ("chair", ["Ikea", "Ashley", "Wayfair", "La-Z-Boy", "Herman Miller"]),
    ("microwave", ["Samsung", "Panasonic", "Sharp", "LG", "Whirlpool"]),
    ("table", ["Ikea", "Wayfair", "Ashley", "CB2", "West Elm"]),
    ("oven", ["Whirlpool", "GE", "Samsung", "Bosch", "LG"]),
    ("potted plant", ["The Sill", "PlantVine", "Lowe's", "Home Depot", "UrbanStems"]),
    ("couch", ["Ikea", "Ashley", "Wayfair", "La-Z-Boy", "CushionCo"]),
    ("cow", ["Angus", "Hereford", "Jersey", "Holstein", "Charolais"]),
    ("bed", ["Tempur-Pedic", "Ikea", "Sealy", "Serta", "Sleep Number"]),
    ("tv", ["Samsung", "LG", "Sony", "Vizio", "TCL"]),
    ("bin", ["Rubbermaid", "Sterilite", "Hefty", "Glad", "Simplehuman"]),
    ("refrigerator", ["Whirlpool", "GE", "Samsung", "LG", "Bosch"]),
    ("laptop", ["Dell", "HP", "Apple", "Lenovo", "Asus"]),
    ("smartphone", ["Apple", "Samsung", "Google", "OnePlus", "Huawei"]),
    ("camera", ["Canon", "Nikon", "Sony", "Fujifilm", "Panasonic"]),
    ("toaster", ["Breville", "Cuisinart", "Black+Decker", "Hamilton Beach", "Oster"]),
    ("fan", ["Dyson", "Honeywell", "Lasko", "Vornado", "Bionaire"]),
    ("vacuum cleaner", ["Dyson", "Shark", "Roomba", "Hoover", "Bissell"]),
];

impl Default for BrandCatalog {
    fn default() -> Self {
        let entries = DEFAULT_TABLE
            .iter()
            .map(|(category, brands)| {
                (
                    category.to_string(),
                    brands.iter().map(|b| b.to_string()).collect(),
                )
            })
            .collect();
        Self { entries }
    }
}

impl BrandCatalog {
    /// Build from arbitrary pairs, rejecting empty candidate sets
    pub fn new<I, K, V>(entries: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = (K, Vec<V>)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = HashMap::new();
        for (category, brands) in entries {
            let category = category.into();
            let brands: Vec<String> = brands.into_iter().map(Into::into).collect();
            if brands.is_empty() {
                return Err(CatalogError::EmptyCandidates(category));
            }
            map.insert(category, brands);
        }
        if map.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(Self { entries: map })
    }

    /// Parse a TOML catalog
    pub fn from_toml_str(content: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(content)?;
        Self::new(file.categories)
    }

    /// Load a TOML catalog from disk
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Candidate brands for `category`, or `None` when no refinement applies
    pub fn lookup(&self, category: &str) -> Option<&[String]> {
        self.entries.get(category).map(Vec::as_slice)
    }

    pub fn contains(&self, category: &str) -> bool {
        self.entries.contains_key(category)
    }

    /// Known categories, sorted
    pub fn categories(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
