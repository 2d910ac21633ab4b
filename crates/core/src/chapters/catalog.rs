//! Chapter catalog
//!
//! The fixed, ordered list of chapters a room plays through. Each room gets
//! its own copy when the game starts.

use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::Chapter;

/// One catalog entry as written in TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub option_a: String,
    pub option_b: String,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(rename = "chapter", default)]
    chapters: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(Error::Config("chapter catalog is empty".into()));
        }
        if let Some(blank) = entries.iter().position(|e| e.title.trim().is_empty()) {
            return Err(Error::Config(format!("chapter {} has no title", blank + 1)));
        }
        Ok(Self { entries })
    }

    /// The survival story shipped with the game
    pub fn builtin() -> Self {
        let entry = |title: &str, description: &str, a: &str, b: &str| CatalogEntry {
            title: title.to_string(),
            description: description.to_string(),
            option_a: a.to_string(),
            option_b: b.to_string(),
        };

        Self {
            entries: vec![
                entry(
                    "Expedition Selection",
                    "Should Jaewon be sent out with the expedition again?",
                    "Redeploy by ability (Seongyeol)",
                    "Draw lots and rotate (Jaemyeon)",
                ),
                entry(
                    "Distribution of Food",
                    "How should the food be shared?",
                    "Shares by contribution (Seongyeol)",
                    "Equal shares for everyone (Jaemyeon)",
                ),
                entry(
                    "Outsiders and Rules",
                    "Should outsiders be let in?",
                    "Turn outsiders away (Seongyeol)",
                    "Admit after quarantine (Jaemyeon)",
                ),
                entry(
                    "Escape vs Stay",
                    "Hold this position, or try to break out?",
                    "Hold the current position (Seongyeol)",
                    "Attempt a group escape (Jaemyeon)",
                ),
            ],
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        Self::new(file.chapters)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Materialise the catalog for one room, orders starting at 1
    pub fn chapters_for(&self, room_id: Uuid) -> Vec<Chapter> {
        self.entries
            .iter()
            .zip(1u32..)
            .map(|(entry, order)| Chapter {
                id: Uuid::new_v4(),
                room_id,
                order,
                title: entry.title.clone(),
                description: entry.description.clone(),
                option_a_label: entry.option_a.clone(),
                option_b_label: entry.option_b.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_orders_are_contiguous() {
        let room_id = Uuid::new_v4();
        let chapters = Catalog::builtin().chapters_for(room_id);

        let orders: Vec<u32> = chapters.iter().map(|c| c.order).collect();
        assert_eq!(orders, vec![1, 2, 3, 4]);
        assert!(chapters.iter().all(|c| c.room_id == room_id));
    }

    #[test]
    fn test_parse_toml_catalog() {
        let catalog = Catalog::from_toml_str(
            r#"
            [[chapter]]
            title = "Water"
            option_a = "Ration"
            option_b = "Search"

            [[chapter]]
            title = "Night Watch"
            description = "Who keeps watch?"
            option_a = "Volunteers"
            option_b = "Rota"
            "#,
        )
        .unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.entries()[0].description, "");
        assert_eq!(catalog.entries()[1].option_b, "Rota");
    }

    #[test]
    fn test_empty_catalog_rejected() {
        assert!(matches!(Catalog::from_toml_str(""), Err(Error::Config(_))));
    }

    #[test]
    fn test_untitled_chapter_rejected() {
        let err = Catalog::from_toml_str(
            r#"
            [[chapter]]
            title = " "
            option_a = "x"
            option_b = "y"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("chapter 1"));
    }
}
