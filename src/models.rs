//! Core data models used throughout the mining pipeline.
//!
//! Notes come in from the filesystem, become key concepts through the
//! dispatcher, and end up as stored concept rows linked by network edges.

use serde::Serialize;
use serde_json::{Map, Value};

/// A markdown note read from the notes directory.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteFile {
    /// Path relative to the notes root, `/`-separated.
    pub relative_path: String,
    /// Root the note was found under; stored as the concept's datasource.
    pub datasource: String,
    pub content: String,
}

/// One structured summary produced by the model for a note.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyConcept {
    pub title: String,
    pub keywords: String,
    pub category: String,
    pub summary: String,
    pub filepath: String,
    pub plaintext: String,
}

impl KeyConcept {
    /// Build from a parsed model record.
    ///
    /// Missing fields become empty strings; non-string values keep their
    /// JSON rendering.
    pub fn from_record(record: &Map<String, Value>, note: &NoteFile) -> Self {
        let field = |key: &str| match record.get(key) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.trim().to_string(),
            Some(other) => other.to_string(),
        };
        Self {
            title: field("title"),
            keywords: field("keywords"),
            category: field("category"),
            summary: field("summary"),
            filepath: note.relative_path.clone(),
            plaintext: note.content.clone(),
        }
    }
}

/// A key concept ready to be stored.
#[derive(Debug, Clone)]
pub struct NewConcept {
    pub concept: KeyConcept,
    pub token_num: i64,
    pub embedding: Option<Vec<f32>>,
    pub datasource: String,
}

/// A concept row as stored in SQLite.
#[derive(Debug, Clone, Serialize)]
pub struct ConceptRecord {
    pub id: String,
    pub title: String,
    pub keywords: String,
    pub category: String,
    pub summary: String,
    pub token_num: i64,
    pub dims: Option<i64>,
    pub datasource: String,
    pub filepath: String,
    pub source_num: i64,
    pub target_num: i64,
    pub created_at: i64,
}

/// A directed similarity edge between two concepts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Link {
    pub source_id: String,
    pub target_id: String,
    pub similarity: f32,
    pub strategy: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn note() -> NoteFile {
        NoteFile {
            relative_path: "til/rust.md".into(),
            datasource: "/notes".into(),
            content: "# Rust\nownership".into(),
        }
    }

    #[test]
    fn key_concept_from_full_record() {
        let record = json!({"title": " 소유권 ", "keywords": "a,b", "category": "정보", "summary": "S"});
        let concept = KeyConcept::from_record(record.as_object().unwrap(), &note());
        assert_eq!(concept.title, "소유권");
        assert_eq!(concept.category, "정보");
        assert_eq!(concept.filepath, "til/rust.md");
        assert_eq!(concept.plaintext, "# Rust\nownership");
    }

    #[test]
    fn missing_and_non_string_fields() {
        let record = json!({"title": "T", "keywords": ["a", "b"], "category": null});
        let concept = KeyConcept::from_record(record.as_object().unwrap(), &note());
        assert_eq!(concept.keywords, r#"["a","b"]"#);
        assert_eq!(concept.category, "");
        assert_eq!(concept.summary, "");
    }
}
