//! Concept store.
//!
//! Concepts live in the `concepts` table; similarity edges between them
//! live in `networks`. All functions take an open pool so the CLI, the
//! mining pipeline and tests can share one connection.

use anyhow::Result;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::models::{ConceptRecord, KeyConcept, Link, NewConcept};

const CONCEPT_COLUMNS: &str = "id, title, keywords, category, summary, token_num, dims, \
     datasource, filepath, source_num, target_num, created_at";

/// Identity of a concept for deduplication: its file, title and summary.
pub fn dedup_hash(concept: &KeyConcept) -> String {
    let mut hasher = Sha256::new();
    hasher.update(concept.filepath.as_bytes());
    hasher.update([0u8]);
    hasher.update(concept.title.as_bytes());
    hasher.update([0u8]);
    hasher.update(concept.summary.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Insert concepts, skipping any already stored. Returns how many were new.
pub async fn create_concepts(pool: &SqlitePool, concepts: &[NewConcept]) -> Result<u64> {
    let now = chrono::Utc::now().timestamp();
    let mut inserted = 0u64;
    let mut tx = pool.begin().await?;

    for new in concepts {
        let c = &new.concept;
        let (blob, dims) = match &new.embedding {
            Some(v) => (Some(vec_to_blob(v)), Some(v.len() as i64)),
            None => (None, None),
        };

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO concepts
                (id, title, keywords, category, summary, token_num, embedding, dims,
                 datasource, filepath, plaintext, dedup_hash, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&c.title)
        .bind(&c.keywords)
        .bind(&c.category)
        .bind(&c.summary)
        .bind(new.token_num)
        .bind(blob)
        .bind(dims)
        .bind(&new.datasource)
        .bind(&c.filepath)
        .bind(&c.plaintext)
        .bind(dedup_hash(c))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        inserted += result.rows_affected();
    }

    tx.commit().await?;
    Ok(inserted)
}

/// Every stored embedding, oldest concept first.
pub async fn load_embeddings(pool: &SqlitePool) -> Result<Vec<(String, Vec<f32>)>> {
    let rows = sqlx::query(
        "SELECT id, embedding FROM concepts WHERE embedding IS NOT NULL ORDER BY created_at, rowid",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let id: String = row.get("id");
            let blob: Vec<u8> = row.get("embedding");
            (id, blob_to_vec(&blob))
        })
        .filter(|(_, v)| !v.is_empty())
        .collect())
}

/// Drop every edge and store `links` instead.
pub async fn replace_links(pool: &SqlitePool, links: &[Link]) -> Result<u64> {
    let now = chrono::Utc::now().timestamp();
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM networks").execute(&mut *tx).await?;

    let mut written = 0u64;
    for link in links {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO networks (source_id, target_id, similarity, strategy, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&link.source_id)
        .bind(&link.target_id)
        .bind(link.similarity)
        .bind(&link.strategy)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        written += result.rows_affected();
    }

    tx.commit().await?;
    Ok(written)
}

/// Refresh `source_num` (outgoing edges) and `target_num` (incoming edges).
pub async fn update_link_counts(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE concepts SET
            source_num = (SELECT COUNT(*) FROM networks n WHERE n.source_id = concepts.id),
            target_num = (SELECT COUNT(*) FROM networks n WHERE n.target_id = concepts.id)
        "#,
    )
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// A concept with its full text and both directions of links.
#[derive(Debug, Clone, Serialize)]
pub struct ConceptDetail {
    #[serde(flatten)]
    pub record: ConceptRecord,
    pub plaintext: String,
    pub outgoing: Vec<Link>,
    pub incoming: Vec<Link>,
}

pub async fn get_concept(pool: &SqlitePool, id: &str) -> Result<Option<ConceptDetail>> {
    let sql = format!(
        "SELECT {}, plaintext FROM concepts WHERE id = ?",
        CONCEPT_COLUMNS
    );
    let Some(row) = sqlx::query(&sql).bind(id).fetch_optional(pool).await? else {
        return Ok(None);
    };

    let outgoing = links_where(pool, "source_id", id).await?;
    let incoming = links_where(pool, "target_id", id).await?;

    Ok(Some(ConceptDetail {
        record: row_to_record(&row),
        plaintext: row.get("plaintext"),
        outgoing,
        incoming,
    }))
}

async fn links_where(pool: &SqlitePool, column: &str, id: &str) -> Result<Vec<Link>> {
    let sql = format!(
        "SELECT source_id, target_id, similarity, strategy FROM networks \
         WHERE {} = ? ORDER BY similarity DESC",
        column
    );
    let rows = sqlx::query(&sql).bind(id).fetch_all(pool).await?;
    Ok(rows
        .iter()
        .map(|row| Link {
            source_id: row.get("source_id"),
            target_id: row.get("target_id"),
            similarity: row.get::<f64, _>("similarity") as f32,
            strategy: row.get("strategy"),
        })
        .collect())
}

/// Most recent concepts first.
pub async fn list_concepts(pool: &SqlitePool, limit: usize) -> Result<Vec<ConceptRecord>> {
    let sql = format!(
        "SELECT {} FROM concepts ORDER BY created_at DESC, rowid DESC LIMIT ?",
        CONCEPT_COLUMNS
    );
    let rows = sqlx::query(&sql).bind(limit as i64).fetch_all(pool).await?;
    Ok(rows.iter().map(row_to_record).collect())
}

fn row_to_record(row: &SqliteRow) -> ConceptRecord {
    ConceptRecord {
        id: row.get("id"),
        title: row.get("title"),
        keywords: row.get("keywords"),
        category: row.get("category"),
        summary: row.get("summary"),
        token_num: row.get("token_num"),
        dims: row.get("dims"),
        datasource: row.get("datasource"),
        filepath: row.get("filepath"),
        source_num: row.get("source_num"),
        target_num: row.get("target_num"),
        created_at: row.get("created_at"),
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub concepts: i64,
    pub embedded: i64,
    pub edges: i64,
    pub files: i64,
    pub tokens: i64,
    /// `(category, count)`, largest first.
    pub categories: Vec<(String, i64)>,
}

pub async fn stats(pool: &SqlitePool) -> Result<StoreStats> {
    let concepts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM concepts")
        .fetch_one(pool)
        .await?;
    let embedded: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM concepts WHERE embedding IS NOT NULL")
            .fetch_one(pool)
            .await?;
    let edges: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM networks")
        .fetch_one(pool)
        .await?;
    let files: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT filepath) FROM concepts")
        .fetch_one(pool)
        .await?;
    let tokens: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(token_num), 0) FROM concepts")
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query(
        r#"
        SELECT category, COUNT(*) AS n
        FROM concepts
        GROUP BY category
        ORDER BY n DESC, category ASC
        "#,
    )
    .fetch_all(pool)
    .await?;
    let categories: Vec<(String, i64)> = rows
        .iter()
        .map(|row| (row.get("category"), row.get("n")))
        .collect();

    Ok(StoreStats {
        concepts,
        embedded,
        edges,
        files,
        tokens,
        categories,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::migrate::migrate;
    use tempfile::TempDir;

    fn concept(title: &str, summary: &str, embedding: Option<Vec<f32>>) -> NewConcept {
        NewConcept {
            concept: KeyConcept {
                title: title.into(),
                keywords: "k".into(),
                category: "정보".into(),
                summary: summary.into(),
                filepath: "a.md".into(),
                plaintext: "body".into(),
            },
            token_num: 3,
            embedding,
            datasource: "/notes".into(),
        }
    }

    async fn open() -> (TempDir, SqlitePool) {
        let tmp = TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("test.sqlite")).await.unwrap();
        migrate(&pool).await.unwrap();
        (tmp, pool)
    }

    #[tokio::test]
    async fn duplicates_are_ignored() {
        let (_tmp, pool) = open().await;
        let batch = vec![
            concept("A", "s1", Some(vec![1.0, 0.0])),
            concept("B", "s2", None),
        ];
        assert_eq!(create_concepts(&pool, &batch).await.unwrap(), 2);
        assert_eq!(create_concepts(&pool, &batch).await.unwrap(), 0);

        let s = stats(&pool).await.unwrap();
        assert_eq!(s.concepts, 2);
        assert_eq!(s.embedded, 1);
        assert_eq!(s.tokens, 6);
        assert_eq!(s.categories, vec![("정보".to_string(), 2)]);
    }

    #[tokio::test]
    async fn embeddings_roundtrip_in_insert_order() {
        let (_tmp, pool) = open().await;
        let batch = vec![
            concept("A", "s1", Some(vec![1.0, 0.5])),
            concept("B", "s2", None),
            concept("C", "s3", Some(vec![0.0, 1.0])),
        ];
        create_concepts(&pool, &batch).await.unwrap();

        let loaded = load_embeddings(&pool).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].1, vec![1.0, 0.5]);
        assert_eq!(loaded[1].1, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn links_and_counts() {
        let (_tmp, pool) = open().await;
        let batch = vec![
            concept("A", "s1", Some(vec![1.0])),
            concept("B", "s2", Some(vec![1.0])),
        ];
        create_concepts(&pool, &batch).await.unwrap();
        let ids: Vec<String> = load_embeddings(&pool)
            .await
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();

        let link = Link {
            source_id: ids[0].clone(),
            target_id: ids[1].clone(),
            similarity: 0.9,
            strategy: "vector,similarity,threshold".into(),
        };
        assert_eq!(replace_links(&pool, &[link.clone()]).await.unwrap(), 1);
        update_link_counts(&pool).await.unwrap();

        let a = get_concept(&pool, &ids[0]).await.unwrap().unwrap();
        assert_eq!(a.record.source_num, 1);
        assert_eq!(a.record.target_num, 0);
        assert_eq!(a.outgoing.len(), 1);
        assert!((a.outgoing[0].similarity - 0.9).abs() < 1e-6);

        let b = get_concept(&pool, &ids[1]).await.unwrap().unwrap();
        assert_eq!(b.record.target_num, 1);
        assert_eq!(b.incoming[0].source_id, ids[0]);

        // Replacing with nothing clears the network
        replace_links(&pool, &[]).await.unwrap();
        update_link_counts(&pool).await.unwrap();
        let a = get_concept(&pool, &ids[0]).await.unwrap().unwrap();
        assert_eq!(a.record.source_num, 0);
        assert!(get_concept(&pool, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_is_limited() {
        let (_tmp, pool) = open().await;
        let batch: Vec<NewConcept> = (0..5)
            .map(|i| concept(&format!("T{}", i), "s", None))
            .collect();
        create_concepts(&pool, &batch).await.unwrap();
        let listed = list_concepts(&pool, 3).await.unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].title, "T4");
    }

    #[test]
    fn dedup_hash_depends_on_identity_fields() {
        let a = concept("A", "s", None).concept;
        let mut b = a.clone();
        b.plaintext = "other body".into();
        assert_eq!(dedup_hash(&a), dedup_hash(&b));
        b.title = "B".into();
        assert_ne!(dedup_hash(&a), dedup_hash(&b));
    }
}
