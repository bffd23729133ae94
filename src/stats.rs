//! Database statistics.
//!
//! A quick summary of what has been mined: concept counts, embedding
//! coverage, network size and the category breakdown.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::store;

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let s = store::stats(&pool).await?;
    pool.close().await;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Concept Miner: Database Stats");
    println!("==============================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Files:       {}", s.files);
    println!("  Concepts:    {}", s.concepts);
    println!(
        "  Embedded:    {} / {} ({}%)",
        s.embedded,
        s.concepts,
        if s.concepts > 0 {
            (s.embedded * 100) / s.concepts
        } else {
            0
        }
    );
    println!("  Links:       {}", s.edges);
    println!("  Tokens:      {}", s.tokens);

    if !s.categories.is_empty() {
        println!();
        println!("  By category:");
        println!("  {:<16} {:>8}", "CATEGORY", "CONCEPTS");
        println!("  {}", "-".repeat(25));
        for (category, n) in &s.categories {
            let name = if category.is_empty() { "(none)" } else { category.as_str() };
            println!("  {:<16} {:>8}", name, n);
        }
    }
    println!();
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
