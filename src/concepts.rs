//! Concept listing and retrieval.
//!
//! Backs `cmine concepts` and `cmine show <id>`.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::db;
use crate::models::Link;
use crate::store;

pub async fn run_concepts(config: &Config, limit: usize) -> Result<()> {
    let pool = db::connect(config).await?;
    let concepts = store::list_concepts(&pool, limit).await?;
    pool.close().await;

    if concepts.is_empty() {
        println!("No concepts stored. Run `cmine mine` first.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<6}  {:>4} {:>4}  {}",
        "ID", "CAT", "OUT", "IN", "TITLE"
    );
    for c in &concepts {
        println!(
            "{:<36}  {:<6}  {:>4} {:>4}  {}",
            c.id,
            if c.category.is_empty() { "-" } else { c.category.as_str() },
            c.source_num,
            c.target_num,
            c.title
        );
    }
    Ok(())
}

pub async fn run_show(config: &Config, id: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let detail = store::get_concept(&pool, id).await?;
    pool.close().await;

    let Some(detail) = detail else {
        bail!("concept not found: {}", id);
    };
    let c = &detail.record;

    println!("--- Concept ---");
    println!("id:         {}", c.id);
    println!("title:      {}", c.title);
    println!("category:   {}", c.category);
    println!("keywords:   {}", c.keywords);
    println!("file:       {}", c.filepath);
    println!("datasource: {}", c.datasource);
    println!("tokens:     {}", c.token_num);
    match c.dims {
        Some(d) => println!("embedding:  {} dims", d),
        None => println!("embedding:  (none)"),
    }
    println!("created_at: {}", format_ts_iso(c.created_at));
    println!();

    println!("--- Summary ---");
    println!("{}", c.summary);
    println!();

    print_links("Outgoing", &detail.outgoing, |l| &l.target_id);
    print_links("Incoming", &detail.incoming, |l| &l.source_id);
    Ok(())
}

fn print_links(label: &str, links: &[Link], peer: impl Fn(&Link) -> &String) {
    println!("--- {} links ({}) ---", label, links.len());
    for link in links {
        println!("{:.4}  {}  [{}]", link.similarity, peer(link), link.strategy);
    }
    println!();
}

pub(crate) fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_unix_seconds() {
        assert_eq!(format_ts_iso(0), "1970-01-01T00:00:00Z");
        assert_eq!(format_ts_iso(1_700_000_000), "2023-11-14T22:13:20Z");
    }
}
