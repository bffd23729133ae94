//! Note traversal.
//!
//! Walks `[notes].root`, keeps files matching the include globs and not the
//! exclude globs, and reads them as UTF-8. Editor and VCS metadata is
//! always skipped.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::config::Config;
use crate::models::NoteFile;

const ALWAYS_EXCLUDED: &[&str] = &[
    "**/.git/**",
    "**/.obsidian/**",
    "**/.DS_Store",
    "**/.gitignore",
];

/// Every matching note under the notes root, sorted by relative path.
pub fn scan_notes(config: &Config) -> Result<Vec<NoteFile>> {
    let notes = config
        .notes
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("[notes] section not configured"))?;

    let root = &notes.root;
    if !root.exists() {
        bail!("Notes root does not exist: {}", root.display());
    }

    let include_set = build_globset(&notes.include_globs)?;
    let mut excludes: Vec<String> = ALWAYS_EXCLUDED.iter().map(|s| s.to_string()).collect();
    excludes.extend(notes.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let datasource = root.display().to_string();
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(notes.follow_symlinks) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("skipping {}: {}", rel_str, e);
                continue;
            }
        };

        files.push(NoteFile {
            relative_path: rel_str,
            datasource: datasource.clone(),
            content,
        });
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotesConfig;
    use std::fs;
    use tempfile::TempDir;

    fn config_for(root: &std::path::Path, exclude: Vec<String>) -> Config {
        let mut config = Config::with_db_path(root.join("db.sqlite"));
        config.notes = Some(NotesConfig {
            root: root.to_path_buf(),
            include_globs: vec!["**/*.md".into()],
            exclude_globs: exclude,
            follow_symlinks: false,
        });
        config
    }

    #[test]
    fn finds_markdown_sorted_and_skips_metadata() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("b")).unwrap();
        fs::create_dir_all(root.join(".obsidian")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("b/two.md"), "two").unwrap();
        fs::write(root.join("a.md"), "한국어 노트").unwrap();
        fs::write(root.join("skip.txt"), "x").unwrap();
        fs::write(root.join(".obsidian/workspace.md"), "x").unwrap();
        fs::write(root.join(".git/HEAD.md"), "x").unwrap();

        let notes = scan_notes(&config_for(root, vec![])).unwrap();
        let paths: Vec<&str> = notes.iter().map(|n| n.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["a.md", "b/two.md"]);
        assert_eq!(notes[0].content, "한국어 노트");
    }

    #[test]
    fn honours_exclude_globs() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("private")).unwrap();
        fs::write(tmp.path().join("private/x.md"), "x").unwrap();
        fs::write(tmp.path().join("keep.md"), "k").unwrap();

        let notes = scan_notes(&config_for(tmp.path(), vec!["private/**".into()])).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].relative_path, "keep.md");
    }

    #[test]
    fn missing_root_or_section_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(scan_notes(&config_for(&tmp.path().join("nope"), vec![])).is_err());
        assert!(scan_notes(&Config::with_db_path("x.sqlite")).is_err());
    }
}
