//! File system walker for discovering source files to index.
//!
//! Built on the `ignore` crate: .gitignore rules are respected even outside
//! git repositories, configured ignore patterns are layered on top, and only
//! files with a configured extension come back.

use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Settings;

/// Walks directories to find source files to index.
pub struct FileWalker {
    settings: Arc<Settings>,
}

impl FileWalker {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }

    /// Walk a directory and return the files to index.
    pub fn walk<'a>(&'a self, root: &Path) -> impl Iterator<Item = PathBuf> + 'a {
        let mut builder = WalkBuilder::new(root);
        builder
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .follow_links(false)
            .require_git(false);

        let mut override_builder = ignore::overrides::OverrideBuilder::new(root);
        for pattern in &self.settings.indexing.ignore_patterns {
            // Exclusion patterns are expressed as negated overrides.
            if let Err(e) = override_builder.add(&format!("!{pattern}")) {
                tracing::warn!("invalid ignore pattern '{pattern}': {e}");
            }
        }
        if let Ok(overrides) = override_builder.build() {
            builder.overrides(overrides);
        }

        builder
            .build()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .filter_map(move |entry| {
                let path = entry.path();
                self.language_of(path).map(|_| path.to_path_buf())
            })
    }

    /// Language tag for a path, per configured extension map.
    pub fn language_of(&self, path: &Path) -> Option<&str> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        self.settings
            .indexing
            .extensions
            .get(&ext)
            .map(String::as_str)
    }

    /// Count files that would be indexed (dry runs).
    pub fn count_files(&self, root: &Path) -> usize {
        self.walk(root).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn walker() -> FileWalker {
        FileWalker::new(Arc::new(Settings::default()))
    }

    #[test]
    fn finds_supported_extensions_only() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("main.rs"), "fn main() {}").unwrap();
        fs::write(root.join("app.py"), "pass").unwrap();
        fs::write(root.join("binary.obj"), [0u8, 1]).unwrap();

        let files: Vec<_> = walker().walk(root).collect();
        assert_eq!(files.len(), 2);
        assert!(files.iter().any(|p| p.ends_with("main.rs")));
        assert!(files.iter().any(|p| p.ends_with("app.py")));
    }

    #[test]
    fn configured_patterns_are_excluded() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("node_modules/dep")).unwrap();
        fs::write(root.join("node_modules/dep/index.js"), "x").unwrap();
        fs::write(root.join("app.js"), "y").unwrap();

        let files: Vec<_> = walker().walk(root).collect();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("app.js"));
    }

    #[test]
    fn gitignore_is_respected_without_git() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join(".gitignore"), "generated.rs\n").unwrap();
        fs::write(root.join("generated.rs"), "x").unwrap();
        fs::write(root.join("kept.rs"), "y").unwrap();

        let files: Vec<_> = walker().walk(root).collect();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("kept.rs"));
    }

    #[test]
    fn language_lookup() {
        let w = walker();
        assert_eq!(w.language_of(Path::new("a/b.rs")), Some("rust"));
        assert_eq!(w.language_of(Path::new("a/b.TS")), Some("typescript"));
        assert_eq!(w.language_of(Path::new("a/b.zig")), None);
    }
}
