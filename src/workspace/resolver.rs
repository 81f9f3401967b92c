//! Maps user paths to stable workspace hashes and on-disk index locations.
//!
//! The hash is the identity of a workspace: it names the index directory, the
//! symbol database file, and the registry key. It must come out identical for
//! the same directory regardless of platform spelling, so the path is
//! normalized before hashing.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Hex digits of the SHA-256 digest kept as the workspace hash.
const HASH_LEN: usize = 16;

/// Resolves user paths to workspace identities and index locations.
#[derive(Debug, Clone)]
pub struct PathResolver {
    base_path: PathBuf,
}

impl PathResolver {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve to an absolute path, following symlinks when the target
    /// exists. Nonexistent paths are joined onto the current directory and
    /// cleaned lexically so hashing stays deterministic.
    pub fn canonicalize(&self, path: &Path) -> PathBuf {
        if let Ok(real) = std::fs::canonicalize(path) {
            return real;
        }
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(path)
        };
        lexical_clean(&absolute)
    }

    /// Deterministic short digest of the canonical path.
    ///
    /// Normalization: backslashes become forward slashes, trailing separators
    /// are trimmed, the whole string is lowercased, and a leading drive
    /// letter is re-uppercased so `c:\Proj` and `C:/proj/` agree.
    pub fn workspace_hash(&self, path: &Path) -> String {
        let normalized = normalize_for_hash(path);
        let digest = Sha256::digest(normalized.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        hex[..HASH_LEN].to_string()
    }

    /// Directory holding the lexical index for a workspace.
    pub fn index_root(&self, hash: &str) -> PathBuf {
        self.base_path.join("index").join(hash)
    }

    /// Alias kept for the lexical engine; same directory as [`index_root`].
    pub fn lexical_index_path(&self, hash: &str) -> PathBuf {
        self.index_root(hash)
    }

    /// Single-file symbol database for a workspace.
    pub fn symbol_db_path(&self, hash: &str) -> PathBuf {
        self.base_path.join("index").join(format!("{hash}.db"))
    }

    /// Registry document location.
    pub fn registry_path(&self) -> PathBuf {
        self.base_path.join("registry.json")
    }

    /// (project, local) memory-store index directories.
    pub fn memory_paths(&self) -> (PathBuf, PathBuf) {
        (
            self.base_path.join("project-memory"),
            self.base_path.join("local-memory"),
        )
    }

    /// Backup snapshot directory for migrations.
    pub fn backup_path(&self, stamp: &str) -> PathBuf {
        self.base_path.join("backups").join(stamp)
    }

    /// True when the path points inside one of the memory-store subtrees
    /// rather than at a user workspace.
    pub fn is_memory_path(&self, path: &Path) -> bool {
        let (project, local) = self.memory_paths();
        path.starts_with(&project) || path.starts_with(&local)
    }

    /// Whole-segment containment: `/proj` contains `/proj/sub` but not
    /// `/proj-x`.
    pub fn contains_path(workspace_root: &Path, candidate: &Path) -> bool {
        candidate.starts_with(workspace_root)
    }
}

/// Resolve `.` and `..` segments without touching the filesystem.
fn lexical_clean(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}

fn normalize_for_hash(path: &Path) -> String {
    let mut s = path.to_string_lossy().replace('\\', "/");
    while s.len() > 1 && s.ends_with('/') {
        s.pop();
    }
    let mut s = s.to_lowercase();
    // Re-uppercase a Windows drive letter after the blanket lowercase.
    let bytes = s.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_lowercase() {
        let upper = (bytes[0] as char).to_ascii_uppercase();
        s.replace_range(0..1, &upper.to_string());
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> PathResolver {
        PathResolver::new("/tmp/codescout-base")
    }

    #[test]
    fn hash_is_stable_and_short() {
        let r = resolver();
        let h1 = r.workspace_hash(Path::new("/home/user/project"));
        let h2 = r.workspace_hash(Path::new("/home/user/project"));
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), HASH_LEN);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hash_normalizes_platform_spellings() {
        let r = resolver();
        assert_eq!(
            r.workspace_hash(Path::new("/home/User/Project/")),
            r.workspace_hash(Path::new("/home/user/project"))
        );
        assert_eq!(
            r.workspace_hash(Path::new("C:\\Projects\\App")),
            r.workspace_hash(Path::new("c:/projects/app/"))
        );
    }

    #[test]
    fn different_paths_hash_differently() {
        let r = resolver();
        assert_ne!(
            r.workspace_hash(Path::new("/proj")),
            r.workspace_hash(Path::new("/proj-x"))
        );
    }

    #[test]
    fn index_locations_derive_from_hash() {
        let r = resolver();
        let hash = "abcd1234abcd1234";
        assert_eq!(
            r.index_root(hash),
            PathBuf::from("/tmp/codescout-base/index/abcd1234abcd1234")
        );
        assert_eq!(
            r.symbol_db_path(hash),
            PathBuf::from("/tmp/codescout-base/index/abcd1234abcd1234.db")
        );
    }

    #[test]
    fn memory_paths_are_distinguished() {
        let r = resolver();
        let (project, local) = r.memory_paths();
        assert!(r.is_memory_path(&project.join("segment")));
        assert!(r.is_memory_path(&local));
        assert!(!r.is_memory_path(Path::new("/home/user/project")));
    }

    #[test]
    fn containment_matches_whole_segments() {
        assert!(PathResolver::contains_path(
            Path::new("/proj"),
            Path::new("/proj/src/main.rs")
        ));
        assert!(!PathResolver::contains_path(
            Path::new("/proj"),
            Path::new("/proj-x/src/main.rs")
        ));
    }

    #[test]
    fn canonicalize_cleans_nonexistent_paths() {
        let r = resolver();
        let cleaned = r.canonicalize(Path::new("/a/b/../c/./d"));
        assert_eq!(cleaned, PathBuf::from("/a/c/d"));
    }
}
