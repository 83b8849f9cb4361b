//! Extension filtering and the ordered folder/extension sets it reads from.

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::error::{ArchivistError, Result};

pub const DEFAULT_EXTENSIONS: &[&str] = &[".php", ".html", ".js", ".css", ".txt", ".json", ".md", ".go"];

pub const POPULAR_EXTENSIONS: &[&str] = &[
    ".py", ".java", ".cpp", ".c", ".cs", ".rb", ".go", ".rs", ".ts", ".xml", ".yml", ".yaml", ".md", ".sql",
];

pub const DEFAULT_NOISE_DIRS: &[&str] = &[".git", "node_modules", ".vs", ".idea"];

/// Suffix of the final path segment, from its last `.` inclusive.
/// Empty when the segment has no dot.
pub fn extension_of<P: AsRef<Path>>(path: P) -> String {
    let Some(name) = path.as_ref().file_name() else {
        return String::new();
    };
    let name = name.to_string_lossy();
    match name.rfind('.') {
        Some(idx) => name[idx..].to_string(),
        None => String::new(),
    }
}

/// Exact, case-sensitive membership test of the path's suffix.
pub fn matches<P: AsRef<Path>>(path: P, extensions: &ExtensionSet) -> bool {
    let ext = extension_of(path);
    !ext.is_empty() && extensions.contains(&ext)
}

/// Trim and lowercase a user-supplied extension, rejecting anything that
/// could never be produced by [`extension_of`].
pub fn normalize_extension(raw: &str) -> Result<String> {
    let ext = raw.trim().to_lowercase();
    let valid = ext.len() > 1
        && ext.starts_with('.')
        && !ext[1..].contains('.')
        && !ext.chars().any(|c| c.is_whitespace() || c == '/' || c == '\\');

    if valid {
        Ok(ext)
    } else {
        Err(ArchivistError::InvalidExtensionFormat(raw.to_string()))
    }
}

/// Ordered, duplicate-free set of tracked suffixes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionSet {
    items: Vec<String>,
}

impl ExtensionSet {
    pub fn new<I, S>(extensions: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self { items: Vec::new() };
        for ext in extensions {
            let ext = normalize_extension(ext.as_ref())?;
            if !set.contains(&ext) {
                set.items.push(ext);
            }
        }
        Ok(set)
    }

    pub fn empty() -> Self {
        Self { items: Vec::new() }
    }

    pub fn contains(&self, ext: &str) -> bool {
        self.items.iter().any(|e| e == ext)
    }

    /// Insert a new extension, returning its normalized form.
    pub fn insert(&mut self, raw: &str) -> Result<String> {
        let ext = normalize_extension(raw)?;
        if self.contains(&ext) {
            return Err(ArchivistError::DuplicateExtension(ext));
        }
        self.items.push(ext.clone());
        Ok(ext)
    }

    /// Remove an extension. The last entry can never be removed.
    pub fn remove(&mut self, raw: &str) -> Result<String> {
        let ext = normalize_extension(raw)?;
        let Some(idx) = self.items.iter().position(|e| *e == ext) else {
            return Err(ArchivistError::ExtensionNotFound(ext));
        };
        if self.items.len() == 1 {
            return Err(ArchivistError::LastExtension(ext));
        }
        self.items.remove(idx);
        Ok(ext)
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Default for ExtensionSet {
    fn default() -> Self {
        Self {
            items: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// Resolve a path to an existing directory's canonical absolute form.
pub fn resolve_directory<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let path = path.as_ref();
    match std::fs::canonicalize(path) {
        Ok(resolved) if resolved.is_dir() => Ok(resolved),
        _ => Err(ArchivistError::NotADirectory(path.to_path_buf())),
    }
}

/// Ordered, duplicate-free set of watched folders with one primary member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderSet {
    items: Vec<PathBuf>,
    primary: PathBuf,
}

impl FolderSet {
    /// Create a set whose sole member (and primary) is `primary`.
    pub fn new<P: AsRef<Path>>(primary: P) -> Result<Self> {
        let primary = resolve_directory(primary)?;
        Ok(Self {
            items: vec![primary.clone()],
            primary,
        })
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.items.iter().any(|p| p == path)
    }

    pub fn insert<P: AsRef<Path>>(&mut self, path: P) -> Result<PathBuf> {
        let resolved = resolve_directory(path)?;
        if self.contains(&resolved) {
            return Err(ArchivistError::DuplicateFolder(resolved));
        }
        self.items.push(resolved.clone());
        Ok(resolved)
    }

    /// Remove a folder, reassigning the primary to the first remaining member
    /// if needed. The last folder can never be removed.
    pub fn remove<P: AsRef<Path>>(&mut self, path: P) -> Result<PathBuf> {
        let target = self.lookup(path.as_ref())?;
        if self.items.len() == 1 {
            return Err(ArchivistError::LastFolder(target));
        }
        self.items.retain(|p| *p != target);
        if self.primary == target {
            self.primary = self.items[0].clone();
        }
        Ok(target)
    }

    pub fn set_primary<P: AsRef<Path>>(&mut self, path: P) -> Result<PathBuf> {
        let target = self.lookup(path.as_ref())?;
        self.primary = target.clone();
        Ok(target)
    }

    pub fn primary(&self) -> &Path {
        &self.primary
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.items.iter()
    }

    pub fn to_vec(&self) -> Vec<PathBuf> {
        self.items.clone()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Find a member by its given or canonical form. Removed directories can
    /// no longer be canonicalized, so the literal path is tried first.
    fn lookup(&self, path: &Path) -> Result<PathBuf> {
        if self.contains(path) {
            return Ok(path.to_path_buf());
        }
        match std::fs::canonicalize(path) {
            Ok(resolved) if self.contains(&resolved) => Ok(resolved),
            _ => Err(ArchivistError::FolderNotFound(path.to_path_buf())),
        }
    }
}

/// Directory names that are never descended into or watched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoiseDirs(Vec<String>);

impl NoiseDirs {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    pub fn is_noise<P: AsRef<Path>>(&self, path: P) -> bool {
        path.as_ref()
            .file_name()
            .map(|name| self.0.iter().any(|n| name == n.as_str()))
            .unwrap_or(false)
    }

    /// True if any component of `path` below `root` is a noise directory.
    pub fn within_noise(&self, path: &Path, root: &Path) -> bool {
        let rel = path.strip_prefix(root).unwrap_or(path);
        rel.components()
            .any(|comp| self.0.iter().any(|n| comp.as_os_str() == n.as_str()))
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }
}

impl Default for NoiseDirs {
    fn default() -> Self {
        Self::new(DEFAULT_NOISE_DIRS.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn set(exts: &[&str]) -> ExtensionSet {
        ExtensionSet::new(exts.iter().copied()).unwrap()
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("notes/readme.md"), ".md");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of("Makefile"), "");
        assert_eq!(extension_of("dir.d/Makefile"), "");
        assert_eq!(extension_of(".gitignore"), ".gitignore");
        assert_eq!(extension_of(""), "");
    }

    #[test]
    fn test_matches_is_exact_and_case_sensitive() {
        let exts = set(&[".md", ".txt"]);

        assert!(matches("a/b/c.md", &exts));
        assert!(matches("c.txt", &exts));
        assert!(!matches("README.MD", &exts));
        assert!(!matches("c.mdx", &exts));
        assert!(!matches("LICENSE", &exts));
    }

    #[test]
    fn test_matches_empty_set_never_matches() {
        let exts = ExtensionSet::empty();
        assert!(!matches("a.md", &exts));
        assert!(!matches("a", &exts));
    }

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension(" .MD ").unwrap(), ".md");
        assert!(normalize_extension("md").is_err());
        assert!(normalize_extension(".").is_err());
        assert!(normalize_extension(".tar.gz").is_err());
        assert!(normalize_extension(".a b").is_err());
        assert!(normalize_extension("./x").is_err());
    }

    #[test]
    fn test_extension_set_insert_and_remove() {
        let mut exts = set(&[".md"]);

        assert_eq!(exts.insert(".TXT").unwrap(), ".txt");
        assert!(matches!(exts.insert(".md"), Err(ArchivistError::DuplicateExtension(_))));
        assert!(matches!(exts.remove(".rs"), Err(ArchivistError::ExtensionNotFound(_))));

        exts.remove(".md").unwrap();
        assert!(matches!(exts.remove(".txt"), Err(ArchivistError::LastExtension(_))));
        assert_eq!(exts.as_slice(), &[".txt".to_string()]);
    }

    #[test]
    fn test_extension_set_dedups_on_construction() {
        let exts = set(&[".md", ".MD", ".txt"]);
        assert_eq!(exts.len(), 2);
    }

    #[test]
    fn test_folder_set_rules() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        let mut folders = FolderSet::new(a.path()).unwrap();
        let a_path = folders.primary().to_path_buf();

        let b_path = folders.insert(b.path()).unwrap();
        assert!(matches!(folders.insert(b.path()), Err(ArchivistError::DuplicateFolder(_))));
        assert!(matches!(
            folders.insert(a.path().join("missing")),
            Err(ArchivistError::NotADirectory(_))
        ));

        folders.remove(&a_path).unwrap();
        assert_eq!(folders.primary(), b_path.as_path());

        assert!(matches!(folders.remove(&b_path), Err(ArchivistError::LastFolder(_))));
        assert_eq!(folders.len(), 1);
    }

    #[test]
    fn test_folder_set_rejects_files() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, "x").unwrap();

        assert!(matches!(FolderSet::new(&file), Err(ArchivistError::NotADirectory(_))));
    }

    #[test]
    fn test_set_primary() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        let mut folders = FolderSet::new(a.path()).unwrap();
        let b_path = folders.insert(b.path()).unwrap();

        folders.set_primary(b.path()).unwrap();
        assert_eq!(folders.primary(), b_path.as_path());
        assert!(matches!(
            folders.set_primary("/definitely/not/watched"),
            Err(ArchivistError::FolderNotFound(_))
        ));
    }

    #[test]
    fn test_noise_dirs() {
        let noise = NoiseDirs::default();
        assert!(noise.is_noise("/repo/.git"));
        assert!(noise.is_noise("node_modules"));
        assert!(!noise.is_noise("/repo/src"));
        assert!(noise.within_noise(Path::new("/repo/.git/objects/ab"), Path::new("/repo")));
        assert!(!noise.within_noise(Path::new("/repo/src/a.md"), Path::new("/repo")));
    }
}
