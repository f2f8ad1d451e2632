//! In-memory virtual file system
//!
//! Files and directories live in a single flat map keyed by normalized
//! absolute path. There are no handles and no parent back-pointers;
//! directory contents are reconstructed on demand with a prefix scan over
//! the map, which keeps "exactly one parent" and "no cyclic references"
//! true by construction rather than by invariant-checking.

use std::collections::HashMap;
use std::fmt;

/// A file or directory entry.
#[derive(Debug, Clone)]
pub enum Node {
    File {
        content: String,
        permissions: String,
        modified: f64,
    },
    Directory {
        permissions: String,
        modified: f64,
    },
}

impl Node {
    fn permissions(&self) -> &str {
        match self {
            Node::File { permissions, .. } => permissions,
            Node::Directory { permissions, .. } => permissions,
        }
    }

    fn modified(&self) -> f64 {
        match self {
            Node::File { modified, .. } => *modified,
            Node::Directory { modified, .. } => *modified,
        }
    }
}

/// A single failure kind for all VFS operations; callers format their own
/// command-specific prefix (`cd:`, `cat:`, ...) around `message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsError {
    pub message: String,
}

impl FsError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for FsError {}

pub type FsResult<T> = Result<T, FsError>;

/// The type of a VFS entry, as reported by `detailed_listing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    File,
    Directory,
}

/// One entry returned by `detailed_listing`.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub entry_type: EntryType,
    pub permissions: String,
    pub size: u64,
    pub modified: f64,
}

const DEFAULT_FILE_PERMS: &str = "-rw-r--r--";
const DEFAULT_DIR_PERMS: &str = "drwxr-xr-x";

/// Normalize a path (possibly relative to `cwd`) into an absolute,
/// `/`-separated path with no empty segments, `.`, or unresolved `..`.
pub fn normalize_path(cwd: &str, path: &str) -> String {
    let path = path.strip_prefix("./").unwrap_or(path);
    if path.is_empty() {
        return normalize_absolute(cwd);
    }
    if path.starts_with('/') {
        normalize_absolute(path)
    } else {
        normalize_absolute(&format!("{}/{}", cwd.trim_end_matches('/'), path))
    }
}

fn normalize_absolute(path: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }
    if stack.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", stack.join("/"))
    }
}

fn parent_path(path: &str) -> &str {
    if path == "/" {
        return "/";
    }
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => "/",
    }
}

fn name_of(path: &str) -> &str {
    if path == "/" {
        return "/";
    }
    path.rsplit('/').next().unwrap_or(path)
}

/// The virtual file system. Created once per shell session.
pub struct Vfs {
    nodes: HashMap<String, Node>,
    cwd: String,
}

impl Vfs {
    /// An empty filesystem with just the root directory.
    pub fn empty() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            "/".to_string(),
            Node::Directory {
                permissions: DEFAULT_DIR_PERMS.to_string(),
                modified: 0.0,
            },
        );
        Self {
            nodes,
            cwd: "/".to_string(),
        }
    }

    /// The seeded layout described in the data model: `/home/user` with a
    /// README and an empty `documents/`, plus `/bin`, `/tmp`, `/etc`.
    pub fn seeded(now: f64) -> Self {
        let mut fs = Self::empty();
        for dir in ["/home", "/home/user", "/home/user/documents", "/bin", "/tmp", "/etc"] {
            fs.nodes.insert(
                dir.to_string(),
                Node::Directory {
                    permissions: DEFAULT_DIR_PERMS.to_string(),
                    modified: now,
                },
            );
        }
        fs.nodes.insert(
            "/home/user/README.md".to_string(),
            Node::File {
                content: "Welcome to moo-dang shell!\n\nType `help` to get started.\n".to_string(),
                permissions: DEFAULT_FILE_PERMS.to_string(),
                modified: now,
            },
        );
        fs.cwd = "/home/user".to_string();
        fs
    }

    fn resolve(&self, cwd: &str, path: &str) -> String {
        normalize_path(cwd, path)
    }

    pub fn get_current_directory(&self) -> &str {
        &self.cwd
    }

    /// Validates that `path` exists and is a directory, returning the new
    /// normalized absolute path without mutating `self.cwd` (the caller,
    /// `Environment`, owns the authoritative working directory).
    pub fn change_directory(&self, cwd: &str, path: &str) -> FsResult<String> {
        let resolved = self.resolve(cwd, path);
        match self.nodes.get(&resolved) {
            Some(Node::Directory { .. }) => Ok(resolved),
            Some(Node::File { .. }) => Err(FsError::new(format!("not a directory: {}", path))),
            None => Err(FsError::new(format!("no such file or directory: {}", path))),
        }
    }

    fn children(&self, dir: &str) -> Vec<String> {
        let prefix = if dir == "/" {
            "/".to_string()
        } else {
            format!("{}/", dir)
        };
        let mut names = Vec::new();
        for key in self.nodes.keys() {
            if key == dir {
                continue;
            }
            if let Some(rest) = key.strip_prefix(&prefix) {
                if !rest.is_empty() && !rest.contains('/') {
                    names.push(rest.to_string());
                }
            }
        }
        names
    }

    pub fn list_directory(&self, cwd: &str, path: &str) -> FsResult<Vec<String>> {
        let resolved = self.resolve(cwd, path);
        match self.nodes.get(&resolved) {
            Some(Node::Directory { .. }) => {
                let mut names = self.children(&resolved);
                names.sort();
                Ok(names)
            }
            Some(Node::File { .. }) => Err(FsError::new(format!("not a directory: {}", path))),
            None => Err(FsError::new(format!("no such file or directory: {}", path))),
        }
    }

    pub fn detailed_listing(&self, cwd: &str, path: &str) -> FsResult<Vec<DirEntry>> {
        let resolved = self.resolve(cwd, path);
        match self.nodes.get(&resolved) {
            Some(Node::Directory { .. }) => {
                let mut names = self.children(&resolved);
                names.sort();
                let mut entries = Vec::with_capacity(names.len());
                for name in names {
                    let child_path = if resolved == "/" {
                        format!("/{}", name)
                    } else {
                        format!("{}/{}", resolved, name)
                    };
                    let node = self.nodes.get(&child_path).expect("scanned key must exist");
                    let (entry_type, size) = match node {
                        Node::File { content, .. } => (EntryType::File, content.len() as u64),
                        Node::Directory { .. } => {
                            (EntryType::Directory, self.recursive_size(&child_path))
                        }
                    };
                    entries.push(DirEntry {
                        name,
                        entry_type,
                        permissions: node.permissions().to_string(),
                        size,
                        modified: node.modified(),
                    });
                }
                Ok(entries)
            }
            Some(Node::File { .. }) => Err(FsError::new(format!("not a directory: {}", path))),
            None => Err(FsError::new(format!("no such file or directory: {}", path))),
        }
    }

    pub fn exists(&self, cwd: &str, path: &str) -> bool {
        self.nodes.contains_key(&self.resolve(cwd, path))
    }

    pub fn read_file(&self, cwd: &str, path: &str) -> FsResult<String> {
        let resolved = self.resolve(cwd, path);
        match self.nodes.get(&resolved) {
            Some(Node::File { content, .. }) => Ok(content.clone()),
            Some(Node::Directory { .. }) => Err(FsError::new(format!("is a directory: {}", path))),
            None => Err(FsError::new(format!("no such file or directory: {}", path))),
        }
    }

    pub fn write_file(&mut self, cwd: &str, path: &str, content: &str, now: f64) -> FsResult<()> {
        let resolved = self.resolve(cwd, path);
        let parent = parent_path(&resolved);
        match self.nodes.get(parent) {
            Some(Node::Directory { .. }) => {}
            Some(Node::File { .. }) => {
                return Err(FsError::new(format!("not a directory: {}", parent)));
            }
            None => return Err(FsError::new(format!("no such file or directory: {}", parent))),
        }
        if let Some(Node::Directory { .. }) = self.nodes.get(&resolved) {
            return Err(FsError::new(format!("is a directory: {}", path)));
        }
        self.nodes.insert(
            resolved,
            Node::File {
                content: content.to_string(),
                permissions: DEFAULT_FILE_PERMS.to_string(),
                modified: now,
            },
        );
        Ok(())
    }

    pub fn create_directory(&mut self, cwd: &str, path: &str, now: f64) -> FsResult<()> {
        let resolved = self.resolve(cwd, path);
        if resolved == "/" {
            return Err(FsError::new("already exists: /"));
        }
        let parent = parent_path(&resolved);
        match self.nodes.get(parent) {
            Some(Node::Directory { .. }) => {}
            Some(Node::File { .. }) => {
                return Err(FsError::new(format!("not a directory: {}", parent)));
            }
            None => return Err(FsError::new(format!("no such file or directory: {}", parent))),
        }
        if self.nodes.contains_key(&resolved) {
            return Err(FsError::new(format!("already exists: {}", path)));
        }
        self.nodes.insert(
            resolved,
            Node::Directory {
                permissions: DEFAULT_DIR_PERMS.to_string(),
                modified: now,
            },
        );
        Ok(())
    }

    /// Removes a file or directory entry. Directories must be empty
    /// (POSIX `rmdir` semantics) — the one real precedent in the corpus
    /// (`MemoryFs::remove_dir`) already rejects non-empty directories, and
    /// it is a simpler invariant to keep than recursive deletion.
    pub fn remove(&mut self, cwd: &str, path: &str) -> FsResult<()> {
        let resolved = self.resolve(cwd, path);
        if resolved == "/" {
            return Err(FsError::new("cannot remove /"));
        }
        match self.nodes.get(&resolved) {
            Some(Node::Directory { .. }) => {
                if !self.children(&resolved).is_empty() {
                    return Err(FsError::new(format!("directory not empty: {}", path)));
                }
            }
            Some(Node::File { .. }) => {}
            None => return Err(FsError::new(format!("no such file or directory: {}", path))),
        }
        self.nodes.remove(&resolved);
        Ok(())
    }

    pub fn is_directory(&self, cwd: &str, path: &str) -> bool {
        matches!(
            self.nodes.get(&self.resolve(cwd, path)),
            Some(Node::Directory { .. })
        )
    }

    pub fn is_file(&self, cwd: &str, path: &str) -> bool {
        matches!(self.nodes.get(&self.resolve(cwd, path)), Some(Node::File { .. }))
    }

    fn recursive_size(&self, dir: &str) -> u64 {
        let mut total = 0u64;
        for name in self.children(dir) {
            let child = if dir == "/" {
                format!("/{}", name)
            } else {
                format!("{}/{}", dir, name)
            };
            match self.nodes.get(&child) {
                Some(Node::File { content, .. }) => total += content.len() as u64,
                Some(Node::Directory { .. }) => total += self.recursive_size(&child),
                None => {}
            }
        }
        total
    }

    pub fn get_size(&self, cwd: &str, path: &str) -> FsResult<u64> {
        let resolved = self.resolve(cwd, path);
        match self.nodes.get(&resolved) {
            Some(Node::File { content, .. }) => Ok(content.len() as u64),
            Some(Node::Directory { .. }) => Ok(self.recursive_size(&resolved)),
            None => Err(FsError::new(format!("no such file or directory: {}", path))),
        }
    }

    pub fn name_of(path: &str) -> &str {
        name_of(path)
    }
}

impl Default for Vfs {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_handles_dot_dot() {
        assert_eq!(normalize_path("/home/user", "../bin"), "/home/bin");
        assert_eq!(normalize_path("/", "a/./b/../c"), "/a/c");
    }

    #[test]
    fn normalize_is_idempotent() {
        for p in ["/a/b/c", "/", "/a/../b", "a/b"] {
            let once = normalize_path("/home/user", p);
            let twice = normalize_path("/home/user", &once);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn empty_path_resolves_to_cwd() {
        assert_eq!(normalize_path("/home/user", ""), "/home/user");
    }

    #[test]
    fn seeded_layout_has_readme() {
        let fs = Vfs::seeded(0.0);
        assert!(fs.is_file("/home/user", "README.md"));
        assert!(fs.is_directory("/home/user", "documents"));
        let content = fs.read_file("/home/user", "README.md").unwrap();
        assert!(content.starts_with("Welcome to moo-dang shell!"));
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut fs = Vfs::seeded(0.0);
        fs.write_file("/tmp", "x.txt", "hello", 1.0).unwrap();
        assert_eq!(fs.read_file("/tmp", "x.txt").unwrap(), "hello");
    }

    #[test]
    fn write_fails_on_missing_parent() {
        let mut fs = Vfs::seeded(0.0);
        assert!(fs.write_file("/", "no/such/dir/x.txt", "x", 1.0).is_err());
    }

    #[test]
    fn listing_is_sorted() {
        let mut fs = Vfs::seeded(0.0);
        fs.write_file("/tmp", "b.txt", "", 1.0).unwrap();
        fs.write_file("/tmp", "a.txt", "", 1.0).unwrap();
        assert_eq!(fs.list_directory("/", "/tmp").unwrap(), vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn remove_rejects_nonempty_directory() {
        let mut fs = Vfs::seeded(0.0);
        assert!(fs.remove("/", "/home/user").is_err());
        fs.remove("/", "/home/user/documents").unwrap();
    }

    #[test]
    fn remove_missing_path_fails() {
        let mut fs = Vfs::seeded(0.0);
        assert!(fs.remove("/", "/nope").is_err());
    }

    #[test]
    fn get_size_is_recursive_for_directories() {
        let mut fs = Vfs::seeded(0.0);
        fs.write_file("/home/user/documents", "a.txt", "12345", 1.0).unwrap();
        assert_eq!(fs.get_size("/", "/home/user/documents").unwrap(), 5);
    }

    #[test]
    fn exists_never_fails() {
        let fs = Vfs::seeded(0.0);
        assert!(!fs.exists("/", "/does/not/exist"));
        assert!(fs.exists("/", "/home/user"));
    }
}
