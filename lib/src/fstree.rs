use std::sync::Arc;
use std::path::{Path, PathBuf};
use std::{fs, fmt};

use rustc_hash::FxHashMap;

use crate::error::Result;

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct EntryId(pub(crate) usize);

/// A snapshot of a directory tree, minus pruned subtrees.
#[derive(Debug)]
pub struct FsTree {
    root: PathBuf,
    entries: Vec<Entry>,
    map: FxHashMap<Arc<Path>, EntryId>,
}

#[derive(Debug)]
pub struct Entry {
    pub id: EntryId,
    /// Absolute (or root-joined) path to the entry.
    pub path: Arc<Path>,
    /// Path relative to the tree's root. Empty for the root itself.
    pub relative: Arc<Path>,
    pub file_name: String,
    pub file_type: fs::FileType,
    pub depth: usize,
}

impl FsTree {
    pub fn build<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::build_with(root, |_, _| false)
    }

    /// Walks `root`, calling `prune(relative_path, is_dir)` on every entry.
    /// Entries for which `prune` returns `true` are dropped; pruned
    /// directories are never descended into.
    pub fn build_with<P, F>(root: P, prune: F) -> Result<Self>
        where P: AsRef<Path>,
              F: Fn(&Path, bool) -> bool + Send + Sync + 'static,
    {
        use jwalk::WalkDirGeneric;

        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return err! {
                "project root must be an existing directory",
                "search root" => root.display(),
            };
        }

        let walk_root = root.clone();
        let walker = WalkDirGeneric::<((), ())>::new(&root)
            .skip_hidden(false)
            .sort(true)
            .process_read_dir(move |_, _, _, children| {
                children.retain(|child| match child {
                    Ok(e) => {
                        let path = e.parent_path.join(&e.file_name);
                        let relative = path.strip_prefix(&walk_root).unwrap_or(&path);
                        !prune(relative, e.file_type.is_dir())
                    }
                    Err(_) => false,
                });
            });

        let mut tree = FsTree {
            root: root.clone(),
            entries: vec![],
            map: FxHashMap::default(),
        };

        for entry in walker.into_iter().filter_map(|e| e.ok()) {
            tree.insert(entry);
        }

        if tree.len() == 0 {
            return err! {
                "file system tree discovery yielded zero files",
                "search root" => root.display(),
            }
        }

        Ok(tree)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up an entry by its path relative to the root.
    pub fn get<P: AsRef<Path>>(&self, relative: P) -> Option<&Entry> {
        self.map.get(relative.as_ref()).map(|id| &self[*id])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    pub fn files(&self) -> impl Iterator<Item = &Entry> {
        self.iter().filter(|e| e.file_type.is_file())
    }

    fn insert(&mut self, entry: jwalk::DirEntry<((), ())>) {
        let path: Arc<Path> = Arc::from(entry.path().into_boxed_path());
        let relative: Arc<Path> = path.strip_prefix(&self.root)
            .map(Arc::from)
            .unwrap_or_else(|_| Arc::from(Path::new("")));

        let entry = Entry {
            id: EntryId(self.entries.len()),
            path,
            relative,
            file_type: entry.file_type,
            file_name: entry.file_name.to_string_lossy().into_owned(),
            depth: entry.depth,
        };

        self.map.insert(entry.relative.clone(), entry.id);
        self.entries.push(entry);
    }
}

impl Entry {
    /// File name without the extension.
    pub fn file_stem(&self) -> &str {
        match self.file_name.rsplit_once('.') {
            Some((left, _)) => left,
            None => &self.file_name,
        }
    }

    /// Path relative to the root of the tree.
    pub fn relative_path(&self) -> &Path {
        &self.relative
    }

    /// The relative path as a `/`-separated string.
    pub fn relative_str(&self) -> String {
        crate::util::slash_path(&self.relative)
    }
}

impl std::ops::Index<EntryId> for FsTree {
    type Output = Entry;

    fn index(&self, index: EntryId) -> &Self::Output {
        &self.entries[index.0]
    }
}

impl fmt::Debug for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use super::*;

    #[test]
    fn pruned_directories_are_not_walked() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        fs::create_dir_all(dir.path().join("css")).unwrap();
        fs::write(dir.path().join("node_modules/pkg/index.html"), "x").unwrap();
        fs::write(dir.path().join("css/site.css"), "x").unwrap();
        fs::write(dir.path().join("index.html"), "x").unwrap();

        let tree = FsTree::build_with(dir.path(), |path, is_dir| {
            is_dir && path.ends_with("node_modules")
        }).unwrap();

        let files: Vec<_> = tree.files().map(|e| e.relative_str()).collect();
        assert_eq!(files, vec!["css/site.css", "index.html"]);
        assert!(tree.get("node_modules").is_none());
        assert_eq!(tree.get("css/site.css").unwrap().file_stem(), "site");
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FsTree::build(dir.path().join("nope")).is_err());
    }
}
