use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{FaceFindError, Result};
use crate::extractor::{EmbeddingExtractor, FaceEmbedder, ImageFaceSet};

/// Directory names that are never descended into.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipList(BTreeSet<String>);

impl SkipList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>) {
        self.0.insert(name.into());
    }

    pub fn contains(&self, name: &OsStr) -> bool {
        name.to_str().is_some_and(|name| self.0.contains(name))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for SkipList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<String>> Extend<S> for SkipList {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        self.0.extend(iter.into_iter().map(Into::into));
    }
}

/// One image that contained at least one face.
#[derive(Debug, Clone)]
pub struct ScanEntry {
    /// Display key, assigned in traversal order starting at 1.
    pub key: usize,
    /// Canonical path; the stable identity of the entry.
    pub path: PathBuf,
    pub faces: ImageFaceSet,
}

/// Images with faces found under a scan root.
///
/// Every entry holds a non-empty face set. Keys increase with traversal order.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    entries: BTreeMap<usize, ScanEntry>,
    by_path: HashMap<PathBuf, usize>,
}

impl ScanResult {
    fn push(&mut self, path: PathBuf, faces: ImageFaceSet) -> Option<usize> {
        debug_assert!(!faces.is_empty());
        if self.by_path.contains_key(&path) {
            return None;
        }
        let key = self.entries.keys().next_back().map_or(1, |last| last + 1);
        self.by_path.insert(path.clone(), key);
        self.entries.insert(key, ScanEntry { key, path, faces });
        Some(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: usize) -> Option<&ScanEntry> {
        self.entries.get(&key)
    }

    /// Look an entry up by file path; relative paths are canonicalized first.
    pub fn get_by_path(&self, path: &Path) -> Option<&ScanEntry> {
        let canonical = path.canonicalize().ok()?;
        self.by_path.get(&canonical).and_then(|key| self.get(*key))
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = &ScanEntry> {
        self.entries.values()
    }
}

impl IntoIterator for ScanResult {
    type Item = ScanEntry;
    type IntoIter = std::collections::btree_map::IntoValues<usize, ScanEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}

/// Walks a directory tree and collects the face sets of every image in it.
pub struct DirectoryScanner<'a, M> {
    extractor: &'a mut EmbeddingExtractor<M>,
}

impl<'a, M: FaceEmbedder> DirectoryScanner<'a, M> {
    pub fn new(extractor: &'a mut EmbeddingExtractor<M>) -> Self {
        Self { extractor }
    }

    /// Depth-first, siblings in file name order, so keys are reproducible for
    /// an unchanged tree. Directories named in `skip` are pruned with their
    /// contents; `root` itself is always visited.
    pub fn scan(&mut self, root: &Path, skip: &SkipList) -> Result<ScanResult> {
        if !root.is_dir() {
            return Err(FaceFindError::DirectoryNotFound(root.to_path_buf()));
        }

        let mut result = ScanResult::default();
        // canonical paths already handed to the extractor
        let mut visited = HashSet::new();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0 || !(e.file_type().is_dir() && skip.contains(e.file_name()))
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.depth() == 0 => {
                    return Err(FaceFindError::Io {
                        path: root.to_path_buf(),
                        source: err.into(),
                    });
                }
                Err(err) => {
                    warn!("skipping unreadable entry: {}", err);
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                info!("Traversing directory: {}", entry.path().display());
                continue;
            }

            let path = match entry.path().canonicalize() {
                Ok(path) => path,
                Err(err) => {
                    debug!("skipping {}: {}", entry.path().display(), err);
                    continue;
                }
            };
            if !visited.insert(path.clone()) {
                debug!("already scanned {}", entry.path().display());
                continue;
            }

            let faces = self.extractor.extract(entry.path())?;
            if faces.is_empty() {
                continue;
            }

            let count = faces.len();
            if let Some(key) = result.push(path, faces) {
                info!("[{}] {} face(s) in {}", key, count, entry.path().display());
            }
        }

        info!("Done: {} image(s) with faces", result.len());
        Ok(result)
    }
}
