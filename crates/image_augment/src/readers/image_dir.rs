use crate::dataset::DataSource;
use anyhow::{anyhow, bail, Context, Result};
use std::fs;
use std::path::PathBuf;
use walkdir::WalkDir;

/// Streams image file paths from a directory, optionally recursing, filtered by extension.
///
/// Only paths are yielded; decoding is left to a downstream transform so a pass over a
/// large dataset keeps at most one image in memory.
///
/// # Example
/// ```ignore
/// let source = ImageDirSource::new("./data/images", &["jpg", "png"], true);
/// for path in source.stream()? {
///     let image = LoadImage.apply(path?)?;
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ImageDirSource {
    dir_path: PathBuf,
    extensions: Vec<String>,
    recurse: bool,
}

impl ImageDirSource {
    /// `extensions` are matched case-insensitively, without the leading dot.
    pub fn new(dir_path: impl Into<PathBuf>, extensions: &[&str], recurse: bool) -> Self {
        Self {
            dir_path: dir_path.into(),
            extensions: extensions.iter().map(|s| s.to_lowercase()).collect(),
            recurse,
        }
    }

    fn accepts(extensions: &[String], path: &std::path::Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| extensions.contains(&e.to_lowercase()))
    }
}

impl DataSource<PathBuf> for ImageDirSource {
    fn stream(&self) -> Result<Box<dyn Iterator<Item = Result<PathBuf>> + Send>> {
        let dir_metadata = fs::metadata(&self.dir_path)
            .with_context(|| format!("Failed to access directory: {}", self.dir_path.display()))?;
        if !dir_metadata.is_dir() {
            bail!("Path is not a directory: {}", self.dir_path.display());
        }

        // Walk order is sorted by file name so every pass sees the same sequence.
        let max_depth = if self.recurse { usize::MAX } else { 1 };
        let walker = WalkDir::new(&self.dir_path)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter();

        let extensions = self.extensions.clone();
        let iter = walker.filter_map(move |entry| match entry {
            Ok(entry) => {
                let path = entry.path();
                if entry.path_is_symlink() || !entry.file_type().is_file() {
                    return None;
                }
                if Self::accepts(&extensions, path) {
                    Some(Ok(path.to_path_buf()))
                } else {
                    None
                }
            }
            Err(e) => Some(Err(anyhow!("Failed to read directory entry: {}", e))),
        });
        Ok(Box::new(iter))
    }
}
