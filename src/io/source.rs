use std::cell::RefCell;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;
use zip::ZipArchive;

use crate::error::GripError;

/// Kind of entry reported by [`FileSource::list_files`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryType {
    File,
    Directory,
    Class,
}

impl EntryType {
    fn of_file(path: &str) -> Self {
        if path.to_ascii_lowercase().ends_with(".class") {
            EntryType::Class
        } else {
            EntryType::File
        }
    }
}

/// Classpath entry exposed as files addressed by `/`-separated relative
/// paths.
pub trait FileSource {
    fn list_files(&self, callback: &mut dyn FnMut(&str, EntryType)) -> Result<()>;

    fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    fn close(&self) -> Result<()>;
}

pub struct DirectoryFileSource {
    root: PathBuf,
}

impl DirectoryFileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn walk(
        &self,
        directory: &Path,
        prefix: &str,
        callback: &mut dyn FnMut(&str, EntryType),
    ) -> Result<()> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(directory)
            .with_context(|| format!("failed to read directory {}", directory.display()))?
        {
            let entry = entry
                .with_context(|| format!("failed to read entry under {}", directory.display()))?;
            let file_type = entry
                .file_type()
                .with_context(|| format!("failed to stat {}", entry.path().display()))?;
            entries.push((entry.path(), file_type));
        }
        entries.sort_by(|left, right| left.0.cmp(&right.0));

        for (entry, file_type) in entries {
            let Some(name) = entry.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            let relative = if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{prefix}/{name}")
            };
            if file_type.is_dir() {
                callback(&relative, EntryType::Directory);
                self.walk(&entry, &relative, callback)?;
            } else if file_type.is_symlink() && entry.is_dir() {
                // Symlinked directories may point back up the tree.
                debug!(path = %entry.display(), "skipping symlinked directory");
            } else {
                callback(&relative, EntryType::of_file(&relative));
            }
        }
        Ok(())
    }
}

impl FileSource for DirectoryFileSource {
    fn list_files(&self, callback: &mut dyn FnMut(&str, EntryType)) -> Result<()> {
        self.walk(&self.root, "", callback)
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let file = self.root.join(path);
        fs::read(&file).with_context(|| format!("failed to read {}", file.display()))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

pub struct JarFileSource {
    path: PathBuf,
    archive: RefCell<Option<ZipArchive<fs::File>>>,
}

impl JarFileSource {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file =
            fs::File::open(&path).with_context(|| format!("failed to open {}", path.display()))?;
        let archive =
            ZipArchive::new(file).with_context(|| format!("failed to read {}", path.display()))?;
        Ok(Self {
            path,
            archive: RefCell::new(Some(archive)),
        })
    }

    fn with_archive<T>(
        &self,
        action: impl FnOnce(&mut ZipArchive<fs::File>) -> Result<T>,
    ) -> Result<T> {
        let mut archive = self.archive.borrow_mut();
        match archive.as_mut() {
            Some(archive) => action(archive),
            None => Err(GripError::Closed("jar file source").into()),
        }
    }
}

impl FileSource for JarFileSource {
    fn list_files(&self, callback: &mut dyn FnMut(&str, EntryType)) -> Result<()> {
        self.with_archive(|archive| {
            for index in 0..archive.len() {
                let entry = archive
                    .by_index(index)
                    .with_context(|| format!("failed to read {}", self.path.display()))?;
                let name = entry.name().trim_end_matches('/');
                let entry_type = if entry.is_dir() {
                    EntryType::Directory
                } else {
                    EntryType::of_file(name)
                };
                callback(name, entry_type);
            }
            Ok(())
        })
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.with_archive(|archive| {
            let mut entry = archive
                .by_name(path)
                .with_context(|| format!("failed to read {}:{}", self.path.display(), path))?;
            let mut data = Vec::new();
            entry
                .read_to_end(&mut data)
                .with_context(|| format!("failed to read {}:{}", self.path.display(), path))?;
            Ok(data)
        })
    }

    fn close(&self) -> Result<()> {
        self.archive.borrow_mut().take();
        Ok(())
    }
}

/// Source for a classpath entry that does not exist.
pub struct EmptyFileSource;

impl FileSource for EmptyFileSource {
    fn list_files(&self, _callback: &mut dyn FnMut(&str, EntryType)) -> Result<()> {
        Ok(())
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        anyhow::bail!("empty file source has no file {path}")
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
