use std::cell::RefCell;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::error::GripError;

/// Destination for produced files, addressed by `/`-separated relative
/// paths.
pub trait FileSink {
    fn create_file(&self, path: &str, data: &[u8]) -> Result<()>;

    fn create_directory(&self, path: &str) -> Result<()>;

    fn flush(&self) -> Result<()>;

    fn close(&self) -> Result<()>;
}

pub struct DirectoryFileSink {
    root: PathBuf,
}

impl DirectoryFileSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl FileSink for DirectoryFileSink {
    fn create_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let file = self.root.join(path);
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&file, data).with_context(|| format!("failed to write {}", file.display()))
    }

    fn create_directory(&self, path: &str) -> Result<()> {
        let directory = self.root.join(path);
        fs::create_dir_all(&directory)
            .with_context(|| format!("failed to create {}", directory.display()))
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Writes a new jar; the file is truncated when the sink is created.
pub struct JarFileSink {
    path: PathBuf,
    writer: RefCell<Option<ZipWriter<BufWriter<fs::File>>>>,
}

impl JarFileSink {
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = fs::File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        Ok(Self {
            path,
            writer: RefCell::new(Some(ZipWriter::new(BufWriter::new(file)))),
        })
    }

    fn with_writer(
        &self,
        action: impl FnOnce(&mut ZipWriter<BufWriter<fs::File>>) -> Result<()>,
    ) -> Result<()> {
        let mut writer = self.writer.borrow_mut();
        match writer.as_mut() {
            Some(writer) => action(writer),
            None => Err(GripError::Closed("jar file sink").into()),
        }
    }
}

impl FileSink for JarFileSink {
    fn create_file(&self, path: &str, data: &[u8]) -> Result<()> {
        self.with_writer(|writer| {
            writer
                .start_file(path, SimpleFileOptions::default())
                .with_context(|| format!("failed to add {}:{}", self.path.display(), path))?;
            writer
                .write_all(data)
                .with_context(|| format!("failed to write {}:{}", self.path.display(), path))
        })
    }

    fn create_directory(&self, path: &str) -> Result<()> {
        let directory = if path.ends_with('/') {
            path.to_string()
        } else {
            format!("{path}/")
        };
        self.with_writer(|writer| {
            writer
                .add_directory(directory.as_str(), SimpleFileOptions::default())
                .with_context(|| format!("failed to add {}:{}", self.path.display(), directory))
        })
    }

    fn flush(&self) -> Result<()> {
        self.with_writer(|writer| {
            writer
                .flush()
                .with_context(|| format!("failed to flush {}", self.path.display()))
        })
    }

    fn close(&self) -> Result<()> {
        let Some(writer) = self.writer.borrow_mut().take() else {
            return Ok(());
        };
        let mut stream = writer
            .finish()
            .with_context(|| format!("failed to finish {}", self.path.display()))?;
        stream
            .flush()
            .with_context(|| format!("failed to flush {}", self.path.display()))
    }
}

struct PendingEntry {
    name: String,
    /// `None` for a directory entry.
    data: Option<Vec<u8>>,
}

/// Replaces entries of an existing jar and keeps the others.
///
/// Writes are buffered; the jar is rewritten through a temporary file on
/// `flush` or `close`, so readers that still hold the old archive open are
/// not disturbed until then.
pub struct UpdatingJarFileSink {
    path: PathBuf,
    pending: RefCell<Option<Vec<PendingEntry>>>,
}

impl UpdatingJarFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pending: RefCell::new(Some(Vec::new())),
        }
    }

    fn push(&self, name: String, data: Option<Vec<u8>>) -> Result<()> {
        let mut pending = self.pending.borrow_mut();
        let Some(entries) = pending.as_mut() else {
            return Err(GripError::Closed("jar file sink").into());
        };
        match entries.iter_mut().find(|entry| entry.name == name) {
            Some(entry) => entry.data = data,
            None => entries.push(PendingEntry { name, data }),
        }
        Ok(())
    }

    fn write_pending(&self, entries: &[PendingEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut file_name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_default();
        file_name.push(".tmp");
        let temporary = self.path.with_file_name(file_name);
        self.rewrite(&temporary, entries)
            .inspect_err(|_| {
                let _ = fs::remove_file(&temporary);
            })?;
        fs::rename(&temporary, &self.path).with_context(|| {
            format!("failed to replace {} with {}", self.path.display(), temporary.display())
        })?;
        debug!(jar = %self.path.display(), entries = entries.len(), "rewrote jar");
        Ok(())
    }

    fn rewrite(&self, temporary: &Path, entries: &[PendingEntry]) -> Result<()> {
        let file = fs::File::create(temporary)
            .with_context(|| format!("failed to create {}", temporary.display()))?;
        let mut writer = ZipWriter::new(BufWriter::new(file));
        if self.path.exists() {
            let replaced: HashSet<&str> = entries.iter().map(|entry| entry.name.as_str()).collect();
            let source = fs::File::open(&self.path)
                .with_context(|| format!("failed to open {}", self.path.display()))?;
            let mut archive = ZipArchive::new(source)
                .with_context(|| format!("failed to read {}", self.path.display()))?;
            for index in 0..archive.len() {
                let entry = archive
                    .by_index_raw(index)
                    .with_context(|| format!("failed to read {}", self.path.display()))?;
                if replaced.contains(entry.name()) {
                    continue;
                }
                let name = entry.name().to_string();
                writer
                    .raw_copy_file(entry)
                    .with_context(|| format!("failed to copy {}:{}", self.path.display(), name))?;
            }
        }
        for entry in entries {
            match &entry.data {
                Some(data) => {
                    writer
                        .start_file(entry.name.as_str(), SimpleFileOptions::default())
                        .with_context(|| format!("failed to add {}", entry.name))?;
                    writer
                        .write_all(data)
                        .with_context(|| format!("failed to write {}", entry.name))?;
                }
                None => writer
                    .add_directory(entry.name.as_str(), SimpleFileOptions::default())
                    .with_context(|| format!("failed to add {}", entry.name))?,
            }
        }
        let mut stream = writer
            .finish()
            .with_context(|| format!("failed to finish {}", temporary.display()))?;
        stream
            .flush()
            .with_context(|| format!("failed to flush {}", temporary.display()))
    }
}

impl FileSink for UpdatingJarFileSink {
    fn create_file(&self, path: &str, data: &[u8]) -> Result<()> {
        self.push(path.to_string(), Some(data.to_vec()))
    }

    fn create_directory(&self, path: &str) -> Result<()> {
        let directory = if path.ends_with('/') {
            path.to_string()
        } else {
            format!("{path}/")
        };
        self.push(directory, None)
    }

    fn flush(&self) -> Result<()> {
        let mut pending = self.pending.borrow_mut();
        let Some(entries) = pending.as_mut() else {
            return Err(GripError::Closed("jar file sink").into());
        };
        self.write_pending(entries.as_slice())?;
        entries.clear();
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let Some(entries) = self.pending.borrow_mut().take() else {
            return Ok(());
        };
        self.write_pending(&entries)
    }
}

/// Sink used when no output is configured; writes are discarded.
pub struct EmptyFileSink;

impl FileSink for EmptyFileSink {
    fn create_file(&self, _path: &str, _data: &[u8]) -> Result<()> {
        Ok(())
    }

    fn create_directory(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use tempfile::tempdir;
    use zip::ZipArchive;

    use super::*;

    #[test]
    fn directory_sink_creates_parents() {
        let root = tempdir().expect("temp dir");
        let sink = DirectoryFileSink::new(root.path().join("out"));
        sink.create_file("com/example/A.class", b"bytes")
            .expect("create file");
        sink.create_directory("META-INF").expect("create directory");
        assert_eq!(
            fs::read(root.path().join("out/com/example/A.class")).expect("read"),
            b"bytes"
        );
        assert!(root.path().join("out/META-INF").is_dir());
    }

    #[test]
    fn jar_sink_writes_entries_on_close() {
        let root = tempdir().expect("temp dir");
        let jar = root.path().join("nested/out.jar");
        let sink = JarFileSink::create(&jar).expect("create sink");
        sink.create_directory("com").expect("directory");
        sink.create_file("com/A.class", b"class").expect("file");
        sink.close().expect("close");
        sink.close().expect("second close");
        assert!(sink.create_file("com/B.class", b"late").is_err());

        let mut archive = ZipArchive::new(fs::File::open(&jar).expect("open")).expect("archive");
        assert!(archive.by_name("com/").expect("directory entry").is_dir());
        let mut data = Vec::new();
        archive
            .by_name("com/A.class")
            .expect("class entry")
            .read_to_end(&mut data)
            .expect("read");
        assert_eq!(data, b"class");
    }

    fn write_jar(path: &Path, entries: &[(&str, &str)]) {
        let sink = JarFileSink::create(path).expect("create sink");
        for (name, data) in entries {
            sink.create_file(name, data.as_bytes()).expect("entry");
        }
        sink.close().expect("close");
    }

    fn read_entry(path: &Path, name: &str) -> Vec<u8> {
        let mut archive = ZipArchive::new(fs::File::open(path).expect("open")).expect("archive");
        let mut data = Vec::new();
        archive
            .by_name(name)
            .expect("entry")
            .read_to_end(&mut data)
            .expect("read");
        data
    }

    #[test]
    fn updating_sink_keeps_other_entries() {
        let root = tempdir().expect("temp dir");
        let jar = root.path().join("lib.jar");
        write_jar(&jar, &[("a/A.class", "old a"), ("a/B.class", "old b")]);

        let sink = UpdatingJarFileSink::new(&jar);
        sink.create_file("a/A.class", b"first").expect("file");
        sink.create_file("a/A.class", b"new a").expect("replace");
        assert_eq!(read_entry(&jar, "a/A.class"), b"old a");

        sink.flush().expect("flush");
        assert_eq!(read_entry(&jar, "a/A.class"), b"new a");
        assert_eq!(read_entry(&jar, "a/B.class"), b"old b");

        sink.create_file("a/C.class", b"new c").expect("file");
        sink.close().expect("close");
        sink.close().expect("second close");
        assert!(sink.create_file("a/D.class", b"late").is_err());

        let archive = ZipArchive::new(fs::File::open(&jar).expect("open")).expect("archive");
        assert_eq!(archive.len(), 3);
        assert_eq!(read_entry(&jar, "a/A.class"), b"new a");
        assert_eq!(read_entry(&jar, "a/C.class"), b"new c");
        assert!(!root.path().join("lib.jar.tmp").exists());
    }

    #[test]
    fn updating_sink_without_writes_leaves_jar_untouched() {
        let root = tempdir().expect("temp dir");
        let jar = root.path().join("lib.jar");
        write_jar(&jar, &[("a/A.class", "a")]);
        let before = fs::read(&jar).expect("read");
        let sink = UpdatingJarFileSink::new(&jar);
        sink.close().expect("close");
        assert_eq!(fs::read(&jar).expect("read"), before);
    }
}
