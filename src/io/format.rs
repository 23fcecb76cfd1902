use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::error::GripError;
use crate::io::sink::{
    DirectoryFileSink, EmptyFileSink, FileSink, JarFileSink, UpdatingJarFileSink,
};
use crate::io::source::{DirectoryFileSource, EmptyFileSource, FileSource, JarFileSource};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileFormat {
    Directory,
    Jar,
}

/// Decides whether a path is a directory or an archive.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileFormatDetector;

impl FileFormatDetector {
    /// Existing directories and extension-less missing paths are
    /// directories; `.jar` and `.zip` files are archives.
    pub fn detect(&self, path: &Path) -> Result<FileFormat> {
        if path.is_dir() {
            return Ok(FileFormat::Directory);
        }
        match path.extension().and_then(|extension| extension.to_str()) {
            Some(extension)
                if extension.eq_ignore_ascii_case("jar") || extension.eq_ignore_ascii_case("zip") =>
            {
                Ok(FileFormat::Jar)
            }
            None if !path.exists() => Ok(FileFormat::Directory),
            _ => Err(GripError::UnsupportedFile(path.to_path_buf()).into()),
        }
    }
}

/// Normalizes paths before they are used as registry keys.
pub trait FileCanonicalizer {
    fn canonicalize(&self, path: &Path) -> Result<PathBuf>;
}

/// Resolves symlinks for existing paths; other paths are made absolute.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultFileCanonicalizer;

impl FileCanonicalizer for DefaultFileCanonicalizer {
    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        if path.exists() {
            return fs::canonicalize(path)
                .with_context(|| format!("failed to canonicalize {}", path.display()));
        }
        std::path::absolute(path)
            .with_context(|| format!("failed to resolve {}", path.display()))
    }
}

pub trait FileSourceFactory {
    fn create_file_source(&self, path: &Path) -> Result<Box<dyn FileSource>>;
}

pub trait FileSinkFactory {
    /// Sink that starts from an empty destination.
    fn create_file_sink(&self, path: &Path, format: FileFormat) -> Result<Box<dyn FileSink>>;

    /// Sink that replaces files of an existing destination and keeps the
    /// rest.
    fn update_file_sink(&self, path: &Path, format: FileFormat) -> Result<Box<dyn FileSink>>;
}

/// Sources and sinks backed by the local filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct IoFactory {
    detector: FileFormatDetector,
}

impl IoFactory {
    pub fn new(detector: FileFormatDetector) -> Self {
        Self { detector }
    }
}

impl FileSourceFactory for IoFactory {
    fn create_file_source(&self, path: &Path) -> Result<Box<dyn FileSource>> {
        if !path.exists() {
            return Ok(Box::new(EmptyFileSource));
        }
        match self.detector.detect(path)? {
            FileFormat::Directory => Ok(Box::new(DirectoryFileSource::new(path))),
            FileFormat::Jar => Ok(Box::new(JarFileSource::open(path)?)),
        }
    }
}

impl FileSinkFactory for IoFactory {
    fn create_file_sink(&self, path: &Path, format: FileFormat) -> Result<Box<dyn FileSink>> {
        match format {
            FileFormat::Directory => Ok(Box::new(DirectoryFileSink::new(path))),
            FileFormat::Jar => Ok(Box::new(JarFileSink::create(path)?)),
        }
    }

    fn update_file_sink(&self, path: &Path, format: FileFormat) -> Result<Box<dyn FileSink>> {
        match format {
            FileFormat::Directory => Ok(Box::new(DirectoryFileSink::new(path))),
            FileFormat::Jar => Ok(Box::new(UpdatingJarFileSink::new(path))),
        }
    }
}

/// Sink that discards everything, for pipelines without an output.
pub fn empty_file_sink() -> Box<dyn FileSink> {
    Box::new(EmptyFileSink)
}
