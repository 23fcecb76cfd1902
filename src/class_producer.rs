use std::cell::{Cell, RefCell};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::class_registry::MutableClassRegistry;
use crate::classfile::ClassReader;
use crate::error::GripError;
use crate::file_registry::MutableFileRegistry;
use crate::io::{empty_file_sink, FileCanonicalizer, FileFormatDetector, FileSink, FileSinkFactory};
use crate::types::ObjectType;

/// Accepts generated or patched class files.
pub trait ClassProducer {
    /// Writes `data` and returns the type it declares. Producing a type that
    /// is on the classpath, or that was already produced, requires
    /// `overwrite`.
    fn produce_class(&self, data: &[u8], overwrite: bool) -> Result<ObjectType>;
}

pub trait MutableClassProducer: ClassProducer {
    fn set_output_directory(&self, directory: &Path) -> Result<()>;

    /// Discards classes that are not on the classpath from now on.
    fn reset_output_directory(&self) -> Result<()>;

    fn close(&self);
}

struct OutputSink {
    path: Option<PathBuf>,
    sink: Box<dyn FileSink>,
}

impl OutputSink {
    fn empty() -> Self {
        Self {
            path: None,
            sink: empty_file_sink(),
        }
    }
}

pub struct DefaultClassProducer {
    file_registry: Rc<dyn MutableFileRegistry>,
    class_registry: Rc<dyn MutableClassRegistry>,
    sink_factory: Rc<dyn FileSinkFactory>,
    canonicalizer: Rc<dyn FileCanonicalizer>,
    detector: FileFormatDetector,
    sinks: RefCell<BTreeMap<PathBuf, Box<dyn FileSink>>>,
    produced: RefCell<HashSet<ObjectType>>,
    output: RefCell<OutputSink>,
    closed: Cell<bool>,
}

impl DefaultClassProducer {
    pub fn new(
        file_registry: Rc<dyn MutableFileRegistry>,
        class_registry: Rc<dyn MutableClassRegistry>,
        sink_factory: Rc<dyn FileSinkFactory>,
        canonicalizer: Rc<dyn FileCanonicalizer>,
        detector: FileFormatDetector,
    ) -> Self {
        Self {
            file_registry,
            class_registry,
            sink_factory,
            canonicalizer,
            detector,
            sinks: RefCell::new(BTreeMap::new()),
            produced: RefCell::new(HashSet::new()),
            output: RefCell::new(OutputSink::empty()),
            closed: Cell::new(false),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.get() {
            return Err(GripError::Closed("class producer").into());
        }
        Ok(())
    }

    fn write_to_classpath_file(&self, file: PathBuf, path: &str, data: &[u8]) -> Result<()> {
        let mut sinks = self.sinks.borrow_mut();
        let sink = match sinks.entry(file) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let format = self.detector.detect(entry.key())?;
                debug!(file = %entry.key().display(), ?format, "opening classpath sink");
                let sink = self.sink_factory.update_file_sink(entry.key(), format)?;
                entry.insert(sink)
            }
        };
        sink.create_file(path, data)
    }

    fn replace_output(&self, output: OutputSink) {
        let previous = self.output.replace(output);
        if let Err(error) = previous.sink.close() {
            warn!("failed to close output sink: {error:#}");
        }
    }
}

impl ClassProducer for DefaultClassProducer {
    fn produce_class(&self, data: &[u8], overwrite: bool) -> Result<ObjectType> {
        self.ensure_open()?;
        let reader = ClassReader::new(data.to_vec()).context("failed to read produced class")?;
        let ty = ObjectType::new(reader.class_name());
        let path = format!("{}.class", ty.internal_name());

        if let Some(file) = self.file_registry.find_file_for_type(&ty)? {
            if !overwrite {
                return Err(GripError::ClassAlreadyExists(ty.to_string()).into());
            }
            self.write_to_classpath_file(file, &path, data)?;
            // Jar sinks write on close; reads in between see the new bytes.
            self.file_registry.replace_class(&ty, data.to_vec())?;
            self.class_registry.invalidate_type(&ty)?;
            debug!(ty = %ty, "overwrote classpath class");
            return Ok(ty);
        }

        if self.produced.borrow().contains(&ty) && !overwrite {
            return Err(GripError::ClassAlreadyExists(ty.to_string()).into());
        }
        self.output.borrow().sink.create_file(&path, data)?;
        self.produced.borrow_mut().insert(ty.clone());
        debug!(ty = %ty, "produced class");
        Ok(ty)
    }
}

impl MutableClassProducer for DefaultClassProducer {
    fn set_output_directory(&self, directory: &Path) -> Result<()> {
        self.ensure_open()?;
        let directory = self.canonicalizer.canonicalize(directory)?;
        if self.output.borrow().path.as_deref() == Some(directory.as_path()) {
            return Ok(());
        }
        let format = self.detector.detect(&directory)?;
        let sink = self.sink_factory.create_file_sink(&directory, format)?;
        debug!(directory = %directory.display(), ?format, "switching output");
        self.replace_output(OutputSink {
            path: Some(directory),
            sink,
        });
        Ok(())
    }

    fn reset_output_directory(&self) -> Result<()> {
        self.ensure_open()?;
        if self.output.borrow().path.is_none() {
            return Ok(());
        }
        self.replace_output(OutputSink::empty());
        Ok(())
    }

    fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        for (file, sink) in std::mem::take(&mut *self.sinks.borrow_mut()) {
            if let Err(error) = sink.close() {
                warn!(file = %file.display(), "failed to close classpath sink: {error:#}");
            }
        }
        self.replace_output(OutputSink::empty());
        self.file_registry.close();
    }
}
