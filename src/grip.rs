use std::cell::Cell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::Result;
use tracing::debug;

use crate::class_producer::{ClassProducer, DefaultClassProducer, MutableClassProducer};
use crate::class_registry::{ClassRegistry, DefaultClassRegistry, MutableClassRegistry};
use crate::error::GripError;
use crate::file_registry::{DefaultFileRegistry, FileRegistry, MutableFileRegistry};
use crate::hierarchy::common_super_class;
use crate::io::{
    DefaultFileCanonicalizer, FileCanonicalizer, FileFormatDetector, FileSinkFactory,
    FileSourceFactory, IoFactory,
};
use crate::mirrors::{AnnotationMirror, ClassMirror, FieldMirror, MethodMirror};
use crate::query::{self, ClassMirrorSource, FilesClassMirrorSource};
use crate::reflector::DefaultReflector;
use crate::types::ObjectType;

/// Handle over a classpath: reflection, queries and class production.
pub struct Grip {
    file_registry: Rc<DefaultFileRegistry>,
    class_registry: Rc<DefaultClassRegistry>,
    class_producer: DefaultClassProducer,
    closed: Cell<bool>,
}

impl Grip {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.get() {
            return Err(GripError::Closed("grip").into());
        }
        Ok(())
    }

    pub fn file_registry(&self) -> Result<&dyn MutableFileRegistry> {
        self.ensure_open()?;
        Ok(self.file_registry.as_ref())
    }

    pub fn class_registry(&self) -> Result<&dyn ClassRegistry> {
        self.ensure_open()?;
        Ok(self.class_registry.as_ref())
    }

    pub fn class_producer(&self) -> Result<&dyn MutableClassProducer> {
        self.ensure_open()?;
        Ok(&self.class_producer)
    }

    pub fn get_class_mirror(&self, ty: &ObjectType) -> Result<Rc<ClassMirror>> {
        self.class_registry()?.get_class_mirror(ty)
    }

    pub fn get_annotation_mirror(&self, ty: &ObjectType) -> Result<Rc<AnnotationMirror>> {
        self.class_registry()?.get_annotation_mirror(ty)
    }

    pub fn produce_class(&self, data: &[u8], overwrite: bool) -> Result<ObjectType> {
        self.class_producer()?.produce_class(data, overwrite)
    }

    pub fn common_super_class(&self, first: &ObjectType, second: &ObjectType) -> Result<ObjectType> {
        common_super_class(self.class_registry()?, first, second)
    }

    /// Classes declared by the given classpath files.
    pub fn files(&self, files: Vec<PathBuf>) -> Result<FilesClassMirrorSource> {
        self.ensure_open()?;
        Ok(FilesClassMirrorSource::new(
            self.file_registry.clone(),
            self.class_registry.clone(),
            files,
        ))
    }

    /// Classes of the whole classpath.
    pub fn classpath(&self) -> Result<FilesClassMirrorSource> {
        let classpath = self.file_registry()?.classpath()?;
        self.files(classpath)
    }

    pub fn select_classes(
        &self,
        source: &dyn ClassMirrorSource,
        predicate: impl Fn(&Grip, &ClassMirror) -> Result<bool>,
    ) -> Result<BTreeMap<ObjectType, Rc<ClassMirror>>> {
        self.ensure_open()?;
        query::select_classes(self, source, predicate)
    }

    pub fn select_fields(
        &self,
        source: &dyn ClassMirrorSource,
        predicate: impl Fn(&Grip, &FieldMirror) -> Result<bool>,
    ) -> Result<BTreeMap<ObjectType, Vec<FieldMirror>>> {
        self.ensure_open()?;
        query::select_fields(self, source, predicate)
    }

    pub fn select_methods(
        &self,
        source: &dyn ClassMirrorSource,
        predicate: impl Fn(&Grip, &MethodMirror) -> Result<bool>,
    ) -> Result<BTreeMap<ObjectType, Vec<MethodMirror>>> {
        self.ensure_open()?;
        query::select_methods(self, source, predicate)
    }

    /// Closes the producer, then the class registry, then the file registry.
    pub fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        self.class_producer.close();
        self.class_registry.close();
        self.file_registry.close();
        debug!("grip closed");
    }
}

impl Drop for Grip {
    fn drop(&mut self) {
        self.close();
    }
}

/// Builds [`Grip`] instances from explicit collaborators.
#[derive(Clone)]
pub struct GripFactory {
    canonicalizer: Rc<dyn FileCanonicalizer>,
    detector: FileFormatDetector,
    sources: Rc<dyn FileSourceFactory>,
    sinks: Rc<dyn FileSinkFactory>,
}

impl Default for GripFactory {
    fn default() -> Self {
        let detector = FileFormatDetector;
        let io = Rc::new(IoFactory::new(detector));
        Self {
            canonicalizer: Rc::new(DefaultFileCanonicalizer),
            detector,
            sources: io.clone(),
            sinks: io,
        }
    }
}

impl GripFactory {
    pub fn new(
        canonicalizer: Rc<dyn FileCanonicalizer>,
        detector: FileFormatDetector,
        sources: Rc<dyn FileSourceFactory>,
        sinks: Rc<dyn FileSinkFactory>,
    ) -> Self {
        Self {
            canonicalizer,
            detector,
            sources,
            sinks,
        }
    }

    pub fn create(&self, classpath: &[PathBuf], output_directory: Option<&Path>) -> Result<Grip> {
        let file_registry = Rc::new(DefaultFileRegistry::with_classpath(
            classpath,
            self.canonicalizer.clone(),
            self.sources.clone(),
        )?);
        let class_registry =
            DefaultClassRegistry::new(file_registry.clone(), Rc::new(DefaultReflector));
        let class_producer = DefaultClassProducer::new(
            file_registry.clone(),
            class_registry.clone(),
            self.sinks.clone(),
            self.canonicalizer.clone(),
            self.detector,
        );
        if let Some(directory) = output_directory {
            class_producer.set_output_directory(directory)?;
        }
        debug!(entries = classpath.len(), "created grip");
        Ok(Grip {
            file_registry,
            class_registry,
            class_producer,
            closed: Cell::new(false),
        })
    }
}
