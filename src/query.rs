//! Class sources and type-keyed selections over them.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::iter;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{bail, Result};

use crate::class_registry::ClassRegistry;
use crate::file_registry::FileRegistry;
use crate::grip::Grip;
use crate::mirrors::{ClassMirror, FieldMirror, MethodMirror};
use crate::types::ObjectType;

pub type ClassMirrors<'a> = Box<dyn Iterator<Item = Result<Rc<ClassMirror>>> + 'a>;

/// Restartable sequence of classes: every call starts over.
pub trait ClassMirrorSource {
    fn class_mirrors(&self) -> ClassMirrors<'_>;
}

/// Classes declared by a set of classpath files, in file order. A type
/// provided by several of the files is yielded once.
pub struct FilesClassMirrorSource {
    file_registry: Rc<dyn FileRegistry>,
    class_registry: Rc<dyn ClassRegistry>,
    files: Vec<PathBuf>,
}

impl FilesClassMirrorSource {
    pub fn new(
        file_registry: Rc<dyn FileRegistry>,
        class_registry: Rc<dyn ClassRegistry>,
        files: Vec<PathBuf>,
    ) -> Self {
        Self {
            file_registry,
            class_registry,
            files,
        }
    }
}

impl ClassMirrorSource for FilesClassMirrorSource {
    fn class_mirrors(&self) -> ClassMirrors<'_> {
        let mut seen = HashSet::new();
        Box::new(self.files.iter().flat_map(move |file| -> ClassMirrors<'_> {
            match self.file_registry.find_types_for_file(file) {
                Ok(types) => {
                    let types: Vec<_> = types
                        .into_iter()
                        .filter(|ty| seen.insert(ty.clone()))
                        .collect();
                    Box::new(
                        types
                            .into_iter()
                            .map(move |ty| self.class_registry.get_class_mirror(&ty)),
                    )
                }
                Err(error) => Box::new(iter::once(Err(error))),
            }
        }))
    }
}

/// Source backed by a closure producing a fresh iterator per call.
pub struct FunctionClassMirrorSource<F> {
    provider: F,
}

impl<F> FunctionClassMirrorSource<F> {
    pub fn new(provider: F) -> Self {
        Self { provider }
    }
}

impl<F, I> ClassMirrorSource for FunctionClassMirrorSource<F>
where
    F: Fn() -> I,
    I: Iterator<Item = Result<Rc<ClassMirror>>> + 'static,
{
    fn class_mirrors(&self) -> ClassMirrors<'_> {
        Box::new((self.provider)())
    }
}

pub fn select_classes(
    grip: &Grip,
    source: &dyn ClassMirrorSource,
    predicate: impl Fn(&Grip, &ClassMirror) -> Result<bool>,
) -> Result<BTreeMap<ObjectType, Rc<ClassMirror>>> {
    let mut result = BTreeMap::new();
    for mirror in source.class_mirrors() {
        let mirror = mirror?;
        if predicate(grip, &mirror)? {
            insert_unique(&mut result, mirror.ty().clone(), Rc::clone(&mirror))?;
        }
    }
    Ok(result)
}

/// Matching fields grouped by declaring class; classes without a match are
/// left out.
pub fn select_fields(
    grip: &Grip,
    source: &dyn ClassMirrorSource,
    predicate: impl Fn(&Grip, &FieldMirror) -> Result<bool>,
) -> Result<BTreeMap<ObjectType, Vec<FieldMirror>>> {
    let mut result = BTreeMap::new();
    for mirror in source.class_mirrors() {
        let mirror = mirror?;
        let mut fields = Vec::new();
        for field in mirror.fields()? {
            if predicate(grip, field)? {
                fields.push(field.clone());
            }
        }
        if !fields.is_empty() {
            insert_unique(&mut result, mirror.ty().clone(), fields)?;
        }
    }
    Ok(result)
}

/// Matching constructors and methods grouped by declaring class.
pub fn select_methods(
    grip: &Grip,
    source: &dyn ClassMirrorSource,
    predicate: impl Fn(&Grip, &MethodMirror) -> Result<bool>,
) -> Result<BTreeMap<ObjectType, Vec<MethodMirror>>> {
    let mut result = BTreeMap::new();
    for mirror in source.class_mirrors() {
        let mirror = mirror?;
        let mut methods = Vec::new();
        for method in mirror.constructors()?.iter().chain(mirror.methods()?) {
            if predicate(grip, method)? {
                methods.push(method.clone());
            }
        }
        if !methods.is_empty() {
            insert_unique(&mut result, mirror.ty().clone(), methods)?;
        }
    }
    Ok(result)
}

fn insert_unique<V>(result: &mut BTreeMap<ObjectType, V>, ty: ObjectType, value: V) -> Result<()> {
    match result.entry(ty) {
        Entry::Vacant(entry) => {
            entry.insert(value);
            Ok(())
        }
        Entry::Occupied(entry) => bail!("class {} is selected more than once", entry.key()),
    }
}
