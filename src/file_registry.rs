use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::error::GripError;
use crate::io::{
    DefaultFileCanonicalizer, EntryType, FileCanonicalizer, FileSource, FileSourceFactory,
    IoFactory,
};
use crate::types::ObjectType;

const CLASS_SUFFIX: &str = ".class";
const MODULE_INFO: &str = "module-info";
const VERSIONED_PREFIX: &str = "META-INF/versions/";

/// Classpath files and the types they contain.
pub trait FileRegistry {
    fn contains_file(&self, file: &Path) -> Result<bool>;

    fn contains_type(&self, ty: &ObjectType) -> Result<bool>;

    /// Registered files in insertion order.
    fn classpath(&self) -> Result<Vec<PathBuf>>;

    fn read_class(&self, ty: &ObjectType) -> Result<Vec<u8>>;

    fn find_types_for_file(&self, file: &Path) -> Result<Vec<ObjectType>>;

    fn find_file_for_type(&self, ty: &ObjectType) -> Result<Option<PathBuf>>;
}

pub trait MutableFileRegistry: FileRegistry {
    /// Adding a file that is already registered does nothing.
    fn add_file_to_classpath(&self, file: &Path) -> Result<()>;

    fn remove_file_from_classpath(&self, file: &Path) -> Result<()>;

    /// Serves `data` as the class file of `ty` from now on, ahead of its
    /// classpath entry. Fails with `TypeNotFound` unless `ty` is on the
    /// classpath.
    fn replace_class(&self, ty: &ObjectType, data: Vec<u8>) -> Result<()>;

    fn close(&self);
}

struct ClasspathEntry {
    file: PathBuf,
    source: Box<dyn FileSource>,
    types: Vec<ObjectType>,
}

#[derive(Default)]
struct RegistryState {
    entries: Vec<ClasspathEntry>,
    files_by_type: HashMap<ObjectType, PathBuf>,
    replaced: HashMap<ObjectType, Vec<u8>>,
}

impl RegistryState {
    fn entry(&self, file: &Path) -> Option<&ClasspathEntry> {
        self.entries.iter().find(|entry| entry.file == file)
    }

    /// Earliest remaining entry that lists `ty`.
    fn first_provider(&self, ty: &ObjectType) -> Option<&PathBuf> {
        self.entries
            .iter()
            .find(|entry| entry.types.contains(ty))
            .map(|entry| &entry.file)
    }
}

pub struct DefaultFileRegistry {
    canonicalizer: Rc<dyn FileCanonicalizer>,
    sources: Rc<dyn FileSourceFactory>,
    state: RefCell<RegistryState>,
    closed: Cell<bool>,
}

impl Default for DefaultFileRegistry {
    fn default() -> Self {
        Self::new(
            Rc::new(DefaultFileCanonicalizer),
            Rc::new(IoFactory::default()),
        )
    }
}

impl DefaultFileRegistry {
    pub fn new(
        canonicalizer: Rc<dyn FileCanonicalizer>,
        sources: Rc<dyn FileSourceFactory>,
    ) -> Self {
        Self {
            canonicalizer,
            sources,
            state: RefCell::new(RegistryState::default()),
            closed: Cell::new(false),
        }
    }

    pub fn with_classpath(
        classpath: &[PathBuf],
        canonicalizer: Rc<dyn FileCanonicalizer>,
        sources: Rc<dyn FileSourceFactory>,
    ) -> Result<Self> {
        let registry = Self::new(canonicalizer, sources);
        for file in classpath {
            registry.add_file_to_classpath(file)?;
        }
        Ok(registry)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.get() {
            return Err(GripError::Closed("file registry").into());
        }
        Ok(())
    }

    fn canonicalize(&self, file: &Path) -> Result<PathBuf> {
        self.canonicalizer.canonicalize(file)
    }
}

impl FileRegistry for DefaultFileRegistry {
    fn contains_file(&self, file: &Path) -> Result<bool> {
        self.ensure_open()?;
        let file = self.canonicalize(file)?;
        Ok(self.state.borrow().entry(&file).is_some())
    }

    fn contains_type(&self, ty: &ObjectType) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.state.borrow().files_by_type.contains_key(ty))
    }

    fn classpath(&self) -> Result<Vec<PathBuf>> {
        self.ensure_open()?;
        Ok(self
            .state
            .borrow()
            .entries
            .iter()
            .map(|entry| entry.file.clone())
            .collect())
    }

    fn read_class(&self, ty: &ObjectType) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let state = self.state.borrow();
        let entry = state
            .files_by_type
            .get(ty)
            .and_then(|file| state.entry(file))
            .ok_or_else(|| GripError::TypeNotFound(ty.to_string()))?;
        if let Some(data) = state.replaced.get(ty) {
            return Ok(data.clone());
        }
        entry
            .source
            .read_file(&format!("{}{CLASS_SUFFIX}", ty.internal_name()))
            .with_context(|| format!("failed to read {ty} from {}", entry.file.display()))
    }

    fn find_types_for_file(&self, file: &Path) -> Result<Vec<ObjectType>> {
        self.ensure_open()?;
        let canonical = self.canonicalize(file)?;
        let state = self.state.borrow();
        match state.entry(&canonical) {
            Some(entry) => Ok(entry.types.clone()),
            None => Err(GripError::FileNotRegistered(file.to_path_buf()).into()),
        }
    }

    fn find_file_for_type(&self, ty: &ObjectType) -> Result<Option<PathBuf>> {
        self.ensure_open()?;
        Ok(self.state.borrow().files_by_type.get(ty).cloned())
    }
}

impl MutableFileRegistry for DefaultFileRegistry {
    fn add_file_to_classpath(&self, file: &Path) -> Result<()> {
        self.ensure_open()?;
        let file = self.canonicalize(file)?;
        if self.state.borrow().entry(&file).is_some() {
            return Ok(());
        }
        let source = self.sources.create_file_source(&file)?;
        let mut names = Vec::new();
        source.list_files(&mut |path, entry_type| {
            if entry_type == EntryType::Class {
                if let Some(name) = type_name(path) {
                    names.push(name);
                }
            }
        })?;

        let mut state = self.state.borrow_mut();
        let mut types = Vec::with_capacity(names.len());
        for name in names {
            let ty = ObjectType::new(name);
            // As with a JVM class path, the earliest entry providing a type
            // is the one it is read from. Later copies are still listed for
            // their own file.
            if state.files_by_type.contains_key(&ty) {
                debug!(ty = %ty, file = %file.display(), "type is shadowed by an earlier entry");
            } else {
                state.files_by_type.insert(ty.clone(), file.clone());
            }
            types.push(ty);
        }
        debug!(file = %file.display(), types = types.len(), "added classpath entry");
        state.entries.push(ClasspathEntry {
            file,
            source,
            types,
        });
        Ok(())
    }

    fn remove_file_from_classpath(&self, file: &Path) -> Result<()> {
        self.ensure_open()?;
        let canonical = self.canonicalize(file)?;
        let mut state = self.state.borrow_mut();
        let Some(index) = state
            .entries
            .iter()
            .position(|entry| entry.file == canonical)
        else {
            return Err(GripError::FileNotRegistered(file.to_path_buf()).into());
        };
        let entry = state.entries.remove(index);
        for ty in &entry.types {
            if state.files_by_type.get(ty) != Some(&entry.file) {
                continue;
            }
            state.replaced.remove(ty);
            let next = state.first_provider(ty).cloned();
            match next {
                Some(next) => {
                    debug!(ty = %ty, file = %next.display(), "type is now read from a later entry");
                    state.files_by_type.insert(ty.clone(), next);
                }
                None => {
                    state.files_by_type.remove(ty);
                }
            }
        }
        drop(state);
        if let Err(error) = entry.source.close() {
            warn!(file = %entry.file.display(), "failed to close classpath entry: {error:#}");
        }
        debug!(file = %entry.file.display(), "removed classpath entry");
        Ok(())
    }

    fn replace_class(&self, ty: &ObjectType, data: Vec<u8>) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.state.borrow_mut();
        if !state.files_by_type.contains_key(ty) {
            return Err(GripError::TypeNotFound(ty.to_string()).into());
        }
        state.replaced.insert(ty.clone(), data);
        Ok(())
    }

    fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        let state = self.state.take();
        for entry in state.entries {
            if let Err(error) = entry.source.close() {
                warn!(file = %entry.file.display(), "failed to close classpath entry: {error:#}");
            }
        }
    }
}

/// Internal name for a class entry path, or `None` for entries that do not
/// declare a type.
fn type_name(path: &str) -> Option<String> {
    let path = path.replace('\\', "/");
    if path.starts_with(VERSIONED_PREFIX) {
        return None;
    }
    let name = path.strip_suffix(CLASS_SUFFIX)?;
    let simple_name = name.rsplit('/').next().unwrap_or(name);
    if simple_name == MODULE_INFO || simple_name == "package-info" {
        return None;
    }
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::test_support::{simple_class, write_class};

    #[test]
    fn maps_files_and_types_both_ways() {
        let root = tempdir().expect("temp dir");
        write_class(
            root.path(),
            "com/example/A",
            &simple_class("com/example/A", "java/lang/Object"),
        );
        write_class(root.path(), "module-info", b"ignored");
        write_class(root.path(), "META-INF/versions/11/com/example/A", b"ignored");
        fs::write(root.path().join("notes.txt"), b"notes").expect("write");
        let registry = DefaultFileRegistry::default();
        registry
            .add_file_to_classpath(root.path())
            .expect("add classpath");

        let ty = ObjectType::new("com/example/A");
        assert!(registry.contains_file(root.path()).expect("contains file"));
        assert!(registry.contains_type(&ty).expect("contains type"));
        assert_eq!(
            registry.find_types_for_file(root.path()).expect("types"),
            vec![ty.clone()]
        );
        let file = registry
            .find_file_for_type(&ty)
            .expect("find file")
            .expect("owning file");
        assert_eq!(file, fs::canonicalize(root.path()).expect("canonical"));
        assert_eq!(
            registry.read_class(&ty).expect("read class"),
            simple_class("com/example/A", "java/lang/Object")
        );
    }

    #[test]
    fn equivalent_paths_collide() {
        let root = tempdir().expect("temp dir");
        fs::create_dir_all(root.path().join("classes")).expect("mkdir");
        let registry = DefaultFileRegistry::default();
        registry
            .add_file_to_classpath(&root.path().join("classes"))
            .expect("add");
        registry
            .add_file_to_classpath(&root.path().join("classes/../classes"))
            .expect("add again");
        assert_eq!(registry.classpath().expect("classpath").len(), 1);
    }

    #[test]
    fn first_entry_owns_duplicate_types() {
        let first = tempdir().expect("temp dir");
        let second = tempdir().expect("temp dir");
        write_class(
            first.path(),
            "com/example/A",
            &simple_class("com/example/A", "java/lang/Object"),
        );
        write_class(
            second.path(),
            "com/example/A",
            &simple_class("com/example/A", "com/example/Base"),
        );
        let registry = DefaultFileRegistry::default();
        registry.add_file_to_classpath(first.path()).expect("first");
        registry.add_file_to_classpath(second.path()).expect("second");
        let ty = ObjectType::new("com/example/A");
        for root in [&first, &second] {
            assert_eq!(
                registry.find_types_for_file(root.path()).expect("types"),
                vec![ty.clone()]
            );
        }
        assert_eq!(
            registry.find_file_for_type(&ty).expect("find"),
            Some(fs::canonicalize(first.path()).expect("canonical"))
        );
        assert_eq!(
            registry.read_class(&ty).expect("read"),
            simple_class("com/example/A", "java/lang/Object")
        );

        registry
            .remove_file_from_classpath(first.path())
            .expect("remove first");
        assert_eq!(
            registry.find_file_for_type(&ty).expect("find"),
            Some(fs::canonicalize(second.path()).expect("canonical"))
        );
        assert_eq!(
            registry.read_class(&ty).expect("read"),
            simple_class("com/example/A", "com/example/Base")
        );
    }

    #[test]
    fn replaced_classes_are_read_first() {
        let root = tempdir().expect("temp dir");
        write_class(
            root.path(),
            "com/example/A",
            &simple_class("com/example/A", "java/lang/Object"),
        );
        let registry = DefaultFileRegistry::default();
        registry.add_file_to_classpath(root.path()).expect("add");
        let ty = ObjectType::new("com/example/A");
        let patched = simple_class("com/example/A", "com/example/Base");
        registry
            .replace_class(&ty, patched.clone())
            .expect("replace");
        assert_eq!(registry.read_class(&ty).expect("read"), patched);

        let error = registry
            .replace_class(&ObjectType::new("com/example/Missing"), Vec::new())
            .expect_err("not on the classpath");
        assert!(matches!(
            GripError::kind_of(&error),
            Some(GripError::TypeNotFound(_))
        ));

        registry
            .remove_file_from_classpath(root.path())
            .expect("remove");
        registry.add_file_to_classpath(root.path()).expect("add again");
        assert_eq!(
            registry.read_class(&ty).expect("read"),
            simple_class("com/example/A", "java/lang/Object")
        );
    }

    #[test]
    fn removal_drops_types_and_rejects_unknown_files() {
        let root = tempdir().expect("temp dir");
        write_class(
            root.path(),
            "com/example/A",
            &simple_class("com/example/A", "java/lang/Object"),
        );
        let registry = DefaultFileRegistry::default();
        registry.add_file_to_classpath(root.path()).expect("add");
        registry
            .remove_file_from_classpath(root.path())
            .expect("remove");
        let ty = ObjectType::new("com/example/A");
        assert!(!registry.contains_type(&ty).expect("contains"));
        let error = registry.read_class(&ty).expect_err("unknown type");
        assert!(matches!(
            GripError::kind_of(&error),
            Some(GripError::TypeNotFound(_))
        ));
        let error = registry
            .remove_file_from_classpath(root.path())
            .expect_err("unknown file");
        assert!(matches!(
            GripError::kind_of(&error),
            Some(GripError::FileNotRegistered(_))
        ));
    }

    #[test]
    fn missing_entry_is_registered_empty() {
        let root = tempdir().expect("temp dir");
        let missing = root.path().join("generated");
        let registry = DefaultFileRegistry::default();
        registry.add_file_to_classpath(&missing).expect("add");
        assert!(registry.contains_file(&missing).expect("contains"));
        assert!(registry
            .find_types_for_file(&missing)
            .expect("types")
            .is_empty());
    }

    #[test]
    fn close_is_idempotent_and_final() {
        let root = tempdir().expect("temp dir");
        let registry = DefaultFileRegistry::default();
        registry.add_file_to_classpath(root.path()).expect("add");
        registry.close();
        registry.close();
        let error = registry.classpath().expect_err("closed");
        assert!(matches!(
            GripError::kind_of(&error),
            Some(GripError::Closed(_))
        ));
    }
}
