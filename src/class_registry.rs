use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use anyhow::{Context, Result};
use tracing::{debug, trace};

use crate::error::GripError;
use crate::file_registry::FileRegistry;
use crate::mirrors::{
    AnnotationCollection, AnnotationMirror, AnnotationValue, ClassMirror, DEFAULT_ELEMENT,
};
use crate::reflector::Reflector;
use crate::types::ObjectType;

const RETENTION: &str = "java/lang/annotation/Retention";
const RETENTION_POLICY: &str = "java/lang/annotation/RetentionPolicy";
const RUNTIME: &str = "RUNTIME";

/// Read access to reflected classes and annotation defaults.
pub trait ClassRegistry {
    fn get_class_mirror(&self, ty: &ObjectType) -> Result<Rc<ClassMirror>>;

    /// Element defaults of an annotation type. A type missing from the
    /// classpath yields an unresolved mirror instead of an error.
    fn get_annotation_mirror(&self, ty: &ObjectType) -> Result<Rc<AnnotationMirror>>;
}

pub trait MutableClassRegistry: ClassRegistry {
    /// Drops cached mirrors of `ty` so that the next lookup reads it again.
    fn invalidate_type(&self, ty: &ObjectType) -> Result<()>;

    fn close(&self);
}

/// Non-owning reference to a registry, held by lazily parsed mirrors.
#[derive(Clone)]
pub struct RegistryHandle {
    registry: Weak<dyn ClassRegistry>,
}

impl RegistryHandle {
    pub fn new(registry: Weak<dyn ClassRegistry>) -> Self {
        Self { registry }
    }

    pub fn get(&self) -> Result<Rc<dyn ClassRegistry>> {
        self.registry
            .upgrade()
            .ok_or_else(|| GripError::Closed("class registry").into())
    }
}

pub struct DefaultClassRegistry {
    this: Weak<DefaultClassRegistry>,
    file_registry: Rc<dyn FileRegistry>,
    reflector: Rc<dyn Reflector>,
    classes: RefCell<HashMap<ObjectType, Rc<ClassMirror>>>,
    annotations: RefCell<HashMap<ObjectType, Rc<AnnotationMirror>>>,
    resolving: RefCell<HashSet<ObjectType>>,
    closed: Cell<bool>,
}

impl DefaultClassRegistry {
    pub fn new(file_registry: Rc<dyn FileRegistry>, reflector: Rc<dyn Reflector>) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            file_registry,
            reflector,
            classes: RefCell::new(HashMap::new()),
            annotations: RefCell::new(HashMap::new()),
            resolving: RefCell::new(HashSet::new()),
            closed: Cell::new(false),
        })
    }

    fn handle(&self) -> RegistryHandle {
        let registry: Weak<dyn ClassRegistry> = self.this.clone();
        RegistryHandle::new(registry)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.get() {
            return Err(GripError::Closed("class registry").into());
        }
        Ok(())
    }

    fn read_class_mirror(&self, ty: &ObjectType, for_annotation: bool) -> Result<ClassMirror> {
        trace!(ty = %ty, for_annotation, "reading class mirror");
        let data = self.file_registry.read_class(ty)?;
        self.reflector.reflect(data, self.handle(), for_annotation)
    }

    fn read_annotation_mirror(&self, ty: &ObjectType) -> Result<AnnotationMirror> {
        let class = self.read_class_mirror(ty, true)?;
        let mut builder =
            AnnotationMirror::builder(ty.clone()).visible(is_runtime_visible(class.annotations()?));
        for method in class.methods()? {
            if let Some(value) = method.default_value() {
                builder = builder.value(method.name(), value.clone());
            }
        }
        Ok(builder.build())
    }
}

impl ClassRegistry for DefaultClassRegistry {
    fn get_class_mirror(&self, ty: &ObjectType) -> Result<Rc<ClassMirror>> {
        self.ensure_open()?;
        let cached = self.classes.borrow().get(ty).cloned();
        if let Some(mirror) = cached {
            return Ok(mirror);
        }
        let mirror = Rc::new(
            self.read_class_mirror(ty, false)
                .with_context(|| GripError::UnableToReadClassMirror(ty.to_string()))?,
        );
        self.classes
            .borrow_mut()
            .insert(ty.clone(), Rc::clone(&mirror));
        Ok(mirror)
    }

    fn get_annotation_mirror(&self, ty: &ObjectType) -> Result<Rc<AnnotationMirror>> {
        self.ensure_open()?;
        let cached = self.annotations.borrow().get(ty).cloned();
        if let Some(mirror) = cached {
            return Ok(mirror);
        }
        if !self.file_registry.contains_type(ty)? {
            debug!(ty = %ty, "annotation type is not on the classpath");
            return Ok(Rc::new(AnnotationMirror::unresolved(ty.clone())));
        }
        // An annotation type annotated with itself, directly or through other
        // annotation types, sees an empty mirror while it is being built.
        if !self.resolving.borrow_mut().insert(ty.clone()) {
            return Ok(Rc::new(AnnotationMirror::builder(ty.clone()).build()));
        }
        let result = self.read_annotation_mirror(ty);
        self.resolving.borrow_mut().remove(ty);
        let mirror =
            Rc::new(result.with_context(|| GripError::UnableToReadClassMirror(ty.to_string()))?);
        self.annotations
            .borrow_mut()
            .insert(ty.clone(), Rc::clone(&mirror));
        Ok(mirror)
    }
}

impl MutableClassRegistry for DefaultClassRegistry {
    fn invalidate_type(&self, ty: &ObjectType) -> Result<()> {
        self.ensure_open()?;
        debug!(ty = %ty, "invalidating cached mirrors");
        self.classes.borrow_mut().remove(ty);
        self.annotations.borrow_mut().remove(ty);
        Ok(())
    }

    fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        self.classes.borrow_mut().clear();
        self.annotations.borrow_mut().clear();
    }
}

/// `@Retention(RUNTIME)` on an annotation type.
fn is_runtime_visible(annotations: &AnnotationCollection) -> bool {
    annotations
        .get(&ObjectType::new(RETENTION))
        .and_then(|retention| retention.value(DEFAULT_ELEMENT))
        .and_then(AnnotationValue::as_enum)
        .is_some_and(|policy| {
            policy.ty().internal_name() == RETENTION_POLICY && policy.value() == RUNTIME
        })
}
