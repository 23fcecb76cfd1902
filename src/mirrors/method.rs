use std::fmt;
use std::rc::Rc;

use anyhow::Result;

use crate::lazy::Deferred;
use crate::mirrors::access::Element;
use crate::mirrors::annotation::{AnnotationCollection, AnnotationValue};
use crate::signature::{GenericDeclaration, MethodSignatureMirror};
use crate::types::{MethodType, ObjectType, Type};

pub const CONSTRUCTOR_NAME: &str = "<init>";
pub const STATIC_INITIALIZER_NAME: &str = "<clinit>";
pub const DEFAULT_CONSTRUCTOR_DESCRIPTOR: &str = "()V";

/// Method signature together with the type variables visible in its body.
#[derive(Clone, Debug)]
pub(crate) struct MethodGenerics {
    pub(crate) signature: MethodSignatureMirror,
    pub(crate) declaration: GenericDeclaration,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MethodParameterMirror {
    index: usize,
    ty: Type,
    annotations: AnnotationCollection,
}

impl MethodParameterMirror {
    pub(crate) fn new(index: usize, ty: Type, annotations: AnnotationCollection) -> Self {
        Self {
            index,
            ty,
            annotations,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn annotations(&self) -> &AnnotationCollection {
        &self.annotations
    }
}

/// Method or constructor.
#[derive(Clone)]
pub struct MethodMirror {
    access: u16,
    name: String,
    ty: MethodType,
    exceptions: Vec<ObjectType>,
    annotations: AnnotationCollection,
    parameters: Vec<MethodParameterMirror>,
    default_value: Option<AnnotationValue>,
    generics: Rc<Deferred<MethodGenerics>>,
}

impl MethodMirror {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        access: u16,
        name: String,
        ty: MethodType,
        exceptions: Vec<ObjectType>,
        annotations: AnnotationCollection,
        parameters: Vec<MethodParameterMirror>,
        default_value: Option<AnnotationValue>,
        generics: Deferred<MethodGenerics>,
    ) -> Self {
        Self {
            access,
            name,
            ty,
            exceptions,
            annotations,
            parameters,
            default_value,
            generics: Rc::new(generics),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &MethodType {
        &self.ty
    }

    pub fn exceptions(&self) -> &[ObjectType] {
        &self.exceptions
    }

    pub fn annotations(&self) -> &AnnotationCollection {
        &self.annotations
    }

    pub fn parameters(&self) -> &[MethodParameterMirror] {
        &self.parameters
    }

    /// Element default, set only on annotation type elements.
    pub fn default_value(&self) -> Option<&AnnotationValue> {
        self.default_value.as_ref()
    }

    pub fn signature(&self) -> Result<&MethodSignatureMirror> {
        Ok(&self.generics.get()?.signature)
    }

    /// Class type variables with this method's own layered on top.
    pub fn generic_declaration(&self) -> Result<&GenericDeclaration> {
        Ok(&self.generics.get()?.declaration)
    }

    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
    }

    pub fn is_default_constructor(&self) -> bool {
        self.is_constructor() && self.ty.descriptor() == DEFAULT_CONSTRUCTOR_DESCRIPTOR
    }

    pub fn is_static_initializer(&self) -> bool {
        self.name == STATIC_INITIALIZER_NAME
    }

    pub(crate) fn matches(&self, name: &str, ty: &MethodType) -> bool {
        self.name == name && &self.ty == ty
    }
}

impl Element for MethodMirror {
    fn access(&self) -> u16 {
        self.access
    }
}

impl fmt::Debug for MethodMirror {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodMirror")
            .field("name", &self.name)
            .field("ty", &self.ty.descriptor())
            .finish()
    }
}
