use std::fmt;
use std::rc::Rc;

use anyhow::Result;

use crate::lazy::Deferred;
use crate::mirrors::access::Element;
use crate::mirrors::annotation::AnnotationCollection;
use crate::signature::GenericType;
use crate::types::Type;

/// Compile-time constant from a field's `ConstantValue` attribute.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(value) => write!(f, "{value}"),
            FieldValue::Long(value) => write!(f, "{value}"),
            FieldValue::Float(value) => write!(f, "{value}"),
            FieldValue::Double(value) => write!(f, "{value}"),
            FieldValue::String(value) => write!(f, "{value:?}"),
        }
    }
}

#[derive(Clone)]
pub struct FieldMirror {
    access: u16,
    name: String,
    ty: Type,
    value: Option<FieldValue>,
    annotations: AnnotationCollection,
    generic_type: Rc<Deferred<GenericType>>,
}

impl FieldMirror {
    pub(crate) fn new(
        access: u16,
        name: String,
        ty: Type,
        value: Option<FieldValue>,
        annotations: AnnotationCollection,
        generic_type: Deferred<GenericType>,
    ) -> Self {
        Self {
            access,
            name,
            ty,
            value,
            annotations,
            generic_type: Rc::new(generic_type),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    /// Constant initializer, present only for constant fields.
    pub fn value(&self) -> Option<&FieldValue> {
        self.value.as_ref()
    }

    pub fn annotations(&self) -> &AnnotationCollection {
        &self.annotations
    }

    /// Declared generic type; the raw type when the field has no signature.
    pub fn generic_type(&self) -> Result<&GenericType> {
        self.generic_type.get()
    }
}

impl Element for FieldMirror {
    fn access(&self) -> u16 {
        self.access
    }
}

impl fmt::Debug for FieldMirror {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldMirror")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .finish()
    }
}
