use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::types::{ObjectType, Type};

/// Element name used by single-value annotations.
pub const DEFAULT_ELEMENT: &str = "value";

/// Enum constant stored in an annotation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnumMirror {
    ty: ObjectType,
    value: String,
}

impl EnumMirror {
    pub fn new(ty: ObjectType, value: impl Into<String>) -> Self {
        Self {
            ty,
            value: value.into(),
        }
    }

    pub fn ty(&self) -> &ObjectType {
        &self.ty
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Annotation element value.
///
/// Arrays are homogeneous: every element has the same variant.
#[derive(Clone, Debug)]
pub enum AnnotationValue {
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Type(Type),
    Enum(EnumMirror),
    Annotation(Box<AnnotationMirror>),
    Array(Vec<AnnotationValue>),
}

impl AnnotationValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AnnotationValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumMirror> {
        match self {
            AnnotationValue::Enum(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_annotation(&self) -> Option<&AnnotationMirror> {
        match self {
            AnnotationValue::Annotation(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[AnnotationValue]> {
        match self {
            AnnotationValue::Array(values) => Some(values),
            _ => None,
        }
    }
}

impl PartialEq for AnnotationValue {
    fn eq(&self, other: &Self) -> bool {
        use AnnotationValue::*;
        match (self, other) {
            (Boolean(a), Boolean(b)) => a == b,
            (Byte(a), Byte(b)) => a == b,
            (Char(a), Char(b)) => a == b,
            (Short(a), Short(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Long(a), Long(b)) => a == b,
            (Float(a), Float(b)) => a.to_bits() == b.to_bits(),
            (Double(a), Double(b)) => a.to_bits() == b.to_bits(),
            (String(a), String(b)) => a == b,
            (Type(a), Type(b)) => a == b,
            (Enum(a), Enum(b)) => a == b,
            (Annotation(a), Annotation(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for AnnotationValue {}

impl Hash for AnnotationValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            AnnotationValue::Boolean(value) => value.hash(state),
            AnnotationValue::Byte(value) => value.hash(state),
            AnnotationValue::Char(value) => value.hash(state),
            AnnotationValue::Short(value) => value.hash(state),
            AnnotationValue::Int(value) => value.hash(state),
            AnnotationValue::Long(value) => value.hash(state),
            AnnotationValue::Float(value) => value.to_bits().hash(state),
            AnnotationValue::Double(value) => value.to_bits().hash(state),
            AnnotationValue::String(value) => value.hash(state),
            AnnotationValue::Type(value) => value.hash(state),
            AnnotationValue::Enum(value) => value.hash(state),
            AnnotationValue::Annotation(value) => value.hash(state),
            AnnotationValue::Array(values) => values.hash(state),
        }
    }
}

impl fmt::Display for AnnotationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnnotationValue::Boolean(value) => write!(f, "{value}"),
            AnnotationValue::Byte(value) => write!(f, "{value}"),
            AnnotationValue::Char(value) => match char::from_u32(u32::from(*value)) {
                Some(value) => write!(f, "'{value}'"),
                None => write!(f, "'\\u{value:04x}'"),
            },
            AnnotationValue::Short(value) => write!(f, "{value}"),
            AnnotationValue::Int(value) => write!(f, "{value}"),
            AnnotationValue::Long(value) => write!(f, "{value}L"),
            AnnotationValue::Float(value) => write!(f, "{value}f"),
            AnnotationValue::Double(value) => write!(f, "{value}"),
            AnnotationValue::String(value) => write!(f, "{value:?}"),
            AnnotationValue::Type(value) => write!(f, "{}.class", value.class_name()),
            AnnotationValue::Enum(value) => {
                write!(f, "{}.{}", value.ty().class_name(), value.value())
            }
            AnnotationValue::Annotation(value) => write!(f, "{value}"),
            AnnotationValue::Array(values) => {
                f.write_str("{")?;
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

/// Annotation instance or, when built from an annotation type, its element
/// defaults.
///
/// `visible` is not part of equality: two mirrors of the same type with the
/// same values are equal regardless of where they were read from.
#[derive(Clone, Debug)]
pub struct AnnotationMirror {
    ty: ObjectType,
    values: BTreeMap<String, AnnotationValue>,
    visible: bool,
    resolved: bool,
}

impl AnnotationMirror {
    pub fn builder(ty: ObjectType) -> AnnotationMirrorBuilder {
        AnnotationMirrorBuilder::new(ty)
    }

    /// Marker for an annotation type that is not on the classpath.
    pub fn unresolved(ty: ObjectType) -> Self {
        Self {
            ty,
            values: BTreeMap::new(),
            visible: false,
            resolved: false,
        }
    }

    pub fn ty(&self) -> &ObjectType {
        &self.ty
    }

    pub fn values(&self) -> &BTreeMap<String, AnnotationValue> {
        &self.values
    }

    pub fn value(&self, name: &str) -> Option<&AnnotationValue> {
        self.values.get(name)
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn resolved(&self) -> bool {
        self.resolved
    }
}

impl PartialEq for AnnotationMirror {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty && self.resolved == other.resolved && self.values == other.values
    }
}

impl Eq for AnnotationMirror {}

impl Hash for AnnotationMirror {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ty.hash(state);
        self.values.hash(state);
        self.resolved.hash(state);
    }
}

impl fmt::Display for AnnotationMirror {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.ty.class_name())?;
        if self.values.is_empty() {
            return Ok(());
        }
        f.write_str("(")?;
        for (index, (name, value)) in self.values.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name} = {value}")?;
        }
        f.write_str(")")
    }
}

pub struct AnnotationMirrorBuilder {
    ty: ObjectType,
    values: BTreeMap<String, AnnotationValue>,
    visible: bool,
    resolved: bool,
}

impl AnnotationMirrorBuilder {
    pub fn new(ty: ObjectType) -> Self {
        Self {
            ty,
            values: BTreeMap::new(),
            visible: false,
            resolved: true,
        }
    }

    pub fn value(mut self, name: impl Into<String>, value: AnnotationValue) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Copies every value of `mirror`, replacing values with the same name.
    pub fn values_from(mut self, mirror: &AnnotationMirror) -> Self {
        self.values.extend(
            mirror
                .values
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn resolved(mut self, resolved: bool) -> Self {
        self.resolved = resolved;
        self
    }

    pub fn build(self) -> AnnotationMirror {
        AnnotationMirror {
            ty: self.ty,
            values: self.values,
            visible: self.visible,
            resolved: self.resolved,
        }
    }
}

/// Annotations of one element, keyed by annotation type.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AnnotationCollection {
    annotations: Vec<AnnotationMirror>,
}

impl AnnotationCollection {
    /// Later annotations of an already present type replace earlier ones.
    pub fn new(annotations: Vec<AnnotationMirror>) -> Self {
        let mut collection = Self::default();
        for annotation in annotations {
            collection.insert(annotation);
        }
        collection
    }

    pub(crate) fn insert(&mut self, annotation: AnnotationMirror) {
        match self
            .annotations
            .iter_mut()
            .find(|existing| existing.ty == annotation.ty)
        {
            Some(existing) => *existing = annotation,
            None => self.annotations.push(annotation),
        }
    }

    pub fn get(&self, ty: &ObjectType) -> Option<&AnnotationMirror> {
        self.annotations.iter().find(|annotation| &annotation.ty == ty)
    }

    pub fn contains(&self, ty: &ObjectType) -> bool {
        self.get(ty).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AnnotationMirror> {
        self.annotations.iter()
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }
}

impl<'a> IntoIterator for &'a AnnotationCollection {
    type Item = &'a AnnotationMirror;
    type IntoIter = std::slice::Iter<'a, AnnotationMirror>;

    fn into_iter(self) -> Self::IntoIter {
        self.annotations.iter()
    }
}
