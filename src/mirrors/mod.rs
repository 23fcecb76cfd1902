//! Immutable reflection model of classes, members and annotations.

pub mod access;
mod annotation;
mod class;
mod field;
mod method;

pub use access::Element;
pub use annotation::{
    AnnotationCollection, AnnotationMirror, AnnotationMirrorBuilder, AnnotationValue, EnumMirror,
    DEFAULT_ELEMENT,
};
pub use class::{ClassMirror, Enclosure, InnerClass};
pub use field::{FieldMirror, FieldValue};
pub use method::{
    MethodMirror, MethodParameterMirror, CONSTRUCTOR_NAME, DEFAULT_CONSTRUCTOR_DESCRIPTOR,
    STATIC_INITIALIZER_NAME,
};

pub(crate) use class::{ClassDetails, ClassGenerics, ClassHeader, ClassMirrorBuilder};
pub(crate) use method::MethodGenerics;
