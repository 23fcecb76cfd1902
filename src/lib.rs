//! Lazy, cache-coherent reflection over JVM class files and jars.
//!
//! A [`Grip`] is created from a classpath by a [`GripFactory`]. Classes are
//! read on demand into [`ClassMirror`]s and cached per type; produced or
//! patched classes go through the class producer, which invalidates stale
//! mirrors.

mod annotation_reader;
pub mod class_producer;
pub mod class_registry;
mod classfile;
pub mod error;
pub mod file_registry;
pub mod grip;
pub mod hierarchy;
pub mod io;
pub mod lazy;
pub mod mirrors;
pub mod query;
pub mod reflector;
pub mod signature;
pub mod types;

#[cfg(test)]
mod test_support;

pub use class_producer::{ClassProducer, MutableClassProducer};
pub use class_registry::{ClassRegistry, MutableClassRegistry};
pub use error::GripError;
pub use file_registry::{FileRegistry, MutableFileRegistry};
pub use grip::{Grip, GripFactory};
pub use mirrors::{AnnotationMirror, ClassMirror, FieldMirror, MethodMirror};
pub use query::{ClassMirrorSource, FilesClassMirrorSource, FunctionClassMirrorSource};
pub use types::{ArrayType, MethodType, ObjectType, PrimitiveType, Type};
