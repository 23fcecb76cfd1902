//! Constant-pool-aware reader for the JVM class file format.

pub(crate) mod annotation;
pub(crate) mod constant_pool;
pub(crate) mod reader;

pub(crate) use annotation::{AnnotationNode, ElementValue};
pub(crate) use reader::{
    ClassHeader, ClassReader, ClassVisitor, ConstantValueNode, EnclosingMethodNode, FieldNode,
    InnerClassNode, MethodNode, ReadOptions,
};
