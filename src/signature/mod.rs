//! Generic signature model and reader.

mod generic_type;
mod mirrors;
mod reader;

pub use generic_type::{GenericDeclaration, GenericType, TypeVariable};
pub use mirrors::{ClassSignatureMirror, MethodSignatureMirror};
pub use reader::{read_class_signature, read_generic_type, read_method_signature};
