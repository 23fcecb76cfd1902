use std::mem;

use anyhow::Result;

use crate::class_registry::ClassRegistry;
use crate::classfile::{AnnotationNode, ElementValue};
use crate::error::GripError;
use crate::mirrors::{AnnotationMirror, AnnotationValue, EnumMirror};
use crate::types::{ObjectType, Type};

/// How the visibility of a decoded annotation is decided.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Visibility {
    /// Taken from the attribute the annotation was stored in.
    Attribute(bool),
    /// Taken from the annotation type's retention, for values without an
    /// enclosing attribute such as element defaults.
    Retention,
}

/// Builds an annotation instance: the type's element defaults overlaid with
/// the values stored in the class file.
pub(crate) fn read_annotation(
    node: &AnnotationNode,
    visibility: Visibility,
    registry: &dyn ClassRegistry,
) -> Result<AnnotationMirror> {
    let ty = annotation_type(&node.type_descriptor)?;
    let defaults = registry.get_annotation_mirror(&ty)?;
    let visible = match visibility {
        Visibility::Attribute(visible) => visible,
        Visibility::Retention => defaults.visible(),
    };
    let mut builder = AnnotationMirror::builder(ty)
        .values_from(&defaults)
        .visible(visible)
        .resolved(defaults.resolved());
    for (name, value) in &node.elements {
        // Nested annotations share the visibility of their parent.
        let value = read_value(value, Visibility::Attribute(visible), registry)?;
        builder = builder.value(name.clone(), value);
    }
    Ok(builder.build())
}

pub(crate) fn read_value(
    value: &ElementValue,
    visibility: Visibility,
    registry: &dyn ClassRegistry,
) -> Result<AnnotationValue> {
    let value = match value {
        ElementValue::Boolean(value) => AnnotationValue::Boolean(*value),
        ElementValue::Byte(value) => AnnotationValue::Byte(*value),
        ElementValue::Char(value) => AnnotationValue::Char(*value),
        ElementValue::Short(value) => AnnotationValue::Short(*value),
        ElementValue::Int(value) => AnnotationValue::Int(*value),
        ElementValue::Long(value) => AnnotationValue::Long(*value),
        ElementValue::Float(value) => AnnotationValue::Float(*value),
        ElementValue::Double(value) => AnnotationValue::Double(*value),
        ElementValue::String(value) => AnnotationValue::String(value.clone()),
        ElementValue::Enum {
            type_descriptor,
            constant,
        } => AnnotationValue::Enum(EnumMirror::new(
            annotation_type(type_descriptor)?,
            constant.clone(),
        )),
        ElementValue::Class(descriptor) => AnnotationValue::Type(Type::parse(descriptor)?),
        ElementValue::Annotation(node) => {
            AnnotationValue::Annotation(Box::new(read_annotation(node, visibility, registry)?))
        }
        ElementValue::Array(values) => {
            let values = values
                .iter()
                .map(|value| read_value(value, visibility, registry))
                .collect::<Result<Vec<_>>>()?;
            ensure_homogeneous(&values)?;
            AnnotationValue::Array(values)
        }
    };
    Ok(value)
}

fn ensure_homogeneous(values: &[AnnotationValue]) -> Result<()> {
    let Some(first) = values.first() else {
        return Ok(());
    };
    let kind = mem::discriminant(first);
    if values.iter().any(|value| mem::discriminant(value) != kind) {
        return Err(GripError::MalformedClass(
            "annotation array mixes element kinds".to_string(),
        )
        .into());
    }
    Ok(())
}

fn annotation_type(descriptor: &str) -> Result<ObjectType> {
    match Type::parse(descriptor)? {
        Type::Object(ty) => Ok(ty),
        _ => Err(GripError::MalformedDescriptor(format!(
            "expected a class type, got {descriptor}"
        ))
        .into()),
    }
}
