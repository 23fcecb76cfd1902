use anyhow::Result;

use crate::classfile::constant_pool::ConstantPool;
use crate::classfile::reader::AttributeBody;
use crate::error::GripError;

/// Deepest nesting of annotations and arrays inside one element value.
const MAX_ELEMENT_DEPTH: usize = 256;

/// Annotation structure as stored in the class file.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct AnnotationNode {
    pub(crate) type_descriptor: String,
    pub(crate) elements: Vec<(String, ElementValue)>,
}

impl AnnotationNode {
    pub(crate) fn parse(body: &mut AttributeBody<'_>, cp: &ConstantPool) -> Result<Self> {
        Self::parse_at(body, cp, 0)
    }

    fn parse_at(body: &mut AttributeBody<'_>, cp: &ConstantPool, depth: usize) -> Result<Self> {
        let type_descriptor = cp.utf8(body.read_u16()?)?.to_string();
        let count = body.read_u16()? as usize;
        let mut elements = Vec::with_capacity(count);
        for _ in 0..count {
            let name = cp.utf8(body.read_u16()?)?.to_string();
            let value = ElementValue::parse_at(body, cp, depth + 1)?;
            elements.push((name, value));
        }
        Ok(Self {
            type_descriptor,
            elements,
        })
    }
}

/// `element_value` union, keyed by its one-byte tag.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ElementValue {
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Enum {
        type_descriptor: String,
        constant: String,
    },
    /// Return descriptor, e.g. `Ljava/lang/String;` or `V`.
    Class(String),
    Annotation(Box<AnnotationNode>),
    Array(Vec<ElementValue>),
}

impl ElementValue {
    pub(crate) fn parse(body: &mut AttributeBody<'_>, cp: &ConstantPool) -> Result<Self> {
        Self::parse_at(body, cp, 0)
    }

    fn parse_at(body: &mut AttributeBody<'_>, cp: &ConstantPool, depth: usize) -> Result<Self> {
        if depth > MAX_ELEMENT_DEPTH {
            return Err(GripError::MalformedClass(format!(
                "element value nested deeper than {MAX_ELEMENT_DEPTH} levels"
            ))
            .into());
        }
        let tag = body.read_u8()?;
        let value = match tag {
            b'Z' => ElementValue::Boolean(cp.integer(body.read_u16()?)? != 0),
            b'B' => ElementValue::Byte(cp.integer(body.read_u16()?)? as i8),
            b'C' => ElementValue::Char(cp.integer(body.read_u16()?)? as u16),
            b'S' => ElementValue::Short(cp.integer(body.read_u16()?)? as i16),
            b'I' => ElementValue::Int(cp.integer(body.read_u16()?)?),
            b'J' => ElementValue::Long(cp.long(body.read_u16()?)?),
            b'F' => ElementValue::Float(cp.float(body.read_u16()?)?),
            b'D' => ElementValue::Double(cp.double(body.read_u16()?)?),
            b's' => ElementValue::String(cp.utf8(body.read_u16()?)?.to_string()),
            b'e' => {
                let type_descriptor = cp.utf8(body.read_u16()?)?.to_string();
                let constant = cp.utf8(body.read_u16()?)?.to_string();
                ElementValue::Enum {
                    type_descriptor,
                    constant,
                }
            }
            b'c' => ElementValue::Class(cp.utf8(body.read_u16()?)?.to_string()),
            b'@' => ElementValue::Annotation(Box::new(AnnotationNode::parse_at(body, cp, depth)?)),
            b'[' => {
                let count = body.read_u16()? as usize;
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    values.push(ElementValue::parse_at(body, cp, depth + 1)?);
                }
                ElementValue::Array(values)
            }
            _ => {
                return Err(GripError::MalformedClass(format!(
                    "unknown element value tag {:?}",
                    tag as char
                ))
                .into());
            }
        };
        Ok(value)
    }
}
