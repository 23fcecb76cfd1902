use std::fmt;

use anyhow::Result;

use crate::error::GripError;

pub const OBJECT_INTERNAL_NAME: &str = "java/lang/Object";

/// JVM primitive kinds, `void` included.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveType {
    Void,
    Boolean,
    Char,
    Byte,
    Short,
    Int,
    Float,
    Long,
    Double,
}

impl PrimitiveType {
    pub fn descriptor_char(self) -> char {
        match self {
            PrimitiveType::Void => 'V',
            PrimitiveType::Boolean => 'Z',
            PrimitiveType::Char => 'C',
            PrimitiveType::Byte => 'B',
            PrimitiveType::Short => 'S',
            PrimitiveType::Int => 'I',
            PrimitiveType::Float => 'F',
            PrimitiveType::Long => 'J',
            PrimitiveType::Double => 'D',
        }
    }

    pub fn from_descriptor_char(value: char) -> Option<Self> {
        let primitive = match value {
            'V' => PrimitiveType::Void,
            'Z' => PrimitiveType::Boolean,
            'C' => PrimitiveType::Char,
            'B' => PrimitiveType::Byte,
            'S' => PrimitiveType::Short,
            'I' => PrimitiveType::Int,
            'F' => PrimitiveType::Float,
            'J' => PrimitiveType::Long,
            'D' => PrimitiveType::Double,
            _ => return None,
        };
        Some(primitive)
    }

    /// Java source name, e.g. `int`.
    pub fn class_name(self) -> &'static str {
        match self {
            PrimitiveType::Void => "void",
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Char => "char",
            PrimitiveType::Byte => "byte",
            PrimitiveType::Short => "short",
            PrimitiveType::Int => "int",
            PrimitiveType::Float => "float",
            PrimitiveType::Long => "long",
            PrimitiveType::Double => "double",
        }
    }
}

/// Class or interface type identified by its internal name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectType {
    internal_name: String,
}

impl ObjectType {
    pub fn new(internal_name: impl Into<String>) -> Self {
        Self {
            internal_name: internal_name.into(),
        }
    }

    pub fn object() -> Self {
        Self::new(OBJECT_INTERNAL_NAME)
    }

    pub fn internal_name(&self) -> &str {
        &self.internal_name
    }

    pub fn descriptor(&self) -> String {
        format!("L{};", self.internal_name)
    }

    /// Dotted binary name, e.g. `java.util.Map$Entry`.
    pub fn class_name(&self) -> String {
        self.internal_name.replace('/', ".")
    }

    /// Dotted package name; empty for the default package.
    pub fn package_name(&self) -> String {
        match self.internal_name.rfind('/') {
            Some(index) => self.internal_name[..index].replace('/', "."),
            None => String::new(),
        }
    }

    pub fn is_object(&self) -> bool {
        self.internal_name == OBJECT_INTERNAL_NAME
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.internal_name)
    }
}

/// Array type; the element type is never itself an array.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ArrayType {
    element: Box<Type>,
    dimensions: usize,
}

impl ArrayType {
    /// Build an array of `element`, flattening nested array elements.
    pub fn new(element: Type, dimensions: usize) -> Self {
        match element {
            Type::Array(inner) => Self {
                dimensions: inner.dimensions + dimensions,
                element: inner.element,
            },
            element => Self {
                element: Box::new(element),
                dimensions,
            },
        }
    }

    pub fn element_type(&self) -> &Type {
        &self.element
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn descriptor(&self) -> String {
        format!("{}{}", "[".repeat(self.dimensions), self.element.descriptor())
    }
}

/// Method type: return plus argument types.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodType {
    return_type: Box<Type>,
    argument_types: Vec<Type>,
}

impl MethodType {
    pub fn new(return_type: Type, argument_types: Vec<Type>) -> Self {
        Self {
            return_type: Box::new(return_type),
            argument_types,
        }
    }

    pub fn parse(descriptor: &str) -> Result<Self> {
        match Type::parse(descriptor)? {
            Type::Method(method) => Ok(method),
            _ => Err(GripError::MalformedDescriptor(descriptor.to_string()).into()),
        }
    }

    pub fn return_type(&self) -> &Type {
        &self.return_type
    }

    pub fn argument_types(&self) -> &[Type] {
        &self.argument_types
    }

    pub fn descriptor(&self) -> String {
        let mut descriptor = String::from("(");
        for argument in &self.argument_types {
            descriptor.push_str(&argument.descriptor());
        }
        descriptor.push(')');
        descriptor.push_str(&self.return_type.descriptor());
        descriptor
    }
}

/// Semantic form of a JVM type descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Primitive(PrimitiveType),
    Array(ArrayType),
    Object(ObjectType),
    Method(MethodType),
}

impl Type {
    /// Parse a field or method descriptor.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let mut parser = DescriptorParser {
            input: descriptor,
            offset: 0,
        };
        let parsed = if descriptor.starts_with('(') {
            parser.method_type().map(Type::Method)
        } else {
            parser.field_type()
        };
        match parsed {
            Some(parsed) if parser.offset == descriptor.len() => Ok(parsed),
            _ => Err(GripError::MalformedDescriptor(descriptor.to_string()).into()),
        }
    }

    pub fn object(internal_name: impl Into<String>) -> Self {
        Type::Object(ObjectType::new(internal_name))
    }

    /// Type for an internal name, which for arrays is the array descriptor.
    pub fn from_internal_name(internal_name: &str) -> Result<Self> {
        if internal_name.starts_with('[') {
            Self::parse(internal_name)
        } else {
            Ok(Self::object(internal_name))
        }
    }

    pub fn descriptor(&self) -> String {
        match self {
            Type::Primitive(primitive) => primitive.descriptor_char().to_string(),
            Type::Array(array) => array.descriptor(),
            Type::Object(object) => object.descriptor(),
            Type::Method(method) => method.descriptor(),
        }
    }

    /// Java-like name, e.g. `int`, `java.lang.String[][]`.
    pub fn class_name(&self) -> String {
        match self {
            Type::Primitive(primitive) => primitive.class_name().to_string(),
            Type::Array(array) => format!(
                "{}{}",
                array.element_type().class_name(),
                "[]".repeat(array.dimensions())
            ),
            Type::Object(object) => object.class_name(),
            Type::Method(method) => method.descriptor(),
        }
    }

    /// Internal name of object and array types.
    pub fn internal_name(&self) -> Option<String> {
        match self {
            Type::Object(object) => Some(object.internal_name().to_string()),
            Type::Array(array) => Some(array.descriptor()),
            Type::Primitive(_) | Type::Method(_) => None,
        }
    }

    pub fn to_array_type(&self, dimensions: usize) -> Type {
        Type::Array(ArrayType::new(self.clone(), dimensions))
    }

    pub fn as_object(&self) -> Option<&ObjectType> {
        match self {
            Type::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::Primitive(_))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor())
    }
}

impl From<PrimitiveType> for Type {
    fn from(value: PrimitiveType) -> Self {
        Type::Primitive(value)
    }
}

impl From<ObjectType> for Type {
    fn from(value: ObjectType) -> Self {
        Type::Object(value)
    }
}

impl From<ArrayType> for Type {
    fn from(value: ArrayType) -> Self {
        Type::Array(value)
    }
}

impl From<MethodType> for Type {
    fn from(value: MethodType) -> Self {
        Type::Method(value)
    }
}

struct DescriptorParser<'a> {
    input: &'a str,
    offset: usize,
}

impl DescriptorParser<'_> {
    fn peek(&self) -> Option<char> {
        self.input[self.offset..].chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let next = self.peek()?;
        self.offset += next.len_utf8();
        Some(next)
    }

    fn field_type(&mut self) -> Option<Type> {
        match self.advance()? {
            'L' => {
                let rest = &self.input[self.offset..];
                let end = rest.find(';')?;
                let name = &rest[..end];
                if name.is_empty() {
                    return None;
                }
                self.offset += end + 1;
                Some(Type::object(name))
            }
            '[' => {
                let mut dimensions = 1;
                while self.peek() == Some('[') {
                    self.offset += 1;
                    dimensions += 1;
                }
                let element = self.field_type()?;
                if element == Type::Primitive(PrimitiveType::Void) {
                    return None;
                }
                Some(Type::Array(ArrayType::new(element, dimensions)))
            }
            other => PrimitiveType::from_descriptor_char(other).map(Type::Primitive),
        }
    }

    fn method_type(&mut self) -> Option<MethodType> {
        if self.advance()? != '(' {
            return None;
        }
        let mut arguments = Vec::new();
        while self.peek()? != ')' {
            let argument = self.field_type()?;
            if argument == Type::Primitive(PrimitiveType::Void) {
                return None;
            }
            arguments.push(argument);
        }
        self.offset += 1;
        let return_type = self.field_type()?;
        Some(MethodType::new(return_type, arguments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jdescriptor::{MethodDescriptor, TypeDescriptor};
    use std::str::FromStr;

    #[test]
    fn descriptors_round_trip() {
        let descriptors = [
            "V",
            "Z",
            "C",
            "B",
            "S",
            "I",
            "F",
            "J",
            "D",
            "Ljava/lang/String;",
            "[I",
            "[[Ljava/util/List;",
            "()V",
            "(IJ[Ljava/lang/Object;)Ljava/lang/String;",
            "([[DLjava/util/Map$Entry;)[Z",
        ];
        for descriptor in descriptors {
            let parsed = Type::parse(descriptor).expect("parse descriptor");
            assert_eq!(parsed.descriptor(), descriptor);
            assert_eq!(Type::parse(&parsed.descriptor()).expect("reparse"), parsed);
        }
    }

    #[test]
    fn method_descriptors_agree_with_jdescriptor() {
        let descriptors = [
            "()V",
            "(I)Ljava/lang/String;",
            "(JD[[Ljava/lang/Object;Z)[I",
        ];
        for descriptor in descriptors {
            let ours = MethodType::parse(descriptor).expect("parse method");
            let theirs = MethodDescriptor::from_str(descriptor).expect("jdescriptor");
            assert_eq!(ours.argument_types().len(), theirs.parameter_types().len());
            match theirs.return_type() {
                TypeDescriptor::Void => {
                    assert_eq!(ours.return_type(), &Type::Primitive(PrimitiveType::Void))
                }
                TypeDescriptor::Object(_) => {
                    assert!(matches!(ours.return_type(), Type::Object(_)))
                }
                TypeDescriptor::Array(_, _) => {
                    assert!(matches!(ours.return_type(), Type::Array(_)))
                }
                _ => assert!(ours.return_type().is_primitive()),
            }
        }
    }

    #[test]
    fn nested_arrays_are_flattened() {
        let inner = Type::parse("[I").expect("parse");
        let outer = inner.to_array_type(2);
        assert_eq!(outer.descriptor(), "[[[I");
        match outer {
            Type::Array(array) => {
                assert_eq!(array.dimensions(), 3);
                assert_eq!(array.element_type(), &Type::Primitive(PrimitiveType::Int));
            }
            other => panic!("unexpected type {other:?}"),
        }
    }

    #[test]
    fn malformed_descriptors_are_rejected() {
        for descriptor in ["", "L;", "Ljava/lang/String", "[V", "(V)V", "(I", "II", "Q"] {
            let error = Type::parse(descriptor).expect_err("malformed");
            assert!(matches!(
                GripError::kind_of(&error),
                Some(GripError::MalformedDescriptor(_))
            ));
        }
    }

    #[test]
    fn names_follow_java_conventions() {
        let string = ObjectType::new("java/lang/String");
        assert_eq!(string.class_name(), "java.lang.String");
        assert_eq!(string.package_name(), "java.lang");
        assert_eq!(ObjectType::new("Foo").package_name(), "");
        let matrix = Type::parse("[[Ljava/lang/String;").expect("parse");
        assert_eq!(matrix.class_name(), "java.lang.String[][]");
        assert_eq!(matrix.internal_name().as_deref(), Some("[[Ljava/lang/String;"));
        assert_eq!(
            Type::from_internal_name("java/util/List").expect("type"),
            Type::object("java/util/List")
        );
    }
}
