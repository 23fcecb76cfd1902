use std::fmt;
use std::rc::Rc;

use crate::types::{ObjectType, Type};

/// Java-language type reconstructed from a `Signature` attribute.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum GenericType {
    Raw(Type),
    TypeVariable(Rc<TypeVariable>),
    Array(Box<GenericType>),
    Parameterized {
        ty: ObjectType,
        type_arguments: Vec<GenericType>,
    },
    /// Member type of `owner`; `ty` carries the `Outer$Inner` name.
    Inner {
        name: String,
        ty: Box<GenericType>,
        owner: Box<GenericType>,
    },
    UpperBounded(Box<GenericType>),
    LowerBounded(Box<GenericType>),
}

impl GenericType {
    pub fn raw_object() -> Self {
        GenericType::Raw(Type::Object(ObjectType::object()))
    }

    pub fn parameterized(ty: ObjectType, type_arguments: Vec<GenericType>) -> Self {
        GenericType::Parameterized { ty, type_arguments }
    }

    /// `?`, encoded as `? extends Object`.
    pub fn wildcard() -> Self {
        GenericType::UpperBounded(Box::new(Self::raw_object()))
    }

    pub fn as_type_variable(&self) -> Option<&TypeVariable> {
        match self {
            GenericType::TypeVariable(variable) => Some(variable),
            _ => None,
        }
    }
}

impl fmt::Display for GenericType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenericType::Raw(ty) => f.write_str(&ty.class_name()),
            GenericType::TypeVariable(variable) => f.write_str(variable.name()),
            GenericType::Array(element) => write!(f, "{element}[]"),
            GenericType::Parameterized { ty, type_arguments } => {
                write!(f, "{}", ty.class_name())?;
                write_arguments(f, type_arguments)
            }
            GenericType::Inner { name, ty, owner } => {
                write!(f, "{owner}.{name}")?;
                match ty.as_ref() {
                    GenericType::Parameterized { type_arguments, .. } => {
                        write_arguments(f, type_arguments)
                    }
                    _ => Ok(()),
                }
            }
            GenericType::UpperBounded(bound) if **bound == GenericType::raw_object() => {
                f.write_str("?")
            }
            GenericType::UpperBounded(bound) => write!(f, "? extends {bound}"),
            GenericType::LowerBounded(bound) => write!(f, "? super {bound}"),
        }
    }
}

fn write_arguments(f: &mut fmt::Formatter<'_>, arguments: &[GenericType]) -> fmt::Result {
    f.write_str("<")?;
    for (index, argument) in arguments.iter().enumerate() {
        if index > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{argument}")?;
    }
    f.write_str(">")
}

/// Declared type variable with its bounds.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeVariable {
    name: String,
    class_bound: GenericType,
    interface_bounds: Vec<GenericType>,
}

impl TypeVariable {
    pub fn new(
        name: impl Into<String>,
        class_bound: GenericType,
        interface_bounds: Vec<GenericType>,
    ) -> Self {
        Self {
            name: name.into(),
            class_bound,
            interface_bounds,
        }
    }

    /// Variable bounded by `java/lang/Object` only.
    pub fn unbounded(name: impl Into<String>) -> Self {
        Self::new(name, GenericType::raw_object(), Vec::new())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class_bound(&self) -> &GenericType {
        &self.class_bound
    }

    pub fn interface_bounds(&self) -> &[GenericType] {
        &self.interface_bounds
    }
}

/// Type variables in scope, outermost first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GenericDeclaration {
    type_variables: Vec<Rc<TypeVariable>>,
}

impl GenericDeclaration {
    pub fn new(type_variables: Vec<Rc<TypeVariable>>) -> Self {
        Self { type_variables }
    }

    pub fn type_variables(&self) -> &[Rc<TypeVariable>] {
        &self.type_variables
    }

    /// Most recently declared variable named `name`.
    pub fn lookup(&self, name: &str) -> Option<&Rc<TypeVariable>> {
        self.type_variables
            .iter()
            .rev()
            .find(|variable| variable.name() == name)
    }

    /// Declaration with `inner` layered on top of this one.
    pub fn with(&self, inner: &[Rc<TypeVariable>]) -> Self {
        let mut type_variables = self.type_variables.clone();
        type_variables.extend(inner.iter().cloned());
        Self { type_variables }
    }

    pub fn is_empty(&self) -> bool {
        self.type_variables.is_empty()
    }
}
