use std::rc::Rc;

use crate::signature::generic_type::{GenericType, TypeVariable};
use crate::types::{MethodType, ObjectType, Type};

/// Generic view of a class header.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassSignatureMirror {
    type_variables: Vec<Rc<TypeVariable>>,
    super_type: GenericType,
    interfaces: Vec<GenericType>,
}

impl ClassSignatureMirror {
    pub fn new(
        type_variables: Vec<Rc<TypeVariable>>,
        super_type: GenericType,
        interfaces: Vec<GenericType>,
    ) -> Self {
        Self {
            type_variables,
            super_type,
            interfaces,
        }
    }

    /// Signature implied by a class without a `Signature` attribute.
    pub fn from_raw(super_type: Option<&ObjectType>, interfaces: &[ObjectType]) -> Self {
        let super_type = super_type.cloned().unwrap_or_else(ObjectType::object);
        Self {
            type_variables: Vec::new(),
            super_type: GenericType::Raw(Type::Object(super_type)),
            interfaces: interfaces
                .iter()
                .map(|interface| GenericType::Raw(Type::Object(interface.clone())))
                .collect(),
        }
    }

    pub fn type_variables(&self) -> &[Rc<TypeVariable>] {
        &self.type_variables
    }

    pub fn super_type(&self) -> &GenericType {
        &self.super_type
    }

    pub fn interfaces(&self) -> &[GenericType] {
        &self.interfaces
    }
}

/// Generic view of a method or constructor.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodSignatureMirror {
    type_variables: Vec<Rc<TypeVariable>>,
    parameter_types: Vec<GenericType>,
    return_type: GenericType,
    exception_types: Vec<GenericType>,
}

impl MethodSignatureMirror {
    pub fn new(
        type_variables: Vec<Rc<TypeVariable>>,
        parameter_types: Vec<GenericType>,
        return_type: GenericType,
        exception_types: Vec<GenericType>,
    ) -> Self {
        Self {
            type_variables,
            parameter_types,
            return_type,
            exception_types,
        }
    }

    pub fn from_raw(method_type: &MethodType, exceptions: &[ObjectType]) -> Self {
        Self {
            type_variables: Vec::new(),
            parameter_types: method_type
                .argument_types()
                .iter()
                .cloned()
                .map(GenericType::Raw)
                .collect(),
            return_type: GenericType::Raw(method_type.return_type().clone()),
            exception_types: exceptions
                .iter()
                .map(|exception| GenericType::Raw(Type::Object(exception.clone())))
                .collect(),
        }
    }

    pub fn type_variables(&self) -> &[Rc<TypeVariable>] {
        &self.type_variables
    }

    pub fn parameter_types(&self) -> &[GenericType] {
        &self.parameter_types
    }

    pub fn return_type(&self) -> &GenericType {
        &self.return_type
    }

    pub fn exception_types(&self) -> &[GenericType] {
        &self.exception_types
    }
}
