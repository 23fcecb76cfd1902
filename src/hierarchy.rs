//! Superclass chains, as needed when stack map frames are recomputed.

use std::collections::HashSet;
use std::rc::Rc;

use anyhow::Result;

use crate::class_registry::ClassRegistry;
use crate::error::GripError;
use crate::mirrors::ClassMirror;
use crate::types::ObjectType;

/// Iterator over a class and its superclasses, nearest first.
///
/// A chain that revisits a type yields one `MalformedClass` error and ends.
pub struct ClassHierarchy<'a> {
    registry: &'a dyn ClassRegistry,
    next: Option<ObjectType>,
    visited: HashSet<ObjectType>,
}

impl Iterator for ClassHierarchy<'_> {
    type Item = Result<Rc<ClassMirror>>;

    fn next(&mut self) -> Option<Self::Item> {
        let ty = self.next.take()?;
        if !self.visited.insert(ty.clone()) {
            return Some(Err(cyclic_chain(&ty)));
        }
        let mirror = self.registry.get_class_mirror(&ty);
        if let Ok(mirror) = &mirror {
            self.next = mirror.super_type().cloned();
        }
        Some(mirror)
    }
}

pub fn class_hierarchy<'a>(registry: &'a dyn ClassRegistry, ty: &ObjectType) -> ClassHierarchy<'a> {
    ClassHierarchy {
        registry,
        next: Some(ty.clone()),
        visited: HashSet::new(),
    }
}

/// First class in `second`'s chain that is also in `first`'s chain, or
/// `java/lang/Object`.
///
/// A chain ends at the first type missing from the classpath; that type
/// still takes part in the comparison.
pub fn common_super_class(
    registry: &dyn ClassRegistry,
    first: &ObjectType,
    second: &ObjectType,
) -> Result<ObjectType> {
    let first_chain: HashSet<ObjectType> = super_type_chain(registry, first)?.into_iter().collect();
    let common = super_type_chain(registry, second)?
        .into_iter()
        .find(|ty| first_chain.contains(ty));
    Ok(common.unwrap_or_else(ObjectType::object))
}

fn super_type_chain(registry: &dyn ClassRegistry, ty: &ObjectType) -> Result<Vec<ObjectType>> {
    let mut chain = Vec::new();
    let mut next = Some(ty.clone());
    while let Some(current) = next.take() {
        if chain.contains(&current) {
            return Err(cyclic_chain(&current));
        }
        match registry.get_class_mirror(&current) {
            Ok(mirror) => next = mirror.super_type().cloned(),
            Err(error) if is_type_not_found(&error) => {}
            Err(error) => return Err(error),
        }
        chain.push(current);
    }
    Ok(chain)
}

fn cyclic_chain(ty: &ObjectType) -> anyhow::Error {
    GripError::MalformedClass(format!("superclass chain of {ty} is cyclic")).into()
}

fn is_type_not_found(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<GripError>(),
            Some(GripError::TypeNotFound(_))
        )
    })
}
