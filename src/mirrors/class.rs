use std::fmt;
use std::rc::Rc;

use anyhow::{Context, Result};

use crate::class_registry::RegistryHandle;
use crate::error::GripError;
use crate::lazy::Deferred;
use crate::mirrors::access::Element;
use crate::mirrors::annotation::{AnnotationCollection, AnnotationMirror};
use crate::mirrors::field::FieldMirror;
use crate::mirrors::method::MethodMirror;
use crate::signature::{read_class_signature, ClassSignatureMirror, GenericDeclaration};
use crate::types::{MethodType, ObjectType};

/// Where a local or anonymous class was declared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Enclosure {
    None,
    /// Declared in an initializer of `enclosing_type`.
    Initializer { enclosing_type: ObjectType },
    Method {
        enclosing_type: ObjectType,
        method_name: String,
        method_type: MethodType,
    },
}

impl Enclosure {
    pub fn enclosing_type(&self) -> Option<&ObjectType> {
        match self {
            Enclosure::None => None,
            Enclosure::Initializer { enclosing_type } | Enclosure::Method { enclosing_type, .. } => {
                Some(enclosing_type)
            }
        }
    }
}

/// Entry of the `InnerClasses` table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InnerClass {
    pub ty: ObjectType,
    pub outer_type: Option<ObjectType>,
    pub inner_name: Option<String>,
    pub access: u16,
}

/// Class signature and the type variables visible inside the class.
#[derive(Clone, Debug)]
pub(crate) struct ClassGenerics {
    pub(crate) signature: ClassSignatureMirror,
    pub(crate) declaration: GenericDeclaration,
}

/// Everything about a class that needs a full pass over its members.
pub(crate) struct ClassDetails {
    name: String,
    simple_name: String,
    declaring_type: Option<ObjectType>,
    enclosure: Enclosure,
    inner_classes: Vec<InnerClass>,
    types: Vec<ObjectType>,
    source: Option<String>,
    debug: Option<String>,
    annotations: AnnotationCollection,
    fields: Vec<FieldMirror>,
    constructors: Vec<MethodMirror>,
    methods: Vec<MethodMirror>,
    generics: Rc<Deferred<ClassGenerics>>,
}

enum ClassState {
    Parsed(Box<ClassDetails>),
    Unparsed(Deferred<ClassDetails>),
}

/// Reflected class.
///
/// The header is always available; the rest comes from [`ClassDetails`],
/// which an unparsed mirror reads on first access.
pub struct ClassMirror {
    version: u32,
    access: u16,
    ty: ObjectType,
    super_type: Option<ObjectType>,
    interfaces: Vec<ObjectType>,
    state: ClassState,
}

/// Eagerly known part of a class.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ClassHeader {
    pub(crate) version: u32,
    pub(crate) access: u16,
    pub(crate) ty: ObjectType,
    pub(crate) super_type: Option<ObjectType>,
    pub(crate) interfaces: Vec<ObjectType>,
}

impl ClassMirror {
    pub(crate) fn parsed(header: ClassHeader, details: ClassDetails) -> Self {
        Self::with_state(header, ClassState::Parsed(Box::new(details)))
    }

    pub(crate) fn unparsed(header: ClassHeader, details: Deferred<ClassDetails>) -> Self {
        Self::with_state(header, ClassState::Unparsed(details))
    }

    fn with_state(header: ClassHeader, state: ClassState) -> Self {
        Self {
            version: header.version,
            access: header.access,
            ty: header.ty,
            super_type: header.super_type,
            interfaces: header.interfaces,
            state,
        }
    }

    /// `minor << 16 | major`.
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn ty(&self) -> &ObjectType {
        &self.ty
    }

    /// Absent only for `java/lang/Object`.
    pub fn super_type(&self) -> Option<&ObjectType> {
        self.super_type.as_ref()
    }

    pub fn interfaces(&self) -> &[ObjectType] {
        &self.interfaces
    }

    /// Whether the member pass has already run.
    pub fn is_materialized(&self) -> bool {
        match &self.state {
            ClassState::Parsed(_) => true,
            ClassState::Unparsed(details) => details.is_materialized(),
        }
    }

    pub(crate) fn details(&self) -> Result<&ClassDetails> {
        match &self.state {
            ClassState::Parsed(details) => Ok(details),
            ClassState::Unparsed(details) => details.get(),
        }
    }

    /// Dotted binary name with nested classes joined by `.`.
    pub fn name(&self) -> Result<&str> {
        Ok(&self.details()?.name)
    }

    pub fn simple_name(&self) -> Result<&str> {
        Ok(&self.details()?.simple_name)
    }

    pub fn declaring_type(&self) -> Result<Option<&ObjectType>> {
        Ok(self.details()?.declaring_type.as_ref())
    }

    /// Enclosing method's owner, otherwise the declaring type.
    pub fn enclosing_type(&self) -> Result<Option<&ObjectType>> {
        let details = self.details()?;
        Ok(details
            .enclosure
            .enclosing_type()
            .or(details.declaring_type.as_ref()))
    }

    pub fn enclosure(&self) -> Result<&Enclosure> {
        Ok(&self.details()?.enclosure)
    }

    pub fn inner_classes(&self) -> Result<&[InnerClass]> {
        Ok(&self.details()?.inner_classes)
    }

    /// Member types declared inside this class.
    pub fn types(&self) -> Result<&[ObjectType]> {
        Ok(&self.details()?.types)
    }

    pub fn source(&self) -> Result<Option<&str>> {
        Ok(self.details()?.source.as_deref())
    }

    pub fn debug(&self) -> Result<Option<&str>> {
        Ok(self.details()?.debug.as_deref())
    }

    pub fn annotations(&self) -> Result<&AnnotationCollection> {
        Ok(&self.details()?.annotations)
    }

    pub fn fields(&self) -> Result<&[FieldMirror]> {
        Ok(&self.details()?.fields)
    }

    pub fn constructors(&self) -> Result<&[MethodMirror]> {
        Ok(&self.details()?.constructors)
    }

    pub fn methods(&self) -> Result<&[MethodMirror]> {
        Ok(&self.details()?.methods)
    }

    pub fn default_constructor(&self) -> Result<Option<&MethodMirror>> {
        Ok(self
            .constructors()?
            .iter()
            .find(|constructor| constructor.is_default_constructor()))
    }

    pub fn static_initializer(&self) -> Result<Option<&MethodMirror>> {
        Ok(self
            .methods()?
            .iter()
            .find(|method| method.is_static_initializer()))
    }

    pub fn signature(&self) -> Result<&ClassSignatureMirror> {
        Ok(&self.details()?.generics.get()?.signature)
    }

    /// Inherited type variables with the class's own layered on top.
    pub fn generic_declaration(&self) -> Result<&GenericDeclaration> {
        Ok(&self.details()?.generics.get()?.declaration)
    }
}

impl Element for ClassMirror {
    fn access(&self) -> u16 {
        self.access
    }
}

impl fmt::Debug for ClassMirror {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassMirror")
            .field("ty", &self.ty)
            .field("super_type", &self.super_type)
            .field("materialized", &self.is_materialized())
            .finish()
    }
}

/// Type variables a class inherits from its lexical context.
#[derive(Clone, Debug)]
enum EnclosingScope {
    None,
    Class(ObjectType),
    Method {
        owner: ObjectType,
        name: String,
        ty: MethodType,
    },
}

impl EnclosingScope {
    fn resolve(&self, registry: &RegistryHandle) -> Result<GenericDeclaration> {
        match self {
            EnclosingScope::None => Ok(GenericDeclaration::default()),
            EnclosingScope::Class(owner) => {
                let mirror = registry.get()?.get_class_mirror(owner)?;
                let declaration = mirror
                    .generic_declaration()
                    .with_context(|| GripError::UnableToReadClassMirror(owner.to_string()))?;
                Ok(declaration.clone())
            }
            EnclosingScope::Method { owner, name, ty } => {
                let mirror = registry.get()?.get_class_mirror(owner)?;
                let method = mirror
                    .methods()?
                    .iter()
                    .chain(mirror.constructors()?)
                    .find(|method| method.matches(name, ty));
                let declaration = match method {
                    Some(method) => method.generic_declaration(),
                    None => mirror.generic_declaration(),
                };
                let declaration = declaration
                    .with_context(|| GripError::UnableToReadClassMirror(owner.to_string()))?;
                Ok(declaration.clone())
            }
        }
    }
}

/// Accumulates reflector callbacks for one class.
pub(crate) struct ClassMirrorBuilder {
    registry: RegistryHandle,
    header: Option<ClassHeader>,
    signature: Option<String>,
    inner_classes: Vec<InnerClass>,
    enclosure: Enclosure,
    source: Option<String>,
    debug: Option<String>,
    annotations: AnnotationCollection,
    fields: Vec<FieldMirror>,
    constructors: Vec<MethodMirror>,
    methods: Vec<MethodMirror>,
    generics: Option<Rc<Deferred<ClassGenerics>>>,
}

impl ClassMirrorBuilder {
    pub(crate) fn new(registry: RegistryHandle) -> Self {
        Self {
            registry,
            header: None,
            signature: None,
            inner_classes: Vec::new(),
            enclosure: Enclosure::None,
            source: None,
            debug: None,
            annotations: AnnotationCollection::default(),
            fields: Vec::new(),
            constructors: Vec::new(),
            methods: Vec::new(),
            generics: None,
        }
    }

    pub(crate) fn header(&mut self, header: ClassHeader, signature: Option<String>) {
        self.header = Some(header);
        self.signature = signature;
    }

    pub(crate) fn ty(&self) -> Option<&ObjectType> {
        self.header.as_ref().map(|header| &header.ty)
    }

    pub(crate) fn inner_class(&mut self, inner_class: InnerClass) {
        self.inner_classes.push(inner_class);
    }

    pub(crate) fn enclosure(&mut self, enclosure: Enclosure) {
        self.enclosure = enclosure;
    }

    pub(crate) fn source(&mut self, source: Option<String>, debug: Option<String>) {
        self.source = source;
        self.debug = debug;
    }

    pub(crate) fn annotation(&mut self, annotation: AnnotationMirror) {
        self.annotations.insert(annotation);
    }

    pub(crate) fn field(&mut self, field: FieldMirror) {
        self.fields.push(field);
    }

    pub(crate) fn method(&mut self, method: MethodMirror) {
        if method.is_constructor() {
            self.constructors.push(method);
        } else {
            self.methods.push(method);
        }
    }

    /// Shared generic scope of the class, created on first use so that the
    /// header, inner-class table and enclosure are already known.
    pub(crate) fn generics(&mut self) -> Rc<Deferred<ClassGenerics>> {
        if let Some(generics) = &self.generics {
            return Rc::clone(generics);
        }
        let scope = self.enclosing_scope();
        let registry = self.registry.clone();
        let signature = self.signature.clone();
        let (super_type, interfaces) = match &self.header {
            Some(header) => (header.super_type.clone(), header.interfaces.clone()),
            None => (None, Vec::new()),
        };
        let generics = Rc::new(Deferred::new(move || {
            let inherited = scope.resolve(&registry)?;
            let signature = match &signature {
                Some(signature) => read_class_signature(signature, &inherited)?,
                None => ClassSignatureMirror::from_raw(super_type.as_ref(), &interfaces),
            };
            let declaration = inherited.with(signature.type_variables());
            Ok(ClassGenerics {
                signature,
                declaration,
            })
        }));
        self.generics = Some(Rc::clone(&generics));
        generics
    }

    fn enclosing_scope(&self) -> EnclosingScope {
        match &self.enclosure {
            Enclosure::Method {
                enclosing_type,
                method_name,
                method_type,
            } => EnclosingScope::Method {
                owner: enclosing_type.clone(),
                name: method_name.clone(),
                ty: method_type.clone(),
            },
            Enclosure::Initializer { enclosing_type } => {
                EnclosingScope::Class(enclosing_type.clone())
            }
            Enclosure::None => match self.declaring_type() {
                Some(outer) => EnclosingScope::Class(outer),
                None => EnclosingScope::None,
            },
        }
    }

    fn declaring_type(&self) -> Option<ObjectType> {
        let ty = self.ty()?;
        self.inner_classes
            .iter()
            .find(|inner_class| &inner_class.ty == ty)
            .and_then(|inner_class| inner_class.outer_type.clone())
    }

    fn binary_name(&self, ty: &ObjectType) -> String {
        let mut segments = Vec::new();
        let mut current = ty.clone();
        // Bounded by the table size so that a cyclic table cannot loop.
        while segments.len() < self.inner_classes.len() {
            let entry = self
                .inner_classes
                .iter()
                .find(|inner_class| inner_class.ty == current);
            match entry {
                Some(InnerClass {
                    outer_type: Some(outer),
                    inner_name: Some(inner_name),
                    ..
                }) => {
                    segments.push(inner_name.clone());
                    current = outer.clone();
                }
                _ => break,
            }
        }
        segments.push(current.class_name());
        segments.reverse();
        segments.join(".")
    }

    fn simple_name(&self, ty: &ObjectType) -> String {
        let internal_name = ty.internal_name();
        if let Some(enclosing_type) = self.enclosure.enclosing_type() {
            return internal_name
                .strip_prefix(enclosing_type.internal_name())
                .unwrap_or(internal_name)
                .trim_start_matches(|c: char| c == '$' || c.is_ascii_digit())
                .to_string();
        }
        let inner_name = self
            .inner_classes
            .iter()
            .find(|inner_class| &inner_class.ty == ty)
            .and_then(|inner_class| inner_class.inner_name.clone());
        match inner_name {
            Some(inner_name) => inner_name,
            None => internal_name
                .rsplit('/')
                .next()
                .unwrap_or(internal_name)
                .to_string(),
        }
    }

    fn member_types(&self, ty: &ObjectType) -> Vec<ObjectType> {
        self.inner_classes
            .iter()
            .filter(|inner_class| inner_class.outer_type.as_ref() == Some(ty))
            .map(|inner_class| inner_class.ty.clone())
            .collect()
    }

    fn cloned_header(&self) -> Result<ClassHeader> {
        match &self.header {
            Some(header) => Ok(header.clone()),
            None => Err(
                GripError::MalformedClass("class header was never visited".to_string()).into(),
            ),
        }
    }

    pub(crate) fn build_details(mut self) -> Result<ClassDetails> {
        let ty = self.cloned_header()?.ty;
        let generics = self.generics();
        let name = self.binary_name(&ty);
        let simple_name = self.simple_name(&ty);
        let types = self.member_types(&ty);
        let declaring_type = self.declaring_type();
        Ok(ClassDetails {
            name,
            simple_name,
            declaring_type,
            enclosure: self.enclosure,
            inner_classes: self.inner_classes,
            types,
            source: self.source,
            debug: self.debug,
            annotations: self.annotations,
            fields: self.fields,
            constructors: self.constructors,
            methods: self.methods,
            generics,
        })
    }

    pub(crate) fn build(self) -> Result<ClassMirror> {
        let header = self.cloned_header()?;
        let details = self.build_details()?;
        Ok(ClassMirror::parsed(header, details))
    }
}
