use std::rc::Rc;

use anyhow::{Context, Result};
use tracing::trace;

use crate::annotation_reader::{read_annotation, read_value, Visibility};
use crate::class_registry::RegistryHandle;
use crate::classfile::{
    AnnotationNode, ClassHeader as HeaderNode, ClassReader, ClassVisitor, ConstantValueNode,
    EnclosingMethodNode, FieldNode, InnerClassNode, MethodNode, ReadOptions,
};
use crate::error::GripError;
use crate::lazy::Deferred;
use crate::mirrors::{
    AnnotationCollection, ClassDetails, ClassGenerics, ClassHeader, ClassMirror,
    ClassMirrorBuilder, Enclosure, FieldMirror, FieldValue, InnerClass, MethodGenerics,
    MethodMirror, MethodParameterMirror,
};
use crate::signature::{
    read_generic_type, read_method_signature, GenericType, MethodSignatureMirror,
};
use crate::types::{MethodType, ObjectType, Type};

/// Turns class file bytes into a [`ClassMirror`].
pub trait Reflector {
    /// In annotation mode only the class annotations and element defaults
    /// are read, eagerly. Otherwise the header is read now and the rest on
    /// first access.
    fn reflect(
        &self,
        data: Vec<u8>,
        registry: RegistryHandle,
        for_annotation: bool,
    ) -> Result<ClassMirror>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultReflector;

impl Reflector for DefaultReflector {
    fn reflect(
        &self,
        data: Vec<u8>,
        registry: RegistryHandle,
        for_annotation: bool,
    ) -> Result<ClassMirror> {
        let reader = ClassReader::new(data)?;
        trace!(class = reader.class_name(), for_annotation, "reflecting class");
        if for_annotation {
            let mut visitor = MirrorVisitor::new(registry, ReadOptions::for_annotation());
            reader.accept(&mut visitor, ReadOptions::for_annotation())?;
            return visitor.builder.build();
        }

        let header = ClassHeader {
            version: reader.version(),
            access: reader.access(),
            ty: ObjectType::new(reader.class_name()),
            super_type: reader.super_name().map(ObjectType::new),
            interfaces: reader.interfaces().iter().map(ObjectType::new).collect(),
        };
        let ty = header.ty.clone();
        let reader = Rc::new(reader);
        let details = Deferred::new(move || {
            read_details(&reader, &registry)
                .with_context(|| GripError::UnableToReadClassMirror(ty.to_string()))
        });
        Ok(ClassMirror::unparsed(header, details))
    }
}

fn read_details(reader: &ClassReader, registry: &RegistryHandle) -> Result<ClassDetails> {
    let options = ReadOptions::default();
    let mut visitor = MirrorVisitor::new(registry.clone(), options);
    reader.accept(&mut visitor, options)?;
    visitor.builder.build_details()
}

/// Feeds class file events into a [`ClassMirrorBuilder`].
struct MirrorVisitor {
    registry: RegistryHandle,
    options: ReadOptions,
    builder: ClassMirrorBuilder,
}

impl MirrorVisitor {
    fn new(registry: RegistryHandle, options: ReadOptions) -> Self {
        let builder = ClassMirrorBuilder::new(registry.clone());
        Self {
            registry,
            options,
            builder,
        }
    }

    fn annotations(&self, nodes: &[(AnnotationNode, bool)]) -> Result<AnnotationCollection> {
        if nodes.is_empty() {
            return Ok(AnnotationCollection::default());
        }
        let registry = self.registry.get()?;
        let annotations = nodes
            .iter()
            .map(|(node, visible)| {
                read_annotation(node, Visibility::Attribute(*visible), registry.as_ref())
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(AnnotationCollection::new(annotations))
    }

    /// One parameter per argument. Compilers may omit leading synthetic
    /// parameters from the annotation table, so entries align to the end.
    fn parameters(
        &self,
        method_type: &MethodType,
        nodes: &[Vec<AnnotationNode>],
    ) -> Result<Vec<MethodParameterMirror>> {
        let arguments = method_type.argument_types();
        let offset = arguments.len().saturating_sub(nodes.len());
        let mut parameters = Vec::with_capacity(arguments.len());
        for (index, argument) in arguments.iter().enumerate() {
            let annotations = match index.checked_sub(offset).and_then(|slot| nodes.get(slot)) {
                Some(nodes) if !nodes.is_empty() => {
                    let nodes = nodes
                        .iter()
                        .map(|node| (node.clone(), true))
                        .collect::<Vec<_>>();
                    self.annotations(&nodes)?
                }
                _ => AnnotationCollection::default(),
            };
            parameters.push(MethodParameterMirror::new(
                index,
                argument.clone(),
                annotations,
            ));
        }
        Ok(parameters)
    }
}

impl ClassVisitor for MirrorVisitor {
    fn visit_header(&mut self, header: &HeaderNode<'_>) -> Result<()> {
        self.builder.header(
            ClassHeader {
                version: header.version,
                access: header.access,
                ty: ObjectType::new(header.name),
                super_type: header.super_name.map(ObjectType::new),
                interfaces: header.interfaces.iter().map(ObjectType::new).collect(),
            },
            header.signature.map(str::to_string),
        );
        Ok(())
    }

    fn visit_inner_class(&mut self, inner: InnerClassNode) -> Result<()> {
        self.builder.inner_class(InnerClass {
            ty: ObjectType::new(inner.name),
            outer_type: inner.outer_name.map(ObjectType::new),
            inner_name: inner.inner_name,
            access: inner.access,
        });
        Ok(())
    }

    fn visit_enclosing_method(&mut self, enclosing: EnclosingMethodNode) -> Result<()> {
        let enclosing_type = ObjectType::new(enclosing.owner);
        let enclosure = match enclosing.method {
            Some((method_name, descriptor)) => Enclosure::Method {
                enclosing_type,
                method_name,
                method_type: MethodType::parse(&descriptor)?,
            },
            None => Enclosure::Initializer { enclosing_type },
        };
        self.builder.enclosure(enclosure);
        Ok(())
    }

    fn visit_source(&mut self, source: Option<&str>, debug: Option<&str>) -> Result<()> {
        self.builder
            .source(source.map(str::to_string), debug.map(str::to_string));
        Ok(())
    }

    fn visit_annotation(&mut self, annotation: AnnotationNode, visible: bool) -> Result<()> {
        let registry = self.registry.get()?;
        let mirror = read_annotation(
            &annotation,
            Visibility::Attribute(visible),
            registry.as_ref(),
        )?;
        self.builder.annotation(mirror);
        Ok(())
    }

    fn visit_field(&mut self, field: FieldNode) -> Result<()> {
        if self.options.skip_fields {
            return Ok(());
        }
        let ty = Type::parse(&field.descriptor)?;
        let annotations = self.annotations(&field.annotations)?;
        let generic_type = match field.signature {
            Some(signature) => {
                let generics = self.builder.generics();
                Deferred::new(move || {
                    read_generic_type(&signature, &class_generics(&generics)?.declaration)
                })
            }
            None => Deferred::ready(GenericType::Raw(ty.clone())),
        };
        let value = field.value.map(|value| match value {
            ConstantValueNode::Int(value) => FieldValue::Int(value),
            ConstantValueNode::Long(value) => FieldValue::Long(value),
            ConstantValueNode::Float(value) => FieldValue::Float(value),
            ConstantValueNode::Double(value) => FieldValue::Double(value),
            ConstantValueNode::String(value) => FieldValue::String(value),
        });
        self.builder.field(FieldMirror::new(
            field.access,
            field.name,
            ty,
            value,
            annotations,
            generic_type,
        ));
        Ok(())
    }

    fn visit_method(&mut self, method: MethodNode) -> Result<()> {
        let method_type = MethodType::parse(&method.descriptor)?;
        let exceptions = method
            .exceptions
            .iter()
            .map(ObjectType::new)
            .collect::<Vec<_>>();
        let annotations = self.annotations(&method.annotations)?;
        let parameters = self.parameters(&method_type, &method.parameter_annotations)?;
        let default_value = match &method.annotation_default {
            Some(value) => {
                let registry = self.registry.get()?;
                Some(read_value(value, Visibility::Retention, registry.as_ref())?)
            }
            None => None,
        };

        let generics = self.builder.generics();
        let signature = method.signature;
        let raw_type = method_type.clone();
        let raw_exceptions = exceptions.clone();
        let method_generics = Deferred::new(move || {
            let class_declaration = &class_generics(&generics)?.declaration;
            let signature = match &signature {
                Some(signature) => {
                    let parsed = read_method_signature(signature, class_declaration)?;
                    if parsed.exception_types().is_empty() && !raw_exceptions.is_empty() {
                        MethodSignatureMirror::new(
                            parsed.type_variables().to_vec(),
                            parsed.parameter_types().to_vec(),
                            parsed.return_type().clone(),
                            raw_exception_types(&raw_exceptions),
                        )
                    } else {
                        parsed
                    }
                }
                None => MethodSignatureMirror::from_raw(&raw_type, &raw_exceptions),
            };
            let declaration = class_declaration.with(signature.type_variables());
            Ok(MethodGenerics {
                signature,
                declaration,
            })
        });

        self.builder.method(MethodMirror::new(
            method.access,
            method.name,
            method_type,
            exceptions,
            annotations,
            parameters,
            default_value,
            method_generics,
        ));
        Ok(())
    }
}

fn class_generics(generics: &Deferred<ClassGenerics>) -> Result<&ClassGenerics> {
    generics.get()
}

fn raw_exception_types(exceptions: &[ObjectType]) -> Vec<GenericType> {
    exceptions
        .iter()
        .map(|exception| GenericType::Raw(Type::Object(exception.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Weak;

    use super::*;
    use crate::class_registry::ClassRegistry;
    use crate::mirrors::{AnnotationMirror, AnnotationValue, Element, DEFAULT_ELEMENT};
    use crate::signature::TypeVariable;
    use crate::test_support::{ClassFileBuilder, ElementSpec};
    use crate::types::PrimitiveType;

    /// Registry over in-memory class files, parsed with [`DefaultReflector`].
    struct MemoryRegistry {
        this: Weak<MemoryRegistry>,
        classes: HashMap<String, Vec<u8>>,
        cache: RefCell<HashMap<ObjectType, Rc<ClassMirror>>>,
    }

    impl MemoryRegistry {
        fn new(classes: Vec<(&str, Vec<u8>)>) -> Rc<Self> {
            Rc::new_cyclic(|this| Self {
                this: this.clone(),
                classes: classes
                    .into_iter()
                    .map(|(name, bytes)| (name.to_string(), bytes))
                    .collect(),
                cache: RefCell::new(HashMap::new()),
            })
        }

        fn handle(&self) -> RegistryHandle {
            let registry: Weak<dyn ClassRegistry> = self.this.clone();
            RegistryHandle::new(registry)
        }
    }

    impl ClassRegistry for MemoryRegistry {
        fn get_class_mirror(&self, ty: &ObjectType) -> Result<Rc<ClassMirror>> {
            if let Some(mirror) = self.cache.borrow().get(ty) {
                return Ok(Rc::clone(mirror));
            }
            let bytes = self
                .classes
                .get(ty.internal_name())
                .cloned()
                .ok_or_else(|| GripError::TypeNotFound(ty.to_string()))?;
            let mirror = Rc::new(DefaultReflector.reflect(bytes, self.handle(), false)?);
            self.cache
                .borrow_mut()
                .insert(ty.clone(), Rc::clone(&mirror));
            Ok(mirror)
        }

        fn get_annotation_mirror(&self, ty: &ObjectType) -> Result<Rc<AnnotationMirror>> {
            Ok(Rc::new(AnnotationMirror::unresolved(ty.clone())))
        }
    }

    fn reflect(registry: &Rc<MemoryRegistry>, name: &str) -> Rc<ClassMirror> {
        registry
            .get_class_mirror(&ObjectType::new(name))
            .expect("class mirror")
    }

    #[test]
    fn separates_constructors_from_methods() {
        let mut builder = ClassFileBuilder::new("com/example/Service", "java/lang/Object");
        builder.method(0x0001, "<init>", "()V");
        builder.method(0x0001, "<init>", "(I)V");
        builder.method(0x0008, "<clinit>", "()V");
        let run = builder.method(0x0001, "run", "(Ljava/lang/String;J)Z");
        builder.method_exceptions(run, &["java/io/IOException"]);
        builder.source_file("Service.java");
        let registry = MemoryRegistry::new(vec![("com/example/Service", builder.finish())]);
        let mirror = reflect(&registry, "com/example/Service");

        assert_eq!(mirror.constructors().expect("constructors").len(), 2);
        assert!(mirror.default_constructor().expect("lookup").is_some());
        assert!(mirror.static_initializer().expect("lookup").is_some());
        let methods = mirror.methods().expect("methods");
        assert_eq!(methods.len(), 2);
        let run = methods
            .iter()
            .find(|method| method.name() == "run")
            .expect("run");
        assert!(run.is_public());
        assert_eq!(run.parameters().len(), 2);
        assert_eq!(run.parameters()[1].index(), 1);
        assert_eq!(
            run.parameters()[1].ty(),
            &Type::Primitive(PrimitiveType::Long)
        );
        assert_eq!(run.exceptions(), &[ObjectType::new("java/io/IOException")]);
        let signature = run.signature().expect("signature");
        assert_eq!(signature.exception_types().len(), 1);
        assert_eq!(mirror.source().expect("source"), Some("Service.java"));
        assert_eq!(mirror.name().expect("name"), "com.example.Service");
        assert_eq!(mirror.simple_name().expect("simple name"), "Service");
    }

    #[test]
    fn exposes_header_before_parsing_members() {
        let mut builder = ClassFileBuilder::new("com/example/List", "java/lang/Object");
        builder.interface("java/lang/Iterable");
        builder.major_version(61);
        let registry = MemoryRegistry::new(vec![("com/example/List", builder.finish())]);
        let mirror = reflect(&registry, "com/example/List");
        assert_eq!(mirror.version(), 61);
        assert_eq!(mirror.interfaces(), &[ObjectType::new("java/lang/Iterable")]);
        assert!(!mirror.is_materialized());
        mirror.fields().expect("fields");
        assert!(mirror.is_materialized());
    }

    #[test]
    fn reads_field_constants_and_annotations() {
        let mut builder = ClassFileBuilder::new("com/example/Constants", "java/lang/Object");
        let limit = builder.field(0x0019, "LIMIT", "J");
        builder.field_constant(limit, ElementSpec::Long(10));
        let name = builder.field(0x0019, "NAME", "Ljava/lang/String;");
        builder.field_constant(name, ElementSpec::String("grip"));
        builder.field_annotation(
            name,
            "Lcom/example/Marker;",
            false,
            vec![("value", ElementSpec::Int(7))],
        );
        let registry = MemoryRegistry::new(vec![("com/example/Constants", builder.finish())]);
        let mirror = reflect(&registry, "com/example/Constants");
        let fields = mirror.fields().expect("fields");
        assert_eq!(fields[0].value(), Some(&FieldValue::Long(10)));
        assert!(fields[0].is_static() && fields[0].is_final());
        assert_eq!(fields[1].value(), Some(&FieldValue::String("grip".to_string())));
        let marker = fields[1]
            .annotations()
            .get(&ObjectType::new("com/example/Marker"))
            .expect("marker");
        assert!(!marker.visible());
        assert!(!marker.resolved());
        assert_eq!(marker.value(DEFAULT_ELEMENT), Some(&AnnotationValue::Int(7)));
        assert_eq!(
            fields[1].generic_type().expect("generic type"),
            &GenericType::Raw(Type::object("java/lang/String"))
        );
    }

    #[test]
    fn aligns_parameter_annotations_to_the_end() {
        let mut builder = ClassFileBuilder::new("com/example/Outer$Inner", "java/lang/Object");
        let constructor = builder.method(0x0001, "<init>", "(Lcom/example/Outer;I)V");
        builder.method_parameter_annotations(
            constructor,
            vec![vec![("Lcom/example/Positive;", Vec::new())]],
        );
        let registry = MemoryRegistry::new(vec![("com/example/Outer$Inner", builder.finish())]);
        let mirror = reflect(&registry, "com/example/Outer$Inner");
        let constructor = &mirror.constructors().expect("constructors")[0];
        let parameters = constructor.parameters();
        assert_eq!(parameters.len(), 2);
        assert!(parameters[0].annotations().is_empty());
        assert!(parameters[1]
            .annotations()
            .contains(&ObjectType::new("com/example/Positive")));
    }

    #[test]
    fn names_nested_and_local_classes() {
        let mut nested = ClassFileBuilder::new("com/example/Outer$Inner", "java/lang/Object");
        nested.inner_class(
            "com/example/Outer$Inner",
            Some("com/example/Outer"),
            Some("Inner"),
            0x0009,
        );
        let mut local = ClassFileBuilder::new("com/example/Outer$1Local", "java/lang/Object");
        local.enclosing_method("com/example/Outer", Some(("run", "()V")));
        local.inner_class("com/example/Outer$1Local", None, Some("Local"), 0);
        let mut outer = ClassFileBuilder::new("com/example/Outer", "java/lang/Object");
        outer.inner_class(
            "com/example/Outer$Inner",
            Some("com/example/Outer"),
            Some("Inner"),
            0x0009,
        );
        outer.method(0x0001, "run", "()V");
        let registry = MemoryRegistry::new(vec![
            ("com/example/Outer$Inner", nested.finish()),
            ("com/example/Outer$1Local", local.finish()),
            ("com/example/Outer", outer.finish()),
        ]);

        let nested = reflect(&registry, "com/example/Outer$Inner");
        assert_eq!(nested.name().expect("name"), "com.example.Outer.Inner");
        assert_eq!(nested.simple_name().expect("simple name"), "Inner");
        assert_eq!(
            nested.declaring_type().expect("declaring type"),
            Some(&ObjectType::new("com/example/Outer"))
        );

        let local = reflect(&registry, "com/example/Outer$1Local");
        assert_eq!(local.simple_name().expect("simple name"), "Local");
        assert_eq!(
            local.enclosing_type().expect("enclosing type"),
            Some(&ObjectType::new("com/example/Outer"))
        );
        assert!(matches!(
            local.enclosure().expect("enclosure"),
            Enclosure::Method { method_name, .. } if method_name == "run"
        ));

        let outer = reflect(&registry, "com/example/Outer");
        assert_eq!(
            outer.types().expect("types"),
            &[ObjectType::new("com/example/Outer$Inner")]
        );
    }

    #[test]
    fn field_signature_resolves_class_type_variable() {
        let mut builder = ClassFileBuilder::new("com/example/Box", "java/lang/Object");
        builder.signature("<T:Ljava/lang/Number;>Ljava/lang/Object;");
        let value = builder.field(0x0002, "value", "Ljava/lang/Number;");
        builder.field_signature(value, "TT;");
        let get = builder.method(0x0001, "map", "(Ljava/lang/Object;)Ljava/lang/Object;");
        builder.method_signature(get, "<R:Ljava/lang/Object;>(TR;)TT;");
        let registry = MemoryRegistry::new(vec![("com/example/Box", builder.finish())]);
        let mirror = reflect(&registry, "com/example/Box");

        let declared = Rc::clone(&mirror.signature().expect("signature").type_variables()[0]);
        let field_type = mirror.fields().expect("fields")[0]
            .generic_type()
            .expect("field type");
        match field_type {
            GenericType::TypeVariable(variable) => assert!(Rc::ptr_eq(variable, &declared)),
            other => panic!("expected a type variable, got {other:?}"),
        }
        assert_eq!(
            declared.class_bound(),
            &GenericType::Raw(Type::object("java/lang/Number"))
        );

        let map = &mirror.methods().expect("methods")[0];
        let declaration = map.generic_declaration().expect("declaration");
        let names: Vec<_> = declaration
            .type_variables()
            .iter()
            .map(|variable| variable.name())
            .collect();
        assert_eq!(names, ["T", "R"]);
        assert_eq!(
            map.signature().expect("signature").return_type(),
            &GenericType::TypeVariable(declared)
        );
    }

    #[test]
    fn undeclared_type_variable_fails_field_signature() {
        let mut builder = ClassFileBuilder::new("com/example/Broken", "java/lang/Object");
        let value = builder.field(0x0002, "value", "Ljava/lang/Object;");
        builder.field_signature(value, "TU;");
        let registry = MemoryRegistry::new(vec![("com/example/Broken", builder.finish())]);
        let mirror = reflect(&registry, "com/example/Broken");
        let error = mirror.fields().expect("fields")[0]
            .generic_type()
            .expect_err("undeclared variable");
        assert!(matches!(
            GripError::kind_of(&error),
            Some(GripError::MalformedSignature { .. })
        ));
    }

    #[test]
    fn local_class_inherits_enclosing_method_variables() {
        let mut outer = ClassFileBuilder::new("com/example/Outer", "java/lang/Object");
        outer.signature("<T:Ljava/lang/Object;>Ljava/lang/Object;");
        let make = outer.method(0x0001, "make", "()Ljava/lang/Object;");
        outer.method_signature(make, "<M:Ljava/lang/Object;>()TM;");
        let mut local = ClassFileBuilder::new("com/example/Outer$1Local", "java/lang/Object");
        local.enclosing_method("com/example/Outer", Some(("make", "()Ljava/lang/Object;")));
        let both = local.field(0x0002, "both", "Ljava/util/Map;");
        local.field_signature(both, "Ljava/util/Map<TT;TM;>;");
        let registry = MemoryRegistry::new(vec![
            ("com/example/Outer", outer.finish()),
            ("com/example/Outer$1Local", local.finish()),
        ]);
        let local = reflect(&registry, "com/example/Outer$1Local");
        let field_type = local.fields().expect("fields")[0]
            .generic_type()
            .expect("field type");
        assert_eq!(field_type.to_string(), "java.util.Map<T, M>");
        let names: Vec<_> = local
            .generic_declaration()
            .expect("declaration")
            .type_variables()
            .iter()
            .map(|variable| variable.name().to_string())
            .collect();
        assert_eq!(names, ["T", "M"]);
    }

    #[test]
    fn annotation_mode_keeps_defaults_only() {
        let mut builder = ClassFileBuilder::new("com/example/Tag", "java/lang/Object");
        builder.access(0x2601);
        builder.field(0x0019, "IGNORED", "I");
        let value = builder.method(0x0401, "value", "()Ljava/lang/String;");
        builder.method_default(value, ElementSpec::String("hello"));
        builder.method_annotation(value, "Lcom/example/Doc;", true, Vec::new());
        let registry = MemoryRegistry::new(Vec::new());
        let mirror = DefaultReflector
            .reflect(builder.finish(), registry.handle(), true)
            .expect("annotation mirror");
        assert!(mirror.is_materialized());
        assert!(mirror.fields().expect("fields").is_empty());
        let method = &mirror.methods().expect("methods")[0];
        assert!(method.annotations().is_empty());
        assert_eq!(
            method.default_value(),
            Some(&AnnotationValue::String("hello".to_string()))
        );
    }

    #[test]
    fn unbounded_variables_display_by_name() {
        let variable = GenericType::TypeVariable(Rc::new(TypeVariable::unbounded("E")));
        assert_eq!(variable.to_string(), "E");
    }
}
