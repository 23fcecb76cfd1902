use std::fs;
use std::path::{Path, PathBuf};

pub(crate) const RETENTION: &str = "Ljava/lang/annotation/Retention;";
pub(crate) const RETENTION_POLICY: &str = "Ljava/lang/annotation/RetentionPolicy;";

/// Annotation element value for generated class files.
#[derive(Clone, Debug)]
pub(crate) enum ElementSpec {
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(&'static str),
    Enum(&'static str, &'static str),
    Class(&'static str),
    Annotation(&'static str, Vec<(&'static str, ElementSpec)>),
    Array(Vec<ElementSpec>),
}

pub(crate) type AnnotationSpec = (&'static str, Vec<(&'static str, ElementSpec)>);

enum CpEntry {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    NameAndType(u16, u16),
    /// Second slot of a long or double.
    Gap,
}

impl CpEntry {
    fn write(&self, out: &mut Vec<u8>) {
        match self {
            CpEntry::Utf8(value) => {
                out.push(1);
                write_u16(out, value.len() as u16);
                out.extend_from_slice(value.as_bytes());
            }
            CpEntry::Integer(value) => {
                out.push(3);
                write_u32(out, *value as u32);
            }
            CpEntry::Float(value) => {
                out.push(4);
                write_u32(out, value.to_bits());
            }
            CpEntry::Long(value) => {
                out.push(5);
                out.extend_from_slice(&value.to_be_bytes());
            }
            CpEntry::Double(value) => {
                out.push(6);
                out.extend_from_slice(&value.to_bits().to_be_bytes());
            }
            CpEntry::Class(name) => {
                out.push(7);
                write_u16(out, *name);
            }
            CpEntry::String(value) => {
                out.push(8);
                write_u16(out, *value);
            }
            CpEntry::NameAndType(name, descriptor) => {
                out.push(12);
                write_u16(out, *name);
                write_u16(out, *descriptor);
            }
            CpEntry::Gap => {}
        }
    }
}

#[derive(Default)]
struct Annotations {
    visible: Vec<Vec<u8>>,
    invisible: Vec<Vec<u8>>,
}

struct MemberSpec {
    access: u16,
    name_index: u16,
    descriptor_index: u16,
    attributes: Vec<(u16, Vec<u8>)>,
    annotations: Annotations,
    parameter_annotations: Option<Vec<Vec<Vec<u8>>>>,
}

/// Minimal class file writer for reflection tests.
pub(crate) struct ClassFileBuilder {
    cp: Vec<CpEntry>,
    major_version: u16,
    access: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<MemberSpec>,
    methods: Vec<MemberSpec>,
    attributes: Vec<(u16, Vec<u8>)>,
    inner_classes: Vec<[u16; 4]>,
    annotations: Annotations,
}

impl ClassFileBuilder {
    pub(crate) fn new(class_name: &str, super_name: &str) -> Self {
        let mut builder = Self::root(class_name);
        builder.super_class = builder.add_class(super_name);
        builder
    }

    /// Class without a superclass, like `java/lang/Object`.
    pub(crate) fn root(class_name: &str) -> Self {
        let mut builder = Self {
            cp: Vec::new(),
            major_version: 52,
            access: 0x0021,
            this_class: 0,
            super_class: 0,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
            inner_classes: Vec::new(),
            annotations: Annotations::default(),
        };
        builder.this_class = builder.add_class(class_name);
        builder
    }

    pub(crate) fn access(&mut self, access: u16) {
        self.access = access;
    }

    pub(crate) fn major_version(&mut self, major: u16) {
        self.major_version = major;
    }

    pub(crate) fn interface(&mut self, name: &str) {
        let index = self.add_class(name);
        self.interfaces.push(index);
    }

    pub(crate) fn signature(&mut self, signature: &str) {
        let attribute = self.utf8_attribute(signature);
        self.push_class_attribute("Signature", attribute);
    }

    pub(crate) fn source_file(&mut self, source: &str) {
        let attribute = self.utf8_attribute(source);
        self.push_class_attribute("SourceFile", attribute);
    }

    pub(crate) fn source_debug(&mut self, debug: &str) {
        self.push_class_attribute("SourceDebugExtension", debug.as_bytes().to_vec());
    }

    pub(crate) fn inner_class(
        &mut self,
        name: &str,
        outer: Option<&str>,
        inner_name: Option<&str>,
        access: u16,
    ) {
        let name = self.add_class(name);
        let outer = outer.map_or(0, |outer| self.add_class(outer));
        let inner_name = inner_name.map_or(0, |inner_name| self.add_utf8(inner_name));
        self.inner_classes.push([name, outer, inner_name, access]);
    }

    pub(crate) fn enclosing_method(&mut self, owner: &str, method: Option<(&str, &str)>) {
        let owner = self.add_class(owner);
        let method = method.map_or(0, |(name, descriptor)| {
            self.add_name_and_type(name, descriptor)
        });
        let mut body = Vec::new();
        write_u16(&mut body, owner);
        write_u16(&mut body, method);
        self.push_class_attribute("EnclosingMethod", body);
    }

    pub(crate) fn annotation(
        &mut self,
        descriptor: &str,
        visible: bool,
        elements: Vec<(&'static str, ElementSpec)>,
    ) {
        let encoded = self.encode_annotation(descriptor, &elements);
        if visible {
            self.annotations.visible.push(encoded);
        } else {
            self.annotations.invisible.push(encoded);
        }
    }

    pub(crate) fn field(&mut self, access: u16, name: &str, descriptor: &str) -> usize {
        let member = self.member(access, name, descriptor);
        self.fields.push(member);
        self.fields.len() - 1
    }

    pub(crate) fn field_signature(&mut self, field: usize, signature: &str) {
        let attribute = self.utf8_attribute(signature);
        let name = self.add_utf8("Signature");
        self.fields[field].attributes.push((name, attribute));
    }

    pub(crate) fn field_constant(&mut self, field: usize, value: ElementSpec) {
        let index = match value {
            ElementSpec::Long(value) => self.push(CpEntry::Long(value)),
            ElementSpec::Float(value) => self.push(CpEntry::Float(value)),
            ElementSpec::Double(value) => self.push(CpEntry::Double(value)),
            ElementSpec::String(value) => {
                let utf8 = self.add_utf8(value);
                self.push(CpEntry::String(utf8))
            }
            ElementSpec::Boolean(value) => self.push(CpEntry::Integer(value as i32)),
            ElementSpec::Byte(value) => self.push(CpEntry::Integer(value as i32)),
            ElementSpec::Char(value) => self.push(CpEntry::Integer(value as i32)),
            ElementSpec::Short(value) => self.push(CpEntry::Integer(value as i32)),
            ElementSpec::Int(value) => self.push(CpEntry::Integer(value)),
            other => panic!("not a constant value: {other:?}"),
        };
        let name = self.add_utf8("ConstantValue");
        let mut body = Vec::new();
        write_u16(&mut body, index);
        self.fields[field].attributes.push((name, body));
    }

    pub(crate) fn field_annotation(
        &mut self,
        field: usize,
        descriptor: &str,
        visible: bool,
        elements: Vec<(&'static str, ElementSpec)>,
    ) {
        let encoded = self.encode_annotation(descriptor, &elements);
        let annotations = &mut self.fields[field].annotations;
        if visible {
            annotations.visible.push(encoded);
        } else {
            annotations.invisible.push(encoded);
        }
    }

    pub(crate) fn method(&mut self, access: u16, name: &str, descriptor: &str) -> usize {
        let member = self.member(access, name, descriptor);
        self.methods.push(member);
        self.methods.len() - 1
    }

    pub(crate) fn method_signature(&mut self, method: usize, signature: &str) {
        let attribute = self.utf8_attribute(signature);
        let name = self.add_utf8("Signature");
        self.methods[method].attributes.push((name, attribute));
    }

    pub(crate) fn method_exceptions(&mut self, method: usize, exceptions: &[&str]) {
        let mut body = Vec::new();
        write_u16(&mut body, exceptions.len() as u16);
        for exception in exceptions {
            let index = self.add_class(exception);
            write_u16(&mut body, index);
        }
        let name = self.add_utf8("Exceptions");
        self.methods[method].attributes.push((name, body));
    }

    pub(crate) fn method_annotation(
        &mut self,
        method: usize,
        descriptor: &str,
        visible: bool,
        elements: Vec<(&'static str, ElementSpec)>,
    ) {
        let encoded = self.encode_annotation(descriptor, &elements);
        let annotations = &mut self.methods[method].annotations;
        if visible {
            annotations.visible.push(encoded);
        } else {
            annotations.invisible.push(encoded);
        }
    }

    pub(crate) fn method_parameter_annotations(
        &mut self,
        method: usize,
        parameters: Vec<Vec<AnnotationSpec>>,
    ) {
        let mut encoded = Vec::new();
        for parameter in parameters {
            let mut annotations = Vec::new();
            for (descriptor, elements) in parameter {
                annotations.push(self.encode_annotation(descriptor, &elements));
            }
            encoded.push(annotations);
        }
        self.methods[method].parameter_annotations = Some(encoded);
    }

    pub(crate) fn method_default(&mut self, method: usize, value: ElementSpec) {
        let body = self.encode_element(&value);
        let name = self.add_utf8("AnnotationDefault");
        self.methods[method].attributes.push((name, body));
    }

    pub(crate) fn finish(mut self) -> Vec<u8> {
        if !self.inner_classes.is_empty() {
            let mut body = Vec::new();
            write_u16(&mut body, self.inner_classes.len() as u16);
            for entry in &self.inner_classes {
                for value in entry {
                    write_u16(&mut body, *value);
                }
            }
            self.push_class_attribute("InnerClasses", body);
        }
        let annotations = std::mem::take(&mut self.annotations);
        let class_annotations = self.annotation_attributes(annotations);
        self.attributes.extend(class_annotations);
        let mut fields = std::mem::take(&mut self.fields);
        let mut methods = std::mem::take(&mut self.methods);
        for member in fields.iter_mut().chain(methods.iter_mut()) {
            self.finish_member(member);
        }

        let mut bytes = Vec::new();
        write_u32(&mut bytes, 0xCAFEBABE);
        write_u16(&mut bytes, 0);
        write_u16(&mut bytes, self.major_version);
        write_u16(&mut bytes, (self.cp.len() + 1) as u16);
        for entry in &self.cp {
            entry.write(&mut bytes);
        }
        write_u16(&mut bytes, self.access);
        write_u16(&mut bytes, self.this_class);
        write_u16(&mut bytes, self.super_class);
        write_u16(&mut bytes, self.interfaces.len() as u16);
        for interface in &self.interfaces {
            write_u16(&mut bytes, *interface);
        }
        for group in [&fields, &methods] {
            write_u16(&mut bytes, group.len() as u16);
            for member in group {
                write_u16(&mut bytes, member.access);
                write_u16(&mut bytes, member.name_index);
                write_u16(&mut bytes, member.descriptor_index);
                write_attributes(&mut bytes, &member.attributes);
            }
        }
        write_attributes(&mut bytes, &self.attributes);
        bytes
    }

    fn finish_member(&mut self, member: &mut MemberSpec) {
        let annotations = std::mem::take(&mut member.annotations);
        let attributes = self.annotation_attributes(annotations);
        member.attributes.extend(attributes);
        if let Some(parameters) = member.parameter_annotations.take() {
            let mut body = vec![parameters.len() as u8];
            for parameter in parameters {
                write_u16(&mut body, parameter.len() as u16);
                for annotation in parameter {
                    body.extend_from_slice(&annotation);
                }
            }
            let name = self.add_utf8("RuntimeVisibleParameterAnnotations");
            member.attributes.push((name, body));
        }
    }

    fn member(&mut self, access: u16, name: &str, descriptor: &str) -> MemberSpec {
        MemberSpec {
            access,
            name_index: self.add_utf8(name),
            descriptor_index: self.add_utf8(descriptor),
            attributes: Vec::new(),
            annotations: Annotations::default(),
            parameter_annotations: None,
        }
    }

    fn annotation_attributes(&mut self, annotations: Annotations) -> Vec<(u16, Vec<u8>)> {
        let mut attributes = Vec::new();
        for (name, encoded) in [
            ("RuntimeVisibleAnnotations", annotations.visible),
            ("RuntimeInvisibleAnnotations", annotations.invisible),
        ] {
            if encoded.is_empty() {
                continue;
            }
            let mut body = Vec::new();
            write_u16(&mut body, encoded.len() as u16);
            for annotation in encoded {
                body.extend_from_slice(&annotation);
            }
            attributes.push((self.add_utf8(name), body));
        }
        attributes
    }

    fn encode_annotation(
        &mut self,
        descriptor: &str,
        elements: &[(&'static str, ElementSpec)],
    ) -> Vec<u8> {
        let mut body = Vec::new();
        let type_index = self.add_utf8(descriptor);
        write_u16(&mut body, type_index);
        write_u16(&mut body, elements.len() as u16);
        for (name, value) in elements {
            let name_index = self.add_utf8(name);
            write_u16(&mut body, name_index);
            let encoded = self.encode_element(value);
            body.extend_from_slice(&encoded);
        }
        body
    }

    fn encode_element(&mut self, value: &ElementSpec) -> Vec<u8> {
        let mut body = Vec::new();
        match value {
            ElementSpec::Boolean(value) => self.const_element(&mut body, b'Z', *value as i32),
            ElementSpec::Byte(value) => self.const_element(&mut body, b'B', *value as i32),
            ElementSpec::Char(value) => self.const_element(&mut body, b'C', *value as i32),
            ElementSpec::Short(value) => self.const_element(&mut body, b'S', *value as i32),
            ElementSpec::Int(value) => self.const_element(&mut body, b'I', *value),
            ElementSpec::Long(value) => {
                body.push(b'J');
                let index = self.push(CpEntry::Long(*value));
                write_u16(&mut body, index);
            }
            ElementSpec::Float(value) => {
                body.push(b'F');
                let index = self.push(CpEntry::Float(*value));
                write_u16(&mut body, index);
            }
            ElementSpec::Double(value) => {
                body.push(b'D');
                let index = self.push(CpEntry::Double(*value));
                write_u16(&mut body, index);
            }
            ElementSpec::String(value) => {
                body.push(b's');
                let index = self.add_utf8(value);
                write_u16(&mut body, index);
            }
            ElementSpec::Enum(descriptor, constant) => {
                body.push(b'e');
                let descriptor = self.add_utf8(descriptor);
                let constant = self.add_utf8(constant);
                write_u16(&mut body, descriptor);
                write_u16(&mut body, constant);
            }
            ElementSpec::Class(descriptor) => {
                body.push(b'c');
                let index = self.add_utf8(descriptor);
                write_u16(&mut body, index);
            }
            ElementSpec::Annotation(descriptor, elements) => {
                body.push(b'@');
                let encoded = self.encode_annotation(descriptor, elements);
                body.extend_from_slice(&encoded);
            }
            ElementSpec::Array(values) => {
                body.push(b'[');
                write_u16(&mut body, values.len() as u16);
                for value in values {
                    let encoded = self.encode_element(value);
                    body.extend_from_slice(&encoded);
                }
            }
        }
        body
    }

    fn const_element(&mut self, body: &mut Vec<u8>, tag: u8, value: i32) {
        body.push(tag);
        let index = self.push(CpEntry::Integer(value));
        write_u16(body, index);
    }

    fn utf8_attribute(&mut self, value: &str) -> Vec<u8> {
        let index = self.add_utf8(value);
        index.to_be_bytes().to_vec()
    }

    fn push_class_attribute(&mut self, name: &str, body: Vec<u8>) {
        let name = self.add_utf8(name);
        self.attributes.push((name, body));
    }

    fn push(&mut self, entry: CpEntry) -> u16 {
        let wide = matches!(entry, CpEntry::Long(_) | CpEntry::Double(_));
        self.cp.push(entry);
        let index = self.cp.len() as u16;
        if wide {
            self.cp.push(CpEntry::Gap);
        }
        index
    }

    fn add_utf8(&mut self, value: &str) -> u16 {
        let existing = self
            .cp
            .iter()
            .position(|entry| matches!(entry, CpEntry::Utf8(existing) if existing == value));
        match existing {
            Some(position) => position as u16 + 1,
            None => self.push(CpEntry::Utf8(value.to_string())),
        }
    }

    fn add_class(&mut self, name: &str) -> u16 {
        let name_index = self.add_utf8(name);
        self.push(CpEntry::Class(name_index))
    }

    fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_index = self.add_utf8(name);
        let descriptor_index = self.add_utf8(descriptor);
        self.push(CpEntry::NameAndType(name_index, descriptor_index))
    }
}

fn write_attributes(out: &mut Vec<u8>, attributes: &[(u16, Vec<u8>)]) {
    write_u16(out, attributes.len() as u16);
    for (name, body) in attributes {
        write_u16(out, *name);
        write_u32(out, body.len() as u32);
        out.extend_from_slice(body);
    }
}

fn write_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Class with a superclass and nothing else.
pub(crate) fn simple_class(name: &str, super_name: &str) -> Vec<u8> {
    ClassFileBuilder::new(name, super_name).finish()
}

/// Annotation interface with optional retention and element defaults.
pub(crate) fn annotation_type(
    name: &str,
    retention: Option<&'static str>,
    elements: Vec<(&str, &str, Option<ElementSpec>)>,
) -> Vec<u8> {
    let mut builder = ClassFileBuilder::new(name, "java/lang/Object");
    builder.access(0x2601);
    builder.interface("java/lang/annotation/Annotation");
    if let Some(policy) = retention {
        builder.annotation(
            RETENTION,
            true,
            vec![("value", ElementSpec::Enum(RETENTION_POLICY, policy))],
        );
    }
    for (element, descriptor, default) in elements {
        let method = builder.method(0x0401, element, &format!("(){descriptor}"));
        if let Some(default) = default {
            builder.method_default(method, default);
        }
    }
    builder.finish()
}

/// Write `bytes` as `<root>/<internal name>.class`.
pub(crate) fn write_class(root: &Path, internal_name: &str, bytes: &[u8]) -> PathBuf {
    let path = root.join(format!("{internal_name}.class"));
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create package directories");
    }
    fs::write(&path, bytes).expect("write class file");
    path
}
