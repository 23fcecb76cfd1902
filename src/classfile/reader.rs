use anyhow::{Context, Result};

use crate::classfile::annotation::{AnnotationNode, ElementValue};
use crate::classfile::constant_pool::ConstantPool;
use crate::error::GripError;

const MAGIC: u32 = 0xCAFEBABE;

/// Big-endian cursor over class file bytes.
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub(crate) fn at(data: &'a [u8], offset: usize) -> Self {
        Self { data, offset }
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.offset >= self.data.len()
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64> {
        let high = self.read_u32()? as u64;
        let low = self.read_u32()? as u64;
        Ok((high << 32) | low)
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let start = self.offset;
        let slice = start
            .checked_add(len)
            .and_then(|end| self.data.get(start..end))
            .ok_or_else(|| {
                GripError::MalformedClass(format!("class file out of bounds at offset {start}"))
            })?;
        self.offset = start + len;
        Ok(slice)
    }

    pub(crate) fn skip(&mut self, len: usize) -> Result<()> {
        self.read_bytes(len)?;
        Ok(())
    }
}

/// Class header exposed before any member is decoded.
#[derive(Clone, Debug)]
pub(crate) struct ClassHeader<'a> {
    pub(crate) version: u32,
    pub(crate) access: u16,
    pub(crate) name: &'a str,
    pub(crate) signature: Option<&'a str>,
    pub(crate) super_name: Option<&'a str>,
    pub(crate) interfaces: &'a [String],
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct InnerClassNode {
    pub(crate) name: String,
    pub(crate) outer_name: Option<String>,
    pub(crate) inner_name: Option<String>,
    pub(crate) access: u16,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct EnclosingMethodNode {
    pub(crate) owner: String,
    /// Name and descriptor; absent for classes declared in initializers.
    pub(crate) method: Option<(String, String)>,
}

/// Decoded `ConstantValue` attribute.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ConstantValueNode {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

#[derive(Clone, Debug)]
pub(crate) struct FieldNode {
    pub(crate) access: u16,
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) signature: Option<String>,
    pub(crate) value: Option<ConstantValueNode>,
    pub(crate) annotations: Vec<(AnnotationNode, bool)>,
}

#[derive(Clone, Debug)]
pub(crate) struct MethodNode {
    pub(crate) access: u16,
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) signature: Option<String>,
    pub(crate) exceptions: Vec<String>,
    pub(crate) annotations: Vec<(AnnotationNode, bool)>,
    /// Per-parameter annotations, visible ones only.
    pub(crate) parameter_annotations: Vec<Vec<AnnotationNode>>,
    pub(crate) annotation_default: Option<ElementValue>,
}

/// Controls which parts of the class body are decoded.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct ReadOptions {
    pub(crate) skip_fields: bool,
    pub(crate) skip_member_annotations: bool,
}

impl ReadOptions {
    /// Enough to materialize annotation element defaults and retention.
    pub(crate) fn for_annotation() -> Self {
        Self {
            skip_fields: true,
            skip_member_annotations: true,
        }
    }
}

/// Receives class file events in file order.
pub(crate) trait ClassVisitor {
    fn visit_header(&mut self, _header: &ClassHeader<'_>) -> Result<()> {
        Ok(())
    }

    fn visit_inner_class(&mut self, _inner: InnerClassNode) -> Result<()> {
        Ok(())
    }

    fn visit_enclosing_method(&mut self, _enclosing: EnclosingMethodNode) -> Result<()> {
        Ok(())
    }

    fn visit_source(&mut self, _source: Option<&str>, _debug: Option<&str>) -> Result<()> {
        Ok(())
    }

    fn visit_annotation(&mut self, _annotation: AnnotationNode, _visible: bool) -> Result<()> {
        Ok(())
    }

    fn visit_field(&mut self, _field: FieldNode) -> Result<()> {
        Ok(())
    }

    fn visit_method(&mut self, _method: MethodNode) -> Result<()> {
        Ok(())
    }
}

/// Parsed class file: constant pool and header are resolved eagerly, member
/// bodies are decoded on `accept`.
#[derive(Clone, Debug)]
pub(crate) struct ClassReader {
    data: Vec<u8>,
    constant_pool: ConstantPool,
    minor_version: u16,
    major_version: u16,
    access: u16,
    name: String,
    super_name: Option<String>,
    interfaces: Vec<String>,
    members_offset: usize,
}

impl ClassReader {
    pub(crate) fn new(data: Vec<u8>) -> Result<Self> {
        let mut reader = ByteReader::new(&data);
        let magic = reader.read_u32()?;
        if magic != MAGIC {
            return Err(
                GripError::MalformedClass(format!("invalid class file magic {magic:#010x}")).into(),
            );
        }
        let minor_version = reader.read_u16()?;
        let major_version = reader.read_u16()?;
        let constant_pool = ConstantPool::parse(&mut reader).context("parse constant pool")?;
        let access = reader.read_u16()?;
        let this_class = reader.read_u16()?;
        let super_class = reader.read_u16()?;
        let name = constant_pool
            .class_name(this_class)
            .context("resolve class name")?
            .to_string();
        let super_name = constant_pool
            .optional_class_name(super_class)
            .context("resolve super class name")?
            .map(str::to_string);
        let interface_count = reader.read_u16()? as usize;
        let mut interfaces = Vec::with_capacity(interface_count);
        for _ in 0..interface_count {
            let index = reader.read_u16()?;
            interfaces.push(constant_pool.class_name(index)?.to_string());
        }
        let members_offset = reader.offset();
        skip_members(&mut reader)?;
        skip_members(&mut reader)?;
        skip_attributes(&mut reader)?;
        if !reader.is_empty() {
            return Err(GripError::MalformedClass(format!(
                "trailing bytes after offset {}",
                reader.offset()
            ))
            .into());
        }

        Ok(Self {
            data,
            constant_pool,
            minor_version,
            major_version,
            access,
            name,
            super_name,
            interfaces,
            members_offset,
        })
    }

    /// `minor << 16 | major`.
    pub(crate) fn version(&self) -> u32 {
        ((self.minor_version as u32) << 16) | self.major_version as u32
    }

    pub(crate) fn access(&self) -> u16 {
        self.access
    }

    pub(crate) fn class_name(&self) -> &str {
        &self.name
    }

    pub(crate) fn super_name(&self) -> Option<&str> {
        self.super_name.as_deref()
    }

    pub(crate) fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    /// Decode the class body and replay it into `visitor`.
    pub(crate) fn accept(&self, visitor: &mut dyn ClassVisitor, options: ReadOptions) -> Result<()> {
        let cp = &self.constant_pool;
        let mut reader = ByteReader::at(&self.data, self.members_offset);

        let field_count = reader.read_u16()?;
        let mut fields = Vec::new();
        for _ in 0..field_count {
            if options.skip_fields {
                reader.skip(6)?;
                skip_attributes(&mut reader)?;
            } else {
                fields.push(read_field(&mut reader, cp, options)?);
            }
        }

        let method_count = reader.read_u16()?;
        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            methods.push(read_method(&mut reader, cp, options)?);
        }

        let mut signature = None;
        let mut source = None;
        let mut debug = None;
        let mut inner_classes = Vec::new();
        let mut enclosing = None;
        let mut annotations = Vec::new();
        let attribute_count = reader.read_u16()?;
        for _ in 0..attribute_count {
            let (name, mut body) = read_attribute(&mut reader, cp)?;
            match name {
                "Signature" => signature = Some(cp.utf8(body.read_u16()?)?),
                "SourceFile" => source = Some(cp.utf8(body.read_u16()?)?),
                "SourceDebugExtension" => {
                    let bytes = body.read_bytes(body.remaining())?;
                    debug = Some(String::from_utf8_lossy(bytes).into_owned());
                }
                "InnerClasses" => {
                    let count = body.read_u16()?;
                    for _ in 0..count {
                        let inner = body.read_u16()?;
                        let outer = body.read_u16()?;
                        let inner_name = body.read_u16()?;
                        let access = body.read_u16()?;
                        inner_classes.push(InnerClassNode {
                            name: cp.class_name(inner)?.to_string(),
                            outer_name: cp.optional_class_name(outer)?.map(str::to_string),
                            inner_name: cp.optional_utf8(inner_name)?.map(str::to_string),
                            access,
                        });
                    }
                }
                "EnclosingMethod" => {
                    let owner = cp.class_name(body.read_u16()?)?.to_string();
                    let method_index = body.read_u16()?;
                    let method = if method_index == 0 {
                        None
                    } else {
                        let (name, descriptor) = cp.name_and_type(method_index)?;
                        Some((name.to_string(), descriptor.to_string()))
                    };
                    enclosing = Some(EnclosingMethodNode { owner, method });
                }
                "RuntimeVisibleAnnotations" => {
                    for annotation in read_annotations(&mut body, cp)? {
                        annotations.push((annotation, true));
                    }
                }
                "RuntimeInvisibleAnnotations" => {
                    for annotation in read_annotations(&mut body, cp)? {
                        annotations.push((annotation, false));
                    }
                }
                _ => {}
            }
        }

        visitor.visit_header(&ClassHeader {
            version: self.version(),
            access: self.access,
            name: &self.name,
            signature,
            super_name: self.super_name.as_deref(),
            interfaces: &self.interfaces,
        })?;
        for inner in inner_classes {
            visitor.visit_inner_class(inner)?;
        }
        if let Some(enclosing) = enclosing {
            visitor.visit_enclosing_method(enclosing)?;
        }
        visitor.visit_source(source, debug.as_deref())?;
        for (annotation, visible) in annotations {
            visitor.visit_annotation(annotation, visible)?;
        }
        for field in fields {
            visitor.visit_field(field)?;
        }
        for method in methods {
            visitor.visit_method(method)?;
        }
        Ok(())
    }
}

/// Attribute body reader bounded to the attribute's declared length.
pub(crate) struct AttributeBody<'a> {
    reader: ByteReader<'a>,
}

impl<'a> AttributeBody<'a> {
    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        self.reader.read_u8()
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16> {
        self.reader.read_u16()
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.reader.read_bytes(len)
    }

    fn remaining(&self) -> usize {
        self.reader.data.len().saturating_sub(self.reader.offset)
    }
}

fn read_attribute<'a, 'c>(
    reader: &mut ByteReader<'a>,
    cp: &'c ConstantPool,
) -> Result<(&'c str, AttributeBody<'a>)> {
    let name = cp.utf8(reader.read_u16()?)?;
    let length = reader.read_u32()? as usize;
    let bytes = reader.read_bytes(length)?;
    Ok((
        name,
        AttributeBody {
            reader: ByteReader::new(bytes),
        },
    ))
}

fn read_field(
    reader: &mut ByteReader<'_>,
    cp: &ConstantPool,
    options: ReadOptions,
) -> Result<FieldNode> {
    let access = reader.read_u16()?;
    let name = cp.utf8(reader.read_u16()?)?.to_string();
    let descriptor = cp.utf8(reader.read_u16()?)?.to_string();
    let mut field = FieldNode {
        access,
        name,
        descriptor,
        signature: None,
        value: None,
        annotations: Vec::new(),
    };
    let attribute_count = reader.read_u16()?;
    for _ in 0..attribute_count {
        let (name, mut body) = read_attribute(reader, cp)?;
        match name {
            "Signature" => field.signature = Some(cp.utf8(body.read_u16()?)?.to_string()),
            "ConstantValue" => {
                field.value = Some(read_constant_value(&mut body, cp, &field.descriptor)?)
            }
            "RuntimeVisibleAnnotations" if !options.skip_member_annotations => {
                for annotation in read_annotations(&mut body, cp)? {
                    field.annotations.push((annotation, true));
                }
            }
            "RuntimeInvisibleAnnotations" if !options.skip_member_annotations => {
                for annotation in read_annotations(&mut body, cp)? {
                    field.annotations.push((annotation, false));
                }
            }
            _ => {}
        }
    }
    Ok(field)
}

fn read_constant_value(
    body: &mut AttributeBody<'_>,
    cp: &ConstantPool,
    descriptor: &str,
) -> Result<ConstantValueNode> {
    let index = body.read_u16()?;
    let value = match descriptor {
        "J" => ConstantValueNode::Long(cp.long(index)?),
        "F" => ConstantValueNode::Float(cp.float(index)?),
        "D" => ConstantValueNode::Double(cp.double(index)?),
        "Ljava/lang/String;" => ConstantValueNode::String(cp.string(index)?.to_string()),
        _ => ConstantValueNode::Int(cp.integer(index)?),
    };
    Ok(value)
}

fn read_method(
    reader: &mut ByteReader<'_>,
    cp: &ConstantPool,
    options: ReadOptions,
) -> Result<MethodNode> {
    let access = reader.read_u16()?;
    let name = cp.utf8(reader.read_u16()?)?.to_string();
    let descriptor = cp.utf8(reader.read_u16()?)?.to_string();
    let mut method = MethodNode {
        access,
        name,
        descriptor,
        signature: None,
        exceptions: Vec::new(),
        annotations: Vec::new(),
        parameter_annotations: Vec::new(),
        annotation_default: None,
    };
    let attribute_count = reader.read_u16()?;
    for _ in 0..attribute_count {
        let (name, mut body) = read_attribute(reader, cp)?;
        match name {
            "Signature" => method.signature = Some(cp.utf8(body.read_u16()?)?.to_string()),
            "Exceptions" => {
                let count = body.read_u16()?;
                for _ in 0..count {
                    method
                        .exceptions
                        .push(cp.class_name(body.read_u16()?)?.to_string());
                }
            }
            "AnnotationDefault" => {
                method.annotation_default = Some(ElementValue::parse(&mut body, cp)?);
            }
            "RuntimeVisibleAnnotations" if !options.skip_member_annotations => {
                for annotation in read_annotations(&mut body, cp)? {
                    method.annotations.push((annotation, true));
                }
            }
            "RuntimeInvisibleAnnotations" if !options.skip_member_annotations => {
                for annotation in read_annotations(&mut body, cp)? {
                    method.annotations.push((annotation, false));
                }
            }
            "RuntimeVisibleParameterAnnotations" if !options.skip_member_annotations => {
                let parameter_count = body.read_u8()?;
                for _ in 0..parameter_count {
                    method
                        .parameter_annotations
                        .push(read_annotations(&mut body, cp)?);
                }
            }
            _ => {}
        }
    }
    Ok(method)
}

fn read_annotations(body: &mut AttributeBody<'_>, cp: &ConstantPool) -> Result<Vec<AnnotationNode>> {
    let count = body.read_u16()?;
    let mut annotations = Vec::with_capacity(count as usize);
    for _ in 0..count {
        annotations.push(AnnotationNode::parse(body, cp)?);
    }
    Ok(annotations)
}

fn skip_members(reader: &mut ByteReader<'_>) -> Result<()> {
    let count = reader.read_u16()?;
    for _ in 0..count {
        reader.skip(6)?;
        skip_attributes(reader)?;
    }
    Ok(())
}

fn skip_attributes(reader: &mut ByteReader<'_>) -> Result<()> {
    let count = reader.read_u16()?;
    for _ in 0..count {
        reader.skip(2)?;
        let length = reader.read_u32()? as usize;
        reader.skip(length)?;
    }
    Ok(())
}
