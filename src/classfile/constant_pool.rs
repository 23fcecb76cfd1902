use anyhow::Result;

use crate::classfile::reader::ByteReader;
use crate::error::GripError;

/// Resolved constant pool entry.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    MemberRef { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType(u16),
    Dynamic { bootstrap: u16, name_and_type: u16 },
    Module(u16),
    Package(u16),
    /// Second slot of a long or double entry, and slot zero.
    Unusable,
}

impl Constant {
    fn kind(&self) -> &'static str {
        match self {
            Constant::Utf8(_) => "Utf8",
            Constant::Integer(_) => "Integer",
            Constant::Float(_) => "Float",
            Constant::Long(_) => "Long",
            Constant::Double(_) => "Double",
            Constant::Class(_) => "Class",
            Constant::String(_) => "String",
            Constant::MemberRef { .. } => "MemberRef",
            Constant::NameAndType { .. } => "NameAndType",
            Constant::MethodHandle { .. } => "MethodHandle",
            Constant::MethodType(_) => "MethodType",
            Constant::Dynamic { .. } => "Dynamic",
            Constant::Module(_) => "Module",
            Constant::Package(_) => "Package",
            Constant::Unusable => "Unusable",
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    pub(crate) fn parse(reader: &mut ByteReader<'_>) -> Result<Self> {
        let count = reader.read_u16()?;
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(Constant::Unusable);
        let mut index = 1u16;
        while index < count {
            let tag = reader.read_u8()?;
            let entry = match tag {
                1 => {
                    let len = reader.read_u16()? as usize;
                    Constant::Utf8(decode_modified_utf8(reader.read_bytes(len)?)?)
                }
                3 => Constant::Integer(reader.read_u32()? as i32),
                4 => Constant::Float(f32::from_bits(reader.read_u32()?)),
                5 => Constant::Long(reader.read_u64()? as i64),
                6 => Constant::Double(f64::from_bits(reader.read_u64()?)),
                7 => Constant::Class(reader.read_u16()?),
                8 => Constant::String(reader.read_u16()?),
                9..=11 => Constant::MemberRef {
                    class: reader.read_u16()?,
                    name_and_type: reader.read_u16()?,
                },
                12 => Constant::NameAndType {
                    name: reader.read_u16()?,
                    descriptor: reader.read_u16()?,
                },
                15 => Constant::MethodHandle {
                    kind: reader.read_u8()?,
                    reference: reader.read_u16()?,
                },
                16 => Constant::MethodType(reader.read_u16()?),
                17 | 18 => Constant::Dynamic {
                    bootstrap: reader.read_u16()?,
                    name_and_type: reader.read_u16()?,
                },
                19 => Constant::Module(reader.read_u16()?),
                20 => Constant::Package(reader.read_u16()?),
                _ => {
                    return Err(GripError::MalformedClass(format!(
                        "unsupported constant pool tag {tag} at index {index}"
                    ))
                    .into());
                }
            };
            let wide = matches!(entry, Constant::Long(_) | Constant::Double(_));
            entries.push(entry);
            if wide {
                entries.push(Constant::Unusable);
                index += 1;
            }
            index += 1;
        }
        Ok(Self { entries })
    }

    pub(crate) fn get(&self, index: u16) -> Result<&Constant> {
        match self.entries.get(index as usize) {
            Some(Constant::Unusable) | None => Err(GripError::MalformedClass(format!(
                "invalid constant pool index {index}"
            ))
            .into()),
            Some(entry) => Ok(entry),
        }
    }

    pub(crate) fn utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Utf8(value) => Ok(value),
            other => Err(mismatch(index, "Utf8", other)),
        }
    }

    /// Internal name referenced by a `Class` entry.
    pub(crate) fn class_name(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Class(name) => self.utf8(*name),
            other => Err(mismatch(index, "Class", other)),
        }
    }

    /// Like `class_name`, but index zero means "absent".
    pub(crate) fn optional_class_name(&self, index: u16) -> Result<Option<&str>> {
        if index == 0 {
            return Ok(None);
        }
        self.class_name(index).map(Some)
    }

    pub(crate) fn optional_utf8(&self, index: u16) -> Result<Option<&str>> {
        if index == 0 {
            return Ok(None);
        }
        self.utf8(index).map(Some)
    }

    pub(crate) fn name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            other => Err(mismatch(index, "NameAndType", other)),
        }
    }

    pub(crate) fn integer(&self, index: u16) -> Result<i32> {
        match self.get(index)? {
            Constant::Integer(value) => Ok(*value),
            other => Err(mismatch(index, "Integer", other)),
        }
    }

    pub(crate) fn long(&self, index: u16) -> Result<i64> {
        match self.get(index)? {
            Constant::Long(value) => Ok(*value),
            other => Err(mismatch(index, "Long", other)),
        }
    }

    pub(crate) fn float(&self, index: u16) -> Result<f32> {
        match self.get(index)? {
            Constant::Float(value) => Ok(*value),
            other => Err(mismatch(index, "Float", other)),
        }
    }

    pub(crate) fn double(&self, index: u16) -> Result<f64> {
        match self.get(index)? {
            Constant::Double(value) => Ok(*value),
            other => Err(mismatch(index, "Double", other)),
        }
    }

    /// Text of a `String` entry.
    pub(crate) fn string(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::String(value) => self.utf8(*value),
            other => Err(mismatch(index, "String", other)),
        }
    }
}

fn mismatch(index: u16, expected: &str, found: &Constant) -> anyhow::Error {
    GripError::MalformedClass(format!(
        "constant pool entry {index} is {} but {expected} was expected",
        found.kind()
    ))
    .into()
}

/// Decode the JVM's modified UTF-8: `0xC0 0x80` encodes NUL and
/// supplementary characters arrive as surrogate pairs.
pub(crate) fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    if bytes.iter().all(|byte| *byte != 0 && *byte < 0x80) {
        return Ok(String::from_utf8_lossy(bytes).into_owned());
    }
    let mut units = Vec::with_capacity(bytes.len());
    let mut offset = 0usize;
    while offset < bytes.len() {
        let first = bytes[offset];
        let unit = match first {
            0x01..=0x7F => {
                offset += 1;
                first as u16
            }
            0xC0..=0xDF => {
                let second = continuation(bytes, offset + 1)?;
                offset += 2;
                (((first & 0x1F) as u16) << 6) | second
            }
            0xE0..=0xEF => {
                let second = continuation(bytes, offset + 1)?;
                let third = continuation(bytes, offset + 2)?;
                offset += 3;
                (((first & 0x0F) as u16) << 12) | (second << 6) | third
            }
            _ => {
                return Err(GripError::MalformedClass(format!(
                    "invalid modified UTF-8 byte {first:#04x}"
                ))
                .into());
            }
        };
        units.push(unit);
    }
    Ok(String::from_utf16_lossy(&units))
}

fn continuation(bytes: &[u8], offset: usize) -> Result<u16> {
    match bytes.get(offset) {
        Some(byte) if byte & 0xC0 == 0x80 => Ok((byte & 0x3F) as u16),
        _ => Err(GripError::MalformedClass("truncated modified UTF-8 sequence".to_string()).into()),
    }
}
