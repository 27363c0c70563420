//! The constant pool: an indexed, deduplicating table of typed constants.
//!
//! Decoding reads raw [`CpInfo`] entries whose references are plain indices and then
//! resolves them into symbolic [`Constant`]s with a requeueing worklist. Encoding goes the
//! other way: every [`ConstantPool::insert`] registers dependencies first, so the raw form
//! of an entry only ever points backwards.
//!
//! Utf8 payloads are kept as [`JavaString`]s, so text the JVM accepts but Rust strings
//! cannot hold (unpaired surrogates) survives a round trip. Names, descriptors and
//! signatures must still be valid Unicode; [`ConstantPool::utf8`] rejects the rest.

use std::borrow::Cow;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};

use java_string::{JavaStr, JavaString};
use log::{debug, trace};

use crate::class_reader::ByteReader;
use crate::class_writer::{write_u1, write_u2, write_u4, write_u8};
use crate::constants::*;
use crate::error::{ClassReadError, ClassWriteError};
use crate::insn::{Literal, MemberRef};

/// A resolved pool entry. References to other entries are carried by value.
#[derive(Debug, Clone)]
pub enum Constant {
    Utf8(JavaString),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(String),
    String(JavaString),
    NameAndType { name: String, descriptor: String },
    Fieldref(MemberRef),
    Methodref(MemberRef),
    InterfaceMethodref(MemberRef),
}

impl Constant {
    /// Long and double entries occupy two slots.
    pub fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Constant::Utf8(a), Constant::Utf8(b)) => a == b,
            (Constant::Integer(a), Constant::Integer(b)) => a == b,
            (Constant::Float(a), Constant::Float(b)) => a.to_bits() == b.to_bits(),
            (Constant::Long(a), Constant::Long(b)) => a == b,
            (Constant::Double(a), Constant::Double(b)) => a.to_bits() == b.to_bits(),
            (Constant::Class(a), Constant::Class(b)) => a == b,
            (Constant::String(a), Constant::String(b)) => a == b,
            (
                Constant::NameAndType {
                    name: n1,
                    descriptor: d1,
                },
                Constant::NameAndType {
                    name: n2,
                    descriptor: d2,
                },
            ) => n1 == n2 && d1 == d2,
            (Constant::Fieldref(a), Constant::Fieldref(b)) => a == b,
            (Constant::Methodref(a), Constant::Methodref(b)) => a == b,
            (Constant::InterfaceMethodref(a), Constant::InterfaceMethodref(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Constant {}

impl Hash for Constant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Constant::Utf8(value) | Constant::String(value) => value.hash(state),
            Constant::Class(value) => value.hash(state),
            Constant::Integer(value) => value.hash(state),
            Constant::Float(value) => value.to_bits().hash(state),
            Constant::Long(value) => value.hash(state),
            Constant::Double(value) => value.to_bits().hash(state),
            Constant::NameAndType { name, descriptor } => {
                name.hash(state);
                descriptor.hash(state);
            }
            Constant::Fieldref(member)
            | Constant::Methodref(member)
            | Constant::InterfaceMethodref(member) => member.hash(state),
        }
    }
}

impl From<&Literal> for Constant {
    fn from(value: &Literal) -> Self {
        match value {
            Literal::Integer(v) => Constant::Integer(*v),
            Literal::Float(v) => Constant::Float(*v),
            Literal::Long(v) => Constant::Long(*v),
            Literal::Double(v) => Constant::Double(*v),
            Literal::String(v) => Constant::String(v.clone()),
            Literal::Class(v) => Constant::Class(v.clone()),
        }
    }
}

/// Raw pool entry as laid out in the file.
#[derive(Debug, Clone, PartialEq)]
pub enum CpInfo {
    Unusable,
    Utf8(JavaString),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class {
        name_index: u16,
    },
    String {
        string_index: u16,
    },
    Fieldref {
        class_index: u16,
        name_and_type_index: u16,
    },
    Methodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    InterfaceMethodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
}

/// Which member-reference kind a pool entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Field,
    Method,
    InterfaceMethod,
}

#[derive(Debug, Clone)]
pub struct ConstantPool {
    raw: Vec<CpInfo>,
    resolved: Vec<Option<Constant>>,
    lookup: HashMap<Constant, u16>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    /// Creates an empty pool. Slot 0 is reserved and never addressable.
    pub fn new() -> Self {
        Self {
            raw: vec![CpInfo::Unusable],
            resolved: vec![None],
            lookup: HashMap::new(),
        }
    }

    /// The `constant_pool_count` header value: occupied slots plus one.
    pub fn size(&self) -> u16 {
        self.raw.len() as u16
    }

    /// Returns the index of an equal entry, inserting it (and whatever it refers to)
    /// when absent.
    pub fn insert(&mut self, constant: Constant) -> Result<u16, ClassWriteError> {
        if let Some(index) = self.lookup.get(&constant) {
            return Ok(*index);
        }
        let raw = match &constant {
            Constant::Utf8(value) => CpInfo::Utf8(value.clone()),
            Constant::Integer(value) => CpInfo::Integer(*value),
            Constant::Float(value) => CpInfo::Float(*value),
            Constant::Long(value) => CpInfo::Long(*value),
            Constant::Double(value) => CpInfo::Double(*value),
            Constant::Class(name) => CpInfo::Class {
                name_index: self.insert_utf8(name)?,
            },
            Constant::String(value) => CpInfo::String {
                string_index: self.insert(Constant::Utf8(value.clone()))?,
            },
            Constant::NameAndType { name, descriptor } => {
                let name_index = self.insert_utf8(name)?;
                let descriptor_index = self.insert_utf8(descriptor)?;
                CpInfo::NameAndType {
                    name_index,
                    descriptor_index,
                }
            }
            Constant::Fieldref(member) => {
                let (class_index, name_and_type_index) = self.insert_member(member)?;
                CpInfo::Fieldref {
                    class_index,
                    name_and_type_index,
                }
            }
            Constant::Methodref(member) => {
                let (class_index, name_and_type_index) = self.insert_member(member)?;
                CpInfo::Methodref {
                    class_index,
                    name_and_type_index,
                }
            }
            Constant::InterfaceMethodref(member) => {
                let (class_index, name_and_type_index) = self.insert_member(member)?;
                CpInfo::InterfaceMethodref {
                    class_index,
                    name_and_type_index,
                }
            }
        };
        self.push(constant, raw)
    }

    /// `None` maps to index 0, the "absent" reference.
    pub fn insert_optional(&mut self, constant: Option<Constant>) -> Result<u16, ClassWriteError> {
        match constant {
            Some(constant) => self.insert(constant),
            None => Ok(0),
        }
    }

    pub fn insert_utf8(&mut self, value: &str) -> Result<u16, ClassWriteError> {
        self.insert(Constant::Utf8(JavaString::from(value)))
    }

    pub fn insert_optional_utf8(&mut self, value: Option<&str>) -> Result<u16, ClassWriteError> {
        match value {
            Some(value) => self.insert_utf8(value),
            None => Ok(0),
        }
    }

    pub fn insert_class(&mut self, name: &str) -> Result<u16, ClassWriteError> {
        self.insert(Constant::Class(name.to_string()))
    }

    fn insert_member(&mut self, member: &MemberRef) -> Result<(u16, u16), ClassWriteError> {
        let class_index = self.insert_class(&member.owner)?;
        let name_and_type_index = self.insert(Constant::NameAndType {
            name: member.name.clone(),
            descriptor: member.descriptor.clone(),
        })?;
        Ok((class_index, name_and_type_index))
    }

    fn push(&mut self, constant: Constant, raw: CpInfo) -> Result<u16, ClassWriteError> {
        let slots = if constant.is_wide() { 2 } else { 1 };
        if self.raw.len() + slots > u16::MAX as usize {
            return Err(ClassWriteError::ConstantPoolOverflow);
        }
        let index = self.raw.len() as u16;
        self.raw.push(raw);
        self.resolved.push(Some(constant.clone()));
        if slots == 2 {
            self.raw.push(CpInfo::Unusable);
            self.resolved.push(None);
        }
        self.lookup.insert(constant, index);
        Ok(index)
    }

    /// Looks up a resolved entry. Index 0, the slot after a long or double, and indices
    /// past the end are all invalid.
    pub fn get(&self, index: u16) -> Result<&Constant, ClassReadError> {
        self.resolved
            .get(index as usize)
            .and_then(Option::as_ref)
            .ok_or(ClassReadError::InvalidIndex(index))
    }

    /// The raw form of an entry, references as indices.
    pub fn raw(&self, index: u16) -> Option<&CpInfo> {
        self.raw.get(index as usize)
    }

    /// A Utf8 entry used as a name, descriptor or signature.
    pub fn utf8(&self, index: u16) -> Result<&str, ClassReadError> {
        text(index, self.java_utf8(index)?)
    }

    /// A Utf8 entry exactly as stored, unpaired surrogates included.
    pub fn java_utf8(&self, index: u16) -> Result<&JavaStr, ClassReadError> {
        match self.get(index)? {
            Constant::Utf8(value) => Ok(value),
            _ => Err(ClassReadError::UnexpectedConstant {
                index,
                expected: "Utf8",
            }),
        }
    }

    pub fn class_name(&self, index: u16) -> Result<&str, ClassReadError> {
        match self.get(index)? {
            Constant::Class(name) => Ok(name),
            _ => Err(ClassReadError::UnexpectedConstant {
                index,
                expected: "Class",
            }),
        }
    }

    /// Like [`class_name`](Self::class_name), with index 0 meaning "none".
    pub fn optional_class_name(&self, index: u16) -> Result<Option<&str>, ClassReadError> {
        if index == 0 {
            return Ok(None);
        }
        self.class_name(index).map(Some)
    }

    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str), ClassReadError> {
        match self.get(index)? {
            Constant::NameAndType { name, descriptor } => Ok((name, descriptor)),
            _ => Err(ClassReadError::UnexpectedConstant {
                index,
                expected: "NameAndType",
            }),
        }
    }

    pub fn member_ref(&self, index: u16) -> Result<(RefKind, &MemberRef), ClassReadError> {
        match self.get(index)? {
            Constant::Fieldref(member) => Ok((RefKind::Field, member)),
            Constant::Methodref(member) => Ok((RefKind::Method, member)),
            Constant::InterfaceMethodref(member) => Ok((RefKind::InterfaceMethod, member)),
            _ => Err(ClassReadError::UnexpectedConstant {
                index,
                expected: "member reference",
            }),
        }
    }

    /// A loadable constant: numeric, string or class.
    pub fn literal(&self, index: u16) -> Result<Literal, ClassReadError> {
        match self.get(index)? {
            Constant::Integer(v) => Ok(Literal::Integer(*v)),
            Constant::Float(v) => Ok(Literal::Float(*v)),
            Constant::Long(v) => Ok(Literal::Long(*v)),
            Constant::Double(v) => Ok(Literal::Double(*v)),
            Constant::String(v) => Ok(Literal::String(v.clone())),
            Constant::Class(v) => Ok(Literal::Class(v.clone())),
            _ => Err(ClassReadError::UnexpectedConstant {
                index,
                expected: "loadable constant",
            }),
        }
    }

    /// Iterates over addressable entries in index order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.resolved
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| entry.as_ref().map(|c| (index as u16, c)))
    }

    /// Reads `constant_pool_count` and the entries that follow, then resolves every
    /// reference.
    pub fn decode(reader: &mut ByteReader<'_>) -> Result<Self, ClassReadError> {
        let count = reader.read_u2()? as usize;
        let mut raw = Vec::with_capacity(count.max(1));
        raw.push(CpInfo::Unusable);

        let mut index = 1;
        while index < count {
            let tag = reader.read_u1()?;
            if (tag == CONSTANT_LONG || tag == CONSTANT_DOUBLE) && index + 2 > count {
                return Err(ClassReadError::TruncatedWideConstant(index as u16));
            }
            let entry = match tag {
                CONSTANT_UTF8 => {
                    let len = reader.read_u2()? as usize;
                    let bytes = reader.read_bytes(len)?;
                    CpInfo::Utf8(decode_modified_utf8(bytes)?)
                }
                CONSTANT_INTEGER => CpInfo::Integer(reader.read_u4()? as i32),
                CONSTANT_FLOAT => CpInfo::Float(f32::from_bits(reader.read_u4()?)),
                CONSTANT_LONG => CpInfo::Long(reader.read_u8()? as i64),
                CONSTANT_DOUBLE => CpInfo::Double(f64::from_bits(reader.read_u8()?)),
                CONSTANT_CLASS => CpInfo::Class {
                    name_index: reader.read_u2()?,
                },
                CONSTANT_STRING => CpInfo::String {
                    string_index: reader.read_u2()?,
                },
                CONSTANT_FIELDREF => CpInfo::Fieldref {
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                CONSTANT_METHODREF => CpInfo::Methodref {
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                CONSTANT_INTERFACE_METHODREF => CpInfo::InterfaceMethodref {
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                CONSTANT_NAME_AND_TYPE => CpInfo::NameAndType {
                    name_index: reader.read_u2()?,
                    descriptor_index: reader.read_u2()?,
                },
                _ => return Err(ClassReadError::InvalidConstantPoolTag(tag)),
            };
            raw.push(entry);

            if tag == CONSTANT_LONG || tag == CONSTANT_DOUBLE {
                raw.push(CpInfo::Unusable);
                index += 2;
            } else {
                index += 1;
            }
        }

        let pool = Self::resolve(raw)?;
        debug!("decoded constant pool with {} slots", pool.raw.len() - 1);
        Ok(pool)
    }

    fn resolve(raw: Vec<CpInfo>) -> Result<Self, ClassReadError> {
        let mut resolved: Vec<Option<Constant>> = Vec::with_capacity(raw.len());
        let mut pending = VecDeque::new();
        for (index, entry) in raw.iter().enumerate() {
            let leaf = match entry {
                CpInfo::Unusable => None,
                CpInfo::Utf8(value) => Some(Constant::Utf8(value.clone())),
                CpInfo::Integer(value) => Some(Constant::Integer(*value)),
                CpInfo::Float(value) => Some(Constant::Float(*value)),
                CpInfo::Long(value) => Some(Constant::Long(*value)),
                CpInfo::Double(value) => Some(Constant::Double(*value)),
                _ => {
                    pending.push_back(index);
                    None
                }
            };
            resolved.push(leaf);
        }

        let mut round = 0;
        while !pending.is_empty() {
            round += 1;
            trace!("resolution round {round}: {} pending entries", pending.len());
            let mut progressed = false;
            for _ in 0..pending.len() {
                let Some(index) = pending.pop_front() else {
                    break;
                };
                match resolve_entry(&raw, &resolved, &raw[index])? {
                    Some(constant) => {
                        resolved[index] = Some(constant);
                        progressed = true;
                    }
                    None => pending.push_back(index),
                }
            }
            if !progressed {
                return Err(ClassReadError::UnresolvedConstants(pending.len()));
            }
        }

        let mut lookup = HashMap::with_capacity(resolved.len());
        for (index, entry) in resolved.iter().enumerate() {
            if let Some(constant) = entry {
                lookup.entry(constant.clone()).or_insert(index as u16);
            }
        }
        Ok(Self {
            raw,
            resolved,
            lookup,
        })
    }

    /// Writes `constant_pool_count` and every entry, skipping the slot after each long
    /// or double.
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), ClassWriteError> {
        write_u2(out, self.size());
        for entry in self.raw.iter().skip(1) {
            match entry {
                CpInfo::Unusable => {}
                CpInfo::Utf8(value) => {
                    let bytes = encode_modified_utf8(value);
                    if bytes.len() > u16::MAX as usize {
                        return Err(ClassWriteError::StringTooLong(bytes.len()));
                    }
                    write_u1(out, CONSTANT_UTF8);
                    write_u2(out, bytes.len() as u16);
                    out.extend_from_slice(&bytes);
                }
                CpInfo::Integer(value) => {
                    write_u1(out, CONSTANT_INTEGER);
                    write_u4(out, *value as u32);
                }
                CpInfo::Float(value) => {
                    write_u1(out, CONSTANT_FLOAT);
                    write_u4(out, value.to_bits());
                }
                CpInfo::Long(value) => {
                    write_u1(out, CONSTANT_LONG);
                    write_u8(out, *value as u64);
                }
                CpInfo::Double(value) => {
                    write_u1(out, CONSTANT_DOUBLE);
                    write_u8(out, value.to_bits());
                }
                CpInfo::Class { name_index } => {
                    write_u1(out, CONSTANT_CLASS);
                    write_u2(out, *name_index);
                }
                CpInfo::String { string_index } => {
                    write_u1(out, CONSTANT_STRING);
                    write_u2(out, *string_index);
                }
                CpInfo::Fieldref {
                    class_index,
                    name_and_type_index,
                } => {
                    write_u1(out, CONSTANT_FIELDREF);
                    write_u2(out, *class_index);
                    write_u2(out, *name_and_type_index);
                }
                CpInfo::Methodref {
                    class_index,
                    name_and_type_index,
                } => {
                    write_u1(out, CONSTANT_METHODREF);
                    write_u2(out, *class_index);
                    write_u2(out, *name_and_type_index);
                }
                CpInfo::InterfaceMethodref {
                    class_index,
                    name_and_type_index,
                } => {
                    write_u1(out, CONSTANT_INTERFACE_METHODREF);
                    write_u2(out, *class_index);
                    write_u2(out, *name_and_type_index);
                }
                CpInfo::NameAndType {
                    name_index,
                    descriptor_index,
                } => {
                    write_u1(out, CONSTANT_NAME_AND_TYPE);
                    write_u2(out, *name_index);
                    write_u2(out, *descriptor_index);
                }
            }
        }
        Ok(())
    }
}

/// Resolves one reference entry. `Ok(None)` means a dependency is itself still pending.
fn resolve_entry(
    raw: &[CpInfo],
    resolved: &[Option<Constant>],
    entry: &CpInfo,
) -> Result<Option<Constant>, ClassReadError> {
    let constant = match entry {
        CpInfo::Class { name_index } => match dependency(raw, resolved, *name_index)? {
            Some(Constant::Utf8(name)) => {
                Some(text(*name_index, name).map(|name| Constant::Class(name.to_string())))
            }
            _ => Some(Err(unexpected(*name_index, "Utf8"))),
        },
        CpInfo::String { string_index } => match dependency(raw, resolved, *string_index)? {
            Some(Constant::Utf8(value)) => Some(Ok(Constant::String(value.clone()))),
            _ => Some(Err(unexpected(*string_index, "Utf8"))),
        },
        CpInfo::NameAndType {
            name_index,
            descriptor_index,
        } => {
            let name = dependency(raw, resolved, *name_index)?;
            let descriptor = dependency(raw, resolved, *descriptor_index)?;
            match (name, descriptor) {
                (Some(Constant::Utf8(name)), Some(Constant::Utf8(descriptor))) => {
                    let name = text(*name_index, name)?;
                    let descriptor = text(*descriptor_index, descriptor)?;
                    Some(Ok(Constant::NameAndType {
                        name: name.to_string(),
                        descriptor: descriptor.to_string(),
                    }))
                }
                (Some(Constant::Utf8(_)), _) => Some(Err(unexpected(*descriptor_index, "Utf8"))),
                _ => Some(Err(unexpected(*name_index, "Utf8"))),
            }
        }
        CpInfo::Fieldref {
            class_index,
            name_and_type_index,
        } => resolve_member(raw, resolved, *class_index, *name_and_type_index)?
            .map(|member| Ok(Constant::Fieldref(member))),
        CpInfo::Methodref {
            class_index,
            name_and_type_index,
        } => resolve_member(raw, resolved, *class_index, *name_and_type_index)?
            .map(|member| Ok(Constant::Methodref(member))),
        CpInfo::InterfaceMethodref {
            class_index,
            name_and_type_index,
        } => resolve_member(raw, resolved, *class_index, *name_and_type_index)?
            .map(|member| Ok(Constant::InterfaceMethodref(member))),
        _ => None,
    };
    constant.transpose()
}

fn resolve_member(
    raw: &[CpInfo],
    resolved: &[Option<Constant>],
    class_index: u16,
    name_and_type_index: u16,
) -> Result<Option<MemberRef>, ClassReadError> {
    let class = dependency(raw, resolved, class_index)?;
    let name_and_type = dependency(raw, resolved, name_and_type_index)?;
    match (class, name_and_type) {
        (Some(Constant::Class(owner)), Some(Constant::NameAndType { name, descriptor })) => {
            Ok(Some(MemberRef {
                owner: owner.clone(),
                name: name.clone(),
                descriptor: descriptor.clone(),
            }))
        }
        (Some(Constant::Class(_)), Some(_)) => Err(unexpected(name_and_type_index, "NameAndType")),
        (Some(Constant::Class(_)), None) => Ok(None),
        (Some(_), _) => Err(unexpected(class_index, "Class")),
        (None, Some(Constant::NameAndType { .. }) | None) => Ok(None),
        (None, Some(_)) => Err(unexpected(name_and_type_index, "NameAndType")),
    }
}

/// The resolved dependency at `index`, `None` while it is still pending. Indices that
/// point outside the pool or at a reserved slot fail immediately. Utf8 entries are
/// resolved up front, so a pending dependency is never a Utf8.
fn dependency<'a>(
    raw: &[CpInfo],
    resolved: &'a [Option<Constant>],
    index: u16,
) -> Result<Option<&'a Constant>, ClassReadError> {
    match raw.get(index as usize) {
        None | Some(CpInfo::Unusable) => Err(ClassReadError::InvalidIndex(index)),
        Some(_) => Ok(resolved[index as usize].as_ref()),
    }
}

fn unexpected(index: u16, expected: &'static str) -> ClassReadError {
    ClassReadError::UnexpectedConstant { index, expected }
}

fn text(index: u16, value: &JavaStr) -> Result<&str, ClassReadError> {
    value.as_str().map_err(|_| {
        ClassReadError::Utf8Error(format!("entry {index} holds an unpaired surrogate"))
    })
}

/// Decodes the JVM's modified UTF-8: two-byte NUL, supplementary characters as
/// surrogate pairs, and unpaired surrogates kept as they are.
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<JavaString, ClassReadError> {
    JavaStr::from_modified_utf8(bytes)
        .map(Cow::into_owned)
        .map_err(|err| ClassReadError::Utf8Error(err.to_string()))
}

pub fn encode_modified_utf8(value: &JavaStr) -> Cow<'_, [u8]> {
    value.to_modified_utf8()
}
