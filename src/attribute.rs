//! Attribute framing: which attribute names are understood where, and skipping the rest.

use log::debug;

use crate::class_reader::ByteReader;
use crate::class_writer::{write_u2, write_u4};
use crate::constant_pool::ConstantPool;
use crate::constants::*;
use crate::error::ClassReadError;

/// Where an attribute table sits. Each context recognizes a fixed set of names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeContext {
    Class,
    Field,
    Method,
    /// Attributes nested in `Code`; none are interpreted.
    Code,
}

/// The attributes this crate reads and writes. Declaration order is the order in which
/// their names enter a freshly written constant pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttributeKind {
    Deprecated,
    Synthetic,
    ConstantValue,
    Code,
    Exceptions,
    Signature,
    SourceFile,
    InnerClasses,
    EnclosingMethod,
}

impl AttributeKind {
    pub const ALL: [AttributeKind; 9] = [
        AttributeKind::Deprecated,
        AttributeKind::Synthetic,
        AttributeKind::ConstantValue,
        AttributeKind::Code,
        AttributeKind::Exceptions,
        AttributeKind::Signature,
        AttributeKind::SourceFile,
        AttributeKind::InnerClasses,
        AttributeKind::EnclosingMethod,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AttributeKind::Deprecated => ATTR_DEPRECATED,
            AttributeKind::Synthetic => ATTR_SYNTHETIC,
            AttributeKind::ConstantValue => ATTR_CONSTANT_VALUE,
            AttributeKind::Code => ATTR_CODE,
            AttributeKind::Exceptions => ATTR_EXCEPTIONS,
            AttributeKind::Signature => ATTR_SIGNATURE,
            AttributeKind::SourceFile => ATTR_SOURCE_FILE,
            AttributeKind::InnerClasses => ATTR_INNER_CLASSES,
            AttributeKind::EnclosingMethod => ATTR_ENCLOSING_METHOD,
        }
    }

    /// Maps an attribute name to a kind if `context` interprets it.
    pub fn recognize(name: &str, context: AttributeContext) -> Option<Self> {
        let kind = Self::ALL.into_iter().find(|kind| kind.name() == name)?;
        let allowed = match context {
            AttributeContext::Class => matches!(
                kind,
                AttributeKind::Deprecated
                    | AttributeKind::Synthetic
                    | AttributeKind::SourceFile
                    | AttributeKind::Signature
                    | AttributeKind::InnerClasses
                    | AttributeKind::EnclosingMethod
            ),
            AttributeContext::Field => matches!(
                kind,
                AttributeKind::Deprecated
                    | AttributeKind::Synthetic
                    | AttributeKind::ConstantValue
                    | AttributeKind::Signature
            ),
            AttributeContext::Method => matches!(
                kind,
                AttributeKind::Deprecated
                    | AttributeKind::Synthetic
                    | AttributeKind::Code
                    | AttributeKind::Exceptions
                    | AttributeKind::Signature
            ),
            AttributeContext::Code => false,
        };
        allowed.then_some(kind)
    }
}

/// Reads an attribute table, handing each recognized attribute's payload to `parse`.
///
/// Unrecognized attributes are skipped by their declared length. A recognized attribute
/// must consume its payload exactly.
pub fn read_attributes<F>(
    reader: &mut ByteReader<'_>,
    pool: &ConstantPool,
    context: AttributeContext,
    mut parse: F,
) -> Result<(), ClassReadError>
where
    F: FnMut(AttributeKind, &mut ByteReader<'_>) -> Result<(), ClassReadError>,
{
    let count = reader.read_u2()?;
    for _ in 0..count {
        let name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        let name = pool.utf8(name_index)?;
        let payload = reader.read_bytes(length)?;
        let Some(kind) = AttributeKind::recognize(name, context) else {
            debug!("skipping {context:?} attribute {name} ({length} bytes)");
            continue;
        };
        let mut body = ByteReader::new(payload);
        parse(kind, &mut body).map_err(|err| match err {
            ClassReadError::UnexpectedEof => ClassReadError::InvalidAttribute(format!(
                "{name} is shorter than its layout"
            )),
            other => other,
        })?;
        if body.remaining() != 0 {
            return Err(ClassReadError::InvalidAttribute(format!(
                "{name} has {} trailing bytes",
                body.remaining()
            )));
        }
    }
    Ok(())
}

/// Writes one attribute record: name index, 4-byte length, payload.
pub fn write_attribute(out: &mut Vec<u8>, name_index: u16, payload: &[u8]) {
    write_u2(out, name_index);
    write_u4(out, payload.len() as u32);
    out.extend_from_slice(payload);
}
