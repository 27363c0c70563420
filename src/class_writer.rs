use std::collections::BTreeSet;

use bitflags::bitflags;
use log::{debug, warn};

use crate::attribute::{AttributeKind, write_attribute};
use crate::bytecode;
use crate::constant_pool::{Constant, ConstantPool};
use crate::constants::MAGIC;
use crate::error::ClassWriteError;
use crate::nodes::{ClassNode, CodeNode, FieldNode, MethodNode};
use crate::stack;

bitflags! {
    /// Options for [`ClassWriter`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WriterFlags: u32 {
        /// Recompute `max_stack` and `max_locals` for every method body instead of
        /// writing the values stored in its [`CodeNode`].
        const COMPUTE_MAXS = 0x2;
    }
}

impl Default for WriterFlags {
    fn default() -> Self {
        WriterFlags::COMPUTE_MAXS
    }
}

/// Serializes a [`ClassNode`] into class-file bytes, rebuilding the constant pool from
/// scratch.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassWriter {
    flags: WriterFlags,
}

/// Pool indices of the attribute names, by [`AttributeKind`]. Unused kinds stay 0.
type AttributeNames = [u16; AttributeKind::ALL.len()];

struct FieldIndices {
    name: u16,
    descriptor: u16,
    constant_value: u16,
    signature: u16,
}

struct MethodIndices {
    name: u16,
    descriptor: u16,
    code: Option<EncodedCode>,
    exceptions: Vec<u16>,
    signature: u16,
}

struct EncodedCode {
    max_stack: u16,
    max_locals: u16,
    bytes: Vec<u8>,
    /// start_pc, end_pc, handler_pc, catch_type
    handlers: Vec<[u16; 4]>,
}

impl ClassWriter {
    pub fn new(flags: WriterFlags) -> Self {
        Self { flags }
    }

    pub fn write(&self, class: &ClassNode) -> Result<Vec<u8>, ClassWriteError> {
        for method in &class.methods {
            if let Some(code) = &method.code {
                check_exception_table(code)?;
            }
        }

        let mut pool = ConstantPool::new();
        let mut names: AttributeNames = [0; AttributeKind::ALL.len()];
        for kind in used_attributes(class) {
            names[kind as usize] = pool.insert_utf8(kind.name())?;
        }

        let this_class = pool.insert_class(&class.name)?;
        let super_class =
            pool.insert_optional(class.super_name.clone().map(Constant::Class))?;
        let source_file = pool.insert_optional_utf8(class.source_file.as_deref())?;
        let signature = pool.insert_optional_utf8(class.signature.as_deref())?;
        let interfaces = class
            .interfaces
            .iter()
            .map(|name| pool.insert_class(name))
            .collect::<Result<Vec<_>, _>>()?;

        let mut fields = Vec::with_capacity(class.fields.len());
        for field in &class.fields {
            fields.push(FieldIndices {
                name: pool.insert_utf8(&field.name)?,
                descriptor: pool.insert_utf8(&field.descriptor)?,
                constant_value: pool
                    .insert_optional(field.constant_value.as_ref().map(Constant::from))?,
                signature: pool.insert_optional_utf8(field.signature.as_deref())?,
            });
        }

        let mut methods = Vec::with_capacity(class.methods.len());
        for method in &class.methods {
            methods.push(self.stage_method(method, &mut pool)?);
        }

        let mut inner_classes = Vec::with_capacity(class.inner_classes.len());
        for inner in &class.inner_classes {
            inner_classes.push([
                pool.insert_class(&inner.inner_class)?,
                pool.insert_optional(inner.outer_class.clone().map(Constant::Class))?,
                pool.insert_optional_utf8(inner.inner_name.as_deref())?,
                inner.access.bits(),
            ]);
        }
        let enclosing_method = match &class.enclosing_method {
            Some(enclosing) => {
                let owner = pool.insert_class(&enclosing.owner)?;
                let method = pool.insert_optional(enclosing.method.clone().map(
                    |(name, descriptor)| Constant::NameAndType { name, descriptor },
                ))?;
                Some([owner, method])
            }
            None => None,
        };

        for hook in class.pool_hooks.iter() {
            hook.apply(&mut pool)?;
        }
        debug!(
            "constant pool for {} has {} slots after {} hooks",
            class.name,
            pool.size(),
            class.pool_hooks.0.len()
        );

        let mut out = Vec::new();
        write_u4(&mut out, MAGIC);
        write_u2(&mut out, class.minor_version);
        write_u2(&mut out, class.major_version);
        pool.encode(&mut out)?;
        write_u2(&mut out, class.access.bits());
        write_u2(&mut out, this_class);
        write_u2(&mut out, super_class);
        write_u2(&mut out, entry_count("interfaces", interfaces.len())?);
        for index in interfaces {
            write_u2(&mut out, index);
        }

        write_u2(&mut out, entry_count("fields", fields.len())?);
        for (field, indices) in class.fields.iter().zip(&fields) {
            write_field(&mut out, &names, field, indices);
        }
        write_u2(&mut out, entry_count("methods", methods.len())?);
        for (method, indices) in class.methods.iter().zip(&methods) {
            write_method(&mut out, &names, method, indices)?;
        }

        let mut attributes = Vec::new();
        if class.deprecated {
            attributes.push((AttributeKind::Deprecated, Vec::new()));
        }
        if class.synthetic {
            attributes.push((AttributeKind::Synthetic, Vec::new()));
        }
        if signature != 0 {
            attributes.push((AttributeKind::Signature, u2_payload(signature)));
        }
        if source_file != 0 {
            attributes.push((AttributeKind::SourceFile, u2_payload(source_file)));
        }
        if !inner_classes.is_empty() {
            let mut payload = Vec::with_capacity(2 + 8 * inner_classes.len());
            write_u2(&mut payload, entry_count("inner classes", inner_classes.len())?);
            for entry in &inner_classes {
                for value in entry {
                    write_u2(&mut payload, *value);
                }
            }
            attributes.push((AttributeKind::InnerClasses, payload));
        }
        if let Some([owner, method]) = enclosing_method {
            let mut payload = u2_payload(owner);
            write_u2(&mut payload, method);
            attributes.push((AttributeKind::EnclosingMethod, payload));
        }
        write_attributes(&mut out, &names, &attributes);

        debug!("wrote class {} ({} bytes)", class.name, out.len());
        Ok(out)
    }

    fn stage_method(
        &self,
        method: &MethodNode,
        pool: &mut ConstantPool,
    ) -> Result<MethodIndices, ClassWriteError> {
        let name = pool.insert_utf8(&method.name)?;
        let descriptor = pool.insert_utf8(&method.descriptor)?;
        let mut code = match &method.code {
            Some(code) => Some(self.encode_code(method, code, pool)?),
            None => None,
        };
        let exceptions = method
            .exceptions
            .iter()
            .map(|name| pool.insert_class(name))
            .collect::<Result<Vec<_>, _>>()?;
        if let (Some(encoded), Some(node)) = (&mut code, &method.code) {
            for (handler, entry) in encoded.handlers.iter_mut().zip(&node.exception_table) {
                handler[3] = pool.insert_optional(entry.catch_type.clone().map(Constant::Class))?;
            }
        }
        let signature = pool.insert_optional_utf8(method.signature.as_deref())?;
        Ok(MethodIndices {
            name,
            descriptor,
            code,
            exceptions,
            signature,
        })
    }

    /// Emits the code array and resolves everything that depends on its layout. Catch
    /// types are filled in by the caller so they enter the pool after thrown exceptions.
    fn encode_code(
        &self,
        method: &MethodNode,
        code: &CodeNode,
        pool: &mut ConstantPool,
    ) -> Result<EncodedCode, ClassWriteError> {
        let (bytes, offsets) = bytecode::encode(&code.instructions, pool)?;
        let mut handlers = Vec::with_capacity(code.exception_table.len());
        for entry in &code.exception_table {
            let offset = |index: usize| {
                offsets
                    .offset_of(index)
                    .map(|offset| offset as u16)
                    .ok_or(ClassWriteError::InvalidExceptionRange {
                        start: entry.start,
                        end: entry.end,
                        handler: entry.handler,
                        len: code.instructions.len(),
                    })
            };
            handlers.push([offset(entry.start)?, offset(entry.end)?, offset(entry.handler)?, 0]);
        }

        let (max_stack, max_locals) = if self.flags.contains(WriterFlags::COMPUTE_MAXS) {
            let max_stack = stack::max_stack(&code.instructions, &code.exception_table)?;
            let max_locals = stack::max_locals(
                &code.instructions,
                &method.descriptor,
                method.access.is_static(),
            )?
            .max(code.max_locals);
            if code.max_stack != 0 && code.max_stack < max_stack {
                warn!(
                    "{}{} declares max_stack {} but needs {}",
                    method.name, method.descriptor, code.max_stack, max_stack
                );
            }
            (max_stack, max_locals)
        } else {
            (code.max_stack, code.max_locals)
        };
        debug!(
            "encoded {}{}: {} bytes, max_stack {max_stack}, max_locals {max_locals}",
            method.name,
            method.descriptor,
            bytes.len()
        );
        Ok(EncodedCode {
            max_stack,
            max_locals,
            bytes,
            handlers,
        })
    }
}

fn check_exception_table(code: &CodeNode) -> Result<(), ClassWriteError> {
    let len = code.instructions.len();
    for entry in &code.exception_table {
        if entry.start > entry.end || entry.end > len || entry.handler >= len {
            return Err(ClassWriteError::InvalidExceptionRange {
                start: entry.start,
                end: entry.end,
                handler: entry.handler,
                len,
            });
        }
    }
    Ok(())
}

/// Every attribute kind the class will carry, in pool insertion order.
fn used_attributes(class: &ClassNode) -> BTreeSet<AttributeKind> {
    let mut used = BTreeSet::new();
    let mut mark = |present: bool, kind: AttributeKind| {
        if present {
            used.insert(kind);
        }
    };
    mark(class.deprecated, AttributeKind::Deprecated);
    mark(class.synthetic, AttributeKind::Synthetic);
    mark(class.source_file.is_some(), AttributeKind::SourceFile);
    mark(class.signature.is_some(), AttributeKind::Signature);
    mark(!class.inner_classes.is_empty(), AttributeKind::InnerClasses);
    mark(class.enclosing_method.is_some(), AttributeKind::EnclosingMethod);
    for field in &class.fields {
        mark(field.deprecated, AttributeKind::Deprecated);
        mark(field.synthetic, AttributeKind::Synthetic);
        mark(field.constant_value.is_some(), AttributeKind::ConstantValue);
        mark(field.signature.is_some(), AttributeKind::Signature);
    }
    for method in &class.methods {
        mark(method.deprecated, AttributeKind::Deprecated);
        mark(method.synthetic, AttributeKind::Synthetic);
        mark(method.code.is_some(), AttributeKind::Code);
        mark(!method.exceptions.is_empty(), AttributeKind::Exceptions);
        mark(method.signature.is_some(), AttributeKind::Signature);
    }
    used
}

fn write_field(out: &mut Vec<u8>, names: &AttributeNames, field: &FieldNode, indices: &FieldIndices) {
    write_u2(out, field.access.bits());
    write_u2(out, indices.name);
    write_u2(out, indices.descriptor);

    let mut attributes = Vec::new();
    if field.deprecated {
        attributes.push((AttributeKind::Deprecated, Vec::new()));
    }
    if field.synthetic {
        attributes.push((AttributeKind::Synthetic, Vec::new()));
    }
    if indices.constant_value != 0 {
        attributes.push((AttributeKind::ConstantValue, u2_payload(indices.constant_value)));
    }
    if indices.signature != 0 {
        attributes.push((AttributeKind::Signature, u2_payload(indices.signature)));
    }
    write_attributes(out, names, &attributes);
}

fn write_method(
    out: &mut Vec<u8>,
    names: &AttributeNames,
    method: &MethodNode,
    indices: &MethodIndices,
) -> Result<(), ClassWriteError> {
    write_u2(out, method.access.bits());
    write_u2(out, indices.name);
    write_u2(out, indices.descriptor);

    let mut attributes = Vec::new();
    if method.deprecated {
        attributes.push((AttributeKind::Deprecated, Vec::new()));
    }
    if method.synthetic {
        attributes.push((AttributeKind::Synthetic, Vec::new()));
    }
    if let Some(code) = &indices.code {
        attributes.push((AttributeKind::Code, code_payload(code)?));
    }
    if !indices.exceptions.is_empty() {
        let mut payload = Vec::with_capacity(2 + 2 * indices.exceptions.len());
        write_u2(&mut payload, entry_count("thrown exceptions", indices.exceptions.len())?);
        for index in &indices.exceptions {
            write_u2(&mut payload, *index);
        }
        attributes.push((AttributeKind::Exceptions, payload));
    }
    if indices.signature != 0 {
        attributes.push((AttributeKind::Signature, u2_payload(indices.signature)));
    }
    write_attributes(out, names, &attributes);
    Ok(())
}

fn code_payload(code: &EncodedCode) -> Result<Vec<u8>, ClassWriteError> {
    let mut payload = Vec::with_capacity(12 + code.bytes.len() + 8 * code.handlers.len());
    write_u2(&mut payload, code.max_stack);
    write_u2(&mut payload, code.max_locals);
    write_u4(&mut payload, code.bytes.len() as u32);
    payload.extend_from_slice(&code.bytes);
    write_u2(&mut payload, entry_count("exception handlers", code.handlers.len())?);
    for handler in &code.handlers {
        for value in handler {
            write_u2(&mut payload, *value);
        }
    }
    // No nested attributes.
    write_u2(&mut payload, 0);
    Ok(payload)
}

/// A `u2` count field.
fn entry_count(what: &'static str, count: usize) -> Result<u16, ClassWriteError> {
    u16::try_from(count).map_err(|_| ClassWriteError::TooManyEntries { what, count })
}

fn write_attributes(out: &mut Vec<u8>, names: &AttributeNames, attributes: &[(AttributeKind, Vec<u8>)]) {
    write_u2(out, attributes.len() as u16);
    for (kind, payload) in attributes {
        write_attribute(out, names[*kind as usize], payload);
    }
}

fn u2_payload(value: u16) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

pub(crate) fn write_u1(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

pub(crate) fn write_u2(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn write_u4(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn write_u8(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn write_i1(out: &mut Vec<u8>, value: i8) {
    out.push(value as u8);
}

pub(crate) fn write_i2(out: &mut Vec<u8>, value: i16) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn write_i4(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_be_bytes());
}
