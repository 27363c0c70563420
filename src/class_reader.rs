use bitflags::bitflags;
use log::debug;

use crate::access::{ClassAccess, FieldAccess, InnerClassAccess, MethodAccess};
use crate::attribute::{AttributeContext, AttributeKind, read_attributes};
use crate::bytecode;
use crate::constant_pool::ConstantPool;
use crate::constants::MAGIC;
use crate::error::ClassReadError;
use crate::insn::Literal;
use crate::nodes::{
    ClassNode, CodeNode, EnclosingMethod, ExceptionTableEntry, FieldNode, InnerClassNode,
    MethodNode, PoolHooks,
};

bitflags! {
    /// Options for [`ClassReader::read`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ReaderFlags: u32 {
        /// Leave every `MethodNode::code` empty instead of decoding bytecode.
        const SKIP_CODE = 0x1;
    }
}

/// Decodes a class file into a [`ClassNode`].
pub struct ClassReader {
    bytes: Vec<u8>,
    flags: ReaderFlags,
}

impl ClassReader {
    pub fn new(bytes: &[u8], flags: ReaderFlags) -> Self {
        Self {
            bytes: bytes.to_vec(),
            flags,
        }
    }

    /// Parses the whole file. Any malformed structure aborts the read.
    pub fn read(&self) -> Result<ClassNode, ClassReadError> {
        let mut reader = ByteReader::new(&self.bytes);
        let magic = reader.read_u4()?;
        if magic != MAGIC {
            return Err(ClassReadError::InvalidMagic(magic));
        }
        let minor_version = reader.read_u2()?;
        let major_version = reader.read_u2()?;
        let pool = ConstantPool::decode(&mut reader)?;
        debug!(
            "read constant pool of {} slots (version {major_version}.{minor_version})",
            pool.size()
        );

        let access = ClassAccess::from_bits_retain(reader.read_u2()?);
        let name = pool.class_name(reader.read_u2()?)?.to_string();
        let super_name = pool.optional_class_name(reader.read_u2()?)?.map(str::to_string);
        let interface_count = reader.read_u2()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(pool.class_name(reader.read_u2()?)?.to_string());
        }

        let field_count = reader.read_u2()?;
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            fields.push(read_field(&mut reader, &pool)?);
        }
        let method_count = reader.read_u2()?;
        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            methods.push(read_method(&mut reader, &pool, self.flags)?);
        }

        let mut class = ClassNode {
            minor_version,
            major_version,
            access,
            name,
            super_name,
            interfaces,
            fields,
            methods,
            inner_classes: Vec::new(),
            enclosing_method: None,
            source_file: None,
            signature: None,
            deprecated: false,
            synthetic: false,
            pool_hooks: PoolHooks::default(),
        };
        read_attributes(&mut reader, &pool, AttributeContext::Class, |kind, body| {
            match kind {
                AttributeKind::Deprecated => class.deprecated = true,
                AttributeKind::Synthetic => class.synthetic = true,
                AttributeKind::SourceFile => {
                    class.source_file = Some(pool.utf8(body.read_u2()?)?.to_string())
                }
                AttributeKind::Signature => {
                    class.signature = Some(pool.utf8(body.read_u2()?)?.to_string())
                }
                AttributeKind::InnerClasses => class.inner_classes = read_inner_classes(body, &pool)?,
                AttributeKind::EnclosingMethod => {
                    let owner = pool.class_name(body.read_u2()?)?.to_string();
                    let method_index = body.read_u2()?;
                    let method = if method_index == 0 {
                        None
                    } else {
                        let (name, descriptor) = pool.name_and_type(method_index)?;
                        Some((name.to_string(), descriptor.to_string()))
                    };
                    class.enclosing_method = Some(EnclosingMethod { owner, method });
                }
                _ => {}
            }
            Ok(())
        })?;

        debug!(
            "read class {}: {} fields, {} methods, {} inner classes",
            class.name,
            class.fields.len(),
            class.methods.len(),
            class.inner_classes.len()
        );
        Ok(class)
    }
}

fn read_field(reader: &mut ByteReader<'_>, pool: &ConstantPool) -> Result<FieldNode, ClassReadError> {
    let access = FieldAccess::from_bits_retain(reader.read_u2()?);
    let name = pool.utf8(reader.read_u2()?)?;
    let descriptor = pool.utf8(reader.read_u2()?)?;
    let mut field = FieldNode::new(access, name, descriptor);
    read_attributes(reader, pool, AttributeContext::Field, |kind, body| {
        match kind {
            AttributeKind::Deprecated => field.deprecated = true,
            AttributeKind::Synthetic => field.synthetic = true,
            AttributeKind::ConstantValue => {
                let index = body.read_u2()?;
                field.constant_value = match pool.literal(index)? {
                    Literal::Class(_) => {
                        return Err(ClassReadError::UnexpectedConstant {
                            index,
                            expected: "constant value",
                        });
                    }
                    value => Some(value),
                };
            }
            AttributeKind::Signature => {
                field.signature = Some(pool.utf8(body.read_u2()?)?.to_string())
            }
            _ => {}
        }
        Ok(())
    })?;
    Ok(field)
}

fn read_method(
    reader: &mut ByteReader<'_>,
    pool: &ConstantPool,
    flags: ReaderFlags,
) -> Result<MethodNode, ClassReadError> {
    let access = MethodAccess::from_bits_retain(reader.read_u2()?);
    let name = pool.utf8(reader.read_u2()?)?;
    let descriptor = pool.utf8(reader.read_u2()?)?;
    let mut method = MethodNode::new(access, name, descriptor);
    read_attributes(reader, pool, AttributeContext::Method, |kind, body| {
        match kind {
            AttributeKind::Deprecated => method.deprecated = true,
            AttributeKind::Synthetic => method.synthetic = true,
            AttributeKind::Code if flags.contains(ReaderFlags::SKIP_CODE) => {
                body.read_bytes(body.remaining())?;
            }
            AttributeKind::Code => method.code = Some(read_code(body, pool)?),
            AttributeKind::Exceptions => {
                let count = body.read_u2()?;
                let mut exceptions = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    exceptions.push(pool.class_name(body.read_u2()?)?.to_string());
                }
                method.exceptions = exceptions;
            }
            AttributeKind::Signature => {
                method.signature = Some(pool.utf8(body.read_u2()?)?.to_string())
            }
            _ => {}
        }
        Ok(())
    })?;
    if let Some(code) = &method.code {
        debug!(
            "read method {}{}: {} instructions, {} handlers, max_stack {}, max_locals {}",
            method.name,
            method.descriptor,
            code.instructions.len(),
            code.exception_table.len(),
            code.max_stack,
            code.max_locals
        );
    }
    Ok(method)
}

fn read_code(body: &mut ByteReader<'_>, pool: &ConstantPool) -> Result<CodeNode, ClassReadError> {
    let max_stack = body.read_u2()?;
    let max_locals = body.read_u2()?;
    let code_length = body.read_u4()? as usize;
    let code = body.read_bytes(code_length)?;
    let (instructions, offsets) = bytecode::decode(code, pool)?;

    let handler_count = body.read_u2()?;
    let mut exception_table = Vec::with_capacity(handler_count as usize);
    for _ in 0..handler_count {
        let start_pc = body.read_u2()? as usize;
        let end_pc = body.read_u2()? as usize;
        let handler_pc = body.read_u2()? as usize;
        let catch_type = pool.optional_class_name(body.read_u2()?)?.map(str::to_string);
        let start = offsets.index_of(start_pc);
        let end = offsets.index_of(end_pc);
        let handler = offsets
            .index_of(handler_pc)
            .filter(|&index| index < instructions.len());
        match (start, end, handler) {
            (Some(start), Some(end), Some(handler)) if start <= end => {
                exception_table.push(ExceptionTableEntry {
                    start,
                    end,
                    handler,
                    catch_type,
                })
            }
            _ => {
                return Err(ClassReadError::InvalidAttribute(format!(
                    "Code exception range {start_pc}..{end_pc} with handler {handler_pc}"
                )));
            }
        }
    }
    read_attributes(body, pool, AttributeContext::Code, |_, _| Ok(()))?;

    Ok(CodeNode {
        max_stack,
        max_locals,
        instructions,
        exception_table,
    })
}

fn read_inner_classes(
    body: &mut ByteReader<'_>,
    pool: &ConstantPool,
) -> Result<Vec<InnerClassNode>, ClassReadError> {
    let count = body.read_u2()?;
    let mut classes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let inner_class = pool.class_name(body.read_u2()?)?.to_string();
        let outer_class = pool.optional_class_name(body.read_u2()?)?.map(str::to_string);
        let inner_name = match body.read_u2()? {
            0 => None,
            index => Some(pool.utf8(index)?.to_string()),
        };
        let access = InnerClassAccess::from_bits_retain(body.read_u2()?);
        classes.push(InnerClassNode {
            inner_class,
            outer_class,
            inner_name,
            access,
        });
    }
    Ok(classes)
}

/// Big-endian cursor over a byte slice. Every read past the end is
/// [`ClassReadError::UnexpectedEof`].
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Skips the padding that aligns a switch's operands, given the switch's own offset.
    pub fn align4(&mut self, opcode_offset: usize) -> Result<(), ClassReadError> {
        let padding = (4 - ((opcode_offset + 1) % 4)) % 4;
        self.read_bytes(padding)?;
        Ok(())
    }

    pub fn read_u1(&mut self) -> Result<u8, ClassReadError> {
        let value = *self.data.get(self.pos).ok_or(ClassReadError::UnexpectedEof)?;
        self.pos += 1;
        Ok(value)
    }

    pub fn read_i1(&mut self) -> Result<i8, ClassReadError> {
        Ok(self.read_u1()? as i8)
    }

    pub fn read_u2(&mut self) -> Result<u16, ClassReadError> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    pub fn read_i2(&mut self) -> Result<i16, ClassReadError> {
        Ok(i16::from_be_bytes(self.read_array()?))
    }

    pub fn read_u4(&mut self) -> Result<u32, ClassReadError> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    pub fn read_i4(&mut self) -> Result<i32, ClassReadError> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    pub fn read_u8(&mut self) -> Result<u64, ClassReadError> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ClassReadError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(ClassReadError::UnexpectedEof)?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ClassReadError> {
        let mut array = [0; N];
        array.copy_from_slice(self.read_bytes(N)?);
        Ok(array)
    }
}
