//! Conversion between a raw `code` array and an [`Insn`] sequence.
//!
//! Branch operands are byte displacements in the file and instruction indices in the
//! model. Decoding records the offset of every instruction so displacements can be
//! mapped; encoding first stages pool indices, then lays the code out until every
//! `goto`/`jsr` has a form that reaches its target.

use log::trace;

use crate::class_reader::ByteReader;
use crate::class_writer::{write_i1, write_i2, write_i4, write_u1, write_u2};
use crate::constant_pool::{Constant, ConstantPool, RefKind};
use crate::descriptor;
use crate::error::{ClassReadError, ClassWriteError};
use crate::insn::{
    FieldInsnNode, IincInsnNode, Insn, InsnNode, IntInsnNode, InvokeInterfaceInsnNode,
    JumpInsnNode, LdcInsnNode, LookupSwitchInsnNode, MethodInsnNode, MultiANewArrayInsnNode,
    Staged, TableSwitchInsnNode, TypeInsnNode, VarInsnNode, switch_padding,
};
use crate::opcodes;

/// Instruction start offsets of a decoded or laid-out code array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetMap {
    offsets: Vec<usize>,
    code_length: usize,
}

impl OffsetMap {
    /// Index of the instruction starting at `offset`. The end of the code maps to the
    /// instruction count, which is a valid exclusive range end.
    pub fn index_of(&self, offset: usize) -> Option<usize> {
        if offset == self.code_length {
            return Some(self.offsets.len());
        }
        self.offsets.binary_search(&offset).ok()
    }

    /// Byte offset of instruction `index`; the instruction count maps to the code length.
    pub fn offset_of(&self, index: usize) -> Option<usize> {
        if index == self.offsets.len() {
            return Some(self.code_length);
        }
        self.offsets.get(index).copied()
    }

    pub fn code_length(&self) -> usize {
        self.code_length
    }
}

/// Decodes a code array. Branch targets come back as instruction indices.
pub fn decode(code: &[u8], pool: &ConstantPool) -> Result<(Vec<Insn>, OffsetMap), ClassReadError> {
    let mut reader = ByteReader::new(code);
    let mut insns = Vec::new();
    let mut offsets = Vec::new();

    while reader.remaining() > 0 {
        let opcode_offset = reader.pos();
        insns.push(read_insn(&mut reader, pool, opcode_offset)?);
        offsets.push(opcode_offset);
    }

    let map = OffsetMap {
        offsets,
        code_length: code.len(),
    };
    for (index, insn) in insns.iter_mut().enumerate() {
        let origin = map.offsets[index];
        let resolve = |target: &mut usize| -> Result<(), ClassReadError> {
            // Raw targets were stored as absolute offsets while reading.
            match map.index_of(*target) {
                Some(found) if *target < map.code_length => {
                    *target = found;
                    Ok(())
                }
                _ => Err(ClassReadError::InvalidBranchTarget {
                    offset: origin,
                    target: *target as i64,
                }),
            }
        };
        match insn {
            Insn::Jump(node) => resolve(&mut node.target)?,
            Insn::TableSwitch(node) => {
                resolve(&mut node.default)?;
                for target in node.targets.iter_mut() {
                    resolve(target)?;
                }
            }
            Insn::LookupSwitch(node) => {
                resolve(&mut node.default)?;
                for (_, target) in node.pairs.iter_mut() {
                    resolve(target)?;
                }
            }
            _ => {}
        }
    }
    Ok((insns, map))
}

fn read_insn(
    reader: &mut ByteReader<'_>,
    pool: &ConstantPool,
    opcode_offset: usize,
) -> Result<Insn, ClassReadError> {
    let opcode = reader.read_u1()?;
    let insn = match opcode {
        opcodes::NOP..=opcodes::DCONST_1 => Insn::Simple(InsnNode { opcode }),
        opcodes::BIPUSH => IntInsnNode::new(opcode, reader.read_i1()? as i32).into(),
        opcodes::SIPUSH => IntInsnNode::new(opcode, reader.read_i2()? as i32).into(),
        opcodes::LDC => {
            let index = reader.read_u1()? as u16;
            read_ldc(pool, index, false)?
        }
        opcodes::LDC_W => read_ldc(pool, reader.read_u2()?, false)?,
        opcodes::LDC2_W => read_ldc(pool, reader.read_u2()?, true)?,
        opcodes::ILOAD..=opcodes::ALOAD | opcodes::ISTORE..=opcodes::ASTORE | opcodes::RET => {
            VarInsnNode::new(opcode, reader.read_u1()? as u16).into()
        }
        opcodes::ILOAD_0..=opcodes::ALOAD_3 => {
            let rel = opcode - opcodes::ILOAD_0;
            VarInsnNode::new(opcodes::ILOAD + rel / 4, (rel % 4) as u16).into()
        }
        opcodes::IALOAD..=opcodes::SALOAD => Insn::Simple(InsnNode { opcode }),
        opcodes::ISTORE_0..=opcodes::ASTORE_3 => {
            let rel = opcode - opcodes::ISTORE_0;
            VarInsnNode::new(opcodes::ISTORE + rel / 4, (rel % 4) as u16).into()
        }
        opcodes::IASTORE..=opcodes::LXOR => Insn::Simple(InsnNode { opcode }),
        opcodes::IINC => {
            let var_index = reader.read_u1()? as u16;
            let increment = reader.read_i1()? as i16;
            IincInsnNode::new(var_index, increment).into()
        }
        opcodes::I2L..=opcodes::DCMPG => Insn::Simple(InsnNode { opcode }),
        opcodes::IFEQ..=opcodes::JSR | opcodes::IFNULL | opcodes::IFNONNULL => {
            let target = absolute(opcode_offset, reader.read_i2()? as i32)?;
            JumpInsnNode::new(opcode, target).into()
        }
        opcodes::TABLESWITCH => read_table_switch(reader, opcode_offset)?,
        opcodes::LOOKUPSWITCH => read_lookup_switch(reader, opcode_offset)?,
        opcodes::IRETURN..=opcodes::RETURN => Insn::Simple(InsnNode { opcode }),
        opcodes::GETSTATIC..=opcodes::PUTFIELD => {
            let index = reader.read_u2()?;
            match pool.member_ref(index)? {
                (RefKind::Field, member) => Insn::Field(FieldInsnNode {
                    insn: InsnNode { opcode },
                    field_ref: member.clone(),
                }),
                _ => {
                    return Err(ClassReadError::UnexpectedConstant {
                        index,
                        expected: "Fieldref",
                    });
                }
            }
        }
        opcodes::INVOKEVIRTUAL..=opcodes::INVOKESTATIC => {
            let index = reader.read_u2()?;
            match pool.member_ref(index)? {
                (RefKind::Field, _) => {
                    return Err(ClassReadError::UnexpectedConstant {
                        index,
                        expected: "Methodref",
                    });
                }
                (kind, member) => Insn::Method(MethodInsnNode {
                    insn: InsnNode { opcode },
                    method_ref: member.clone(),
                    interface: kind == RefKind::InterfaceMethod,
                }),
            }
        }
        opcodes::INVOKEINTERFACE => {
            let index = reader.read_u2()?;
            let _count = reader.read_u1()?;
            let _zero = reader.read_u1()?;
            match pool.member_ref(index)? {
                (RefKind::Field, _) => {
                    return Err(ClassReadError::UnexpectedConstant {
                        index,
                        expected: "InterfaceMethodref",
                    });
                }
                (_, member) => Insn::InvokeInterface(InvokeInterfaceInsnNode {
                    method_ref: member.clone(),
                }),
            }
        }
        opcodes::NEW | opcodes::ANEWARRAY | opcodes::CHECKCAST | opcodes::INSTANCEOF => {
            let name = pool.class_name(reader.read_u2()?)?;
            TypeInsnNode::new(opcode, name).into()
        }
        opcodes::NEWARRAY => IntInsnNode::new(opcode, reader.read_u1()? as i32).into(),
        opcodes::ARRAYLENGTH | opcodes::ATHROW | opcodes::MONITORENTER | opcodes::MONITOREXIT => {
            Insn::Simple(InsnNode { opcode })
        }
        opcodes::WIDE => read_wide(reader, opcode_offset)?,
        opcodes::MULTIANEWARRAY => {
            let name = pool.class_name(reader.read_u2()?)?;
            MultiANewArrayInsnNode::new(name, reader.read_u1()?).into()
        }
        opcodes::GOTO_W | opcodes::JSR_W => {
            let target = absolute(opcode_offset, reader.read_i4()?)?;
            let narrow = if opcode == opcodes::GOTO_W {
                opcodes::GOTO
            } else {
                opcodes::JSR
            };
            JumpInsnNode::new(narrow, target).into()
        }
        _ => {
            return Err(ClassReadError::InvalidOpcode {
                opcode,
                offset: opcode_offset,
            });
        }
    };
    Ok(insn)
}

fn absolute(opcode_offset: usize, displacement: i32) -> Result<usize, ClassReadError> {
    let target = opcode_offset as i64 + displacement as i64;
    usize::try_from(target).map_err(|_| ClassReadError::InvalidBranchTarget {
        offset: opcode_offset,
        target,
    })
}

fn read_ldc(pool: &ConstantPool, index: u16, wide: bool) -> Result<Insn, ClassReadError> {
    let value = pool.literal(index)?;
    if value.is_wide() != wide {
        return Err(ClassReadError::UnexpectedConstant {
            index,
            expected: if wide {
                "Long or Double"
            } else {
                "single-slot loadable constant"
            },
        });
    }
    Ok(LdcInsnNode::new(value).into())
}

fn read_table_switch(
    reader: &mut ByteReader<'_>,
    opcode_offset: usize,
) -> Result<Insn, ClassReadError> {
    reader.align4(opcode_offset)?;
    let default = absolute(opcode_offset, reader.read_i4()?)?;
    let low = reader.read_i4()?;
    let high = reader.read_i4()?;
    if high < low {
        return Err(ClassReadError::InvalidAttribute(format!(
            "tableswitch at {opcode_offset} has high {high} below low {low}"
        )));
    }
    let count = (high as i64 - low as i64 + 1) as usize;
    if count * 4 > reader.remaining() {
        return Err(ClassReadError::UnexpectedEof);
    }
    let mut targets = Vec::with_capacity(count);
    for _ in 0..count {
        targets.push(absolute(opcode_offset, reader.read_i4()?)?);
    }
    Ok(Insn::TableSwitch(TableSwitchInsnNode {
        default,
        low,
        targets,
    }))
}

fn read_lookup_switch(
    reader: &mut ByteReader<'_>,
    opcode_offset: usize,
) -> Result<Insn, ClassReadError> {
    reader.align4(opcode_offset)?;
    let default = absolute(opcode_offset, reader.read_i4()?)?;
    let npairs = reader.read_i4()?;
    let npairs = usize::try_from(npairs).map_err(|_| {
        ClassReadError::InvalidAttribute(format!(
            "lookupswitch at {opcode_offset} has {npairs} pairs"
        ))
    })?;
    if npairs * 8 > reader.remaining() {
        return Err(ClassReadError::UnexpectedEof);
    }
    let mut pairs = Vec::with_capacity(npairs);
    for _ in 0..npairs {
        let key = reader.read_i4()?;
        let target = absolute(opcode_offset, reader.read_i4()?)?;
        pairs.push((key, target));
    }
    Ok(Insn::LookupSwitch(LookupSwitchInsnNode { default, pairs }))
}

fn read_wide(reader: &mut ByteReader<'_>, opcode_offset: usize) -> Result<Insn, ClassReadError> {
    let opcode = reader.read_u1()?;
    match opcode {
        opcodes::ILOAD..=opcodes::ALOAD | opcodes::ISTORE..=opcodes::ASTORE | opcodes::RET => {
            Ok(Insn::Var(VarInsnNode {
                insn: InsnNode { opcode },
                var_index: reader.read_u2()?,
                wide: true,
            }))
        }
        opcodes::IINC => {
            let mut node = IincInsnNode::new(reader.read_u2()?, reader.read_i2()?);
            node.wide = true;
            Ok(Insn::Iinc(node))
        }
        _ => Err(ClassReadError::InvalidOpcode {
            opcode,
            offset: opcode_offset + 1,
        }),
    }
}

/// Checks every instruction and branch target of a method body.
pub fn check(insns: &[Insn]) -> Result<(), ClassWriteError> {
    for (index, insn) in insns.iter().enumerate() {
        insn.validate()
            .map_err(|reason| ClassWriteError::InvalidOperand {
                insn: index,
                reason,
            })?;
        if let Insn::LookupSwitch(node) = insn
            && node.pairs.windows(2).any(|pair| pair[0].0 >= pair[1].0)
        {
            return Err(ClassWriteError::InvalidOperand {
                insn: index,
                reason: "lookupswitch keys must be strictly increasing",
            });
        }
        for target in insn.branch_targets() {
            if target >= insns.len() {
                return Err(ClassWriteError::InvalidBranchTarget {
                    insn: index,
                    target,
                });
            }
        }
    }
    Ok(())
}

/// Inserts the symbolic operand of every instruction into `pool`, in instruction order,
/// and records the resulting indices.
pub fn stage(insns: &[Insn], pool: &mut ConstantPool) -> Result<Vec<Staged>, ClassWriteError> {
    let mut staged = Vec::with_capacity(insns.len());
    for insn in insns {
        let pool_index = match insn {
            Insn::Type(node) => pool.insert_class(&node.class_name)?,
            Insn::MultiANewArray(node) => pool.insert_class(&node.class_name)?,
            Insn::Field(node) => pool.insert(Constant::Fieldref(node.field_ref.clone()))?,
            Insn::Method(node) if node.interface => {
                pool.insert(Constant::InterfaceMethodref(node.method_ref.clone()))?
            }
            Insn::Method(node) => pool.insert(Constant::Methodref(node.method_ref.clone()))?,
            Insn::InvokeInterface(node) => {
                pool.insert(Constant::InterfaceMethodref(node.method_ref.clone()))?
            }
            Insn::Ldc(node) => pool.insert(Constant::from(&node.value))?,
            _ => 0,
        };
        staged.push(Staged {
            pool_index,
            far: false,
        });
    }
    Ok(staged)
}

/// Assigns offsets, widening `goto`/`jsr` whose displacement does not fit 16 bits until
/// nothing changes. Widening only ever grows the code, so the loop terminates.
pub fn layout(insns: &[Insn], staged: &mut [Staged]) -> Result<OffsetMap, ClassWriteError> {
    let mut pass = 0;
    loop {
        pass += 1;
        let map = offsets(insns, staged);
        let mut widened = 0;
        for (index, insn) in insns.iter().enumerate() {
            if let Insn::Jump(node) = insn
                && matches!(node.insn.opcode, opcodes::GOTO | opcodes::JSR)
                && !staged[index].far
                && i16::try_from(displacement(&map, index, node.target)).is_err()
            {
                staged[index].far = true;
                widened += 1;
            }
        }
        trace!(
            "layout pass {pass}: {} bytes, {widened} jumps widened",
            map.code_length
        );
        if widened == 0 {
            if map.code_length > u16::MAX as usize {
                return Err(ClassWriteError::CodeTooLarge(map.code_length));
            }
            return Ok(map);
        }
    }
}

fn offsets(insns: &[Insn], staged: &[Staged]) -> OffsetMap {
    let mut offsets = Vec::with_capacity(insns.len());
    let mut offset = 0;
    for (insn, staged) in insns.iter().zip(staged) {
        offsets.push(offset);
        offset += insn.encoded_length(offset, *staged);
    }
    OffsetMap {
        offsets,
        code_length: offset,
    }
}

fn displacement(map: &OffsetMap, from: usize, to: usize) -> i64 {
    map.offsets[to] as i64 - map.offsets[from] as i64
}

/// Emits the laid-out instructions.
pub fn emit(
    insns: &[Insn],
    staged: &[Staged],
    map: &OffsetMap,
) -> Result<Vec<u8>, ClassWriteError> {
    let mut code = Vec::with_capacity(map.code_length);
    for (index, insn) in insns.iter().enumerate() {
        let offset = map.offsets[index];
        let pool_index = staged[index].pool_index;
        match insn {
            Insn::Simple(node) => write_u1(&mut code, node.opcode),
            Insn::Int(node) => {
                write_u1(&mut code, node.insn.opcode);
                match node.insn.opcode {
                    opcodes::SIPUSH => write_i2(&mut code, node.operand as i16),
                    opcodes::BIPUSH => write_i1(&mut code, node.operand as i8),
                    _ => write_u1(&mut code, node.operand as u8),
                }
            }
            Insn::Var(node) => emit_var(&mut code, node),
            Insn::Iinc(node) => {
                if node.is_wide() {
                    write_u1(&mut code, opcodes::WIDE);
                    write_u1(&mut code, opcodes::IINC);
                    write_u2(&mut code, node.var_index);
                    write_i2(&mut code, node.increment);
                } else {
                    write_u1(&mut code, opcodes::IINC);
                    write_u1(&mut code, node.var_index as u8);
                    write_i1(&mut code, node.increment as i8);
                }
            }
            Insn::Type(node) => {
                write_u1(&mut code, node.insn.opcode);
                write_u2(&mut code, pool_index);
            }
            Insn::Field(node) => {
                write_u1(&mut code, node.insn.opcode);
                write_u2(&mut code, pool_index);
            }
            Insn::Method(node) => {
                write_u1(&mut code, node.insn.opcode);
                write_u2(&mut code, pool_index);
            }
            Insn::InvokeInterface(node) => {
                let count = descriptor::argument_slots(&node.method_ref.descriptor)? + 1;
                let count = u8::try_from(count).map_err(|_| ClassWriteError::InvalidOperand {
                    insn: index,
                    reason: "invokeinterface arguments exceed 255 slots",
                })?;
                write_u1(&mut code, opcodes::INVOKEINTERFACE);
                write_u2(&mut code, pool_index);
                write_u1(&mut code, count);
                write_u1(&mut code, 0);
            }
            Insn::Jump(node) => {
                let delta = displacement(map, index, node.target);
                if staged[index].far {
                    let opcode = if node.insn.opcode == opcodes::GOTO {
                        opcodes::GOTO_W
                    } else {
                        opcodes::JSR_W
                    };
                    write_u1(&mut code, opcode);
                    write_i4(&mut code, delta as i32);
                } else {
                    let delta = i16::try_from(delta).map_err(|_| {
                        ClassWriteError::BranchOffsetOverflow {
                            insn: index,
                            offset: delta,
                        }
                    })?;
                    write_u1(&mut code, node.insn.opcode);
                    write_i2(&mut code, delta);
                }
            }
            Insn::Ldc(node) => {
                if node.value.is_wide() {
                    write_u1(&mut code, opcodes::LDC2_W);
                    write_u2(&mut code, pool_index);
                } else if pool_index > 255 {
                    write_u1(&mut code, opcodes::LDC_W);
                    write_u2(&mut code, pool_index);
                } else {
                    write_u1(&mut code, opcodes::LDC);
                    write_u1(&mut code, pool_index as u8);
                }
            }
            Insn::TableSwitch(node) => {
                write_u1(&mut code, opcodes::TABLESWITCH);
                code.resize(code.len() + switch_padding(offset), 0);
                write_i4(&mut code, displacement(map, index, node.default) as i32);
                write_i4(&mut code, node.low);
                let high = node.low as i64 + node.targets.len() as i64 - 1;
                write_i4(&mut code, high as i32);
                for target in &node.targets {
                    write_i4(&mut code, displacement(map, index, *target) as i32);
                }
            }
            Insn::LookupSwitch(node) => {
                write_u1(&mut code, opcodes::LOOKUPSWITCH);
                code.resize(code.len() + switch_padding(offset), 0);
                write_i4(&mut code, displacement(map, index, node.default) as i32);
                write_i4(&mut code, node.pairs.len() as i32);
                for (key, target) in &node.pairs {
                    write_i4(&mut code, *key);
                    write_i4(&mut code, displacement(map, index, *target) as i32);
                }
            }
            Insn::MultiANewArray(node) => {
                write_u1(&mut code, opcodes::MULTIANEWARRAY);
                write_u2(&mut code, pool_index);
                write_u1(&mut code, node.dimensions);
            }
        }
    }
    Ok(code)
}

fn emit_var(code: &mut Vec<u8>, node: &VarInsnNode) {
    let opcode = node.insn.opcode;
    if node.is_wide() {
        write_u1(code, opcodes::WIDE);
        write_u1(code, opcode);
        write_u2(code, node.var_index);
    } else if node.var_index <= 3 && opcode != opcodes::RET {
        let slot = node.var_index as u8;
        let compact = if opcode <= opcodes::ALOAD {
            opcodes::ILOAD_0 + (opcode - opcodes::ILOAD) * 4 + slot
        } else {
            opcodes::ISTORE_0 + (opcode - opcodes::ISTORE) * 4 + slot
        };
        write_u1(code, compact);
    } else {
        write_u1(code, opcode);
        write_u1(code, node.var_index as u8);
    }
}

/// Checks, stages, lays out and emits a method body in one go.
pub fn encode(
    insns: &[Insn],
    pool: &mut ConstantPool,
) -> Result<(Vec<u8>, OffsetMap), ClassWriteError> {
    check(insns)?;
    let mut staged = stage(insns, pool)?;
    let map = layout(insns, &mut staged)?;
    let code = emit(insns, &staged, &map)?;
    Ok((code, map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insn::Literal;

    fn simple(opcode: u8) -> Insn {
        InsnNode { opcode }.into()
    }

    #[test]
    fn compact_and_wide_locals() {
        let insns = vec![
            VarInsnNode::new(opcodes::ALOAD, 0).into(),
            VarInsnNode::new(opcodes::LSTORE, 3).into(),
            VarInsnNode::new(opcodes::ILOAD, 255).into(),
            VarInsnNode::new(opcodes::ILOAD, 256).into(),
            simple(opcodes::RETURN),
        ];
        let mut pool = ConstantPool::new();
        let (code, _) = encode(&insns, &mut pool).unwrap();
        assert_eq!(
            code,
            vec![0x2A, 0x42, 0x15, 0xFF, 0xC4, 0x15, 0x01, 0x00, 0xB1]
        );

        let (decoded, map) = decode(&code, &pool).unwrap();
        assert_eq!(map.offset_of(3), Some(4));
        assert_eq!(decoded[0], insns[0]);
        assert_eq!(decoded[1], insns[1]);
        assert_eq!(decoded[2], insns[2]);
        assert_eq!(decoded[3], insns[3]);
    }

    #[test]
    fn branch_targets_become_indices() {
        // 0: iconst_0, 1: ifeq +4 -> 5, 4: nop, 5: return
        let code = [0x03, 0x99, 0x00, 0x04, 0x00, 0xB1];
        let (insns, map) = decode(&code, &ConstantPool::new()).unwrap();
        assert_eq!(insns[1], JumpInsnNode::new(opcodes::IFEQ, 3).into());
        assert_eq!(map.index_of(6), Some(4));
        assert_eq!(map.index_of(2), None);
    }

    #[test]
    fn branch_into_operand_is_rejected() {
        let code = [0x03, 0x99, 0x00, 0x02, 0x00, 0xB1];
        let err = decode(&code, &ConstantPool::new()).unwrap_err();
        assert_eq!(
            err,
            ClassReadError::InvalidBranchTarget {
                offset: 1,
                target: 3
            }
        );
    }

    #[test]
    fn invokedynamic_is_an_invalid_opcode() {
        let err = decode(&[0xBA, 0, 1, 0, 0], &ConstantPool::new()).unwrap_err();
        assert_eq!(
            err,
            ClassReadError::InvalidOpcode {
                opcode: 0xBA,
                offset: 0
            }
        );
    }

    #[test]
    fn switch_padding_round_trips() {
        let insns: Vec<Insn> = vec![
            simple(opcodes::ICONST_0),
            TableSwitchInsnNode {
                default: 3,
                low: 1,
                targets: vec![2, 3],
            }
            .into(),
            simple(opcodes::NOP),
            simple(opcodes::RETURN),
        ];
        let mut pool = ConstantPool::new();
        let (code, map) = encode(&insns, &mut pool).unwrap();
        // opcode at 1, two padding bytes, then 5 ints
        assert_eq!(map.offset_of(2), Some(1 + 1 + 2 + 20));
        assert_eq!(&code[1..4], &[0xAA, 0, 0]);
        let (decoded, _) = decode(&code, &pool).unwrap();
        assert_eq!(decoded, insns);
    }

    #[test]
    fn far_goto_is_widened() {
        let mut insns: Vec<Insn> = vec![JumpInsnNode::new(opcodes::GOTO, 40_001).into()];
        insns.extend((0..40_000).map(|_| simple(opcodes::NOP)));
        insns.push(simple(opcodes::RETURN));
        let mut pool = ConstantPool::new();
        let (code, map) = encode(&insns, &mut pool).unwrap();
        assert_eq!(code[0], opcodes::GOTO_W);
        assert_eq!(map.offset_of(1), Some(5));
        let (decoded, _) = decode(&code, &pool).unwrap();
        assert_eq!(decoded[0], insns[0]);
    }

    #[test]
    fn jsr_w_decodes_to_a_plain_jsr() {
        // 0: jsr_w +5 -> 5, 5: return
        let code = [0xC9, 0x00, 0x00, 0x00, 0x05, 0xB1];
        let (insns, _) = decode(&code, &ConstantPool::new()).unwrap();
        assert_eq!(insns[0], JumpInsnNode::new(opcodes::JSR, 1).into());
        assert_eq!(insns[1], simple(opcodes::RETURN));

        let (encoded, _) = encode(&insns, &mut ConstantPool::new()).unwrap();
        assert_eq!(encoded, vec![opcodes::JSR, 0x00, 0x03, 0xB1]);
    }

    #[test]
    fn far_jsr_is_widened() {
        let mut insns: Vec<Insn> = vec![JumpInsnNode::new(opcodes::JSR, 40_001).into()];
        insns.extend((0..40_000).map(|_| simple(opcodes::NOP)));
        insns.push(VarInsnNode::new(opcodes::ASTORE, 1).into());
        let mut pool = ConstantPool::new();
        let (code, map) = encode(&insns, &mut pool).unwrap();
        assert_eq!(code[0], opcodes::JSR_W);
        assert_eq!(&code[1..5], &40_005i32.to_be_bytes());
        assert_eq!(map.offset_of(40_001), Some(40_005));
        let (decoded, _) = decode(&code, &pool).unwrap();
        assert_eq!(decoded, insns);
    }

    #[test]
    fn far_conditional_branch_overflows() {
        let mut insns: Vec<Insn> = vec![
            simple(opcodes::ICONST_0),
            JumpInsnNode::new(opcodes::IFEQ, 40_002).into(),
        ];
        insns.extend((0..40_000).map(|_| simple(opcodes::NOP)));
        insns.push(simple(opcodes::RETURN));
        let err = encode(&insns, &mut ConstantPool::new()).unwrap_err();
        assert_eq!(
            err,
            ClassWriteError::BranchOffsetOverflow {
                insn: 1,
                offset: 40_003
            }
        );
    }

    #[test]
    fn ldc_widens_past_index_255() {
        let mut pool = ConstantPool::new();
        for i in 0..300 {
            pool.insert(Constant::Integer(i)).unwrap();
        }
        let insns: Vec<Insn> = vec![
            LdcInsnNode::new(Literal::Integer(5)).into(),
            LdcInsnNode::new(Literal::Integer(299)).into(),
            LdcInsnNode::new(Literal::Long(1)).into(),
        ];
        let (code, _) = encode(&insns, &mut pool).unwrap();
        assert_eq!(&code[0..2], &[opcodes::LDC, 6]);
        assert_eq!(&code[2..5], &[opcodes::LDC_W, 0x01, 0x2C]);
        assert_eq!(code[5], opcodes::LDC2_W);
    }

    #[test]
    fn dangling_target_is_rejected() {
        let insns: Vec<Insn> = vec![JumpInsnNode::new(opcodes::GOTO, 1).into()];
        let err = encode(&insns, &mut ConstantPool::new()).unwrap_err();
        assert_eq!(
            err,
            ClassWriteError::InvalidBranchTarget { insn: 0, target: 1 }
        );
    }

    #[test]
    fn wide_flag_on_high_slot_is_implied() {
        let mut load = VarInsnNode::new(opcodes::ILOAD, 300);
        load.wide = true;
        let mut bump = IincInsnNode::new(300, 1);
        bump.wide = true;
        let insns: Vec<Insn> = vec![
            load.into(),
            bump.into(),
            VarInsnNode::new(opcodes::ISTORE, 300).into(),
            simple(opcodes::RETURN),
        ];
        let (code, _) = encode(&insns, &mut ConstantPool::new()).unwrap();
        assert_eq!(code.len(), 4 + 6 + 4 + 1);
        let (decoded, _) = decode(&code, &ConstantPool::new()).unwrap();
        assert_eq!(decoded, insns);

        let mut forced = VarInsnNode::new(opcodes::ILOAD, 5);
        forced.wide = true;
        assert_ne!(forced, VarInsnNode::new(opcodes::ILOAD, 5));
        assert_eq!(load, VarInsnNode::new(opcodes::ILOAD, 300));
    }

    #[test]
    fn redundant_wide_prefix_survives() {
        // wide iload 5; wide iinc 5 by 1; return
        let code = [0xC4, 0x15, 0x00, 0x05, 0xC4, 0x84, 0x00, 0x05, 0x00, 0x01, 0xB1];
        let (insns, _) = decode(&code, &ConstantPool::new()).unwrap();
        assert!(matches!(&insns[0], Insn::Var(node) if node.wide && node.var_index == 5));
        assert!(matches!(&insns[1], Insn::Iinc(node) if node.wide && node.increment == 1));
        let (encoded, _) = encode(&insns, &mut ConstantPool::new()).unwrap();
        assert_eq!(encoded, code);
    }
}
