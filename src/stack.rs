//! Operand-stack depth and local-slot accounting for method bodies.

use std::collections::VecDeque;

use crate::descriptor;
use crate::error::ClassWriteError;
use crate::insn::Insn;
use crate::nodes::ExceptionTableEntry;
use crate::opcodes;

const MAX_DEPTH: i32 = u16::MAX as i32;

/// Computes the maximum operand-stack depth over every path through `insns`.
///
/// Paths start at instruction 0 with an empty stack and at each exception handler with
/// the thrown reference on it. An instruction is walked again only when it is reached
/// with a strictly greater depth than before, so the result is the maximum over all
/// arrivals. `jsr` enters its subroutine with the return address pushed and resumes at
/// the following instruction with the depth it had before the call.
pub fn max_stack(
    insns: &[Insn],
    exception_table: &[ExceptionTableEntry],
) -> Result<u16, ClassWriteError> {
    let mut best: Vec<Option<i32>> = vec![None; insns.len()];
    let mut pending: VecDeque<(usize, i32)> = VecDeque::new();
    for entry in exception_table {
        pending.push_back((entry.handler, 1));
    }
    if !insns.is_empty() {
        pending.push_back((0, 0));
    }

    let mut max = 0;
    while let Some((start, depth)) = pending.pop_front() {
        let mut index = start;
        let mut depth = depth;
        while index < insns.len() {
            match best[index] {
                Some(seen) if seen >= depth => break,
                _ => best[index] = Some(depth),
            }
            max = max.max(depth);

            let insn = &insns[index];
            insn.validate()
                .map_err(|reason| ClassWriteError::InvalidOperand {
                    insn: index,
                    reason,
                })?;
            let after = depth + insn.stack_effect()?;
            if after < 0 {
                return Err(ClassWriteError::StackUnderflow { insn: index });
            }
            if after > MAX_DEPTH {
                return Err(ClassWriteError::StackOverflow { insn: index });
            }
            max = max.max(after);

            match insn {
                Insn::Jump(node) => match node.insn.opcode {
                    opcodes::GOTO => {
                        pending.push_back((node.target, after));
                        break;
                    }
                    opcodes::JSR => {
                        pending.push_back((node.target, after));
                        pending.push_back((index + 1, depth));
                        break;
                    }
                    _ => pending.push_back((node.target, after)),
                },
                Insn::TableSwitch(_) | Insn::LookupSwitch(_) => {
                    for target in insn.branch_targets() {
                        pending.push_back((target, after));
                    }
                    break;
                }
                Insn::Var(node) if node.insn.opcode == opcodes::RET => break,
                Insn::Simple(node) if ends_path(node.opcode) => break,
                _ => {}
            }
            index += 1;
            depth = after;
        }
    }
    Ok(max as u16)
}

fn ends_path(opcode: u8) -> bool {
    matches!(opcode, opcodes::IRETURN..=opcodes::RETURN | opcodes::ATHROW)
}

/// Lower bound on the local slots a method needs: the highest slot touched by a load,
/// store, `iinc` or `ret` plus its width, and never fewer than the parameter slots.
pub fn max_locals(
    insns: &[Insn],
    method_descriptor: &str,
    is_static: bool,
) -> Result<u16, ClassWriteError> {
    let mut max = descriptor::parameter_slots(method_descriptor, is_static)? as u32;
    for (index, insn) in insns.iter().enumerate() {
        let end = match insn {
            Insn::Var(node) => {
                let width = match node.insn.opcode {
                    opcodes::LLOAD | opcodes::DLOAD | opcodes::LSTORE | opcodes::DSTORE => 2,
                    _ => 1,
                };
                node.var_index as u32 + width
            }
            Insn::Iinc(node) => node.var_index as u32 + 1,
            _ => continue,
        };
        if end > u16::MAX as u32 {
            return Err(ClassWriteError::InvalidOperand {
                insn: index,
                reason: "local variable slot exceeds 65535",
            });
        }
        max = max.max(end);
    }
    Ok(max as u16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insn::{
        IincInsnNode, InsnNode, JumpInsnNode, LookupSwitchInsnNode, MethodInsnNode, VarInsnNode,
    };

    fn simple(opcode: u8) -> Insn {
        InsnNode { opcode }.into()
    }

    fn handler_at(start: usize, end: usize, handler: usize) -> ExceptionTableEntry {
        ExceptionTableEntry {
            start,
            end,
            handler,
            catch_type: None,
        }
    }

    #[test]
    fn straight_line_peaks_at_running_sum() {
        let insns = vec![
            simple(opcodes::ICONST_1),
            simple(opcodes::LCONST_0),
            simple(opcodes::DCONST_1),
            simple(opcodes::POP2),
            simple(opcodes::POP2),
            simple(opcodes::POP),
            simple(opcodes::RETURN),
        ];
        assert_eq!(max_stack(&insns, &[]).unwrap(), 5);
    }

    #[test]
    fn push_then_throw_is_one() {
        let insns = vec![simple(opcodes::ACONST_NULL), simple(opcodes::ATHROW)];
        assert_eq!(max_stack(&insns, &[]).unwrap(), 1);
    }

    #[test]
    fn handler_makes_depth_at_least_one() {
        let insns = vec![
            simple(opcodes::NOP),
            simple(opcodes::RETURN),
            simple(opcodes::POP),
            simple(opcodes::RETURN),
        ];
        assert_eq!(max_stack(&insns, &[handler_at(0, 1, 2)]).unwrap(), 1);
    }

    #[test]
    fn handler_reached_by_fall_through_takes_the_maximum() {
        // The handler at 2 is entered with 1 by exception and with 2 by fall-through.
        let insns = vec![
            simple(opcodes::ICONST_0),
            simple(opcodes::ICONST_0),
            simple(opcodes::DUP),
            simple(opcodes::POP),
            simple(opcodes::POP),
            simple(opcodes::RETURN),
        ];
        assert_eq!(max_stack(&insns, &[handler_at(0, 1, 2)]).unwrap(), 3);
    }

    #[test]
    fn branches_carry_post_pop_depth() {
        let insns = vec![
            simple(opcodes::ICONST_0),
            simple(opcodes::ICONST_1),
            JumpInsnNode::new(opcodes::IF_ICMPEQ, 5).into(),
            simple(opcodes::ICONST_2),
            simple(opcodes::POP),
            simple(opcodes::RETURN),
        ];
        assert_eq!(max_stack(&insns, &[]).unwrap(), 2);
    }

    #[test]
    fn switch_targets_are_walked() {
        let insns = vec![
            simple(opcodes::ICONST_0),
            LookupSwitchInsnNode {
                default: 2,
                pairs: vec![(1, 4)],
            }
            .into(),
            simple(opcodes::RETURN),
            simple(opcodes::RETURN),
            simple(opcodes::LCONST_0),
            simple(opcodes::LCONST_0),
            simple(opcodes::RETURN),
        ];
        assert_eq!(max_stack(&insns, &[]).unwrap(), 4);
    }

    #[test]
    fn subroutine_sees_return_address() {
        // 0: jsr 3, 1: iconst_0, 2: ireturn, 3: astore_1, 4: lconst_0, 5: pop2, 6: ret 1
        let insns: Vec<Insn> = vec![
            JumpInsnNode::new(opcodes::JSR, 3).into(),
            simple(opcodes::ICONST_0),
            simple(opcodes::IRETURN),
            VarInsnNode::new(opcodes::ASTORE, 1).into(),
            simple(opcodes::LCONST_0),
            simple(opcodes::POP2),
            VarInsnNode::new(opcodes::RET, 1).into(),
        ];
        assert_eq!(max_stack(&insns, &[]).unwrap(), 2);
    }

    #[test]
    fn underflow_is_reported() {
        let insns = vec![simple(opcodes::POP), simple(opcodes::RETURN)];
        assert_eq!(
            max_stack(&insns, &[]),
            Err(ClassWriteError::StackUnderflow { insn: 0 })
        );
    }

    #[test]
    fn growing_loop_overflows() {
        let insns: Vec<Insn> = vec![
            simple(opcodes::ICONST_0),
            JumpInsnNode::new(opcodes::GOTO, 0).into(),
        ];
        assert_eq!(
            max_stack(&insns, &[]),
            Err(ClassWriteError::StackOverflow { insn: 0 })
        );
    }

    #[test]
    fn empty_body_has_no_stack() {
        assert_eq!(max_stack(&[], &[]).unwrap(), 0);
    }

    #[test]
    fn locals_cover_parameters_and_wide_slots() {
        let init: Vec<Insn> = vec![
            VarInsnNode::new(opcodes::ALOAD, 0).into(),
            MethodInsnNode::new(opcodes::INVOKESPECIAL, "java/lang/Object", "<init>", "()V")
                .into(),
            simple(opcodes::RETURN),
        ];
        assert_eq!(max_locals(&init, "()V", false).unwrap(), 1);
        assert_eq!(max_locals(&[], "(JI)V", true).unwrap(), 3);

        let insns: Vec<Insn> = vec![
            VarInsnNode::new(opcodes::DSTORE, 4).into(),
            IincInsnNode::new(7, 1).into(),
        ];
        assert_eq!(max_locals(&insns, "()V", true).unwrap(), 8);
        let insns: Vec<Insn> = vec![VarInsnNode::new(opcodes::LLOAD, 7).into()];
        assert_eq!(max_locals(&insns, "()V", true).unwrap(), 9);
    }
}
