use java_string::JavaString;

use crate::descriptor;
use crate::error::ClassWriteError;
use crate::opcodes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsnNode {
    pub opcode: u8,
}

/// `bipush`, `sipush` and `newarray`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntInsnNode {
    pub insn: InsnNode,
    pub operand: i32,
}

/// A local-variable load, store or `ret`. Compact forms such as `aload_0` decode to
/// this node. `wide` asks for the `wide` prefix even when the slot fits a byte; above
/// slot 255 the prefix is implied, so two nodes compare equal when they encode alike.
#[derive(Debug, Clone, Copy, Eq)]
pub struct VarInsnNode {
    pub insn: InsnNode,
    pub var_index: u16,
    pub wide: bool,
}

impl PartialEq for VarInsnNode {
    fn eq(&self, other: &Self) -> bool {
        self.insn == other.insn
            && self.var_index == other.var_index
            && self.is_wide() == other.is_wide()
    }
}

/// `wide` behaves as on [`VarInsnNode`]: equality follows [`is_wide`](Self::is_wide).
#[derive(Debug, Clone, Copy, Eq)]
pub struct IincInsnNode {
    pub var_index: u16,
    pub increment: i16,
    pub wide: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInsnNode {
    pub insn: InsnNode,
    pub class_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInsnNode {
    pub insn: InsnNode,
    pub field_ref: MemberRef,
}

/// `invokevirtual`, `invokespecial` and `invokestatic`. `interface` selects an
/// `InterfaceMethodref` pool entry for the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInsnNode {
    pub insn: InsnNode,
    pub method_ref: MemberRef,
    pub interface: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeInterfaceInsnNode {
    pub method_ref: MemberRef,
}

/// A branch. `target` is the index of the destination instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpInsnNode {
    pub insn: InsnNode,
    pub target: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdcInsnNode {
    pub value: Literal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSwitchInsnNode {
    pub default: usize,
    pub low: i32,
    pub targets: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupSwitchInsnNode {
    pub default: usize,
    pub pairs: Vec<(i32, usize)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiANewArrayInsnNode {
    pub class_name: String,
    pub dimensions: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insn {
    Simple(InsnNode),
    Int(IntInsnNode),
    Var(VarInsnNode),
    Iinc(IincInsnNode),
    Type(TypeInsnNode),
    Field(FieldInsnNode),
    Method(MethodInsnNode),
    InvokeInterface(InvokeInterfaceInsnNode),
    Jump(JumpInsnNode),
    Ldc(LdcInsnNode),
    TableSwitch(TableSwitchInsnNode),
    LookupSwitch(LookupSwitchInsnNode),
    MultiANewArray(MultiANewArrayInsnNode),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl MemberRef {
    pub fn new(owner: &str, name: &str, descriptor: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }
}

/// A loadable constant, the operand of `ldc` and of a field's `ConstantValue`.
#[derive(Debug, Clone)]
pub enum Literal {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(JavaString),
    Class(String),
}

impl Literal {
    /// Long and double values take two stack cells and use `ldc2_w`.
    pub fn is_wide(&self) -> bool {
        matches!(self, Literal::Long(_) | Literal::Double(_))
    }
}

impl PartialEq for Literal {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Literal::Integer(a), Literal::Integer(b)) => a == b,
            (Literal::Float(a), Literal::Float(b)) => a.to_bits() == b.to_bits(),
            (Literal::Long(a), Literal::Long(b)) => a == b,
            (Literal::Double(a), Literal::Double(b)) => a.to_bits() == b.to_bits(),
            (Literal::String(a), Literal::String(b)) => a == b,
            (Literal::Class(a), Literal::Class(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Literal {}

/// Per-instruction scratch data computed right before emission: the pool index of the
/// symbolic operand and whether a `goto`/`jsr` needs its 32-bit form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Staged {
    pub pool_index: u16,
    pub far: bool,
}

impl Insn {
    pub fn opcode(&self) -> u8 {
        match self {
            Insn::Simple(node) => node.opcode,
            Insn::Int(node) => node.insn.opcode,
            Insn::Var(node) => node.insn.opcode,
            Insn::Iinc(_) => opcodes::IINC,
            Insn::Type(node) => node.insn.opcode,
            Insn::Field(node) => node.insn.opcode,
            Insn::Method(node) => node.insn.opcode,
            Insn::InvokeInterface(_) => opcodes::INVOKEINTERFACE,
            Insn::Jump(node) => node.insn.opcode,
            Insn::Ldc(_) => opcodes::LDC,
            Insn::TableSwitch(_) => opcodes::TABLESWITCH,
            Insn::LookupSwitch(_) => opcodes::LOOKUPSWITCH,
            Insn::MultiANewArray(_) => opcodes::MULTIANEWARRAY,
        }
    }

    /// Checks that the opcode belongs to the variant and that fixed-width operands fit.
    pub fn validate(&self) -> Result<(), &'static str> {
        match self {
            Insn::Simple(node) => {
                if simple_stack_effect(node.opcode).is_none() {
                    return Err("opcode is not an operand-less instruction");
                }
            }
            Insn::Int(node) => {
                let fits = match node.insn.opcode {
                    opcodes::BIPUSH => i8::try_from(node.operand).is_ok(),
                    opcodes::SIPUSH => i16::try_from(node.operand).is_ok(),
                    opcodes::NEWARRAY => (4..=11).contains(&node.operand),
                    _ => return Err("opcode does not take an int operand"),
                };
                if !fits {
                    return Err("int operand out of range");
                }
            }
            Insn::Var(node) => {
                if !matches!(
                    node.insn.opcode,
                    opcodes::ILOAD..=opcodes::ALOAD | opcodes::ISTORE..=opcodes::ASTORE | opcodes::RET
                ) {
                    return Err("opcode does not take a local variable");
                }
            }
            Insn::Type(node) => {
                if !matches!(
                    node.insn.opcode,
                    opcodes::NEW | opcodes::ANEWARRAY | opcodes::CHECKCAST | opcodes::INSTANCEOF
                ) {
                    return Err("opcode does not take a class operand");
                }
            }
            Insn::Field(node) => {
                if !(opcodes::GETSTATIC..=opcodes::PUTFIELD).contains(&node.insn.opcode) {
                    return Err("opcode is not a field access");
                }
            }
            Insn::Method(node) => {
                if !(opcodes::INVOKEVIRTUAL..=opcodes::INVOKESTATIC).contains(&node.insn.opcode) {
                    return Err("opcode is not a method invocation");
                }
            }
            Insn::Jump(node) => {
                if !matches!(
                    node.insn.opcode,
                    opcodes::IFEQ..=opcodes::JSR | opcodes::IFNULL | opcodes::IFNONNULL
                ) {
                    return Err("opcode is not a branch");
                }
            }
            Insn::TableSwitch(node) => {
                let high = node.low as i64 + node.targets.len() as i64 - 1;
                if node.targets.is_empty() || high > i32::MAX as i64 {
                    return Err("tableswitch range is empty or overflows");
                }
            }
            Insn::MultiANewArray(node) => {
                if node.dimensions == 0 {
                    return Err("multianewarray needs at least one dimension");
                }
            }
            Insn::Iinc(_) | Insn::InvokeInterface(_) | Insn::Ldc(_) | Insn::LookupSwitch(_) => {}
        }
        Ok(())
    }

    /// Net change in operand-stack cells, long and double counting as two. Assumes the
    /// instruction passed [`validate`](Self::validate).
    pub fn stack_effect(&self) -> Result<i32, ClassWriteError> {
        let effect = match self {
            Insn::Simple(node) => simple_stack_effect(node.opcode).unwrap_or(0),
            Insn::Int(node) => match node.insn.opcode {
                opcodes::NEWARRAY => 0,
                _ => 1,
            },
            Insn::Var(node) => match node.insn.opcode {
                opcodes::LLOAD | opcodes::DLOAD => 2,
                opcodes::ILOAD | opcodes::FLOAD | opcodes::ALOAD => 1,
                opcodes::LSTORE | opcodes::DSTORE => -2,
                opcodes::ISTORE | opcodes::FSTORE | opcodes::ASTORE => -1,
                _ => 0,
            },
            Insn::Iinc(_) => 0,
            Insn::Type(node) => match node.insn.opcode {
                opcodes::NEW => 1,
                _ => 0,
            },
            Insn::Field(node) => {
                let size = descriptor::field_slots(&node.field_ref.descriptor)? as i32;
                match node.insn.opcode {
                    opcodes::GETSTATIC => size,
                    opcodes::PUTSTATIC => -size,
                    opcodes::GETFIELD => size - 1,
                    _ => -1 - size,
                }
            }
            Insn::Method(node) => {
                let receiver = if node.insn.opcode == opcodes::INVOKESTATIC {
                    0
                } else {
                    1
                };
                invoke_effect(&node.method_ref.descriptor, receiver)?
            }
            Insn::InvokeInterface(node) => invoke_effect(&node.method_ref.descriptor, 1)?,
            Insn::Jump(node) => match node.insn.opcode {
                opcodes::GOTO => 0,
                opcodes::JSR => 1,
                opcodes::IF_ICMPEQ..=opcodes::IF_ACMPNE => -2,
                _ => -1,
            },
            Insn::Ldc(node) => {
                if node.value.is_wide() {
                    2
                } else {
                    1
                }
            }
            Insn::TableSwitch(_) | Insn::LookupSwitch(_) => -1,
            Insn::MultiANewArray(node) => 1 - node.dimensions as i32,
        };
        Ok(effect)
    }

    /// Bytes this instruction occupies when emitted at `offset` of the code array.
    pub fn encoded_length(&self, offset: usize, staged: Staged) -> usize {
        match self {
            Insn::Simple(_) => 1,
            Insn::Int(node) => match node.insn.opcode {
                opcodes::SIPUSH => 3,
                _ => 2,
            },
            Insn::Var(node) => {
                if node.is_wide() {
                    4
                } else if node.var_index <= 3 && node.insn.opcode != opcodes::RET {
                    1
                } else {
                    2
                }
            }
            Insn::Iinc(node) => {
                if node.is_wide() {
                    6
                } else {
                    3
                }
            }
            Insn::Type(_) | Insn::Field(_) | Insn::Method(_) => 3,
            Insn::InvokeInterface(_) => 5,
            Insn::Jump(node) => {
                let long_form = staged.far
                    && matches!(node.insn.opcode, opcodes::GOTO | opcodes::JSR);
                if long_form { 5 } else { 3 }
            }
            Insn::Ldc(node) => {
                if node.value.is_wide() || staged.pool_index > 255 {
                    3
                } else {
                    2
                }
            }
            Insn::TableSwitch(node) => 1 + switch_padding(offset) + 12 + 4 * node.targets.len(),
            Insn::LookupSwitch(node) => 1 + switch_padding(offset) + 8 + 8 * node.pairs.len(),
            Insn::MultiANewArray(_) => 4,
        }
    }

    /// Every instruction index this one can transfer control to, fall-through excluded.
    pub fn branch_targets(&self) -> Vec<usize> {
        match self {
            Insn::Jump(node) => vec![node.target],
            Insn::TableSwitch(node) => {
                let mut targets = Vec::with_capacity(node.targets.len() + 1);
                targets.push(node.default);
                targets.extend_from_slice(&node.targets);
                targets
            }
            Insn::LookupSwitch(node) => {
                let mut targets = Vec::with_capacity(node.pairs.len() + 1);
                targets.push(node.default);
                targets.extend(node.pairs.iter().map(|(_, target)| *target));
                targets
            }
            _ => Vec::new(),
        }
    }
}

impl IincInsnNode {
    pub fn new(var_index: u16, increment: i16) -> Self {
        Self {
            var_index,
            increment,
            wide: false,
        }
    }

    /// Needs the `wide` prefix: explicit, slot above 255 or increment outside `i8`.
    pub fn is_wide(&self) -> bool {
        self.wide || self.var_index > 255 || i8::try_from(self.increment).is_err()
    }
}

impl PartialEq for IincInsnNode {
    fn eq(&self, other: &Self) -> bool {
        self.var_index == other.var_index
            && self.increment == other.increment
            && self.is_wide() == other.is_wide()
    }
}

/// Padding bytes after a switch opcode at `offset` so its operands start 4-aligned.
pub fn switch_padding(offset: usize) -> usize {
    (4 - ((offset + 1) % 4)) % 4
}

fn invoke_effect(method_descriptor: &str, receiver: i32) -> Result<i32, ClassWriteError> {
    let args = descriptor::argument_slots(method_descriptor)? as i32;
    let ret = descriptor::return_slots(method_descriptor)? as i32;
    Ok(ret - args - receiver)
}

/// Effect of an operand-less opcode, `None` if the opcode needs operands.
fn simple_stack_effect(opcode: u8) -> Option<i32> {
    use opcodes::*;
    let effect = match opcode {
        NOP => 0,
        ACONST_NULL | ICONST_M1..=ICONST_5 | FCONST_0..=FCONST_2 => 1,
        LCONST_0 | LCONST_1 | DCONST_0 | DCONST_1 => 2,
        LALOAD | DALOAD => 0,
        IALOAD | FALOAD | AALOAD | BALOAD | CALOAD | SALOAD => -1,
        LASTORE | DASTORE => -4,
        IASTORE | FASTORE | AASTORE | BASTORE | CASTORE | SASTORE => -3,
        POP => -1,
        POP2 => -2,
        DUP | DUP_X1 | DUP_X2 => 1,
        DUP2 | DUP2_X1 | DUP2_X2 => 2,
        SWAP => 0,
        IADD..=DREM => match (opcode - IADD) % 4 {
            0 | 2 => -1,
            _ => -2,
        },
        INEG..=DNEG => 0,
        ISHL..=LUSHR => -1,
        IAND | IOR | IXOR => -1,
        LAND | LOR | LXOR => -2,
        I2L | I2D | F2L | F2D => 1,
        L2I | L2F | D2I | D2F => -1,
        I2F | L2D | F2I | D2L | I2B | I2C | I2S => 0,
        LCMP | DCMPL | DCMPG => -3,
        FCMPL | FCMPG => -1,
        IRETURN | FRETURN | ARETURN => -1,
        LRETURN | DRETURN => -2,
        RETURN => 0,
        ARRAYLENGTH => 0,
        ATHROW | MONITORENTER | MONITOREXIT => -1,
        _ => return None,
    };
    Some(effect)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsnList {
    insns: Vec<Insn>,
}

impl InsnList {
    pub fn new() -> Self {
        Self { insns: Vec::new() }
    }

    pub fn add<T: Into<Insn>>(&mut self, insn: T) -> &mut Self {
        self.insns.push(insn.into());
        self
    }

    pub fn insns(&self) -> &[Insn] {
        &self.insns
    }

    /// The index the next added instruction will get, usable as a forward branch target.
    pub fn len(&self) -> usize {
        self.insns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }

    pub fn into_insns(self) -> Vec<Insn> {
        self.insns
    }
}

impl IntInsnNode {
    pub fn new(opcode: u8, operand: i32) -> Self {
        Self {
            insn: InsnNode { opcode },
            operand,
        }
    }
}

impl VarInsnNode {
    pub fn new(opcode: u8, var_index: u16) -> Self {
        Self {
            insn: InsnNode { opcode },
            var_index,
            wide: false,
        }
    }

    /// Emitted with the `wide` prefix: requested, or slot above 255.
    pub fn is_wide(&self) -> bool {
        self.wide || self.var_index > 255
    }
}

impl TypeInsnNode {
    pub fn new(opcode: u8, class_name: &str) -> Self {
        Self {
            insn: InsnNode { opcode },
            class_name: class_name.to_string(),
        }
    }
}

impl FieldInsnNode {
    pub fn new(opcode: u8, owner: &str, name: &str, descriptor: &str) -> Self {
        Self {
            insn: InsnNode { opcode },
            field_ref: MemberRef::new(owner, name, descriptor),
        }
    }
}

impl MethodInsnNode {
    pub fn new(opcode: u8, owner: &str, name: &str, descriptor: &str) -> Self {
        Self {
            insn: InsnNode { opcode },
            method_ref: MemberRef::new(owner, name, descriptor),
            interface: false,
        }
    }

    /// A static or special call to a method declared in an interface.
    pub fn on_interface(opcode: u8, owner: &str, name: &str, descriptor: &str) -> Self {
        Self {
            interface: true,
            ..Self::new(opcode, owner, name, descriptor)
        }
    }
}

impl InvokeInterfaceInsnNode {
    pub fn new(owner: &str, name: &str, descriptor: &str) -> Self {
        Self {
            method_ref: MemberRef::new(owner, name, descriptor),
        }
    }
}

impl JumpInsnNode {
    pub fn new(opcode: u8, target: usize) -> Self {
        Self {
            insn: InsnNode { opcode },
            target,
        }
    }
}

impl LdcInsnNode {
    pub fn new(value: Literal) -> Self {
        Self { value }
    }

    pub fn string(value: &str) -> Self {
        Self {
            value: Literal::String(JavaString::from(value)),
        }
    }
}

impl MultiANewArrayInsnNode {
    pub fn new(class_name: &str, dimensions: u8) -> Self {
        Self {
            class_name: class_name.to_string(),
            dimensions,
        }
    }
}

impl From<InsnNode> for Insn {
    fn from(value: InsnNode) -> Self {
        Insn::Simple(value)
    }
}

impl From<IntInsnNode> for Insn {
    fn from(value: IntInsnNode) -> Self {
        Insn::Int(value)
    }
}

impl From<VarInsnNode> for Insn {
    fn from(value: VarInsnNode) -> Self {
        Insn::Var(value)
    }
}

impl From<IincInsnNode> for Insn {
    fn from(value: IincInsnNode) -> Self {
        Insn::Iinc(value)
    }
}

impl From<TypeInsnNode> for Insn {
    fn from(value: TypeInsnNode) -> Self {
        Insn::Type(value)
    }
}

impl From<FieldInsnNode> for Insn {
    fn from(value: FieldInsnNode) -> Self {
        Insn::Field(value)
    }
}

impl From<MethodInsnNode> for Insn {
    fn from(value: MethodInsnNode) -> Self {
        Insn::Method(value)
    }
}

impl From<InvokeInterfaceInsnNode> for Insn {
    fn from(value: InvokeInterfaceInsnNode) -> Self {
        Insn::InvokeInterface(value)
    }
}

impl From<JumpInsnNode> for Insn {
    fn from(value: JumpInsnNode) -> Self {
        Insn::Jump(value)
    }
}

impl From<LdcInsnNode> for Insn {
    fn from(value: LdcInsnNode) -> Self {
        Insn::Ldc(value)
    }
}

impl From<TableSwitchInsnNode> for Insn {
    fn from(value: TableSwitchInsnNode) -> Self {
        Insn::TableSwitch(value)
    }
}

impl From<LookupSwitchInsnNode> for Insn {
    fn from(value: LookupSwitchInsnNode) -> Self {
        Insn::LookupSwitch(value)
    }
}

impl From<MultiANewArrayInsnNode> for Insn {
    fn from(value: MultiANewArrayInsnNode) -> Self {
        Insn::MultiANewArray(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple(opcode: u8) -> Insn {
        InsnNode { opcode }.into()
    }

    #[test]
    fn wide_values_count_two_cells() {
        assert_eq!(simple(opcodes::LCONST_1).stack_effect().unwrap(), 2);
        assert_eq!(simple(opcodes::LADD).stack_effect().unwrap(), -2);
        assert_eq!(simple(opcodes::LSHL).stack_effect().unwrap(), -1);
        assert_eq!(simple(opcodes::DCMPG).stack_effect().unwrap(), -3);
        assert_eq!(simple(opcodes::LASTORE).stack_effect().unwrap(), -4);
        assert_eq!(simple(opcodes::I2L).stack_effect().unwrap(), 1);
        assert_eq!(simple(opcodes::D2F).stack_effect().unwrap(), -1);
        let load: Insn = VarInsnNode::new(opcodes::DLOAD, 4).into();
        assert_eq!(load.stack_effect().unwrap(), 2);
        let ldc: Insn = LdcInsnNode::new(Literal::Long(1)).into();
        assert_eq!(ldc.stack_effect().unwrap(), 2);
    }

    #[test]
    fn member_effects_follow_descriptors() {
        let get: Insn = FieldInsnNode::new(opcodes::GETFIELD, "A", "x", "J").into();
        assert_eq!(get.stack_effect().unwrap(), 1);
        let put: Insn = FieldInsnNode::new(opcodes::PUTFIELD, "A", "x", "J").into();
        assert_eq!(put.stack_effect().unwrap(), -3);
        let put_static: Insn = FieldInsnNode::new(opcodes::PUTSTATIC, "A", "x", "I").into();
        assert_eq!(put_static.stack_effect().unwrap(), -1);

        let init: Insn =
            MethodInsnNode::new(opcodes::INVOKESPECIAL, "java/lang/Object", "<init>", "()V").into();
        assert_eq!(init.stack_effect().unwrap(), -1);
        let call: Insn = MethodInsnNode::new(opcodes::INVOKESTATIC, "A", "f", "(JI)D").into();
        assert_eq!(call.stack_effect().unwrap(), -1);
        let iface: Insn = InvokeInterfaceInsnNode::new("I", "g", "(I)V").into();
        assert_eq!(iface.stack_effect().unwrap(), -2);

        let bad: Insn = FieldInsnNode::new(opcodes::GETSTATIC, "A", "x", "Lfoo").into();
        assert!(bad.stack_effect().is_err());
    }

    #[test]
    fn var_width_thresholds() {
        let staged = Staged::default();
        let compact: Insn = VarInsnNode::new(opcodes::ALOAD, 3).into();
        assert_eq!(compact.encoded_length(0, staged), 1);
        let narrow: Insn = VarInsnNode::new(opcodes::ALOAD, 255).into();
        assert_eq!(narrow.encoded_length(0, staged), 2);
        let wide: Insn = VarInsnNode::new(opcodes::ALOAD, 256).into();
        assert_eq!(wide.encoded_length(0, staged), 4);
        let ret: Insn = VarInsnNode::new(opcodes::RET, 0).into();
        assert_eq!(ret.encoded_length(0, staged), 2);
        let forced: Insn = VarInsnNode {
            wide: true,
            ..VarInsnNode::new(opcodes::ILOAD, 1)
        }
        .into();
        assert_eq!(forced.encoded_length(0, staged), 4);

        let iinc: Insn = IincInsnNode::new(255, 127).into();
        assert_eq!(iinc.encoded_length(0, staged), 3);
        let iinc: Insn = IincInsnNode::new(255, 128).into();
        assert_eq!(iinc.encoded_length(0, staged), 6);
        let iinc: Insn = IincInsnNode::new(256, 1).into();
        assert_eq!(iinc.encoded_length(0, staged), 6);
    }

    #[test]
    fn ldc_and_jump_forms() {
        let ldc: Insn = LdcInsnNode::string("x").into();
        let at = |pool_index| Staged {
            pool_index,
            far: false,
        };
        assert_eq!(ldc.encoded_length(0, at(255)), 2);
        assert_eq!(ldc.encoded_length(0, at(256)), 3);
        let double: Insn = LdcInsnNode::new(Literal::Double(1.0)).into();
        assert_eq!(double.encoded_length(0, at(1)), 3);

        let far = Staged {
            pool_index: 0,
            far: true,
        };
        let goto: Insn = JumpInsnNode::new(opcodes::GOTO, 0).into();
        assert_eq!(goto.encoded_length(0, Staged::default()), 3);
        assert_eq!(goto.encoded_length(0, far), 5);
        let ifeq: Insn = JumpInsnNode::new(opcodes::IFEQ, 0).into();
        assert_eq!(ifeq.encoded_length(0, far), 3);
    }

    #[test]
    fn switch_length_includes_padding() {
        let table: Insn = TableSwitchInsnNode {
            default: 0,
            low: 0,
            targets: vec![0, 0],
        }
        .into();
        assert_eq!(table.encoded_length(0, Staged::default()), 1 + 3 + 12 + 8);
        assert_eq!(table.encoded_length(3, Staged::default()), 1 + 12 + 8);
        let lookup: Insn = LookupSwitchInsnNode {
            default: 0,
            pairs: vec![(1, 0)],
        }
        .into();
        assert_eq!(lookup.encoded_length(1, Staged::default()), 1 + 2 + 8 + 8);
    }

    #[test]
    fn validate_rejects_mismatched_opcodes() {
        assert!(simple(opcodes::BIPUSH).validate().is_err());
        assert!(simple(opcodes::ALOAD_0).validate().is_err());
        assert!(Insn::from(IntInsnNode::new(opcodes::BIPUSH, 200)).validate().is_err());
        assert!(Insn::from(IntInsnNode::new(opcodes::SIPUSH, 200)).validate().is_ok());
        assert!(Insn::from(JumpInsnNode::new(opcodes::RET, 0)).validate().is_err());
        assert!(Insn::from(MultiANewArrayInsnNode::new("[[I", 0)).validate().is_err());
    }
}
