/// Constructs an `InsnList` using a declarative, Smali-like syntax.
///
/// Each instruction sits in its own brackets: `[prefix OPCODE operands]`.
///
/// * **Simple:** `[RETURN]`, `[NOP]`
/// * **Int:** `[int BIPUSH 10]`
/// * **Var:** `[var ALOAD 0]`
/// * **Iinc:** `[iinc 1, 5]`
/// * **Type:** `[type NEW "java/lang/StringBuilder"]`
/// * **Field:** `[field GETSTATIC "java/lang/System", "out", "Ljava/io/PrintStream;"]`
/// * **Method:** `[method INVOKEVIRTUAL "java/io/PrintStream", "println", "(Ljava/lang/String;)V"]`
/// * **Interface method:** `[interface "java/util/List", "size", "()I"]`
/// * **Ldc:** `[ldc "text"]` for strings, `[ldc_value Literal::Long(1)]` for anything else
/// * **Jump:** `[jump GOTO 4]`, where the operand is the target's instruction index
///
/// ```rust
/// use rust_classfile::{insn_list, opcodes, insn::Insn};
///
/// let list = insn_list! {
///     [var ALOAD 0]
///     [method INVOKESPECIAL "java/lang/Object", "<init>", "()V"]
///     [RETURN]
/// };
/// let insns = list.into_insns();
/// assert_eq!(insns.len(), 3);
/// assert!(matches!(&insns[2], Insn::Simple(node) if node.opcode == opcodes::RETURN));
/// ```
#[macro_export]
macro_rules! insn_list {
    ( $( [ $($instruction:tt)+ ] )* ) => {
        {
            let mut list = $crate::insn::InsnList::new();
            $(
                $crate::insn_list!(@dispatch list, $($instruction)+);
            )*
            list
        }
    };

    (@dispatch $list:ident, $opcode:ident) => {
        $list.add($crate::insn::InsnNode { opcode: $crate::opcodes::$opcode });
    };

    (@dispatch $list:ident, int $opcode:ident $operand:expr) => {
        $list.add($crate::insn::IntInsnNode::new($crate::opcodes::$opcode, $operand as i32));
    };

    (@dispatch $list:ident, var $opcode:ident $index:expr) => {
        $list.add($crate::insn::VarInsnNode::new($crate::opcodes::$opcode, $index as u16));
    };

    (@dispatch $list:ident, iinc $var:expr, $incr:expr) => {
        $list.add($crate::insn::IincInsnNode::new($var as u16, $incr as i16));
    };

    (@dispatch $list:ident, type $opcode:ident $class_name:expr) => {
        $list.add($crate::insn::TypeInsnNode::new($crate::opcodes::$opcode, $class_name));
    };

    (@dispatch $list:ident, field $opcode:ident $owner:expr, $name:expr, $desc:expr) => {
        $list.add($crate::insn::FieldInsnNode::new(
            $crate::opcodes::$opcode,
            $owner,
            $name,
            $desc
        ));
    };

    (@dispatch $list:ident, method $opcode:ident $owner:expr, $name:expr, $desc:expr) => {
        $list.add($crate::insn::MethodInsnNode::new(
            $crate::opcodes::$opcode,
            $owner,
            $name,
            $desc
        ));
    };

    (@dispatch $list:ident, interface $owner:expr, $name:expr, $desc:expr) => {
        $list.add($crate::insn::InvokeInterfaceInsnNode::new($owner, $name, $desc));
    };

    (@dispatch $list:ident, ldc $value:expr) => {
        $list.add($crate::insn::LdcInsnNode::string($value));
    };

    (@dispatch $list:ident, ldc_value $value:expr) => {
        $list.add($crate::insn::LdcInsnNode::new($value));
    };

    (@dispatch $list:ident, jump $opcode:ident $target:expr) => {
        $list.add($crate::insn::JumpInsnNode::new($crate::opcodes::$opcode, $target as usize));
    };
}

#[cfg(test)]
mod tests {
    use crate::insn::{Insn, Literal, MemberRef};
    use crate::opcodes;

    #[test]
    fn insn_list_builds_every_form() {
        let list = insn_list! {
            [NOP]
            [int BIPUSH 42]
            [var ALOAD 1]
            [type NEW "java/lang/StringBuilder"]
            [field GETSTATIC "java/lang/System", "out", "Ljava/io/PrintStream;"]
            [method INVOKEVIRTUAL "java/io/PrintStream", "println", "(Ljava/lang/String;)V"]
            [interface "java/util/List", "size", "()I"]
            [ldc "Hello Macro"]
            [ldc_value Literal::Long(7)]
            [jump GOTO 0]
            [iinc 2, 1]
            [RETURN]
        };

        let insns = list.into_insns();
        assert_eq!(insns.len(), 12);

        match &insns[1] {
            Insn::Int(node) => {
                assert_eq!(node.insn.opcode, opcodes::BIPUSH);
                assert_eq!(node.operand, 42);
            }
            other => panic!("expected int insn, got {other:?}"),
        }
        match &insns[2] {
            Insn::Var(node) => {
                assert_eq!(node.insn.opcode, opcodes::ALOAD);
                assert_eq!(node.var_index, 1);
                assert!(!node.wide);
            }
            other => panic!("expected var insn, got {other:?}"),
        }
        match &insns[3] {
            Insn::Type(node) => assert_eq!(node.class_name, "java/lang/StringBuilder"),
            other => panic!("expected type insn, got {other:?}"),
        }
        match &insns[4] {
            Insn::Field(node) => assert_eq!(
                node.field_ref,
                MemberRef::new("java/lang/System", "out", "Ljava/io/PrintStream;")
            ),
            other => panic!("expected field insn, got {other:?}"),
        }
        match &insns[6] {
            Insn::InvokeInterface(node) => assert_eq!(node.method_ref.name, "size"),
            other => panic!("expected invokeinterface, got {other:?}"),
        }
        match &insns[7] {
            Insn::Ldc(node) => assert_eq!(node.value, Literal::String("Hello Macro".into())),
            other => panic!("expected ldc, got {other:?}"),
        }
        match &insns[8] {
            Insn::Ldc(node) => assert!(node.value.is_wide()),
            other => panic!("expected ldc, got {other:?}"),
        }
        match &insns[9] {
            Insn::Jump(node) => {
                assert_eq!(node.insn.opcode, opcodes::GOTO);
                assert_eq!(node.target, 0);
            }
            other => panic!("expected jump, got {other:?}"),
        }
        match &insns[10] {
            Insn::Iinc(node) => assert_eq!((node.var_index, node.increment), (2, 1)),
            other => panic!("expected iinc, got {other:?}"),
        }
    }
}
