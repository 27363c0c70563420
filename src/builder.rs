use crate::access::{ClassAccess, FieldAccess, InnerClassAccess, MethodAccess};
use crate::insn::{InsnList, Literal};
use crate::nodes::{
    ClassNode, CodeNode, EnclosingMethod, ExceptionTableEntry, FieldNode, InnerClassNode,
    MethodNode,
};

/// Assembles a [`ClassNode`] member by member. New classes default to version 50.0.
pub struct ClassBuilder {
    class: ClassNode,
}

impl ClassBuilder {
    pub fn new(name: &str, super_name: &str) -> Self {
        Self {
            class: ClassNode::new(ClassAccess::empty(), name, Some(super_name.to_string())),
        }
    }

    pub fn version(&mut self, major: u16, minor: u16) -> &mut Self {
        self.class.major_version = major;
        self.class.minor_version = minor;
        self
    }

    pub fn access(&mut self, access: ClassAccess) -> &mut Self {
        self.class.access = access;
        self
    }

    /// Only `java/lang/Object` has no superclass.
    pub fn no_super(&mut self) -> &mut Self {
        self.class.super_name = None;
        self
    }

    pub fn add_interface(&mut self, name: &str) -> &mut Self {
        self.class.interfaces.push(name.to_string());
        self
    }

    pub fn add_field(&mut self, field: FieldBuilder) -> &mut Self {
        self.class.fields.push(field.field);
        self
    }

    pub fn add_method(&mut self, method: MethodBuilder) -> &mut Self {
        self.class.methods.push(method.build());
        self
    }

    pub fn add_inner_class(
        &mut self,
        inner_class: &str,
        outer_class: Option<&str>,
        inner_name: Option<&str>,
        access: InnerClassAccess,
    ) -> &mut Self {
        self.class.inner_classes.push(InnerClassNode {
            inner_class: inner_class.to_string(),
            outer_class: outer_class.map(str::to_string),
            inner_name: inner_name.map(str::to_string),
            access,
        });
        self
    }

    pub fn enclosing_method(&mut self, owner: &str, method: Option<(&str, &str)>) -> &mut Self {
        self.class.enclosing_method = Some(EnclosingMethod {
            owner: owner.to_string(),
            method: method.map(|(name, descriptor)| (name.to_string(), descriptor.to_string())),
        });
        self
    }

    pub fn source_file(&mut self, name: &str) -> &mut Self {
        self.class.source_file = Some(name.to_string());
        self
    }

    pub fn signature(&mut self, signature: &str) -> &mut Self {
        self.class.signature = Some(signature.to_string());
        self
    }

    pub fn deprecated(&mut self) -> &mut Self {
        self.class.deprecated = true;
        self
    }

    pub fn build(self) -> ClassNode {
        self.class
    }
}

pub struct FieldBuilder {
    field: FieldNode,
}

impl FieldBuilder {
    pub fn new(access: FieldAccess, name: &str, descriptor: &str) -> Self {
        Self {
            field: FieldNode::new(access, name, descriptor),
        }
    }

    /// Initial value of a static final field (`ConstantValue`).
    pub fn constant_value(&mut self, value: Literal) -> &mut Self {
        self.field.constant_value = Some(value);
        self
    }

    pub fn signature(&mut self, signature: &str) -> &mut Self {
        self.field.signature = Some(signature.to_string());
        self
    }

    pub fn deprecated(&mut self) -> &mut Self {
        self.field.deprecated = true;
        self
    }

    pub fn synthetic(&mut self) -> &mut Self {
        self.field.synthetic = true;
        self
    }
}

pub struct MethodBuilder {
    method: MethodNode,
    insns: Option<InsnList>,
    exception_table: Vec<ExceptionTableEntry>,
    maxs: (u16, u16),
}

impl MethodBuilder {
    pub fn new(access: MethodAccess, name: &str, descriptor: &str) -> Self {
        Self {
            method: MethodNode::new(access, name, descriptor),
            insns: None,
            exception_table: Vec::new(),
            maxs: (0, 0),
        }
    }

    /// The method body, created empty on first use. Jump targets are indices into it.
    pub fn code(&mut self) -> &mut InsnList {
        self.insns.get_or_insert_with(InsnList::new)
    }

    pub fn set_code(&mut self, insns: InsnList) -> &mut Self {
        self.insns = Some(insns);
        self
    }

    /// Values written when the writer is not asked to compute them.
    pub fn maxs(&mut self, max_stack: u16, max_locals: u16) -> &mut Self {
        self.maxs = (max_stack, max_locals);
        self
    }

    pub fn add_code_exception(&mut self, entry: ExceptionTableEntry) -> &mut Self {
        self.exception_table.push(entry);
        self
    }

    pub fn add_exception(&mut self, name: &str) -> &mut Self {
        self.method.exceptions.push(name.to_string());
        self
    }

    pub fn signature(&mut self, signature: &str) -> &mut Self {
        self.method.signature = Some(signature.to_string());
        self
    }

    pub fn deprecated(&mut self) -> &mut Self {
        self.method.deprecated = true;
        self
    }

    pub fn synthetic(&mut self) -> &mut Self {
        self.method.synthetic = true;
        self
    }

    pub fn build(self) -> MethodNode {
        let mut method = self.method;
        method.code = self.insns.map(|insns| CodeNode {
            max_stack: self.maxs.0,
            max_locals: self.maxs.1,
            instructions: insns.into_insns(),
            exception_table: self.exception_table,
        });
        method
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insn::{Insn, InsnNode, JumpInsnNode, VarInsnNode};
    use crate::opcodes;

    #[test]
    fn builds_class_with_members() {
        let mut counter = FieldBuilder::new(FieldAccess::PRIVATE | FieldAccess::STATIC, "count", "I");
        counter.constant_value(Literal::Integer(3));

        let mut run = MethodBuilder::new(MethodAccess::PUBLIC, "run", "(I)V");
        run.add_exception("java/io/IOException");
        let code = run.code();
        code.add(VarInsnNode::new(opcodes::ILOAD, 1));
        let target = code.len() + 2;
        code.add(JumpInsnNode::new(opcodes::IFEQ, target));
        code.add(InsnNode { opcode: opcodes::NOP });
        code.add(InsnNode { opcode: opcodes::RETURN });

        let mut builder = ClassBuilder::new("demo/Runner", "java/lang/Object");
        builder
            .access(ClassAccess::PUBLIC | ClassAccess::SUPER)
            .add_interface("java/lang/Runnable")
            .source_file("Runner.java")
            .add_field(counter)
            .add_method(run);
        let class = builder.build();

        assert_eq!((class.minor_version, class.major_version), (0, 50));
        assert_eq!(class.super_name.as_deref(), Some("java/lang/Object"));
        assert_eq!(
            class.field("count", "I").and_then(|f| f.constant_value.clone()),
            Some(Literal::Integer(3))
        );
        let method = class.method("run", "(I)V").unwrap();
        assert_eq!(method.exceptions, vec!["java/io/IOException".to_string()]);
        let code = method.code.as_ref().unwrap();
        assert_eq!(code.instructions.len(), 4);
        assert_eq!(
            code.instructions[1],
            Insn::Jump(JumpInsnNode::new(opcodes::IFEQ, 3))
        );
    }

    #[test]
    fn method_without_code_stays_abstract() {
        let method = MethodBuilder::new(MethodAccess::PUBLIC | MethodAccess::ABSTRACT, "f", "()V").build();
        assert!(method.code.is_none());
    }
}
