//! Reading, editing and writing JVM class files.
//!
//! [`ClassReader`] turns class-file bytes into a [`ClassNode`] whose constant-pool
//! references are all resolved to names and literals, and whose branch targets are
//! instruction indices. [`ClassWriter`] goes back to bytes, building a fresh constant
//! pool and recomputing `max_stack`/`max_locals` on the way.

pub mod access;
pub mod attribute;
pub mod builder;
pub mod bytecode;
pub mod class_reader;
pub mod class_writer;
pub mod constant_pool;
pub mod constants;
pub mod descriptor;
pub mod error;
pub mod insn;
mod macros;
pub mod nodes;
pub mod opcodes;
pub mod stack;

pub use access::{ClassAccess, FieldAccess, InnerClassAccess, MethodAccess};
pub use builder::{ClassBuilder, FieldBuilder, MethodBuilder};
pub use class_reader::{ClassReader, ReaderFlags};
pub use class_writer::{ClassWriter, WriterFlags};
pub use constant_pool::{Constant, ConstantPool};
pub use error::{ClassReadError, ClassWriteError, Error, Result};
pub use insn::{Insn, InsnList, Literal, MemberRef};
pub use nodes::{
    ClassNode, CodeNode, EnclosingMethod, ExceptionTableEntry, FieldNode, InnerClassNode,
    MethodNode, PoolHook,
};

/// Reads a class file with default options.
pub fn read_class(bytes: &[u8]) -> Result<ClassNode> {
    Ok(ClassReader::new(bytes, ReaderFlags::default()).read()?)
}

/// Writes a class with default options (`max_stack`/`max_locals` recomputed).
pub fn write_class(class: &ClassNode) -> Result<Vec<u8>> {
    Ok(ClassWriter::default().write(class)?)
}
