#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("class read error")]
    Read(#[from] ClassReadError),
    #[error("class write error")]
    Write(#[from] ClassWriteError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failures while decoding a class file. Every variant aborts the read; no partial model
/// is returned.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassReadError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("invalid magic 0x{0:08x}")]
    InvalidMagic(u32),
    #[error("invalid constant pool tag {0}")]
    InvalidConstantPoolTag(u8),
    #[error("invalid constant pool index {0}")]
    InvalidIndex(u16),
    #[error("constant pool entry {index} is not a {expected}")]
    UnexpectedConstant {
        index: u16,
        expected: &'static str,
    },
    #[error("long or double constant at {0} overruns the constant pool count")]
    TruncatedWideConstant(u16),
    #[error("{0} constant pool entries could not be resolved")]
    UnresolvedConstants(usize),
    #[error("invalid attribute {0}")]
    InvalidAttribute(String),
    #[error("invalid opcode 0x{opcode:02x} at {offset}")]
    InvalidOpcode {
        /// The opcode that caused the error.
        opcode: u8,
        /// Offset into the code array where the error occurred.
        offset: usize,
    },
    #[error("branch at {offset} targets {target}, which is not an instruction boundary")]
    InvalidBranchTarget { offset: usize, target: i64 },
    #[error("modified utf8 error: {0}")]
    Utf8Error(String),
}

/// Failures while encoding a model. They all point at a structurally inconsistent model.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ClassWriteError {
    #[error("instruction {insn} branches to {target}, which is not an instruction")]
    InvalidBranchTarget { insn: usize, target: usize },
    #[error("invalid exception range {start}..{end} with handler {handler} over {len} instructions")]
    InvalidExceptionRange {
        start: usize,
        end: usize,
        handler: usize,
        len: usize,
    },
    #[error("branch offset {offset} of instruction {insn} does not fit its encoding")]
    BranchOffsetOverflow { insn: usize, offset: i64 },
    #[error("invalid operand for instruction {insn}: {reason}")]
    InvalidOperand { insn: usize, reason: &'static str },
    #[error("invalid descriptor {0:?}")]
    InvalidDescriptor(String),
    #[error("operand stack underflow at instruction {insn}")]
    StackUnderflow { insn: usize },
    #[error("operand stack exceeds 65535 cells at instruction {insn}")]
    StackOverflow { insn: usize },
    #[error("constant pool exceeds 65535 entries")]
    ConstantPoolOverflow,
    #[error("code array of {0} bytes exceeds 65535")]
    CodeTooLarge(usize),
    #[error("modified utf8 encoding of {0} bytes exceeds 65535")]
    StringTooLong(usize),
    #[error("{count} {what} exceed the 65535 a class file can hold")]
    TooManyEntries { what: &'static str, count: usize },
    #[error("constant pool hook failed: {0}")]
    Hook(String),
}
