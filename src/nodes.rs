use std::fmt;
use std::sync::Arc;

use crate::access::{ClassAccess, FieldAccess, InnerClassAccess, MethodAccess};
use crate::constant_pool::ConstantPool;
use crate::constants::{DEFAULT_MAJOR_VERSION, DEFAULT_MINOR_VERSION};
use crate::error::ClassWriteError;
use crate::insn::{Insn, Literal};

/// A decoded (or hand-built) class. Every reference is symbolic; constant-pool indices
/// are assigned again on each write.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassNode {
    pub minor_version: u16,
    pub major_version: u16,
    pub access: ClassAccess,
    pub name: String,
    /// `None` only for `java/lang/Object`.
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldNode>,
    pub methods: Vec<MethodNode>,
    pub inner_classes: Vec<InnerClassNode>,
    pub enclosing_method: Option<EnclosingMethod>,
    pub source_file: Option<String>,
    pub signature: Option<String>,
    pub deprecated: bool,
    pub synthetic: bool,
    /// Run against the finished constant pool, right before it is serialized.
    pub pool_hooks: PoolHooks,
}

impl ClassNode {
    pub fn new(access: ClassAccess, name: impl Into<String>, super_name: Option<String>) -> Self {
        Self {
            minor_version: DEFAULT_MINOR_VERSION,
            major_version: DEFAULT_MAJOR_VERSION,
            access,
            name: name.into(),
            super_name,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            inner_classes: Vec::new(),
            enclosing_method: None,
            source_file: None,
            signature: None,
            deprecated: false,
            synthetic: false,
            pool_hooks: PoolHooks::default(),
        }
    }

    pub fn field(&self, name: &str, descriptor: &str) -> Option<&FieldNode> {
        self.fields
            .iter()
            .find(|f| f.name == name && f.descriptor == descriptor)
    }

    pub fn fields_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a FieldNode> {
        self.fields.iter().filter(move |f| f.name == name)
    }

    pub fn fields_by_descriptor<'a>(
        &'a self,
        descriptor: &'a str,
    ) -> impl Iterator<Item = &'a FieldNode> {
        self.fields.iter().filter(move |f| f.descriptor == descriptor)
    }

    pub fn method(&self, name: &str, descriptor: &str) -> Option<&MethodNode> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    pub fn method_mut(&mut self, name: &str, descriptor: &str) -> Option<&mut MethodNode> {
        self.methods
            .iter_mut()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MethodNode> {
        self.methods.iter().filter(move |m| m.name == name)
    }

    pub fn methods_by_descriptor<'a>(
        &'a self,
        descriptor: &'a str,
    ) -> impl Iterator<Item = &'a MethodNode> {
        self.methods.iter().filter(move |m| m.descriptor == descriptor)
    }

    /// Registers a hook that may add entries to the constant pool before it is written.
    pub fn add_pool_hook<H: PoolHook + 'static>(&mut self, hook: H) {
        self.pool_hooks.0.push(Arc::new(hook));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldNode {
    pub access: FieldAccess,
    pub name: String,
    pub descriptor: String,
    pub constant_value: Option<Literal>,
    pub signature: Option<String>,
    pub deprecated: bool,
    pub synthetic: bool,
}

impl FieldNode {
    pub fn new(access: FieldAccess, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            access,
            name: name.into(),
            descriptor: descriptor.into(),
            constant_value: None,
            signature: None,
            deprecated: false,
            synthetic: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodNode {
    pub access: MethodAccess,
    pub name: String,
    pub descriptor: String,
    /// Absent for abstract and native methods, and when code was skipped on read.
    pub code: Option<CodeNode>,
    /// Internal names from the `Exceptions` attribute.
    pub exceptions: Vec<String>,
    pub signature: Option<String>,
    pub deprecated: bool,
    pub synthetic: bool,
}

impl MethodNode {
    pub fn new(
        access: MethodAccess,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Self {
            access,
            name: name.into(),
            descriptor: descriptor.into(),
            code: None,
            exceptions: Vec::new(),
            signature: None,
            deprecated: false,
            synthetic: false,
        }
    }
}

/// A method body. Branch targets and exception ranges are instruction indices.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CodeNode {
    /// As read from the file; the writer recomputes it unless told not to.
    pub max_stack: u16,
    pub max_locals: u16,
    pub instructions: Vec<Insn>,
    pub exception_table: Vec<ExceptionTableEntry>,
}

impl CodeNode {
    pub fn new(instructions: Vec<Insn>) -> Self {
        Self {
            instructions,
            ..Self::default()
        }
    }
}

/// A protected range `start..end` over instruction indices. `end` may equal the
/// instruction count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    pub start: usize,
    pub end: usize,
    pub handler: usize,
    /// `None` catches everything (`finally`).
    pub catch_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClassNode {
    pub inner_class: String,
    pub outer_class: Option<String>,
    pub inner_name: Option<String>,
    pub access: InnerClassAccess,
}

/// The `EnclosingMethod` record of a local or anonymous class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnclosingMethod {
    pub owner: String,
    /// Name and descriptor; `None` when the class is enclosed by an initializer.
    pub method: Option<(String, String)>,
}

/// A last-moment edit of the constant pool during writing.
pub trait PoolHook: Send + Sync {
    fn apply(&self, pool: &mut ConstantPool) -> Result<(), ClassWriteError>;
}

impl<F> PoolHook for F
where
    F: Fn(&mut ConstantPool) -> Result<(), ClassWriteError> + Send + Sync,
{
    fn apply(&self, pool: &mut ConstantPool) -> Result<(), ClassWriteError> {
        self(pool)
    }
}

#[derive(Clone, Default)]
pub struct PoolHooks(pub Vec<Arc<dyn PoolHook>>);

impl PoolHooks {
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn PoolHook>> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for PoolHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PoolHooks({})", self.0.len())
    }
}

// Hooks are opaque; they never take part in model equality.
impl PartialEq for PoolHooks {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}
