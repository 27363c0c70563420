//! Access flag sets for classes, members and inner-class records.
//!
//! Decoding keeps every bit that was present in the file (`from_bits_retain`), so unknown
//! or context-specific bits survive a round trip unchanged.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ClassAccess: u16 {
        const PUBLIC = 0x0001;
        const FINAL = 0x0010;
        /// Treat superclass methods specially on `invokespecial`.
        const SUPER = 0x0020;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FieldAccess: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const VOLATILE = 0x0040;
        const TRANSIENT = 0x0080;
        const SYNTHETIC = 0x1000;
        const ENUM = 0x4000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MethodAccess: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const BRIDGE = 0x0040;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InnerClassAccess: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
    }
}

impl ClassAccess {
    pub fn is_public(&self) -> bool {
        self.contains(Self::PUBLIC)
    }

    pub fn is_final(&self) -> bool {
        self.contains(Self::FINAL)
    }

    pub fn is_interface(&self) -> bool {
        self.contains(Self::INTERFACE)
    }

    pub fn is_abstract(&self) -> bool {
        self.contains(Self::ABSTRACT)
    }

    pub fn is_synthetic(&self) -> bool {
        self.contains(Self::SYNTHETIC)
    }

    pub fn is_annotation(&self) -> bool {
        self.contains(Self::ANNOTATION)
    }

    pub fn is_enum(&self) -> bool {
        self.contains(Self::ENUM)
    }
}

impl FieldAccess {
    pub fn is_public(&self) -> bool {
        self.contains(Self::PUBLIC)
    }

    pub fn is_private(&self) -> bool {
        self.contains(Self::PRIVATE)
    }

    pub fn is_protected(&self) -> bool {
        self.contains(Self::PROTECTED)
    }

    pub fn is_static(&self) -> bool {
        self.contains(Self::STATIC)
    }

    pub fn is_final(&self) -> bool {
        self.contains(Self::FINAL)
    }

    pub fn is_volatile(&self) -> bool {
        self.contains(Self::VOLATILE)
    }

    pub fn is_transient(&self) -> bool {
        self.contains(Self::TRANSIENT)
    }

    pub fn is_synthetic(&self) -> bool {
        self.contains(Self::SYNTHETIC)
    }

    pub fn is_enum(&self) -> bool {
        self.contains(Self::ENUM)
    }
}

impl MethodAccess {
    pub fn is_public(&self) -> bool {
        self.contains(Self::PUBLIC)
    }

    pub fn is_private(&self) -> bool {
        self.contains(Self::PRIVATE)
    }

    pub fn is_protected(&self) -> bool {
        self.contains(Self::PROTECTED)
    }

    pub fn is_static(&self) -> bool {
        self.contains(Self::STATIC)
    }

    pub fn is_final(&self) -> bool {
        self.contains(Self::FINAL)
    }

    pub fn is_synchronized(&self) -> bool {
        self.contains(Self::SYNCHRONIZED)
    }

    pub fn is_bridge(&self) -> bool {
        self.contains(Self::BRIDGE)
    }

    pub fn is_varargs(&self) -> bool {
        self.contains(Self::VARARGS)
    }

    pub fn is_native(&self) -> bool {
        self.contains(Self::NATIVE)
    }

    pub fn is_abstract(&self) -> bool {
        self.contains(Self::ABSTRACT)
    }

    pub fn is_strict(&self) -> bool {
        self.contains(Self::STRICT)
    }

    pub fn is_synthetic(&self) -> bool {
        self.contains(Self::SYNTHETIC)
    }
}

impl InnerClassAccess {
    pub fn is_public(&self) -> bool {
        self.contains(Self::PUBLIC)
    }

    pub fn is_private(&self) -> bool {
        self.contains(Self::PRIVATE)
    }

    pub fn is_protected(&self) -> bool {
        self.contains(Self::PROTECTED)
    }

    pub fn is_static(&self) -> bool {
        self.contains(Self::STATIC)
    }

    pub fn is_interface(&self) -> bool {
        self.contains(Self::INTERFACE)
    }

    pub fn is_abstract(&self) -> bool {
        self.contains(Self::ABSTRACT)
    }
}
