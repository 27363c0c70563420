pub const MAGIC: u32 = 0xCAFEBABE;

pub const DEFAULT_MINOR_VERSION: u16 = 0;
pub const DEFAULT_MAJOR_VERSION: u16 = 50;

pub const CONSTANT_UTF8: u8 = 1;
pub const CONSTANT_INTEGER: u8 = 3;
pub const CONSTANT_FLOAT: u8 = 4;
pub const CONSTANT_LONG: u8 = 5;
pub const CONSTANT_DOUBLE: u8 = 6;
pub const CONSTANT_CLASS: u8 = 7;
pub const CONSTANT_STRING: u8 = 8;
pub const CONSTANT_FIELDREF: u8 = 9;
pub const CONSTANT_METHODREF: u8 = 10;
pub const CONSTANT_INTERFACE_METHODREF: u8 = 11;
pub const CONSTANT_NAME_AND_TYPE: u8 = 12;

pub const ATTR_CODE: &str = "Code";
pub const ATTR_CONSTANT_VALUE: &str = "ConstantValue";
pub const ATTR_DEPRECATED: &str = "Deprecated";
pub const ATTR_ENCLOSING_METHOD: &str = "EnclosingMethod";
pub const ATTR_EXCEPTIONS: &str = "Exceptions";
pub const ATTR_INNER_CLASSES: &str = "InnerClasses";
pub const ATTR_SIGNATURE: &str = "Signature";
pub const ATTR_SOURCE_FILE: &str = "SourceFile";
pub const ATTR_SYNTHETIC: &str = "Synthetic";

/// `newarray` element type codes.
pub const T_BOOLEAN: u8 = 4;
pub const T_CHAR: u8 = 5;
pub const T_FLOAT: u8 = 6;
pub const T_DOUBLE: u8 = 7;
pub const T_BYTE: u8 = 8;
pub const T_SHORT: u8 = 9;
pub const T_INT: u8 = 10;
pub const T_LONG: u8 = 11;
