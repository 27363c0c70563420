use java_string::JavaString;
use rust_classfile::class_reader::ByteReader;
use rust_classfile::constant_pool::decode_modified_utf8;
use rust_classfile::constants::T_INT;
use rust_classfile::insn::{
    IincInsnNode, InsnNode, IntInsnNode, InvokeInterfaceInsnNode, JumpInsnNode, LdcInsnNode,
    LookupSwitchInsnNode, MultiANewArrayInsnNode, TableSwitchInsnNode, TypeInsnNode, VarInsnNode,
};
use rust_classfile::{
    ClassAccess, ClassBuilder, ClassNode, ClassReadError, Constant, ConstantPool,
    ExceptionTableEntry, FieldAccess, FieldBuilder, InnerClassAccess, Insn, InsnList, Literal,
    MethodAccess, MethodBuilder, insn_list, opcodes, read_class, write_class,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn simple(opcode: u8) -> InsnNode {
    InsnNode { opcode }
}

fn rich_class() -> ClassNode {
    let mut builder = ClassBuilder::new("demo/Rich", "java/lang/Object");
    builder
        .access(ClassAccess::PUBLIC | ClassAccess::SUPER)
        .add_interface("java/lang/Runnable")
        .source_file("Rich.java")
        .signature("Ljava/lang/Object;Ljava/lang/Runnable;")
        .add_inner_class(
            "demo/Rich$Inner",
            Some("demo/Rich"),
            Some("Inner"),
            InnerClassAccess::PUBLIC | InnerClassAccess::STATIC,
        )
        .enclosing_method("demo/Outer", Some(("make", "()V")));

    let constants = [
        ("I", "I", Literal::Integer(-7)),
        ("F", "F", Literal::Float(f32::NAN)),
        ("J", "J", Literal::Long(1 << 40)),
        ("D", "D", Literal::Double(-0.0)),
        ("S", "Ljava/lang/String;", Literal::String(JavaString::from("caf\u{e9}\0"))),
    ];
    for (name, descriptor, value) in constants {
        let mut field = FieldBuilder::new(
            FieldAccess::PUBLIC | FieldAccess::STATIC | FieldAccess::FINAL,
            name,
            descriptor,
        );
        field.constant_value(value);
        builder.add_field(field);
    }
    let mut items = FieldBuilder::new(FieldAccess::PRIVATE, "items", "Ljava/util/List;");
    items
        .signature("Ljava/util/List<Ljava/lang/String;>;")
        .deprecated()
        .synthetic();
    builder.add_field(items);

    let mut init = MethodBuilder::new(MethodAccess::PUBLIC, "<init>", "()V");
    init.set_code(insn_list! {
        [var ALOAD 0]
        [method INVOKESPECIAL "java/lang/Object", "<init>", "()V"]
        [RETURN]
    });
    builder.add_method(init);

    let mut run = MethodBuilder::new(MethodAccess::PUBLIC, "run", "()V");
    run.set_code(insn_list! {
        [ICONST_0]
        [var ISTORE 1]
        [var ILOAD 1]
        [int BIPUSH 10]
        [jump IF_ICMPGE 10]
        [field GETSTATIC "java/lang/System", "out", "Ljava/io/PrintStream;"]
        [ldc "tick"]
        [method INVOKEVIRTUAL "java/io/PrintStream", "println", "(Ljava/lang/String;)V"]
        [iinc 1, 1]
        [jump GOTO 2]
        [RETURN]
    });
    builder.add_method(run);

    let mut pick = MethodBuilder::new(MethodAccess::PUBLIC | MethodAccess::STATIC, "pick", "(I)I");
    let mut body = InsnList::new();
    body.add(VarInsnNode::new(opcodes::ILOAD, 0))
        .add(TableSwitchInsnNode {
            default: 6,
            low: 1,
            targets: vec![2, 4],
        })
        .add(simple(opcodes::ICONST_1))
        .add(simple(opcodes::IRETURN))
        .add(simple(opcodes::ICONST_2))
        .add(simple(opcodes::IRETURN))
        .add(VarInsnNode::new(opcodes::ILOAD, 0))
        .add(LookupSwitchInsnNode {
            default: 10,
            pairs: vec![(-5, 8), (100, 10)],
        })
        .add(simple(opcodes::ICONST_M1))
        .add(simple(opcodes::IRETURN))
        .add(simple(opcodes::ICONST_0))
        .add(simple(opcodes::IRETURN));
    pick.set_code(body);
    builder.add_method(pick);

    let mut guarded = MethodBuilder::new(MethodAccess::PUBLIC, "guarded", "()V");
    guarded
        .add_exception("java/io/IOException")
        .signature("()V^Ljava/io/IOException;");
    guarded
        .code()
        .add(VarInsnNode::new(opcodes::ALOAD, 0))
        .add(InvokeInterfaceInsnNode::new("java/lang/Runnable", "run", "()V"))
        .add(JumpInsnNode::new(opcodes::GOTO, 5))
        .add(VarInsnNode::new(opcodes::ASTORE, 1))
        .add(simple(opcodes::RETURN))
        .add(simple(opcodes::RETURN));
    guarded
        .add_code_exception(ExceptionTableEntry {
            start: 0,
            end: 2,
            handler: 3,
            catch_type: Some("java/lang/RuntimeException".to_string()),
        })
        .add_code_exception(ExceptionTableEntry {
            start: 0,
            end: 2,
            handler: 3,
            catch_type: None,
        });
    builder.add_method(guarded);

    let mut constants = MethodBuilder::new(MethodAccess::STATIC, "constants", "()V");
    constants
        .code()
        .add(LdcInsnNode::new(Literal::Long(1 << 40)))
        .add(simple(opcodes::POP2))
        .add(LdcInsnNode::new(Literal::Double(0.5)))
        .add(simple(opcodes::POP2))
        .add(LdcInsnNode::new(Literal::Class("java/lang/String".to_string())))
        .add(simple(opcodes::POP))
        .add(LdcInsnNode::new(Literal::Float(1.5)))
        .add(simple(opcodes::POP))
        .add(LdcInsnNode::new(Literal::Integer(123_456)))
        .add(simple(opcodes::POP))
        .add(IntInsnNode::new(opcodes::SIPUSH, 1000))
        .add(IntInsnNode::new(opcodes::NEWARRAY, T_INT as i32))
        .add(simple(opcodes::POP))
        .add(simple(opcodes::ICONST_2))
        .add(simple(opcodes::ICONST_3))
        .add(MultiANewArrayInsnNode::new("[[I", 2))
        .add(simple(opcodes::POP))
        .add(TypeInsnNode::new(opcodes::NEW, "java/lang/Object"))
        .add(simple(opcodes::POP))
        .add(simple(opcodes::ICONST_0))
        .add(VarInsnNode::new(opcodes::ISTORE, 300))
        .add(IincInsnNode::new(300, 1000))
        .add(simple(opcodes::RETURN));
    builder.add_method(constants);

    builder.add_method(MethodBuilder::new(
        MethodAccess::PUBLIC | MethodAccess::NATIVE,
        "poke",
        "(JD)V",
    ));

    builder.build()
}

#[test]
fn rich_class_round_trips() {
    init_logger();
    let class = rich_class();
    let bytes = write_class(&class).unwrap();
    let read = read_class(&bytes).unwrap();

    assert_eq!(read.name, class.name);
    assert_eq!(read.super_name, class.super_name);
    assert_eq!(read.access, class.access);
    assert_eq!(
        (read.minor_version, read.major_version),
        (class.minor_version, class.major_version)
    );
    assert_eq!(read.interfaces, class.interfaces);
    assert_eq!(read.source_file, class.source_file);
    assert_eq!(read.signature, class.signature);
    assert_eq!(read.inner_classes, class.inner_classes);
    assert_eq!(read.enclosing_method, class.enclosing_method);
    assert_eq!(read.fields, class.fields);

    assert_eq!(read.methods.len(), class.methods.len());
    for (got, want) in read.methods.iter().zip(&class.methods) {
        assert_eq!(got.name, want.name);
        assert_eq!(got.descriptor, want.descriptor);
        assert_eq!(got.access, want.access);
        assert_eq!(got.exceptions, want.exceptions);
        assert_eq!(got.signature, want.signature);
        assert_eq!(got.code.is_some(), want.code.is_some());
        if let (Some(got), Some(want)) = (&got.code, &want.code) {
            assert_eq!(got.instructions, want.instructions);
            assert_eq!(got.exception_table, want.exception_table);
        }
    }

    // Writing what was read changes nothing.
    assert_eq!(write_class(&read).unwrap(), bytes);
}

#[test]
fn computed_maxs_follow_the_code() {
    init_logger();
    let read = read_class(&write_class(&rich_class()).unwrap()).unwrap();
    let maxs = |name: &str, descriptor: &str| {
        let code = read.method(name, descriptor).and_then(|m| m.code.as_ref()).unwrap();
        (code.max_stack, code.max_locals)
    };
    assert_eq!(maxs("<init>", "()V"), (1, 1));
    assert_eq!(maxs("run", "()V"), (2, 2));
    assert_eq!(maxs("pick", "(I)I"), (1, 1));
    assert_eq!(maxs("guarded", "()V"), (1, 2));
    assert_eq!(maxs("constants", "()V"), (2, 301));
    assert!(read.method("poke", "(JD)V").unwrap().code.is_none());
}

#[test]
fn wide_constants_take_two_slots() {
    init_logger();
    let mut builder = ClassBuilder::new("demo/Wide", "java/lang/Object");
    let mut long = FieldBuilder::new(FieldAccess::STATIC | FieldAccess::FINAL, "L", "J");
    long.constant_value(Literal::Long(5));
    let mut double = FieldBuilder::new(FieldAccess::STATIC | FieldAccess::FINAL, "D", "D");
    double.constant_value(Literal::Double(2.5));
    builder.add_field(long).add_field(double);
    let bytes = write_class(&builder.build()).unwrap();

    // ConstantValue, demo/Wide, Class, java/lang/Object, Class, L, J, Long + gap, D,
    // Double + gap.
    let pool = ConstantPool::decode(&mut ByteReader::new(&bytes[8..])).unwrap();
    assert_eq!(pool.size(), 13);
    assert_eq!(pool.get(8).unwrap(), &Constant::Long(5));
    assert_eq!(pool.get(9), Err(ClassReadError::InvalidIndex(9)));
    assert_eq!(pool.utf8(10).unwrap(), "D");
    assert_eq!(pool.get(11).unwrap(), &Constant::Double(2.5));
    assert_eq!(pool.get(12), Err(ClassReadError::InvalidIndex(12)));
}

#[test]
fn ldc_switches_to_wide_form_past_index_255() {
    init_logger();
    let mut method = MethodBuilder::new(MethodAccess::STATIC, "strings", "()V");
    let code = method.code();
    for i in 0..300 {
        code.add(LdcInsnNode::string(&format!("s{i}")));
        code.add(simple(opcodes::POP));
    }
    code.add(simple(opcodes::RETURN));
    let mut builder = ClassBuilder::new("demo/Strings", "java/lang/Object");
    builder.add_method(method);
    let class = builder.build();

    let bytes = write_class(&class).unwrap();
    let read = read_class(&bytes).unwrap();
    let code = read.methods[0].code.as_ref().unwrap();
    assert_eq!(code.instructions, class.methods[0].code.as_ref().unwrap().instructions);
    assert_eq!(code.max_stack, 1);

    // Pool: Code, demo/Strings + Class, java/lang/Object + Class, strings, ()V, then a
    // Utf8 + String pair per literal. The String entries sit at 9, 11, ..., so the
    // first 124 loads fit `ldc` and the remaining 176 need `ldc_w`.
    let code_length: u32 = 124 * 2 + 176 * 3 + 300 + 1;
    let mut header = Vec::new();
    header.extend_from_slice(&(12 + code_length).to_be_bytes());
    header.extend_from_slice(&[0x00, 0x01, 0x00, 0x00]);
    header.extend_from_slice(&code_length.to_be_bytes());
    assert!(bytes.windows(header.len()).any(|w| w == header.as_slice()));
}

#[test]
fn far_branches_round_trip() {
    init_logger();
    // A backward goto over more than 32767 bytes of code.
    let mut method = MethodBuilder::new(MethodAccess::STATIC, "spin", "()V");
    let code = method.code();
    code.add(simple(opcodes::NOP));
    for _ in 0..33_000 {
        code.add(simple(opcodes::NOP));
    }
    code.add(JumpInsnNode::new(opcodes::GOTO, 0));
    let mut builder = ClassBuilder::new("demo/Spin", "java/lang/Object");
    builder.add_method(method);
    let class = builder.build();

    let read = read_class(&write_class(&class).unwrap()).unwrap();
    let insns = &read.methods[0].code.as_ref().unwrap().instructions;
    assert_eq!(insns.len(), 33_002);
    assert_eq!(insns[33_001], Insn::Jump(JumpInsnNode::new(opcodes::GOTO, 0)));
}

#[test]
fn pool_hook_entries_are_written() {
    init_logger();
    let mut class = ClassBuilder::new("demo/Hooked", "java/lang/Object").build();
    class.add_pool_hook(|pool: &mut ConstantPool| pool.insert(Constant::Integer(42)).map(|_| ()));
    let bytes = write_class(&class).unwrap();
    let pool = ConstantPool::decode(&mut ByteReader::new(&bytes[8..])).unwrap();
    assert_eq!(pool.get(5).unwrap(), &Constant::Integer(42));
    assert_eq!(read_class(&bytes).unwrap(), class);
}

#[test]
fn unpaired_surrogate_literals_round_trip() {
    init_logger();
    let lone = decode_modified_utf8(&[b'a', 0xED, 0xB0, 0x80]).unwrap();
    assert!(lone.as_str().is_err());

    let mut field = FieldBuilder::new(
        FieldAccess::PUBLIC | FieldAccess::STATIC | FieldAccess::FINAL,
        "LONE",
        "Ljava/lang/String;",
    );
    field.constant_value(Literal::String(lone.clone()));
    let mut method = MethodBuilder::new(MethodAccess::STATIC, "text", "()Ljava/lang/String;");
    method.code().add(LdcInsnNode::new(Literal::String(lone.clone())));
    method.code().add(simple(opcodes::ARETURN));
    let mut builder = ClassBuilder::new("demo/Lone", "java/lang/Object");
    builder.add_field(field).add_method(method);
    let class = builder.build();

    let bytes = write_class(&class).unwrap();
    assert!(bytes.windows(4).any(|w| w == [b'a', 0xED, 0xB0, 0x80]));
    let read = read_class(&bytes).unwrap();
    assert_eq!(read, class);
    assert_eq!(write_class(&read).unwrap(), bytes);
    match &read.methods[0].code.as_ref().unwrap().instructions[0] {
        Insn::Ldc(node) => assert_eq!(node.value, Literal::String(lone)),
        other => panic!("expected ldc, got {other:?}"),
    }
}
