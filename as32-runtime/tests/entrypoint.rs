mod common;

use byteorder::{ByteOrder, LittleEndian};

use as32_module::{encode_op0, encode_op1, encode_op2, AddrMode, Function, Module, ModuleName, Opcode};
use as32_runtime::{Error, HostcallTable, Vm};

use common::{capture_table, pad_window};

fn name(s: &str) -> ModuleName {
    ModuleName::new(s).expect("name fits")
}

fn data_word(module: &Module, offset: usize) -> i32 {
    LittleEndian::read_i32(&module.data()[offset..offset + 4])
}

#[test]
fn trivial_return_runs_to_completion() {
    let mut assembly = Vec::new();
    encode_op0(&mut assembly, Opcode::Ret);
    pad_window(&mut assembly);
    let module = Module::builder(name("main"))
        .with_function(Function::new(assembly, 0))
        .build();
    Vm::new(HostcallTable::stdio())
        .run(&module)
        .expect("entry returns immediately");
}

#[test]
fn running_an_empty_module_fails() {
    let module = Module::builder(name("empty")).build();
    match Vm::new(HostcallTable::stdio()).run(&module) {
        Err(Error::NoEntryFunction) => {}
        other => panic!("expected NoEntryFunction, got {:?}", other),
    }
}

#[test]
fn push_pop_and_cursor_relative_access() {
    let mut assembly = Vec::new();
    encode_op1(&mut assembly, Opcode::MovSp, AddrMode::Immediate, 20);
    encode_op1(&mut assembly, Opcode::Push, AddrMode::Immediate, 5);
    encode_op1(&mut assembly, Opcode::Push, AddrMode::Immediate, 6);
    encode_op0(&mut assembly, Opcode::Pop);
    // the slot pushed first is one word below the cursor again
    encode_op2(
        &mut assembly,
        Opcode::Mov,
        AddrMode::DataIndirect,
        0,
        AddrMode::StackIndirect,
        -4,
    );
    encode_op0(&mut assembly, Opcode::Ret);
    pad_window(&mut assembly);

    let module = Module::builder(name("main"))
        .with_data(vec![0; 4])
        .with_function(Function::new(assembly, 0))
        .build();
    Vm::new(HostcallTable::stdio())
        .run(&module)
        .expect("program returns");
    assert_eq!(data_word(&module, 0), 5);
}

#[test]
fn activation_state_resets_between_runs() {
    // the function increments a frame cell; a fresh activation starts from
    // the template every run, so the data segment sees 1 both times
    let mut assembly = Vec::new();
    encode_op1(&mut assembly, Opcode::Inc, AddrMode::Absolute, 28);
    encode_op2(
        &mut assembly,
        Opcode::Mov,
        AddrMode::DataIndirect,
        0,
        AddrMode::Absolute,
        28,
    );
    encode_op0(&mut assembly, Opcode::Ret);
    pad_window(&mut assembly);
    assert_eq!(assembly.len(), 32);

    let module = Module::builder(name("main"))
        .with_data(vec![0; 4])
        .with_function(Function::new(assembly, 0))
        .build();
    let vm = Vm::new(HostcallTable::stdio());
    vm.run(&module).expect("first run returns");
    assert_eq!(data_word(&module, 0), 1);
    vm.run(&module).expect("second run returns");
    assert_eq!(data_word(&module, 0), 1);
}

#[test]
fn self_recursion_gets_fresh_frames() {
    // recurse until the data counter reaches 3
    let mut assembly = Vec::new();
    encode_op1(&mut assembly, Opcode::MovSp, AddrMode::Immediate, 64);
    encode_op1(&mut assembly, Opcode::Inc, AddrMode::DataIndirect, 0);
    encode_op2(
        &mut assembly,
        Opcode::Cmp,
        AddrMode::DataIndirect,
        0,
        AddrMode::Immediate,
        3,
    );
    encode_op1(&mut assembly, Opcode::Jnz, AddrMode::Immediate, 44);
    encode_op1(&mut assembly, Opcode::Call, AddrMode::Immediate, 0);
    encode_op0(&mut assembly, Opcode::Ret); // at offset 44
    assembly.resize(128, 0);

    let module = Module::builder(name("main"))
        .with_data(vec![0; 4])
        .with_function(Function::new(assembly, 0))
        .build();
    Vm::new(HostcallTable::stdio())
        .run(&module)
        .expect("recursion unwinds");
    assert_eq!(data_word(&module, 0), 3);
}

/// The counted-loop program: sets the cursor to its counter cell, prints the
/// counter, increments it, prints the greeting, and jumps back to its entry
/// until the counter hits 255, then falls through to RET.
fn counting_loop() -> Vec<u8> {
    vec![
        0x48, 0x65, 0x6C, 0x6C, 0x6F, 0x20, 0x77, 0x6F, 0x72, 0x6C, 0x64, 0x0A, 0x00,
        0x00, // "Hello world\n"           {0}
        0x00, 0x00, 0x00, 0x00, // string offset cell          {14}
        0x00, 0x00, 0x00, 0x00, // loop counter                {18}
        0x00, 0x00, 0x00, 0x00, // compare scratch             {22}
        0xB8, 0x00, 0x00, 0x00, 18, 0x00, 0x00, 0x00, // MOVSP 18        {26}
        0xFF, 0x00, 0x00, 0x00, 1, 0x00, 0x00, 0x00, // CALLHOST 1       {34}
        0x40, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, // INC [SP]      {42}
        0xB8, 0x00, 0x00, 0x00, 14, 0x00, 0x00, 0x00, // MOVSP 14        {50}
        0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // CALLHOST 0    {58}
        0xB8, 0x00, 0x00, 0x00, 22, 0x00, 0x00, 0x00, // MOVSP 22        {66}
        0x39, 0x00, 0x03, 0x00, 0xFC, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00,
        0x00, // CMP [SP-4], 255            {74}
        0x74, 0x00, 0x00, 0x00, 26, 0x00, 0x00, 0x00, // JZ 26           {86}
        0xC3, 0x00, 0x00, 0x00, // RET                         {94}
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // fetch-window padding
    ]
}

fn expected_loop_output() -> Vec<u8> {
    let mut expected = Vec::new();
    for i in 0..=254 {
        expected.extend_from_slice(i.to_string().as_bytes());
        expected.extend_from_slice(b"Hello world\n");
    }
    expected
}

#[test]
fn counting_loop_runs_to_completion() {
    let module = Module::builder(name("hello"))
        .with_function(Function::new(counting_loop(), 26))
        .build();
    let (table, sink) = capture_table();
    Vm::new(table).run(&module).expect("loop falls through to RET");
    assert_eq!(sink.contents(), expected_loop_output());
}

#[test]
fn rerunning_reproduces_identical_output() {
    let module = Module::builder(name("hello"))
        .with_function(Function::new(counting_loop(), 26))
        .build();

    let (table, first) = capture_table();
    Vm::new(table).run(&module).expect("first run");
    let (table, second) = capture_table();
    Vm::new(table).run(&module).expect("second run");

    assert_eq!(first.contents(), second.contents());
    assert_eq!(first.contents(), expected_loop_output());
}
