use as32_module::{encode_op0, encode_op1, encode_op2, AddrMode, Function, Module, ModuleName, Opcode};
use as32_runtime::{HostcallTable, Vm};

fn main() -> anyhow::Result<()> {
    // static frame prologue: the greeting, then three word cells
    let mut assembly = b"Hello world\n\0\0".to_vec();
    assembly.extend_from_slice(&[0; 4]); // string offset cell {14}
    assembly.extend_from_slice(&[0; 4]); // loop counter       {18}
    assembly.extend_from_slice(&[0; 4]); // compare scratch    {22}
    let entry = assembly.len() as u32;

    // print the counter, increment it, print the greeting, loop until the
    // counter reaches 5
    encode_op1(&mut assembly, Opcode::MovSp, AddrMode::Immediate, 18);
    encode_op1(&mut assembly, Opcode::CallHost, AddrMode::Immediate, 1);
    encode_op1(&mut assembly, Opcode::Inc, AddrMode::StackIndirect, 0);
    encode_op1(&mut assembly, Opcode::MovSp, AddrMode::Immediate, 14);
    encode_op1(&mut assembly, Opcode::CallHost, AddrMode::Immediate, 0);
    encode_op1(&mut assembly, Opcode::MovSp, AddrMode::Immediate, 22);
    encode_op2(
        &mut assembly,
        Opcode::Cmp,
        AddrMode::StackIndirect,
        -4,
        AddrMode::Immediate,
        5,
    );
    encode_op1(&mut assembly, Opcode::Jz, AddrMode::Immediate, entry as i32);
    encode_op0(&mut assembly, Opcode::Ret);
    assembly.extend_from_slice(&[0; 8]); // fetch-window padding

    // build the module and run its entry function against the reference
    // hostcall table
    let module = Module::builder(ModuleName::new("hello")?)
        .with_function(Function::new(assembly, entry))
        .build();
    let vm = Vm::new(HostcallTable::stdio());
    vm.run(&module)?;
    Ok(())
}
