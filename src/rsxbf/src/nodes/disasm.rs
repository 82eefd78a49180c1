
use std::fmt;

/// One executed opcode in a disassembly run.
///
/// The stack fields are rendered copies taken when the command was recorded,
/// so later interpreter mutation cannot reach back into the trace.
#[derive(Debug, Clone)]
pub struct Command {
    /// Absolute file position of the opcode byte.
    pub position: u64,
    /// The opcode byte plus its payload bytes.
    pub bytes: Vec<u8>,
    /// Index of the node section the opcode was read from.
    pub node_section: usize,
    pub text: String,
    pub object_stack: Vec<String>,
    pub collection_stack: Vec<String>,
    /// Logical nesting depth at the time of execution.
    pub indent: usize,
}

/// Linear trace of a node stream run, in opcode order.
#[derive(Debug, Clone, Default)]
pub struct Disassembly {
    pub commands: Vec<Command>,
}

impl fmt::Display for Disassembly {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for command in &self.commands {
            writeln!(
                f,
                "{:06X}  {:width$}{}",
                command.position,
                "",
                command.text,
                width = command.indent * 2
            )?;
        }
        Ok(())
    }
}
