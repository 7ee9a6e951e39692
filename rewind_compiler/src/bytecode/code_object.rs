//! Code object representation for compiled functions.
//!
//! A `CodeObject` holds the raw bytecode plus the pools and metadata the VM
//! needs to execute one function body. Code objects are immutable once
//! built and shared through `Arc`.

use super::instruction::decode;
use std::fmt;
use std::sync::Arc;

/// A compiled function body.
#[derive(Debug, Clone)]
pub struct CodeObject {
    /// Function name.
    pub name: Arc<str>,

    /// Qualified name (includes enclosing scopes).
    pub qualname: Arc<str>,

    /// Filename where this code was defined.
    pub filename: Arc<str>,

    /// First line number in source.
    pub first_lineno: u32,

    /// Variable-width instruction stream.
    pub bytecode: Arc<[u8]>,

    /// Constant pool (indexed by `LoadConst`).
    pub constants: Box<[Constant]>,

    /// Global and attribute names (indexed by `LoadGlobal`, `LoadAttr`, ...).
    pub names: Box<[Arc<str>]>,

    /// Local variable names; the first `arg_count` are parameters.
    pub varnames: Box<[Arc<str>]>,

    /// Number of parameters.
    pub arg_count: u16,

    /// Byte offset ranges mapped to source lines.
    pub line_table: Box<[LineTableEntry]>,
}

/// Constant pool entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    None,
    Bool(bool),
    Int(i64),
    Str(Arc<str>),
    /// Tuple of names, used for keyword-call name tuples.
    Names(Arc<[Arc<str>]>),
    /// Nested function body.
    Code(Arc<CodeObject>),
}

impl PartialEq for CodeObject {
    fn eq(&self, other: &Self) -> bool {
        self.qualname == other.qualname && self.bytecode == other.bytecode
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::None => f.write_str("None"),
            Constant::Bool(true) => f.write_str("True"),
            Constant::Bool(false) => f.write_str("False"),
            Constant::Int(i) => write!(f, "{}", i),
            Constant::Str(s) => write!(f, "'{}'", s),
            Constant::Names(names) => {
                f.write_str("(")?;
                for (i, name) in names.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "'{}'", name)?;
                }
                if names.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Constant::Code(code) => write!(f, "<code {}>", code.qualname),
        }
    }
}

/// Line table entry mapping a byte range to a source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineTableEntry {
    /// Starting byte offset (inclusive).
    pub start: u32,
    /// Ending byte offset (exclusive).
    pub end: u32,
    /// Source line number.
    pub line: u32,
}

impl CodeObject {
    /// Create a new empty code object.
    pub fn new(name: impl Into<Arc<str>>, filename: impl Into<Arc<str>>) -> Self {
        let name = name.into();
        CodeObject {
            qualname: name.clone(),
            name,
            filename: filename.into(),
            first_lineno: 1,
            bytecode: Arc::from(Vec::new()),
            constants: Box::new([]),
            names: Box::new([]),
            varnames: Box::new([]),
            arg_count: 0,
            line_table: Box::new([]),
        }
    }

    /// Number of local variable slots, parameters included.
    #[inline]
    pub fn nlocals(&self) -> usize {
        self.varnames.len()
    }

    /// Get the line number for a given byte offset.
    pub fn line_for_offset(&self, offset: u32) -> Option<u32> {
        self.line_table
            .iter()
            .find(|entry| entry.start <= offset && offset < entry.end)
            .map(|entry| entry.line)
    }
}

/// Disassemble a code object to a string.
///
/// Undecodable tails are reported inline rather than aborting the listing,
/// since this runs on the diagnostics path for already-broken code.
pub fn disassemble(code: &CodeObject) -> String {
    use std::fmt::Write;

    let mut output = String::new();

    let _ = writeln!(output, "Code object: {}", code.qualname);
    let _ = writeln!(output, "  File: {}", code.filename);
    let _ = writeln!(output, "  First line: {}", code.first_lineno);
    let _ = writeln!(output, "  Args: {}", code.arg_count);
    let _ = writeln!(output, "  Locals: {}", code.nlocals());

    if !code.constants.is_empty() {
        let _ = writeln!(output, "\nConstants:");
        for (i, c) in code.constants.iter().enumerate() {
            let _ = writeln!(output, "  {:4}: {}", i, c);
        }
    }

    if !code.names.is_empty() {
        let _ = writeln!(output, "\nNames:");
        for (i, n) in code.names.iter().enumerate() {
            let _ = writeln!(output, "  {:4}: {}", i, n);
        }
    }

    if !code.varnames.is_empty() {
        let _ = writeln!(output, "\nLocals:");
        for (i, l) in code.varnames.iter().enumerate() {
            let _ = writeln!(output, "  {:4}: {}", i, l);
        }
    }

    let _ = writeln!(output, "\nDisassembly:");
    match decode(&code.bytecode) {
        Ok(instructions) => {
            for inst in &instructions {
                let line_str = code
                    .line_for_offset(inst.offset)
                    .map_or_else(|| "    ".to_string(), |l| format!("{:4}", l));
                let _ = writeln!(output, "{} {:5}: {}", line_str, inst.offset, inst);
            }
        }
        Err(err) => {
            let _ = writeln!(output, "  <undecodable: {}>", err);
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::instruction::encode;
    use crate::bytecode::opcode::Opcode;

    #[test]
    fn test_code_object_new() {
        let code = CodeObject::new("test_func", "test.rw");
        assert_eq!(&*code.name, "test_func");
        assert_eq!(&*code.filename, "test.rw");
        assert!(code.bytecode.is_empty());
        assert_eq!(code.nlocals(), 0);
    }

    #[test]
    fn test_line_table_lookup() {
        let mut code = CodeObject::new("test", "test.rw");
        code.line_table = vec![
            LineTableEntry {
                start: 0,
                end: 5,
                line: 10,
            },
            LineTableEntry {
                start: 5,
                end: 10,
                line: 15,
            },
        ]
        .into_boxed_slice();

        assert_eq!(code.line_for_offset(0), Some(10));
        assert_eq!(code.line_for_offset(4), Some(10));
        assert_eq!(code.line_for_offset(5), Some(15));
        assert_eq!(code.line_for_offset(10), None);
    }

    #[test]
    fn test_constant_display() {
        let names: Vec<Arc<str>> = vec![Arc::from("a")];
        assert_eq!(Constant::Names(names.into()).to_string(), "('a',)");
        assert_eq!(Constant::Bool(true).to_string(), "True");
        assert_eq!(Constant::Str("x".into()).to_string(), "'x'");
    }

    #[test]
    fn test_disassemble_lists_offsets() {
        let mut code = CodeObject::new("f", "test.rw");
        let mut bytes = Vec::new();
        encode(Opcode::LoadConst, 0, &mut bytes);
        encode(Opcode::ReturnValue, 0, &mut bytes);
        code.bytecode = bytes.into();
        code.constants = vec![Constant::Int(7)].into_boxed_slice();

        let text = disassemble(&code);
        assert!(text.contains("LOAD_CONST"));
        assert!(text.contains("    3: RETURN_VALUE"));
        assert!(text.contains("0: 7"));
    }

    #[test]
    fn test_disassemble_reports_bad_bytes() {
        let mut code = CodeObject::new("broken", "test.rw");
        code.bytecode = vec![0xff].into();
        assert!(disassemble(&code).contains("<undecodable"));
    }
}
