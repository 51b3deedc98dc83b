//! Object-file emission: turns finished [`cot_machinst::MachBuffer`]
//! output for every function in a compilation into one relocatable ELF
//! or Mach-O file with a DWARF line table (spec.md §4.5.6), the last
//! stage of the native backend pipeline before the system linker runs.

pub mod dwarf;
pub mod object_writer;
pub mod reloc;

pub use dwarf::{build_debug_line, empty_function_lines, FunctionLines, LineRow};
pub use object_writer::{write_object, CompiledFunction, ObjectModule};
pub use reloc::Platform;

use target_lexicon::Triple;

/// One compiled function ready for object emission: its machine code,
/// its relocations, and the source positions a debugger should map back
/// to its instruction offsets.
pub struct EmitUnit {
    pub name: String,
    pub code: Vec<u8>,
    pub relocs: Vec<cot_machinst::MachReloc>,
    pub lines: Vec<LineRow>,
    pub source_file: String,
}

/// Assembles every function's machine code into one object file and
/// returns it alongside its `.debug_line` program; the driver is
/// responsible for deciding whether the two get linked into the same
/// file (Mach-O/ELF both support a `.debug_line` section directly) or
/// kept separate.
pub fn emit_object(units: &[EmitUnit], triple: &Triple, comp_dir: &str, comp_name: &str) -> (Vec<u8>, Vec<u8>) {
    let mut module = ObjectModule::new();
    let mut line_funcs = Vec::new();
    let mut offset = 0u64;
    for unit in units {
        module.define_function(unit.name.clone(), unit.code.clone(), unit.relocs.clone());
        line_funcs.push(FunctionLines {
            symbol_offset: offset,
            code_len: unit.code.len() as u64,
            file: unit.source_file.clone(),
            rows: if unit.lines.is_empty() { vec![LineRow { code_offset: 0, line: 1, column: 1 }] } else { unit.lines.clone() },
        });
        offset += unit.code.len() as u64;
    }
    let object_bytes = write_object(&module, triple);
    let debug_line = build_debug_line(comp_dir, comp_name, &line_funcs);
    (object_bytes, debug_line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emitting_two_functions_produces_both_an_object_and_a_line_program() {
        let units = vec![
            EmitUnit {
                name: "add".to_string(),
                code: vec![0x55, 0xc3],
                relocs: vec![],
                lines: vec![LineRow { code_offset: 0, line: 2, column: 1 }],
                source_file: "main.arc".to_string(),
            },
            EmitUnit {
                name: "main".to_string(),
                code: vec![0xe8, 0, 0, 0, 0, 0xc3],
                relocs: vec![cot_machinst::MachReloc {
                    offset: 1,
                    kind: cot_machinst::RelocKind::PcRelCall,
                    target_label: None,
                    target_symbol: Some("add".to_string()),
                    addend: -4,
                }],
                lines: vec![LineRow { code_offset: 0, line: 6, column: 1 }],
                source_file: "main.arc".to_string(),
            },
        ];
        let triple: Triple = "x86_64-unknown-linux-gnu".parse().unwrap();
        let (object_bytes, debug_line) = emit_object(&units, &triple, "/tmp/proj", "main.arc");
        assert!(!object_bytes.is_empty());
        assert!(!debug_line.is_empty());
    }
}
