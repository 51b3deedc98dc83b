//! `.debug_line` emission (spec.md §4.5.6's "line tables for a source
//! debugger to step through"), built on `gimli::write::LineProgram`.
//! The three constants below are the ones spec.md pins exactly, matched
//! to what `rustc`/`clang` emit for a DWARF 4 line-number program and
//! mirrored here rather than re-derived: `LINE_BASE`/`LINE_RANGE` pick
//! the special-opcode address/line-advance range, `OPCODE_BASE` is one
//! past the last standard opcode.

use gimli::write::{Address, LineProgram, LineString, LineStringTable, Sections, Unit, UnitTable};
use gimli::{Encoding, Format, LineEncoding};

pub const LINE_BASE: i8 = -4;
pub const LINE_RANGE: u8 = 10;
pub const OPCODE_BASE: u8 = 11;

/// One source-position row: the code offset within a function's emitted
/// bytes, and the 1-based line/column it came from.
#[derive(Copy, Clone, Debug)]
pub struct LineRow {
    pub code_offset: u64,
    pub line: u32,
    pub column: u32,
}

pub struct FunctionLines {
    pub symbol_offset: u64,
    pub code_len: u64,
    pub file: String,
    pub rows: Vec<LineRow>,
}

fn line_encoding() -> LineEncoding {
    LineEncoding { line_base: LINE_BASE, line_range: LINE_RANGE, ..LineEncoding::default() }
}

/// Builds a single compilation unit's line program covering every
/// function in `functions`, all assumed to share one text section
/// (their rows are addressed relative to `symbol_offset` within it).
pub fn build_debug_line(comp_dir: &str, comp_name: &str, functions: &[FunctionLines]) -> Vec<u8> {
    let encoding = Encoding { format: Format::Dwarf32, version: 4, address_size: 8 };
    let mut line_strings = LineStringTable::default();

    let mut program = LineProgram::new(
        encoding,
        line_encoding(),
        LineString::String(comp_dir.as_bytes().to_vec()),
        None,
        LineString::String(comp_name.as_bytes().to_vec()),
        None,
    );

    for func in functions {
        let file_id = program.add_file(LineString::String(func.file.as_bytes().to_vec()), program.default_directory(), None);
        program.begin_sequence(Some(Address::Constant(func.symbol_offset)));
        for row in &func.rows {
            program.row().address_offset = row.code_offset;
            program.row().file = file_id;
            program.row().line = row.line as u64;
            program.row().column = row.column as u64;
            program.generate_row();
        }
        program.end_sequence(func.code_len);
    }

    let mut sections = Sections::new(gimli::write::EndianVec::new(gimli::LittleEndian));
    let mut units = UnitTable::default();
    let _ = units.add(Unit::new(encoding, program));
    let mut debug_str = gimli::write::StringTable::default();
    units.write(&mut sections, &mut line_strings, &mut debug_str).expect("an in-memory DWARF unit table always serializes");
    sections.debug_line.slice().to_vec()
}

/// A trap-table-free fallback for functions with no source positions at
/// all (synthesized glue, trampolines): an empty sequence so the linker
/// still sees a well-formed, if useless, line program.
pub fn empty_function_lines(symbol_offset: u64, code_len: u64, file: &str) -> FunctionLines {
    FunctionLines { symbol_offset, code_len, file: file.to_string(), rows: vec![LineRow { code_offset: 0, line: 1, column: 1 }] }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_single_function_produces_a_nonempty_line_program() {
        let funcs = vec![FunctionLines {
            symbol_offset: 0,
            code_len: 32,
            file: "main.arc".to_string(),
            rows: vec![LineRow { code_offset: 0, line: 3, column: 5 }, LineRow { code_offset: 12, line: 4, column: 1 }],
        }];
        let bytes = build_debug_line("/tmp/proj", "main.arc", &funcs);
        assert!(!bytes.is_empty());
    }
}
