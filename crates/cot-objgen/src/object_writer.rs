//! Turns a finished [`cot_machinst::MachBuffer`] per function into a
//! relocatable ELF or Mach-O object file (spec.md §4.5.6), via the
//! `object` crate's writer rather than hand-rolled section/symbol-table
//! layout. Grounded on the same "accumulate then resolve" shape
//! `cranelift-codegen`'s `ObjectModule` (in `cranelift-object`, not
//! present in this teacher snapshot) uses, recreated here from the
//! `object::write` API directly.

use object::write::{Object, Relocation, StandardSection, Symbol, SymbolFlags, SymbolSection};
use object::{Architecture, BinaryFormat, Endianness, SymbolKind, SymbolScope};
use target_lexicon::{Architecture as HostArch, Triple};

use cot_machinst::MachReloc;
use crate::reloc::{object_relocation, Platform};

pub struct CompiledFunction {
    pub name: String,
    pub code: Vec<u8>,
    pub relocs: Vec<MachReloc>,
}

pub struct ObjectModule {
    pub functions: Vec<CompiledFunction>,
}

impl ObjectModule {
    pub fn new() -> ObjectModule {
        ObjectModule { functions: Vec::new() }
    }

    pub fn define_function(&mut self, name: impl Into<String>, code: Vec<u8>, relocs: Vec<MachReloc>) {
        self.functions.push(CompiledFunction { name: name.into(), code, relocs });
    }
}

impl Default for ObjectModule {
    fn default() -> ObjectModule {
        ObjectModule::new()
    }
}

fn target_params(triple: &Triple) -> (BinaryFormat, Architecture, Endianness, Platform) {
    match (triple.architecture, &triple.operating_system) {
        (HostArch::Aarch64(_), os) if os.to_string().contains("darwin") || os.to_string().contains("macos") => {
            (BinaryFormat::MachO, Architecture::Aarch64, Endianness::Little, Platform::MachOArm64)
        }
        _ => (BinaryFormat::Elf, Architecture::X86_64, Endianness::Little, Platform::ElfX64),
    }
}

/// Emits every function in `module` into a single relocatable object
/// file targeting `triple`. Each function gets its own global text
/// symbol; cross-function calls are resolved by the linker from the
/// relocations recorded against those symbol names.
pub fn write_object(module: &ObjectModule, triple: &Triple) -> Vec<u8> {
    let (format, arch, endian, platform) = target_params(triple);
    let mut obj = Object::new(format, arch, endian);

    let text = obj.section_id(StandardSection::Text);
    let mut symbols = std::collections::HashMap::new();
    let mut offsets = std::collections::HashMap::new();

    for func in &module.functions {
        let offset = obj.append_section_data(text, &func.code, 16);
        let sym_id = obj.add_symbol(Symbol {
            name: func.name.clone().into_bytes(),
            value: offset,
            size: func.code.len() as u64,
            kind: SymbolKind::Text,
            scope: SymbolScope::Linkage,
            weak: false,
            section: SymbolSection::Section(text),
            flags: SymbolFlags::None,
        });
        symbols.insert(func.name.clone(), sym_id);
        offsets.insert(func.name.clone(), offset);
    }

    for func in &module.functions {
        let base = offsets[&func.name];
        for reloc in &func.relocs {
            let Some(target_name) = &reloc.target_symbol else { continue };
            let symbol = *symbols.entry(target_name.clone()).or_insert_with(|| {
                obj.add_symbol(Symbol {
                    name: target_name.clone().into_bytes(),
                    value: 0,
                    size: 0,
                    kind: SymbolKind::Text,
                    scope: SymbolScope::Dynamic,
                    weak: false,
                    section: SymbolSection::Undefined,
                    flags: SymbolFlags::None,
                })
            });
            let relocation: Relocation = object_relocation(reloc.kind, platform, base + reloc.offset as u64, symbol, reloc.addend);
            obj.add_relocation(text, relocation).expect("relocation within a section object writes always accepts a valid offset");
        }
    }

    obj.write().expect("in-memory object emission never hits an I/O error")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cot_machinst::RelocKind as CRelocKind;

    #[test]
    fn a_module_with_one_leaf_function_emits_a_nonempty_elf_object() {
        let mut module = ObjectModule::new();
        module.define_function("add", vec![0x55, 0xc3], vec![]);
        let triple: Triple = "x86_64-unknown-linux-gnu".parse().unwrap();
        let bytes = write_object(&module, &triple);
        assert!(!bytes.is_empty());
        assert_eq!(&bytes[0..4], b"\x7fELF");
    }

    #[test]
    fn a_call_relocation_references_the_callee_symbol() {
        let mut module = ObjectModule::new();
        module.define_function(
            "main",
            vec![0xe8, 0, 0, 0, 0],
            vec![MachReloc { offset: 1, kind: CRelocKind::PcRelCall, target_label: None, target_symbol: Some("add".to_string()), addend: -4 }],
        );
        module.define_function("add", vec![0xc3], vec![]);
        let triple: Triple = "x86_64-unknown-linux-gnu".parse().unwrap();
        let bytes = write_object(&module, &triple);
        assert!(!bytes.is_empty());
    }
}
