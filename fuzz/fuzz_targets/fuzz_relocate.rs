#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use hppa_link::{
    descriptor_for_wire, relocate_section, CollectedDiagnostics, LinkMode, LinkOptions,
    LinkSession, RelocationRecord, Section, SectionFlags, StubInput, StubPlan, Symbol, SymbolId,
    WordSize, WIRE_TABLE_LEN,
};

#[derive(Arbitrary, Debug)]
struct RawRecord {
    offset: u16,
    wire: u8,
    symbol: u8,
    addend: Option<i64>,
}

#[derive(Arbitrary, Debug)]
struct Input {
    elf64: bool,
    relocatable: bool,
    shared: bool,
    tolerate_undefined: bool,
    gp: Option<u64>,
    tp: Option<u64>,
    text_vma: u32,
    contents: Vec<u8>,
    records: Vec<RawRecord>,
}

fuzz_target!(|input: Input| {
    let mut contents = input.contents;
    contents.truncate(0x1_0000);

    let word_size = if input.elf64 {
        WordSize::Elf64
    } else {
        WordSize::Elf32
    };
    let mut options = LinkOptions::new(word_size);
    if input.relocatable {
        options.mode = LinkMode::Relocatable;
    }
    options.shared = input.shared;
    options.tolerate_undefined = input.tolerate_undefined;
    options.gp = input.gp;
    options.tp = input.tp;

    let mut session = LinkSession::new(options);
    let text = session.add_section(Section {
        name: ".text".into(),
        vma: u64::from(input.text_vma),
        file_offset: 0x1000,
        size: contents.len() as u64,
        flags: SectionFlags {
            alloc: true,
            load: true,
            readonly: true,
            code: true,
        },
        output_offset: 0,
    });
    let data = session.add_section(Section {
        name: ".data".into(),
        vma: 0x4000_0000,
        file_offset: 0x2000,
        size: 0x1000,
        flags: SectionFlags {
            alloc: true,
            load: true,
            readonly: false,
            code: false,
        },
        output_offset: 0,
    });
    session.set_dlt_base(0x4000_8000);
    session.set_plt_base(0x4000_9000);
    session.set_opd_base(0x4000_a000);

    // A fixed cast of symbols covering every resolution path.
    let symbols: Vec<SymbolId> = vec![
        session.add_symbol(Symbol::in_section("near", text, 8)),
        session.add_symbol(Symbol::in_section("global", data, 0x40)),
        session.add_symbol(Symbol::section_symbol(".data", data)),
        session.add_symbol(Symbol::in_section("local", data, 0x80).local()),
        session.add_symbol(Symbol::in_section("$$divI", data, 0x100)),
        session.add_symbol(Symbol::in_section("$$dyncall", data, 0x200)),
        session.add_symbol(Symbol::absolute("abs", 0xdead_beef)),
        session.add_symbol(Symbol::import("printf")),
        session.add_symbol(Symbol::undefined("missing")),
        session.add_symbol(Symbol::undefined("maybe").weak()),
    ];

    let mut records: Vec<RelocationRecord> = input
        .records
        .into_iter()
        .take(256)
        .filter_map(|raw| {
            let code = descriptor_for_wire(u32::from(raw.wire) % WIRE_TABLE_LEN)?.code;
            let symbol = symbols[usize::from(raw.symbol) % symbols.len()];
            Some(match raw.addend {
                Some(a) => RelocationRecord::rela(u64::from(raw.offset), code, symbol, a),
                None => RelocationRecord::rel(u64::from(raw.offset), code, symbol),
            })
        })
        .collect();

    let plan = StubPlan::size(
        &session,
        &[StubInput {
            section: text,
            records: &records,
        }],
    );
    let stubs = plan.build(0x7000_0000, &session).ok();

    // Whatever the input, the driver may only return Ok or Err.
    let mut diagnostics = CollectedDiagnostics::default();
    let _ = relocate_section(
        &mut session,
        text,
        &mut records,
        &mut contents,
        stubs.as_ref(),
        &mut diagnostics,
    );
});
