#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use hppa_link::{
    descriptor_for_wire, LinkOptions, LinkSession, RelocationRecord, Section, SectionFlags,
    StubInput, StubPlan, Symbol, SymbolId, WordSize, WIRE_TABLE_LEN,
};

#[derive(Arbitrary, Debug)]
struct RawCall {
    offset: u32,
    wire: u8,
    symbol: u8,
    addend: i32,
}

#[derive(Arbitrary, Debug)]
struct Input {
    text_vma: u32,
    far_vma: u64,
    stub_base: u64,
    calls: Vec<RawCall>,
}

fuzz_target!(|input: Input| {
    let mut session = LinkSession::new(LinkOptions::new(WordSize::Elf32));
    let flags = SectionFlags {
        alloc: true,
        load: true,
        readonly: true,
        code: true,
    };
    let text = session.add_section(Section {
        name: ".text".into(),
        vma: u64::from(input.text_vma),
        file_offset: 0,
        size: 0x10_0000,
        flags,
        output_offset: 0,
    });
    let far_text = session.add_section(Section {
        name: ".text.far".into(),
        vma: input.far_vma,
        file_offset: 0x10_0000,
        size: 0x1000,
        flags,
        output_offset: 0,
    });
    let symbols: Vec<SymbolId> = vec![
        session.add_symbol(Symbol::in_section("near", text, 0)),
        session.add_symbol(Symbol::in_section("far", far_text, 0x10)),
        session.add_symbol(Symbol::in_section("$$remU", far_text, 0x20)),
        session.add_symbol(Symbol::in_section("$$dyncall", far_text, 0x30)),
        session.add_symbol(Symbol::import("helper")),
        session.add_symbol(Symbol::undefined("missing")),
    ];

    let records: Vec<RelocationRecord> = input
        .calls
        .into_iter()
        .take(512)
        .filter_map(|raw| {
            let code = descriptor_for_wire(u32::from(raw.wire) % WIRE_TABLE_LEN)?.code;
            let symbol = symbols[usize::from(raw.symbol) % symbols.len()];
            Some(RelocationRecord::rela(
                u64::from(raw.offset),
                code,
                symbol,
                i64::from(raw.addend),
            ))
        })
        .collect();
    let inputs = [StubInput {
        section: text,
        records: &records,
    }];

    // Sizing is deterministic and emission matches the promised size.
    let first = StubPlan::size(&session, &inputs);
    let second = StubPlan::size(&session, &inputs);
    assert_eq!(first.len(), second.len());
    assert_eq!(first.total_size(), second.total_size());

    let total = first.total_size();
    if let Ok(image) = first.build(input.stub_base, &session) {
        assert_eq!(image.len(), total);
        assert_eq!(image.bytes().len() as u64, total);
    }
});
