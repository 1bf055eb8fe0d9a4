//! Basic relocation example — patches a few instruction words and
//! synthesizes a long-branch stub.
//!
//! Run with: `cargo run --example relocate`

use hppa_link::{
    relocate_section, LinkOptions, LinkSession, RelocCode, RelocationRecord, Section,
    SectionFlags, StubInput, StubPlan, Symbol, WordSize,
};

fn main() {
    println!("=== hppa_link relocation example ===\n");

    let mut session = LinkSession::new(LinkOptions::new(WordSize::Elf32));
    let text = session.add_section(Section {
        name: ".text".into(),
        vma: 0x1000,
        file_offset: 0x1000,
        size: 0x100,
        flags: SectionFlags {
            alloc: true,
            load: true,
            readonly: true,
            code: true,
        },
        output_offset: 0,
    });
    let far_text = session.add_section(Section {
        name: ".text.far".into(),
        vma: 0x1234_5000,
        file_offset: 0x2000,
        size: 0x1000,
        flags: SectionFlags {
            alloc: true,
            load: true,
            readonly: true,
            code: true,
        },
        output_offset: 0,
    });
    let datum = session.add_symbol(Symbol::absolute("datum", 0x1234_5678));
    let far = session.add_symbol(Symbol::in_section("far_routine", far_text, 0x678));

    // --- Absolute address formation ---
    println!("1. ldil/ldo pair taking the address of `datum`:");
    let mut records = [
        RelocationRecord::rela(0, RelocCode::Dir21L, datum, 0),
        RelocationRecord::rela(4, RelocCode::Dir14R, datum, 0),
    ];
    let mut contents = Vec::new();
    contents.extend_from_slice(&0x2020_0000u32.to_be_bytes()); // ldil L'datum,%r1
    contents.extend_from_slice(&0x3421_0000u32.to_be_bytes()); // ldo R'datum(%r1),%r1
    let summary =
        relocate_section(&mut session, text, &mut records, &mut contents, None, &mut ())
            .unwrap();
    print_words("   ", &contents);
    println!("   ({} records applied)\n", summary.applied);

    // --- Long-branch stub ---
    println!("2. Call that overshoots the 17-bit branch range:");
    let mut records = [RelocationRecord::rela(0, RelocCode::Pcrel17F, far, 0)];
    let mut contents = 0xe800_0000u32.to_be_bytes().to_vec(); // bl far_routine,%r2

    let plan = StubPlan::size(
        &session,
        &[StubInput {
            section: text,
            records: &records,
        }],
    );
    println!("   stub plan: {} stub(s), {} bytes", plan.len(), plan.total_size());
    let stubs = plan.build(0x8000, &session).unwrap();
    println!("   stub body at 0x{:x}:", stubs.base());
    print_words("   ", stubs.bytes());

    relocate_section(
        &mut session,
        text,
        &mut records,
        &mut contents,
        Some(&stubs),
        &mut (),
    )
    .unwrap();
    println!("   redirected call site:");
    print_words("   ", &contents);
}

fn print_words(indent: &str, bytes: &[u8]) {
    for chunk in bytes.chunks_exact(4) {
        let word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        println!("{indent}  {word:08x}");
    }
}
