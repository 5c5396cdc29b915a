use bitverdict_tests::registry::{UNSUPPORTED, presets};

pub fn run() {
    let presets = presets();
    println!("{} test preset(s):\n", presets.len());
    for preset in &presets {
        let d = preset.descriptor;
        let offset = if preset.takes_byte_offset {
            " [--byte-offset 0..=3]"
        } else {
            ""
        };
        println!(
            "  {:<18} v{:<6} align {:>2}  {}{}",
            d.name, d.version, d.alignment, d.description, offset
        );
    }

    println!("\nRecognised but not implemented:\n");
    println!("  {}", UNSUPPORTED.join(", "));
}
