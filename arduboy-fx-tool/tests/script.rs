use std::fs;

use arduboy_fx::Flashcart;
use arduboy_fx_tool::{Error, run_flashcart_script};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

mod common;

fn run(script: &str, dir: &std::path::Path) -> String {
    run_flashcart_script(script, &[], dir).unwrap()
}

#[test]
fn arguments_are_logged_tab_separated() {
    let arguments = vec![
        "what".to_string(),
        "how".to_string(),
        "this -- is == weird".to_string(),
    ];
    let output = run_flashcart_script("log(arguments())", &arguments, "").unwrap();
    assert_eq!(output, "what\thow\tthis -- is == weird\n");
}

#[test]
fn log_rejects_tables() {
    let result = run_flashcart_script("log({})", &[], "");
    assert!(matches!(result, Err(Error::Script(_))));
}

#[test]
fn toml_decodes_into_tables() {
    let script = r#"
local t = toml([[
count = 55
answer = "yes"
ratio = 68.75
]])
log(t.count, t.answer, t.ratio)
"#;
    assert_eq!(run_flashcart_script(script, &[], "").unwrap(), "55\tyes\t68.75\n");
}

#[test]
fn decoding_helpers() {
    let script = r#"
log(#hex("0102ff"), base64("AQID"):byte(3), #bytes({1, 2, 3}, "uint16"))
local j = json('{"a": [1, 2], "b": null}')
log(#j.a, tostring(j.b))
"#;
    assert_eq!(run_flashcart_script(script, &[], "").unwrap(), "3\t3\t6\n2\tnil\n");
}

#[test]
fn listdir_is_sorted() {
    let dir = tempdir().unwrap();
    common::write_file(dir.path(), "b.txt", b"b");
    common::write_file(dir.path(), "a.txt", b"a");
    fs::create_dir(dir.path().join("sub")).unwrap();

    let script = r#"
for _, entry in ipairs(listdir(arguments())) do
    log(entry.name, tostring(entry.is_directory))
end
"#;
    let arguments = vec![dir.path().to_string_lossy().into_owned()];
    let output = run_flashcart_script(script, &arguments, "").unwrap();
    assert_eq!(output, "a.txt\tfalse\nb.txt\tfalse\nsub\ttrue\n");
}

#[test]
fn slot_predicates() {
    let script = r#"
log(tostring(is_category({ title = "x" })), tostring(is_category({ sketch = "ab" })))
log(tostring(has_fxsave({ fxsave = "z" })), tostring(has_fxsave({ fxsave = "" })))
log(tostring(is_category({ title = "x", was_category = false })))
"#;
    assert_eq!(
        run_flashcart_script(script, &[], "").unwrap(),
        "true\tfalse\ntrue\tfalse\nfalse\n"
    );
}

#[test]
fn parse_lists_slots_lazily() {
    let dir = tempdir().unwrap();
    common::write_file(dir.path(), "in.bin", &common::plain_flashcart());

    let script = r#"
local slots = parse_flashcart("in.bin")
for _, slot in ipairs(slots) do
    log(slot.title, tostring(slot.was_category), tostring(slot.sketch), #slot.image)
end
"#;
    assert_eq!(
        run(script, dir.path()),
        "Bootloader\ttrue\tnil\t1024\n\
         My Games\ttrue\tnil\t1024\n\
         Plain\tfalse\tnil\t1024\n\
         Other\tfalse\tnil\t1024\n"
    );
}

#[test]
fn preload_pulls_payloads() {
    let dir = tempdir().unwrap();
    common::write_file(dir.path(), "in.bin", &common::data_flashcart());

    let script = r#"
local slots = parse_flashcart("in.bin", true)
for i = 3, #slots do
    local slot = slots[i]
    log(slot.title, #slot.sketch, #slot.fxdata, #slot.fxsave)
end
log(slots[3].fxdata:byte(1), slots[4].fxsave:byte(1), slots[4].fxsave:byte(101))
"#;
    assert_eq!(
        run(script, dir.path()),
        "Data\t640\t512\t0\nSaver\t640\t512\t4096\n66\t36\t255\n"
    );
}

#[test]
fn copy_is_byte_identical() {
    let dir = tempdir().unwrap();
    let original = common::plain_flashcart();
    common::write_file(dir.path(), "in.bin", &original);

    let script = r#"
local out = new_flashcart("out.bin")
for _, slot in ipairs(parse_flashcart("in.bin")) do
    slot.pull_data()
    out.write_slot(slot)
end
"#;
    run(script, dir.path());
    let copy = fs::read(dir.path().join("out.bin")).unwrap();
    assert_eq!(copy, original);
}

#[test]
fn copy_keeps_latin1_titles() {
    let dir = tempdir().unwrap();
    let original = common::build(vec![
        common::category("Bootloader", 1),
        arduboy_fx::SlotSpec {
            title: b"Caf\xE9".as_slice().into(),
            ..common::category("Games", 2)
        },
        arduboy_fx::SlotSpec {
            developer: b"Jos\xE9".as_slice().into(),
            ..common::program("Plain", 1000, 0, 0)
        },
    ]);
    common::write_file(dir.path(), "in.bin", &original);

    let script = r#"
local out = new_flashcart("out.bin")
for _, slot in ipairs(parse_flashcart("in.bin")) do
    slot.pull_data()
    out.write_slot(slot)
end
log(#parse_flashcart("in.bin")[2].title)
"#;
    assert_eq!(run(script, dir.path()), "4\n");
    let copy = fs::read(dir.path().join("out.bin")).unwrap();
    assert_eq!(copy, original);
}

#[test]
fn copy_keeps_payload_layout() {
    let dir = tempdir().unwrap();
    common::write_file(dir.path(), "in.bin", &common::data_flashcart());

    let script = r#"
local out = new_flashcart("out.bin")
for _, slot in ipairs(parse_flashcart("in.bin", true)) do
    out.write_slot(slot)
end
"#;
    run(script, dir.path());
    let original = Flashcart::parse_file(dir.path().join("in.bin")).unwrap();
    let copy = Flashcart::parse_file(dir.path().join("out.bin")).unwrap();
    assert_eq!(copy.size, original.size);
    for ((a, x), (b, y)) in original.slots.iter().zip(&copy.slots) {
        assert_eq!(a, b);
        assert_eq!(x.slot_pages, y.slot_pages);
        assert_eq!(x.data_start, y.data_start);
        assert_eq!(x.save_start, y.save_start);
    }
}

#[test]
fn categories_only() {
    let dir = tempdir().unwrap();
    common::write_file(dir.path(), "in.bin", &common::plain_flashcart());

    let script = r#"
local out = new_flashcart("cats.bin")
for _, slot in ipairs(parse_flashcart("in.bin")) do
    if is_category(slot) then
        out.write_slot(slot)
    end
end
"#;
    run(script, dir.path());
    let cart = Flashcart::parse_file(dir.path().join("cats.bin")).unwrap();
    assert_eq!(cart.categories(), 2);
    assert_eq!(cart.programs(), 0);
}

#[test]
fn writers_are_closed_on_error() {
    let dir = tempdir().unwrap();
    let script = r#"
local out = new_flashcart("out.bin")
out.write_slot({ title = "Games", image = string.rep("\0", 1024) })
error("boom")
"#;
    let result = run_flashcart_script(script, &[], dir.path());
    assert!(matches!(result, Err(Error::Script(_))));
    // One category slot plus the terminator page.
    let written = fs::read(dir.path().join("out.bin")).unwrap();
    assert_eq!(written.len(), 256 + 1024 + 256);
    assert!(written[1280..].iter().all(|&b| b == 0xFF));
}

#[test]
fn invalid_slots_fail_the_script() {
    let dir = tempdir().unwrap();
    let script = r#"
local out = new_flashcart("out.bin")
out.write_slot({ title = "Short image", image = "abc" })
"#;
    let result = run_flashcart_script(script, &[], dir.path());
    assert!(matches!(result, Err(Error::Script(_))));
}

#[test]
fn title_image_converts_png() {
    let dir = tempdir().unwrap();
    let mut img = image::GrayImage::new(128, 64);
    img.put_pixel(0, 0, image::Luma([255]));
    img.save(dir.path().join("title.png")).unwrap();

    let script = r#"
local raw = title_image("title.png")
log(#raw, raw:byte(1), raw:byte(2))
local strict = title_image("title.png", nil, nil, nil, nil, 255)
log(strict:byte(1))
"#;
    assert_eq!(run(script, dir.path()), "1024\t1\t0\n1\n");
}

#[test]
fn generation_is_repeatable() {
    let dir = tempdir().unwrap();
    common::write_file(dir.path(), "in.bin", &common::data_flashcart());

    let script = r#"
local out = new_flashcart(arguments())
for _, slot in ipairs(parse_flashcart("in.bin", true)) do
    out.write_slot(slot)
end
"#;
    run_flashcart_script(script, &["a.bin".to_string()], dir.path()).unwrap();
    run_flashcart_script(script, &["b.bin".to_string()], dir.path()).unwrap();
    let a = fs::read(dir.path().join("a.bin")).unwrap();
    let b = fs::read(dir.path().join("b.bin")).unwrap();
    assert_eq!(a, b);
}
