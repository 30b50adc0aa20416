use std::fs;
use std::path::PathBuf;

use stamp_core::document::{Document, Entity, LayoutKind, LineEnding, TextEncoding};
use stamp_io::{DocumentDecoder, DocumentEncoder, DxfCodec, FormatError, decode, encode};

fn fixture(name: &str) -> Vec<u8> {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/data");
    path.push(name);
    fs::read(&path).expect("读取测试数据失败")
}

fn texts(doc: &Document, layout: &str, block: &str, tag: &str) -> Vec<String> {
    let view = doc.layout(layout).expect("布局不存在");
    view.block_inserts(block)
        .flat_map(|insert| insert.attributes_tagged(tag))
        .map(|attribute| attribute.text.clone())
        .collect()
}

#[test]
fn decodes_layouts_in_tab_order() {
    let doc = decode(&fixture("title_block.dxf")).expect("解码失败");
    let layouts: Vec<(&str, LayoutKind)> = doc
        .layouts()
        .map(|layout| (layout.name.as_str(), layout.kind))
        .collect();
    assert_eq!(
        layouts,
        [
            ("Model", LayoutKind::Model),
            ("master", LayoutKind::ActivePaper),
            ("Layout2", LayoutKind::Paper),
        ]
    );
    assert_eq!(
        doc.layout("master").unwrap().layout().block_record.as_deref(),
        Some("1B")
    );
}

#[test]
fn entities_are_placed_by_owner_handle() {
    let doc = decode(&fixture("title_block.dxf")).expect("解码失败");
    assert_eq!(texts(&doc, "master", "ssp_ARCH_24x36", "JOB_LOC1"), ["OLD"]);
    assert_eq!(texts(&doc, "master", "ssp_ARCH_24x36", "JOB_LOC2"), ["KEEP"]);
    assert_eq!(texts(&doc, "Model", "ssp_ARCH_24x36", "JOB_LOC1"), ["MODEL-COPY"]);
    assert_eq!(
        texts(&doc, "Layout2", "ssp_ARCH_24x36", "JOB_LOC1"),
        ["SECOND-SHEET"]
    );
    assert_eq!(texts(&doc, "master", "NORTH_ARROW", "JOB_LOC1"), ["N"]);

    let master = doc.layout("master").unwrap();
    let kinds: Vec<&str> = master.entities().map(Entity::kind).collect();
    assert_eq!(kinds, ["INSERT", "INSERT", "LINE"]);

    // 普通块定义中的实体不属于任何布局
    let unplaced = doc.entities().filter(|placed| placed.layout.is_none()).count();
    assert_eq!(unplaced, 3);
}

#[test]
fn canonical_file_round_trips_byte_for_byte() {
    let source = fixture("title_block.dxf");
    let doc = decode(&source).expect("解码失败");
    assert_eq!(encode(&doc), source);
}

#[test]
fn crlf_file_keeps_its_line_endings() {
    let source = fixture("title_block_crlf.dxf");
    let codec = DxfCodec::new();
    let doc = codec.decode(&source).expect("解码失败");
    assert_eq!(doc.format().line_ending, LineEnding::CrLf);
    assert_eq!(codec.encode(&doc), source);
}

#[test]
fn substitution_rewrites_only_the_attribute_text() {
    let source = fixture("title_block.dxf");
    let mut doc = decode(&source).expect("解码失败");
    {
        let mut master = doc.layout_mut("master").unwrap();
        for insert in master.block_inserts_mut("ssp_ARCH_24x36") {
            for attribute in insert.attributes.iter_mut().filter(|a| a.tag == "JOB_LOC1") {
                attribute.text = "NEW-SITE-7".to_string();
            }
        }
    }
    let written = String::from_utf8(encode(&doc)).unwrap();
    let original = String::from_utf8(source).unwrap();

    let changed: Vec<(&str, &str)> = original
        .lines()
        .zip(written.lines())
        .filter(|(before, after)| before != after)
        .collect();
    assert_eq!(changed, [("OLD", "NEW-SITE-7")]);

    let reread = decode(written.as_bytes()).expect("再次解码失败");
    assert_eq!(texts(&reread, "master", "ssp_ARCH_24x36", "JOB_LOC1"), ["NEW-SITE-7"]);
    assert_eq!(texts(&reread, "Model", "ssp_ARCH_24x36", "JOB_LOC1"), ["MODEL-COPY"]);
}

#[test]
fn round_trip_preserves_model() {
    let doc = decode(&fixture("title_block.dxf")).expect("解码失败");
    let reread = decode(&encode(&doc)).expect("再次解码失败");
    assert_eq!(reread.sections(), doc.sections());
    assert!(reread.layouts().eq(doc.layouts()));
}

#[test]
fn r12_file_gets_synthetic_layouts() {
    let doc = decode(&fixture("r12_title_block.dxf")).expect("解码失败");
    let names: Vec<&str> = doc.layouts().map(|layout| layout.name.as_str()).collect();
    assert_eq!(names, ["Model", "Layout1"]);
    assert_eq!(texts(&doc, "Layout1", "ssp_ARCH_24x36", "JOB_LOC1"), ["R12-OLD"]);
    assert_eq!(doc.layout("Model").unwrap().entities().count(), 1);
}

#[test]
fn latin1_bytes_survive_and_wide_text_is_escaped() {
    let source = b"  0\nSECTION\n  2\nENTITIES\n  0\nINSERT\n 67\n1\n 66\n1\n  2\nTB\n  0\nATTRIB\n 67\n1\n  1\nStra\xDFe\n  2\nJOB_LOC1\n  0\nSEQEND\n  0\nENDSEC\n  0\nEOF\n";
    let mut doc = decode(source).expect("解码失败");
    assert_eq!(doc.format().encoding, TextEncoding::Latin1);
    assert_eq!(texts(&doc, "Layout1", "TB", "JOB_LOC1"), ["Stra\u{df}e"]);
    assert_eq!(encode(&doc), source.to_vec());

    {
        let mut layout = doc.layout_mut("Layout1").unwrap();
        for insert in layout.block_inserts_mut("TB") {
            insert.attributes[0].text = "Ω7".to_string();
        }
    }
    let written = encode(&doc);
    let needle = b"\n\\U+03A97\n";
    assert!(written.windows(needle.len()).any(|window| window == needle));
}

#[test]
fn structurally_invalid_inputs_are_rejected() {
    assert_eq!(decode(b"").unwrap_err(), FormatError::Empty);
    assert_eq!(
        decode(b"AutoCAD Binary DXF\r\n\x1a\x00\x00").unwrap_err(),
        FormatError::BinaryDxf
    );
    assert!(matches!(
        decode(b"this is\nnot a drawing\n"),
        Err(FormatError::Malformed { .. })
    ));

    let source = fixture("title_block.dxf");
    let truncated = &source[..source.len() / 2];
    assert!(decode(truncated).is_err());
}

#[test]
fn duplicate_layout_names_are_rejected() {
    let source = String::from_utf8(fixture("title_block.dxf")).unwrap();
    let duplicated = source.replacen("\nLayout2\n", "\nmaster\n", 2);
    assert!(matches!(
        decode(duplicated.as_bytes()),
        Err(FormatError::InvalidDocument(_))
    ));
}

fn set_master_text(doc: &mut Document, text: &str) {
    let mut master = doc.layout_mut("master").unwrap();
    for insert in master.block_inserts_mut("ssp_ARCH_24x36") {
        for attribute in insert.attributes.iter_mut().filter(|a| a.tag == "JOB_LOC1") {
            attribute.text = text.to_string();
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

#[test]
fn comment_groups_are_ignored() {
    let doc = decode(&fixture("title_block_comments.dxf")).expect("带注释的文件解码失败");
    let names: Vec<&str> = doc.layouts().map(|layout| layout.name.as_str()).collect();
    assert_eq!(names, ["Model", "master", "Layout2"]);
    assert_eq!(texts(&doc, "master", "ssp_ARCH_24x36", "JOB_LOC1"), ["OLD"]);
    assert_eq!(
        texts(&doc, "Layout2", "ssp_ARCH_24x36", "JOB_LOC1"),
        ["SECOND-SHEET"]
    );
    // 注释不参与回写
    assert_eq!(encode(&doc), fixture("title_block.dxf"));
}

#[test]
fn non_ascii_text_is_escaped_in_code_page_versions() {
    let mut doc = decode(&fixture("title_block.dxf")).expect("解码失败");
    assert_eq!(doc.header_variable("$ACADVER"), Some("AC1015"));
    set_master_text(&mut doc, "Straße");
    let written = encode(&doc);

    assert!(contains(&written, b"\nStra\\U+00DFe\n"));
    assert!(!contains(&written, "ß".as_bytes()));
    let reread = decode(&written).expect("再次解码失败");
    assert_eq!(texts(&reread, "master", "ssp_ARCH_24x36", "JOB_LOC1"), ["Straße"]);
}

#[test]
fn non_ascii_text_stays_utf8_from_r2007() {
    let source = String::from_utf8(fixture("title_block.dxf"))
        .unwrap()
        .replacen("\nAC1015\n", "\nAC1027\n", 1);
    let mut doc = decode(source.as_bytes()).expect("解码失败");
    set_master_text(&mut doc, "Straße");
    let written = encode(&doc);

    assert!(contains(&written, "\nStraße\n".as_bytes()));
    assert!(!contains(&written, b"\\U+00DF"));
}
