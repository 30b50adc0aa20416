use std::borrow::Cow;

use stamp_core::document::{Document, Entity, Section};
use stamp_core::record::Record;
use stamp_core::text::escape_above;

use crate::text::{UTF8_BOM, encode_text};

/// 按来源文件的编码、换行与 BOM 写出文档。
pub(crate) fn write_document(document: &Document) -> Vec<u8> {
    let format = document.format();
    let mut writer = DxfWriter::new(format.line_ending.as_str(), format.escape_non_ascii);
    for section in document.sections() {
        writer.section(section);
    }
    writer.pair(0, "EOF");

    let mut bytes = Vec::new();
    if format.byte_order_mark {
        bytes.extend_from_slice(UTF8_BOM);
    }
    bytes.extend(encode_text(&writer.out, format.encoding));
    bytes
}

struct DxfWriter {
    out: String,
    newline: &'static str,
    escape_non_ascii: bool,
}

impl DxfWriter {
    fn new(newline: &'static str, escape_non_ascii: bool) -> Self {
        Self {
            out: String::new(),
            newline,
            escape_non_ascii,
        }
    }

    fn pair(&mut self, code: i32, value: &str) {
        self.out.push_str(&format!("{code:>3}"));
        self.out.push_str(self.newline);
        self.out.push_str(&single_line(value));
        self.out.push_str(self.newline);
    }

    fn record(&mut self, record: &Record) {
        self.pair(0, &record.kind);
        for pair in &record.pairs {
            self.pair(pair.code, &pair.value);
        }
    }

    fn entity(&mut self, entity: &Entity) {
        match entity {
            Entity::BlockInsert(insert) => {
                self.record(&insert.to_record());
                for attribute in &insert.attributes {
                    let mut record = attribute.to_record();
                    // 旧版本文件的原有字节沿用代码页，只有改写的文本需要转义
                    if self.escape_non_ascii && attribute.is_modified() {
                        record.set_value(1, escape_above(&attribute.text, '\u{7f}'));
                    }
                    self.record(&record);
                }
                if let Some(seqend) = &insert.seqend {
                    self.record(seqend);
                }
            }
            Entity::Opaque(opaque) => {
                self.record(&opaque.record);
                for follower in &opaque.followers {
                    self.record(follower);
                }
            }
        }
    }

    fn section(&mut self, section: &Section) {
        self.pair(0, "SECTION");
        self.pair(2, section.name());
        match section {
            Section::Generic { pairs, .. } => {
                for pair in pairs {
                    self.pair(pair.code, &pair.value);
                }
            }
            Section::Entities(entities) => {
                for placed in entities {
                    self.entity(&placed.entity);
                }
            }
            Section::Blocks(blocks) => {
                for block in blocks {
                    self.record(&block.record);
                    for placed in &block.entities {
                        self.entity(&placed.entity);
                    }
                    self.record(&block.end);
                }
            }
        }
        self.pair(0, "ENDSEC");
    }
}

/// DXF 的值只占一行，换行符替换为空格。
fn single_line(value: &str) -> Cow<'_, str> {
    if value.contains(['\r', '\n']) {
        Cow::Owned(value.replace(['\r', '\n'], " "))
    } else {
        Cow::Borrowed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stamp_core::document::{
        Attribute, BlockInsert, Layout, LayoutKind, LineEnding, SourceFormat, TextEncoding,
    };

    fn title_block_document(text: &str) -> Document {
        let mut doc = Document::new();
        let master = doc
            .add_layout(Layout::new("master", LayoutKind::ActivePaper))
            .unwrap();
        doc.push_entity(
            master,
            Entity::BlockInsert(
                BlockInsert::new("ssp_ARCH_24x36").with_attribute(Attribute::new("JOB_LOC1", text)),
            ),
        )
        .unwrap();
        doc
    }

    #[test]
    fn group_codes_are_right_aligned() {
        let bytes = write_document(&Document::new());
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, "  0\nSECTION\n  2\nENTITIES\n  0\nENDSEC\n  0\nEOF\n");
    }

    #[test]
    fn line_breaks_in_values_become_spaces() {
        let text = String::from_utf8(write_document(&title_block_document("A\nB"))).unwrap();
        assert!(text.contains("\nA B\n"));
    }

    #[test]
    fn modified_text_is_escaped_for_code_page_files() {
        let mut doc = title_block_document("OLD");
        {
            let mut master = doc.layout_mut("master").unwrap();
            for insert in master.block_inserts_mut("ssp_ARCH_24x36") {
                insert.attributes[0].text = "Straße".to_string();
            }
        }
        let mut format = doc.format();
        format.escape_non_ascii = true;
        doc.set_format(format);
        let text = String::from_utf8(write_document(&doc)).unwrap();
        assert!(text.contains("\nStra\\U+00DFe\n"));

        format.escape_non_ascii = false;
        doc.set_format(format);
        let text = String::from_utf8(write_document(&doc)).unwrap();
        assert!(text.contains("\nStraße\n"));
    }

    #[test]
    fn crlf_and_bom_are_reproduced() {
        let mut doc = title_block_document("X");
        doc.set_format(SourceFormat {
            encoding: TextEncoding::Utf8,
            line_ending: LineEnding::CrLf,
            byte_order_mark: true,
            escape_non_ascii: false,
        });
        let bytes = write_document(&doc);
        assert!(bytes.starts_with(UTF8_BOM));
        let text = std::str::from_utf8(&bytes[UTF8_BOM.len()..]).unwrap();
        assert!(text.starts_with("  0\r\nSECTION\r\n"));
        assert!(!text.replace("\r\n", "").contains('\n'));
    }
}
