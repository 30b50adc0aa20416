mod layouts;
mod parser;
mod reader;
mod text;
mod writer;

use stamp_core::document::{Document, DocumentError};
use thiserror::Error;

use crate::parser::DxfParser;

/// 可处理的 `$ACADVER` 版本（R12 至 R2018）。
pub const SUPPORTED_VERSIONS: &[&str] = &[
    "AC1009", "AC1012", "AC1014", "AC1015", "AC1018", "AC1021", "AC1024", "AC1027", "AC1032",
];

const FIRST_UTF8_VERSION: &str = "AC1021";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("输入为空，不是 DXF 文档")]
    Empty,
    #[error("不支持二进制 DXF")]
    BinaryDxf,
    #[error("不支持的 DXF 版本：{0}")]
    UnsupportedVersion(String),
    #[error("第 {line} 行：{message}")]
    Malformed { line: usize, message: String },
    #[error("文档不完整：{0}")]
    Truncated(String),
    #[error("文档结构无效：{0}")]
    InvalidDocument(#[from] DocumentError),
}

pub trait DocumentDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Document, FormatError>;
}

pub trait DocumentEncoder {
    fn encode(&self, document: &Document) -> Vec<u8>;
}

/// ASCII DXF 编解码器。
#[derive(Debug, Default, Clone, Copy)]
pub struct DxfCodec;

impl DxfCodec {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentDecoder for DxfCodec {
    fn decode(&self, bytes: &[u8]) -> Result<Document, FormatError> {
        let source = text::decode_source(bytes)?;
        if source.text.trim().is_empty() {
            return Err(FormatError::Empty);
        }
        let sections = DxfParser::new(&source.text).parse()?;
        let mut document = layouts::assemble(sections, source.format)?;
        check_version(&document)?;
        let mut format = document.format();
        format.escape_non_ascii = uses_code_page(document.header_variable("$ACADVER"));
        document.set_format(format);
        Ok(document)
    }
}

impl DocumentEncoder for DxfCodec {
    fn encode(&self, document: &Document) -> Vec<u8> {
        writer::write_document(document)
    }
}

pub fn decode(bytes: &[u8]) -> Result<Document, FormatError> {
    DxfCodec.decode(bytes)
}

pub fn encode(document: &Document) -> Vec<u8> {
    DxfCodec.encode(document)
}

/// R2007（AC1021）起 DXF 文本为 UTF-8，更早的版本使用代码页。缺少版本号按 R12 处理。
fn uses_code_page(version: Option<&str>) -> bool {
    version.is_none_or(|version| version < FIRST_UTF8_VERSION)
}

fn check_version(document: &Document) -> Result<(), FormatError> {
    match document.header_variable("$ACADVER") {
        // 缺少版本号的文件按 R12 处理
        None => Ok(()),
        Some(version) if SUPPORTED_VERSIONS.contains(&version) => Ok(()),
        Some(version) => Err(FormatError::UnsupportedVersion(version.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_only_input_is_empty() {
        assert_eq!(decode(b" \r\n\n").unwrap_err(), FormatError::Empty);
    }

    #[test]
    fn old_versions_are_rejected() {
        let source = "0\nSECTION\n2\nHEADER\n9\n$ACADVER\n1\nAC1006\n0\nENDSEC\n0\nEOF\n";
        assert_eq!(
            decode(source.as_bytes()).unwrap_err(),
            FormatError::UnsupportedVersion("AC1006".to_string())
        );
    }

    #[test]
    fn code_page_versions_are_detected() {
        assert!(uses_code_page(None));
        assert!(uses_code_page(Some("AC1009")));
        assert!(uses_code_page(Some("AC1018")));
        assert!(!uses_code_page(Some("AC1021")));
        assert!(!uses_code_page(Some("AC1032")));
    }

    #[test]
    fn minimal_document_gets_synthetic_layouts() {
        let doc = decode(b"0\nSECTION\n2\nENTITIES\n0\nENDSEC\n0\nEOF\n").expect("decode");
        let names: Vec<&str> = doc.layouts().map(|layout| layout.name.as_str()).collect();
        assert_eq!(names, ["Model", "Layout1"]);
    }
}
