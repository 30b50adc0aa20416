use stamp_core::document::{LineEnding, SourceFormat, TextEncoding};
use stamp_core::text::escape_above;

use crate::FormatError;

const BINARY_SENTINEL: &[u8] = b"AutoCAD Binary DXF";
pub(crate) const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub(crate) struct SourceText {
    pub(crate) text: String,
    pub(crate) format: SourceFormat,
}

/// 识别文本编码与换行风格。非 UTF-8 内容按 Latin-1 逐字节映射，保证回写无损。
pub(crate) fn decode_source(bytes: &[u8]) -> Result<SourceText, FormatError> {
    if bytes.starts_with(BINARY_SENTINEL) {
        return Err(FormatError::BinaryDxf);
    }
    let (body, byte_order_mark) = match bytes.strip_prefix(UTF8_BOM) {
        Some(rest) => (rest, true),
        None => (bytes, false),
    };
    let (text, encoding) = match std::str::from_utf8(body) {
        Ok(text) => (text.to_string(), TextEncoding::Utf8),
        Err(_) => (
            body.iter().map(|&byte| char::from(byte)).collect(),
            TextEncoding::Latin1,
        ),
    };
    let line_ending = if text.contains("\r\n") {
        LineEnding::CrLf
    } else {
        LineEnding::Lf
    };
    Ok(SourceText {
        text,
        format: SourceFormat {
            encoding,
            line_ending,
            byte_order_mark,
            escape_non_ascii: false,
        },
    })
}

/// Latin-1 无法表示的字符写成 DXF 的 `\U+XXXX` 转义。
pub(crate) fn encode_text(text: &str, encoding: TextEncoding) -> Vec<u8> {
    match encoding {
        TextEncoding::Utf8 => text.as_bytes().to_vec(),
        TextEncoding::Latin1 => escape_above(text, '\u{ff}')
            .chars()
            .filter_map(|ch| u8::try_from(ch).ok())
            .collect(),
    }
}
