use crate::FormatError;

const COMMENT_CODE: i32 = 999;

/// 逐对读取 DXF 组码/值行，支持回退一对。
pub(crate) struct DxfReader<'a> {
    lines: std::str::Lines<'a>,
    buffer: Option<(i32, String)>,
    line_number: usize,
}

impl<'a> DxfReader<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        Self {
            lines: source.lines(),
            buffer: None,
            line_number: 0,
        }
    }

    /// 最近读取的行号（从 1 开始）。
    #[inline]
    pub(crate) fn line_number(&self) -> usize {
        self.line_number
    }

    /// 读取下一对组码/值，组码 999 的注释被跳过。
    pub(crate) fn next_pair(&mut self) -> Result<Option<(i32, String)>, FormatError> {
        if let Some(pair) = self.buffer.take() {
            return Ok(Some(pair));
        }
        loop {
            match self.read_raw_pair()? {
                Some((COMMENT_CODE, _)) => continue,
                other => return Ok(other),
            }
        }
    }

    fn read_raw_pair(&mut self) -> Result<Option<(i32, String)>, FormatError> {
        let code_line = match self.lines.next() {
            Some(line) => {
                self.line_number += 1;
                line
            }
            None => return Ok(None),
        };

        let value_line = match self.lines.next() {
            Some(line) => {
                self.line_number += 1;
                line
            }
            None => {
                return Err(FormatError::Truncated(format!(
                    "文件在第 {} 行结束，缺少与组码对应的值行",
                    self.line_number
                )));
            }
        };

        let code = code_line.trim().parse::<i32>().map_err(|_| FormatError::Malformed {
            line: self.line_number - 1,
            message: format!("组码 \"{}\" 无法解析为整数", code_line.trim()),
        })?;
        let value = value_line.trim_end_matches('\r').to_string();
        Ok(Some((code, value)))
    }

    pub(crate) fn put_back(&mut self, pair: (i32, String)) {
        debug_assert!(self.buffer.is_none(), "DXF pair 只能回退一次");
        self.buffer = Some(pair);
    }
}
