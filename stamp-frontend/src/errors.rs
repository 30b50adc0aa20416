use std::path::PathBuf;

use stamp_engine::errors::EngineError;
use stamp_io::FormatError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("No files uploaded")]
    NoFiles,
    #[error("替换字段格式应为 KEY=VALUE：{0}")]
    InvalidField(String),
    #[error("读取文件 {path:?} 失败: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("写入文件 {path:?} 失败: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析 DXF {path:?} 失败: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: FormatError,
    },
    #[error("{0} 个文件全部未能处理")]
    AllInputsFailed(usize),
    #[error(transparent)]
    Batch(#[from] EngineError),
    #[error("序列化检查结果失败: {0}")]
    Json(#[from] serde_json::Error),
}
