use std::fs;
use std::path::{Path, PathBuf};

use stamp_core::document::Document;
use tracing::debug;

use crate::errors::FrontendError;
use crate::upload::UploadedFile;

/// 读取磁盘文件作为上传内容，文件名取路径最后一段。
pub fn read_uploads(paths: &[PathBuf]) -> Result<Vec<UploadedFile>, FrontendError> {
    paths
        .iter()
        .map(|path| {
            let bytes = fs::read(path).map_err(|source| FrontendError::Read {
                path: path.clone(),
                source,
            })?;
            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            debug!(path = %path.display(), bytes = bytes.len(), "已读取上传文件");
            Ok(UploadedFile::new(filename, bytes))
        })
        .collect()
}

pub fn load_document(path: &Path) -> Result<Document, FrontendError> {
    let bytes = fs::read(path).map_err(|source| FrontendError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    stamp_io::decode(&bytes).map_err(|source| FrontendError::Format {
        path: path.to_path_buf(),
        source,
    })
}
