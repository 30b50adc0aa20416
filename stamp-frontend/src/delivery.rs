use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use stamp_engine::batch::{BatchOutcome, NamedPayload};
use tempfile::NamedTempFile;
use tracing::info;

use crate::errors::FrontendError;

pub const NO_MODIFICATIONS_MESSAGE: &str = "No modifications made to any file";

/// 返回给调用方的结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    NoContent { message: String },
    File(NamedPayload),
    Archive(NamedPayload),
}

impl From<BatchOutcome> for Delivery {
    fn from(outcome: BatchOutcome) -> Self {
        match outcome {
            BatchOutcome::Empty => Delivery::NoContent {
                message: NO_MODIFICATIONS_MESSAGE.to_string(),
            },
            BatchOutcome::Single(payload) => Delivery::File(payload),
            BatchOutcome::Archive(payload) => Delivery::Archive(payload),
        }
    }
}

impl Delivery {
    pub fn payload(&self) -> Option<&NamedPayload> {
        match self {
            Delivery::NoContent { .. } => None,
            Delivery::File(payload) | Delivery::Archive(payload) => Some(payload),
        }
    }

    /// 将结果写入目录，返回写出的文件路径；`NoContent` 不写任何文件。
    ///
    /// 先写入同目录下的临时文件再重命名，目标路径上不会出现写了一半的文件。
    pub fn write_to_dir(&self, directory: &Path) -> Result<Option<PathBuf>, FrontendError> {
        let Some(payload) = self.payload() else {
            return Ok(None);
        };
        fs::create_dir_all(directory).map_err(|source| FrontendError::Write {
            path: directory.to_path_buf(),
            source,
        })?;

        let destination = directory.join(&payload.filename);
        let write_error = |source: std::io::Error| FrontendError::Write {
            path: destination.clone(),
            source,
        };
        let mut file = NamedTempFile::new_in(directory).map_err(write_error)?;
        file.write_all(&payload.bytes).map_err(write_error)?;
        file.persist(&destination)
            .map_err(|err| write_error(err.error))?;
        info!(path = %destination.display(), bytes = payload.bytes.len(), "已写出结果文件");
        Ok(Some(destination))
    }
}
