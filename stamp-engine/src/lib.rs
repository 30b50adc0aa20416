pub mod batch;
pub mod substitution;

/// 模板块参照所在的布局。
pub const DEFAULT_LAYOUT: &str = "master";
/// 图框块名。
pub const DEFAULT_BLOCK: &str = "ssp_ARCH_24x36";
/// 工程地点代码的属性标记。
pub const JOB_LOC1: &str = "JOB_LOC1";

pub const MODIFIED_PREFIX: &str = "modified_";
pub const ARCHIVE_NAME: &str = "modified_files.zip";
pub const DXF_MEDIA_TYPE: &str = "application/dxf";
pub const ZIP_MEDIA_TYPE: &str = "application/zip";

pub mod errors {
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error("写入压缩包失败: {0}")]
        Archive(#[from] zip::result::ZipError),
        #[error("写入压缩包条目失败: {0}")]
        Io(#[from] std::io::Error),
    }
}
