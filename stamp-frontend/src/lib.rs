pub mod cli;
pub mod delivery;
pub mod errors;
pub mod loader;
pub mod upload;

pub use delivery::Delivery;
pub use errors::FrontendError;
pub use upload::{UploadOutcome, UploadRequest, UploadSettings, UploadedFile, handle_upload};
