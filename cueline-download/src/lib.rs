pub mod downloader;
pub mod error;
pub mod retry;
pub mod sweep;

pub use downloader::Downloader;
pub use error::{DownloadError, Result};
pub use retry::RetryPolicy;
