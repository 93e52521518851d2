//! s3send - upload files to S3-compatible object storage, get back a URL

pub mod config;
pub mod content_type;
pub mod s3;
pub mod tool;
pub mod upload;

pub use config::Config;
pub use s3::{S3Client, UploadError};
pub use upload::Uploader;
