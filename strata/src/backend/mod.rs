//! Concrete resource backends for local files and remote URLs.
//!
//! Archive entries live in [`crate::archive`] and overlay trees in
//! [`crate::overlay`]; both build on the same [`Resource`](crate::resource::Resource)
//! contract.

mod file;
mod ftp;
mod remote;

pub use file::{FileFactory, FileResource};
pub use ftp::{FtpResource, ANONYMOUS_USER};
pub use remote::{UrlFactory, UrlResource, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT};
