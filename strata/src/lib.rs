//! Strata - URI-addressed virtual resources
//!
//! This library puts local files, entries inside zip archives, HTTP
//! endpoints and layered overlay trees behind one [`Resource`] abstraction.
//! A [`Resolver`] dispatches each URI to the factory registered for its
//! scheme:
//!
//! | Scheme                   | Backend                                   |
//! |--------------------------|-------------------------------------------|
//! | `file:`                  | [`backend::FileResource`]                 |
//! | `http:` `https:`         | [`backend::UrlResource`]                  |
//! | `ftp:`                   | [`backend::FtpResource`]                  |
//! | `jar:<uri>!/<entry>`     | [`archive::ArchiveEntryResource`]         |
//! | `ovl:<uri>`, `ovl://n/p` | [`overlay::OverlayResource`] / context    |
//!
//! # Example
//!
//! ```ignore
//! use strata::config::StrataConfig;
//! use strata::resource::read_to_string;
//!
//! let config = StrataConfig::default();
//! let resolver = config.build_resolver()?;
//!
//! let readme = resolver.resolve_str("jar:file:///opt/app/bundle.zip!/README.md")?;
//! println!("{}", read_to_string(readme.as_ref())?);
//! ```

pub mod archive;
pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod overlay;
pub mod resolver;
pub mod resource;
pub mod watch;

pub use error::{ResourceError, ResourceResult};
pub use resolver::{ResourceFactory, Resolver};
pub use resource::{Container, Resource, ResourceRef};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
