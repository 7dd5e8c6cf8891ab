//! A compiler for zoneinfo source files.
//!
//! `zoneinfo_compiler` reads the `Rule`, `Zone`, and `Link` lines of the
//! IANA time zone database sources, resolves every zone into a compiled
//! time zone, and writes the compiled zones alongside an index mapping every
//! zone id and alias to its compiled zone.
//!
//! ```rust
//! use zoneinfo_compiler::{CompilationSession, CompiledZone};
//!
//! let mut session = CompilationSession::default();
//! session
//!     .parse_str(
//!         "Zone Etc/UTC 0 - UTC\n\
//!          Link Etc/UTC Etc/Zulu\n",
//!     )
//!     .unwrap();
//!
//! let compilation = session.compile();
//! let zulu = compilation.get("Etc/Zulu").unwrap();
//! assert_eq!(zulu.id(), "Etc/UTC");
//! assert_eq!(zulu.offset_at(0), 0);
//! ```
//!
//! Zones are resolved through a [`TransitionBuilder`], with [`ZoneBuilder`]
//! as the default, and written to a [`CompiledOutput`].

// Implementation note: like the tzdata sources themselves, this library is
// meant for build time use on a limited dataset, so clarity is preferred over
// speed.

#![no_std]
#![cfg_attr(not(test), forbid(clippy::unwrap_used))]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

use core::fmt;

#[cfg(feature = "std")]
use std::io;

pub(crate) mod codec;
pub(crate) mod utils;

pub mod alias_index;
pub mod builder;
pub mod compiled;
pub mod compiler;
pub mod parser;
pub mod rule;
pub mod types;
pub mod verify;
pub mod zone;

#[doc(inline)]
pub use alias_index::{read_alias_index, write_alias_index, AliasIndexError};
#[doc(inline)]
pub use builder::{TransitionBuilder, ZoneBuilder};
#[doc(inline)]
pub use compiled::{CompiledTimeZone, CompiledZone, ZoneCodecError};
#[doc(inline)]
pub use compiler::{
    Compilation, CompilationSession, CompileError, CompiledOutput, Diagnostic, MemoryOutput,
};
#[cfg(feature = "std")]
#[doc(inline)]
pub use compiler::DirectoryOutput;
#[doc(inline)]
pub use parser::ZoneInfoParseError;

/// Well-known zone info file
pub const ZONEINFO_FILES: [&str; 9] = [
    "africa",
    "antarctica",
    "asia",
    "australasia",
    "backward",
    "etcetera",
    "europe",
    "northamerica",
    "southamerica",
];

/// The general error type for `ZoneInfo` operations
#[derive(Debug)]
pub enum ZoneInfoError {
    Parse(ZoneInfoParseError),
    AliasIndex(AliasIndexError),
    #[cfg(feature = "std")]
    Io(io::Error),
}

impl fmt::Display for ZoneInfoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "{e}"),
            Self::AliasIndex(e) => write!(f, "{e}"),
            #[cfg(feature = "std")]
            Self::Io(e) => write!(f, "{e}"),
        }
    }
}

impl core::error::Error for ZoneInfoError {}

impl From<ZoneInfoParseError> for ZoneInfoError {
    fn from(value: ZoneInfoParseError) -> Self {
        Self::Parse(value)
    }
}

impl From<AliasIndexError> for ZoneInfoError {
    fn from(value: AliasIndexError) -> Self {
        Self::AliasIndex(value)
    }
}

#[cfg(feature = "std")]
impl From<io::Error> for ZoneInfoError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

#[cfg(feature = "std")]
impl From<CompileError<io::Error>> for ZoneInfoError {
    fn from(value: CompileError<io::Error>) -> Self {
        match value {
            CompileError::Output(e) => Self::Io(e),
            CompileError::AliasIndex(e) => Self::AliasIndex(e),
        }
    }
}
