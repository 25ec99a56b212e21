//! `.kdbx` v3 archives and the outer binary format
//!
//! Most methods are available on a specific state like `Kdbx<Locked>`
//! or `Kdbx<Unlocked>`.
//!
//! A KeePass 2 archive can be obtained with [`kdbx3core::open`][crate::open]
//! or [`kdbx3core::from_reader`][crate::from_reader].

pub(crate) mod errors;
pub mod header;
pub mod header_fields;
mod kdbx;
mod read;

pub use header::{KdbxHeader, OuterHeaderId};
pub use header_fields::{Cipher, CompressionType, InnerStreamCipherAlgorithm, KdfParams};
pub(crate) use header_fields::{KDBX_MAGIC_NUMBER, KEEPASS_MAGIC_NUMBER};
pub use kdbx::{FailedUnlock, Kdbx, KdbxState, Locked, Unlocked};
pub use read::{from_reader, open};
