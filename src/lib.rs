#![deny(missing_docs)]

//! Streaming cryptographic pipeline for reading and writing KeePass 2
//! `.kdbx` v3 password database containers.
//!
//! Databases can be read with the [`kdbx3core::open`] function. This
//! provides access to header information. It can then be unlocked by
//! providing a [`CompositeKey`] to the [`Kdbx::unlock`] method to access any
//! encrypted data.
//!
//! ```no_run
//! # fn main() -> Result<(), kdbx3core::Error> {
//! use kdbx3core::CompositeKey;
//!
//! let kdbx = kdbx3core::open("./database.kdbx")?;
//! let key = CompositeKey::from_password("hunter2");
//! let unlocked = kdbx.unlock(&key)?;
//! # Ok(())
//! # }
//! ```
//!
//! Alternatively, [`kdbx3core::from_reader`] can be used to open a database
//! from a non file source (such as in-memory or a network stream)
//!
//! [`CompositeKey`]: crate::CompositeKey
//! [`kdbx3core::from_reader`]: crate::from_reader
//! [`kdbx3core::open`]: crate::open
//! [`Kdbx::unlock`]: crate::binary::Kdbx::unlock

pub mod binary;
pub mod config;
mod crypto;
pub mod errors;
pub mod keyfile;
mod safebuf;
mod stream;
pub mod types;
mod utils;
pub mod xml;

pub use crate::config::Config;
pub use crate::types::Database;
pub use binary::{from_reader, open, Kdbx};
pub use crypto::CompositeKey;
pub use errors::Error;
