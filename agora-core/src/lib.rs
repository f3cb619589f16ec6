// SPDX-License-Identifier: MIT OR Apache-2.0

#![cfg_attr(doctest, doc=include_str!("../README.md"))]
pub mod cbor;
pub mod command;
pub mod domain;
pub mod hash;
pub mod identity;
pub mod model;
pub mod seed;
mod serde;
pub mod signable;
pub mod timestamp;
pub mod traits;

pub use command::{Command, CommandError, CommandId, CommandSpec, CommandTable};
pub use domain::Domain;
pub use hash::{Hash, HashError};
pub use identity::{EncryptionKey, IdentityError, PrivateKey, PublicKey, Signature};
pub use model::Row;
pub use seed::SeedKeys;
pub use timestamp::Timestamp;
pub use traits::Record;
