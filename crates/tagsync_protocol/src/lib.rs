//! # tagsync protocol
//!
//! Record and wire types shared by the tagsync engine and its hosts.
//!
//! This crate provides:
//! - `CollectionKind` with per-collection wire names and key normalization
//! - `Record` and the `Dirty` pending-push marker
//! - Collection payloads (addresses, transactions, tags)
//! - Protocol bodies (handshake, pull, push, conflict)
//! - Change sets and push diffs
//! - Import/export datasets
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod changes;
mod collection;
mod conflict;
mod dataset;
mod messages;
mod payload;
mod record;

pub use changes::{ChangeSet, CollectionChanges, CollectionDiff, DeletedRef, PushBody, PushRecord};
pub use collection::CollectionKind;
pub use conflict::ConflictInfo;
pub use dataset::{Dataset, Items};
pub use messages::{SyncResponse, UserResponse};
pub use payload::{dedupe_tags, AddressPayload, Annotated, Payload, TagPayload, TxPayload};
pub use record::{Dirty, Record};
