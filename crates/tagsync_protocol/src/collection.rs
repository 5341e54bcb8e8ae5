//! Collection identities.

use std::fmt;

/// The record collections kept in sync.
///
/// Declaration order is the registration order used by the dispatcher
/// when it breaks ties between independent stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CollectionKind {
    /// User-defined tags.
    Tags,
    /// Addresses with tags and a note.
    Addresses,
    /// Transactions with tags and a note.
    Transactions,
}

impl CollectionKind {
    /// All collections, in registration order.
    pub const ALL: [CollectionKind; 3] = [
        CollectionKind::Tags,
        CollectionKind::Addresses,
        CollectionKind::Transactions,
    ];

    /// Name used for this collection in push bodies and pulled change sets.
    pub fn wire_name(&self) -> &'static str {
        match self {
            CollectionKind::Tags => "userTag",
            CollectionKind::Addresses => "userAddress",
            CollectionKind::Transactions => "userTx",
        }
    }

    /// Key under which the collection state is persisted.
    pub fn store_key(&self) -> &'static str {
        match self {
            CollectionKind::Tags => "userTags",
            CollectionKind::Addresses => "userAddresses",
            CollectionKind::Transactions => "userTxs",
        }
    }

    /// Parses a wire name back into a collection.
    pub fn from_wire_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.wire_name() == name)
    }

    /// Derives the case-normalized record key from a natural identifier.
    pub fn normalize_key(&self, raw: &str) -> String {
        match self {
            CollectionKind::Tags => raw.trim().to_lowercase(),
            CollectionKind::Addresses | CollectionKind::Transactions => raw.to_lowercase(),
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}
