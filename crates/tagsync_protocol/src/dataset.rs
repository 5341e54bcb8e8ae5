//! Import/export datasets.

use crate::payload::{AddressPayload, TagPayload, TxPayload};
use crate::record::Record;
use serde::{Deserialize, Serialize};

/// The records of one collection in a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "P: Serialize", deserialize = "P: Deserialize<'de>"))]
pub struct Items<P> {
    /// Records, timestamps optional.
    #[serde(default)]
    pub items: Vec<Record<P>>,
}

impl<P> Items<P> {
    /// Wraps a list of records.
    pub fn new(items: Vec<Record<P>>) -> Self {
        Self { items }
    }
}

/// A full external dataset, used for bootstrap import and export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    /// Tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_tags: Option<Items<TagPayload>>,
    /// Addresses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_addresses: Option<Items<AddressPayload>>,
    /// Transactions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_txs: Option<Items<TxPayload>>,
}

impl Dataset {
    /// Returns true if no collection has records.
    pub fn is_empty(&self) -> bool {
        self.user_tags.as_ref().map_or(true, |i| i.items.is_empty())
            && self.user_addresses.as_ref().map_or(true, |i| i.items.is_empty())
            && self.user_txs.as_ref().map_or(true, |i| i.items.is_empty())
    }
}
