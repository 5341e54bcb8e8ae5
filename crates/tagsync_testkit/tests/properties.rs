//! Store invariants checked over generated mutation sequences.

use proptest::prelude::*;
use std::collections::BTreeSet;
use tagsync_engine::Stores;
use tagsync_protocol::{CollectionDiff, Payload, PushBody};
use tagsync_testkit::prelude::*;

fn partition_keys<P: Payload>(diff: &Option<CollectionDiff<P>>) -> Result<(), String> {
    let Some(diff) = diff else {
        return Ok(());
    };
    let mut seen = BTreeSet::new();
    let keys = diff
        .insert
        .iter()
        .map(|r| r.key())
        .chain(diff.update.iter().map(|r| r.key()))
        .chain(diff.remove.iter().cloned());
    for key in keys {
        if !seen.insert(key.clone()) {
            return Err(format!("{} appears in two partitions", key));
        }
    }
    Ok(())
}

fn check_partition(body: &PushBody) -> Result<(), String> {
    partition_keys(&body.tags)?;
    partition_keys(&body.addresses)?;
    partition_keys(&body.transactions)
}

fn check_tombstones(stores: &Stores) -> Result<(), String> {
    fn check<P>(state: &tagsync_engine::CollectionState<P>) -> Result<(), String> {
        for (key, record) in &state.items {
            if !record.removed && state.tmp_removed.contains_key(key) {
                return Err(format!("{} is both live and locally removed", key));
            }
        }
        Ok(())
    }
    check(stores.tags.state())?;
    check(stores.addresses.state())?;
    check(stores.transactions.state())
}

proptest! {
    #![proptest_config(PropTestConfig::default().to_proptest_config())]

    #[test]
    fn pending_diff_partitions_keys(ops in mutation_sequence_strategy(1, 40)) {
        let replica = TestReplica::memory();
        for op in ops {
            replica.dispatch(op.into_action());
            if let Err(e) = check_partition(&replica.pending()) {
                return Err(TestCaseError::fail(e));
            }
        }
    }

    #[test]
    fn no_key_is_live_and_tombstoned(
        ops in mutation_sequence_strategy(1, 40),
        changes in address_changes_strategy(),
    ) {
        let replica = TestReplica::memory();
        for op in ops {
            replica.dispatch(op.into_action());
            if let Err(e) = check_tombstones(&replica.snapshot()) {
                return Err(TestCaseError::fail(e));
            }
        }
        replica.dispatch(Action::SyncChanges(changes));
        if let Err(e) = check_tombstones(&replica.snapshot()) {
            return Err(TestCaseError::fail(e));
        }
    }

    #[test]
    fn reconciliation_is_idempotent(
        ops in mutation_sequence_strategy(0, 20),
        changes in address_changes_strategy(),
    ) {
        let replica = TestReplica::memory();
        replica.dispatch_all(ops.into_iter().map(Mutation::into_action));

        replica.dispatch(Action::SyncChanges(changes.clone()));
        let once = replica.snapshot();
        replica.dispatch(Action::SyncChanges(changes));
        let twice = replica.snapshot();

        prop_assert_eq!(once.addresses.state(), twice.addresses.state());
        prop_assert_eq!(once.tags.state(), twice.tags.state());
        prop_assert_eq!(once.transactions.state(), twice.transactions.state());
    }

    #[test]
    fn state_survives_reopen(ops in mutation_sequence_strategy(1, 15)) {
        let replica = TestReplica::file();
        replica.dispatch_all(ops.into_iter().map(Mutation::into_action));
        let before = replica.snapshot();

        let replica = replica.reopen();
        let after = replica.snapshot();
        prop_assert_eq!(before.addresses.state(), after.addresses.state());
        prop_assert_eq!(before.tags.state(), after.tags.state());
        prop_assert_eq!(before.transactions.state(), after.transactions.state());
        prop_assert_eq!(before.app, after.app);
    }
}

#[test]
fn insert_pending_removal_leaves_items() {
    let replica = TestReplica::memory();
    replica.dispatch(Action::add_address_tag("1ABC", "vip"));
    replica.dispatch(Action::remove_address("1abc"));

    let stores = replica.snapshot();
    let state = stores.addresses.state();
    assert!(!state.items.contains_key("1abc"));
    assert!(state.tmp_removed["1abc"].removed);
    assert!(replica.pending().addresses.is_none());
}

#[test]
fn synced_removal_is_pushed_as_remove() {
    let replica = scenarios::synced_replica(&[("1ABC", &["vip"])]);
    replica.dispatch(Action::remove_address_tag("1abc", "vip"));

    let pending = replica.pending();
    let addresses = pending.addresses.expect("removal pending");
    assert_eq!(addresses.remove, vec!["1abc".to_string()]);
    assert!(addresses.insert.is_empty());
    assert!(addresses.update.is_empty());
}
