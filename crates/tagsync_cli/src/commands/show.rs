//! Read-only inspection commands.

use super::open_replica;
use std::path::Path;
use tagsync_engine::SyncConfig;
use tagsync_protocol::{CollectionKind, Dirty, Record};

fn marker<P>(record: &Record<P>) -> &'static str {
    match record.dirty {
        Some(Dirty::Insert) => " [insert]",
        Some(Dirty::Update) => " [update]",
        None => "",
    }
}

/// Lists the live records of one collection.
pub fn list(path: &Path, target: CollectionKind) -> Result<(), Box<dyn std::error::Error>> {
    let dispatcher = open_replica(path)?;
    let lines: Vec<String> = dispatcher.read(|stores| match target {
        CollectionKind::Tags => stores
            .tags
            .live_records()
            .map(|r| format!("{}{}", r.payload.tag, marker(r)))
            .collect(),
        CollectionKind::Addresses => stores
            .addresses
            .live_records()
            .map(|r| {
                format!(
                    "{}  [{}]  {}{}",
                    r.payload.address,
                    r.payload.address_tags.join(", "),
                    r.payload.address_user_note,
                    marker(r)
                )
            })
            .collect(),
        CollectionKind::Transactions => stores
            .transactions
            .live_records()
            .map(|r| {
                format!(
                    "{}  [{}]  {}{}",
                    r.payload.txid,
                    r.payload.tx_tags.join(", "),
                    r.payload.tx_user_note,
                    marker(r)
                )
            })
            .collect(),
    });

    println!("{} ({} records)", target.wire_name(), lines.len());
    for line in lines {
        println!("  {}", line);
    }
    Ok(())
}

/// Prints the diff the next push would send.
pub fn pending(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let dispatcher = open_replica(path)?;
    let body = dispatcher.pending_changes();
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

/// Displays replica state.
pub fn status(path: &Path, config: &SyncConfig) -> Result<(), Box<dyn std::error::Error>> {
    let dispatcher = open_replica(path)?;
    let app = dispatcher.app();
    let (tags, addresses, transactions) = dispatcher.read(|s| {
        (
            s.tags.live_count(),
            s.addresses.live_count(),
            s.transactions.live_count(),
        )
    });
    let pending = dispatcher.pending_changes().len();

    println!("Replica: {:?}", path);
    println!();
    println!("Records:");
    println!("  Tags:          {}", tags);
    println!("  Addresses:     {}", addresses);
    println!("  Transactions:  {}", transactions);
    println!("  Pending:       {}", pending);
    println!();
    println!("Sync:");
    println!("  Cursor:        {}", app.cursor());
    println!("  Last attempt:  {}", app.last_sync_call);
    println!("  Push enabled:  {}", app.push_changes);
    println!("  Tags & notes:  {}", app.sync_tags_and_notes);
    println!("  Channels:      {}", app.notification_channels.len());
    println!(
        "  Endpoints:     {}",
        if config.has_endpoints() {
            "configured"
        } else {
            "not configured"
        }
    );
    Ok(())
}
