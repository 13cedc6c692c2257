//! Save-game callbacks: persist the whole engine under a named slot, load
//! it back, or revert it.
//!
//! The host calls these around its own save cycle. Loading always reverts
//! first, so a slot with no record leaves a fresh engine behind.

use std::path::Path;

use slam_core::codec::{IdentifierResolver, SaveRecord, RECORD_TYPE};
use slam_core::error::Result;
use slam_core::store::SaveStore;
use slam_core::ArousalEngine;
use tracing::info;

/// Write the engine's record under `slot`.
///
/// # Errors
/// Propagates encode and database failures.
pub fn save_to_store(engine: &ArousalEngine, store: &SaveStore, slot: &str) -> Result<()> {
    let record = engine.save()?;
    store.save_record(slot, &record)?;
    if let Err(e) = store.create_rotating_backup() {
        tracing::warn!(slot, error = %e, "Rotating backup failed");
    }
    info!(slot, entities = engine.entity_count(), "save");
    Ok(())
}

/// Replace the engine with the record stored under `slot`.
///
/// Returns `false` when the slot holds no record.
///
/// # Errors
/// Propagates database and decode failures; the engine is reverted in every
/// case.
pub fn load_from_store(
    engine: &mut ArousalEngine,
    store: &SaveStore,
    slot: &str,
    resolver: &dyn IdentifierResolver,
) -> Result<bool> {
    engine.revert();
    let Some(record) = store.load_record(slot, RECORD_TYPE)? else {
        info!(slot, "No saved record");
        return Ok(false);
    };
    engine.load(&record, resolver)?;
    info!(slot, entities = engine.entity_count(), "load");
    Ok(true)
}

/// Write the engine's framed record to a standalone file.
///
/// # Errors
/// Propagates encode and I/O failures.
pub fn export_blob(engine: &ArousalEngine, path: &Path) -> Result<()> {
    let bytes = engine.save()?.to_bytes()?;
    std::fs::write(path, &bytes)?;
    info!(path = %path.display(), bytes = bytes.len(), "Exported save blob");
    Ok(())
}

/// Replace the engine with a framed record read from `path`.
///
/// # Errors
/// Propagates I/O and decode failures; the engine is reverted on failure.
pub fn import_blob(
    engine: &mut ArousalEngine,
    path: &Path,
    resolver: &dyn IdentifierResolver,
) -> Result<()> {
    engine.revert();
    let bytes = std::fs::read(path)?;
    let record = SaveRecord::from_bytes(&bytes)?;
    engine.load(&record, resolver)
}
