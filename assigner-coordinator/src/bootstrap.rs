use assigner_common::error::RecordStoreError;
use assigner_common::records::{RecordBootstrap, RecordStore};
use tracing::info;

/// Prepare the record store before the first tick: create the table, optionally
/// empty it, and seed `seed_records` items when it is empty.
///
/// Returns the number of items inserted.
pub async fn bootstrap_records<S>(
    store: &S,
    seed_records: u32,
    reset: bool,
) -> Result<u64, RecordStoreError>
where
    S: RecordStore + RecordBootstrap,
{
    store.migrate().await?;

    if reset {
        let removed = store.reset().await?;
        info!(removed, "reset work items");
    }

    let existing = store.count().await?;
    if existing > 0 {
        info!(existing, "work items already present, not seeding");
        return Ok(0);
    }

    let inserted = store.seed(seed_records).await?;
    info!(inserted, "seeded work items");

    Ok(inserted)
}
