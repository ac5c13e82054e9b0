//! Index table construction.

use super::{key_hash, stride_hash, DataRegion, IndexInfo, KeyMatch, Probe, Slot, SlotLayout};
use crate::config::{effective_sparsity, HashType};
use crate::error::{Error, Result};
use crate::reader::LogIterator;
use crate::store::ChunkedStore;

/// Number of slots for `num_records` records at the given sparsity.
///
/// The sparsity is clamped to the supported floor first. A non-empty table
/// always has at least one slot more than it has records.
pub fn slot_count(num_records: u64, sparsity: f64) -> u64 {
    if num_records == 0 {
        return 0;
    }
    let slots = (num_records as f64 * effective_sparsity(sparsity)).ceil() as u64;
    slots.max(num_records + 1)
}

/// A finished index table and its summary.
#[derive(Debug)]
pub struct BuiltIndex {
    /// The encoded slots, ready to be flushed after the data region.
    pub table: ChunkedStore,
    /// Counts and width of the table.
    pub info: IndexInfo,
}

/// Builds the index table for a data region in one pass over its records.
#[derive(Debug, Clone, Copy)]
pub struct IndexBuilder {
    hash_type: HashType,
    sparsity: f64,
}

impl IndexBuilder {
    /// Create a builder with the given hash width and sparsity.
    pub fn new(hash_type: HashType, sparsity: f64) -> Self {
        Self { hash_type, sparsity }
    }

    /// Index every record of `region`, which must hold exactly `num_records`.
    pub fn build(&self, region: &DataRegion, num_records: u64) -> Result<BuiltIndex> {
        let hash_type = self.hash_type.resolve(num_records);
        let layout = SlotLayout::new(hash_type);
        let slots = slot_count(num_records, self.sparsity);
        let table_len = slots
            .checked_mul(layout.slot_len() as u64)
            .ok_or_else(|| Error::invalid_size(format!("index of {} slots", slots)))?;
        let mut table = ChunkedStore::new(table_len)?;

        let mut seen = 0u64;
        let mut live = 0u64;
        let mut records = LogIterator::new(region.reader_at(0), region.data_end());

        while let Some(item) = records.next_positioned() {
            let (position, entry) = item?;
            seen += 1;
            if seen > num_records {
                return Err(Error::corruption(format!(
                    "data region holds more than the {} records written",
                    num_records
                )));
            }

            let key = entry.key();
            let hash = key_hash(key, hash_type);
            let slot = Slot { hash, position };
            let mut placed = false;

            for index in Probe::new(hash, stride_hash(key), slots) {
                match layout.read_slot(&mut table, index)? {
                    None => {}
                    Some(existing) if existing.hash == hash => {
                        match region.match_at(existing.position, key, false)? {
                            KeyMatch::Other => continue,
                            KeyMatch::Present(_) => live -= 1,
                            KeyMatch::Deleted => {}
                        }
                    }
                    Some(_) => continue,
                }
                layout.write_slot(&mut table, index, &slot)?;
                if !entry.is_delete() {
                    live += 1;
                }
                placed = true;
                break;
            }

            if !placed {
                return Err(Error::corruption(format!("index table of {} slots is full", slots)));
            }
        }

        if seen != num_records {
            return Err(Error::corruption(format!(
                "expected {} records in the data region, found {}",
                num_records, seen
            )));
        }

        log::info!(
            "Built index: {} records, {} live keys, {} slots, {}-bit hashes",
            num_records,
            live,
            slots,
            hash_type.width_bytes() * 8
        );

        Ok(BuiltIndex {
            table,
            info: IndexInfo { slot_count: slots, hash_type, num_records, num_live: live },
        })
    }
}
