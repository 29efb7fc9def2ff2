// Data-plane request pipelines: range resolution, replica selection
// and fan-out/fan-in over the shards a request touches (spec §4.4,
// §4.5). Each pipeline clones the shard handles it needs out of the
// registry up front so it never holds the registry lock across
// outbound I/O (spec §5).

pub mod read;
pub mod write;

use std::sync::Arc;

use crate::metadata::ShardRecord;

/// Generate-a-random-key range for replica selection: half-open,
/// matching the source's request-key convention (spec §4.4).
pub const REQUEST_KEY_RANGE: std::ops::Range<i64> = 100_000..999_999;

/// A shard "is queried" by `[low, high]` iff any of: the shard sits
/// fully inside the request range, the request's low end falls
/// inside the shard, or the request's high end falls inside the
/// shard (spec §4.4's three-way overlap test — deliberately not a
/// simple interval-intersection, see source behaviour notes).
pub fn overlaps(shard: &Arc<ShardRecord>, low: i64, high: i64) -> bool {
    let (s_low, s_high) = (shard.stud_id_low, shard.high());
    (s_low >= low && s_high <= high) || (low >= s_low && low <= s_high) || (high >= s_low && high <= s_high)
}
