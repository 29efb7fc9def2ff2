// Consistent hash ring for shard replica selection.
// One ring per shard; slots hold the serverID hosting a virtual node,
// or `None` for an empty slot. Hash functions are fixed so that
// placement is reproducible across restarts and implementations.

use serde::Serialize;
use tracing::{trace, warn};

use crate::metadata::ServerId;

/// Number of slots in every shard's ring.
pub const SLOTS: usize = 512;
/// Virtual nodes claimed per server per shard.
pub const K: u32 = 9;

/// `hRequest(i) = i^2 + 2i + 17`
fn hash_request(request_key: i64) -> i64 {
    request_key * request_key + 2 * request_key + 17
}

/// `hVirtual(i,j) = i^2 + j^2 + 2j + 25`
fn hash_virtual(server_id: ServerId, virtual_index: u32) -> i64 {
    let i = server_id;
    let j = virtual_index as i64;
    i * i + j * j + 2 * j + 25
}

fn slot_for(hash: i64) -> usize {
    hash.rem_euclid(SLOTS as i64) as usize
}

/// Fixed-size virtual-node slot table for a single shard.
#[derive(Debug, Clone, Serialize)]
pub struct ConsistentHashMap {
    slots: Vec<Option<ServerId>>,
}

impl ConsistentHashMap {
    /// All slots start empty.
    pub fn new() -> Self {
        Self {
            slots: vec![None; SLOTS],
        }
    }

    /// Place `K` virtual nodes for `server_id`. Earliest virtual-node
    /// indices are placed first; a full probe pass with no empty slot
    /// skips that virtual node entirely.
    pub fn add_server(&mut self, server_id: ServerId) {
        for j in 0..K {
            let start = slot_for(hash_virtual(server_id, j));
            match self.find_empty_from(start) {
                Some(slot) => self.slots[slot] = Some(server_id),
                None => warn!(
                    server_id,
                    virtual_index = j,
                    "ring saturated, dropping virtual node placement"
                ),
            }
        }
        trace!(server_id, "added server to ring");
    }

    /// Remove `server_id`'s virtual nodes. Only slots reachable from a
    /// virtual node's *canonical* position are cleared: the run of
    /// contiguous slots starting there that are still occupied by
    /// `server_id`. A virtual node whose canonical slot was stolen by
    /// another server during `add_server` (due to a probe collision)
    /// leaves nothing to clear. This asymmetry is inherited from the
    /// original implementation and preserved deliberately (see
    /// DESIGN.md / spec §4.1, §9).
    pub fn remove_server(&mut self, server_id: ServerId) {
        for j in 0..K {
            let start = slot_for(hash_virtual(server_id, j));
            if self.slots[start] != Some(server_id) {
                continue;
            }
            let mut slot = start;
            while self.slots[slot] == Some(server_id) {
                self.slots[slot] = None;
                slot = (slot + 1) % SLOTS;
            }
        }
        trace!(server_id, "removed server from ring");
    }

    /// Pick the replica serving `request_key`, or `None` if the ring
    /// has no occupied slots (no replica available).
    pub fn get_server_for_request(&self, request_key: i64) -> Option<ServerId> {
        let start = slot_for(hash_request(request_key));
        self.find_occupied_from(start)
    }

    fn find_empty_from(&self, start: usize) -> Option<usize> {
        for step in 0..SLOTS {
            let slot = (start + step) % SLOTS;
            if self.slots[slot].is_none() {
                return Some(slot);
            }
        }
        None
    }

    fn find_occupied_from(&self, start: usize) -> Option<ServerId> {
        for step in 0..SLOTS {
            let slot = (start + step) % SLOTS;
            if let Some(server_id) = self.slots[slot] {
                return Some(server_id);
            }
        }
        None
    }

    /// Distinct servers currently occupying at least one slot.
    pub fn occupants(&self) -> std::collections::HashSet<ServerId> {
        self.slots.iter().filter_map(|s| *s).collect()
    }
}

impl Default for ConsistentHashMap {
    fn default() -> Self {
        Self::new()
    }
}
