// Copyright 2021 TiKV Project Authors. Licensed under Apache-2.0.

use derive_new::new;
use rangekv_proto::{kvrpcpb, metapb};
use std::collections::HashMap;

/// Identifies a region at one point in its history. `id` is stable across
/// the region's lifetime; `conf_ver` moves on membership changes, `ver` on
/// split/merge, so any change to range or peer set yields a new value.
#[derive(new, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct RegionVerId {
    pub id: u64,
    pub conf_ver: u64,
    pub ver: u64,
}

/// A cached region: its meta, the peer requests are sent to, and the
/// learner peers matching the configured store label. Shared immutably by
/// handle; peer switches build a new value.
#[derive(new, Clone, Debug, PartialEq)]
pub struct Region {
    pub meta: metapb::Region,
    pub peer: metapb::Peer,
    pub learners: Vec<metapb::Peer>,
}

impl Region {
    pub fn start_key(&self) -> &[u8] {
        &self.meta.start_key
    }

    pub fn end_key(&self) -> &[u8] {
        &self.meta.end_key
    }

    /// `start_key <= key < end_key`, an empty end key standing for +inf.
    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start_key() && (key < self.end_key() || self.meta.end_key.is_empty())
    }

    pub fn ver_id(&self) -> RegionVerId {
        let epoch = self.meta.region_epoch.clone().unwrap_or_default();
        RegionVerId::new(self.meta.id, epoch.conf_ver, epoch.version)
    }

    /// Retargets the region at the peer living on `store_id`, or `None`
    /// when no peer lives there.
    pub fn switch_peer(&self, store_id: u64) -> Option<Region> {
        self.meta
            .peers
            .iter()
            .find(|peer| peer.store_id == store_id)
            .map(|peer| Region {
                peer: peer.clone(),
                ..self.clone()
            })
    }
}

/// A resolved lookup: the region version covering a key and the range it
/// covered at resolution time. A snapshot; it may go stale.
#[derive(new, Clone, Debug, Default, PartialEq)]
pub struct KeyLocation {
    pub region: RegionVerId,
    pub start_key: Vec<u8>,
    pub end_key: Vec<u8>,
}

impl KeyLocation {
    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start_key.as_slice()
            && (key < self.end_key.as_slice() || self.end_key.is_empty())
    }
}

/// Everything one RPC attempt needs. Immutable once built and rebuilt from
/// the cache on every attempt.
#[derive(new, Clone, Debug)]
pub struct RpcContext {
    pub region: RegionVerId,
    pub meta: metapb::Region,
    pub peer: metapb::Peer,
    pub addr: String,
}

impl RpcContext {
    /// The routing block sent with the request. Epoch fields come from the
    /// cached meta, so they are exactly what the cache believed at send
    /// time.
    pub fn request_context(&self) -> kvrpcpb::Context {
        kvrpcpb::Context {
            region_id: self.meta.id,
            region_epoch: self.meta.region_epoch.clone(),
            peer: Some(self.peer.clone()),
            priority: kvrpcpb::CommandPri::Normal as i32,
            not_fill_cache: false,
        }
    }
}

/// Client-side view of a storage node.
#[derive(new, Clone, Debug)]
pub struct Store {
    pub id: u64,
    pub addr: String,
    pub peer_addr: String,
    pub labels: HashMap<String, String>,
}
