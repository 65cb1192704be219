// Copyright 2021 TiKV Project Authors. Licensed under Apache-2.0.

//! Dual-indexed cache of region placement and store addresses.
//!
//! Regions are indexed by end key (for key lookup) and by version id (for
//! dispatch); both indices live under one readers-writer lock and are
//! updated together. Stores sit behind a plain mutex. PD is only ever
//! called with no cache lock held.

use crate::{
    backoff::{BackoffReason, Backoffer},
    pd::PdClient,
    region::{KeyLocation, Region, RegionVerId, RpcContext, Store},
};
use log::info;
use rangekv_common::{Error, Result};
use rangekv_proto::{errorpb, metapb};
use std::{
    collections::{BTreeMap, HashMap},
    ops::Bound,
    sync::{Arc, Mutex, RwLock},
};

#[derive(Default)]
struct RegionIndex {
    /// Sorted by end key. An empty end key sorts first here but stands for
    /// the greatest key; `search_cached_region` compensates.
    by_end_key: BTreeMap<Vec<u8>, Arc<Region>>,
    by_ver_id: HashMap<RegionVerId, Arc<Region>>,
}

pub struct RegionCache<PdC: PdClient> {
    regions: RwLock<RegionIndex>,
    stores: Mutex<HashMap<u64, Store>>,
    pd_client: Arc<PdC>,
    learner_key: String,
    learner_value: String,
}

impl<PdC: PdClient> RegionCache<PdC> {
    pub fn new(pd_client: Arc<PdC>, learner_key: String, learner_value: String) -> RegionCache<PdC> {
        RegionCache {
            regions: RwLock::new(RegionIndex::default()),
            stores: Mutex::new(HashMap::new()),
            pd_client,
            learner_key,
            learner_value,
        }
    }

    /// Resolves `key` to the cached region covering it, loading from PD on
    /// a miss.
    pub async fn locate_key(&self, bo: &mut Backoffer, key: &[u8]) -> Result<KeyLocation> {
        if let Some(region) = self.search_cached_region(key) {
            return Ok(KeyLocation::new(
                region.ver_id(),
                region.start_key().to_vec(),
                region.end_key().to_vec(),
            ));
        }
        let region = self.load_region_by_key(bo, key).await?;
        let location = KeyLocation::new(
            region.ver_id(),
            region.start_key().to_vec(),
            region.end_key().to_vec(),
        );
        self.insert_region_to_cache(region);
        Ok(location)
    }

    /// Fetches the region for a version id, loading by numeric id on a
    /// miss. After an epoch change the loaded region may carry a newer
    /// version than the one asked for; callers send with the fresh meta.
    pub async fn get_region_by_id(&self, bo: &mut Backoffer, id: &RegionVerId) -> Result<Arc<Region>> {
        let cached = self.regions.read().unwrap().by_ver_id.get(id).cloned();
        if let Some(region) = cached {
            return Ok(region);
        }
        let region = self.load_region_by_id(bo, id.id).await?;
        Ok(self.insert_region_to_cache(region))
    }

    /// Builds the context for one RPC attempt: region meta, target peer and
    /// the peer's store address. A store without an address is not ready to
    /// serve; both the region and the store are evicted and the lookup
    /// retried under the region-miss cadence.
    pub async fn get_rpc_context(&self, bo: &mut Backoffer, id: &RegionVerId) -> Result<RpcContext> {
        loop {
            let region = self.get_region_by_id(bo, id).await?;
            let peer = region.peer.clone();
            let store = self.get_store(bo, peer.store_id).await?;
            if store.addr.is_empty() {
                self.drop_region(id);
                self.drop_store(peer.store_id);
                bo.backoff(
                    BackoffReason::RegionMiss,
                    Error::StoreNotReady {
                        store_id: peer.store_id,
                    },
                )
                .await?;
                continue;
            }
            return Ok(RpcContext::new(id.clone(), region.meta.clone(), peer, store.addr));
        }
    }

    /// Points the region's target peer at the store the server named as
    /// leader. A leader on a store the region has no peer on means the
    /// cached peer set is stale; the region is dropped instead.
    pub async fn update_leader(
        &self,
        bo: &mut Backoffer,
        id: &RegionVerId,
        leader_store_id: u64,
    ) -> Result<()> {
        let region = self.get_region_by_id(bo, id).await?;
        match region.switch_peer(leader_store_id) {
            Some(updated) => {
                self.insert_region_to_cache(updated);
            }
            None => self.drop_region(id),
        }
        Ok(())
    }

    /// Removes the region from both indices. Idempotent.
    pub fn drop_region(&self, id: &RegionVerId) {
        let mut regions = self.regions.write().unwrap();
        if let Some(region) = regions.by_ver_id.remove(id) {
            let same_entry = regions
                .by_end_key
                .get(region.end_key())
                .map(|cached| cached.ver_id() == *id)
                .unwrap_or(false);
            if same_entry {
                regions.by_end_key.remove(region.end_key());
            }
            info!("drop region {} from cache", id.id);
        }
    }

    /// Removes the store from the store cache. Idempotent; cached regions
    /// referencing it re-resolve the store lazily on next use.
    pub fn drop_store(&self, store_id: u64) {
        if self.stores.lock().unwrap().remove(&store_id).is_some() {
            info!("drop store {} from cache", store_id);
        }
    }

    /// A request to the store never produced a response; neither the
    /// region placement nor the store address can be trusted.
    pub fn on_send_req_fail(&self, ctx: &RpcContext, cause: &Error) {
        info!(
            "request to store {} failed, invalidating region {}: {}",
            ctx.peer.store_id, ctx.region.id, cause
        );
        self.drop_region(&ctx.region);
        self.drop_store(ctx.peer.store_id);
    }

    /// The server reported our epoch stale and supplied the authoritative
    /// regions now covering the range. The stale entry is dropped and every
    /// replacement inserted, keeping the last-known leader store where the
    /// new peer set allows it.
    pub async fn on_region_stale(
        &self,
        bo: &mut Backoffer,
        ctx: &RpcContext,
        stale_epoch: &errorpb::EpochNotMatch,
    ) -> Result<()> {
        self.drop_region(&ctx.region);
        for meta in &stale_epoch.current_regions {
            let peer = match meta.peers.first() {
                Some(peer) => peer.clone(),
                None => continue,
            };
            let learners = self.select_learner(bo, meta).await?;
            let region = Region::new(meta.clone(), peer, learners);
            let region = region.switch_peer(ctx.peer.store_id).unwrap_or(region);
            self.insert_region_to_cache(region);
        }
        Ok(())
    }

    /// Buckets an ordered key sequence by the region covering each key,
    /// locating once per run of keys sharing a region. Also returns the
    /// first key's region so callers can keep the leading bucket first.
    pub async fn group_keys_by_region(
        &self,
        bo: &mut Backoffer,
        keys: &[Vec<u8>],
    ) -> Result<(HashMap<RegionVerId, Vec<Vec<u8>>>, RegionVerId)> {
        let mut groups: HashMap<RegionVerId, Vec<Vec<u8>>> = HashMap::new();
        let mut first = RegionVerId::default();
        let mut loc = KeyLocation::default();
        for (i, key) in keys.iter().enumerate() {
            if i == 0 || !loc.contains(key) {
                loc = self.locate_key(bo, key).await?;
                if i == 0 {
                    first = loc.region.clone();
                }
            }
            groups.entry(loc.region.clone()).or_default().push(key.clone());
        }
        Ok((groups, first))
    }

    pub async fn get_store(&self, bo: &mut Backoffer, id: u64) -> Result<Store> {
        let cached = self.stores.lock().unwrap().get(&id).cloned();
        if let Some(store) = cached {
            return Ok(store);
        }
        self.reload_store(bo, id).await
    }

    async fn reload_store(&self, bo: &mut Backoffer, id: u64) -> Result<Store> {
        let meta = self.load_store(bo, id).await?;
        let labels = meta
            .labels
            .iter()
            .map(|label| (label.key.clone(), label.value.clone()))
            .collect();
        let store = Store::new(id, meta.address, meta.peer_address, labels);
        // A concurrent drop_store may interleave here; last writer wins.
        self.stores.lock().unwrap().insert(id, store.clone());
        Ok(store)
    }

    async fn load_store(&self, bo: &mut Backoffer, id: u64) -> Result<metapb::Store> {
        loop {
            match self.pd_client.get_store(id).await {
                Ok(store) => return Ok(store),
                Err(e) => bo.backoff(BackoffReason::PdRpc, e).await?,
            }
        }
    }

    async fn load_region_by_key(&self, bo: &mut Backoffer, key: &[u8]) -> Result<Region> {
        loop {
            match self.pd_client.get_region_by_key(key).await {
                Ok((meta, leader)) => {
                    if meta.id == 0 {
                        return Err(Error::RegionUnavailable(format!(
                            "no region for key {:?}",
                            key
                        )));
                    }
                    return self.new_region(bo, meta, leader).await;
                }
                Err(e) => bo.backoff(BackoffReason::PdRpc, e).await?,
            }
        }
    }

    async fn load_region_by_id(&self, bo: &mut Backoffer, region_id: u64) -> Result<Region> {
        loop {
            match self.pd_client.get_region_by_id(region_id).await {
                Ok((meta, leader)) => {
                    if meta.id == 0 {
                        return Err(Error::RegionUnavailable(format!(
                            "no region with id {}",
                            region_id
                        )));
                    }
                    return self.new_region(bo, meta, leader).await;
                }
                Err(e) => bo.backoff(BackoffReason::PdRpc, e).await?,
            }
        }
    }

    /// Peer 0 is the provisional target until PD's leader hint, when
    /// present, switches it.
    async fn new_region(
        &self,
        bo: &mut Backoffer,
        meta: metapb::Region,
        leader: Option<metapb::Peer>,
    ) -> Result<Region> {
        let peer = meta.peers.first().cloned().ok_or_else(|| {
            Error::RegionUnavailable(format!("region {} has no peer", meta.id))
        })?;
        let learners = self.select_learner(bo, &meta).await?;
        let mut region = Region::new(meta, peer, learners);
        if let Some(leader) = leader {
            if let Some(switched) = region.switch_peer(leader.store_id) {
                region = switched;
            }
        }
        Ok(region)
    }

    /// Learner peers whose store carries the configured label. A store
    /// without the label counts as labelled with the empty string.
    async fn select_learner(
        &self,
        bo: &mut Backoffer,
        meta: &metapb::Region,
    ) -> Result<Vec<metapb::Peer>> {
        let mut learners = Vec::new();
        for peer in &meta.peers {
            if !peer.is_learner {
                continue;
            }
            let store = self.get_store(bo, peer.store_id).await?;
            let label = store
                .labels
                .get(&self.learner_key)
                .map(String::as_str)
                .unwrap_or("");
            if label == self.learner_value {
                learners.push(peer.clone());
            }
        }
        Ok(learners)
    }

    /// Strict upper bound on `key` in the end-key index, falling back to
    /// the first entry because an empty end key sorts first while standing
    /// for the greatest key.
    fn search_cached_region(&self, key: &[u8]) -> Option<Arc<Region>> {
        let regions = self.regions.read().unwrap();
        if let Some((_, region)) = regions
            .by_end_key
            .range((Bound::Excluded(key.to_vec()), Bound::Unbounded))
            .next()
        {
            if region.contains(key) {
                return Some(region.clone());
            }
        }
        if let Some((_, region)) = regions.by_end_key.iter().next() {
            if region.contains(key) {
                return Some(region.clone());
            }
        }
        None
    }

    /// Inserts into both indices, first evicting every cached region whose
    /// range intersects the incoming one; a stale survivor would let
    /// `locate_key` hand out a range the new region now owns.
    fn insert_region_to_cache(&self, region: Region) -> Arc<Region> {
        let region = Arc::new(region);
        let mut regions = self.regions.write().unwrap();
        let stale: Vec<Arc<Region>> = regions
            .by_end_key
            .values()
            .filter(|cached| ranges_overlap(cached, &region))
            .cloned()
            .collect();
        for old in stale {
            regions.by_ver_id.remove(&old.ver_id());
            regions.by_end_key.remove(old.end_key());
        }
        regions
            .by_end_key
            .insert(region.end_key().to_vec(), region.clone());
        regions.by_ver_id.insert(region.ver_id(), region.clone());
        region
    }
}

fn ranges_overlap(a: &Region, b: &Region) -> bool {
    let a_ends_after_b_starts = a.end_key().is_empty() || a.end_key() > b.start_key();
    let b_ends_after_a_starts = b.end_key().is_empty() || b.end_key() > a.start_key();
    a_ends_after_b_starts && b_ends_after_a_starts
}
