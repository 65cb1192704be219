// Copyright 2021 TiKV Project Authors. Licensed under Apache-2.0.

use crate::{
    backoff::{BackoffReason, Backoffer, BATCH_GET_MAX_BACKOFF_MS, GET_MAX_BACKOFF_MS},
    cluster::Cluster,
    pd::PdClient,
    region::RegionVerId,
    region_client::{is_routing_error, RegionClient},
    scanner::Scanner,
};
use rangekv_common::Result;
use rangekv_proto::kvrpcpb;
use rangekv_store::KvConnect;
use std::sync::Arc;

/// A read-only view of the store at a fixed transactional version.
pub struct Snapshot<PdC: PdClient, Kv: KvConnect> {
    pub(crate) cluster: Arc<Cluster<PdC, Kv>>,
    pub version: u64,
}

impl<PdC: PdClient, Kv: KvConnect> Clone for Snapshot<PdC, Kv> {
    fn clone(&self) -> Snapshot<PdC, Kv> {
        Snapshot {
            cluster: self.cluster.clone(),
            version: self.version,
        }
    }
}

impl<PdC: PdClient, Kv: KvConnect> Snapshot<PdC, Kv> {
    pub fn new(cluster: Arc<Cluster<PdC, Kv>>, version: u64) -> Snapshot<PdC, Kv> {
        Snapshot { cluster, version }
    }

    /// Point read. `None` when the key does not exist at this version.
    pub async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut bo = Backoffer::new(GET_MAX_BACKOFF_MS);
        loop {
            let loc = self.cluster.region_cache.locate_key(&mut bo, key).await?;
            let req = kvrpcpb::GetRequest {
                key: key.to_vec(),
                version: self.version,
                ..Default::default()
            };
            let client = RegionClient::new(self.cluster.clone(), loc.region.clone());
            match client.send_req_to_region(&mut bo, req).await {
                Ok(resp) => {
                    return Ok(if resp.not_found { None } else { Some(resp.value) });
                }
                Err(e) if is_routing_error(&e) => {
                    self.cluster.region_cache.drop_region(&loc.region);
                    bo.backoff(BackoffReason::RegionMiss, e).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Multi-key point read. Keys are bucketed by region and fetched one
    /// bucket per RPC, the first key's bucket first; buckets hit by a
    /// routing error are re-bucketed and retried within the same budget.
    pub async fn batch_get(&self, keys: &[Vec<u8>]) -> Result<Vec<kvrpcpb::KvPair>> {
        let mut bo = Backoffer::new(BATCH_GET_MAX_BACKOFF_MS);
        let mut pending = keys.to_vec();
        let mut pairs = Vec::new();
        while !pending.is_empty() {
            let (mut groups, first) = self
                .cluster
                .region_cache
                .group_keys_by_region(&mut bo, &pending)
                .await?;
            let mut ordered: Vec<(RegionVerId, Vec<Vec<u8>>)> = Vec::with_capacity(groups.len());
            if let Some(first_keys) = groups.remove(&first) {
                ordered.push((first, first_keys));
            }
            ordered.extend(groups.into_iter());

            let mut retry = Vec::new();
            for (region, group_keys) in ordered {
                let req = kvrpcpb::BatchGetRequest {
                    keys: group_keys.clone(),
                    version: self.version,
                    ..Default::default()
                };
                let client = RegionClient::new(self.cluster.clone(), region.clone());
                match client.send_req_to_region(&mut bo, req).await {
                    Ok(resp) => pairs.extend(resp.pairs),
                    Err(e) if is_routing_error(&e) => {
                        self.cluster.region_cache.drop_region(&region);
                        bo.backoff(BackoffReason::RegionMiss, e).await?;
                        retry.extend(group_keys);
                    }
                    Err(e) => return Err(e),
                }
            }
            pending = retry;
        }
        Ok(pairs)
    }

    /// Ordered iteration over `[begin, end)`; an empty `end` scans to the
    /// end of the keyspace.
    pub async fn scan(&self, begin: &[u8], end: &[u8]) -> Result<Scanner<PdC, Kv>> {
        Scanner::new(
            self.clone(),
            begin.to_vec(),
            end.to_vec(),
            self.cluster.config.scan_batch_size,
        )
        .await
    }
}
