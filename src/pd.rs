// Copyright 2021 TiKV Project Authors. Licensed under Apache-2.0.

use async_trait::async_trait;
use rangekv_common::Result;
use rangekv_proto::metapb;

/// The placement driver contract this crate consumes. Implementations wrap
/// the PD wire client; tests substitute an in-memory one.
///
/// Region lookups also return the leader peer when PD knows it. A returned
/// meta that is uninitialized (`id == 0`) means the region is gone.
#[async_trait]
pub trait PdClient: Send + Sync + 'static {
    async fn get_region_by_key(&self, key: &[u8])
        -> Result<(metapb::Region, Option<metapb::Peer>)>;

    async fn get_region_by_id(
        &self,
        region_id: u64,
    ) -> Result<(metapb::Region, Option<metapb::Peer>)>;

    async fn get_store(&self, store_id: u64) -> Result<metapb::Store>;

    async fn get_gc_safe_point(&self) -> Result<u64>;
}
