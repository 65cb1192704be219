// Copyright 2021 TiKV Project Authors. Licensed under Apache-2.0.

//! The seam between region routing and the storage-node transport.
//!
//! A transport (gRPC in production, a hook-driven mock in tests) implements
//! [`KvClient`] for one store connection and [`KvConnect`] as the
//! address-to-connection factory. Requests go through the object-safe
//! [`Request`] trait so the dispatch loop can stay generic over the kv
//! request type.

pub mod errors;
mod request;

pub use crate::{
    errors::{HasError, HasRegionError},
    request::Request,
};

use async_trait::async_trait;
use rangekv_common::Result;
use rangekv_proto::kvrpcpb;

/// One established connection to a store.
#[async_trait]
pub trait KvClient: Send + Sync + 'static {
    async fn kv_get(&self, req: kvrpcpb::GetRequest) -> Result<kvrpcpb::GetResponse>;

    async fn kv_batch_get(&self, req: kvrpcpb::BatchGetRequest)
        -> Result<kvrpcpb::BatchGetResponse>;

    async fn kv_scan(&self, req: kvrpcpb::ScanRequest) -> Result<kvrpcpb::ScanResponse>;
}

/// Builds (or hands out pooled) connections by store address.
pub trait KvConnect: Sized + Send + Sync + 'static {
    type KvClient: KvClient + Clone + Send + Sync + 'static;

    fn connect(&self, address: &str) -> Result<Self::KvClient>;
}
