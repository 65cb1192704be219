// Copyright 2021 TiKV Project Authors. Licensed under Apache-2.0.

//! Client-side region routing and request dispatch for a distributed
//! key-value store.
//!
//! The store's keyspace is partitioned into regions: contiguous,
//! non-overlapping key ranges replicated across several stores, one peer
//! per region acting as leader. This crate answers, for any user key,
//! which store to talk to, over which connection, and what to do when that
//! answer turns out to be wrong. The [`RegionCache`] maps keys and region
//! versions to replica placement; [`RegionClient`] dispatches one RPC and
//! turns storage-reported errors into cache invalidations; a [`Backoffer`]
//! bounds how long one operation keeps retrying; [`Scanner`] streams
//! ordered pairs across region boundaries.
//!
//! The cache never probes for staleness. Invalidation is driven entirely
//! by authoritative error signals from the servers, so a surviving entry
//! is either currently correct or will be corrected on its next use.

mod backoff;
mod cluster;
#[cfg(test)]
mod mock;
mod pd;
mod region;
mod region_cache;
mod region_client;
mod request;
mod scanner;
mod snapshot;

pub use crate::{
    backoff::{
        Backoff, BackoffReason, Backoffer, BATCH_GET_MAX_BACKOFF_MS, COMMIT_MAX_BACKOFF_MS,
        GET_MAX_BACKOFF_MS, SCAN_MAX_BACKOFF_MS,
    },
    cluster::{Cluster, Config},
    pd::PdClient,
    region::{KeyLocation, Region, RegionVerId, RpcContext, Store},
    region_cache::RegionCache,
    region_client::RegionClient,
    request::KvRequest,
    scanner::Scanner,
    snapshot::Snapshot,
};
pub use rangekv_common::{Error, Result};
