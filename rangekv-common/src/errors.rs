// Copyright 2021 TiKV Project Authors. Licensed under Apache-2.0.

use rangekv_proto::kvrpcpb;
use thiserror::Error;

/// Every failure the routing and dispatch layers can surface.
///
/// Routing-local conditions (`NotLeader`, `StoreNotReady`, ...) are normally
/// consumed in place by the retry loops and only escape wrapped in
/// `BackoffExceeded`; the variants that change what key maps where
/// (`EpochNotMatch`) or need a higher layer (`KeyLocked`) always escape.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport failure talking to the placement driver.
    #[error("pd request failed: {0}")]
    PdRpc(String),
    /// PD replied, but with a meta that cannot be routed to (uninitialized
    /// or peerless).
    #[error("region unavailable: {0}")]
    RegionUnavailable(String),
    /// The store is known to PD but has no client-facing address yet.
    #[error("store {store_id} is not ready")]
    StoreNotReady { store_id: u64 },
    /// Transport failure talking to a storage node.
    #[error("kv rpc to {address} failed: {message}")]
    KvRpc { address: String, message: String },
    #[error("peer on store {store_id} is no longer leader of region {region_id}")]
    NotLeader { region_id: u64, store_id: u64 },
    /// The cached epoch is behind the server's. The stale entry has been
    /// replaced; callers must re-resolve their keys.
    #[error("region {region_id} epoch not match")]
    EpochNotMatch { region_id: u64 },
    #[error("region {region_id} not found")]
    RegionNotFound { region_id: u64 },
    #[error("store does not match, request store id is {request_store_id}, actual is {actual_store_id}")]
    StoreNotMatch {
        request_store_id: u64,
        actual_store_id: u64,
    },
    #[error("server is busy: {reason}")]
    ServerIsBusy { reason: String },
    /// The key is locked by an in-flight transaction; the transactional
    /// layer resolves the lock.
    #[error("key is locked by {}", hex_repr(&.0.primary_lock))]
    KeyLocked(kvrpcpb::LockInfo),
    /// A per-key error that is not a lock.
    #[error("key error: retryable {}, abort {}", .0.retryable, .0.abort)]
    KeyError(Box<kvrpcpb::KeyError>),
    /// The operation's retry time budget ran out; carries the error that
    /// triggered the final backoff.
    #[error("backoff limit exceeded")]
    BackoffExceeded(#[source] Box<Error>),
    /// API misuse, e.g. advancing an invalid scanner.
    #[error("logical error: {0}")]
    Logical(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

fn hex_repr(key: &[u8]) -> String {
    key.iter().map(|b| format!("{:02X}", b)).collect()
}
