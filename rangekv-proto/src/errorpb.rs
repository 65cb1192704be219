// Copyright 2021 TiKV Project Authors. Licensed under Apache-2.0.

use crate::metapb;

/// Region-level error attached to a kv response. At most one of the kind
/// fields is set; `message` is always populated by the server.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Error {
    #[prost(string, tag = "1")]
    pub message: String,
    #[prost(message, optional, tag = "2")]
    pub not_leader: Option<NotLeader>,
    #[prost(message, optional, tag = "3")]
    pub region_not_found: Option<RegionNotFound>,
    #[prost(message, optional, tag = "4")]
    pub epoch_not_match: Option<EpochNotMatch>,
    #[prost(message, optional, tag = "5")]
    pub server_is_busy: Option<ServerIsBusy>,
    #[prost(message, optional, tag = "6")]
    pub store_not_match: Option<StoreNotMatch>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NotLeader {
    #[prost(uint64, tag = "1")]
    pub region_id: u64,
    /// The current leader if the replying peer knows it.
    #[prost(message, optional, tag = "2")]
    pub leader: Option<metapb::Peer>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegionNotFound {
    #[prost(uint64, tag = "1")]
    pub region_id: u64,
}

/// The client's region epoch is behind. `current_regions` carries the
/// authoritative regions now covering the requested range.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EpochNotMatch {
    #[prost(message, repeated, tag = "1")]
    pub current_regions: Vec<metapb::Region>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServerIsBusy {
    #[prost(string, tag = "1")]
    pub reason: String,
    #[prost(uint64, tag = "2")]
    pub backoff_ms: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StoreNotMatch {
    #[prost(uint64, tag = "1")]
    pub request_store_id: u64,
    #[prost(uint64, tag = "2")]
    pub actual_store_id: u64,
}
