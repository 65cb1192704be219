// Copyright 2021 TiKV Project Authors. Licensed under Apache-2.0.

/// A contiguous key range `[start_key, end_key)` replicated across several
/// stores. An empty `end_key` stands for "up to +inf".
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Region {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(bytes, tag = "2")]
    pub start_key: Vec<u8>,
    #[prost(bytes, tag = "3")]
    pub end_key: Vec<u8>,
    #[prost(message, optional, tag = "4")]
    pub region_epoch: Option<RegionEpoch>,
    #[prost(message, repeated, tag = "5")]
    pub peers: Vec<Peer>,
}

/// `conf_ver` increments on peer membership changes, `version` on
/// split/merge. Together with the region id they identify one region at a
/// point in its history.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegionEpoch {
    #[prost(uint64, tag = "1")]
    pub conf_ver: u64,
    #[prost(uint64, tag = "2")]
    pub version: u64,
}

/// One replica of a region on one store.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Peer {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(uint64, tag = "2")]
    pub store_id: u64,
    #[prost(bool, tag = "3")]
    pub is_learner: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Store {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    /// Address the client dials for kv RPCs.
    #[prost(string, tag = "2")]
    pub address: String,
    /// Address other stores dial for replication traffic.
    #[prost(string, tag = "3")]
    pub peer_address: String,
    #[prost(message, repeated, tag = "4")]
    pub labels: Vec<StoreLabel>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StoreLabel {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(string, tag = "2")]
    pub value: String,
}
