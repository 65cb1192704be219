// Copyright 2021 TiKV Project Authors. Licensed under Apache-2.0.

use rangekv_proto::kvrpcpb;
use rangekv_store::{HasError, Request};

/// Binds a request message to its typed response so the dispatch loop can
/// recover the concrete type behind [`Request::dispatch`]'s erasure.
pub trait KvRequest: Request + Clone + Sync + Send + 'static {
    type Response: HasError + Sync + Send + 'static;
}

impl KvRequest for kvrpcpb::GetRequest {
    type Response = kvrpcpb::GetResponse;
}

impl KvRequest for kvrpcpb::BatchGetRequest {
    type Response = kvrpcpb::BatchGetResponse;
}

impl KvRequest for kvrpcpb::ScanRequest {
    type Response = kvrpcpb::ScanResponse;
}
