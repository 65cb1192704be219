// Copyright 2021 TiKV Project Authors. Licensed under Apache-2.0.

//! Wire message types shared by the client and the storage nodes.
//!
//! These are hand-maintained prost structs rather than generated stubs; the
//! gRPC service definitions live with the transport implementations, which
//! consume these messages as-is.

pub mod errorpb;
pub mod kvrpcpb;
pub mod metapb;
