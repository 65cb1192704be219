// Copyright 2021 TiKV Project Authors. Licensed under Apache-2.0.

use rangekv_common::Error;
use rangekv_proto::{errorpb, kvrpcpb};

/// A response the server may have attached a region-level error to.
/// Taking the error consumes it from the message.
pub trait HasRegionError {
    fn region_error(&mut self) -> Option<errorpb::Error>;
}

/// A response that may carry per-key errors (locks, aborts) besides the
/// region error.
pub trait HasError: HasRegionError {
    fn error(&mut self) -> Option<Error>;
}

fn extract_key_error(key_error: kvrpcpb::KeyError) -> Error {
    match key_error.locked {
        Some(lock) => Error::KeyLocked(lock),
        None => Error::KeyError(Box::new(key_error)),
    }
}

macro_rules! has_region_error {
    ($type:ty) => {
        impl HasRegionError for $type {
            fn region_error(&mut self) -> Option<errorpb::Error> {
                self.region_error.take()
            }
        }
    };
}

has_region_error!(kvrpcpb::GetResponse);
has_region_error!(kvrpcpb::BatchGetResponse);
has_region_error!(kvrpcpb::ScanResponse);

impl HasError for kvrpcpb::GetResponse {
    fn error(&mut self) -> Option<Error> {
        self.error.take().map(extract_key_error)
    }
}

macro_rules! has_pair_errors {
    ($type:ty) => {
        impl HasError for $type {
            fn error(&mut self) -> Option<Error> {
                self.pairs
                    .iter_mut()
                    .find_map(|pair| pair.error.take())
                    .map(extract_key_error)
            }
        }
    };
}

has_pair_errors!(kvrpcpb::BatchGetResponse);
has_pair_errors!(kvrpcpb::ScanResponse);
