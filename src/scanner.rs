// Copyright 2021 TiKV Project Authors. Licensed under Apache-2.0.

use crate::{
    backoff::{BackoffReason, Backoffer, SCAN_MAX_BACKOFF_MS},
    pd::PdClient,
    region_client::{is_routing_error, RegionClient},
    snapshot::Snapshot,
};
use log::debug;
use rangekv_common::{Error, Result};
use rangekv_proto::kvrpcpb;
use rangekv_store::KvConnect;

/// The smallest key strictly greater than `key` in byte order, computed by
/// bumping the last byte and dropping bytes that wrap. All-0xff input
/// yields the empty key, the "+inf" sentinel.
pub(crate) fn prefix_next(key: &[u8]) -> Vec<u8> {
    let mut next = key.to_vec();
    while let Some(last) = next.last_mut() {
        *last = last.wrapping_add(1);
        if *last != 0 {
            return next;
        }
        next.pop();
    }
    next
}

/// Streams ordered key/value pairs over `[begin, end)` (empty `end` scans
/// to the end of the keyspace) at the snapshot's version, one bounded
/// batch per storage RPC, stitched across region boundaries.
///
/// ```ignore
/// let mut scanner = snapshot.scan(b"a", b"z").await?;
/// while scanner.valid() {
///     consume(scanner.key(), scanner.value());
///     scanner.next().await?;
/// }
/// ```
pub struct Scanner<PdC: PdClient, Kv: KvConnect> {
    snapshot: Snapshot<PdC, Kv>,
    next_start_key: Vec<u8>,
    end_key: Vec<u8>,
    batch_size: u32,
    cache: Vec<kvrpcpb::KvPair>,
    idx: usize,
    eof: bool,
    valid: bool,
}

impl<PdC: PdClient, Kv: KvConnect> Scanner<PdC, Kv> {
    /// Builds the scanner positioned on the first pair (or already
    /// invalid when the range is empty).
    pub(crate) async fn new(
        snapshot: Snapshot<PdC, Kv>,
        start_key: Vec<u8>,
        end_key: Vec<u8>,
        batch_size: u32,
    ) -> Result<Scanner<PdC, Kv>> {
        let mut scanner = Scanner {
            snapshot,
            next_start_key: start_key,
            end_key,
            batch_size,
            cache: Vec::new(),
            idx: 0,
            eof: false,
            valid: true,
        };
        scanner.next().await?;
        Ok(scanner)
    }

    pub fn valid(&self) -> bool {
        self.valid
    }

    /// Only meaningful while `valid()`; empty otherwise.
    pub fn key(&self) -> &[u8] {
        self.current().map(|pair| pair.key.as_slice()).unwrap_or(&[])
    }

    /// Only meaningful while `valid()`; empty otherwise.
    pub fn value(&self) -> &[u8] {
        self.current()
            .map(|pair| pair.value.as_slice())
            .unwrap_or(&[])
    }

    fn current(&self) -> Option<&kvrpcpb::KvPair> {
        if self.valid {
            self.cache.get(self.idx)
        } else {
            None
        }
    }

    /// Advances to the following pair, refilling from the next batch or
    /// region as needed. Fails with [`Error::Logical`] once the scanner is
    /// invalid.
    pub async fn next(&mut self) -> Result<()> {
        if !self.valid {
            return Err(Error::Logical("the scanner is invalid".to_owned()));
        }
        let mut bo = Backoffer::new(SCAN_MAX_BACKOFF_MS);
        loop {
            self.idx += 1;
            if self.idx >= self.cache.len() {
                if self.eof {
                    self.valid = false;
                    return Ok(());
                }
                self.get_data(&mut bo).await?;
                if self.idx >= self.cache.len() {
                    continue;
                }
            }
            if !self.end_key.is_empty() && self.cache[self.idx].key.as_slice() >= self.end_key.as_slice() {
                self.eof = true;
                self.valid = false;
            }
            return Ok(());
        }
    }

    /// Fetches one batch. The request never spans regions: its end is
    /// clipped to the located region's end when the scan bound lies
    /// beyond it.
    async fn get_data(&mut self, bo: &mut Backoffer) -> Result<()> {
        debug!("refill scan batch from {:?}", self.next_start_key);
        loop {
            let loc = self
                .snapshot
                .cluster
                .region_cache
                .locate_key(bo, &self.next_start_key)
                .await?;
            let mut req_end_key = self.end_key.clone();
            if !req_end_key.is_empty() && !loc.end_key.is_empty() && loc.end_key < req_end_key {
                req_end_key = loc.end_key.clone();
            }
            let req = kvrpcpb::ScanRequest {
                start_key: self.next_start_key.clone(),
                end_key: req_end_key,
                limit: self.batch_size,
                version: self.snapshot.version,
                key_only: false,
                ..Default::default()
            };
            let client = RegionClient::new(self.snapshot.cluster.clone(), loc.region.clone());
            let resp = match client.send_req_to_region(bo, req).await {
                Ok(resp) => resp,
                Err(e) if is_routing_error(&e) => {
                    bo.backoff(BackoffReason::RegionMiss, e).await?;
                    continue;
                }
                Err(e) => return Err(e),
            };
            self.idx = 0;
            self.cache = resp.pairs;
            debug!("scan batch of {} pairs", self.cache.len());

            if self.cache.len() < self.batch_size as usize {
                // The region is drained; continue from its end, unless the
                // keyspace or the requested range is exhausted.
                self.next_start_key = loc.end_key.clone();
                if loc.end_key.is_empty()
                    || (!self.end_key.is_empty() && self.next_start_key >= self.end_key)
                {
                    self.eof = true;
                }
                return Ok(());
            }
            if let Some(last) = self.cache.last() {
                self.next_start_key = prefix_next(&last.key);
            }
            return Ok(());
        }
    }
}
