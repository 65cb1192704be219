// Copyright 2021 TiKV Project Authors. Licensed under Apache-2.0.

//! In-memory PD and kv transport for tests: fully controllable responses
//! with call counters, so tests can assert not just results but how the
//! cache and dispatch loops got there.

use crate::pd::PdClient;
use async_trait::async_trait;
use rangekv_common::{Error, Result};
use rangekv_proto::{kvrpcpb, metapb};
use rangekv_store::{KvClient, KvConnect};
use std::{
    any::Any,
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

pub type DispatchHook = dyn Fn(&str, &dyn Any) -> Result<Box<dyn Any>> + Send + Sync;

/// A "connection" that forwards every request to the test's dispatch hook
/// along with the address it was connected to.
#[derive(Clone)]
pub struct MockKvClient {
    pub addr: String,
    dispatch: Arc<DispatchHook>,
}

impl MockKvClient {
    fn route<Resp: 'static>(&self, req: &dyn Any) -> Result<Resp> {
        let resp = (self.dispatch)(&self.addr, req)?;
        resp.downcast::<Resp>().map(|resp| *resp).map_err(|_| {
            Error::Internal("dispatch hook returned an unexpected response type".to_owned())
        })
    }
}

#[async_trait]
impl KvClient for MockKvClient {
    async fn kv_get(&self, req: kvrpcpb::GetRequest) -> Result<kvrpcpb::GetResponse> {
        self.route(&req)
    }

    async fn kv_batch_get(
        &self,
        req: kvrpcpb::BatchGetRequest,
    ) -> Result<kvrpcpb::BatchGetResponse> {
        self.route(&req)
    }

    async fn kv_scan(&self, req: kvrpcpb::ScanRequest) -> Result<kvrpcpb::ScanResponse> {
        self.route(&req)
    }
}

pub struct MockKvConnect {
    dispatch: Arc<DispatchHook>,
    pub connect_count: AtomicUsize,
}

impl MockKvConnect {
    pub fn with_dispatch_hook<F>(dispatch: F) -> MockKvConnect
    where
        F: Fn(&str, &dyn Any) -> Result<Box<dyn Any>> + Send + Sync + 'static,
    {
        MockKvConnect {
            dispatch: Arc::new(dispatch),
            connect_count: AtomicUsize::new(0),
        }
    }
}

impl KvConnect for MockKvConnect {
    type KvClient = MockKvClient;

    fn connect(&self, address: &str) -> Result<MockKvClient> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        Ok(MockKvClient {
            addr: address.to_owned(),
            dispatch: self.dispatch.clone(),
        })
    }
}

/// In-memory placement driver. Region metas are authoritative; lookups
/// count PD traffic and `unreachable` simulates an outage.
pub struct MockPdClient {
    regions: Mutex<Vec<(metapb::Region, Option<metapb::Peer>)>>,
    stores: Mutex<HashMap<u64, metapb::Store>>,
    pub get_region_count: AtomicUsize,
    pub get_store_count: AtomicUsize,
    pub unreachable: AtomicBool,
    pub safe_point: AtomicU64,
}

impl MockPdClient {
    pub fn new() -> MockPdClient {
        MockPdClient::with_regions(Vec::new())
    }

    pub fn with_regions(regions: Vec<(metapb::Region, Option<metapb::Peer>)>) -> MockPdClient {
        MockPdClient {
            regions: Mutex::new(regions),
            stores: Mutex::new(HashMap::new()),
            get_region_count: AtomicUsize::new(0),
            get_store_count: AtomicUsize::new(0),
            unreachable: AtomicBool::new(false),
            safe_point: AtomicU64::new(0),
        }
    }

    pub fn put_store(&self, store: metapb::Store) {
        self.stores.lock().unwrap().insert(store.id, store);
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(Error::PdRpc("mock pd is unreachable".to_owned()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PdClient for MockPdClient {
    async fn get_region_by_key(
        &self,
        key: &[u8],
    ) -> Result<(metapb::Region, Option<metapb::Peer>)> {
        self.get_region_count.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        let regions = self.regions.lock().unwrap();
        for (meta, leader) in regions.iter() {
            if meta_contains(meta, key) {
                return Ok((meta.clone(), leader.clone()));
            }
        }
        // The uninitialized meta stands for "no such region".
        Ok((metapb::Region::default(), None))
    }

    async fn get_region_by_id(
        &self,
        region_id: u64,
    ) -> Result<(metapb::Region, Option<metapb::Peer>)> {
        self.get_region_count.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        let regions = self.regions.lock().unwrap();
        for (meta, leader) in regions.iter() {
            if meta.id == region_id {
                return Ok((meta.clone(), leader.clone()));
            }
        }
        Ok((metapb::Region::default(), None))
    }

    async fn get_store(&self, store_id: u64) -> Result<metapb::Store> {
        self.get_store_count.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        self.stores
            .lock()
            .unwrap()
            .get(&store_id)
            .cloned()
            .ok_or_else(|| Error::PdRpc(format!("mock pd has no store {}", store_id)))
    }

    async fn get_gc_safe_point(&self) -> Result<u64> {
        self.check_reachable()?;
        Ok(self.safe_point.load(Ordering::SeqCst))
    }
}

fn meta_contains(meta: &metapb::Region, key: &[u8]) -> bool {
    key >= meta.start_key.as_slice()
        && (key < meta.end_key.as_slice() || meta.end_key.is_empty())
}

/// A voter-only region meta with one peer per store.
pub fn region(id: u64, start: &[u8], end: &[u8], version: u64, store_ids: &[u64]) -> metapb::Region {
    metapb::Region {
        id,
        start_key: start.to_vec(),
        end_key: end.to_vec(),
        region_epoch: Some(metapb::RegionEpoch {
            conf_ver: 1,
            version,
        }),
        peers: store_ids
            .iter()
            .enumerate()
            .map(|(i, store_id)| metapb::Peer {
                id: id * 100 + i as u64,
                store_id: *store_id,
                is_learner: false,
            })
            .collect(),
    }
}

pub fn store(id: u64, address: &str) -> metapb::Store {
    store_with_labels(id, address, &[])
}

pub fn store_with_labels(id: u64, address: &str, labels: &[(&str, &str)]) -> metapb::Store {
    metapb::Store {
        id,
        address: address.to_owned(),
        peer_address: address.to_owned(),
        labels: labels
            .iter()
            .map(|(key, value)| metapb::StoreLabel {
                key: (*key).to_owned(),
                value: (*value).to_owned(),
            })
            .collect(),
    }
}
