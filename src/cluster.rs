// Copyright 2021 TiKV Project Authors. Licensed under Apache-2.0.

use crate::{
    backoff::{BackoffReason, Backoffer},
    pd::PdClient,
    region_cache::RegionCache,
    snapshot::Snapshot,
};
use rangekv_common::Result;
use rangekv_store::KvConnect;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

const DEFAULT_SCAN_BATCH_SIZE: u32 = 256;

/// Client-wide settings.
#[derive(Clone, Debug)]
pub struct Config {
    /// Store label marking learner replicas this client tracks on its
    /// regions. A store missing the label counts as labelled "".
    pub learner_key: String,
    pub learner_value: String,
    /// Row limit for one scan batch.
    pub scan_batch_size: u32,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            learner_key: String::new(),
            learner_value: String::new(),
            scan_batch_size: DEFAULT_SCAN_BATCH_SIZE,
        }
    }
}

impl Config {
    pub fn with_learner_label(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Config {
        self.learner_key = key.into();
        self.learner_value = value.into();
        self
    }

    pub fn with_scan_batch_size(mut self, scan_batch_size: u32) -> Config {
        self.scan_batch_size = scan_batch_size;
        self
    }
}

/// Shared handle tying the PD gateway, the region cache and the kv
/// transport together. The cache holds addresses only; connections live in
/// the per-address pool here.
pub struct Cluster<PdC: PdClient, Kv: KvConnect> {
    pub pd_client: Arc<PdC>,
    pub region_cache: RegionCache<PdC>,
    pub config: Config,
    kv_connect: Kv,
    kv_clients: Mutex<HashMap<String, Kv::KvClient>>,
}

impl<PdC: PdClient, Kv: KvConnect> Cluster<PdC, Kv> {
    pub fn new(pd_client: Arc<PdC>, kv_connect: Kv, config: Config) -> Cluster<PdC, Kv> {
        let region_cache = RegionCache::new(
            pd_client.clone(),
            config.learner_key.clone(),
            config.learner_value.clone(),
        );
        Cluster {
            pd_client,
            region_cache,
            config,
            kv_connect,
            kv_clients: Mutex::new(HashMap::new()),
        }
    }

    /// A read-only view of the store at `version`.
    pub fn snapshot(self: &Arc<Self>, version: u64) -> Snapshot<PdC, Kv> {
        Snapshot::new(self.clone(), version)
    }

    /// Pooled connection for `address`; connects on first use.
    pub(crate) fn kv_client(&self, address: &str) -> Result<Kv::KvClient> {
        let mut clients = self.kv_clients.lock().unwrap();
        if let Some(client) = clients.get(address) {
            return Ok(client.clone());
        }
        let client = self.kv_connect.connect(address)?;
        clients.insert(address.to_owned(), client.clone());
        Ok(client)
    }

    /// Cluster-wide GC safe point; snapshots at or below it may already
    /// have been collected.
    pub async fn gc_safe_point(&self, bo: &mut Backoffer) -> Result<u64> {
        loop {
            match self.pd_client.get_gc_safe_point().await {
                Ok(safe_point) => return Ok(safe_point),
                Err(e) => bo.backoff(BackoffReason::PdRpc, e).await?,
            }
        }
    }
}
