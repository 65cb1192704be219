// Copyright 2021 TiKV Project Authors. Licensed under Apache-2.0.

//! Single-RPC dispatch to one region: look up the context, send, classify
//! what came back. Errors local to routing (leader moved, store busy,
//! transport failure) are absorbed here by invalidating the cache and
//! retrying; errors that change what key maps where bubble to the caller.

use crate::{
    backoff::{BackoffReason, Backoffer},
    cluster::Cluster,
    pd::PdClient,
    region::{RegionVerId, RpcContext},
    request::KvRequest,
};
use log::{debug, info};
use rangekv_common::{Error, Result};
use rangekv_proto::errorpb;
use rangekv_store::{HasError, HasRegionError, KvConnect, Request};
use std::{any::Any, sync::Arc};

/// Dispatches one logical RPC to one region. One instance per RPC;
/// concurrent RPCs use independent instances over the shared cache.
pub struct RegionClient<PdC: PdClient, Kv: KvConnect> {
    cluster: Arc<Cluster<PdC, Kv>>,
    region: RegionVerId,
}

impl<PdC: PdClient, Kv: KvConnect> RegionClient<PdC, Kv> {
    pub fn new(cluster: Arc<Cluster<PdC, Kv>>, region: RegionVerId) -> RegionClient<PdC, Kv> {
        RegionClient { cluster, region }
    }

    pub async fn send_req_to_region<Req: KvRequest>(
        &self,
        bo: &mut Backoffer,
        mut req: Req,
    ) -> Result<Req::Response> {
        loop {
            let ctx = self
                .cluster
                .region_cache
                .get_rpc_context(bo, &self.region)
                .await?;
            req.set_context(ctx.request_context());
            let resp = match self.dispatch(&ctx, &req).await {
                Ok(resp) => resp,
                Err(e) => {
                    self.cluster.region_cache.on_send_req_fail(&ctx, &e);
                    bo.backoff(BackoffReason::RegionMiss, e).await?;
                    continue;
                }
            };
            let mut resp = *resp.downcast::<Req::Response>().map_err(|_| {
                Error::Internal(format!("unexpected response type for {}", req.label()))
            })?;
            if let Some(region_error) = resp.region_error() {
                self.on_region_error(bo, &ctx, region_error).await?;
                continue;
            }
            if let Some(key_error) = resp.error() {
                return Err(key_error);
            }
            return Ok(resp);
        }
    }

    async fn dispatch(&self, ctx: &RpcContext, req: &impl Request) -> Result<Box<dyn Any>> {
        let client = self.cluster.kv_client(&ctx.addr)?;
        debug!("sending {} to {}", req.label(), ctx.addr);
        req.dispatch(&client).await
    }

    /// Ok(()) means the cache was adjusted and the attempt may repeat;
    /// Err means the caller has to re-resolve its keys.
    async fn on_region_error(
        &self,
        bo: &mut Backoffer,
        ctx: &RpcContext,
        mut error: errorpb::Error,
    ) -> Result<()> {
        let cache = &self.cluster.region_cache;
        if let Some(not_leader) = error.not_leader.take() {
            let cause = Error::NotLeader {
                region_id: ctx.region.id,
                store_id: ctx.peer.store_id,
            };
            return match not_leader.leader {
                Some(leader) => {
                    cache.update_leader(bo, &ctx.region, leader.store_id).await?;
                    bo.backoff(BackoffReason::UpdateLeader, cause).await
                }
                None => {
                    // No leader known yet; the region is being scheduled.
                    cache.drop_region(&ctx.region);
                    bo.backoff(BackoffReason::RegionScheduling, cause).await
                }
            };
        }
        if let Some(stale_epoch) = error.epoch_not_match.take() {
            cache.on_region_stale(bo, ctx, &stale_epoch).await?;
            return Err(Error::EpochNotMatch {
                region_id: ctx.region.id,
            });
        }
        if let Some(store_not_match) = error.store_not_match.take() {
            info!(
                "store not match for region {} (sent to {}, peer lives on {})",
                ctx.region.id, store_not_match.request_store_id, store_not_match.actual_store_id
            );
            cache.drop_region(&ctx.region);
            return Ok(());
        }
        if error.region_not_found.is_some() {
            info!("region {} not found on store {}", ctx.region.id, ctx.peer.store_id);
            cache.drop_region(&ctx.region);
            return Ok(());
        }
        if let Some(server_is_busy) = error.server_is_busy.take() {
            return bo
                .backoff(
                    BackoffReason::ServerBusy,
                    Error::ServerIsBusy {
                        reason: server_is_busy.reason,
                    },
                )
                .await;
        }
        cache.drop_region(&ctx.region);
        bo.backoff(
            BackoffReason::RegionMiss,
            Error::Internal(format!("unclassified region error: {}", error.message)),
        )
        .await
    }
}

/// Errors the caller can repair by re-locating its keys and retrying;
/// everything else is terminal for the operation.
pub(crate) fn is_routing_error(e: &Error) -> bool {
    !matches!(
        e,
        Error::BackoffExceeded(_)
            | Error::KeyLocked(_)
            | Error::KeyError(_)
            | Error::Logical(_)
            | Error::Internal(_)
    )
}
