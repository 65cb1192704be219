// Copyright 2021 TiKV Project Authors. Licensed under Apache-2.0.

use crate::KvClient;
use async_trait::async_trait;
use rangekv_common::Result;
use rangekv_proto::kvrpcpb;
use std::any::Any;

/// Abstracts any request sent to a storage node. `dispatch` erases the
/// response type; callers downcast to the concrete response.
#[async_trait]
pub trait Request: Any + Sync + Send + 'static {
    async fn dispatch(&self, client: &dyn KvClient) -> Result<Box<dyn Any>>;
    fn label(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn set_context(&mut self, context: kvrpcpb::Context);
}

macro_rules! impl_request {
    ($name:ident, $fun:ident, $label:literal) => {
        #[async_trait]
        impl Request for kvrpcpb::$name {
            async fn dispatch(&self, client: &dyn KvClient) -> Result<Box<dyn Any>> {
                client
                    .$fun(self.clone())
                    .await
                    .map(|resp| Box::new(resp) as Box<dyn Any>)
            }

            fn label(&self) -> &'static str {
                $label
            }

            fn as_any(&self) -> &dyn Any {
                self
            }

            fn set_context(&mut self, context: kvrpcpb::Context) {
                self.context = Some(context);
            }
        }
    };
}

impl_request!(GetRequest, kv_get, "kv_get");
impl_request!(BatchGetRequest, kv_batch_get, "kv_batch_get");
impl_request!(ScanRequest, kv_scan, "kv_scan");
