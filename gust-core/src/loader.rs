use std::future::Future;

use anyhow::Result;
use hf_hub::api::tokio::Api;

use crate::{DeviceMap, ModelLike, ModelVariant};

/// Builds a ready-to-run model from weights on the hub (or its local cache).
///
/// Loading happens once per process; the returned model is then shared by
/// every request.
pub trait Loader {
    type Model: ModelLike;

    fn load(
        variant: ModelVariant,
        api: Api,
        device_map: DeviceMap,
    ) -> impl Future<Output = Result<Self::Model>>
    where
        Self: Sized;
}
