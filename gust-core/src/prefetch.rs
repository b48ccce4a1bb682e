use anyhow::Result;
use hf_hub::api::tokio::Api;
use tracing::info;

use crate::{resolve_variant, DeviceMap, Precision, WeightManifest, WeightPaths};

/// Download every file the named model needs into the local hub cache.
///
/// Meant to run while building a deployment image so the server can start
/// from the cache. No device is opened; the precision matches what
/// `select_best_device` picks for the same `device_map` in this build, so a
/// build without an accelerator backend fetches the full precision set.
pub async fn prefetch_model(
    model_name: &str,
    api: Api,
    device_map: DeviceMap,
) -> Result<WeightPaths> {
    let variant = resolve_variant(model_name)?;
    let precision = Precision::for_device_map(device_map);

    info!(model = model_name, ?variant, ?precision, "prefetching weights");
    let paths = WeightManifest::for_variant(variant, precision)
        .fetch(&api)
        .await?;
    info!(model = model_name, "weights cached");
    Ok(paths)
}
