use autoscaling_core::{error::CoreError, modifier, ScalerEntry, ScalersCache};
use resources::objects::scaling_intent::ScalingIntent;
use scalers::ScalerRegistry;

/// Builds the Scalers Cache entries for one Intent's non-resource triggers
/// (§4.3 construction), shared between the Intent Reconciler (which builds
/// on reconcile) and the Metric Adapter Service (which builds on first
/// request for an Intent the Reconciler hasn't reconciled yet).
///
/// A factory error for any one trigger aborts the whole build (§4.3 step 2:
/// "a factory that errors aborts construction ... partial caches are never
/// exposed") rather than silently continuing with the triggers that did
/// construct.
pub fn build_cache(registry: &ScalerRegistry, intent: &ScalingIntent) -> Result<ScalersCache, CoreError> {
    let mut entries = Vec::new();
    for (index, trigger) in intent.spec.triggers.iter().enumerate() {
        if matches!(trigger.type_.as_str(), "cpu" | "memory") {
            // Rendered directly as a resource metric; no Scaler involved.
            continue;
        }
        let scaler = registry.build(trigger, None).map_err(|e| {
            CoreError::CachePartial(format!(
                "trigger {index} ({}) failed to construct: {e}",
                trigger.type_
            ))
        })?;
        entries.push(ScalerEntry {
            index,
            trigger: trigger.clone(),
            scaler,
        });
    }

    if let Some(modifiers) = &intent.spec.advanced.scaling_modifiers {
        modifier::compile_check(&modifiers.formula)?;
    }

    Ok(ScalersCache::with_fallback_and_poll_interval(
        entries,
        intent.spec.fallback.clone(),
        std::time::Duration::from_secs(intent.spec.polling_interval_seconds as u64),
    ))
}
