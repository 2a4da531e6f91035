use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{
    extract::{Path, Query},
    Extension, Json,
};
use chrono::Utc;
use resources::objects::{child_autoscaler::ChildAutoscalerStatus, metrics::MetricSample};
use tokio_util::sync::CancellationToken;

use autoscaling_core::naming;

use crate::state::AppState;

/// Deadline a single metric lookup may take before the adapter gives up and
/// falls back to the degraded empty response (§4.7, §5: "HTTP-client
/// deadline on metric-adapter requests").
const REQUEST_DEADLINE: Duration = Duration::from_secs(10);

#[derive(serde::Serialize)]
pub struct ExternalMetricValue {
    pub metric_name: String,
    pub metric_labels: HashMap<String, String>,
    pub timestamp: chrono::NaiveDateTime,
    pub value: i64,
}

#[derive(serde::Serialize, Default)]
pub struct ExternalMetricValueList {
    pub items: Vec<ExternalMetricValue>,
}

#[derive(serde::Deserialize)]
pub struct ListQuery {
    /// The orchestrator's custom-metrics client encodes the owning Intent's
    /// name as a label selector; this service only ever needs the one
    /// owner-name value out of it; `?owner=` is accepted directly for
    /// callers that don't bother encoding a full selector string.
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default, rename = "labelSelector")]
    pub label_selector: Option<String>,
}

impl ListQuery {
    fn owner_name(&self) -> Option<String> {
        if let Some(owner) = &self.owner {
            return Some(owner.clone());
        }
        let selector = self.label_selector.as_ref()?;
        selector.split(',').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == resources::objects::child_autoscaler::OWNER_NAME_LABEL)
                .then(|| value.to_string())
        })
    }
}

/// `GET /apis/external.metrics.k8s.io/v1beta1/namespaces/{namespace}/{metric_name}`
/// (§4.7). Never returns a non-2xx response for a locally-observed problem —
/// a missing Intent, a missing trigger, or a Scaler failure the Fallback
/// Engine couldn't absorb all degrade to an empty list, per §7's "emptiness
/// is the designed degraded response".
pub async fn list_external_metric(
    Path((namespace, metric_name)): Path<(String, String)>,
    Query(query): Query<ListQuery>,
    Extension(state): Extension<Arc<AppState>>,
) -> Json<ExternalMetricValueList> {
    let Some(owner) = query.owner_name() else {
        return Json(ExternalMetricValueList::default());
    };

    let intent_key = format!("{namespace}/{owner}");
    let Some(intent) = state.intent_store.read().await.get(&intent_key).cloned() else {
        return Json(ExternalMetricValueList::default());
    };

    // §4.3/§7: a cache that fails to construct is never published; this is
    // the same "locally observed problem" class as a missing cache, so it
    // degrades to an empty list rather than a non-2xx response.
    let Ok(cache) = state
        .cache_manager
        .get_or_build(&intent_key, || async {
            controllers::cache_builder::build_cache(&state.registry, &intent)
        })
        .await
    else {
        return Json(ExternalMetricValueList::default());
    };

    let child_name = naming::child_autoscaler_name(&intent);
    let child_key = format!("{namespace}/{child_name}");
    let current_replicas = state
        .child_store
        .read()
        .await
        .get(&child_key)
        .and_then(|child| child.status.as_ref())
        .map(|status: &ChildAutoscalerStatus| status.current_replicas)
        .unwrap_or(0);

    let cancel = CancellationToken::new();
    let sample = if metric_name == naming::COMPOSITE_METRIC_NAME {
        composite_sample(&intent, &cache, current_replicas, &cancel).await
    } else {
        tokio::time::timeout(
            REQUEST_DEADLINE,
            cache.get_metrics(&metric_name, current_replicas, &cancel),
        )
        .await
        .ok()
        .and_then(Result::ok)
        .map(|(sample, _)| sample)
    };

    match sample {
        Some(sample) => Json(ExternalMetricValueList {
            items: vec![to_value(sample, &owner)],
        }),
        None => Json(ExternalMetricValueList::default()),
    }
}

async fn composite_sample(
    intent: &resources::objects::scaling_intent::ScalingIntent,
    cache: &autoscaling_core::ScalersCache,
    current_replicas: u32,
    cancel: &CancellationToken,
) -> Option<MetricSample> {
    let modifiers = intent.spec.advanced.scaling_modifiers.as_ref()?;
    let mut samples = HashMap::new();
    for spec in cache.metric_specs() {
        let (sample, _) = tokio::time::timeout(
            REQUEST_DEADLINE,
            cache.get_metrics(&spec.metric_name, current_replicas, cancel),
        )
        .await
        .ok()?
        .ok()?;
        samples.insert(spec.metric_name, sample.value);
    }
    let value = autoscaling_core::modifier::evaluate(&modifiers.formula, &samples).ok()?;
    Some(MetricSample::new(
        naming::COMPOSITE_METRIC_NAME,
        value,
        Utc::now().naive_utc(),
    ))
}

fn to_value(sample: MetricSample, owner: &str) -> ExternalMetricValue {
    let mut labels = HashMap::new();
    labels.insert(
        resources::objects::child_autoscaler::OWNER_NAME_LABEL.to_string(),
        owner.to_string(),
    );
    ExternalMetricValue {
        metric_name: sample.metric_name,
        metric_labels: labels,
        timestamp: sample.timestamp,
        value: sample.value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_query_param_is_used_directly() {
        let query = ListQuery {
            owner: Some("web".to_string()),
            label_selector: None,
        };
        assert_eq!(query.owner_name(), Some("web".to_string()));
    }

    #[test]
    fn owner_name_is_extracted_from_a_label_selector() {
        let query = ListQuery {
            owner: None,
            label_selector: Some(format!(
                "{}=web,other=ignored",
                resources::objects::child_autoscaler::OWNER_NAME_LABEL
            )),
        };
        assert_eq!(query.owner_name(), Some("web".to_string()));
    }

    #[test]
    fn missing_owner_and_selector_yields_none() {
        let query = ListQuery {
            owner: None,
            label_selector: None,
        };
        assert_eq!(query.owner_name(), None);
    }

    #[test]
    fn selector_without_the_owner_label_yields_none() {
        let query = ListQuery {
            owner: None,
            label_selector: Some("other=ignored".to_string()),
        };
        assert_eq!(query.owner_name(), None);
    }
}
