use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use resources::objects::{metrics::MetricSample, scaling_intent::Trigger};

use crate::{
    credential::ResolvedAuth,
    error::ScalerError,
    scaler::{Scaler, ScalerContext},
};

/// Polls a JSON HTTP endpoint for a single numeric value, the generic
/// metrics-API trigger shape most query-based scalers (Prometheus, a custom
/// queue-depth endpoint, ...) reduce to. Grounded in the teacher's
/// `MetricsClient`: a plain `reqwest::Client` GET, optional bearer token,
/// JSON body decoded into the requested field.
pub struct HttpMetricScaler {
    client: Client,
    url: String,
    value_field: String,
    target: i64,
    bearer_token: Option<String>,
    metric_name: String,
}

impl HttpMetricScaler {
    pub fn build(
        trigger: &Trigger,
        auth: Option<&ResolvedAuth>,
    ) -> Result<Box<dyn Scaler>, ScalerError> {
        let get = |key: &str| -> Result<String, ScalerError> {
            trigger
                .metadata
                .get(key)
                .cloned()
                .ok_or_else(|| ScalerError::InvalidMetadata {
                    type_: "metrics-api".to_string(),
                    reason: format!("missing `{key}`"),
                })
        };
        let url = get("url")?;
        let value_field = trigger
            .metadata
            .get("valueField")
            .cloned()
            .unwrap_or_else(|| "value".to_string());
        let target: i64 =
            get("targetValue")?
                .parse()
                .map_err(|_| ScalerError::InvalidMetadata {
                    type_: "metrics-api".to_string(),
                    reason: "`targetValue` is not an integer".to_string(),
                })?;
        let bearer_token = auth.and_then(|a| a.get("bearerToken").map(str::to_string));
        let metric_name = trigger
            .name
            .clone()
            .unwrap_or_else(|| "metrics-api".to_string());
        Ok(Box::new(Self {
            client: Client::new(),
            url,
            value_field,
            target,
            bearer_token,
            metric_name,
        }))
    }

    async fn fetch_value(&self) -> Result<i64, ScalerError> {
        let mut request = self.client.get(&self.url);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ScalerError::Transient {
                type_: "metrics-api".to_string(),
                source: e.into(),
            })?
            .error_for_status()
            .map_err(|e| ScalerError::Transient {
                type_: "metrics-api".to_string(),
                source: e.into(),
            })?
            .json::<serde_json::Value>()
            .await
            .map_err(|e| ScalerError::Transient {
                type_: "metrics-api".to_string(),
                source: e.into(),
            })?;
        let field = response
            .get(&self.value_field)
            .unwrap_or(&response);
        field
            .as_f64()
            .map(|v| v as i64)
            .ok_or_else(|| ScalerError::Transient {
                type_: "metrics-api".to_string(),
                source: anyhow::anyhow!(
                    "field `{}` is not numeric in response from {}",
                    self.value_field,
                    self.url
                ),
            })
    }
}

#[async_trait]
impl Scaler for HttpMetricScaler {
    fn metric_names(&self) -> Vec<String> {
        vec![self.metric_name.clone()]
    }

    fn target_value(&self) -> i64 {
        self.target
    }

    async fn is_active(&self, _ctx: &ScalerContext<'_>) -> Result<bool, ScalerError> {
        Ok(self.fetch_value().await? > 0)
    }

    async fn get_metrics(
        &self,
        metric_name: &str,
        _ctx: &ScalerContext<'_>,
    ) -> Result<MetricSample, ScalerError> {
        let value = self.fetch_value().await?;
        Ok(MetricSample::new(
            metric_name.to_string(),
            value * resources::objects::metrics::MILLI_SCALE,
            Utc::now().naive_utc(),
        ))
    }
}
