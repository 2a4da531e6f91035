use async_trait::async_trait;
use chrono::{Datelike, Timelike, Utc};
use resources::objects::{metrics::MetricSample, scaling_intent::Trigger};

use crate::{
    credential::ResolvedAuth,
    error::ScalerError,
    scaler::{Scaler, ScalerContext},
};

/// Scales a workload up to a fixed replica count during a recurring time
/// window, the way the upstream system's `cron` trigger does: `start` and
/// `end` are 5-field cron expressions naming the window's edges, evaluated
/// in UTC (timezone-aware scheduling is out of scope here; see DESIGN.md).
pub struct CronScaler {
    start: CronSchedule,
    end: CronSchedule,
    desired_replicas: i64,
    metric_name: String,
}

impl CronScaler {
    pub fn build(
        trigger: &Trigger,
        _auth: Option<&ResolvedAuth>,
    ) -> Result<Box<dyn Scaler>, ScalerError> {
        let get = |key: &str| -> Result<String, ScalerError> {
            trigger
                .metadata
                .get(key)
                .cloned()
                .ok_or_else(|| ScalerError::InvalidMetadata {
                    type_: "cron".to_string(),
                    reason: format!("missing `{key}`"),
                })
        };
        let start = CronSchedule::parse(&get("start")?)?;
        let end = CronSchedule::parse(&get("end")?)?;
        let desired_replicas: i64 = get("desiredReplicas")?
            .parse()
            .map_err(|_| ScalerError::InvalidMetadata {
                type_: "cron".to_string(),
                reason: "`desiredReplicas` is not an integer".to_string(),
            })?;
        let metric_name = trigger
            .name
            .clone()
            .unwrap_or_else(|| "cron".to_string());
        Ok(Box::new(Self {
            start,
            end,
            desired_replicas,
            metric_name,
        }))
    }

    fn in_window(&self) -> bool {
        let now = Utc::now();
        self.start.matches(&now) && !self.end.matches(&now)
    }
}

#[async_trait]
impl Scaler for CronScaler {
    fn metric_names(&self) -> Vec<String> {
        vec![self.metric_name.clone()]
    }

    fn target_value(&self) -> i64 {
        self.desired_replicas
    }

    async fn is_active(&self, _ctx: &ScalerContext<'_>) -> Result<bool, ScalerError> {
        Ok(self.in_window())
    }

    async fn get_metrics(
        &self,
        metric_name: &str,
        _ctx: &ScalerContext<'_>,
    ) -> Result<MetricSample, ScalerError> {
        let value = if self.in_window() {
            self.desired_replicas
        } else {
            0
        };
        Ok(MetricSample::new(
            metric_name.to_string(),
            value * resources::objects::metrics::MILLI_SCALE,
            Utc::now().naive_utc(),
        ))
    }
}

/// A single 5-field cron expression's minute/hour/day-of-month/month/
/// day-of-week fields, each either `*` or an exact integer. Range and list
/// syntax (`1-5`, `1,3,5`) is not supported — sufficient for the
/// activation-window schedules this trigger is meant for, not a general
/// cron parser.
struct CronSchedule {
    minute: Field,
    hour: Field,
    day_of_month: Field,
    month: Field,
    day_of_week: Field,
}

enum Field {
    Any,
    Exact(u32),
}

impl Field {
    fn parse(raw: &str) -> Result<Self, ScalerError> {
        if raw == "*" {
            return Ok(Field::Any);
        }
        raw.parse()
            .map(Field::Exact)
            .map_err(|_| ScalerError::InvalidMetadata {
                type_: "cron".to_string(),
                reason: format!("unsupported cron field `{raw}`"),
            })
    }

    fn matches(&self, value: u32) -> bool {
        match self {
            Field::Any => true,
            Field::Exact(v) => *v == value,
        }
    }
}

impl CronSchedule {
    fn parse(raw: &str) -> Result<Self, ScalerError> {
        let fields: Vec<&str> = raw.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(ScalerError::InvalidMetadata {
                type_: "cron".to_string(),
                reason: format!("expected 5 cron fields, got `{raw}`"),
            });
        }
        Ok(Self {
            minute: Field::parse(fields[0])?,
            hour: Field::parse(fields[1])?,
            day_of_month: Field::parse(fields[2])?,
            month: Field::parse(fields[3])?,
            day_of_week: Field::parse(fields[4])?,
        })
    }

    fn matches(&self, now: &chrono::DateTime<Utc>) -> bool {
        self.minute.matches(now.minute())
            && self.hour.matches(now.hour())
            && self.day_of_month.matches(now.day())
            && self.month.matches(now.month())
            && self.day_of_week.matches(now.weekday().num_days_from_sunday())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_field_matches_everything() {
        let f = Field::parse("*").unwrap();
        assert!(f.matches(0));
        assert!(f.matches(59));
    }

    #[test]
    fn exact_field_matches_only_its_value() {
        let f = Field::parse("30").unwrap();
        assert!(f.matches(30));
        assert!(!f.matches(31));
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(CronSchedule::parse("0 8 * *").is_err());
    }
}
