use std::collections::HashMap;

use resources::objects::scaling_intent::Trigger;

use crate::{
    builtin::{cron::CronScaler, http_metric::HttpMetricScaler},
    credential::ResolvedAuth,
    error::ScalerError,
    scaler::Scaler,
};

pub type Factory = fn(&Trigger, Option<&ResolvedAuth>) -> Result<Box<dyn Scaler>, ScalerError>;

/// Type-tag to constructor lookup (§4.1: an open-ended registry, not a
/// closed-set dispatch over an enum — new trigger types register here
/// without touching the Reconciler or Scalers Cache).
pub struct ScalerRegistry {
    factories: HashMap<&'static str, Factory>,
}

impl ScalerRegistry {
    pub fn new() -> Self {
        let mut factories: HashMap<&'static str, Factory> = HashMap::new();
        factories.insert("cron", CronScaler::build);
        factories.insert("metrics-api", HttpMetricScaler::build);
        Self { factories }
    }

    pub fn register(&mut self, type_: &'static str, factory: Factory) {
        self.factories.insert(type_, factory);
    }

    pub fn build(
        &self,
        trigger: &Trigger,
        auth: Option<&ResolvedAuth>,
    ) -> Result<Box<dyn Scaler>, ScalerError> {
        let factory = self
            .factories
            .get(trigger.type_.as_str())
            .ok_or_else(|| ScalerError::UnknownType(trigger.type_.clone()))?;
        factory(trigger, auth)
    }
}

impl Default for ScalerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
