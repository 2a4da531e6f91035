use std::collections::HashMap;

use evalexpr::{build_operator_tree, eval_float_with_context, ContextWithMutableVariables, HashMapContext};
use resources::objects::metrics::MILLI_SCALE;

use crate::error::CoreError;

/// Syntax-only compile check run at admission time (§3 invariant 5): the
/// formula must parse, independent of whatever metric names end up bound to
/// it at cache-construction time (§4.3 step 3), since those aren't known
/// until the Scalers Cache is built.
pub fn compile_check(formula: &str) -> Result<(), CoreError> {
    build_operator_tree(formula)
        .map(|_| ())
        .map_err(|e| CoreError::Modifier(e.to_string()))
}

/// Compiles and evaluates a scaling-modifier formula (§4.6/§9): a small,
/// sandboxed numeric expression over named metric bindings, evaluated per
/// reconcile with the tick's milli-unit samples converted to plain floats
/// (the formula operates in ordinary units, not milli-units, so the
/// composite result is rescaled back up before being stored).
pub fn evaluate(formula: &str, samples: &HashMap<String, i64>) -> Result<i64, CoreError> {
    let mut bindings = HashMap::new();
    for (name, value) in samples {
        let identifier = sanitize_identifier(name);
        bindings.insert(identifier, (*value as f64) / MILLI_SCALE as f64);
    }

    let context = build_context(&bindings)?;
    let result = eval_float_with_context(formula, &context)
        .map_err(|e| CoreError::Modifier(e.to_string()))?;

    if !result.is_finite() {
        return Err(CoreError::Modifier(format!(
            "formula `{formula}` produced a non-finite result: {result}"
        )));
    }

    Ok((result * MILLI_SCALE as f64).round() as i64)
}

fn build_context(bindings: &HashMap<String, f64>) -> Result<HashMapContext, CoreError> {
    let mut context = HashMapContext::new();
    for (name, value) in bindings {
        context
            .set_value(name.clone(), evalexpr::Value::Float(*value))
            .map_err(|e| CoreError::Modifier(e.to_string()))?;
    }
    Ok(context)
}

/// Metric names may contain characters (`-`, `.`) that aren't valid
/// `evalexpr` identifiers; replace them with `_` so every metric name binds
/// to a usable variable.
fn sanitize_identifier(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluates_simple_sum() {
        let mut samples = HashMap::new();
        samples.insert("queue-depth".to_string(), 5000);
        samples.insert("cpu".to_string(), 3000);
        let result = evaluate("queue_depth + cpu", &samples).unwrap();
        assert_eq!(result, 8000);
    }

    #[test]
    fn rejects_division_by_zero_as_non_finite() {
        let mut samples = HashMap::new();
        samples.insert("zero".to_string(), 0);
        let result = evaluate("1.0 / zero", &samples);
        assert!(result.is_err());
    }

    #[test]
    fn sanitizes_hyphenated_metric_names() {
        let mut samples = HashMap::new();
        samples.insert("my-metric".to_string(), 2000);
        assert_eq!(evaluate("my_metric", &samples).unwrap(), 2000);
    }

    #[test]
    fn compile_check_accepts_well_formed_formulas() {
        assert!(compile_check("queue_depth + cpu * 2").is_ok());
    }

    #[test]
    fn compile_check_rejects_malformed_formulas() {
        assert!(compile_check("queue_depth +").is_err());
    }
}
