//! Blueprint validation.
//!
//! Gates every blueprint before it may become a live scalable app:
//! on incoming bind requests (against the binding) and on every record
//! loaded from the store. A rejected blueprint is never fatal to the
//! process; callers log and skip it.

use std::str::FromStr;

use crate::error::ValidationError;
use crate::types::{
    AppBlueprint, Binding, ThresholdPolicy, COOLDOWN_MIN, LEARNING_MULTIPLIER_MIN,
    SCALING_INTERVAL_MULTIPLIER_MIN,
};

/// Validate a whole blueprint.
///
/// Checks binding identifiers, threshold policies, numeric limits and
/// the working set, in that order, returning the first violation.
pub fn validate_blueprint(bp: &AppBlueprint) -> Result<(), ValidationError> {
    validate_binding(&bp.binding)?;
    validate_policies(bp)?;
    validate_limits(bp)?;
    validate_working_set(bp)
}

/// Validate binding identifiers.
///
/// `resource_id` may only contain word characters and `-`.
pub fn validate_binding(binding: &Binding) -> Result<(), ValidationError> {
    for c in binding.resource_id.chars() {
        if !(c.is_alphanumeric() || c == '_' || c == '-') {
            return Err(ValidationError::SpecialCharacter(format!(
                "resource id contains '{c}'"
            )));
        }
    }
    Ok(())
}

fn parse_policy(raw: &str, field: &str) -> Result<ThresholdPolicy, ValidationError> {
    ThresholdPolicy::from_str(raw)
        .map_err(|_| ValidationError::Policy(format!("{field} is '{raw}'")))
}

fn validate_policies(bp: &AppBlueprint) -> Result<(), ValidationError> {
    parse_policy(&bp.cpu_threshold_policy, "cpu threshold policy")?;
    parse_policy(&bp.ram_threshold_policy, "ram threshold policy")?;
    parse_policy(&bp.request_threshold_policy, "request threshold policy")?;
    parse_policy(&bp.latency_threshold_policy, "latency threshold policy")?;
    Ok(())
}

fn validate_limits(bp: &AppBlueprint) -> Result<(), ValidationError> {
    let limit = |msg: &str| Err(ValidationError::Limit(msg.to_string()));

    if bp.cpu_upper_limit <= bp.cpu_lower_limit {
        return limit("cpu upper limit does not exceed cpu lower limit");
    }
    if bp.cpu_upper_limit > 100 {
        return limit("cpu upper limit is above 100 percent");
    }
    if bp.cpu_lower_limit < 0 {
        return limit("cpu lower limit is negative");
    }
    if bp.ram_upper_limit <= bp.ram_lower_limit {
        return limit("ram upper limit does not exceed ram lower limit");
    }
    if bp.ram_upper_limit > i32::MAX as i64 {
        return limit("ram upper limit is above i32::MAX bytes");
    }
    if bp.ram_lower_limit < 0 {
        return limit("ram lower limit is negative");
    }
    if bp.latency_upper_limit <= bp.latency_lower_limit {
        return limit("latency upper limit does not exceed latency lower limit");
    }
    if bp.latency_upper_limit > i32::MAX as i64 {
        return limit("latency upper limit is above i32::MAX millis");
    }
    if bp.latency_lower_limit < 0 {
        return limit("latency lower limit is negative");
    }
    if bp.request_upper_limit <= bp.request_lower_limit {
        return limit("request upper limit does not exceed request lower limit");
    }
    if bp.request_lower_limit < 0 {
        return limit("request lower limit is negative");
    }
    if bp.min_quotient < 0 {
        return limit("min quotient is negative");
    }
    if bp.min_instances < 0 {
        return limit("min instances is negative");
    }
    if bp.max_instances < bp.min_instances {
        return limit("max instances is below min instances");
    }
    if bp.cooldown_time < COOLDOWN_MIN {
        return limit("cooldown time is below the permitted minimum");
    }
    if bp.learning_time_multiplier < LEARNING_MULTIPLIER_MIN {
        return limit("learning time multiplier is below the permitted minimum");
    }
    if bp.scaling_interval_multiplier < SCALING_INTERVAL_MULTIPLIER_MIN {
        return limit("scaling interval multiplier is below the permitted minimum");
    }
    Ok(())
}

fn validate_working_set(bp: &AppBlueprint) -> Result<(), ValidationError> {
    if bp.current_interval_state < 0
        || bp.current_interval_state > bp.scaling_interval_multiplier
    {
        return Err(ValidationError::WorkingSet(
            "current interval state is outside [0, scaling interval multiplier]".to_string(),
        ));
    }
    let creation = bp.binding.creation_time;
    if creation < 0 {
        return Err(ValidationError::Time("creation time is negative".to_string()));
    }
    if bp.last_scaling_time < 0 || bp.last_scaling_time < creation {
        return Err(ValidationError::Time(
            "last scaling time predates the binding".to_string(),
        ));
    }
    if bp.learning_start_time < 0 || bp.learning_start_time < creation {
        return Err(ValidationError::Time(
            "learning start time predates the binding".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BindingContext;

    fn test_binding(id: &str, resource_id: &str) -> Binding {
        Binding {
            id: id.to_string(),
            resource_id: resource_id.to_string(),
            scaler_id: "scaler-0".to_string(),
            service_id: "service-1".to_string(),
            resource_name: None,
            context: BindingContext::default(),
            creation_time: 1_000,
        }
    }

    fn valid_blueprint() -> AppBlueprint {
        AppBlueprint::with_defaults(test_binding("b-1", "app-1"))
    }

    #[test]
    fn default_blueprint_is_valid() {
        assert!(validate_blueprint(&valid_blueprint()).is_ok());
    }

    #[test]
    fn resource_id_with_special_character_rejected() {
        let bp = AppBlueprint::with_defaults(test_binding("b-1", "app$1"));
        assert!(matches!(
            validate_blueprint(&bp),
            Err(ValidationError::SpecialCharacter(_))
        ));
    }

    #[test]
    fn resource_id_with_dash_and_underscore_accepted() {
        let bp = AppBlueprint::with_defaults(test_binding("b-1", "my-app_v2"));
        assert!(validate_blueprint(&bp).is_ok());
    }

    #[test]
    fn unknown_policy_rejected() {
        let mut bp = valid_blueprint();
        bp.ram_threshold_policy = "median".to_string();
        assert!(matches!(
            validate_blueprint(&bp),
            Err(ValidationError::Policy(_))
        ));
    }

    #[test]
    fn empty_policy_rejected() {
        let mut bp = valid_blueprint();
        bp.cpu_threshold_policy = String::new();
        assert!(matches!(
            validate_blueprint(&bp),
            Err(ValidationError::Policy(_))
        ));
    }

    #[test]
    fn cpu_limits_must_be_ordered() {
        let mut bp = valid_blueprint();
        bp.cpu_upper_limit = 30;
        bp.cpu_lower_limit = 30;
        assert!(matches!(
            validate_blueprint(&bp),
            Err(ValidationError::Limit(_))
        ));
    }

    #[test]
    fn cpu_upper_limit_capped_at_100() {
        let mut bp = valid_blueprint();
        bp.cpu_upper_limit = 101;
        assert!(matches!(
            validate_blueprint(&bp),
            Err(ValidationError::Limit(_))
        ));
    }

    #[test]
    fn negative_lower_limits_rejected() {
        for field in ["cpu", "ram", "latency", "request"] {
            let mut bp = valid_blueprint();
            match field {
                "cpu" => bp.cpu_lower_limit = -1,
                "ram" => bp.ram_lower_limit = -1,
                "latency" => bp.latency_lower_limit = -1,
                _ => bp.request_lower_limit = -1,
            }
            assert!(
                matches!(validate_blueprint(&bp), Err(ValidationError::Limit(_))),
                "negative {field} lower limit passed validation"
            );
        }
    }

    #[test]
    fn ram_upper_limit_capped() {
        let mut bp = valid_blueprint();
        bp.ram_upper_limit = i32::MAX as i64 + 1;
        assert!(matches!(
            validate_blueprint(&bp),
            Err(ValidationError::Limit(_))
        ));
    }

    #[test]
    fn instance_bounds_must_be_ordered() {
        let mut bp = valid_blueprint();
        bp.min_instances = 5;
        bp.max_instances = 4;
        assert!(matches!(
            validate_blueprint(&bp),
            Err(ValidationError::Limit(_))
        ));
    }

    #[test]
    fn cooldown_below_minimum_rejected() {
        let mut bp = valid_blueprint();
        bp.cooldown_time = COOLDOWN_MIN - 1;
        assert!(matches!(
            validate_blueprint(&bp),
            Err(ValidationError::Limit(_))
        ));
    }

    #[test]
    fn interval_state_outside_range_rejected() {
        let mut bp = valid_blueprint();
        bp.current_interval_state = bp.scaling_interval_multiplier + 1;
        assert!(matches!(
            validate_blueprint(&bp),
            Err(ValidationError::WorkingSet(_))
        ));
    }

    #[test]
    fn last_scaling_time_before_creation_rejected() {
        let mut bp = valid_blueprint();
        bp.last_scaling_time = bp.binding.creation_time - 1;
        assert!(matches!(
            validate_blueprint(&bp),
            Err(ValidationError::Time(_))
        ));
    }

    #[test]
    fn learning_start_before_creation_rejected() {
        let mut bp = valid_blueprint();
        bp.learning_start_time = bp.binding.creation_time - 1;
        assert!(matches!(
            validate_blueprint(&bp),
            Err(ValidationError::Time(_))
        ));
    }
}
