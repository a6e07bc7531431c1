//! ScalingChecker — the pure decision function.
//!
//! Evaluates one app's derived metric values against its component
//! limits and composes the per-component verdicts into a single
//! `ScalingAction`. All functions here are pure over the locked state;
//! the caller holds the app's guard and is responsible for acting on a
//! non-neutral result (ordering the engine, committing
//! `last_scaling_time`).

use std::time::Duration;

use flexscale_bus::{ScalingLog, ScalingReason};
use flexscale_state::Binding;

use crate::app::AppState;
use crate::wrapper::Dimension;

/// Inputs the checker needs besides the app itself.
#[derive(Debug, Clone, Copy)]
pub struct CheckContext {
    /// Decision time, epoch millis.
    pub now: i64,
    /// Instances added/removed per step.
    pub static_scaling_size: u32,
    /// Period of the scaler loop; the learning window is a multiple of it.
    pub scaler_interval: Duration,
}

/// What one component thinks should happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Hold,
}

/// Verdict of a single dimension.
#[derive(Debug, Clone, Copy)]
pub struct ComponentAction {
    pub dimension: Dimension,
    pub direction: Direction,
    /// Derived value the verdict was based on, if a window existed.
    pub value: Option<i64>,
}

/// The composed decision for one app.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingAction {
    pub binding_id: String,
    pub app_id: String,
    pub old_instances: u32,
    pub new_instances: u32,
    pub reason: ScalingReason,
    pub needs_scaling: bool,
    pub description: String,
}

impl ScalingAction {
    fn none(binding: &Binding, old_instances: u32, description: &str) -> Self {
        Self {
            binding_id: binding.id.clone(),
            app_id: binding.resource_id.clone(),
            old_instances,
            new_instances: old_instances,
            reason: ScalingReason::None,
            needs_scaling: false,
            description: description.to_string(),
        }
    }

    /// Build the bus record for this decision.
    ///
    /// Call with the guard still held so the readings match the
    /// decision.
    pub fn to_log(&self, state: &AppState, now: i64) -> ScalingLog {
        let (upper, lower) = match self.reason {
            ScalingReason::Cpu => (state.cpu.upper_limit, state.cpu.lower_limit),
            ScalingReason::Ram => (state.ram.upper_limit, state.ram.lower_limit),
            ScalingReason::Http | ScalingReason::Quotient => (
                state.request.component.upper_limit,
                state.request.component.lower_limit,
            ),
            ScalingReason::Latency => {
                (state.latency.upper_limit, state.latency.lower_limit)
            }
            ScalingReason::None => (0, 0),
        };
        ScalingLog {
            timestamp: now,
            binding_id: self.binding_id.clone(),
            app_id: self.app_id.clone(),
            old_instances: self.old_instances,
            new_instances: self.new_instances,
            reason: self.reason,
            description: self.description.clone(),
            current_cpu: state.value_of_cpu(now).unwrap_or(-1),
            current_ram: state.value_of_ram(now).unwrap_or(-1),
            current_requests: state.value_of_requests().unwrap_or(-1),
            current_latency: state.value_of_latency().unwrap_or(-1),
            current_quotient: state.request.quotient,
            upper_limit: upper,
            lower_limit: lower,
        }
    }
}

// ── Per-component checks ──────────────────────────────────────────

/// Evaluate one dimension of the app.
///
/// A dimension without a metric window holds.
pub fn choose_component_action(
    state: &AppState,
    dimension: Dimension,
    now: i64,
) -> ComponentAction {
    let (value, wrapper) = match dimension {
        Dimension::Cpu => (state.value_of_cpu(now), &state.cpu),
        Dimension::Ram => (state.value_of_ram(now), &state.ram),
        Dimension::Http => (state.value_of_requests(), &state.request.component),
        Dimension::Latency => (state.value_of_latency(), &state.latency),
    };

    let direction = match value {
        Some(v) if !wrapper.within_upper(v) => Direction::Up,
        Some(v) if !wrapper.within_lower(v) => Direction::Down,
        _ => Direction::Hold,
    };

    ComponentAction {
        dimension,
        direction,
        value,
    }
}

// ── Composition ───────────────────────────────────────────────────

/// Choose the scaling action for one app.
///
/// Gate order: cooldown, learning window, per-component evaluation in
/// priority order (CPU > RAM > HTTP > latency), quotient gate, clamp to
/// the instance bounds. A clamp that erases the delta degrades the
/// action to a neutral one.
pub fn choose_scaling_action(
    binding: &Binding,
    state: &AppState,
    ctx: &CheckContext,
) -> ScalingAction {
    let old_instances = state.current_instance_count;

    if ctx.now - state.last_scaling_time < state.cooldown_time {
        return ScalingAction::none(binding, old_instances, "within cooldown");
    }

    let learning_window =
        state.learning_time_multiplier as i64 * ctx.scaler_interval.as_millis() as i64;
    if ctx.now - state.learning_start_time < learning_window {
        return ScalingAction::none(binding, old_instances, "within learning window");
    }

    // Priority order: CPU > RAM > HTTP > latency.
    let components = [
        choose_component_action(state, Dimension::Cpu, ctx.now),
        choose_component_action(state, Dimension::Ram, ctx.now),
        choose_component_action(state, Dimension::Http, ctx.now),
        choose_component_action(state, Dimension::Latency, ctx.now),
    ];

    let first_up = components.iter().find(|c| c.direction == Direction::Up);
    let all_down = components.iter().all(|c| c.direction == Direction::Down);

    let (direction, deciding) = if let Some(up) = first_up {
        (Direction::Up, Some(up))
    } else if all_down {
        (Direction::Down, Some(&components[0]))
    } else {
        (Direction::Hold, None)
    };

    let Some(deciding) = deciding else {
        return ScalingAction::none(binding, old_instances, "all components within limits");
    };

    // Quotient gate: with too little traffic the other signals are not
    // trusted; only a downscale toward the floor may pass.
    if state.request.quotient_scaling_enabled
        && state.request.quotient < state.min_quotient
        && direction == Direction::Up
    {
        let mut action =
            ScalingAction::none(binding, old_instances, "quotient below minimum, upscale suppressed");
        action.reason = ScalingReason::Quotient;
        return action;
    }

    let step = ctx.static_scaling_size;
    let target = match direction {
        Direction::Up => old_instances.saturating_add(step),
        Direction::Down => old_instances.saturating_sub(step),
        Direction::Hold => old_instances,
    };
    let clamped = target.clamp(state.min_instances, state.max_instances);

    if clamped == old_instances {
        return ScalingAction::none(binding, old_instances, "clamped to instance bounds");
    }

    let verb = if direction == Direction::Up { "above upper" } else { "below lower" };
    ScalingAction {
        binding_id: binding.id.clone(),
        app_id: binding.resource_id.clone(),
        old_instances,
        new_instances: clamped,
        reason: deciding.dimension.reason(),
        needs_scaling: true,
        description: format!(
            "{} {} limit (value {})",
            deciding.dimension.describe(),
            verb,
            deciding.value.unwrap_or(-1)
        ),
    }
}
