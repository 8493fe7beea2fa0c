//! Metrics recording.
//!
//! # Metrics
//! - `lifeline_transitions_total` (counter): lifecycle transitions by `state`
//! - `lifeline_state` (gauge): current state as its ordinal
//! - `lifeline_requests_total` (counter): served requests by `method`, `status`
//!
//! Only the `metrics` facade is used; installing a recorder and exporter is
//! left to the embedding application.

use crate::lifecycle::state::State;

pub fn record_transition(state: State) {
    metrics::counter!("lifeline_transitions_total", "state" => state.as_str()).increment(1);
    metrics::gauge!("lifeline_state").set(state_ordinal(state));
}

pub fn record_request(method: &str, status: u16) {
    metrics::counter!(
        "lifeline_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

fn state_ordinal(state: State) -> f64 {
    match state {
        State::Idle => 0.0,
        State::Starting => 1.0,
        State::Running => 2.0,
        State::Draining => 3.0,
        State::Stopped => 4.0,
        State::Failed => 5.0,
    }
}
