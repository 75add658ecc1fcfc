use std::panic::{catch_unwind, AssertUnwindSafe};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{Evaluation, EvaluationContext, FlagValue, Reason};

/// Analytics event emitted after a flag was evaluated from the store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationEvent {
    pub flag_key: String,
    pub value: FlagValue,
    pub variation_index: Option<usize>,
    pub reason: Reason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    pub in_experiment: bool,
    pub context: EvaluationContext,
    pub timestamp: DateTime<Utc>,
}

impl EvaluationEvent {
    pub(crate) fn new(evaluation: &Evaluation, context: &EvaluationContext) -> Self {
        EvaluationEvent {
            flag_key: evaluation.key.clone(),
            value: evaluation.value.clone(),
            variation_index: evaluation.variation_index,
            reason: evaluation.reason,
            rule_id: evaluation.rule_id.clone(),
            in_experiment: evaluation.in_experiment,
            context: context.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Receives evaluation events, e.g. to forward them to a data warehouse.
///
/// Any `Fn(EvaluationEvent)` is a sink.
pub trait EventSink {
    fn on_evaluation(&self, event: EvaluationEvent);
}

pub(crate) struct NoopEventSink;
impl EventSink for NoopEventSink {
    fn on_evaluation(&self, _event: EvaluationEvent) {}
}

impl<T: Fn(EvaluationEvent)> EventSink for T {
    fn on_evaluation(&self, event: EvaluationEvent) {
        self(event);
    }
}

/// Hand `event` to `sink`. A panicking sink is logged and otherwise ignored.
pub(crate) fn dispatch(sink: &(dyn EventSink + Send + Sync + '_), event: EvaluationEvent) {
    let flag_key = event.flag_key.clone();
    if catch_unwind(AssertUnwindSafe(|| sink.on_evaluation(event))).is_err() {
        log::warn!(target: "flagvisor", flag_key; "event sink panicked, event dropped");
    }
}
