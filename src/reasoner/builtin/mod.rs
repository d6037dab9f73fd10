//! Heuristic reasoners that work purely from the loaded creator context.

use std::sync::Arc;

use crate::{
    context::{MemoryRecord, SoftConstraint},
    reasoner::ports::Reasoner,
};

pub mod counterfactual;
pub mod fatigue;
pub mod risk;
pub mod timing;
pub mod viability;

pub use counterfactual::CounterfactualReasoner;
pub use fatigue::FatigueReasoner;
pub use risk::RiskReasoner;
pub use timing::TimingReasoner;
pub use viability::ViabilityReasoner;

pub fn builtin_reasoners() -> Vec<Arc<dyn Reasoner>> {
    vec![
        Arc::new(ViabilityReasoner),
        Arc::new(TimingReasoner),
        Arc::new(FatigueReasoner),
        Arc::new(RiskReasoner),
        Arc::new(CounterfactualReasoner),
    ]
}

pub(crate) fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    (count > 0).then(|| sum / count as f64)
}

pub(crate) fn engaged(records: &[MemoryRecord]) -> impl Iterator<Item = (&MemoryRecord, f64)> {
    records
        .iter()
        .filter_map(|record| record.engagement.map(|value| (record, value.clamp(0.0, 1.0))))
}

pub(crate) fn saturation(count: usize, enough: usize) -> f64 {
    (count as f64 / enough.max(1) as f64).min(1.0)
}

pub(crate) fn topic_constraint(
    modifiers: &[SoftConstraint],
    topic: &str,
) -> (Option<f64>, Option<f64>) {
    let mut prefer = None;
    let mut avoid = None;
    for modifier in modifiers {
        match modifier {
            SoftConstraint::PreferTopic { topic: t, weight } if t.eq_ignore_ascii_case(topic) => {
                prefer = Some(weight.clamp(0.0, 1.0));
            }
            SoftConstraint::AvoidTopic { topic: t, weight } if t.eq_ignore_ascii_case(topic) => {
                avoid = Some(weight.clamp(0.0, 1.0));
            }
            _ => {}
        }
    }
    (prefer, avoid)
}

pub(crate) fn format_constraint(
    modifiers: &[SoftConstraint],
    format: &str,
) -> (Option<f64>, Option<f64>) {
    let mut prefer = None;
    let mut avoid = None;
    for modifier in modifiers {
        match modifier {
            SoftConstraint::PreferFormat { format: f, weight }
                if f.eq_ignore_ascii_case(format) =>
            {
                prefer = Some(weight.clamp(0.0, 1.0));
            }
            SoftConstraint::AvoidFormat { format: f, weight }
                if f.eq_ignore_ascii_case(format) =>
            {
                avoid = Some(weight.clamp(0.0, 1.0));
            }
            _ => {}
        }
    }
    (prefer, avoid)
}
