use async_trait::async_trait;
use time::Duration;

use crate::{
    context::{MemoryRecord, SoftConstraint},
    reasoner::{
        builtin::saturation,
        error::ReasonerError,
        ports::{Reasoner, ReasonerInput},
        types::{FatigueLevel, FatigueSignal, ReasonerName, ReasonerOutput, Signal},
    },
    types::ContentProposal,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct FatigueReasoner;

#[async_trait]
impl Reasoner for FatigueReasoner {
    fn name(&self) -> ReasonerName {
        ReasonerName::Fatigue
    }

    async fn evaluate(&self, input: &ReasonerInput) -> Result<ReasonerOutput, ReasonerError> {
        let context = &input.context;
        let records = &context.memory_slices;
        if records.is_empty() {
            return Ok(ReasonerOutput::insufficient(
                ReasonerName::Fatigue,
                context.confidence * 0.3,
            ));
        }

        let proposal = input.request.proposal();
        let now = input.evaluated_at;
        let last_week = now - Duration::days(7);
        let last_fortnight = now - Duration::days(14);

        let weekly_load = records
            .iter()
            .filter(|record| record.recorded_at >= last_week)
            .count() as f64;
        let similar_recent_posts = records
            .iter()
            .filter(|record| record.recorded_at >= last_fortnight)
            .filter(|record| is_similar(record, &proposal))
            .count() as u32;
        let days_since_topic = records
            .iter()
            .filter(|record| is_similar(record, &proposal))
            .map(|record| record.recorded_at)
            .max()
            .map(|last| (now - last).whole_days().max(0));

        let cadence = context.identity_snapshot.cadence_per_week.max(1.0);
        let load_ratio = weekly_load / cadence;
        let over_limit = context.preference_modifiers.iter().any(|modifier| {
            matches!(
                modifier,
                SoftConstraint::MaxPostsPerWeek { limit } if weekly_load >= f64::from(*limit)
            )
        });

        let level = if similar_recent_posts >= 3 || load_ratio >= 1.5 || over_limit {
            FatigueLevel::Saturated
        } else if similar_recent_posts >= 1 || load_ratio >= 1.0 {
            FatigueLevel::Moderate
        } else {
            FatigueLevel::Fresh
        };

        let confidence = context.confidence * (0.6 + 0.4 * saturation(records.len(), 10));
        Ok(ReasonerOutput::from_estimate(
            ReasonerName::Fatigue,
            Signal::Fatigue(FatigueSignal {
                level,
                similar_recent_posts,
                days_since_topic,
                weekly_load,
            }),
            confidence,
            input.confidence_floor,
        ))
    }
}

fn is_similar(record: &MemoryRecord, proposal: &ContentProposal) -> bool {
    match (&proposal.topic, &proposal.format) {
        (Some(topic), _) => record.matches_topic(topic),
        (None, Some(format)) => record.matches_format(format),
        (None, None) => false,
    }
}
