use async_trait::async_trait;

use crate::{
    context::GrowthStage,
    reasoner::{
        builtin::{engaged, format_constraint, mean, saturation, topic_constraint},
        error::ReasonerError,
        ports::{Reasoner, ReasonerInput},
        types::{ReasonerName, ReasonerOutput, RiskBand, RiskLevel, Signal},
    },
};

#[derive(Debug, Clone, Copy, Default)]
pub struct RiskReasoner;

#[async_trait]
impl Reasoner for RiskReasoner {
    fn name(&self) -> ReasonerName {
        ReasonerName::Risk
    }

    async fn evaluate(&self, input: &ReasonerInput) -> Result<ReasonerOutput, ReasonerError> {
        let context = &input.context;
        let snapshot = &context.identity_snapshot;
        let proposal = input.request.proposal();

        let mut severity = 0u32;
        let mut flags = Vec::new();

        if let Some(topic) = proposal.topic.as_deref() {
            let (_, avoid) = topic_constraint(&context.preference_modifiers, topic);
            if avoid.is_some() {
                severity += 2;
                flags.push("topic conflicts with a stated avoidance".to_string());
            }
            if !snapshot.covers_topic(topic)
                && matches!(
                    snapshot.growth_stage,
                    GrowthStage::Established | GrowthStage::Plateau
                )
            {
                severity += 1;
                flags.push("off-cluster topic for an established audience".to_string());
            }

            let baseline = mean(engaged(&context.memory_slices).map(|(_, value)| value));
            let topic_avg = mean(
                engaged(&context.memory_slices)
                    .filter(|(record, _)| record.matches_topic(topic))
                    .map(|(_, value)| value),
            );
            if let (Some(baseline), Some(topic_avg)) = (baseline, topic_avg)
                && topic_avg < baseline * 0.5
            {
                severity += 1;
                flags.push("past posts on this topic underperformed sharply".to_string());
            }
        }

        if let (Some(tone), Some(usual)) = (proposal.tone.as_deref(), snapshot.tone.as_deref())
            && !tone.eq_ignore_ascii_case(usual)
        {
            severity += 1;
            flags.push(format!("tone '{tone}' departs from the usual '{usual}' voice"));
        }

        if let Some(format) = proposal.format.as_deref() {
            let (_, avoid) = format_constraint(&context.preference_modifiers, format);
            if avoid.is_some() {
                severity += 1;
                flags.push("format conflicts with a stated avoidance".to_string());
            }
            if !snapshot.uses_format(format) && snapshot.growth_stage == GrowthStage::Emerging {
                severity += 1;
                flags.push("untested format at an early growth stage".to_string());
            }
        }

        let level = match severity {
            0 => RiskLevel::Low,
            1 | 2 => RiskLevel::Medium,
            _ => RiskLevel::High,
        };

        let coverage = if proposal.topic.is_some() { 0.8 } else { 0.4 };
        let history = 0.2 * saturation(context.memory_slices.len(), 5);
        let confidence = context.confidence * (coverage + history).min(1.0);

        Ok(ReasonerOutput::from_estimate(
            ReasonerName::Risk,
            Signal::Risk(RiskBand { level, flags }),
            confidence,
            input.confidence_floor,
        ))
    }
}
