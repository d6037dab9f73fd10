use async_trait::async_trait;

use crate::{
    reasoner::{
        builtin::{engaged, format_constraint, mean, saturation, topic_constraint},
        error::ReasonerError,
        ports::{Reasoner, ReasonerInput},
        types::{ReasonerName, ReasonerOutput, Signal, ViabilitySignal},
    },
    types::clamp_unit,
};

const TOPIC_ABOVE_AVERAGE: &str = "past posts on this topic beat the creator's average";
const TOPIC_BELOW_AVERAGE: &str = "past posts on this topic trailed the creator's average";

#[derive(Debug, Clone, Copy, Default)]
pub struct ViabilityReasoner;

#[async_trait]
impl Reasoner for ViabilityReasoner {
    fn name(&self) -> ReasonerName {
        ReasonerName::Viability
    }

    async fn evaluate(&self, input: &ReasonerInput) -> Result<ReasonerOutput, ReasonerError> {
        let context = &input.context;
        let snapshot = &context.identity_snapshot;
        let proposal = input.request.proposal();

        let mut score: f64 = 0.5;
        let mut evidence: f64 = 0.2;
        let mut supporting = Vec::new();
        let mut opposing = Vec::new();

        let baseline = mean(engaged(&context.memory_slices).map(|(_, value)| value));

        match proposal.topic.as_deref() {
            Some(topic) => {
                evidence += 0.3;
                if snapshot.covers_topic(topic) {
                    score += 0.15;
                    supporting.push(format!("'{topic}' sits inside an established topic cluster"));
                } else {
                    score -= 0.1;
                    opposing.push(format!("'{topic}' is outside the creator's topic clusters"));
                }

                let topic_history: Vec<f64> = engaged(&context.memory_slices)
                    .filter(|(record, _)| record.matches_topic(topic))
                    .map(|(_, value)| value)
                    .collect();
                let topic_avg = mean(topic_history.iter().copied());
                if let (Some(topic_avg), Some(baseline)) = (topic_avg, baseline) {
                    evidence += 0.4 * saturation(topic_history.len(), 5);
                    score += (topic_avg - baseline) * 0.5;
                    if topic_avg >= baseline {
                        supporting.push(TOPIC_ABOVE_AVERAGE.to_string());
                    } else {
                        opposing.push(TOPIC_BELOW_AVERAGE.to_string());
                    }
                }

                let (prefer, avoid) = topic_constraint(&context.preference_modifiers, topic);
                if let Some(weight) = prefer {
                    score += 0.1 * weight;
                    supporting.push("matches a stated topic preference".to_string());
                }
                if let Some(weight) = avoid {
                    score -= 0.2 * weight;
                    opposing.push("conflicts with a stated topic avoidance".to_string());
                }
            }
            None => opposing.push("proposal does not name a topic".to_string()),
        }

        if let Some(format) = proposal.format.as_deref() {
            evidence += 0.1;
            if snapshot.uses_format(format) {
                score += 0.1;
                supporting.push(format!("'{format}' is a format the creator already ships"));
            } else {
                score -= 0.05;
                opposing.push(format!("'{format}' is a new format for this creator"));
            }

            let (prefer, avoid) = format_constraint(&context.preference_modifiers, format);
            if let Some(weight) = prefer {
                score += 0.1 * weight;
                supporting.push("matches a stated format preference".to_string());
            }
            if let Some(weight) = avoid {
                score -= 0.1 * weight;
                opposing.push("conflicts with a stated format avoidance".to_string());
            }
        }

        let confidence = context.confidence * evidence.min(1.0);
        Ok(ReasonerOutput::from_estimate(
            ReasonerName::Viability,
            Signal::Viability(ViabilitySignal {
                score: clamp_unit(score),
                supporting,
                opposing,
            }),
            confidence,
            input.confidence_floor,
        ))
    }
}
