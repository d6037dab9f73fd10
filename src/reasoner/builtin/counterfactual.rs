use std::collections::BTreeMap;

use async_trait::async_trait;
use time::Duration;

use crate::{
    context::MemoryRecord,
    reasoner::{
        builtin::{engaged, mean, saturation},
        error::ReasonerError,
        ports::{Reasoner, ReasonerInput},
        types::{
            CounterfactualComparison, CounterfactualOption, ReasonerName, ReasonerOutput, Signal,
        },
    },
};

#[derive(Debug, Clone, Copy, Default)]
pub struct CounterfactualReasoner;

#[async_trait]
impl Reasoner for CounterfactualReasoner {
    fn name(&self) -> ReasonerName {
        ReasonerName::Counterfactual
    }

    async fn evaluate(&self, input: &ReasonerInput) -> Result<ReasonerOutput, ReasonerError> {
        let context = &input.context;
        let proposal = input.request.proposal();
        let samples: Vec<(&MemoryRecord, f64)> = engaged(&context.memory_slices).collect();
        let Some(overall) = mean(samples.iter().map(|(_, value)| *value)) else {
            return Ok(ReasonerOutput::insufficient(ReasonerName::Counterfactual, 0.0));
        };

        let baseline = proposal
            .format
            .as_deref()
            .and_then(|format| {
                mean(
                    samples
                        .iter()
                        .filter(|(record, _)| record.matches_format(format))
                        .map(|(_, value)| *value),
                )
            })
            .unwrap_or(overall);

        let mut alternatives = Vec::new();

        let mut by_slot: BTreeMap<(u8, u8), Vec<f64>> = BTreeMap::new();
        for (record, value) in &samples {
            by_slot
                .entry((
                    record.recorded_at.weekday().number_days_from_monday(),
                    record.recorded_at.hour(),
                ))
                .or_default()
                .push(*value);
        }
        if let Some(best_slot) = by_slot
            .into_values()
            .filter_map(mean)
            .max_by(|a, b| a.total_cmp(b))
        {
            alternatives.push(CounterfactualOption {
                label: "delay to the strongest posting window".to_string(),
                relative_outlook: outlook(best_slot - baseline),
                tradeoff: "later publication in exchange for a historically stronger slot"
                    .to_string(),
            });
        }

        let mut by_format: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for (record, value) in &samples {
            if let Some(format) = record.format.as_deref() {
                by_format
                    .entry(format.to_ascii_lowercase())
                    .or_default()
                    .push(*value);
            }
        }
        let strongest_format = by_format
            .into_iter()
            .filter_map(|(format, values)| mean(values).map(|avg| (format, avg)))
            .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)));
        if let Some((format, avg)) = strongest_format
            && proposal.format.as_deref() != Some(format.as_str())
        {
            alternatives.push(CounterfactualOption {
                label: format!("switch format to {format}"),
                relative_outlook: outlook(avg - baseline),
                tradeoff: "production effort moves to the creator's best-performing format"
                    .to_string(),
            });
        }

        let cadence = context.identity_snapshot.cadence_per_week.max(1.0);
        let last_week = input.evaluated_at - Duration::days(7);
        let recent = context
            .memory_slices
            .iter()
            .filter(|record| record.recorded_at >= last_week)
            .count() as f64;
        alternatives.push(CounterfactualOption {
            label: "hold and revisit next week".to_string(),
            relative_outlook: if recent >= cadence { 0.1 } else { -0.1 },
            tradeoff: "audience rest against lost momentum".to_string(),
        });

        let confidence = context.confidence * saturation(samples.len(), 8);
        Ok(ReasonerOutput::from_estimate(
            ReasonerName::Counterfactual,
            Signal::Counterfactual(CounterfactualComparison {
                baseline: "publish as proposed".to_string(),
                alternatives,
            }),
            confidence,
            input.confidence_floor,
        ))
    }
}

fn outlook(delta: f64) -> f64 {
    if delta.is_nan() {
        return 0.0;
    }
    delta.clamp(-1.0, 1.0)
}
