use std::collections::BTreeMap;

use async_trait::async_trait;
use time::Weekday;

use crate::{
    context::MemoryRecord,
    reasoner::{
        builtin::{engaged, mean, saturation},
        error::ReasonerError,
        ports::{Reasoner, ReasonerInput},
        types::{PostingWindow, ReasonerName, ReasonerOutput, Signal, TimingSignal},
    },
};

const MIN_PLATFORM_SAMPLES: usize = 3;
const MAX_ALTERNATIVES: usize = 2;

#[derive(Debug, Clone, Copy, Default)]
pub struct TimingReasoner;

#[async_trait]
impl Reasoner for TimingReasoner {
    fn name(&self) -> ReasonerName {
        ReasonerName::Timing
    }

    async fn evaluate(&self, input: &ReasonerInput) -> Result<ReasonerOutput, ReasonerError> {
        let context = &input.context;
        let proposal = input.request.proposal();

        let all: Vec<(&MemoryRecord, f64)> = engaged(&context.memory_slices).collect();
        let on_platform: Vec<(&MemoryRecord, f64)> = match proposal.platform.as_deref() {
            Some(platform) => all
                .iter()
                .copied()
                .filter(|(record, _)| {
                    record
                        .platform
                        .as_deref()
                        .is_some_and(|known| known.eq_ignore_ascii_case(platform))
                })
                .collect(),
            None => Vec::new(),
        };
        let samples = if on_platform.len() >= MIN_PLATFORM_SAMPLES {
            on_platform
        } else {
            all
        };

        if samples.is_empty() {
            return Ok(ReasonerOutput::insufficient(ReasonerName::Timing, 0.0));
        }

        let mut buckets: BTreeMap<(u8, u8), Vec<f64>> = BTreeMap::new();
        for (record, value) in &samples {
            let weekday = record.recorded_at.weekday().number_days_from_monday();
            buckets
                .entry((weekday, record.recorded_at.hour()))
                .or_default()
                .push(*value);
        }

        let mut ranked: Vec<((u8, u8), f64)> = buckets
            .into_iter()
            .filter_map(|(slot, values)| mean(values).map(|avg| (slot, avg)))
            .collect();
        // Highest engagement first; ties resolve to the earliest slot in the week.
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut windows = ranked.into_iter().map(|((weekday, hour), _)| PostingWindow {
            weekday: weekday_name(weekday).to_string(),
            hour_utc: hour,
        });
        let Some(best_window) = windows.next() else {
            return Ok(ReasonerOutput::insufficient(ReasonerName::Timing, 0.0));
        };
        let alternatives = windows.take(MAX_ALTERNATIVES).collect();

        let confidence = context.confidence * saturation(samples.len(), 6);
        Ok(ReasonerOutput::from_estimate(
            ReasonerName::Timing,
            Signal::Timing(TimingSignal {
                best_window,
                alternatives,
                sample_size: samples.len(),
            }),
            confidence,
            input.confidence_floor,
        ))
    }
}

fn weekday_name(days_from_monday: u8) -> &'static str {
    match Weekday::Monday.nth_next(days_from_monday) {
        Weekday::Monday => "monday",
        Weekday::Tuesday => "tuesday",
        Weekday::Wednesday => "wednesday",
        Weekday::Thursday => "thursday",
        Weekday::Friday => "friday",
        Weekday::Saturday => "saturday",
        Weekday::Sunday => "sunday",
    }
}
