use crate::models::{AggregateTrend, TrendLabel, VitalChannel, VitalReading};

use super::types::{ChannelTrend, TrendReport};

/// Number of readings averaged at each end of the series.
const WINDOW: usize = 3;

/// Minimum readings required before any trend is reported.
pub const MIN_READINGS: usize = 2;

/// Computes per-channel and aggregate trends from a vitals series.
pub struct VitalTrendAnalyzer;

impl VitalTrendAnalyzer {
    /// Fewer than two readings is not an error: every channel and the
    /// aggregate come back as `insufficient-data`.
    pub fn analyze(vitals: &[VitalReading]) -> TrendReport {
        if vitals.len() < MIN_READINGS {
            return TrendReport {
                channels: VitalChannel::ALL
                    .iter()
                    .map(|c| ChannelTrend::insufficient(*c))
                    .collect(),
                aggregate: AggregateTrend::InsufficientData,
            };
        }

        let mut ordered: Vec<&VitalReading> = vitals.iter().collect();
        ordered.sort_by_key(|v| v.timestamp);

        let channels: Vec<ChannelTrend> = VitalChannel::ALL
            .iter()
            .map(|channel| Self::channel_trend(*channel, &ordered))
            .collect();
        let aggregate = aggregate_trend(&channels);

        TrendReport {
            channels,
            aggregate,
        }
    }

    fn channel_trend(channel: VitalChannel, ordered: &[&VitalReading]) -> ChannelTrend {
        let values: Vec<f64> = ordered
            .iter()
            .filter_map(|v| v.channel_value(channel))
            .collect();
        if values.len() < MIN_READINGS {
            return ChannelTrend::insufficient(channel);
        }

        let baseline = mean(&values[..WINDOW.min(values.len())]);
        let recent = mean(&values[values.len().saturating_sub(WINDOW)..]);

        ChannelTrend {
            channel,
            label: classify_change(baseline, recent, channel.change_threshold()),
            baseline_mean: Some(baseline),
            recent_mean: Some(recent),
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Label the move from `baseline` to `recent`. The relative change must
/// strictly exceed `threshold` either way.
pub fn classify_change(baseline: f64, recent: f64, threshold: f64) -> TrendLabel {
    if baseline == 0.0 {
        return TrendLabel::Stable;
    }
    let change = (recent - baseline) / baseline.abs();
    if change > threshold {
        TrendLabel::Increasing
    } else if change < -threshold {
        TrendLabel::Decreasing
    } else {
        TrendLabel::Stable
    }
}

/// Any adverse channel marks the patient as deteriorating, even when another
/// channel improves.
pub fn aggregate_trend(channels: &[ChannelTrend]) -> AggregateTrend {
    if channels
        .iter()
        .all(|c| c.label == TrendLabel::InsufficientData)
    {
        return AggregateTrend::InsufficientData;
    }
    if channels.iter().all(|c| c.label == TrendLabel::Stable) {
        return AggregateTrend::Stable;
    }
    if channels.iter().any(ChannelTrend::is_adverse) {
        return AggregateTrend::Deteriorating;
    }
    if channels.iter().any(ChannelTrend::is_favorable) {
        return AggregateTrend::Improving;
    }
    AggregateTrend::Variable
}
