use serde::{Deserialize, Serialize};

use crate::MergedTimeline;

/// Gap assumed when a timeline has fewer than two presses.
pub const DEFAULT_GAP_SECONDS: f64 = 0.15;
/// Upper bound of the rapid-click threshold.
pub const RAPID_CEILING_SECONDS: f64 = 0.15;

/// Press timing statistics used to tell rapid clicks from deliberate ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickAnalysis {
    pub average_gap: f64,
    pub median_gap: f64,
    /// Presses closer than this to the previous press count as rapid.
    pub threshold: f64,
    pub total_presses: usize,
    pub total_releases: usize,
}

impl ClickAnalysis {
    pub fn from_timeline(timeline: &MergedTimeline) -> Self {
        Self::with_ceiling(timeline, RAPID_CEILING_SECONDS)
    }

    /// Same as [`ClickAnalysis::from_timeline`] with an explicit threshold ceiling.
    pub fn with_ceiling(timeline: &MergedTimeline, ceiling: f64) -> Self {
        let press_ticks: Vec<u32> = timeline
            .events()
            .iter()
            .filter(|event| event.down)
            .map(|event| event.tick)
            .collect();

        let mut gaps: Vec<f64> = press_ticks
            .windows(2)
            .map(|pair| f64::from(pair[1].saturating_sub(pair[0])) / timeline.tps())
            .collect();

        let (average_gap, median_gap) = if gaps.is_empty() {
            (DEFAULT_GAP_SECONDS, DEFAULT_GAP_SECONDS)
        } else {
            let average = gaps.iter().sum::<f64>() / gaps.len() as f64;
            gaps.sort_by(f64::total_cmp);
            (average, gaps[gaps.len() / 2])
        };

        let analysis = Self {
            average_gap,
            median_gap,
            threshold: median_gap.min(ceiling),
            total_presses: press_ticks.len(),
            total_releases: timeline.len() - press_ticks.len(),
        };

        tracing::info!(
            average_gap = analysis.average_gap,
            median_gap = analysis.median_gap,
            threshold = analysis.threshold,
            presses = analysis.total_presses,
            releases = analysis.total_releases,
            "analysed click pattern"
        );
        analysis
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TimelineEvent;

    fn timeline(tps: f64, events: &[(u32, bool)]) -> MergedTimeline {
        let events = events
            .iter()
            .map(|&(tick, down)| TimelineEvent {
                tick,
                down,
                button: 1,
                player_one: true,
            })
            .collect();
        MergedTimeline::new(tps, events).unwrap()
    }

    #[test]
    fn lower_median_of_odd_gap_count() {
        // press gaps: 0.1, 0.1, 0.3 seconds
        let analysis = ClickAnalysis::from_timeline(&timeline(
            10.0,
            &[(0, true), (1, false), (1, true), (2, true), (4, false), (5, true)],
        ));

        assert!((analysis.average_gap - 0.5 / 3.0).abs() < 1e-9);
        assert!((analysis.median_gap - 0.1).abs() < 1e-9);
        assert!((analysis.threshold - 0.1).abs() < 1e-9);
        assert_eq!(analysis.total_presses, 4);
        assert_eq!(analysis.total_releases, 2);
    }

    #[test]
    fn even_gap_count_takes_upper_middle_index() {
        // gaps 0.4, 0.1 sorted to [0.1, 0.4]; index 1
        let analysis = ClickAnalysis::from_timeline(&timeline(10.0, &[(0, true), (4, true), (5, true)]));

        assert!((analysis.median_gap - 0.4).abs() < 1e-9);
        assert_eq!(analysis.threshold, RAPID_CEILING_SECONDS);
    }

    #[test]
    fn single_press_uses_defaults() {
        let analysis = ClickAnalysis::from_timeline(&timeline(240.0, &[(10, true), (20, false)]));

        assert_eq!(analysis.average_gap, 0.15);
        assert_eq!(analysis.median_gap, 0.15);
        assert_eq!(analysis.threshold, 0.15);
        assert_eq!(analysis.total_presses, 1);
    }

    #[test]
    fn release_only_timeline_uses_defaults() {
        let analysis = ClickAnalysis::from_timeline(&timeline(240.0, &[(3, false)]));

        assert_eq!(analysis.average_gap, 0.15);
        assert_eq!(analysis.threshold, 0.15);
        assert_eq!(analysis.total_presses, 0);
        assert_eq!(analysis.total_releases, 1);
    }

    #[test]
    fn gaps_are_tick_deltas_over_tick_rate() {
        let presses: Vec<(u32, bool)> = (0..40).map(|i| (i * 7, true)).collect();
        let analysis = ClickAnalysis::from_timeline(&timeline(60.0, &presses));

        assert_eq!(analysis.median_gap, 7.0 / 60.0);
        assert_eq!(analysis.threshold, 7.0 / 60.0);
    }

    #[test]
    fn simultaneous_presses_give_zero_threshold() {
        let analysis = ClickAnalysis::from_timeline(&timeline(240.0, &[(10, true), (10, true)]));

        assert_eq!(analysis.median_gap, 0.0);
        assert_eq!(analysis.threshold, 0.0);
    }
}
