use crate::models::MergedTermAverage;
use crate::schedule::PeriodScheme;

fn weighted_at(ordered: &[MergedTermAverage], index: usize) -> f64 {
    ordered
        .get(index)
        .map(|slot| slot.weighted_average)
        .unwrap_or(0.0)
}

/// One partial per scheme pair: the sum of the pair's weighted averages.
/// Slots past the end of the schedule count as zero.
pub fn partial_averages(ordered: &[MergedTermAverage], scheme: &PeriodScheme) -> Vec<f64> {
    scheme
        .pairs()
        .iter()
        .map(|&(first, second)| weighted_at(ordered, first) + weighted_at(ordered, second))
        .collect()
}

/// Sum of every slot's weighted average divided by the number of periods.
pub fn final_average(ordered: &[MergedTermAverage], scheme: &PeriodScheme) -> f64 {
    let total: f64 = ordered.iter().map(|slot| slot.weighted_average).sum();
    total / scheme.divisor()
}
