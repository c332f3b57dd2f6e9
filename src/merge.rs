use std::collections::{BTreeMap, BTreeSet};

use crate::models::{AverageLabel, GradeRow, MergedTermAverage, Provenance};
use crate::schedule::TermSchedule;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SlotKey {
    pub student_id: i64,
    pub subject_id: i64,
    pub term: String,
}

#[derive(Debug, Default)]
struct SlotTotals {
    regular_sum: f64,
    regular_count: usize,
    reinforcement_sum: f64,
    reinforcement_count: usize,
}

impl SlotTotals {
    fn add(&mut self, row: &GradeRow) {
        match row.provenance {
            Provenance::Regular => {
                self.regular_sum += row.value;
                self.regular_count += 1;
            }
            Provenance::Reinforcement => {
                self.reinforcement_sum += row.value;
                self.reinforcement_count += 1;
            }
        }
    }

    fn regular_mean(&self) -> Option<f64> {
        if self.regular_count == 0 {
            None
        } else {
            Some(self.regular_sum / self.regular_count as f64)
        }
    }

    /// Reinforcement values are pooled with the regular ones, not averaged against their mean.
    fn average(&self) -> (f64, AverageLabel) {
        if self.reinforcement_count == 0 {
            return (self.regular_mean().unwrap_or(0.0), AverageLabel::Regular);
        }
        let total = self.regular_sum + self.reinforcement_sum;
        let count = (self.regular_count + self.reinforcement_count) as f64;
        (total / count, AverageLabel::IncludesReinforcement)
    }
}

#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub merged: BTreeMap<SlotKey, MergedTermAverage>,
    /// Every (student, subject) pair seen in the input, including pairs whose rows were all dropped.
    pub pairs: BTreeSet<(i64, i64)>,
    /// Rows whose term is not in the schedule, counted per term name.
    pub dropped: BTreeMap<String, usize>,
}

pub fn weigh(average: f64, weight: f64) -> f64 {
    average * weight
}

pub fn merge_rows(rows: &[GradeRow], schedule: &TermSchedule) -> MergeOutcome {
    let mut totals: BTreeMap<SlotKey, SlotTotals> = BTreeMap::new();
    let mut dropped: BTreeMap<String, usize> = BTreeMap::new();
    let mut pairs: BTreeSet<(i64, i64)> = BTreeSet::new();

    for row in rows {
        pairs.insert((row.student_id, row.subject_id));
        if schedule.weight_for(&row.term).is_none() {
            *dropped.entry(row.term.clone()).or_insert(0) += 1;
            continue;
        }

        let key = SlotKey {
            student_id: row.student_id,
            subject_id: row.subject_id,
            term: row.term.clone(),
        };
        totals.entry(key).or_default().add(row);
    }

    let merged = totals
        .into_iter()
        .filter_map(|(key, slot)| {
            let weight = schedule.weight_for(&key.term)?;
            let (average, label) = slot.average();
            let merged = MergedTermAverage {
                term: key.term.clone(),
                average,
                weighted_average: weigh(average, weight),
                label,
            };
            Some((key, merged))
        })
        .collect();

    MergeOutcome {
        merged,
        pairs,
        dropped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(term: &str, value: f64, provenance: Provenance) -> GradeRow {
        GradeRow {
            student_id: 1,
            subject_id: 10,
            term: term.to_string(),
            value,
            provenance,
        }
    }

    fn key(term: &str) -> SlotKey {
        SlotKey {
            student_id: 1,
            subject_id: 10,
            term: term.to_string(),
        }
    }

    #[test]
    fn reinforcement_is_pooled_with_regular_values() {
        let schedule = TermSchedule::parse_query("bimestre_1=0.7").unwrap();
        let rows = vec![
            row("bimestre_1", 6.0, Provenance::Regular),
            row("bimestre_1", 8.0, Provenance::Regular),
            row("bimestre_1", 10.0, Provenance::Reinforcement),
        ];

        let outcome = merge_rows(&rows, &schedule);
        let merged = &outcome.merged[&key("bimestre_1")];
        assert!((merged.average - 8.0).abs() < 1e-9);
        assert_eq!(merged.label, AverageLabel::IncludesReinforcement);
    }

    #[test]
    fn regular_only_slot_uses_plain_mean() {
        let schedule = TermSchedule::parse_query("bimestre_1=0.7").unwrap();
        let rows = vec![
            row("bimestre_1", 7.0, Provenance::Regular),
            row("bimestre_1", 9.0, Provenance::Regular),
        ];

        let outcome = merge_rows(&rows, &schedule);
        let merged = &outcome.merged[&key("bimestre_1")];
        assert!((merged.average - 8.0).abs() < 1e-9);
        assert!((merged.weighted_average - 5.6).abs() < 1e-9);
        assert_eq!(merged.label, AverageLabel::Regular);
    }

    #[test]
    fn reinforcement_only_slot_is_still_averaged() {
        let schedule = TermSchedule::parse_query("sumativa_1=0.3").unwrap();
        let rows = vec![row("sumativa_1", 5.0, Provenance::Reinforcement)];

        let outcome = merge_rows(&rows, &schedule);
        let merged = &outcome.merged[&key("sumativa_1")];
        assert!((merged.average - 5.0).abs() < 1e-9);
        assert!((merged.weighted_average - 1.5).abs() < 1e-9);
        assert_eq!(merged.label, AverageLabel::IncludesReinforcement);
    }

    #[test]
    fn unknown_terms_are_dropped_and_counted() {
        let schedule = TermSchedule::parse_query("bimestre_1=0.7").unwrap();
        let rows = vec![
            row("bimestre_1", 7.0, Provenance::Regular),
            row("BIMESTRE_1", 3.0, Provenance::Regular),
            row("recuperacion", 9.0, Provenance::Reinforcement),
        ];

        let outcome = merge_rows(&rows, &schedule);
        assert_eq!(outcome.merged.len(), 1);
        assert!((outcome.merged[&key("bimestre_1")].average - 7.0).abs() < 1e-9);
        assert_eq!(outcome.dropped.get("BIMESTRE_1"), Some(&1));
        assert_eq!(outcome.dropped.get("recuperacion"), Some(&1));
        assert!(outcome.pairs.contains(&(1, 10)));
    }

    #[test]
    fn weights_are_not_normalized() {
        assert!((weigh(8.0, 0.7) - 5.6).abs() < 1e-9);
        assert!((weigh(8.0, 1.5) - 12.0).abs() < 1e-9);
    }
}
