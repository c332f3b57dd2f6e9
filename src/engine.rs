use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::merge::merge_rows;
use crate::models::{
    GradeRow, MergedTermAverage, Provenance, StudentSubjectReport, StudentTermAverages,
    TermAverage,
};
use crate::reduce::{final_average, partial_averages};
use crate::schedule::{PeriodScheme, TermSchedule};
use crate::sequence::sequence_slots;

/// Turns one classroom's regular and reinforcement rows into weighted per-subject reports,
/// one per (student, subject) pair in the input, sorted by student then subject. Pairs whose
/// rows all fall outside the schedule still get a report of zero placeholders.
pub fn build_reports(
    rows: &[GradeRow],
    schedule: &TermSchedule,
    scheme: &PeriodScheme,
) -> Vec<StudentSubjectReport> {
    let outcome = merge_rows(rows, schedule);

    for (term, count) in &outcome.dropped {
        warn!(term = %term, rows = count, "ignoring grades for a term missing from the schedule");
    }

    let mut groups: BTreeMap<(i64, i64), Vec<&MergedTermAverage>> = outcome
        .pairs
        .iter()
        .map(|&pair| (pair, Vec::new()))
        .collect();
    for (key, merged) in &outcome.merged {
        groups
            .entry((key.student_id, key.subject_id))
            .or_default()
            .push(merged);
    }

    groups
        .into_iter()
        .map(|((student_id, subject_id), merged)| {
            let ordered_averages = sequence_slots(schedule, merged);
            let partials = partial_averages(&ordered_averages, scheme);
            let final_average = final_average(&ordered_averages, scheme);

            debug!(
                student_id,
                subject_id,
                ?partials,
                final_average,
                "computed weighted averages"
            );

            StudentSubjectReport {
                student_id,
                subject_id,
                ordered_averages,
                partial_averages: partials,
                final_average,
            }
        })
        .collect()
}

/// Unweighted mean of regular grades per term, terms in name order.
pub fn term_averages(rows: &[GradeRow]) -> Vec<StudentTermAverages> {
    let mut totals: BTreeMap<(i64, i64), BTreeMap<&str, (f64, usize)>> = BTreeMap::new();

    for row in rows
        .iter()
        .filter(|row| row.provenance == Provenance::Regular)
    {
        let entry = totals
            .entry((row.student_id, row.subject_id))
            .or_default()
            .entry(row.term.as_str())
            .or_insert((0.0, 0));
        entry.0 += row.value;
        entry.1 += 1;
    }

    totals
        .into_iter()
        .map(|((student_id, subject_id), terms)| StudentTermAverages {
            student_id,
            subject_id,
            averages: terms
                .into_iter()
                .map(|(term, (sum, count))| TermAverage {
                    term: term.to_string(),
                    average: sum / count as f64,
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AverageLabel;

    fn row(student_id: i64, subject_id: i64, term: &str, value: f64) -> GradeRow {
        GradeRow {
            student_id,
            subject_id,
            term: term.to_string(),
            value,
            provenance: Provenance::Regular,
        }
    }

    fn reinforcement(student_id: i64, subject_id: i64, term: &str, value: f64) -> GradeRow {
        GradeRow {
            provenance: Provenance::Reinforcement,
            ..row(student_id, subject_id, term, value)
        }
    }

    fn bimester_schedule() -> TermSchedule {
        TermSchedule::parse_query("bimestre_1=0.7&sumativa_1=0.3&bimestre_2=0.7&sumativa_2=0.3")
            .unwrap()
    }

    #[test]
    fn bimester_scenario_matches_expected_totals() {
        let rows = vec![
            row(1, 10, "bimestre_1", 6.0),
            row(1, 10, "sumativa_1", 5.0),
            row(1, 10, "bimestre_2", 5.0),
            row(1, 10, "sumativa_2", 7.0),
        ];

        let reports = build_reports(&rows, &bimester_schedule(), &PeriodScheme::bimester());
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        let weighted: Vec<f64> = report
            .ordered_averages
            .iter()
            .map(|slot| slot.weighted_average)
            .collect();
        for (actual, expected) in weighted.iter().zip([4.2, 1.5, 3.5, 2.1]) {
            assert!((actual - expected).abs() < 1e-9);
        }
        assert!((report.partial_averages[0] - 5.7).abs() < 1e-9);
        assert!((report.partial_averages[1] - 5.6).abs() < 1e-9);
        assert!((report.final_average - 5.65).abs() < 1e-9);
    }

    #[test]
    fn trimester_scenario_uses_three_periods() {
        let schedule = TermSchedule::parse_query(
            "trimestre_1=0.7&sumativa_t1=0.3&trimestre_2=0.7&sumativa_t2=0.3&trimestre_3=0.7&sumativa_t3=0.3",
        )
        .unwrap();
        let rows: Vec<GradeRow> = schedule
            .iter()
            .map(|entry| row(2, 20, &entry.term, 9.0))
            .collect();

        let reports = build_reports(&rows, &schedule, &PeriodScheme::for_schedule(&schedule));
        let report = &reports[0];
        assert_eq!(report.partial_averages.len(), 3);
        for partial in &report.partial_averages {
            assert!((partial - 9.0).abs() < 1e-9);
        }
        assert!((report.final_average - 9.0).abs() < 1e-9);
    }

    #[test]
    fn sparse_input_keeps_full_shape() {
        let rows = vec![reinforcement(3, 30, "bimestre_2", 8.0)];

        let reports = build_reports(&rows, &bimester_schedule(), &PeriodScheme::bimester());
        let report = &reports[0];
        assert_eq!(report.ordered_averages.len(), 4);
        assert_eq!(
            report.ordered_averages[0],
            MergedTermAverage::placeholder("bimestre_1")
        );
        assert_eq!(
            report.ordered_averages[2].label,
            AverageLabel::IncludesReinforcement
        );
        assert_eq!(report.partial_averages[0], 0.0);
        assert!((report.partial_averages[1] - 5.6).abs() < 1e-9);
        assert!((report.final_average - 2.8).abs() < 1e-9);
    }

    #[test]
    fn pooled_reinforcement_flows_into_report() {
        let rows = vec![
            row(1, 10, "bimestre_1", 6.0),
            row(1, 10, "bimestre_1", 8.0),
            reinforcement(1, 10, "bimestre_1", 10.0),
        ];

        let reports = build_reports(&rows, &bimester_schedule(), &PeriodScheme::bimester());
        let slot = &reports[0].ordered_averages[0];
        assert!((slot.average - 8.0).abs() < 1e-9);
        assert!((slot.weighted_average - 5.6).abs() < 1e-9);
        assert_eq!(slot.label, AverageLabel::IncludesReinforcement);
    }

    #[test]
    fn unknown_terms_never_reach_output() {
        let rows = vec![
            row(1, 10, "bimestre_1", 6.0),
            row(1, 10, "quimestre_1", 10.0),
            row(4, 40, "quimestre_1", 10.0),
        ];
        let schedule = bimester_schedule();

        let reports = build_reports(&rows, &schedule, &PeriodScheme::bimester());
        let keys: Vec<(i64, i64)> = reports
            .iter()
            .map(|report| (report.student_id, report.subject_id))
            .collect();
        assert_eq!(keys, vec![(1, 10), (4, 40)]);
        assert!(reports
            .iter()
            .flat_map(|report| report.ordered_averages.iter())
            .all(|slot| slot.term != "quimestre_1"));
        assert!((reports[0].ordered_averages[0].average - 6.0).abs() < 1e-9);
    }

    #[test]
    fn pair_with_only_unknown_terms_gets_placeholder_report() {
        let rows = vec![row(4, 40, "quimestre_1", 10.0)];
        let schedule = bimester_schedule();

        let reports = build_reports(&rows, &schedule, &PeriodScheme::bimester());
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        let expected: Vec<MergedTermAverage> = schedule
            .iter()
            .map(|entry| MergedTermAverage::placeholder(&entry.term))
            .collect();
        assert_eq!(report.ordered_averages, expected);
        assert_eq!(report.partial_averages, vec![0.0, 0.0]);
        assert_eq!(report.final_average, 0.0);
    }

    #[test]
    fn empty_input_yields_no_reports() {
        let reports = build_reports(&[], &bimester_schedule(), &PeriodScheme::bimester());
        assert!(reports.is_empty());
    }

    #[test]
    fn reports_are_sorted_and_repeatable() {
        let rows = vec![
            row(2, 11, "bimestre_1", 7.0),
            row(1, 12, "sumativa_1", 6.0),
            row(2, 10, "bimestre_2", 9.0),
            reinforcement(1, 10, "bimestre_1", 4.0),
        ];
        let schedule = bimester_schedule();
        let scheme = PeriodScheme::bimester();

        let first = build_reports(&rows, &schedule, &scheme);
        let second = build_reports(&rows, &schedule, &scheme);
        assert_eq!(first, second);

        let keys: Vec<(i64, i64)> = first
            .iter()
            .map(|report| (report.student_id, report.subject_id))
            .collect();
        assert_eq!(keys, vec![(1, 10), (1, 12), (2, 10), (2, 11)]);
    }

    #[test]
    fn plain_averages_skip_reinforcement() {
        let rows = vec![
            row(1, 10, "sumativa_1", 6.0),
            row(1, 10, "bimestre_1", 7.0),
            row(1, 10, "bimestre_1", 9.0),
            reinforcement(1, 10, "bimestre_1", 2.0),
        ];

        let averages = term_averages(&rows);
        assert_eq!(averages.len(), 1);
        let terms: Vec<&str> = averages[0]
            .averages
            .iter()
            .map(|average| average.term.as_str())
            .collect();
        assert_eq!(terms, vec!["bimestre_1", "sumativa_1"]);
        assert!((averages[0].averages[0].average - 8.0).abs() < 1e-9);
    }
}
