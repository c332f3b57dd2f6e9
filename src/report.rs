use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{AverageLabel, StudentSubjectReport, SubjectSummary};
use crate::schedule::TermSchedule;

pub fn summarize_by_subject(reports: &[StudentSubjectReport]) -> Vec<SubjectSummary> {
    let mut map: BTreeMap<i64, (usize, f64, usize)> = BTreeMap::new();

    for report in reports {
        let entry = map.entry(report.subject_id).or_insert((0, 0.0, 0));
        entry.0 += 1;
        entry.1 += report.final_average;
        entry.2 += report
            .ordered_averages
            .iter()
            .filter(|slot| slot.label == AverageLabel::IncludesReinforcement)
            .count();
    }

    map.into_iter()
        .map(|(subject_id, (count, total_final, reinforced_slots))| SubjectSummary {
            subject_id,
            student_count: count,
            mean_final: if count == 0 {
                0.0
            } else {
                total_final / count as f64
            },
            reinforced_slots,
        })
        .collect()
}

pub fn build_report(
    classroom_id: i64,
    term: Option<&str>,
    generated_on: NaiveDate,
    schedule: &TermSchedule,
    reports: &[StudentSubjectReport],
) -> String {
    let summaries = summarize_by_subject(reports);
    let mut output = String::new();

    let _ = writeln!(output, "# Classroom {} Weighted Averages", classroom_id);
    let _ = writeln!(
        output,
        "Generated on {} ({})",
        generated_on,
        term.map(|t| format!("term {t} only"))
            .unwrap_or_else(|| "all terms".to_string())
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Schedule");
    for entry in schedule.iter() {
        let _ = writeln!(output, "- {}: weight {}", entry.term, entry.weight);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Subject Summary");

    if summaries.is_empty() {
        let _ = writeln!(output, "No grades recorded for this classroom.");
    } else {
        for summary in &summaries {
            let _ = writeln!(
                output,
                "- Subject {}: {} students, mean final {:.2}, {} slots with reinforcement",
                summary.subject_id, summary.student_count, summary.mean_final, summary.reinforced_slots
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Student Averages");

    let Some(first) = reports.first() else {
        let _ = writeln!(output, "No grades recorded for this classroom.");
        return output;
    };

    let mut header = String::from("| Student | Subject |");
    let mut divider = String::from("|---|---|");
    for entry in schedule.iter() {
        let _ = write!(header, " {} |", entry.term);
        divider.push_str("---|");
    }
    for index in 0..first.partial_averages.len() {
        let _ = write!(header, " P{} |", index + 1);
        divider.push_str("---|");
    }
    header.push_str(" Final |");
    divider.push_str("---|");
    let _ = writeln!(output, "{header}");
    let _ = writeln!(output, "{divider}");

    for report in reports {
        let mut line = format!("| {} | {} |", report.student_id, report.subject_id);
        for slot in &report.ordered_averages {
            let marker = match slot.label {
                AverageLabel::IncludesReinforcement => "*",
                AverageLabel::Regular => "",
            };
            let _ = write!(line, " {:.2}{} |", slot.weighted_average, marker);
        }
        for partial in &report.partial_averages {
            let _ = write!(line, " {:.2} |", partial);
        }
        let _ = write!(line, " {:.2} |", report.final_average);
        let _ = writeln!(output, "{line}");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "`*` includes reinforcement grades.");

    output
}
