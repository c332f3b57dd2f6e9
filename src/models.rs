use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Regular,
    Reinforcement,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Regular => "regular",
            Provenance::Reinforcement => "reinforcement",
        }
    }
}

/// One raw grade as delivered by the regular or reinforcement grade sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeRow {
    pub student_id: i64,
    pub subject_id: i64,
    pub term: String,
    pub value: f64,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermWeight {
    pub term: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AverageLabel {
    #[default]
    Regular,
    IncludesReinforcement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedTermAverage {
    pub term: String,
    pub average: f64,
    #[serde(rename = "ave_factor")]
    pub weighted_average: f64,
    pub label: AverageLabel,
}

impl MergedTermAverage {
    /// Zero-filled slot for a scheduled term with no contributing rows.
    pub fn placeholder(term: &str) -> Self {
        Self {
            term: term.to_string(),
            average: 0.0,
            weighted_average: 0.0,
            label: AverageLabel::Regular,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentSubjectReport {
    pub student_id: i64,
    pub subject_id: i64,
    #[serde(rename = "averages")]
    pub ordered_averages: Vec<MergedTermAverage>,
    pub partial_averages: Vec<f64>,
    #[serde(rename = "term_ave")]
    pub final_average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermAverage {
    pub term: String,
    pub average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentTermAverages {
    pub student_id: i64,
    pub subject_id: i64,
    pub averages: Vec<TermAverage>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectSummary {
    pub subject_id: i64,
    pub student_count: usize,
    pub mean_final: f64,
    pub reinforced_slots: usize,
}
