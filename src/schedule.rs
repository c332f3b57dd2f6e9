use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context};
use serde::Deserialize;

use crate::models::TermWeight;

/// Ordered term names and weights. Slot order is the order entries were supplied in.
#[derive(Debug, Clone, PartialEq)]
pub struct TermSchedule {
    entries: Vec<TermWeight>,
}

impl TermSchedule {
    pub fn new(entries: Vec<TermWeight>) -> anyhow::Result<Self> {
        let mut seen = HashSet::new();
        for entry in &entries {
            if entry.term.trim().is_empty() {
                bail!("term name must not be empty");
            }
            if !entry.weight.is_finite() {
                bail!("invalid weight for term {}", entry.term);
            }
            if !seen.insert(entry.term.as_str()) {
                bail!("term {} appears more than once in the schedule", entry.term);
            }
        }
        Ok(Self { entries })
    }

    /// Parses `bimestre_1=0.7&sumativa_1=0.3&...`, keeping parameter order.
    pub fn parse_query(query: &str) -> anyhow::Result<Self> {
        let query = query.trim().trim_start_matches('?');
        let mut entries = Vec::new();

        for segment in query.split('&') {
            if segment.is_empty() {
                continue;
            }
            let (term, raw) = segment
                .split_once('=')
                .with_context(|| format!("missing weight for term {segment}"))?;
            entries.push(parse_entry(term, raw)?);
        }

        Self::new(entries)
    }

    /// Parses repeated `name=weight` arguments.
    pub fn from_pairs<S: AsRef<str>>(pairs: &[S]) -> anyhow::Result<Self> {
        let mut entries = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let pair = pair.as_ref();
            let (term, raw) = pair
                .split_once('=')
                .with_context(|| format!("expected name=weight, got {pair}"))?;
            entries.push(parse_entry(term, raw)?);
        }
        Self::new(entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TermWeight> {
        self.entries.iter()
    }

    /// Exact, case-sensitive lookup.
    pub fn weight_for(&self, term: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|entry| entry.term == term)
            .map(|entry| entry.weight)
    }

    pub fn position(&self, term: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.term == term)
    }
}

fn parse_entry(term: &str, raw: &str) -> anyhow::Result<TermWeight> {
    let weight: f64 = raw
        .trim()
        .parse()
        .with_context(|| format!("invalid weight for term {term}: {raw}"))?;
    Ok(TermWeight {
        term: term.trim().to_string(),
        weight,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SchemeKind {
    Bimester,
    Trimester,
}

/// Which schedule slots form each academic period, and what the slot total is divided by.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodScheme {
    pairs: Vec<(usize, usize)>,
    divisor: f64,
}

impl PeriodScheme {
    pub fn bimester() -> Self {
        Self {
            pairs: vec![(0, 1), (2, 3)],
            divisor: 2.0,
        }
    }

    pub fn trimester() -> Self {
        Self {
            pairs: vec![(0, 1), (2, 3), (4, 5)],
            divisor: 3.0,
        }
    }

    pub fn custom(pairs: Vec<(usize, usize)>, divisor: f64) -> anyhow::Result<Self> {
        if !(divisor.is_finite() && divisor > 0.0) {
            bail!("period divisor must be a positive number, got {divisor}");
        }
        Ok(Self { pairs, divisor })
    }

    pub fn from_kind(kind: SchemeKind) -> Self {
        match kind {
            SchemeKind::Bimester => Self::bimester(),
            SchemeKind::Trimester => Self::trimester(),
        }
    }

    /// Six-slot trimester schedules are the only ones with a fifth slot.
    pub fn for_schedule(schedule: &TermSchedule) -> Self {
        if schedule.len() >= 5 {
            Self::trimester()
        } else {
            Self::bimester()
        }
    }

    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }

    pub fn divisor(&self) -> f64 {
        self.divisor
    }
}

#[derive(Debug, Deserialize)]
struct ScheduleFile {
    scheme: Option<SchemeKind>,
    /// Slot index pairs for a non-standard period layout.
    periods: Option<Vec<[usize; 2]>>,
    divisor: Option<f64>,
    #[serde(default)]
    terms: Vec<ScheduleFileTerm>,
}

#[derive(Debug, Deserialize)]
struct ScheduleFileTerm {
    name: String,
    weight: f64,
}

/// Reads a schedule from TOML text. The scheme is only returned when the file names one
/// or lists its own periods; explicit periods win over a named scheme.
pub fn schedule_from_toml(text: &str) -> anyhow::Result<(TermSchedule, Option<PeriodScheme>)> {
    let file: ScheduleFile = toml::from_str(text).context("invalid schedule file")?;
    let entries = file
        .terms
        .into_iter()
        .map(|term| TermWeight {
            term: term.name,
            weight: term.weight,
        })
        .collect();
    let schedule = TermSchedule::new(entries)?;

    let scheme = match file.periods {
        Some(periods) => {
            let divisor = file.divisor.unwrap_or(periods.len() as f64);
            let pairs = periods.into_iter().map(|[a, b]| (a, b)).collect();
            Some(PeriodScheme::custom(pairs, divisor)?)
        }
        None => file.scheme.map(PeriodScheme::from_kind),
    };

    Ok((schedule, scheme))
}

pub fn load_schedule_file(path: &Path) -> anyhow::Result<(TermSchedule, Option<PeriodScheme>)> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read schedule file {}", path.display()))?;
    schedule_from_toml(&text)
}
