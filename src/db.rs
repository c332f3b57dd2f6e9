use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context};
use serde::Deserialize;
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{GradeRow, Provenance};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn grade_table(provenance: Provenance) -> &'static str {
    match provenance {
        Provenance::Regular => "classroom_averages.grades",
        Provenance::Reinforcement => "classroom_averages.reinforcement_grades",
    }
}

async fn upsert_term(pool: &PgPool, name: &str) -> anyhow::Result<i32> {
    let id: i32 = sqlx::query(
        r#"
        INSERT INTO classroom_averages.terms (name)
        VALUES ($1)
        ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
        RETURNING id
        "#,
    )
    .bind(name)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to upsert term {name}"))?
    .get("id");
    Ok(id)
}

/// Returns false when a grade with the same source key already exists.
async fn insert_grade(
    pool: &PgPool,
    classroom_id: i64,
    grade: &GradeRow,
    source_key: &str,
) -> anyhow::Result<bool> {
    let term_id = upsert_term(pool, &grade.term).await?;
    let query = format!(
        r#"
        INSERT INTO {}
        (id, classroom_id, student_id, subject_id, term_id, grade, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (source_key) DO NOTHING
        "#,
        grade_table(grade.provenance)
    );

    let result = sqlx::query(&query)
        .bind(Uuid::new_v4())
        .bind(classroom_id)
        .bind(grade.student_id)
        .bind(grade.subject_id)
        .bind(term_id)
        .bind(grade.value)
        .bind(source_key)
        .execute(pool)
        .await
        .with_context(|| format!("failed to insert grade {source_key}"))?;

    Ok(result.rows_affected() > 0)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let classroom_id = 1;
    let terms = ["bimestre_1", "sumativa_1", "bimestre_2", "sumativa_2"];
    let regular = [
        (1, 1, [7.5, 8.0, 6.5, 7.0]),
        (1, 2, [9.0, 8.5, 9.5, 9.0]),
        (2, 1, [5.0, 4.5, 6.0, 5.5]),
        (2, 2, [6.5, 7.0, 7.0, 6.0]),
        (3, 1, [8.0, 9.0, 8.5, 10.0]),
    ];
    let reinforcement = [(2, 1, "bimestre_1", 7.0), (2, 1, "sumativa_1", 6.5)];

    for (student_id, subject_id, values) in regular {
        for (term, value) in terms.iter().zip(values) {
            let row = GradeRow {
                student_id,
                subject_id,
                term: term.to_string(),
                value,
                provenance: Provenance::Regular,
            };
            let source_key = format!("seed-{student_id}-{subject_id}-{term}");
            insert_grade(pool, classroom_id, &row, &source_key).await?;
        }
    }

    for (student_id, subject_id, term, value) in reinforcement {
        let row = GradeRow {
            student_id,
            subject_id,
            term: term.to_string(),
            value,
            provenance: Provenance::Reinforcement,
        };
        let source_key = format!("seed-r-{student_id}-{subject_id}-{term}");
        insert_grade(pool, classroom_id, &row, &source_key).await?;
    }

    Ok(())
}

async fn fetch_rows_from(
    pool: &PgPool,
    provenance: Provenance,
    classroom_id: i64,
    term: Option<&str>,
) -> anyhow::Result<Vec<GradeRow>> {
    let mut query = format!(
        "SELECT g.student_id, g.subject_id, t.name AS term, g.grade \
         FROM {} g \
         JOIN classroom_averages.terms t ON t.id = g.term_id \
         WHERE g.classroom_id = $1",
        grade_table(provenance)
    );

    if term.is_some() {
        query.push_str(" AND t.name = $2");
    }

    let mut rows = sqlx::query(&query).bind(classroom_id);

    if let Some(value) = term {
        rows = rows.bind(value);
    }

    let records = rows
        .fetch_all(pool)
        .await
        .with_context(|| format!("failed to fetch {} grades", provenance.as_str()))?;

    Ok(records
        .into_iter()
        .map(|row| GradeRow {
            student_id: row.get("student_id"),
            subject_id: row.get("subject_id"),
            term: row.get("term"),
            value: row.get("grade"),
            provenance,
        })
        .collect())
}

/// Regular and reinforcement grades for one classroom, optionally limited to one term.
pub async fn fetch_grade_rows(
    pool: &PgPool,
    classroom_id: i64,
    term: Option<&str>,
) -> anyhow::Result<Vec<GradeRow>> {
    let mut grades = fetch_rows_from(pool, Provenance::Regular, classroom_id, term).await?;
    let reinforcement =
        fetch_rows_from(pool, Provenance::Reinforcement, classroom_id, term).await?;

    info!(
        classroom_id,
        regular = grades.len(),
        reinforcement = reinforcement.len(),
        "fetched grade rows"
    );

    grades.extend(reinforcement);
    Ok(grades)
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    classroom_id: i64,
    student_id: i64,
    subject_id: i64,
    term: String,
    grade: f64,
    kind: Option<Provenance>,
    source_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportedGrade {
    pub classroom_id: i64,
    pub grade: GradeRow,
    pub source_key: Option<String>,
}

/// Reads `classroom_id,student_id,subject_id,term,grade[,kind][,source_key]` records.
/// A missing kind means a regular grade.
pub fn read_grade_records<R: Read>(reader: R) -> anyhow::Result<Vec<ImportedGrade>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut grades = Vec::new();

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid grade record {}", index + 1))?;
        if !row.grade.is_finite() {
            bail!("invalid grade record {}: grade must be a finite number", index + 1);
        }
        grades.push(ImportedGrade {
            classroom_id: row.classroom_id,
            grade: GradeRow {
                student_id: row.student_id,
                subject_id: row.subject_id,
                term: row.term,
                value: row.grade,
                provenance: row.kind.unwrap_or(Provenance::Regular),
            },
            source_key: row.source_key.filter(|key| !key.is_empty()),
        });
    }

    Ok(grades)
}

/// Keeps the grades of one classroom and one term when those filters are given.
pub fn filter_records(
    records: Vec<ImportedGrade>,
    classroom_id: Option<i64>,
    term: Option<&str>,
) -> Vec<GradeRow> {
    records
        .into_iter()
        .filter(|record| classroom_id.map_or(true, |id| record.classroom_id == id))
        .filter(|record| term.map_or(true, |t| record.grade.term == t))
        .map(|record| record.grade)
        .collect()
}

pub fn read_grade_csv(csv_path: &Path) -> anyhow::Result<Vec<ImportedGrade>> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    read_grade_records(file)
}

pub async fn import_csv(pool: &PgPool, csv_path: &Path) -> anyhow::Result<usize> {
    let records = read_grade_csv(csv_path)?;
    let mut inserted = 0usize;

    for record in records {
        let source_key = record
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        if insert_grade(pool, record.classroom_id, &record.grade, &source_key).await? {
            inserted += 1;
        } else {
            debug!(source_key = %source_key, "grade already imported");
        }
    }

    Ok(inserted)
}
