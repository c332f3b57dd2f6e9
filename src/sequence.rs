use crate::models::MergedTermAverage;
use crate::schedule::TermSchedule;

/// Lays merged averages out in schedule order. Every schedule slot is filled;
/// slots without data get a zero placeholder.
pub fn sequence_slots<'a, I>(schedule: &TermSchedule, merged: I) -> Vec<MergedTermAverage>
where
    I: IntoIterator<Item = &'a MergedTermAverage>,
{
    let mut slots: Vec<MergedTermAverage> = schedule
        .iter()
        .map(|entry| MergedTermAverage::placeholder(&entry.term))
        .collect();

    for average in merged {
        if let Some(index) = schedule.position(&average.term) {
            slots[index] = average.clone();
        }
    }

    slots
}
