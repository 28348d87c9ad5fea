use crate::model::{Difficulty, Progress};
use serde::Serialize;
use std::collections::BTreeMap;

/// One-decimal rounding used for the percentage bars.
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100.0 * part as f64 / whole as f64
    }
}

/// `round(100 * completed / all)`, 0 for no records.
pub fn completion_rate<'a, I>(records: I) -> u32
where
    I: IntoIterator<Item = &'a Progress>,
{
    let mut all = 0usize;
    let mut done = 0usize;
    for r in records {
        all += 1;
        if r.is_complete {
            done += 1;
        }
    }
    percent(done, all).round() as u32
}

/// Mean score over completed records, rounded. Open attempts carry no score.
pub fn average_score<'a, I>(records: I) -> u32
where
    I: IntoIterator<Item = &'a Progress>,
{
    let mut n = 0u64;
    let mut sum = 0u64;
    for r in records.into_iter().filter(|r| r.is_complete) {
        n += 1;
        sum += u64::from(r.score);
    }
    if n == 0 {
        0
    } else {
        (sum as f64 / n as f64).round() as u32
    }
}

/// Total time over `records`, saturating at `u64::MAX`.
pub fn time_spent<'a, I>(records: I) -> u64
where
    I: IntoIterator<Item = &'a Progress>,
{
    records
        .into_iter()
        .fold(0u64, |acc, r| acc.saturating_add(r.time_spent))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DifficultyPercentages {
    pub easy: f64,
    pub medium: f64,
    pub hard: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DifficultyDistribution {
    pub easy: usize,
    pub medium: usize,
    pub hard: usize,
    pub total: usize,
    pub percentages: DifficultyPercentages,
}

pub fn difficulty_distribution<I>(ratings: I) -> DifficultyDistribution
where
    I: IntoIterator<Item = Difficulty>,
{
    let mut d = DifficultyDistribution::default();
    for r in ratings {
        match r {
            Difficulty::Easy => d.easy += 1,
            Difficulty::Medium => d.medium += 1,
            Difficulty::Hard => d.hard += 1,
        }
        d.total += 1;
    }
    d.percentages = DifficultyPercentages {
        easy: round_off_1_decimal(percent(d.easy, d.total)),
        medium: round_off_1_decimal(percent(d.medium, d.total)),
        hard: round_off_1_decimal(percent(d.hard, d.total)),
    };
    d
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChapterDistribution {
    pub chapter: String,
    #[serde(flatten)]
    pub distribution: DifficultyDistribution,
}

/// Groups ratings by chapter and reduces each group, chapters in name order.
pub fn chapter_breakdown<I, S>(ratings: I) -> Vec<ChapterDistribution>
where
    I: IntoIterator<Item = (S, Difficulty)>,
    S: Into<String>,
{
    let mut groups: BTreeMap<String, Vec<Difficulty>> = BTreeMap::new();
    for (chapter, d) in ratings {
        groups.entry(chapter.into()).or_default().push(d);
    }
    groups
        .into_iter()
        .map(|(chapter, ds)| ChapterDistribution {
            chapter,
            distribution: difficulty_distribution(ds),
        })
        .collect()
}
