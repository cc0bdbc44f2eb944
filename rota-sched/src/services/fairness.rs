//! Workload fairness score
//!
//! `score = 100 * max(0, 1 - cv)` where `cv` is the coefficient of variation
//! (population standard deviation / mean) of per-volunteer assigned hours.
//! Volunteers with no assignment count as zero hours. Moving hours from a
//! heavier to a lighter volunteer never raises `cv`, so a more even spread
//! never scores lower for the same total workload.

use std::collections::HashMap;

use rota_common::db::ShiftRoster;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FairnessBand {
    Excellent,
    Good,
    Fair,
    Imbalanced,
}

impl FairnessBand {
    pub fn from_score(score: f64) -> Self {
        if score > 90.0 {
            FairnessBand::Excellent
        } else if score > 70.0 {
            FairnessBand::Good
        } else if score > 50.0 {
            FairnessBand::Fair
        } else {
            FairnessBand::Imbalanced
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Fairness {
    pub score: f64,
    pub band: FairnessBand,
}

/// Score a list of per-volunteer hour totals; `None` when there is no workload
pub fn score_hours(hours: &[f64]) -> Option<Fairness> {
    if hours.is_empty() {
        return None;
    }
    let n = hours.len() as f64;
    let total: f64 = hours.iter().sum();
    if total <= 0.0 {
        return None;
    }
    let mean = total / n;
    let variance = hours.iter().map(|h| (h - mean).powi(2)).sum::<f64>() / n;
    let cv = variance.sqrt() / mean;
    let score = (100.0 * (1.0 - cv)).max(0.0);
    let score = (score * 10.0).round() / 10.0;

    Some(Fairness {
        score,
        band: FairnessBand::from_score(score),
    })
}

/// Per-volunteer hours over `volunteers`, counting volunteers without shifts as zero
pub fn hours_by_volunteer(rosters: &[ShiftRoster], volunteers: &[Uuid]) -> HashMap<Uuid, f64> {
    let mut hours: HashMap<Uuid, f64> = volunteers.iter().map(|id| (*id, 0.0)).collect();
    for roster in rosters {
        let duration = roster.shift.duration_hours();
        for entry in &roster.assignments {
            *hours.entry(entry.volunteer.id).or_insert(0.0) += duration;
        }
    }
    hours
}

/// Fairness of the assignment set in `rosters`
pub fn score_rosters(rosters: &[ShiftRoster], volunteers: &[Uuid]) -> Option<Fairness> {
    let hours: Vec<f64> = hours_by_volunteer(rosters, volunteers).into_values().collect();
    score_hours(&hours)
}
