//! Conflict Analyzer
//!
//! Pure pass over one event's shift rosters. Produces per-shift conflict
//! messages (double bookings, hour caps) and a coverage classification for
//! every shift. Conflicts are annotations, never errors.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use rota_common::db::{ShiftRoster, Volunteer};
use rota_common::time::intervals_overlap;
use serde::Serialize;
use uuid::Uuid;

/// Staffing state of one shift
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Coverage {
    /// No requirement; always satisfied
    Unconstrained,
    Satisfied,
    /// Some, but fewer than required
    Understaffed,
    /// Requirement > 0 and nobody assigned
    Empty,
}

impl Coverage {
    pub fn classify(required: u32, assigned: usize) -> Self {
        if required == 0 {
            Coverage::Unconstrained
        } else if assigned == 0 {
            Coverage::Empty
        } else if assigned < required as usize {
            Coverage::Understaffed
        } else {
            Coverage::Satisfied
        }
    }
}

/// One shift as listed in a report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShiftSummary {
    pub shift_id: Uuid,
    pub name: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub required: u32,
    pub assigned: usize,
    pub coverage: Coverage,
    pub conflicts: Vec<String>,
}

/// Result of one analysis pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConflictReport {
    /// Shift id -> messages, in detection order
    pub conflicts: BTreeMap<Uuid, Vec<String>>,
    pub understaffed: BTreeSet<Uuid>,
    pub empty: BTreeSet<Uuid>,
    /// All shifts in display order (conflicted, understaffed, empty, then the rest)
    pub shifts: Vec<ShiftSummary>,
}

impl ConflictReport {
    pub fn conflicts_for(&self, shift_id: Uuid) -> &[String] {
        self.conflicts.get(&shift_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn coverage_of(&self, shift_id: Uuid) -> Option<Coverage> {
        self.shifts
            .iter()
            .find(|s| s.shift_id == shift_id)
            .map(|s| s.coverage)
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

pub fn double_booked_message(volunteer: &Volunteer) -> String {
    format!("Conflict: {} is double-booked.", volunteer.name)
}

pub fn hours_exceeded_message(volunteer: &Volunteer, cap: f64, total: f64) -> String {
    format!(
        "{} exceeds {}h limit ({:.1}h assigned)",
        volunteer.name,
        trim_float(cap),
        total
    )
}

fn trim_float(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Per-volunteer slice of the roster
struct Booking<'a> {
    shift_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    hours: f64,
    volunteer: &'a Volunteer,
}

fn push_unique(conflicts: &mut BTreeMap<Uuid, Vec<String>>, shift_id: Uuid, message: &str) {
    let messages = conflicts.entry(shift_id).or_default();
    if !messages.iter().any(|m| m == message) {
        messages.push(message.to_string());
    }
}

/// Run the overlap, hours and coverage passes
pub fn analyze(rosters: &[ShiftRoster]) -> ConflictReport {
    let mut report = ConflictReport::default();

    // Group bookings by volunteer, keeping first-seen volunteer order so
    // messages come out deterministically
    let mut order: Vec<Uuid> = Vec::new();
    let mut by_volunteer: HashMap<Uuid, Vec<Booking<'_>>> = HashMap::new();
    for roster in rosters {
        let hours = roster.shift.duration_hours();
        for entry in &roster.assignments {
            let bookings = by_volunteer.entry(entry.volunteer.id).or_insert_with(|| {
                order.push(entry.volunteer.id);
                Vec::new()
            });
            bookings.push(Booking {
                shift_id: roster.shift.id,
                start: roster.shift.start_time,
                end: roster.shift.end_time,
                hours,
                volunteer: &entry.volunteer,
            });
        }
    }

    // Overlap pass
    for volunteer_id in &order {
        let bookings = &by_volunteer[volunteer_id];
        for (i, a) in bookings.iter().enumerate() {
            for b in &bookings[i + 1..] {
                if intervals_overlap(a.start, a.end, b.start, b.end) {
                    let message = double_booked_message(a.volunteer);
                    push_unique(&mut report.conflicts, a.shift_id, &message);
                    push_unique(&mut report.conflicts, b.shift_id, &message);
                }
            }
        }
    }

    // Hours pass
    for volunteer_id in &order {
        let bookings = &by_volunteer[volunteer_id];
        let Some(first) = bookings.first() else {
            continue;
        };
        let Some(cap) = first.volunteer.max_hours else {
            continue;
        };
        let total: f64 = bookings.iter().map(|b| b.hours).sum();
        if total > cap {
            let message = hours_exceeded_message(first.volunteer, cap, total);
            for booking in bookings {
                push_unique(&mut report.conflicts, booking.shift_id, &message);
            }
        }
    }

    // Coverage pass
    for roster in rosters {
        let required = roster.shift.required_groups.total();
        let assigned = roster.assignments.len();
        let coverage = Coverage::classify(required, assigned);
        match coverage {
            Coverage::Understaffed => {
                report.understaffed.insert(roster.shift.id);
            }
            Coverage::Empty => {
                report.empty.insert(roster.shift.id);
            }
            Coverage::Unconstrained | Coverage::Satisfied => {}
        }

        report.shifts.push(ShiftSummary {
            shift_id: roster.shift.id,
            name: roster.shift.name.clone(),
            start_time: roster.shift.start_time,
            end_time: roster.shift.end_time,
            required,
            assigned,
            coverage,
            conflicts: report
                .conflicts
                .get(&roster.shift.id)
                .cloned()
                .unwrap_or_default(),
        });
    }

    report.shifts.sort_by(display_order);
    report
}

fn display_rank(summary: &ShiftSummary) -> u8 {
    if !summary.conflicts.is_empty() {
        0
    } else {
        match summary.coverage {
            Coverage::Understaffed => 1,
            Coverage::Empty => 2,
            Coverage::Unconstrained | Coverage::Satisfied => 3,
        }
    }
}

/// Conflicted, understaffed, empty, rest; then start time, name, id
pub fn display_order(a: &ShiftSummary, b: &ShiftSummary) -> Ordering {
    display_rank(a)
        .cmp(&display_rank(b))
        .then_with(|| a.start_time.cmp(&b.start_time))
        .then_with(|| {
            a.name
                .as_deref()
                .unwrap_or("")
                .cmp(b.name.as_deref().unwrap_or(""))
        })
        .then_with(|| a.shift_id.cmp(&b.shift_id))
}
