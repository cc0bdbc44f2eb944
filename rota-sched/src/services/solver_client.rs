//! Scheduling solver client
//!
//! POSTs volunteers and shifts to the external optimizer and reads back the
//! proposed assignment set. HTTP 422 carries a partial (infeasible) result
//! under `detail` and is not an error. Any other non-success status, a body
//! that cannot be read, or a timeout leaves the store untouched.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use rota_common::config::RotaConfig;
use rota_common::db::{Shift, Volunteer};
use rota_common::time::to_solver_minute;
use rota_common::RequiredGroups;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{SchedError, SchedResult};

/// Longest slice of an error body carried into `SchedError::Solver`
const MAX_ERROR_BODY: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolverVolunteer {
    pub id: Uuid,
    pub name: String,
    pub group: Option<String>,
    pub max_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolverShift {
    pub id: Uuid,
    /// `YYYY-MM-DDTHH:MM`
    pub start: String,
    pub end: String,
    pub required_groups: RequiredGroups,
    pub allowed_groups: Vec<String>,
    pub excluded_groups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolverRequest {
    pub volunteers: Vec<SolverVolunteer>,
    pub shifts: Vec<SolverShift>,
    pub strategy: String,
}

impl SolverRequest {
    /// Build a request; volunteers without a cap get `unlimited_hours`
    pub fn build(
        volunteers: &[Volunteer],
        shifts: &[Shift],
        strategy: &str,
        unlimited_hours: f64,
    ) -> Self {
        Self {
            volunteers: volunteers
                .iter()
                .map(|v| SolverVolunteer {
                    id: v.id,
                    name: v.name.clone(),
                    group: v.group.clone(),
                    max_hours: v.max_hours.unwrap_or(unlimited_hours),
                })
                .collect(),
            shifts: shifts
                .iter()
                .map(|s| SolverShift {
                    id: s.id,
                    start: to_solver_minute(s.start_time),
                    end: to_solver_minute(s.end_time),
                    required_groups: s.required_groups.clone(),
                    allowed_groups: s.allowed_groups.clone(),
                    excluded_groups: s.excluded_groups.clone(),
                })
                .collect(),
            strategy: strategy.to_string(),
        }
    }
}

/// A shift the solver could not fully staff
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnfilledShift {
    pub shift_id: String,
    pub group: Option<String>,
    pub reasons: Vec<String>,
    pub needed: Option<u32>,
}

/// Parsed solver answer, ids still as the solver sent them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolverOutcome {
    /// Shift id -> volunteer ids, in response order
    pub assigned: Vec<(String, Vec<String>)>,
    /// Shifts the solver answered with `null`
    pub partially_filled: Vec<String>,
    pub unfilled: Vec<UnfilledShift>,
    pub conflicts: Vec<String>,
    pub fairness_score: Option<f64>,
    /// Answer came back as HTTP 422
    pub infeasible: bool,
}

impl SolverOutcome {
    pub fn is_partial(&self) -> bool {
        self.infeasible || !self.unfilled.is_empty() || !self.partially_filled.is_empty()
    }

    /// Interpret a response payload (the 422 `detail` object or a success body)
    pub fn from_payload(payload: &Value, infeasible: bool) -> Result<Self, String> {
        let object = payload
            .as_object()
            .ok_or_else(|| "response is not a JSON object".to_string())?;

        let assigned_raw = match object.get("assigned_shifts") {
            Some(Value::Object(map)) => map,
            Some(Value::Null) | None => return Err("no assigned_shifts".to_string()),
            Some(_) => return Err("assigned_shifts is not an object".to_string()),
        };

        let mut outcome = SolverOutcome {
            infeasible,
            ..Default::default()
        };

        for (shift_id, value) in assigned_raw {
            match value {
                Value::Null => outcome.partially_filled.push(shift_id.clone()),
                Value::Array(items) => {
                    let ids = items.iter().filter_map(id_text).collect();
                    outcome.assigned.push((shift_id.clone(), ids));
                }
                other => match id_text(other) {
                    Some(id) => outcome.assigned.push((shift_id.clone(), vec![id])),
                    None => warn!(shift_id = %shift_id, "Ignoring unreadable assignment entry"),
                },
            }
        }

        if let Some(Value::Array(items)) = object.get("unfilled_shifts") {
            outcome.unfilled = items.iter().filter_map(parse_unfilled).collect();
        }

        if let Some(Value::Array(items)) = object.get("conflicts") {
            outcome.conflicts = items
                .iter()
                .filter_map(|c| c.as_str().map(str::to_string))
                .collect();
        }

        outcome.fairness_score = object.get("fairness_score").and_then(Value::as_f64);
        Ok(outcome)
    }
}

fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn reasons_of(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|r| r.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn count_of(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::Number(n) => n.as_u64().map(|n| n.min(u32::MAX as u64) as u32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Object `{shift_id, group, reasons, needed}` or tuple `[shift_id, group, count]`
fn parse_unfilled(value: &Value) -> Option<UnfilledShift> {
    match value {
        Value::Object(map) => {
            let shift_id = map.get("shift_id").or_else(|| map.get("id")).and_then(id_text)?;
            Some(UnfilledShift {
                shift_id,
                group: map.get("group").and_then(Value::as_str).map(str::to_string),
                reasons: reasons_of(map.get("reasons")),
                needed: count_of(map.get("needed").or_else(|| map.get("count"))),
            })
        }
        Value::Array(items) => {
            let shift_id = items.first().and_then(id_text)?;
            Some(UnfilledShift {
                shift_id,
                group: items.get(1).and_then(Value::as_str).map(str::to_string),
                reasons: Vec::new(),
                needed: count_of(items.get(2)),
            })
        }
        _ => {
            warn!("Ignoring unreadable unfilled_shifts entry");
            None
        }
    }
}

/// HTTP client for the solver endpoint
#[derive(Clone)]
pub struct SolverClient {
    http_client: Client,
    url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl SolverClient {
    pub fn new(url: String, api_key: Option<String>, timeout: Duration) -> SchedResult<Self> {
        let http_client = Client::builder().timeout(timeout).build().map_err(|e| {
            SchedError::Validation(format!("Failed to create solver HTTP client: {}", e))
        })?;
        Ok(Self {
            http_client,
            url,
            api_key,
            timeout,
        })
    }

    pub fn from_config(config: &RotaConfig) -> SchedResult<Self> {
        Self::new(
            config.solver_url.clone(),
            config.solver_api_key.clone(),
            config.solver_timeout(),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn transport_error(&self, err: reqwest::Error) -> SchedError {
        if err.is_timeout() {
            SchedError::SolverTimeout(self.timeout)
        } else {
            SchedError::Solver {
                status: err.status().map(|s| s.as_u16()).unwrap_or(0),
                message: format!("Solver request failed: {}", err),
            }
        }
    }

    /// Send `request` and interpret the answer
    pub async fn solve(&self, request: &SolverRequest) -> SchedResult<SolverOutcome> {
        debug!(
            url = %self.url,
            volunteers = request.volunteers.len(),
            shifts = request.shifts.len(),
            strategy = %request.strategy,
            "Calling solver"
        );

        let mut builder = self.http_client.post(&self.url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        let infeasible = status == StatusCode::UNPROCESSABLE_ENTITY;
        if !status.is_success() && !infeasible {
            let mut message = body;
            message.truncate(floor_char_boundary(&message, MAX_ERROR_BODY));
            return Err(SchedError::Solver {
                status: status.as_u16(),
                message,
            });
        }

        let json: Value = serde_json::from_str(&body).map_err(|e| SchedError::Solver {
            status: status.as_u16(),
            message: format!("Solver returned invalid JSON: {}", e),
        })?;

        let null = Value::Null;
        let payload = if infeasible {
            json.get("detail").unwrap_or(&null)
        } else {
            &json
        };

        let outcome =
            SolverOutcome::from_payload(payload, infeasible).map_err(|message| SchedError::Solver {
                status: status.as_u16(),
                message: format!("Unusable solver response: {}", message),
            })?;

        debug!(
            assigned = outcome.assigned.len(),
            unfilled = outcome.unfilled.len(),
            infeasible,
            "Solver answered"
        );
        Ok(outcome)
    }
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn test_request_truncates_to_minute_and_fills_cap() {
        let event_id = Uuid::new_v4();
        let volunteer = Volunteer {
            id: Uuid::new_v4(),
            event_id,
            name: "Ann".into(),
            group: Some("Medical".into()),
            max_hours: None,
        };
        let shift = Shift::new(
            event_id,
            None,
            Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 42).unwrap(),
            Utc.with_ymd_and_hms(2026, 6, 1, 12, 30, 59).unwrap(),
            RequiredGroups::parse_str("Medical:2"),
        )
        .unwrap();

        let request = SolverRequest::build(&[volunteer], &[shift], "balanced", 999.0);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["volunteers"][0]["max_hours"], 999.0);
        assert_eq!(json["shifts"][0]["start"], "2026-06-01T09:00");
        assert_eq!(json["shifts"][0]["end"], "2026-06-01T12:30");
        assert_eq!(json["shifts"][0]["required_groups"], json!({"Medical": 2}));
        assert_eq!(json["strategy"], "balanced");
    }

    #[test]
    fn test_payload_accepts_list_single_and_null() {
        let payload = json!({
            "assigned_shifts": {"s1": ["v1", "v2"], "s2": "v3", "s3": null},
            "unfilled_shifts": [],
        });
        let outcome = SolverOutcome::from_payload(&payload, false).unwrap();
        assert_eq!(outcome.assigned.len(), 2);
        assert_eq!(outcome.partially_filled, vec!["s3"]);
        assert!(outcome.is_partial());
    }

    #[test]
    fn test_unfilled_object_and_tuple_forms() {
        let payload = json!({
            "assigned_shifts": {},
            "unfilled_shifts": [
                {"shift_id": "shiftY", "group": "Medical", "reasons": ["needs 2 more"]},
                ["shiftZ", "Security", 3],
            ],
            "conflicts": ["Shift 1 short"],
            "fairness_score": 87.5,
        });
        let outcome = SolverOutcome::from_payload(&payload, true).unwrap();
        assert_eq!(outcome.unfilled.len(), 2);
        assert_eq!(outcome.unfilled[0].reasons, vec!["needs 2 more"]);
        assert_eq!(outcome.unfilled[1].needed, Some(3));
        assert_eq!(outcome.unfilled[1].group.as_deref(), Some("Security"));
        assert_eq!(outcome.conflicts, vec!["Shift 1 short"]);
        assert_eq!(outcome.fairness_score, Some(87.5));
    }

    #[test]
    fn test_payload_without_assignments_is_rejected() {
        assert!(SolverOutcome::from_payload(&json!({"unfilled_shifts": []}), false).is_err());
        assert!(SolverOutcome::from_payload(&json!("nope"), true).is_err());
        // FastAPI validation errors use a list under `detail`
        assert!(SolverOutcome::from_payload(&json!([{"msg": "field required"}]), true).is_err());
    }

    #[test]
    fn test_full_result_is_not_partial() {
        let payload = json!({"assigned_shifts": {"s1": ["v1"]}, "unfilled_shifts": []});
        assert!(!SolverOutcome::from_payload(&payload, false).unwrap().is_partial());
    }
}
