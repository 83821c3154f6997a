use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AutoClosure, Overtime};

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Great-circle distance in meters (haversine).
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lng = (other.lng - self.lng).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_METERS * a.sqrt().asin()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub clock_in_at: DateTime<Utc>,
    pub clock_out_at: Option<DateTime<Utc>>,
    pub clock_in_loc: GeoPoint,
    pub clock_out_loc: Option<GeoPoint>,
    pub done_for_the_day: bool,
    pub late_clock_in: bool,
    pub early_clock_out: bool,
    pub closed_automatically: Option<AutoClosure>,
    pub overtime: Option<Overtime>,
}

impl Attendance {
    pub fn is_active(&self) -> bool {
        !self.done_for_the_day && self.clock_out_at.is_none()
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AttendanceRow {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub clock_in_at: DateTime<Utc>,
    pub clock_out_at: Option<DateTime<Utc>>,
    pub clock_in_lat: f64,
    pub clock_in_lng: f64,
    pub clock_out_lat: Option<f64>,
    pub clock_out_lng: Option<f64>,
    pub done_for_the_day: bool,
    pub late_clock_in: bool,
    pub early_clock_out: bool,
    pub closed_automatically_at: Option<DateTime<Utc>>,
    pub closed_reason: Option<String>,
}

impl From<AttendanceRow> for Attendance {
    fn from(row: AttendanceRow) -> Self {
        let clock_out_loc = match (row.clock_out_lat, row.clock_out_lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)),
            _ => None,
        };

        Attendance {
            id: row.id,
            employee_id: row.employee_id,
            clock_in_at: row.clock_in_at,
            clock_out_at: row.clock_out_at,
            clock_in_loc: GeoPoint::new(row.clock_in_lat, row.clock_in_lng),
            clock_out_loc,
            done_for_the_day: row.done_for_the_day,
            late_clock_in: row.late_clock_in,
            early_clock_out: row.early_clock_out,
            closed_automatically: row.closed_automatically_at.map(|at| AutoClosure {
                at,
                reason: row.closed_reason.unwrap_or_default(),
            }),
            overtime: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockInRequest {
    pub code: String,
    pub location: GeoPoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockOutRequest {
    pub location: GeoPoint,
    #[serde(default)]
    pub confirm_overtime: bool,
    pub reason: Option<String>,
}
