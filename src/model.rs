//! Dispatch domain records: locations, technicians and jobs.
//!
//! These are point-in-time snapshots supplied by the system of record before
//! each planning call. The engine never mutates them.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Seconds from the start of the planning day (midnight).
pub type Seconds = i64;

/// A WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

impl From<(f64, f64)> for Location {
    fn from((lat, lng): (f64, f64)) -> Self {
        Self { lat, lng }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TechnicianId(pub String);

impl TechnicianId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TechnicianId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize a capability tag for comparison.
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}

/// Normalized, ordered capability set.
pub fn capability_set(tags: &[String]) -> BTreeSet<String> {
    tags.iter()
        .map(|tag| normalize_tag(tag))
        .filter(|tag| !tag.is_empty())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TechnicianStatus {
    #[default]
    Idle,
    EnRoute,
    OnJob,
    OffDuty,
}

impl TechnicianStatus {
    pub fn is_available(self) -> bool {
        !matches!(self, TechnicianStatus::OffDuty)
    }
}

/// Working-hours interval for a shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shift {
    pub start: Seconds,
    pub end: Seconds,
}

impl Shift {
    pub const fn new(start: Seconds, end: Seconds) -> Self {
        Self { start, end }
    }
}

impl Default for Shift {
    /// 08:00 - 18:00
    fn default() -> Self {
        Self {
            start: 8 * 3600,
            end: 18 * 3600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Technician {
    pub id: TechnicianId,
    #[serde(default)]
    pub name: String,
    pub start: Location,
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Maximum load per shift (number of jobs when every job has load 1).
    pub capacity: i32,
    /// Load already consumed by work outside the plan being computed.
    #[serde(default)]
    pub current_load: i32,
    #[serde(default)]
    pub shift: Shift,
    #[serde(default)]
    pub status: TechnicianStatus,
}

impl Technician {
    pub fn new(id: impl Into<String>, start: impl Into<Location>) -> Self {
        Self {
            id: TechnicianId::new(id),
            name: String::new(),
            start: start.into(),
            capabilities: Vec::new(),
            capacity: 8,
            current_load: 0,
            shift: Shift::default(),
            status: TechnicianStatus::Idle,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn capability(mut self, tag: impl Into<String>) -> Self {
        self.capabilities.push(tag.into());
        self
    }

    pub fn capacity(mut self, capacity: i32) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn current_load(mut self, load: i32) -> Self {
        self.current_load = load;
        self
    }

    pub fn shift(mut self, start: Seconds, end: Seconds) -> Self {
        self.shift = Shift::new(start, end);
        self
    }

    pub fn status(mut self, status: TechnicianStatus) -> Self {
        self.status = status;
        self
    }

    /// Capacity left for this plan.
    pub fn remaining_capacity(&self) -> i32 {
        (self.capacity - self.current_load).max(0)
    }

    pub fn has_capabilities(&self, required: &[String]) -> bool {
        let held = capability_set(&self.capabilities);
        capability_set(required).is_subset(&held)
    }
}

/// Window during which service should begin.
///
/// `None` bounds are open. Arriving after `latest` is scored as lateness
/// unless the window is hard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TimeWindow {
    #[serde(default)]
    pub earliest: Option<Seconds>,
    #[serde(default)]
    pub latest: Option<Seconds>,
    #[serde(default)]
    pub hard: bool,
}

impl TimeWindow {
    pub const fn unbounded() -> Self {
        Self {
            earliest: None,
            latest: None,
            hard: false,
        }
    }

    pub const fn between(earliest: Seconds, latest: Seconds) -> Self {
        Self {
            earliest: Some(earliest),
            latest: Some(latest),
            hard: false,
        }
    }

    pub fn is_inverted(&self) -> bool {
        matches!((self.earliest, self.latest), (Some(start), Some(end)) if start > end)
    }

    /// Width of the window; unbounded windows are the widest.
    pub fn width(&self) -> Seconds {
        match (self.earliest, self.latest) {
            (Some(start), Some(end)) => end - start,
            _ => Seconds::MAX,
        }
    }

    pub fn lateness(&self, arrival: Seconds) -> Seconds {
        match self.latest {
            Some(end) => (arrival - end).max(0),
            None => 0,
        }
    }

    pub fn slack(&self, arrival: Seconds) -> Option<Seconds> {
        self.latest.map(|end| end - arrival)
    }
}

/// Job lifecycle.
///
/// `Pending -> Assigned -> InProgress -> Completed`; pending and assigned jobs
/// may be cancelled, and re-optimization may hand an assigned job back to
/// pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl JobStatus {
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Assigned)
                | (Assigned, Pending)
                | (Assigned, InProgress)
                | (InProgress, Completed)
                | (Pending, Cancelled)
                | (Assigned, Cancelled)
        )
    }

    /// Only pending and assigned jobs are ever (re)planned.
    pub fn is_plannable(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Assigned)
    }

    pub fn is_started(self) -> bool {
        matches!(self, JobStatus::InProgress | JobStatus::Completed)
    }
}

/// Service catalogue and the capabilities each service requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    AcRepair,
    FurnaceRepair,
    HeatPump,
    Maintenance,
    Emergency,
    Installation,
}

impl ServiceType {
    pub fn required_capabilities(self) -> &'static [&'static str] {
        match self {
            ServiceType::AcRepair => &["hvac", "refrigeration"],
            ServiceType::FurnaceRepair => &["hvac", "heating"],
            ServiceType::HeatPump => &["hvac", "heat_pump_certified"],
            ServiceType::Maintenance => &["hvac"],
            ServiceType::Emergency => &["hvac", "emergency_certified"],
            ServiceType::Installation => &["hvac", "install_certified"],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub location: Location,
    /// Every tag must be held by the technician. Empty means anyone qualifies.
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    pub service_seconds: Seconds,
    #[serde(default)]
    pub window: TimeWindow,
    /// Higher is more costly to delay or skip.
    #[serde(default = "default_priority")]
    pub priority: f64,
    #[serde(default = "default_load")]
    pub load: i32,
    #[serde(default)]
    pub status: JobStatus,
}

fn default_priority() -> f64 {
    1.0
}

fn default_load() -> i32 {
    1
}

impl Job {
    pub fn new(id: impl Into<String>, location: impl Into<Location>) -> Self {
        Self {
            id: JobId::new(id),
            location: location.into(),
            required_capabilities: Vec::new(),
            service_seconds: 3600,
            window: TimeWindow::unbounded(),
            priority: default_priority(),
            load: default_load(),
            status: JobStatus::Pending,
        }
    }

    pub fn for_service(
        id: impl Into<String>,
        location: impl Into<Location>,
        service: ServiceType,
    ) -> Self {
        let mut job = Self::new(id, location);
        job.required_capabilities = service
            .required_capabilities()
            .iter()
            .map(|tag| tag.to_string())
            .collect();
        job
    }

    pub fn requires(mut self, tag: impl Into<String>) -> Self {
        self.required_capabilities.push(tag.into());
        self
    }

    pub fn service_minutes(mut self, minutes: i64) -> Self {
        self.service_seconds = minutes * 60;
        self
    }

    pub fn window(mut self, earliest: Seconds, latest: Seconds) -> Self {
        self.window.earliest = Some(earliest);
        self.window.latest = Some(latest);
        self
    }

    pub fn earliest(mut self, earliest: Seconds) -> Self {
        self.window.earliest = Some(earliest);
        self
    }

    pub fn hard_window(mut self) -> Self {
        self.window.hard = true;
        self
    }

    pub fn priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    pub fn load(mut self, load: i32) -> Self {
        self.load = load;
        self
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = status;
        self
    }
}
