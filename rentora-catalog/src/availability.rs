use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How two date ranges that merely touch are treated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// A rental ending on day N collides with one starting on day N (no same-day turnover).
    #[default]
    Inclusive,
    /// `[start, end)` semantics: touching ranges do not collide.
    HalfOpen,
}

/// A rental window. `end` is always strictly after `start`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, AvailabilityError> {
        if end <= start {
            return Err(AvailabilityError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn overlaps(&self, other: &DateRange, policy: OverlapPolicy) -> bool {
        match policy {
            OverlapPolicy::Inclusive => !(self.end < other.start || self.start > other.end),
            OverlapPolicy::HalfOpen => !(self.end <= other.start || self.start >= other.end),
        }
    }

    fn contains_instant(&self, at: DateTime<Utc>, policy: OverlapPolicy) -> bool {
        match policy {
            OverlapPolicy::Inclusive => self.start <= at && at <= self.end,
            OverlapPolicy::HalfOpen => self.start <= at && at < self.end,
        }
    }
}

/// An existing reservation that occupies the calendar (CONFIRMED or IN_PROGRESS).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActiveBooking {
    pub reservation_id: Uuid,
    pub range: DateRange,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available,
    Conflict { reservation_ids: Vec<Uuid> },
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }
}

/// Decides whether a candidate window fits next to the item's active bookings.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictDetector {
    policy: OverlapPolicy,
}

impl ConflictDetector {
    pub fn new(policy: OverlapPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> OverlapPolicy {
        self.policy
    }

    /// `active` must only hold bookings in an active status; PENDING never blocks.
    ///
    /// With capacity 1 any overlap is a conflict. For larger capacities the peak
    /// number of units out at the same instant inside the candidate window is
    /// compared against `capacity`.
    pub fn check(
        &self,
        candidate: &DateRange,
        quantity: u32,
        capacity: u32,
        active: &[ActiveBooking],
    ) -> Availability {
        let overlapping: Vec<&ActiveBooking> = active
            .iter()
            .filter(|b| b.range.overlaps(candidate, self.policy))
            .collect();

        if overlapping.is_empty() {
            return Availability::Available;
        }

        // Peak load is reached at the candidate start or at some booking start inside the window.
        let mut probes = vec![candidate.start];
        probes.extend(
            overlapping
                .iter()
                .map(|b| b.range.start)
                .filter(|s| candidate.contains_instant(*s, self.policy)),
        );

        let peak = probes
            .iter()
            .map(|at| {
                overlapping
                    .iter()
                    .filter(|b| b.range.contains_instant(*at, self.policy))
                    .map(|b| b.quantity as u64)
                    .sum::<u64>()
            })
            .max()
            .unwrap_or(0);

        if peak + quantity as u64 > capacity as u64 {
            Availability::Conflict {
                reservation_ids: overlapping.iter().map(|b| b.reservation_id).collect(),
            }
        } else {
            Availability::Available
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AvailabilityError {
    #[error("End date {end} must be after start date {start}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    fn booking(start: i64, end: i64, quantity: u32) -> ActiveBooking {
        ActiveBooking {
            reservation_id: Uuid::new_v4(),
            range: DateRange::new(day(start), day(end)).unwrap(),
            quantity,
        }
    }

    #[test]
    fn test_range_requires_end_after_start() {
        assert!(DateRange::new(day(3), day(3)).is_err());
        assert!(DateRange::new(day(4), day(3)).is_err());
        assert!(DateRange::new(day(3), day(4)).is_ok());
    }

    #[test]
    fn test_partial_overlap_conflicts() {
        let detector = ConflictDetector::default();
        let existing = booking(10, 15, 1);
        let candidate = DateRange::new(day(14), day(18)).unwrap();

        let result = detector.check(&candidate, 1, 1, &[existing]);
        assert_eq!(
            result,
            Availability::Conflict { reservation_ids: vec![existing.reservation_id] }
        );
    }

    #[test]
    fn test_fully_contained_conflicts() {
        let detector = ConflictDetector::default();
        let existing = booking(10, 20, 1);
        let candidate = DateRange::new(day(12), day(13)).unwrap();
        assert!(!detector.check(&candidate, 1, 1, &[existing]).is_available());
    }

    #[test]
    fn test_touching_boundaries_depend_on_policy() {
        let existing = booking(10, 15, 1);
        let candidate = DateRange::new(day(15), day(18)).unwrap();

        let inclusive = ConflictDetector::new(OverlapPolicy::Inclusive);
        assert!(!inclusive.check(&candidate, 1, 1, &[existing]).is_available());

        let half_open = ConflictDetector::new(OverlapPolicy::HalfOpen);
        assert!(half_open.check(&candidate, 1, 1, &[existing]).is_available());
    }

    #[test]
    fn test_disjoint_ranges_are_available() {
        let detector = ConflictDetector::default();
        let candidate = DateRange::new(day(1), day(5)).unwrap();
        let active = [booking(6, 9, 1), booking(20, 25, 1)];
        assert!(detector.check(&candidate, 1, 1, &active).is_available());
    }

    #[test]
    fn test_capacity_uses_peak_concurrent_load() {
        let detector = ConflictDetector::new(OverlapPolicy::HalfOpen);
        // Two bookings inside the window that never overlap each other.
        let active = [booking(1, 3, 1), booking(5, 8, 1)];
        let candidate = DateRange::new(day(0), day(10)).unwrap();

        assert!(detector.check(&candidate, 1, 2, &active).is_available());
        assert!(!detector.check(&candidate, 2, 2, &active).is_available());
    }

    #[test]
    fn test_capacity_counts_stacked_quantities() {
        let detector = ConflictDetector::default();
        let active = [booking(1, 5, 2), booking(2, 6, 1)];
        let candidate = DateRange::new(day(3), day(4)).unwrap();

        assert!(detector.check(&candidate, 1, 4, &active).is_available());
        match detector.check(&candidate, 2, 4, &active) {
            Availability::Conflict { reservation_ids } => assert_eq!(reservation_ids.len(), 2),
            Availability::Available => panic!("expected conflict"),
        }
    }
}
