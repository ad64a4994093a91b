//! Health status mapping.
//!
//! Consul reports check states as strings. Exported gauges use a fixed
//! ordinal that consumers compare against, so the mapping lives here and
//! nowhere else:
//!
//! | status      | value |
//! |-------------|-------|
//! | maintenance | 0     |
//! | passing     | 1     |
//! | warning     | 2     |
//! | critical    | 3     |

use core::fmt;
use core::str::FromStr;

/// Check id Consul uses for node maintenance mode.
pub const NODE_MAINTENANCE_CHECK: &str = "_node_maintenance";

/// Check id prefix Consul uses for service maintenance mode.
pub const SERVICE_MAINTENANCE_PREFIX: &str = "_service_maintenance:";

/// A recognized health check status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HealthStatus {
    Maintenance,
    Passing,
    Warning,
    Critical,
}

impl HealthStatus {
    /// The gauge value exported for this status.
    pub const fn value(self) -> f64 {
        match self {
            HealthStatus::Maintenance => 0.0,
            HealthStatus::Passing => 1.0,
            HealthStatus::Warning => 2.0,
            HealthStatus::Critical => 3.0,
        }
    }

    /// The status string as Consul spells it.
    pub const fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Maintenance => "maintenance",
            HealthStatus::Passing => "passing",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
        }
    }

    /// Worst-case roll-up over the checks of one service instance.
    ///
    /// Each item is a `(check_id, status)` pair. The first maintenance check
    /// decides the result, even if later checks carry unknown statuses;
    /// otherwise critical beats warning beats passing. An instance without
    /// checks is passing. A status outside the known set fails the roll-up.
    pub fn aggregate<'a, I>(checks: I) -> Result<HealthStatus, UnmappedStatus>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut worst = HealthStatus::Passing;

        for (check_id, status) in checks {
            if is_maintenance_check(check_id) {
                return Ok(HealthStatus::Maintenance);
            }
            match status.parse::<HealthStatus>()? {
                HealthStatus::Maintenance => return Ok(HealthStatus::Maintenance),
                other if other.severity() > worst.severity() => worst = other,
                _ => {}
            }
        }

        Ok(worst)
    }

    fn severity(self) -> u8 {
        match self {
            HealthStatus::Maintenance | HealthStatus::Passing => 0,
            HealthStatus::Warning => 1,
            HealthStatus::Critical => 2,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HealthStatus {
    type Err = UnmappedStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "passing" => Ok(HealthStatus::Passing),
            "warning" => Ok(HealthStatus::Warning),
            "critical" => Ok(HealthStatus::Critical),
            "maintenance" => Ok(HealthStatus::Maintenance),
            other => Err(UnmappedStatus(other.to_string())),
        }
    }
}

/// A status string outside the known set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmappedStatus(pub String);

impl fmt::Display for UnmappedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unmapped health status {:?}", self.0)
    }
}

impl std::error::Error for UnmappedStatus {}

/// Map a raw status string to its gauge value.
pub fn status_value(status: &str) -> Result<f64, UnmappedStatus> {
    status.parse::<HealthStatus>().map(HealthStatus::value)
}

fn is_maintenance_check(check_id: &str) -> bool {
    check_id == NODE_MAINTENANCE_CHECK || check_id.starts_with(SERVICE_MAINTENANCE_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_values() {
        assert_eq!(status_value("passing"), Ok(1.0));
        assert_eq!(status_value("warning"), Ok(2.0));
        assert_eq!(status_value("critical"), Ok(3.0));
        assert_eq!(status_value("maintenance"), Ok(0.0));
    }

    #[test]
    fn test_unknown_status_rejected() {
        assert_eq!(
            status_value("unknown"),
            Err(UnmappedStatus("unknown".to_string()))
        );
        assert!(status_value("").is_err());
        assert!(status_value("Passing").is_err());
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for status in [
            HealthStatus::Maintenance,
            HealthStatus::Passing,
            HealthStatus::Warning,
            HealthStatus::Critical,
        ] {
            assert_eq!(status.to_string().parse::<HealthStatus>(), Ok(status));
        }
    }

    #[test]
    fn test_aggregate_worst_case() {
        let warning = HealthStatus::aggregate([("a", "passing"), ("b", "warning")]);
        assert_eq!(warning, Ok(HealthStatus::Warning));

        let critical = HealthStatus::aggregate([("a", "passing"), ("b", "critical")]);
        assert_eq!(critical.map(HealthStatus::value), Ok(3.0));

        let mixed = HealthStatus::aggregate([("a", "critical"), ("b", "warning")]);
        assert_eq!(mixed, Ok(HealthStatus::Critical));
    }

    #[test]
    fn test_aggregate_maintenance() {
        let alone = HealthStatus::aggregate([("a", "maintenance")]);
        assert_eq!(alone.map(HealthStatus::value), Ok(0.0));

        // Consul marks maintenance with a critical check under a reserved id.
        let node = HealthStatus::aggregate([
            ("serfHealth", "passing"),
            (NODE_MAINTENANCE_CHECK, "critical"),
        ]);
        assert_eq!(node, Ok(HealthStatus::Maintenance));

        let service = HealthStatus::aggregate([("_service_maintenance:web-1", "critical")]);
        assert_eq!(service, Ok(HealthStatus::Maintenance));
    }

    #[test]
    fn test_aggregate_maintenance_ignores_later_unknown() {
        let result = HealthStatus::aggregate([(NODE_MAINTENANCE_CHECK, "critical"), ("x", "bogus")]);
        assert_eq!(result, Ok(HealthStatus::Maintenance));

        let result = HealthStatus::aggregate([("a", "maintenance"), ("b", "bogus")]);
        assert_eq!(result, Ok(HealthStatus::Maintenance));
    }

    #[test]
    fn test_aggregate_empty_is_passing() {
        let empty: [(&str, &str); 0] = [];
        assert_eq!(HealthStatus::aggregate(empty), Ok(HealthStatus::Passing));
    }

    #[test]
    fn test_aggregate_rejects_unknown() {
        let result = HealthStatus::aggregate([("a", "passing"), ("b", "bogus")]);
        assert_eq!(result, Err(UnmappedStatus("bogus".to_string())));
    }
}
