use std::fmt;

use time::OffsetDateTime;

use crate::probe::ProbeResult;

/// Health classification of a single check type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Not checked yet, or the check type is not configured.
    #[default]
    Unknown,
    Normal,
    /// Reachable, but slower than the configured latency threshold.
    Warning,
    Dead,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Unknown => "unknown",
            Status::Normal => "normal",
            Status::Warning => "warning",
            Status::Dead => "dead",
        }
    }

    /// Returns `true` for statuses produced by a successful probe.
    pub fn is_reachable(&self) -> bool {
        matches!(self, Status::Normal | Status::Warning)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The latest outcome of one check type.
///
/// `latency_ms` is only meaningful while `status` is reachable; it is `0.0`
/// otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize)]
pub struct ProbeReading {
    pub status: Status,
    pub latency_ms: f64,
}

/// Observed state cached on a device node.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize)]
pub struct ObservedStatus {
    pub ping: ProbeReading,
    pub port: ProbeReading,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_checked_at: Option<OffsetDateTime>,
}

impl ObservedStatus {
    /// Returns `true` until the first check result has been written.
    pub fn is_unchecked(&self) -> bool {
        self.last_checked_at.is_none()
    }
}

/// Maps raw probe results onto a [`Status`].
///
/// A successful probe is [`Status::Normal`] unless a warning threshold is set
/// and the measured latency exceeds it, in which case it is
/// [`Status::Warning`]. Failed probes are always [`Status::Dead`]. The default
/// policy has no threshold, so `Warning` is never produced.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LatencyPolicy {
    warning_threshold_ms: Option<f64>,
}

impl LatencyPolicy {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn with_warning_threshold(threshold_ms: f64) -> Self {
        Self {
            warning_threshold_ms: Some(threshold_ms),
        }
    }

    pub fn warning_threshold_ms(&self) -> Option<f64> {
        self.warning_threshold_ms
    }

    pub fn classify(&self, result: ProbeResult) -> ProbeReading {
        if !result.success {
            return ProbeReading {
                status: Status::Dead,
                latency_ms: 0.0,
            };
        }

        let status = match self.warning_threshold_ms {
            Some(threshold) if result.latency_ms > threshold => Status::Warning,
            _ => Status::Normal,
        };
        ProbeReading {
            status,
            latency_ms: result.latency_ms,
        }
    }
}
