use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

/// Status payload as the provider returns it. Some endpoints answer with a bare
/// string, others with an object carrying `status` and `progress`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawStatus {
    Text(String),
    Structured {
        status: String,
        #[serde(default)]
        progress: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Error,
    Unknown(String),
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Error => "ERROR",
            Self::Unknown(raw) => raw.as_str(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TaskStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedStatus {
    pub status: TaskStatus,
    pub progress: u8,
}

impl NormalizedStatus {
    /// Structured form that normalizes back to `self`.
    pub fn into_raw(self) -> RawStatus {
        RawStatus::Structured {
            status: self.status.as_str().to_string(),
            progress: Some(f64::from(self.progress)),
        }
    }
}

pub fn normalize(raw: &RawStatus) -> NormalizedStatus {
    match raw {
        RawStatus::Text(value) => normalize_text(value),
        RawStatus::Structured { status, progress } => NormalizedStatus {
            status: structured_status(status),
            progress: progress.map(clamp_progress).unwrap_or(0),
        },
    }
}

fn normalize_text(value: &str) -> NormalizedStatus {
    // Bare-string responses carry no progress, so RUNNING uses a fixed midpoint.
    match value.trim().to_ascii_uppercase().as_str() {
        "SUCCESS" | "COMPLETED" => NormalizedStatus {
            status: TaskStatus::Completed,
            progress: 100,
        },
        "RUNNING" | "PENDING" => NormalizedStatus {
            status: TaskStatus::Running,
            progress: 50,
        },
        "FAILED" | "ERROR" => NormalizedStatus {
            status: TaskStatus::Error,
            progress: 0,
        },
        _ => NormalizedStatus {
            status: TaskStatus::Unknown(value.to_string()),
            progress: 0,
        },
    }
}

fn structured_status(value: &str) -> TaskStatus {
    match value.trim().to_ascii_uppercase().as_str() {
        "PENDING" => TaskStatus::Pending,
        "RUNNING" => TaskStatus::Running,
        "COMPLETED" | "SUCCESS" => TaskStatus::Completed,
        "ERROR" | "FAILED" => TaskStatus::Error,
        _ => TaskStatus::Unknown(value.to_string()),
    }
}

fn clamp_progress(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn text(value: &str) -> RawStatus {
        RawStatus::Text(value.to_string())
    }

    #[test]
    fn bare_completion_synonyms_map_to_completed_at_full_progress() {
        for value in ["SUCCESS", "COMPLETED", "success", " Completed "] {
            let normalized = normalize(&text(value));
            assert_eq!(normalized.status, TaskStatus::Completed, "{value}");
            assert_eq!(normalized.progress, 100, "{value}");
        }
    }

    #[test]
    fn bare_in_flight_synonyms_map_to_running_midpoint() {
        for value in ["RUNNING", "PENDING", "running"] {
            let normalized = normalize(&text(value));
            assert_eq!(normalized.status, TaskStatus::Running, "{value}");
            assert_eq!(normalized.progress, 50, "{value}");
        }
    }

    #[test]
    fn bare_failure_synonyms_map_to_error_at_zero() {
        for value in ["FAILED", "ERROR", "failed"] {
            let normalized = normalize(&text(value));
            assert_eq!(normalized.status, TaskStatus::Error, "{value}");
            assert_eq!(normalized.progress, 0, "{value}");
        }
    }

    #[test]
    fn unrecognized_string_is_preserved_verbatim() {
        let normalized = normalize(&text("QUEUED_REMOTE"));
        assert_eq!(
            normalized,
            NormalizedStatus {
                status: TaskStatus::Unknown(String::from("QUEUED_REMOTE")),
                progress: 0,
            }
        );
        assert_eq!(normalized.status.to_string(), "QUEUED_REMOTE");
    }

    #[test]
    fn structured_progress_overrides_synonym_default() {
        let normalized = normalize(&RawStatus::Structured {
            status: String::from("RUNNING"),
            progress: Some(73.0),
        });
        assert_eq!(normalized.status, TaskStatus::Running);
        assert_eq!(normalized.progress, 73);

        let completed = normalize(&RawStatus::Structured {
            status: String::from("SUCCESS"),
            progress: Some(90.0),
        });
        assert_eq!(completed.status, TaskStatus::Completed);
        assert_eq!(completed.progress, 90);
    }

    #[test]
    fn structured_without_progress_defaults_to_zero() {
        let normalized = normalize(&RawStatus::Structured {
            status: String::from("RUNNING"),
            progress: None,
        });
        assert_eq!(normalized.progress, 0);
    }

    #[test]
    fn structured_progress_is_clamped() {
        let over = normalize(&RawStatus::Structured {
            status: String::from("RUNNING"),
            progress: Some(140.0),
        });
        assert_eq!(over.progress, 100);
        let under = normalize(&RawStatus::Structured {
            status: String::from("RUNNING"),
            progress: Some(-3.0),
        });
        assert_eq!(under.progress, 0);
    }

    #[test]
    fn normalization_is_idempotent_for_canonical_structured_form() {
        let inputs = [
            text("SUCCESS"),
            text("PENDING"),
            text("FAILED"),
            text("something-else"),
            RawStatus::Structured {
                status: String::from("PENDING"),
                progress: Some(10.0),
            },
            RawStatus::Structured {
                status: String::from("RUNNING"),
                progress: None,
            },
        ];
        for raw in inputs {
            let once = normalize(&raw);
            let twice = normalize(&once.clone().into_raw());
            assert_eq!(twice, once, "{raw:?}");
        }
    }

    #[test]
    fn deserializes_both_upstream_shapes() {
        let bare: RawStatus = serde_json::from_value(json!("RUNNING")).expect("bare string");
        assert_eq!(bare, text("RUNNING"));

        let structured: RawStatus =
            serde_json::from_value(json!({"status": "RUNNING", "progress": 42}))
                .expect("structured object");
        assert_eq!(
            structured,
            RawStatus::Structured {
                status: String::from("RUNNING"),
                progress: Some(42.0),
            }
        );
    }

    #[test]
    fn serializes_status_as_plain_string() {
        let value = serde_json::to_value(NormalizedStatus {
            status: TaskStatus::Completed,
            progress: 100,
        })
        .expect("serialize");
        assert_eq!(value, json!({"status": "COMPLETED", "progress": 100}));
    }
}
