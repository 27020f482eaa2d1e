//! Defence-focused intelligence derived from prototype metadata
//!
//! Prototype metadata is a flat string map; the enumerated keys below are
//! parsed into a typed assessment when the matched label is a drone.

use serde::Serialize;
use std::collections::HashMap;

/// Typed threat profile for a detected drone class
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatAssessment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threat_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_capacity_kg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_range_km: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_speed_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flight_time_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jamming_susceptible: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub countermeasure_recommendations: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detection_range_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_military_grade: Option<bool>,
}

impl ThreatAssessment {
    /// Extract whatever threat fields the metadata map carries.
    ///
    /// Unparseable numeric values are skipped rather than failing the
    /// prediction. Callers attach the assessment only when at least one of
    /// `threat_level` or `risk_category` was present.
    pub fn from_metadata(metadata: &HashMap<String, String>) -> Self {
        Self {
            threat_level: metadata.get("threat_level").cloned(),
            risk_category: metadata.get("risk_category").cloned(),
            payload_capacity_kg: parse_f64(metadata.get("payload_capacity_kg")),
            max_range_km: parse_f64(metadata.get("max_range_km")),
            max_speed_ms: parse_f64(metadata.get("max_speed_ms")),
            flight_time_minutes: parse_i64(metadata.get("flight_time_minutes")),
            jamming_susceptible: parse_bool(metadata.get("jamming_susceptible")),
            countermeasure_recommendations: metadata
                .get("countermeasure_recommendations")
                .cloned(),
            detection_range_m: parse_f64(metadata.get("detection_range_m")),
            operator_type: metadata.get("operator_type").cloned(),
            is_military_grade: parse_bool(metadata.get("is_military_grade")),
        }
    }
}

fn parse_f64(value: Option<&String>) -> Option<f64> {
    value.and_then(|v| v.trim().parse().ok())
}

fn parse_i64(value: Option<&String>) -> Option<i64> {
    value.and_then(|v| v.trim().parse().ok())
}

fn parse_bool(value: Option<&String>) -> Option<bool> {
    value.map(|v| matches!(v.as_str(), "true" | "yes" | "1"))
}
