//! Per-turn signal metrics submitted with an answer.
//!
//! Typed at the request boundary, stored as an open JSON object on the turn.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_frames: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression_distribution: Option<HashMap<String, f64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceMetrics {
    /// Hz
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_pitch: Option<f64>,
    /// 0..=1
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_volume: Option<f64>,
    /// Words per second.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaking_rate: Option<f64>,
    /// Seconds spent pausing vs speaking.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_distribution: Option<HashMap<String, f64>>,
}

/// What the candidate's client reports alongside an answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedMetrics {
    pub answer_duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_metrics: Option<FaceMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_metrics: Option<VoiceMetrics>,
    /// Whether the *next* question was requested as a follow-up.
    pub is_followup_question: bool,
}

impl SubmittedMetrics {
    pub fn validate(&self) -> Result<(), String> {
        if !self.answer_duration.is_finite() || self.answer_duration < 0.0 {
            return Err("answerDuration must be a non-negative number".to_string());
        }
        if let Some(frames) = self.face_metrics.as_ref().and_then(|f| f.detected_frames) {
            if frames < 0.0 {
                return Err("faceMetrics.detectedFrames must be >= 0".to_string());
            }
        }
        if let Some(voice) = &self.voice_metrics {
            if voice.avg_volume.is_some_and(|v| !(0.0..=1.0).contains(&v)) {
                return Err("voiceMetrics.avgVolume must be between 0 and 1".to_string());
            }
            let negative = [voice.avg_pitch, voice.speaking_rate]
                .into_iter()
                .flatten()
                .any(|v| v < 0.0);
            if negative {
                return Err("voiceMetrics values must be >= 0".to_string());
            }
        }
        Ok(())
    }
}

/// Overlays the submitted metrics on the turn's existing metrics object.
/// Keys already stored (such as `questionId`) survive unless overwritten.
pub fn merge_metrics(previous: &Value, submitted: &SubmittedMetrics) -> Value {
    let mut merged: Map<String, Value> = previous.as_object().cloned().unwrap_or_default();
    if let Ok(Value::Object(next)) = serde_json::to_value(submitted) {
        merged.extend(next);
    }
    Value::Object(merged)
}
