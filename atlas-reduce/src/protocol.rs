//! Wire messages exchanged with the visualization page.
//!
//! Input: `{"params": {...}, "result": {"points": [...]}}`.
//! Output, one object per message:
//! - `{"result": [{"x":..,"y":..}], "error": null, "final": bool}`
//! - `{"data": [], "error": "..."}` (terminal)

use atlas_core::{Point, Record, ReductionFrame, ReductionParams};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Input message could not be decoded.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("invalid input message: {0}")]
    InvalidMessage(#[from] serde_json::Error),
}

/// Points returned by the query collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordSet {
    #[serde(default)]
    pub points: Vec<Record>,
}

/// One reduction request. Missing sections decode as empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputMessage {
    #[serde(default)]
    pub params: ReductionParams,
    #[serde(default)]
    pub result: RecordSet,
}

impl InputMessage {
    pub fn new(params: ReductionParams, points: Vec<Record>) -> Self {
        Self {
            params,
            result: RecordSet { points },
        }
    }

    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(line)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputMessage {
    /// Coordinates for every input row, in row order. `error` is always null.
    Frame {
        result: Vec<Point>,
        error: (),
        #[serde(rename = "final")]
        is_final: bool,
    },
    /// Request rejected; no frame follows.
    Error { data: Vec<Point>, error: String },
}

impl OutputMessage {
    pub fn error(message: impl fmt::Display) -> Self {
        OutputMessage::Error {
            data: Vec::new(),
            error: message.to_string(),
        }
    }

    /// Last message of a request: the final frame or an error.
    pub fn is_terminal(&self) -> bool {
        match self {
            OutputMessage::Frame { is_final, .. } => *is_final,
            OutputMessage::Error { .. } => true,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<ReductionFrame> for OutputMessage {
    fn from(frame: ReductionFrame) -> Self {
        OutputMessage::Frame {
            result: frame.points,
            error: (),
            is_final: frame.is_final,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_core::{PointId, VectorPayload};
    use serde_json::json;

    #[test]
    fn test_decode_full_message() {
        let line = r#"{
            "params": {"algorithm": "TSNE", "perplexity": 20, "color_by": "label", "limit": 500},
            "result": {"points": [
                {"id": 1, "vector": [0.5, 1.5], "payload": {"label": "a"}},
                {"id": "7c9e6679-7425-40de-944b-e07fc1f90ae7", "vector": {"image": [1, 2]}}
            ]}
        }"#;
        let message = InputMessage::decode(line).unwrap();

        assert_eq!(message.params.algorithm.as_deref(), Some("TSNE"));
        assert_eq!(message.params.perplexity, Some(20.0));
        assert_eq!(message.result.points.len(), 2);
        assert_eq!(message.result.points[0].id, PointId::Num(1));
        assert_eq!(
            message.result.points[0].vector,
            Some(VectorPayload::Dense(vec![0.5, 1.5]))
        );
        assert!(matches!(
            message.result.points[1].vector,
            Some(VectorPayload::Named(_))
        ));
    }

    #[test]
    fn test_missing_sections_are_empty() {
        let message = InputMessage::decode("{}").unwrap();
        assert_eq!(message, InputMessage::default());
        assert!(message.result.points.is_empty());
    }

    #[test]
    fn test_invalid_json_is_reported() {
        let err = InputMessage::decode("not json").unwrap_err();
        assert!(err.to_string().starts_with("invalid input message:"));
    }

    #[test]
    fn test_frame_wire_shape() {
        let frame = ReductionFrame {
            points: vec![Point { x: 1.0, y: -2.0 }],
            is_final: false,
        };
        let value = serde_json::to_value(OutputMessage::from(frame)).unwrap();
        assert_eq!(
            value,
            json!({"result": [{"x": 1.0, "y": -2.0}], "error": null, "final": false})
        );
    }

    #[test]
    fn test_error_wire_shape() {
        let value = serde_json::to_value(OutputMessage::error("no data found")).unwrap();
        assert_eq!(value, json!({"data": [], "error": "no data found"}));
    }

    #[test]
    fn test_decode_output_messages() {
        let frame: OutputMessage =
            serde_json::from_str(r#"{"result": [], "error": null, "final": true}"#).unwrap();
        assert!(frame.is_terminal());
        assert!(matches!(frame, OutputMessage::Frame { .. }));

        let error: OutputMessage =
            serde_json::from_str(r#"{"data": [], "error": "boom"}"#).unwrap();
        assert_eq!(error, OutputMessage::error("boom"));
    }

    #[test]
    fn test_partial_frame_is_not_terminal() {
        let frame = OutputMessage::from(ReductionFrame {
            points: Vec::new(),
            is_final: false,
        });
        assert!(!frame.is_terminal());
        assert!(OutputMessage::error("x").is_terminal());
    }
}
