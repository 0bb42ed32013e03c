use serde::{Deserialize, Serialize};

use crate::imaging::operation::Parameters;
use crate::pipeline::controller::TransformOutcome;
use crate::session_management::session::SessionId;

/// Envelope wrapped around every JSON reply.
///
/// On success `message` carries the payload; on failure it carries a
/// human-readable description and `error` names the failure kind.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: T,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: T) -> Self {
        Self {
            success: true,
            message,
            error: None,
        }
    }
}

impl ApiResponse<String> {
    pub fn failed(kind: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error: Some(kind.to_string()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub session_id: SessionId,
}

/// A parameter value as sent by clients: either a string or a bare integer.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Text(String),
    Integer(i64),
}

impl From<ParamValue> for String {
    fn from(value: ParamValue) -> Self {
        match value {
            ParamValue::Text(s) => s,
            ParamValue::Integer(n) => n.to_string(),
        }
    }
}

/// Body of the `blur` and `sharpen` endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigmaRequest {
    pub session_id: String,
    pub sigma: ParamValue,
}

impl SigmaRequest {
    pub fn parameters(self) -> (String, Parameters) {
        let mut parameters = Parameters::new();
        parameters.insert("sigma".to_string(), self.sigma.into());
        (self.session_id, parameters)
    }
}

/// Body of the generic `transform` endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformRequest {
    pub session_id: String,
    pub operation: String,
    #[serde(default)]
    pub parameters: std::collections::BTreeMap<String, ParamValue>,
}

impl TransformRequest {
    pub fn parameters(self) -> (String, String, Parameters) {
        let parameters = self
            .parameters
            .into_iter()
            .map(|(k, v)| (k, v.into()))
            .collect();
        (self.session_id, self.operation, parameters)
    }
}

/// Reported back after a transform; parameters are echoed at top level.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformResponse {
    pub session_id: SessionId,
    pub path: String,
    pub operation: String,
    #[serde(flatten)]
    pub parameters: Parameters,
}

impl From<TransformOutcome> for TransformResponse {
    fn from(outcome: TransformOutcome) -> Self {
        Self {
            session_id: outcome.session_id,
            path: outcome.artifact_path.display().to_string(),
            operation: outcome.operation,
            parameters: outcome.parameters,
        }
    }
}
