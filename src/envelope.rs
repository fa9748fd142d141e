use crate::diagnostics::{ProcessContext, RequestContext};
use crate::source_error::SourceError;
use bytes::Bytes;
use http::StatusCode;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// JSON payload describing an upstream failure.
///
/// Field names are part of the wire format, clients parse them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub source: String,
    pub status: u16,
    pub err_mesg: String,
    pub err_obj: Map<String, Value>,
    pub err_stack: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub versions: BTreeMap<String, String>,
    pub platform: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<u32>>,
}

impl ErrorEnvelope {
    pub fn new(
        source_kind: &str,
        error: &SourceError,
        request: &RequestContext,
        process: ProcessContext,
    ) -> Self {
        Self {
            source: source_kind.to_string(),
            status: error.status().as_u16(),
            err_mesg: error.to_string(),
            err_obj: error.detail().clone(),
            err_stack: error.stack().to_vec(),
            method: request.method.as_ref().map(|method| method.to_string()),
            url: request.url.clone(),
            versions: process.versions,
            platform: process.platform,
            uid: process.uid,
            gid: process.gid,
            groups: process.groups,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Pretty-printed JSON with two space indentation.
    pub fn to_json_bytes(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec_pretty(self).map(Bytes::from)
    }
}
