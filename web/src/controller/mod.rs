use serde::Serialize;
use utoipa::ToSchema;

pub(crate) mod health_check_controller;
pub(crate) mod message_controller;

/// Minimal acknowledgement body returned by endpoints with no payload.
#[derive(Debug, Serialize, ToSchema)]
pub(crate) struct StatusResponse {
    pub(crate) status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) version: Option<&'static str>,
}

impl StatusResponse {
    pub(crate) fn new(status: &'static str) -> Self {
        Self {
            status,
            version: None,
        }
    }

    pub(crate) fn with_version(mut self, version: &'static str) -> Self {
        self.version = Some(version);
        self
    }
}
