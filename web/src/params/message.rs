use serde::Deserialize;
use utoipa::ToSchema;

/// Body of an out-of-band message pushed to every stream client.
#[derive(Debug, Deserialize, ToSchema)]
pub(crate) struct CreateParams {
    /// Text forwarded verbatim as the `data:` of one frame.
    #[schema(example = "maintenance starts in 5 minutes")]
    pub(crate) message: String,
}
