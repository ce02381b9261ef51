//! Request extractors

use crate::error::WebError;
use axum::extract::{FromRequest, FromRequestParts};
use axum::http::request::Parts;
use pulsar::OrgId;

/// JSON body whose rejection is reported as a JSON error
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(WebError))]
pub struct ApiJson<T>(pub T);

/// Path parameters whose rejection is reported as a JSON error
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(WebError))]
pub struct ApiPath<T>(pub T);

/// Query string whose rejection is reported as a JSON error
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(WebError))]
pub struct ApiQuery<T>(pub T);

/// Organization of the caller, set by the upstream authentication layer
#[derive(Debug, Copy, Clone)]
pub struct OrgIdHeader(pub OrgId);

#[axum::async_trait]
impl<S> FromRequestParts<S> for OrgIdHeader
where
    S: Send + Sync,
{
    type Rejection = WebError;

    #[tracing::instrument(level = "debug", name = "extract.org_id", skip_all)]
    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("x-org-id")
            .ok_or(WebError::MissingOrgId)?
            .to_str()
            .map_err(|e| WebError::InvalidOrgId(e.to_string()))?;
        let org_id = raw
            .trim()
            .parse::<OrgId>()
            .map_err(|e| WebError::InvalidOrgId(e.to_string()))?;
        Ok(Self(org_id))
    }
}
