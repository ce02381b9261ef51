//! Site management and status API endpoints
//!
//! Every route is scoped to the caller's organization; a site owned by
//! another organization is reported as not found.

use crate::error::{WebError, WebResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery, OrgIdHeader};
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use pulsar::{ExpectedPixels, NewSite, Site, SiteId, SiteUpdate};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Site creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSiteRequest {
    #[serde(default)]
    pub url: String,
    pub name: Option<String>,
    pub gtm_container_id: Option<String>,
    pub ga4_measurement_id: Option<String>,
    pub meta_pixel_id: Option<String>,
}

/// Site edit request; absent fields keep their stored value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSiteRequest {
    pub url: Option<String>,
    pub name: Option<String>,
    pub gtm_container_id: Option<String>,
    pub ga4_measurement_id: Option<String>,
    pub meta_pixel_id: Option<String>,
}

impl From<UpdateSiteRequest> for SiteUpdate {
    fn from(request: UpdateSiteRequest) -> Self {
        SiteUpdate {
            url: request.url,
            name: request.name,
            expected: ExpectedPixels {
                gtm_container_id: request.gtm_container_id,
                ga4_measurement_id: request.ga4_measurement_id,
                meta_pixel_id: request.meta_pixel_id,
            },
        }
    }
}

/// Query string of the heartbeats route
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HeartbeatQuery {
    pub limit: Option<u32>,
}

async fn owned_site(state: &AppState, org_id: i64, site_id: SiteId) -> WebResult<Site> {
    match state.sites.get_site(site_id).await? {
        Some(site) if site.org_id == org_id => Ok(site),
        _ => Err(WebError::SiteNotFound(site_id.to_string())),
    }
}

/// List the organization's sites with their current status
pub async fn list_sites(
    State(state): State<AppState>,
    OrgIdHeader(org_id): OrgIdHeader,
) -> WebResult<Json<Value>> {
    let sites = state.sites.sites_for_org(org_id).await?;
    Ok(Json(json!({ "sites": sites })))
}

/// Register a new site
pub async fn create_site(
    State(state): State<AppState>,
    OrgIdHeader(org_id): OrgIdHeader,
    ApiJson(request): ApiJson<CreateSiteRequest>,
) -> WebResult<(StatusCode, Json<Value>)> {
    if request.url.is_empty() {
        return Err(WebError::BadRequest("URL is required".to_string()));
    }

    let name = request.name.unwrap_or_else(|| request.url.clone());
    let site = state
        .sites
        .register_site(
            NewSite::new(org_id, request.url)
                .with_name(name)
                .with_expected(ExpectedPixels {
                    gtm_container_id: request.gtm_container_id,
                    ga4_measurement_id: request.ga4_measurement_id,
                    meta_pixel_id: request.meta_pixel_id,
                }),
        )
        .await?;

    tracing::info!(site_id = site.id, org_id, url = %site.url, "Site registered");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Site created successfully", "site": site })),
    ))
}

/// Get a single site
pub async fn get_site(
    State(state): State<AppState>,
    OrgIdHeader(org_id): OrgIdHeader,
    ApiPath(site_id): ApiPath<SiteId>,
) -> WebResult<Json<Value>> {
    let site = owned_site(&state, org_id, site_id).await?;
    Ok(Json(json!({ "site": site })))
}

/// Edit a site's URL, name or expected pixel ids
pub async fn update_site(
    State(state): State<AppState>,
    OrgIdHeader(org_id): OrgIdHeader,
    ApiPath(site_id): ApiPath<SiteId>,
    ApiJson(request): ApiJson<UpdateSiteRequest>,
) -> WebResult<Json<Value>> {
    if request.url.as_deref() == Some("") {
        return Err(WebError::BadRequest("URL cannot be empty".to_string()));
    }

    let site = state
        .sites
        .update_site(org_id, site_id, request.into())
        .await?
        .ok_or_else(|| WebError::SiteNotFound(site_id.to_string()))?;

    tracing::info!(site_id, org_id, "Site updated");
    Ok(Json(
        json!({ "message": "Site updated successfully", "site": site }),
    ))
}

/// Delete a site together with its heartbeats and status
pub async fn delete_site(
    State(state): State<AppState>,
    OrgIdHeader(org_id): OrgIdHeader,
    ApiPath(site_id): ApiPath<SiteId>,
) -> WebResult<Json<Value>> {
    let site = owned_site(&state, org_id, site_id).await?;
    if !state.sites.remove_site(org_id, site_id).await? {
        return Err(WebError::SiteNotFound(site_id.to_string()));
    }

    tracing::info!(site_id, org_id, "Site deleted");
    Ok(Json(
        json!({ "message": "Site deleted successfully", "site": site }),
    ))
}

/// Current pixel status of a site
pub async fn get_site_status(
    State(state): State<AppState>,
    OrgIdHeader(org_id): OrgIdHeader,
    ApiPath(site_id): ApiPath<SiteId>,
) -> WebResult<Json<Value>> {
    owned_site(&state, org_id, site_id).await?;
    let status = state
        .heartbeats
        .site_status(site_id)
        .await?
        .ok_or_else(|| WebError::SiteNotFound(site_id.to_string()))?;
    Ok(Json(json!({ "status": status })))
}

/// Most recent heartbeats of a site, newest first
pub async fn get_site_heartbeats(
    State(state): State<AppState>,
    OrgIdHeader(org_id): OrgIdHeader,
    ApiPath(site_id): ApiPath<SiteId>,
    ApiQuery(query): ApiQuery<HeartbeatQuery>,
) -> WebResult<Json<Value>> {
    owned_site(&state, org_id, site_id).await?;
    let limit = state.limits.heartbeat_limit(query.limit);
    let heartbeats = state.heartbeats.recent_heartbeats(site_id, limit).await?;
    Ok(Json(json!({ "heartbeats": heartbeats })))
}
