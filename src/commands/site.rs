/*!
 * `site`: register, list and remove monitored sites
 */

use crate::error::{AppError, Result};
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use pulsar::{
    ChannelState, ExpectedPixels, NewSite, OrgId, Site, SiteId, SiteOverview, SiteRegistry,
};

/// Arguments of `site add`
#[derive(Debug, Clone)]
pub struct AddSite {
    pub org_id: OrgId,
    pub url: String,
    pub name: Option<String>,
    pub gtm_container_id: Option<String>,
    pub ga4_measurement_id: Option<String>,
    pub meta_pixel_id: Option<String>,
}

/// Register a site; the name defaults to the URL
pub async fn add_site(registry: &dyn SiteRegistry, args: AddSite) -> Result<Site> {
    if args.url.is_empty() {
        return Err(AppError::InvalidInput("URL is required".to_string()));
    }

    let name = args.name.unwrap_or_else(|| args.url.clone());
    let site = registry
        .register_site(
            NewSite::new(args.org_id, args.url)
                .with_name(name)
                .with_expected(ExpectedPixels {
                    gtm_container_id: args.gtm_container_id,
                    ga4_measurement_id: args.ga4_measurement_id,
                    meta_pixel_id: args.meta_pixel_id,
                }),
        )
        .await?;

    tracing::info!(site_id = site.id, url = %site.url, "Site registered");
    Ok(site)
}

/// Sites of an organization with their status, newest first
pub async fn list_sites(registry: &dyn SiteRegistry, org_id: OrgId) -> Result<Vec<SiteOverview>> {
    Ok(registry.sites_for_org(org_id).await?)
}

/// Delete a site and everything recorded for it
pub async fn remove_site(registry: &dyn SiteRegistry, org_id: OrgId, site_id: SiteId) -> Result<()> {
    if !registry.remove_site(org_id, site_id).await? {
        return Err(pulsar::Error::UnknownSite(site_id).into());
    }
    tracing::info!(site_id, org_id, "Site removed");
    Ok(())
}

fn channel_cell(state: &ChannelState) -> String {
    match state.status {
        Some(status) => status.to_string(),
        None => "-".to_string(),
    }
}

/// Render a site overview table for the terminal
pub fn render_sites(sites: &[SiteOverview]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "ID",
            "URL",
            "GTM",
            "GA4",
            "Meta",
            "Overall",
            "Issues",
            "Heartbeats",
            "Last heartbeat",
        ]);

    for overview in sites {
        let status = &overview.status;
        table.add_row(vec![
            overview.site.id.to_string(),
            overview.site.url.clone(),
            channel_cell(&status.gtm),
            channel_cell(&status.ga4),
            channel_cell(&status.meta),
            status
                .overall
                .map(|o| o.to_string())
                .unwrap_or_else(|| "-".to_string()),
            status.issue_count.to_string(),
            status.total_heartbeats.to_string(),
            status
                .last_heartbeat_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "never".to_string()),
        ]);
    }

    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsar::MemoryStore;

    fn add(org_id: OrgId, url: &str) -> AddSite {
        AddSite {
            org_id,
            url: url.to_string(),
            name: None,
            gtm_container_id: Some("GTM-ABC".to_string()),
            ga4_measurement_id: None,
            meta_pixel_id: None,
        }
    }

    #[tokio::test]
    async fn test_add_defaults_name_to_url() {
        let store = MemoryStore::new();
        let site = add_site(&store, add(1, "https://a.example")).await.unwrap();
        assert_eq!(site.name.as_deref(), Some("https://a.example"));
        assert_eq!(site.expected.gtm_container_id.as_deref(), Some("GTM-ABC"));
    }

    #[tokio::test]
    async fn test_add_rejects_empty_url() {
        let store = MemoryStore::new();
        let err = add_site(&store, add(1, "")).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_remove_unknown_site() {
        let store = MemoryStore::new();
        let site = add_site(&store, add(1, "https://a.example")).await.unwrap();

        let err = remove_site(&store, 2, site.id).await.unwrap_err();
        assert!(matches!(err, AppError::Store(pulsar::Error::UnknownSite(_))));
        remove_site(&store, 1, site.id).await.unwrap();
        assert!(list_sites(&store, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_render_unreported_site() {
        let store = MemoryStore::new();
        add_site(&store, add(1, "https://a.example")).await.unwrap();

        let rendered = render_sites(&list_sites(&store, 1).await.unwrap());
        assert!(rendered.contains("https://a.example"));
        assert!(rendered.contains("never"));
    }
}
