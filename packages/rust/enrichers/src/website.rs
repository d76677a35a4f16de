//! Website reachability and contact scraping.

use scraper::Html;
use tracing::{info, instrument, warn};

use leadpipe_shared::{HttpConfig, Lead, Result, Website};

use crate::http::HttpFetcher;
use crate::{contacts, normalize_site_url, throttle};

pub struct WebsiteAnalyzer {
    fetcher: HttpFetcher,
    delay_ms: u64,
}

impl WebsiteAnalyzer {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        Ok(Self::with_fetcher(HttpFetcher::new(config)?, config.site_delay_ms))
    }

    pub fn with_fetcher(fetcher: HttpFetcher, delay_ms: u64) -> Self {
        Self { fetcher, delay_ms }
    }

    /// Check one lead's site. Leads without a site come back unchanged.
    ///
    /// On HTTP 200 the page is scanned for a missing email or phone. Any
    /// fetch failure marks the site inactive.
    #[instrument(skip_all, fields(lead = %lead.name))]
    pub async fn analyze(&self, mut lead: Lead) -> Lead {
        let Some(site) = lead.site_url() else {
            return lead;
        };
        let url = normalize_site_url(site);
        info!(%url, "analyzing site");

        match self.fetcher.get(&url).await {
            Ok(page) => {
                let mut website = Website::new(page.final_url.clone());
                website.active = page.is_ok();
                info!(
                    url = %website.url,
                    active = website.active,
                    https = website.uses_https,
                    status = page.status,
                    "site checked"
                );
                lead.site = Some(website);

                if page.is_ok() {
                    let (email, phone) = scan_contacts(&page.body);
                    if !lead.has_email() {
                        lead.email = email;
                    }
                    if !lead.has_phone() {
                        lead.phone = phone;
                    }
                }
            }
            Err(e) => {
                warn!(%url, error = %e, "site unreachable");
                if let Some(website) = &mut lead.site {
                    website.active = false;
                }
            }
        }
        lead
    }

    /// Analyze every lead in order, pausing between them.
    pub async fn analyze_leads(&self, leads: Vec<Lead>) -> Vec<Lead> {
        let total = leads.len();
        let mut analyzed = Vec::with_capacity(total);
        for (i, lead) in leads.into_iter().enumerate() {
            info!(current = i + 1, total, lead = %lead.name, "site analysis");
            let has_site = lead.has_site();
            analyzed.push(self.analyze(lead).await);
            if has_site {
                throttle(self.delay_ms).await;
            }
        }
        analyzed
    }
}

/// Email and phone found on a page. Parsing stays out of async code.
fn scan_contacts(html: &str) -> (Option<String>, Option<String>) {
    let doc = Html::parse_document(html);
    let email = contacts::find_email(&doc, html);
    let phone = contacts::find_phone(html);
    (email, phone)
}
