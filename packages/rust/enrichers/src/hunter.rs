//! Hunter.io domain-search enrichment.
//!
//! The free tier allows only a few searches a month, so the batch starts by
//! reading the remaining quota from `/account` and stops searching once it
//! is spent.

use serde::Deserialize;
use tracing::{error, info, instrument, warn};
use url::Url;

use leadpipe_shared::{HttpConfig, HunterConfig, Lead, LeadPipeError, Result, resolve_secret};

use crate::http::HttpFetcher;
use crate::{normalize_site_url, throttle};

/// Mailbox prefixes preferred over personal addresses.
const GENERIC_MAILBOXES: &[&str] = &["contato", "comercial", "info", "atendimento"];

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Default, Deserialize)]
struct AccountData {
    #[serde(default)]
    requests: AccountRequests,
}

#[derive(Debug, Default, Deserialize)]
struct AccountRequests {
    #[serde(default)]
    searches: Quota,
}

#[derive(Debug, Default, Deserialize)]
struct Quota {
    #[serde(default)]
    used: u64,
    #[serde(default)]
    available: u64,
}

/// Fields of a domain search we use.
#[derive(Debug, Default, Deserialize)]
pub struct DomainData {
    #[serde(default)]
    pub emails: Vec<DomainEmail>,
    #[serde(default)]
    pub linkedin: Option<String>,
    /// Handle, not URL.
    #[serde(default)]
    pub twitter: Option<String>,
    #[serde(default)]
    pub facebook: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DomainEmail {
    pub value: String,
}

pub struct HunterEnricher {
    fetcher: HttpFetcher,
    api_key: String,
    base_url: String,
    delay_ms: u64,
}

impl HunterEnricher {
    /// Build an enricher; fails with a config error when the key is not set.
    pub fn new(config: &HunterConfig, http: &HttpConfig) -> Result<Self> {
        let api_key = resolve_secret(&config.api_key_env)?;
        Ok(Self {
            fetcher: HttpFetcher::new(http)?,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            delay_ms: http.hunter_delay_ms,
        })
    }

    pub fn with_api_key(
        api_key: impl Into<String>,
        base_url: &str,
        fetcher: HttpFetcher,
        delay_ms: u64,
    ) -> Self {
        Self {
            fetcher,
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            delay_ms,
        }
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut all: Vec<(&str, &str)> = params.to_vec();
        all.push(("api_key", self.api_key.as_str()));
        Url::parse_with_params(&format!("{}/{path}", self.base_url), all)
            .map_err(|e| LeadPipeError::Enrichment(format!("invalid Hunter URL: {e}")))
    }

    /// Searches left this month.
    pub async fn remaining_searches(&self) -> Result<u64> {
        let url = self.endpoint("account", &[])?;
        let page = self.fetcher.get(url.as_str()).await?;
        if !page.is_ok() {
            return Err(LeadPipeError::Enrichment(format!(
                "account check returned HTTP {}",
                page.status
            )));
        }
        let account: Envelope<AccountData> = serde_json::from_str(&page.body)
            .map_err(|e| LeadPipeError::parse(format!("invalid Hunter account response: {e}")))?;
        let quota = account.data.requests.searches;
        Ok(quota.available.saturating_sub(quota.used))
    }

    /// Domain search. `Ok(None)` when Hunter answered but had nothing usable.
    pub async fn domain_search(&self, domain: &str) -> Result<Option<DomainData>> {
        let url = self.endpoint("domain-search", &[("domain", domain)])?;
        let page = self.fetcher.get(url.as_str()).await?;

        match page.status {
            200 => {
                let body: Envelope<DomainData> = serde_json::from_str(&page.body).map_err(|e| {
                    LeadPipeError::parse(format!("invalid Hunter domain response: {e}"))
                })?;
                Ok(Some(body.data))
            }
            401 => Err(LeadPipeError::Enrichment("Hunter rejected the API key".into())),
            429 => {
                warn!(domain, "Hunter rate limit reached");
                Ok(None)
            }
            status => {
                warn!(domain, status, "unexpected Hunter status");
                Ok(None)
            }
        }
    }

    /// Enrich one lead from its site's domain. Errors are logged and the lead returned as is.
    #[instrument(skip_all, fields(lead = %lead.name))]
    pub async fn enrich(&self, mut lead: Lead) -> Lead {
        let Some(domain) = lead.site_url().and_then(extract_domain) else {
            return lead;
        };

        match self.domain_search(&domain).await {
            Ok(Some(data)) => {
                apply_domain_data(&mut lead, data);
                info!(%domain, email = ?lead.email, "domain enriched");
            }
            Ok(None) => {}
            Err(e) => error!(%domain, error = %e, "domain search failed"),
        }
        lead
    }

    /// Enrich leads with a site while quota lasts; the rest pass through.
    pub async fn enrich_leads(&self, leads: Vec<Lead>) -> Vec<Lead> {
        let remaining = match self.remaining_searches().await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "could not read Hunter quota, skipping enrichment");
                return leads;
            }
        };

        let wanted = leads.iter().filter(|l| l.has_site()).count() as u64;
        info!(remaining, wanted, "Hunter quota checked");
        if remaining < wanted {
            warn!(remaining, wanted, "not enough Hunter searches for every lead");
        }

        let mut used = 0;
        let mut enriched = Vec::with_capacity(leads.len());
        for lead in leads {
            if !lead.has_site() {
                enriched.push(lead);
                continue;
            }
            if used >= remaining {
                enriched.push(lead);
                continue;
            }
            enriched.push(self.enrich(lead).await);
            used += 1;
            throttle(self.delay_ms).await;
        }

        if used >= remaining {
            warn!(used, "Hunter quota exhausted");
        }
        enriched
    }
}

/// Host of a site URL without a leading `www.`.
pub fn extract_domain(site: &str) -> Option<String> {
    let url = Url::parse(&normalize_site_url(site)).ok()?;
    let host = url.host_str()?;
    let domain = host.strip_prefix("www.").unwrap_or(host);
    (!domain.is_empty()).then(|| domain.to_string())
}

/// Fill what the lead lacks: a generic mailbox first, then any address, then social links.
fn apply_domain_data(lead: &mut Lead, data: DomainData) {
    if !lead.has_email() {
        let generic = data.emails.iter().find(|e| {
            let lower = e.value.to_lowercase();
            GENERIC_MAILBOXES.iter().any(|p| lower.contains(p))
        });
        lead.email = generic
            .or_else(|| data.emails.first())
            .map(|e| e.value.clone());
    }
    if lead.social.linkedin.is_none() {
        lead.social.linkedin = data.linkedin.filter(|l| !l.is_empty());
    }
    if lead.social.twitter.is_none() {
        lead.social.twitter = data
            .twitter
            .filter(|t| !t.is_empty())
            .map(|t| format!("https://twitter.com/{t}"));
    }
    if lead.social.facebook.is_none() {
        lead.social.facebook = data.facebook.filter(|f| !f.is_empty());
    }
}
