//! Social profile discovery from a lead's own website.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

use leadpipe_shared::{HttpConfig, Lead, Result, SocialProfiles};

use crate::http::HttpFetcher;
use crate::{contacts, normalize_site_url, throttle};

/// Pages where businesses usually link their profiles. The empty path is the homepage.
pub const COMMON_PAGES: &[&str] = &["", "/contato", "/contact", "/sobre", "/about", "/fale-conosco"];

static ANCHOR_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

static TEXT_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s<>"']+|www\.[^\s<>"']+"#).expect("valid url regex")
});

static INSTAGRAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:https?://)?(?:www\.)?(?:instagram\.com|instagr\.am)/([a-z0-9_.]+)/?")
        .expect("valid instagram regex")
});

static LINKEDIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:https?://)?(?:[a-z]{2,3}\.)?linkedin\.com/(company|in)/([a-z0-9-]+)/?")
        .expect("valid linkedin regex")
});

static FACEBOOK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:https?://)?(?:www\.|m\.)?(?:facebook\.com|fb\.com)/([a-z0-9.]+)/?")
        .expect("valid facebook regex")
});

static TWITTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:https?://)?(?:www\.)?(?:twitter\.com|x\.com)/([a-z0-9_]+)/?")
        .expect("valid twitter regex")
});

static YOUTUBE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:https?://)?(?:www\.)?youtube\.com/(?:c/|channel/|user/|@)?([a-z0-9_-]+)/?")
        .expect("valid youtube regex")
});

static WHATSAPP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:https?://)?(?:(?:api\.)?whatsapp\.com/send/?\?phone=|wa\.me/)(\d+)")
        .expect("valid whatsapp regex")
});

// Path segments that are posts, share dialogs or listings rather than profiles.
const INSTAGRAM_IGNORED: &[&str] = &["p", "reel", "stories", "explore"];
const FACEBOOK_IGNORED: &[&str] = &["sharer", "share", "dialog"];
const TWITTER_IGNORED: &[&str] = &["share", "intent", "home"];
const YOUTUBE_IGNORED: &[&str] = &["watch", "results", "playlist"];

/// What one site yielded across all visited pages.
#[derive(Debug, Default)]
struct SiteFindings {
    links: Vec<String>,
    pages_loaded: usize,
}

pub struct SocialExtractor {
    fetcher: HttpFetcher,
    page_delay_ms: u64,
    lead_delay_ms: u64,
}

impl SocialExtractor {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        Ok(Self::with_fetcher(
            HttpFetcher::new(config)?,
            config.page_delay_ms,
            config.social_delay_ms,
        ))
    }

    pub fn with_fetcher(fetcher: HttpFetcher, page_delay_ms: u64, lead_delay_ms: u64) -> Self {
        Self {
            fetcher,
            page_delay_ms,
            lead_delay_ms,
        }
    }

    /// Visit the lead's homepage and contact pages and record every profile found.
    ///
    /// Profiles already on the lead are kept. A missing email or phone is
    /// filled from `mailto:`/`tel:` links.
    #[instrument(skip_all, fields(lead = %lead.name))]
    pub async fn extract(&self, mut lead: Lead) -> Lead {
        let Some(site) = lead.site_url() else {
            debug!("no site, skipping");
            return lead;
        };
        let base = match Url::parse(&normalize_site_url(site)) {
            Ok(url) => url,
            Err(e) => {
                warn!(site, error = %e, "invalid site URL, skipping");
                return lead;
            }
        };

        let findings = self.crawl_common_pages(&base).await;
        let found = parse_social_links(&findings.links);
        merge_profiles(&mut lead.social, found);

        if !lead.has_email() {
            if let Some(email) = findings.links.iter().find_map(|l| contacts::mailto_address(l)) {
                lead.email = Some(email);
            }
        }
        if !lead.has_phone() {
            if let Some(phone) = findings.links.iter().find_map(|l| contacts::tel_number(l)) {
                lead.phone = Some(phone);
            }
        }

        lead.social_enriched = true;
        info!(
            pages = findings.pages_loaded,
            instagram = ?lead.social.instagram,
            linkedin = ?lead.social.linkedin,
            "social profiles extracted"
        );
        lead
    }

    async fn crawl_common_pages(&self, base: &Url) -> SiteFindings {
        let mut findings = SiteFindings::default();
        let mut seen = HashSet::new();

        for (i, page) in COMMON_PAGES.iter().enumerate() {
            if i > 0 {
                throttle(self.page_delay_ms).await;
            }
            let url = if page.is_empty() {
                base.clone()
            } else {
                match base.join(page) {
                    Ok(url) => url,
                    Err(_) => continue,
                }
            };

            match self.fetcher.get(url.as_str()).await {
                Ok(fetched) if fetched.is_ok() => {
                    findings.pages_loaded += 1;
                    for link in extract_links(&fetched.body, base) {
                        if seen.insert(link.clone()) {
                            findings.links.push(link);
                        }
                    }
                }
                Ok(fetched) => debug!(url = %url, status = fetched.status, "page not available"),
                Err(e) => debug!(url = %url, error = %e, "page fetch failed"),
            }
        }
        findings
    }

    /// Extract profiles for every lead in order, pausing between leads.
    pub async fn enrich_leads(&self, leads: Vec<Lead>) -> Vec<Lead> {
        let total = leads.len();
        let mut enriched = Vec::with_capacity(total);
        for (i, lead) in leads.into_iter().enumerate() {
            info!(current = i + 1, total, lead = %lead.name, "social extraction");
            let has_site = lead.has_site();
            enriched.push(self.extract(lead).await);
            if has_site {
                throttle(self.lead_delay_ms).await;
            }
        }
        enriched
    }
}

/// Anchor targets resolved against `base`, plus bare URLs in the page text.
fn extract_links(html: &str, base: &Url) -> Vec<String> {
    let doc = Html::parse_document(html);
    let mut links = Vec::new();

    for el in doc.select(&ANCHOR_SEL) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.starts_with("mailto:") || href.starts_with("tel:") {
            links.push(href.to_string());
        } else if let Ok(resolved) = base.join(href) {
            links.push(resolved.to_string());
        }
    }

    let text: String = doc.root_element().text().collect();
    links.extend(TEXT_URL_RE.find_iter(&text).map(|m| m.as_str().to_string()));
    links
}

/// Recognize profile links. The first match per network wins.
fn parse_social_links(links: &[String]) -> SocialProfiles {
    let mut social = SocialProfiles::default();

    for link in links {
        if social.instagram.is_none() {
            if let Some(user) = capture(&INSTAGRAM_RE, link, 1, INSTAGRAM_IGNORED) {
                social.instagram = Some(format!("https://instagram.com/{user}"));
                continue;
            }
        }
        if social.linkedin.is_none() {
            if let Some(caps) = LINKEDIN_RE.captures(link) {
                let id = &caps[2];
                if caps[1].eq_ignore_ascii_case("company") {
                    social.linkedin = Some(format!("https://linkedin.com/company/{id}"));
                    social.linkedin_company_id = Some(id.to_string());
                } else {
                    social.linkedin = Some(format!("https://linkedin.com/in/{id}"));
                }
                continue;
            }
        }
        if social.facebook.is_none() {
            if let Some(page) = capture(&FACEBOOK_RE, link, 1, FACEBOOK_IGNORED) {
                social.facebook = Some(format!("https://facebook.com/{page}"));
                continue;
            }
        }
        if social.twitter.is_none() {
            if let Some(user) = capture(&TWITTER_RE, link, 1, TWITTER_IGNORED) {
                social.twitter = Some(format!("https://twitter.com/{user}"));
                continue;
            }
        }
        if social.youtube.is_none() {
            if let Some(channel) = capture(&YOUTUBE_RE, link, 1, YOUTUBE_IGNORED) {
                social.youtube = Some(format!("https://youtube.com/{channel}"));
                continue;
            }
        }
        if social.whatsapp.is_none() {
            if let Some(number) = capture(&WHATSAPP_RE, link, 1, &[]) {
                social.whatsapp = Some(number);
            }
        }
    }
    social
}

fn capture(re: &Regex, link: &str, group: usize, ignored: &[&str]) -> Option<String> {
    let value = re.captures(link)?.get(group)?.as_str();
    let lower = value.to_lowercase();
    (!ignored.contains(&lower.as_str())).then(|| value.to_string())
}

/// Fill the profile fields `current` lacks from `found`.
fn merge_profiles(current: &mut SocialProfiles, found: SocialProfiles) {
    if current.instagram.is_none() {
        current.instagram = found.instagram;
    }
    if current.linkedin.is_none() {
        current.linkedin = found.linkedin;
        current.linkedin_company_id = found.linkedin_company_id;
    }
    if current.facebook.is_none() {
        current.facebook = found.facebook;
    }
    if current.twitter.is_none() {
        current.twitter = found.twitter;
    }
    if current.youtube.is_none() {
        current.youtube = found.youtube;
    }
    if current.whatsapp.is_none() {
        current.whatsapp = found.whatsapp;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadpipe_shared::Website;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn links(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn recognizes_each_network() {
        let social = parse_social_links(&links(&[
            "https://www.instagram.com/clinicabh/",
            "https://br.linkedin.com/company/clinica-bh",
            "https://facebook.com/clinicabh",
            "https://x.com/clinicabh",
            "https://www.youtube.com/channel/UC123abc",
            "https://wa.me/5531999998888",
        ]));

        assert_eq!(social.instagram.as_deref(), Some("https://instagram.com/clinicabh"));
        assert_eq!(
            social.linkedin.as_deref(),
            Some("https://linkedin.com/company/clinica-bh")
        );
        assert_eq!(social.linkedin_company_id.as_deref(), Some("clinica-bh"));
        assert_eq!(social.facebook.as_deref(), Some("https://facebook.com/clinicabh"));
        assert_eq!(social.twitter.as_deref(), Some("https://twitter.com/clinicabh"));
        assert_eq!(social.youtube.as_deref(), Some("https://youtube.com/UC123abc"));
        assert_eq!(social.whatsapp.as_deref(), Some("5531999998888"));
    }

    #[test]
    fn ignores_posts_and_share_links() {
        let social = parse_social_links(&links(&[
            "https://instagram.com/p/Cx123/",
            "https://www.facebook.com/sharer/sharer.php?u=x",
            "https://twitter.com/intent/tweet?text=oi",
            "https://youtube.com/watch?v=abc",
            "https://instagram.com/perfil_real",
        ]));

        assert_eq!(social.instagram.as_deref(), Some("https://instagram.com/perfil_real"));
        assert!(social.facebook.is_none());
        assert!(social.twitter.is_none());
        assert!(social.youtube.is_none());
    }

    #[test]
    fn personal_linkedin_has_no_company_id() {
        let social = parse_social_links(&links(&["https://linkedin.com/in/maria-silva"]));
        assert_eq!(social.linkedin.as_deref(), Some("https://linkedin.com/in/maria-silva"));
        assert!(social.linkedin_company_id.is_none());
        assert!(!social.is_linkedin_company());
    }

    #[test]
    fn unrelated_domains_are_not_profiles() {
        let social = parse_social_links(&links(&["https://netflix.com/title", "https://box.com/x"]));
        assert_eq!(social, SocialProfiles::default());
    }

    #[test]
    fn extracts_anchor_and_text_links() {
        let base = Url::parse("https://loja.com.br").expect("url");
        let html = r#"<a href="/contato">Contato</a>
            <a href="mailto:vendas@loja.com.br">Email</a>
            <p>Siga: https://instagram.com/loja</p>"#;
        let found = extract_links(html, &base);

        assert!(found.contains(&"https://loja.com.br/contato".to_string()));
        assert!(found.contains(&"mailto:vendas@loja.com.br".to_string()));
        assert!(found.contains(&"https://instagram.com/loja".to_string()));
    }

    #[tokio::test]
    async fn extract_visits_pages_and_merges() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<a href="https://instagram.com/academiaforte">IG</a>"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/contato"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<a href="https://linkedin.com/company/academia-forte">in</a>
                   <a href="mailto:contato@academiaforte.com.br">mail</a>
                   <a href="tel:+553132221111">ligar</a>"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let config = HttpConfig {
            max_retries: 1,
            ..HttpConfig::default()
        }
        .without_delays();
        let extractor = SocialExtractor::new(&config).expect("build");

        let mut lead = Lead::new("Academia Forte", "academia");
        lead.site = Some(Website::new(server.uri()));
        lead.social.facebook = Some("https://facebook.com/existing".into());

        let lead = extractor.extract(lead).await;
        assert!(lead.social_enriched);
        assert_eq!(
            lead.social.instagram.as_deref(),
            Some("https://instagram.com/academiaforte")
        );
        assert!(lead.social.is_linkedin_company());
        assert_eq!(lead.social.facebook.as_deref(), Some("https://facebook.com/existing"));
        assert_eq!(lead.email.as_deref(), Some("contato@academiaforte.com.br"));
        assert_eq!(lead.phone.as_deref(), Some("553132221111"));
    }

    #[tokio::test]
    async fn leads_without_site_pass_through() {
        let config = HttpConfig::default().without_delays();
        let extractor = SocialExtractor::new(&config).expect("build");
        let out = extractor
            .enrich_leads(vec![Lead::new("Sem Site", "restaurante")])
            .await;
        assert_eq!(out.len(), 1);
        assert!(!out[0].social_enriched);
    }
}
