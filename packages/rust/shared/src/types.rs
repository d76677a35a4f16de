//! Core domain types for leadpipe: the lead entity and its value objects.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default source tag for leads captured through the maps search provider.
pub const DEFAULT_SOURCE: &str = "google_maps";

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Categorical tier derived from a lead's score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Hot,
    Warm,
    Cold,
    #[default]
    Low,
}

impl Classification {
    /// All tiers, hottest first.
    pub const ALL: [Classification; 4] = [Self::Hot, Self::Warm, Self::Cold, Self::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Warm => "warm",
            Self::Cold => "cold",
            Self::Low => "low",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sales lifecycle of a lead once it lands in the tabular backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    #[default]
    New,
    Contacted,
    Qualified,
    Converted,
    Lost,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Contacted => "contacted",
            Self::Qualified => "qualified",
            Self::Converted => "converted",
            Self::Lost => "lost",
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Value objects
// ---------------------------------------------------------------------------

/// A lead's website and what site analysis learned about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Website {
    /// Site URL (replaced by the final URL after redirects once analyzed).
    pub url: String,
    /// The site answered with HTTP 200.
    #[serde(default)]
    pub active: bool,
    /// The site is (or redirects to) an `https://` URL.
    #[serde(default)]
    pub uses_https: bool,
}

impl Website {
    /// Create a website entry; the HTTPS flag is inferred from the scheme.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let uses_https = url.to_ascii_lowercase().starts_with("https://");
        Self {
            url,
            active: false,
            uses_https,
        }
    }
}

/// Social-network presence of a lead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialProfiles {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instagram: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instagram_followers: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instagram_posts: Option<u64>,
    /// When the last post was published, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instagram_last_post: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<String>,
    /// Company slug, set when the LinkedIn link is a company page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin_company_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin_employees: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facebook: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp: Option<String>,
}

impl SocialProfiles {
    pub fn has_instagram(&self) -> bool {
        is_present(&self.instagram)
    }

    pub fn has_linkedin(&self) -> bool {
        is_present(&self.linkedin)
    }

    /// A LinkedIn company page (explicit company id or a `/company/` style URL).
    pub fn is_linkedin_company(&self) -> bool {
        is_present(&self.linkedin_company_id)
            || self
                .linkedin
                .as_deref()
                .is_some_and(|url| url.to_lowercase().contains("company"))
    }
}

/// Listing data captured from the maps provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapsData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_id: Option<String>,
    /// Average star rating (0–5).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_level: Option<String>,
    /// Opening hours keyed by weekday.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photos_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
}

impl MapsData {
    /// Structured opening hours are present and non-empty.
    pub fn has_hours(&self) -> bool {
        self.hours.as_ref().is_some_and(|h| !h.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Lead
// ---------------------------------------------------------------------------

/// A prospective business contact captured from the search provider.
///
/// Created with only identification fields, then mutated in place by each
/// pipeline stage. `classification` is only ever written by the scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    /// Record id in the tabular backend, assigned once synced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub category: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<Website>,
    #[serde(default)]
    pub social: SocialProfiles,
    #[serde(default)]
    pub maps: MapsData,

    /// Rubric score in `[0, 100]`.
    #[serde(default)]
    pub score: u32,
    #[serde(default)]
    pub classification: Classification,
    #[serde(default)]
    pub status: LeadStatus,

    pub captured_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(default)]
    pub social_enriched: bool,
    #[serde(default)]
    pub score_calculated: bool,
    #[serde(default)]
    pub synced: bool,
}

fn default_source() -> String {
    DEFAULT_SOURCE.into()
}

impl Lead {
    /// Create a freshly captured lead with only its identification fields.
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            category: category.into(),
            phone: None,
            email: None,
            address: None,
            city: String::new(),
            state: String::new(),
            postal_code: None,
            latitude: None,
            longitude: None,
            site: None,
            social: SocialProfiles::default(),
            maps: MapsData::default(),
            score: 0,
            classification: Classification::Low,
            status: LeadStatus::New,
            captured_at: Utc::now(),
            updated_at: None,
            source: default_source(),
            notes: None,
            social_enriched: false,
            score_calculated: false,
            synced: false,
        }
    }

    /// Builder-style helper to set the city.
    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = city.into();
        self
    }

    pub fn has_phone(&self) -> bool {
        is_present(&self.phone)
    }

    pub fn has_email(&self) -> bool {
        is_present(&self.email)
    }

    pub fn has_site(&self) -> bool {
        self.site.as_ref().is_some_and(|s| !s.url.trim().is_empty())
    }

    /// The site URL, if any.
    pub fn site_url(&self) -> Option<&str> {
        self.site
            .as_ref()
            .map(|s| s.url.as_str())
            .filter(|u| !u.trim().is_empty())
    }

    pub fn site_active(&self) -> bool {
        self.site.as_ref().is_some_and(|s| s.active)
    }

    pub fn site_https(&self) -> bool {
        self.site.as_ref().is_some_and(|s| s.uses_https)
    }
}

/// `Some` and not blank.
fn is_present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// SyncReport
// ---------------------------------------------------------------------------

/// Outcome of pushing a batch of leads to the tabular backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub errors: usize,
    /// One message per failed lead.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub error_details: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_lead_defaults() {
        let lead = Lead::new("Padaria Central", "restaurante");
        assert_eq!(lead.score, 0);
        assert_eq!(lead.classification, Classification::Low);
        assert_eq!(lead.status, LeadStatus::New);
        assert_eq!(lead.source, DEFAULT_SOURCE);
        assert!(!lead.has_phone());
        assert!(!lead.has_site());
        assert!(!lead.synced);
    }

    #[test]
    fn blank_fields_are_not_present() {
        let mut lead = Lead::new("X", "academia");
        lead.phone = Some("   ".into());
        lead.email = Some(String::new());
        lead.site = Some(Website::new(""));
        assert!(!lead.has_phone());
        assert!(!lead.has_email());
        assert!(!lead.has_site());
        assert_eq!(lead.site_url(), None);
    }

    #[test]
    fn website_infers_https() {
        assert!(Website::new("https://example.com").uses_https);
        assert!(Website::new("HTTPS://EXAMPLE.COM").uses_https);
        assert!(!Website::new("http://example.com").uses_https);
    }

    #[test]
    fn linkedin_company_detection() {
        let mut social = SocialProfiles {
            linkedin: Some("https://linkedin.com/in/someone".into()),
            ..Default::default()
        };
        assert!(!social.is_linkedin_company());

        social.linkedin = Some("https://linkedin.com/company/acme".into());
        assert!(social.is_linkedin_company());

        social.linkedin = Some("https://linkedin.com/in/someone".into());
        social.linkedin_company_id = Some("acme".into());
        assert!(social.is_linkedin_company());
    }

    #[test]
    fn empty_hours_do_not_count() {
        let mut maps = MapsData {
            hours: Some(BTreeMap::new()),
            ..Default::default()
        };
        assert!(!maps.has_hours());
        maps.hours
            .as_mut()
            .unwrap()
            .insert("monday".into(), "08:00-18:00".into());
        assert!(maps.has_hours());
    }

    #[test]
    fn lead_serialization_roundtrip() {
        let mut lead = Lead::new("Clinica Premium", "clinica medica").with_city("Belo Horizonte");
        lead.site = Some(Website::new("https://clinica.com.br"));
        lead.maps.rating = Some(4.8);
        lead.classification = Classification::Hot;

        let json = serde_json::to_string(&lead).expect("serialize");
        assert!(json.contains(r#""classification":"hot""#));
        let parsed: Lead = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, lead);
    }

    #[test]
    fn lead_deserializes_with_missing_optional_fields() {
        let json = r#"{"name":"Loja","category":"loja de roupas","captured_at":"2026-01-01T00:00:00Z"}"#;
        let lead: Lead = serde_json::from_str(json).expect("deserialize");
        assert_eq!(lead.name, "Loja");
        assert_eq!(lead.source, DEFAULT_SOURCE);
        assert_eq!(lead.classification, Classification::Low);
    }

    #[test]
    fn classification_display() {
        assert_eq!(Classification::Warm.to_string(), "warm");
        assert_eq!(LeadStatus::Converted.to_string(), "converted");
    }
}
