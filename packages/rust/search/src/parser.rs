//! Mapping of SerpAPI Google Maps responses onto [`Lead`]s.

use std::collections::{BTreeMap, HashSet};

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use leadpipe_shared::{Lead, MapsData, Website};

/// Source tag stamped on leads from this provider.
pub const SOURCE: &str = "serpapi_google_maps";

/// The part of a `engine=google_maps` response we read.
///
/// Items stay raw so one malformed result cannot sink the whole page.
#[derive(Debug, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub local_results: Vec<Value>,
    /// Set by the provider on quota or parameter problems.
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LocalResult {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub place_id: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub gps_coordinates: Option<GpsCoordinates>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub reviews: Option<u32>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub operating_hours: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GpsCoordinates {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Decode and map one raw result. Items that fail to decode are logged and skipped.
pub fn parse_item(item: Value, category: &str, city: &str, state: &str) -> Option<Lead> {
    match serde_json::from_value::<LocalResult>(item) {
        Ok(result) => parse_result(result, category, city, state),
        Err(e) => {
            warn!(category, error = %e, "skipping malformed search result");
            None
        }
    }
}

/// Turn one result into a lead of `category`. Results without a title are dropped.
pub fn parse_result(item: LocalResult, category: &str, city: &str, state: &str) -> Option<Lead> {
    let name = item.title.filter(|t| !t.trim().is_empty())?;

    let mut lead = Lead::new(name.trim(), category).with_city(city);
    lead.state = state.to_string();
    lead.phone = item.phone.filter(|p| !p.trim().is_empty());
    lead.address = item.address;
    lead.site = item
        .website
        .filter(|w| !w.trim().is_empty())
        .map(Website::new);
    if let Some(gps) = item.gps_coordinates {
        lead.latitude = gps.latitude;
        lead.longitude = gps.longitude;
    }
    lead.maps = MapsData {
        place_id: item.place_id,
        rating: item.rating,
        review_count: item.reviews,
        price_level: item.price,
        hours: item.operating_hours,
        photos_count: None,
        types: item.types,
    };
    lead.source = SOURCE.to_string();
    Some(lead)
}

/// Drop repeats by lowercased name and address, keeping the first occurrence.
pub fn deduplicate(leads: Vec<Lead>) -> Vec<Lead> {
    let mut seen = HashSet::new();
    leads
        .into_iter()
        .filter(|lead| {
            let key = format!(
                "{}|{}",
                lead.name.to_lowercase(),
                lead.address.as_deref().unwrap_or("").to_lowercase()
            );
            seen.insert(key)
        })
        .collect()
}
