//! Airtable sync for leadpipe.
//!
//! Leads are upserted one at a time into a single table, keyed on the
//! `Name` + `City` pair: an existing record is PATCHed, otherwise a new one
//! is created. A failed lead is recorded in the [`SyncReport`] and the batch
//! carries on.

use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{error, info, instrument, warn};
use url::Url;

use leadpipe_shared::{
    AirtableConfig, HttpConfig, Lead, LeadPipeError, Result, SyncReport, resolve_secret,
};

/// Column names in the leads table.
pub mod fields {
    pub const NAME: &str = "Name";
    pub const CATEGORY: &str = "Category";
    pub const CITY: &str = "City";
    pub const PHONE: &str = "Phone";
    pub const EMAIL: &str = "Email";
    pub const ADDRESS: &str = "Address";
    pub const SITE: &str = "Site";
    pub const INSTAGRAM: &str = "Instagram";
    pub const LINKEDIN: &str = "LinkedIn";
    pub const RATING: &str = "Rating";
    pub const REVIEWS: &str = "Reviews";
    pub const SCORE: &str = "Score";
    pub const CLASSIFICATION: &str = "Classification";
    pub const STATUS: &str = "Status";
    pub const CAPTURED_AT: &str = "Captured At";
    pub const NOTES: &str = "Notes";
}

#[derive(Debug, Deserialize)]
struct RecordList {
    #[serde(default)]
    records: Vec<Record>,
}

#[derive(Debug, Deserialize)]
struct Record {
    id: String,
}

/// Whether an upsert created or updated its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Updated,
}

pub struct AirtableSync {
    client: Client,
    api_key: String,
    table_url: Url,
    base_id: String,
    table_name: String,
    delay_ms: u64,
}

impl AirtableSync {
    /// Build a client from the configured credential variables.
    pub fn new(config: &AirtableConfig, http: &HttpConfig) -> Result<Self> {
        let api_key = resolve_secret(&config.api_key_env)?;
        let base_id = resolve_secret(&config.base_id_env)?;
        Self::with_credentials(api_key, base_id, config, http)
    }

    pub fn with_credentials(
        api_key: impl Into<String>,
        base_id: impl Into<String>,
        config: &AirtableConfig,
        http: &HttpConfig,
    ) -> Result<Self> {
        let api_key = api_key.into();
        let base_id = base_id.into();
        if api_key.trim().is_empty() || base_id.trim().is_empty() {
            return Err(LeadPipeError::config("Airtable API key and base id are required"));
        }

        let mut table_url = Url::parse(&config.base_url)
            .map_err(|e| LeadPipeError::config(format!("invalid Airtable base URL: {e}")))?;
        table_url
            .path_segments_mut()
            .map_err(|()| LeadPipeError::config("Airtable base URL cannot hold a path"))?
            .pop_if_empty()
            .push(&base_id)
            .push(&config.table_name);

        let client = Client::builder()
            .user_agent(&http.user_agent)
            .timeout(Duration::from_secs(http.timeout_secs))
            .build()
            .map_err(|e| LeadPipeError::Network(format!("failed to build HTTP client: {e}")))?;

        info!(base = %base_id, table = %config.table_name, "Airtable configured");
        Ok(Self {
            client,
            api_key,
            table_url,
            base_id,
            table_name: config.table_name.clone(),
            delay_ms: http.sync_delay_ms,
        })
    }

    /// List one record to confirm the token can read the table.
    pub async fn test_connection(&self) -> bool {
        let mut url = self.table_url.clone();
        url.query_pairs_mut().append_pair("maxRecords", "1");

        let response = match self.request(Method::GET, url).send().await {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e.without_url(), "Airtable connection failed");
                return false;
            }
        };

        match response.status() {
            status if status.is_success() => {
                info!("Airtable connection and permissions OK");
                true
            }
            StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                error!(
                    status = %response.status(),
                    "Airtable permission denied: the token needs data.records:read and \
                     data.records:write and access to this base"
                );
                false
            }
            StatusCode::NOT_FOUND => {
                error!(
                    base = %self.base_id,
                    table = %self.table_name,
                    "Airtable base or table not found"
                );
                false
            }
            status => {
                error!(%status, "Airtable connection check failed");
                false
            }
        }
    }

    /// Record id of the row with this lead's name and city, if any.
    ///
    /// Lookup failures are logged and treated as "not found".
    pub async fn find_existing(&self, lead: &Lead) -> Option<String> {
        let mut url = self.table_url.clone();
        url.query_pairs_mut()
            .append_pair("filterByFormula", &match_formula(&lead.name, &lead.city))
            .append_pair("maxRecords", "1");

        match self.list(url).await {
            Ok(list) => list.records.into_iter().next().map(|r| r.id),
            Err(e) => {
                warn!(lead = %lead.name, error = %e.without_url(), "existing record lookup failed");
                None
            }
        }
    }

    /// Create or update the record for `lead`, setting `id` and `synced`.
    pub async fn upsert(&self, lead: &mut Lead) -> Result<Upsert> {
        let body = json!({ "fields": lead_to_fields(lead), "typecast": true });

        let (outcome, method, url) = match self.find_existing(lead).await {
            Some(id) => {
                let mut url = self.table_url.clone();
                url.path_segments_mut()
                    .map_err(|()| LeadPipeError::Sync("invalid table URL".into()))?
                    .push(&id);
                (Upsert::Updated, Method::PATCH, url)
            }
            None => (Upsert::Created, Method::POST, self.table_url.clone()),
        };

        let response = self
            .request(method, url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LeadPipeError::Sync(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LeadPipeError::Sync(format!("HTTP {status}: {}", detail.trim())));
        }

        let record: Record = response
            .json()
            .await
            .map_err(|e| LeadPipeError::Sync(format!("invalid Airtable response: {e}")))?;
        lead.id = Some(record.id);
        lead.synced = true;
        Ok(outcome)
    }

    /// Upsert every lead in order, pausing between them.
    #[instrument(skip_all, fields(leads = leads.len()))]
    pub async fn sync_leads(&self, leads: &mut [Lead]) -> SyncReport {
        let total = leads.len();
        let mut report = SyncReport {
            total,
            ..SyncReport::default()
        };

        for (i, lead) in leads.iter_mut().enumerate() {
            info!(current = i + 1, total, lead = %lead.name, "syncing lead");
            match self.upsert(lead).await {
                Ok(Upsert::Created) => report.created += 1,
                Ok(Upsert::Updated) => report.updated += 1,
                Err(e) => {
                    let message = format!("failed to sync {}: {e}", lead.name);
                    error!(lead = %lead.name, error = %e, "sync failed");
                    report.errors += 1;
                    report.error_details.push(message);
                }
            }
            if self.delay_ms > 0 && i + 1 < total {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
        }

        info!(
            created = report.created,
            updated = report.updated,
            errors = report.errors,
            "sync finished"
        );
        report
    }

    async fn list(&self, url: Url) -> reqwest::Result<RecordList> {
        let response = self.request(Method::GET, url).send().await?.error_for_status()?;
        response.json().await
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.client.request(method, url).bearer_auth(&self.api_key)
    }
}

/// `AND({Name}='..',{City}='..')` with quotes and backslashes escaped.
pub fn match_formula(name: &str, city: &str) -> String {
    format!(
        "AND({{{}}}='{}',{{{}}}='{}')",
        fields::NAME,
        escape_formula_value(name),
        fields::CITY,
        escape_formula_value(city)
    )
}

fn escape_formula_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Table columns for a lead. Blank optional values are left out.
pub fn lead_to_fields(lead: &Lead) -> Map<String, Value> {
    let mut record = Map::new();
    record.insert(fields::NAME.into(), json!(lead.name));
    record.insert(fields::CATEGORY.into(), json!(lead.category));
    record.insert(fields::CITY.into(), json!(lead.city));
    record.insert(fields::SCORE.into(), json!(lead.score));
    record.insert(fields::CLASSIFICATION.into(), json!(lead.classification.as_str()));
    record.insert(fields::STATUS.into(), json!(lead.status.as_str()));
    record.insert(fields::CAPTURED_AT.into(), json!(lead.captured_at.to_rfc3339()));

    let optional = [
        (fields::PHONE, lead.phone.as_deref()),
        (fields::EMAIL, lead.email.as_deref()),
        (fields::ADDRESS, lead.address.as_deref()),
        (fields::SITE, lead.site_url()),
        (fields::INSTAGRAM, lead.social.instagram.as_deref()),
        (fields::LINKEDIN, lead.social.linkedin.as_deref()),
        (fields::NOTES, lead.notes.as_deref()),
    ];
    for (field, value) in optional {
        if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
            record.insert(field.into(), json!(v));
        }
    }

    if let Some(rating) = lead.maps.rating.filter(|r| *r > 0.0) {
        record.insert(fields::RATING.into(), json!(rating));
    }
    if let Some(reviews) = lead.maps.review_count.filter(|r| *r > 0) {
        record.insert(fields::REVIEWS.into(), json!(reviews));
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadpipe_shared::{Classification, Website};
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sync(server: &MockServer) -> AirtableSync {
        let config = AirtableConfig {
            base_url: format!("{}/v0", server.uri()),
            ..AirtableConfig::default()
        };
        let http = HttpConfig::default().without_delays();
        AirtableSync::with_credentials("pat-test", "appBase", &config, &http).expect("client")
    }

    fn lead(name: &str) -> Lead {
        let mut lead = Lead::new(name, "clinica odontologica").with_city("Belo Horizonte");
        lead.phone = Some("31 3333-4444".into());
        lead.score = 72;
        lead.classification = Classification::Warm;
        lead
    }

    #[test]
    fn escapes_quotes_in_formula() {
        assert_eq!(
            match_formula("D'Avila Odonto", "BH"),
            r"AND({Name}='D\'Avila Odonto',{City}='BH')"
        );
    }

    #[test]
    fn maps_lead_fields_and_skips_blanks() {
        let mut l = lead("Sorriso");
        l.email = Some("  ".into());
        l.site = Some(Website::new("https://sorriso.com.br"));
        l.maps.rating = Some(4.7);
        l.maps.review_count = Some(0);

        let record = lead_to_fields(&l);
        assert_eq!(record[fields::NAME], "Sorriso");
        assert_eq!(record[fields::CLASSIFICATION], "warm");
        assert_eq!(record[fields::SCORE], 72);
        assert_eq!(record[fields::SITE], "https://sorriso.com.br");
        assert_eq!(record[fields::RATING], 4.7);
        assert!(!record.contains_key(fields::EMAIL));
        assert!(!record.contains_key(fields::REVIEWS));
    }

    #[test]
    fn missing_credentials_are_config_errors() {
        let config = AirtableConfig {
            api_key_env: "LEADPIPE_TEST_MISSING_AIRTABLE_KEY".into(),
            ..AirtableConfig::default()
        };
        let err = AirtableSync::new(&config, &HttpConfig::default()).err().expect("must fail");
        assert!(err.is_config());

        let err = AirtableSync::with_credentials(
            "key",
            " ",
            &AirtableConfig::default(),
            &HttpConfig::default(),
        )
        .err()
        .expect("must fail");
        assert!(err.is_config());
    }

    #[tokio::test]
    async fn connection_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v0/appBase/Leads"))
            .and(query_param("maxRecords", "1"))
            .and(header("authorization", "Bearer pat-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"records": []})))
            .mount(&server)
            .await;

        assert!(sync(&server).test_connection().await);
    }

    #[tokio::test]
    async fn forbidden_fails_connection_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {"type": "INVALID_PERMISSIONS_OR_MODEL_NOT_FOUND"}
            })))
            .mount(&server)
            .await;

        assert!(!sync(&server).test_connection().await);
    }

    #[tokio::test]
    async fn creates_new_and_updates_existing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v0/appBase/Leads"))
            .and(query_param("filterByFormula", "AND({Name}='Nova',{City}='Belo Horizonte')"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"records": []})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v0/appBase/Leads"))
            .and(query_param("filterByFormula", "AND({Name}='Antiga',{City}='Belo Horizonte')"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"records": [{"id": "recOld"}]})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v0/appBase/Leads"))
            .and(body_partial_json(json!({"fields": {"Name": "Nova", "Score": 72}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "recNew"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/v0/appBase/Leads/recOld"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "recOld"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut leads = vec![lead("Nova"), lead("Antiga")];
        let report = sync(&server).sync_leads(&mut leads).await;

        assert_eq!(report.total, 2);
        assert_eq!(report.created, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(report.errors, 0);
        assert!(leads.iter().all(|l| l.synced));
        assert_eq!(leads[0].id.as_deref(), Some("recNew"));
        assert_eq!(leads[1].id.as_deref(), Some("recOld"));
    }

    #[tokio::test]
    async fn rejected_lead_is_reported_and_batch_continues() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"records": []})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"fields": {"Name": "Ruim"}})))
            .respond_with(ResponseTemplate::new(422).set_body_string("INVALID_VALUE_FOR_COLUMN"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"fields": {"Name": "Boa"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "recBoa"})))
            .mount(&server)
            .await;

        let mut leads = vec![lead("Ruim"), lead("Boa")];
        let report = sync(&server).sync_leads(&mut leads).await;

        assert_eq!(report.created, 1);
        assert_eq!(report.errors, 1);
        assert!(report.error_details[0].contains("Ruim"));
        assert!(!leads[0].synced);
        assert!(leads[0].id.is_none());
        assert!(leads[1].synced);
    }
}
