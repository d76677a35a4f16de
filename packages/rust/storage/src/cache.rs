use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use leadpipe_shared::{Classification, Lead, LeadPipeError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::fs::write_json_atomic;

/// Dedup key for a lead: SHA-256 of `"{name}|{city}"` after lowercasing and
/// trimming both parts, truncated to 16 hex characters.
pub fn fingerprint(name: &str, city: &str) -> String {
    let key = format!(
        "{}|{}",
        name.trim().to_lowercase(),
        city.trim().to_lowercase()
    );
    let digest = Sha256::digest(key.as_bytes());
    let mut hex = format!("{digest:x}");
    hex.truncate(16);
    hex
}

fn lead_fingerprint(lead: &Lead) -> String {
    fingerprint(&lead.name, &lead.city)
}

/// Snapshot of a lead as it was when cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub name: String,
    pub category: String,
    pub city: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub site: Option<String>,
    pub instagram: Option<String>,
    pub linkedin: Option<String>,
    pub score: u32,
    pub classification: Classification,
    pub added_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CacheEntry {
    fn from_lead(lead: &Lead, now: DateTime<Utc>) -> Self {
        Self {
            name: lead.name.clone(),
            category: lead.category.clone(),
            city: lead.city.clone(),
            phone: lead.phone.clone(),
            email: lead.email.clone(),
            site: lead.site_url().map(String::from),
            instagram: lead.social.instagram.clone(),
            linkedin: lead.social.linkedin.clone(),
            score: lead.score,
            classification: lead.classification,
            added_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Counters {
    #[serde(default)]
    total_processed: u64,
    #[serde(default)]
    duplicates_skipped: u64,
}

/// On-disk document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    leads: BTreeMap<String, CacheEntry>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    stats: Counters,
}

/// Summary returned by [`LeadCache::stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_cached: usize,
    pub total_processed: u64,
    pub duplicates_skipped: u64,
    pub last_updated: Option<DateTime<Utc>>,
}

/// JSON-file dedup cache, loaded wholesale on open and rewritten on every change.
///
/// Storage failures never reach the caller: a corrupt or unreadable file opens
/// as an empty cache, and a failed save is logged while the in-memory state
/// stays authoritative for the rest of the process.
#[derive(Debug)]
pub struct LeadCache {
    path: PathBuf,
    data: CacheFile,
}

impl LeadCache {
    /// Open the cache at `path`, starting empty if the file is missing or unreadable.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match load(&path) {
            Ok(Some(data)) => {
                tracing::info!(path = %path.display(), leads = data.leads.len(), "cache loaded");
                data
            }
            Ok(None) => {
                tracing::debug!(path = %path.display(), "no cache file, starting empty");
                CacheFile::default()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to load cache, starting empty");
                CacheFile::default()
            }
        };
        Self { path, data }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.data.leads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.leads.is_empty()
    }

    pub fn exists(&self, lead: &Lead) -> bool {
        self.data.leads.contains_key(&lead_fingerprint(lead))
    }

    pub fn get(&self, lead: &Lead) -> Option<&CacheEntry> {
        self.data.leads.get(&lead_fingerprint(lead))
    }

    /// Upsert one lead and persist.
    pub fn add(&mut self, lead: &Lead) {
        self.insert(lead, Utc::now());
        self.save();
    }

    /// Upsert a batch of leads with a single save.
    pub fn add_many(&mut self, leads: &[Lead]) {
        if leads.is_empty() {
            return;
        }
        let now = Utc::now();
        for lead in leads {
            self.insert(lead, now);
        }
        self.save();
        tracing::info!(added = leads.len(), "leads added to cache");
    }

    fn insert(&mut self, lead: &Lead, now: DateTime<Utc>) {
        self.data
            .leads
            .insert(lead_fingerprint(lead), CacheEntry::from_lead(lead, now));
        self.data.stats.total_processed += 1;
    }

    /// Keep only the leads not seen before, preserving their order.
    pub fn filter_new(&mut self, leads: Vec<Lead>) -> Vec<Lead> {
        let before = leads.len();
        let fresh: Vec<Lead> = leads.into_iter().filter(|l| !self.exists(l)).collect();
        let duplicates = before - fresh.len();

        if duplicates > 0 {
            self.data.stats.duplicates_skipped += duplicates as u64;
            self.save();
            tracing::info!(duplicates, new_leads = fresh.len(), "cache filtered duplicates");
        }
        fresh
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            total_cached: self.data.leads.len(),
            total_processed: self.data.stats.total_processed,
            duplicates_skipped: self.data.stats.duplicates_skipped,
            last_updated: self.data.last_updated,
        }
    }

    /// Drop every entry and reset the counters.
    pub fn clear(&mut self) {
        self.data = CacheFile::default();
        self.save();
        tracing::info!("cache cleared");
    }

    /// Remove entries added more than `max_age_days` ago. Returns how many were removed.
    ///
    /// An age reaching past the earliest representable date removes nothing.
    pub fn clear_old(&mut self, max_age_days: u32) -> usize {
        let cutoff = Duration::try_days(i64::from(max_age_days))
            .and_then(|age| Utc::now().checked_sub_signed(age));
        match cutoff {
            Some(cutoff) => self.clear_older_than(cutoff),
            None => {
                tracing::debug!(max_age_days, "prune cutoff out of range, nothing to remove");
                0
            }
        }
    }

    fn clear_older_than(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.data.leads.len();
        self.data.leads.retain(|_, entry| entry.added_at >= cutoff);
        let removed = before - self.data.leads.len();

        if removed > 0 {
            self.save();
            tracing::info!(removed, "old entries pruned from cache");
        }
        removed
    }

    /// Write every entry as a CSV row for manual inspection.
    pub fn export_csv(&self, path: &Path) -> Result<usize> {
        let mut writer = csv::Writer::from_path(path)
            .map_err(|e| LeadPipeError::Storage(format!("failed to open {}: {e}", path.display())))?;
        let to_storage = |e: csv::Error| LeadPipeError::Storage(e.to_string());

        writer
            .write_record([
                "Name",
                "Category",
                "City",
                "Phone",
                "Email",
                "Site",
                "Instagram",
                "LinkedIn",
                "Score",
                "Classification",
                "Added At",
            ])
            .map_err(to_storage)?;

        for entry in self.data.leads.values() {
            let score = entry.score.to_string();
            let added_at = entry.added_at.to_rfc3339();
            writer
                .write_record([
                    entry.name.as_str(),
                    entry.category.as_str(),
                    entry.city.as_str(),
                    entry.phone.as_deref().unwrap_or(""),
                    entry.email.as_deref().unwrap_or(""),
                    entry.site.as_deref().unwrap_or(""),
                    entry.instagram.as_deref().unwrap_or(""),
                    entry.linkedin.as_deref().unwrap_or(""),
                    score.as_str(),
                    entry.classification.as_str(),
                    added_at.as_str(),
                ])
                .map_err(to_storage)?;
        }

        writer.flush().map_err(|e| LeadPipeError::io(path, e))?;
        tracing::info!(path = %path.display(), rows = self.data.leads.len(), "cache exported");
        Ok(self.data.leads.len())
    }

    fn save(&mut self) {
        self.data.last_updated = Some(Utc::now());
        if let Err(e) = write_json_atomic(&self.path, &self.data) {
            tracing::error!(path = %self.path.display(), error = %e, "failed to save cache");
        }
    }
}

fn load(path: &Path) -> Result<Option<CacheFile>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path).map_err(|e| LeadPipeError::io(path, e))?;
    let data = serde_json::from_str(&content)
        .map_err(|e| LeadPipeError::parse(format!("invalid cache file: {e}")))?;
    Ok(Some(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadpipe_shared::Website;
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("lp_cache_{}", Uuid::now_v7()))
    }

    fn lead(name: &str, city: &str) -> Lead {
        Lead::new(name, "clinica medica").with_city(city)
    }

    #[test]
    fn fingerprint_normalizes_case_and_whitespace() {
        assert_eq!(
            fingerprint("Clinica Premium", "Belo Horizonte"),
            fingerprint("  clinica premium ", "BELO HORIZONTE")
        );
        assert_ne!(
            fingerprint("Clinica Premium", "Belo Horizonte"),
            fingerprint("Clinica Premium", "Contagem")
        );
        assert_eq!(fingerprint("a", "b").len(), 16);
    }

    #[test]
    fn exists_after_add_ignores_case() {
        let dir = temp_dir();
        let mut cache = LeadCache::open(dir.join("cache.json"));

        cache.add(&lead("Padaria Central", "Belo Horizonte"));
        assert!(cache.exists(&lead("PADARIA CENTRAL  ", " belo horizonte")));
        assert!(!cache.exists(&lead("Padaria Central", "Contagem")));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn filter_new_skips_duplicates_and_keeps_order() {
        let dir = temp_dir();
        let mut cache = LeadCache::open(dir.join("cache.json"));
        cache.add(&lead("Cached", "BH"));

        let batch = vec![lead("First", "BH"), lead("cached", "bh"), lead("Second", "BH")];
        let fresh = cache.filter_new(batch);

        let names: Vec<&str> = fresh.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["First", "Second"]);
        assert_eq!(cache.stats().duplicates_skipped, 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = temp_dir();
        let path = dir.join("cache.json");
        {
            let mut cache = LeadCache::open(&path);
            let mut l = lead("Escritorio Silva", "BH");
            l.site = Some(Website::new("https://silva.adv.br"));
            l.score = 72;
            l.classification = Classification::Warm;
            cache.add_many(&[l, lead("Outro", "BH")]);
        }

        let cache = LeadCache::open(&path);
        assert_eq!(cache.len(), 2);
        let entry = cache.get(&lead("escritorio silva", "bh")).expect("entry");
        assert_eq!(entry.site.as_deref(), Some("https://silva.adv.br"));
        assert_eq!(entry.classification, Classification::Warm);

        let stats = cache.stats();
        assert_eq!(stats.total_processed, 2);
        assert!(stats.last_updated.is_some());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_file_opens_empty() {
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).expect("mkdir");
        let path = dir.join("cache.json");
        std::fs::write(&path, "{not json").expect("write garbage");

        let cache = LeadCache::open(&path);
        assert!(cache.is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn clear_resets_everything() {
        let dir = temp_dir();
        let mut cache = LeadCache::open(dir.join("cache.json"));
        cache.add(&lead("A", "BH"));
        cache.filter_new(vec![lead("A", "BH")]);

        cache.clear();
        let stats = cache.stats();
        assert_eq!(stats.total_cached, 0);
        assert_eq!(stats.total_processed, 0);
        assert_eq!(stats.duplicates_skipped, 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn clear_old_removes_only_stale_entries() {
        let dir = temp_dir();
        let mut cache = LeadCache::open(dir.join("cache.json"));
        cache.add_many(&[lead("Old", "BH"), lead("New", "BH")]);

        let old_key = fingerprint("Old", "BH");
        if let Some(entry) = cache.data.leads.get_mut(&old_key) {
            entry.added_at = Utc::now() - Duration::days(45);
        }

        assert_eq!(cache.clear_old(30), 1);
        assert!(!cache.exists(&lead("Old", "BH")));
        assert!(cache.exists(&lead("New", "BH")));
        assert_eq!(cache.clear_old(30), 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn clear_old_with_huge_age_removes_nothing() {
        let dir = temp_dir();
        let mut cache = LeadCache::open(dir.join("cache.json"));
        cache.add(&lead("Antiga", "BH"));

        assert_eq!(cache.clear_old(u32::MAX), 0);
        assert_eq!(cache.clear_old(200_000_000), 0);
        assert_eq!(cache.len(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn export_writes_header_and_rows() {
        let dir = temp_dir();
        let mut cache = LeadCache::open(dir.join("cache.json"));
        let mut l = lead("Loja, Ltda", "BH");
        l.phone = Some("(31) 3333-4444".into());
        cache.add(&l);

        let out = dir.join("cache.csv");
        let rows = cache.export_csv(&out).expect("export");
        assert_eq!(rows, 1);

        let content = std::fs::read_to_string(&out).expect("read csv");
        let mut lines = content.lines();
        assert!(lines.next().unwrap_or_default().starts_with("Name,Category,City"));
        let row = lines.next().unwrap_or_default();
        assert!(row.starts_with("\"Loja, Ltda\",clinica medica,BH,(31) 3333-4444"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
