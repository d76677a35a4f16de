//! CSV export of processed leads.

use std::path::Path;

use leadpipe_shared::{Lead, LeadPipeError, Result};

const HEADER: [&str; 14] = [
    "Name",
    "Category",
    "Phone",
    "Email",
    "Address",
    "City",
    "Site",
    "Instagram",
    "LinkedIn",
    "Rating",
    "Reviews",
    "Score",
    "Classification",
    "Synced",
];

/// Write `leads` to `path`, one row per lead in the given order. Returns the row count.
pub fn write_leads_csv(path: &Path, leads: &[Lead]) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| LeadPipeError::io(parent, e))?;
    }

    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| LeadPipeError::Storage(format!("failed to open {}: {e}", path.display())))?;
    let to_storage = |e: csv::Error| LeadPipeError::Storage(e.to_string());

    writer.write_record(HEADER).map_err(to_storage)?;
    for lead in leads {
        writer.write_record(row(lead)).map_err(to_storage)?;
    }
    writer.flush().map_err(|e| LeadPipeError::io(path, e))?;

    tracing::info!(path = %path.display(), rows = leads.len(), "leads exported");
    Ok(leads.len())
}

fn row(lead: &Lead) -> [String; 14] {
    let text = |v: &Option<String>| v.clone().unwrap_or_default();
    [
        lead.name.clone(),
        lead.category.clone(),
        text(&lead.phone),
        text(&lead.email),
        text(&lead.address),
        lead.city.clone(),
        lead.site_url().unwrap_or_default().to_string(),
        text(&lead.social.instagram),
        text(&lead.social.linkedin),
        lead.maps.rating.map(|r| r.to_string()).unwrap_or_default(),
        lead.maps
            .review_count
            .map(|n| n.to_string())
            .unwrap_or_default(),
        lead.score.to_string(),
        lead.classification.to_string(),
        lead.synced.to_string(),
    ]
}
