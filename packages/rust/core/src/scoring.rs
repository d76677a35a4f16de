//! Rubric-based lead scoring.
//!
//! A lead's score is the sum of three blocks (contact, digital presence,
//! business quality) plus a flat bonus for priority categories, clamped to
//! 100. The classification is looked up from the configured bucket table and
//! is never set any other way.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use leadpipe_shared::{Classification, Lead, LeadPipeError, Result, ScoringConfig};

/// Instagram counts as recently active when the last post is at most this
/// many whole days old.
const INSTAGRAM_ACTIVE_DAYS: i64 = 30;

const HIGH_RATING: f64 = 4.0;
const GOOD_RATING: f64 = 3.5;
const MANY_REVIEWS: u32 = 50;
const SOME_REVIEWS: u32 = 20;

/// Points earned per block, kept for logging and inspection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScoreBreakdown {
    pub contact: u32,
    pub digital: u32,
    pub quality: u32,
    pub priority_bonus: u32,
    /// Sum of all blocks before clamping.
    pub raw_total: u32,
}

/// Aggregate statistics over a scored batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringSummary {
    pub total: usize,
    pub mean: f64,
    pub min: u32,
    pub max: u32,
    pub hot: usize,
    pub warm: usize,
    pub cold: usize,
    pub low: usize,
}

impl ScoringSummary {
    pub fn count(&self, classification: Classification) -> usize {
        match classification {
            Classification::Hot => self.hot,
            Classification::Warm => self.warm,
            Classification::Cold => self.cold,
            Classification::Low => self.low,
        }
    }
}

/// Deterministic scorer over an injected [`ScoringConfig`].
#[derive(Debug, Clone)]
pub struct LeadScorer {
    config: ScoringConfig,
}

impl LeadScorer {
    /// Build a scorer, rejecting an inconsistent bucket table.
    pub fn new(config: ScoringConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score `lead` in place against the current time.
    pub fn calculate_score(&self, lead: &mut Lead) -> Result<ScoreBreakdown> {
        self.calculate_score_at(lead, Utc::now())
    }

    /// Score `lead` in place, judging Instagram recency against `now`.
    ///
    /// Sets `score`, `classification`, `score_calculated` and `updated_at`.
    /// A lead with a non-finite or out-of-range rating is left untouched.
    pub fn calculate_score_at(
        &self,
        lead: &mut Lead,
        now: DateTime<Utc>,
    ) -> Result<ScoreBreakdown> {
        if let Some(rating) = lead.maps.rating {
            if !rating.is_finite() || !(0.0..=5.0).contains(&rating) {
                return Err(LeadPipeError::validation(format!(
                    "lead {:?} has invalid rating {rating}",
                    lead.name
                )));
            }
        }

        let priority = self.config.is_priority_category(&lead.category);
        let contact = self.contact_points(lead);
        let digital = self.digital_points(lead, now);
        let quality = self.quality_points(lead, priority);
        let priority_bonus = if priority { self.config.priority_bonus } else { 0 };

        let raw_total = contact + digital + quality + priority_bonus;
        let score = raw_total.min(100);

        lead.score = score;
        lead.classification = self.classify(score);
        lead.score_calculated = true;
        lead.updated_at = Some(now);

        debug!(
            lead = %lead.name,
            score,
            classification = %lead.classification,
            contact,
            digital,
            quality,
            priority_bonus,
            "lead scored"
        );

        Ok(ScoreBreakdown {
            contact,
            digital,
            quality,
            priority_bonus,
            raw_total,
        })
    }

    fn contact_points(&self, lead: &Lead) -> u32 {
        let w = &self.config.weights;
        let mut points = 0;
        if lead.has_phone() {
            points += w.has_phone;
        }
        if lead.has_email() {
            points += w.has_email;
        }
        if lead.has_site() {
            points += w.has_site;
            if lead.site_https() {
                points += w.site_https;
            }
            if lead.site_active() {
                points += w.site_active;
            }
        }
        points
    }

    fn digital_points(&self, lead: &Lead, now: DateTime<Utc>) -> u32 {
        let w = &self.config.weights;
        let social = &lead.social;
        let mut points = 0;

        if social.has_instagram() {
            points += w.has_instagram;
            points += match social.instagram_last_post {
                Some(last) if (now - last).num_days() <= INSTAGRAM_ACTIVE_DAYS => {
                    w.instagram_active
                }
                Some(_) => 0,
                // Unknown activity is presumed active at half credit.
                None => w.instagram_active / 2,
            };
        }

        if social.has_linkedin() {
            points += w.has_linkedin;
            if social.is_linkedin_company() {
                points += w.linkedin_company_page;
            }
        }
        points
    }

    fn quality_points(&self, lead: &Lead, priority: bool) -> u32 {
        let w = &self.config.weights;
        let maps = &lead.maps;
        let mut points = 0;

        match maps.rating {
            Some(r) if r >= HIGH_RATING => points += w.high_rating,
            Some(r) if r >= GOOD_RATING => points += w.high_rating / 2,
            _ => {}
        }

        match maps.review_count {
            Some(n) if n >= MANY_REVIEWS => points += w.many_reviews,
            Some(n) if n >= SOME_REVIEWS => points += w.many_reviews / 2,
            _ => {}
        }

        if maps.has_hours() {
            points += w.opening_hours;
        }

        // Independent of the flat priority bonus added on top.
        if priority {
            points += w.category_fit;
        }
        points
    }

    /// Bucket lookup; scores outside every bucket fall back to `Low`.
    pub fn classify(&self, score: u32) -> Classification {
        self.config
            .buckets
            .iter()
            .find(|b| b.contains(score))
            .map(|b| b.classification)
            .unwrap_or(Classification::Low)
    }

    /// Score every lead and return them ordered by descending score.
    ///
    /// A lead that fails to score is logged and kept as it was. Equal scores
    /// keep their input order.
    pub fn score_leads(&self, mut leads: Vec<Lead>) -> Vec<Lead> {
        let now = Utc::now();
        for lead in &mut leads {
            if let Err(e) = self.calculate_score_at(lead, now) {
                warn!(lead = %lead.name, error = %e, "failed to score lead, keeping it unscored");
            }
        }
        leads.sort_by(|a, b| b.score.cmp(&a.score));
        leads
    }

    /// Count, mean/min/max score and per-tier counts. Empty input gives the zero summary.
    pub fn get_summary(&self, leads: &[Lead]) -> ScoringSummary {
        if leads.is_empty() {
            return ScoringSummary::default();
        }

        let mut summary = ScoringSummary {
            total: leads.len(),
            min: u32::MAX,
            ..ScoringSummary::default()
        };
        let mut sum: u64 = 0;

        for lead in leads {
            sum += u64::from(lead.score);
            summary.min = summary.min.min(lead.score);
            summary.max = summary.max.max(lead.score);
            match lead.classification {
                Classification::Hot => summary.hot += 1,
                Classification::Warm => summary.warm += 1,
                Classification::Cold => summary.cold += 1,
                Classification::Low => summary.low += 1,
            }
        }
        summary.mean = sum as f64 / leads.len() as f64;
        summary
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use leadpipe_shared::{ClassificationBucket, Website};

    use super::*;

    fn scorer() -> LeadScorer {
        LeadScorer::new(ScoringConfig::default()).expect("default config is valid")
    }

    fn premium_lead() -> Lead {
        let mut lead = Lead::new("Clinica Premium", "clinica medica").with_city("Belo Horizonte");
        lead.phone = Some("(31) 3333-4444".into());
        lead.email = Some("contato@clinicapremium.com.br".into());
        let mut site = Website::new("https://clinicapremium.com.br");
        site.active = true;
        lead.site = Some(site);
        lead.social.instagram = Some("https://instagram.com/clinicapremium".into());
        lead.social.linkedin = Some("https://linkedin.com/company/clinica-premium".into());
        lead.maps.rating = Some(4.8);
        lead.maps.review_count = Some(150);
        lead.maps.hours = Some(BTreeMap::from([("monday".to_string(), "8-18".to_string())]));
        lead
    }

    #[test]
    fn empty_lead_scores_zero_low() {
        let mut lead = Lead::new("Nada", "restaurante");
        let breakdown = scorer().calculate_score(&mut lead).expect("score");
        assert_eq!(lead.score, 0);
        assert_eq!(lead.classification, Classification::Low);
        assert_eq!(breakdown, ScoreBreakdown::default());
        assert!(lead.score_calculated);
        assert!(lead.updated_at.is_some());
    }

    #[test]
    fn premium_lead_is_hot() {
        let mut lead = premium_lead();
        scorer().calculate_score(&mut lead).expect("score");
        assert!(lead.score >= 80, "score was {}", lead.score);
        assert_eq!(lead.classification, Classification::Hot);
    }

    #[test]
    fn fully_populated_lead_clamps_at_100() {
        let now = Utc::now();
        let mut lead = premium_lead();
        lead.social.instagram_last_post = Some(now - Duration::days(3));

        let breakdown = scorer().calculate_score_at(&mut lead, now).expect("score");
        assert_eq!(breakdown.contact, 40);
        assert_eq!(breakdown.digital, 30);
        assert_eq!(breakdown.quality, 30);
        assert_eq!(breakdown.priority_bonus, 5);
        assert_eq!(breakdown.raw_total, 105);
        assert_eq!(lead.score, 100);
        assert_eq!(lead.classification, Classification::Hot);
    }

    #[test]
    fn instagram_activity_credit() {
        let now = Utc::now();
        let s = scorer();
        let mut lead = Lead::new("Insta", "restaurante");
        lead.social.instagram = Some("https://instagram.com/insta".into());

        let unknown = s.calculate_score_at(&mut lead, now).expect("score");
        assert_eq!(unknown.digital, 10 + 2);

        lead.social.instagram_last_post = Some(now - Duration::days(10));
        let recent = s.calculate_score_at(&mut lead, now).expect("score");
        assert_eq!(recent.digital, 15);

        lead.social.instagram_last_post = Some(now - Duration::days(90));
        let stale = s.calculate_score_at(&mut lead, now).expect("score");
        assert_eq!(stale.digital, 10);
    }

    #[test]
    fn instagram_recency_counts_whole_days() {
        let now = Utc::now();
        let s = scorer();
        let mut lead = Lead::new("Insta", "restaurante");
        lead.social.instagram = Some("https://instagram.com/insta".into());

        lead.social.instagram_last_post = Some(now - Duration::days(30) - Duration::hours(12));
        let edge = s.calculate_score_at(&mut lead, now).expect("score");
        assert_eq!(edge.digital, 15);

        lead.social.instagram_last_post = Some(now - Duration::days(31));
        let past = s.calculate_score_at(&mut lead, now).expect("score");
        assert_eq!(past.digital, 10);
    }

    #[test]
    fn oversized_weights_are_rejected() {
        let mut config = ScoringConfig::default();
        config.weights.has_phone = u32::MAX;
        let err = LeadScorer::new(config).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn linkedin_company_vs_personal() {
        let s = scorer();
        let mut lead = Lead::new("Link", "restaurante");
        lead.social.linkedin = Some("https://linkedin.com/in/fulano".into());
        assert_eq!(s.calculate_score(&mut lead).expect("score").digital, 10);

        lead.social.linkedin_company_id = Some("12345".into());
        assert_eq!(s.calculate_score(&mut lead).expect("score").digital, 15);
    }

    #[test]
    fn rating_and_review_tiers() {
        let s = scorer();
        let mut lead = Lead::new("Q", "restaurante");

        lead.maps.rating = Some(3.7);
        lead.maps.review_count = Some(25);
        assert_eq!(s.calculate_score(&mut lead).expect("score").quality, 5 + 5);

        lead.maps.rating = Some(3.4);
        lead.maps.review_count = Some(19);
        assert_eq!(s.calculate_score(&mut lead).expect("score").quality, 0);

        lead.maps.rating = Some(4.0);
        lead.maps.review_count = Some(50);
        assert_eq!(s.calculate_score(&mut lead).expect("score").quality, 20);
    }

    #[test]
    fn site_subsignals_need_a_site() {
        let s = scorer();
        let mut lead = Lead::new("Site", "restaurante");
        let mut site = Website::new("http://site.com.br");
        site.active = true;
        lead.site = Some(site);
        assert_eq!(s.calculate_score(&mut lead).expect("score").contact, 15);

        lead.site = Some(Website::new("   "));
        assert_eq!(s.calculate_score(&mut lead).expect("score").contact, 0);
    }

    #[test]
    fn priority_category_is_credited_twice() {
        let s = scorer();
        let mut lead = Lead::new("Imob", "IMOBILIARIA");
        let breakdown = s.calculate_score(&mut lead).expect("score");
        assert_eq!(breakdown.quality, 5);
        assert_eq!(breakdown.priority_bonus, 5);
        assert_eq!(lead.score, 10);
    }

    #[test]
    fn invalid_rating_is_rejected() {
        let s = scorer();
        let mut lead = Lead::new("Bad", "restaurante");
        lead.phone = Some("31999999999".into());
        lead.maps.rating = Some(f64::NAN);
        assert!(s.calculate_score(&mut lead).is_err());
        assert!(!lead.score_calculated);

        lead.maps.rating = Some(7.5);
        assert!(s.calculate_score(&mut lead).is_err());
    }

    #[test]
    fn classification_matches_bucket_for_every_score() {
        let s = scorer();
        for score in 0..=100 {
            let class = s.classify(score);
            let bucket = s
                .config()
                .buckets
                .iter()
                .find(|b| b.classification == class)
                .expect("bucket for class");
            assert!(bucket.contains(score), "score {score} classified {class}");
        }
    }

    #[test]
    fn uncovered_score_falls_back_to_low() {
        let config = ScoringConfig {
            buckets: vec![ClassificationBucket {
                classification: Classification::Hot,
                min: 90,
                max: 100,
            }],
            ..ScoringConfig::default()
        };
        let s = LeadScorer::new(config).expect("valid");
        assert_eq!(s.classify(50), Classification::Low);
        assert_eq!(s.classify(95), Classification::Hot);
    }

    #[test]
    fn overlapping_buckets_fail_construction() {
        let mut config = ScoringConfig::default();
        config.buckets[2].max = 65;
        assert!(LeadScorer::new(config).is_err());
    }

    #[test]
    fn score_leads_sorts_descending_and_stable() {
        let mut phone_a = Lead::new("A", "restaurante");
        phone_a.phone = Some("1".into());
        let empty_b = Lead::new("B", "restaurante");
        let mut phone_c = Lead::new("C", "restaurante");
        phone_c.phone = Some("2".into());
        let premium = premium_lead();
        let empty_e = Lead::new("E", "restaurante");

        let scored = scorer().score_leads(vec![phone_a, empty_b, phone_c, premium, empty_e]);
        let names: Vec<&str> = scored.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Clinica Premium", "A", "C", "B", "E"]);
        assert!(scored.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn score_leads_keeps_failed_lead() {
        let mut bad = Lead::new("Bad", "restaurante");
        bad.maps.rating = Some(-1.0);
        let mut good = Lead::new("Good", "restaurante");
        good.phone = Some("31999999999".into());

        let scored = scorer().score_leads(vec![bad, good]);
        assert_eq!(scored.len(), 2);
        assert_eq!(scored[0].name, "Good");
        assert_eq!(scored[1].name, "Bad");
        assert!(!scored[1].score_calculated);
    }

    #[test]
    fn summary_of_empty_batch_is_zero() {
        assert_eq!(scorer().get_summary(&[]), ScoringSummary::default());
    }

    #[test]
    fn summary_counts_tiers() {
        let s = scorer();
        let mut hot = premium_lead();
        let mut low = Lead::new("Low", "restaurante");
        s.calculate_score(&mut hot).expect("score");
        s.calculate_score(&mut low).expect("score");

        let summary = s.get_summary(&[hot.clone(), low]);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.hot, 1);
        assert_eq!(summary.low, 1);
        assert_eq!(summary.min, 0);
        assert_eq!(summary.max, hot.score);
        assert!((summary.mean - f64::from(hot.score) / 2.0).abs() < f64::EPSILON);
        assert_eq!(summary.count(Classification::Hot), 1);
    }
}
