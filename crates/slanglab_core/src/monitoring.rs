//! crates/slanglab_core/src/monitoring.rs
//!
//! The monitoring and trend engine: folds a batch of sighting evidence into
//! a term's lifecycle record, and builds the time-bucketed Trending Index
//! series served to clients.
//!
//! Both operations are pure functions over rows the caller has already
//! fetched, so they are idempotent and recomputable at any time.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{
    MonitoringRecord, MonitoringStatus, Platform, Sighting, SourceRule, Term, TrendPoint,
    TrendSeries, TrendSummary,
};

/// Accumulated score above which a term is promoted to `Trending`.
pub const TRENDING_THRESHOLD: i64 = 100;

/// Flat score weight per organic mention in a pass.
pub const MENTION_WEIGHT: i64 = 10;

/// A `Spotted` term with no find for this long goes `Dormant`.
pub const DORMANT_AFTER_DAYS: i64 = 30;

/// The minimum quality floor across enabled sources.
///
/// Using the minimum (not any single source's rule) means the union of
/// accepted sightings is never under-counted because one source's floor is
/// stricter than the rest. No enabled sources is a configuration error.
pub fn min_enabled_score(rules: &[SourceRule]) -> Option<u8> {
    rules.iter().filter(|r| r.enabled).map(|r| r.min_score).min()
}

/// Case-insensitive whole-word matcher for a term's phrase, with the
/// definition-context exclusion.
pub struct PhraseMatcher {
    pattern: Option<Regex>,
}

impl PhraseMatcher {
    pub fn new(phrase: &str) -> Self {
        let trimmed = phrase.trim();
        let pattern = if trimmed.is_empty() {
            // An empty phrase matches nothing.
            None
        } else {
            Regex::new(&format!(r"(?i)\b{}\b", regex::escape(trimmed))).ok()
        };
        Self { pattern }
    }

    /// True when the snippet uses the phrase organically: the phrase appears
    /// as a whole word, and the snippet is not a dictionary-definition
    /// context. The definition check is a conservative keyword heuristic:
    /// a snippet that also carries generic definition markers is skipped.
    pub fn is_organic_use(&self, snippet: &str) -> bool {
        match &self.pattern {
            Some(pattern) => pattern.is_match(snippet) && !is_definition_context(snippet),
            None => false,
        }
    }
}

fn is_definition_context(snippet: &str) -> bool {
    let lowered = snippet.to_lowercase();
    lowered.contains("definition") || lowered.contains("meaning")
}

/// Folds one batch of sightings into a term's monitoring record.
///
/// `sightings` is the raw candidate set for this pass; anything below
/// `min_score` is discarded before it can touch any accumulator. The prior
/// record is never mutated; the caller persists the returned record under
/// the per-term lock.
pub fn record_sighting_batch(
    term: &Term,
    sightings: &[Sighting],
    prior: &MonitoringRecord,
    min_score: u8,
    now: DateTime<Utc>,
) -> MonitoringRecord {
    let matcher = PhraseMatcher::new(&term.text);

    let accepted: Vec<&Sighting> = sightings.iter().filter(|s| s.score >= min_score).collect();
    let found_count = accepted
        .iter()
        .filter(|s| matcher.is_organic_use(&s.snippet))
        .count() as i64;

    // Platforms come from every accepted sighting, found or not; the set is
    // append-only and the insert is idempotent.
    let mut platforms = prior.platforms.clone();
    for sighting in &accepted {
        platforms.insert(Platform::from_url(&sighting.url));
    }

    let trending_score = prior.trending_score + found_count * MENTION_WEIGHT;
    let status = next_status(prior.status, found_count, trending_score, prior.last_found_at, now);

    MonitoringRecord {
        term_id: prior.term_id,
        owner_id: prior.owner_id,
        status,
        trending_score,
        times_found: prior.times_found + found_count,
        last_checked_at: now,
        last_found_at: if found_count > 0 {
            Some(now)
        } else {
            prior.last_found_at
        },
        platforms,
    }
}

/// The lifecycle state machine.
///
/// `Trending` has no demotion path: once the accumulated score crosses the
/// threshold the badge is permanent.
fn next_status(
    prior: MonitoringStatus,
    found_count: i64,
    trending_score: i64,
    last_found_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> MonitoringStatus {
    if trending_score > TRENDING_THRESHOLD {
        return MonitoringStatus::Trending;
    }
    match prior {
        MonitoringStatus::Monitoring => {
            if found_count > 0 {
                MonitoringStatus::Spotted
            } else {
                MonitoringStatus::Monitoring
            }
        }
        MonitoringStatus::Spotted => {
            if found_count > 0 {
                MonitoringStatus::Spotted
            } else if stale_beyond_dormancy(last_found_at, now) {
                MonitoringStatus::Dormant
            } else {
                MonitoringStatus::Spotted
            }
        }
        // Dormant is sticky absent new evidence; a fresh find re-spots it.
        MonitoringStatus::Dormant => {
            if found_count > 0 {
                MonitoringStatus::Spotted
            } else {
                MonitoringStatus::Dormant
            }
        }
        MonitoringStatus::Trending => MonitoringStatus::Trending,
    }
}

fn stale_beyond_dormancy(last_found_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match last_found_at {
        Some(found) => now - found > Duration::days(DORMANT_AFTER_DAYS),
        None => false,
    }
}

/// Builds the Trending Index series for each requested window, plus summary
/// totals.
///
/// Each qualifying sighting contributes `score / 100` to its calendar day's
/// bucket, so ordinary mentions contribute fractionally and the index is
/// comparable across differing score distributions. Buckets cover
/// `[today - window, today]` inclusive and are rounded to 2 decimals.
pub fn compute_trend_summary(
    sightings: &[Sighting],
    windows: &[u32],
    min_score: u8,
    today: NaiveDate,
) -> TrendSummary {
    let qualifying: Vec<&Sighting> = sightings.iter().filter(|s| s.score >= min_score).collect();

    let mut series = Vec::with_capacity(windows.len());
    for &window in windows {
        let start = today - Duration::days(i64::from(window));
        let mut buckets: BTreeMap<NaiveDate, f64> = (0..=i64::from(window))
            .map(|offset| (start + Duration::days(offset), 0.0))
            .collect();
        for sighting in &qualifying {
            let day = sighting.observed_at.date_naive();
            if let Some(bucket) = buckets.get_mut(&day) {
                *bucket += f64::from(sighting.score) / 100.0;
            }
        }
        let points = buckets
            .into_iter()
            .map(|(date, value)| TrendPoint {
                date,
                index: round2(value),
            })
            .collect();
        series.push(TrendSeries {
            window_days: window,
            points,
        });
    }

    let distinct_urls = qualifying
        .iter()
        .map(|s| s.url.as_str())
        .collect::<BTreeSet<_>>()
        .len();
    let distinct_sources = qualifying
        .iter()
        .map(|s| s.source.as_str())
        .collect::<BTreeSet<_>>()
        .len();
    let mean_score = if qualifying.is_empty() {
        0.0
    } else {
        qualifying.iter().map(|s| f64::from(s.score)).sum::<f64>() / qualifying.len() as f64
    };

    TrendSummary {
        series,
        distinct_urls,
        distinct_sources,
        mean_score,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn fixture_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0).unwrap()
    }

    fn fixture_term(text: &str) -> Term {
        Term {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            text: text.to_string(),
            normalized: crate::domain::normalize_phrase(text),
            definition: None,
            example_usage: None,
            created_at: fixture_now(),
        }
    }

    fn fixture_record(term: &Term, status: MonitoringStatus, score: i64) -> MonitoringRecord {
        MonitoringRecord {
            term_id: term.id,
            owner_id: term.owner_id,
            status,
            trending_score: score,
            times_found: 0,
            last_checked_at: fixture_now() - Duration::days(1),
            last_found_at: None,
            platforms: BTreeSet::new(),
        }
    }

    fn sighting(url: &str, snippet: &str, score: u8, observed_at: DateTime<Utc>) -> Sighting {
        Sighting {
            source: "web_search".to_string(),
            url: url.to_string(),
            snippet: snippet.to_string(),
            score,
            observed_at,
        }
    }

    #[test]
    fn min_threshold_spans_enabled_sources_only() {
        let rules = vec![
            SourceRule { name: "web_search".into(), enabled: true, min_score: 40 },
            SourceRule { name: "social_index".into(), enabled: true, min_score: 55 },
            SourceRule { name: "news_index".into(), enabled: false, min_score: 10 },
        ];
        assert_eq!(min_enabled_score(&rules), Some(40));

        let none_enabled = vec![SourceRule {
            name: "web_search".into(),
            enabled: false,
            min_score: 40,
        }];
        assert_eq!(min_enabled_score(&none_enabled), None);
    }

    #[test]
    fn below_threshold_sightings_never_count() {
        let term = fixture_term("rizz");
        let prior = fixture_record(&term, MonitoringStatus::Monitoring, 0);
        let batch = vec![sighting(
            "https://x.com/a/1",
            "that guy has serious rizz",
            39,
            fixture_now(),
        )];
        let updated = record_sighting_batch(&term, &batch, &prior, 40, fixture_now());
        assert_eq!(updated.status, MonitoringStatus::Monitoring);
        assert_eq!(updated.trending_score, 0);
        assert_eq!(updated.times_found, 0);
        assert!(updated.platforms.is_empty());
        assert_eq!(updated.last_found_at, None);
    }

    #[test]
    fn definition_contexts_do_not_count_as_finds() {
        let term = fixture_term("rizz");
        let prior = fixture_record(&term, MonitoringStatus::Monitoring, 0);
        let batch = vec![
            sighting(
                "https://slangpedia.example/rizz",
                "Rizz definition: charisma or charm",
                90,
                fixture_now(),
            ),
            sighting(
                "https://slangpedia.example/rizz2",
                "the meaning of rizz explained",
                90,
                fixture_now(),
            ),
        ];
        let updated = record_sighting_batch(&term, &batch, &prior, 40, fixture_now());
        // Accepted for platform purposes, but not organic finds.
        assert_eq!(updated.times_found, 0);
        assert_eq!(updated.status, MonitoringStatus::Monitoring);
        assert!(updated.platforms.contains(&Platform::Web));
    }

    #[test]
    fn phrase_must_appear_as_whole_word() {
        let matcher = PhraseMatcher::new("cap");
        assert!(matcher.is_organic_use("no cap, that was wild"));
        assert!(!matcher.is_organic_use("the captain docked the boat"));
    }

    #[test]
    fn monitoring_goes_spotted_on_first_find() {
        let term = fixture_term("no cap");
        let prior = fixture_record(&term, MonitoringStatus::Monitoring, 0);
        let batch = vec![sighting(
            "https://reddit.com/r/teenagers/x",
            "no cap this is the best one yet",
            75,
            fixture_now(),
        )];
        let updated = record_sighting_batch(&term, &batch, &prior, 40, fixture_now());
        assert_eq!(updated.status, MonitoringStatus::Spotted);
        assert_eq!(updated.trending_score, MENTION_WEIGHT);
        assert_eq!(updated.times_found, 1);
        assert_eq!(updated.last_found_at, Some(fixture_now()));
        assert!(updated.platforms.contains(&Platform::Reddit));
    }

    #[test]
    fn crossing_score_threshold_promotes_to_trending() {
        let term = fixture_term("bussin");
        let prior = fixture_record(&term, MonitoringStatus::Spotted, 95);
        let batch = vec![sighting(
            "https://tiktok.com/@a/video/1",
            "this meal is bussin fr",
            80,
            fixture_now(),
        )];
        let updated = record_sighting_batch(&term, &batch, &prior, 40, fixture_now());
        assert_eq!(updated.trending_score, 105);
        assert_eq!(updated.status, MonitoringStatus::Trending);
    }

    #[test]
    fn score_at_threshold_does_not_promote() {
        let term = fixture_term("bussin");
        let prior = fixture_record(&term, MonitoringStatus::Spotted, 90);
        let batch = vec![sighting(
            "https://tiktok.com/@a/video/1",
            "bussin bussin",
            80,
            fixture_now(),
        )];
        let updated = record_sighting_batch(&term, &batch, &prior, 40, fixture_now());
        // 90 + 10 = 100: the threshold must be exceeded, not met.
        assert_eq!(updated.trending_score, 100);
        assert_eq!(updated.status, MonitoringStatus::Spotted);
    }

    #[test]
    fn spotted_goes_dormant_after_thirty_one_quiet_days() {
        let term = fixture_term("on fleek");
        let mut prior = fixture_record(&term, MonitoringStatus::Spotted, 20);
        prior.last_found_at = Some(fixture_now() - Duration::days(31));
        let updated = record_sighting_batch(&term, &[], &prior, 40, fixture_now());
        assert_eq!(updated.status, MonitoringStatus::Dormant);
        // last_found_at is untouched by a find-less pass.
        assert_eq!(updated.last_found_at, prior.last_found_at);
        assert_eq!(updated.last_checked_at, fixture_now());
    }

    #[test]
    fn spotted_stays_spotted_within_the_dormancy_window() {
        let term = fixture_term("on fleek");
        let mut prior = fixture_record(&term, MonitoringStatus::Spotted, 20);
        prior.last_found_at = Some(fixture_now() - Duration::days(10));
        let updated = record_sighting_batch(&term, &[], &prior, 40, fixture_now());
        assert_eq!(updated.status, MonitoringStatus::Spotted);
    }

    #[test]
    fn dormant_respots_on_new_evidence_and_trending_is_sticky() {
        let term = fixture_term("yeet");
        let mut dormant = fixture_record(&term, MonitoringStatus::Dormant, 20);
        dormant.last_found_at = Some(fixture_now() - Duration::days(60));
        let batch = vec![sighting(
            "https://x.com/b/2",
            "just yeet it into the bin",
            70,
            fixture_now(),
        )];
        let updated = record_sighting_batch(&term, &batch, &dormant, 40, fixture_now());
        assert_eq!(updated.status, MonitoringStatus::Spotted);

        let mut trending = fixture_record(&term, MonitoringStatus::Trending, 150);
        trending.last_found_at = Some(fixture_now() - Duration::days(90));
        let quiet = record_sighting_batch(&term, &[], &trending, 40, fixture_now());
        assert_eq!(quiet.status, MonitoringStatus::Trending);
    }

    #[test]
    fn platform_set_is_append_only_and_deduplicated() {
        let term = fixture_term("delulu");
        let mut prior = fixture_record(&term, MonitoringStatus::Spotted, 10);
        prior.platforms.insert(Platform::Reddit);
        let batch = vec![
            sighting("https://reddit.com/r/a/1", "pure delulu energy", 60, fixture_now()),
            sighting("https://www.instagram.com/p/1", "she is so delulu", 60, fixture_now()),
        ];
        let updated = record_sighting_batch(&term, &batch, &prior, 40, fixture_now());
        assert_eq!(
            updated.platforms.iter().copied().collect::<Vec<_>>(),
            vec![Platform::Reddit, Platform::Instagram]
        );
    }

    #[test]
    fn trend_summary_buckets_and_totals() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 6).unwrap();
        let day = |d: u32, h: u32| Utc.with_ymd_and_hms(2026, 8, d, h, 0, 0).unwrap();
        let sightings = vec![
            sighting("https://x.com/a/1", "rizz", 80, day(6, 9)),
            sighting("https://x.com/a/1", "rizz again", 60, day(6, 10)),
            sighting("https://reddit.com/r/b/2", "rizz", 100, day(4, 1)),
            // Below threshold: must not reach any bucket or total.
            sighting("https://spam.example/x", "rizz", 10, day(6, 2)),
        ];
        let summary = compute_trend_summary(&sightings, &[7], 40, today);

        assert_eq!(summary.series.len(), 1);
        let series = &summary.series[0];
        assert_eq!(series.window_days, 7);
        // Inclusive range: 8 buckets for a 7-day window.
        assert_eq!(series.points.len(), 8);
        let last = series.points.last().unwrap();
        assert_eq!(last.date, today);
        assert_eq!(last.index, 1.4); // 0.8 + 0.6
        let aug4 = series
            .points
            .iter()
            .find(|p| p.date == NaiveDate::from_ymd_opt(2026, 8, 4).unwrap())
            .unwrap();
        assert_eq!(aug4.index, 1.0);

        // The duplicate URL collapses; the spam sighting is excluded.
        assert_eq!(summary.distinct_urls, 2);
        assert_eq!(summary.distinct_sources, 1);
        assert_eq!(summary.mean_score, 80.0); // (80 + 60 + 100) / 3
    }

    #[test]
    fn trend_summary_is_deterministic() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 6).unwrap();
        let sightings: Vec<Sighting> = (0..50)
            .map(|i| {
                sighting(
                    &format!("https://example.com/{i}"),
                    "phrase",
                    40 + (i % 60) as u8,
                    Utc.with_ymd_and_hms(2026, 8, 1 + (i % 6) as u32, 3, 0, 0).unwrap(),
                )
            })
            .collect();
        let first = compute_trend_summary(&sightings, &[7, 30, 90], 40, today);
        let second = compute_trend_summary(&sightings, &[7, 30, 90], 40, today);
        assert_eq!(first, second);
    }
}
