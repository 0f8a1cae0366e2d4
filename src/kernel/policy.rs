//! Zone Policy Table: which content tags each zone may see, and which lexical
//! patterns a response must not contain.
//!
//! The table is an immutable value built once (from defaults or config) and
//! shared as `Arc<ZonePolicy>` by the access filter and the pipeline.

use std::collections::BTreeMap;

use crate::config::PolicyConfig;

/// Built-in zone → allowed tags table.
const DEFAULT_ZONES: &[(&str, &[&str])] = &[
    ("triage", &["symptoms", "vitals", "recent_visit"]),
    (
        "teleconsult",
        &["symptoms", "vitals", "recent_visit", "prescription"],
    ),
    ("billing", &["billing_code", "insurance", "procedure"]),
    ("research", &["anonymized_data", "aggregate_stats"]),
    ("radiology", &["imaging_results", "radiology_report"]),
];

/// Built-in disallowed response patterns.
const DEFAULT_DISALLOWED: &[&str] = &[
    "radiology",
    "x-ray",
    "imaging",
    "billing_code",
    "insurance_claim",
];

/// Immutable zone policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZonePolicy {
    zones: BTreeMap<String, Vec<String>>,
    disallowed_patterns: Vec<String>,
}

impl Default for ZonePolicy {
    fn default() -> Self {
        Self::default_table()
    }
}

impl ZonePolicy {
    /// Build a policy from an explicit table.
    ///
    /// Patterns are stored lowercased; matching is case-insensitive.
    pub fn new<Z, T, P>(zones: Z, disallowed_patterns: P) -> Self
    where
        Z: IntoIterator<Item = (String, T)>,
        T: IntoIterator<Item = String>,
        P: IntoIterator<Item = String>,
    {
        let zones = zones
            .into_iter()
            .map(|(zone, tags)| {
                let mut unique: Vec<String> = Vec::new();
                for tag in tags {
                    if !unique.contains(&tag) {
                        unique.push(tag);
                    }
                }
                (zone, unique)
            })
            .collect();
        let disallowed_patterns = disallowed_patterns
            .into_iter()
            .map(|p| p.to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self {
            zones,
            disallowed_patterns,
        }
    }

    /// The clinical default table.
    pub fn default_table() -> Self {
        Self::new(
            DEFAULT_ZONES.iter().map(|(zone, tags)| {
                (
                    (*zone).to_owned(),
                    tags.iter().map(|t| (*t).to_owned()).collect::<Vec<_>>(),
                )
            }),
            DEFAULT_DISALLOWED.iter().map(|p| (*p).to_owned()),
        )
    }

    /// Policy from the optional `[policy]` config section, falling back to
    /// the default table. A section without `disallowed_patterns` keeps the
    /// built-in patterns.
    pub fn from_config(config: Option<&PolicyConfig>) -> Self {
        let Some(policy) = config else {
            return Self::default_table();
        };
        let zones = policy
            .zones
            .iter()
            .map(|(zone, tags)| (zone.clone(), tags.clone()));
        match &policy.disallowed_patterns {
            Some(patterns) => Self::new(zones, patterns.iter().cloned()),
            None => Self::new(zones, DEFAULT_DISALLOWED.iter().map(|p| (*p).to_owned())),
        }
    }

    /// Tags visible from `zone`. Empty for an unknown zone.
    pub fn allowed_tags(&self, zone: &str) -> &[String] {
        self.zones.get(zone).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `tag` is visible from `zone`.
    pub fn is_tag_allowed(&self, zone: &str, tag: &str) -> bool {
        self.allowed_tags(zone).iter().any(|t| t == tag)
    }

    /// Known zone names, sorted.
    pub fn zones(&self) -> impl Iterator<Item = &str> {
        self.zones.keys().map(String::as_str)
    }

    /// Disallowed patterns, lowercased.
    pub fn disallowed_patterns(&self) -> &[String] {
        &self.disallowed_patterns
    }

    /// Check `text` for a disallowed pattern leaking into `zone`.
    ///
    /// Returns the violation reason for the first offending pattern. Text is
    /// matched case-insensitively. A match is excused when the pattern is
    /// itself a substring of one of the zone's allowed tags, compared as
    /// written.
    pub fn content_violation(&self, zone: &str, text: &str) -> Option<String> {
        let haystack = text.to_lowercase();
        let allowed = self.allowed_tags(zone);
        self.disallowed_patterns
            .iter()
            .filter(|pattern| haystack.contains(pattern.as_str()))
            .find(|pattern| {
                !allowed
                    .iter()
                    .any(|tag| tag.contains(pattern.as_str()))
            })
            .map(|pattern| format!("Content contains disallowed pattern: {pattern}"))
    }
}
