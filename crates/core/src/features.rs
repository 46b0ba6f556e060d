//! Feature extraction: lead + enrichment fields into a fixed feature vector.
//!
//! The same [`FeatureVector`] feeds both the rule scorer (which reads the
//! preserved raw values) and the learned model (which reads the normalized
//! dense schema). Absent data is [`FeatureValue::Missing`], never zero, so
//! consumers can tell "bad fit" from "no data".

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{DataQualityError, ModelError};

// ---------------------------------------------------------------------------
// Field and feature names
// ---------------------------------------------------------------------------

pub const FIELD_COMPANY_SIZE: &str = "company_size";
pub const FIELD_INDUSTRY: &str = "industry";
pub const FIELD_BUDGET: &str = "budget";
pub const FIELD_TIMELINE: &str = "timeline";
pub const FIELD_JOB_TITLE: &str = "job_title";

/// Base lead fields, in extraction order.
pub const BASE_FIELDS: &[&str] = &[
    FIELD_COMPANY_SIZE,
    FIELD_INDUSTRY,
    FIELD_BUDGET,
    FIELD_TIMELINE,
    FIELD_JOB_TITLE,
];

/// Prefix for custom field raw keys (`custom.<lowercased name>`).
pub const CUSTOM_PREFIX: &str = "custom.";

/// Industry sectors for one-hot encoding. `other` catches everything else.
pub const INDUSTRY_SECTORS: &[&str] = &[
    "saas",
    "fintech",
    "healthcare",
    "retail",
    "manufacturing",
    "education",
    "government",
    "other",
];

/// The dense model schema, in a fixed order.
pub const FEATURE_SCHEMA: &[&str] = &[
    "company_size",
    "company_size.missing",
    "budget",
    "budget.missing",
    "timeline_urgency",
    "timeline.missing",
    "job_seniority",
    "job_title.missing",
    "industry.saas",
    "industry.fintech",
    "industry.healthcare",
    "industry.retail",
    "industry.manufacturing",
    "industry.education",
    "industry.government",
    "industry.other",
    "industry.missing",
];

/// Upper edges of company size buckets
/// (`1-10, 11-50, 51-200, 201-500, 501-1000, 1001-5000, 5000+`).
const COMPANY_SIZE_EDGES: &[f64] = &[10.0, 50.0, 200.0, 500.0, 1000.0, 5000.0];

/// Upper edges (exclusive) of budget buckets
/// (`<10k, 10k-25k, 25k-50k, 50k-100k, 100k+`).
const BUDGET_EDGES: &[f64] = &[10_000.0, 25_000.0, 50_000.0, 100_000.0];

/// Upper edges in months of timeline buckets
/// (`immediate, <1 month, 1-3, 3-6, 6-12, 12+`).
const TIMELINE_EDGES_MONTHS: &[f64] = &[0.25, 1.0, 3.0, 6.0, 12.0];

const WEEKS_PER_MONTH: f64 = 4.345;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Lead attributes as captured from the form or CRM.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadProfile {
    pub company_name: Option<String>,
    pub company_size: Option<String>,
    pub industry: Option<String>,
    pub budget: Option<String>,
    pub timeline: Option<String>,
    pub job_title: Option<String>,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, String>,
}

/// Third-party enrichment data. May be partial or absent entirely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    /// Keyed by base field name (`company_size`, `industry`, ...).
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    pub confidence: f64,
    pub source: String,
}

// ---------------------------------------------------------------------------
// Feature vector
// ---------------------------------------------------------------------------

/// A single normalized feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FeatureValue {
    Missing,
    Value(f64),
}

impl FeatureValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Missing => None,
            Self::Value(v) => Some(*v),
        }
    }
}

/// Immutable output of one extraction pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    values: BTreeMap<String, FeatureValue>,
    raw: BTreeMap<String, String>,
    enrichment_confidence: Option<f64>,
}

impl FeatureVector {
    /// A vector where every schema feature is missing and no raw data exists.
    ///
    /// Used when extraction fails so scoring can still produce an honest
    /// "insufficient data" result.
    pub fn all_missing() -> Self {
        build_vector(BTreeMap::new(), None)
    }

    pub fn get(&self, name: &str) -> FeatureValue {
        self.values.get(name).copied().unwrap_or(FeatureValue::Missing)
    }

    /// The preserved raw value of a base field.
    pub fn raw(&self, field: &str) -> Option<&str> {
        self.raw.get(field).map(String::as_str)
    }

    /// The preserved raw value of a custom field (case-insensitive name).
    pub fn raw_custom(&self, name: &str) -> Option<&str> {
        self.raw(&custom_key(name))
    }

    pub fn enrichment_confidence(&self) -> Option<f64> {
        self.enrichment_confidence
    }

    /// Number of raw fields (base and custom) carrying data.
    pub fn populated_fields(&self) -> usize {
        self.raw.len()
    }

    pub fn schema_names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Project the vector onto a model's feature list.
    ///
    /// Missing values become `0.0` (the paired `.missing` indicator carries
    /// the signal). Fails if a requested feature is not part of this vector.
    pub fn dense(&self, names: &[String]) -> Result<Vec<f64>, ModelError> {
        names
            .iter()
            .map(|name| match self.values.get(name) {
                Some(value) => Ok(value.as_f64().unwrap_or(0.0)),
                None => Err(ModelError::FeatureShapeMismatch(name.clone())),
            })
            .collect()
    }
}

/// The dense schema as owned strings, for storing alongside a model.
pub fn feature_schema() -> Vec<String> {
    FEATURE_SCHEMA.iter().map(|s| s.to_string()).collect()
}

fn custom_key(name: &str) -> String {
    format!("{CUSTOM_PREFIX}{}", name.trim().to_lowercase())
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Build the feature vector for a lead.
///
/// Lead-supplied fields take precedence; enrichment only fills gaps. Fails
/// with [`DataQualityError::NoUsableFields`] when neither source provides
/// any field.
pub fn extract(
    lead: &LeadProfile,
    enrichment: Option<&Enrichment>,
) -> Result<FeatureVector, DataQualityError> {
    let lead_fields = [
        (FIELD_COMPANY_SIZE, &lead.company_size),
        (FIELD_INDUSTRY, &lead.industry),
        (FIELD_BUDGET, &lead.budget),
        (FIELD_TIMELINE, &lead.timeline),
        (FIELD_JOB_TITLE, &lead.job_title),
    ];

    let mut raw = BTreeMap::new();
    for (field, value) in lead_fields {
        let from_lead = value.as_deref().and_then(non_blank);
        let from_enrichment = enrichment
            .and_then(|e| e.fields.get(field))
            .and_then(|v| non_blank(v));
        if let Some(v) = from_lead.or(from_enrichment) {
            raw.insert(field.to_string(), v.to_string());
        }
    }
    for (name, value) in &lead.custom_fields {
        if let Some(v) = non_blank(value) {
            raw.insert(custom_key(name), v.to_string());
        }
    }

    if raw.is_empty() {
        return Err(DataQualityError::NoUsableFields);
    }

    let confidence = enrichment.map(|e| e.confidence.clamp(0.0, 1.0));
    Ok(build_vector(raw, confidence))
}

fn non_blank(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn build_vector(raw: BTreeMap<String, String>, confidence: Option<f64>) -> FeatureVector {
    let mut values = BTreeMap::new();

    let ordinal = |value: Option<f64>| value.map_or(FeatureValue::Missing, FeatureValue::Value);
    let indicator = |present: bool| FeatureValue::Value(if present { 0.0 } else { 1.0 });

    let size = raw.get(FIELD_COMPANY_SIZE).and_then(|v| normalize_company_size(v));
    values.insert("company_size".to_string(), ordinal(size));
    values.insert("company_size.missing".to_string(), indicator(size.is_some()));

    let budget = raw.get(FIELD_BUDGET).and_then(|v| normalize_budget(v));
    values.insert("budget".to_string(), ordinal(budget));
    values.insert("budget.missing".to_string(), indicator(budget.is_some()));

    let urgency = raw.get(FIELD_TIMELINE).and_then(|v| normalize_timeline(v));
    values.insert("timeline_urgency".to_string(), ordinal(urgency));
    values.insert("timeline.missing".to_string(), indicator(urgency.is_some()));

    let seniority = raw
        .get(FIELD_JOB_TITLE)
        .map(|v| classify_seniority(v).normalized());
    values.insert("job_seniority".to_string(), ordinal(seniority));
    values.insert("job_title.missing".to_string(), indicator(seniority.is_some()));

    let sector = raw.get(FIELD_INDUSTRY).map(|v| classify_industry(v));
    for s in INDUSTRY_SECTORS {
        let value = match sector {
            Some(found) => FeatureValue::Value(if found == *s { 1.0 } else { 0.0 }),
            None => FeatureValue::Missing,
        };
        values.insert(format!("industry.{s}"), value);
    }
    values.insert("industry.missing".to_string(), indicator(sector.is_some()));

    FeatureVector {
        values,
        raw,
        enrichment_confidence: confidence,
    }
}

// ---------------------------------------------------------------------------
// Numeric range parsing
// ---------------------------------------------------------------------------

/// A closed numeric interval; `max` may be infinite for "50k+" style values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericRange {
    pub min: f64,
    pub max: f64,
}

impl NumericRange {
    pub fn point(v: f64) -> Self {
        Self { min: v, max: v }
    }

    /// Representative value used for bucketing: the midpoint, or the lower
    /// bound for open-ended ranges.
    pub fn representative(&self) -> f64 {
        if self.max.is_finite() {
            (self.min + self.max) / 2.0
        } else {
            self.min
        }
    }

    pub fn contains(&self, v: f64) -> bool {
        v >= self.min && v <= self.max
    }

    /// Whether the two ranges share at least one point.
    pub fn overlaps(&self, other: &NumericRange) -> bool {
        self.min <= other.max && other.min <= self.max
    }

    /// Gap between the ranges (0 when they overlap).
    pub fn gap(&self, other: &NumericRange) -> f64 {
        if self.overlaps(other) {
            0.0
        } else if self.max < other.min {
            other.min - self.max
        } else {
            self.min - other.max
        }
    }
}

fn number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Suffix letters are captured separately so "3months" is not read as 3M.
    RE.get_or_init(|| {
        Regex::new(r"(\d[\d,]*(?:\.\d+)?)\s?([kKmM]?)([a-zA-Z]*)").expect("valid number regex")
    })
}

/// Parse a free-text amount or count such as `"$50k+"`, `"10,000 - 25,000"`,
/// `"<10k"`, `"11-50"` or `"5000+"`.
pub fn parse_amount_range(text: &str) -> Option<NumericRange> {
    let lower = text.to_lowercase();
    let numbers: Vec<f64> = number_regex()
        .captures_iter(&lower)
        .filter_map(|cap| {
            let digits = cap.get(1)?.as_str().replace(',', "");
            let base: f64 = digits.parse().ok()?;
            let suffix = cap.get(2).map_or("", |m| m.as_str());
            let trailing = cap.get(3).map_or("", |m| m.as_str());
            let multiplier = match (suffix, trailing.is_empty()) {
                ("k", true) => 1_000.0,
                ("m", true) => 1_000_000.0,
                _ => 1.0,
            };
            Some(base * multiplier)
        })
        .collect();

    range_from_numbers(&lower, &numbers)
}

/// Parse a timeline such as `"1-3 months"`, `"6 weeks"`, `"immediate"` or
/// `"12+ months"` into a range of months.
pub fn parse_timeline_months(text: &str) -> Option<NumericRange> {
    let lower = text.to_lowercase();
    if ["immediate", "asap", "now", "urgent"]
        .iter()
        .any(|k| lower.contains(k))
    {
        return Some(NumericRange::point(0.0));
    }

    let factor = if lower.contains("week") {
        1.0 / WEEKS_PER_MONTH
    } else if lower.contains("year") {
        12.0
    } else if lower.contains("day") {
        1.0 / 30.0
    } else {
        1.0
    };

    let numbers: Vec<f64> = number_regex()
        .captures_iter(&lower)
        .filter_map(|cap| cap.get(1)?.as_str().replace(',', "").parse::<f64>().ok())
        .map(|n| n * factor)
        .collect();

    range_from_numbers(&lower, &numbers)
}

fn range_from_numbers(lower: &str, numbers: &[f64]) -> Option<NumericRange> {
    let open_upper = lower.contains('+')
        || lower.contains('>')
        || ["more", "over", "above", "plus"].iter().any(|k| lower.contains(k));
    let open_lower = lower.starts_with('<')
        || ["under", "less", "below", "up to"].iter().any(|k| lower.contains(k));

    match numbers {
        [] => None,
        [n] if open_upper => Some(NumericRange {
            min: *n,
            max: f64::INFINITY,
        }),
        [n] if open_lower => Some(NumericRange { min: 0.0, max: *n }),
        [n] => Some(NumericRange::point(*n)),
        [a, b, ..] => Some(NumericRange {
            min: a.min(*b),
            max: a.max(*b),
        }),
    }
}

// ---------------------------------------------------------------------------
// Bucketing
// ---------------------------------------------------------------------------

fn bucket_index(value: f64, edges: &[f64], inclusive: bool) -> usize {
    edges
        .iter()
        .take_while(|edge| if inclusive { value > **edge } else { value >= **edge })
        .count()
}

fn normalize_company_size(raw: &str) -> Option<f64> {
    let range = parse_amount_range(raw)?;
    let idx = bucket_index(range.representative(), COMPANY_SIZE_EDGES, true);
    Some(idx as f64 / COMPANY_SIZE_EDGES.len() as f64)
}

fn normalize_budget(raw: &str) -> Option<f64> {
    let range = parse_amount_range(raw)?;
    let idx = bucket_index(range.representative(), BUDGET_EDGES, false);
    Some(idx as f64 / BUDGET_EDGES.len() as f64)
}

/// Urgency in `[0, 1]`: immediate is 1.0, beyond a year is 0.0.
fn normalize_timeline(raw: &str) -> Option<f64> {
    let range = parse_timeline_months(raw)?;
    let idx = bucket_index(range.representative(), TIMELINE_EDGES_MONTHS, true);
    Some(1.0 - idx as f64 / TIMELINE_EDGES_MONTHS.len() as f64)
}

// ---------------------------------------------------------------------------
// Categorical taxonomies
// ---------------------------------------------------------------------------

/// Job seniority ladder derived from a free-text title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Seniority {
    Individual,
    Manager,
    Director,
    Vp,
    CLevel,
}

impl Seniority {
    pub fn normalized(&self) -> f64 {
        match self {
            Self::Individual => 0.0,
            Self::Manager => 0.25,
            Self::Director => 0.5,
            Self::Vp => 0.75,
            Self::CLevel => 1.0,
        }
    }
}

/// Classify a job title by whole-word keywords ("director" must not match
/// "cto").
pub fn classify_seniority(title: &str) -> Seniority {
    let lower = title.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    let has = |words: &[&str]| tokens.iter().any(|t| words.contains(t));

    if lower.contains("vice president") || has(&["vp", "svp", "evp"]) {
        Seniority::Vp
    } else if lower.starts_with("chief ")
        || has(&["ceo", "cto", "cfo", "coo", "cmo", "cio", "cro", "founder", "cofounder", "owner", "president"])
    {
        Seniority::CLevel
    } else if lower.contains("head of") || has(&["director"]) {
        Seniority::Director
    } else if has(&["manager", "lead", "supervisor"]) {
        Seniority::Manager
    } else {
        Seniority::Individual
    }
}

/// Map a free-text industry onto one of [`INDUSTRY_SECTORS`].
pub fn classify_industry(industry: &str) -> &'static str {
    const KEYWORDS: &[(&str, &[&str])] = &[
        ("saas", &["saas", "software", "cloud", "platform"]),
        ("fintech", &["fintech", "financial", "finance", "banking", "payments", "insurance"]),
        ("healthcare", &["health", "medical", "pharma", "biotech", "hospital"]),
        ("retail", &["retail", "ecommerce", "e-commerce", "consumer", "store"]),
        ("manufacturing", &["manufacturing", "industrial", "automotive", "factory"]),
        ("education", &["education", "edtech", "school", "university", "learning"]),
        ("government", &["government", "public sector", "federal", "municipal"]),
    ];
    let lower = industry.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
        .map_or("other", |(sector, _)| sector)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn lead() -> LeadProfile {
        LeadProfile {
            company_name: Some("Acme".into()),
            company_size: Some("51-200".into()),
            industry: Some("B2B SaaS".into()),
            budget: Some("$50k+".into()),
            timeline: Some("1-3 months".into()),
            job_title: Some("VP of Sales".into()),
            custom_fields: BTreeMap::from([("Region".to_string(), "EMEA".to_string())]),
        }
    }

    // -- Parsing -------------------------------------------------------------

    #[test]
    fn parses_open_ended_amount() {
        let r = parse_amount_range("$50k+").unwrap();
        assert_eq!(r.min, 50_000.0);
        assert!(r.max.is_infinite());
    }

    #[test]
    fn parses_amount_span_with_separators() {
        let r = parse_amount_range("$10,000 - $25,000").unwrap();
        assert_eq!(r, NumericRange { min: 10_000.0, max: 25_000.0 });
    }

    #[test]
    fn parses_upper_bounded_amount() {
        let r = parse_amount_range("<10k").unwrap();
        assert_eq!(r, NumericRange { min: 0.0, max: 10_000.0 });
    }

    #[test]
    fn month_suffix_is_not_millions() {
        let r = parse_timeline_months("3months").unwrap();
        assert_eq!(r, NumericRange::point(3.0));
    }

    #[test]
    fn parses_timeline_units() {
        assert_eq!(parse_timeline_months("immediate").unwrap(), NumericRange::point(0.0));
        assert_eq!(
            parse_timeline_months("1-3 months").unwrap(),
            NumericRange { min: 1.0, max: 3.0 }
        );
        assert_eq!(parse_timeline_months("1 year").unwrap(), NumericRange::point(12.0));
        assert!(parse_timeline_months("someday").is_none());
    }

    #[test]
    fn range_gap_and_overlap() {
        let a = NumericRange { min: 10.0, max: 50.0 };
        let b = NumericRange { min: 60.0, max: 80.0 };
        assert!(!a.overlaps(&b));
        assert_eq!(a.gap(&b), 10.0);
        assert_eq!(b.gap(&a), 10.0);
        assert_eq!(a.gap(&NumericRange::point(20.0)), 0.0);
    }

    // -- Taxonomies ----------------------------------------------------------

    #[test]
    fn seniority_uses_whole_words() {
        assert_eq!(classify_seniority("Director of Engineering"), Seniority::Director);
        assert_eq!(classify_seniority("CTO"), Seniority::CLevel);
        assert_eq!(classify_seniority("Vice President, Marketing"), Seniority::Vp);
        assert_eq!(classify_seniority("Engineering Manager"), Seniority::Manager);
        assert_eq!(classify_seniority("Account Executive"), Seniority::Individual);
    }

    #[test]
    fn industry_maps_to_sector() {
        assert_eq!(classify_industry("B2B SaaS"), "saas");
        assert_eq!(classify_industry("Retail"), "retail");
        assert_eq!(classify_industry("Mining"), "other");
    }

    // -- Extraction ----------------------------------------------------------

    #[test]
    fn extract_populates_schema() {
        let fv = extract(&lead(), None).unwrap();
        for name in FEATURE_SCHEMA {
            assert!(fv.schema_names().any(|n| n == *name), "missing {name}");
        }
        assert_eq!(fv.get("industry.saas"), FeatureValue::Value(1.0));
        assert_eq!(fv.get("industry.retail"), FeatureValue::Value(0.0));
        assert_eq!(fv.get("job_seniority"), FeatureValue::Value(0.75));
        assert_eq!(fv.get("budget.missing"), FeatureValue::Value(0.0));
        assert_eq!(fv.raw_custom("region"), Some("EMEA"));
    }

    #[test]
    fn missing_fields_are_marked_missing_not_zero() {
        let profile = LeadProfile {
            industry: Some("Retail".into()),
            ..Default::default()
        };
        let fv = extract(&profile, None).unwrap();
        assert_eq!(fv.get("budget"), FeatureValue::Missing);
        assert_eq!(fv.get("budget.missing"), FeatureValue::Value(1.0));
        assert_eq!(fv.raw(FIELD_BUDGET), None);
    }

    #[test]
    fn enrichment_fills_gaps_but_lead_wins() {
        let profile = LeadProfile {
            industry: Some("Retail".into()),
            ..Default::default()
        };
        let enrichment = Enrichment {
            fields: BTreeMap::from([
                ("industry".to_string(), "Software".to_string()),
                ("company_size".to_string(), "1001-5000".to_string()),
            ]),
            confidence: 0.8,
            source: "clearbit".into(),
        };
        let fv = extract(&profile, Some(&enrichment)).unwrap();
        assert_eq!(fv.raw(FIELD_INDUSTRY), Some("Retail"));
        assert_eq!(fv.raw(FIELD_COMPANY_SIZE), Some("1001-5000"));
        assert_eq!(fv.enrichment_confidence(), Some(0.8));
    }

    #[test]
    fn empty_lead_without_enrichment_is_data_quality_error() {
        let profile = LeadProfile {
            company_name: Some("Nobody".into()),
            budget: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(extract(&profile, None), Err(DataQualityError::NoUsableFields));
    }

    #[test]
    fn ordinal_normalization_is_bounded() {
        let fv = extract(
            &LeadProfile {
                company_size: Some("10000+".into()),
                budget: Some("$500".into()),
                timeline: Some("2 years".into()),
                ..Default::default()
            },
            None,
        )
        .unwrap();
        assert_eq!(fv.get("company_size"), FeatureValue::Value(1.0));
        assert_eq!(fv.get("budget"), FeatureValue::Value(0.0));
        assert_eq!(fv.get("timeline_urgency"), FeatureValue::Value(0.0));
    }

    #[test]
    fn dense_reports_shape_mismatch() {
        let fv = extract(&lead(), None).unwrap();
        let names = vec!["budget".to_string(), "revenue".to_string()];
        assert_eq!(
            fv.dense(&names),
            Err(ModelError::FeatureShapeMismatch("revenue".to_string()))
        );
        assert_eq!(fv.dense(&feature_schema()).unwrap().len(), FEATURE_SCHEMA.len());
    }

    #[test]
    fn all_missing_has_full_schema() {
        let fv = FeatureVector::all_missing();
        assert_eq!(fv.populated_fields(), 0);
        assert_eq!(fv.dense(&feature_schema()).unwrap().len(), FEATURE_SCHEMA.len());
    }
}
