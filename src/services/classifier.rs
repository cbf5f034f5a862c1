use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{HashMap, HashSet};

use crate::models::ParsedChannelInfo;

/// Label for channels no rule could place
pub const DEFAULT_FALLBACK_COUNTRY: &str = "Uncategorized";

const BUILTIN_COUNTRIES: &[(&str, &str)] = &[
    ("MA", "Morocco"),
    ("SA", "Saudi Arabia"),
    ("AE", "United Arab Emirates"),
    ("EG", "Egypt"),
    ("DZ", "Algeria"),
    ("TN", "Tunisia"),
    ("JO", "Jordan"),
    ("PS", "Palestine"),
    ("LB", "Lebanon"),
    ("SY", "Syria"),
    ("IQ", "Iraq"),
    ("KW", "Kuwait"),
    ("QA", "Qatar"),
    ("BH", "Bahrain"),
    ("OM", "Oman"),
    ("YE", "Yemen"),
    ("US", "United States"),
    ("GB", "United Kingdom"),
    ("FR", "France"),
    ("DE", "Germany"),
    ("IT", "Italy"),
    ("ES", "Spain"),
    ("TR", "Turkey"),
    ("CN", "China"),
    ("JP", "Japan"),
    ("IN", "India"),
    ("BR", "Brazil"),
];

lazy_static! {
    // ============ TVG-ID CODE PATTERNS ============
    /// iptv-org style `Name.cc` or `Name.cc@Feed`
    static ref ID_SUFFIX_CODE: Regex = Regex::new(r"(?i)\.([a-z]{2})(?:@[^.]*)?$").unwrap();
    /// Leading `cc` followed by a separator: `MA1.ma`, `fr-news`, `US`
    static ref ID_PREFIX_CODE: Regex = Regex::new(r"(?i)^([a-z]{2})(?:[^a-z]|$)").unwrap();
}

/// Immutable ISO code → country name lookup
#[derive(Debug, Clone)]
pub struct CountryTable {
    by_code: HashMap<String, String>,
    names: HashSet<String>,
}

impl CountryTable {
    /// Build a table from `(code, name)` pairs; codes are stored uppercased
    pub fn new<I, C, N>(entries: I) -> Self
    where
        I: IntoIterator<Item = (C, N)>,
        C: AsRef<str>,
        N: Into<String>,
    {
        let mut by_code = HashMap::new();
        let mut names = HashSet::new();

        for (code, name) in entries {
            let name = name.into();
            names.insert(name.clone());
            by_code.insert(code.as_ref().to_ascii_uppercase(), name);
        }

        Self { by_code, names }
    }

    /// Table shipped with the tool
    pub fn builtin() -> Self {
        Self::new(BUILTIN_COUNTRIES.iter().copied())
    }

    pub fn lookup_code(&self, code: &str) -> Option<&str> {
        self.by_code
            .get(&code.to_ascii_uppercase())
            .map(|s| s.as_str())
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

impl Default for CountryTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Resolves a channel's country from its parsed metadata
#[derive(Debug, Clone)]
pub struct CountryClassifier {
    table: CountryTable,
    fallback: String,
}

impl Default for CountryClassifier {
    fn default() -> Self {
        Self::new(CountryTable::builtin(), DEFAULT_FALLBACK_COUNTRY)
    }
}

impl CountryClassifier {
    pub fn new(table: CountryTable, fallback: impl Into<String>) -> Self {
        Self {
            table,
            fallback: fallback.into(),
        }
    }

    /// Country label for a parsed entry
    ///
    /// 1. a two-letter code in `tvg-id` found in the table
    /// 2. the first pipe-delimited segment of `group-title`, if it is
    ///    exactly a country name from the table
    /// 3. the fallback label
    pub fn classify(&self, info: &ParsedChannelInfo) -> String {
        if let Some(country) = info.id.as_deref().and_then(|id| self.classify_by_id(id)) {
            return country.to_string();
        }

        if let Some(country) = info
            .group_title
            .as_deref()
            .and_then(|group| self.classify_by_group(group))
        {
            return country.to_string();
        }

        self.fallback.clone()
    }

    /// Look up code candidates from a tvg-id, suffix first
    pub fn classify_by_id(&self, id: &str) -> Option<&str> {
        let id = id.trim();

        [&*ID_SUFFIX_CODE, &*ID_PREFIX_CODE]
            .iter()
            .filter_map(|pattern| pattern.captures(id))
            .filter_map(|caps| caps.get(1))
            .find_map(|code| self.table.lookup_code(code.as_str()))
    }

    /// Exact match of the group's leading segment against known names
    pub fn classify_by_group(&self, group: &str) -> Option<&str> {
        let prefix = group.split('|').next()?.trim();
        self.table.names.get(prefix).map(|s| s.as_str())
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    pub fn table(&self) -> &CountryTable {
        &self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: Option<&str>, group: Option<&str>) -> ParsedChannelInfo {
        ParsedChannelInfo {
            id: id.map(|s| s.to_string()),
            group_title: group.map(|s| s.to_string()),
            name: "Test".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_classify_by_id_code() {
        let classifier = CountryClassifier::default();

        assert_eq!(classifier.classify(&info(Some("MA1.ma"), Some("Morocco"))), "Morocco");
        assert_eq!(classifier.classify(&info(Some("AlJazeera.qa@SD"), None)), "Qatar");
        assert_eq!(classifier.classify(&info(Some("fr-news"), None)), "France");
        assert_eq!(classifier.classify(&info(Some("us"), None)), "United States");
    }

    #[test]
    fn test_suffix_code_wins_over_prefix() {
        let classifier = CountryClassifier::default();
        // "DE" prefix vs ".eg" suffix
        assert_eq!(classifier.classify(&info(Some("DE1.eg"), None)), "Egypt");
    }

    #[test]
    fn test_unknown_code_falls_through_to_group() {
        let classifier = CountryClassifier::default();

        assert_eq!(
            classifier.classify(&info(Some("Channel.zz"), Some("Lebanon | News"))),
            "Lebanon"
        );
    }

    #[test]
    fn test_group_requires_exact_name() {
        let classifier = CountryClassifier::default();

        assert_eq!(classifier.classify(&info(None, Some("Jordan|Sports"))), "Jordan");
        assert_eq!(classifier.classify(&info(None, Some("jordan|Sports"))), DEFAULT_FALLBACK_COUNTRY);
        assert_eq!(classifier.classify(&info(None, Some("News"))), DEFAULT_FALLBACK_COUNTRY);
    }

    #[test]
    fn test_fallback_without_metadata() {
        let classifier = CountryClassifier::new(CountryTable::builtin(), "International");
        assert_eq!(classifier.classify(&info(None, None)), "International");
    }

    #[test]
    fn test_classify_is_idempotent() {
        let classifier = CountryClassifier::default();
        let entry = info(Some("SA2.sa"), Some("Saudi Arabia|General"));

        assert_eq!(classifier.classify(&entry), classifier.classify(&entry));
    }

    #[test]
    fn test_custom_table_is_swappable() {
        let table = CountryTable::new([("za", "South Africa")]);
        let classifier = CountryClassifier::new(table, DEFAULT_FALLBACK_COUNTRY);

        assert_eq!(classifier.classify(&info(Some("SABC1.za"), None)), "South Africa");
        assert_eq!(classifier.classify(&info(Some("MA1.ma"), None)), DEFAULT_FALLBACK_COUNTRY);
        assert_eq!(classifier.table().len(), 1);
    }
}
