//! Allow-list checker
//!
//! The allow-list is a YAML document of discount tiers:
//!
//! ```yaml
//! tiers:
//!   - name: "Tier 1 - Strategic"
//!     discount_percent: 50
//!     families:
//!       - family: m5
//!         sizes: [large, xlarge]
//! ```
//!
//! Each `{family}.{size}` becomes an approved instance type. The document is
//! parsed once, on `load()` or on the first query, and never changes after.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::AllowListError;

/// Allow-list compiled into the binaries
pub const EMBEDDED_ALLOWLIST: &str = include_str!("../../config/allowlist.yaml");

static EMPTY: BTreeMap<String, TierInfo> = BTreeMap::new();

/// Workload category of an instance family, from its first letter
pub fn family_category(family: &str) -> &'static str {
    match family.chars().next() {
        Some('m') => "General Purpose",
        Some('c') => "Compute Optimized",
        Some('r') => "Memory Optimized",
        Some('i') => "Storage Optimized",
        Some('t') => "Burstable",
        _ => "Other",
    }
}

#[derive(Debug, Deserialize)]
struct AllowListDocument {
    #[serde(default)]
    tiers: Vec<TierSpec>,
}

#[derive(Debug, Deserialize)]
struct TierSpec {
    name: String,
    discount_percent: u32,
    #[serde(default)]
    families: Vec<FamilySpec>,
}

#[derive(Debug, Deserialize)]
struct FamilySpec {
    family: String,
    #[serde(default)]
    sizes: Vec<String>,
}

/// Discount tier of one approved type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierInfo {
    pub tier_name: String,
    pub discount_percent: u32,
    pub family: String,
    pub category: String,
}

/// One approved type with its tier, as listed to the AI advisor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllowedType {
    pub instance_type: String,
    pub tier_name: String,
    pub discount_percent: u32,
    pub family: String,
    pub category: String,
}

#[derive(Debug, Clone)]
enum AllowListOrigin {
    Embedded,
    File(PathBuf),
    Inline(String),
}

impl AllowListOrigin {
    fn describe(&self) -> String {
        match self {
            AllowListOrigin::Embedded => "embedded allow-list".to_string(),
            AllowListOrigin::File(path) => path.display().to_string(),
            AllowListOrigin::Inline(_) => "inline allow-list".to_string(),
        }
    }
}

/// Parse an allow-list document into `type → tier`
pub fn parse_allowlist(yaml: &str) -> Result<BTreeMap<String, TierInfo>, AllowListError> {
    let document: AllowListDocument = serde_yaml::from_str(yaml)?;
    let mut entries: BTreeMap<String, TierInfo> = BTreeMap::new();

    for tier in document.tiers {
        if tier.discount_percent > 100 {
            return Err(AllowListError::InvalidDiscount {
                tier: tier.name,
                percent: tier.discount_percent,
            });
        }
        for family in &tier.families {
            let category = family_category(&family.family);
            for size in &family.sizes {
                let instance_type = format!("{}.{}", family.family, size);
                if let Some(existing) = entries.get(&instance_type) {
                    return Err(AllowListError::DuplicateType {
                        instance_type,
                        first_tier: existing.tier_name.clone(),
                        second_tier: tier.name.clone(),
                    });
                }
                entries.insert(
                    instance_type,
                    TierInfo {
                        tier_name: tier.name.clone(),
                        discount_percent: tier.discount_percent,
                        family: family.family.clone(),
                        category: category.to_string(),
                    },
                );
            }
        }
    }

    Ok(entries)
}

/// Lazily loaded, read-only allow-list
#[derive(Debug)]
pub struct AllowListChecker {
    origin: AllowListOrigin,
    entries: OnceLock<BTreeMap<String, TierInfo>>,
}

impl Default for AllowListChecker {
    fn default() -> Self {
        Self::embedded()
    }
}

impl AllowListChecker {
    pub fn embedded() -> Self {
        Self::with_origin(AllowListOrigin::Embedded)
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::with_origin(AllowListOrigin::File(path.into()))
    }

    pub fn from_yaml_str(yaml: impl Into<String>) -> Self {
        Self::with_origin(AllowListOrigin::Inline(yaml.into()))
    }

    /// Path override, or the embedded default
    pub fn from_optional_path(path: Option<&Path>) -> Self {
        match path {
            Some(path) => Self::from_path(path),
            None => Self::embedded(),
        }
    }

    fn with_origin(origin: AllowListOrigin) -> Self {
        Self {
            origin,
            entries: OnceLock::new(),
        }
    }

    fn read(&self) -> Result<BTreeMap<String, TierInfo>, AllowListError> {
        match &self.origin {
            AllowListOrigin::Embedded => parse_allowlist(EMBEDDED_ALLOWLIST),
            AllowListOrigin::Inline(yaml) => parse_allowlist(yaml),
            AllowListOrigin::File(path) => {
                let yaml = std::fs::read_to_string(path).map_err(|source| AllowListError::Io {
                    path: path.clone(),
                    source,
                })?;
                parse_allowlist(&yaml)
            }
        }
    }

    /// Parse the document if not done yet. Later calls are no-ops.
    pub fn load(&self) -> Result<&BTreeMap<String, TierInfo>, AllowListError> {
        if let Some(entries) = self.entries.get() {
            return Ok(entries);
        }
        let parsed = self.read()?;
        let entries = self.entries.get_or_init(|| parsed);
        tracing::info!(
            count = entries.len(),
            source = %self.origin.describe(),
            "Loaded allow-list"
        );
        Ok(entries)
    }

    fn entries(&self) -> &BTreeMap<String, TierInfo> {
        match self.load() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(error = %e, "Allow-list unavailable, treating every type as not allowed");
                &EMPTY
            }
        }
    }

    /// Whether the type is approved.
    ///
    /// The query methods load on first use. If loading fails they log the
    /// error and answer as if the list were empty, so every type reads as
    /// not allowed. Call [`load`](Self::load) first to surface the error.
    pub fn is_allowed(&self, instance_type: &str) -> bool {
        self.entries().contains_key(instance_type)
    }

    /// Tier of an approved type; `None` when unlisted or the list failed to load
    pub fn get_tier(&self, instance_type: &str) -> Option<&TierInfo> {
        self.entries().get(instance_type)
    }

    /// Every approved type, sorted by type name. Empty if the list failed
    /// to load.
    pub fn get_all_allowed_types(&self) -> Vec<AllowedType> {
        self.entries()
            .iter()
            .map(|(instance_type, tier)| AllowedType {
                instance_type: instance_type.clone(),
                tier_name: tier.tier_name.clone(),
                discount_percent: tier.discount_percent,
                family: tier.family.clone(),
                category: tier.category.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_allowlist_known_types() {
        let checker = AllowListChecker::embedded();
        assert!(checker.is_allowed("m5.xlarge"));
        assert!(checker.is_allowed("t3.medium"));
        assert!(checker.is_allowed("c5.xlarge"));
        assert!(checker.is_allowed("r5.large"));
        assert!(checker.is_allowed("i3.large"));
        assert!(!checker.is_allowed("p3.2xlarge"));
        assert!(!checker.is_allowed("m5.metal"));
        assert!(!checker.is_allowed("m5a.xlarge"));
        assert!(!checker.is_allowed(""));
    }

    #[test]
    fn test_embedded_tiers() {
        let checker = AllowListChecker::embedded();

        let tier = checker.get_tier("m5.xlarge").unwrap();
        assert_eq!(tier.discount_percent, 50);
        assert!(tier.tier_name.contains("Tier 1"));
        assert_eq!(tier.family, "m5");
        assert_eq!(tier.category, "General Purpose");

        let tier = checker.get_tier("t3.medium").unwrap();
        assert_eq!(tier.discount_percent, 35);
        assert!(tier.tier_name.contains("Tier 2"));
        assert_eq!(tier.category, "Burstable");

        assert_eq!(checker.get_tier("c5.xlarge").unwrap().category, "Compute Optimized");
        assert_eq!(checker.get_tier("r5.large").unwrap().category, "Memory Optimized");
        assert_eq!(checker.get_tier("i3.large").unwrap().category, "Storage Optimized");
        assert!(checker.get_tier("p3.2xlarge").is_none());
    }

    #[test]
    fn test_all_allowed_types_sorted() {
        let types = AllowListChecker::embedded().get_all_allowed_types();
        assert!(!types.is_empty());
        let names: Vec<&str> = types.iter().map(|t| t.instance_type.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_family_category() {
        assert_eq!(family_category("m6g"), "General Purpose");
        assert_eq!(family_category("x2idn"), "Other");
        assert_eq!(family_category(""), "Other");
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let yaml = r#"
tiers:
  - name: A
    discount_percent: 50
    families:
      - family: m5
        sizes: [large]
  - name: B
    discount_percent: 35
    families:
      - family: m5
        sizes: [large]
"#;
        let err = parse_allowlist(yaml).unwrap_err();
        assert!(matches!(
            err,
            AllowListError::DuplicateType { ref instance_type, .. } if instance_type == "m5.large"
        ));
    }

    #[test]
    fn test_discount_out_of_range_rejected() {
        let yaml = "tiers:\n  - name: A\n    discount_percent: 150\n";
        assert!(matches!(
            parse_allowlist(yaml),
            Err(AllowListError::InvalidDiscount { percent: 150, .. })
        ));
        let yaml = "tiers:\n  - name: A\n    discount_percent: -5\n";
        assert!(matches!(parse_allowlist(yaml), Err(AllowListError::Yaml(_))));
    }

    #[test]
    fn test_missing_file() {
        let checker = AllowListChecker::from_path("/nonexistent/allowlist.yaml");
        assert!(matches!(checker.load(), Err(AllowListError::Io { .. })));
        assert!(!checker.is_allowed("m5.xlarge"));
        assert!(checker.is_empty());
    }

    #[test]
    fn test_invalid_yaml_reads_as_empty_list() {
        let checker = AllowListChecker::from_yaml_str("tiers: [unterminated");
        assert!(matches!(checker.load(), Err(AllowListError::Yaml(_))));

        assert!(!checker.is_allowed("m5.xlarge"));
        assert!(checker.get_tier("m5.xlarge").is_none());
        assert!(checker.get_all_allowed_types().is_empty());
        // a failed load is not cached
        assert!(checker.load().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("allowlist.yaml");
        std::fs::write(
            &path,
            "tiers:\n  - name: Only\n    discount_percent: 10\n    families:\n      - family: c7g\n        sizes: [large]\n",
        )
        .unwrap();

        let checker = AllowListChecker::from_optional_path(Some(&path));
        assert_eq!(checker.load().unwrap().len(), 1);
        assert_eq!(checker.get_tier("c7g.large").unwrap().discount_percent, 10);
        assert_eq!(checker.len(), 1);
    }
}
