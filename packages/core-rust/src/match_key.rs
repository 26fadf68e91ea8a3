//! Match-key computation and strategy configuration.
//!
//! A match key is a deterministic string acting as a cluster's identity
//! within one project. Keys are prefix-tagged (`doi:`, `tay:`, `ty:`, `ta:`)
//! so key spaces built from different evidence never collide.
//!
//! Presets (legacy, kept for backward compatibility)
//! -------
//! `doi_first_strict`   DOI if present; else title + first-author + year
//! `doi_first_medium`   DOI if present; else title + year
//! `strict`             title + first-author + year (ignores DOI)
//! `medium`             title + year
//! `loose`              title + first-author (no year)
//!
//! [`StrategyConfig`] is the tiered configuration stored in the strategy's
//! structured-config column; it controls which tiers the dedup-mode cluster
//! engine activates.

use serde::{Deserialize, Serialize};

/// Legacy match-strategy preset names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    DoiFirstStrict,
    DoiFirstMedium,
    Strict,
    Medium,
    Loose,
}

impl Preset {
    /// Stable string form, as stored in the strategies table.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DoiFirstStrict => "doi_first_strict",
            Self::DoiFirstMedium => "doi_first_medium",
            Self::Strict => "strict",
            Self::Medium => "medium",
            Self::Loose => "loose",
        }
    }
}

/// Which fields produced a match key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyBasis {
    Doi,
    TitleAuthorYear,
    TitleYear,
    TitleAuthor,
    None,
}

impl KeyBasis {
    /// Stable string form, as stored in the records table.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Doi => "doi",
            Self::TitleAuthorYear => "title_author_year",
            Self::TitleYear => "title_year",
            Self::TitleAuthor => "title_author",
            Self::None => "none",
        }
    }
}

/// Computes `(match_key, basis)` for the given normalized fields and preset.
///
/// The key is `None` when the preset's required fields are missing — such a
/// record stays permanently isolated under that strategy.
#[must_use]
pub fn compute_match_key(
    norm_title: Option<&str>,
    norm_first_author: Option<&str>,
    year: Option<i32>,
    doi: Option<&str>,
    preset: Preset,
) -> (Option<String>, KeyBasis) {
    let tay = |t: Option<&str>, a: Option<&str>, y: Option<i32>| match (t, a, y) {
        (Some(t), Some(a), Some(y)) => {
            (Some(format!("tay:{t}|{a}|{y}")), KeyBasis::TitleAuthorYear)
        }
        _ => (None, KeyBasis::None),
    };
    let ty = |t: Option<&str>, y: Option<i32>| match (t, y) {
        (Some(t), Some(y)) => (Some(format!("ty:{t}|{y}")), KeyBasis::TitleYear),
        _ => (None, KeyBasis::None),
    };

    match preset {
        Preset::DoiFirstStrict => match doi {
            Some(d) => (Some(format!("doi:{d}")), KeyBasis::Doi),
            None => tay(norm_title, norm_first_author, year),
        },
        Preset::DoiFirstMedium => match doi {
            Some(d) => (Some(format!("doi:{d}")), KeyBasis::Doi),
            None => ty(norm_title, year),
        },
        Preset::Strict => tay(norm_title, norm_first_author, year),
        Preset::Medium => ty(norm_title, year),
        Preset::Loose => match (norm_title, norm_first_author) {
            (Some(t), Some(a)) => (Some(format!("ta:{t}|{a}")), KeyBasis::TitleAuthor),
            _ => (None, KeyBasis::None),
        },
    }
}

/// Tiered dedup configuration.
///
/// Stored in the strategy's structured-config column. Controls which tiers
/// the dedup-mode cluster engine activates:
///
/// - Tier 1, exact identifiers: `use_doi`, `use_pmid`
/// - Tier 2, strong bibliographic: `use_title_year`, `use_title_author_year`
/// - Tier 3, probable (fuzzy): `use_fuzzy`, `fuzzy_threshold`,
///   `fuzzy_author_check` (require at least one shared author surname)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub use_doi: bool,
    pub use_pmid: bool,
    pub use_title_year: bool,
    pub use_title_author_year: bool,
    pub use_fuzzy: bool,
    pub fuzzy_threshold: f64,
    pub fuzzy_author_check: bool,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            use_doi: true,
            use_pmid: true,
            use_title_year: true,
            use_title_author_year: true,
            use_fuzzy: false,
            fuzzy_threshold: 0.85,
            fuzzy_author_check: true,
        }
    }
}

impl StrategyConfig {
    /// Maps a legacy preset onto a tier configuration. Unknown presets do
    /// not exist at the type level; this is total.
    #[must_use]
    pub fn from_preset(preset: Preset) -> Self {
        match preset {
            Preset::DoiFirstStrict => Self {
                use_title_year: false,
                ..Self::default()
            },
            Preset::DoiFirstMedium => Self {
                use_title_author_year: false,
                ..Self::default()
            },
            Preset::Strict => Self {
                use_doi: false,
                use_pmid: false,
                use_title_year: false,
                ..Self::default()
            },
            Preset::Medium => Self {
                use_doi: false,
                use_pmid: false,
                use_title_author_year: false,
                ..Self::default()
            },
            Preset::Loose => Self {
                use_doi: false,
                use_pmid: false,
                use_title_author_year: false,
                fuzzy_threshold: 0.80,
                fuzzy_author_check: false,
                ..Self::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doi_first_strict_prefers_doi() {
        let (key, basis) = compute_match_key(
            Some("some title"),
            Some("smith"),
            Some(2023),
            Some("10.1234/x"),
            Preset::DoiFirstStrict,
        );
        assert_eq!(key.as_deref(), Some("doi:10.1234/x"));
        assert_eq!(basis, KeyBasis::Doi);
    }

    #[test]
    fn doi_first_strict_falls_back_to_title_author_year() {
        let (key, basis) = compute_match_key(
            Some("some title"),
            Some("smith"),
            Some(2023),
            None,
            Preset::DoiFirstStrict,
        );
        assert_eq!(key.as_deref(), Some("tay:some title|smith|2023"));
        assert_eq!(basis, KeyBasis::TitleAuthorYear);
    }

    #[test]
    fn doi_first_strict_isolates_without_author() {
        let (key, basis) = compute_match_key(
            Some("some title"),
            None,
            Some(2023),
            None,
            Preset::DoiFirstStrict,
        );
        assert_eq!(key, None);
        assert_eq!(basis, KeyBasis::None);
    }

    #[test]
    fn doi_first_medium_falls_back_to_title_year() {
        let (key, basis) = compute_match_key(
            Some("some title"),
            None,
            Some(2023),
            None,
            Preset::DoiFirstMedium,
        );
        assert_eq!(key.as_deref(), Some("ty:some title|2023"));
        assert_eq!(basis, KeyBasis::TitleYear);
    }

    #[test]
    fn strict_ignores_doi() {
        let (key, basis) = compute_match_key(
            Some("t"),
            Some("a"),
            Some(2020),
            Some("10.1/x"),
            Preset::Strict,
        );
        assert_eq!(key.as_deref(), Some("tay:t|a|2020"));
        assert_eq!(basis, KeyBasis::TitleAuthorYear);
    }

    #[test]
    fn loose_needs_no_year() {
        let (key, basis) =
            compute_match_key(Some("t"), Some("a"), None, None, Preset::Loose);
        assert_eq!(key.as_deref(), Some("ta:t|a"));
        assert_eq!(basis, KeyBasis::TitleAuthor);
    }

    #[test]
    fn key_spaces_do_not_collide_across_bases() {
        // The same field content under different presets yields keys with
        // distinct prefixes.
        let (doi_key, _) =
            compute_match_key(None, None, None, Some("x"), Preset::DoiFirstStrict);
        let (ty_key, _) = compute_match_key(Some("x"), None, Some(2000), None, Preset::Medium);
        assert_ne!(doi_key, ty_key);
        assert!(doi_key.unwrap().starts_with("doi:"));
        assert!(ty_key.unwrap().starts_with("ty:"));
    }

    #[test]
    fn preset_config_mapping() {
        let strict = StrategyConfig::from_preset(Preset::DoiFirstStrict);
        assert!(strict.use_doi && strict.use_pmid);
        assert!(!strict.use_title_year && strict.use_title_author_year);
        assert!(!strict.use_fuzzy);

        let loose = StrategyConfig::from_preset(Preset::Loose);
        assert!(!loose.use_doi && !loose.use_pmid);
        assert!(loose.use_title_year);
        assert!((loose.fuzzy_threshold - 0.80).abs() < f64::EPSILON);
        assert!(!loose.fuzzy_author_check);
    }

    #[test]
    fn config_json_roundtrip_ignores_unknown_fields() {
        let json = r#"{"use_doi": false, "fuzzy_threshold": 0.9, "not_a_field": 1}"#;
        let config: StrategyConfig = serde_json::from_str(json).unwrap();
        assert!(!config.use_doi);
        assert!((config.fuzzy_threshold - 0.9).abs() < f64::EPSILON);
        // Unset fields take defaults.
        assert!(config.use_pmid);
    }
}
