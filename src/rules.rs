use std::collections::BTreeMap;
use thiserror::Error;

const RULES_ASSET: &str = include_str!("../assets/rules.yaml");

#[derive(Debug, Error)]
pub enum RulesError {
    #[error("rules asset is not valid yaml: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("rules asset rejected: {0}")]
    Invalid(String),
}

/// Externally versioned matching data: the brand → namespace table, the
/// noise vocabularies, and the anti-bot signatures. Kept out of code so
/// the tables can grow without touching matching logic.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Rules {
    pub brands: BTreeMap<String, String>,
    pub concentrations: Vec<String>,
    pub marketing: Vec<String>,
    pub blocked_signatures: Vec<String>,
}

impl Rules {
    pub fn load() -> Result<Self, RulesError> {
        Self::from_str(RULES_ASSET)
    }

    pub fn from_str(raw: &str) -> Result<Self, RulesError> {
        let rules: Rules = serde_yaml::from_str(raw)?;
        rules.validate()?;
        Ok(rules)
    }

    /// Maps a price-list brand label to the remote namespace slug. Absence
    /// means the brand cannot be matched this run; it is a skip, not an
    /// error.
    pub fn resolve(&self, brand: &str) -> Option<&str> {
        self.brands
            .get(&brand.trim().to_lowercase())
            .map(String::as_str)
    }

    fn validate(&self) -> Result<(), RulesError> {
        if self.brands.is_empty() {
            return Err(RulesError::Invalid("brands table is empty".into()));
        }
        for (label, slug) in &self.brands {
            if label.trim().is_empty() || slug.trim().is_empty() {
                return Err(RulesError::Invalid(format!(
                    "blank brand mapping: {label:?} -> {slug:?}"
                )));
            }
            if label != &label.to_lowercase() {
                return Err(RulesError::Invalid(format!(
                    "brand label must be lowercase: {label:?}"
                )));
            }
        }
        for (name, list) in [
            ("concentrations", &self.concentrations),
            ("marketing", &self.marketing),
            ("blocked_signatures", &self.blocked_signatures),
        ] {
            if list.is_empty() {
                return Err(RulesError::Invalid(format!("{name} list is empty")));
            }
            if list.iter().any(|term| term.trim().is_empty()) {
                return Err(RulesError::Invalid(format!("{name} contains a blank term")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_asset_loads_and_validates() {
        let rules = Rules::load().expect("embedded rules");
        assert!(!rules.blocked_signatures.is_empty());
    }

    #[test]
    fn resolve_is_case_insensitive() {
        let rules = Rules::load().expect("embedded rules");
        assert_eq!(rules.resolve("Chanel"), Some("Chanel"));
        assert_eq!(rules.resolve("  CHANEL "), Some("Chanel"));
    }

    #[test]
    fn sub_lines_collapse_onto_the_parent_house() {
        let rules = Rules::load().expect("embedded rules");
        let direct = rules.resolve("Dior").expect("dior");
        let sub_line = rules.resolve("Miss Dior").expect("miss dior");
        assert_eq!(direct, sub_line);
    }

    #[test]
    fn unknown_brand_is_a_skip() {
        let rules = Rules::load().expect("embedded rules");
        assert_eq!(rules.resolve("Definitely Not A House"), None);
    }

    #[test]
    fn invalid_yaml_is_rejected() {
        assert!(Rules::from_str("brands: [not, a, map]").is_err());
    }

    #[test]
    fn uppercase_brand_labels_are_rejected() {
        let raw = r#"
brands:
  Chanel: Chanel
concentrations: [edp]
marketing: [tester]
blocked_signatures: [captcha]
"#;
        let err = Rules::from_str(raw).expect_err("should reject");
        assert!(matches!(err, RulesError::Invalid(_)));
    }

    #[test]
    fn empty_vocabulary_is_rejected() {
        let raw = r#"
brands:
  chanel: Chanel
concentrations: []
marketing: [tester]
blocked_signatures: [captcha]
"#;
        assert!(Rules::from_str(raw).is_err());
    }
}
