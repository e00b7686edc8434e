use crate::models::LocalProduct;
use crate::rules::Rules;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

static VOLUME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\d+\.?\d*\s*oz\.?").expect("volume pattern"));
static GENDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bfor\s+(men|women|woman|unisex)\b").expect("gender pattern"));
static TESTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\btester\b").expect("tester pattern"));
static GIFT_SET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bgift\s+set\b").expect("gift set pattern"));
// Lenient on purpose: PDF extraction mangles the fi ligature in "Refillable".
static REFILLABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bre\s*f+il+able\b").expect("refillable pattern"));
static PIECE_COUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b\d+\s*(piece|pc|pcs?)\b").expect("piece count pattern"));
static LONG_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[a-z]?\d{10,}\b").expect("long code pattern"));
static TRAILING_PRICE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d+\.\d+$").expect("trailing price pattern"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern"));
static MATCH_STRIP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9 ]+").expect("match strip pattern"));

const MIN_KEY_CHARS: usize = 3;

/// Derives grouping and matching keys from raw product labels. The noise
/// vocabularies come from the rules asset; the structural patterns above
/// are fixed.
pub struct Normalizer {
    concentration: Regex,
    matching_noise: Regex,
}

impl Normalizer {
    pub fn new(rules: &Rules) -> Result<Self, regex::Error> {
        let concentration = vocabulary_pattern(rules.concentrations.iter())?;
        let matching_noise =
            vocabulary_pattern(rules.marketing.iter().chain(rules.concentrations.iter()))?;
        Ok(Self {
            concentration,
            matching_noise,
        })
    }

    /// Canonical dedup key for one real-world product: the raw label with
    /// sizes, concentrations, gender phrases, packaging markers, UPC-like
    /// codes and trailing price fragments stripped. Returns `None` when
    /// the remainder is too short to identify anything.
    pub fn group_key(&self, raw: &str) -> Option<String> {
        let mut q = VOLUME.replace_all(raw, "").into_owned();
        q = self.concentration.replace_all(&q, "").into_owned();
        q = GENDER.replace_all(&q, "").into_owned();
        q = TESTER.replace_all(&q, "").into_owned();
        q = GIFT_SET.replace_all(&q, "").into_owned();
        q = REFILLABLE.replace_all(&q, "").into_owned();
        q = PIECE_COUNT.replace_all(&q, "").into_owned();
        q = LONG_CODE.replace_all(&q, "").into_owned();
        q = TRAILING_PRICE.replace_all(&q, "").into_owned();
        let collapsed = WHITESPACE.replace_all(&q, " ");
        let key = collapsed.trim().trim_matches('.').trim();
        if key.chars().count() < MIN_KEY_CHARS {
            None
        } else {
            Some(key.to_string())
        }
    }

    /// Secondary key used for fuzzy scoring: lowercase, noise vocabulary
    /// and non-alphanumerics removed, whitespace collapsed.
    pub fn matching_key(&self, text: &str) -> String {
        let lower = text.to_lowercase();
        let stripped = self.matching_noise.replace_all(&lower, " ");
        let stripped = MATCH_STRIP.replace_all(&stripped, "");
        WHITESPACE.replace_all(&stripped, " ").trim().to_string()
    }
}

fn vocabulary_pattern<'a>(terms: impl Iterator<Item = &'a String>) -> Result<Regex, regex::Error> {
    let mut escaped: Vec<String> = terms.map(|term| regex::escape(term.trim())).collect();
    // Longest alternatives first so "eau de parfum" wins over "parfum".
    escaped.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    escaped.dedup();
    Regex::new(&format!(r"(?i)\b({})\b", escaped.join("|")))
}

/// Groups products by their group key so one lookup serves every row of
/// the same fragrance. Gift sets and too-short keys are skipped. The
/// BTreeMap keeps processing order deterministic across runs.
pub fn group_products(
    products: &[LocalProduct],
    normalizer: &Normalizer,
) -> BTreeMap<String, Vec<usize>> {
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (idx, product) in products.iter().enumerate() {
        if product.is_gift_set {
            continue;
        }
        let Some(key) = normalizer.group_key(&product.raw_name) else {
            continue;
        };
        groups.entry(key).or_default().push(idx);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Rules;

    fn normalizer() -> Normalizer {
        let rules = Rules::load().expect("embedded rules");
        Normalizer::new(&rules).expect("normalizer")
    }

    fn product(raw_name: &str, is_gift_set: bool) -> LocalProduct {
        LocalProduct {
            id: "p".into(),
            raw_name: raw_name.into(),
            brand: "Chanel".into(),
            name: raw_name.into(),
            size: None,
            fragrance_type: None,
            gender: "unisex".into(),
            price: None,
            upc: String::new(),
            is_gift_set,
            is_tester: false,
            image_url: None,
            has_image: false,
        }
    }

    #[test]
    fn group_key_strips_packaging_noise() {
        let n = normalizer();
        let key = n
            .group_key("Chanel No. 5 EDP 3.4 oz for Women 012345678901 59.99")
            .expect("key");
        assert_eq!(key, "Chanel No. 5");
    }

    #[test]
    fn group_key_strips_gift_set_and_piece_count() {
        let n = normalizer();
        let key = n
            .group_key("Versace Eros 3 Piece Gift Set for Men")
            .expect("key");
        assert_eq!(key, "Versace Eros");
    }

    #[test]
    fn group_key_handles_ligature_damaged_refillable() {
        let n = normalizer();
        let key = n.group_key("Le Male Re fillable EDT 4.2 oz").expect("key");
        assert_eq!(key, "Le Male");
    }

    #[test]
    fn group_key_is_idempotent() {
        let n = normalizer();
        for raw in [
            "Chanel No. 5 EDP 3.4 oz for Women 012345678901 59.99",
            "Versace Eros 3 Piece Gift Set for Men",
            "Acqua Di Gio Eau De Toilette 2.5 oz TESTER",
            "Dior Homme Intense .",
            "La Vie Est Belle 1.7 oz",
        ] {
            let Some(once) = n.group_key(raw) else {
                continue;
            };
            let twice = n.group_key(&once).expect("stable key");
            assert_eq!(once, twice, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn group_key_rejects_short_remainders() {
        let n = normalizer();
        assert_eq!(n.group_key("CK 1 oz EDT"), None);
        assert_eq!(n.group_key(""), None);
    }

    #[test]
    fn matching_key_drops_punctuation_and_noise() {
        let n = normalizer();
        assert_eq!(n.matching_key("Chanel No. 5"), "chanel no 5");
        assert_eq!(n.matching_key("Chanel No. 5 L'Eau"), "chanel no 5 leau");
        assert_eq!(n.matching_key("Eros Eau De Toilette Spray"), "eros");
    }

    #[test]
    fn grouping_shares_a_key_and_skips_gift_sets() {
        let n = normalizer();
        let products = vec![
            product("Chanel No. 5 EDP 3.4 oz", false),
            product("Chanel No. 5 EDT 1.7 oz", false),
            product("Chanel No. 5 2 Piece Gift Set", true),
        ];
        let groups = group_products(&products, &n);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups["Chanel No. 5"], vec![0, 1]);
    }
}
