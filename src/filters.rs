//! # Filters — Content Policy and Hostname Format Checks
//!
//! Pure classification of candidate domain names. A name is *clean* when no
//! policy term appears anywhere in its normalized form, and *valid* when it is
//! a single DNS label under `.com`.
//!
//! Normalization lower-cases the name, strips the `.com` suffix and removes
//! every remaining dot, so `Best-Casino.com` is checked as `best-casino`.
//!
//! The built-in list is a constant; callers add their own terms through the
//! `extra` argument. Adding a term can only turn a clean name dirty.

use regex::Regex;
use std::sync::LazyLock;

pub const ADULT_TERMS: &[&str] = &[
    "porn", "xxx", "sex", "nude", "naked", "mature", "milf", "tube", "cam", "escort", "fetish",
    "hentai", "erotic", "onlyfans", "stripper", "hookup", "booty", "busty",
];

pub const GAMBLING_TERMS: &[&str] = &[
    "casino", "bet", "poker", "slots", "jackpot", "gamble", "roulette", "blackjack", "lottery",
    "bingo", "wager", "sportbet", "betting", "1xbet", "stake",
];

pub const DRUG_TERMS: &[&str] = &[
    "weed", "cannabis", "marijuana", "drug", "pill", "pharma", "opioid", "cocaine", "meth",
    "heroin", "kratom", "cbd", "thc", "vape", "smoke", "tobacco",
];

pub const PROFANITY_EN: &[&str] = &[
    "fuck", "shit", "ass", "damn", "bitch", "crap", "dick", "cock", "cunt", "whore", "slut",
];

pub const PROFANITY_RU: &[&str] = &[
    "блят", "хуй", "пизд", "ебат", "сука", "мудак", "жоп", "дерьм", "шлюх",
];

pub const SPAM_PATTERNS: &[&str] = &[
    "buy-", "cheap-", "free-", "best-", "top-", "click", "deal", "discount", "promo",
];

/// Every built-in category, in the order they are checked.
pub const POLICY_LISTS: &[&[&str]] = &[
    ADULT_TERMS,
    GAMBLING_TERMS,
    DRUG_TERMS,
    PROFANITY_EN,
    PROFANITY_RU,
    SPAM_PATTERNS,
];

static COM_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.com$").expect("static regex")
});

/// Lower-case, drop the `.com` suffix, then remove every dot.
pub fn normalize(name: &str) -> String {
    name.to_lowercase().replace(".com", "").replace('.', "")
}

/// Returns the first policy term contained in `name`, if any.
pub fn matched_term(name: &str, extra: &[String]) -> Option<String> {
    let normalized = normalize(name);
    POLICY_LISTS
        .iter()
        .flat_map(|list| list.iter())
        .find(|term| normalized.contains(**term))
        .map(|term| term.to_string())
        .or_else(|| {
            extra
                .iter()
                .filter(|term| !term.is_empty())
                .find(|term| normalized.contains(&term.to_lowercase()))
                .cloned()
        })
}

/// True when no built-in or `extra` term is a substring of the normalized name.
pub fn is_clean(name: &str, extra: &[String]) -> bool {
    matched_term(name, extra).is_none()
}

/// True iff `name` is a single hostname label followed by `.com`.
pub fn is_valid_format(name: &str) -> bool {
    COM_LABEL.is_match(name)
}

/// Keep names that are valid and clean, preserving order. The format check
/// runs first because it is cheaper.
pub fn filter<S: AsRef<str>>(names: &[S], extra: &[String]) -> Vec<String> {
    names
        .iter()
        .map(AsRef::as_ref)
        .filter(|n| is_valid_format(n) && is_clean(n, extra))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_format_examples() {
        assert!(is_valid_format("abc-123.com"));
        assert!(is_valid_format("a.com"));
        assert!(is_valid_format("Example9.com"));
        assert!(!is_valid_format("-abc.com"));
        assert!(!is_valid_format("abc-.com"));
        assert!(!is_valid_format("abc"));
        assert!(!is_valid_format("abc.net"));
        assert!(!is_valid_format("sub.abc.com"));
        assert!(!is_valid_format(".com"));
    }

    #[test]
    fn label_length_limit_is_63() {
        let ok = format!("{}.com", "a".repeat(63));
        let too_long = format!("{}.com", "a".repeat(64));
        assert!(is_valid_format(&ok));
        assert!(!is_valid_format(&too_long));
    }

    #[test]
    fn clean_rejects_each_category() {
        for name in [
            "hotporn.com",
            "megacasino.com",
            "cbdstore.com",
            "holyshit.com",
            "сукаблят.com",
            "buy-shoes.com",
        ] {
            assert!(!is_clean(name, &[]), "{} should be dirty", name);
        }
    }

    #[test]
    fn clean_accepts_neutral_names() {
        for name in ["gardenplanner.com", "river-tools.com", "quietlibrary.com"] {
            assert!(is_clean(name, &[]), "{} should be clean", name);
        }
    }

    #[test]
    fn normalization_is_case_and_dot_insensitive() {
        assert!(!is_clean("BigCASINO.com", &[]));
        assert_eq!(normalize("My.Site.COM"), "mysite");
    }

    #[test]
    fn extra_terms_are_applied() {
        let extra = vec!["garden".to_string()];
        assert!(is_clean("gardenplanner.com", &[]));
        assert!(!is_clean("gardenplanner.com", &extra));
        assert_eq!(
            matched_term("gardenplanner.com", &extra).as_deref(),
            Some("garden")
        );
    }

    #[test]
    fn empty_extra_term_is_ignored() {
        let extra = vec![String::new()];
        assert!(is_clean("gardenplanner.com", &extra));
    }

    #[test]
    fn filter_checks_format_then_policy_and_keeps_order() {
        let names = [
            "zeta.com",
            "-bad.com",
            "pokerclub.com",
            "alpha.com",
            "nodot",
        ];
        assert_eq!(filter(&names, &[]), vec!["zeta.com", "alpha.com"]);
    }
}
