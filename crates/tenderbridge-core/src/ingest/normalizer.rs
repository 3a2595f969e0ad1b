//! Total parsers from notice text to typed values.
//!
//! Nothing here returns an error: text either yields a value or `None`.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static CURRENCY_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)euros?\s*\(s\)|euros?|eur\b|€|\bh\.?t\b\.?|\bttc\b")
        .unwrap()
});

static DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(\d{1,2})/(\d{1,2})/(\d{4}|\d{2})\b(?:\s*(?:à|a)?\s*(\d{1,2})\s*[:h]\s*(\d{2}))?",
    )
    .unwrap()
});

static CPV_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{8})(?:-\d)?$").unwrap());

static SECTION_AMOUNTS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)Montant\s*(?:HT|TTC)?\s*[:\s]*\s*(\d[\d \u{a0}\u{202f}.]*(?:,\d+)?)\s*(?:EUR|euros?|€)",
        r"(?i)Valeur\s*(?:totale)?\s*[:\s]*\s*(\d[\d \u{a0}\u{202f}.]*(?:,\d+)?)\s*(?:EUR|euros?|€)",
        r"(?i)(\d[\d \u{a0}\u{202f}.]*(?:,\d+)?)\s*(?:EUR|euros?|€)",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static POSTAL_CITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\d{5}[ \t\u{a0}]+([A-Za-zÀ-ÿ][A-Za-zÀ-ÿ' \-]*)")
        .unwrap()
});

static ORG_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:la\s+soci[ée]t[ée]|l['’]entreprise|la\s+sarl|la\s+sas)\s+")
        .unwrap()
});

/// Parse a monetary amount written in French notation.
///
/// `"1 234,56 EUR"` gives `1234.56`. Anything left over that is not part of a
/// number makes the whole amount `None`.
#[must_use]
pub fn parse_amount(text: &str) -> Option<f64> {
    let stripped = CURRENCY_MARKERS.replace_all(text, "");
    let compact: String = stripped
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\'' && *c != '’')
        .collect();

    if compact.is_empty() || !compact.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',') {
        return None;
    }

    let canonical = canonical_decimal(&compact)?;
    canonical.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn canonical_decimal(s: &str) -> Option<String> {
    let commas = s.matches(',').count();
    let dots = s.matches('.').count();

    let out = match (commas, dots) {
        (0, 0) => s.to_string(),
        // both present: the last one is the decimal separator
        (_, _) if commas > 0 && dots > 0 => {
            let last_comma = s.rfind(',')?;
            let last_dot = s.rfind('.')?;
            let (thousands, decimal) = if last_comma > last_dot {
                ('.', ',')
            } else {
                (',', '.')
            };
            if s.matches(decimal).count() > 1 {
                return None;
            }
            s.replace(thousands, "").replace(decimal, ".")
        }
        (1, 0) => s.replace(',', "."),
        (_, 0) => grouped_thousands(s, ',')?,
        (0, 1) => {
            let frac = s.len() - s.rfind('.')? - 1;
            if frac == 3 {
                s.replace('.', "")
            } else {
                s.to_string()
            }
        }
        (0, _) => grouped_thousands(s, '.')?,
        _ => return None,
    };

    if out.starts_with('.') || out.ends_with('.') || out.is_empty() {
        return None;
    }
    Some(out)
}

fn grouped_thousands(s: &str, sep: char) -> Option<String> {
    let mut groups = s.split(sep);
    let head = groups.next()?;
    if head.is_empty() || head.len() > 3 {
        return None;
    }
    let mut out = head.to_string();
    for group in groups {
        if group.len() != 3 {
            return None;
        }
        out.push_str(group);
    }
    Some(out)
}

/// Parse `dd/mm/yyyy` or `dd/mm/yy` with an optional time.
#[must_use]
pub fn parse_date(text: &str) -> Option<NaiveDateTime> {
    let century = Utc::now().year() / 100 * 100;
    parse_date_in_century(text, century)
}

/// Like [`parse_date`] with an explicit century for two-digit years.
#[must_use]
pub fn parse_date_in_century(text: &str, century: i32) -> Option<NaiveDateTime> {
    let caps = DATE.captures(text)?;

    let day: u32 = caps.get(1)?.as_str().parse().ok()?;
    let month: u32 = caps.get(2)?.as_str().parse().ok()?;
    let year_str = caps.get(3)?.as_str();
    let mut year: i32 = year_str.parse().ok()?;
    if year_str.len() == 2 {
        year += century;
    }

    let date = NaiveDate::from_ymd_opt(year, month, day)?;

    // An unusable time keeps the date at midnight.
    let time = match (caps.get(4), caps.get(5)) {
        (Some(h), Some(m)) => h
            .as_str()
            .parse()
            .ok()
            .zip(m.as_str().parse().ok())
            .and_then(|(hour, minute)| date.and_hms_opt(hour, minute, 0)),
        _ => None,
    };

    time.or_else(|| date.and_hms_opt(0, 0, 0))
}

/// Reduce a classification code to its eight digits, dropping a check digit.
#[must_use]
pub fn normalize_cpv_code(text: &str) -> Option<String> {
    let trimmed = text.trim();
    CPV_CODE
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Normalize a list of codes, keep whitelisted divisions, drop duplicates.
#[must_use]
pub fn normalize_cpv_codes<S: AsRef<str>>(
    codes: &[S],
    valid_divisions: &[String],
    max_codes: usize,
) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for code in codes.iter().filter_map(|c| normalize_cpv_code(c.as_ref())) {
        if out.len() >= max_codes {
            break;
        }
        if valid_divisions.iter().any(|d| code.starts_with(d.as_str())) && !out.contains(&code) {
            out.push(code);
        }
    }
    out
}

/// Collapse runs of whitespace and trim. Empty text becomes `None`.
#[must_use]
pub fn clean_text(text: &str) -> Option<String> {
    let out = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Strip the article-and-form prefixes notices put in front of company names.
#[must_use]
pub fn clean_organization_name(text: &str) -> Option<String> {
    let cleaned = clean_text(text)?;
    let without_prefix = ORG_PREFIX.replace(&cleaned, "");
    let trimmed = without_prefix.trim_end_matches(|c: char| c == '-' || c == ',' || c.is_whitespace());
    clean_text(trimmed)
}

/// Drop a leading postal code and trailing dashes from a city.
#[must_use]
pub fn clean_city(text: &str) -> Option<String> {
    let cleaned = clean_text(text)?;
    let without_code = cleaned
        .trim_start_matches(|c: char| c.is_ascii_digit())
        .trim_start();
    let trimmed = without_code.trim_matches(|c: char| c == '-' || c == ',' || c.is_whitespace());
    clean_text(trimmed)
}

/// Find an amount in free text, trying the labelled forms first.
#[must_use]
pub fn find_amount_in_text(text: &str) -> Option<f64> {
    SECTION_AMOUNTS.iter().find_map(|pattern| {
        pattern
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .find_map(|m| parse_amount(m.as_str()))
    })
}

/// City following the first five-digit postal code in `text`.
#[must_use]
pub fn find_postal_city(text: &str) -> Option<String> {
    let caps = POSTAL_CITY.captures(text)?;
    clean_city(caps.get(1)?.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount_french() {
        assert_eq!(parse_amount("1 234,56 EUR"), Some(1234.56));
        assert_eq!(parse_amount("1\u{a0}234\u{a0}567 €"), Some(1_234_567.0));
        assert_eq!(parse_amount("45 000,00 euros HT"), Some(45000.0));
        assert_eq!(parse_amount("1.234.567,89"), Some(1_234_567.89));
        assert_eq!(parse_amount("12.50"), Some(12.5));
        assert_eq!(parse_amount("1.500"), Some(1500.0));
        assert_eq!(parse_amount("250000"), Some(250_000.0));
    }

    #[test]
    fn test_parse_amount_rejects_residue() {
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("   "), None);
        assert_eq!(parse_amount("environ 12 000"), None);
        assert_eq!(parse_amount("NaN"), None);
        assert_eq!(parse_amount("1,2,3"), None);
        assert_eq!(parse_amount(","), None);
    }

    #[test]
    fn test_parse_date_formats() {
        let full = parse_date("15/03/2024").unwrap();
        assert_eq!(full.date(), NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());

        let short = parse_date_in_century("15/03/24", 2000).unwrap();
        assert_eq!(short, full);

        let timed = parse_date("Date d'envoi : 15/03/2024 à 14:30").unwrap();
        assert_eq!(
            timed,
            NaiveDate::from_ymd_opt(2024, 3, 15)
                .unwrap()
                .and_hms_opt(14, 30, 0)
                .unwrap()
        );

        let french = parse_date("01/02/2024 10h05").unwrap();
        assert_eq!(french.format("%H:%M").to_string(), "10:05");
    }

    #[test]
    fn test_parse_date_current_century() {
        let short = parse_date("15/03/24").unwrap();
        assert_eq!(short.year() % 100, 24);
        assert_eq!(short.year() / 100, Utc::now().year() / 100);
    }

    #[test]
    fn test_parse_date_bad_time_keeps_date() {
        let date = parse_date("15/03/2024 25:00").unwrap();
        assert_eq!(date.to_string(), "2024-03-15 00:00:00");

        let date = parse_date("15/03/2024 à 10h75").unwrap();
        assert_eq!(date.to_string(), "2024-03-15 00:00:00");
    }

    #[test]
    fn test_parse_date_rejects() {
        assert_eq!(parse_date("15-03-2024"), None);
        assert_eq!(parse_date("31/02/2024"), None);
        assert_eq!(parse_date("not a date"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn test_cpv_code_normalization() {
        assert_eq!(normalize_cpv_code("45233000"), Some("45233000".into()));
        assert_eq!(normalize_cpv_code(" 45233000-7 "), Some("45233000".into()));
        assert_eq!(normalize_cpv_code("4523300"), None);
        assert_eq!(normalize_cpv_code("CPV 45233000"), None);
    }

    #[test]
    fn test_cpv_codes_whitelist_and_dedup() {
        let divisions = vec!["45".to_string(), "71".to_string()];
        let codes = normalize_cpv_codes(
            &["45233000-7", "12345678", "71000000", "45233000", "bogus"],
            &divisions,
            10,
        );
        assert_eq!(codes, vec!["45233000", "71000000"]);
    }

    #[test]
    fn test_clean_organization_name() {
        assert_eq!(
            clean_organization_name("La société  Dupont Travaux -"),
            Some("Dupont Travaux".into())
        );
        assert_eq!(
            clean_organization_name("L'entreprise ACME,"),
            Some("ACME".into())
        );
        assert_eq!(clean_organization_name(" \n "), None);
    }

    #[test]
    fn test_clean_city() {
        assert_eq!(clean_city("27200 Vernon -"), Some("Vernon".into()));
        assert_eq!(clean_city("Rouen"), Some("Rouen".into()));
        assert_eq!(clean_city("--"), None);
    }

    #[test]
    fn test_find_amount_in_text() {
        let text = "Lot 1\nMontant HT : 125 000,00 EUR\nDurée 12 mois";
        assert_eq!(find_amount_in_text(text), Some(125_000.0));
        assert_eq!(find_amount_in_text("Valeur totale: 9 999 euros"), Some(9999.0));
        assert_eq!(find_amount_in_text("no money here"), None);
    }

    #[test]
    fn test_find_postal_city() {
        let text = "Hôtel de ville\n12 rue Carnot\n27200 Vernon\nFrance";
        assert_eq!(find_postal_city(text), Some("Vernon".into()));
    }
}
