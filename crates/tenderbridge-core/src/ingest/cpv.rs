use once_cell::sync::Lazy;
use regex::Regex;

use super::document::Document;
use super::normalizer::normalize_cpv_code;
use super::section::SectionLocator;
use crate::config::CpvConfig;
use crate::record::{FieldSource, Sourced};
use crate::{Error, Result};

static CODE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{8})(?:-\d)?\b").unwrap());

/// Gathers classification codes with three methods, in fixed order: text
/// near a label, the raw markup, then a digit scan of configured sections.
#[derive(Debug, Clone)]
pub struct CpvCodeExtractor {
    markers: Vec<String>,
    raw_pattern: Option<Regex>,
    sections: Vec<String>,
    window: usize,
    valid_divisions: Vec<String>,
    max_codes: usize,
}

impl CpvCodeExtractor {
    pub fn from_config(config: &CpvConfig) -> Result<Self> {
        let markers: Vec<String> = config
            .markers
            .iter()
            .map(|m| m.trim().to_lowercase())
            .filter(|m| !m.is_empty())
            .collect();

        let raw_pattern = if markers.is_empty() {
            None
        } else {
            let alternatives = markers
                .iter()
                .map(|m| regex::escape(m))
                .collect::<Vec<_>>()
                .join("|");
            let pattern =
                format!(r"(?i)\b(?:{alternatives})\b(?:[^0-9<]|<[^>]*>){{0,80}}?(\d{{8}})(?:-\d)?\b");
            Some(Regex::new(&pattern).map_err(|e| Error::pattern(&pattern, e))?)
        };

        Ok(Self {
            markers,
            raw_pattern,
            sections: config.sections.clone(),
            window: config.window,
            valid_divisions: config.valid_divisions.clone(),
            max_codes: config.max_codes,
        })
    }

    /// Whitelisted, deduplicated codes in discovery order. The source is the
    /// method that found the first code.
    #[must_use]
    pub fn extract(&self, doc: &Document, locator: &SectionLocator) -> Option<Sourced<Vec<String>>> {
        let mut found: Vec<(String, FieldSource)> = Vec::new();
        found.extend(self.label_adjacent(doc).into_iter().map(|c| (c, FieldSource::LabelAdjacent)));
        found.extend(self.raw_markup(doc).into_iter().map(|c| (c, FieldSource::RawPattern)));
        found.extend(
            self.section_digits(doc, locator)
                .into_iter()
                .map(|c| (c, FieldSource::SectionDigits)),
        );

        let mut codes: Vec<String> = Vec::new();
        let mut primary = None;

        for (raw, source) in found {
            if codes.len() >= self.max_codes {
                break;
            }
            let Some(code) = normalize_cpv_code(&raw) else {
                continue;
            };
            if !self.is_valid_division(&code) || codes.contains(&code) {
                continue;
            }
            primary.get_or_insert(source);
            codes.push(code);
        }

        let source = primary?;
        tracing::debug!("Found {} classification codes, primary via {}", codes.len(), source);
        Some(Sourced::new(codes, source))
    }

    fn is_valid_division(&self, code: &str) -> bool {
        self.valid_divisions.iter().any(|d| code.starts_with(d.as_str()))
    }

    fn label_adjacent(&self, doc: &Document) -> Vec<String> {
        if self.markers.is_empty() {
            return Vec::new();
        }

        let text_nodes = doc.text_nodes(Document::ROOT);
        let mut codes = Vec::new();

        for (pos, &idx) in text_nodes.iter().enumerate() {
            let Some(text) = doc.node(idx).text() else {
                continue;
            };
            let lower = text.to_lowercase();
            let Some(at) = self.markers.iter().filter_map(|m| lower.find(m.as_str()).map(|i| i + m.len())).min() else {
                continue;
            };

            codes.extend(scan_codes(&lower[at..]));

            for &next in text_nodes.iter().skip(pos + 1).take(self.window) {
                if let Some(t) = doc.node(next).text() {
                    codes.extend(scan_codes(t));
                }
            }
        }

        codes
    }

    fn raw_markup(&self, doc: &Document) -> Vec<String> {
        self.raw_pattern.as_ref().map_or_else(Vec::new, |pattern| {
            pattern
                .captures_iter(doc.raw())
                .filter_map(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .collect()
        })
    }

    fn section_digits(&self, doc: &Document, locator: &SectionLocator) -> Vec<String> {
        self.sections
            .iter()
            .filter_map(|name| locator.find(doc, name))
            .flat_map(|root| scan_codes(&doc.block_text(root)))
            .collect()
    }
}

fn scan_codes(text: &str) -> Vec<String> {
    CODE_TOKEN
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;

    fn extract(html: &str) -> Option<Sourced<Vec<String>>> {
        let config = ExtractionConfig::default();
        let extractor = CpvCodeExtractor::from_config(&config.cpv).unwrap();
        let locator = SectionLocator::new(&config.sections);
        extractor.extract(&Document::parse("u", html), &locator)
    }

    #[test]
    fn test_label_adjacent_codes() {
        let found = extract(
            "<div><span>Code CPV principal</span><span>:</span><span>72413000-8</span></div>",
        )
        .unwrap();

        assert_eq!(found.value, vec!["72413000"]);
        assert_eq!(found.source, FieldSource::LabelAdjacent);
    }

    #[test]
    fn test_raw_pattern_reaches_inline_script() {
        let found = extract("<p>CP<b>V</b></p><script>var cpv = '45233000';</script>").unwrap();

        assert_eq!(found.value, vec!["45233000"]);
        assert_eq!(found.source, FieldSource::RawPattern);
    }

    #[test]
    fn test_section_digit_scan() {
        let found = extract(
            r#"<div id="section_2"><p>Objet : travaux</p><p>45233000 et 45000000</p></div>"#,
        )
        .unwrap();

        assert_eq!(found.value, vec!["45233000", "45000000"]);
        assert_eq!(found.source, FieldSource::SectionDigits);
    }

    #[test]
    fn test_whitelist_dedupe_and_order() {
        let found = extract(
            r#"<div id="section_2">
                <p>CPV : 45233000</p>
                <p>CPV : 12345678</p>
                <p>Codes : 45233000 71000000</p>
            </div>"#,
        )
        .unwrap();

        assert_eq!(found.value, vec!["45233000", "71000000"]);
        assert_eq!(found.source, FieldSource::LabelAdjacent);
    }

    #[test]
    fn test_cap_on_code_count() {
        let codes: String = (0..15).map(|i| format!("<li>{}</li>", 45_000_000 + i)).collect();
        let html = format!(r#"<div id="section_2"><ul>{codes}</ul></div>"#);

        let found = extract(&html).unwrap();
        assert_eq!(found.value.len(), 10);
        assert_eq!(found.value[0], "45000000");
    }

    #[test]
    fn test_no_codes() {
        assert!(extract("<p>Pas de code ici, tel 0232000000</p>").is_none());
    }
}
