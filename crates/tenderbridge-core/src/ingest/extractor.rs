use regex::Regex;

use super::document::{collapse_whitespace, Document};
use crate::record::FieldSource;
use crate::{Error, Result};

/// Layout strategies, tried in declaration order for each label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractionStrategy {
    /// Value sits in the label's next sibling.
    AdjacentSibling,
    /// Value sits in the next sibling of the label's parent.
    ParentSibling,
    /// First acceptable sibling after the label in its container.
    ContainerScan,
    /// Container text split at the label.
    SplitByLabel,
}

impl ExtractionStrategy {
    pub const ORDER: [Self; 4] = [
        Self::AdjacentSibling,
        Self::ParentSibling,
        Self::ContainerScan,
        Self::SplitByLabel,
    ];
}

impl From<ExtractionStrategy> for FieldSource {
    fn from(strategy: ExtractionStrategy) -> Self {
        match strategy {
            ExtractionStrategy::AdjacentSibling => Self::AdjacentSibling,
            ExtractionStrategy::ParentSibling => Self::ParentSibling,
            ExtractionStrategy::ContainerScan => Self::ContainerScan,
            ExtractionStrategy::SplitByLabel => Self::SplitByLabel,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionCandidate {
    pub value: String,
    pub strategy: ExtractionStrategy,
}

#[derive(Debug, Clone)]
struct CompiledLabel {
    folded: String,
    /// Label followed by a separator or the end of a line.
    split: Regex,
    /// Label anywhere in a text run.
    inline: Regex,
}

/// Ordered label alternatives for one field, compiled once.
#[derive(Debug, Clone)]
pub struct LabelSet {
    labels: Vec<CompiledLabel>,
}

impl LabelSet {
    pub fn compile<S: AsRef<str>>(labels: &[S]) -> Result<Self> {
        let labels = labels
            .iter()
            .map(AsRef::as_ref)
            .filter(|l| !l.trim().is_empty())
            .map(|label| -> Result<CompiledLabel> {
                let pattern = label_pattern(label);
                let split = format!(r"(?im){pattern}[ \t\u{{a0}}]*(?:[:\-–]|$)");
                let inline = format!("(?i){pattern}");

                Ok(CompiledLabel {
                    folded: fold(label),
                    split: Regex::new(&split).map_err(|e| Error::pattern(&split, e))?,
                    inline: Regex::new(&inline).map_err(|e| Error::pattern(&inline, e))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { labels })
    }
}

/// Locates the value attached to a caption in an arbitrary layout.
///
/// Knows every caption in use so that a split value can be cut where the
/// next caption starts.
#[derive(Debug, Clone)]
pub struct FieldExtractor {
    boundary: Option<Regex>,
}

impl FieldExtractor {
    pub fn new<S: AsRef<str>>(known_labels: &[S]) -> Result<Self> {
        let mut labels: Vec<&str> = known_labels
            .iter()
            .map(AsRef::as_ref)
            .filter(|l| !l.trim().is_empty())
            .collect();
        labels.sort_by_key(|l| std::cmp::Reverse(l.chars().count()));
        labels.dedup();

        if labels.is_empty() {
            return Ok(Self { boundary: None });
        }

        let alternatives = labels
            .iter()
            .map(|l| label_pattern(l))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = format!(r"(?i)(?:{alternatives})\s*:");
        let boundary = Regex::new(&pattern).map_err(|e| Error::pattern(&pattern, e))?;

        Ok(Self {
            boundary: Some(boundary),
        })
    }

    /// First value found under `root`, trying each label in order and, per
    /// label, each strategy in order.
    #[must_use]
    pub fn extract(
        &self,
        doc: &Document,
        root: usize,
        labels: &LabelSet,
    ) -> Option<ExtractionCandidate> {
        for label in &labels.labels {
            let anchors = find_anchors(doc, root, label);

            for strategy in ExtractionStrategy::ORDER {
                let value = match strategy {
                    ExtractionStrategy::AdjacentSibling => anchors
                        .iter()
                        .find_map(|&a| self.adjacent_sibling(doc, a, label)),
                    ExtractionStrategy::ParentSibling => anchors
                        .iter()
                        .find_map(|&a| self.parent_sibling(doc, root, a, label)),
                    ExtractionStrategy::ContainerScan => anchors
                        .iter()
                        .find_map(|&a| self.container_scan(doc, a, label)),
                    ExtractionStrategy::SplitByLabel => {
                        self.split_by_label(doc, root, &anchors, label)
                    }
                };

                if let Some(value) = value {
                    tracing::trace!("Matched '{}' via {:?}", value, strategy);
                    return Some(ExtractionCandidate { value, strategy });
                }
            }
        }

        None
    }

    fn adjacent_sibling(&self, doc: &Document, anchor: usize, label: &CompiledLabel) -> Option<String> {
        let sibling = next_content_sibling(doc, anchor)?;
        self.accept(&doc.text_of(sibling), label)
    }

    fn parent_sibling(
        &self,
        doc: &Document,
        root: usize,
        anchor: usize,
        label: &CompiledLabel,
    ) -> Option<String> {
        let parent = doc.parent(anchor).filter(|&p| p != root)?;
        let sibling = next_content_sibling(doc, parent)?;
        self.accept(&doc.text_of(sibling), label)
    }

    fn container_scan(&self, doc: &Document, anchor: usize, label: &CompiledLabel) -> Option<String> {
        doc.following_siblings(anchor)
            .filter(|&s| !doc.is_hidden(s))
            .find_map(|s| self.accept(&doc.text_of(s), label))
    }

    fn split_by_label(
        &self,
        doc: &Document,
        root: usize,
        anchors: &[usize],
        label: &CompiledLabel,
    ) -> Option<String> {
        let mut containers: Vec<usize> = if anchors.is_empty() {
            doc.text_nodes(root)
                .into_iter()
                .filter(|&i| doc.node(i).text().is_some_and(|t| label.inline.is_match(t)))
                .filter_map(|i| doc.parent(i))
                .collect()
        } else {
            anchors
                .iter()
                .map(|&a| doc.parent(a).unwrap_or(root))
                .collect()
        };
        containers.dedup();

        containers.into_iter().find_map(|container| {
            let block = doc.block_text(container);
            label.split.find_iter(&block).find_map(|m| {
                let rest = block[m.end()..].trim_start_matches(|c: char| {
                    c.is_whitespace() || matches!(c, ':' | '-' | '–')
                });
                let line = rest.split('\n').next().unwrap_or_default();
                self.accept(self.truncate_at_boundary(line), label)
            })
        })
    }

    fn truncate_at_boundary<'a>(&self, value: &'a str) -> &'a str {
        match self
            .boundary
            .as_ref()
            .and_then(|b| b.find_iter(value).find(|m| m.start() > 0))
        {
            Some(m) => &value[..m.start()],
            None => value,
        }
    }

    fn starts_with_label(&self, value: &str) -> bool {
        self.boundary
            .as_ref()
            .and_then(|b| b.find(value))
            .is_some_and(|m| m.start() == 0)
    }

    fn accept(&self, raw: &str, label: &CompiledLabel) -> Option<String> {
        let collapsed = collapse_whitespace(raw);
        let value = collapsed
            .trim_start_matches(|c: char| c == ':' || c.is_whitespace())
            .trim_end();

        if is_separator(value)
            || fold(strip_separators(value)) == label.folded
            || self.starts_with_label(value)
        {
            return None;
        }

        Some(value.to_string())
    }
}

/// Nodes whose whole text is the label, widened to the outermost element
/// that still holds nothing but the label.
fn find_anchors(doc: &Document, root: usize, label: &CompiledLabel) -> Vec<usize> {
    let mut anchors: Vec<usize> = Vec::new();

    for text_idx in doc.text_nodes(root) {
        let Some(text) = doc.node(text_idx).text() else {
            continue;
        };
        if fold(strip_separators(text)) != label.folded {
            continue;
        }

        let mut anchor = text_idx;
        while let Some(parent) = doc.parent(anchor) {
            if parent == root
                || !doc.node(parent).is_element()
                || fold(strip_separators(&doc.text_of(parent))) != label.folded
            {
                break;
            }
            anchor = parent;
        }

        if !anchors.contains(&anchor) {
            anchors.push(anchor);
        }
    }

    anchors
}

fn next_content_sibling(doc: &Document, idx: usize) -> Option<usize> {
    doc.following_siblings(idx).find(|&s| {
        let node = doc.node(s);
        (node.is_element() || node.text().is_some())
            && !doc.is_hidden(s)
            && !is_separator(&doc.text_of(s))
    })
}

/// Empty, or nothing but punctuation used between a label and its value.
fn is_separator(value: &str) -> bool {
    value
        .chars()
        .all(|c| c.is_whitespace() || matches!(c, ':' | '-' | '–' | '—' | '|' | '•'))
}

fn strip_separators(text: &str) -> &str {
    text.trim_matches(|c: char| c.is_whitespace() || matches!(c, ':' | '-' | '–'))
}

fn fold(text: &str) -> String {
    collapse_whitespace(text).to_lowercase().replace('’', "'")
}

/// Regex source for a label: whitespace runs are flexible, both apostrophe
/// forms match, and word boundaries guard alphanumeric edges.
fn label_pattern(label: &str) -> String {
    let label = label.trim();
    let mut pattern = String::new();

    if label.chars().next().is_some_and(char::is_alphanumeric) {
        pattern.push_str(r"\b");
    }

    let mut in_space = false;
    for c in label.chars() {
        if c.is_whitespace() {
            if !in_space {
                pattern.push_str(r"\s+");
            }
            in_space = true;
            continue;
        }
        in_space = false;

        if c == '\'' || c == '’' {
            pattern.push_str("['’]");
        } else {
            pattern.push_str(&regex::escape(&c.to_string()));
        }
    }

    if label.chars().last().is_some_and(char::is_alphanumeric) {
        pattern.push_str(r"\b");
    }

    pattern
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;

    fn extractor() -> FieldExtractor {
        FieldExtractor::new(&ExtractionConfig::default().known_labels()).unwrap()
    }

    fn run(html: &str, labels: &[&str]) -> Option<ExtractionCandidate> {
        let doc = Document::parse("u", html);
        let labels = LabelSet::compile(labels).unwrap();
        extractor().extract(&doc, Document::ROOT, &labels)
    }

    #[test]
    fn test_adjacent_sibling() {
        let found = run(
            "<div><span>Titulaire</span><span>ACME SAS</span></div>",
            &["Titulaire"],
        )
        .unwrap();

        assert_eq!(found.value, "ACME SAS");
        assert_eq!(found.strategy, ExtractionStrategy::AdjacentSibling);
    }

    #[test]
    fn test_adjacent_sibling_skips_separator() {
        let found = run(
            "<p><span>Nom officiel</span> : <span>Commune de Vernon</span></p>",
            &["Nom officiel"],
        )
        .unwrap();

        assert_eq!(found.value, "Commune de Vernon");
        assert_eq!(found.strategy, ExtractionStrategy::AdjacentSibling);
    }

    #[test]
    fn test_label_with_trailing_colon_climbs_wrapper() {
        let found = run(
            "<div><p><strong>Titulaire :</strong></p><p>ACME SAS</p></div>",
            &["Titulaire"],
        )
        .unwrap();

        assert_eq!(found.value, "ACME SAS");
        assert_eq!(found.strategy, ExtractionStrategy::AdjacentSibling);
    }

    #[test]
    fn test_adjacent_cell_with_block_children() {
        let found = run(
            "<table><tr><td>Titulaire</td><td><p>ACME SAS</p><p>12 rue X</p><p>75001 Paris</p></td></tr></table>",
            &["Titulaire"],
        )
        .unwrap();

        assert_eq!(found.value, "ACME SAS 12 rue X 75001 Paris");
        assert_eq!(found.strategy, ExtractionStrategy::AdjacentSibling);
    }

    #[test]
    fn test_parent_sibling() {
        let found = run(
            "<div><p><span>1.</span><span>Titulaire</span></p><p>ACME SAS</p></div>",
            &["Titulaire"],
        )
        .unwrap();

        assert_eq!(found.value, "ACME SAS");
        assert_eq!(found.strategy, ExtractionStrategy::ParentSibling);
    }

    #[test]
    fn test_container_scan() {
        let doc = Document::parse(
            "u",
            r#"<div id="r"><span>Titulaire</span><span>Adresse :</span><span>ACME SAS</span></div>"#,
        );
        let root = doc.element_with_id_containing("r").unwrap();
        let labels = LabelSet::compile(&["Titulaire"]).unwrap();

        let found = extractor().extract(&doc, root, &labels).unwrap();

        assert_eq!(found.value, "ACME SAS");
        assert_eq!(found.strategy, ExtractionStrategy::ContainerScan);
    }

    #[test]
    fn test_split_by_label_truncates_at_next_label() {
        let found = run(
            "<p>Titulaire : ACME SAS Adresse : 1 rue de la Paix</p>",
            &["Titulaire"],
        )
        .unwrap();

        assert_eq!(found.value, "ACME SAS");
        assert_eq!(found.strategy, ExtractionStrategy::SplitByLabel);
    }

    #[test]
    fn test_split_requires_separator_after_label() {
        assert!(run("<p>Hôtel de ville, 27200 Vernon</p>", &["Ville"]).is_none());
    }

    #[test]
    fn test_label_order_beats_document_order() {
        let html = "<div><span>Attributaire</span><span>First Corp</span></div>
                    <div><span>Titulaire</span><span>Second Corp</span></div>";

        let found = run(html, &["Titulaire", "Attributaire"]).unwrap();
        assert_eq!(found.value, "Second Corp");

        let found = run(html, &["Nom du titulaire", "Attributaire"]).unwrap();
        assert_eq!(found.value, "First Corp");
    }

    #[test]
    fn test_rejects_separator_only_and_label_echo() {
        assert!(run("<div><span>Titulaire</span><span>:</span></div>", &["Titulaire"]).is_none());
        assert!(run("<div><span>Titulaire</span><span>TITULAIRE</span></div>", &["Titulaire"]).is_none());
    }

    #[test]
    fn test_typographic_apostrophe() {
        let found = run(
            "<div><span>Nom de l’acheteur</span><span>Mairie de X</span></div>",
            &["Nom de l'acheteur"],
        )
        .unwrap();

        assert_eq!(found.value, "Mairie de X");
    }

    #[test]
    fn test_script_text_is_ignored() {
        let html = r#"<div><script>var a = "Titulaire"; var b = "Evil";</script></div>"#;
        assert!(run(html, &["Titulaire"]).is_none());
    }

    #[test]
    fn test_strategy_maps_to_source() {
        assert_eq!(
            FieldSource::from(ExtractionStrategy::SplitByLabel),
            FieldSource::SplitByLabel
        );
    }

    #[test]
    fn test_label_pattern_boundaries() {
        let re = Regex::new(&format!("(?i){}", label_pattern("Ville"))).unwrap();
        assert!(re.is_match("Ville : Rouen"));
        assert!(!re.is_match("Villeneuve"));

        let re = Regex::new(&format!("(?i){}", label_pattern("Montant (HT)"))).unwrap();
        assert!(re.is_match("Montant  (HT) : 12"));
    }
}
