use std::collections::BTreeMap;

use super::document::Document;
use crate::config::SectionScope;

const SECTION_CONTAINERS: &[&str] = &["div", "section"];

/// Sub-tree a lookup ran against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scope {
    pub root: usize,
    /// The named section was missing and the whole document was used.
    pub widened: bool,
}

impl Scope {
    #[must_use]
    pub fn document() -> Self {
        Self {
            root: Document::ROOT,
            widened: false,
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledScope {
    id: Option<String>,
    headings: Vec<String>,
}

/// Finds named sections (buyer, result, ...) inside a notice.
#[derive(Debug, Clone, Default)]
pub struct SectionLocator {
    scopes: BTreeMap<String, CompiledScope>,
}

impl SectionLocator {
    #[must_use]
    pub fn new(sections: &BTreeMap<String, SectionScope>) -> Self {
        let scopes = sections
            .iter()
            .map(|(name, scope)| {
                (
                    name.clone(),
                    CompiledScope {
                        id: scope.id.clone().filter(|id| !id.is_empty()),
                        headings: scope
                            .headings
                            .iter()
                            .map(|h| h.trim().to_lowercase())
                            .filter(|h| !h.is_empty())
                            .collect(),
                    },
                )
            })
            .collect();

        Self { scopes }
    }

    /// Element id match first, then the container of the first heading.
    #[must_use]
    pub fn find(&self, doc: &Document, name: &str) -> Option<usize> {
        let scope = self.scopes.get(name)?;

        if let Some(found) = scope
            .id
            .as_deref()
            .and_then(|id| doc.element_with_id_containing(id))
        {
            return Some(found);
        }

        if scope.headings.is_empty() {
            return None;
        }

        doc.text_nodes(Document::ROOT).into_iter().find_map(|i| {
            let text = doc.node(i).text()?.trim().to_lowercase();
            if scope.headings.iter().any(|h| text.starts_with(h.as_str())) {
                doc.enclosing(i, SECTION_CONTAINERS)
            } else {
                None
            }
        })
    }

    /// Scope for a field lookup. Unknown or missing sections widen to the
    /// whole document.
    #[must_use]
    pub fn resolve(&self, doc: &Document, name: Option<&str>) -> Scope {
        let Some(name) = name else {
            return Scope::document();
        };

        match self.find(doc, name) {
            Some(root) => Scope {
                root,
                widened: false,
            },
            None => {
                tracing::debug!("Section '{}' not found, widening to whole document", name);
                Scope {
                    root: Document::ROOT,
                    widened: true,
                }
            }
        }
    }
}
