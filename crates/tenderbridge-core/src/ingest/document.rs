use std::collections::HashMap;

use scraper::{Html, Node, Selector};

/// Elements whose text never counts as notice content.
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Elements that start a new run of text.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "blockquote", "dd", "div", "dl", "dt", "h1", "h2", "h3", "h4", "h5",
    "h6", "li", "ol", "p", "section", "table", "tbody", "td", "th", "thead", "tr", "ul",
];

/// Page furniture dropped from the text handed to a suggestion provider.
const CHROME_ELEMENTS: &[&str] = &["nav", "footer", "header"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Element { name: String, id: Option<String> },
    Text(String),
    Other,
}

#[derive(Debug, Clone)]
pub struct DomNode {
    pub kind: NodeKind,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// One past the last descendant; nodes are stored in document order.
    end: usize,
}

impl DomNode {
    #[must_use]
    pub fn element_name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    #[must_use]
    pub fn element_id(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Element { id, .. } => id.as_deref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Text(t) => Some(t),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_element(&self) -> bool {
        matches!(self.kind, NodeKind::Element { .. })
    }
}

/// One parsed notice. Immutable once built.
///
/// Nodes are flattened into a vector in document order, so every traversal
/// here is deterministic and index based.
pub struct Document {
    source_url: String,
    raw: String,
    html: Html,
    nodes: Vec<DomNode>,
}

impl Document {
    pub const ROOT: usize = 0;

    #[must_use]
    pub fn parse(source_url: impl Into<String>, raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let html = Html::parse_document(&raw);
        let nodes = flatten(&html);

        Self {
            source_url: source_url.into(),
            raw,
            html,
            nodes,
        }
    }

    #[must_use]
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn node(&self, idx: usize) -> &DomNode {
        &self.nodes[idx]
    }

    /// Descendants of `idx` in document order, excluding `idx` itself.
    pub fn descendants(&self, idx: usize) -> impl Iterator<Item = usize> {
        (idx + 1)..self.nodes[idx].end
    }

    #[must_use]
    pub fn contains(&self, ancestor: usize, idx: usize) -> bool {
        idx > ancestor && idx < self.nodes[ancestor].end
    }

    #[must_use]
    pub fn parent(&self, idx: usize) -> Option<usize> {
        self.nodes[idx].parent
    }

    /// Siblings after `idx`, nearest first.
    pub fn following_siblings(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        let siblings: &[usize] = self
            .parent(idx)
            .map_or(&[], |p| self.nodes[p].children.as_slice());
        let pos = siblings.iter().position(|&s| s == idx).map_or(siblings.len(), |p| p + 1);
        siblings[pos..].iter().copied()
    }

    /// Whether the node sits inside an element whose text is never content.
    #[must_use]
    pub fn is_hidden(&self, idx: usize) -> bool {
        self.is_inside(idx, HIDDEN_ELEMENTS)
    }

    fn is_inside(&self, idx: usize, names: &[&str]) -> bool {
        let mut current = Some(idx);
        while let Some(i) = current {
            if self.nodes[i]
                .element_name()
                .is_some_and(|n| names.contains(&n))
            {
                return true;
            }
            current = self.nodes[i].parent;
        }
        false
    }

    /// Visible, non-blank text nodes under `idx` in document order.
    #[must_use]
    pub fn text_nodes(&self, idx: usize) -> Vec<usize> {
        self.visible_text_nodes(idx)
            .filter(|&i| self.nodes[i].text().is_some_and(|t| !t.trim().is_empty()))
            .collect()
    }

    fn visible_text_nodes(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        let own = self.nodes[idx].text().map(|_| idx);
        own.into_iter()
            .chain(self.descendants(idx))
            .filter(|&i| self.nodes[i].text().is_some() && !self.is_hidden(i))
    }

    /// Text of a node with whitespace collapsed. Runs in different block
    /// elements, or split by `<br>`, are separated by a space.
    #[must_use]
    pub fn text_of(&self, idx: usize) -> String {
        let mut joined = String::new();
        let mut last_block: Option<Option<usize>> = None;

        for i in std::iter::once(idx).chain(self.descendants(idx)) {
            if self.is_hidden(i) {
                continue;
            }
            match &self.nodes[i].kind {
                NodeKind::Element { name, .. } if name == "br" => joined.push(' '),
                NodeKind::Text(text) => {
                    let block = self.enclosing(i, BLOCK_ELEMENTS);
                    if last_block.is_some_and(|b| b != block) {
                        joined.push(' ');
                    }
                    joined.push_str(text);
                    last_block = Some(block);
                }
                _ => {}
            }
        }

        collapse_whitespace(&joined)
    }

    /// Text of a node with one trimmed line per text node.
    #[must_use]
    pub fn block_text(&self, idx: usize) -> String {
        self.text_nodes(idx)
            .into_iter()
            .filter_map(|i| self.nodes[i].text())
            .map(collapse_whitespace)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// First element, in document order, whose `id` contains `fragment`.
    #[must_use]
    pub fn element_with_id_containing(&self, fragment: &str) -> Option<usize> {
        (0..self.nodes.len()).find(|&i| {
            self.nodes[i]
                .element_id()
                .is_some_and(|id| id.contains(fragment))
        })
    }

    /// Nearest ancestor element (excluding `idx`) with one of `names`.
    #[must_use]
    pub fn enclosing(&self, idx: usize, names: &[&str]) -> Option<usize> {
        let mut current = self.nodes[idx].parent;
        while let Some(i) = current {
            if self.nodes[i]
                .element_name()
                .is_some_and(|n| names.contains(&n))
            {
                return Some(i);
            }
            current = self.nodes[i].parent;
        }
        None
    }

    /// Collapsed text of the first element matching `selector`.
    #[must_use]
    pub fn select_text(&self, selector: &Selector) -> Option<String> {
        self.html
            .select(selector)
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .find(|t| !t.is_empty())
    }

    /// All texts matching `selector`, in document order.
    #[must_use]
    pub fn select_texts(&self, selector: &Selector) -> Vec<String> {
        self.html
            .select(selector)
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// Page text without scripts and navigation, newline separated, capped
    /// at `max_chars` characters.
    #[must_use]
    pub fn visible_text(&self, max_chars: usize) -> String {
        let text = self
            .text_nodes(Self::ROOT)
            .into_iter()
            .filter(|&i| !self.is_inside(i, CHROME_ELEMENTS))
            .filter_map(|i| self.nodes[i].text())
            .map(collapse_whitespace)
            .collect::<Vec<_>>()
            .join("\n");

        match text.char_indices().nth(max_chars) {
            Some((cut, _)) => text[..cut].to_string(),
            None => text,
        }
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("source_url", &self.source_url)
            .field("bytes", &self.raw.len())
            .field("nodes", &self.nodes.len())
            .finish_non_exhaustive()
    }
}

fn flatten(html: &Html) -> Vec<DomNode> {
    let mut nodes: Vec<DomNode> = Vec::new();
    let mut index = HashMap::new();

    for node in html.tree.root().descendants() {
        let parent: Option<usize> = node.parent().and_then(|p| index.get(&p.id()).copied());

        let kind = match node.value() {
            Node::Element(el) => NodeKind::Element {
                name: el.name().to_ascii_lowercase(),
                id: el.id().map(ToString::to_string),
            },
            Node::Text(text) => NodeKind::Text(text.to_string()),
            _ => NodeKind::Other,
        };

        let idx = nodes.len();
        nodes.push(DomNode {
            kind,
            parent,
            children: Vec::new(),
            end: idx + 1,
        });
        if let Some(p) = parent {
            nodes[p].children.push(idx);
        }
        index.insert(node.id(), idx);
    }

    for i in (0..nodes.len()).rev() {
        if let Some(&last) = nodes[i].children.last() {
            nodes[i].end = nodes[last].end;
        }
    }

    nodes
}

pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
