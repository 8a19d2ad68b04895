//! Outline ⇄ flat page list transformation.
//!
//! An outline is an ordered list of nodes, each either a named *part* grouping
//! several pages or a bare page. Generation work fans out over the flattened
//! form, where every page carries its part name as a tag.
//!
//! Pure functions only: no I/O, no concurrency.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::page::PageSlot;

/// Outline of a single page: a title plus ordered bullet points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageOutline {
    pub title: String,
    #[serde(default)]
    pub points: Vec<String>,
}

impl PageOutline {
    pub fn new<I, S>(title: impl Into<String>, points: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            title: title.into(),
            points: points.into_iter().map(Into::into).collect(),
        }
    }

    /// A page with neither title nor points is not part of an outline yet.
    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty() && self.points.iter().all(|p| p.trim().is_empty())
    }
}

/// A named group of pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartOutline {
    pub part: String,
    pub pages: Vec<PageOutline>,
}

/// One top-level outline entry.
///
/// Deserializes from the JSON shape the text model produces:
/// `{"part": "...", "pages": [...]}` or `{"title": "...", "points": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutlineNode {
    Part(PartOutline),
    Page(PageOutline),
}

impl OutlineNode {
    pub fn part<I>(name: impl Into<String>, pages: I) -> Self
    where
        I: IntoIterator<Item = PageOutline>,
    {
        Self::Part(PartOutline {
            part: name.into(),
            pages: pages.into_iter().collect(),
        })
    }

    pub fn page(page: PageOutline) -> Self {
        Self::Page(page)
    }
}

/// Flatten an outline into ordered draft page slots.
///
/// A part expands to its pages, each stamped with the part name; a bare page
/// has no part. The walk order is the canonical `order_index` order.
pub fn flatten(outline: &[OutlineNode]) -> Vec<PageSlot> {
    let mut slots = Vec::new();
    for node in outline {
        match node {
            OutlineNode::Part(group) => {
                for page in &group.pages {
                    let index = slots.len();
                    slots.push(PageSlot::draft(index, Some(group.part.clone()), page.clone()));
                }
            }
            OutlineNode::Page(page) => {
                let index = slots.len();
                slots.push(PageSlot::draft(index, None, page.clone()));
            }
        }
    }
    slots
}

/// Rebuild the nested outline from page slots.
///
/// Slots are walked in `order_index` order. Consecutive slots sharing a part
/// name form one group; any change of part (including to or from no part)
/// closes the open group. A part name that reappears after a gap opens a new,
/// separate group: groups are never merged across a gap.
///
/// Slots without outline content are skipped.
pub fn reconstruct<'a, I>(slots: I) -> Vec<OutlineNode>
where
    I: IntoIterator<Item = &'a PageSlot>,
{
    let mut ordered: Vec<&PageSlot> = slots.into_iter().collect();
    ordered.sort_by_key(|s| s.order_index);

    let mut outline = Vec::new();
    let mut open: Option<PartOutline> = None;

    for slot in ordered {
        let Some(content) = slot.outline_content.as_ref().filter(|c| !c.is_empty()) else {
            continue;
        };

        match slot.part.as_deref().filter(|p| !p.is_empty()) {
            Some(name) => match open.as_mut() {
                Some(group) if group.part == name => group.pages.push(content.clone()),
                _ => {
                    if let Some(done) = open.take() {
                        outline.push(OutlineNode::Part(done));
                    }
                    open = Some(PartOutline {
                        part: name.to_string(),
                        pages: vec![content.clone()],
                    });
                }
            },
            None => {
                if let Some(done) = open.take() {
                    outline.push(OutlineNode::Part(done));
                }
                outline.push(OutlineNode::Page(content.clone()));
            }
        }
    }

    if let Some(done) = open {
        outline.push(OutlineNode::Part(done));
    }

    outline
}

/// Numbered top-level listing of the outline, used as prompt context.
pub fn outline_text(outline: &[OutlineNode]) -> String {
    outline
        .iter()
        .enumerate()
        .map(|(i, node)| {
            let label = match node {
                OutlineNode::Part(group) => group.part.as_str(),
                OutlineNode::Page(page) if page.title.trim().is_empty() => "Untitled",
                OutlineNode::Page(page) => page.title.as_str(),
            };
            format!("{}. {}", i + 1, label)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse the outline JSON returned by a text model.
///
/// Models frequently wrap JSON in a markdown code fence; it is stripped first.
pub fn parse_outline_json(raw: &str) -> DomainResult<Vec<OutlineNode>> {
    let body = strip_code_fence(raw);
    serde_json::from_str(body).map_err(|e| DomainError::validation(format!("malformed outline JSON: {e}")))
}

fn strip_code_fence(raw: &str) -> &str {
    let mut body = raw.trim();
    if let Some(rest) = body.strip_prefix("```") {
        // Drop the info string (e.g. `json`) up to the first newline.
        body = match rest.find('\n') {
            Some(pos) => &rest[pos + 1..],
            None => rest.trim_start_matches("json"),
        };
        body = body.trim_end();
        body = body.strip_suffix("```").unwrap_or(body);
    }
    body.trim()
}
