//! Schema-agnostic manifest tree.
//!
//! The XML document is converted into [`ManifestNode`]s which keep every
//! attribute as a string and every child in document order. Typed access to
//! the DASH elements lives in [`view`], merging of inherited templates in
//! [`crate::inherit`].

use std::{str::FromStr, time::Duration};

use indexmap::IndexMap;
use quick_xml::{
    events::{BytesStart, Event},
    Reader,
};

use crate::{MpdError, MpdResult};

pub mod view;

pub const TEXT_TAG: &str = "#text";
pub const DOCUMENT_TAG: &str = "#document";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManifestNode {
    /// Element name, [`TEXT_TAG`] or [`DOCUMENT_TAG`].
    pub tag: String,
    pub attributes: IndexMap<String, String>,
    /// Direct text children joined by `\n`.
    pub text: Option<String>,

    children: Vec<ManifestNode>,
    /// Tag name -> positions in `children`, in document order.
    by_tag: IndexMap<String, Vec<usize>>,
}

impl ManifestNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn text_node(text: impl Into<String>) -> Self {
        Self {
            tag: TEXT_TAG.to_string(),
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: ManifestNode) -> Self {
        self.push_child(child);
        self
    }

    pub fn is_text(&self) -> bool {
        self.tag == TEXT_TAG
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Parses an attribute with [`FromStr`]. Absent attributes are `Ok(None)`.
    pub fn parse_attr<T>(&self, key: &str) -> MpdResult<Option<T>>
    where
        T: FromStr,
    {
        self.attr(key)
            .map(|value| {
                value.trim().parse::<T>().map_err(|_| {
                    MpdError::ManifestParse(format!("invalid {}@{key}: {value:?}", self.tag))
                })
            })
            .transpose()
    }

    /// Parses an ISO 8601 duration attribute such as `PT1M30.5S`.
    pub fn duration_attr(&self, key: &str) -> MpdResult<Option<Duration>> {
        let Some(value) = self.attr(key) else {
            return Ok(None);
        };

        iso8601_duration::Duration::parse(value.trim())
            .ok()
            .and_then(|duration| duration.to_std())
            .map(Some)
            .ok_or_else(|| {
                MpdError::ManifestParse(format!("invalid {}@{key}: {value:?}", self.tag))
            })
    }

    pub fn children(&self) -> &[ManifestNode] {
        &self.children
    }

    /// Appends a child, keeping the tag index and the concatenated text in sync.
    pub fn push_child(&mut self, child: ManifestNode) {
        if child.is_text() {
            let content = child.text.as_deref().unwrap_or_default();
            match self.text.as_mut() {
                Some(text) => {
                    text.push('\n');
                    text.push_str(content);
                }
                None => self.text = Some(content.to_string()),
            }
        }

        self.by_tag
            .entry(child.tag.clone())
            .or_default()
            .push(self.children.len());
        self.children.push(child);
    }

    pub fn has(&self, tag: &str) -> bool {
        self.by_tag.contains_key(tag)
    }

    /// The first child with the given tag.
    pub fn first(&self, tag: &str) -> Option<&ManifestNode> {
        self.by_tag
            .get(tag)
            .and_then(|positions| positions.first())
            .map(|&position| &self.children[position])
    }

    pub fn first_mut(&mut self, tag: &str) -> Option<&mut ManifestNode> {
        let position = *self.by_tag.get(tag)?.first()?;
        self.children.get_mut(position)
    }

    /// All children with the given tag, in document order.
    pub fn all<'a>(&'a self, tag: &str) -> impl Iterator<Item = &'a ManifestNode> + 'a {
        self.by_tag
            .get(tag)
            .into_iter()
            .flatten()
            .map(|&position| &self.children[position])
    }

    pub fn all_mut<'a>(&'a mut self, tag: &'a str) -> impl Iterator<Item = &'a mut ManifestNode> {
        self.children.iter_mut().filter(move |child| child.tag == tag)
    }

    pub fn count(&self, tag: &str) -> usize {
        self.by_tag.get(tag).map_or(0, Vec::len)
    }

    /// Distinct child tags in order of first appearance.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.by_tag.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Return the root element itself instead of a [`DOCUMENT_TAG`] node wrapping it.
    pub ignore_root: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self { ignore_root: true }
    }
}

/// Converts manifest text into a [`ManifestNode`] tree.
pub fn parse(text: &str, options: ParseOptions) -> MpdResult<ManifestNode> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack = vec![ManifestNode::new(DOCUMENT_TAG)];
    loop {
        match reader.read_event()? {
            Event::Start(e) => stack.push(element_from(&e)?),
            Event::Empty(e) => {
                let element = element_from(&e)?;
                append(&mut stack, element)?;
            }
            Event::End(_) => {
                // quick-xml has already checked that the end tag matches
                if stack.len() < 2 {
                    return Err(MpdError::ManifestParse("unexpected end tag".to_string()));
                }
                if let Some(element) = stack.pop() {
                    append(&mut stack, element)?;
                }
            }
            Event::Text(e) => {
                let text = e.unescape()?;
                if !text.trim().is_empty() {
                    append(&mut stack, ManifestNode::text_node(text.into_owned()))?;
                }
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                append(&mut stack, ManifestNode::text_node(text))?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if stack.len() > 1 {
        let unclosed = stack.last().map(|node| node.tag.as_str()).unwrap_or_default();
        return Err(MpdError::ManifestParse(format!(
            "unclosed element <{unclosed}>"
        )));
    }

    let Some(document) = stack.pop() else {
        return Err(MpdError::ManifestParse("empty document".to_string()));
    };
    if document.children.len() != 1 {
        return Err(MpdError::ManifestParse(format!(
            "document must have exactly one root element, found {}",
            document.children.len()
        )));
    }

    if options.ignore_root {
        Ok(document.children.into_iter().next().unwrap_or_default())
    } else {
        Ok(document)
    }
}

fn element_from(e: &BytesStart) -> MpdResult<ManifestNode> {
    let name = e.name();
    let tag = std::str::from_utf8(name.as_ref())
        .map_err(|err| MpdError::ManifestParse(format!("invalid element name: {err}")))?;
    let mut node = ManifestNode::new(tag);

    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|err| MpdError::ManifestParse(format!("invalid attribute name: {err}")))?
            .to_string();
        let value = attr.unescape_value()?.into_owned();
        node.attributes.insert(key, value);
    }

    Ok(node)
}

fn append(stack: &mut [ManifestNode], node: ManifestNode) -> MpdResult<()> {
    let Some(parent) = stack.last_mut() else {
        return Err(MpdError::ManifestParse("unexpected end of document".to_string()));
    };
    if parent.tag == DOCUMENT_TAG && node.is_text() {
        return Err(MpdError::ManifestParse(
            "text outside of the root element".to_string(),
        ));
    }

    parent.push_child(node);
    Ok(())
}
