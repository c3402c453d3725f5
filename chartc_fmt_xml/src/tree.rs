//! Generic labeled tree loaded from XML text.
//!
//! The loader knows nothing about state charts:
//! it only checks that the document is well-formed and records where every element starts.

use crate::parser::ParseError;
use anyhow::{Context, bail};
use log::{error, info, trace};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

/// An XML element with its attributes, children and text content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    /// Attributes in document order, unescaped.
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Element>,
    /// Concatenation of the text and CDATA content directly inside the element.
    pub text: String,
    /// Line on which the element starts, counting from 1.
    pub line: usize,
}

impl Element {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Loads the tree of a whole XML document.
    ///
    /// Fails if the document is not well-formed, is empty,
    /// or contains processing instructions or a DOCTYPE.
    pub fn parse_str(text: &str) -> anyhow::Result<Self> {
        info!(target: "parser", "loading xml tree");
        let mut reader = Reader::from_str(text);
        // End tags are matched against the stack below
        reader.config_mut().check_end_names = false;
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;
        loop {
            let position = reader.buffer_position() as usize;
            let event = reader.read_event().with_context(|| {
                format!("failed reading xml at line {}", count_lines(text, position))
            })?;
            match event {
                Event::Start(tag) => {
                    let element = element(&reader, &tag, count_lines(text, position))?;
                    trace!(target: "parser", "start tag '{}'", element.name);
                    stack.push(element);
                }
                Event::End(tag) => {
                    let tag_name = &*reader.decoder().decode(tag.name().into_inner())?;
                    match stack.pop() {
                        Some(element) if element.name == tag_name => {
                            trace!(target: "parser", "end tag '{tag_name}'");
                            attach(element, &mut stack, &mut root)?;
                        }
                        _ => {
                            error!(target: "parser", "unknown or unexpected end tag '{tag_name}'");
                            bail!(ParseError::UnexpectedEndTag(tag_name.to_string()));
                        }
                    }
                }
                Event::Empty(tag) => {
                    let element = element(&reader, &tag, count_lines(text, position))?;
                    trace!(target: "parser", "empty tag '{}'", element.name);
                    attach(element, &mut stack, &mut root)?;
                }
                Event::Text(t) => {
                    let content = t.unescape()?;
                    match stack.last_mut() {
                        Some(element) => element.text.push_str(&content),
                        None if content.trim().is_empty() => {}
                        None => {
                            error!(target: "parser", "text content outside of root element");
                            bail!(ParseError::UnexpectedText(String::from("document")));
                        }
                    }
                }
                Event::CData(cdata) => {
                    let content = reader.decoder().decode(&cdata)?;
                    match stack.last_mut() {
                        Some(element) => element.text.push_str(&content),
                        None => {
                            error!(target: "parser", "CData outside of root element");
                            bail!(ParseError::UnexpectedText(String::from("document")));
                        }
                    }
                }
                // Ignore comments
                Event::Comment(_)
                // Ignore XML declaration
                | Event::Decl(_) => continue,
                Event::PI(_) => {
                    error!(target: "parser", "Processing Instructions not supported");
                    bail!(ParseError::Unsupported("processing instructions"));
                }
                Event::DocType(_) => {
                    error!(target: "parser", "DocType not supported");
                    bail!(ParseError::Unsupported("DOCTYPE"));
                }
                Event::Eof => {
                    info!(target: "parser", "xml tree loaded");
                    break;
                }
            }
        }
        if let Some(element) = stack.pop() {
            error!(target: "parser", "unclosed tag '{}'", element.name);
            bail!(ParseError::UnclosedTags(element.name));
        }
        root.ok_or_else(|| ParseError::EmptyDocument.into())
    }
}

fn element(reader: &Reader<&[u8]>, tag: &BytesStart<'_>, line: usize) -> anyhow::Result<Element> {
    let name = reader.decoder().decode(tag.name().into_inner())?.into_owned();
    let mut attrs = Vec::new();
    for attr in tag.attributes() {
        let attr = attr.with_context(|| format!("malformed attribute in tag '{name}' at line {line}"))?;
        let key = reader.decoder().decode(attr.key.into_inner())?.into_owned();
        let value = attr.unescape_value()?.into_owned();
        attrs.push((key, value));
    }
    Ok(Element {
        name,
        attrs,
        children: Vec::new(),
        text: String::new(),
        line,
    })
}

fn attach(
    element: Element,
    stack: &mut [Element],
    root: &mut Option<Element>,
) -> anyhow::Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
    } else if root.is_none() {
        *root = Some(element);
    } else {
        error!(target: "parser", "second root element '{}'", element.name);
        bail!(ParseError::UnexpectedStartTag(element.name));
    }
    Ok(())
}

// Line of the byte at `position`.
fn count_lines(text: &str, position: usize) -> usize {
    let position = position.min(text.len());
    1 + text.as_bytes()[..position]
        .iter()
        .filter(|&&b| b == b'\n')
        .count()
}
