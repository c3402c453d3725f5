//! Semantic parser turning a generic [`Element`] tree into a [`MachineModel`].

mod state;
mod vocabulary;

pub use self::vocabulary::*;
use crate::tree::Element;
use anyhow::{Context, anyhow, bail};
use chartc_core::model::{Field, MachineModel};
use log::{error, info, trace};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown or unexpected start tag `{0}`")]
    UnexpectedStartTag(String),
    #[error("unknown or unexpected end tag `{0}`")]
    UnexpectedEndTag(String),
    #[error("tag `{0}` has not been closed")]
    UnclosedTags(String),
    #[error("unexpected text content in `{0}`")]
    UnexpectedText(String),
    #[error("{0} not supported")]
    Unsupported(&'static str),
    #[error("empty document")]
    EmptyDocument,
    #[error("unknown or unexpected tag `{0}`")]
    UnexpectedTag(String),
    #[error("missing required attribute `{0}`")]
    MissingAttr(String),
    #[error("unknown or unexpected attribute key `{0}`")]
    UnknownAttr(String),
    #[error("unsupported version `{0}`, expected `{expected}`", expected = SUPPORTED_VERSION)]
    UnsupportedVersion(String),
    #[error("field `{0}` declared multiple times")]
    DuplicateField(String),
    #[error("callback `{0}` declared multiple times")]
    DuplicateCallback(String),
    #[error("state `{state}` declares more than one transition on event `{event}`")]
    DuplicateTransition { state: String, event: String },
    #[error("invalid structure: {0}")]
    InvalidStructure(&'static str),
    #[error("invalid transition type `{0}`, expected `{internal}` or `{external}`", internal = TYPE_INTERNAL, external = TYPE_EXTERNAL)]
    InvalidTransitionType(String),
}

/// Checks the attributes of `element` against the required `keys` and optional `opt_keys`.
fn attrs<'a>(
    element: &'a Element,
    keys: &[&str],
    opt_keys: &[&str],
) -> anyhow::Result<HashMap<&'a str, &'a str>> {
    let mut attrs = HashMap::new();
    for (key, val) in &element.attrs {
        if keys.contains(&key.as_str()) || opt_keys.contains(&key.as_str()) {
            attrs.insert(key.as_str(), val.as_str());
        } else {
            error!(target: "parser", "found unknown attribute '{key}'");
            bail!(ParseError::UnknownAttr(key.to_string()));
        }
    }
    for key in keys {
        if !attrs.contains_key(*key) {
            error!(target: "parser", "missing required attribute '{key}'");
            bail!(ParseError::MissingAttr(key.to_string()));
        }
    }
    Ok(attrs)
}

fn required<'a>(attrs: &HashMap<&str, &'a str>, key: &str) -> Result<&'a str, ParseError> {
    attrs
        .get(key)
        .copied()
        .ok_or_else(|| ParseError::MissingAttr(key.to_string()))
}

fn no_text(element: &Element) -> Result<(), ParseError> {
    if element.text.trim().is_empty() {
        Ok(())
    } else {
        error!(target: "parser", "text content not supported in '{}'", element.name);
        Err(ParseError::UnexpectedText(element.name.clone()))
    }
}

fn no_children(element: &Element) -> Result<(), ParseError> {
    match element.children.first() {
        None => Ok(()),
        Some(child) => {
            error!(target: "parser", "unknown or unexpected tag '{}'", child.name);
            Err(ParseError::UnexpectedTag(child.name.clone()))
        }
    }
}

// Text of an element carrying only text, e.g., a code fragment.
fn text_only(element: &Element) -> anyhow::Result<&str> {
    attrs(element, &[], &[])?;
    no_children(element)?;
    Ok(&element.text)
}

fn unexpected(element: &Element) -> ParseError {
    error!(target: "parser", "unknown or unexpected tag '{}'", element.name);
    ParseError::UnexpectedTag(element.name.clone())
}

// Paths of children, indexed by id when they have one and by position among equal tags otherwise.
#[derive(Debug, Default)]
struct Siblings<'a>(HashMap<&'a str, usize>);

impl<'a> Siblings<'a> {
    fn path(&mut self, parent: &str, element: &'a Element) -> String {
        let count = self.0.entry(element.name.as_str()).or_default();
        *count += 1;
        match element.attr(ATTR_ID) {
            Some(id) => format!("{parent}/{}[{id}]", element.name),
            None => format!("{parent}/{}[{count}]", element.name),
        }
    }
}

fn located(path: &str, element: &Element) -> String {
    format!("failed to parse '{path}' at line {}", element.line)
}

/// Builds the [`MachineModel`] described by the tree rooted at `root`.
///
/// Fails on the first error, naming the path and line of the offending element.
pub fn parse(root: &Element) -> anyhow::Result<MachineModel> {
    info!(target: "parser", "parsing machine");
    let path = format!("/{}", root.name);
    if root.name != TAG_SCXML {
        return Err(anyhow!(unexpected(root)).context(located(&path, root)));
    }
    let attrs = attrs(
        root,
        &[ATTR_VERSION, ATTR_NAME],
        &[ATTR_PREFIX, ATTR_INITIAL, ATTR_XMLNS],
    )
    .with_context(|| located(&path, root))?;
    let version = required(&attrs, ATTR_VERSION)?;
    if version != SUPPORTED_VERSION {
        error!(target: "parser", "unsupported version '{version}'");
        return Err(anyhow!(ParseError::UnsupportedVersion(version.to_string()))
            .context(located(&path, root)));
    }
    no_text(root).with_context(|| located(&path, root))?;
    let name = required(&attrs, ATTR_NAME)?;

    let mut header = String::new();
    let mut source = String::new();
    let mut fields = Vec::new();
    let mut callbacks = Vec::new();
    let mut top = None;
    let mut siblings = Siblings::default();
    for child in &root.children {
        let path = siblings.path(&path, child);
        trace!(target: "parser", "parsing '{path}'");
        match child.name.as_str() {
            TAG_HEADER => header.push_str(text_only(child).with_context(|| located(&path, child))?),
            TAG_SOURCE => source.push_str(text_only(child).with_context(|| located(&path, child))?),
            TAG_DATAMODEL => {
                parse_datamodel(child, &path, &mut fields).with_context(|| located(&path, child))?
            }
            TAG_CALLBACKS => parse_callbacks(child, &path, &mut callbacks)
                .with_context(|| located(&path, child))?,
            TAG_STATE | TAG_PARALLEL | TAG_FINAL => {
                if top.is_some() {
                    error!(target: "parser", "more than one top-level state");
                    return Err(anyhow!(ParseError::InvalidStructure(
                        "a machine has a single top-level state"
                    ))
                    .context(located(&path, child)));
                }
                top = Some(state::parse(child, &path).with_context(|| located(&path, child))?);
            }
            _ => return Err(anyhow!(unexpected(child)).context(located(&path, child))),
        }
    }
    let Some(top) = top else {
        error!(target: "parser", "no top-level state");
        return Err(anyhow!(ParseError::InvalidStructure("a machine needs a top-level state"))
            .context(located(&path, root)));
    };

    let mut model = MachineModel::new(name, top);
    if let Some(prefix) = attrs.get(ATTR_PREFIX) {
        model.prefix = prefix.to_string();
    }
    model.initial = attrs.get(ATTR_INITIAL).map(|initial| initial.to_string());
    model.fields = fields;
    model.callbacks = callbacks;
    model.header = header;
    model.source = source;
    info!(target: "parser", "parsed machine '{}'", model.name);
    Ok(model)
}

fn parse_datamodel(element: &Element, path: &str, fields: &mut Vec<Field>) -> anyhow::Result<()> {
    attrs(element, &[], &[])?;
    no_text(element)?;
    let mut siblings = Siblings::default();
    for child in &element.children {
        let path = siblings.path(path, child);
        trace!(target: "parser", "parsing '{path}'");
        if child.name != TAG_DATA {
            return Err(anyhow!(unexpected(child)).context(located(&path, child)));
        }
        let attrs = attrs(child, &[ATTR_TYPE, ATTR_ID], &[ATTR_EXPR])
            .with_context(|| located(&path, child))?;
        no_text(child).with_context(|| located(&path, child))?;
        no_children(child).with_context(|| located(&path, child))?;
        let id = required(&attrs, ATTR_ID)?;
        if fields.iter().any(|field| field.id == id) {
            error!(target: "parser", "field '{id}' declared multiple times");
            return Err(anyhow!(ParseError::DuplicateField(id.to_string()))
                .context(located(&path, child)));
        }
        fields.push(Field {
            r#type: required(&attrs, ATTR_TYPE)?.to_string(),
            id: id.to_string(),
            init: attrs.get(ATTR_EXPR).map(|expr| expr.to_string()),
        });
    }
    Ok(())
}

fn parse_callbacks(
    element: &Element,
    path: &str,
    callbacks: &mut Vec<String>,
) -> anyhow::Result<()> {
    attrs(element, &[], &[])?;
    no_text(element)?;
    let mut siblings = Siblings::default();
    for child in &element.children {
        let path = siblings.path(path, child);
        trace!(target: "parser", "parsing '{path}'");
        if child.name != TAG_CALLBACK {
            return Err(anyhow!(unexpected(child)).context(located(&path, child)));
        }
        let attrs = attrs(child, &[ATTR_ID], &[]).with_context(|| located(&path, child))?;
        no_text(child).with_context(|| located(&path, child))?;
        no_children(child).with_context(|| located(&path, child))?;
        let id = required(&attrs, ATTR_ID)?;
        if callbacks.iter().any(|callback| callback == id) {
            error!(target: "parser", "callback '{id}' declared multiple times");
            return Err(anyhow!(ParseError::DuplicateCallback(id.to_string()))
                .context(located(&path, child)));
        }
        callbacks.push(id.to_string());
    }
    Ok(())
}
