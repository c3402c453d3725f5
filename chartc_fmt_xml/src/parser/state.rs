use super::vocabulary::*;
use super::{
    ParseError, Siblings, attrs, located, no_children, no_text, required, text_only, unexpected,
};
use crate::tree::Element;
use anyhow::{Context, anyhow};
use chartc_core::model::{GUARD_TRUE, StateKind, StateNode, Transition, TransitionKind};
use log::{error, trace};

/// Parses a `state`, `parallel` or `final` element and everything below it.
pub(super) fn parse(element: &Element, path: &str) -> anyhow::Result<StateNode> {
    let tag = element.name.as_str();
    let attrs = match tag {
        TAG_FINAL => attrs(element, &[], &[ATTR_ID])?,
        TAG_STATE | TAG_PARALLEL => attrs(element, &[], &[ATTR_ID, ATTR_INITIAL])?,
        _ => return Err(anyhow!(unexpected(element))),
    };
    no_text(element)?;
    let mut initial = attrs.get(ATTR_INITIAL).map(|initial| initial.to_string());
    if tag == TAG_PARALLEL && initial.is_some() {
        return Err(invalid("parallel states have no initial child"));
    }

    let mut children = Vec::new();
    let mut regions_are_states = true;
    let mut transitions: Vec<Transition> = Vec::new();
    let mut on_entry = Vec::new();
    let mut on_exit = Vec::new();
    let mut siblings = Siblings::default();
    let state_path = path;
    for child in &element.children {
        let path = siblings.path(state_path, child);
        trace!(target: "parser", "parsing '{path}'");
        let context = || located(&path, child);
        match child.name.as_str() {
            TAG_STATE | TAG_PARALLEL | TAG_FINAL => {
                if tag == TAG_FINAL {
                    return Err(invalid("final states have no children")).with_context(context);
                }
                regions_are_states &= child.name == TAG_STATE;
                children.push(parse(child, &path).with_context(context)?);
            }
            TAG_TRANSITION => {
                if tag == TAG_FINAL {
                    return Err(invalid("final states have no transitions")).with_context(context);
                }
                let transition = parse_transition(child).with_context(context)?;
                if transitions.iter().any(|t| t.event == transition.event) {
                    error!(target: "parser", "duplicate transition in '{path}'");
                    return Err(anyhow!(ParseError::DuplicateTransition {
                        state: attrs
                            .get(ATTR_ID)
                            .map_or_else(|| state_path.to_string(), |id| id.to_string()),
                        event: transition.event.unwrap_or_default(),
                    }))
                    .with_context(context);
                }
                transitions.push(transition);
            }
            TAG_ONENTRY => on_entry.push(text_only(child).with_context(context)?.trim().to_string()),
            TAG_ONEXIT => on_exit.push(text_only(child).with_context(context)?.trim().to_string()),
            TAG_INITIAL if tag == TAG_STATE => {
                if initial.is_some() {
                    return Err(invalid("initial child given more than once")).with_context(context);
                }
                initial = Some(parse_initial(child).with_context(context)?);
            }
            TAG_INITIAL => {
                return Err(invalid("only composite states have an initial child")).with_context(context);
            }
            _ => return Err(anyhow!(unexpected(child))).with_context(context),
        }
    }

    let kind = match tag {
        TAG_PARALLEL => {
            if children.is_empty() {
                return Err(invalid("parallel state without regions"));
            }
            if !regions_are_states {
                return Err(invalid("regions of parallel states must be state elements"));
            }
            StateKind::Parallel
        }
        TAG_FINAL => StateKind::Final,
        _ if children.is_empty() => {
            if initial.is_some() {
                return Err(invalid("initial child of a state without children"));
            }
            StateKind::Simple
        }
        _ => StateKind::Composite,
    };
    if !children.is_empty() && transitions.iter().any(|t| t.target.is_none()) {
        return Err(invalid("targetless transition on a state with children"));
    }

    let mut state = StateNode::anonymous(kind);
    state.id = attrs.get(ATTR_ID).map(|id| id.to_string());
    state.initial = initial;
    state.children = children;
    state.transitions = transitions;
    state.on_entry = on_entry;
    state.on_exit = on_exit;
    Ok(state)
}

fn invalid(reason: &'static str) -> anyhow::Error {
    error!(target: "parser", "{reason}");
    anyhow!(ParseError::InvalidStructure(reason))
}

fn parse_transition(element: &Element) -> anyhow::Result<Transition> {
    let attrs = attrs(
        element,
        &[],
        &[ATTR_EVENT, ATTR_TARGET, ATTR_COND, ATTR_TYPE],
    )?;
    no_text(element)?;
    no_children(element)?;
    let kind = match attrs.get(ATTR_TYPE).copied() {
        None | Some(TYPE_EXTERNAL) => TransitionKind::External,
        Some(TYPE_INTERNAL) => TransitionKind::Internal,
        Some(other) => {
            error!(target: "parser", "invalid transition type '{other}'");
            return Err(anyhow!(ParseError::InvalidTransitionType(other.to_string())));
        }
    };
    Ok(Transition {
        event: attrs.get(ATTR_EVENT).map(|event| event.to_string()),
        target: attrs.get(ATTR_TARGET).map(|target| target.to_string()),
        guard: attrs
            .get(ATTR_COND)
            .map_or_else(|| GUARD_TRUE.to_string(), |cond| cond.to_string()),
        kind,
    })
}

// `<initial><transition target="..."/></initial>`
fn parse_initial(element: &Element) -> anyhow::Result<String> {
    attrs(element, &[], &[])?;
    no_text(element)?;
    match element.children.as_slice() {
        [transition] if transition.name == TAG_TRANSITION => {
            let attrs = attrs(transition, &[ATTR_TARGET], &[])?;
            no_text(transition)?;
            no_children(transition)?;
            Ok(required(&attrs, ATTR_TARGET)?.to_string())
        }
        _ => Err(invalid("initial element must hold a single transition")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(text: &str) -> anyhow::Result<StateNode> {
        let element = Element::parse_str(text)?;
        parse(&element, "")
    }

    fn fails_with(text: &str, check: impl Fn(&ParseError) -> bool) -> bool {
        parse_str(text).is_err_and(|err| {
            err.chain()
                .any(|e| e.downcast_ref::<ParseError>().is_some_and(&check))
        })
    }

    fn invalid_structure(text: &str) -> bool {
        fails_with(text, |e| matches!(e, ParseError::InvalidStructure(_)))
    }

    #[test]
    fn kinds() -> anyhow::Result<()> {
        assert_eq!(parse_str(r#"<state id="S"/>"#)?.kind, StateKind::Simple);
        assert_eq!(parse_str(r#"<final id="F"/>"#)?.kind, StateKind::Final);
        let composite = parse_str(r#"<state id="S"><state id="A"/><final id="B"/></state>"#)?;
        assert_eq!(composite.kind, StateKind::Composite);
        assert_eq!(composite.children[1].kind, StateKind::Final);
        let parallel = parse_str(r#"<parallel id="P"><state id="R"/><state id="Q"/></parallel>"#)?;
        assert_eq!(parallel.kind, StateKind::Parallel);
        assert_eq!(parallel.children.len(), 2);
        Ok(())
    }

    #[test]
    fn anonymous_state() -> anyhow::Result<()> {
        let state = parse_str(r#"<state><state/></state>"#)?;
        assert_eq!(state.id, None);
        assert_eq!(state.children[0].id, None);
        Ok(())
    }

    #[test]
    fn initial_element() -> anyhow::Result<()> {
        let state = parse_str(
            r#"<state id="S">
                <initial><transition target="B"/></initial>
                <state id="A"/>
                <state id="B"/>
            </state>"#,
        )?;
        assert_eq!(state.initial.as_deref(), Some("B"));
        assert!(invalid_structure(
            r#"<state id="S" initial="A">
                <initial><transition target="B"/></initial>
                <state id="A"/>
                <state id="B"/>
            </state>"#
        ));
        assert!(invalid_structure(
            r#"<state id="S"><initial/><state id="A"/></state>"#
        ));
        Ok(())
    }

    #[test]
    fn transitions() -> anyhow::Result<()> {
        let state = parse_str(
            r#"<state id="S">
                <transition event="a" target="T"/>
                <transition event="b" target="T" cond="x &gt; 0" type="internal"/>
                <transition event="c"/>
                <transition target="T"/>
            </state>"#,
        )?;
        let [a, b, c, eventless] = state.transitions.as_slice() else {
            panic!("four transitions expected");
        };
        assert_eq!(a.guard, GUARD_TRUE);
        assert_eq!(a.kind, TransitionKind::External);
        assert_eq!(b.guard, "x > 0");
        assert_eq!(b.kind, TransitionKind::Internal);
        assert_eq!(c.target, None);
        assert_eq!(eventless.event, None);
        Ok(())
    }

    #[test]
    fn transition_errors() {
        assert!(fails_with(
            r#"<state id="S"><transition event="e" target="T" type="local"/></state>"#,
            |e| matches!(e, ParseError::InvalidTransitionType(t) if t == "local")
        ));
        assert!(fails_with(
            r#"<state id="S"><transition event="e" target="T"/><transition event="e" target="U"/></state>"#,
            |e| matches!(e, ParseError::DuplicateTransition { state, event } if state == "S" && event == "e")
        ));
        assert!(
            parse(
                &Element::parse_str(
                    r#"<state><transition event="e"/><transition event="e"/></state>"#
                )
                .expect("well-formed xml"),
                "/scxml/state[1]"
            )
            .is_err_and(|err| err.chain().any(|e| matches!(
                e.downcast_ref::<ParseError>(),
                Some(ParseError::DuplicateTransition { state, .. }) if state == "/scxml/state[1]"
            )))
        );
        assert!(fails_with(
            r#"<state id="S"><transition event="e" target="T" foo="1"/></state>"#,
            |e| matches!(e, ParseError::UnknownAttr(_))
        ));
        assert!(invalid_structure(
            r#"<state id="S" initial="A"><transition event="e"/><state id="A"/></state>"#
        ));
    }

    #[test]
    fn actions() -> anyhow::Result<()> {
        let state = parse_str(
            r#"<state id="S">
                <onentry><![CDATA[ if (machine->x < 3) machine->x++; ]]></onentry>
                <onentry>log();</onentry>
                <onexit>machine->x = 0;</onexit>
            </state>"#,
        )?;
        assert_eq!(
            state.on_entry,
            ["if (machine->x < 3) machine->x++;", "log();"]
        );
        assert_eq!(state.on_exit, ["machine->x = 0;"]);
        Ok(())
    }

    #[test]
    fn structure_errors() {
        assert!(invalid_structure(r#"<parallel id="P"/>"#));
        assert!(invalid_structure(
            r#"<parallel id="P" initial="R"><state id="R"/></parallel>"#
        ));
        assert!(invalid_structure(
            r#"<parallel id="P"><final id="F"/></parallel>"#
        ));
        assert!(invalid_structure(r#"<final id="F"><state id="S"/></final>"#));
        assert!(invalid_structure(
            r#"<final id="F"><transition event="e" target="F"/></final>"#
        ));
        assert!(invalid_structure(r#"<state id="S" initial="S"/>"#));
        assert!(fails_with(r#"<state id="S"><invoke/></state>"#, |e| matches!(
            e,
            ParseError::UnexpectedTag(t) if t == "invoke"
        )));
    }
}
