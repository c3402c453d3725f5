use chartc_core::model::*;
use chartc_core::*;

fn motor() -> MachineModel {
    MachineModel::new(
        "motor",
        StateNode::composite(
            "Idle",
            Some("Stopped"),
            vec![
                StateNode::simple("Stopped").with_transition(Transition::on("start", "Running")),
                StateNode::simple("Running").with_transition(Transition::on("stop", "Stopped")),
            ],
        ),
    )
}

#[test]
fn scenario_a() -> Result<(), FlattenError> {
    let flat = flatten(&motor(), &CompileOptions::default())?;
    assert_eq!(flat.state_names().collect::<Vec<_>>(), ["Stopped", "Running"]);
    assert_eq!(flat.events(), ["start", "stop"]);
    assert_eq!(flat.state(flat.initial_state()).name, "Stopped");
    assert_eq!(flat.target("Stopped", "start"), Some("Running"));
    assert_eq!(flat.target("Running", "stop"), Some("Stopped"));
    assert_eq!(flat.target("Stopped", "stop"), Some("Stopped"));
    assert_eq!(flat.target("Running", "start"), Some("Running"));
    // Idle is kept as a hierarchy state
    assert_eq!(flat.nodes()[0].id, "Idle");
    assert_eq!(flat.nodes()[0].kind, StateKind::Composite);
    Ok(())
}

#[test]
fn scenario_b() {
    let region = |name: &str| {
        StateNode::composite(
            name,
            Some(format!("{name}1").as_str()),
            vec![
                StateNode::simple(format!("{name}1")),
                StateNode::simple(format!("{name}2")),
            ],
        )
    };
    let mut first = region("Left");
    first.children[0]
        .transitions
        .push(Transition::on("cross", "Right2"));
    let model = MachineModel::new("b", StateNode::parallel("Both", vec![first, region("Right")]));
    assert!(matches!(
        flatten(&model, &CompileOptions::default()),
        Err(FlattenError::CrossRegionTransition { .. })
    ));
}

#[test]
fn scenario_c() {
    let model = MachineModel::new(
        "c",
        StateNode::composite(
            "Menu",
            None,
            vec![
                StateNode::simple("One"),
                StateNode::simple("Two"),
                StateNode::simple("Three"),
            ],
        ),
    );
    assert_eq!(
        flatten(&model, &CompileOptions::default()).err(),
        Some(FlattenError::MissingInitialChild(String::from("Menu")))
    );
}

#[test]
fn scenario_d() {
    let model = MachineModel::new(
        "d",
        StateNode::composite(
            "Top",
            Some("Ready"),
            vec![
                StateNode::simple("Ready"),
                StateNode::composite("Busy", None, vec![StateNode::simple("Ready")]),
            ],
        ),
    );
    assert_eq!(
        flatten(&model, &CompileOptions::default()).err(),
        Some(FlattenError::DuplicateStateId(String::from("Ready")))
    );
}

#[test]
fn scenario_e() -> Result<(), FlattenError> {
    let mut model = motor();
    model.root.children[1]
        .transitions
        .push(Transition::on("fault", "Unknown"));
    let options = CompileOptions::default();
    let flat = flatten(&model, &options)?;
    assert!(matches!(
        validate(&flat, &options),
        Err(ValidationError::UnknownTarget { target, .. }) if target == "Unknown"
    ));
    Ok(())
}

#[test]
fn lca_excludes_common_ancestor() -> Result<(), FlattenError> {
    // Top > A > A1 > A11 and Top > B > B1
    let model = MachineModel::new(
        "lca",
        StateNode::composite(
            "Top",
            Some("A"),
            vec![
                StateNode::composite(
                    "A",
                    None,
                    vec![StateNode::composite(
                        "A1",
                        None,
                        vec![StateNode::simple("A11").with_transition(Transition::on("go", "B1"))],
                    )],
                ),
                StateNode::composite("B", None, vec![StateNode::simple("B1")]),
            ],
        ),
    );
    let flat = flatten(&model, &CompileOptions::default())?;
    let state = flat.state_by_name("A11").expect("leaf state");
    let event = flat.event_by_name("go").expect("declared event");
    let step = flat.step(state, event);
    assert_eq!(
        flat.chain_names(&step.exit).collect::<Vec<_>>(),
        ["A11", "A1", "A"]
    );
    assert_eq!(flat.chain_names(&step.entry).collect::<Vec<_>>(), ["B", "B1"]);
    Ok(())
}

#[test]
fn determinism_and_totality() -> Result<(), FlattenError> {
    let options = CompileOptions::default();
    let first = flatten(&motor(), &options)?;
    let second = flatten(&motor(), &options)?;
    assert_eq!(first, second);
    for state in first.state_ids() {
        for event in first.event_ids() {
            assert!(first.step(state, event).next.is_some());
        }
    }
    Ok(())
}

#[test]
fn emission_of_scenario_a() -> Result<(), Box<dyn std::error::Error>> {
    let options = CompileOptions::default();
    let flat = flatten(&motor(), &options)?;
    let report = validate(&flat, &options)?;
    assert!(report.is_clean());
    let emission = Emission::new(&flat)?;
    assert_eq!(emission.prefix, "mch_motor");
    assert_eq!(emission.transitions.len(), 2);
    assert!(emission.transitions.iter().all(|row| row.len() == 2));
    Ok(())
}
