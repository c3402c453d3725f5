use chartc_core::model::*;
use chartc_core::*;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

// A chain of nested composite states, with a transition from the innermost leaf to the outermost sibling.
#[inline(always)]
fn deep_chart(depth: usize) -> MachineModel {
    let mut inner = StateNode::simple(format!("L{depth}"))
        .with_on_entry("machine->depth++;")
        .with_transition(Transition::on("out", "Exit"));
    for level in (0..depth).rev() {
        inner = StateNode::composite(format!("L{level}"), None, vec![inner])
            .with_on_exit(format!("machine->depth = {level};"))
            .with_transition(Transition::on(format!("reset{level}"), format!("L{level}")));
    }
    let root = StateNode::composite(
        "Top",
        Some("L0"),
        vec![
            inner,
            StateNode::simple("Exit").with_transition(Transition::on("in", "L0")),
        ],
    );
    MachineModel::new("deep", root)
}

// Many sibling leaves, each stepping to the next one.
#[inline(always)]
fn wide_chart(width: usize) -> MachineModel {
    let children = (0..width)
        .map(|idx| {
            StateNode::simple(format!("S{idx}"))
                .with_transition(Transition::on("next", format!("S{}", (idx + 1) % width)))
                .with_transition(Transition::on(format!("jump{idx}"), "S0"))
        })
        .collect();
    MachineModel::new("wide", StateNode::composite("Top", Some("S0"), children))
}

// Parallel regions of two states each.
#[inline(always)]
fn parallel_chart(regions: usize) -> MachineModel {
    let regions = (0..regions)
        .map(|idx| {
            StateNode::composite(
                format!("R{idx}"),
                Some(format!("R{idx}a").as_str()),
                vec![
                    StateNode::simple(format!("R{idx}a"))
                        .with_transition(Transition::on(format!("t{idx}"), format!("R{idx}b"))),
                    StateNode::simple(format!("R{idx}b"))
                        .with_transition(Transition::on(format!("t{idx}"), format!("R{idx}a"))),
                ],
            )
        })
        .collect();
    MachineModel::new("parallel", StateNode::parallel("P", regions))
}

fn flatten_benchmark(c: &mut Criterion) {
    let options = CompileOptions::default();
    let mut group = c.benchmark_group("flatten");
    for size in [4, 16, 64] {
        let model = deep_chart(size);
        group.bench_with_input(BenchmarkId::new("deep", size), &model, |b, model| {
            b.iter(|| flatten(model, &options))
        });
        let model = wide_chart(size);
        group.bench_with_input(BenchmarkId::new("wide", size), &model, |b, model| {
            b.iter(|| flatten(model, &options))
        });
    }
    for regions in [2, 4, 8] {
        let model = parallel_chart(regions);
        group.bench_with_input(BenchmarkId::new("parallel", regions), &model, |b, model| {
            b.iter(|| flatten(model, &options))
        });
    }
    group.finish();
}

criterion_group!(benches, flatten_benchmark);
criterion_main!(benches);
