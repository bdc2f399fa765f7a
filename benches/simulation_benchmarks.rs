use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use dcsim::*;

/// Resistor ladder of `rungs` sections driven by a 10 V source
fn ladder(rungs: usize) -> Circuit {
    let mut circuit = Circuit::new(format!("ladder {}", rungs));
    for i in 0..=rungs {
        circuit.add_node(format!("n{}", i));
    }
    circuit.add_node("gnd");
    circuit.add_voltage_source("V1", "n0", "gnd", 10.0).unwrap();
    for i in 0..rungs {
        let (from, to) = (format!("n{}", i), format!("n{}", i + 1));
        circuit.add_resistor(&format!("Rs{}", i), &from, &to, 1000.0).unwrap();
        circuit.add_resistor(&format!("Rp{}", i), &from, &to, 2200.0).unwrap();
        circuit.add_resistor(&format!("Rg{}", i), &to, "gnd", 4700.0).unwrap();
    }
    circuit
}

fn bench_simple_circuit(c: &mut Criterion) {
    let mut group = c.benchmark_group("simple_circuit");

    let description = r#"{
        "nodes": [{"name": "1"}, {"name": "2"}, {"name": "0"}],
        "elements": [
            {"name": "V1", "type": "VOLTAGE_SUPPLY", "value": "5V", "posNode": "1", "negNode": "0"},
            {"name": "R1", "type": "RESISTOR", "value": "1k", "posNode": "1", "negNode": "2"},
            {"name": "R2", "type": "RESISTOR", "value": "1k", "posNode": "2", "negNode": "0"}
        ]
    }"#;

    let parser = NetlistParser::new();
    let parsed = parser.parse_str(description).unwrap();

    group.bench_function("parse_description", |b| {
        b.iter(|| parser.parse_str(description).unwrap());
    });

    group.bench_function("operating_point", |b| {
        b.iter(|| {
            let mut simulator = Simulator::new();
            simulator.load_description(&parsed).unwrap();
            simulator.run_operating_point().unwrap();
        });
    });

    group.finish();
}

fn bench_ladder_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("ladder");

    for rungs in [10, 50, 100, 200].iter() {
        let mut circuit = ladder(*rungs);
        circuit.resolve_ground().unwrap();

        group.bench_with_input(BenchmarkId::new("assemble", rungs), &circuit, |b, circuit| {
            b.iter(|| MnaSystem::assemble(circuit).unwrap());
        });

        let mna = MnaSystem::assemble(&circuit).unwrap();
        let solver = LinearSolver::new();
        group.bench_with_input(BenchmarkId::new("lu_solve", rungs), &mna, |b, mna| {
            b.iter(|| solver.solve(&mna.matrix, &mna.rhs).unwrap());
        });
    }

    group.finish();
}

fn bench_dc_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("dc_sweep");

    group.bench_function("ladder_50_sweep_100_points", |b| {
        b.iter(|| {
            let mut simulator = Simulator::new();
            simulator.load_circuit(ladder(50));
            simulator.run_dc_sweep("V1", 0.0, 9.9, 0.1).unwrap();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_simple_circuit, bench_ladder_sizes, bench_dc_sweep);
criterion_main!(benches);
