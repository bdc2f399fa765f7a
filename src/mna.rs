use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::circuit::{Circuit, ElementKind, NodeId};
use crate::error::{CircuitError, CircuitResult};

/// MNA system representation: [A][x] = [z]
/// where A is the system matrix, x is the unknown vector, and z is the RHS vector
#[derive(Debug, Clone)]
pub struct MnaSystem {
    /// System matrix A (coefficient matrix)
    pub matrix: DMatrix<f64>,
    /// Right-hand side vector z
    pub rhs: DVector<f64>,
    /// Unknown vector x (node voltages + voltage source currents)
    pub unknowns: DVector<f64>,
    /// Matrix row/column per node id, `None` for ground
    pub node_map: Vec<Option<usize>>,
    /// Total system size
    pub size: usize,
    /// Number of nodes (excluding ground)
    pub num_nodes: usize,
    /// Number of voltage sources
    pub num_voltage_sources: usize,
}

/// Resistors joining one node to the same neighbour
#[derive(Debug, Clone, PartialEq)]
struct ParallelGroup {
    other: NodeId,
    count: usize,
    conductance: f64,
}

/// Group the resistors incident to `node` by the node on their other side
fn group_resistors(circuit: &Circuit, node: NodeId) -> Vec<ParallelGroup> {
    let mut groups: Vec<ParallelGroup> = Vec::new();
    let Some(incident) = circuit.node(node).map(|node| node.elements()) else {
        return groups;
    };

    for element in incident.iter().filter_map(|&id| circuit.element(id)) {
        let (Some(conductance), Some(other)) = (element.conductance(), element.other_node(node)) else {
            continue;
        };
        match groups.iter_mut().find(|group| group.other == other) {
            Some(group) => {
                group.count += 1;
                group.conductance += conductance;
            }
            None => groups.push(ParallelGroup {
                other,
                count: 1,
                conductance,
            }),
        }
    }
    groups
}

impl MnaSystem {
    /// Size the system for a circuit whose ground has been resolved
    pub fn new(circuit: &Circuit) -> CircuitResult<Self> {
        let ground = circuit.ground().ok_or(CircuitError::GroundNotResolved)?;

        // Non-ground nodes keep their id order; rows stay dense wherever the
        // ground sits.
        let mut node_map = Vec::with_capacity(circuit.nodes().len());
        let mut index = 0;
        for node in circuit.nodes() {
            if node.id == ground {
                node_map.push(None);
            } else {
                node_map.push(Some(index));
                index += 1;
            }
        }

        let num_nodes = index;
        let num_voltage_sources = circuit.num_voltage_sources();
        let size = num_nodes + num_voltage_sources;

        Ok(MnaSystem {
            matrix: DMatrix::zeros(size, size),
            rhs: DVector::zeros(size),
            unknowns: DVector::zeros(size),
            node_map,
            size,
            num_nodes,
            num_voltage_sources,
        })
    }

    /// Build A and z for the circuit's DC operating point
    pub fn assemble(circuit: &Circuit) -> CircuitResult<Self> {
        let mut system = MnaSystem::new(circuit)?;
        system.assemble_dc(circuit)?;
        Ok(system)
    }

    /// Re-stamp the system from the circuit's current element values
    pub fn assemble_dc(&mut self, circuit: &Circuit) -> CircuitResult<()> {
        if circuit.nodes().len() != self.node_map.len() || circuit.num_voltage_sources() != self.num_voltage_sources {
            return Err(CircuitError::singular("circuit topology changed after sizing"));
        }

        self.matrix.fill(0.0);
        self.rhs.fill(0.0);

        for source in circuit.voltage_sources() {
            if let ElementKind::VoltageSource { voltage, branch, .. } = source.kind {
                let index = self.branch_index(branch);
                self.rhs[index] = voltage;
            }
        }

        for node in circuit.nodes() {
            if let Some(row) = self.node_index(node.id) {
                self.stamp_node(circuit, node.id, row);
            }
        }

        debug!("MNA matrix A: {}", self.matrix);
        debug!("MNA vector z: {}", self.rhs);
        Ok(())
    }

    /// Stamp every element incident to one non-ground node into its row
    fn stamp_node(&mut self, circuit: &Circuit, node: NodeId, row: usize) {
        let groups = group_resistors(circuit, node);
        let Some(incident) = circuit.node(node).map(|node| node.elements()) else {
            return;
        };

        for element in incident.iter().filter_map(|&id| circuit.element(id)) {
            let Some(other) = element.other_node(node) else {
                continue;
            };
            let positive = element.positive == node;

            match element.kind {
                ElementKind::Resistor { resistance } => {
                    let conductance = 1.0 / resistance;
                    self.matrix[(row, row)] += conductance;

                    // Ground-side terminals only touch the diagonal
                    let Some(col) = self.node_index(other) else {
                        continue;
                    };
                    match groups.iter().find(|group| group.other == other) {
                        Some(group) if group.count > 1 => {
                            // Overwrite: every resistor of the group lands here
                            self.matrix[(row, col)] = -group.conductance;
                        }
                        _ => self.matrix[(row, col)] -= conductance,
                    }
                }
                ElementKind::VoltageSource { branch, .. } => {
                    let col = self.branch_index(branch);
                    let sign = if positive { 1.0 } else { -1.0 };
                    self.matrix[(row, col)] = sign;
                    self.matrix[(col, row)] = sign;
                }
                ElementKind::CurrentSource { current, .. } => {
                    if positive {
                        self.rhs[row] += current;
                    } else {
                        self.rhs[row] -= current;
                    }
                }
            }
        }
    }

    /// Row/column of a node, `None` for ground
    pub fn node_index(&self, node: NodeId) -> Option<usize> {
        self.node_map.get(node.0).copied().flatten()
    }

    /// Row/column of the voltage source with branch index `branch`
    pub fn branch_index(&self, branch: usize) -> usize {
        self.num_nodes + branch
    }

    /// Update the solution vector
    pub fn update_solution(&mut self, solution: &DVector<f64>) -> CircuitResult<()> {
        if solution.len() != self.size {
            return Err(CircuitError::singular(format!(
                "solution vector size mismatch: expected {}, got {}",
                self.size,
                solution.len()
            )));
        }
        self.unknowns.copy_from(solution);
        Ok(())
    }

    /// Get node voltage by node ID
    pub fn node_voltage(&self, node: NodeId) -> f64 {
        self.node_index(node).map_or(0.0, |index| self.unknowns[index])
    }

    /// Get the solved current of the voltage source with branch index `branch`
    pub fn voltage_source_current(&self, branch: usize) -> Option<f64> {
        (branch < self.num_voltage_sources).then(|| self.unknowns[self.branch_index(branch)])
    }

    /// Write the stored solution back onto the circuit
    pub fn distribute(&self, circuit: &mut Circuit) -> CircuitResult<()> {
        if circuit.nodes().len() != self.node_map.len() {
            return Err(CircuitError::singular("circuit topology changed after solving"));
        }

        let voltages: Vec<(NodeId, f64)> = circuit
            .nodes()
            .iter()
            .map(|node| (node.id, self.node_voltage(node.id)))
            .collect();
        for (node, voltage) in voltages {
            circuit.set_node_voltage(node, voltage);
        }

        let sources = circuit.voltage_source_ids().to_vec();
        for (branch, source) in sources.into_iter().enumerate() {
            if let Some(current) = self.voltage_source_current(branch) {
                circuit.set_source_current(source, current);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::LinearSolver;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-10,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    fn solve(circuit: &mut Circuit) -> CircuitResult<MnaSystem> {
        circuit.resolve_ground()?;
        let mut mna = MnaSystem::assemble(circuit)?;
        let (solution, _) = LinearSolver::new().solve(&mna.matrix, &mna.rhs)?;
        mna.update_solution(&solution)?;
        mna.distribute(circuit)?;
        Ok(mna)
    }

    fn series_circuit() -> Circuit {
        let mut circuit = Circuit::new("series");
        circuit.add_node("N1");
        circuit.add_node("N2");
        circuit.add_voltage_source("V1", "N1", "N2", 10.0).unwrap();
        circuit.add_resistor("R1", "N1", "N2", 5.0).unwrap();
        circuit
    }

    #[test]
    fn test_series_circuit_structure() {
        let mut circuit = series_circuit();
        circuit.resolve_ground().unwrap();
        let mna = MnaSystem::assemble(&circuit).unwrap();

        assert_eq!(mna.size, 2);
        assert_eq!(mna.num_nodes, 1);
        assert_eq!(mna.num_voltage_sources, 1);
        assert_eq!(mna.matrix, DMatrix::from_row_slice(2, 2, &[0.2, 1.0, 1.0, 0.0]));
        assert_eq!(mna.rhs, DVector::from_vec(vec![0.0, 10.0]));
    }

    #[test]
    fn test_series_circuit_round_trip() {
        let mut circuit = series_circuit();
        solve(&mut circuit).unwrap();

        assert_close(circuit.node_by_name("N1").unwrap().voltage, 10.0);
        assert_eq!(circuit.node_by_name("N2").unwrap().voltage, 0.0);

        let v1 = circuit.element_id("V1").unwrap();
        assert_close(circuit.element_current(v1).unwrap(), -2.0);
        assert_close(circuit.resistor_current("R1").unwrap(), -2.0);
    }

    fn parallel_pair(resistors: &[f64]) -> MnaSystem {
        let mut circuit = Circuit::new("parallel");
        circuit.add_node("a");
        circuit.add_node("b");
        circuit.add_node("gnd");
        for (i, &ohms) in resistors.iter().enumerate() {
            circuit.add_resistor(&format!("Rp{}", i), "a", "b", ohms).unwrap();
        }
        circuit.add_resistor("Ra", "a", "gnd", 10.0).unwrap();
        circuit.add_resistor("Rb", "b", "gnd", 20.0).unwrap();
        circuit.add_current_source("I1", "a", "gnd", 1.0).unwrap();
        circuit.resolve_ground().unwrap();
        MnaSystem::assemble(&circuit).unwrap()
    }

    #[test]
    fn test_parallel_resistors_collapse_to_equivalent() {
        let (r1, r2) = (2.0, 3.0);
        let pair = parallel_pair(&[r1, r2]);
        let equivalent = parallel_pair(&[(r1 * r2) / (r1 + r2)]);

        assert_close(pair.matrix[(0, 1)], -1.0 / 1.2);
        assert_close(pair.matrix[(1, 0)], -1.0 / 1.2);
        for i in 0..2 {
            for j in 0..2 {
                assert_close(pair.matrix[(i, j)], equivalent.matrix[(i, j)]);
            }
        }
    }

    #[test]
    fn test_three_parallel_resistors() {
        let mna = parallel_pair(&[1.0, 2.0, 4.0]);
        assert_close(mna.matrix[(0, 1)], -1.75);
        assert_close(mna.matrix[(0, 0)], 1.75 + 0.1);
        assert_close(mna.matrix[(1, 1)], 1.75 + 0.05);
    }

    #[test]
    fn test_resistor_to_ground_touches_diagonal_only() {
        let mna = parallel_pair(&[1.0]);
        assert_close(mna.matrix[(0, 0)], 1.1);
        assert_close(mna.matrix[(1, 1)], 1.05);
        assert_close(mna.matrix[(0, 1)], -1.0);
        assert_eq!(mna.size, 2);
    }

    #[test]
    fn test_current_sources_accumulate_per_node() {
        let mut circuit = Circuit::new("currents");
        circuit.add_node("a");
        circuit.add_node("b");
        circuit.add_node("gnd");
        circuit.add_current_source("I1", "a", "gnd", 1.0).unwrap();
        circuit.add_resistor("R1", "a", "b", 1.0).unwrap();
        circuit.add_current_source("I2", "a", "gnd", 2.5).unwrap();
        circuit.add_current_source("I3", "b", "a", 0.5).unwrap();
        circuit.add_resistor("R2", "b", "gnd", 1.0).unwrap();
        circuit.resolve_ground().unwrap();
        let mna = MnaSystem::assemble(&circuit).unwrap();

        assert_close(mna.rhs[0], 1.0 + 2.5 - 0.5);
        assert_close(mna.rhs[1], 0.5);
    }

    #[test]
    fn test_voltage_source_stamps() {
        let mut circuit = Circuit::new("sources");
        for name in ["a", "b", "c"] {
            circuit.add_node(name);
        }
        circuit.add_voltage_source("V1", "a", "b", 1.0).unwrap();
        circuit.add_voltage_source("V2", "b", "c", 2.0).unwrap();
        circuit.add_resistor("R1", "a", "c", 1.0).unwrap();
        circuit.resolve_ground().unwrap();
        let mna = MnaSystem::assemble(&circuit).unwrap();

        assert_eq!(mna.size, 4);
        assert_eq!(mna.matrix[(0, 2)], 1.0);
        assert_eq!(mna.matrix[(2, 0)], 1.0);
        assert_eq!(mna.matrix[(1, 2)], -1.0);
        assert_eq!(mna.matrix[(2, 1)], -1.0);
        assert_eq!(mna.matrix[(1, 3)], 1.0);
        assert_eq!(mna.matrix[(3, 1)], 1.0);
        assert_eq!(mna.matrix[(0, 3)], 0.0);
        assert_eq!(mna.rhs, DVector::from_vec(vec![0.0, 0.0, 1.0, 2.0]));
    }

    #[test]
    fn test_current_sources_add_no_unknowns() {
        let mut circuit = Circuit::new("mixed");
        for name in ["a", "b", "c"] {
            circuit.add_node(name);
        }
        circuit.add_current_source("I1", "a", "c", 1.0).unwrap();
        circuit.add_voltage_source("V1", "b", "c", 3.0).unwrap();
        circuit.add_resistor("R1", "a", "b", 2.0).unwrap();
        circuit.resolve_ground().unwrap();
        let mna = MnaSystem::assemble(&circuit).unwrap();

        assert_eq!(mna.size, 3);
        assert_eq!(mna.branch_index(0), 2);
        assert_eq!(mna.rhs[2], 3.0);
        assert_eq!(mna.matrix[(1, 2)], 1.0);
    }

    #[test]
    fn test_ground_in_the_middle_keeps_rows_dense() {
        let mut circuit = Circuit::new("divider");
        circuit.add_node("top");
        circuit.add_node("gnd");
        circuit.add_node("mid");
        circuit.add_voltage_source("V1", "top", "gnd", 9.0).unwrap();
        circuit.add_resistor("R1", "top", "mid", 1000.0).unwrap();
        circuit.add_resistor("R2", "mid", "gnd", 2000.0).unwrap();

        let mna = solve(&mut circuit).unwrap();
        assert_eq!(mna.node_map, vec![Some(0), None, Some(1)]);
        assert_close(circuit.node_by_name("top").unwrap().voltage, 9.0);
        assert_close(circuit.node_by_name("mid").unwrap().voltage, 6.0);
        assert_close(mna.voltage_source_current(0).unwrap(), -0.003);
    }

    #[test]
    fn test_source_free_circuit_grounds_last_node() {
        let mut circuit = Circuit::new("passive");
        for name in ["a", "b", "c"] {
            circuit.add_node(name);
        }
        circuit.add_resistor("R1", "a", "b", 10.0).unwrap();
        circuit.add_resistor("R2", "b", "c", 20.0).unwrap();

        let mna = solve(&mut circuit).unwrap();
        assert_eq!(mna.size, 2);
        let ground = circuit.node_by_name("c").unwrap();
        assert!(ground.is_ground);
        assert_eq!(ground.voltage, 0.0);
        assert_close(circuit.node_by_name("a").unwrap().voltage, 0.0);
    }

    #[test]
    fn test_isolated_node_gives_singular_system() {
        let mut circuit = Circuit::new("floating");
        circuit.add_node("N1");
        circuit.add_node("ISO");
        circuit.add_node("N2");
        circuit.add_voltage_source("V1", "N1", "N2", 10.0).unwrap();
        circuit.add_resistor("R1", "N1", "N2", 5.0).unwrap();

        assert_eq!(circuit.check().isolated_nodes, vec!["ISO".to_string()]);

        circuit.resolve_ground().unwrap();
        let mna = MnaSystem::assemble(&circuit).unwrap();
        let iso = mna.node_index(NodeId(1)).unwrap();
        assert!(mna.matrix.row(iso).iter().all(|&value| value == 0.0));
        assert!(mna.matrix.column(iso).iter().all(|&value| value == 0.0));

        let result = LinearSolver::new().solve(&mna.matrix, &mna.rhs);
        assert!(matches!(result, Err(CircuitError::SingularSystem { .. })));
    }

    #[test]
    fn test_assembly_requires_ground() {
        let circuit = series_circuit();
        assert_eq!(
            MnaSystem::assemble(&circuit).unwrap_err(),
            CircuitError::GroundNotResolved
        );
    }

    #[test]
    fn test_single_node_has_zero_dimension() {
        let mut circuit = Circuit::new("lonely");
        circuit.add_node("only");
        let result = solve(&mut circuit);
        assert!(matches!(result, Err(CircuitError::SingularSystem { .. })));
    }
}
