//! End-to-end scenario from the reference demonstration: a 6x7-zooid
//! colony with a single opened outflow conduit, solved for pressures and
//! advanced one adaptation step.

use approx::assert_relative_eq;
use chimney_core::{Colony, FeedbackParams};
use chimney_solve::{
    advance::{self, advance},
    pressure::{self, IncidenceBundle, SolveOptions},
};

/// The demonstration colony: uniform internal conductivity 1, outflow
/// conductivity 0.1 everywhere except node 41 opened to 1, and incurrent
/// pumping of -1 at every node.
fn demonstration_colony() -> Colony {
    let inner = FeedbackParams::new(10.0, 1.0, 0.33, 0.67).unwrap();
    let outer = FeedbackParams::new(10.0, 0.5, 0.25, 0.75).unwrap();
    let mut colony = Colony::new(6, 7, 1.0, 0.1, -1.0, inner, outer).unwrap();
    colony.set_outflow_conductivities(&[41], &[1.0]).unwrap();
    colony
}

#[test]
fn demonstration_lattice_has_the_expected_shape() {
    let colony = demonstration_colony();
    let lattice = colony.lattice();

    assert_eq!(lattice.node_count(), 84);
    assert_eq!(colony.outflow_conduits().len(), 84);
    assert_relative_eq!(colony.outflow_conduits()[41], 1.0);
    assert_relative_eq!(colony.outflow_conduits()[40], 0.1);

    let bundle = IncidenceBundle::new(lattice);
    assert_eq!(
        bundle.matrix().nrows(),
        lattice.edge_count() + lattice.node_count()
    );
    assert_eq!(bundle.matrix().ncols(), lattice.node_count());
}

#[test]
fn solved_pressures_conserve_flow_at_every_node() {
    let colony = demonstration_colony();
    let bundle = IncidenceBundle::new(colony.lattice());

    let solution = pressure::solve(
        &colony,
        &bundle,
        &SolveOptions {
            compute_flows: true,
            ..SolveOptions::default()
        },
    )
    .unwrap();

    // Kirchhoff: the net signed flow out of each node matches its pump
    // rate. The residual bound is far tighter than the 1e-6 the scenario
    // requires.
    let flows = solution.flows.unwrap();
    let net = bundle.matrix().transpose() * &flows;
    for (node, (&actual, &expected)) in net.iter().zip(colony.incurrents().iter()).enumerate() {
        assert!(
            (actual - expected).abs() < 1e-6,
            "node {node}: net flow {actual} vs incurrent {expected}"
        );
    }

    // The opened conduit at node 41 dominates the colony's outflow.
    let outflow = flows.rows(bundle.inner_count(), bundle.node_count());
    let mut widest = 0;
    for (node, &flow) in outflow.iter().enumerate() {
        if flow > outflow[widest] {
            widest = node;
        }
    }
    assert_eq!(widest, 41);
}

#[test]
fn one_adaptation_step_feeds_the_chimney() {
    let colony = demonstration_colony();
    let before = colony.conductances();

    let after = advance(&colony, 0.05, &advance::Config::default()).unwrap();

    assert_eq!(after.len(), before.len());
    assert!(after.iter().all(|&c| c.is_finite() && c > 0.0));

    // The opened outflow conduit carries far more than its share of flow,
    // so the feedback law grows it and it stays the widest outflow path.
    let split = colony.lattice().edge_count();
    assert!(after[split + 41] > before[split + 41]);
    for node in 0..colony.lattice().node_count() {
        if node != 41 {
            assert!(after[split + 41] > after[split + node]);
        }
    }

    // Internal conduits far from the chimney see almost no pressure
    // difference, so their shear measure sits below 1 and they shrink.
    assert!(after[0] < before[0]);

    // Applying the result into a cloned colony leaves the original as the
    // "before" snapshot.
    let mut adapted = colony.clone();
    adapted.apply_conductances(&after).unwrap();
    assert_eq!(colony.conductances(), before);
    assert_relative_eq!(adapted.conductances(), after);
}
