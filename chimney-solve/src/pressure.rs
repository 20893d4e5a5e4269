pub mod cg;

use chimney_core::{
    Colony,
    feedback::{self, Response},
    lattice::Lattice,
};
use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use thiserror::Error;

/// Errors that can occur during a steady-state network solve.
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("invalid solver config: {reason}")]
    InvalidConfig { reason: &'static str },

    #[error("conductance vector has length {actual}, expected {expected}")]
    ConductanceLength { expected: usize, actual: usize },

    #[error("warm-start pressure vector has length {actual}, expected {expected}")]
    WarmStartLength { expected: usize, actual: usize },

    #[error(transparent)]
    Cg(#[from] cg::Error),
}

/// The extended incidence operator for a lattice, reusable across solves.
///
/// Extends the lattice's internal incidence matrix with one row per
/// outflow conduit, each carrying a single `-1` at its node. The implicit
/// outside node gets no column: giving it one would leave pressures
/// determined only up to an additive constant, so the outside is pinned
/// at zero by construction.
///
/// Rows align with the full conductance vector: internal conduits first,
/// in the lattice's enumeration order, then one outflow row per node.
/// Building the operator (and its cached transpose) costs more than a
/// single solve, so callers performing repeated solves construct one
/// bundle and pass it explicitly.
#[derive(Debug, Clone)]
pub struct IncidenceBundle {
    extended: CsrMatrix<f64>,
    transposed: CsrMatrix<f64>,
    inner_count: usize,
    node_count: usize,
}

impl IncidenceBundle {
    /// Builds the extended incidence operator for a lattice.
    pub fn new(lattice: &Lattice) -> Self {
        let inner_count = lattice.edge_count();
        let node_count = lattice.node_count();

        let mut coo = CooMatrix::new(inner_count + node_count, node_count);
        for (edge, (&tail, &head)) in lattice.tails().iter().zip(lattice.heads()).enumerate() {
            coo.push(edge, tail, -1.0);
            coo.push(edge, head, 1.0);
        }
        for node in 0..node_count {
            coo.push(inner_count + node, node, -1.0);
        }

        let extended = CsrMatrix::from(&coo);
        let transposed = extended.transpose();
        Self {
            extended,
            transposed,
            inner_count,
            node_count,
        }
    }

    /// The extended incidence matrix, one row per conduit.
    pub fn matrix(&self) -> &CsrMatrix<f64> {
        &self.extended
    }

    /// Number of internal conduits (rows before the outflow block).
    pub fn inner_count(&self) -> usize {
        self.inner_count
    }

    /// Number of nodes, and therefore of outflow conduits.
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Total conduit count: internal plus outflow.
    pub fn conduit_count(&self) -> usize {
        self.inner_count + self.node_count
    }

    /// Forms the conductance-weighted Laplacian `K = Aᵀ · diag(C) · A`.
    pub fn weighted_laplacian(&self, conductances: &DVector<f64>) -> CsrMatrix<f64> {
        let rows = self.conduit_count();
        let mut diagonal = CooMatrix::new(rows, rows);
        for (conduit, &c) in conductances.iter().enumerate() {
            diagonal.push(conduit, conduit, c);
        }
        let weighted = &CsrMatrix::from(&diagonal) * &self.extended;
        &self.transposed * &weighted
    }

    /// Signed flow along each conduit, `f = diag(C) · A · p`.
    ///
    /// Positive flow runs tail to head for internal conduits and node to
    /// outside for outflow conduits.
    pub fn flows(&self, conductances: &DVector<f64>, pressures: &DVector<f64>) -> DVector<f64> {
        conductances.component_mul(&(&self.extended * pressures))
    }

    /// Magnitude of the pressure difference across each conduit.
    pub fn pressure_drops(&self, pressures: &DVector<f64>) -> DVector<f64> {
        (&self.extended * pressures).abs()
    }
}

/// Options for [`solve`].
#[derive(Debug, Clone, Default)]
pub struct SolveOptions<'a> {
    /// Conductance vector to solve with, overriding the colony's current
    /// state. Must match the bundle's conduit count. `None` uses the
    /// colony's concatenated conductances.
    pub conductances: Option<&'a DVector<f64>>,

    /// Pressure vector seeding the iterative solve. A previous solution
    /// for nearby conductances cuts the solve cost dramatically.
    pub warm_start: Option<&'a DVector<f64>>,

    /// Compute signed conduit flows from the solved pressures.
    pub compute_flows: bool,

    /// Evaluate the feedback law on the solved pressure drops.
    pub compute_feedback: bool,

    /// Conjugate gradient configuration.
    pub cg: cg::Config,
}

/// The output of a steady-state network solve.
#[derive(Debug, Clone)]
pub struct Solution {
    /// Node pressures satisfying Kirchhoff's current law.
    pub pressures: DVector<f64>,

    /// The conductance vector the solve actually used.
    pub conductances: DVector<f64>,

    /// Signed flow per conduit, if requested.
    pub flows: Option<DVector<f64>>,

    /// Shear-like measure `S` per conduit, if feedback was requested.
    pub shear: Option<DVector<f64>>,

    /// Conductivity adaptation rate `dC/dt` per conduit, if requested.
    pub rates: Option<DVector<f64>>,

    /// Conjugate gradient iterations taken.
    pub iterations: usize,
}

/// Solves the steady-state pressure system for a colony.
///
/// Forms `Aᵀ · diag(C) · A · p = q` from the extended incidence `A`, the
/// conductance vector `C`, and the per-node incurrents `q`, and solves it
/// for the node pressures `p` by conjugate gradient. Flows and feedback
/// rates are derived from `p` on request.
///
/// # Errors
///
/// Returns an error if the options are inconsistent with the bundle, the
/// config is invalid, or the pressure solve fails to converge.
pub fn solve(
    colony: &Colony,
    bundle: &IncidenceBundle,
    options: &SolveOptions,
) -> Result<Solution, Error> {
    options
        .cg
        .validate()
        .map_err(|reason| Error::InvalidConfig { reason })?;

    let conductances = match options.conductances {
        Some(c) => {
            if c.len() != bundle.conduit_count() {
                return Err(Error::ConductanceLength {
                    expected: bundle.conduit_count(),
                    actual: c.len(),
                });
            }
            c.clone()
        }
        None => colony.conductances(),
    };

    if let Some(seed) = options.warm_start {
        if seed.len() != bundle.node_count() {
            return Err(Error::WarmStartLength {
                expected: bundle.node_count(),
                actual: seed.len(),
            });
        }
    }

    let system = bundle.weighted_laplacian(&conductances);
    let solved = cg::solve(&system, colony.incurrents(), options.warm_start, &options.cg)?;
    let pressures = solved.x;

    let flows = options
        .compute_flows
        .then(|| bundle.flows(&conductances, &pressures));

    let (shear, rates) = if options.compute_feedback {
        let response = feedback_rates(colony, bundle, &pressures, &conductances);
        (Some(response.shear), Some(response.rate))
    } else {
        (None, None)
    };

    Ok(Solution {
        pressures,
        conductances,
        flows,
        shear,
        rates,
        iterations: solved.iterations,
    })
}

/// Evaluates the feedback law against a given pressure field.
///
/// Pressure drops are recovered from `pressures` through the bundle, the
/// conductance vector is split at the internal/outflow boundary, each
/// slice runs through its own parameter set, and the results are
/// concatenated back in the same order. No pressure solve happens here:
/// the conductance integrator calls this with the reference pressures
/// from a single solve at the start of a step.
pub fn feedback_rates(
    colony: &Colony,
    bundle: &IncidenceBundle,
    pressures: &DVector<f64>,
    conductances: &DVector<f64>,
) -> Response {
    let drops = bundle.pressure_drops(pressures);
    let split = bundle.inner_count();

    let conductances = conductances.as_slice();
    let drops = drops.as_slice();

    let inner = feedback::response(
        &conductances[..split],
        &drops[..split],
        colony.inner_params(),
    );
    let outer = feedback::response(
        &conductances[split..],
        &drops[split..],
        colony.outer_params(),
    );

    Response {
        rate: concatenate(&inner.rate, &outer.rate),
        shear: concatenate(&inner.shear, &outer.shear),
    }
}

fn concatenate(first: &DVector<f64>, second: &DVector<f64>) -> DVector<f64> {
    DVector::from_iterator(
        first.len() + second.len(),
        first.iter().chain(second.iter()).copied(),
    )
}
