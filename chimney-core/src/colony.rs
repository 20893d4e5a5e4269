use nalgebra::DVector;
use thiserror::Error;

use crate::{
    feedback::FeedbackParams,
    lattice::{self, Lattice},
};

/// Errors that can occur while constructing a colony.
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Lattice(#[from] lattice::Error),

    #[error("initial conductivity must be finite and non-negative, got {value}")]
    InvalidConductivity { value: f64 },

    #[error("incurrent flow must be finite, got {value}")]
    NonFiniteIncurrent { value: f64 },
}

/// Errors that can occur while updating colony conductivities.
///
/// Every update is validated in full before any value is written, so a
/// failed update is always a no-op.
#[derive(Debug, Error, PartialEq)]
pub enum UpdateError {
    #[error("node index list has {nodes} entries but value list has {values}")]
    LengthMismatch { nodes: usize, values: usize },

    #[error("node index {index} is out of range for {node_count} nodes")]
    IndexOutOfRange { index: usize, node_count: usize },

    #[error("conductivity for node {index} must be finite and non-negative, got {value}")]
    InvalidConductivity { index: usize, value: f64 },

    #[error("expected a full conductance vector of length {expected}, got {actual}")]
    WrongVectorLength { expected: usize, actual: usize },
}

/// The mutable state of a colony on a fixed lattice.
///
/// Holds one conductivity per internal conduit, one conductivity per
/// outflow conduit (node to the implicit outside), and one incurrent pump
/// rate per node (negative = flow into the network). The topology never
/// changes; adaptation only rewrites conductivities.
///
/// `Colony` is `Clone`, and cloning is the intended way to snapshot a
/// state before advancing it, so "before" and "after" an adaptation step
/// can be compared side by side.
#[derive(Debug, Clone)]
pub struct Colony {
    lattice: Lattice,
    inner_conduits: DVector<f64>,
    outflow_conduits: DVector<f64>,
    incurrents: DVector<f64>,
    inner_params: FeedbackParams,
    outer_params: FeedbackParams,
}

impl Colony {
    /// Creates a colony with uniform initial conductivities and incurrents.
    ///
    /// `width` and `height` are zooid columns and rows; the lattice gets
    /// `2 * width * height` nodes. `inner_conductivity` seeds every
    /// internal conduit, `outflow_conductivity` every node-to-outside
    /// conduit, and `incurrent` every node's pump rate.
    ///
    /// # Errors
    ///
    /// Returns an error if the dimensions are invalid, a conductivity is
    /// negative or non-finite, or the incurrent is non-finite.
    pub fn new(
        width: usize,
        height: usize,
        inner_conductivity: f64,
        outflow_conductivity: f64,
        incurrent: f64,
        inner_params: FeedbackParams,
        outer_params: FeedbackParams,
    ) -> Result<Self, Error> {
        let lattice = Lattice::new(width, height)?;

        for value in [inner_conductivity, outflow_conductivity] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidConductivity { value });
            }
        }
        if !incurrent.is_finite() {
            return Err(Error::NonFiniteIncurrent { value: incurrent });
        }

        let inner_conduits = DVector::from_element(lattice.edge_count(), inner_conductivity);
        let outflow_conduits = DVector::from_element(lattice.node_count(), outflow_conductivity);
        let incurrents = DVector::from_element(lattice.node_count(), incurrent);

        Ok(Self {
            lattice,
            inner_conduits,
            outflow_conduits,
            incurrents,
            inner_params,
            outer_params,
        })
    }

    /// Replaces the outflow conductivities at the listed nodes.
    ///
    /// # Errors
    ///
    /// Returns an error, without modifying any conductivity, if the lists
    /// have different lengths, an index is out of range, or a new value is
    /// negative or non-finite.
    pub fn set_outflow_conductivities(
        &mut self,
        nodes: &[usize],
        values: &[f64],
    ) -> Result<(), UpdateError> {
        if nodes.len() != values.len() {
            return Err(UpdateError::LengthMismatch {
                nodes: nodes.len(),
                values: values.len(),
            });
        }

        let node_count = self.lattice.node_count();
        for (&index, &value) in nodes.iter().zip(values) {
            if index >= node_count {
                return Err(UpdateError::IndexOutOfRange { index, node_count });
            }
            if !value.is_finite() || value < 0.0 {
                return Err(UpdateError::InvalidConductivity { index, value });
            }
        }

        for (&index, &value) in nodes.iter().zip(values) {
            self.outflow_conduits[index] = value;
        }
        Ok(())
    }

    /// The full conductance vector: internal conduits followed by outflow
    /// conduits, in the lattice's fixed enumeration order.
    pub fn conductances(&self) -> DVector<f64> {
        let inner = self.inner_conduits.len();
        let outer = self.outflow_conduits.len();
        DVector::from_iterator(
            inner + outer,
            self.inner_conduits
                .iter()
                .chain(self.outflow_conduits.iter())
                .copied(),
        )
    }

    /// Writes a full conductance vector back into the colony, splitting it
    /// at the internal/outflow boundary. This is the write-back half of an
    /// adaptation step: advancing a colony produces a new vector, and the
    /// caller decides which colony it lands in.
    ///
    /// # Errors
    ///
    /// Returns an error, without modifying any conductivity, if the vector
    /// length does not match or any value is negative or non-finite.
    pub fn apply_conductances(&mut self, conductances: &DVector<f64>) -> Result<(), UpdateError> {
        let inner = self.inner_conduits.len();
        let expected = inner + self.outflow_conduits.len();
        if conductances.len() != expected {
            return Err(UpdateError::WrongVectorLength {
                expected,
                actual: conductances.len(),
            });
        }
        for (index, &value) in conductances.iter().enumerate() {
            if !value.is_finite() || value < 0.0 {
                return Err(UpdateError::InvalidConductivity { index, value });
            }
        }

        self.inner_conduits
            .copy_from(&conductances.rows(0, inner));
        self.outflow_conduits
            .copy_from(&conductances.rows(inner, self.outflow_conduits.len()));
        Ok(())
    }

    /// The fixed lattice topology.
    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    /// Conductivities of the internal conduits.
    pub fn inner_conduits(&self) -> &DVector<f64> {
        &self.inner_conduits
    }

    /// Conductivities of the node-to-outside conduits.
    pub fn outflow_conduits(&self) -> &DVector<f64> {
        &self.outflow_conduits
    }

    /// Pump rate per node; negative values are flow into the network.
    pub fn incurrents(&self) -> &DVector<f64> {
        &self.incurrents
    }

    /// Feedback parameters for the internal conduits.
    pub fn inner_params(&self) -> &FeedbackParams {
        &self.inner_params
    }

    /// Feedback parameters for the outflow conduits.
    pub fn outer_params(&self) -> &FeedbackParams {
        &self.outer_params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    fn quiet_params() -> FeedbackParams {
        FeedbackParams::new(0.0, 0.0, 0.0, 0.5).unwrap()
    }

    fn small_colony() -> Colony {
        Colony::new(2, 2, 1.0, 0.1, -1.0, quiet_params(), quiet_params()).unwrap()
    }

    #[test]
    fn uniform_construction() {
        let colony = small_colony();
        assert_eq!(colony.inner_conduits().len(), colony.lattice().edge_count());
        assert_eq!(
            colony.outflow_conduits().len(),
            colony.lattice().node_count()
        );
        assert!(colony.inner_conduits().iter().all(|&c| c == 1.0));
        assert!(colony.outflow_conduits().iter().all(|&c| c == 0.1));
        assert!(colony.incurrents().iter().all(|&q| q == -1.0));
    }

    #[test]
    fn rejects_bad_initial_values() {
        let params = quiet_params();
        assert!(matches!(
            Colony::new(2, 2, -1.0, 0.1, -1.0, params, params),
            Err(Error::InvalidConductivity { .. })
        ));
        assert!(matches!(
            Colony::new(2, 2, 1.0, f64::NAN, -1.0, params, params),
            Err(Error::InvalidConductivity { .. })
        ));
        assert!(matches!(
            Colony::new(2, 2, 1.0, 0.1, f64::INFINITY, params, params),
            Err(Error::NonFiniteIncurrent { .. })
        ));
        assert!(matches!(
            Colony::new(0, 2, 1.0, 0.1, -1.0, params, params),
            Err(Error::Lattice(lattice::Error::InvalidDimensions { .. }))
        ));
    }

    #[test]
    fn outflow_update_applies_in_order() {
        let mut colony = small_colony();
        colony
            .set_outflow_conductivities(&[1, 5], &[2.0, 0.0])
            .unwrap();
        assert_relative_eq!(colony.outflow_conduits()[1], 2.0);
        assert_relative_eq!(colony.outflow_conduits()[5], 0.0);
        assert_relative_eq!(colony.outflow_conduits()[0], 0.1);
    }

    #[test]
    fn rejected_updates_leave_state_unchanged() {
        let mut colony = small_colony();
        let before = colony.outflow_conduits().clone();

        // Negative conductivity: even the valid leading entry must not land.
        let result = colony.set_outflow_conductivities(&[0, 1], &[-1.0, 2.0]);
        assert_eq!(
            result,
            Err(UpdateError::InvalidConductivity {
                index: 0,
                value: -1.0
            })
        );
        assert_eq!(colony.outflow_conduits(), &before);

        let result = colony.set_outflow_conductivities(&[0], &[1.0, 2.0]);
        assert_eq!(
            result,
            Err(UpdateError::LengthMismatch {
                nodes: 1,
                values: 2
            })
        );
        assert_eq!(colony.outflow_conduits(), &before);

        let result = colony.set_outflow_conductivities(&[99], &[1.0]);
        assert_eq!(
            result,
            Err(UpdateError::IndexOutOfRange {
                index: 99,
                node_count: 8
            })
        );
        assert_eq!(colony.outflow_conduits(), &before);
    }

    #[test]
    fn conductance_vector_round_trips() {
        let mut colony = small_colony();
        let mut full = colony.conductances();
        assert_eq!(
            full.len(),
            colony.lattice().edge_count() + colony.lattice().node_count()
        );

        // Perturb and write back; the split must respect the enumeration.
        full[0] = 3.0;
        full[colony.lattice().edge_count()] = 4.0;
        colony.apply_conductances(&full).unwrap();
        assert_relative_eq!(colony.inner_conduits()[0], 3.0);
        assert_relative_eq!(colony.outflow_conduits()[0], 4.0);

        let short = DVector::from_element(3, 1.0);
        assert!(matches!(
            colony.apply_conductances(&short),
            Err(UpdateError::WrongVectorLength { .. })
        ));
    }
}
