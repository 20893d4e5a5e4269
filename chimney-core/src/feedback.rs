use nalgebra::DVector;
use thiserror::Error;

/// Errors that can occur while constructing feedback parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("invalid feedback parameters: {reason}")]
    InvalidParams { reason: &'static str },
}

/// Parameters for the conductivity adaptation law
/// `dC/dt = r * C^q * (|b * C^z * dP| - 1)`.
///
/// The exponents come from a physical scaling argument relating conduit
/// width `h` to wetted perimeter (`~ h^x`), cross-section area (`~ h^y`),
/// and conductivity (`~ h^w`): the shear-like measure scales as
/// `C^z * dP` with `z = (y - x) / w`, and the conductivity response picks
/// up `q = (w - 1) / w`. The three reference geometries are:
///
/// | geometry                           | x | y | w | z   | q   |
/// |------------------------------------|---|---|---|-----|-----|
/// | separation of parallel plates      | 0 | 1 | 3 | 1/3 | 2/3 |
/// | height of vertical parallel plates | 1 | 1 | 1 | 0   | 0   |
/// | radius of a cylindrical pipe       | 1 | 2 | 4 | 1/4 | 3/4 |
///
/// so valid ranges are `0 <= z <= 1/3` and `0 <= q <= 3/4`. Exponents
/// outside those ranges have no physical geometry behind them and
/// destabilize the fixed point, so construction rejects them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedbackParams {
    /// Rate constant scaling the whole response.
    pub r: f64,
    /// Scale constant relating conductivity and pressure drop to shear.
    pub b: f64,
    /// Conductivity exponent inside the shear measure, `(y - x) / w`.
    pub z: f64,
    /// Conductivity exponent of the adaptation rate, `(w - 1) / w`.
    pub q: f64,
}

impl FeedbackParams {
    /// Creates a validated parameter set.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is non-finite, or if `z` or `q` falls
    /// outside its documented range.
    pub fn new(r: f64, b: f64, z: f64, q: f64) -> Result<Self, Error> {
        let params = Self { r, b, z, q };
        params
            .validate()
            .map_err(|reason| Error::InvalidParams { reason })?;
        Ok(params)
    }

    /// Derives `z` and `q` from the geometric scaling exponents directly:
    /// perimeter `~ h^x`, area `~ h^y`, conductivity `~ h^w`.
    ///
    /// # Errors
    ///
    /// Returns an error if `w` is not positive or the derived exponents
    /// fall outside their valid ranges.
    pub fn from_scaling(r: f64, b: f64, x: f64, y: f64, w: f64) -> Result<Self, Error> {
        if !w.is_finite() || w <= 0.0 {
            return Err(Error::InvalidParams {
                reason: "conductivity scaling exponent w must be positive",
            });
        }
        Self::new(r, b, (y - x) / w, (w - 1.0) / w)
    }

    fn validate(&self) -> Result<(), &'static str> {
        // Allow a hair past the analytic bounds so that decimal inputs
        // like z = 0.33 for 1/3 round-trip cleanly.
        const Z_MAX: f64 = 1.0 / 3.0 + 1e-9;
        const Q_MAX: f64 = 3.0 / 4.0 + 1e-9;

        if !self.r.is_finite() {
            return Err("rate constant r must be finite");
        }
        if !self.b.is_finite() {
            return Err("scale constant b must be finite");
        }
        if !self.z.is_finite() || !(0.0..=Z_MAX).contains(&self.z) {
            return Err("conductivity exponent z must lie in [0, 1/3]");
        }
        if !self.q.is_finite() || !(0.0..=Q_MAX).contains(&self.q) {
            return Err("adaptation exponent q must lie in [0, 3/4]");
        }
        Ok(())
    }
}

/// The feedback law's output for one slice of conduits.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Rate of conductivity change, `dC/dt`, per conduit.
    pub rate: DVector<f64>,
    /// Shear-like measure `S` per conduit; `S = 1` is the fixed point
    /// where a conduit's size matches the flow it carries.
    pub shear: DVector<f64>,
}

/// Evaluates the adaptation law element-wise over one conduit slice.
///
/// `conductances` and `pressure_drops` must align index-for-index with the
/// same conduit enumeration; equal lengths are the caller's invariant.
/// Pressure drops are taken as magnitudes, so their sign convention does
/// not matter here.
pub fn response(
    conductances: &[f64],
    pressure_drops: &[f64],
    params: &FeedbackParams,
) -> Response {
    debug_assert_eq!(conductances.len(), pressure_drops.len());
    let len = conductances.len();

    let shear = DVector::from_iterator(
        len,
        conductances
            .iter()
            .zip(pressure_drops)
            .map(|(&c, &dp)| (params.b * c.powf(params.z) * dp).abs()),
    );
    let rate = DVector::from_iterator(
        len,
        conductances
            .iter()
            .zip(shear.iter())
            .map(|(&c, &s)| params.r * c.powf(params.q) * (s - 1.0)),
    );

    Response { rate, shear }
}
