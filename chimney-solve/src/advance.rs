use chimney_core::Colony;
use nalgebra::DVector;
use ode_solvers::dop_shared::IntegrationError;
use thiserror::Error;

use crate::pressure::{self, IncidenceBundle, SolveOptions, cg};

/// State vector handed to the Runge-Kutta steppers.
type State = ode_solvers::DVector<f64>;

/// Errors that can occur while advancing a colony's conductances.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid integrator config: {reason}")]
    InvalidConfig { reason: &'static str },

    #[error("time horizon must be finite and non-negative, got {value}")]
    InvalidHorizon { value: f64 },

    #[error(
        "conductance at index {index} is {value}; \
         log-space integration requires positive conductances"
    )]
    NonPositiveConductance { index: usize, value: f64 },

    #[error("reference pressure solve failed")]
    ReferenceSolve(#[from] pressure::Error),

    #[error(transparent)]
    Integration(#[from] IntegrationError),

    #[error("integration produced a non-finite conductance at index {index}")]
    NonFiniteState { index: usize },
}

/// Adaptive Runge-Kutta methods available to the integrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Adaptive Dormand-Prince 5(4) method.
    ///
    /// An explicit embedded method that computes both 5th and 4th order
    /// solutions to estimate local truncation error and adapt the step
    /// size. A good general-purpose default for this system.
    Dopri5,

    /// Adaptive Dormand-Prince 8(5,3) method.
    ///
    /// Higher order per step, often more efficient over long horizons or
    /// at tight tolerances, at a higher cost per step than `Dopri5`.
    Dop853,
}

/// Configuration for [`advance`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    /// The adaptive stepper to use.
    pub method: Method,
    /// Absolute tolerance on the log-conductance state.
    pub abs_tol: f64,
    /// Relative tolerance on the log-conductance state.
    pub rel_tol: f64,
    /// Conjugate gradient configuration for the reference solve.
    pub cg: cg::Config,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            method: Method::Dopri5,
            abs_tol: 1e-8,
            rel_tol: 1e-6,
            cg: cg::Config::default(),
        }
    }
}

impl Config {
    /// Validates that both tolerances are finite and positive.
    ///
    /// # Errors
    ///
    /// Returns an error if either tolerance is non-finite or not positive.
    pub fn validate(&self) -> Result<(), &'static str> {
        if !self.abs_tol.is_finite() || self.abs_tol <= 0.0 {
            return Err("abs_tol must be finite and positive");
        }
        if !self.rel_tol.is_finite() || self.rel_tol <= 0.0 {
            return Err("rel_tol must be finite and positive");
        }
        Ok(())
    }
}

/// Advances the colony's conductances from time zero to `t_max`.
///
/// One reference solve at `t = 0` produces the node pressures and the
/// incidence bundle; every right-hand-side evaluation reuses them rather
/// than re-solving, trading accuracy within the step for speed. The state
/// is integrated as `L = ln C` with `dL/dt = (dC/dt) / C`, which keeps a
/// trajectory from crossing zero where the feedback law's fractional
/// powers are undefined, and the result is exponentiated back.
///
/// The input colony is not modified; the caller applies the returned
/// vector with [`Colony::apply_conductances`] wherever it should land.
///
/// # Errors
///
/// Returns an error if the config or horizon is invalid, any starting
/// conductance is not positive, the reference solve fails, or the stepper
/// gives up within its step-size limits.
pub fn advance(colony: &Colony, t_max: f64, config: &Config) -> Result<DVector<f64>, Error> {
    config
        .validate()
        .map_err(|reason| Error::InvalidConfig { reason })?;
    if !t_max.is_finite() || t_max < 0.0 {
        return Err(Error::InvalidHorizon { value: t_max });
    }

    let bundle = IncidenceBundle::new(colony.lattice());
    let reference = pressure::solve(
        colony,
        &bundle,
        &SolveOptions {
            cg: config.cg,
            ..SolveOptions::default()
        },
    )?;

    let conductances = reference.conductances;
    for (index, &value) in conductances.iter().enumerate() {
        if value <= 0.0 {
            return Err(Error::NonPositiveConductance { index, value });
        }
    }
    if t_max == 0.0 {
        return Ok(conductances);
    }

    let system = LogConductanceSystem {
        colony,
        bundle: &bundle,
        pressures: &reference.pressures,
    };
    let log_start = State::from_iterator(
        conductances.len(),
        conductances.iter().map(|&c| c.ln()),
    );

    let log_end = match config.method {
        Method::Dopri5 => {
            let mut stepper = ode_solvers::Dopri5::new(
                system,
                0.0,
                t_max,
                t_max,
                log_start,
                config.rel_tol,
                config.abs_tol,
            );
            stepper.integrate()?;
            final_state(stepper.y_out())
        }
        Method::Dop853 => {
            let mut stepper = ode_solvers::Dop853::new(
                system,
                0.0,
                t_max,
                t_max,
                log_start,
                config.rel_tol,
                config.abs_tol,
            );
            stepper.integrate()?;
            final_state(stepper.y_out())
        }
    };

    let updated = DVector::from_iterator(log_end.len(), log_end.iter().map(|&l| l.exp()));
    for (index, &value) in updated.iter().enumerate() {
        if !value.is_finite() {
            return Err(Error::NonFiniteState { index });
        }
    }
    Ok(updated)
}

fn final_state(states: &[State]) -> State {
    states
        .last()
        .expect("the stepper records at least the initial state")
        .clone()
}

/// The adaptation ODE in log-conductance space.
///
/// Each evaluation exponentiates the state back to conductances, runs the
/// feedback law against the fixed reference pressures, and converts the
/// resulting `dC/dt` to `dL/dt` by dividing through by `C`.
struct LogConductanceSystem<'a> {
    colony: &'a Colony,
    bundle: &'a IncidenceBundle,
    pressures: &'a DVector<f64>,
}

impl ode_solvers::System<f64, State> for LogConductanceSystem<'_> {
    fn system(&self, _t: f64, y: &State, dy: &mut State) {
        let conductances = DVector::from_iterator(y.len(), y.iter().map(|&l| l.exp()));
        let response =
            pressure::feedback_rates(self.colony, self.bundle, self.pressures, &conductances);
        for i in 0..y.len() {
            dy[i] = response.rate[i] / conductances[i];
        }
    }
}
