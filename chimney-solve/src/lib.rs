//! Numerical engines for the chimney network model.
//!
//! [`pressure`] solves the steady-state Kirchhoff system for node
//! pressures and edge flows; [`advance`] integrates the conductivity
//! feedback law forward in time, closing the adaptation loop around a
//! [`chimney_core::Colony`].

pub mod advance;
pub mod pressure;
