//! Domain model for a flow-regulated resistive network.
//!
//! A colony is a sheet-like lattice of nodes joined by conduits whose
//! conductivities adapt to the flow they carry. This crate holds the
//! topology builder, the mutable colony state, and the local feedback
//! law that maps flow onto a rate of conductivity change. The numerical
//! engines that close the adaptation loop live in `chimney-solve`.

pub mod colony;
pub mod feedback;
pub mod lattice;

pub use colony::Colony;
pub use feedback::FeedbackParams;
pub use lattice::Lattice;
