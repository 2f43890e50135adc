//! Position solvers. Pure functions from orbital parameters and simulated
//! time to positions in scene units.

pub mod circular;
pub mod ephemeris;
pub mod trajectory;
