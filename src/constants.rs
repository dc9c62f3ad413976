//! Physical constants for primary drying.
//!
//! All values are in the CGS-derived unit system used throughout the model:
//! lengths in cm, areas in cm², masses in g (kg only at the batch level),
//! pressures in Torr, temperatures in °C, heat in cal, time in hours with
//! explicit conversion to seconds where a correlation demands it.

/// Antoine-type pre-exponential coefficient for vapor pressure over ice \[Torr\].
pub const VAPOR_PRESSURE_C1: f64 = 2.698e10;

/// Antoine-type exponential coefficient for vapor pressure over ice \[K\].
pub const VAPOR_PRESSURE_C2: f64 = 6144.96;

/// Heat of sublimation of ice \[cal/g\].
pub const DHS_SUBLIMATION: f64 = 678.0;

/// Density of ice \[g/cm³\].
pub const RHO_ICE: f64 = 0.917;

/// Thermal conductivity of ice \[cal/s/cm/K\].
pub const K_ICE: f64 = 0.0059;

/// Density of the aqueous solution before freezing \[g/cm³\].
pub const RHO_SOLUTION: f64 = 1.0;

/// Density of the dissolved solids \[g/cm³\].
pub const RHO_SOLUTE: f64 = 1.13;

/// Celsius to Kelvin offset.
pub const CELSIUS_TO_KELVIN: f64 = 273.15;

/// Hours to seconds.
pub const HR_TO_S: f64 = 3600.0;

/// Kilograms to grams.
pub const KG_TO_G: f64 = 1000.0;

/// cm² to m² (for flux reporting).
pub const CM2_TO_M2: f64 = 1e-4;

/// Torr to milli-Torr (external trajectory convention).
pub const TORR_TO_MTORR: f64 = 1000.0;

/// Default drying completion target (fraction of the initial frozen layer).
pub const COMPLETION_TARGET: f64 = 0.99;

/// Completion tolerance allowed by trajectory post-checks.
pub const COMPLETION_CHECK_TOL: f64 = 1e-3;
