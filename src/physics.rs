//! Closed-form physics kernel for primary drying.
//!
//! Pure, stateless relations shared by the continuous model, the warm-start
//! adapter, and the trajectory post-checks. Every function that enters a
//! residual is generic over the [`Scalar`](crate::Scalar) type so the same
//! expression evaluates with `f64` values, first-order duals (Jacobians),
//! and hyper-duals (Lagrangian Hessians).
//!
//! All functions are continuously differentiable on the variable bounds the
//! optimizer enforces, and monotone where physically expected: vapor
//! pressure is strictly increasing in temperature, cake resistance is
//! non-decreasing in dried-cake length. Callers are responsible for keeping
//! arguments inside those bounds; there are no other failure modes.

use crate::Scalar;
use crate::constants::*;

/// Saturation vapor pressure over ice \[Torr\] at temperature `t` \[°C\].
///
/// `Psub = C1 · exp(−C2 / (T + 273.15))`
pub fn vapor_pressure<S: Scalar>(t: S) -> S {
    ((t + CELSIUS_TO_KELVIN).recip() * (-VAPOR_PRESSURE_C2)).exp() * VAPOR_PRESSURE_C1
}

/// Natural logarithm of the saturation vapor pressure at `t` \[°C\].
///
/// The optimizer carries this log form as its own variable; splitting the
/// Antoine relation into a log equation plus an exponential recovery keeps
/// the Jacobian scale bounded over the full temperature range.
pub fn ln_vapor_pressure<S: Scalar>(t: S) -> S {
    -(t + CELSIUS_TO_KELVIN).recip() * VAPOR_PRESSURE_C2 + VAPOR_PRESSURE_C1.ln()
}

/// Dried-cake mass-transfer resistance \[cm²·hr·Torr/g\].
///
/// `Rp = R0 + A1·Lck / (1 + A2·Lck)`
pub fn cake_resistance<S: Scalar>(lck: S, r0: f64, a1: f64, a2: f64) -> S {
    lck * a1 / (lck * a2 + 1.0) + r0
}

/// Vial heat-transfer coefficient \[cal/s/K/cm²\] at chamber pressure `pch` \[Torr\].
///
/// Closed form of `Kv·(1 + KD·Pch) = KC·(1 + KD·Pch) + KP·Pch`, i.e. the
/// Pikal correlation `Kv = KC + KP·Pch/(1 + KD·Pch)`.
pub fn vial_heat_transfer<S: Scalar>(pch: S, kc: f64, kp: f64, kd: f64) -> S {
    pch * kp / (pch * kd + 1.0) + kc
}

/// Equipment sublimation capacity envelope \[kg/hr\] at `pch` \[Torr\].
///
/// Affine upper envelope `mdot_max(Pch) = a·Pch + b`.
pub fn equipment_capacity<S: Scalar>(pch: S, a: f64, b: f64) -> S {
    pch * a + b
}

/// Initial frozen product height \[cm\] from fill volume \[mL\], product area
/// \[cm²\] and solid content \[g/mL\].
///
/// Mass-consistent with [`cake_growth_factor`]: the water mass in the fill,
/// `Vfill·(1 − cSolid)`, equals the ice mass held in a cake of height
/// `Lpr0` at the effective ice density `ρ_ice·(1 − cSolid·ρ_soln/ρ_solute)`,
/// so complete sublimation corresponds exactly to `Lck = Lpr0`.
pub fn initial_product_length(vfill: f64, ap: f64, c_solid: f64) -> f64 {
    vfill * (1.0 - c_solid) / (ap * RHO_ICE * (1.0 - c_solid * RHO_SOLUTION / RHO_SOLUTE))
}

/// Conversion factor from sublimation rate \[kg/hr\] to dried-cake growth
/// \[cm/hr\]: `dLck/dt = dmdt · cake_growth_factor`.
pub fn cake_growth_factor(ap: f64, c_solid: f64) -> f64 {
    KG_TO_G / ((1.0 - c_solid * RHO_SOLUTION / RHO_SOLUTE) * ap * RHO_ICE)
}

/// Sublimation rate \[kg/hr\] from the mass-transfer relation at driving
/// pressure difference `psub − pch` \[Torr\].
pub fn sublimation_rate(psub: f64, pch: f64, rp: f64, ap: f64) -> f64 {
    ap * (psub - pch) / (rp * KG_TO_G)
}

/// Area-normalized sublimation flux \[kg·hr⁻¹·m⁻²\] from a per-vial rate
/// \[kg/hr\] and product area \[cm²\].
pub fn sublimation_flux(dmdt: f64, ap: f64) -> f64 {
    dmdt / (ap * CM2_TO_M2)
}

/// Vial bottom temperature \[°C\] from conduction across the frozen layer.
///
/// `Tbot = Tsub + (Lpr0 − Lck)·(Psub − Pch)·ΔHs / (Rp·3600·k_ice)`
///
/// As `Lck → Lpr0` the frozen layer vanishes and `Tbot → Tsub`; the
/// expression stays finite at full dryness.
pub fn vial_bottom_temperature(
    tsub: f64,
    lck: f64,
    psub: f64,
    pch: f64,
    rp: f64,
    lpr0: f64,
) -> f64 {
    tsub + (lpr0 - lck) * (psub - pch) * DHS_SUBLIMATION / (rp * HR_TO_S * K_ICE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_dual::Dual64;

    #[test]
    fn test_vapor_pressure_reference_points() {
        // Ice table anchor points: ~0.476 Torr at -25°C, ~4.58 Torr at 0°C.
        let p_m25 = vapor_pressure(-25.0_f64);
        let p_0 = vapor_pressure(0.0_f64);
        assert!((p_m25 - 0.476).abs() < 0.02, "P(-25) = {}", p_m25);
        assert!((p_0 - 4.58).abs() < 0.3, "P(0) = {}", p_0);
    }

    #[test]
    fn test_vapor_pressure_strictly_increasing() {
        let mut prev = vapor_pressure(-60.0_f64);
        for i in 1..=60 {
            let t = -60.0 + i as f64;
            let p = vapor_pressure(t);
            assert!(p > prev, "not increasing at T = {}", t);
            prev = p;
        }
    }

    #[test]
    fn test_log_form_consistent_with_direct_form() {
        for t in [-50.0, -30.0, -10.0, -5.0] {
            let direct = vapor_pressure(t);
            let recovered = ln_vapor_pressure(t).exp();
            assert!((direct - recovered).abs() < 1e-10 * direct.max(1.0));
        }
    }

    #[test]
    fn test_vapor_pressure_derivative_via_dual() {
        let t = Dual64::from(-20.0).derivative();
        let p = vapor_pressure(t);
        // dP/dT = P * C2 / (T + 273.15)^2
        let expected = p.re * VAPOR_PRESSURE_C2 / (253.15_f64).powi(2);
        assert!((p.eps - expected).abs() < 1e-10 * expected);
    }

    #[test]
    fn test_cake_resistance_monotone() {
        let r0 = 1.4;
        let (a1, a2) = (16.0, 0.5);
        let mut prev = cake_resistance(0.0_f64, r0, a1, a2);
        assert_eq!(prev, r0);
        for i in 1..=10 {
            let lck = i as f64 * 0.07;
            let rp = cake_resistance(lck, r0, a1, a2);
            assert!(rp >= prev);
            prev = rp;
        }
    }

    #[test]
    fn test_vial_heat_transfer_increases_with_pressure() {
        let (kc, kp, kd) = (2.75e-4, 8.93e-4, 0.46);
        let kv_low = vial_heat_transfer(0.05_f64, kc, kp, kd);
        let kv_high = vial_heat_transfer(0.30_f64, kc, kp, kd);
        assert!(kv_high > kv_low);
        assert!(kv_low > kc);
    }

    #[test]
    fn test_initial_length_mass_balance_closes() {
        // Sublimating a cake of height Lpr0 at the effective ice density
        // must remove exactly the water mass in the fill.
        let (vfill, ap, c_solid) = (2.0, 3.14, 0.05);
        let lpr0 = initial_product_length(vfill, ap, c_solid);
        let ice_mass =
            lpr0 * ap * RHO_ICE * (1.0 - c_solid * RHO_SOLUTION / RHO_SOLUTE);
        let water_mass = vfill * (1.0 - c_solid);
        assert!((ice_mass - water_mass).abs() < 1e-12);
        // And growth factor inverts the same density.
        let growth = cake_growth_factor(ap, c_solid);
        assert!((growth * ice_mass / KG_TO_G - lpr0).abs() < 1e-12);
    }

    #[test]
    fn test_bottom_temperature_finite_at_full_dryness() {
        let lpr0 = initial_product_length(2.0, 3.14, 0.05);
        let tbot = vial_bottom_temperature(-12.0, lpr0, 1.2, 0.15, 12.0, lpr0);
        assert!((tbot - (-12.0)).abs() < 1e-12);
    }

    #[test]
    fn test_equipment_capacity_affine() {
        let cap = equipment_capacity(0.15_f64, -0.182, 11.7);
        assert!((cap - (11.7 - 0.182 * 0.15)).abs() < 1e-12);
    }
}
