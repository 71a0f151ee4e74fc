//! Acoustic signal and timing calculations.
//!
//! Contains helpers for:
//! - Frequency-dependent absorption β(f) of the medium
//! - Reception probability models: erf-based p₁ and symbol-error-based p₂
//! - Conversions between dimensionless simulation time units and seconds
//!
//! Units:
//! - Distance: same unit as node coordinates (kilometers by default)
//! - Frequency: the scalar `f` passed through from the configuration
//! - Time: one simulation unit equals the propagation time across one
//!   interference radius; `UNIT_TO_SEC` anchors it to wall-clock seconds

use serde::Deserialize;
use statrs::function::erf::erf;

/// Bit rate constant of the modem model.
const V_BIT: f64 = 10.0;
/// Source level constant of the modem model.
const P_N: f64 = 6.71;

/// Wall-clock seconds per dimensionless simulation time unit.
pub const UNIT_TO_SEC: f64 = 2.29333;
/// Dimensionless simulation time units per wall-clock second.
pub const SEC_TO_UNIT: f64 = 0.436047;

/// Convert a dimensionless simulation time to seconds.
pub fn from_unit_to_sec(unit: f64) -> f64 {
    unit * UNIT_TO_SEC
}

/// Convert a wall-clock duration in seconds to simulation time units.
pub fn from_sec_to_unit(sec: f64) -> f64 {
    sec * SEC_TO_UNIT
}

/// Frequency-dependent absorption coefficient β(f).
///
/// ```text
/// β(f) = 0.1·f²/(1+f²) + 40·f²/(4100+f²) + 2.75·10⁻⁴·f² + 3·10⁻⁴
/// ```
///
/// Thorp-style attenuation: the two relaxation terms dominate at low and mid
/// frequencies, the quadratic term at high frequencies.
pub fn absorption(f: f64) -> f64 {
    (0.1 * f * f / (1.0 + f * f)) + (40.0 * f * f / (4100.0 + f * f)) + (2.75e-4 * f * f) + 3e-4
}

/// Signal excess x(r, f) feeding the erf detection model.
///
/// ```text
/// x(r, f) = (√(f/v_bit)·p_n / r)·10^(−0.05·β(f)·r)
/// ```
pub fn signal_excess(r: f64, f: f64) -> f64 {
    ((f / V_BIT).sqrt() * P_N / r) * 10f64.powf(-0.05 * absorption(f) * r)
}

/// Erf-based reception probability p₁(r, f).
///
/// Strictly decreasing in `r` for a fixed frequency: both the spreading loss
/// and the absorption shrink the signal excess monotonically.
pub fn p_erf(r: f64, f: f64) -> f64 {
    erf(signal_excess(r, f))
}

/// Signal-to-noise ratio γ(r, f) of the symbol-error model.
///
/// ```text
/// γ(r, f) = (f·10²/r²)·10^(−0.1·β(f)·r)
/// ```
pub fn snr(r: f64, f: f64) -> f64 {
    (f * 100.0 / (r * r)) * 10f64.powf(-0.1 * absorption(f) * r)
}

/// Per-symbol error probability q_e(r, f).
pub fn symbol_error(r: f64, f: f64) -> f64 {
    let g = snr(r, f);
    0.5 * (1.0 - (g / (1.0 + g)).sqrt())
}

/// Symbol-error-based reception probability p₂(r, f) for a 256-symbol message.
pub fn p_symbol(r: f64, f: f64) -> f64 {
    (1.0 - symbol_error(r, f)).powi(256)
}

/// Reception probability model selector.
///
/// Deserialized from the configuration's integer code (1 = erf-based,
/// 2 = symbol-error-based); unknown codes are rejected at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u8")]
pub enum ReceptionModel {
    Erf,
    SymbolError,
}

impl ReceptionModel {
    /// Reception probability at distance `r` for frequency parameter `f`.
    pub fn probability(self, r: f64, f: f64) -> f64 {
        match self {
            ReceptionModel::Erf => p_erf(r, f),
            ReceptionModel::SymbolError => p_symbol(r, f),
        }
    }
}

impl TryFrom<u8> for ReceptionModel {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(ReceptionModel::Erf),
            2 => Ok(ReceptionModel::SymbolError),
            other => Err(format!("incorrect probability function type: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_conversions_roundtrip_closely() {
        // The two factors are independently rounded constants, so the
        // round-trip is close but not exact.
        let sec = 0.02;
        let back = from_unit_to_sec(from_sec_to_unit(sec));
        assert!((back - sec).abs() / sec < 1e-5);
    }

    #[test]
    fn absorption_grows_with_frequency() {
        assert!(absorption(10.0) < absorption(40.0));
        assert!(absorption(40.0) < absorption(100.0));
        assert!(absorption(0.0) > 0.0);
    }

    #[test]
    fn p_erf_strictly_decreasing_in_distance() {
        let f = 40.0;
        assert!(p_erf(1.0, f) > p_erf(5.0, f));
        assert!(p_erf(5.0, f) > p_erf(10.0, f));
    }

    #[test]
    fn p_symbol_stays_in_unit_interval_and_decreases() {
        let f = 40.0;
        let mut prev = 1.0;
        for r in [0.5, 1.0, 2.0, 4.0, 8.0] {
            let p = p_symbol(r, f);
            assert!((0.0..=1.0).contains(&p), "p2({r}) = {p} out of range");
            assert!(p <= prev);
            prev = p;
        }
    }

    #[test]
    fn reception_model_codes() {
        assert_eq!(ReceptionModel::try_from(1), Ok(ReceptionModel::Erf));
        assert_eq!(ReceptionModel::try_from(2), Ok(ReceptionModel::SymbolError));
        assert!(ReceptionModel::try_from(0).is_err());
        assert!(ReceptionModel::try_from(3).is_err());
    }

    #[test]
    fn model_selector_matches_free_functions() {
        let (r, f) = (2.5, 40.0);
        assert_eq!(ReceptionModel::Erf.probability(r, f), p_erf(r, f));
        assert_eq!(ReceptionModel::SymbolError.probability(r, f), p_symbol(r, f));
    }
}
