//! Y-factor and system noise temperature.
//!
//! With a hot load at `t_hot` and a cold load at `t_cold` in front of the receiver, the
//! ratio of measured IF powers `Y = P_hot / P_cold` gives the system noise temperature
//!
//! ```text
//! Tsys = (t_hot - t_cold * Y) / (Y - 1)
//! ```
//!
//! Degenerate measurements (no cold power, no hot/cold contrast) yield sentinels instead
//! of errors: they are valid if unusable physical states.

/// Y-factor of a measurement with no usable cold power.
pub const Y_FACTOR_UNDEFINED: f64 = -1.0;

/// Noise temperature of an unusable measurement.
pub const TSYS_UNDEFINED: f64 = 1.0e99;

/// `hot_power / cold_power`, or [`Y_FACTOR_UNDEFINED`] when the ratio does not exist.
pub fn y_factor(cold_power: f64, hot_power: f64) -> f64 {
    if cold_power == 0.0 {
        return Y_FACTOR_UNDEFINED;
    }
    let y = hot_power / cold_power;
    if y.is_finite() {
        y
    } else {
        Y_FACTOR_UNDEFINED
    }
}

/// System noise temperature for a Y-factor, or [`TSYS_UNDEFINED`].
///
/// Returns the sentinel for `y == Y_FACTOR_UNDEFINED` and for `y == 1` where the
/// denominator vanishes.
pub fn tsys(y: f64, t_hot: f64, t_cold: f64) -> f64 {
    if y == Y_FACTOR_UNDEFINED || y == 1.0 {
        return TSYS_UNDEFINED;
    }
    let t = (t_hot - t_cold * y) / (y - 1.0);
    if t.is_finite() {
        t
    } else {
        TSYS_UNDEFINED
    }
}

/// Whether a noise temperature is a real measurement rather than the sentinel.
pub fn is_defined(tsys: f64) -> bool {
    tsys != TSYS_UNDEFINED
}
