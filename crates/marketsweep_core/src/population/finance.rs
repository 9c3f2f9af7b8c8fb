use serde::{Deserialize, Serialize};

use crate::error::RunError;

/// Risky-asset return expectations over one quarter (gross returns)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskyExpectations {
    pub risky_avg: f64,
    pub risky_std: f64,
}

impl RiskyExpectations {
    /// `(mu, sigma)` of the lognormal with this mean and standard deviation
    pub fn lognormal_params(&self) -> (f64, f64) {
        let sigma2 = (1.0 + (self.risky_std / self.risky_avg).powi(2)).ln();
        (self.risky_avg.ln() - sigma2 / 2.0, sigma2.sqrt())
    }

    /// Optimal risky share for a CRRA investor, clamped to `[0, 1]`
    pub fn optimal_share(&self, crra: f64, rfree: f64) -> f64 {
        let variance = self.risky_std.powi(2);
        if variance <= f64::EPSILON {
            return if self.risky_avg > rfree { 1.0 } else { 0.0 };
        }
        ((self.risky_avg - rfree) / (crra * variance)).clamp(0.0, 1.0)
    }
}

/// Dividend process of the risky asset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinanceModel {
    /// Annual dividend rate of return
    pub dividend_ror: f64,
    /// Annual standard deviation of the dividend return
    pub dividend_std: f64,
}

impl Default for FinanceModel {
    fn default() -> Self {
        Self {
            dividend_ror: 0.03,
            dividend_std: 0.01,
        }
    }
}

impl FinanceModel {
    pub fn new(dividend_ror: f64, dividend_std: f64) -> Result<Self, RunError> {
        if !dividend_ror.is_finite() || dividend_ror <= -1.0 {
            return Err(RunError::parameter(
                "dividend_ror",
                format!("must be a finite rate above -1, got {dividend_ror}"),
            ));
        }
        if !dividend_std.is_finite() || dividend_std < 0.0 {
            return Err(RunError::parameter(
                "dividend_std",
                format!("must be finite and non-negative, got {dividend_std}"),
            ));
        }
        Ok(Self {
            dividend_ror,
            dividend_std,
        })
    }

    /// Quarterly dividend yield
    pub fn quarterly_yield(&self) -> f64 {
        (1.0 + self.dividend_ror).powf(0.25) - 1.0
    }

    /// Quarterly expectations of the risky return.
    ///
    /// The annual gross return is treated as lognormal and rescaled to a
    /// quarter by dividing the log mean and log variance by four.
    pub fn risky_expectations(&self) -> RiskyExpectations {
        let annual = RiskyExpectations {
            risky_avg: 1.0 + self.dividend_ror,
            risky_std: self.dividend_std,
        };
        let (mu, sigma) = annual.lognormal_params();
        let (mu_q, var_q) = (mu / 4.0, sigma * sigma / 4.0);
        RiskyExpectations {
            risky_avg: (mu_q + var_q / 2.0).exp(),
            risky_std: ((var_q.exp() - 1.0) * (2.0 * mu_q + var_q).exp()).sqrt(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quarterly_expectations() {
        let fm = FinanceModel::new(0.1, 0.04).unwrap();
        let e = fm.risky_expectations();
        assert!((e.risky_avg - 1.1_f64.powf(0.25)).abs() < 1e-3);
        assert!((e.risky_std - 0.0186).abs() < 1e-3);
    }

    #[test]
    fn test_zero_volatility() {
        let e = FinanceModel::new(0.05, 0.0).unwrap().risky_expectations();
        assert_eq!(e.risky_std, 0.0);
        assert_eq!(e.optimal_share(2.0, 1.0), 1.0);
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        assert!(FinanceModel::new(-1.5, 0.01).is_err());
        assert!(FinanceModel::new(0.01, -0.01).is_err());
        assert!(FinanceModel::new(f64::NAN, 0.01).is_err());
    }

    #[test]
    fn test_optimal_share_bounds() {
        let e = RiskyExpectations {
            risky_avg: 1.01,
            risky_std: 0.1,
        };
        let share = e.optimal_share(5.0, 1.0);
        assert!((share - 0.2).abs() < 1e-9);
        assert_eq!(e.optimal_share(5.0, 1.02), 0.0);
    }
}
