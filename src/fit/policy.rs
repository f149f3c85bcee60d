//! Which fit methods make sense for a data set.
//!
//! | uncertainties | default        | accepted                          |
//! |---------------|----------------|-----------------------------------|
//! | none          | least squares  | least squares; ODR with a warning |
//! | σy only       | least squares  | all                               |
//! | σx (± σy)     | ODR            | all; σx-blind methods warn        |

use std::fmt;

use crate::domain::{DataSet, FitMethod, UncertaintyProfile};
use crate::error::{LabFitError, Result};

/// A configuration mismatch worth telling the user about. Never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitWarning {
    /// ODR was chosen although neither axis has uncertainties.
    OdrWithoutUncertainty,
    /// The data has σx but the method ignores it.
    SigmaXIgnored { method: FitMethod },
}

impl fmt::Display for FitWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitWarning::OdrWithoutUncertainty => write!(
                f,
                "ODR without uncertainties weights every point equally; least squares gives the same fit"
            ),
            FitWarning::SigmaXIgnored { method } => write!(
                f,
                "{method} ignores the σx column; use ODR to account for uncertainty in x"
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodPolicy {
    profile: UncertaintyProfile,
}

impl MethodPolicy {
    pub fn new(profile: UncertaintyProfile) -> Self {
        Self { profile }
    }

    pub fn for_dataset(data: &DataSet, eps: f64) -> Self {
        Self::new(data.uncertainty_profile(eps))
    }

    pub fn profile(&self) -> UncertaintyProfile {
        self.profile
    }

    pub fn default_method(&self) -> FitMethod {
        if self.profile.has_sigma_x() {
            FitMethod::Odr
        } else {
            FitMethod::LeastSquares
        }
    }

    pub fn available_methods(&self) -> Vec<FitMethod> {
        FitMethod::ALL
            .into_iter()
            .filter(|m| self.check(*m).is_ok())
            .collect()
    }

    /// `Ok(Some(_))` when the method runs but deserves a warning.
    pub fn check(&self, method: FitMethod) -> Result<Option<FitWarning>> {
        match (self.profile, method) {
            (UncertaintyProfile::None, FitMethod::LeastSquares) => Ok(None),
            (UncertaintyProfile::None, FitMethod::Odr) => Ok(Some(FitWarning::OdrWithoutUncertainty)),
            (UncertaintyProfile::None, other) => Err(LabFitError::MethodUnavailable {
                method: other.display_name().to_string(),
                reason: "the data has no uncertainty columns; use least squares".to_string(),
            }),
            (UncertaintyProfile::YOnly, _) => Ok(None),
            (UncertaintyProfile::XOnly | UncertaintyProfile::Both, m) if m.uses_sigma_x() => Ok(None),
            (UncertaintyProfile::XOnly | UncertaintyProfile::Both, m) => {
                Ok(Some(FitWarning::SigmaXIgnored { method: m }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_uncertainty_allows_least_squares_and_warns_on_odr() {
        let policy = MethodPolicy::new(UncertaintyProfile::None);
        assert_eq!(policy.default_method(), FitMethod::LeastSquares);
        assert_eq!(policy.check(FitMethod::LeastSquares).unwrap(), None);
        assert_eq!(
            policy.check(FitMethod::Odr).unwrap(),
            Some(FitWarning::OdrWithoutUncertainty)
        );
        assert!(matches!(
            policy.check(FitMethod::Bootstrap),
            Err(LabFitError::MethodUnavailable { .. })
        ));
        assert_eq!(
            policy.available_methods(),
            vec![FitMethod::Odr, FitMethod::LeastSquares]
        );
    }

    #[test]
    fn sigma_y_only_allows_everything_silently() {
        let policy = MethodPolicy::new(UncertaintyProfile::YOnly);
        assert_eq!(policy.default_method(), FitMethod::LeastSquares);
        for m in FitMethod::ALL {
            assert_eq!(policy.check(m).unwrap(), None);
        }
    }

    #[test]
    fn sigma_x_defaults_to_odr_and_warns_otherwise() {
        for profile in [UncertaintyProfile::XOnly, UncertaintyProfile::Both] {
            let policy = MethodPolicy::new(profile);
            assert_eq!(policy.default_method(), FitMethod::Odr);
            assert_eq!(policy.check(FitMethod::Odr).unwrap(), None);
            let warning = policy.check(FitMethod::Robust).unwrap().unwrap();
            assert!(warning.to_string().contains("σx"));
        }
    }

    #[test]
    fn profile_comes_from_dataset_with_epsilon() {
        let data = DataSet::new(
            vec![1.0, 2.0],
            vec![1e-10, 0.0],
            vec![1.0, 2.0],
            vec![0.1, 0.1],
            crate::domain::ColumnFormat::Standard,
            crate::domain::RawTable::default(),
        )
        .unwrap();
        assert_eq!(
            MethodPolicy::for_dataset(&data, 1e-8).profile(),
            UncertaintyProfile::YOnly
        );
        assert_eq!(
            MethodPolicy::for_dataset(&data, 1e-12).profile(),
            UncertaintyProfile::Both
        );
    }
}
