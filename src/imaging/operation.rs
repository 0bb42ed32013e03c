use std::collections::BTreeMap;
use std::fmt;

use crate::error_handling::types::PipelineError;

/// Parameters of a transformation request, as received from the caller.
pub type Parameters = BTreeMap<String, String>;

/// Name of the integer-valued intensity parameter.
pub const SIGMA_PARAM: &str = "sigma";
/// Accepted alias for [`SIGMA_PARAM`].
pub const INTENSITY_PARAM: &str = "intensity";

pub const MIN_SIGMA: i64 = 1;
pub const MAX_SIGMA: i64 = 100;

/// Difference threshold handed to the unsharp mask.
pub const SHARPEN_THRESHOLD: i32 = 1;

/// A validated transformation, ready to be applied to an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Blur { sigma: u32 },
    Sharpen { sigma: u32 },
}

impl Operation {
    /// Builds an operation from its name and raw string parameters.
    ///
    /// Fails with `InvalidParameter` for unknown names and for an intensity
    /// that is missing, not an integer, or outside `MIN_SIGMA..=MAX_SIGMA`.
    pub fn parse(name: &str, parameters: &Parameters) -> Result<Self, PipelineError> {
        match name {
            "blur" => Ok(Operation::Blur {
                sigma: sigma_from(parameters)?,
            }),
            "sharpen" => Ok(Operation::Sharpen {
                sigma: sigma_from(parameters)?,
            }),
            other => Err(PipelineError::InvalidParameter(format!(
                "unknown operation '{}'",
                other
            ))),
        }
    }

    /// Keeps only the parameters `parse` reads; anything else the caller
    /// sent is dropped rather than echoed back.
    pub fn recognised(parameters: Parameters) -> Parameters {
        parameters
            .into_iter()
            .filter(|(key, _)| key == SIGMA_PARAM || key == INTENSITY_PARAM)
            .collect()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Blur { .. } => "blur",
            Operation::Sharpen { .. } => "sharpen",
        }
    }

    pub fn sigma(&self) -> u32 {
        match self {
            Operation::Blur { sigma } | Operation::Sharpen { sigma } => *sigma,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(sigma={})", self.name(), self.sigma())
    }
}

fn sigma_from(parameters: &Parameters) -> Result<u32, PipelineError> {
    let raw = parameters
        .get(SIGMA_PARAM)
        .or_else(|| parameters.get(INTENSITY_PARAM))
        .ok_or_else(|| PipelineError::InvalidParameter("missing 'sigma'".to_string()))?;

    let value: i64 = raw.parse().map_err(|_| {
        PipelineError::InvalidParameter(format!("sigma must be an integer, got '{}'", raw))
    })?;

    if !(MIN_SIGMA..=MAX_SIGMA).contains(&value) {
        return Err(PipelineError::InvalidParameter(format!(
            "sigma must be between {} and {}, got {}",
            MIN_SIGMA, MAX_SIGMA, value
        )));
    }
    Ok(value as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Parameters {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parses_recognized_operations() {
        assert_eq!(
            Operation::parse("blur", &params(&[("sigma", "10")])).unwrap(),
            Operation::Blur { sigma: 10 }
        );
        assert_eq!(
            Operation::parse("sharpen", &params(&[("intensity", "5")])).unwrap(),
            Operation::Sharpen { sigma: 5 }
        );
    }

    #[test]
    fn sigma_wins_over_intensity_alias() {
        let op = Operation::parse("blur", &params(&[("sigma", "3"), ("intensity", "9")])).unwrap();
        assert_eq!(op.sigma(), 3);
    }

    #[test]
    fn rejects_unknown_operation() {
        let err = Operation::parse("resize", &params(&[("sigma", "3")])).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidParameter(_)));
    }

    #[test]
    fn rejects_malformed_sigma() {
        for bad in ["abc", "1.5", "", " 4", "99999999999999999999"] {
            let err = Operation::parse("blur", &params(&[("sigma", bad)])).unwrap_err();
            assert!(
                matches!(err, PipelineError::InvalidParameter(_)),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn rejects_out_of_range_and_missing_sigma() {
        assert!(Operation::parse("blur", &params(&[("sigma", "0")])).is_err());
        assert!(Operation::parse("blur", &params(&[("sigma", "-2")])).is_err());
        assert!(Operation::parse("blur", &params(&[("sigma", "101")])).is_err());
        assert!(Operation::parse("sharpen", &Parameters::new()).is_err());
    }

    #[test]
    fn recognised_drops_foreign_keys() {
        let kept = Operation::recognised(params(&[
            ("sigma", "2"),
            ("intensity", "4"),
            ("path", "/etc/passwd"),
            ("sessionId", "x"),
        ]));
        assert_eq!(kept, params(&[("intensity", "4"), ("sigma", "2")]));
    }

    #[test]
    fn display_names_operation_and_sigma() {
        assert_eq!(Operation::Sharpen { sigma: 7 }.to_string(), "sharpen(sigma=7)");
    }
}
