//! Typed model specification.
//!
//! The specification is read from JSON with serde.
//! Keys this crate does not use (`n_jobs`,
//! `monotone_constraints_method`, ...) are ignored.

pub mod general;
pub mod utility;
pub mod structure;

use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub use general::{GeneralParams, BoosterSelection};
pub use utility::{UtilitySpec, BoostingParams, Monotonicity};
pub use structure::{NestedLogitParams, CrossNestedLogitParams, OptimSettings};

use crate::choice_model::ChoiceModel;
use crate::error::{ConfigError, Result};

/// The full specification of a RUMBoost model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpecification {
    pub general_params: GeneralParams,
    pub rum_structure: Vec<UtilitySpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested_logit: Option<NestedLogitParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_nested_logit: Option<CrossNestedLogitParams>,
    /// Ensemble index to the alternatives it feeds.
    /// Derived from `rum_structure` when missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_ensembles: Option<BTreeMap<usize, Vec<usize>>>,
}

impl ModelSpecification {
    /// Parse and validate a JSON specification.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let spec: Self = serde_json::from_str(json)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Read, parse and validate a JSON specification file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn num_classes(&self) -> usize {
        self.general_params.num_classes
    }

    /// Index of the first shared ensemble,
    /// or the number of ensembles when none is shared.
    pub fn shared_start_idx(&self) -> usize {
        self.rum_structure.iter()
            .position(|spec| spec.shared)
            .unwrap_or(self.rum_structure.len())
    }

    /// Shared ensemble index to the alternatives it feeds.
    pub fn shared_ensembles(&self) -> BTreeMap<usize, Vec<usize>> {
        self.rum_structure.iter()
            .enumerate()
            .filter(|(_, spec)| spec.shared)
            .map(|(k, spec)| (k, spec.utility.clone()))
            .collect()
    }

    /// The choice model described by the optional sections.
    pub fn choice_model(&self) -> std::result::Result<ChoiceModel, ConfigError> {
        let num_classes = self.num_classes();
        match (&self.nested_logit, &self.cross_nested_logit) {
            (Some(_), Some(_)) => Err(ConfigError::ConflictingChoiceModels),
            (Some(nested), None) => {
                Ok(ChoiceModel::Nested(nested.structure(num_classes)?))
            },
            (None, Some(cross)) => {
                Ok(ChoiceModel::CrossNested(cross.structure(num_classes)?))
            },
            (None, None) => Ok(ChoiceModel::default()),
        }
    }

    /// Optimizer settings of the structural section, if any.
    pub fn optim_settings(&self) -> Option<OptimSettings> {
        self.nested_logit.as_ref()
            .map(NestedLogitParams::settings)
            .or_else(|| {
                self.cross_nested_logit.as_ref()
                    .map(CrossNestedLogitParams::settings)
            })
    }

    /// Checks every structural invariant of the model specification.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let general = &self.general_params;
        let num_classes = general.num_classes;
        if num_classes < 2 {
            return Err(ConfigError::InvalidParameter {
                name: "num_classes",
                reason: format!("at least 2 alternatives are required, got {num_classes}"),
            });
        }
        if self.rum_structure.is_empty() {
            return Err(ConfigError::InvalidParameter {
                name: "rum_structure",
                reason: "no ensemble is specified".into(),
            });
        }
        check_fraction("subsampling", general.subsampling)?;
        check_fraction("subsample_valid", general.subsample_valid)?;
        if general.max_booster_to_update == Some(0) {
            return Err(ConfigError::InvalidParameter {
                name: "max_booster_to_update",
                reason: "must be at least 1".into(),
            });
        }

        let mut first_shared = None;
        for (ensemble, spec) in self.rum_structure.iter().enumerate() {
            self.validate_utility(ensemble, spec)?;
            match (spec.shared, first_shared) {
                (true, None) => { first_shared = Some(ensemble); },
                (false, Some(shared)) => {
                    return Err(ConfigError::SharedOrdering { ensemble: shared });
                },
                _ => {},
            }
        }

        if let Some(explicit) = &self.shared_ensembles {
            let derived = self.shared_ensembles();
            if *explicit != derived {
                return Err(ConfigError::InvalidParameter {
                    name: "shared_ensembles",
                    reason: format!(
                        "{explicit:?} does not match the shared entries \
                         of rum_structure {derived:?}"
                    ),
                });
            }
        }

        self.choice_model()?;
        if let Some(settings) = self.optim_settings() {
            settings.validate()?;
        }
        Ok(())
    }

    fn validate_utility(&self, ensemble: usize, spec: &UtilitySpec)
        -> std::result::Result<(), ConfigError>
    {
        let num_classes = self.num_classes();
        if let Some(&alternative) = spec.utility.iter()
            .find(|&&alt| alt >= num_classes)
        {
            return Err(ConfigError::UnknownAlternative { alternative, num_classes });
        }
        if spec.utility.is_empty() || (!spec.shared && spec.utility.len() != 1) {
            return Err(ConfigError::ExclusiveArity {
                ensemble,
                got: spec.utility.len(),
            });
        }

        let n_variables = spec.variables.len();
        if n_variables == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "variables",
                reason: format!("ensemble {ensemble} uses no variable"),
            });
        }

        let params = &spec.boosting_params;
        let n_monotone = params.monotone_constraints.len();
        if n_monotone > n_variables {
            return Err(ConfigError::MonotoneLength {
                ensemble,
                expected: n_variables,
                got: n_monotone,
            });
        }
        if let Some(&index) = params.interaction_constraints.iter()
            .flatten()
            .find(|&&ix| ix >= n_variables)
        {
            return Err(ConfigError::InteractionIndex { ensemble, index, n_variables });
        }
        if !(params.learning_rate > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "learning_rate",
                reason: format!(
                    "ensemble {ensemble} has learning rate {}",
                    params.learning_rate
                ),
            });
        }
        if params.lambda_l2 < 0.0 {
            return Err(ConfigError::InvalidParameter {
                name: "lambda_l2",
                reason: "must be non-negative".into(),
            });
        }
        Ok(())
    }
}

fn check_fraction(name: &'static str, value: f64)
    -> std::result::Result<(), ConfigError>
{
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            name,
            reason: format!("expected a value in (0, 1], got {value}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RumBoostError;

    fn spec_json(extra: &str) -> String {
        format!(r#"{{
            "general_params": {{
                "n_jobs": -1,
                "num_classes": 3,
                "num_iterations": 10,
                "early_stopping_round": null,
                "max_booster_to_update": 3
            }},
            "rum_structure": [
                {{ "utility": [0], "variables": ["0", "1"],
                   "boosting_params": {{ "monotone_constraints": [1, -1] }},
                   "shared": false }},
                {{ "utility": [1], "variables": ["1", "2"], "shared": false }},
                {{ "utility": [2], "variables": ["0", "2"], "shared": false }},
                {{ "utility": [0, 1, 2], "variables": ["3", "4", "5"], "shared": true }}
            ]{extra}
        }}"#)
    }

    #[test]
    fn parses_and_derives_shared_ensembles() {
        let spec = ModelSpecification::from_json_str(&spec_json("")).unwrap();
        assert_eq!(spec.num_classes(), 3);
        assert_eq!(spec.shared_start_idx(), 3);
        assert_eq!(spec.shared_ensembles(), BTreeMap::from([(3, vec![0, 1, 2])]));
        assert_eq!(spec.choice_model().unwrap(), ChoiceModel::default());
        assert_eq!(spec.general_params.subsampling, 1.0);
        assert_eq!(spec.general_params.booster_selection, BoosterSelection::RoundRobin);
    }

    #[test]
    fn parses_nested_section() {
        let extra = r#",
            "nested_logit": {
                "mu": [1, 1],
                "nests": { "0": [0, 1], "1": [2] },
                "optimise_mu": [true, false],
                "optim_interval": 20
            }"#;
        let spec = ModelSpecification::from_json_str(&spec_json(extra)).unwrap();
        let nest = spec.choice_model().unwrap();
        let nest = nest.nests().unwrap();
        assert_eq!(nest.nest_alt(), &[0, 0, 1]);
        assert_eq!(spec.optim_settings().unwrap().optim_interval, 20);
    }

    #[test]
    fn rejects_both_structural_sections() {
        let extra = r#",
            "nested_logit": { "mu": [1, 1], "nests": { "0": [0, 1], "1": [2] } },
            "cross_nested_logit": {
                "mu": [1, 1],
                "alphas": [[0.5, 0.5], [1, 0], [0, 1]]
            }"#;
        let err = ModelSpecification::from_json_str(&spec_json(extra)).unwrap_err();
        assert!(matches!(
            err,
            RumBoostError::Config(ConfigError::ConflictingChoiceModels)
        ));
    }

    #[test]
    fn rejects_bad_alphas() {
        let extra = r#",
            "cross_nested_logit": {
                "mu": [1, 1],
                "alphas": [[0.6, 0.5], [1, 0], [0, 1]]
            }"#;
        let err = ModelSpecification::from_json_str(&spec_json(extra)).unwrap_err();
        assert!(matches!(
            err,
            RumBoostError::Config(ConfigError::AlphaRowSum { row: 0, .. })
        ));
    }

    #[test]
    fn rejects_mismatched_shared_map() {
        let extra = r#", "shared_ensembles": { "3": [0, 1] }"#;
        let err = ModelSpecification::from_json_str(&spec_json(extra)).unwrap_err();
        assert!(matches!(
            err,
            RumBoostError::Config(ConfigError::InvalidParameter {
                name: "shared_ensembles", ..
            })
        ));
    }

    #[test]
    fn rejects_structural_errors_in_rum_structure() {
        let mut spec: ModelSpecification = serde_json::from_str(&spec_json("")).unwrap();
        spec.rum_structure.swap(0, 3);
        assert_eq!(
            spec.validate(),
            Err(ConfigError::SharedOrdering { ensemble: 0 }),
        );

        let mut spec: ModelSpecification = serde_json::from_str(&spec_json("")).unwrap();
        spec.rum_structure[1].utility = vec![1, 2];
        assert_eq!(
            spec.validate(),
            Err(ConfigError::ExclusiveArity { ensemble: 1, got: 2 }),
        );

        let mut spec: ModelSpecification = serde_json::from_str(&spec_json("")).unwrap();
        spec.rum_structure[0].boosting_params.monotone_constraints.push(Monotonicity::Free);
        assert_eq!(
            spec.validate(),
            Err(ConfigError::MonotoneLength { ensemble: 0, expected: 2, got: 3 }),
        );

        let mut spec: ModelSpecification = serde_json::from_str(&spec_json("")).unwrap();
        spec.rum_structure[0].boosting_params.monotone_constraints.pop();
        assert_eq!(spec.validate(), Ok(()));

        let mut spec: ModelSpecification = serde_json::from_str(&spec_json("")).unwrap();
        spec.rum_structure[2].boosting_params.interaction_constraints = vec![vec![0, 5]];
        assert_eq!(
            spec.validate(),
            Err(ConfigError::InteractionIndex { ensemble: 2, index: 5, n_variables: 2 }),
        );

        let mut spec: ModelSpecification = serde_json::from_str(&spec_json("")).unwrap();
        spec.rum_structure[2].utility = vec![4];
        assert_eq!(
            spec.validate(),
            Err(ConfigError::UnknownAlternative { alternative: 4, num_classes: 3 }),
        );
    }
}
