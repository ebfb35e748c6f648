//! The toy choice data shared by the integration tests.
#![allow(dead_code)]
use rumboost::prelude::*;

/// 4 observations, 6 features, 3 alternatives.
pub fn toy_train_set() -> Sample {
    Sample::from_columns([
        ("0", vec![1.0, 2.0, 3.0, 2.0]),
        ("1", vec![4.0, 5.0, 6.0, 1.0]),
        ("2", vec![7.0, 8.0, 9.0, 5.0]),
        ("3", vec![4.0, 5.0, 6.0, 1.0]),
        ("4", vec![3.0, 1.0, 7.0, 3.0]),
        ("5", vec![6.0, 1.0, 3.0, 9.0]),
    ]).unwrap()
        .with_target(vec![0.0, 1.0, 2.0, 1.0])
        .unwrap()
}

pub fn toy_valid_set() -> Sample {
    Sample::from_columns([
        ("0", vec![2.0, 3.0, 4.0]),
        ("1", vec![5.0, 4.0, 3.0]),
        ("2", vec![8.0, 7.0, 6.0]),
        ("3", vec![1.0, 6.0, 8.0]),
        ("4", vec![7.0, 5.0, 4.0]),
        ("5", vec![3.0, 2.0, 1.0]),
    ]).unwrap()
        .with_target(vec![2.0, 1.0, 0.0])
        .unwrap()
}

fn exclusive(alternative: usize, variables: [&str; 2]) -> String {
    format!(r#"{{
        "utility": [{alternative}],
        "variables": ["{}", "{}"],
        "boosting_params": {{
            "monotone_constraints_method": "advanced",
            "monotone_constraints": [1, -1],
            "interaction_constraints": [[0], [1]],
            "learning_rate": 0.1,
            "max_depth": 1,
            "min_data_in_leaf": 1,
            "min_gain_to_split": 0
        }},
        "shared": false
    }}"#, variables[0], variables[1])
}

/// Three exclusive ensembles and one ensemble shared by every alternative.
/// `general` is spliced into `general_params`,
/// `choice_model` after `rum_structure`.
pub fn toy_spec_json(general: &str, choice_model: &str) -> String {
    format!(r#"{{
        "general_params": {{
            "n_jobs": -1,
            "num_classes": 3,
            "verbosity": 0,
            "verbosity_interval": 1,
            "min_data_in_bin": 1,
            "num_iterations": 10,
            "early_stopping_round": null,
            "subsampling": 1.0,
            "subsampling_freq": 0,
            "subsample_valid": 1.0,
            "batch_size": 0,
            "max_booster_to_update": 3,
            "save_model_interval": 0
            {general}
        }},
        "rum_structure": [
            {}, {}, {},
            {{
                "utility": [0, 1, 2],
                "variables": ["3", "4", "5"],
                "boosting_params": {{
                    "monotone_constraints": [1],
                    "interaction_constraints": [[0]],
                    "learning_rate": 0.1,
                    "max_depth": 1,
                    "min_data_in_leaf": 1,
                    "min_gain_to_split": 0
                }},
                "shared": true
            }}
        ]
        {choice_model}
    }}"#,
        exclusive(0, ["0", "1"]),
        exclusive(1, ["1", "2"]),
        exclusive(2, ["0", "2"]),
    )
}

pub fn toy_spec() -> ModelSpecification {
    ModelSpecification::from_json_str(&toy_spec_json("", "")).unwrap()
}

pub const NESTED_LOGIT: &str = r#",
    "nested_logit": {
        "mu": [1.0, 1.0],
        "nests": { "0": [0, 1], "1": [2] },
        "optimise_mu": [true, false],
        "optim_interval": 20
    }"#;

pub const CROSS_NESTED_LOGIT: &str = r#",
    "cross_nested_logit": {
        "mu": [1.0, 1.0],
        "alphas": [[0.5, 0.5], [1.0, 0.0], [0.0, 1.0]],
        "optimise_mu": [true, false],
        "optimise_alphas": [[true, true], [false, false], [false, false]],
        "optim_interval": 20
    }"#;

pub fn assert_distributions(probabilities: &[Vec<f64>]) {
    for row in probabilities {
        assert!(row.iter().all(|p| (0.0..=1.0).contains(p)), "{row:?}");
        let sum = row.iter().sum::<f64>();
        assert!((sum - 1.0).abs() < 1e-9, "row sums to {sum}");
    }
}
