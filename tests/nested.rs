mod common;

use std::collections::BTreeMap;

use rumboost::prelude::*;
use common::*;


fn spec(choice_model: &str, optim_interval: usize) -> ModelSpecification {
    let json = toy_spec_json("", choice_model)
        .replace(r#""optim_interval": 20"#, &format!(r#""optim_interval": {optim_interval}"#));
    ModelSpecification::from_json_str(&json).unwrap()
}


/// The training state built from the toy specification.
#[cfg(test)]
pub mod attributes {
    use super::*;

    #[test]
    fn nested_logit() {
        let train = toy_train_set();
        let valid = toy_valid_set();
        let spec = spec(NESTED_LOGIT, 20);
        let booster = RUMBoost::<RegressionTreeRegressor>::init(&train, &[&valid], &spec)
            .unwrap();

        let nest = booster.choice_model().nests().unwrap();
        assert_eq!(nest.nests(), &BTreeMap::from([(0, vec![0, 1]), (1, vec![2])]));
        assert_eq!(nest.nest_alt(), &[0, 0, 1]);
        assert_eq!(booster.choice_model().mu(), Some(&[1.0, 1.0][..]));
        assert!(booster.choice_model().alphas().is_none());

        assert_eq!(booster.shared_ensembles(), BTreeMap::from([(3, vec![0, 1, 2])]));
        assert_eq!(booster.shared_start_idx(), 3);
        assert_eq!(booster.num_obs(), &[4, 3]);
        assert_eq!(booster.labels(), &[0, 1, 2, 1]);
        assert_eq!(booster.labels_nest(), Some(vec![0, 0, 1, 0]));
        assert_eq!(
            booster.labels_j(),
            &[
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![0.0, 0.0, 1.0],
                vec![0.0, 1.0, 0.0],
            ],
        );
    }

    #[test]
    fn cross_nested_logit() {
        let train = toy_train_set();
        let spec = spec(CROSS_NESTED_LOGIT, 20);
        let booster = RUMBoost::<RegressionTreeRegressor>::init(&train, &[], &spec)
            .unwrap();

        let choice_model = booster.choice_model();
        assert_eq!(choice_model.mu(), Some(&[1.0, 1.0][..]));
        assert_eq!(
            choice_model.alphas().unwrap(),
            &[vec![0.5, 0.5], vec![1.0, 0.0], vec![0.0, 1.0]],
        );
        assert!(choice_model.nests().is_none());
        assert!(choice_model.has_free_parameters());
        assert_eq!(booster.num_obs(), &[4]);
    }

    #[test]
    fn rejects_both_nested_models() {
        let json = toy_spec_json("", &format!("{NESTED_LOGIT}{CROSS_NESTED_LOGIT}"));
        let err = ModelSpecification::from_json_str(&json).unwrap_err();
        assert!(matches!(
            err,
            RumBoostError::Config(ConfigError::ConflictingChoiceModels)
        ));
    }
}


/// Training with the structural parameters refitted every 5 rounds.
#[cfg(test)]
pub mod structural_parameters {
    use super::*;

    #[test]
    fn nested_logit_refits_free_mu_only() {
        let train = toy_train_set();
        let valid = toy_valid_set();
        let model = rum_train(&train, &[&valid], &spec(NESTED_LOGIT, 5)).unwrap();

        let mu = model.choice_model().mu().unwrap();
        assert!((0.05..=1.0).contains(&mu[0]), "mu = {mu:?}");
        assert_eq!(mu[1], 1.0);
        assert_eq!(model.best_iteration(), 10);

        let probabilities = model.predict(&valid, &PredictOptions::default()).unwrap();
        assert_distributions(&probabilities);
    }

    #[test]
    fn cross_nested_logit_keeps_alphas_feasible() {
        let train = toy_train_set();
        let valid = toy_valid_set();
        let model = rum_train(&train, &[&valid], &spec(CROSS_NESTED_LOGIT, 5)).unwrap();

        let alphas = model.choice_model().alphas().unwrap();
        assert!(alphas.iter().flatten().all(|a| (0.0..=1.0).contains(a)));
        assert!((alphas[0].iter().sum::<f64>() - 1.0).abs() < 1e-6);
        assert_eq!(alphas[1], vec![1.0, 0.0]);
        assert_eq!(alphas[2], vec![0.0, 1.0]);

        let mu = model.choice_model().mu().unwrap();
        assert!((0.05..=1.0).contains(&mu[0]), "mu = {mu:?}");
        assert_eq!(mu[1], 1.0);

        let probabilities = model.predict(&valid, &PredictOptions::default()).unwrap();
        assert_distributions(&probabilities);
    }

    #[test]
    fn fixed_parameters_are_never_refitted() {
        let train = toy_train_set();
        let choice_model = NESTED_LOGIT.replace("[true, false]", "[false, false]");
        let model = rum_train(&train, &[], &spec(&choice_model, 1)).unwrap();
        assert_eq!(model.choice_model().mu(), Some(&[1.0, 1.0][..]));
    }

    #[test]
    fn nested_model_survives_save_and_load() {
        let train = toy_train_set();
        let valid = toy_valid_set();
        let model = rum_train(&train, &[&valid], &spec(CROSS_NESTED_LOGIT, 5)).unwrap();

        let json = model.to_json().unwrap();
        let loaded = RUMBoostModel::<RegressionTreeRegressor>::from_json(&json).unwrap();
        assert_eq!(loaded.choice_model(), model.choice_model());
        assert_eq!(
            loaded.predict(&valid, &PredictOptions::default()).unwrap(),
            model.predict(&valid, &PredictOptions::default()).unwrap(),
        );
    }

    #[test]
    fn rejects_an_invalid_saved_structure() {
        let train = toy_train_set();
        let model = rum_train(&train, &[], &spec(NESTED_LOGIT, 5)).unwrap();

        let mut json: serde_json::Value = serde_json::from_str(&model.to_json().unwrap())
            .unwrap();
        json["choice_model"]["Nested"]["mu"] = serde_json::json!([-1.0, 1.0]);
        let err = RUMBoostModel::<RegressionTreeRegressor>::from_json(&json.to_string())
            .unwrap_err();
        assert!(matches!(err, RumBoostError::Json(_)), "{err:?}");
    }
}


/// Early stopping while the structural parameters move every round.
#[cfg(test)]
pub mod early_stopping {
    use super::*;

    fn spec_with_patience(choice_model: &str) -> ModelSpecification {
        let json = toy_spec_json("", choice_model)
            .replace(r#""optim_interval": 20"#, r#""optim_interval": 1"#)
            .replace(r#""early_stopping_round": null"#, r#""early_stopping_round": 3"#)
            .replace(r#""num_iterations": 10"#, r#""num_iterations": 50"#);
        ModelSpecification::from_json_str(&json).unwrap()
    }

    fn check(choice_model: &str) {
        let train = toy_train_set();
        let valid = toy_valid_set();
        let model = rum_train(&train, &[&valid], &spec_with_patience(choice_model))
            .unwrap();

        let rescored = model.score(&valid).unwrap();
        assert!(
            (rescored - model.best_score()).abs() < 1e-9,
            "best score {} but the model scores {rescored}",
            model.best_score(),
        );
        let train_score = model.score(&train).unwrap();
        assert!((train_score - model.best_score_train()).abs() < 1e-9);
    }

    #[test]
    fn nested_logit_returns_the_best_round_mu() {
        check(NESTED_LOGIT);
    }

    #[test]
    fn cross_nested_logit_returns_the_best_round_alphas() {
        check(CROSS_NESTED_LOGIT);
    }

    #[test]
    fn failed_refits_keep_the_previous_values() {
        let train = toy_train_set();
        let valid = toy_valid_set();
        let choice_model = NESTED_LOGIT
            .replace(r#""optim_interval": 20"#, r#""optim_interval": 1, "max_optim_iter": 0"#);
        let model = rum_train(&train, &[&valid], &spec(&choice_model, 1)).unwrap();

        assert_eq!(model.best_iteration(), 10);
        assert_eq!(model.history().len(), 10);
        assert_eq!(model.choice_model().mu(), Some(&[1.0, 1.0][..]));
        let probabilities = model.predict(&valid, &PredictOptions::default()).unwrap();
        assert_distributions(&probabilities);
    }
}


/// Prediction with a choice model given at prediction time.
#[cfg(test)]
pub mod choice_model_override {
    use super::*;

    fn nests() -> BTreeMap<usize, Vec<usize>> {
        BTreeMap::from([(0, vec![0, 1]), (1, vec![2])])
    }

    #[test]
    fn unit_mu_matches_the_multinomial_logit() {
        let train = toy_train_set();
        let valid = toy_valid_set();
        let model = rum_train(&train, &[&valid], &toy_spec()).unwrap();

        let nest = NestStructure::new(nests(), vec![1.0, 1.0], vec![false, false], 3)
            .unwrap();
        let options = PredictOptions::default().with_choice_model(nest.into());
        let nested = model.predict(&valid, &options).unwrap();
        let multinomial = model.predict(&valid, &PredictOptions::default()).unwrap();

        for (a, b) in nested.iter().flatten().zip(multinomial.iter().flatten()) {
            assert!((a - b).abs() < 1e-12, "{a} != {b}");
        }
    }

    #[test]
    fn rejects_a_structure_of_another_size() {
        let train = toy_train_set();
        let model = rum_train(&train, &[], &toy_spec()).unwrap();

        let nests = BTreeMap::from([(0, vec![0]), (1, vec![1])]);
        let nest = NestStructure::new(nests, vec![1.0, 1.0], vec![false, false], 2)
            .unwrap();
        let options = PredictOptions::default().with_choice_model(nest.into());
        let err = model.predict(&train, &options).unwrap_err();
        assert!(matches!(
            err,
            RumBoostError::Config(ConfigError::DimensionMismatch { expected: 3, got: 2, .. })
        ));
    }
}
