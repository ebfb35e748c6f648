use serde::{Serialize, Deserialize};
use std::path::PathBuf;

/// How the ensembles updated in a round are chosen.
///
/// Round-robin is the default: every ensemble grows at the same pace
/// and a round costs `max_booster_to_update` fits.
/// `Greedy` fits every growing ensemble each round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoosterSelection {
    /// A rotating window over the ensembles still growing.
    #[default]
    RoundRobin,
    /// Fit every ensemble still growing, keep the ones whose tree
    /// lowers the training loss the most.
    Greedy,
}

/// The `general_params` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralParams {
    pub num_classes: usize,
    pub num_iterations: usize,
    pub early_stopping_round: Option<usize>,
    /// Defaults to the number of ensembles.
    pub max_booster_to_update: Option<usize>,
    pub booster_selection: BoosterSelection,
    pub subsampling: f64,
    pub subsampling_freq: usize,
    pub subsample_valid: f64,
    pub batch_size: usize,
    pub save_model_interval: usize,
    pub save_model_path: Option<PathBuf>,
    pub seed: u64,
    pub max_bin: usize,
    pub min_data_in_bin: usize,
    pub verbosity: i32,
    pub verbosity_interval: usize,
}

impl Default for GeneralParams {
    fn default() -> Self {
        Self {
            num_classes: 0,
            num_iterations: 100,
            early_stopping_round: None,
            max_booster_to_update: None,
            booster_selection: BoosterSelection::default(),
            subsampling: 1.0,
            subsampling_freq: 0,
            subsample_valid: 1.0,
            batch_size: 0,
            save_model_interval: 0,
            save_model_path: None,
            seed: 0,
            max_bin: 255,
            min_data_in_bin: 3,
            verbosity: 1,
            verbosity_interval: 10,
        }
    }
}
