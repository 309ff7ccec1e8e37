use log::warn;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs::File;
use std::io::BufReader;

/// Cost strategy driving objective[0]
///
/// Variant names match the strings accepted in parameter files.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[allow(non_camel_case_types)]
pub enum FitnessMode {
    /// Pairwise-distance preservation on seeded batches
    manifold_fitness,
    /// Injected external decoder strategy
    neural_decoder_fitness,
    /// Mean squared error against the training targets
    autoencoder_teacher_fitness,
    /// Mean squared error, with sub-functions counted once in complexity
    gp_autoencoder_fitness,
}

// Field definitions and associated default values

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Param {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub data: Data,
    #[serde(default)]
    pub gp: GP,
    #[serde(default)]
    pub fitness: Fitness,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct General {
    #[serde(default = "seed_default")]
    pub seed: u64,
    #[serde(default = "one_default")]
    pub thread_number: usize,
    #[serde(default = "log_level_default")]
    pub log_level: String,
    #[serde(default = "n_model_to_display_default")]
    pub n_model_to_display: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Data {
    #[serde(default = "empty_string")]
    pub X: String,
    #[serde(default = "empty_string")]
    pub y: String,
    #[serde(default = "true_default")]
    pub features_in_rows: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GP {
    #[serde(default = "pop_size_default")]
    pub population_size: u32,
    #[serde(default = "max_depth_default")]
    pub max_depth: usize,
    #[serde(default = "false_default")]
    pub multi_tree: bool,
    #[serde(default = "one_default")]
    pub num_sup_functions: usize,
    #[serde(default = "num_sub_functions_default")]
    pub num_sub_functions: usize,
    #[serde(default = "const_min_default")]
    pub const_min: f64,
    #[serde(default = "const_max_default")]
    pub const_max: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Fitness {
    #[serde(default = "fitness_mode_default")]
    pub fitness: FitnessMode,
    #[serde(default = "true_default")]
    pub use_linear_scaling: bool,
    #[serde(default = "false_default")]
    pub use_interpretability_model: bool,
    #[serde(default = "batch_size_default")]
    pub batch_size: usize,
}

impl Default for General {
    fn default() -> General {
        General {
            seed: seed_default(),
            thread_number: one_default(),
            log_level: log_level_default(),
            n_model_to_display: n_model_to_display_default(),
        }
    }
}

impl Default for Data {
    fn default() -> Data {
        Data {
            X: empty_string(),
            y: empty_string(),
            features_in_rows: true_default(),
        }
    }
}

impl Default for GP {
    fn default() -> GP {
        GP {
            population_size: pop_size_default(),
            max_depth: max_depth_default(),
            multi_tree: false_default(),
            num_sup_functions: one_default(),
            num_sub_functions: num_sub_functions_default(),
            const_min: const_min_default(),
            const_max: const_max_default(),
        }
    }
}

impl Default for Fitness {
    fn default() -> Fitness {
        Fitness {
            fitness: fitness_mode_default(),
            use_linear_scaling: true_default(),
            use_interpretability_model: false_default(),
            batch_size: batch_size_default(),
        }
    }
}

impl Default for Param {
    fn default() -> Param {
        Param {
            general: General::default(),
            data: Data::default(),
            gp: GP::default(),
            fitness: Fitness::default(),
        }
    }
}

/// Loads and validates a YAML parameter file
pub fn get(param_file: String) -> Result<Param, Box<dyn Error>> {
    let param_reader = BufReader::new(File::open(param_file)?);
    let config: Param = serde_yaml::from_reader(param_reader)?;
    validate(&config)?;
    Ok(config)
}

fn validate(param: &Param) -> Result<(), String> {
    if param.gp.population_size == 0 {
        return Err("population_size must be positive".to_string());
    }
    if param.gp.multi_tree && param.gp.num_sup_functions == 0 {
        return Err("multi_tree requires at least one sup function".to_string());
    }
    if param.fitness.fitness == FitnessMode::manifold_fitness && param.fitness.batch_size == 0 {
        return Err("manifold_fitness requires a positive batch_size".to_string());
    }
    if param.gp.const_min > param.gp.const_max {
        return Err(format!(
            "const_min ({}) greater than const_max ({})",
            param.gp.const_min, param.gp.const_max
        ));
    }
    if param.gp.multi_tree && param.gp.num_sub_functions == 0 {
        warn!("multi_tree with num_sub_functions=0: sup functions will not share any sub-function.");
    }
    Ok(())
}

fn seed_default() -> u64 {
    42
}
fn one_default() -> usize {
    1
}
fn log_level_default() -> String {
    "info".to_string()
}
fn n_model_to_display_default() -> u32 {
    10
}
fn empty_string() -> String {
    String::new()
}
fn true_default() -> bool {
    true
}
fn false_default() -> bool {
    false
}
fn pop_size_default() -> u32 {
    500
}
fn max_depth_default() -> usize {
    4
}
fn num_sub_functions_default() -> usize {
    2
}
fn const_min_default() -> f64 {
    -1.0
}
fn const_max_default() -> f64 {
    1.0
}
fn fitness_mode_default() -> FitnessMode {
    FitnessMode::autoencoder_teacher_fitness
}
fn batch_size_default() -> usize {
    64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_yaml() {
        let param: Param = serde_yaml::from_str("{}").unwrap();
        assert_eq!(param.general.seed, 42);
        assert_eq!(param.fitness.fitness, FitnessMode::autoencoder_teacher_fitness);
        assert!(param.fitness.use_linear_scaling);
        assert!(!param.fitness.use_interpretability_model);
        assert_eq!(param.fitness.batch_size, 64);
        assert!(validate(&param).is_ok());
    }

    #[test]
    fn test_mode_strings() {
        let yaml = "fitness:\n  fitness: gp_autoencoder_fitness\n";
        let param: Param = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(param.fitness.fitness, FitnessMode::gp_autoencoder_fitness);
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let yaml = "fitness:\n  fitness: gradient_descent\n";
        assert!(serde_yaml::from_str::<Param>(yaml).is_err());
    }

    #[test]
    fn test_validation_catches_bad_configs() {
        let mut param = Param::default();
        param.gp.population_size = 0;
        assert!(validate(&param).is_err());

        let mut param = Param::default();
        param.fitness.fitness = FitnessMode::manifold_fitness;
        param.fitness.batch_size = 0;
        assert!(validate(&param).is_err());

        let mut param = Param::default();
        param.gp.const_min = 2.0;
        assert!(validate(&param).is_err());
    }
}
