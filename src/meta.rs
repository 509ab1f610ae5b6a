use crate::error::Error;
use crate::population::{Individual, PopulationView};
use rand::rngs::StdRng;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

pub type Params = FxHashMap<String, serde_json::Value>;

pub trait Chromosome:
    Clone + Send + Sync + Serialize + DeserializeOwned + Debug + 'static
{
}

impl<T> Chromosome for T where
    T: Clone + Send + Sync + Serialize + DeserializeOwned + Debug + 'static
{
}

pub trait ObjectiveFunction<C>: Sync {
    fn evaluate(&self, candidate: &C, params: &Params) -> Result<f64, Error>;
}

pub struct ClosureObjectiveFunction<F> {
    obj_func: F,
}

impl<C, F> ObjectiveFunction<C> for ClosureObjectiveFunction<F>
where
    F: Fn(&C, &Params) -> Result<f64, Error> + Sync,
{
    fn evaluate(&self, candidate: &C, params: &Params) -> Result<f64, Error> {
        (self.obj_func)(candidate, params)
    }
}

pub fn make_obj_func<C, F>(obj_func: F) -> ClosureObjectiveFunction<F>
where
    F: Fn(&C, &Params) -> Result<f64, Error> + Sync,
{
    ClosureObjectiveFunction { obj_func }
}

pub trait ChromosomeMaker<C>: Sync {
    fn create(&self, slot: usize, rng: &mut StdRng) -> Result<C, Error>;
}

pub trait EvolutionStrategy<C>: Sync {
    fn propose(
        &self,
        slot: usize,
        current: &Individual<C>,
        view: &PopulationView<C>,
        rng: &mut StdRng,
    ) -> Result<C, Error>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistributedConfig {
    pub host: String,
    pub port: u16,
    pub init_command: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrossProcessConfig {
    pub host: String,
    pub port: u16,
    pub this_process_id: usize,
    pub next_process_id: usize,
    pub num_migrants: usize,
    pub generations_between_migrations: usize,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub num_threads: usize,
    pub num_generations: usize,
    pub population_size: usize,
    pub migration_probability: f64,
    pub strict_determinism: bool,
    pub reentrancy_check: bool,
    pub seed: u64,
    pub params: Params,
    pub distributed: Option<DistributedConfig>,
    pub cross_process: Option<CrossProcessConfig>,
}

pub struct EngineConfigBuilder {
    num_threads: usize,
    num_generations: usize,
    population_size: usize,
    migration_probability: f64,
    strict_determinism: bool,
    reentrancy_check: bool,
    seed: u64,
    params: Params,
    distributed: Option<DistributedConfig>,
    cross_process: Option<CrossProcessConfig>,
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self {
            num_threads: 1,
            num_generations: 1,
            population_size: 10,
            migration_probability: 0.01,
            strict_determinism: false,
            reentrancy_check: false,
            seed: 0,
            params: Params::default(),
            distributed: None,
            cross_process: None,
        }
    }

    pub fn num_threads(&mut self, num_threads: usize) -> &mut Self {
        self.num_threads = num_threads;
        self
    }

    pub fn num_generations(&mut self, num_generations: usize) -> &mut Self {
        self.num_generations = num_generations;
        self
    }

    pub fn population_size(&mut self, population_size: usize) -> &mut Self {
        self.population_size = population_size;
        self
    }

    pub fn migration_probability(&mut self, migration_probability: f64) -> &mut Self {
        self.migration_probability = migration_probability;
        self
    }

    pub fn strict_determinism(&mut self, strict_determinism: bool) -> &mut Self {
        self.strict_determinism = strict_determinism;
        self
    }

    pub fn reentrancy_check(&mut self, reentrancy_check: bool) -> &mut Self {
        self.reentrancy_check = reentrancy_check;
        self
    }

    pub fn seed(&mut self, seed: u64) -> &mut Self {
        self.seed = seed;
        self
    }

    pub fn params(&mut self, params: Params) -> &mut Self {
        self.params = params;
        self
    }

    pub fn distributed(&mut self, distributed: DistributedConfig) -> &mut Self {
        self.distributed = Some(distributed);
        self
    }

    pub fn cross_process(&mut self, cross_process: CrossProcessConfig) -> &mut Self {
        self.cross_process = Some(cross_process);
        self
    }

    pub fn build(&self) -> Result<EngineConfig, Error> {
        if self.num_threads == 0 {
            return Err(Error::ZeroNumThreads);
        }
        if self.num_generations == 0 {
            return Err(Error::ZeroNumGenerations);
        }
        if self.population_size == 0 {
            return Err(Error::ZeroPopulationSize);
        }
        if self.population_size < self.num_threads {
            return Err(Error::PopulationSmallerThanIslands {
                population_size: self.population_size,
                num_threads: self.num_threads,
            });
        }
        if !(0.0..=1.0).contains(&self.migration_probability) {
            return Err(Error::InvalidMigrationProbability);
        }
        if let Some(cross_process) = &self.cross_process {
            if cross_process.num_migrants == 0 {
                return Err(Error::ZeroNumMigrants);
            }
            if cross_process.generations_between_migrations == 0 {
                return Err(Error::ZeroMigrationInterval);
            }
        }
        Ok(EngineConfig {
            num_threads: self.num_threads,
            num_generations: self.num_generations,
            population_size: self.population_size,
            migration_probability: self.migration_probability,
            strict_determinism: self.strict_determinism,
            reentrancy_check: self.reentrancy_check,
            seed: self.seed,
            params: self.params.clone(),
            distributed: self.distributed.clone(),
            cross_process: self.cross_process.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let config = EngineConfigBuilder::new().build().unwrap();
        assert_eq!(config.num_threads, 1);
        assert_eq!(config.num_generations, 1);
        assert_eq!(config.population_size, 10);
        assert!(!config.strict_determinism);
        assert!(!config.reentrancy_check);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            EngineConfigBuilder::new().num_threads(0).build(),
            Err(Error::ZeroNumThreads)
        ));
        assert!(matches!(
            EngineConfigBuilder::new().num_generations(0).build(),
            Err(Error::ZeroNumGenerations)
        ));
        assert!(matches!(
            EngineConfigBuilder::new().population_size(0).build(),
            Err(Error::ZeroPopulationSize)
        ));
        assert!(matches!(
            EngineConfigBuilder::new()
                .num_threads(4)
                .population_size(3)
                .build(),
            Err(Error::PopulationSmallerThanIslands { .. })
        ));
        assert!(matches!(
            EngineConfigBuilder::new().migration_probability(1.5).build(),
            Err(Error::InvalidMigrationProbability)
        ));
        assert!(matches!(
            EngineConfigBuilder::new()
                .cross_process(CrossProcessConfig {
                    host: "127.0.0.1".to_string(),
                    port: 7991,
                    this_process_id: 0,
                    next_process_id: 1,
                    num_migrants: 0,
                    generations_between_migrations: 10,
                })
                .build(),
            Err(Error::ZeroNumMigrants)
        ));
    }
}
