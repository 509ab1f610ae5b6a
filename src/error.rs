use std::io;
use thiserror;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("number of threads must be strictly positive")]
    ZeroNumThreads,
    #[error("number of generations must be strictly positive")]
    ZeroNumGenerations,
    #[error("population size must be strictly positive")]
    ZeroPopulationSize,
    #[error("population size {population_size} is smaller than the number of islands {num_threads}")]
    PopulationSmallerThanIslands {
        population_size: usize,
        num_threads: usize,
    },
    #[error("migration probability must be within [0, 1]")]
    InvalidMigrationProbability,
    #[error("min must be lower than max")]
    InvalidBounds,
    #[error("differential weight must be within [0, 2]")]
    InvalidDifferentialWeight,
    #[error("crossover probability must be within [0, 1]")]
    InvalidCrossoverProbability,
    #[error("perturbation scale must be strictly positive")]
    InvalidPerturbationScale,
    #[error("chromosome dimension must be strictly positive")]
    ZeroDimension,
    #[error("number of migrants must be strictly positive")]
    ZeroNumMigrants,
    #[error("generations between migrations must be strictly positive")]
    ZeroMigrationInterval,
    #[error("barrier group must have at least one participant")]
    ZeroBarrierParticipants,
    #[error("participant id {id} out of range for barrier group of {participants}")]
    UnknownBarrierParticipant { id: usize, participants: usize },
    #[error("barrier group has been retired")]
    RetiredBarrierGroup,
    #[error("another minimize call is already running on this coordinator")]
    CoordinatorBusy,
    #[error("worker pool was initialized with a different init command on a previous run")]
    InitCommandMismatch,
    #[error("worker pool connection was already initialized")]
    PoolAlreadyInitialized,
    #[error("worker pool refused the request: {message}")]
    PoolRefused { message: String },
    #[error("worker pool returned a batch that does not match the submitted tasks")]
    MisalignedBatch,
    #[error("worker pool connection closed unexpectedly")]
    PoolHungUp,
    #[error("migration relay refused the request: {message}")]
    LinkRefused { message: String },
    #[error("migration relay connection closed unexpectedly")]
    LinkHungUp,
    #[error("received non-finite objective function value")]
    ObjFuncValMustBeFinite,
    #[error("candidate evaluation failed: {0}")]
    CandidateEvaluation(String),
    #[error("population too small to build a differential candidate")]
    PopulationTooSmallForDonors,
    #[error("no evaluated individual available in the population view")]
    NoEvaluatedIndividuals,
    #[error("no successfully evaluated individuals available")]
    NoIndividuals,
    #[error(
        "incumbent sanity check failed: cached value {cached} but recomputed {recomputed}; \
         the objective function is most likely not reentrant"
    )]
    ReentrancyViolation { cached: f64, recomputed: f64 },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("invalid JSON")]
    InvalidJson(#[from] serde_json::Error),
}
