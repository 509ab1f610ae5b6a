use crate::barrier::{Barrier, OrderedBarrier};
use crate::common_util::hold;
use crate::distributed::{DistributedEvaluator, TcpPoolClient, WorkerPoolClient};
use crate::error::Error;
use crate::incumbent::IncumbentTracker;
use crate::link::{MigrationLink, TcpMigrationLink};
use crate::meta::{
    Chromosome, ChromosomeMaker, EngineConfig, EvolutionStrategy, ObjectiveFunction,
};
use crate::population::{Handoff, Population};
use crate::result::{BestSeen, FinalReport};
use crate::rng::RandomStreamRegistry;
use crate::router::{LoadAwareRingRouter, MigrationRouter};
use crate::worker::IslandWorker;
use log::{debug, info, warn};
use std::mem;
use std::panic;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Instant;

type PoolClientFactory = Box<dyn Fn() -> Box<dyn WorkerPoolClient> + Send + Sync>;
type LinkFactory = Box<dyn Fn() -> Box<dyn MigrationLink> + Send + Sync>;

pub(crate) struct RunContext<'a, C: Chromosome> {
    pub config: &'a EngineConfig,
    pub population: Population<C>,
    pub incumbent: IncumbentTracker<C>,
    pub island_sizes: Vec<AtomicUsize>,
    pub streams: RandomStreamRegistry,
    pub generation_barrier: Barrier,
    pub inner_barrier: Option<Barrier>,
    pub migration_barrier: OrderedBarrier<Handoff<C>>,
    pub evaluator: Option<DistributedEvaluator>,
    pub link: Option<Mutex<Box<dyn MigrationLink>>>,
    pub injected: Mutex<Vec<C>>,
    pub num_migrations: AtomicUsize,
    pub num_obj_func_eval: AtomicUsize,
}

impl<'a, C: Chromosome> RunContext<'a, C> {
    fn new(
        config: &'a EngineConfig,
        evaluator: Option<DistributedEvaluator>,
        link: Option<Mutex<Box<dyn MigrationLink>>>,
        injected: Vec<C>,
    ) -> Result<Self, Error> {
        let num_threads = config.num_threads;
        Ok(Self {
            population: Population::new(config.population_size, num_threads)?,
            incumbent: IncumbentTracker::new(),
            island_sizes: (0..num_threads).map(|_| AtomicUsize::new(0)).collect(),
            streams: RandomStreamRegistry::new(config.seed),
            generation_barrier: Barrier::new(num_threads)?,
            inner_barrier: if config.strict_determinism && num_threads > 1 {
                Some(Barrier::new(num_threads)?)
            } else {
                None
            },
            migration_barrier: OrderedBarrier::new(num_threads)?,
            evaluator,
            link,
            injected: Mutex::new(injected),
            num_migrations: AtomicUsize::new(0),
            num_obj_func_eval: AtomicUsize::new(0),
            config,
        })
    }

    pub fn publish_size(&self, island: usize, len: usize) {
        self.island_sizes[island].store(len, Ordering::SeqCst);
    }

    pub fn sizes_snapshot(&self) -> Vec<usize> {
        self.island_sizes
            .iter()
            .map(|size| size.load(Ordering::SeqCst))
            .collect()
    }

    pub fn take_injected(&self) -> Vec<C> {
        mem::take(&mut *hold(&self.injected))
    }

    // Retiring the barrier groups releases every peer blocked on them; a
    // worker that hits a fatal error calls this before unwinding.
    pub fn poison(&self) {
        self.generation_barrier.retire();
        if let Some(inner) = &self.inner_barrier {
            inner.retire();
        }
        self.migration_barrier.retire();
    }
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Coordinator<C: Chromosome> {
    config: EngineConfig,
    maker: Box<dyn ChromosomeMaker<C>>,
    strategy: Box<dyn EvolutionStrategy<C>>,
    router: Box<dyn MigrationRouter>,
    pool_client_factory: Option<PoolClientFactory>,
    link_factory: Option<LinkFactory>,
    busy: AtomicBool,
    sent_init_command: Mutex<Option<serde_json::Value>>,
    injected: Mutex<Vec<C>>,
}

impl<C: Chromosome> Coordinator<C> {
    pub fn new(
        config: EngineConfig,
        maker: Box<dyn ChromosomeMaker<C>>,
        strategy: Box<dyn EvolutionStrategy<C>>,
    ) -> Result<Self, Error> {
        let router = Box::new(LoadAwareRingRouter::new(config.migration_probability)?);
        Ok(Self {
            config,
            maker,
            strategy,
            router,
            pool_client_factory: None,
            link_factory: None,
            busy: AtomicBool::new(false),
            sent_init_command: Mutex::new(None),
            injected: Mutex::new(Vec::new()),
        })
    }

    pub fn with_router(mut self, router: Box<dyn MigrationRouter>) -> Self {
        self.router = router;
        self
    }

    pub fn with_pool_client_factory(mut self, factory: PoolClientFactory) -> Self {
        self.pool_client_factory = Some(factory);
        self
    }

    pub fn with_link_factory(mut self, factory: LinkFactory) -> Self {
        self.link_factory = Some(factory);
        self
    }

    pub fn inject(&self, chromosome: C) {
        hold(&self.injected).push(chromosome);
    }

    pub fn minimize<F: ObjectiveFunction<C>>(
        &self,
        objective: &F,
    ) -> Result<FinalReport<C>, Error> {
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(Error::CoordinatorBusy);
        }
        let _busy = BusyGuard(&self.busy);
        let started = Instant::now();
        self.run(objective, started)
    }

    fn run<F: ObjectiveFunction<C>>(
        &self,
        objective: &F,
        started: Instant,
    ) -> Result<FinalReport<C>, Error> {
        let config = &self.config;
        info!(
            "starting run: {} islands, {} generations, population {}{}",
            config.num_threads,
            config.num_generations,
            config.population_size,
            if config.strict_determinism {
                ", strict"
            } else {
                ""
            }
        );
        let evaluator = self.setup_evaluator()?;
        let link = self.setup_link();
        let ctx = RunContext::new(config, evaluator, link, mem::take(&mut *hold(&self.injected)))?;

        let mut worker_errors = Vec::new();
        let mut worker_panic = None;
        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(config.num_threads);
            for id in 0..config.num_threads {
                let ctx = &ctx;
                let maker = self.maker.as_ref();
                let strategy = self.strategy.as_ref();
                let router = self.router.as_ref();
                let spawned = thread::Builder::new()
                    .name(format!("island-{}", id))
                    .spawn_scoped(scope, move || {
                        IslandWorker::new(id, ctx, objective, maker, strategy, router).run()
                    });
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(error) => {
                        ctx.poison();
                        worker_errors.push(Error::Io(error));
                        break;
                    }
                }
            }
            for handle in handles {
                match handle.join() {
                    Ok(Ok(())) => {}
                    Ok(Err(error)) => worker_errors.push(error),
                    Err(payload) => {
                        ctx.poison();
                        worker_panic.get_or_insert(payload);
                    }
                }
            }
        });

        ctx.poison();
        if let Some(evaluator) = &ctx.evaluator {
            evaluator.close();
        }
        if let Some(link) = &ctx.link {
            if let Err(error) = hold(link).close() {
                debug!("closing migration relay connection failed: {}", error);
            }
        }
        if let Some(payload) = worker_panic {
            panic::resume_unwind(payload);
        }
        if let Some(error) = pick_fatal(worker_errors) {
            return Err(error);
        }

        let num_obj_func_eval = ctx.num_obj_func_eval.load(Ordering::SeqCst);
        let num_migrations = ctx.num_migrations.load(Ordering::SeqCst);
        let best = ctx
            .incumbent
            .into_best()
            .ok_or(Error::NoIndividuals)?;
        info!(
            "run finished: best value {}, {} evaluations, {} migrations",
            best.value.get(),
            num_obj_func_eval,
            num_migrations
        );
        Ok(FinalReport {
            best_seen: BestSeen {
                chromosome: best.chromosome,
                obj_func_val: best.value.get(),
            },
            num_obj_func_eval,
            num_migrations,
            processing_time: started.elapsed(),
        })
    }

    fn setup_evaluator(&self) -> Result<Option<DistributedEvaluator>, Error> {
        let client: Option<Box<dyn WorkerPoolClient>> =
            match (&self.pool_client_factory, &self.config.distributed) {
                (Some(factory), _) => Some(factory()),
                (None, Some(distributed)) => Some(Box::new(TcpPoolClient::new(
                    distributed.host.clone(),
                    distributed.port,
                ))),
                (None, None) => None,
            };
        let Some(client) = client else {
            return Ok(None);
        };
        let evaluator = DistributedEvaluator::new(client);
        if let Some(command) = self
            .config
            .distributed
            .as_ref()
            .and_then(|distributed| distributed.init_command.as_ref())
        {
            let mut sent = hold(&self.sent_init_command);
            if let Some(previous) = &*sent {
                if previous != command {
                    return Err(Error::InitCommandMismatch);
                }
            }
            match evaluator.submit_init_command(command) {
                Ok(()) => {
                    *sent = Some(command.clone());
                    info!("worker pool initialized");
                }
                Err(error) => {
                    warn!(
                        "worker pool init failed, evaluating locally for this run: {}",
                        error
                    );
                    return Ok(None);
                }
            }
        }
        Ok(Some(evaluator))
    }

    fn setup_link(&self) -> Option<Mutex<Box<dyn MigrationLink>>> {
        let cross = self.config.cross_process.as_ref()?;
        let link: Box<dyn MigrationLink> = match &self.link_factory {
            Some(factory) => factory(),
            None => Box::new(TcpMigrationLink::new(cross.host.clone(), cross.port)),
        };
        Some(Mutex::new(link))
    }
}

fn pick_fatal(errors: Vec<Error>) -> Option<Error> {
    let mut root = None;
    let mut retired = None;
    for error in errors {
        if matches!(error, Error::RetiredBarrierGroup) {
            if retired.is_none() {
                retired = Some(error);
            }
        } else if root.is_none() {
            root = Some(error);
        }
    }
    root.or(retired)
}
