use crate::common_util::hold;
use crate::coordinator::RunContext;
use crate::distributed::{DistributedEvaluator, RemoteTask};
use crate::error::Error;
use crate::link::LinkIndividual;
use crate::meta::{Chromosome, ChromosomeMaker, EvolutionStrategy, ObjectiveFunction};
use crate::population::{Handoff, Individual, MigrationMessage, PopulationView};
use crate::router::MigrationRouter;
use enum_display_derive::Display;
use itertools::Itertools;
use log::{debug, trace, warn};
use std::fmt::Display;
use std::sync::atomic::Ordering;
use tangram_finite::FiniteF64;

const DEFAULT_NUM_EMIGRANTS: usize = 2;

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Initializing,
    Ready,
    Evolving,
    Migrating,
    Barriered,
    Finished,
}

pub(crate) struct IslandWorker<'a, C: Chromosome, F: ObjectiveFunction<C>> {
    id: usize,
    ctx: &'a RunContext<'a, C>,
    objective: &'a F,
    maker: &'a dyn ChromosomeMaker<C>,
    strategy: &'a dyn EvolutionStrategy<C>,
    router: &'a dyn MigrationRouter,
    local_best: Option<FiniteF64>,
    state: WorkerState,
    link_failed: bool,
}

impl<'a, C: Chromosome, F: ObjectiveFunction<C>> IslandWorker<'a, C, F> {
    pub fn new(
        id: usize,
        ctx: &'a RunContext<'a, C>,
        objective: &'a F,
        maker: &'a dyn ChromosomeMaker<C>,
        strategy: &'a dyn EvolutionStrategy<C>,
        router: &'a dyn MigrationRouter,
    ) -> Self {
        Self {
            id,
            ctx,
            objective,
            maker,
            strategy,
            router,
            local_best: None,
            state: WorkerState::Initializing,
            link_failed: false,
        }
    }

    pub fn run(mut self) -> Result<(), Error> {
        let result = self.run_loop();
        match &result {
            Ok(()) => {}
            Err(Error::RetiredBarrierGroup) => {
                debug!("island {} released by a retired barrier group", self.id);
            }
            Err(error) => {
                warn!("island {} aborting the run: {}", self.id, error);
                self.ctx.poison();
            }
        }
        result
    }

    fn run_loop(&mut self) -> Result<(), Error> {
        self.initialize()?;
        self.set_state(WorkerState::Ready);
        for generation in 0..self.ctx.config.num_generations {
            // Top-of-loop rendezvous: one barrier cannot guarantee both "all
            // sends done" and "all receives visible"; together with the
            // bottom barrier it makes the previous generation's hand-offs
            // visible before anyone merges.
            self.ctx.generation_barrier.wait()?;
            self.set_state(WorkerState::Evolving);
            self.merge(generation)?;
            let max_work = self.agree_on_workload()?;
            let view = PopulationView::capture(&self.ctx.population);
            debug!(
                "island {} running generation {} popsize {}",
                self.id,
                generation,
                self.ctx.population.island(self.id).len()
            );
            self.evolve(generation, view, max_work)?;
            self.set_state(WorkerState::Migrating);
            self.migrate(generation)?;
            self.set_state(WorkerState::Barriered);
            self.publish_size();
            self.ctx.generation_barrier.wait()?;
        }
        self.set_state(WorkerState::Finished);
        debug!("island {} done", self.id);
        Ok(())
    }

    fn set_state(&mut self, state: WorkerState) {
        trace!("island {} {} -> {}", self.id, self.state, state);
        self.state = state;
    }

    fn initialize(&mut self) -> Result<(), Error> {
        self.set_state(WorkerState::Initializing);
        let range = self.ctx.population.range(self.id).clone();
        let mut created = Vec::with_capacity(range.len());
        for slot in range {
            let mut rng = self.ctx.streams.init_stream(slot);
            created.push(Some(self.maker.create(slot, &mut rng)?));
        }
        let values = self.evaluate_candidates(&created);

        let mut island = Vec::with_capacity(created.len());
        let mut best: Option<(FiniteF64, usize)> = None;
        for (ix, (chromosome, value)) in created.into_iter().zip(values).enumerate() {
            let chromosome = chromosome.expect("created chromosomes are all present");
            match value {
                Some(value) => {
                    if best.map_or(true, |(best_value, _)| value < best_value) {
                        best = Some((value, ix));
                    }
                    island.push(Individual::evaluated(chromosome, value));
                }
                None => island.push(Individual::new(chromosome)),
            }
        }
        if let Some((value, ix)) = best {
            self.local_best = Some(value);
            self.update_incumbent(&island[ix].chromosome, value)?;
        }
        *self.ctx.population.island(self.id) = island;
        self.publish_size();
        Ok(())
    }

    fn merge(&mut self, generation: usize) -> Result<(), Error> {
        let mut arrivals: Vec<Individual<C>> = Vec::new();
        for message in self.ctx.population.drain_inbox(self.id) {
            debug!(
                "island {} merging {} migrants from island {} (sent in generation {})",
                self.id,
                message.individuals.len(),
                message.source_island,
                message.generation
            );
            arrivals.extend(message.individuals);
        }
        if self.id == 0 {
            for chromosome in self.ctx.take_injected() {
                match self.evaluate_locally(&chromosome) {
                    Some(value) => {
                        if self.local_best.map_or(true, |best| value < best) {
                            self.local_best = Some(value);
                            self.update_incumbent(&chromosome, value)?;
                        }
                        arrivals.push(Individual::evaluated(chromosome, value));
                    }
                    None => debug!("island 0 dropped an injected solution that failed evaluation"),
                }
            }
            if self.link_is_due(generation) {
                self.exchange_with_ring(generation, &mut arrivals);
            }
        }
        for individual in &arrivals {
            if let Some(value) = individual.value {
                if self.local_best.map_or(true, |best| value < best) {
                    self.local_best = Some(value);
                }
            }
        }
        self.ctx.population.island(self.id).extend(arrivals);
        Ok(())
    }

    // In strict mode every island agrees on the maximum per-island workload
    // right after the merge step, so that the build and commit loops can run
    // in lockstep with idle rounds on the smaller islands.
    fn agree_on_workload(&self) -> Result<usize, Error> {
        let my_len = self.ctx.population.island(self.id).len();
        match &self.ctx.inner_barrier {
            Some(inner) => {
                self.ctx.publish_size(self.id, my_len);
                inner.wait()?;
                Ok(self
                    .ctx
                    .sizes_snapshot()
                    .into_iter()
                    .max()
                    .unwrap_or(my_len))
            }
            None => Ok(my_len),
        }
    }

    fn evolve(
        &mut self,
        generation: usize,
        mut view: PopulationView<C>,
        max_work: usize,
    ) -> Result<(), Error> {
        let base = view.base_of(self.id);
        let my_len = self.ctx.population.island(self.id).len();
        let remote_active = self
            .ctx
            .evaluator
            .as_ref()
            .map_or(false, DistributedEvaluator::is_active);

        if self.ctx.config.strict_determinism || remote_active {
            let mut candidates: Vec<Option<C>> = Vec::with_capacity(my_len);
            for work in 0..max_work {
                if work < my_len {
                    candidates.push(self.build_candidate(generation, base + work, &view));
                }
                if let Some(inner) = &self.ctx.inner_barrier {
                    inner.wait()?;
                }
            }
            let values = self.evaluate_candidates(&candidates);
            for work in 0..max_work {
                if work < my_len {
                    if let (Some(candidate), Some(value)) = (&candidates[work], values[work]) {
                        self.commit(work, candidate.clone(), value)?;
                    }
                }
                if let Some(inner) = &self.ctx.inner_barrier {
                    inner.wait()?;
                }
            }
        } else {
            for work in 0..my_len {
                let slot = base + work;
                let Some(candidate) = self.build_candidate(generation, slot, &view) else {
                    continue;
                };
                let Some(value) = self.evaluate_locally(&candidate) else {
                    continue;
                };
                if self.commit(work, candidate.clone(), value)? {
                    view.set(slot, Individual::evaluated(candidate, value));
                }
            }
        }
        Ok(())
    }

    fn build_candidate(
        &self,
        generation: usize,
        slot: usize,
        view: &PopulationView<C>,
    ) -> Option<C> {
        let mut rng = self.ctx.streams.individual_stream(generation, slot);
        match self.strategy.propose(slot, view.get(slot), view, &mut rng) {
            Ok(candidate) => Some(candidate),
            Err(error) => {
                trace!(
                    "island {}: no candidate for slot {}: {}",
                    self.id,
                    slot,
                    error
                );
                None
            }
        }
    }

    fn commit(&mut self, local_ix: usize, candidate: C, value: FiniteF64) -> Result<bool, Error> {
        let mut island = self.ctx.population.island(self.id);
        let improves = island[local_ix]
            .value
            .map_or(true, |current| value < current);
        if !improves {
            return Ok(false);
        }
        island[local_ix] = Individual::evaluated(candidate.clone(), value);
        drop(island);
        if self.local_best.map_or(true, |best| value < best) {
            self.local_best = Some(value);
            self.update_incumbent(&candidate, value)?;
        }
        Ok(true)
    }

    fn migrate(&mut self, generation: usize) -> Result<(), Error> {
        let sizes = self.ctx.sizes_snapshot();
        let mut rng = self.ctx.streams.island_stream(generation, self.id);
        let target = self
            .router
            .route(self.id, generation, &sizes, &mut rng)
            .filter(|&to| to != self.id && to < sizes.len());
        let payload = target.and_then(|to| {
            let mut island = self.ctx.population.island(self.id);
            if island.len() <= 1 {
                return None;
            }
            let count = DEFAULT_NUM_EMIGRANTS.min(island.len() - 1);
            let individuals = take_best(&mut island, count);
            trace!(
                "island {} sending {} individuals to island {}",
                self.id,
                individuals.len(),
                to
            );
            Some(Handoff {
                to,
                message: MigrationMessage {
                    individuals,
                    source_island: self.id,
                    generation,
                },
            })
        });
        let population = &self.ctx.population;
        let num_migrations = &self.ctx.num_migrations;
        self.ctx
            .migration_barrier
            .wait(self.id, payload, |source, handoff| {
                trace!(
                    "delivering {} migrants from island {} to island {}",
                    handoff.message.individuals.len(),
                    source,
                    handoff.to
                );
                num_migrations.fetch_add(handoff.message.individuals.len(), Ordering::SeqCst);
                population.deliver_to(handoff.to, handoff.message);
            })
    }

    fn publish_size(&self) {
        self.ctx
            .publish_size(self.id, self.ctx.population.island(self.id).len());
    }

    fn link_is_due(&self, generation: usize) -> bool {
        match (&self.ctx.link, &self.ctx.config.cross_process) {
            (Some(_), Some(cross)) => {
                !self.link_failed
                    && generation > 0
                    && generation % cross.generations_between_migrations == 0
            }
            _ => false,
        }
    }

    fn exchange_with_ring(&mut self, generation: usize, arrivals: &mut Vec<Individual<C>>) {
        let (Some(link), Some(cross)) = (&self.ctx.link, &self.ctx.config.cross_process) else {
            return;
        };
        let mut link = hold(link);

        let emigrants = {
            let mut island = self.ctx.population.island(self.id);
            if island.len() <= 1 {
                return;
            }
            let count = cross.num_migrants.min(island.len() - 1);
            take_best(&mut island, count)
        };
        let mut outbound = Vec::with_capacity(emigrants.len());
        for individual in &emigrants {
            match serde_json::to_value(&individual.chromosome) {
                Ok(chromosome) => outbound.push(LinkIndividual {
                    chromosome,
                    value: individual.value.map(FiniteF64::get),
                }),
                Err(error) => {
                    warn!(
                        "island 0 disabling cross-process migration, cannot encode chromosome: {}",
                        error
                    );
                    self.link_failed = true;
                    self.ctx.population.island(self.id).extend(emigrants);
                    return;
                }
            }
        }
        if let Err(error) = link.send(cross.this_process_id, cross.next_process_id, outbound) {
            warn!(
                "island 0 disabling cross-process migration after send failure: {}",
                error
            );
            self.link_failed = true;
            self.ctx.population.island(self.id).extend(emigrants);
            return;
        }
        trace!(
            "process {} sent {} individuals to process {} (generation {})",
            cross.this_process_id,
            emigrants.len(),
            cross.next_process_id,
            generation
        );
        match link.recv(cross.this_process_id) {
            Ok(received) => {
                for individual in received {
                    match serde_json::from_value::<C>(individual.chromosome) {
                        Ok(chromosome) => {
                            let value =
                                individual.value.and_then(|v| FiniteF64::new(v).ok());
                            arrivals.push(Individual {
                                chromosome,
                                value,
                            });
                        }
                        Err(error) => {
                            debug!("island 0 dropped an inbound migrant: {}", error)
                        }
                    }
                }
            }
            Err(error) => {
                warn!(
                    "island 0 disabling cross-process migration after recv failure: {}",
                    error
                );
                self.link_failed = true;
            }
        }
    }

    fn evaluate_candidates(&self, candidates: &[Option<C>]) -> Vec<Option<FiniteF64>> {
        if let Some(evaluator) = &self.ctx.evaluator {
            if evaluator.is_active() {
                match self.try_remote(candidates, evaluator) {
                    Ok(values) => return values,
                    Err(error) => {
                        warn!(
                            "island {}: remote evaluation failed, evaluating locally for the \
                             rest of the run: {}",
                            self.id, error
                        );
                        evaluator.mark_failed();
                    }
                }
            }
        }
        candidates
            .iter()
            .map(|candidate| {
                candidate
                    .as_ref()
                    .and_then(|candidate| self.evaluate_locally(candidate))
            })
            .collect()
    }

    fn try_remote(
        &self,
        candidates: &[Option<C>],
        evaluator: &DistributedEvaluator,
    ) -> Result<Vec<Option<FiniteF64>>, Error> {
        let mut tasks = Vec::new();
        let mut positions = Vec::new();
        for (position, candidate) in candidates.iter().enumerate() {
            if let Some(candidate) = candidate {
                tasks.push(RemoteTask {
                    task_id: tasks.len(),
                    candidate: serde_json::to_value(candidate)?,
                    params: self.ctx.config.params.clone(),
                });
                positions.push(position);
            }
        }
        let mut values = vec![None; candidates.len()];
        if tasks.is_empty() {
            return Ok(values);
        }
        let results = evaluator.evaluate_batch(&tasks)?;
        self.ctx
            .num_obj_func_eval
            .fetch_add(tasks.len(), Ordering::SeqCst);
        for (position, value) in positions.into_iter().zip(results) {
            values[position] = value.and_then(|value| FiniteF64::new(value).ok());
        }
        Ok(values)
    }

    fn evaluate_locally(&self, chromosome: &C) -> Option<FiniteF64> {
        self.ctx.num_obj_func_eval.fetch_add(1, Ordering::SeqCst);
        match self.objective.evaluate(chromosome, &self.ctx.config.params) {
            Ok(value) => match FiniteF64::new(value) {
                Ok(value) => Some(value),
                Err(_) => {
                    trace!(
                        "island {}: discarding candidate, {}",
                        self.id,
                        Error::ObjFuncValMustBeFinite
                    );
                    None
                }
            },
            Err(error) => {
                trace!(
                    "island {}: discarding candidate, evaluation failed: {}",
                    self.id,
                    error
                );
                None
            }
        }
    }

    fn update_incumbent(&self, chromosome: &C, value: FiniteF64) -> Result<(), Error> {
        let improved = if self.ctx.config.reentrancy_check {
            self.ctx.incumbent.try_update_checked(
                chromosome,
                value,
                self.objective,
                &self.ctx.config.params,
            )?
        } else {
            self.ctx.incumbent.try_update(chromosome, value)
        };
        if improved {
            trace!(
                "island {} improved the incumbent to {}",
                self.id,
                value.get()
            );
        }
        Ok(())
    }
}

fn take_best<C: Chromosome>(
    island: &mut Vec<Individual<C>>,
    count: usize,
) -> Vec<Individual<C>> {
    let descending_picks = (0..island.len())
        .sorted_by(|&a, &b| {
            value_order(island[a].value, island[b].value).then(a.cmp(&b))
        })
        .take(count)
        .sorted_by(|a, b| b.cmp(a))
        .collect::<Vec<_>>();
    descending_picks
        .into_iter()
        .map(|ix| island.remove(ix))
        .collect()
}

fn value_order(a: Option<FiniteF64>, b: Option<FiniteF64>) -> std::cmp::Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    }
}
