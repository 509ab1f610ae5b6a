use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FinalReport<C> {
    pub best_seen: BestSeen<C>,
    pub num_obj_func_eval: usize,
    pub num_migrations: usize,
    pub processing_time: Duration,
}

#[derive(Debug, Clone)]
pub struct BestSeen<C> {
    pub chromosome: C,
    pub obj_func_val: f64,
}
