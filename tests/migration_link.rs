use archipelago::coordinator::Coordinator;
use archipelago::double_array::{RandomDeltaPerturbation, UniformVectorMaker};
use archipelago::link::{LinkIndividual, LinkRequest, LinkResponse};
use archipelago::meta::{
    make_obj_func, CrossProcessConfig, EngineConfigBuilder, ObjectiveFunction, Params,
};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

const POPULATION_SIZE: usize = 8;
const NUM_GENERATIONS: usize = 12;

fn sphere() -> impl ObjectiveFunction<Vec<f64>> {
    make_obj_func(|candidate: &Vec<f64>, _: &Params| {
        Ok(candidate.iter().map(|coord| coord * coord).sum())
    })
}

// Loopback relay: individuals sent by the process are buffered and handed
// straight back on the next recv, as if the ring consisted of one process.
fn spawn_relay() -> (u16, Arc<AtomicUsize>, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let num_sends = Arc::new(AtomicUsize::new(0));
    let recorded = Arc::clone(&num_sends);
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        let reader = BufReader::new(stream);
        let mut buffered: Vec<LinkIndividual> = Vec::new();
        for line in reader.lines() {
            let line = line.unwrap();
            let response = match serde_json::from_str(&line).unwrap() {
                LinkRequest::Send { individuals, .. } => {
                    recorded.fetch_add(1, Ordering::SeqCst);
                    buffered.extend(individuals);
                    LinkResponse::Ack
                }
                LinkRequest::Recv { .. } => {
                    if buffered.is_empty() {
                        LinkResponse::TimedOut
                    } else {
                        LinkResponse::Individuals {
                            individuals: std::mem::take(&mut buffered),
                        }
                    }
                }
                LinkRequest::Close => break,
            };
            let mut line = serde_json::to_string(&response).unwrap();
            line.push('\n');
            writer.write_all(line.as_bytes()).unwrap();
            writer.flush().unwrap();
        }
    });
    (port, num_sends, handle)
}

#[test]
fn ring_exchange_round_trips_individuals_through_the_relay() {
    let (port, num_sends, relay) = spawn_relay();

    let config = EngineConfigBuilder::new()
        .num_threads(2)
        .population_size(POPULATION_SIZE)
        .num_generations(NUM_GENERATIONS)
        .migration_probability(0.0)
        .seed(31)
        .cross_process(CrossProcessConfig {
            host: "127.0.0.1".to_string(),
            port,
            this_process_id: 0,
            next_process_id: 0,
            num_migrants: 2,
            generations_between_migrations: 5,
        })
        .build()
        .unwrap();

    let coordinator = Coordinator::new(
        config,
        Box::new(UniformVectorMaker::new(3, -1.0, 1.0).unwrap()),
        Box::new(RandomDeltaPerturbation::new(0.3).unwrap()),
    )
    .unwrap();

    let report = coordinator.minimize(&sphere()).unwrap();
    relay.join().unwrap();

    // exchanges are due at generations 5 and 10
    assert_eq!(num_sends.load(Ordering::SeqCst), 2);
    // emigrants come back with cached values, so nothing is re-evaluated
    assert_eq!(
        report.num_obj_func_eval,
        POPULATION_SIZE * (NUM_GENERATIONS + 1)
    );
    assert!(report.best_seen.obj_func_val.is_finite());
}
