use rand::rngs::StdRng;
use rand::SeedableRng;

use ranging_mds::evaluation::{build_round, run_simulation, summarize, SimulationSettings};
use ranging_mds::swarm::{Agent, Behavior, Method, Swarm, OVER_GUESS_DISTANCE};
use ranging_mds::Config;

fn connected_swarm(seed: u64) -> Swarm {
    let mut swarm = Swarm::random(25, 20.0, 10.0, seed);
    swarm.connect_within_range(true);
    swarm
}

#[test]
fn drop_rate_zero_keeps_every_neighbor() {
    let mut swarm = connected_swarm(3);
    let before: Vec<_> = swarm.agents().iter().map(|a| a.neighbors.clone()).collect();
    let mut rng = StdRng::seed_from_u64(9);
    swarm.randomly_drop_neighbors(0.0, true, &mut rng);
    let after: Vec<_> = swarm.agents().iter().map(|a| a.neighbors.clone()).collect();
    assert_eq!(before, after);
}

#[test]
fn drop_rate_one_symmetric_empties_both_sides() {
    let mut swarm = connected_swarm(3);
    assert!(swarm.agents().iter().any(|a| !a.neighbors.is_empty()));
    let mut rng = StdRng::seed_from_u64(9);
    swarm.randomly_drop_neighbors(1.0, true, &mut rng);
    assert!(swarm.agents().iter().all(|a| a.neighbors.is_empty()));
}

#[test]
fn symmetric_links_stay_reciprocal_after_partial_drops() {
    let mut swarm = connected_swarm(4);
    let mut rng = StdRng::seed_from_u64(1);
    swarm.randomly_drop_neighbors(0.4, true, &mut rng);
    for agent in swarm.agents() {
        for &n in &agent.neighbors {
            assert!(swarm.agent(n).unwrap().neighbors.contains(&agent.id));
        }
    }
}

#[test]
fn entry_table_holds_own_and_neighbor_rows() {
    let mut swarm = connected_swarm(5);
    let mut rng = StdRng::seed_from_u64(2);
    swarm.gather_initial_guesses(0.1, &mut rng);
    let agent = swarm
        .agents()
        .iter()
        .find(|a| a.neighbors.len() >= 2)
        .unwrap();
    let table = swarm.entry_table_for(agent.id);
    assert_eq!(table.len(), agent.neighbors.len() + 1);
    assert_eq!(table.row(agent.id).unwrap(), &agent.initial_guesses);
    for &n in &agent.neighbors {
        assert_eq!(table.row(n).unwrap(), &swarm.agent(n).unwrap().initial_guesses);
    }
}

#[test]
fn malicious_agent_keeps_fixed_guesses_in_weighted_round() {
    // A tight cluster so everyone sees everyone; agent 0 always claims 15.
    let positions = [(0.0, 0.0), (3.0, 0.0), (0.0, 3.0), (3.0, 3.0), (1.5, 4.5)];
    let mut agents: Vec<Agent> = positions
        .iter()
        .map(|&(x, y)| Agent::new(x, y, 10.0))
        .collect();
    agents[0].behavior = Behavior::OverGuess;
    let mut swarm = Swarm::new(agents);
    let mut rng = StdRng::seed_from_u64(0);
    swarm.connect_within_range(true);
    swarm.gather_initial_guesses(0.05, &mut rng);

    let records = swarm.run_method(Method::Weighted, 0, &Config::default());
    let mine: Vec<_> = records.iter().filter(|r| r.agent == 0).collect();
    assert_eq!(mine.len(), 4);
    for r in mine {
        assert_eq!(r.guessed_distance, OVER_GUESS_DISTANCE);
        assert!(r.average_stress.is_none());
    }
    let honest_weighted = records.iter().filter(|r| r.agent != 0).count();
    assert_eq!(honest_weighted, 16);
}

#[test]
fn every_method_produces_one_record_per_link() {
    let settings = SimulationSettings {
        agents: 12,
        rounds: 1,
        bounds: 15.0,
        range: 9.0,
        ..SimulationSettings::default()
    };
    let swarm = build_round(&settings, 0);
    let links: usize = swarm.agents().iter().map(|a| a.neighbors.len()).sum();
    let cfg = Config::default();
    for method in Method::ALL {
        let records = swarm.run_method(method, 0, &cfg);
        assert_eq!(records.len(), links, "{method}");
        assert!(records.iter().all(|r| r.guessed_distance.is_finite()));
    }
}

#[test]
fn simulation_is_deterministic_for_a_seed() {
    let settings = SimulationSettings {
        agents: 10,
        rounds: 2,
        bounds: 12.0,
        range: 8.0,
        adversaries: 2,
        strategy: Behavior::ThresholdBreak,
        methods: vec![Method::InitialGuess, Method::AverageOut, Method::Weighted],
        ..SimulationSettings::default()
    };
    let cfg = Config::default();
    let a = run_simulation(&settings, &cfg).unwrap();
    let b = run_simulation(&settings, &cfg).unwrap();
    assert_eq!(a.summaries.len(), 3);
    for (x, y) in a.summaries.iter().zip(&b.summaries) {
        assert_eq!(x.method, y.method);
        assert_eq!(x.records, y.records);
        assert_eq!(x.mean_abs_error, y.mean_abs_error);
        assert_eq!(x.ndcf_6, y.ndcf_6);
    }
}

#[test]
fn noiseless_initial_guesses_are_exact() {
    let settings = SimulationSettings {
        agents: 8,
        bounds: 10.0,
        noise: 0.0,
        ..SimulationSettings::default()
    };
    let swarm = build_round(&settings, 0);
    let records = swarm.run_method(Method::InitialGuess, 0, &Config::default());
    let summary = &summarize(&records)[0];
    assert!(summary.mean_abs_error.abs() < 1e-12);
    assert_eq!(summary.ndcf_6, 0.0);
}
