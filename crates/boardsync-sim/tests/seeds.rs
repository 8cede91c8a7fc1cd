use boardsync_sim::oracle::SyncOracle;
use boardsync_sim::rng::DeterministicRng;
use boardsync_sim::{SimulationConfig, Simulator};
use proptest::prelude::*;

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(24))]

    #[test]
    fn any_seed_satisfies_the_oracle(seed in any::<u64>(), tabs in 1_usize..5, rounds in 1_u64..12) {
        let config = SimulationConfig {
            seed,
            tab_count: tabs,
            rounds,
            ..SimulationConfig::default()
        };
        let result = Simulator::new(config).expect("valid").run().expect("run");
        prop_assert_eq!(result.states.len(), tabs);
        let oracle = SyncOracle::check_all(&result.states, &result.trace);
        prop_assert!(oracle.passed, "seed {}: {:?}", seed, oracle.violations);
    }

    #[test]
    fn bounded_draws_stay_in_range(seed in any::<u64>(), upper in 1_u64..1_000) {
        let mut rng = DeterministicRng::new(seed);
        for _ in 0..64 {
            prop_assert!(rng.next_bounded(upper) < upper);
        }
    }
}
