use core_playback::{
    BufferingStrategy, HeuristicStrategy, ListeningBehavior, PatternAwareStrategy,
    ReliabilityTracker, RepairMode, SessionHistory, StrategyContext,
};
use std::collections::HashMap;

fn context(
    current: usize,
    total: usize,
    failures: u32,
    behavior: ListeningBehavior,
    reliability: &ReliabilityTracker,
) -> StrategyContext<'_> {
    StrategyContext {
        current_chunk: current,
        total_chunks: total,
        recent_failures: failures,
        behavior,
        reliability,
    }
}

#[test]
fn test_heuristic_warm_start_buffers_deeper() {
    let tracker = ReliabilityTracker::default();
    let decision = HeuristicStrategy::new(3).decide(&context(
        0,
        20,
        0,
        ListeningBehavior::Continuous,
        &tracker,
    ));

    assert_eq!(decision.look_ahead_count, 4);
    assert_eq!(decision.priority_indices, vec![1, 2, 3, 4]);
    assert_eq!(decision.repair_mode, RepairMode::Background);
}

#[test]
fn test_heuristic_wind_down_buffers_shallower() {
    let tracker = ReliabilityTracker::default();
    let decision = HeuristicStrategy::new(3).decide(&context(
        19,
        20,
        0,
        ListeningBehavior::Continuous,
        &tracker,
    ));

    assert_eq!(decision.look_ahead_count, 2);
    // nothing left after the last chunk
    assert!(decision.priority_indices.is_empty());

    let decision = HeuristicStrategy::new(1).decide(&context(
        95,
        100,
        0,
        ListeningBehavior::Continuous,
        &tracker,
    ));
    assert_eq!(decision.look_ahead_count, 1);
    assert_eq!(decision.priority_indices, vec![96]);
}

#[test]
fn test_heuristic_escalates_after_repeated_failures() {
    let tracker = ReliabilityTracker::default();
    let strategy = HeuristicStrategy::new(3);

    let calm = strategy.decide(&context(5, 20, 2, ListeningBehavior::Continuous, &tracker));
    assert_eq!(calm.repair_mode, RepairMode::Background);
    assert_eq!(calm.look_ahead_count, 3);

    let failing = strategy.decide(&context(5, 20, 3, ListeningBehavior::Continuous, &tracker));
    assert_eq!(failing.repair_mode, RepairMode::Immediate);
    assert_eq!(failing.look_ahead_count, 2);
    assert_eq!(failing.priority_indices, vec![6, 7]);

    // never below two while repairing
    let shallow = HeuristicStrategy::new(1).decide(&context(
        5,
        20,
        5,
        ListeningBehavior::Continuous,
        &tracker,
    ));
    assert_eq!(shallow.look_ahead_count, 2);
}

#[test]
fn test_pattern_aware_orders_unreliable_chunks_first() {
    let tracker = ReliabilityTracker::default();
    let history = SessionHistory {
        chunk_failure_rates: HashMap::from([(8, 0.6)]),
        seeks_per_minute: 0.0,
        sessions_observed: 4,
    };
    let strategy = PatternAwareStrategy::new(HeuristicStrategy::new(3), history);

    let decision = strategy.decide(&context(5, 20, 0, ListeningBehavior::Continuous, &tracker));
    assert_eq!(decision.priority_indices, vec![8, 6, 7]);
    assert_eq!(decision.repair_mode, RepairMode::Immediate);
    assert_eq!(strategy.name(), "pattern-aware");
}

#[test]
fn test_pattern_aware_skips_hopeless_chunks() {
    let tracker = ReliabilityTracker::default();
    let history = SessionHistory {
        chunk_failure_rates: HashMap::from([(7, 0.9), (6, 0.55)]),
        ..SessionHistory::default()
    };
    let strategy = PatternAwareStrategy::new(HeuristicStrategy::new(3), history);

    let decision = strategy.decide(&context(5, 20, 0, ListeningBehavior::Continuous, &tracker));
    assert_eq!(decision.repair_mode, RepairMode::Skip);
    assert_eq!(decision.priority_indices, vec![6, 7, 8]);
}

#[test]
fn test_pattern_aware_shrinks_window_for_seekers() {
    let tracker = ReliabilityTracker::default();
    let strategy = PatternAwareStrategy::default();

    let decision = strategy.decide(&context(5, 20, 0, ListeningBehavior::Seeking, &tracker));
    assert_eq!(decision.look_ahead_count, 2);
    assert_eq!(decision.priority_indices, vec![6, 7]);

    let frequent = PatternAwareStrategy::new(
        HeuristicStrategy::new(1),
        SessionHistory {
            seeks_per_minute: 5.0,
            ..SessionHistory::default()
        },
    );
    // already at the minimum
    let decision = frequent.decide(&context(5, 20, 0, ListeningBehavior::Continuous, &tracker));
    assert_eq!(decision.look_ahead_count, 1);
}

#[test]
fn test_custom_strategy_defaults_its_name() {
    struct Fixed;

    impl BufferingStrategy for Fixed {
        fn decide(&self, context: &StrategyContext<'_>) -> core_playback::BufferingDecision {
            core_playback::BufferingDecision {
                look_ahead_count: 1,
                priority_indices: vec![context.current_chunk + 1],
                repair_mode: RepairMode::Background,
            }
        }
    }

    assert_eq!(Fixed.name(), "custom");
}
