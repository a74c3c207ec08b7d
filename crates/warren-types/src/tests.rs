use std::time::Duration;

use proptest::prelude::*;
use test_case::test_case;

use super::*;

#[test]
fn timestamp_monotonic_never_repeats() {
    // A "clock" stuck far in the future forces the prev+1 path.
    let stuck = Timestamp::from_nanos(u64::MAX - 10);
    let a = Timestamp::now_monotonic(Some(stuck));
    let b = Timestamp::now_monotonic(Some(a));
    assert!(a > stuck);
    assert!(b > a);
}

#[test]
fn timestamp_saturating_since_handles_future() {
    let early = Timestamp::from_nanos(100);
    let late = Timestamp::from_nanos(5_100);
    assert_eq!(late.saturating_since(early), Duration::from_nanos(5_000));
    assert_eq!(early.saturating_since(late), Duration::ZERO);
}

#[test]
fn resources_fits_is_per_dimension() {
    let capacity = Resources::new(CpuMillis::cores(4), MemoryBytes::gib(8));
    let ok = Resources::new(CpuMillis::new(4000), MemoryBytes::gib(8));
    let cpu_over = Resources::new(CpuMillis::new(4001), MemoryBytes::mib(1));
    let mem_over = Resources::new(CpuMillis::new(1), MemoryBytes::new(8 * 1024 * 1024 * 1024 + 1));

    assert!(capacity.fits(&ok));
    assert!(!capacity.fits(&cpu_over));
    assert!(!capacity.fits(&mem_over));
}

#[test]
fn resources_fraction_of_zero_capacity_is_zero() {
    let free = Resources::new(CpuMillis::new(100), MemoryBytes::new(100));
    assert_eq!(free.fraction_of(&Resources::ZERO), 0.0);
}

#[test_case("web", true; "simple")]
#[test_case("web-1", true; "dash and digit")]
#[test_case("a", true; "single char")]
#[test_case("", false; "empty")]
#[test_case("-web", false; "leading dash")]
#[test_case("web-", false; "trailing dash")]
#[test_case("Web", false; "uppercase")]
#[test_case("web_1", false; "underscore")]
fn name_validation(name: &str, valid: bool) {
    assert_eq!(is_valid_name(name), valid);
}

#[test]
fn name_length_limit() {
    let at_limit = "a".repeat(MAX_NAME_LEN);
    let over = "a".repeat(MAX_NAME_LEN + 1);
    assert!(is_valid_name(&at_limit));
    assert!(!is_valid_name(&over));
}

#[test_case(ActualState::Pending, ActualState::Assigned, true)]
#[test_case(ActualState::Pending, ActualState::Failed, true)]
#[test_case(ActualState::Assigned, ActualState::Running, true)]
#[test_case(ActualState::Running, ActualState::Complete, true)]
#[test_case(ActualState::Running, ActualState::Failed, true)]
#[test_case(ActualState::Running, ActualState::Assigned, false)]
#[test_case(ActualState::Assigned, ActualState::Pending, false)]
#[test_case(ActualState::Complete, ActualState::Running, false)]
#[test_case(ActualState::Failed, ActualState::Running, false)]
#[test_case(ActualState::Failed, ActualState::Complete, false)]
fn actual_state_transitions(from: ActualState, to: ActualState, allowed: bool) {
    assert_eq!(from.can_transition_to(to), allowed);
}

fn probe(healthy: bool, at: u64) -> ProbeResult {
    ProbeResult {
        healthy,
        message: if healthy { "ok" } else { "HTTP 503" }.to_string(),
        checked_at: Timestamp::from_nanos(at),
    }
}

#[test]
fn health_starts_healthy_and_flips_after_retries() {
    let mut health = HealthState::new();
    assert!(health.healthy);

    health.observe(&probe(false, 1), 3);
    assert!(health.healthy, "one failure below threshold keeps prior flag");
    health.observe(&probe(false, 2), 3);
    assert!(health.healthy);
    health.observe(&probe(false, 3), 3);
    assert!(!health.healthy, "third consecutive failure flips the flag");
    assert_eq!(health.consecutive_failures, 3);
}

#[test]
fn health_flips_back_on_any_success() {
    let mut health = HealthState::new();
    for at in 1..=5 {
        health.observe(&probe(false, at), 2);
    }
    assert!(!health.healthy);

    health.observe(&probe(true, 6), 2);
    assert!(health.healthy);
    assert_eq!(health.consecutive_failures, 0);
    assert_eq!(health.consecutive_successes, 1);
}

#[test]
fn health_monitoring_start_is_first_probe() {
    let mut health = HealthState::new();
    assert!(!health.past_grace(Duration::from_secs(10), Timestamp::from_nanos(u64::MAX)));

    health.observe(&probe(true, 1_000_000_000), 3);
    health.observe(&probe(true, 2_000_000_000), 3);
    assert_eq!(
        health.monitoring_start,
        Some(Timestamp::from_nanos(1_000_000_000))
    );

    let grace = Duration::from_secs(10);
    assert!(!health.past_grace(grace, Timestamp::from_nanos(5_000_000_000)));
    assert!(health.past_grace(grace, Timestamp::from_nanos(11_000_000_000)));
}

#[test]
fn instance_liveness_predicates() {
    let mut instance = Instance {
        id: InstanceId::generate(),
        service_id: ServiceId::generate(),
        node_id: None,
        desired: DesiredState::Running,
        actual: ActualState::Pending,
        image: "nginx:1".to_string(),
        reservation: Resources::ZERO,
        health: HealthState::new(),
        created_at: Timestamp::EPOCH,
        started_at: None,
        finished_at: None,
        last_error: None,
        pending_reason: None,
    };
    assert!(instance.is_live());
    assert!(!instance.holds_reservation());

    instance.node_id = Some(NodeId::generate());
    instance.actual = ActualState::Running;
    assert!(instance.holds_reservation());

    instance.actual = ActualState::Failed;
    assert!(!instance.is_live());
    assert!(!instance.holds_reservation());
}

#[test]
fn entity_ids_round_trip_serde() {
    let id = ServiceId::generate();
    let json = serde_json::to_string(&id).unwrap();
    let back: ServiceId = serde_json::from_str(&json).unwrap();
    assert_eq!(id, back);
}

proptest! {
    /// The healthy flag is false only when the failure streak has
    /// reached the threshold at some point without an intervening success.
    #[test]
    fn health_hysteresis_matches_reference(results in prop::collection::vec(any::<bool>(), 0..64), retries in 1u32..6) {
        let mut health = HealthState::new();
        let mut streak = 0u32;
        let mut expected = true;
        for (i, ok) in results.iter().enumerate() {
            health.observe(&probe(*ok, i as u64 + 1), retries);
            if *ok {
                streak = 0;
                expected = true;
            } else {
                streak += 1;
                if streak >= retries {
                    expected = false;
                }
            }
            prop_assert_eq!(health.healthy, expected);
        }
    }

    #[test]
    fn resources_sub_never_underflows(a in 0u64..u64::MAX, b in 0u64..u64::MAX) {
        let lhs = Resources::new(CpuMillis::new(a), MemoryBytes::new(a));
        let rhs = Resources::new(CpuMillis::new(b), MemoryBytes::new(b));
        let diff = lhs.saturating_sub(rhs);
        prop_assert!(diff.cpu.as_u64() <= a);
    }
}
