//! Multi-vehicle scenarios on a straight road.

use platoon_coordination::PlatoonConfig;
use platoon_simulation::{NetworkConfig, SimulationError, SimulationRunner, VehicleSpec};
use platoon_types::{PlatoonState, VehicleId};
use std::time::Duration;
use tracing_test::traced_test;

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s)
}

fn runner(specs: Vec<VehicleSpec>, network: NetworkConfig, seed: u64) -> SimulationRunner {
    SimulationRunner::new(specs, PlatoonConfig::default(), network, seed).unwrap()
}

fn convoy() -> Vec<VehicleSpec> {
    vec![
        VehicleSpec::new("A", 140.0, 20.0),
        VehicleSpec::new("B", 110.0, 20.0),
        VehicleSpec::new("C", 80.0, 20.0),
    ]
}

/// Every vehicle is in one platoon led by `leader`.
fn assert_single_platoon(sim: &SimulationRunner, leader: u32) {
    let leader_id = sim.machine(leader).host_id().clone();
    let platoon = sim
        .machine(leader)
        .platoon_id()
        .cloned()
        .expect("leader has a platoon id");
    assert_eq!(sim.machine(leader).state(), PlatoonState::Leader);

    for node in 0..sim.len() as u32 {
        if node == leader || !sim.machine(node).is_active() {
            continue;
        }
        let machine = sim.machine(node);
        assert_eq!(machine.state(), PlatoonState::Follower, "node {node}");
        assert_eq!(machine.leader_id(), Some(&leader_id), "node {node}");
        assert_eq!(machine.platoon_id(), Some(&platoon), "node {node}");
    }
}

#[traced_test]
#[test]
fn test_two_vehicles_form_platoon() {
    let mut sim = runner(
        vec![
            VehicleSpec::new("A", 100.0, 20.0),
            VehicleSpec::new("B", 70.0, 20.0),
        ],
        NetworkConfig::ideal(),
        1,
    );

    sim.run_until(secs(3.0));

    assert_single_platoon(&sim, 0);
    assert_eq!(sim.machine(0).roster().len(), 1);
    assert!(sim.machine(0).roster().contains(&VehicleId::from("B")));

    let leader = sim.status(0).unwrap();
    assert_eq!(leader.state, PlatoonState::Leader);
    assert_eq!(leader.platoon_size(), 2);

    let follower = sim.status(1).unwrap();
    assert_eq!(follower.leader_id, Some(VehicleId::from("A")));
    let gap = follower.front_gap.unwrap();
    assert!((25.0..35.0).contains(&gap), "gap {gap}");
}

#[traced_test]
#[test]
fn test_three_vehicles_form_one_platoon() {
    let mut sim = runner(convoy(), NetworkConfig::default(), 3);

    sim.run_until(secs(6.0));

    assert_single_platoon(&sim, 0);
    assert_eq!(sim.machine(0).roster().len(), 2);
    assert_eq!(sim.status(0).unwrap().platoon_size(), 3);

    // C sees the members ahead of it in road order: A, then B.
    let order: Vec<_> = sim.machine(2).roster().iter().map(|m| m.static_id.clone()).collect();
    assert_eq!(order, vec![VehicleId::from("A"), VehicleId::from("B")]);
}

#[traced_test]
#[test]
fn test_follower_takes_over_from_silent_leader() {
    let mut sim = runner(convoy(), NetworkConfig::default(), 5);
    sim.run_until(secs(6.0));
    assert_single_platoon(&sim, 0);
    let platoon = sim.machine(0).platoon_id().cloned();

    sim.isolate(0);
    sim.run_until(secs(12.0));

    let b = sim.machine(1);
    assert_eq!(b.state(), PlatoonState::Leader);
    assert_eq!(b.platoon_id().cloned(), platoon);
    assert!(!b.roster().contains(&VehicleId::from("A")));

    let c = sim.machine(2);
    assert_eq!(c.state(), PlatoonState::Follower);
    assert_eq!(c.leader_id(), Some(&VehicleId::from("B")));
    assert_eq!(c.platoon_id().cloned(), platoon);
    assert!(!c.roster().contains(&VehicleId::from("A")));

    // The cut-off leader eventually forgets its members.
    assert_eq!(sim.machine(0).state(), PlatoonState::Leader);
    assert!(sim.machine(0).roster().is_empty());
}

#[test]
fn test_lossy_channel_converges() {
    let mut sim = runner(convoy(), NetworkConfig::default().with_loss_rate(0.1), 7);

    sim.run_until(secs(30.0));

    assert_single_platoon(&sim, 0);
    assert!(sim.stats().messages_dropped > 0);
}

#[traced_test]
#[test]
fn test_rejected_joiner_keeps_retrying() {
    let mut sim = runner(
        vec![
            VehicleSpec::new("A", 100.0, 20.0),
            VehicleSpec::new("B", 70.0, 20.0).with_crosstrack(3.0),
        ],
        NetworkConfig::ideal(),
        11,
    );

    sim.run_until(secs(6.0));

    let b = sim.machine(1);
    assert!(b.failed_negotiations() >= 3, "{}", b.failed_negotiations());
    assert_ne!(b.state(), PlatoonState::Follower);
    assert!(sim.status(1).unwrap().failed_negotiations >= 3);

    assert_eq!(sim.machine(0).state(), PlatoonState::Standby);
    assert!(sim.machine(0).roster().is_empty());
}

#[test]
fn test_same_seed_same_run() {
    let run = |seed| {
        let mut sim = runner(convoy(), NetworkConfig::default().with_loss_rate(0.2), seed);
        sim.run_until(secs(10.0));
        let statuses: Vec<_> = (0..3).map(|n| sim.status(n).cloned()).collect();
        (sim.stats().clone(), statuses)
    };

    assert_eq!(run(42), run(42));
}

#[traced_test]
#[test]
fn test_departing_follower_leaves_roster() {
    let mut sim = runner(
        vec![
            VehicleSpec::new("A", 100.0, 20.0),
            VehicleSpec::new("B", 70.0, 20.0),
        ],
        NetworkConfig::ideal(),
        13,
    );
    sim.run_until(secs(3.0));
    assert_single_platoon(&sim, 0);

    sim.deactivate(1);
    sim.run_until(secs(3.5));

    assert!(!sim.machine(1).is_active());
    assert_eq!(sim.machine(1).state(), PlatoonState::Standby);
    assert_eq!(sim.machine(0).state(), PlatoonState::Leader);
    assert!(sim.machine(0).roster().is_empty());
    assert_eq!(sim.status(0).unwrap().roster_size, 0);
}

#[test]
fn test_duplicate_vehicle_rejected() {
    let result = SimulationRunner::new(
        vec![
            VehicleSpec::new("A", 100.0, 20.0),
            VehicleSpec::new("A", 70.0, 20.0),
        ],
        PlatoonConfig::default(),
        NetworkConfig::ideal(),
        0,
    );
    assert!(matches!(result, Err(SimulationError::DuplicateVehicle(id)) if id == VehicleId::from("A")));
}
