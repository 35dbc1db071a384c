//! Properties of the map graph and the turn pipeline that hold for any
//! station pair or seed, checked over the default map.

use std::collections::BTreeMap;

use metro_core::station::Station;
use metro_core::trade::{CaravanEvent, TradeSystem};
use metro_core::{
    GameState, MetroMap, ResourceKind, ResourcePool, SimConfig, TravelerType, Tunnel, TunnelState,
    create_metro_map,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

const TRAVELERS: [TravelerType; 6] = [
    TravelerType::Scout,
    TravelerType::Military,
    TravelerType::Caravan,
    TravelerType::Civilian,
    TravelerType::Stalker,
    TravelerType::Ranger,
];

/// All-pairs minimum costs by Floyd-Warshall, independent of the Dijkstra
/// under test
fn all_pairs(map: &MetroMap, traveler: TravelerType) -> BTreeMap<(String, String), u32> {
    let names: Vec<String> = map.station_names().cloned().collect();
    let mut dist: BTreeMap<(String, String), u32> = BTreeMap::new();
    for name in &names {
        dist.insert((name.clone(), name.clone()), 0);
    }
    for tunnel in map.tunnels() {
        if let Some(cost) = tunnel.travel_cost(traveler) {
            for (a, b) in [
                (&tunnel.station_a, &tunnel.station_b),
                (&tunnel.station_b, &tunnel.station_a),
            ] {
                let entry = dist.entry((a.clone(), b.clone())).or_insert(u32::MAX);
                *entry = (*entry).min(cost);
            }
        }
    }
    for k in &names {
        for i in &names {
            for j in &names {
                let (Some(&ik), Some(&kj)) = (
                    dist.get(&(i.clone(), k.clone())),
                    dist.get(&(k.clone(), j.clone())),
                ) else {
                    continue;
                };
                let through = ik + kj;
                let entry = dist.entry((i.clone(), j.clone())).or_insert(u32::MAX);
                if through < *entry {
                    *entry = through;
                }
            }
        }
    }
    dist
}

fn line_map(states: &[TunnelState]) -> MetroMap {
    let names: Vec<String> = (0..=states.len()).map(|i| format!("S{}", i)).collect();
    let stations = names
        .iter()
        .enumerate()
        .map(|(i, name)| Station::new(name.clone(), (i as f64, 0.0), "Test Line"))
        .collect();
    let tunnels = states
        .iter()
        .enumerate()
        .map(|(i, state)| Tunnel::new(names[i].clone(), names[i + 1].clone()).with_state(*state))
        .collect();
    MetroMap::from_parts(stations, tunnels).unwrap()
}

// === Pathfinding ===

#[test]
fn find_path_is_optimal_on_default_map() {
    let mut map = create_metro_map().unwrap();
    // make the graph less uniform
    let mut rng = StdRng::seed_from_u64(42);
    let states = [
        TunnelState::Hazardous,
        TunnelState::Infested,
        TunnelState::Anomalous,
        TunnelState::Collapsed,
    ];
    for (i, tunnel) in map.tunnels_mut().iter_mut().enumerate() {
        if i % 3 == 0 {
            tunnel.update_state(states[i % states.len()]);
        }
        tunnel.set_hazard_level(rand::Rng::random_range(&mut rng, 0..60));
    }

    let names: Vec<String> = map.station_names().cloned().collect();
    for traveler in TRAVELERS {
        let best = all_pairs(&map, traveler);
        for a in &names {
            for b in &names {
                let expected = best.get(&(a.clone(), b.clone())).copied();
                match map.find_path(a, b, traveler, false) {
                    Some(path) => {
                        assert_eq!(path.first(), Some(a));
                        assert_eq!(path.last(), Some(b));
                        assert_eq!(
                            map.path_cost(&path, traveler),
                            expected,
                            "{:?} {} -> {}",
                            traveler,
                            a,
                            b
                        );
                    }
                    None => assert_eq!(expected, None, "{:?} {} -> {} missed", traveler, a, b),
                }
            }
        }
    }
}

#[test]
fn avoiding_danger_never_uses_dangerous_tunnels() {
    let mut map = create_metro_map().unwrap();
    for tunnel in map.tunnels_mut().iter_mut().step_by(2) {
        tunnel.update_state(TunnelState::Infested);
    }
    let names: Vec<String> = map.station_names().cloned().collect();
    for a in &names {
        for b in &names {
            if let Some(path) = map.find_path(a, b, TravelerType::Military, true) {
                for hop in path.windows(2) {
                    let tunnel = map.tunnel_between(&hop[0], &hop[1]).unwrap();
                    assert!(tunnel.danger_level() <= 50);
                }
            }
        }
    }
}

#[test]
fn anomalous_tunnels_admit_only_privileged_travelers() {
    let map = line_map(&[TunnelState::Anomalous]);
    assert_eq!(map.find_path("S0", "S1", TravelerType::Civilian, false), None);
    assert_eq!(
        map.find_path("S0", "S1", TravelerType::Scout, false),
        Some(vec!["S0".to_string(), "S1".to_string()])
    );
}

#[test]
fn collapsed_tunnels_block_everyone() {
    let map = line_map(&[TunnelState::Clear, TunnelState::Collapsed]);
    for traveler in TRAVELERS {
        assert_eq!(map.find_path("S0", "S2", traveler, false), None);
        assert!(map.find_path("S0", "S1", traveler, false).is_some());
        assert_eq!(map.tunnels()[1].travel_cost(traveler), None);
    }
}

#[test]
fn range_query_contains_exactly_the_affordable_stations() {
    let map = create_metro_map().unwrap();
    for origin in map.station_names() {
        let zero = map.find_all_paths_within_range(origin, 0, TravelerType::Military);
        assert_eq!(zero.len(), 1);
        assert_eq!(zero.get(origin), Some(&0));
    }

    let best = all_pairs(&map, TravelerType::Military);
    for max_cost in [1, 3, 6, 12] {
        let reach = map.find_all_paths_within_range("Polis", max_cost, TravelerType::Military);
        for name in map.station_names() {
            let cost = best.get(&("Polis".to_string(), name.clone())).copied();
            match cost {
                Some(c) if c <= max_cost => assert_eq!(reach.get(name), Some(&c)),
                _ => assert!(!reach.contains_key(name)),
            }
        }
    }
}

// === Tunnels ===

#[test]
fn idle_clear_tunnel_is_unchanged_by_processing() {
    let mut tunnel = Tunnel::new("A", "B");
    let before = tunnel.clone();
    let mut rng = StdRng::seed_from_u64(42);
    for turn in 1..50 {
        assert!(!tunnel.process_turn(turn, &mut rng));
    }
    assert_eq!(tunnel, before);
}

// === Trade ===

#[test]
fn caravan_arrival_scales_with_hops() {
    let map = line_map(&[TunnelState::Clear; 3]);
    let mut trade = TradeSystem::new(2, 20, 10);
    let mut pool = ResourcePool::new().with(ResourceKind::MgrRounds, 50);
    let event = trade.execute_trade(&map, "S0", "S3", &mut pool, 4).unwrap();
    assert!(matches!(
        event,
        CaravanEvent::Dispatched { estimated_arrival: 10, .. }
    ));
    assert_eq!(pool.mgr_rounds, 30);
}

// === Whole game ===

#[test]
fn same_seed_replays_identically() {
    for seed in [1, 2033, 777_777] {
        let mut a = GameState::new(SimConfig::default().with_seed(seed)).unwrap();
        let mut b = GameState::new(SimConfig::default().with_seed(seed)).unwrap();
        for _ in 0..15 {
            assert_eq!(a.advance_turn(), b.advance_turn());
        }
        assert_eq!(a.save().unwrap(), b.save().unwrap());
    }
}

#[test]
fn different_seeds_diverge() {
    let run = |seed| {
        let mut state = GameState::new(SimConfig::default().with_seed(seed)).unwrap();
        (0..20).map(|_| state.advance_turn()).collect::<Vec<_>>()
    };
    assert_ne!(run(1), run(2));
}
