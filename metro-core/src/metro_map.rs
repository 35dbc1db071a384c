//! The metro graph: stations, tunnels, and path queries.
//!
//! Stations are keyed by name in ordered maps so every traversal (and every
//! random draw made while iterating) happens in the same order on every run.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

use crate::error::{SimError, SimResult};
use crate::station::{Station, StationEffects};
use crate::tunnel::{Tunnel, TunnelState};
use crate::types::{FactionId, TravelerType};

/// Tunnels above this danger are skipped when avoiding danger
pub const DANGER_AVOIDANCE_THRESHOLD: u32 = 50;

// ============================================================================
// Area targeting for events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AreaTarget {
    Stations(Vec<String>),
    Radius { center: String, radius: f64 },
    Line(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct MapStatistics {
    pub station_count: usize,
    pub tunnel_count: usize,
    pub line_count: usize,
    pub total_population: u64,
    pub stations_per_faction: Vec<(FactionId, usize)>,
    pub tunnels_per_state: Vec<(TunnelState, usize)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub enum MapIssue {
    IsolatedStation(String),
    DisconnectedComponent(Vec<String>),
}

// ============================================================================
// MetroMap
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetroMap {
    stations: BTreeMap<String, Station>,
    tunnels: Vec<Tunnel>,
    #[serde(skip)]
    adjacency: BTreeMap<String, BTreeSet<String>>,
    metro_lines: BTreeMap<String, Vec<String>>,
}

impl MetroMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a map from stored stations and tunnels, re-deriving the adjacency index.
    pub fn from_parts(stations: Vec<Station>, tunnels: Vec<Tunnel>) -> SimResult<Self> {
        let mut map = Self::new();
        for station in stations {
            map.add_station(station)?;
        }
        for tunnel in tunnels {
            map.add_tunnel(tunnel)?;
        }
        Ok(map)
    }

    /// Restore the adjacency index after deserialization
    pub fn rebuild_index(&mut self) {
        self.adjacency = self
            .stations
            .keys()
            .map(|name| (name.clone(), BTreeSet::new()))
            .collect();
        for tunnel in &self.tunnels {
            if let Some(set) = self.adjacency.get_mut(&tunnel.station_a) {
                set.insert(tunnel.station_b.clone());
            }
            if let Some(set) = self.adjacency.get_mut(&tunnel.station_b) {
                set.insert(tunnel.station_a.clone());
            }
        }
    }

    // === Construction ===

    pub fn add_station(&mut self, station: Station) -> SimResult<()> {
        if self.stations.contains_key(&station.name) {
            return Err(SimError::invalid(format!(
                "station {} already exists",
                station.name
            )));
        }
        self.metro_lines
            .entry(station.metro_line.clone())
            .or_default()
            .push(station.name.clone());
        self.adjacency.insert(station.name.clone(), BTreeSet::new());
        self.stations.insert(station.name.clone(), station);
        Ok(())
    }

    pub fn add_tunnel(&mut self, tunnel: Tunnel) -> SimResult<()> {
        for end in [&tunnel.station_a, &tunnel.station_b] {
            if !self.stations.contains_key(end) {
                return Err(SimError::not_found(format!("station {}", end)));
            }
        }
        if tunnel.station_a == tunnel.station_b {
            return Err(SimError::invalid(format!(
                "tunnel from {} to itself",
                tunnel.station_a
            )));
        }
        if self.tunnel_between(&tunnel.station_a, &tunnel.station_b).is_some() {
            return Err(SimError::invalid(format!(
                "tunnel {}-{} already exists",
                tunnel.station_a, tunnel.station_b
            )));
        }
        self.adjacency
            .entry(tunnel.station_a.clone())
            .or_default()
            .insert(tunnel.station_b.clone());
        self.adjacency
            .entry(tunnel.station_b.clone())
            .or_default()
            .insert(tunnel.station_a.clone());
        self.tunnels.push(tunnel);
        Ok(())
    }

    // === Lookup ===

    pub fn station(&self, name: &str) -> Option<&Station> {
        self.stations.get(name)
    }

    pub fn station_mut(&mut self, name: &str) -> Option<&mut Station> {
        self.stations.get_mut(name)
    }

    pub fn require_station(&self, name: &str) -> SimResult<&Station> {
        self.stations
            .get(name)
            .ok_or_else(|| SimError::not_found(format!("station {}", name)))
    }

    pub fn require_station_mut(&mut self, name: &str) -> SimResult<&mut Station> {
        self.stations
            .get_mut(name)
            .ok_or_else(|| SimError::not_found(format!("station {}", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stations.contains_key(name)
    }

    pub fn stations(&self) -> impl Iterator<Item = &Station> {
        self.stations.values()
    }

    pub fn stations_mut(&mut self) -> impl Iterator<Item = &mut Station> {
        self.stations.values_mut()
    }

    pub fn station_names(&self) -> impl Iterator<Item = &String> {
        self.stations.keys()
    }

    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    pub fn tunnels(&self) -> &[Tunnel] {
        &self.tunnels
    }

    pub fn tunnels_mut(&mut self) -> &mut [Tunnel] {
        &mut self.tunnels
    }

    pub fn tunnel_between(&self, a: &str, b: &str) -> Option<&Tunnel> {
        self.tunnels.iter().find(|t| t.connects(a, b))
    }

    pub fn tunnel_between_mut(&mut self, a: &str, b: &str) -> Option<&mut Tunnel> {
        self.tunnels.iter_mut().find(|t| t.connects(a, b))
    }

    pub fn neighbors(&self, name: &str) -> impl Iterator<Item = &String> {
        self.adjacency.get(name).into_iter().flatten()
    }

    pub fn are_adjacent(&self, a: &str, b: &str) -> bool {
        self.adjacency.get(a).is_some_and(|set| set.contains(b))
    }

    pub fn stations_by_faction(&self, faction: FactionId) -> Vec<String> {
        self.stations
            .values()
            .filter(|s| s.controlling_faction == faction)
            .map(|s| s.name.clone())
            .collect()
    }

    pub fn stations_on_line(&self, line: &str) -> &[String] {
        self.metro_lines
            .get(line)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn lines(&self) -> impl Iterator<Item = &String> {
        self.metro_lines.keys()
    }

    // === Pathfinding ===

    fn usable_edge(&self, tunnel: &Tunnel, traveler: TravelerType, avoid_dangerous: bool) -> Option<u32> {
        let cost = tunnel.travel_cost(traveler)?;
        if avoid_dangerous && tunnel.danger_level() > DANGER_AVOIDANCE_THRESHOLD {
            return None;
        }
        Some(cost)
    }

    /// Dijkstra shortest path from origin to destination inclusive.
    ///
    /// Equal-cost frontier entries are popped in station-name order, so the
    /// returned path is deterministic.
    pub fn find_path(
        &self,
        origin: &str,
        destination: &str,
        traveler: TravelerType,
        avoid_dangerous: bool,
    ) -> Option<Vec<String>> {
        if !self.contains(origin) || !self.contains(destination) {
            return None;
        }
        if origin == destination {
            return Some(vec![origin.to_string()]);
        }

        let mut dist: BTreeMap<&str, u32> = BTreeMap::new();
        let mut previous: BTreeMap<&str, &str> = BTreeMap::new();
        let mut heap = BinaryHeap::new();
        dist.insert(origin, 0);
        heap.push(Reverse((0u32, origin)));

        while let Some(Reverse((cost, current))) = heap.pop() {
            if current == destination {
                break;
            }
            if dist.get(current).is_some_and(|&best| cost > best) {
                continue;
            }
            for next in self.neighbors(current) {
                let Some(tunnel) = self.tunnel_between(current, next) else {
                    continue;
                };
                let Some(edge) = self.usable_edge(tunnel, traveler, avoid_dangerous) else {
                    continue;
                };
                let candidate = cost + edge;
                if dist.get(next.as_str()).is_none_or(|&best| candidate < best) {
                    dist.insert(next.as_str(), candidate);
                    previous.insert(next.as_str(), current);
                    heap.push(Reverse((candidate, next.as_str())));
                }
            }
        }

        if !dist.contains_key(destination) {
            return None;
        }
        let mut path = vec![destination.to_string()];
        let mut cursor = destination;
        while let Some(&prev) = previous.get(cursor) {
            path.push(prev.to_string());
            cursor = prev;
        }
        path.reverse();
        Some(path)
    }

    /// Military route avoiding dangerous tunnels
    pub fn find_path_default(&self, origin: &str, destination: &str) -> Option<Vec<String>> {
        self.find_path(origin, destination, TravelerType::Military, true)
    }

    /// Total traversal cost of a path, `None` if any hop is impassable
    pub fn path_cost(&self, path: &[String], traveler: TravelerType) -> Option<u32> {
        path.windows(2).try_fold(0u32, |acc, pair| {
            let tunnel = self.tunnel_between(&pair[0], &pair[1])?;
            Some(acc + tunnel.travel_cost(traveler)?)
        })
    }

    /// Minimum cost to every station reachable within `max_cost`, origin at 0.
    pub fn find_all_paths_within_range(
        &self,
        origin: &str,
        max_cost: u32,
        traveler: TravelerType,
    ) -> BTreeMap<String, u32> {
        let mut dist: BTreeMap<String, u32> = BTreeMap::new();
        if !self.contains(origin) {
            return dist;
        }
        let mut heap = BinaryHeap::new();
        dist.insert(origin.to_string(), 0);
        heap.push(Reverse((0u32, origin.to_string())));

        while let Some(Reverse((cost, current))) = heap.pop() {
            if dist.get(&current).is_some_and(|&best| cost > best) {
                continue;
            }
            for next in self.neighbors(&current) {
                let Some(edge) = self
                    .tunnel_between(&current, next)
                    .and_then(|t| t.travel_cost(traveler))
                else {
                    continue;
                };
                let candidate = cost + edge;
                if candidate > max_cost {
                    continue;
                }
                if dist.get(next).is_none_or(|&best| candidate < best) {
                    dist.insert(next.clone(), candidate);
                    heap.push(Reverse((candidate, next.clone())));
                }
            }
        }
        dist
    }

    // === World changes ===

    /// Apply station effects to an area. Returns the names of affected stations.
    pub fn apply_area_event(
        &mut self,
        target: &AreaTarget,
        label: &str,
        effects: &StationEffects,
        duration: u32,
    ) -> Vec<String> {
        let names: Vec<String> = match target {
            AreaTarget::Stations(list) => list
                .iter()
                .filter(|n| self.contains(n))
                .cloned()
                .collect(),
            AreaTarget::Radius { center, radius } => match self.station(center) {
                Some(c) => {
                    let (cx, cy) = c.position;
                    self.stations
                        .values()
                        .filter(|s| {
                            let (x, y) = s.position;
                            ((x - cx).powi(2) + (y - cy).powi(2)).sqrt() <= *radius
                        })
                        .map(|s| s.name.clone())
                        .collect()
                }
                None => Vec::new(),
            },
            AreaTarget::Line(line) => self.stations_on_line(line).to_vec(),
        };
        for name in &names {
            if let Some(station) = self.stations.get_mut(name) {
                station.apply_event(label, effects.clone(), duration);
            }
        }
        names
    }

    /// Set tunnel states by station pair. Unknown pairs are reported back.
    pub fn update_tunnel_states(
        &mut self,
        changes: &[(String, String, TunnelState)],
    ) -> Vec<(String, String)> {
        let mut missing = Vec::new();
        for (a, b, state) in changes {
            match self.tunnel_between_mut(a, b) {
                Some(tunnel) => tunnel.update_state(*state),
                None => missing.push((a.clone(), b.clone())),
            }
        }
        missing
    }

    /// Stations first, then tunnels
    pub fn process_turn<R: Rng>(&mut self, turn: u32, rng: &mut R) {
        for station in self.stations.values_mut() {
            station.process_turn();
        }
        self.process_tunnels(turn, rng);
    }

    /// Returns how many tunnels changed state
    pub fn process_tunnels<R: Rng>(&mut self, turn: u32, rng: &mut R) -> usize {
        let mut changed = 0;
        for tunnel in &mut self.tunnels {
            if tunnel.process_turn(turn, rng) {
                changed += 1;
            }
        }
        changed
    }

    // === Reporting ===

    pub fn statistics(&self) -> MapStatistics {
        let stations_per_faction = FactionId::all()
            .map(|f| {
                (
                    f,
                    self.stations
                        .values()
                        .filter(|s| s.controlling_faction == f)
                        .count(),
                )
            })
            .filter(|(_, n)| *n > 0)
            .collect();
        let tunnels_per_state = TunnelState::all()
            .map(|state| (state, self.tunnels.iter().filter(|t| t.state == state).count()))
            .filter(|(_, n)| *n > 0)
            .collect();
        MapStatistics {
            station_count: self.stations.len(),
            tunnel_count: self.tunnels.len(),
            line_count: self.metro_lines.len(),
            total_population: self.stations.values().map(|s| s.population as u64).sum(),
            stations_per_faction,
            tunnels_per_state,
        }
    }

    /// Isolated stations and every component beyond the first
    pub fn validate_integrity(&self) -> Vec<MapIssue> {
        let mut issues: Vec<MapIssue> = self
            .stations
            .keys()
            .filter(|name| self.neighbors(name).next().is_none())
            .map(|name| MapIssue::IsolatedStation(name.clone()))
            .collect();

        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut components: Vec<Vec<String>> = Vec::new();
        for start in self.stations.keys() {
            if seen.contains(start.as_str()) {
                continue;
            }
            let mut component = Vec::new();
            let mut stack = vec![start.as_str()];
            seen.insert(start);
            while let Some(current) = stack.pop() {
                component.push(current.to_string());
                for next in self.neighbors(current) {
                    if seen.insert(next.as_str()) {
                        stack.push(next);
                    }
                }
            }
            component.sort();
            components.push(component);
        }
        issues.extend(
            components
                .into_iter()
                .skip(1)
                .filter(|c| c.len() > 1)
                .map(MapIssue::DisconnectedComponent),
        );
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(name: &str, line: &str) -> Station {
        Station::new(name, (0.0, 0.0), line)
    }

    /// A - B - C in a line plus a slow direct A - C
    fn triangle() -> MetroMap {
        let mut map = MetroMap::new();
        for name in ["A", "B", "C"] {
            map.add_station(station(name, "Red")).unwrap();
        }
        map.add_tunnel(Tunnel::new("A", "B")).unwrap();
        map.add_tunnel(Tunnel::new("B", "C")).unwrap();
        map.add_tunnel(
            Tunnel::new("A", "C")
                .with_state(TunnelState::Hazardous)
                .with_hazard(100),
        )
        .unwrap();
        map
    }

    #[test]
    fn test_add_station_rejects_duplicate() {
        let mut map = MetroMap::new();
        map.add_station(station("A", "Red")).unwrap();
        assert!(map.add_station(station("A", "Blue")).is_err());
        assert_eq!(map.stations_on_line("Red"), &["A".to_string()]);
    }

    #[test]
    fn test_add_tunnel_validation() {
        let mut map = triangle();
        assert!(matches!(
            map.add_tunnel(Tunnel::new("A", "Z")),
            Err(SimError::NotFound(_))
        ));
        assert!(map.add_tunnel(Tunnel::new("C", "B")).is_err(), "reverse duplicate");
        assert_eq!(map.tunnels().len(), 3);
    }

    #[test]
    fn test_find_path_prefers_cheaper_route() {
        let map = triangle();
        // direct A-C costs 2 × 1.5 × 2.0 = 6, via B costs 2 + 2
        let path = map.find_path("A", "C", TravelerType::Military, false).unwrap();
        assert_eq!(path, vec!["A", "B", "C"]);
        assert_eq!(map.path_cost(&path, TravelerType::Military), Some(4));
        assert_eq!(
            map.path_cost(&["A".to_string(), "C".to_string()], TravelerType::Military),
            Some(6)
        );

        let scout = map.find_path("A", "C", TravelerType::Scout, false).unwrap();
        assert_eq!(scout, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_equal_cost_ties_are_stable() {
        let mut map = MetroMap::new();
        for name in ["A", "X", "Y", "Z"] {
            map.add_station(station(name, "Red")).unwrap();
        }
        map.add_tunnel(Tunnel::new("A", "Y")).unwrap();
        map.add_tunnel(Tunnel::new("A", "X")).unwrap();
        map.add_tunnel(Tunnel::new("Y", "Z")).unwrap();
        map.add_tunnel(Tunnel::new("X", "Z")).unwrap();
        for _ in 0..5 {
            assert_eq!(
                map.find_path("A", "Z", TravelerType::Military, true),
                Some(vec!["A".to_string(), "X".to_string(), "Z".to_string()])
            );
        }
    }

    #[test]
    fn test_find_path_same_station_and_missing() {
        let map = triangle();
        assert_eq!(
            map.find_path("B", "B", TravelerType::Military, true),
            Some(vec!["B".to_string()])
        );
        assert_eq!(map.find_path("A", "Q", TravelerType::Military, true), None);
    }

    #[test]
    fn test_anomalous_only_link() {
        let mut map = MetroMap::new();
        map.add_station(station("A", "Red")).unwrap();
        map.add_station(station("B", "Red")).unwrap();
        map.add_tunnel(Tunnel::new("A", "B").with_state(TunnelState::Anomalous))
            .unwrap();

        assert_eq!(map.find_path("A", "B", TravelerType::Civilian, false), None);
        assert_eq!(
            map.find_path("A", "B", TravelerType::Scout, false),
            Some(vec!["A".to_string(), "B".to_string()])
        );
        // danger 80 is excluded when avoiding danger
        assert_eq!(map.find_path("A", "B", TravelerType::Scout, true), None);
    }

    #[test]
    fn test_range_query() {
        let map = triangle();
        let zero = map.find_all_paths_within_range("A", 0, TravelerType::Military);
        assert_eq!(zero.len(), 1);
        assert_eq!(zero.get("A"), Some(&0));

        let two = map.find_all_paths_within_range("A", 2, TravelerType::Military);
        assert_eq!(two.get("B"), Some(&2));
        assert!(!two.contains_key("C"));
    }

    #[test]
    fn test_area_event_by_line_and_radius() {
        let mut map = MetroMap::new();
        map.add_station(Station::new("A", (0.0, 0.0), "Red")).unwrap();
        map.add_station(Station::new("B", (3.0, 4.0), "Red")).unwrap();
        map.add_station(Station::new("C", (30.0, 40.0), "Blue")).unwrap();

        let hit = map.apply_area_event(
            &AreaTarget::Radius {
                center: "A".into(),
                radius: 5.0,
            },
            "quake",
            &StationEffects::morale(-10),
            1,
        );
        assert_eq!(hit, vec!["A", "B"]);
        assert_eq!(map.station("C").map(|s| s.morale), Some(50));

        let line = map.apply_area_event(
            &AreaTarget::Line("Blue".into()),
            "flood",
            &StationEffects::morale(-5),
            1,
        );
        assert_eq!(line, vec!["C"]);
    }

    #[test]
    fn test_integrity_reports_isolated_and_components() {
        let mut map = triangle();
        map.add_station(station("D", "Blue")).unwrap();
        map.add_station(station("E", "Blue")).unwrap();
        map.add_station(station("F", "Blue")).unwrap();
        map.add_tunnel(Tunnel::new("E", "F")).unwrap();

        let issues = map.validate_integrity();
        assert!(issues.contains(&MapIssue::IsolatedStation("D".into())));
        assert!(issues.contains(&MapIssue::DisconnectedComponent(vec![
            "E".into(),
            "F".into()
        ])));
    }

    #[test]
    fn test_serde_round_trip_rebuilds_adjacency() {
        let map = triangle();
        let json = serde_json::to_string(&map).unwrap();
        let mut restored: MetroMap = serde_json::from_str(&json).unwrap();
        restored.rebuild_index();
        assert_eq!(restored.station_count(), 3);
        assert!(restored.are_adjacent("A", "B"));
        assert_eq!(restored.find_path_default("A", "C").map(|p| p.len()), Some(3));
    }
}
