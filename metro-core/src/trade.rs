//! Caravans, trade routes, trade offers and station market prices.
//!
//! A caravan walks a precomputed path one hop per `travel_time` turns,
//! rolling a survival check for each tunnel it enters.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

use crate::error::{SimError, SimResult};
use crate::faction::TradeTouch;
use crate::metro_map::MetroMap;
use crate::resources::ResourcePool;
use crate::tunnel::TunnelState;
use crate::types::{FactionId, ResourceKind, TravelerType};

pub const BASE_SURVIVAL_CHANCE: f64 = 0.9;
pub const INCIDENT_CHANCE: f64 = 0.1;
pub const BASE_OFFER_COST: i64 = 5;
pub const OFFER_LIFETIME_TURNS: u32 = 3;
/// Caravan reach when listing trade opportunities
pub const OPPORTUNITY_RANGE: u32 = 10;
pub const NEW_ROUTE_SECURITY: u32 = 50;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum CaravanStatus {
    Preparing,
    Traveling,
    Trading,
    Returning,
    Completed,
    Lost,
    Attacked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    Active,
    Disrupted,
    Blocked,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct Caravan {
    pub id: String,
    pub origin: String,
    pub destination: String,
    pub path: Vec<String>,
    pub path_index: usize,
    pub cargo: ResourcePool,
    pub status: CaravanStatus,
    pub created_turn: u32,
    pub estimated_arrival: u32,
    pub escort_strength: u32,
}

impl Caravan {
    pub fn current_position(&self) -> &str {
        self.path
            .get(self.path_index)
            .map_or(self.origin.as_str(), |s| s.as_str())
    }

    /// The tunnel the caravan is about to enter
    pub fn next_hop(&self) -> Option<(&str, &str)> {
        let from = self.path.get(self.path_index)?;
        let to = self.path.get(self.path_index + 1)?;
        Some((from, to))
    }

    pub fn hops(&self) -> usize {
        self.path.len().saturating_sub(1)
    }

    /// Move one station along; true once the destination is reached
    pub fn advance(&mut self) -> bool {
        if self.path_index + 1 < self.path.len() {
            self.path_index += 1;
        }
        self.path_index + 1 >= self.path.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct TradeRoute {
    pub id: String,
    pub station_a: String,
    pub station_b: String,
    pub path: Vec<String>,
    pub status: RouteStatus,
    pub established_turn: u32,
    pub last_used_turn: u32,
    pub total_trades: u32,
    pub total_value: i64,
    pub security_level: u32,
    pub last_incident_turn: u32,
}

pub fn route_id(a: &str, b: &str) -> String {
    if a <= b {
        format!("{}_{}", a, b)
    } else {
        format!("{}_{}", b, a)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct TradeOffer {
    pub offering_station: String,
    pub requesting_station: String,
    pub offered: ResourcePool,
    pub requested: ResourcePool,
    pub mgr_cost: i64,
    pub expires_turn: u32,
}

impl TradeOffer {
    pub fn is_expired(&self, turn: u32) -> bool {
        turn > self.expires_turn
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
pub enum CaravanEvent {
    Dispatched { caravan_id: String, estimated_arrival: u32 },
    Progress { caravan_id: String, position: String },
    Incident { caravan_id: String, position: String },
    Lost { caravan_id: String, from: String, to: String, state: TunnelState },
    Completed { caravan_id: String, origin: String, destination: String, delivered: ResourcePool },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct TradeOpportunity {
    pub target: String,
    pub faction: FactionId,
    pub hops: usize,
    pub give: ResourcePool,
    pub receive: ResourcePool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct TradeStatistics {
    pub active_caravans: usize,
    pub established_routes: usize,
    pub active_routes: usize,
    pub total_trades: u32,
    pub pending_offers: usize,
}

// ============================================================================
// TradeSystem
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSystem {
    pub caravans: BTreeMap<String, Caravan>,
    pub routes: BTreeMap<String, TradeRoute>,
    pub offers: Vec<TradeOffer>,
    /// Per-station unit prices, fluctuating each turn
    pub market_prices: BTreeMap<String, BTreeMap<ResourceKind, f64>>,
    pub caravan_counter: u64,
    pub travel_time: u32,
    pub trade_cost_mgr: i64,
    pub delivery_food: i64,
}

impl Default for TradeSystem {
    fn default() -> Self {
        Self::new(2, 20, 10)
    }
}

impl TradeSystem {
    pub fn new(travel_time: u32, trade_cost_mgr: i64, delivery_food: i64) -> Self {
        Self {
            caravans: BTreeMap::new(),
            routes: BTreeMap::new(),
            offers: Vec::new(),
            market_prices: BTreeMap::new(),
            caravan_counter: 0,
            travel_time,
            trade_cost_mgr,
            delivery_food,
        }
    }

    /// Pay for and dispatch a caravan along the cheapest caravan path
    pub fn execute_trade(
        &mut self,
        map: &MetroMap,
        origin: &str,
        destination: &str,
        resources: &mut ResourcePool,
        turn: u32,
    ) -> SimResult<CaravanEvent> {
        map.require_station(origin)?;
        map.require_station(destination)?;
        if origin == destination {
            return Err(SimError::invalid("caravan origin and destination are the same station"));
        }
        if let Some(short) = resources.first_shortfall(&[(ResourceKind::MgrRounds, self.trade_cost_mgr)]) {
            return Err(SimError::Insufficient(short));
        }
        let path = map
            .find_path(origin, destination, TravelerType::Caravan, false)
            .ok_or_else(|| SimError::illegal(format!("no trade route available to {}", destination)))?;
        resources.subtract(ResourceKind::MgrRounds, self.trade_cost_mgr)?;

        let id = format!("caravan_{}", self.caravan_counter);
        self.caravan_counter += 1;
        let hops = path.len() as u32 - 1;
        let caravan = Caravan {
            id: id.clone(),
            origin: origin.to_string(),
            destination: destination.to_string(),
            path: path.clone(),
            path_index: 0,
            cargo: ResourcePool::new().with(ResourceKind::Food, self.delivery_food),
            status: CaravanStatus::Traveling,
            created_turn: turn,
            estimated_arrival: turn + hops * self.travel_time,
            escort_strength: 0,
        };
        let estimated_arrival = caravan.estimated_arrival;
        let value = caravan.cargo.total_value();
        self.caravans.insert(id.clone(), caravan);
        self.touch_route(origin, destination, path, turn, value);

        #[cfg(feature = "instrument")]
        tracing::info!(
            target: "caravan",
            turn = turn,
            caravan_id = id.as_str(),
            origin = origin,
            destination = destination,
            hops = hops,
            status = "dispatched",
        );
        Ok(CaravanEvent::Dispatched {
            caravan_id: id,
            estimated_arrival,
        })
    }

    fn touch_route(&mut self, a: &str, b: &str, path: Vec<String>, turn: u32, value: i64) {
        let id = route_id(a, b);
        let route = self.routes.entry(id.clone()).or_insert_with(|| TradeRoute {
            id,
            station_a: a.to_string(),
            station_b: b.to_string(),
            path,
            status: RouteStatus::Active,
            established_turn: turn,
            last_used_turn: turn,
            total_trades: 0,
            total_value: 0,
            security_level: NEW_ROUTE_SECURITY,
            last_incident_turn: 0,
        });
        route.last_used_turn = turn;
        route.total_trades += 1;
        route.total_value += value;
        route.status = RouteStatus::Active;
    }

    /// Survival probability for entering a tunnel in the given state
    pub fn survival_chance(state: TunnelState, escort_strength: u32) -> f64 {
        let base = match state {
            TunnelState::Clear => BASE_SURVIVAL_CHANCE,
            TunnelState::Hazardous => BASE_SURVIVAL_CHANCE - 0.1,
            TunnelState::Infested => BASE_SURVIVAL_CHANCE - 0.3,
            TunnelState::Anomalous => BASE_SURVIVAL_CHANCE - 0.5,
            TunnelState::Collapsed => return 0.0,
        };
        base + escort_strength as f64 * 0.1
    }

    /// Move every due caravan one hop; deliver or drop finished ones
    pub fn process_caravans<R: Rng>(
        &mut self,
        map: &MetroMap,
        turn: u32,
        resources: &mut ResourcePool,
        rng: &mut R,
    ) -> Vec<CaravanEvent> {
        let mut events = Vec::new();
        let mut finished = Vec::new();

        for (id, caravan) in self.caravans.iter_mut() {
            if caravan.status != CaravanStatus::Traveling {
                continue;
            }
            let due = caravan.created_turn + (caravan.path_index as u32 + 1) * self.travel_time;
            if turn < due {
                continue;
            }

            let hop = caravan
                .next_hop()
                .map(|(from, to)| (from.to_string(), to.to_string()));
            if let Some((from, to)) = hop {
                if let Some(tunnel) = map.tunnel_between(&from, &to) {
                    let chance = Self::survival_chance(tunnel.state, caravan.escort_strength);
                    let roll: f64 = rng.random();
                    if roll > chance {
                        caravan.status = CaravanStatus::Lost;
                        #[cfg(feature = "instrument")]
                        tracing::warn!(
                            target: "caravan",
                            turn = turn,
                            caravan_id = id.as_str(),
                            from = from.as_str(),
                            to = to.as_str(),
                            status = "lost",
                        );
                        events.push(CaravanEvent::Lost {
                            caravan_id: id.clone(),
                            from,
                            to,
                            state: tunnel.state,
                        });
                        finished.push(id.clone());
                        continue;
                    }
                    let incident: f64 = rng.random();
                    if incident < INCIDENT_CHANCE {
                        events.push(CaravanEvent::Incident {
                            caravan_id: id.clone(),
                            position: caravan.current_position().to_string(),
                        });
                    }
                }
            }

            if caravan.advance() {
                let delivered = caravan.cargo.clone();
                for (kind, amount) in delivered.amounts() {
                    // cargo amounts are never negative
                    let _ = resources.add(kind, amount);
                }
                caravan.status = CaravanStatus::Completed;
                #[cfg(feature = "instrument")]
                tracing::info!(
                    target: "caravan",
                    turn = turn,
                    caravan_id = id.as_str(),
                    origin = caravan.origin.as_str(),
                    destination = caravan.destination.as_str(),
                    hops = caravan.hops() as u32,
                    status = "completed",
                );
                events.push(CaravanEvent::Completed {
                    caravan_id: id.clone(),
                    origin: caravan.origin.clone(),
                    destination: caravan.destination.clone(),
                    delivered,
                });
                finished.push(id.clone());
            } else {
                events.push(CaravanEvent::Progress {
                    caravan_id: id.clone(),
                    position: caravan.current_position().to_string(),
                });
            }
        }

        for id in finished {
            self.caravans.remove(&id);
        }
        events
    }

    /// Offer cost: `5 + path_len × 2 + |offered − requested value| / 10`
    pub fn offer_cost(map: &MetroMap, origin: &str, target: &str, offered: &ResourcePool, requested: &ResourcePool) -> i64 {
        let distance = map
            .find_path(origin, target, TravelerType::Caravan, false)
            .map_or(10, |p| p.len() as i64 * 2);
        BASE_OFFER_COST + distance + (offered.total_value() - requested.total_value()).abs() / 10
    }

    pub fn create_trade_offer(
        &mut self,
        map: &MetroMap,
        origin: &str,
        target: &str,
        offered: ResourcePool,
        requested: ResourcePool,
        turn: u32,
    ) -> SimResult<&TradeOffer> {
        map.require_station(origin)?;
        map.require_station(target)?;
        if map
            .find_path(origin, target, TravelerType::Caravan, false)
            .is_none()
        {
            return Err(SimError::illegal(format!("no trade route available to {}", target)));
        }
        let mgr_cost = Self::offer_cost(map, origin, target, &offered, &requested);
        self.offers.push(TradeOffer {
            offering_station: origin.to_string(),
            requesting_station: target.to_string(),
            offered,
            requested,
            mgr_cost,
            expires_turn: turn + OFFER_LIFETIME_TURNS,
        });
        self.offers
            .last()
            .ok_or_else(|| SimError::invalid("offer was not stored"))
    }

    /// Partners of a station over active routes
    pub fn supply_lines(&self, station: &str) -> Vec<String> {
        self.routes
            .values()
            .filter(|r| r.status == RouteStatus::Active)
            .filter_map(|r| {
                if r.station_a == station {
                    Some(r.station_b.clone())
                } else if r.station_b == station {
                    Some(r.station_a.clone())
                } else {
                    None
                }
            })
            .collect()
    }

    pub fn disrupt_route(&mut self, a: &str, b: &str, turn: u32) -> bool {
        match self.routes.get_mut(&route_id(a, b)) {
            Some(route) => {
                route.status = RouteStatus::Disrupted;
                route.last_incident_turn = turn;
                true
            }
            None => false,
        }
    }

    pub fn trade_opportunities(&self, map: &MetroMap, origin: &str) -> Vec<TradeOpportunity> {
        map.find_all_paths_within_range(origin, OPPORTUNITY_RANGE, TravelerType::Caravan)
            .into_keys()
            .filter(|name| name != origin)
            .filter_map(|name| {
                let station = map.station(&name)?;
                let hops = map
                    .find_path(origin, &name, TravelerType::Caravan, false)
                    .map_or(0, |p| p.len() - 1);
                Some(TradeOpportunity {
                    faction: station.controlling_faction,
                    target: name,
                    hops,
                    give: ResourcePool::new().with(ResourceKind::MgrRounds, self.trade_cost_mgr),
                    receive: ResourcePool::new().with(ResourceKind::Food, self.delivery_food),
                })
            })
            .collect()
    }

    /// Seed missing stations at base value, then jitter each price by ±10%
    pub fn update_market_prices<R: Rng>(&mut self, map: &MetroMap, rng: &mut R) {
        for name in map.station_names() {
            let prices = self.market_prices.entry(name.clone()).or_insert_with(|| {
                [
                    ResourceKind::Food,
                    ResourceKind::CleanWater,
                    ResourceKind::Scrap,
                    ResourceKind::Medicine,
                ]
                .into_iter()
                .map(|k| (k, k.unit_value() as f64))
                .collect()
            });
            for price in prices.values_mut() {
                let change = rng.random_range(-0.1..=0.1);
                *price = (*price * (1.0 + change)).max(1.0);
            }
        }
    }

    pub fn price(&self, station: &str, kind: ResourceKind) -> Option<f64> {
        self.market_prices.get(station)?.get(&kind).copied()
    }

    /// Caravans in flight as seen by toll collectors
    pub fn active_trades(&self) -> Vec<TradeTouch> {
        self.caravans
            .values()
            .map(|c| TradeTouch {
                caravan_id: c.id.clone(),
                origin: c.origin.clone(),
                destination: c.destination.clone(),
                value: c.cargo.total_value(),
            })
            .collect()
    }

    pub fn statistics(&self) -> TradeStatistics {
        TradeStatistics {
            active_caravans: self.caravans.len(),
            established_routes: self.routes.len(),
            active_routes: self
                .routes
                .values()
                .filter(|r| r.status == RouteStatus::Active)
                .count(),
            total_trades: self.routes.values().map(|r| r.total_trades).sum(),
            pending_offers: self.offers.len(),
        }
    }

    /// Caravans, then prices, then expired offers
    pub fn process_turn<R: Rng>(
        &mut self,
        map: &MetroMap,
        turn: u32,
        resources: &mut ResourcePool,
        rng: &mut R,
    ) -> Vec<CaravanEvent> {
        let events = self.process_caravans(map, turn, resources, rng);
        self.update_market_prices(map, rng);
        self.offers.retain(|o| !o.is_expired(turn));
        events
    }
}
