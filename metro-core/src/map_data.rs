// Default Moscow metro layout used for new games

use crate::error::SimResult;
use crate::metro_map::MetroMap;
use crate::station::Station;
use crate::tunnel::{Tunnel, TunnelState};
use crate::types::FactionId;

pub const KALUZHSKO_RIZHSKAYA: &str = "Kaluzhsko-Rizhskaya";
pub const SOKOLNICHESKAYA: &str = "Sokolnicheskaya";
pub const ZAMOSKVORETSKAYA: &str = "Zamoskvoretskaya";
pub const ARBATSKO_POKROVSKAYA: &str = "Arbatsko-Pokrovskaya";
pub const KOLTSEVAYA: &str = "Koltsevaya";
pub const TAGANSKO_KRASNOPRESNENSKAYA: &str = "Tagansko-Krasnopresnenskaya";

struct StationSeed {
    name: &'static str,
    position: (f64, f64),
    line: &'static str,
    faction: FactionId,
    population: u32,
    morale: u32,
    traits: &'static [&'static str],
}

const STATIONS: &[StationSeed] = &[
    StationSeed {
        name: "VDNKh",
        position: (100.0, 100.0),
        line: KALUZHSKO_RIZHSKAYA,
        faction: FactionId::Rangers,
        population: 150,
        morale: 70,
        traits: &["mushroom_cultivation", "exhibition_halls"],
    },
    StationSeed {
        name: "Polis",
        position: (300.0, 200.0),
        line: SOKOLNICHESKAYA,
        faction: FactionId::Polis,
        population: 200,
        morale: 80,
        traits: &["great_library", "brahmin_council"],
    },
    StationSeed {
        name: "Tverskaya",
        position: (400.0, 150.0),
        line: ZAMOSKVORETSKAYA,
        faction: FactionId::FourthReich,
        population: 120,
        morale: 60,
        traits: &["military_discipline", "propaganda_center"],
    },
    StationSeed {
        name: "Preobrazhenskaya Ploshchad",
        position: (500.0, 100.0),
        line: SOKOLNICHESKAYA,
        faction: FactionId::RedLine,
        population: 140,
        morale: 65,
        traits: &["communist_ideology", "workers_council"],
    },
    StationSeed {
        name: "Kurskaya",
        position: (300.0, 300.0),
        line: ARBATSKO_POKROVSKAYA,
        faction: FactionId::Hanza,
        population: 180,
        morale: 75,
        traits: &["major_hub", "trade_center"],
    },
    StationSeed {
        name: "Mayakovskaya",
        position: (200.0, 150.0),
        line: ZAMOSKVORETSKAYA,
        faction: FactionId::Independent,
        population: 100,
        morale: 50,
        traits: &["artistic_heritage", "neutral_ground"],
    },
    StationSeed {
        name: "Komsomolskaya",
        position: (400.0, 250.0),
        line: KOLTSEVAYA,
        faction: FactionId::Hanza,
        population: 160,
        morale: 70,
        traits: &["ring_line_control", "transport_hub"],
    },
    StationSeed {
        name: "Park Kultury",
        position: (200.0, 300.0),
        line: SOKOLNICHESKAYA,
        faction: FactionId::RedLine,
        population: 130,
        morale: 60,
        traits: &["cultural_center", "red_propaganda"],
    },
    StationSeed {
        name: "Kiyevskaya",
        position: (100.0, 250.0),
        line: ARBATSKO_POKROVSKAYA,
        faction: FactionId::Polis,
        population: 110,
        morale: 65,
        traits: &["diplomatic_outpost", "polis_influence"],
    },
    StationSeed {
        name: "Okhotny Ryad",
        position: (350.0, 100.0),
        line: SOKOLNICHESKAYA,
        faction: FactionId::FourthReich,
        population: 100,
        morale: 55,
        traits: &["hunting_grounds", "reich_outpost"],
    },
    StationSeed {
        name: "Sokolniki",
        position: (550.0, 200.0),
        line: SOKOLNICHESKAYA,
        faction: FactionId::RedLine,
        population: 90,
        morale: 55,
        traits: &["frontier_post", "red_military"],
    },
    StationSeed {
        name: "Lubyanka",
        position: (450.0, 300.0),
        line: SOKOLNICHESKAYA,
        faction: FactionId::InvisibleWatchers,
        population: 80,
        morale: 40,
        traits: &["secret_facility", "surveillance_center"],
    },
    StationSeed {
        name: "Teatralnaya",
        position: (250.0, 250.0),
        line: ZAMOSKVORETSKAYA,
        faction: FactionId::Polis,
        population: 120,
        morale: 70,
        traits: &["cultural_exchange", "theater_district"],
    },
    StationSeed {
        name: "Park Pobedy",
        position: (150.0, 350.0),
        line: ARBATSKO_POKROVSKAYA,
        faction: FactionId::Rangers,
        population: 110,
        morale: 65,
        traits: &["victory_memorial", "ranger_outpost"],
    },
    StationSeed {
        name: "Taganskaya",
        position: (500.0, 350.0),
        line: TAGANSKO_KRASNOPRESNENSKAYA,
        faction: FactionId::InvisibleWatchers,
        population: 70,
        morale: 35,
        traits: &["hidden_bunker", "watcher_stronghold"],
    },
];

/// (a, b, line, state, hazard)
const TUNNELS: &[(&str, &str, &str, TunnelState, u32)] = &[
    ("VDNKh", "Mayakovskaya", KALUZHSKO_RIZHSKAYA, TunnelState::Clear, 0),
    ("Mayakovskaya", "Polis", SOKOLNICHESKAYA, TunnelState::Clear, 0),
    ("Polis", "Kurskaya", ARBATSKO_POKROVSKAYA, TunnelState::Clear, 0),
    ("Polis", "Komsomolskaya", KOLTSEVAYA, TunnelState::Clear, 0),
    ("Polis", "Park Kultury", SOKOLNICHESKAYA, TunnelState::Clear, 0),
    ("Polis", "Teatralnaya", ZAMOSKVORETSKAYA, TunnelState::Clear, 0),
    ("Polis", "Kiyevskaya", ARBATSKO_POKROVSKAYA, TunnelState::Clear, 0),
    ("Tverskaya", "Okhotny Ryad", SOKOLNICHESKAYA, TunnelState::Clear, 0),
    ("Tverskaya", "Komsomolskaya", ZAMOSKVORETSKAYA, TunnelState::Clear, 0),
    ("Preobrazhenskaya Ploshchad", "Sokolniki", SOKOLNICHESKAYA, TunnelState::Clear, 0),
    ("Kurskaya", "Lubyanka", KOLTSEVAYA, TunnelState::Clear, 0),
    ("Kurskaya", "Taganskaya", TAGANSKO_KRASNOPRESNENSKAYA, TunnelState::Clear, 0),
    ("Komsomolskaya", "Lubyanka", KOLTSEVAYA, TunnelState::Clear, 0),
    ("Park Kultury", "Park Pobedy", ARBATSKO_POKROVSKAYA, TunnelState::Clear, 0),
    ("Park Pobedy", "Kiyevskaya", ARBATSKO_POKROVSKAYA, TunnelState::Clear, 0),
    ("Taganskaya", "Lubyanka", TAGANSKO_KRASNOPRESNENSKAYA, TunnelState::Clear, 0),
    ("Lubyanka", "Teatralnaya", SOKOLNICHESKAYA, TunnelState::Hazardous, 30),
    ("Taganskaya", "Park Pobedy", ARBATSKO_POKROVSKAYA, TunnelState::Infested, 50),
];

/// Build the fifteen-station starting map
pub fn create_metro_map() -> SimResult<MetroMap> {
    let mut map = MetroMap::new();
    for seed in STATIONS {
        map.add_station(
            Station::new(seed.name, seed.position, seed.line)
                .with_faction(seed.faction)
                .with_population(seed.population)
                .with_morale(seed.morale)
                .with_traits(seed.traits),
        )?;
    }
    for &(a, b, line, state, hazard) in TUNNELS {
        map.add_tunnel(
            Tunnel::new(a, b)
                .with_line(line)
                .with_state(state)
                .with_hazard(hazard),
        )?;
    }

    #[cfg(feature = "instrument")]
    tracing::debug!(
        target: "station",
        stations = map.station_count(),
        tunnels = map.tunnels().len(),
        "default map built"
    );
    Ok(map)
}
