//! Crude tanker flows
//!
//! Ports, tankers and the straight-line interpolation that places a tanker
//! between its origin and destination by voyage progress.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Marker/arc width of the largest cargo
const MAX_FLOW_WIDTH: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Componentwise `start + (end - start) * progress`.
///
/// Progress is clamped to `[0, 1]` (NaN counts as 0); the endpoints are
/// returned exactly at 0 and 1.
pub fn position(start: Coordinates, end: Coordinates, progress: f64) -> Coordinates {
    if progress.is_nan() || progress <= 0.0 {
        return start;
    }
    if progress >= 1.0 {
        return end;
    }
    Coordinates {
        lat: start.lat + (end.lat - start.lat) * progress,
        lon: start.lon + (end.lon - start.lon) * progress,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl Port {
    pub fn new(name: &str, lat: f64, lon: f64) -> Self {
        Self {
            name: name.to_string(),
            lat,
            lon,
        }
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lon)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ship {
    pub name: String,
    pub from: String,
    pub to: String,
    /// Voyage progress, 0 at origin and 1 at destination
    pub progress: f64,
    /// Cargo in million barrels
    pub volume: f64,
}

impl Ship {
    pub fn new(name: &str, from: &str, to: &str, progress: f64, volume: f64) -> Self {
        Self {
            name: name.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            progress,
            volume,
        }
    }
}

/// Where a tanker is now
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipPosition {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub from: String,
    pub to: String,
    pub volume: f64,
    pub width: f64,
}

/// Origin → destination arc of one tanker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowArc {
    pub name: String,
    pub from_lat: f64,
    pub from_lon: f64,
    pub to_lat: f64,
    pub to_lon: f64,
    pub volume: f64,
    pub width: f64,
}

/// Built-in ports
pub fn default_ports() -> Vec<Port> {
    vec![
        Port::new("Houston", 29.7522, -95.3584),
        Port::new("Rotterdam", 51.9244, 4.4777),
        Port::new("Singapore", 1.3521, 103.8198),
        Port::new("Ras Tanura", 26.6401, 50.1583),
        Port::new("Fujairah", 25.1288, 56.3265),
    ]
}

/// Built-in tankers
pub fn default_ships() -> Vec<Ship> {
    vec![
        Ship::new("Crude Titan", "Houston", "Rotterdam", 0.3, 2.1),
        Ship::new("Sea Giant", "Ras Tanura", "Singapore", 0.7, 1.8),
        Ship::new("Ocean Star", "Fujairah", "Rotterdam", 0.5, 1.2),
        Ship::new("Black Pearl", "Houston", "Singapore", 0.6, 2.5),
    ]
}

/// Place every tanker on its route.
///
/// Tankers naming an unknown port are skipped. Widths scale with cargo
/// relative to the largest one.
pub fn compute_positions(ports: &[Port], ships: &[Ship]) -> (Vec<ShipPosition>, Vec<FlowArc>) {
    let by_name: HashMap<&str, &Port> = ports.iter().map(|p| (p.name.as_str(), p)).collect();
    let max_volume = ships.iter().map(|s| s.volume).fold(0.0_f64, f64::max);

    let mut positions = Vec::with_capacity(ships.len());
    let mut flows = Vec::with_capacity(ships.len());

    for ship in ships {
        let (start, end) = match (by_name.get(ship.from.as_str()), by_name.get(ship.to.as_str())) {
            (Some(start), Some(end)) => (*start, *end),
            (start, _) => {
                let missing = if start.is_none() { &ship.from } else { &ship.to };
                tracing::warn!(ship = %ship.name, port = %missing, "Port not found, skipping ship");
                continue;
            }
        };

        let here = position(start.coordinates(), end.coordinates(), ship.progress);
        let width = if max_volume > 0.0 {
            ship.volume / max_volume * MAX_FLOW_WIDTH
        } else {
            0.0
        };

        positions.push(ShipPosition {
            name: ship.name.clone(),
            lat: here.lat,
            lon: here.lon,
            from: ship.from.clone(),
            to: ship.to.clone(),
            volume: ship.volume,
            width,
        });
        flows.push(FlowArc {
            name: ship.name.clone(),
            from_lat: start.lat,
            from_lon: start.lon,
            to_lat: end.lat,
            to_lon: end.lon,
            volume: ship.volume,
            width,
        });
    }

    (positions, flows)
}

/// Origin and cargo filter for the map
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FlowFilter {
    /// Only ships leaving this port
    pub origin: Option<String>,
    pub min_volume: Option<f64>,
    pub max_volume: Option<f64>,
}

impl FlowFilter {
    pub fn matches(&self, position: &ShipPosition) -> bool {
        self.origin.as_deref().map_or(true, |o| position.from == o)
            && self.min_volume.map_or(true, |min| position.volume >= min)
            && self.max_volume.map_or(true, |max| position.volume <= max)
    }

    /// Keep matching positions and the arcs of the ships kept
    pub fn apply(
        &self,
        positions: &[ShipPosition],
        flows: &[FlowArc],
    ) -> (Vec<ShipPosition>, Vec<FlowArc>) {
        let kept: Vec<ShipPosition> = positions
            .iter()
            .filter(|p| self.matches(p))
            .cloned()
            .collect();
        let arcs = flows
            .iter()
            .filter(|f| kept.iter().any(|p| p.name == f.name))
            .cloned()
            .collect();
        (kept, arcs)
    }
}

/// Ports, ships and their computed positions
#[derive(Debug, Clone)]
pub struct Fleet {
    pub ports: Vec<Port>,
    pub ships: Vec<Ship>,
    pub positions: Vec<ShipPosition>,
    pub flows: Vec<FlowArc>,
}

impl Fleet {
    pub fn new(ports: Vec<Port>, ships: Vec<Ship>) -> Self {
        let (positions, flows) = compute_positions(&ports, &ships);
        Self {
            ports,
            ships,
            positions,
            flows,
        }
    }
}

impl Default for Fleet {
    fn default() -> Self {
        Self::new(default_ports(), default_ships())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Coordinates {
        Coordinates::new(0.0, 0.0)
    }

    #[test]
    fn test_position_midpoint() {
        let p = position(origin(), Coordinates::new(10.0, 10.0), 0.5);
        assert_eq!(p, Coordinates::new(5.0, 5.0));
    }

    #[test]
    fn test_position_boundaries_are_exact() {
        let start = Coordinates::new(29.7522, -95.3584);
        let end = Coordinates::new(51.9244, 4.4777);
        assert_eq!(position(start, end, 0.0), start);
        assert_eq!(position(start, end, 1.0), end);
    }

    #[test]
    fn test_position_clamps_out_of_range() {
        let end = Coordinates::new(10.0, -10.0);
        assert_eq!(position(origin(), end, -0.5), origin());
        assert_eq!(position(origin(), end, 1.5), end);
        assert_eq!(position(origin(), end, f64::NAN), origin());
    }

    #[test]
    fn test_default_fleet_positions() {
        let fleet = Fleet::default();
        assert_eq!(fleet.positions.len(), 4);
        assert_eq!(fleet.flows.len(), 4);

        let pearl = fleet
            .positions
            .iter()
            .find(|p| p.name == "Black Pearl")
            .unwrap();
        assert!((pearl.width - 50.0).abs() < 1e-9);

        let titan = &fleet.positions[0];
        let expected_lat = 29.7522 + (51.9244 - 29.7522) * 0.3;
        assert!((titan.lat - expected_lat).abs() < 1e-9);
        assert!((titan.width - 2.1 / 2.5 * 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_port_is_skipped() {
        let mut ships = default_ships();
        ships.push(Ship::new("Ghost", "Atlantis", "Rotterdam", 0.5, 1.0));
        let (positions, flows) = compute_positions(&default_ports(), &ships);

        assert_eq!(positions.len(), 4);
        assert_eq!(flows.len(), 4);
        assert!(positions.iter().all(|p| p.name != "Ghost"));
    }

    #[test]
    fn test_filter_by_origin_and_volume() {
        let fleet = Fleet::default();

        let from_houston = FlowFilter {
            origin: Some("Houston".into()),
            ..FlowFilter::default()
        };
        let (positions, flows) = from_houston.apply(&fleet.positions, &fleet.flows);
        assert_eq!(positions.len(), 2);
        assert_eq!(flows.len(), 2);

        let mid_cargo = FlowFilter {
            min_volume: Some(1.5),
            max_volume: Some(2.2),
            ..FlowFilter::default()
        };
        let (positions, _) = mid_cargo.apply(&fleet.positions, &fleet.flows);
        let names: Vec<&str> = positions.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Crude Titan", "Sea Giant"]);
    }
}
