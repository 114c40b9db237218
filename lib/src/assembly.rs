//! The assembly graph: placed parts and the connections between their
//! attachment points.

use std::{collections::BTreeSet, fmt, sync::Arc};

use color_eyre::eyre::{self, bail};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::debug;

use crate::{
    arena::{Arena, IdLike},
    catalog::{resource_mass, AttachmentPoint, PartDefinition, Resource, ResourceAmounts},
    config::EditorConfig,
    math::rocket_equation,
};

#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize,
)]
#[serde(transparent)]
pub struct PartId(u32);

impl IdLike for PartId {
    fn from_raw(index: usize) -> Self {
        Self(index as u32)
    }

    fn into_raw(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize,
)]
#[serde(transparent)]
pub struct ConnectionId(u32);

impl IdLike for ConnectionId {
    fn from_raw(index: usize) -> Self {
        Self(index as u32)
    }

    fn into_raw(self) -> usize {
        self.0 as usize
    }
}

/// A placed part.
#[derive(Clone, Debug, PartialEq)]
pub struct PartInstance {
    pub definition: Arc<PartDefinition>,
    /// World position of the part center.
    pub position: Vector2<f64>,
    /// Resources currently held, in units.
    pub fuel: ResourceAmounts,
    /// Connections this part participates in.
    pub connections: Vec<ConnectionId>,
}

impl PartInstance {
    pub fn dry_mass(&self) -> f64 {
        self.definition.dry_mass
    }

    /// Dry mass plus the mass of held resources (t).
    pub fn mass(&self) -> f64 {
        self.definition.dry_mass + resource_mass(&self.fuel)
    }
}

/// One end of a connection: a named point on a part.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PointRef {
    pub part: PartId,
    pub point: Arc<str>,
}

impl PointRef {
    pub fn new(part: PartId, point: &str) -> Self {
        Self {
            part,
            point: point.into(),
        }
    }
}

impl fmt::Display for PointRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.part, self.point)
    }
}

/// An unordered pair of attachment points.
#[derive(Clone, Debug, PartialEq)]
pub struct Connection {
    pub a: PointRef,
    pub b: PointRef,
    pub created_at: OffsetDateTime,
}

impl Connection {
    pub fn touches(&self, part: PartId) -> bool {
        self.a.part == part || self.b.part == part
    }

    /// The end that does not belong to `part`.
    pub fn other(&self, part: PartId) -> Option<&PointRef> {
        if self.a.part == part {
            Some(&self.b)
        } else if self.b.part == part {
            Some(&self.a)
        } else {
            None
        }
    }

    /// The end that belongs to `part`.
    pub fn end(&self, part: PartId) -> Option<&PointRef> {
        if self.a.part == part {
            Some(&self.a)
        } else if self.b.part == part {
            Some(&self.b)
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConnectError {
    #[error("no part {0} in the assembly")]
    UnknownPart(PartId),
    #[error("part {part} has no attachment point named {point}")]
    UnknownPoint { part: PartId, point: Arc<str> },
    #[error("part {0} cannot connect to itself")]
    SelfConnection(PartId),
    #[error("attachment point {0} is already occupied")]
    PointOccupied(PointRef),
    #[error("size classes {a} and {b} differ by more than {tolerance}")]
    SizeMismatch { a: f64, b: f64, tolerance: f64 },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Assembly {
    parts: Arena<PartId, PartInstance>,
    connections: Arena<ConnectionId, Connection>,
    root: Option<PartId>,
    scale: f64,
    size_tolerance: f64,
}

impl Default for Assembly {
    fn default() -> Self {
        Self::with_editor_config(&EditorConfig::default())
    }
}

impl Assembly {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_editor_config(config: &EditorConfig) -> Self {
        Self {
            parts: Arena::new(),
            connections: Arena::new(),
            root: None,
            scale: config.scale,
            size_tolerance: config.size_tolerance,
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn size_tolerance(&self) -> f64 {
        self.size_tolerance
    }

    pub fn root(&self) -> Option<PartId> {
        self.root
    }

    /// Designate a different root. Returns false for unknown parts.
    pub fn set_root(&mut self, id: PartId) -> bool {
        if self.parts.contains(id) {
            self.root = Some(id);
            true
        } else {
            false
        }
    }

    pub fn part(&self, id: PartId) -> Option<&PartInstance> {
        self.parts.get(id)
    }

    pub fn parts(&self) -> impl Iterator<Item = (PartId, &PartInstance)> {
        self.parts.iter()
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn connections(&self) -> impl Iterator<Item = (ConnectionId, &Connection)> {
        self.connections.iter()
    }

    pub fn add_part(&mut self, definition: Arc<PartDefinition>, position: Vector2<f64>) -> PartId {
        let fuel = definition.initial_fuel();
        let id = self.parts.push(PartInstance {
            definition,
            position,
            fuel,
            connections: vec![],
        });
        if self.root.is_none() {
            self.root = Some(id);
        }
        debug!(part = %id, "added part");
        id
    }

    /// Insert a part under a caller-chosen id, as when reconstructing
    /// a saved assembly. Does not touch the root.
    pub fn insert_part(
        &mut self,
        id: PartId,
        definition: Arc<PartDefinition>,
        position: Vector2<f64>,
        fuel: ResourceAmounts,
    ) -> eyre::Result<()> {
        if self.parts.contains(id) {
            bail!("duplicate part id {id}");
        }
        self.parts.insert(
            id,
            PartInstance {
                definition,
                position,
                fuel,
                connections: vec![],
            },
        );
        Ok(())
    }

    /// Remove a part along with every connection touching it.
    pub fn remove_part(&mut self, id: PartId) -> Option<PartInstance> {
        let connections = self.parts.get(id)?.connections.clone();
        for connection in connections {
            self.disconnect(connection);
        }
        let part = self.parts.remove(id)?;
        if self.root == Some(id) {
            self.root = self.parts.ids().next();
            debug!(old = %id, new = ?self.root, "root removed, picked a new one");
        }
        debug!(part = %id, "removed part");
        Some(part)
    }

    pub fn set_position(&mut self, id: PartId, position: Vector2<f64>) -> bool {
        if let Some(part) = self.parts.get_mut(id) {
            part.position = position;
            true
        } else {
            false
        }
    }

    /// Set the amount of a resource held by a part, clamped to what the
    /// part can hold. Returns false if the part holds no such resource.
    pub fn set_fuel(&mut self, id: PartId, resource: Resource, amount: f64) -> bool {
        let Some(part) = self.parts.get_mut(id) else {
            return false;
        };
        let Some(capacity) = part.definition.initial_fuel().get(&resource).copied() else {
            return false;
        };
        part.fuel.insert(resource, amount.clamp(0.0, capacity));
        true
    }

    pub fn attachment_point(&self, id: PartId, point: &str) -> Option<&AttachmentPoint> {
        self.parts.get(id)?.definition.point(point)
    }

    /// World position of a point: part center plus scaled offset.
    pub fn attachment_world_position(&self, id: PartId, point: &str) -> Option<Vector2<f64>> {
        let part = self.parts.get(id)?;
        let point = part.definition.point(point)?;
        Some(part.position + point.offset * self.scale)
    }

    /// The connection occupying a point, if any.
    pub fn occupant(&self, id: PartId, point: &str) -> Option<ConnectionId> {
        self.parts.get(id)?.connections.iter().copied().find(|c| {
            self.connections[*c]
                .end(id)
                .is_some_and(|end| &*end.point == point)
        })
    }

    pub fn free_points(&self, id: PartId) -> impl Iterator<Item = &AttachmentPoint> {
        self.parts
            .get(id)
            .into_iter()
            .flat_map(move |part| part.definition.attachment_points.iter())
            .filter(move |point| self.occupant(id, &point.name).is_none())
    }

    /// Connected neighbours of a part, with the connection leading to
    /// each.
    pub fn neighbors(&self, id: PartId) -> impl Iterator<Item = (ConnectionId, PartId)> + '_ {
        self.parts
            .get(id)
            .into_iter()
            .flat_map(|part| part.connections.iter().copied())
            .filter_map(move |c| Some((c, self.connections[c].other(id)?.part)))
    }

    pub fn connect(
        &mut self,
        part_a: PartId,
        point_a: &str,
        part_b: PartId,
        point_b: &str,
    ) -> Result<ConnectionId, ConnectError> {
        self.connect_at(part_a, point_a, part_b, point_b, OffsetDateTime::now_utc())
    }

    /// [`Self::connect`] with an explicit creation time.
    pub fn connect_at(
        &mut self,
        part_a: PartId,
        point_a: &str,
        part_b: PartId,
        point_b: &str,
        created_at: OffsetDateTime,
    ) -> Result<ConnectionId, ConnectError> {
        if part_a == part_b {
            return Err(ConnectError::SelfConnection(part_a));
        }
        let size_a = self.point_size(part_a, point_a)?;
        let size_b = self.point_size(part_b, point_b)?;

        for (part, point) in [(part_a, point_a), (part_b, point_b)] {
            if self.occupant(part, point).is_some() {
                return Err(ConnectError::PointOccupied(PointRef::new(part, point)));
            }
        }
        if (size_a - size_b).abs() > self.size_tolerance {
            return Err(ConnectError::SizeMismatch {
                a: size_a,
                b: size_b,
                tolerance: self.size_tolerance,
            });
        }

        let id = self.connections.push(Connection {
            a: PointRef::new(part_a, point_a),
            b: PointRef::new(part_b, point_b),
            created_at,
        });
        self.parts[part_a].connections.push(id);
        self.parts[part_b].connections.push(id);
        debug!(connection = ?id, a = %part_a, b = %part_b, "connected");
        Ok(id)
    }

    fn point_size(&self, part: PartId, point: &str) -> Result<f64, ConnectError> {
        let instance = self.parts.get(part).ok_or(ConnectError::UnknownPart(part))?;
        instance
            .definition
            .point(point)
            .map(|p| p.size)
            .ok_or_else(|| ConnectError::UnknownPoint {
                part,
                point: point.into(),
            })
    }

    pub fn disconnect(&mut self, id: ConnectionId) -> Option<Connection> {
        let connection = self.connections.remove(id)?;
        for end in [&connection.a, &connection.b] {
            if let Some(part) = self.parts.get_mut(end.part) {
                part.connections.retain(|c| *c != id);
            }
        }
        debug!(connection = ?id, "disconnected");
        Some(connection)
    }

    /// Every part reachable from `start`, `start` included. Empty if
    /// `start` is not in the assembly.
    pub fn connected_component(&self, start: PartId) -> BTreeSet<PartId> {
        self.traverse_until(start, &BTreeSet::new())
    }

    /// Depth-first traversal from `start` that never enters a part in
    /// `blocked`.
    pub fn traverse_until(&self, start: PartId, blocked: &BTreeSet<PartId>) -> BTreeSet<PartId> {
        let mut set = BTreeSet::new();
        if !self.parts.contains(start) || blocked.contains(&start) {
            return set;
        }

        let mut worklist = vec![start];
        while let Some(target) = worklist.pop() {
            if !set.insert(target) {
                continue;
            }
            for (_, neighbor) in self.neighbors(target) {
                if !blocked.contains(&neighbor) && !set.contains(&neighbor) {
                    worklist.push(neighbor);
                }
            }
        }
        set
    }

    /// Parts reachable from the root.
    pub fn live_parts(&self) -> BTreeSet<PartId> {
        self.root
            .map(|root| self.connected_component(root))
            .unwrap_or_default()
    }

    fn selected(&self, live_only: bool) -> Vec<&PartInstance> {
        if live_only {
            self.live_parts()
                .into_iter()
                .map(|id| &self.parts[id])
                .collect()
        } else {
            self.parts.iter().map(|(_, part)| part).collect()
        }
    }

    /// Dry mass plus resource mass (t).
    pub fn total_mass(&self, live_only: bool) -> f64 {
        self.selected(live_only).iter().map(|p| p.mass()).sum()
    }

    /// Sea-level thrust of every engine (kN).
    pub fn total_thrust(&self, live_only: bool) -> f64 {
        self.selected(live_only)
            .iter()
            .filter_map(|p| p.definition.engine())
            .map(|e| e.thrust_sea_level)
            .sum()
    }

    pub fn total_cost(&self, live_only: bool) -> f64 {
        self.selected(live_only)
            .iter()
            .map(|p| p.definition.cost)
            .sum()
    }

    pub fn thrust_to_weight(&self, live_only: bool, gravity: f64) -> f64 {
        let weight = self.total_mass(live_only) * gravity;
        if weight > 0.0 {
            self.total_thrust(live_only) / weight
        } else {
            0.0
        }
    }

    /// Rocket-equation estimate using the mean specific impulse of the
    /// engines and the wet/dry mass of every selected part (m/s).
    pub fn estimate_delta_v(&self, live_only: bool) -> f64 {
        let parts = self.selected(live_only);
        let isps = parts
            .iter()
            .filter_map(|p| p.definition.engine())
            .map(|e| e.isp)
            .collect::<Vec<_>>();
        if isps.is_empty() {
            return 0.0;
        }
        let isp = isps.iter().sum::<f64>() / isps.len() as f64;
        let wet = parts.iter().map(|p| p.mass()).sum();
        let dry = parts.iter().map(|p| p.dry_mass()).sum();
        rocket_equation(isp, wet, dry)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::sync::Arc;

    use nalgebra::Vector2;

    use super::{Assembly, PartId};
    use crate::catalog::{
        AttachmentPoint, DecouplerSpec, EngineSpec, FuelTankSpec, PartDefinition, PartKind,
        Resource, ResourceAmounts,
    };

    pub fn point(name: &str, x: f64, y: f64, size: f64) -> AttachmentPoint {
        AttachmentPoint {
            name: name.into(),
            offset: Vector2::new(x, y),
            size,
        }
    }

    fn stack_points(half_height: f64) -> Vec<AttachmentPoint> {
        vec![
            point("top", 0.0, half_height, 1.0),
            point("bottom", 0.0, -half_height, 1.0),
        ]
    }

    pub fn pod() -> Arc<PartDefinition> {
        Arc::new(PartDefinition {
            id: "test.pod".into(),
            name: "Pod".into(),
            kind: PartKind::Command,
            dry_mass: 1.0,
            cost: 100.0,
            size: Vector2::new(20.0, 20.0),
            attachment_points: stack_points(10.0),
        })
    }

    pub fn tank(fuel: f64, dry_mass: f64) -> Arc<PartDefinition> {
        Arc::new(PartDefinition {
            id: "test.tank".into(),
            name: "Tank".into(),
            kind: PartKind::FuelTank(FuelTankSpec {
                capacity: [(Resource::LiquidFuel, fuel)].into_iter().collect(),
            }),
            dry_mass,
            cost: 50.0,
            size: Vector2::new(20.0, 40.0),
            attachment_points: stack_points(20.0),
        })
    }

    pub fn engine(sea_level: f64, vacuum: f64, rate: f64, dry_mass: f64) -> Arc<PartDefinition> {
        Arc::new(PartDefinition {
            id: "test.engine".into(),
            name: "Engine".into(),
            kind: PartKind::Engine(EngineSpec {
                thrust_sea_level: sea_level,
                thrust_vacuum: vacuum,
                isp: 300.0,
                consumption: [(Resource::LiquidFuel, rate)].into_iter().collect(),
                internal_fuel: ResourceAmounts::new(),
            }),
            dry_mass,
            cost: 200.0,
            size: Vector2::new(20.0, 20.0),
            attachment_points: stack_points(10.0),
        })
    }

    pub fn decoupler(priority: i32) -> Arc<PartDefinition> {
        Arc::new(PartDefinition {
            id: "test.decoupler".into(),
            name: "Decoupler".into(),
            kind: PartKind::Decoupler(DecouplerSpec {
                separation_force: 100.0,
                stage_priority: priority,
            }),
            dry_mass: 0.1,
            cost: 20.0,
            size: Vector2::new(20.0, 10.0),
            attachment_points: stack_points(5.0),
        })
    }

    /// Stack parts top to bottom, each connected below the previous one.
    pub fn stack(defs: &[Arc<PartDefinition>]) -> (Assembly, Vec<PartId>) {
        let mut assembly = Assembly::new();
        let mut ids: Vec<PartId> = vec![];
        for (i, def) in defs.iter().enumerate() {
            let id = assembly.add_part(def.clone(), Vector2::new(0.0, -50.0 * i as f64));
            if let Some(prev) = ids.last() {
                assembly.connect(*prev, "bottom", id, "top").unwrap();
            }
            ids.push(id);
        }
        (assembly, ids)
    }

    pub fn sized(size: f64) -> Arc<PartDefinition> {
        Arc::new(PartDefinition {
            id: "test.sized".into(),
            name: "Sized".into(),
            kind: PartKind::Structural,
            dry_mass: 0.5,
            cost: 1.0,
            size: Vector2::new(10.0, 10.0),
            attachment_points: vec![point("top", 0.0, 5.0, size), point("bottom", 0.0, -5.0, size)],
        })
    }
}

#[cfg(test)]
use fixtures::{engine, pod, sized, tank};

#[test]
fn first_part_becomes_root() {
    let mut assembly = Assembly::new();
    let a = assembly.add_part(pod(), Vector2::zeros());
    let b = assembly.add_part(tank(100.0, 1.0), Vector2::new(0.0, -30.0));
    assert_eq!(assembly.root(), Some(a));
    assert!(assembly.set_root(b));
    assert_eq!(assembly.root(), Some(b));
}

#[test]
fn connect_rejects_occupied_points() {
    let mut assembly = Assembly::new();
    let a = assembly.add_part(pod(), Vector2::zeros());
    let b = assembly.add_part(tank(100.0, 1.0), Vector2::new(0.0, -30.0));
    let c = assembly.add_part(tank(100.0, 1.0), Vector2::new(0.0, -30.0));

    let first = assembly.connect(a, "bottom", b, "top").unwrap();
    assert_eq!(
        assembly.connect(a, "bottom", c, "top"),
        Err(ConnectError::PointOccupied(PointRef::new(a, "bottom")))
    );
    assert_eq!(
        assembly.connect(c, "top", b, "top"),
        Err(ConnectError::PointOccupied(PointRef::new(b, "top")))
    );
    assert_eq!(assembly.connections().count(), 1);
    assert_eq!(assembly.occupant(a, "bottom"), Some(first));
    assert_eq!(assembly.part(c).unwrap().connections, vec![]);
}

#[test]
fn connect_checks_size_tolerance() {
    let mut assembly = Assembly::new();
    let a = assembly.add_part(sized(1.0), Vector2::zeros());
    let b = assembly.add_part(sized(1.05), Vector2::zeros());
    let c = assembly.add_part(sized(1.25), Vector2::zeros());

    assert!(matches!(
        assembly.connect(a, "top", c, "bottom"),
        Err(ConnectError::SizeMismatch { .. })
    ));
    assert!(assembly.part(a).unwrap().connections.is_empty());
    assert!(assembly.connect(a, "top", b, "bottom").is_ok());
}

#[test]
fn connect_rejects_unknown_points_and_self_connections() {
    let mut assembly = Assembly::new();
    let a = assembly.add_part(pod(), Vector2::zeros());
    let b = assembly.add_part(pod(), Vector2::zeros());
    assert!(matches!(
        assembly.connect(a, "side", b, "top"),
        Err(ConnectError::UnknownPoint { .. })
    ));
    assert_eq!(
        assembly.connect(a, "top", a, "bottom"),
        Err(ConnectError::SelfConnection(a))
    );
    assert_eq!(
        assembly.connect(a, "top", PartId(99), "bottom"),
        Err(ConnectError::UnknownPart(PartId(99)))
    );
}

#[test]
fn disconnect_updates_both_parts() {
    let mut assembly = Assembly::new();
    let a = assembly.add_part(pod(), Vector2::zeros());
    let b = assembly.add_part(tank(100.0, 1.0), Vector2::zeros());
    let c = assembly.connect(a, "bottom", b, "top").unwrap();
    assert!(assembly.disconnect(c).is_some());
    assert!(assembly.disconnect(c).is_none());
    assert!(assembly.part(a).unwrap().connections.is_empty());
    assert!(assembly.part(b).unwrap().connections.is_empty());
    assert!(assembly.connect(a, "bottom", b, "top").is_ok());
}

#[test]
fn component_excludes_parts_behind_removed_connections() {
    let mut assembly = Assembly::new();
    let a = assembly.add_part(pod(), Vector2::zeros());
    let b = assembly.add_part(tank(100.0, 1.0), Vector2::zeros());
    let c = assembly.add_part(engine(100.0, 110.0, 1.0, 1.0), Vector2::zeros());
    assembly.connect(a, "bottom", b, "top").unwrap();
    let bc = assembly.connect(b, "bottom", c, "top").unwrap();

    assert_eq!(assembly.live_parts(), BTreeSet::from([a, b, c]));
    assembly.disconnect(bc);
    let live = assembly.live_parts();
    assert!(live.contains(&a));
    assert!(!live.contains(&c));
    assert_eq!(assembly.connected_component(c), BTreeSet::from([c]));
}

#[test]
fn removing_root_cascades_and_picks_new_root() {
    let mut assembly = Assembly::new();
    let a = assembly.add_part(pod(), Vector2::zeros());
    let b = assembly.add_part(tank(100.0, 1.0), Vector2::zeros());
    assembly.connect(a, "bottom", b, "top").unwrap();

    let removed = assembly.remove_part(a).unwrap();
    assert_eq!(removed.definition.id, pod().id);
    assert_eq!(assembly.root(), Some(b));
    assert_eq!(assembly.connections().count(), 0);
    assert!(assembly.part(b).unwrap().connections.is_empty());

    assembly.remove_part(b);
    assert_eq!(assembly.root(), None);
    assert!(assembly.live_parts().is_empty());
}

#[test]
fn live_aggregates_ignore_detached_parts() {
    let mut assembly = Assembly::new();
    let a = assembly.add_part(pod(), Vector2::zeros());
    let b = assembly.add_part(tank(400.0, 1.0), Vector2::zeros());
    let c = assembly.add_part(engine(200.0, 220.0, 8.0, 2.0), Vector2::zeros());
    let stray = assembly.add_part(engine(100.0, 110.0, 1.0, 1.0), Vector2::zeros());
    assembly.connect(a, "bottom", b, "top").unwrap();
    assembly.connect(b, "bottom", c, "top").unwrap();

    let fuel_mass = 400.0 * Resource::LiquidFuel.density();
    assert!((assembly.total_mass(true) - (4.0 + fuel_mass)).abs() < 1e-12);
    assert!((assembly.total_mass(false) - (5.0 + fuel_mass)).abs() < 1e-12);
    assert_eq!(assembly.total_thrust(true), 200.0);
    assert_eq!(assembly.total_thrust(false), 300.0);
    assert_eq!(assembly.total_cost(true), 350.0);

    let expected = rocket_equation(300.0, 4.0 + fuel_mass, 4.0);
    assert!((assembly.estimate_delta_v(true) - expected).abs() < 1e-9);
    assert!(assembly.part(stray).is_some());
}

#[test]
fn set_fuel_clamps_to_capacity() {
    let mut assembly = Assembly::new();
    let t = assembly.add_part(tank(100.0, 1.0), Vector2::zeros());
    let p = assembly.add_part(pod(), Vector2::zeros());
    assert!(assembly.set_fuel(t, Resource::LiquidFuel, 250.0));
    assert_eq!(assembly.part(t).unwrap().fuel[&Resource::LiquidFuel], 100.0);
    assert!(assembly.set_fuel(t, Resource::LiquidFuel, -3.0));
    assert_eq!(assembly.part(t).unwrap().fuel[&Resource::LiquidFuel], 0.0);
    assert!(!assembly.set_fuel(t, Resource::Oxidizer, 1.0));
    assert!(!assembly.set_fuel(p, Resource::LiquidFuel, 1.0));
}

#[test]
fn world_positions_apply_scale() {
    let config = EditorConfig {
        scale: 2.0,
        ..EditorConfig::default()
    };
    let mut assembly = Assembly::with_editor_config(&config);
    let a = assembly.add_part(pod(), Vector2::new(5.0, 5.0));
    assert_eq!(
        assembly.attachment_world_position(a, "top"),
        Some(Vector2::new(5.0, 25.0))
    );
    assert_eq!(assembly.attachment_world_position(a, "nope"), None);
}
