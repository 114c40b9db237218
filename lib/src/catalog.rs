//! Static part definitions.

use std::{collections::BTreeMap, fmt, sync::Arc};

use color_eyre::eyre::{self, bail, ensure, WrapErr};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A resource stored in tanks and consumed by engines.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Resource {
    LiquidFuel,
    Oxidizer,
    SolidFuel,
    Monopropellant,
}

impl Resource {
    /// Density of the resource, in tons per unit.
    pub fn density(self) -> f64 {
        match self {
            Self::LiquidFuel | Self::Oxidizer => 0.005,
            Self::SolidFuel => 0.0075,
            Self::Monopropellant => 0.004,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LiquidFuel => "liquid fuel",
            Self::Oxidizer => "oxidizer",
            Self::SolidFuel => "solid fuel",
            Self::Monopropellant => "monopropellant",
        };
        f.write_str(name)
    }
}

/// Amounts per resource, in resource units.
pub type ResourceAmounts = BTreeMap<Resource, f64>;

/// Mass of the given amounts, in tons.
pub fn resource_mass(amounts: &ResourceAmounts) -> f64 {
    amounts
        .iter()
        .map(|(res, amount)| res.density() * amount)
        .sum()
}

/// A named socket through which a part connects to another part.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttachmentPoint {
    pub name: Arc<str>,
    /// Offset from the part center, before scaling.
    #[serde(with = "crate::math::vec2")]
    pub offset: Vector2<f64>,
    /// Size class; two points connect only if their classes match
    /// within tolerance.
    pub size: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineSpec {
    /// Thrust at sea level (kN)
    pub thrust_sea_level: f64,
    /// Thrust in vacuum (kN)
    pub thrust_vacuum: f64,
    /// Specific impulse (s)
    pub isp: f64,
    /// Consumption at full throttle, in units per second.
    pub consumption: ResourceAmounts,
    /// Fuel carried by the engine itself. Engines with an internal
    /// store never draw from tanks for those resources.
    #[serde(default)]
    pub internal_fuel: ResourceAmounts,
}

impl EngineSpec {
    /// Thrust at the given atmospheric pressure (atm), before throttle.
    pub fn thrust_at(&self, pressure: f64) -> f64 {
        lerp(self.thrust_vacuum, self.thrust_sea_level, pressure.clamp(0.0, 1.0))
    }
}

fn lerp(x: f64, y: f64, t: f64) -> f64 {
    x + t * (y - x)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FuelTankSpec {
    pub capacity: ResourceAmounts,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecouplerSpec {
    /// Separation impulse reported to listeners (kN)
    pub separation_force: f64,
    /// Lower priorities fire first.
    pub stage_priority: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParachuteSpec {
    /// Drag area added once deployed (m^2)
    pub drag_area: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PartKind {
    Command,
    FuelTank(FuelTankSpec),
    Engine(EngineSpec),
    Decoupler(DecouplerSpec),
    Parachute(ParachuteSpec),
    Structural,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartDefinition {
    pub id: Arc<str>,
    pub name: String,
    pub kind: PartKind,
    /// Mass without any resources (t)
    pub dry_mass: f64,
    pub cost: f64,
    /// Footprint width and height, in world units.
    #[serde(with = "crate::math::vec2")]
    pub size: Vector2<f64>,
    pub attachment_points: Vec<AttachmentPoint>,
}

impl PartDefinition {
    pub fn point(&self, name: &str) -> Option<&AttachmentPoint> {
        self.attachment_points.iter().find(|p| &*p.name == name)
    }

    pub fn engine(&self) -> Option<&EngineSpec> {
        match &self.kind {
            PartKind::Engine(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn decoupler(&self) -> Option<&DecouplerSpec> {
        match &self.kind {
            PartKind::Decoupler(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn is_fuel_tank(&self) -> bool {
        matches!(self.kind, PartKind::FuelTank(_))
    }

    /// Resources a freshly placed instance starts with.
    pub fn initial_fuel(&self) -> ResourceAmounts {
        match &self.kind {
            PartKind::FuelTank(tank) => tank.capacity.clone(),
            PartKind::Engine(engine) => engine.internal_fuel.clone(),
            _ => ResourceAmounts::new(),
        }
    }

    pub fn validate(&self) -> eyre::Result<()> {
        ensure!(!self.id.is_empty(), "part definition has an empty id");
        ensure!(
            self.dry_mass.is_finite() && self.dry_mass > 0.0,
            "part {}: dry mass must be positive, got {}",
            self.id,
            self.dry_mass
        );
        ensure!(
            self.cost.is_finite() && self.cost >= 0.0,
            "part {}: cost must be non-negative",
            self.id
        );

        for (i, point) in self.attachment_points.iter().enumerate() {
            ensure!(
                !point.name.is_empty(),
                "part {}: attachment point #{i} has no name",
                self.id
            );
            ensure!(
                point.size.is_finite() && point.size > 0.0,
                "part {}: attachment point {} has a non-positive size class",
                self.id,
                point.name
            );
            if self.attachment_points[..i]
                .iter()
                .any(|other| other.name == point.name)
            {
                bail!(
                    "part {}: duplicate attachment point {}",
                    self.id,
                    point.name
                );
            }
        }

        match &self.kind {
            PartKind::Engine(engine) => {
                ensure!(
                    engine.thrust_sea_level >= 0.0 && engine.thrust_vacuum >= 0.0,
                    "part {}: engine thrust must be non-negative",
                    self.id
                );
                ensure!(
                    engine.isp > 0.0,
                    "part {}: engine specific impulse must be positive",
                    self.id
                );
                ensure!(
                    !engine.consumption.is_empty(),
                    "part {}: engine consumes no resources",
                    self.id
                );
                ensure!(
                    engine.consumption.values().all(|rate| *rate > 0.0),
                    "part {}: engine consumption rates must be positive",
                    self.id
                );
                check_amounts(&self.id, "internal fuel", &engine.internal_fuel)?;
            }
            PartKind::FuelTank(tank) => {
                ensure!(
                    !tank.capacity.is_empty(),
                    "part {}: fuel tank holds no resources",
                    self.id
                );
                check_amounts(&self.id, "capacity", &tank.capacity)?;
            }
            PartKind::Decoupler(decoupler) => ensure!(
                decoupler.separation_force >= 0.0,
                "part {}: separation force must be non-negative",
                self.id
            ),
            PartKind::Parachute(chute) => ensure!(
                chute.drag_area >= 0.0,
                "part {}: parachute drag area must be non-negative",
                self.id
            ),
            PartKind::Command | PartKind::Structural => {}
        }

        Ok(())
    }
}

fn check_amounts(id: &str, what: &str, amounts: &ResourceAmounts) -> eyre::Result<()> {
    for (res, amount) in amounts {
        ensure!(
            amount.is_finite() && *amount >= 0.0,
            "part {id}: {what} for {res} must be non-negative"
        );
    }
    Ok(())
}

/// Registered part definitions, keyed by id.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    definitions: BTreeMap<Arc<str>, Arc<PartDefinition>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register a definition. Ids must be unique.
    pub fn register(&mut self, definition: PartDefinition) -> eyre::Result<Arc<PartDefinition>> {
        definition.validate()?;
        if self.definitions.contains_key(&definition.id) {
            bail!("part definition {} registered twice", definition.id);
        }
        debug!(id = %definition.id, "registered part definition");
        let definition = Arc::new(definition);
        self.definitions
            .insert(definition.id.clone(), definition.clone());
        Ok(definition)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<PartDefinition>> {
        self.definitions.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<PartDefinition>> {
        self.definitions.values()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Register every definition in a RON list.
    pub fn extend_from_ron_str(&mut self, s: &str) -> eyre::Result<()> {
        let definitions: Vec<PartDefinition> =
            ron::from_str(s).wrap_err("failed to parse part definitions")?;
        for definition in definitions {
            self.register(definition)?;
        }
        Ok(())
    }

    pub fn from_ron_str(s: &str) -> eyre::Result<Self> {
        let mut catalog = Self::new();
        catalog.extend_from_ron_str(s)?;
        Ok(catalog)
    }

    /// The built-in parts.
    pub fn stock() -> Self {
        let mut catalog = Self::new();
        for definition in stock_parts() {
            if let Err(e) = catalog.register(definition) {
                unreachable!("stock part failed validation: {e:#}");
            }
        }
        catalog
    }
}

fn point(name: &str, x: f64, y: f64, size: f64) -> AttachmentPoint {
    AttachmentPoint {
        name: name.into(),
        offset: Vector2::new(x, y),
        size,
    }
}

fn amounts(entries: &[(Resource, f64)]) -> ResourceAmounts {
    entries.iter().copied().collect()
}

fn stock_parts() -> Vec<PartDefinition> {
    use Resource::{LiquidFuel, Oxidizer, SolidFuel};

    vec![
        PartDefinition {
            id: "pod.mk1".into(),
            name: "Mk1 Command Pod".into(),
            kind: PartKind::Command,
            dry_mass: 0.84,
            cost: 600.0,
            size: Vector2::new(60.0, 60.0),
            attachment_points: vec![point("top", 0.0, 30.0, 0.625), point("bottom", 0.0, -30.0, 1.25)],
        },
        PartDefinition {
            id: "chute.mk16".into(),
            name: "Mk16 Parachute".into(),
            kind: PartKind::Parachute(ParachuteSpec { drag_area: 80.0 }),
            dry_mass: 0.1,
            cost: 422.0,
            size: Vector2::new(30.0, 20.0),
            attachment_points: vec![point("bottom", 0.0, -10.0, 0.625)],
        },
        PartDefinition {
            id: "tank.fl-t400".into(),
            name: "FL-T400 Fuel Tank".into(),
            kind: PartKind::FuelTank(FuelTankSpec {
                capacity: amounts(&[(LiquidFuel, 180.0), (Oxidizer, 220.0)]),
            }),
            dry_mass: 0.25,
            cost: 500.0,
            size: Vector2::new(60.0, 100.0),
            attachment_points: vec![point("top", 0.0, 50.0, 1.25), point("bottom", 0.0, -50.0, 1.25)],
        },
        PartDefinition {
            id: "tank.fl-t800".into(),
            name: "FL-T800 Fuel Tank".into(),
            kind: PartKind::FuelTank(FuelTankSpec {
                capacity: amounts(&[(LiquidFuel, 360.0), (Oxidizer, 440.0)]),
            }),
            dry_mass: 0.5,
            cost: 800.0,
            size: Vector2::new(60.0, 200.0),
            attachment_points: vec![point("top", 0.0, 100.0, 1.25), point("bottom", 0.0, -100.0, 1.25)],
        },
        PartDefinition {
            id: "engine.lv-t45".into(),
            name: "LV-T45 Liquid Fuel Engine".into(),
            kind: PartKind::Engine(EngineSpec {
                thrust_sea_level: 168.0,
                thrust_vacuum: 215.0,
                isp: 320.0,
                consumption: amounts(&[(LiquidFuel, 6.1), (Oxidizer, 7.4)]),
                internal_fuel: ResourceAmounts::new(),
            }),
            dry_mass: 1.5,
            cost: 1200.0,
            size: Vector2::new(60.0, 80.0),
            attachment_points: vec![point("top", 0.0, 40.0, 1.25), point("bottom", 0.0, -40.0, 1.25)],
        },
        PartDefinition {
            id: "engine.rt-10".into(),
            name: "RT-10 Solid Fuel Booster".into(),
            kind: PartKind::Engine(EngineSpec {
                thrust_sea_level: 163.0,
                thrust_vacuum: 198.0,
                isp: 195.0,
                consumption: amounts(&[(SolidFuel, 12.5)]),
                internal_fuel: amounts(&[(SolidFuel, 375.0)]),
            }),
            dry_mass: 0.75,
            cost: 400.0,
            size: Vector2::new(40.0, 160.0),
            attachment_points: vec![point("top", 0.0, 80.0, 1.25), point("bottom", 0.0, -80.0, 1.25)],
        },
        PartDefinition {
            id: "decoupler.td-12".into(),
            name: "TD-12 Decoupler".into(),
            kind: PartKind::Decoupler(DecouplerSpec {
                separation_force: 250.0,
                stage_priority: 0,
            }),
            dry_mass: 0.04,
            cost: 200.0,
            size: Vector2::new(60.0, 20.0),
            attachment_points: vec![point("top", 0.0, 10.0, 1.25), point("bottom", 0.0, -10.0, 1.25)],
        },
        PartDefinition {
            id: "structural.adapter".into(),
            name: "Size Adapter".into(),
            kind: PartKind::Structural,
            dry_mass: 0.08,
            cost: 80.0,
            size: Vector2::new(60.0, 30.0),
            attachment_points: vec![point("top", 0.0, 15.0, 0.625), point("bottom", 0.0, -15.0, 1.25)],
        },
    ]
}

#[test]
fn stock_catalog_registers_every_part() {
    let catalog = Catalog::stock();
    assert_eq!(catalog.len(), 8);
    let engine = catalog.get("engine.lv-t45").unwrap();
    assert!(engine.engine().is_some());
    assert!(engine.initial_fuel().is_empty());
    let booster = catalog.get("engine.rt-10").unwrap();
    assert_eq!(booster.initial_fuel()[&Resource::SolidFuel], 375.0);
}

#[test]
fn duplicate_ids_are_rejected() {
    let mut catalog = Catalog::stock();
    let pod = (**catalog.get("pod.mk1").unwrap()).clone();
    assert!(catalog.register(pod).is_err());
}

#[test]
fn malformed_definitions_fail_registration() {
    let mut catalog = Catalog::new();
    let mut engine = (**Catalog::stock().get("engine.lv-t45").unwrap()).clone();
    if let PartKind::Engine(spec) = &mut engine.kind {
        spec.consumption.clear();
    }
    assert!(catalog.register(engine).is_err());

    let mut tank = (**Catalog::stock().get("tank.fl-t400").unwrap()).clone();
    tank.attachment_points.push(tank.attachment_points[0].clone());
    assert!(catalog.register(tank).is_err());

    let mut pod = (**Catalog::stock().get("pod.mk1").unwrap()).clone();
    pod.dry_mass = 0.0;
    assert!(catalog.register(pod).is_err());
    assert!(catalog.is_empty());
}

#[test]
fn definitions_load_from_ron() {
    let catalog = Catalog::from_ron_str(
        r#"[
            (
                id: "test.tank",
                name: "Test Tank",
                kind: FuelTank((capacity: {LiquidFuel: 400.0})),
                dry_mass: 0.5,
                cost: 10.0,
                size: (20.0, 40.0),
                attachment_points: [
                    (name: "top", offset: (0.0, 20.0), size: 1.0),
                ],
            ),
        ]"#,
    )
    .unwrap();
    let tank = catalog.get("test.tank").unwrap();
    assert!(tank.is_fuel_tank());
    assert_eq!(tank.point("top").unwrap().offset, Vector2::new(0.0, 20.0));
}

#[test]
fn thrust_interpolates_between_vacuum_and_sea_level() {
    let spec = EngineSpec {
        thrust_sea_level: 200.0,
        thrust_vacuum: 220.0,
        isp: 300.0,
        consumption: amounts(&[(Resource::LiquidFuel, 8.0)]),
        internal_fuel: ResourceAmounts::new(),
    };
    assert_eq!(spec.thrust_at(1.0), 200.0);
    assert_eq!(spec.thrust_at(0.0), 220.0);
    assert!((spec.thrust_at(0.5) - 210.0).abs() < 1e-12);
}
