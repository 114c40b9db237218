//! The saved form of an assembly.

use std::{collections::BTreeSet, sync::Arc};

use color_eyre::eyre::{self, bail, ensure, eyre, WrapErr};
use itertools::Itertools;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

use crate::{
    assembly::{Assembly, PartId, PointRef},
    catalog::{Catalog, ResourceAmounts},
    config::EditorConfig,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedPart {
    pub id: PartId,
    /// Catalog id of the part's definition.
    pub definition: Arc<str>,
    #[serde(with = "crate::math::vec2")]
    pub position: Vector2<f64>,
    #[serde(default)]
    pub fuel: ResourceAmounts,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedConnection {
    pub a: PointRef,
    pub b: PointRef,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedAssembly {
    pub parts: Vec<SavedPart>,
    pub connections: Vec<SavedConnection>,
    pub root: Option<PartId>,
}

impl SavedAssembly {
    pub fn from_ron_str(s: &str) -> eyre::Result<Self> {
        ron::from_str(s).wrap_err("failed to parse saved assembly")
    }

    pub fn to_ron_string(&self) -> eyre::Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .wrap_err("failed to serialize assembly")
    }
}

impl Assembly {
    pub fn to_saved(&self) -> SavedAssembly {
        SavedAssembly {
            parts: self
                .parts()
                .map(|(id, part)| SavedPart {
                    id,
                    definition: part.definition.id.clone(),
                    position: part.position,
                    fuel: part.fuel.clone(),
                })
                .collect(),
            connections: self
                .connections()
                .map(|(_, c)| SavedConnection {
                    a: c.a.clone(),
                    b: c.b.clone(),
                    created_at: c.created_at,
                })
                .collect(),
            root: self.root(),
        }
    }

    /// Rebuild an assembly, resolving definitions through `catalog`.
    /// Anything a live assembly could not contain is an error.
    pub fn from_saved(
        saved: &SavedAssembly,
        catalog: &Catalog,
        editor: &EditorConfig,
    ) -> eyre::Result<Self> {
        let mut assembly = Self::with_editor_config(editor);

        for part in &saved.parts {
            let definition = catalog
                .get(&part.definition)
                .ok_or_else(|| eyre!("part {}: unknown definition {}", part.id, part.definition))?;

            let capacity = definition.initial_fuel();
            for (resource, amount) in &part.fuel {
                let Some(max) = capacity.get(resource) else {
                    bail!("part {}: {} cannot hold {resource}", part.id, definition.id);
                };
                ensure!(
                    amount.is_finite() && (0.0..=*max).contains(amount),
                    "part {}: {amount} {resource} is outside 0..={max}",
                    part.id
                );
            }

            assembly.insert_part(
                part.id,
                definition.clone(),
                part.position,
                part.fuel.clone(),
            )?;
        }

        let dangling = dangling_parts(saved);
        ensure!(
            dangling.is_empty(),
            "connections reference missing parts {}",
            dangling.iter().join(", ")
        );

        for connection in &saved.connections {
            assembly
                .connect_at(
                    connection.a.part,
                    &connection.a.point,
                    connection.b.part,
                    &connection.b.point,
                    connection.created_at,
                )
                .wrap_err_with(|| {
                    format!(
                        "invalid connection {} <-> {}",
                        connection.a, connection.b
                    )
                })?;
        }

        match saved.root {
            Some(root) => ensure!(assembly.set_root(root), "root {root} is not a saved part"),
            None => ensure!(saved.parts.is_empty(), "saved assembly has parts but no root"),
        }

        debug!(
            parts = assembly.part_count(),
            connections = saved.connections.len(),
            "loaded assembly"
        );
        Ok(assembly)
    }
}

/// Part ids referenced by a saved assembly's connections but missing
/// from its part list.
pub fn dangling_parts(saved: &SavedAssembly) -> BTreeSet<PartId> {
    let known = saved.parts.iter().map(|p| p.id).collect::<BTreeSet<_>>();
    saved
        .connections
        .iter()
        .flat_map(|c| [c.a.part, c.b.part])
        .filter(|id| !known.contains(id))
        .collect()
}

#[cfg(test)]
use crate::{arena::IdLike, catalog::Resource};

#[cfg(test)]
fn stock_rocket() -> (Assembly, Catalog) {
    let catalog = Catalog::stock();
    let mut assembly = Assembly::new();
    let pod = assembly.add_part(catalog.get("pod.mk1").unwrap().clone(), Vector2::zeros());
    let tank = assembly.add_part(
        catalog.get("tank.fl-t400").unwrap().clone(),
        Vector2::new(0.0, -80.0),
    );
    let engine = assembly.add_part(
        catalog.get("engine.lv-t45").unwrap().clone(),
        Vector2::new(0.0, -170.0),
    );
    assembly.connect(pod, "bottom", tank, "top").unwrap();
    assembly.connect(tank, "bottom", engine, "top").unwrap();
    assembly.set_fuel(tank, Resource::LiquidFuel, 90.0);
    assembly.add_part(catalog.get("decoupler.td-12").unwrap().clone(), Vector2::new(300.0, 0.0));
    (assembly, catalog)
}

#[test]
fn saved_assembly_rebuilds_equivalently() {
    let (assembly, catalog) = stock_rocket();
    let saved = assembly.to_saved();
    let text = saved.to_ron_string().unwrap();
    let parsed = SavedAssembly::from_ron_str(&text).unwrap();
    assert_eq!(parsed, saved);

    let rebuilt = Assembly::from_saved(&parsed, &catalog, &EditorConfig::default()).unwrap();
    assert_eq!(rebuilt.to_saved(), saved);
    assert_eq!(rebuilt.root(), assembly.root());
    assert_eq!(rebuilt.live_parts(), assembly.live_parts());
    assert_eq!(rebuilt.total_mass(true), assembly.total_mass(true));
    assert!(dangling_parts(&saved).is_empty());
}

#[test]
fn parts_added_after_loading_get_fresh_ids() {
    let (assembly, catalog) = stock_rocket();
    let mut rebuilt =
        Assembly::from_saved(&assembly.to_saved(), &catalog, &EditorConfig::default()).unwrap();
    let id = rebuilt.add_part(catalog.get("pod.mk1").unwrap().clone(), Vector2::zeros());
    assert_eq!(id, PartId::from_raw(4));
    assert_eq!(rebuilt.part_count(), 5);
}

#[test]
fn reconstruction_rejects_inconsistent_saves() {
    let (assembly, catalog) = stock_rocket();
    let saved = assembly.to_saved();
    let editor = EditorConfig::default();

    let mut unknown = saved.clone();
    unknown.parts[0].definition = "pod.mk2".into();
    assert!(Assembly::from_saved(&unknown, &catalog, &editor).is_err());

    let mut duplicate = saved.clone();
    let first = duplicate.parts[0].clone();
    duplicate.parts.push(first);
    assert!(Assembly::from_saved(&duplicate, &catalog, &editor).is_err());

    let mut dangling_root = saved.clone();
    dangling_root.root = Some(PartId::from_raw(42));
    assert!(Assembly::from_saved(&dangling_root, &catalog, &editor).is_err());

    let mut rootless = saved.clone();
    rootless.root = None;
    assert!(Assembly::from_saved(&rootless, &catalog, &editor).is_err());

    let mut occupied = saved.clone();
    let again = occupied.connections[0].clone();
    occupied.connections.push(again);
    assert!(Assembly::from_saved(&occupied, &catalog, &editor).is_err());

    let mut missing = saved.clone();
    missing.connections[0].b.part = PartId::from_raw(42);
    assert_eq!(dangling_parts(&missing), BTreeSet::from([PartId::from_raw(42)]));
    let err = Assembly::from_saved(&missing, &catalog, &editor).unwrap_err();
    assert!(
        err.to_string().contains(&PartId::from_raw(42).to_string()),
        "{err}"
    );

    let mut overfull = saved.clone();
    overfull.parts[1].fuel.insert(Resource::LiquidFuel, 1000.0);
    assert!(Assembly::from_saved(&overfull, &catalog, &editor).is_err());

    let mut wrong_resource = saved;
    wrong_resource.parts[0]
        .fuel
        .insert(Resource::Monopropellant, 1.0);
    assert!(Assembly::from_saved(&wrong_resource, &catalog, &editor).is_err());
}

#[test]
fn empty_save_loads() {
    let assembly =
        Assembly::from_saved(&SavedAssembly::default(), &Catalog::stock(), &EditorConfig::default())
            .unwrap();
    assert_eq!(assembly.part_count(), 0);
    assert_eq!(assembly.root(), None);
}
