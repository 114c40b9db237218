//! Derivation of an ordered staging plan from decoupler placement.

use std::collections::BTreeSet;

use itertools::Itertools;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    assembly::{Assembly, PartId},
    math::rocket_equation,
};

/// The parts released together when a stage fires, and the engines and
/// tanks that are active while it is current.
#[derive(Clone, Debug, PartialEq)]
pub struct Stage {
    pub index: usize,
    /// The decoupler that jettisons this stage. `None` for the terminal
    /// stage, and for the single stage of a vehicle without decouplers.
    pub decoupler: Option<PartId>,
    pub parts: BTreeSet<PartId>,
    pub engines: BTreeSet<PartId>,
    pub fuel_tanks: BTreeSet<PartId>,
    /// Mass of the stage's own parts, resources included (t)
    pub mass: f64,
    pub cost: f64,
    /// Sea-level thrust of the stage's engines (kN)
    pub thrust: f64,
    /// Delta-v of the stage's own parts (m/s). Zero for the terminal
    /// stage of a staged vehicle.
    pub delta_v: f64,
}

impl Stage {
    fn new(
        assembly: &Assembly,
        index: usize,
        decoupler: Option<PartId>,
        parts: BTreeSet<PartId>,
        fires: bool,
    ) -> Self {
        let instances = parts
            .iter()
            .filter_map(|id| Some((*id, assembly.part(*id)?)))
            .collect::<Vec<_>>();

        let engines = instances
            .iter()
            .filter(|(_, p)| p.definition.engine().is_some())
            .map(|(id, _)| *id)
            .collect();
        let fuel_tanks = instances
            .iter()
            .filter(|(_, p)| p.definition.is_fuel_tank())
            .map(|(id, _)| *id)
            .collect();

        let mass = instances.iter().map(|(_, p)| p.mass()).sum();
        let dry_mass = instances.iter().map(|(_, p)| p.dry_mass()).sum();
        let engine_specs = instances
            .iter()
            .filter_map(|(_, p)| p.definition.engine())
            .collect::<Vec<_>>();
        let delta_v = if fires {
            rocket_equation(
                mean_isp(engine_specs.iter().map(|e| e.isp)),
                mass,
                dry_mass,
            )
        } else {
            0.0
        };

        Self {
            index,
            decoupler,
            engines,
            fuel_tanks,
            mass,
            cost: instances.iter().map(|(_, p)| p.definition.cost).sum(),
            thrust: engine_specs.iter().map(|e| e.thrust_sea_level).sum(),
            delta_v,
            parts,
        }
    }
}

/// Arithmetic mean of the given specific impulses, zero if there are
/// none.
pub fn mean_isp(isps: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = isps.fold((0.0, 0usize), |(sum, count), isp| (sum + isp, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StagingError {
    #[error("stage {stage} is the last stage, nothing left to activate")]
    NoNextStage { stage: usize },
    #[error("no flight in progress")]
    NotLaunched,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StagePlan {
    pub stages: Vec<Stage>,
}

impl StagePlan {
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Stage> {
        self.stages.get(index)
    }

    /// Index of the stage a part belongs to.
    pub fn stage_of(&self, part: PartId) -> Option<usize> {
        self.stages.iter().position(|s| s.parts.contains(&part))
    }

    /// Sum of every stage's delta-v (m/s).
    pub fn total_delta_v(&self) -> f64 {
        self.stages.iter().map(|s| s.delta_v).sum()
    }

    /// Whether the stage at `index` is modeled as firing. Only the
    /// terminal stage of a vehicle with decouplers is not.
    pub fn fires(&self, index: usize) -> bool {
        self.stages.len() == 1 || index + 1 < self.stages.len()
    }

    /// Every part still attached while `stage` is current.
    pub fn attached_from(&self, stage: usize) -> impl Iterator<Item = PartId> + '_ {
        self.stages
            .iter()
            .skip(stage)
            .flat_map(|s| s.parts.iter().copied())
    }
}

/// Partition the live part set into stages.
///
/// Decouplers fire in ascending priority. Each one releases the parts
/// below it, found by walking connections from its lower neighbours
/// without crossing the decoupler or anything released earlier, plus
/// the decoupler itself. Whatever is left once every decoupler has
/// fired forms the terminal stage.
pub fn plan_stages(assembly: &Assembly) -> StagePlan {
    let live = assembly.live_parts();

    let decouplers = live
        .iter()
        .copied()
        .filter_map(|id| {
            let spec = assembly.part(id)?.definition.decoupler()?;
            Some((id, spec.stage_priority))
        })
        .sorted_by_key(|(id, priority)| (*priority, *id))
        .map(|(id, _)| id)
        .collect::<Vec<_>>();

    if decouplers.is_empty() {
        debug!(parts = live.len(), "no decouplers, single stage");
        return StagePlan {
            stages: vec![Stage::new(assembly, 0, None, live, true)],
        };
    }

    let mut released = BTreeSet::new();
    let mut stages = vec![];

    for decoupler in decouplers {
        if released.contains(&decoupler) {
            debug!(%decoupler, "decoupler already released by an earlier stage");
            continue;
        }
        let Some(position) = assembly.part(decoupler).map(|p| p.position) else {
            continue;
        };

        let mut blocked = released.clone();
        blocked.insert(decoupler);

        let mut lower = BTreeSet::new();
        for (_, neighbor) in assembly.neighbors(decoupler) {
            let Some(part) = assembly.part(neighbor) else {
                continue;
            };
            if part.position.y >= position.y {
                continue;
            }
            lower.extend(assembly.traverse_until(neighbor, &blocked));
        }

        let mut parts = lower
            .intersection(&live)
            .copied()
            .collect::<BTreeSet<_>>();
        parts.insert(decoupler);

        if assembly.root().is_some_and(|root| parts.contains(&root)) {
            warn!(%decoupler, "decoupler releases the root part");
        }

        debug!(
            %decoupler,
            stage = stages.len(),
            parts = parts.len(),
            "planned stage"
        );
        released.extend(parts.iter().copied());
        let index = stages.len();
        stages.push(Stage::new(assembly, index, Some(decoupler), parts, true));
    }

    let remaining = live.difference(&released).copied().collect();
    let index = stages.len();
    stages.push(Stage::new(assembly, index, None, remaining, false));

    StagePlan { stages }
}

#[cfg(test)]
use {
    crate::{
        arena::IdLike,
        assembly::fixtures::{decoupler, engine, pod, stack, tank},
    },
    nalgebra::Vector2,
};

#[cfg(test)]
fn assert_partition(plan: &StagePlan, live: &BTreeSet<PartId>) {
    let mut union = BTreeSet::new();
    for stage in &plan.stages {
        for part in &stage.parts {
            assert!(union.insert(*part), "{part} appears in two stages");
        }
    }
    assert_eq!(&union, live);
}

#[test]
fn no_decouplers_yields_one_stage() {
    let (mut assembly, ids) = stack(&[pod(), tank(400.0, 1.0), engine(200.0, 220.0, 8.0, 2.0)]);
    let stray = assembly.add_part(tank(100.0, 1.0), Vector2::new(300.0, 0.0));

    let plan = plan_stages(&assembly);
    assert_eq!(plan.len(), 1);
    let stage = &plan.stages[0];
    assert_eq!(stage.parts, ids.iter().copied().collect());
    assert!(!stage.parts.contains(&stray));
    assert_eq!(stage.decoupler, None);
    assert_eq!(stage.engines, BTreeSet::from([ids[2]]));
    assert_eq!(stage.fuel_tanks, BTreeSet::from([ids[1]]));
    assert!(stage.delta_v > 0.0);
    assert_eq!(stage.thrust, 200.0);
}

#[test]
fn decoupler_splits_upper_and_lower_stages() {
    let (assembly, ids) = stack(&[
        pod(),
        tank(100.0, 0.5),
        engine(60.0, 70.0, 2.0, 1.0),
        decoupler(0),
        tank(400.0, 1.0),
        engine(200.0, 220.0, 8.0, 2.0),
    ]);

    let plan = plan_stages(&assembly);
    assert_eq!(plan.len(), 2);
    assert_partition(&plan, &assembly.live_parts());

    let bottom = &plan.stages[0];
    assert_eq!(bottom.decoupler, Some(ids[3]));
    assert_eq!(bottom.parts, BTreeSet::from([ids[3], ids[4], ids[5]]));
    assert_eq!(bottom.engines, BTreeSet::from([ids[5]]));
    assert_eq!(bottom.fuel_tanks, BTreeSet::from([ids[4]]));
    assert!(bottom.delta_v > 0.0);

    let top = &plan.stages[1];
    assert_eq!(top.decoupler, None);
    assert_eq!(top.parts, BTreeSet::from([ids[0], ids[1], ids[2]]));
    assert_eq!(top.engines, BTreeSet::from([ids[2]]));
    assert_eq!(top.delta_v, 0.0);
    assert_eq!(plan.stage_of(ids[1]), Some(1));
}

#[test]
fn decouplers_fire_in_priority_order() {
    let (assembly, ids) = stack(&[
        pod(),
        decoupler(5),
        tank(100.0, 0.5),
        engine(60.0, 70.0, 2.0, 1.0),
        decoupler(1),
        tank(400.0, 1.0),
        engine(200.0, 220.0, 8.0, 2.0),
    ]);

    let plan = plan_stages(&assembly);
    assert_eq!(plan.len(), 3);
    assert_partition(&plan, &assembly.live_parts());
    assert_eq!(plan.stages[0].decoupler, Some(ids[4]));
    assert_eq!(plan.stages[0].parts, BTreeSet::from([ids[4], ids[5], ids[6]]));
    assert_eq!(plan.stages[1].decoupler, Some(ids[1]));
    assert_eq!(plan.stages[1].parts, BTreeSet::from([ids[1], ids[2], ids[3]]));
    assert_eq!(plan.stages[2].parts, BTreeSet::from([ids[0]]));
}

#[test]
fn inverted_priorities_still_partition() {
    // The upper decoupler fires first and takes the lower one with it.
    let (assembly, ids) = stack(&[
        pod(),
        decoupler(0),
        tank(100.0, 0.5),
        decoupler(1),
        engine(200.0, 220.0, 8.0, 2.0),
    ]);

    let plan = plan_stages(&assembly);
    assert_eq!(plan.len(), 2);
    assert_partition(&plan, &assembly.live_parts());
    assert_eq!(plan.stages[0].parts, BTreeSet::from([ids[1], ids[2], ids[3], ids[4]]));
}

#[test]
fn random_assemblies_partition_the_live_set() {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..200 {
        let len = rng.gen_range(1..12);
        let mut defs = vec![pod()];
        for _ in 0..len {
            defs.push(match rng.gen_range(0..3) {
                0 => tank(rng.gen_range(10.0..500.0), 0.5),
                1 => engine(100.0, 120.0, 4.0, 1.0),
                _ => decoupler(rng.gen_range(-3..4)),
            });
        }
        let (mut assembly, ids) = stack(&defs);
        for _ in 0..rng.gen_range(0..3) {
            assembly.add_part(decoupler(0), Vector2::new(500.0, 0.0));
        }
        if len > 2 && rng.gen_bool(0.3) {
            let cut = assembly.part(ids[len / 2]).unwrap().connections[0];
            assembly.disconnect(cut);
        }

        let live = assembly.live_parts();
        let plan = plan_stages(&assembly);
        assert!(!plan.is_empty());
        assert_partition(&plan, &live);

        let has_decoupler = live
            .iter()
            .any(|id| assembly.part(*id).unwrap().definition.decoupler().is_some());
        if !has_decoupler {
            assert_eq!(plan.len(), 1);
            assert_eq!(plan.stages[0].parts, live);
        }
    }
}

#[test]
fn empty_assembly_plans_one_empty_stage() {
    let plan = plan_stages(&Assembly::new());
    assert_eq!(plan.len(), 1);
    assert!(plan.stages[0].parts.is_empty());
    assert_eq!(plan.stage_of(PartId::from_raw(0)), None);
}
