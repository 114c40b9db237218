//! Two-dimensional ascent and descent simulation over a stage plan.
//!
//! [`tick`] is a pure function from one [`FlightState`] to the next.
//! [`FlightSimulator`] owns the assembly and the plan, applies pilot
//! commands, and collects the events each tick produces. Driving it
//! from a timer is left to the caller.

use std::collections::BTreeMap;

use color_eyre::eyre::{self, ensure};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::{
    assembly::{Assembly, PartId},
    atmosphere::Atmosphere,
    catalog::{resource_mass, EngineSpec, PartKind, Resource, ResourceAmounts},
    config::SimConfig,
    math::rocket_equation,
    staging::{mean_isp, plan_stages, Stage, StagePlan, StagingError},
};

/// Amounts at or below this are treated as empty.
pub const FUEL_EPSILON: f64 = 1e-6;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum FlightStatus {
    Idle,
    Flying,
    Landed,
    Crashed,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum FlightEvent {
    LiftOff {
        time: f64,
    },
    StageActivated {
        from: usize,
        to: usize,
        /// The decoupler fired to release stage `from`.
        decoupler: Option<PartId>,
    },
    AutoStageScheduled {
        stage: usize,
        delay: f64,
    },
    /// Auto-staging found the current stage spent with nothing after it.
    StagingUnavailable {
        stage: usize,
    },
    ParachutesDeployed {
        count: usize,
    },
    Landed {
        time: f64,
        speed: f64,
    },
    Crashed {
        time: f64,
        speed: f64,
    },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AutoStage {
    /// Seconds left before the pending activation.
    pub countdown: Option<f64>,
    /// Stage for which activation was already attempted and refused.
    pub refused: Option<usize>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FlightState {
    pub status: FlightStatus,
    pub stage: usize,
    /// Mission elapsed time (s)
    pub time: f64,
    /// Height above ground (m)
    pub altitude: f64,
    /// Horizontal displacement from the pad (m)
    pub horizontal_position: f64,
    /// (m/s)
    pub vertical_velocity: f64,
    /// (m/s)
    pub horizontal_velocity: f64,
    /// (m/s^2)
    pub vertical_acceleration: f64,
    /// (m/s^2)
    pub horizontal_acceleration: f64,
    /// Mass of every part still attached (t)
    pub mass: f64,
    /// Thrust produced during the last tick (kN)
    pub thrust: f64,
    pub throttle: f64,
    /// Lean from vertical, positive to the right (rad)
    pub steering: f64,
    pub parachutes_deployed: bool,
    pub max_altitude: f64,
    /// Resource levels of every planned part, by part.
    pub fuel: BTreeMap<PartId, ResourceAmounts>,
    pub auto_stage: AutoStage,
}

impl FlightState {
    /// State of a vehicle sitting on the pad, all kinematics zeroed.
    pub fn launch(assembly: &Assembly, plan: &StagePlan) -> Self {
        let fuel = plan
            .attached_from(0)
            .filter_map(|id| Some((id, assembly.part(id)?.fuel.clone())))
            .collect::<BTreeMap<_, _>>();
        let mut state = Self {
            status: FlightStatus::Flying,
            stage: 0,
            time: 0.0,
            altitude: 0.0,
            horizontal_position: 0.0,
            vertical_velocity: 0.0,
            horizontal_velocity: 0.0,
            vertical_acceleration: 0.0,
            horizontal_acceleration: 0.0,
            mass: 0.0,
            thrust: 0.0,
            throttle: 0.0,
            steering: 0.0,
            parachutes_deployed: false,
            max_altitude: 0.0,
            fuel,
            auto_stage: AutoStage::default(),
        };
        state.mass = vehicle_mass(&state, assembly, plan);
        state
    }

    pub fn fuel_of(&self, part: PartId, resource: Resource) -> f64 {
        self.fuel
            .get(&part)
            .and_then(|f| f.get(&resource))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Result of one tick.
#[derive(Clone, Debug)]
pub struct Tick {
    pub state: FlightState,
    pub events: Vec<FlightEvent>,
}

fn vehicle_mass(state: &FlightState, assembly: &Assembly, plan: &StagePlan) -> f64 {
    plan.attached_from(state.stage)
        .filter_map(|id| {
            let part = assembly.part(id)?;
            let fuel = state.fuel.get(&id).map_or(0.0, resource_mass);
            Some(part.dry_mass() + fuel)
        })
        .sum()
}

fn available(
    state: &FlightState,
    stage: &Stage,
    engine: PartId,
    spec: &EngineSpec,
    resource: Resource,
) -> f64 {
    if spec.internal_fuel.contains_key(&resource) {
        state.fuel_of(engine, resource)
    } else {
        stage
            .fuel_tanks
            .iter()
            .map(|tank| state.fuel_of(*tank, resource))
            .sum()
    }
}

fn has_fuel(state: &FlightState, stage: &Stage, engine: PartId, spec: &EngineSpec) -> bool {
    spec.consumption
        .keys()
        .all(|res| available(state, stage, engine, spec, *res) > FUEL_EPSILON)
}

fn stage_engines<'a>(
    assembly: &'a Assembly,
    stage: &'a Stage,
) -> impl Iterator<Item = (PartId, &'a EngineSpec)> + 'a {
    stage
        .engines
        .iter()
        .filter_map(|id| Some((*id, assembly.part(*id)?.definition.engine()?)))
}

/// Burn `throttle * dt` seconds worth of every resource the engine
/// uses. Internal stores are drawn directly; everything else comes
/// from the stage's tanks, each giving up its share of the stage's
/// remaining total.
fn draw(
    fuel: &mut BTreeMap<PartId, ResourceAmounts>,
    stage: &Stage,
    engine: PartId,
    spec: &EngineSpec,
    throttle: f64,
    dt: f64,
) {
    for (resource, rate) in &spec.consumption {
        let amount = rate * throttle * dt;

        if spec.internal_fuel.contains_key(resource) {
            if let Some(level) = fuel.get_mut(&engine).and_then(|f| f.get_mut(resource)) {
                *level = (*level - amount).max(0.0);
            }
            continue;
        }

        let total = stage
            .fuel_tanks
            .iter()
            .filter_map(|tank| fuel.get(tank)?.get(resource))
            .sum::<f64>();
        if total <= 0.0 {
            continue;
        }
        for tank in &stage.fuel_tanks {
            if let Some(level) = fuel.get_mut(tank).and_then(|f| f.get_mut(resource)) {
                let share = *level / total;
                *level = (*level - amount * share).max(0.0);
            }
        }
    }
}

/// Quadratic drag opposing `velocity` (kN).
fn drag(density: f64, velocity: f64, coefficient: f64, area: f64) -> f64 {
    -velocity.signum() * 0.5 * density * velocity * velocity * coefficient * area / 1000.0
}

fn drag_area(state: &FlightState, assembly: &Assembly, plan: &StagePlan, config: &SimConfig) -> f64 {
    let chutes = if state.parachutes_deployed {
        plan.attached_from(state.stage)
            .filter_map(|id| match &assembly.part(id)?.definition.kind {
                PartKind::Parachute(chute) => Some(chute.drag_area),
                _ => None,
            })
            .sum()
    } else {
        0.0
    };
    config.reference_area + chutes
}

/// Whether touching down at `speed` is survivable. Inclusive.
pub fn touchdown(speed: f64, safe_landing_speed: f64) -> FlightStatus {
    if speed <= safe_landing_speed {
        FlightStatus::Landed
    } else {
        FlightStatus::Crashed
    }
}

/// Move to the next stage, releasing the current one.
pub fn advance_stage(
    state: &mut FlightState,
    assembly: &Assembly,
    plan: &StagePlan,
) -> Result<FlightEvent, StagingError> {
    let from = state.stage;
    if from + 1 >= plan.len() {
        return Err(StagingError::NoNextStage { stage: from });
    }
    let decoupler = plan.stages[from].decoupler;
    state.stage = from + 1;
    state.auto_stage = AutoStage::default();
    state.mass = vehicle_mass(state, assembly, plan);
    info!(from, to = state.stage, ?decoupler, mass = state.mass, "stage activated");
    Ok(FlightEvent::StageActivated {
        from,
        to: state.stage,
        decoupler,
    })
}

/// Advance the flight by one `config.dt`. A crashed vehicle is
/// returned unchanged.
pub fn tick(state: &FlightState, assembly: &Assembly, plan: &StagePlan, config: &SimConfig) -> Tick {
    let mut next = state.clone();
    let mut events = vec![];
    let Some(stage) = plan.get(state.stage) else {
        return Tick { state: next, events };
    };
    if state.status == FlightStatus::Crashed {
        return Tick { state: next, events };
    }

    let dt = config.dt;
    let atmosphere = Atmosphere::new(&config.atmosphere);
    let pressure = atmosphere.pressure(state.altitude);
    let density = atmosphere.density(state.altitude);

    let active = stage_engines(assembly, stage)
        .filter(|(id, spec)| has_fuel(state, stage, *id, spec))
        .collect::<Vec<_>>();
    let thrust = active
        .iter()
        .map(|(_, spec)| spec.thrust_at(pressure) * state.throttle)
        .sum::<f64>();
    next.thrust = thrust;

    let vertical_thrust = thrust * libm::cos(state.steering);
    let horizontal_thrust = thrust * libm::sin(state.steering);
    let weight = state.mass * config.gravity;

    if state.status == FlightStatus::Landed && vertical_thrust > weight {
        info!(time = state.time, "lift off");
        next.status = FlightStatus::Flying;
        events.push(FlightEvent::LiftOff { time: state.time });
    }

    if next.status == FlightStatus::Flying && state.mass > 0.0 {
        let area = drag_area(state, assembly, plan, config);
        let drag_y = drag(density, state.vertical_velocity, config.drag_coefficient, area);
        let drag_x = drag(density, state.horizontal_velocity, config.drag_coefficient, area);

        next.vertical_acceleration = (vertical_thrust + drag_y - weight) / state.mass;
        next.horizontal_acceleration = (horizontal_thrust + drag_x) / state.mass;
        next.vertical_velocity += next.vertical_acceleration * dt;
        next.horizontal_velocity += next.horizontal_acceleration * dt;
        next.altitude += next.vertical_velocity * dt;
        next.horizontal_position += next.horizontal_velocity * dt;

        if next.altitude <= 0.0 && next.vertical_velocity <= 0.0 {
            let speed = next.vertical_velocity.abs();
            next.altitude = 0.0;
            next.status = touchdown(speed, config.safe_landing_speed);
            next.vertical_velocity = 0.0;
            next.horizontal_velocity = 0.0;
            next.vertical_acceleration = 0.0;
            next.horizontal_acceleration = 0.0;
            let time = state.time + dt;
            if next.status == FlightStatus::Crashed {
                info!(time, speed, "crashed");
                events.push(FlightEvent::Crashed { time, speed });
                next.time = time;
                return Tick { state: next, events };
            }
            if state.status == FlightStatus::Flying && state.altitude > 0.0 {
                info!(time, speed, "landed");
                events.push(FlightEvent::Landed { time, speed });
            }
        }
    } else {
        next.vertical_velocity = 0.0;
        next.horizontal_velocity = 0.0;
        next.vertical_acceleration = 0.0;
        next.horizontal_acceleration = 0.0;
    }

    if state.throttle > 0.0 {
        for (id, spec) in &active {
            draw(&mut next.fuel, stage, *id, spec, state.throttle, dt);
        }
    }

    next.time = state.time + dt;
    next.max_altitude = next.max_altitude.max(next.altitude);
    next.mass = vehicle_mass(&next, assembly, plan);

    let spent = stage_engines(assembly, stage).all(|(id, spec)| !has_fuel(&next, stage, id, spec));
    if !spent {
        next.auto_stage.countdown = None;
    } else if let Some(countdown) = next.auto_stage.countdown {
        let countdown = countdown - dt;
        if countdown > 0.0 {
            next.auto_stage.countdown = Some(countdown);
        } else {
            next.auto_stage.countdown = None;
            match advance_stage(&mut next, assembly, plan) {
                Ok(event) => events.push(event),
                Err(e) => {
                    warn!(stage = next.stage, "auto-staging: {e}");
                    next.auto_stage.refused = Some(next.stage);
                    events.push(FlightEvent::StagingUnavailable { stage: next.stage });
                }
            }
        }
    } else if next.auto_stage.refused != Some(next.stage) {
        debug!(stage = next.stage, delay = config.auto_stage_delay, "stage spent, scheduling");
        next.auto_stage.countdown = Some(config.auto_stage_delay);
        events.push(FlightEvent::AutoStageScheduled {
            stage: next.stage,
            delay: config.auto_stage_delay,
        });
    }

    trace!(
        time = next.time,
        altitude = next.altitude,
        vy = next.vertical_velocity,
        vx = next.horizontal_velocity,
        mass = next.mass,
        thrust,
        "tick"
    );

    Tick { state: next, events }
}

/// Snapshot of a flight for display.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Telemetry {
    pub status: FlightStatus,
    pub time: f64,
    pub altitude: f64,
    pub max_altitude: f64,
    pub horizontal_position: f64,
    pub vertical_velocity: f64,
    pub horizontal_velocity: f64,
    pub vertical_acceleration: f64,
    pub horizontal_acceleration: f64,
    pub mass: f64,
    pub thrust: f64,
    pub throttle: f64,
    /// (deg)
    pub steering: f64,
    pub stage: usize,
    pub stage_count: usize,
    /// Delta-v left in the current and later stages at current fuel
    /// levels (m/s)
    pub remaining_delta_v: f64,
    /// Resources left in the current stage only.
    pub stage_fuel: ResourceAmounts,
    pub landed: bool,
    pub crashed: bool,
}

fn remaining_delta_v(state: &FlightState, assembly: &Assembly, plan: &StagePlan) -> f64 {
    plan.stages
        .iter()
        .enumerate()
        .skip(state.stage)
        .filter(|(index, _)| plan.fires(*index))
        .map(|(_, stage)| {
            let parts = stage
                .parts
                .iter()
                .filter_map(|id| Some((*id, assembly.part(*id)?)))
                .collect::<Vec<_>>();
            let dry = parts.iter().map(|(_, p)| p.dry_mass()).sum::<f64>();
            let fuel = parts
                .iter()
                .filter_map(|(id, _)| state.fuel.get(id))
                .map(resource_mass)
                .sum::<f64>();
            let isp = mean_isp(stage_engines(assembly, stage).map(|(_, e)| e.isp));
            rocket_equation(isp, dry + fuel, dry)
        })
        .sum()
}

fn stage_fuel(state: &FlightState, stage: &Stage) -> ResourceAmounts {
    let mut total = ResourceAmounts::new();
    for fuel in stage.parts.iter().filter_map(|id| state.fuel.get(id)) {
        for (resource, amount) in fuel {
            *total.entry(*resource).or_default() += amount;
        }
    }
    total
}

/// Owns an assembly for the duration of its flights.
#[derive(Debug)]
pub struct FlightSimulator {
    assembly: Assembly,
    config: SimConfig,
    plan: StagePlan,
    state: Option<FlightState>,
    events: Vec<FlightEvent>,
}

impl FlightSimulator {
    pub fn new(assembly: Assembly, config: SimConfig) -> Self {
        Self {
            assembly,
            config,
            plan: StagePlan::default(),
            state: None,
            events: vec![],
        }
    }

    pub fn assembly(&self) -> &Assembly {
        &self.assembly
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn plan(&self) -> &StagePlan {
        &self.plan
    }

    pub fn state(&self) -> Option<&FlightState> {
        self.state.as_ref()
    }

    pub fn status(&self) -> FlightStatus {
        self.state
            .as_ref()
            .map_or(FlightStatus::Idle, |state| state.status)
    }

    /// Plan the stages and put the vehicle on the pad. Any flight in
    /// progress is discarded.
    pub fn start(&mut self) -> eyre::Result<()> {
        let plan = plan_stages(&self.assembly);
        ensure!(
            plan.attached_from(0).next().is_some(),
            "cannot launch an assembly with no live parts"
        );
        let state = FlightState::launch(&self.assembly, &plan);
        info!(stages = plan.len(), mass = state.mass, "launch");
        self.plan = plan;
        self.state = Some(state);
        self.events.clear();
        Ok(())
    }

    /// Discard the flight.
    pub fn stop(&mut self) {
        if self.state.take().is_some() {
            debug!("flight stopped");
        }
        self.events.clear();
    }

    /// Run one tick. Returns false once there is nothing left to
    /// simulate: before launch, and after a crash.
    pub fn step(&mut self) -> bool {
        let Some(state) = &self.state else {
            return false;
        };
        if state.status == FlightStatus::Crashed {
            return false;
        }
        let Tick { state, events } = tick(state, &self.assembly, &self.plan, &self.config);
        let running = state.status != FlightStatus::Crashed;
        self.events.extend(events);
        self.state = Some(state);
        running
    }

    /// Commands before launch or after a stop are ignored.
    pub fn set_throttle(&mut self, throttle: f64) {
        if let Some(state) = &mut self.state {
            state.throttle = throttle.clamp(0.0, 1.0);
        }
    }

    pub fn adjust_throttle(&mut self, delta: f64) {
        if let Some(throttle) = self.state.as_ref().map(|s| s.throttle) {
            self.set_throttle(throttle + delta);
        }
    }

    /// Lean from vertical in degrees, clamped to the configured limit.
    pub fn set_steering(&mut self, degrees: f64) {
        let limit = self.config.max_steering_deg.abs();
        if let Some(state) = &mut self.state {
            state.steering = degrees.clamp(-limit, limit).to_radians();
        }
    }

    pub fn activate_next_stage(&mut self) -> Result<usize, StagingError> {
        let state = self.state.as_mut().ok_or(StagingError::NotLaunched)?;
        let event = advance_stage(state, &self.assembly, &self.plan)?;
        let stage = state.stage;
        self.events.push(event);
        Ok(stage)
    }

    /// Deploy every parachute still attached. Returns how many there
    /// are.
    pub fn deploy_parachutes(&mut self) -> usize {
        let Some(state) = &mut self.state else {
            return 0;
        };
        if state.parachutes_deployed {
            return 0;
        }
        let count = self
            .plan
            .attached_from(state.stage)
            .filter(|id| {
                self.assembly
                    .part(*id)
                    .is_some_and(|p| matches!(p.definition.kind, PartKind::Parachute(_)))
            })
            .count();
        state.parachutes_deployed = true;
        info!(count, "parachutes deployed");
        self.events.push(FlightEvent::ParachutesDeployed { count });
        count
    }

    pub fn telemetry(&self) -> Option<Telemetry> {
        let state = self.state.as_ref()?;
        let stage_fuel = self
            .plan
            .get(state.stage)
            .map(|stage| stage_fuel(state, stage))
            .unwrap_or_default();
        Some(Telemetry {
            status: state.status,
            time: state.time,
            altitude: state.altitude,
            max_altitude: state.max_altitude,
            horizontal_position: state.horizontal_position,
            vertical_velocity: state.vertical_velocity,
            horizontal_velocity: state.horizontal_velocity,
            vertical_acceleration: state.vertical_acceleration,
            horizontal_acceleration: state.horizontal_acceleration,
            mass: state.mass,
            thrust: state.thrust,
            throttle: state.throttle,
            steering: state.steering.to_degrees(),
            stage: state.stage,
            stage_count: self.plan.len(),
            remaining_delta_v: remaining_delta_v(state, &self.assembly, &self.plan),
            stage_fuel,
            landed: state.status == FlightStatus::Landed,
            crashed: state.status == FlightStatus::Crashed,
        })
    }

    /// Take the events produced since the last call.
    pub fn drain_events(&mut self) -> Vec<FlightEvent> {
        std::mem::take(&mut self.events)
    }

    /// Copy flight resource levels back onto the assembly's parts.
    pub fn write_back_fuel(&mut self) {
        let Some(state) = &self.state else {
            return;
        };
        for (id, fuel) in &state.fuel {
            for (resource, amount) in fuel {
                self.assembly.set_fuel(*id, *resource, *amount);
            }
        }
    }

    pub fn into_assembly(self) -> Assembly {
        self.assembly
    }
}

#[cfg(test)]
use {
    crate::{
        assembly::fixtures::{decoupler, engine, pod, point, stack, tank},
        catalog::{ParachuteSpec, PartDefinition},
        config::AtmosphereConfig,
    },
    nalgebra::Vector2,
    std::sync::Arc,
};

#[cfg(test)]
fn launched(assembly: Assembly, config: SimConfig) -> FlightSimulator {
    let mut sim = FlightSimulator::new(assembly, config);
    sim.start().unwrap();
    sim
}

#[test]
fn zero_throttle_stays_on_the_ground() {
    let (assembly, _) = stack(&[pod(), tank(400.0, 1.0), engine(200.0, 220.0, 8.0, 4.0)]);
    let mut sim = launched(assembly, SimConfig::default());
    for _ in 0..500 {
        assert!(sim.step());
        assert_eq!(sim.state().unwrap().altitude, 0.0);
    }
    assert_eq!(sim.status(), FlightStatus::Landed);
}

#[test]
fn positive_twr_climbs_every_tick() {
    let (assembly, _) = stack(&[tank(100.0, 1.0), engine(200.0, 220.0, 1e-6, 4.0)]);
    let mut sim = launched(assembly, SimConfig::default());
    sim.set_throttle(1.0);

    let mut last = 0.0;
    for _ in 0..1000 {
        sim.step();
        let altitude = sim.state().unwrap().altitude;
        assert!(altitude > last, "altitude {altitude} did not exceed {last}");
        last = altitude;
    }
    assert_eq!(sim.status(), FlightStatus::Flying);
}

#[test]
fn touchdown_boundary_is_inclusive() {
    assert_eq!(touchdown(10.0, 10.0), FlightStatus::Landed);
    assert_eq!(touchdown(10.000_001, 10.0), FlightStatus::Crashed);

    let config = SimConfig {
        gravity: 0.0,
        atmosphere: AtmosphereConfig {
            sea_level_density: 0.0,
            ..AtmosphereConfig::default()
        },
        ..SimConfig::default()
    };
    let (assembly, _) = stack(&[pod()]);
    let plan = plan_stages(&assembly);

    for (speed, expected) in [(10.0, FlightStatus::Landed), (10.5, FlightStatus::Crashed)] {
        let mut state = FlightState::launch(&assembly, &plan);
        state.altitude = 0.1;
        state.vertical_velocity = -speed;
        let Tick { state, events } = tick(&state, &assembly, &plan, &config);
        assert_eq!(state.status, expected);
        assert_eq!(state.altitude, 0.0);
        assert_eq!(state.vertical_velocity, 0.0);
        assert!(events.iter().any(|e| matches!(
            e,
            FlightEvent::Landed { .. } | FlightEvent::Crashed { .. }
        )));
    }
}

#[test]
fn crash_is_terminal() {
    let (assembly, _) = stack(&[pod()]);
    let mut sim = launched(assembly, SimConfig::default());
    let mut state = sim.state().unwrap().clone();
    state.altitude = 1.0;
    state.vertical_velocity = -100.0;
    sim.state = Some(state);

    assert!(!sim.step());
    assert_eq!(sim.status(), FlightStatus::Crashed);
    let frozen = sim.state().unwrap().clone();
    assert!(!sim.step());
    assert_eq!(sim.state().unwrap(), &frozen);
    assert!(sim.telemetry().unwrap().crashed);
    assert!(sim
        .drain_events()
        .iter()
        .any(|e| matches!(e, FlightEvent::Crashed { .. })));
}

#[test]
fn single_stage_burns_out_and_cannot_stage() {
    let (assembly, ids) = stack(&[tank(400.0, 1.0), engine(200.0, 220.0, 8.0, 4.0)]);
    let mut sim = launched(assembly, SimConfig::default());
    sim.set_throttle(1.0);

    let initial_mass = sim.state().unwrap().mass;
    assert!((initial_mass - (5.0 + 400.0 * Resource::LiquidFuel.density())).abs() < 1e-9);

    for _ in 0..2490 {
        sim.step();
    }
    assert!(sim.state().unwrap().fuel_of(ids[0], Resource::LiquidFuel) > 1.0);
    assert!(sim.telemetry().unwrap().thrust > 0.0);

    for _ in 0..110 {
        sim.step();
    }
    let telemetry = sim.telemetry().unwrap();
    assert!(sim.state().unwrap().fuel_of(ids[0], Resource::LiquidFuel) <= FUEL_EPSILON);
    assert_eq!(telemetry.stage, 0);
    assert_eq!(telemetry.thrust, 0.0);
    assert!((telemetry.mass - 5.0).abs() < 1e-6);
    assert_eq!(sim.activate_next_stage(), Err(StagingError::NoNextStage { stage: 0 }));

    let events = sim.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, FlightEvent::AutoStageScheduled { stage: 0, .. })));
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, FlightEvent::StagingUnavailable { stage: 0 }))
            .count(),
        1
    );
}

#[test]
fn upper_tanks_untouched_until_staged() {
    let config = SimConfig {
        auto_stage_delay: 1e9,
        ..SimConfig::default()
    };
    let (assembly, ids) = stack(&[
        pod(),
        tank(100.0, 0.5),
        engine(60.0, 70.0, 2.0, 1.0),
        decoupler(0),
        tank(40.0, 1.0),
        engine(200.0, 220.0, 8.0, 2.0),
    ]);
    let (upper_tank, lower_tank) = (ids[1], ids[4]);
    let mut sim = launched(assembly, config);
    sim.set_throttle(1.0);

    for _ in 0..300 {
        sim.step();
        assert_eq!(sim.state().unwrap().fuel_of(upper_tank, Resource::LiquidFuel), 100.0);
    }
    assert!(sim.state().unwrap().fuel_of(lower_tank, Resource::LiquidFuel) <= FUEL_EPSILON);
    assert_eq!(sim.state().unwrap().stage, 0);
    assert_eq!(sim.telemetry().unwrap().thrust, 0.0);

    let before = sim.state().unwrap().mass;
    assert_eq!(sim.activate_next_stage(), Ok(1));
    assert!(sim.state().unwrap().mass < before);
    assert!(sim.drain_events().contains(&FlightEvent::StageActivated {
        from: 0,
        to: 1,
        decoupler: Some(ids[3]),
    }));

    for _ in 0..10 {
        sim.step();
    }
    assert!(sim.state().unwrap().fuel_of(upper_tank, Resource::LiquidFuel) < 100.0);
    assert!(sim.state().unwrap().fuel_of(lower_tank, Resource::LiquidFuel) <= FUEL_EPSILON);
    assert_eq!(sim.activate_next_stage(), Err(StagingError::NoNextStage { stage: 1 }));
}

#[test]
fn auto_staging_fires_the_decoupler() {
    let (assembly, ids) = stack(&[
        pod(),
        tank(100.0, 0.5),
        engine(60.0, 70.0, 2.0, 1.0),
        decoupler(0),
        tank(40.0, 1.0),
        engine(200.0, 220.0, 8.0, 2.0),
    ]);
    let mut sim = launched(assembly, SimConfig::default());
    sim.set_throttle(1.0);

    for _ in 0..300 {
        sim.step();
    }
    assert_eq!(sim.state().unwrap().stage, 1);
    let events = sim.drain_events();
    assert!(events.contains(&FlightEvent::StageActivated {
        from: 0,
        to: 1,
        decoupler: Some(ids[3]),
    }));
    let telemetry = sim.telemetry().unwrap();
    assert_eq!(telemetry.stage_fuel.len(), 1);
    assert!(telemetry.stage_fuel[&Resource::LiquidFuel] < 100.0);
}

#[test]
fn landed_vehicle_lifts_off_again() {
    let (assembly, _) = stack(&[tank(400.0, 1.0), engine(200.0, 220.0, 8.0, 4.0)]);
    let mut sim = launched(assembly, SimConfig::default());
    for _ in 0..5 {
        sim.step();
    }
    assert_eq!(sim.status(), FlightStatus::Landed);

    sim.set_throttle(1.0);
    sim.step();
    assert_eq!(sim.status(), FlightStatus::Flying);
    assert!(sim.state().unwrap().altitude > 0.0);
    assert!(sim
        .drain_events()
        .iter()
        .any(|e| matches!(e, FlightEvent::LiftOff { .. })));
}

#[test]
fn steering_is_clamped_and_pushes_sideways() {
    let (assembly, _) = stack(&[tank(100.0, 1.0), engine(200.0, 220.0, 1e-6, 4.0)]);
    let mut sim = launched(assembly, SimConfig::default());
    sim.set_throttle(1.0);
    sim.set_steering(90.0);
    assert!((sim.telemetry().unwrap().steering - 45.0).abs() < 1e-9);

    for _ in 0..100 {
        sim.step();
    }
    let telemetry = sim.telemetry().unwrap();
    assert!(telemetry.horizontal_position > 0.0);
    assert!(telemetry.altitude > 0.0);

    sim.set_steering(-90.0);
    assert!((sim.telemetry().unwrap().steering + 45.0).abs() < 1e-9);
}

#[test]
fn parachutes_slow_the_descent() {
    let chute = Arc::new(PartDefinition {
        id: "test.chute".into(),
        name: "Chute".into(),
        kind: PartKind::Parachute(ParachuteSpec { drag_area: 80.0 }),
        dry_mass: 0.1,
        cost: 1.0,
        size: Vector2::new(10.0, 10.0),
        attachment_points: vec![point("bottom", 0.0, -5.0, 1.0)],
    });
    let (assembly, _) = stack(&[chute, pod()]);

    let fall = |deploy: bool| {
        let mut sim = launched(assembly.clone(), SimConfig::default());
        let mut state = sim.state().unwrap().clone();
        state.altitude = 2000.0;
        sim.state = Some(state);
        if deploy {
            assert_eq!(sim.deploy_parachutes(), 1);
            assert_eq!(sim.deploy_parachutes(), 0);
        }
        for _ in 0..500 {
            sim.step();
        }
        sim.state().unwrap().vertical_velocity
    };

    let free = fall(false);
    let braked = fall(true);
    assert!(free < 0.0 && braked < 0.0);
    assert!(braked.abs() < free.abs() / 2.0);
}

#[test]
fn commands_before_launch_are_ignored() {
    let (assembly, _) = stack(&[pod()]);
    let mut sim = FlightSimulator::new(assembly, SimConfig::default());
    sim.set_throttle(1.0);
    assert!(!sim.step());
    assert_eq!(sim.status(), FlightStatus::Idle);
    assert!(sim.telemetry().is_none());
    assert_eq!(sim.activate_next_stage(), Err(StagingError::NotLaunched));

    sim.start().unwrap();
    assert_eq!(sim.state().unwrap().throttle, 0.0);
    sim.adjust_throttle(0.3);
    sim.adjust_throttle(0.9);
    assert_eq!(sim.state().unwrap().throttle, 1.0);
    sim.stop();
    assert_eq!(sim.status(), FlightStatus::Idle);
}

#[test]
fn empty_assembly_cannot_launch() {
    let mut sim = FlightSimulator::new(Assembly::new(), SimConfig::default());
    assert!(sim.start().is_err());
}

#[test]
fn fuel_is_written_back() {
    let (assembly, ids) = stack(&[tank(400.0, 1.0), engine(200.0, 220.0, 8.0, 4.0)]);
    let mut sim = launched(assembly, SimConfig::default());
    sim.set_throttle(1.0);
    for _ in 0..50 {
        sim.step();
    }
    let left = sim.state().unwrap().fuel_of(ids[0], Resource::LiquidFuel);
    assert!(left < 400.0);
    sim.write_back_fuel();
    let assembly = sim.into_assembly();
    assert_eq!(assembly.part(ids[0]).unwrap().fuel[&Resource::LiquidFuel], left);
}

#[test]
fn touching_down_exactly_on_the_ground_lands() {
    let config = SimConfig {
        dt: 0.5,
        gravity: 4.0,
        atmosphere: AtmosphereConfig {
            sea_level_density: 0.0,
            ..AtmosphereConfig::default()
        },
        ..SimConfig::default()
    };
    let (assembly, _) = stack(&[pod()]);
    let plan = plan_stages(&assembly);

    // -8 - 4 * 0.5 = -10, and 5 - 10 * 0.5 lands on exactly zero.
    let mut state = FlightState::launch(&assembly, &plan);
    state.altitude = 5.0;
    state.vertical_velocity = -8.0;
    let Tick { state, events } = tick(&state, &assembly, &plan, &config);
    assert_eq!(state.status, FlightStatus::Landed);
    assert_eq!(state.altitude, 0.0);
    assert_eq!(state.vertical_velocity, 0.0);
    assert!(events.contains(&FlightEvent::Landed { time: 0.5, speed: 10.0 }));

    let mut state = FlightState::launch(&assembly, &plan);
    state.altitude = 5.0;
    state.vertical_velocity = -8.5;
    let Tick { state, .. } = tick(&state, &assembly, &plan, &config);
    assert_eq!(state.status, FlightStatus::Crashed);
}

#[test]
fn resting_on_the_pad_emits_no_landing() {
    let (assembly, _) = stack(&[pod(), tank(400.0, 1.0), engine(200.0, 220.0, 8.0, 4.0)]);
    let mut sim = launched(assembly, SimConfig::default());
    for _ in 0..20 {
        sim.step();
    }
    assert_eq!(sim.status(), FlightStatus::Landed);
    assert!(!sim
        .drain_events()
        .iter()
        .any(|e| matches!(e, FlightEvent::Landed { .. })));
}
