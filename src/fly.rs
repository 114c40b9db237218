//! Drives a [`FlightSimulator`] to the end of a flight, either as fast
//! as possible or paced by a tokio interval.

use std::time::Duration;

use color_eyre::eyre;
use itertools::Itertools;
use rocketyard::flight::{FlightEvent, FlightSimulator, Telemetry};
use tracing::{info, warn};

use crate::cli::FlyArgs;

/// Why a flight stopped.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Crashed,
    /// Back on the ground after having left it.
    Landed,
    OutOfTicks,
    Interrupted,
}

/// Launch and apply the fixed pilot inputs from `args`.
pub fn launch(sim: &mut FlightSimulator, args: &FlyArgs) -> eyre::Result<()> {
    sim.start()?;
    sim.set_throttle(args.throttle);
    sim.set_steering(args.steering);
    Ok(())
}

/// One tick plus the pilot logic around it. Returns the outcome once
/// the flight is over.
fn advance(sim: &mut FlightSimulator, args: &FlyArgs, tick: usize) -> Option<Outcome> {
    let running = sim.step();

    let mut landed = false;
    for event in sim.drain_events() {
        landed |= matches!(event, FlightEvent::Landed { .. });
        report_event(&event);
    }
    let telemetry = sim.telemetry()?;

    if let Some(altitude) = args.chute_below {
        if telemetry.vertical_velocity < 0.0 && telemetry.altitude < altitude {
            sim.deploy_parachutes();
        }
    }
    if args.report_every > 0 && tick % args.report_every == 0 {
        report(&telemetry);
    }

    if !running {
        return Some(Outcome::Crashed);
    }
    if landed {
        return Some(Outcome::Landed);
    }
    None
}

pub fn run(sim: &mut FlightSimulator, args: &FlyArgs) -> eyre::Result<Outcome> {
    launch(sim, args)?;
    for tick in 1..=args.ticks {
        if let Some(outcome) = advance(sim, args, tick) {
            return Ok(outcome);
        }
    }
    Ok(Outcome::OutOfTicks)
}

/// Same as [`run`], one tick per `dt` of wall time. Ctrl-C stops the
/// flight.
pub async fn run_realtime(sim: &mut FlightSimulator, args: &FlyArgs) -> eyre::Result<Outcome> {
    launch(sim, args)?;
    let mut interval = tokio::time::interval(Duration::from_secs_f64(sim.config().dt.max(1e-3)));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    for tick in 1..=args.ticks {
        tokio::select! {
            _ = interval.tick() => {}
            _ = &mut ctrl_c => {
                warn!("interrupted");
                return Ok(Outcome::Interrupted);
            }
        }
        if let Some(outcome) = advance(sim, args, tick) {
            return Ok(outcome);
        }
    }
    Ok(Outcome::OutOfTicks)
}

fn report(t: &Telemetry) {
    let fuel = t
        .stage_fuel
        .iter()
        .map(|(resource, amount)| format!("{resource}: {amount:.1}"))
        .join(", ");
    info!(
        t = format_args!("{:.2}", t.time),
        alt = format_args!("{:.1}", t.altitude),
        x = format_args!("{:.1}", t.horizontal_position),
        vy = format_args!("{:.1}", t.vertical_velocity),
        vx = format_args!("{:.1}", t.horizontal_velocity),
        mass = format_args!("{:.3}", t.mass),
        thrust = format_args!("{:.1}", t.thrust),
        stage = t.stage,
        dv = format_args!("{:.0}", t.remaining_delta_v),
        fuel,
        "telemetry"
    );
}

fn report_event(event: &FlightEvent) {
    match event {
        FlightEvent::StageActivated {
            from,
            to,
            decoupler,
        } => match decoupler {
            Some(decoupler) => info!("staging {from} -> {to}, fired decoupler {decoupler}"),
            None => info!("staging {from} -> {to}"),
        },
        FlightEvent::StagingUnavailable { stage } => {
            warn!("stage {stage} is spent and nothing is left to stage");
        }
        other => info!("{other:?}"),
    }
}
