//! Proximity-based snapping of parts onto free attachment points.
//!
//! Candidate pairs are enumerated in ascending part id order, then in
//! declaration order of each part's attachment points; among pairs at
//! the same minimum distance the first one enumerated wins.

use std::sync::Arc;

use itertools::iproduct;
use nalgebra::Vector2;
use ordered_float::OrderedFloat;
use tracing::{debug, warn};

use crate::{
    assembly::{Assembly, Connection, ConnectionId, PartId, PointRef},
    catalog::{AttachmentPoint, PartDefinition},
    config::EditorConfig,
    math::distance,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SnapMode {
    /// A part being dropped into the assembly for the first time.
    Placement,
    /// A part already in the assembly, dragged to a new position.
    PostMove,
}

impl SnapMode {
    pub fn threshold(self, config: &EditorConfig) -> f64 {
        match self {
            Self::Placement => config.placement_threshold,
            Self::PostMove => config.post_move_threshold,
        }
    }
}

/// The part looking for a connection.
#[derive(Copy, Clone, Debug)]
pub enum Candidate<'a> {
    New(&'a PartDefinition),
    Existing(PartId),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Suggestion {
    /// The free point on the existing part.
    pub target: PointRef,
    /// The candidate's own point that should meet `target`.
    pub candidate_point: Arc<str>,
    /// Distance between the two points before snapping.
    pub distance: f64,
    /// Candidate position that makes the two points coincide.
    pub position: Vector2<f64>,
}

/// Find the nearest size-compatible pair of free points within the
/// mode's threshold.
pub fn suggest_connection(
    assembly: &Assembly,
    candidate: Candidate<'_>,
    position: Vector2<f64>,
    mode: SnapMode,
    config: &EditorConfig,
) -> Option<Suggestion> {
    let (own_points, exclude): (Vec<&AttachmentPoint>, Option<PartId>) = match candidate {
        Candidate::New(definition) => (definition.attachment_points.iter().collect(), None),
        Candidate::Existing(id) => (assembly.free_points(id).collect(), Some(id)),
    };
    let scale = assembly.scale();
    let tolerance = assembly.size_tolerance();

    let targets = assembly
        .parts()
        .filter(|(id, _)| Some(*id) != exclude)
        .flat_map(|(id, part)| {
            assembly
                .free_points(id)
                .map(move |point| (id, point, part.position + point.offset * scale))
        })
        .collect::<Vec<_>>();

    let (target_id, target_point, target_world, own_point, own_world) =
        iproduct!(targets, own_points.iter().copied())
            .filter(|((_, target, _), own)| (target.size - own.size).abs() <= tolerance)
            .map(|((id, target, world), own)| (id, target, world, own, position + own.offset * scale))
            .min_by_key(|(_, _, world, _, own_world)| OrderedFloat(distance(*world, *own_world)))?;

    let gap = distance(target_world, own_world);
    if gap > mode.threshold(config) {
        return None;
    }

    Some(Suggestion {
        target: PointRef {
            part: target_id,
            point: target_point.name.clone(),
        },
        candidate_point: own_point.name.clone(),
        distance: gap,
        position: position + (target_world - own_world),
    })
}

/// Remove every connection of `part` whose two points have drifted
/// further apart than the breaking threshold.
pub fn break_stretched_connections(
    assembly: &mut Assembly,
    part: PartId,
    config: &EditorConfig,
) -> Vec<Connection> {
    let Some(instance) = assembly.part(part) else {
        return vec![];
    };

    let stretched = instance
        .connections
        .iter()
        .copied()
        .filter(|id| {
            let Some(connection) = assembly.connection(*id) else {
                return false;
            };
            let a = assembly.attachment_world_position(connection.a.part, &connection.a.point);
            let b = assembly.attachment_world_position(connection.b.part, &connection.b.point);
            match (a, b) {
                (Some(a), Some(b)) => distance(a, b) > config.breaking_threshold,
                _ => true,
            }
        })
        .collect::<Vec<_>>();

    stretched
        .into_iter()
        .filter_map(|id| {
            debug!(connection = ?id, part = %part, "connection stretched past breaking threshold");
            assembly.disconnect(id)
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq)]
pub struct Placement {
    pub part: PartId,
    pub connection: Option<ConnectionId>,
}

/// Drop a new part into the assembly, snapping it onto the nearest
/// compatible free point within the placement threshold.
pub fn place_part(
    assembly: &mut Assembly,
    definition: Arc<PartDefinition>,
    position: Vector2<f64>,
    config: &EditorConfig,
) -> Placement {
    let suggestion = suggest_connection(
        assembly,
        Candidate::New(&definition),
        position,
        SnapMode::Placement,
        config,
    );

    match suggestion {
        Some(suggestion) => {
            let part = assembly.add_part(definition, suggestion.position);
            let connection = connect_suggestion(assembly, part, &suggestion);
            Placement { part, connection }
        }
        None => Placement {
            part: assembly.add_part(definition, position),
            connection: None,
        },
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MoveOutcome {
    /// Where the part ended up, after snapping.
    pub position: Vector2<f64>,
    pub broken: Vec<Connection>,
    pub connection: Option<ConnectionId>,
}

/// Move a placed part, break connections it has pulled apart, and dock
/// it onto a nearby free point if one is within the post-move
/// threshold.
pub fn move_part(
    assembly: &mut Assembly,
    part: PartId,
    position: Vector2<f64>,
    config: &EditorConfig,
) -> Option<MoveOutcome> {
    assembly.part(part)?;

    let suggestion = suggest_connection(
        assembly,
        Candidate::Existing(part),
        position,
        SnapMode::PostMove,
        config,
    );
    let position = suggestion.as_ref().map_or(position, |s| s.position);
    assembly.set_position(part, position);

    let broken = break_stretched_connections(assembly, part, config);
    let connection = suggestion.and_then(|s| connect_suggestion(assembly, part, &s));

    Some(MoveOutcome {
        position,
        broken,
        connection,
    })
}

fn connect_suggestion(
    assembly: &mut Assembly,
    part: PartId,
    suggestion: &Suggestion,
) -> Option<ConnectionId> {
    match assembly.connect(
        part,
        &suggestion.candidate_point,
        suggestion.target.part,
        &suggestion.target.point,
    ) {
        Ok(id) => Some(id),
        Err(e) => {
            warn!("suggested connection was refused: {e}");
            None
        }
    }
}

#[cfg(test)]
use crate::{
    arena::IdLike,
    assembly::fixtures::{pod, sized, tank},
};

#[cfg(test)]
fn pod_with_tank_below(d: f64) -> (Assembly, Arc<PartDefinition>, Vector2<f64>) {
    // Pod bottom sits at (0, -10); the tank's top point is 20 above its
    // center, so this position leaves the two points `d` apart.
    let mut assembly = Assembly::new();
    assembly.add_part(pod(), Vector2::zeros());
    (assembly, tank(100.0, 1.0), Vector2::new(0.0, -30.0 - d))
}

#[test]
fn placement_suggests_within_threshold_only() {
    let config = EditorConfig::default();
    for (d, expected) in [(0.0, true), (60.5, true), (120.0, true), (120.5, false), (300.0, false)] {
        let (assembly, tank, position) = pod_with_tank_below(d);
        let suggestion = suggest_connection(
            &assembly,
            Candidate::New(&tank),
            position,
            SnapMode::Placement,
            &config,
        );
        assert_eq!(suggestion.is_some(), expected, "d = {d}");
        if let Some(suggestion) = suggestion {
            assert_eq!(suggestion.distance, d);
            assert_eq!(&*suggestion.target.point, "bottom");
            assert_eq!(&*suggestion.candidate_point, "top");
            assert_eq!(suggestion.position, Vector2::new(0.0, -30.0));
        }
    }
}

#[test]
fn snapped_position_makes_points_coincide() {
    let config = EditorConfig::default();
    let (mut assembly, tank, position) = pod_with_tank_below(37.25);
    let placement = place_part(&mut assembly, tank, position, &config);
    let connection = placement.connection.unwrap();
    let connection = assembly.connection(connection).unwrap();
    let a = assembly
        .attachment_world_position(connection.a.part, &connection.a.point)
        .unwrap();
    let b = assembly
        .attachment_world_position(connection.b.part, &connection.b.point)
        .unwrap();
    assert_eq!(distance(a, b), 0.0);
}

#[test]
fn post_move_uses_tighter_threshold() {
    let config = EditorConfig::default();
    for (d, expected) in [(25.0, true), (26.0, false), (100.0, false)] {
        let (mut assembly, tank, _) = pod_with_tank_below(0.0);
        let t = assembly.add_part(tank, Vector2::new(500.0, 500.0));
        let suggestion = suggest_connection(
            &assembly,
            Candidate::Existing(t),
            Vector2::new(0.0, -30.0 - d),
            SnapMode::PostMove,
            &config,
        );
        assert_eq!(suggestion.is_some(), expected, "d = {d}");
    }
}

#[test]
fn incompatible_sizes_are_never_suggested() {
    let config = EditorConfig::default();
    let mut assembly = Assembly::new();
    assembly.add_part(pod(), Vector2::zeros());
    let big = sized(1.25);
    let suggestion = suggest_connection(
        &assembly,
        Candidate::New(&big),
        Vector2::new(0.0, -15.0),
        SnapMode::Placement,
        &config,
    );
    assert_eq!(suggestion, None);
}

#[test]
fn occupied_points_are_skipped() {
    let config = EditorConfig::default();
    let (mut assembly, tank, position) = pod_with_tank_below(0.0);
    let first = place_part(&mut assembly, tank.clone(), position, &config);
    assert!(first.connection.is_some());

    // The pod's bottom is taken, so a second tank dropped just below
    // the first one snaps onto the first tank's bottom.
    let second = suggest_connection(
        &assembly,
        Candidate::New(&tank),
        Vector2::new(0.0, -75.0),
        SnapMode::Placement,
        &config,
    )
    .unwrap();
    assert_eq!(second.target, PointRef::new(first.part, "bottom"));
    assert_eq!(&*second.candidate_point, "top");
    assert_eq!(second.position, Vector2::new(0.0, -70.0));
}

#[test]
fn ties_go_to_the_first_part_enumerated() {
    let config = EditorConfig::default();
    let mut assembly = Assembly::new();
    let left = assembly.add_part(pod(), Vector2::new(-50.0, 0.0));
    let right = assembly.add_part(pod(), Vector2::new(50.0, 0.0));
    assert!(left < right);
    let suggestion = suggest_connection(
        &assembly,
        Candidate::New(&tank(100.0, 1.0)),
        Vector2::new(0.0, -30.0),
        SnapMode::Placement,
        &config,
    )
    .unwrap();
    assert_eq!(suggestion.target.part, left);
}

#[test]
fn stretched_connections_break_with_hysteresis() {
    let config = EditorConfig::default();
    let (mut assembly, tank, position) = pod_with_tank_below(0.0);
    let placed = place_part(&mut assembly, tank, position, &config);
    let connection = placed.connection.unwrap();

    // 40 units of drift: beyond the post-move snap distance, short of
    // the breaking distance.
    let kept = move_part(&mut assembly, placed.part, Vector2::new(40.0, -30.0), &config).unwrap();
    assert!(kept.broken.is_empty());
    assert_eq!(kept.connection, None);
    assert!(assembly.connection(connection).is_some());

    let broken = move_part(&mut assembly, placed.part, Vector2::new(60.0, -30.0), &config).unwrap();
    assert_eq!(broken.broken.len(), 1);
    assert!(assembly.connection(connection).is_none());
    assert_eq!(assembly.live_parts().len(), 1);
}

#[test]
fn dragging_near_a_free_point_redocks() {
    let config = EditorConfig::default();
    let (mut assembly, tank, _) = pod_with_tank_below(0.0);
    let t = assembly.add_part(tank, Vector2::new(300.0, 300.0));
    let outcome = move_part(&mut assembly, t, Vector2::new(3.0, -40.0), &config).unwrap();
    assert_eq!(outcome.position, Vector2::new(0.0, -30.0));
    assert!(outcome.connection.is_some());
    assert!(assembly.live_parts().contains(&t));
    assert!(move_part(&mut assembly, PartId::from_raw(42), Vector2::zeros(), &config).is_none());
}

#[test]
fn occupied_points_on_the_dragged_part_do_not_snap() {
    let config = EditorConfig::default();
    let (mut assembly, tank, position) = pod_with_tank_below(0.0);
    let placed = place_part(&mut assembly, tank.clone(), position, &config);
    assert!(placed.connection.is_some());
    assembly.add_part(pod(), Vector2::new(200.0, 0.0));

    // The tank's top is held by the first pod; here it lands 5 below the
    // second pod's free bottom while the tank's own bottom stays 45 away.
    let position = Vector2::new(200.0, -35.0);
    let suggestion = suggest_connection(
        &assembly,
        Candidate::Existing(placed.part),
        position,
        SnapMode::PostMove,
        &config,
    );
    assert_eq!(suggestion, None);

    let fresh = suggest_connection(
        &assembly,
        Candidate::New(&tank),
        position,
        SnapMode::PostMove,
        &config,
    )
    .unwrap();
    assert_eq!(&*fresh.candidate_point, "top");
    assert_eq!(fresh.distance, 5.0);
}
