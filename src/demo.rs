//! A two-stage stock rocket, assembled the way the editor would: each
//! part is dropped near where it belongs and left to the resolver.

use color_eyre::eyre::{self, bail, OptionExt};
use nalgebra::Vector2;
use rocketyard::{
    assembly::Assembly,
    autoconnect::place_part,
    catalog::Catalog,
    config::EditorConfig,
};
use tracing::debug;

/// Definition id and drop position, top to bottom. Positions are a few
/// units off so every part has to be snapped into place.
const LAYOUT: &[(&str, (f64, f64))] = &[
    ("pod.mk1", (0.0, 0.0)),
    ("tank.fl-t400", (3.0, -82.0)),
    ("engine.lv-t45", (-2.0, -168.0)),
    ("decoupler.td-12", (1.0, -223.0)),
    ("tank.fl-t800", (0.0, -335.0)),
    ("engine.lv-t45", (4.0, -471.0)),
    ("chute.mk16", (2.0, 44.0)),
];

pub fn build(catalog: &Catalog, editor: &EditorConfig) -> eyre::Result<Assembly> {
    let mut assembly = Assembly::with_editor_config(editor);

    for (i, (id, (x, y))) in LAYOUT.iter().enumerate() {
        let definition = catalog
            .get(id)
            .ok_or_eyre(format!("stock catalog is missing {id}"))?
            .clone();
        let placement = place_part(&mut assembly, definition, Vector2::new(*x, *y), editor);
        if i > 0 && placement.connection.is_none() {
            bail!("{id} did not snap onto the rocket");
        }
        debug!(part = %placement.part, id, "placed");
    }

    Ok(assembly)
}

#[test]
fn demo_rocket_has_two_stages() {
    let editor = EditorConfig::default();
    let assembly = build(&Catalog::stock(), &editor).unwrap();
    assert_eq!(assembly.part_count(), LAYOUT.len());
    assert_eq!(assembly.live_parts().len(), LAYOUT.len());
    assert_eq!(assembly.connections().count(), LAYOUT.len() - 1);

    let plan = rocketyard::staging::plan_stages(&assembly);
    assert_eq!(plan.len(), 2);
    assert_eq!(plan.stages[0].parts.len(), 3);
    assert!(plan.stages[0].delta_v > 0.0);
    assert!(assembly.thrust_to_weight(true, 9.81) > 1.0);
}
