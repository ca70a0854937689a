use std::f64::consts::PI;
use std::io::Cursor;

use nalgebra::{Point3, Vector3};
use proptest::prelude::*;

use rotaslice_core::{CancelToken, KinematicMode};
use rotaslice_settings::SettingsSnapshot;
use rotaslice_toolpath::{synthesize, KinematicTransform, ModeMapping, SynthesisSettings};

fn cylindrical_settings() -> SynthesisSettings {
    let snapshot = SettingsSnapshot::defaults().with("kinematic_mode", "cylindrical_full");
    SynthesisSettings::from_snapshot(&snapshot).expect("valid settings")
}

/// C words of every motion line before the epilogue
fn c_words(gcode: &[String]) -> Vec<f64> {
    let body_end = gcode
        .iter()
        .rposition(|l| l.starts_with(";TIME_ELAPSED:"))
        .unwrap_or(gcode.len());
    gcode[..body_end]
        .iter()
        .filter(|l| l.starts_with("G0 ") || l.starts_with("G1 "))
        .flat_map(|l| l.split_whitespace())
        .filter_map(|w| w.strip_prefix('C'))
        .map(|v| v.parse::<f64>().expect("numeric C word"))
        .collect()
}

proptest! {
    #[test]
    fn transform_c_never_jumps_past_half_turn(
        start in -PI..PI,
        steps in prop::collection::vec(0.01f64..3.0, 1..60),
    ) {
        let mut transform = KinematicTransform::new(KinematicMode::CylindricalFull, 1.0, 1.0);
        let mut angle = start;
        let mut previous = transform
            .apply(Point3::new(0.0, 0.0, 0.0), Vector3::new(angle.cos(), angle.sin(), 0.0))
            .c;
        for step in steps {
            angle += step;
            let c = transform
                .apply(Point3::new(0.0, 0.0, 0.0), Vector3::new(angle.cos(), angle.sin(), 0.0))
                .c;
            prop_assert!((c - previous).abs() <= 180.0 + 1e-9, "{} -> {}", previous, c);
            previous = c;
        }
    }

    #[test]
    fn emitted_c_follows_monotonic_azimuth(
        step in 0.05f64..2.5,
        count in 5usize..40,
    ) {
        let settings = cylindrical_settings();
        let coords: Vec<String> = (0..count)
            .map(|i| format!("{:.4},{:.6}", i as f64 * 0.1, i as f64 * step))
            .collect();
        let stream = format!(";LAYER:0,10\n;TYPE:WALL-OUTER\nPOLY:{}\n", coords.join(","));

        let out = synthesize(&settings, ModeMapping::Cylindrical, Cursor::new(stream), &CancelToken::new())
            .expect("synthesis");
        let cs = c_words(&out.gcode);
        prop_assert!(cs.len() >= 2);
        for pair in cs.windows(2) {
            prop_assert!((pair[1] - pair[0]).abs() <= 180.0 + 1e-3, "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn cylindrical_helix_round_trips(
        u in -50.0f64..50.0,
        v in -3.1f64..3.1,
        h in 0.1f64..80.0,
    ) {
        let mapping = ModeMapping::Cylindrical;
        let (p, n) = mapping.map(u, v, h);
        let (u2, v2, h2) = mapping.invert(&p);
        prop_assert!((u - u2).abs() < 1e-3);
        prop_assert!((v - v2).abs() < 1e-3);
        prop_assert!((h - h2).abs() < 1e-3);
        prop_assert!((n.norm() - 1.0).abs() < 1e-9);
        prop_assert!(n.z.abs() < 1e-12);
    }
}

#[test]
fn analytic_helix_survives_synthesis() {
    let settings = cylindrical_settings();
    let radius = 12.0;
    let samples: Vec<(f64, f64)> = (0..200)
        .map(|i| {
            let t = i as f64 * 0.05;
            (t * 0.3, t.sin().atan2(t.cos()))
        })
        .collect();
    let poly: Vec<String> = samples
        .iter()
        .map(|(u, v)| format!("{:.6},{:.6}", u, v))
        .collect();
    let stream = format!(";LAYER:0,{}\n;TYPE:SKIN\nPOLY:{}\n", radius, poly.join(","));

    let out = synthesize(
        &settings,
        ModeMapping::Cylindrical,
        Cursor::new(stream),
        &CancelToken::new(),
    )
    .expect("synthesis");

    let layer = &out.layers[&0];
    let printed: Vec<_> = layer
        .points
        .iter()
        .filter(|p| p.feature == rotaslice_core::FeatureType::Skin)
        .collect();
    assert_eq!(printed.len(), samples.len() - 1);
    for (point, (u, v)) in printed.iter().zip(samples.iter().skip(1)) {
        let (u2, v2, h2) = ModeMapping::Cylindrical.invert(&Point3::new(point.x, point.y, point.z));
        assert!((u - u2).abs() < 1e-3);
        assert!((v - v2).abs() < 1e-3);
        assert!((radius - h2).abs() < 1e-3);
    }
}
