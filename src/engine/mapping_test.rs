use std::collections::HashSet;

use crate::config::default_mappings;
use crate::engine::mapping::{
    AnalogParams, ButtonMapping, MappingEngine, MappingSource, MappingTarget, StickSide,
    SyntheticEdge, XBOX_A, XBOX_Y,
};
use crate::engine::state::GamepadState;

const KEY_F: u16 = 33;
const KEY_A: u16 = 30;

fn params() -> AnalogParams {
    AnalogParams {
        mouse_sens_left: 25.0,
        mouse_sens_right: 25.0,
        mouse_sens_touchpad: 25.0,
    }
}

/// One reference frame of 4 ms so mouse speeds scale by exactly 1.
const DT: f32 = 0.004;

#[test]
fn test_default_mappings_cover_every_source_once() {
    let mappings = default_mappings();
    let mut seen = HashSet::new();
    for mapping in &mappings {
        assert!(
            seen.insert(mapping.source),
            "duplicate source {:?}",
            mapping.source
        );
    }
    for source in MappingSource::ALL {
        assert!(seen.contains(&source), "missing source {:?}", source);
    }
    assert_eq!(mappings.len(), MappingSource::ALL.len());
}

#[test]
fn test_cross_maps_to_a_button() {
    let mut engine = MappingEngine::new(default_mappings());
    let mut state = GamepadState::default();
    state.cross = true;
    let out = engine.evaluate(&state, &params(), DT);
    assert_eq!(out.pad.buttons & XBOX_A, XBOX_A);
}

#[test]
fn test_sticks_and_triggers_pass_through() {
    let mut engine = MappingEngine::new(default_mappings());
    let mut state = GamepadState::default();
    state.left_x = 0.5;
    state.left_y = -1.0;
    state.r2 = 1.0;

    // The first frame carries a quarter of the deflection, the smoothing
    // filter's step response. Triggers are not smoothed.
    let mut out = engine.evaluate(&state, &params(), DT);
    assert_eq!(out.pad.thumb_lx, (0.125 * 32767.0) as i16);
    assert_eq!(out.pad.thumb_ly, (-0.25 * 32767.0) as i16);
    assert_eq!(out.pad.right_trigger, 255);
    assert_eq!(out.pad.left_trigger, 0);

    // Held deflection converges onto the raw position.
    for _ in 0..200 {
        out = engine.evaluate(&state, &params(), DT);
    }
    assert!((out.pad.thumb_lx as i32 - 16383).abs() <= 2);
    assert!((out.pad.thumb_ly as i32 + 32767).abs() <= 2);
    assert_eq!(out.pad.right_trigger, 255);
}

#[test]
fn test_remapped_triangle_emits_key_edges_not_y() {
    let mut mappings = default_mappings();
    for mapping in &mut mappings {
        if mapping.source == MappingSource::Triangle {
            mapping.targets = vec![MappingTarget::Keyboard(KEY_F)];
        }
    }
    let mut engine = MappingEngine::new(mappings);

    let mut state = GamepadState::default();
    state.triangle = true;
    let out = engine.evaluate(&state, &params(), DT);
    assert_eq!(out.edges, vec![SyntheticEdge::KeyDown(KEY_F)]);
    assert_eq!(out.pad.buttons & XBOX_Y, 0);

    // Holding emits nothing further.
    let out = engine.evaluate(&state, &params(), DT);
    assert!(out.edges.is_empty());

    state.triangle = false;
    let out = engine.evaluate(&state, &params(), DT);
    assert_eq!(out.edges, vec![SyntheticEdge::KeyUp(KEY_F)]);

    let out = engine.evaluate(&state, &params(), DT);
    assert!(out.edges.is_empty());
}

#[test]
fn test_release_all_on_disconnect() {
    let mut mappings = default_mappings();
    for mapping in &mut mappings {
        if mapping.source == MappingSource::Square {
            mapping.targets = vec![MappingTarget::Keyboard(KEY_A), MappingTarget::Mouse(0)];
        }
    }
    let mut engine = MappingEngine::new(mappings);

    let mut state = GamepadState::default();
    state.square = true;
    state.cross = true;
    let out = engine.evaluate(&state, &params(), DT);
    assert!(out.edges.contains(&SyntheticEdge::KeyDown(KEY_A)));
    assert!(out.edges.contains(&SyntheticEdge::MouseDown(0)));

    let released = engine.release_all();
    assert_eq!(released.len(), 2);
    assert!(released.contains(&SyntheticEdge::KeyUp(KEY_A)));
    assert!(released.contains(&SyntheticEdge::MouseUp(0)));

    // Nothing is double-released.
    assert!(engine.release_all().is_empty());
}

#[test]
fn test_multiple_targets_fire_independently() {
    let mut mappings = default_mappings();
    for mapping in &mut mappings {
        if mapping.source == MappingSource::Cross {
            mapping.targets = vec![
                MappingTarget::XboxButton(XBOX_A),
                MappingTarget::Keyboard(KEY_F),
            ];
        }
    }
    let mut engine = MappingEngine::new(mappings);
    let mut state = GamepadState::default();
    state.cross = true;
    let out = engine.evaluate(&state, &params(), DT);
    assert_eq!(out.pad.buttons & XBOX_A, XBOX_A);
    assert_eq!(out.edges, vec![SyntheticEdge::KeyDown(KEY_F)]);
}

#[test]
fn test_stick_conflict_last_writer_wins() {
    let mappings = vec![
        ButtonMapping {
            source: MappingSource::LeftStick,
            targets: vec![MappingTarget::XboxStick(StickSide::Left)],
        },
        ButtonMapping {
            source: MappingSource::RightStick,
            targets: vec![MappingTarget::XboxStick(StickSide::Left)],
        },
    ];
    let mut engine = MappingEngine::new(mappings);
    let mut state = GamepadState::default();
    state.left_x = 1.0;
    state.right_x = -1.0;
    // The right stick is later in iteration order, so its (smoothed first
    // frame) value lands on the left thumb.
    let out = engine.evaluate(&state, &params(), DT);
    assert_eq!(out.pad.thumb_lx, (-0.25 * 32767.0) as i16);
}

#[test]
fn test_mouse_move_carries_fraction() {
    // 0.5 pixels per reference frame at full deflection.
    let mappings = vec![ButtonMapping {
        source: MappingSource::LeftStick,
        targets: vec![MappingTarget::MouseMove {
            x_speed: 0.5,
            y_speed: 0.5,
        }],
    }];
    let mut engine = MappingEngine::new(mappings);
    let mut state = GamepadState::default();
    state.left_x = 1.0;

    // Let the smoothing filter converge onto the held deflection.
    for _ in 0..300 {
        engine.evaluate(&state, &params(), DT);
    }

    // At half a pixel per frame the integer part pops every other frame and
    // the remainder carries; no frame ever bursts.
    let mut total = 0;
    for _ in 0..8 {
        let out = engine.evaluate(&state, &params(), DT);
        assert!(out.pointer.dx <= 1);
        total += out.pointer.dx;
    }
    assert!((3..=5).contains(&total), "moved {total} px over 8 frames");
}

#[test]
fn test_scroll_emits_whole_ticks() {
    let mappings = vec![ButtonMapping {
        source: MappingSource::RightStick,
        targets: vec![MappingTarget::MouseScroll { speed: 0.6 }],
    }];
    let mut engine = MappingEngine::new(mappings);
    let mut state = GamepadState::default();
    // Stick up scrolls up.
    state.right_y = -1.0;

    for _ in 0..300 {
        engine.evaluate(&state, &params(), DT);
    }

    // 0.6 per frame accumulates into six whole ticks over ten frames.
    let mut total = 0;
    for _ in 0..10 {
        let out = engine.evaluate(&state, &params(), DT);
        assert!(out.pointer.wheel <= 1);
        total += out.pointer.wheel;
    }
    assert!((5..=7).contains(&total), "scrolled {total} ticks over 10 frames");
}

#[test]
fn test_touchpad_halves_synthesis() {
    let mut mappings = default_mappings();
    for mapping in &mut mappings {
        if mapping.source == MappingSource::TouchpadLeft {
            mapping.targets = vec![MappingTarget::Mouse(0)];
        }
        if mapping.source == MappingSource::TouchpadRight {
            mapping.targets = vec![MappingTarget::Mouse(2)];
        }
    }
    let mut engine = MappingEngine::new(mappings);

    let mut state = GamepadState::default();
    state.touchpad = true;
    state.touch_active = true;
    state.touch_x = 400;
    let out = engine.evaluate(&state, &params(), DT);
    assert_eq!(out.edges, vec![SyntheticEdge::MouseDown(0)]);

    state.touch_x = 1500;
    let out = engine.evaluate(&state, &params(), DT);
    assert!(out.edges.contains(&SyntheticEdge::MouseUp(0)));
    assert!(out.edges.contains(&SyntheticEdge::MouseDown(2)));

    // Click without a touch point maps to neither half.
    state.touch_active = false;
    let out = engine.evaluate(&state, &params(), DT);
    assert_eq!(out.edges, vec![SyntheticEdge::MouseUp(2)]);
}

#[test]
fn test_digital_source_to_trigger_is_full_pull() {
    let mappings = vec![ButtonMapping {
        source: MappingSource::Circle,
        targets: vec![MappingTarget::XboxTrigger(
            crate::engine::mapping::TriggerSide::Right,
        )],
    }];
    let mut engine = MappingEngine::new(mappings);
    let mut state = GamepadState::default();
    state.circle = true;
    let out = engine.evaluate(&state, &params(), DT);
    assert_eq!(out.pad.right_trigger, 255);

    state.circle = false;
    let out = engine.evaluate(&state, &params(), DT);
    assert_eq!(out.pad.right_trigger, 0);
}
