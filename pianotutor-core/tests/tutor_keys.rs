mod common;

use std::thread;
use std::time::Duration;

use pianotutor_core::KeyMatch;

#[test]
fn test_velocity_zero_is_release() {
    let h = common::harness();
    h.tutor.add_key(60, 80, Some(0), 0);
    h.tutor.add_key(60, 0, Some(0), 0);
    assert_eq!(h.tutor.active_count(), 0);
    assert_eq!(common::pixel_lines(&h.device), vec!["H47100010", "H47000000"]);
}

#[test]
fn test_duplicate_event_sends_nothing() {
    let h = common::harness();
    h.tutor.add_key(60, 80, Some(0), 0);
    h.tutor.add_key(60, 80, Some(0), 0);
    assert_eq!(h.tutor.active_count(), 1);
    assert_eq!(h.device.commands().len(), 1);
}

#[test]
fn test_arbitration() {
    let h = common::harness();
    h.tutor.add_key(60, 50, Some(0), 3);
    h.tutor.add_key(60, 30, Some(0), 3);
    // the weaker preview was discarded, so only one pixel went out
    assert_eq!(common::pixel_lines(&h.device).len(), 1);

    h.tutor.add_key(62, 30, Some(0), 5);
    h.tutor.add_key(62, 50, Some(0), 2);
    assert_eq!(common::pixel_lines(&h.device).len(), 3);
    assert_eq!(h.tutor.active_count(), 0);
}

#[test]
fn test_debounced_preview_does_not_flash() {
    let h = common::harness();
    h.tutor.add_key(64, 80, Some(1), 1);
    h.tutor.clear_key(64, true);
    h.tutor.add_key(64, 80, Some(1), 0);

    assert_eq!(h.tutor.active_count(), 0);
    // lit as preview, lit as sounding, then straight back off
    assert_eq!(
        common::pixel_lines(&h.device),
        vec!["H3f000202", "H3f001010", "H3f000000"]
    );
}

#[test]
fn test_marked_preview_sounding_later_stays_lit() {
    let h = common::harness();
    h.tutor.add_key(64, 80, Some(1), 1);
    h.tutor.clear_key(64, true);
    thread::sleep(Duration::from_millis(120));
    h.tutor.add_key(64, 80, Some(1), 0);
    assert_eq!(h.tutor.active_count(), 1);
}

#[test]
fn test_skip_ahead_then_debounce() {
    let h = common::harness();
    h.tutor.add_key(67, 80, Some(0), 2);
    assert_eq!(h.tutor.key_pressed(67, 90), KeyMatch::Preview(2));
    assert_eq!(KeyMatch::Preview(2).code(), 2);

    h.tutor.add_key(67, 80, Some(0), 0);
    assert_eq!(h.tutor.active_count(), 0);
}

#[test]
fn test_preview_ignored_while_notes_sound() {
    let h = common::harness();
    h.tutor.add_key(60, 80, Some(0), 0);
    h.tutor.add_key(67, 80, Some(0), 2);
    h.device.clear();

    assert_eq!(h.tutor.key_pressed(67, 90), KeyMatch::NoMatch);
    assert_eq!(KeyMatch::NoMatch.code(), -1);
    assert!(h.device.commands().is_empty());
    assert_eq!(h.scheduler.pending(), 0);
}

#[test]
fn test_chord_release_coalesces_flushes() {
    let h = common::harness();
    for pitch in [60, 64, 67] {
        h.tutor.add_key(pitch, 80, Some(0), 0);
    }
    h.tutor.flush();
    h.device.clear();

    for pitch in [60, 64, 67] {
        assert_eq!(h.tutor.key_pressed(pitch, 90), KeyMatch::Active);
    }
    assert_eq!(h.tutor.active_count(), 0);
    assert_eq!(h.scheduler.pending(), 3);
    h.scheduler.run_pending();
    assert_eq!(common::flush_count(&h.device), 1);
    assert_eq!(common::pixel_lines(&h.device).len(), 3);
}

#[test]
fn test_mistake_over_sounding_note() {
    let h = common::harness();
    h.tutor.add_key(60, 80, Some(0), 0);
    h.tutor.add_key(60, 80, None, 0);
    assert_eq!(h.tutor.active_count(), 0);
    assert_eq!(h.tutor.key_pressed(60, 90), KeyMatch::NoMatch);

    h.tutor.clear_key(60, false);
    assert_eq!(common::pixel_lines(&h.device).last().unwrap(), "H47000000");
}

#[test]
fn test_clear_all_resets_everything() {
    let h = common::harness();
    h.tutor.add_key(60, 80, Some(0), 0);
    h.tutor.add_key(61, 80, None, 0);
    h.tutor.add_key(62, 80, Some(1), 4);
    h.tutor.clear_all_keys(None);
    assert_eq!(h.tutor.active_count(), 0);

    // every slot is free again, so a fresh note is lit and counted
    h.tutor.add_key(62, 80, Some(1), 4);
    assert_eq!(common::pixel_lines(&h.device).len(), 4);
}

#[test]
fn test_pitch_outside_strip_is_clamped() {
    let h = common::harness();
    h.tutor.add_key(127, 80, Some(0), 0);
    h.tutor.add_key(0, 80, Some(0), 0);
    assert_eq!(common::pixel_lines(&h.device), vec!["H00100010", "Hbe100010"]);
}
