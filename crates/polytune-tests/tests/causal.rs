use polytune_midi::{MidiOut, MidiOutConfig, MidiOutError, RecordingSink, SinkEvent};

fn engine() -> (MidiOut<RecordingSink>, RecordingSink) {
    let sink = RecordingSink::new();
    let out = MidiOut::new(Some(sink.clone()), &MidiOutConfig::with_channels([0, 1])).unwrap();
    (out, sink)
}

#[test]
fn equal_times_are_accepted() {
    let (mut out, _sink) = engine();
    let a = out.note_on(440.0, None, Some(10.0)).unwrap();
    let b = out.note_on(550.0, None, Some(10.0)).unwrap();
    a.release(&mut out, None, Some(10.0)).unwrap();
    b.release(&mut out, None, Some(10.0)).unwrap();
    assert_eq!(out.last_time(), 10.0);
}

#[test]
fn earlier_times_fail_loudly() {
    let (mut out, sink) = engine();
    out.note_on(440.0, None, Some(10.0)).unwrap();
    let before = sink.events().len();
    let err = out.note_on(440.0, None, Some(9.999)).unwrap_err();
    assert_eq!(
        err,
        MidiOutError::CausalViolation {
            time: 9.999,
            last: 10.0
        }
    );
    assert_eq!(sink.events().len(), before);
    // The failed call leaves the floor untouched.
    assert_eq!(out.last_time(), 10.0);
}

#[test]
fn clear_moves_the_floor_to_the_clear_time() {
    let (mut out, sink) = engine();
    let held = out.note_on(440.0, None, Some(1_000.0)).unwrap();
    sink.set_now(200.0);
    out.clear();
    assert_eq!(out.last_time(), 200.0);

    out.note_on(440.0, None, Some(250.0)).unwrap();
    assert!(out.note_on(440.0, None, Some(150.0)).is_err());
    // A stale handle can still be released after the floor.
    held.release(&mut out, None, Some(300.0)).unwrap();

    let tail: Vec<SinkEvent> = sink
        .events()
        .into_iter()
        .skip_while(|e| *e != SinkEvent::Clear)
        .collect();
    assert_eq!(tail[0], SinkEvent::Clear);
    assert_eq!(tail[1], SinkEvent::AllNotesOff);
}

#[test]
fn rejected_calls_leave_the_floor_in_place() {
    let (mut out, sink) = engine();
    out.note_on(440.0, None, Some(50.0)).unwrap();
    let before = sink.events().len();

    assert!(out.note_on(-440.0, None, Some(900.0)).is_err());
    assert!(out.note_on(440.0, None, Some(f64::NAN)).is_err());
    assert!(out.note_on(440.0, None, Some(f64::NEG_INFINITY)).is_err());
    assert_eq!(out.last_time(), 50.0);
    assert_eq!(sink.events().len(), before);

    out.note_on(550.0, None, Some(60.0)).unwrap();
    assert_eq!(out.last_time(), 60.0);
}

#[test]
fn clear_is_safe_without_pending_output() {
    let (mut out, sink) = engine();
    out.clear();
    out.clear();
    let clears = sink
        .events()
        .iter()
        .filter(|event| **event == SinkEvent::Clear)
        .count();
    assert_eq!(clears, 2);
}

#[test]
fn double_release_sends_two_note_offs() {
    let (mut out, sink) = engine();
    let handle = out.note_on(440.0, None, Some(0.0)).unwrap();
    handle.release(&mut out, None, Some(1.0)).unwrap();
    handle.release(&mut out, None, Some(2.0)).unwrap();
    let offs = sink
        .notes()
        .iter()
        .filter(|event| matches!(event, SinkEvent::NoteOff { .. }))
        .count();
    assert_eq!(offs, 2);
}
