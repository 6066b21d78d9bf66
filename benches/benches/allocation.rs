use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use polytune_midi::voice::VoiceAllocator;
use polytune_midi::{MidiOut, MidiOutConfig, Note, RecordingSink, TimeSpec};

fn allocate_16_channels(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocation");
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("allocate_31edo_cycle", |b| {
        let mut pool = VoiceAllocator::new(0..16);
        let offsets: Vec<f64> = (0..31)
            .map(|step| {
                let m = step as f64 * 1200.0 / 31.0 / 100.0;
                (m - m.round()) * 100.0
            })
            .collect();
        b.iter(|| {
            for &cents in &offsets {
                black_box(pool.allocate(black_box(cents)));
            }
        });
    });

    group.finish();
}

fn play_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("schedule");

    group.bench_function("play_256_notes", |b| {
        let notes: Vec<Note> = (0..256)
            .map(|i| {
                let hz = 110.0 * 2f64.powf(i as f64 / 53.0);
                Note::new(hz, TimeSpec::Relative((i * 7) as f64), 120.0)
            })
            .collect();
        b.iter(|| {
            let sink = RecordingSink::new();
            let mut out = MidiOut::new(Some(sink), &MidiOutConfig::default()).expect("engine");
            out.play_notes(black_box(&notes)).expect("play");
        });
    });

    group.finish();
}

criterion_group!(benches, allocate_16_channels, play_batch);
criterion_main!(benches);
