//! Example demonstrating one writer and many readers sharing a map.
//!
//! The writer loads and churns entries while reader threads look keys up
//! and iterate, all without locks.

use std::thread;
use std::time::Instant;

use swmr_map::Builder;

fn main() {
    println!("=== Single-Writer Lock-Free Map Demo ===\n");

    const ENTRIES: u64 = 100_000;

    // Identity derivation: values are their own keys, so deleted slots are
    // recycled and reads are validated.
    let (mut writer, reader) = Builder::new(ENTRIES as usize)
        .load_factor(0.5)
        .value_to_key(|value: &u64| *value)
        .build();

    // Load the map from the writer thread while readers poll it.
    println!("Loading {} entries with 4 concurrent readers...", ENTRIES);
    let start = Instant::now();

    let mut readers = Vec::new();
    for reader_id in 0..4 {
        let reader = reader.clone();
        readers.push(thread::spawn(move || {
            let mut hits = 0u64;
            for _ in 0..10 {
                for key in (0..ENTRIES).step_by(101) {
                    if reader.get(&key).is_some() {
                        hits += 1;
                    }
                }
            }
            (reader_id, hits)
        }));
    }

    let writer_thread = thread::spawn(move || {
        for key in 0..ENTRIES {
            writer.insert(key, key).unwrap();
        }
        writer
    });

    let mut writer = writer_thread.join().unwrap();
    for handle in readers {
        let (reader_id, hits) = handle.join().unwrap();
        println!("  reader {} observed {} hits while loading", reader_id, hits);
    }

    let duration = start.elapsed();
    println!(
        "Loaded {} entries in {:?} ({:.0} inserts/sec)",
        ENTRIES,
        duration,
        ENTRIES as f64 / duration.as_secs_f64()
    );
    println!(
        "Map holds {} entries, deepest probe in use: {}\n",
        writer.len(),
        writer.max_probe_depth_in_use()
    );

    // Concurrent read throughput on the loaded map.
    println!("Benchmarking concurrent reads...");
    let start = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..8 {
        let reader = reader.clone();
        handles.push(thread::spawn(move || {
            let mut found = 0u64;
            for key in 0..ENTRIES {
                if reader.get(&key).is_some() {
                    found += 1;
                }
            }
            found
        }));
    }
    let mut total_found = 0;
    for handle in handles {
        total_found += handle.join().unwrap();
    }
    let duration = start.elapsed();
    println!(
        "Performed {} reads from 8 threads in {:?} ({:.0} reads/sec), {} hits\n",
        8 * ENTRIES,
        duration,
        (8 * ENTRIES) as f64 / duration.as_secs_f64(),
        total_found
    );

    // Iterate while the writer churns a disjoint key range.
    println!("Iterating while the writer churns...");
    let iterating = {
        let reader = reader.clone();
        thread::spawn(move || {
            let mut passes = 0;
            let mut yielded = 0u64;
            for _ in 0..5 {
                yielded += reader.iter().count() as u64;
                passes += 1;
            }
            (passes, yielded)
        })
    };
    for _ in 0..5 {
        for key in 0..1_000u64 {
            writer.remove(&key);
        }
        for key in 0..1_000u64 {
            writer.insert(key, key).unwrap();
        }
    }
    let (passes, yielded) = iterating.join().unwrap();
    println!(
        "  {} iteration passes yielded {} entries total\n",
        passes, yielded
    );

    // Random eviction drains the map.
    println!("Draining 10 random entries...");
    for _ in 0..10 {
        let value = writer.pop_random_value();
        println!("  evicted value {}", value);
    }
    println!("\nFinal size: {} entries", writer.len());

    println!("\n=== Demo Complete ===");
}
