use std::time::Instant;
use terrastack::core::{CloudClassifier, CompositePolicy, Compositor};
use terrastack::types::{Band, BandCube, Collection, GeoReference, RasterStack, BASE_BAND_COUNT};

/// Smoothly varying scenes with a diagonal no-data wedge per scene
fn build_collection(scenes: usize, size: usize) -> Collection {
    let stacks = (0..scenes)
        .map(|i| {
            let mut data = BandCube::zeros((BASE_BAND_COUNT, size, size));
            for row in 0..size {
                for col in 0..size {
                    let base = ((row * 7 + col * 3 + i * 101) % 2000) as f32;
                    data[[Band::Red.index(), row, col]] = 200.0 + base * 0.5;
                    data[[Band::Green.index(), row, col]] = 400.0 + base * 0.3;
                    data[[Band::Blue.index(), row, col]] = 1100.0 + base * 0.2;
                    data[[Band::Nir.index(), row, col]] = 2500.0 + base;
                    data[[Band::Swir1.index(), row, col]] = 1200.0;
                    data[[Band::Swir2.index(), row, col]] = 900.0;
                    let in_wedge = (row + i * 13) % size < col / 4;
                    data[[Band::Alpha.index(), row, col]] = if in_wedge { 0.0 } else { 65535.0 };
                }
            }
            RasterStack::new(format!("scene_{:02}.tif", i), data, GeoReference::default()).unwrap()
        })
        .collect();
    Collection::new(stacks).unwrap()
}

#[test]
fn test_composite_throughput() {
    let _ = env_logger::builder().is_test(true).try_init();

    let scenes = 8;
    let size = 128;
    let collection = build_collection(scenes, size);

    println!("\n=== Composite throughput: {} scenes of {}x{} ===", scenes, size, size);

    let classify_start = Instant::now();
    let collection = CloudClassifier::standard().classify_collection(collection).unwrap();
    println!("Cloud mask: {:.3} seconds", classify_start.elapsed().as_secs_f64());

    let compositor = Compositor::standard();
    let total_pixels = (scenes * size * size) as f64;
    for policy in CompositePolicy::defaults() {
        let start = Instant::now();
        let composite = compositor.composite(policy, &collection).unwrap();
        let elapsed = start.elapsed().as_secs_f64();

        println!(
            "  - {:<12} {:.3} seconds ({:.1} Mpix/s), {} undefined pixels",
            policy.name(),
            elapsed,
            total_pixels / elapsed.max(1e-9) / 1e6,
            composite.undefined_count()
        );
        assert_eq!(composite.shape(), (size, size));
        assert_eq!(composite.band_count(), BASE_BAND_COUNT);
    }
}

#[test]
fn test_row_parallel_matches_per_policy_results() {
    let collection = build_collection(5, 40);
    let compositor = Compositor::standard();
    let policies = CompositePolicy::defaults();

    let batch = compositor.composite_all(&policies, &collection).unwrap();
    assert_eq!(batch.len(), policies.len());

    for (policy, from_batch) in policies.into_iter().zip(&batch) {
        let single = compositor.composite(policy, &collection).unwrap();
        assert_eq!(from_batch.policy, policy);
        assert_eq!(from_batch.data, single.data);
        assert_eq!(from_batch.defined, single.defined);
        assert_eq!(from_batch.contributors, single.contributors);
    }
}

#[test]
fn test_composite_all_rejects_invalid_percentile_up_front() {
    let collection = build_collection(2, 4);
    let policies = [CompositePolicy::Mean, CompositePolicy::PercentileGreenest(1.5)];
    assert!(Compositor::standard().composite_all(&policies, &collection).is_err());
}

#[test]
fn test_composite_all_rejects_colliding_outputs() {
    let collection = build_collection(2, 4);
    let policies = [
        CompositePolicy::PercentileGreenest(0.851),
        CompositePolicy::PercentileGreenest(0.854),
    ];
    assert_eq!(policies[0].file_name(), policies[1].file_name());
    assert!(Compositor::standard().composite_all(&policies, &collection).is_err());
}
