use approx::assert_relative_eq;
use terrastack::core::composite::{max_of, mean_of, min_of};
use terrastack::core::{index_grid, CompositePolicy, Compositor, SpectralIndex, ValidityMask};
use terrastack::types::{Band, BandCube, Collection, GeoReference, RasterStack, BASE_BAND_COUNT};

/// Deterministic pseudo-random values (64-bit LCG)
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u32 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 33) as u32
    }

    fn reflectance(&mut self) -> f32 {
        (self.next() % 4000) as f32
    }
}

/// Stack of `scenes` images of `rows` x `cols`, roughly a quarter of pixels invalid
fn synthetic_collection(scenes: usize, rows: usize, cols: usize, seed: u64) -> Collection {
    let mut rng = Lcg(seed);
    let stacks = (0..scenes)
        .map(|i| {
            let mut data = BandCube::zeros((BASE_BAND_COUNT, rows, cols));
            for row in 0..rows {
                for col in 0..cols {
                    for band in Band::REFLECTANCE {
                        data[[band.index(), row, col]] = rng.reflectance();
                    }
                    let alpha = if rng.next() % 4 == 0 { 0.0 } else { 65535.0 };
                    data[[Band::Alpha.index(), row, col]] = alpha;
                }
            }
            RasterStack::new(format!("scene_{:02}.tif", i), data, GeoReference::default()).unwrap()
        })
        .collect();
    Collection::new(stacks).unwrap()
}

fn two_scene(alpha_a: f32, alpha_b: f32) -> Collection {
    let build = |label: &str, red: f32, nir: f32, alpha: f32| {
        let mut data = BandCube::zeros((BASE_BAND_COUNT, 1, 1));
        data[[Band::Red.index(), 0, 0]] = red;
        data[[Band::Nir.index(), 0, 0]] = nir;
        data[[Band::Alpha.index(), 0, 0]] = alpha;
        RasterStack::new(label, data, GeoReference::default()).unwrap()
    };
    Collection::new(vec![build("A", 10.0, 30.0, alpha_a), build("B", 5.0, 5.0, alpha_b)]).unwrap()
}

#[test]
fn test_concrete_two_scene_scenario() {
    let collection = two_scene(1.0, 1.0);
    let compositor = Compositor::standard();

    let ndvi_a = index_grid(SpectralIndex::Ndvi, &collection.stacks()[0]);
    let ndvi_b = index_grid(SpectralIndex::Ndvi, &collection.stacks()[1]);
    assert_relative_eq!(ndvi_a[[0, 0]].unwrap(), 0.5);
    assert_relative_eq!(ndvi_b[[0, 0]].unwrap(), 0.0);

    let greenest = compositor.composite(CompositePolicy::Greenest, &collection).unwrap();
    let a_pixel = collection.stacks()[0].pixel(0, 0).to_vec();
    assert_eq!(greenest.pixel(0, 0).unwrap(), a_pixel);

    let red = |policy| {
        compositor
            .composite(policy, &collection)
            .unwrap()
            .value(Band::Red, 0, 0)
            .unwrap()
    };
    assert_eq!(red(CompositePolicy::Min), 5.0);
    assert_eq!(red(CompositePolicy::Max), 10.0);
    assert_relative_eq!(red(CompositePolicy::Mean), 7.5);
    assert_relative_eq!(red(CompositePolicy::Median), 7.5);
}

#[test]
fn test_no_contributor_scenario() {
    let collection = two_scene(0.0, 0.0);
    let compositor = Compositor::standard();
    for policy in CompositePolicy::defaults() {
        let composite = compositor.composite(policy, &collection).unwrap();
        assert!(!composite.is_defined(0, 0), "{} must not define the pixel", policy);
        assert_eq!(composite.value(Band::Red, 0, 0), None);
    }
}

#[test]
fn test_masking_monotonicity() {
    // Changing the values of an image at pixels where it is invalid must not
    // change any composite.
    let collection = synthetic_collection(6, 8, 8, 7);
    let compositor = Compositor::standard();

    let mut perturbed = Vec::new();
    for stack in collection.iter() {
        let mask = ValidityMask::from_stack(stack);
        let (label, mut data, georef) = stack.clone().into_parts();
        for row in 0..8 {
            for col in 0..8 {
                if !mask.is_valid(row, col) {
                    for band in Band::REFLECTANCE {
                        data[[band.index(), row, col]] = 9999.0 - data[[band.index(), row, col]];
                    }
                }
            }
        }
        perturbed.push(RasterStack::new(label, data, georef).unwrap());
    }
    let perturbed = Collection::new(perturbed).unwrap();

    for policy in CompositePolicy::defaults() {
        let original = compositor.composite(policy, &collection).unwrap();
        let changed = compositor.composite(policy, &perturbed).unwrap();
        assert_eq!(original.defined, changed.defined, "{}", policy);
        for row in 0..8 {
            for col in 0..8 {
                assert_eq!(original.pixel(row, col), changed.pixel(row, col), "{} at ({}, {})", policy, row, col);
            }
        }
    }
}

#[test]
fn test_elementwise_bounds() {
    let collection = synthetic_collection(5, 10, 10, 42);
    let compositor = Compositor::standard();
    let min = compositor.composite(CompositePolicy::Min, &collection).unwrap();
    let max = compositor.composite(CompositePolicy::Max, &collection).unwrap();
    let mean = compositor.composite(CompositePolicy::Mean, &collection).unwrap();
    let median = compositor.composite(CompositePolicy::Median, &collection).unwrap();

    for row in 0..10 {
        for col in 0..10 {
            if !mean.is_defined(row, col) {
                assert!(!min.is_defined(row, col));
                assert!(!median.is_defined(row, col));
                continue;
            }
            for band in Band::REFLECTANCE {
                let lo = min.value(band, row, col).unwrap();
                let hi = max.value(band, row, col).unwrap();
                let avg = mean.value(band, row, col).unwrap();
                let mid = median.value(band, row, col).unwrap();
                assert!(lo <= avg + 1e-3 && avg <= hi + 1e-3);
                assert!(lo <= mid && mid <= hi);
            }
        }
    }
}

#[test]
fn test_elementwise_matches_reducers() {
    let collection = synthetic_collection(4, 5, 5, 3);
    let compositor = Compositor::standard();
    let mean = compositor.composite(CompositePolicy::Mean, &collection).unwrap();
    let min = compositor.composite(CompositePolicy::Min, &collection).unwrap();
    let max = compositor.composite(CompositePolicy::Max, &collection).unwrap();
    let masks: Vec<ValidityMask> = collection.iter().map(ValidityMask::from_stack).collect();

    for row in 0..5 {
        for col in 0..5 {
            let samples: Vec<(f32, bool)> = collection
                .iter()
                .zip(&masks)
                .map(|(stack, mask)| (stack.value(Band::Swir1, row, col).unwrap(), mask.is_valid(row, col)))
                .collect();
            assert_eq!(mean.value(Band::Swir1, row, col), mean_of(samples.clone()));
            assert_eq!(min.value(Band::Swir1, row, col), min_of(samples.clone()));
            assert_eq!(max.value(Band::Swir1, row, col), max_of(samples));
        }
    }
}

#[test]
fn test_greenest_selection_integrity() {
    let collection = synthetic_collection(6, 12, 12, 99);
    let greenest = Compositor::standard()
        .composite(CompositePolicy::Greenest, &collection)
        .unwrap();

    for row in 0..12 {
        for col in 0..12 {
            match greenest.pixel(row, col) {
                Some(pixel) => {
                    let source = greenest.source_scene(row, col).unwrap();
                    let stack = &collection.stacks()[source];
                    assert!(ValidityMask::from_stack(stack).is_valid(row, col));
                    assert_eq!(pixel, stack.pixel(row, col).to_vec());
                }
                None => assert!(greenest.source_scene(row, col).is_none()),
            }
        }
    }
}

#[test]
fn test_percentile_extremes() {
    let collection = synthetic_collection(7, 9, 9, 1234);
    let compositor = Compositor::standard();
    let greenest = compositor.composite(CompositePolicy::Greenest, &collection).unwrap();
    let p100 = compositor.composite(CompositePolicy::PercentileGreenest(1.0), &collection).unwrap();
    let p0 = compositor.composite(CompositePolicy::PercentileGreenest(0.0), &collection).unwrap();
    let ndvi: Vec<_> = collection.iter().map(|s| index_grid(SpectralIndex::Ndvi, s)).collect();

    for row in 0..9 {
        for col in 0..9 {
            assert_eq!(greenest.pixel(row, col), p100.pixel(row, col));

            let defined: Vec<f64> = ndvi.iter().filter_map(|grid| grid[[row, col]]).collect();
            match p0.source_scene(row, col) {
                Some(source) => {
                    let lowest = defined.iter().cloned().fold(f64::INFINITY, f64::min);
                    assert_eq!(ndvi[source][[row, col]], Some(lowest));
                }
                None => assert!(defined.is_empty()),
            }
        }
    }
}

#[test]
fn test_output_excludes_cloud_band() {
    let collection = synthetic_collection(3, 4, 4, 5);
    let masked = terrastack::CloudClassifier::standard()
        .classify_collection(collection)
        .unwrap();
    assert_eq!(masked.band_count(), 8);

    let composite = Compositor::standard()
        .composite(CompositePolicy::Median, &masked)
        .unwrap();
    assert_eq!(composite.band_count(), BASE_BAND_COUNT);
}
