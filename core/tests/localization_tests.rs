//! End-to-end localization tests: sensor weighting, convergence, recovery randomization,
//! resampling behavior and the scripted simulation with kidnapping.
use std::f64::consts::TAU;
use std::rc::Rc;

use assert_approx_eq::assert_approx_eq;
use mcl::measurements::{MeasurementModel, RangeMeasurement, likelihood};
use mcl::particle::{
    Particle, ParticleAveragingStrategy, ParticleFilter, ParticleFilterConfig,
    ParticleResamplingStrategy,
};
use mcl::sim::{ScriptedCommand, Simulation, SimulationConfig};
use mcl::{LandmarkMap, NoiseModel, Pose, World};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn landmarks(points: &[[f64; 2]]) -> Rc<LandmarkMap> {
    Rc::new(LandmarkMap::from(points))
}

fn noiseless_measurement(pose: Pose, map: &Rc<LandmarkMap>) -> RangeMeasurement {
    let mut rng = StdRng::seed_from_u64(0);
    Particle::new(pose, 1.0, NoiseModel::noiseless())
        .get_measurements(map, &mut rng)
        .unwrap()
}

#[test]
fn particle_on_the_truth_gets_the_highest_weight() {
    let map = landmarks(&[[40.0, 40.0]]);
    let measurement = noiseless_measurement(Pose::new(40.0, 40.0, 0.0), &map);
    assert_approx_eq!(measurement.get_vector()[0], 0.0, 1e-12);

    let noise = NoiseModel::new(0.2, 0.05, 2.0).unwrap();
    let particles = [(40.0, 40.0), (41.0, 40.0), (40.0, 37.0), (60.0, 60.0)]
        .iter()
        .map(|&(x, y)| Particle::new(Pose::new(x, y, 0.0), 0.25, noise))
        .collect();
    let config = ParticleFilterConfig {
        noise,
        seed: Some(1),
        ..Default::default()
    };
    let mut filter = ParticleFilter::from_particles(particles, config, map).unwrap();
    let weights = filter.calculate_weights(&measurement).unwrap();
    for (i, w) in weights.iter().enumerate().skip(1) {
        assert!(weights[0] > *w, "particle {i} outweighs the exact match");
    }
    assert!(weights[1] > weights[2] && weights[2] > weights[3]);
    assert_eq!(
        filter.estimate_location(),
        Pose::new(40.0, 40.0, 0.0)
    );
}

#[test]
fn stationary_agent_population_converges() {
    let map = landmarks(&[[1.0, 1.0], [8.0, 2.0], [3.0, 9.0], [9.0, 8.0]]);
    let truth = Pose::new(5.5, 4.5, 1.0);
    let config = ParticleFilterConfig {
        num_particles: 1000,
        noise: NoiseModel::new(0.1, 0.05, 0.5).unwrap(),
        percent_random_particles: 0,
        world: World::new(10.0, 10.0).unwrap(),
        seed: Some(7),
        ..Default::default()
    };
    let world = config.world;
    let mut filter = ParticleFilter::new(config, map.clone()).unwrap();
    let measurement = noiseless_measurement(truth, &map);
    for _ in 0..50 {
        filter.move_particles(0.0, 0.0).unwrap();
        filter.update(&measurement).unwrap();
    }
    let close = filter
        .particles()
        .iter()
        .filter(|p| world.toroidal_distance(&p.pose, &truth) <= 1.0)
        .count();
    assert!(close >= 900, "only {close} of 1000 particles converged");
    assert!(world.toroidal_distance(&filter.estimate_location(), &truth) <= 1.0);
}

#[test]
fn zero_sense_noise_filter_never_leaves_uniform_weights() {
    // With a zero-width sensor model only an exact pose match has a finite likelihood. No
    // particle ever sits exactly on the truth, so every weighting pass floors the whole population
    // and the filter degenerates into uniform weights: it never localizes.
    let map = landmarks(&[[1.0, 1.0], [8.0, 2.0], [3.0, 9.0], [9.0, 8.0]]);
    let truth = Pose::new(5.5, 4.5, 1.0);
    let n = 200;
    let config = ParticleFilterConfig {
        num_particles: n,
        noise: NoiseModel::new(0.1, 0.05, 0.0).unwrap(),
        percent_random_particles: 0,
        world: World::new(10.0, 10.0).unwrap(),
        seed: Some(29),
        ..Default::default()
    };
    let mut filter = ParticleFilter::new(config, map.clone()).unwrap();
    let measurement = noiseless_measurement(truth, &map);

    let weights = filter.calculate_weights(&measurement).unwrap();
    assert_eq!(filter.state().floored, n);
    for w in &weights {
        assert_approx_eq!(*w, 1.0 / n as f64, 1e-15);
    }
    assert_approx_eq!(filter.effective_sample_size(), n as f64, 1e-6);

    for _ in 0..10 {
        filter.move_particles(0.0, 0.0).unwrap();
        filter.update(&measurement).unwrap();
        assert_eq!(filter.state().floored, n);
        assert_approx_eq!(filter.state().effective_sample_size, n as f64, 1e-6);
        assert!(filter.check_health().is_ok());
    }
}

#[test]
fn recovery_randomization_resets_exactly_n_particles() {
    let config = ParticleFilterConfig {
        num_particles: 1000,
        seed: Some(17),
        ..Default::default()
    };
    let mut filter = ParticleFilter::new(config, landmarks(&[[10.0, 10.0]])).unwrap();
    let before = filter.particles().to_vec();
    let mut indices = filter.randomize_n_particles(100).unwrap();
    assert_eq!(indices.len(), 100);
    indices.sort_unstable();
    indices.dedup();
    assert_eq!(indices.len(), 100, "indices are not distinct");

    let after = filter.particles();
    let changed = before
        .iter()
        .zip(after)
        .filter(|(b, a)| b.pose != a.pose)
        .count();
    assert_eq!(changed, 100);
    for (i, (b, a)) in before.iter().zip(after).enumerate() {
        assert_eq!(b.weight, a.weight);
        if indices.binary_search(&i).is_err() {
            assert_eq!(b.pose, a.pose, "particle {i} moved without being selected");
        } else {
            assert!(filter.world().contains(&a.pose));
        }
    }
}

#[test]
fn resampling_concentrates_on_the_only_weighted_particle() {
    let mut rng = StdRng::seed_from_u64(99);
    let particles: Vec<Particle> = (0..4)
        .map(|i| Particle::new(Pose::new(i as f64, 0.0, 0.0), 0.0, NoiseModel::default()))
        .collect();
    let weights = [0.0, 0.0, 0.0, 1.0];
    let mut picked_last = 0usize;
    let mut total = 0usize;
    for _ in 0..1000 {
        let resampled = ParticleResamplingStrategy::LowVariance
            .resample(&particles, &weights, &mut rng)
            .unwrap();
        total += resampled.len();
        picked_last += resampled.iter().filter(|p| p.pose.x == 3.0).count();
    }
    assert!(picked_last as f64 / total as f64 > 0.99);
}

#[test]
fn full_cycle_preserves_population_size() {
    let map = landmarks(&[[10.0, 10.0], [50.0, 70.0], [70.0, 12.0]]);
    let measurement = noiseless_measurement(Pose::new(33.0, 44.0, 0.5), &map);
    for strategy in [
        ParticleResamplingStrategy::LowVariance,
        ParticleResamplingStrategy::Multinomial,
        ParticleResamplingStrategy::Residual,
    ] {
        for n in [1usize, 2, 5, 17, 100] {
            let config = ParticleFilterConfig {
                num_particles: n,
                resampling_strategy: strategy,
                seed: Some(n as u64),
                ..Default::default()
            };
            let mut filter = ParticleFilter::new(config, map.clone()).unwrap();
            for _ in 0..3 {
                filter.move_particles(1.0, 0.1).unwrap();
                filter.update(&measurement).unwrap();
                assert_eq!(filter.num_particles(), n);
                assert!(filter.check_health().is_ok());
            }
        }
    }
}

#[test]
fn likelihood_decreases_with_distance_from_truth() {
    let map = landmarks(&[[10.0, 10.0], [50.0, 70.0], [70.0, 12.0]]);
    let truth = Pose::new(40.0, 40.0, 0.0);
    let measurement = noiseless_measurement(truth, &map);
    let near = likelihood(&measurement, &Pose::new(40.5, 40.0, 0.0), 2.0).unwrap();
    let far = likelihood(&measurement, &Pose::new(46.0, 40.0, 0.0), 2.0).unwrap();
    assert!(near > far, "near {near} <= far {far}");

    let mut particle = Particle::new(Pose::new(40.5, 40.0, 0.0), 0.0, NoiseModel::default());
    assert_approx_eq!(particle.measurement_prob(&measurement).unwrap(), near, 1e-18);
}

#[test]
fn noiseless_straight_motion_wraps_exactly() {
    let world = World::default();
    let mut rng = StdRng::seed_from_u64(0);
    let mut particle = Particle::new(Pose::new(0.0, 0.0, 0.0), 1.0, NoiseModel::noiseless());
    for _ in 0..25 {
        particle.propagate(7.3, 0.0, &world, &mut rng).unwrap();
    }
    assert_approx_eq!(particle.pose.x, 22.5, 1e-9);
    assert_approx_eq!(particle.pose.y, 0.0, 1e-9);
    assert_eq!(particle.pose.theta, 0.0);
}

#[test]
fn noisy_motion_never_leaves_the_world() {
    let world = World::new(20.0, 12.0).unwrap();
    let mut rng = StdRng::seed_from_u64(2024);
    let noise = NoiseModel::new(0.5, 0.3, 1.0).unwrap();
    let mut particles: Vec<Particle> = [(0.0, 0.0), (19.999, 11.999), (0.0, 11.5), (19.5, 0.1)]
        .iter()
        .map(|&(x, y)| Particle::new(Pose::new(x, y, 0.0), 1.0, noise))
        .collect();
    for _ in 0..2000 {
        let forward = rng.random_range(0.0..25.0);
        let turn = rng.random_range(-TAU..TAU);
        for particle in &mut particles {
            particle.propagate(forward, turn, &world, &mut rng).unwrap();
            assert!(world.contains(&particle.pose), "{} escaped", particle.pose);
        }
    }
}

#[test]
fn weighted_average_estimate_tracks_a_converged_cluster() {
    let map = landmarks(&[[1.0, 1.0], [8.0, 2.0], [3.0, 9.0], [9.0, 8.0]]);
    let truth = Pose::new(0.2, 9.8, 0.05);
    let config = ParticleFilterConfig {
        num_particles: 800,
        noise: NoiseModel::new(0.05, 0.02, 0.5).unwrap(),
        percent_random_particles: 0,
        world: World::new(10.0, 10.0).unwrap(),
        averaging_strategy: ParticleAveragingStrategy::WeightedAverage,
        seed: Some(5),
        ..Default::default()
    };
    let world = config.world;
    let mut filter = ParticleFilter::new(config, map.clone()).unwrap();
    let measurement = noiseless_measurement(truth, &map);
    for _ in 0..30 {
        filter.move_particles(0.0, 0.0).unwrap();
        filter.update(&measurement).unwrap();
    }
    // The truth sits on a corner of the torus, so a naive mean would land mid-world.
    let estimate = filter.estimate_location();
    assert!(
        world.toroidal_distance(&estimate, &truth) < 1.5,
        "estimate {estimate} is far from {truth}"
    );
}

#[test]
fn effective_sample_size_drops_after_an_informative_measurement() {
    let map = landmarks(&[[10.0, 10.0], [50.0, 70.0], [25.0, 30.0], [70.0, 12.0]]);
    let config = ParticleFilterConfig {
        num_particles: 500,
        seed: Some(3),
        ..Default::default()
    };
    let mut filter = ParticleFilter::new(config, map.clone()).unwrap();
    assert_approx_eq!(filter.effective_sample_size(), 500.0, 1e-6);
    let measurement = noiseless_measurement(Pose::new(20.0, 60.0, 0.0), &map);
    filter.calculate_weights(&measurement).unwrap();
    let ess = filter.effective_sample_size();
    assert!(ess >= 1.0 && ess < 250.0, "n_eff = {ess}");
    assert_approx_eq!(filter.state().effective_sample_size, ess, 1e-9);
}

#[test]
fn filter_recovers_after_kidnapping() {
    let config = SimulationConfig {
        commands: vec![ScriptedCommand::new(0.0, 0.0, 80)],
        kidnap_at_tick: Some(20),
        convergence_threshold: 5.0,
        filter: ParticleFilterConfig {
            num_particles: 1000,
            percent_random_particles: 10,
            seed: Some(11),
            ..Default::default()
        },
        ..Default::default()
    };
    let mut simulation = Simulation::new(config).unwrap();
    let summary = simulation.run().unwrap();
    assert_eq!(summary.ticks, 80);
    assert_eq!(summary.kidnapped_at, Some(20));
    assert!(
        summary.recovery_ticks.is_some(),
        "filter never re-converged: {summary}"
    );
    assert!(summary.mean_error.is_finite());
}

#[test]
fn scripted_run_tracks_a_moving_agent() {
    let config = SimulationConfig {
        kidnap_at_tick: None,
        filter: ParticleFilterConfig {
            seed: Some(23),
            ..Default::default()
        },
        ..Default::default()
    };
    let mut simulation = Simulation::new(config).unwrap();
    // Let the filter lock on before judging it.
    for _ in 0..20 {
        simulation.tick(1.0, 0.05).unwrap();
    }
    let mut errors = Vec::new();
    for _ in 0..20 {
        errors.push(simulation.tick(1.0, 0.05).unwrap().position_error);
    }
    let mean = errors.iter().sum::<f64>() / errors.len() as f64;
    assert!(mean < 5.0, "mean tracking error {mean}");
}
