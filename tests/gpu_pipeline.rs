use std::collections::BTreeSet;

use cgmath::{Matrix4, Point3, Transform, Vector3};
use sparkle::device::headless_device;
use sparkle::dispatch::sort_length;
use sparkle::indirect::QUAD_VERTEX_COUNT;
use sparkle::layout::ParticleLayout;
use sparkle::params::{BoundingVolume, SparkleConfig};
use sparkle::particle_store::{Compaction, Particle, Side};
use sparkle::particle_system::ParticleSystem;
use sparkle::sort::round_count;

const DT: f32 = 1.0 / 60.0;

fn open(layout: ParticleLayout) -> Option<(wgpu::Device, wgpu::Queue)> {
    match headless_device(layout) {
        Ok(device) => Some(device),
        Err(e) => {
            println!("Skipping GPU test: {}", e);
            None
        }
    }
}

// No forces and no bounds: particles only age and drift with their velocity.
fn quiet_config(capacity: u32, batch_emit_count: u32) -> SparkleConfig {
    let mut config = SparkleConfig::default();
    config.capacity = capacity;
    config.batch_emit_count = batch_emit_count;
    config.random_seed = Some(7);
    config.vector_field.enabled = false;
    let sim = &mut config.simulation;
    sim.enable_scattering = false;
    sim.enable_vectorfield = false;
    sim.enable_curlnoise = false;
    sim.enable_velocity_control = false;
    sim.bounding_volume = BoundingVolume::None;
    config
}

fn particle(id: u32, position: [f32; 3], age: f32, start_age: f32) -> Particle {
    Particle {
        position: [position[0], position[1], position[2], 1.0],
        age,
        start_age,
        id,
        ..Particle::default()
    }
}

fn ids(particles: &[Particle]) -> BTreeSet<u32> {
    particles.iter().map(|p| p.id).collect()
}

fn look_from_z(distance: f32) -> Matrix4<f32> {
    Matrix4::look_at_rh(
        Point3::new(0.0, 0.0, distance),
        Point3::new(0.0, 0.0, 0.0),
        Vector3::unit_y(),
    )
}

#[test]
fn emission_appends_one_batch_per_frame() {
    for layout in [
        ParticleLayout::ArrayOfStructures,
        ParticleLayout::StructureOfArrays,
    ] {
        let Some((device, queue)) = open(layout) else {
            continue;
        };
        let mut config = quiet_config(1024, 256);
        config.layout = layout;
        let mut system = ParticleSystem::new(&device, &queue, &config).unwrap();

        let stats = system.update(&device, &queue, DT, look_from_z(100.0));
        assert!(stats.simulated);
        assert_eq!(stats.emitted, 256);
        assert_eq!(stats.live_count, 256);

        let particles = system
            .read_particles(&device, &queue, Side::Front, 256)
            .unwrap();
        assert_eq!(ids(&particles), (0..256).collect::<BTreeSet<u32>>());
        for p in &particles {
            assert!(p.start_age >= config.simulation.min_age);
            assert!(p.start_age <= config.simulation.max_age);
            assert!((p.age - DT).abs() < 1e-5);
        }

        let stats = system.update(&device, &queue, DT, look_from_z(100.0));
        assert_eq!(stats.live_count, 512);
        let particles = system
            .read_particles(&device, &queue, Side::Front, 512)
            .unwrap();
        assert_eq!(ids(&particles), (0..512).collect::<BTreeSet<u32>>());
        system.destroy();
    }
}

#[test]
fn emission_stops_at_capacity() {
    let Some((device, queue)) = open(ParticleLayout::ArrayOfStructures) else {
        return;
    };
    let mut system = ParticleSystem::new(&device, &queue, &quiet_config(512, 400)).unwrap();
    assert_eq!(system.update(&device, &queue, DT, look_from_z(1.0)).emitted, 400);
    let stats = system.update(&device, &queue, DT, look_from_z(1.0));
    assert_eq!(stats.emitted, 112);
    assert_eq!(stats.live_count, 512);
    assert_eq!(system.update(&device, &queue, DT, look_from_z(1.0)).emitted, 0);
    system.destroy();
}

#[test]
fn expired_particles_are_dropped() {
    let Some((device, queue)) = open(ParticleLayout::ArrayOfStructures) else {
        return;
    };
    let mut system = ParticleSystem::new(&device, &queue, &quiet_config(256, 0)).unwrap();
    system
        .seed(
            &queue,
            &[
                particle(1, [0.0; 3], 0.0, 10.0),
                particle(2, [1.0; 3], 10.0 + 1e-3, 10.0),
                particle(3, [2.0; 3], 1.0, 10.0),
            ],
        )
        .unwrap();

    let stats = system.update(&device, &queue, DT, look_from_z(10.0));
    assert_eq!(stats.emitted, 0);
    assert_eq!(stats.live_count, 2);
    let survivors = system
        .read_particles(&device, &queue, Side::Front, 2)
        .unwrap();
    assert_eq!(ids(&survivors), BTreeSet::from([1, 3]));

    let args = system.read_indirect_args(&device, &queue).unwrap();
    assert_eq!(args.draw_count, QUAD_VERTEX_COUNT);
    assert_eq!(args.draw_instance_count, 2);
    system.destroy();
}

#[test]
fn indirect_args_follow_the_live_count() {
    let Some((device, queue)) = open(ParticleLayout::ArrayOfStructures) else {
        return;
    };
    let mut system = ParticleSystem::new(&device, &queue, &quiet_config(4096, 1000)).unwrap();
    system.update(&device, &queue, DT, look_from_z(1.0));
    let args = system.read_indirect_args(&device, &queue).unwrap();
    // The dispatch covered the 1000 emitted particles, the draw covers the
    // 1000 survivors.
    assert_eq!(args.dispatch_x, 4);
    assert_eq!((args.dispatch_y, args.dispatch_z), (1, 1));
    assert_eq!(args.draw_instance_count, 1000);
    system.destroy();
}

#[test]
fn counters_swap_without_losing_particles() {
    let Some((device, queue)) = open(ParticleLayout::ArrayOfStructures) else {
        return;
    };
    let mut system = ParticleSystem::new(&device, &queue, &quiet_config(256, 0)).unwrap();
    let seeded: Vec<Particle> = (0..10)
        .map(|i| particle(100 + i, [i as f32, 0.0, 0.0], 0.0, 5.0))
        .collect();
    system.seed(&queue, &seeded).unwrap();
    system.update(&device, &queue, DT, look_from_z(1.0));

    let store = system.store();
    // The counter the simulation appended to is now A, the consumed one was
    // cleared and became B.
    assert_eq!(store.read_counter(&device, &queue, Side::Front).unwrap(), 10);
    assert_eq!(store.read_counter(&device, &queue, Side::Back).unwrap(), 0);
    let front = system
        .read_particles(&device, &queue, Side::Front, 10)
        .unwrap();
    assert_eq!(ids(&front), ids(&seeded));
    system.destroy();
}

#[test]
fn count_is_stable_without_emission_or_forces() {
    for compaction in [Compaction::Copy, Compaction::Swap] {
        let Some((device, queue)) = open(ParticleLayout::ArrayOfStructures) else {
            return;
        };
        let mut config = quiet_config(1024, 0);
        config.compaction = compaction;
        let mut system = ParticleSystem::new(&device, &queue, &config).unwrap();
        let seeded: Vec<Particle> = (0..500)
            .map(|i| particle(i, [0.0, i as f32, 0.0], 0.0, 8.0))
            .collect();
        system.seed(&queue, &seeded).unwrap();

        for _ in 0..2 {
            let stats = system.update(&device, &queue, DT, look_from_z(1.0));
            assert_eq!(stats.live_count, 500, "{:?}", compaction);
        }
        let front = system
            .read_particles(&device, &queue, Side::Front, 500)
            .unwrap();
        assert_eq!(ids(&front), ids(&seeded), "{:?}", compaction);
        system.destroy();
    }
}

#[test]
fn gpu_sort_orders_far_to_near() {
    for layout in [
        ParticleLayout::ArrayOfStructures,
        ParticleLayout::StructureOfArrays,
    ] {
        for compaction in [Compaction::Copy, Compaction::Swap] {
            let Some((device, queue)) = open(layout) else {
                continue;
            };
            let mut config = quiet_config(1024, 0);
            config.layout = layout;
            config.compaction = compaction;
            config.enable_sorting = true;
            let mut system = ParticleSystem::new(&device, &queue, &config).unwrap();
            let view = look_from_z(500.0);

            // Around the network boundaries, including a count below the minimum
            // network length.
            for count in [1u32, 2, 63, 64, 65, 300, 1024] {
                let case = format!("{:?} {:?} count {}", layout, compaction, count);
                // Distinct depths in scrambled order.
                let seeded: Vec<Particle> = (0..count)
                    .map(|i| {
                        let z = ((i * 7919) % count) as f32 - count as f32 / 2.0;
                        particle(i, [0.0, 0.0, z], 0.0, 5.0)
                    })
                    .collect();
                system.seed(&queue, &seeded).unwrap();

                let stats = system.update(&device, &queue, DT, view);
                assert!(stats.sorted, "{}", case);
                assert_eq!(stats.live_count, count, "{}", case);
                assert_eq!(
                    stats.sort_rounds,
                    round_count(sort_length(count)),
                    "{}",
                    case
                );
                if count >= 2 {
                    assert!(stats.sort_rounds > 0, "{}", case);
                }

                let sorted = system
                    .read_particles(&device, &queue, Side::Front, count)
                    .unwrap();
                assert_eq!(ids(&sorted), ids(&seeded), "{}", case);
                let depths: Vec<f32> = sorted
                    .iter()
                    .map(|p| {
                        let [x, y, z, _] = p.position;
                        -view.transform_point(Point3::new(x, y, z)).z
                    })
                    .collect();
                assert!(
                    depths.windows(2).all(|w| w[0] >= w[1]),
                    "{}: {:?}",
                    case,
                    depths
                );
            }
            system.destroy();
        }
    }
}
