use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::ParticleConfig;

/// Size of the particle array in the shader uniform block.
pub const MAX_PARTICLES: usize = 128;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    #[allow(dead_code)]
    pub id: u64,
    /// Clip-space position, always inside [-1, 1]²
    pub position: [f32; 2],
    /// Displacement per frame
    pub velocity: [f32; 2],
    pub remaining_life: f32,
}

/// Fixed-capacity pool of short-lived particles. After every `advance` the
/// pool holds exactly `capacity` particles.
pub struct ParticleField {
    particles: Vec<Particle>,
    capacity: usize,
    decay: f32,
    max_speed: f32,
    min_life: f32,
    max_life: f32,
    next_id: u64,
    rng: StdRng,
}

impl ParticleField {
    pub fn new(config: &ParticleConfig) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    #[allow(dead_code)]
    pub fn seeded(config: &ParticleConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &ParticleConfig, rng: StdRng) -> Self {
        let capacity = if config.count > MAX_PARTICLES {
            log::warn!("Particle count {} capped at {}", config.count, MAX_PARTICLES);
            MAX_PARTICLES
        } else {
            config.count
        };
        let defaults = ParticleConfig::default();
        let decay = if config.decay > 0.0 && config.decay.is_finite() {
            config.decay
        } else {
            log::warn!("Particle decay must be positive and finite, using {}", defaults.decay);
            defaults.decay
        };
        let max_speed = finite_or("max_speed", config.max_speed, defaults.max_speed).abs();
        let min_life = finite_or("min_life", config.min_life, defaults.min_life);
        let max_life = finite_or("max_life", config.max_life, defaults.max_life);
        let lo = min_life.min(max_life).max(f32::EPSILON);
        let hi = min_life.max(max_life).max(lo);

        let mut field = Self {
            particles: Vec::with_capacity(capacity),
            capacity,
            decay,
            max_speed,
            min_life: lo,
            max_life: hi,
            next_id: 0,
            rng,
        };
        field.refill();
        field
    }

    #[allow(dead_code)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// One frame: move, age, cull, backfill.
    pub fn advance(&mut self) {
        for p in &mut self.particles {
            p.position = [
                wrap(p.position[0] + p.velocity[0]),
                wrap(p.position[1] + p.velocity[1]),
            ];
            p.remaining_life -= self.decay;
        }
        self.particles.retain(|p| p.remaining_life > 0.0);
        self.refill();
    }

    fn refill(&mut self) {
        while self.particles.len() < self.capacity {
            let particle = self.spawn();
            self.particles.push(particle);
        }
    }

    fn spawn(&mut self) -> Particle {
        let s = self.max_speed;
        let id = self.next_id;
        self.next_id += 1;
        Particle {
            id,
            position: [self.rng.random_range(-1.0..=1.0), self.rng.random_range(-1.0..=1.0)],
            velocity: [self.rng.random_range(-s..=s), self.rng.random_range(-s..=s)],
            remaining_life: self.rng.random_range(self.min_life..=self.max_life),
        }
    }
}

/// Random ranges panic on non-finite bounds.
fn finite_or(name: &str, value: f32, default: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        log::warn!("Particle {} must be finite, using {}", name, default);
        default
    }
}

/// Wrap a coordinate back into [-1, 1).
fn wrap(x: f32) -> f32 {
    (x + 1.0).rem_euclid(2.0) - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(count: usize) -> ParticleConfig {
        ParticleConfig {
            count,
            ..ParticleConfig::default()
        }
    }

    #[test]
    fn pool_stays_at_capacity() {
        let mut field = ParticleField::seeded(&config(100), 7);
        assert_eq!(field.particles().len(), 100);
        for _ in 0..500 {
            field.advance();
            assert_eq!(field.particles().len(), 100);
        }
    }

    #[test]
    fn life_strictly_decreases_until_removed() {
        let mut field = ParticleField::seeded(&config(50), 42);
        let mut last: HashMap<u64, f32> = field
            .particles()
            .iter()
            .map(|p| (p.id, p.remaining_life))
            .collect();

        for _ in 0..200 {
            field.advance();
            for p in field.particles() {
                assert!(p.remaining_life > 0.0);
                if let Some(&prev) = last.get(&p.id) {
                    assert!(p.remaining_life < prev);
                }
            }
            last = field.particles().iter().map(|p| (p.id, p.remaining_life)).collect();
        }
    }

    #[test]
    fn positions_stay_in_clip_space() {
        let cfg = ParticleConfig {
            max_speed: 0.5,
            ..config(64)
        };
        let mut field = ParticleField::seeded(&cfg, 3);
        for _ in 0..100 {
            field.advance();
            for p in field.particles() {
                assert!((-1.0..=1.0).contains(&p.position[0]));
                assert!((-1.0..=1.0).contains(&p.position[1]));
            }
        }
    }

    #[test]
    fn expired_particles_are_replaced() {
        let cfg = ParticleConfig {
            decay: 1.0,
            min_life: 0.5,
            max_life: 0.5,
            ..config(10)
        };
        let mut field = ParticleField::seeded(&cfg, 1);
        let before: Vec<u64> = field.particles().iter().map(|p| p.id).collect();
        field.advance();
        assert_eq!(field.particles().len(), 10);
        assert!(field.particles().iter().all(|p| !before.contains(&p.id)));
    }

    #[test]
    fn non_finite_settings_fall_back_to_defaults() {
        let cfg = ParticleConfig {
            max_speed: f32::INFINITY,
            min_life: f32::NAN,
            max_life: f32::NEG_INFINITY,
            decay: f32::INFINITY,
            ..config(20)
        };
        let mut field = ParticleField::seeded(&cfg, 5);
        for _ in 0..10 {
            field.advance();
            assert_eq!(field.particles().len(), 20);
            for p in field.particles() {
                assert!(p.remaining_life.is_finite() && p.remaining_life > 0.0);
                assert!(p.velocity.iter().all(|v| v.abs() <= ParticleConfig::default().max_speed));
                assert!((-1.0..=1.0).contains(&p.position[0]));
            }
        }
    }

    #[test]
    fn capacity_is_capped() {
        let field = ParticleField::seeded(&config(10_000), 0);
        assert_eq!(field.capacity(), MAX_PARTICLES);
    }

    #[test]
    fn wrap_keeps_range() {
        assert!((wrap(1.2) - -0.8).abs() < 1e-6);
        assert!((wrap(-1.3) - 0.7).abs() < 1e-6);
        assert_eq!(wrap(0.25), 0.25);
    }
}
