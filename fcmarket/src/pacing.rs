use rand::Rng;
use std::time::Duration;

/// A randomized pause between two bounds, optionally lengthened at random.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pacing {
    pub min: f64,
    pub max: f64,
    pub extra: Extra,
}

/// How a sampled delay is occasionally lengthened.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Extra {
    None,
    /// With `chance`, add a uniform pause in `[min, max]` seconds.
    Add { chance: f64, min: f64, max: f64 },
    /// With `chance`, multiply the delay by a uniform factor in `[min, max]`.
    Stretch { chance: f64, min: f64, max: f64 },
}

impl Pacing {
    pub const fn uniform(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            extra: Extra::None,
        }
    }

    pub const fn with_pause(self, chance: f64, min: f64, max: f64) -> Self {
        Self {
            extra: Extra::Add { chance, min, max },
            ..self
        }
    }

    pub const fn with_stretch(self, chance: f64, min: f64, max: f64) -> Self {
        Self {
            extra: Extra::Stretch { chance, min, max },
            ..self
        }
    }

    pub fn sample_secs<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let base = uniform(rng, self.min, self.max);
        match self.extra {
            Extra::None => base,
            Extra::Add { chance, min, max } if rng.gen_bool(chance.clamp(0.0, 1.0)) => {
                base + uniform(rng, min, max)
            }
            Extra::Stretch { chance, min, max } if rng.gen_bool(chance.clamp(0.0, 1.0)) => {
                base * uniform(rng, min, max)
            }
            _ => base,
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        secs(self.sample_secs(rng))
    }

    /// Samples with the thread-local generator.
    pub fn next(&self) -> Duration {
        self.sample(&mut rand::thread_rng())
    }

    pub fn scaled(&self, factor: f64) -> Duration {
        secs(self.sample_secs(&mut rand::thread_rng()) * factor)
    }
}

fn uniform<R: Rng + ?Sized>(rng: &mut R, min: f64, max: f64) -> f64 {
    if max > min {
        rng.gen_range(min..=max)
    } else {
        min
    }
}

fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}

/// Normal sample centred between the bounds (sd = range / 4), clamped to them.
pub fn gaussian<R: Rng + ?Sized>(rng: &mut R, min: f64, max: f64) -> Duration {
    let mean = (min + max) / 2.0;
    let std_dev = (max - min) / 4.0;

    // Box-Muller
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();

    secs((mean + z * std_dev).clamp(min, max))
}

/// Uniform in `[center - spread, center + spread]`, never below `floor`.
pub fn around<R: Rng + ?Sized>(rng: &mut R, center: f64, spread: f64, floor: f64) -> Duration {
    secs(uniform(rng, center - spread, center + spread).max(floor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn uniform_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(1);
        let pacing = Pacing::uniform(3.0, 7.0);
        for _ in 0..1_000 {
            let s = pacing.sample_secs(&mut rng);
            assert!((3.0..=7.0).contains(&s), "{s}");
        }
    }

    #[test]
    fn extra_pause_is_added_only_sometimes() {
        let mut rng = StdRng::seed_from_u64(2);
        let pacing = Pacing::uniform(8.0, 18.0).with_pause(0.2, 5.0, 20.0);
        let samples: Vec<f64> = (0..2_000).map(|_| pacing.sample_secs(&mut rng)).collect();

        assert!(samples.iter().all(|s| (8.0..=38.0).contains(s)));
        let long = samples.iter().filter(|&&s| s > 18.0).count();
        assert!(long > 100 && long < 700, "{long}");
    }

    #[test]
    fn stretch_multiplies_the_base() {
        let mut rng = StdRng::seed_from_u64(3);
        let always = Pacing::uniform(2.0, 2.0).with_stretch(1.0, 1.5, 3.0);
        for _ in 0..100 {
            let s = always.sample_secs(&mut rng);
            assert!((3.0..=6.0).contains(&s), "{s}");
        }
    }

    #[test]
    fn degenerate_range_returns_min() {
        let mut rng = StdRng::seed_from_u64(4);
        assert_eq!(Pacing::uniform(5.0, 1.0).sample_secs(&mut rng), 5.0);
    }

    #[test]
    fn gaussian_is_clamped() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..1_000 {
            let d = gaussian(&mut rng, 2.0, 4.0).as_secs_f64();
            assert!((2.0..=4.0).contains(&d), "{d}");
        }
    }

    #[test]
    fn around_respects_floor() {
        let mut rng = StdRng::seed_from_u64(6);
        for _ in 0..1_000 {
            let d = around(&mut rng, 4.0, 3.0, 5.0).as_secs_f64();
            assert!((5.0..=7.0).contains(&d), "{d}");
        }
    }
}
