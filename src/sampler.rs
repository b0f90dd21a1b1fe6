//! Probabilistic gate for sampled metric events.

use rand::Rng;

/// Decides whether an event reported with `sample_rate` should be emitted.
///
/// A rate of 1 or above always emits and a rate of 0 or below (or NaN) never does;
/// neither consults `rng`. Any other rate draws once from `[0, 1)` and emits when the
/// draw falls below the rate.
pub fn should_send<R: Rng + ?Sized>(rng: &mut R, sample_rate: f64) -> bool {
    if sample_rate >= 1.0 {
        return true;
    }

    if sample_rate.is_nan() || sample_rate <= 0.0 {
        return false;
    }

    rng.random::<f64>() < sample_rate
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{
        rngs::StdRng,
        RngCore,
        SeedableRng,
    };

    struct PanickingRng;

    impl RngCore for PanickingRng {
        fn next_u32(&mut self) -> u32 {
            panic!("rng consulted");
        }

        fn next_u64(&mut self) -> u64 {
            panic!("rng consulted");
        }

        fn fill_bytes(&mut self, _dst: &mut [u8]) {
            panic!("rng consulted");
        }
    }

    #[test]
    fn full_rate_skips_rng() {
        let mut rng = PanickingRng;
        for _ in 0..100 {
            assert!(should_send(&mut rng, 1.0));
        }
    }

    #[test]
    fn zero_rate_never_sends() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!((0..10_000).all(|_| !should_send(&mut rng, 0.0)));

        let mut rng = PanickingRng;
        assert!(!should_send(&mut rng, 0.0));
        assert!(!should_send(&mut rng, -0.5));
        assert!(!should_send(&mut rng, f64::NAN));
    }

    #[test]
    fn frequency_tracks_rate() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let sent = (0..10_000).filter(|_| should_send(&mut rng, 0.3)).count();

        assert!(
            (2850..=3150).contains(&sent),
            "sent {} of 10000 at rate 0.3",
            sent
        );
    }
}
