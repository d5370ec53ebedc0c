use std::time::Duration;

use rand::Rng;

pub const BASE_RETRY_DELAY_MILLIS: u64 = 1_000;
pub const RETRY_BACKOFF_FACTOR: f64 = 2.0;
pub const MAX_RETRY_DELAY_MILLIS: u64 = 5 * 60 * 1_000;
pub const RANDOM_FACTOR: f64 = 0.5;

/// Delay before the next upload attempt after `failures` consecutive failed uploads.
pub fn retry_delay(failures: u32) -> Duration {
    Duration::from_millis(retry_delay_with_rng(failures, &mut rand::thread_rng()))
}

fn retry_delay_with_rng<R: Rng + ?Sized>(failures: u32, rng: &mut R) -> u64 {
    let exponent = failures.saturating_sub(1).min(30) as i32;
    let base = (BASE_RETRY_DELAY_MILLIS as f64) * RETRY_BACKOFF_FACTOR.powi(exponent);
    let jitter = RANDOM_FACTOR * base * rng.gen_range(-1.0..=1.0);
    (base + jitter)
        .round()
        .clamp(0.0, MAX_RETRY_DELAY_MILLIS as f64) as u64
}
