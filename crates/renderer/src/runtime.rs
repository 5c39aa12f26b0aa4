use std::thread;

use anyhow::Result;

use crate::bench::Bench;
use crate::gpu::GpuContext;
use crate::types::BenchConfig;

/// Renders without a window until `max_samples`, then saves the outputs.
pub(crate) fn run_headless(config: &BenchConfig) -> Result<()> {
    let gpu = GpuContext::headless(config.gpu_power)?;
    let mut bench = Bench::new(config, gpu)?;
    loop {
        let outcome = bench.tick([0.0, 0.0])?;
        if outcome.finished {
            tracing::info!(samples = bench.samples(), elapsed = ?bench.elapsed(), "sample limit reached");
            break;
        }
        if !config.sleep.is_zero() {
            thread::sleep(config.sleep);
        }
    }
    bench.save_results()
}
