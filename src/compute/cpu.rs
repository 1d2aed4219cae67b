use super::ComputeBackend;
use crate::kernel::{KernelArgs, KernelProgram};
use anyhow::{bail, Context};
use num_complex::Complex64;
use rayon::prelude::*;

/// Evaluates the kernel in `f64` on a fixed pool, one contiguous chunk of
/// pixels per worker.
pub struct CpuBackend {
    program: KernelProgram,
    pool: rayon::ThreadPool,
    workers: usize,
}

impl CpuBackend {
    /// `workers == 0` uses one worker per available core.
    pub fn new(program: KernelProgram, workers: usize) -> anyhow::Result<Self> {
        let workers = if workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            workers
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|idx| format!("fractal-cpu-{idx}"))
            .build()
            .context("build CPU worker pool")?;
        Ok(Self {
            program,
            pool,
            workers,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn render(
        &mut self,
        plane: &[Complex64],
        args: &KernelArgs,
        out: &mut [u32],
    ) -> anyhow::Result<()> {
        if plane.len() != out.len() {
            bail!(
                "plane has {} points but the output buffer holds {} pixels",
                plane.len(),
                out.len()
            );
        }
        if plane.is_empty() {
            return Ok(());
        }

        let chunk = plane.len().div_ceil(self.workers).max(1);
        let program = &self.program;
        self.pool.install(|| {
            out.par_chunks_mut(chunk)
                .zip(plane.par_chunks(chunk))
                .for_each(|(dst, src)| {
                    for (px, pos) in dst.iter_mut().zip(src) {
                        *px = program.shade(*pos, args);
                    }
                });
        });
        Ok(())
    }
}
