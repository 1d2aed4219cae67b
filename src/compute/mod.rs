mod cpu;

#[cfg(target_os = "macos")]
mod metal;

pub use cpu::CpuBackend;
#[cfg(target_os = "macos")]
pub use self::metal::MetalBackend;

use crate::config::EngineMode;
use crate::kernel::{KernelArgs, KernelProgram};
use num_complex::Complex64;

/// A compiled kernel bound to a device.
///
/// `render` is the per-frame hot path: it must never rebuild the kernel.
pub trait ComputeBackend {
    fn name(&self) -> &'static str;

    /// Evaluates the kernel once per entry of `plane`, writing packed
    /// `0xAARRGGBB` colors into `out` (same length as `plane`).
    fn render(
        &mut self,
        plane: &[Complex64],
        args: &KernelArgs,
        out: &mut [u32],
    ) -> anyhow::Result<()>;
}

/// Runs `build` on `device` when there is one.
///
/// `Ok(None)` means no device, so the caller may fall back to the CPU.
/// A failing `build` is returned as is: the kernel did not compile.
pub fn on_device<D, B>(
    device: Option<D>,
    build: impl FnOnce(D) -> anyhow::Result<B>,
) -> anyhow::Result<Option<B>> {
    device.map(build).transpose()
}

/// Builds the requested backend.
///
/// Metal falls back to the CPU only when no device exists; a kernel that
/// does not compile for an existing device is a hard error.
pub fn create_backend(
    engine: EngineMode,
    program: KernelProgram,
    workers: usize,
) -> anyhow::Result<Box<dyn ComputeBackend>> {
    if engine == EngineMode::Metal {
        #[cfg(target_os = "macos")]
        {
            let device = MetalBackend::system_device();
            if let Some(backend) = on_device(device, |d| MetalBackend::new(d, &program))? {
                return Ok(Box::new(backend));
            }
            log::warn!("no Metal device found; using CPU");
        }
        #[cfg(not(target_os = "macos"))]
        log::warn!("Metal backend is only available on macOS; using CPU");
    }
    Ok(Box::new(CpuBackend::new(program, workers)?))
}
