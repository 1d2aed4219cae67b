use super::ComputeBackend;
use crate::kernel::{msl, KernelArgs, KernelProgram};
use anyhow::{anyhow, bail};
use metal::*;
use num_complex::Complex64;
use objc::rc::autoreleasepool;

#[repr(C)]
#[derive(Clone, Copy)]
struct Args {
    count: u32,
    julia: u32,
    max_iter: u32,
    pre_iter: u32,

    gradient_frequency: f32,
    c_real: f32,
    c_imag: f32,
    trap_real: f32,

    trap_imag: f32,
    trap_width: f32,
    _pad: [f32; 2],
}

pub struct MetalBackend {
    device: Device,
    queue: CommandQueue,
    pipeline: ComputePipelineState,

    capacity: usize,
    plane_buf: Buffer,
    pixel_buf: Buffer,
    extra_buf: Buffer,
    extra_len: usize,
}

impl MetalBackend {
    /// The default GPU, or `None` when the machine has no Metal device.
    pub fn system_device() -> Option<Device> {
        Device::system_default()
    }

    /// Compiles `program` for `device`. Any failure here is a kernel error.
    pub fn new(device: Device, program: &KernelProgram) -> anyhow::Result<Self> {
        let queue = device.new_command_queue();

        let options = CompileOptions::new();
        options.set_fast_math_enabled(false);
        let library = device
            .new_library_with_source(program.source(), &options)
            .map_err(|e| anyhow!("Metal kernel compile failed: {e}"))?;
        let func = library
            .get_function(msl::ENTRY_POINT, None)
            .map_err(|e| anyhow!("Metal get_function({}) failed: {e}", msl::ENTRY_POINT))?;
        let pipeline = device
            .new_compute_pipeline_state_with_function(&func)
            .map_err(|e| anyhow!("Metal compute pipeline creation failed: {e}"))?;

        let extra_len = program.spec().extra_params.len().max(1);
        let extra_buf = device.new_buffer(
            (extra_len * std::mem::size_of::<f32>()) as u64,
            MTLResourceOptions::StorageModeShared,
        );
        let (plane_buf, pixel_buf) = make_buffers(&device, 1);

        log::info!("Metal kernel compiled on {}", device.name());
        Ok(Self {
            device,
            queue,
            pipeline,
            capacity: 1,
            plane_buf,
            pixel_buf,
            extra_buf,
            extra_len,
        })
    }

    fn ensure_capacity(&mut self, count: usize) {
        if count <= self.capacity {
            return;
        }
        let (plane_buf, pixel_buf) = make_buffers(&self.device, count);
        self.plane_buf = plane_buf;
        self.pixel_buf = pixel_buf;
        self.capacity = count;
    }
}

impl ComputeBackend for MetalBackend {
    fn name(&self) -> &'static str {
        "metal"
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
        let count = plane.len();
        if count == 0 {
            return Ok(());
        }
        self.ensure_capacity(count);

        unsafe {
            let dst = std::slice::from_raw_parts_mut(
                self.plane_buf.contents().cast::<[f32; 2]>(),
                count,
            );
            for (d, p) in dst.iter_mut().zip(plane) {
                *d = [p.re as f32, p.im as f32];
            }
            let extra = std::slice::from_raw_parts_mut(
                self.extra_buf.contents().cast::<f32>(),
                self.extra_len,
            );
            extra.fill(0.0);
            for (d, v) in extra.iter_mut().zip(&args.extra) {
                *d = *v as f32;
            }
        }

        let uniforms = Args {
            count: count as u32,
            julia: args.julia as u32,
            max_iter: args.max_iter,
            pre_iter: args.pre_iter,
            gradient_frequency: args.gradient_frequency as f32,
            c_real: args.c.re as f32,
            c_imag: args.c.im as f32,
            trap_real: args.trap_real as f32,
            trap_imag: args.trap_imag as f32,
            trap_width: args.trap_width as f32,
            _pad: [0.0; 2],
        };

        let cmd = autoreleasepool(|| {
            let cmd = self.queue.new_command_buffer();
            let encoder = cmd.new_compute_command_encoder();
            encoder.set_compute_pipeline_state(&self.pipeline);
            encoder.set_buffer(0, Some(&self.plane_buf), 0);
            encoder.set_buffer(1, Some(&self.pixel_buf), 0);
            encoder.set_bytes(
                2,
                std::mem::size_of::<Args>() as u64,
                (&uniforms as *const Args).cast(),
            );
            encoder.set_buffer(3, Some(&self.extra_buf), 0);

            let width = self.pipeline.max_total_threads_per_threadgroup().clamp(1, 256);
            encoder.dispatch_threads(MTLSize::new(count as u64, 1, 1), MTLSize::new(width, 1, 1));
            encoder.end_encoding();

            // Retain the command buffer past the autoreleasepool.
            let owned = cmd.to_owned();
            owned.commit();
            owned
        });
        cmd.wait_until_completed();
        if cmd.status() == MTLCommandBufferStatus::Error {
            bail!("Metal command buffer failed");
        }

        unsafe {
            let src = std::slice::from_raw_parts(self.pixel_buf.contents().cast::<u32>(), count);
            out.copy_from_slice(src);
        }
        Ok(())
    }
}

fn make_buffers(device: &Device, count: usize) -> (Buffer, Buffer) {
    let count = count.max(1);
    let plane_buf = device.new_buffer(
        (count * std::mem::size_of::<[f32; 2]>()) as u64,
        MTLResourceOptions::StorageModeShared,
    );
    let pixel_buf = device.new_buffer(
        (count * std::mem::size_of::<u32>()) as u64,
        MTLResourceOptions::StorageModeShared,
    );
    (plane_buf, pixel_buf)
}
