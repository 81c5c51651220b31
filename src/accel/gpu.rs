//! wgpu compute path.
//!
//! One [`AcceleratorContext`] is alive at a time, keyed by device ordinal and
//! raster resolution. The program runs one invocation per raster sample and
//! writes `vec4<f32>` colors top row first, the same layout as
//! [`Raster`](crate::raster::Raster).

use super::device::DeviceInfo;
use super::Frame;
use crate::error::{EngineError, Result};
use bytemuck::{Pod, Zeroable};
use glam::{UVec2, Vec4};
use std::borrow::Cow;
use tracing::{debug, error};
use wgpu::{
    Adapter, BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingType, Buffer, BufferBindingType, BufferDescriptor, BufferUsages,
    CommandEncoderDescriptor, ComputePassDescriptor, ComputePipeline, ComputePipelineDescriptor,
    Device, DeviceDescriptor, ErrorFilter, Features, Instance, InstanceDescriptor, Limits,
    Maintain, MapMode, PipelineCompilationOptions, PipelineLayoutDescriptor, Queue,
    ShaderModuleDescriptor, ShaderSource, ShaderStages,
};

/// Compute entry point in the device program.
pub const ENTRY_POINT: &str = "main_image";
/// Workgroup edge; must match `@workgroup_size` in the program.
pub const WORKGROUP_SIZE: u32 = 8;

const SAMPLE_BYTES: u64 = std::mem::size_of::<[f32; 4]>() as u64;

/// Uniform block shared with the program; 48 bytes, std140 compatible.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameUniform {
    /// Ball centre, `w` unused.
    pub ball: [f32; 4],
    /// Paddle offsets: player one `xy`, player two `zw`.
    pub paddles: [f32; 4],
    /// Raster size in samples.
    pub resolution: [u32; 2],
    /// Cell height over width.
    pub char_height: f32,
    /// Perspective code.
    pub player: i32,
}

impl FrameUniform {
    /// Pack `frame` for a `resolution` raster.
    pub fn new(frame: &Frame, resolution: UVec2) -> Self {
        let scene = &frame.scene;
        Self {
            ball: scene.ball.extend(0.0).to_array(),
            paddles: [
                scene.player_one.x,
                scene.player_one.y,
                scene.player_two.x,
                scene.player_two.y,
            ],
            resolution: resolution.to_array(),
            char_height: frame.char_height,
            player: scene.player.code(),
        }
    }
}

fn instance() -> Instance {
    Instance::new(InstanceDescriptor::default())
}

fn adapters() -> Vec<Adapter> {
    instance().enumerate_adapters(wgpu::Backends::all())
}

/// Every adapter visible to wgpu, in stable enumeration order.
pub fn enumerate_adapters() -> Vec<DeviceInfo> {
    adapters()
        .iter()
        .map(|adapter| {
            let info = adapter.get_info();
            DeviceInfo {
                name: info.name,
                backend: format!("{:?}", info.backend),
                kind: format!("{:?}", info.device_type),
            }
        })
        .collect()
}

/// Device, compiled program and buffers for one resolution.
pub struct AcceleratorContext {
    ordinal: usize,
    resolution: UVec2,
    device: Device,
    queue: Queue,
    pipeline: ComputePipeline,
    bind_group: BindGroup,
    uniform: Buffer,
    output: Buffer,
    staging: Buffer,
}

impl AcceleratorContext {
    /// Open adapter `index` and build `source` for a `resolution` raster.
    ///
    /// Compile or entry-point errors come back as
    /// [`EngineError::ProgramBuild`]; anything else as [`EngineError::Device`].
    pub fn new(ordinal: usize, index: usize, resolution: UVec2, source: &str) -> Result<Self> {
        let adapter = adapters()
            .into_iter()
            .nth(index)
            .ok_or_else(|| EngineError::Device(format!("adapter {index} disappeared")))?;
        let name = adapter.get_info().name;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &DeviceDescriptor {
                label: Some("termarch device"),
                required_features: Features::empty(),
                required_limits: Limits::downlevel_defaults().using_resolution(adapter.limits()),
            },
            None,
        ))
        .map_err(|e| EngineError::Device(format!("{name}: {e}")))?;
        device.on_uncaptured_error(Box::new(|e: wgpu::Error| error!(error = %e, "uncaptured device error")));

        let (pipeline, layout) = build_program(&device, source)?;

        let samples = u64::from(resolution.x) * u64::from(resolution.y);
        let size = (samples * SAMPLE_BYTES).max(SAMPLE_BYTES);

        device.push_error_scope(ErrorFilter::OutOfMemory);
        device.push_error_scope(ErrorFilter::Validation);
        let uniform = device.create_buffer(&BufferDescriptor {
            label: Some("termarch frame"),
            size: std::mem::size_of::<FrameUniform>() as u64,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let output = device.create_buffer(&BufferDescriptor {
            label: Some("termarch raster"),
            size,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging = device.create_buffer(&BufferDescriptor {
            label: Some("termarch staging"),
            size,
            usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&BindGroupDescriptor {
            label: Some("termarch bindings"),
            layout: &layout,
            entries: &[
                BindGroupEntry {
                    binding: 0,
                    resource: output.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: uniform.as_entire_binding(),
                },
            ],
        });
        pop_scope(&device, EngineError::Device)?;
        pop_scope(&device, EngineError::Device)?;

        debug!(ordinal, device = %name, x = resolution.x, y = resolution.y, "accelerator context built");
        Ok(Self {
            ordinal,
            resolution,
            device,
            queue,
            pipeline,
            bind_group,
            uniform,
            output,
            staging,
        })
    }

    /// Whether this context serves `ordinal` at `resolution`.
    pub fn matches(&self, ordinal: usize, resolution: UVec2) -> bool {
        self.ordinal == ordinal && self.resolution == resolution
    }

    /// Run the program for `frame` and read the samples back into `out`.
    pub fn render(&mut self, frame: &Frame, out: &mut [Vec4]) -> Result<()> {
        let samples = (self.resolution.x * self.resolution.y) as usize;
        if out.len() != samples {
            return Err(EngineError::Device(format!(
                "raster has {} samples, context expects {samples}",
                out.len()
            )));
        }
        if samples == 0 {
            return Ok(());
        }

        let uniform = FrameUniform::new(frame, self.resolution);
        self.device.push_error_scope(ErrorFilter::Validation);
        self.queue.write_buffer(&self.uniform, 0, bytemuck::bytes_of(&uniform));

        let mut encoder = self.device.create_command_encoder(&CommandEncoderDescriptor {
            label: Some("termarch frame"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                label: Some("termarch march"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            pass.dispatch_workgroups(
                self.resolution.x.div_ceil(WORKGROUP_SIZE),
                self.resolution.y.div_ceil(WORKGROUP_SIZE),
                1,
            );
        }
        let bytes = samples as u64 * SAMPLE_BYTES;
        encoder.copy_buffer_to_buffer(&self.output, 0, &self.staging, 0, bytes);
        self.queue.submit(std::iter::once(encoder.finish()));
        pop_scope(&self.device, EngineError::Device)?;

        let slice = self.staging.slice(..bytes);
        let (tx, rx) = crossbeam_channel::bounded(1);
        slice.map_async(MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(Maintain::Wait);
        rx.recv()
            .map_err(|_| EngineError::Device("readback callback dropped".to_string()))?
            .map_err(|e| EngineError::Device(format!("readback: {e}")))?;

        {
            let mapped = slice.get_mapped_range();
            let colors: &[[f32; 4]] = bytemuck::cast_slice(&mapped);
            for (sample, color) in out.iter_mut().zip(colors) {
                *sample = Vec4::from_array(*color);
            }
        }
        self.staging.unmap();
        Ok(())
    }
}

fn build_program(device: &Device, source: &str) -> Result<(ComputePipeline, wgpu::BindGroupLayout)> {
    device.push_error_scope(ErrorFilter::Validation);
    let module = device.create_shader_module(ShaderModuleDescriptor {
        label: Some("termarch program"),
        source: ShaderSource::Wgsl(Cow::Borrowed(source)),
    });
    let layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some("termarch layout"),
        entries: &[
            BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStages::COMPUTE,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Storage { read_only: false },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            BindGroupLayoutEntry {
                binding: 1,
                visibility: ShaderStages::COMPUTE,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    });
    let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: Some("termarch pipeline layout"),
        bind_group_layouts: &[&layout],
        push_constant_ranges: &[],
    });
    let pipeline = device.create_compute_pipeline(&ComputePipelineDescriptor {
        label: Some("termarch pipeline"),
        layout: Some(&pipeline_layout),
        module: &module,
        entry_point: ENTRY_POINT,
        compilation_options: PipelineCompilationOptions::default(),
    });
    if let Err(e) = pop_scope(device, EngineError::ProgramBuild) {
        error!(error = %e, "device program rejected");
        return Err(e);
    }
    Ok((pipeline, layout))
}

fn pop_scope(device: &Device, wrap: fn(String) -> EngineError) -> Result<()> {
    match pollster::block_on(device.pop_error_scope()) {
        Some(e) => Err(wrap(e.to_string())),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accel::fill_cpu;
    use crate::raster::Raster;
    use crate::scene::SceneDescription;
    use crate::state::PlayerMode;
    use glam::{Vec2, Vec3};

    const PROGRAM: &str = include_str!("../../shaders/frag.wgsl");

    #[test]
    fn test_uniform_layout() {
        assert_eq!(std::mem::size_of::<FrameUniform>(), 48);
        let frame = Frame {
            scene: SceneDescription::new(Vec3::new(0.1, 0.2, 0.3), Vec2::new(1.0, 2.0), Vec2::new(3.0, 4.0), PlayerMode::PlayerTwo),
            char_height: 2.0,
        };
        let uniform = FrameUniform::new(&frame, UVec2::new(160, 96));
        assert_eq!(uniform.paddles, [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(uniform.resolution, [160, 96]);
        assert_eq!(uniform.player, 2);
    }

    #[test]
    fn test_device_matches_cpu() {
        if adapters().is_empty() {
            eprintln!("no compute adapter, skipping");
            return;
        }
        let resolution = UVec2::new(32, 16);
        let frame = Frame {
            scene: SceneDescription::new(Vec3::new(0.2, -0.1, 0.5), Vec2::new(0.1, 0.1), Vec2::ZERO, PlayerMode::PlayerOne),
            char_height: 2.0,
        };
        let mut context = match AcceleratorContext::new(1, 0, resolution, PROGRAM) {
            Ok(context) => context,
            Err(EngineError::Device(e)) => {
                eprintln!("device unavailable ({e}), skipping");
                return;
            }
            Err(e) => panic!("program failed to build: {e}"),
        };

        let mut device = Raster::new(resolution.x, resolution.y);
        context.render(&frame, device.as_mut_slice()).unwrap();
        let mut cpu = Raster::new(resolution.x, resolution.y);
        fill_cpu(&mut cpu, &frame);

        let total: f32 = device
            .as_slice()
            .iter()
            .zip(cpu.as_slice())
            .map(|(a, b)| (*a - *b).abs().truncate().max_element())
            .sum();
        let mean = total / device.as_slice().len() as f32;
        assert!(mean < 0.02, "mean per-sample difference {mean}");
    }

    #[test]
    fn test_broken_program_is_fatal() {
        if adapters().is_empty() {
            return;
        }
        match AcceleratorContext::new(1, 0, UVec2::new(8, 8), "@compute fn nope(") {
            Err(EngineError::ProgramBuild(_) | EngineError::Device(_)) => {}
            Err(e) => panic!("unexpected error {e}"),
            Ok(_) => panic!("broken program accepted"),
        }
    }
}
