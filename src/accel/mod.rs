//! Raster fill dispatch: parallel CPU path or a compute device.
//!
//! The render loop calls [`Dispatcher::fill_raster_or_cpu`] once per frame.
//! Device failures degrade that frame to the CPU path; a device program that
//! cannot be built is fatal.

mod device;
#[cfg(feature = "gpu")]
pub mod gpu;

pub use device::{DeviceInfo, DeviceList, Selection, CPU_DEVICE_NAME};

use crate::error::Result;
use crate::raster::Raster;
use crate::scene::{shade_sample, SceneDescription};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Everything the marcher needs for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    /// Scene geometry and perspective.
    pub scene: SceneDescription,
    /// Cell height over cell width.
    pub char_height: f32,
}

/// Which path produced a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillPath {
    /// Rayon rows on the CPU.
    Cpu,
    /// Device with this menu ordinal.
    Device(usize),
}

/// Shade every sample on the CPU, one rayon task per row.
pub fn fill_cpu(raster: &mut Raster, frame: &Frame) {
    let resolution = raster.resolution();
    let width = (resolution.x as usize).max(1);
    raster
        .as_mut_slice()
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, sample) in row.iter_mut().enumerate() {
                *sample = shade_sample(x as u32, y as u32, resolution, frame.char_height, &frame.scene);
            }
        });
}

/// Owns the device list and, with the `gpu` feature, the cached context.
pub struct Dispatcher {
    devices: DeviceList,
    program_path: PathBuf,
    #[cfg(feature = "gpu")]
    program: Option<String>,
    #[cfg(feature = "gpu")]
    context: Option<gpu::AcceleratorContext>,
}

impl Dispatcher {
    /// Dispatcher over `devices`; the device program is read on first use.
    pub fn new(devices: DeviceList, program_path: impl Into<PathBuf>) -> Self {
        Self {
            devices,
            program_path: program_path.into(),
            #[cfg(feature = "gpu")]
            program: None,
            #[cfg(feature = "gpu")]
            context: None,
        }
    }

    /// Enumerated devices.
    pub const fn devices(&self) -> &DeviceList {
        &self.devices
    }

    /// Device program location.
    pub fn program_path(&self) -> &Path {
        &self.program_path
    }

    /// Fill `raster` on the path chosen by `ordinal`.
    pub fn fill_raster(&mut self, raster: &mut Raster, frame: &Frame, ordinal: usize) -> Result<FillPath> {
        match self.devices.resolve(ordinal) {
            Selection::Cpu => {
                fill_cpu(raster, frame);
                Ok(FillPath::Cpu)
            }
            Selection::Device(index) => {
                self.fill_device(raster, frame, ordinal, index)?;
                Ok(FillPath::Device(ordinal))
            }
        }
    }

    /// [`fill_raster`](Self::fill_raster), redoing the frame on the CPU after
    /// a recoverable device failure.
    pub fn fill_raster_or_cpu(&mut self, raster: &mut Raster, frame: &Frame, ordinal: usize) -> Result<FillPath> {
        match self.fill_raster(raster, frame, ordinal) {
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, ordinal, "device fill failed, using CPU for this frame");
                fill_cpu(raster, frame);
                Ok(FillPath::Cpu)
            }
            other => other,
        }
    }

    #[cfg(feature = "gpu")]
    fn fill_device(&mut self, raster: &mut Raster, frame: &Frame, ordinal: usize, index: usize) -> Result<()> {
        use crate::error::EngineError;

        let resolution = raster.resolution();
        if !matches!(&self.context, Some(context) if context.matches(ordinal, resolution)) {
            self.context = None;
            if self.program.is_none() {
                let source = std::fs::read_to_string(&self.program_path).map_err(|e| {
                    EngineError::ProgramBuild(format!("reading {}: {e}", self.program_path.display()))
                })?;
                self.program = Some(source);
            }
            let source = self.program.as_deref().unwrap_or_default();
            self.context = Some(gpu::AcceleratorContext::new(ordinal, index, resolution, source)?);
        }

        let Some(context) = self.context.as_mut() else {
            return Err(EngineError::Device("accelerator context missing".to_string()));
        };
        if let Err(e) = context.render(frame, raster.as_mut_slice()) {
            self.context = None;
            return Err(e);
        }
        Ok(())
    }

    #[cfg(not(feature = "gpu"))]
    fn fill_device(&mut self, _raster: &mut Raster, _frame: &Frame, ordinal: usize, _index: usize) -> Result<()> {
        Err(crate::error::EngineError::Device(format!(
            "device {ordinal} requested but compute support is not compiled in"
        )))
    }
}
