//! Native device ownership, capability probing and the device-loss state machine.
//!
//! ```text
//! Uninitialized --initialize--> Normal --positive loss poll--> Lost --reset_device--> Resetting
//!                                  ^                              |                     |
//!                                  +------------- success --------+---------------------+
//!                                                                 |
//!                       resettable poll negative too many times   +--> Unrecoverable
//! ```
//!
//! Loss is only ever observed by polling (`test_device_lost`); the native API has no push
//! notification. There is no retry loop here: the caller polls once per frame boundary.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::caps::{self, DeviceCaps, ProbeInput};
use crate::config::BackendConfig;
use crate::error::{BackendError, ResourceKind};
use crate::native::{
    BehaviorFlags, CooperativeLevel, MemoryPool, NativeDevice, NativeDriver, NativeError,
    PresentParameters, QueryKind, RenderState, ResourceUsage, FALSE, TRUE,
};
use crate::stats::BackendStats;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Uninitialized,
    Normal,
    Lost,
    Resetting,
    Unrecoverable,
}

/// Callbacks implemented by resource owners outside this crate (textures, buffers, swap chains).
pub trait DeviceEventSink {
    /// Release every native object created in a default pool before the device is reset.
    fn release_device_resources(&mut self);

    /// The device was found lost while polling with notification enabled.
    fn device_lost(&mut self) {}
}

/// Sink for callers with no externally owned device resources.
#[derive(Debug, Default)]
pub struct NoExternalResources;

impl DeviceEventSink for NoExternalResources {
    fn release_device_resources(&mut self) {}
}

/// The native device handle plus what was probed about it.
#[derive(Debug)]
pub struct DeviceContext<Dev> {
    pub device: Dev,
    pub caps: DeviceCaps,
    pub extended: bool,
}

pub struct DeviceManager<D: NativeDriver> {
    driver: D,
    config: BackendConfig,
    context: Option<DeviceContext<D::Device>>,
    status: DeviceStatus,
    present_parameters: PresentParameters,
    unresettable_polls: u32,
    scene_started: bool,
    stats: Arc<BackendStats>,
}

impl<D: NativeDriver> DeviceManager<D> {
    pub fn new(driver: D, config: BackendConfig, stats: Arc<BackendStats>) -> Self {
        Self {
            driver,
            config,
            context: None,
            status: DeviceStatus::Uninitialized,
            present_parameters: PresentParameters::default(),
            unresettable_polls: 0,
            scene_started: false,
            stats,
        }
    }

    pub fn status(&self) -> DeviceStatus {
        self.status
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn caps(&self) -> Option<&DeviceCaps> {
        self.context.as_ref().map(|ctx| &ctx.caps)
    }

    pub fn is_extended(&self) -> bool {
        self.context.as_ref().is_some_and(|ctx| ctx.extended)
    }

    /// The native device regardless of loss state, for inspection and teardown.
    pub fn native_device(&self) -> Option<&D::Device> {
        self.context.as_ref().map(|ctx| &ctx.device)
    }

    pub fn native_device_mut(&mut self) -> Option<&mut D::Device> {
        self.context.as_mut().map(|ctx| &mut ctx.device)
    }

    /// The device and its caps for issuing work. Fails fast unless the device is `Normal`.
    pub fn usable(&mut self) -> Result<(&mut D::Device, &DeviceCaps), BackendError> {
        match self.status {
            DeviceStatus::Normal => {}
            DeviceStatus::Uninitialized => {
                return Err(BackendError::InitializationFailure(
                    "device used before initialize".to_string(),
                ))
            }
            DeviceStatus::Unrecoverable => {
                return Err(BackendError::Unrecoverable(
                    "device could not be reset".to_string(),
                ))
            }
            DeviceStatus::Lost | DeviceStatus::Resetting => return Err(BackendError::DeviceLost),
        }
        let ctx = self
            .context
            .as_mut()
            .ok_or(BackendError::DeviceLost)?;
        Ok((&mut ctx.device, &ctx.caps))
    }

    pub fn initialize(&mut self) -> Result<(), BackendError> {
        if self.status != DeviceStatus::Uninitialized {
            return Err(BackendError::InitializationFailure(
                "device is already initialized".to_string(),
            ));
        }

        let adapter = self.config.adapter;
        let device_type = self.config.device_type;
        if adapter >= self.driver.adapter_count() {
            return Err(BackendError::InitializationFailure(format!(
                "adapter {adapter} does not exist ({} available)",
                self.driver.adapter_count()
            )));
        }

        let native_caps = self.read_native_caps()?;
        caps::check_minimum(&native_caps)
            .map_err(|reason| BackendError::InitializationFailure(reason.to_string()))?;
        let identifier = self
            .driver
            .adapter_identifier(adapter)
            .map_err(|err| BackendError::InitializationFailure(err.to_string()))?;

        let (device, extended) = self.create_device()?;

        let mut device_caps = DeviceCaps::probe(ProbeInput {
            driver: &self.driver,
            adapter,
            device_type,
            native: &native_caps,
            identifier,
            extended,
        });
        let mut device = device;
        probe_query_support(&mut device, &mut device_caps);

        info!(
            adapter,
            vendor_id = device_caps.adapter.vendor_id,
            description = %device_caps.adapter.description,
            ?device_type,
            extended,
            shader_model = ?device_caps.shader_model,
            max_texture_width = device_caps.max_texture_width,
            max_texture_height = device_caps.max_texture_height,
            instancing = device_caps.instancing,
            "aero-gles-d3d9 created native device"
        );

        self.context = Some(DeviceContext {
            device,
            caps: device_caps,
            extended,
        });
        self.status = DeviceStatus::Normal;
        self.unresettable_polls = 0;
        self.apply_device_defaults();
        Ok(())
    }

    fn read_native_caps(&self) -> Result<crate::native::NativeCaps, BackendError> {
        let attempts = self.config.caps_probe_attempts.max(1);
        let mut last = NativeError::NotAvailable;
        for attempt in 0..attempts {
            match self
                .driver
                .device_caps(self.config.adapter, self.config.device_type)
            {
                Ok(caps) => return Ok(caps),
                Err(NativeError::NotAvailable) => {
                    debug!(attempt, "device caps not available yet");
                    last = NativeError::NotAvailable;
                    if attempt + 1 < attempts {
                        sleep(self.config.caps_probe_retry_delay);
                    }
                }
                Err(err) => {
                    return Err(BackendError::InitializationFailure(format!(
                        "GetDeviceCaps failed: {err}"
                    )))
                }
            }
        }
        Err(BackendError::InitializationFailure(format!(
            "GetDeviceCaps failed after {attempts} attempts: {last}"
        )))
    }

    /// Create the device, preferring the extended variant and hardware vertex processing.
    fn create_device(&mut self) -> Result<(D::Device, bool), BackendError> {
        let adapter = self.config.adapter;
        let device_type = self.config.device_type;
        let base = BehaviorFlags::FPU_PRESERVE | BehaviorFlags::NO_WINDOW_CHANGES;
        let params = self.present_parameters;

        let try_extended = self.config.prefer_extended_device && self.driver.supports_extended();
        let variants: &[bool] = if try_extended { &[true, false] } else { &[false] };

        let mut last_err = NativeError::NotAvailable;
        for &extended in variants {
            let hardware = base
                | BehaviorFlags::HARDWARE_VERTEX_PROCESSING
                | BehaviorFlags::PURE_DEVICE;
            match self
                .driver
                .create_device(adapter, device_type, hardware, &params, extended)
            {
                Ok(device) => return Ok((device, extended)),
                Err(err) if err.is_out_of_memory() || err == NativeError::DeviceLost => {
                    return Err(BackendError::creation(ResourceKind::Device, err))
                }
                Err(err) => {
                    debug!(extended, %err, "hardware vertex processing unavailable");
                }
            }

            let software = base | BehaviorFlags::SOFTWARE_VERTEX_PROCESSING;
            match self
                .driver
                .create_device(adapter, device_type, software, &params, extended)
            {
                Ok(device) => return Ok((device, extended)),
                Err(err) => {
                    if extended {
                        info!(%err, "extended device unavailable; falling back to standard device");
                    }
                    last_err = err;
                }
            }
        }

        Err(BackendError::InitializationFailure(format!(
            "CreateDevice failed: {last_err}"
        )))
    }

    /// Permanent non-default render states. Issued after every device (re)creation.
    fn apply_device_defaults(&mut self) {
        let Some(ctx) = self.context.as_mut() else {
            return;
        };
        let device = &mut ctx.device;
        device.set_render_state(RenderState::Lighting, FALSE);
        device.set_render_state(RenderState::PointSpriteEnable, TRUE);
        device.set_render_state(RenderState::LastPixel, FALSE);
        let max_point_size = if ctx.caps.shader_model >= caps::ShaderModel::Sm3 {
            ctx.caps.max_point_size
        } else {
            1.0
        };
        device.set_render_state(RenderState::PointSizeMax, max_point_size.to_bits());
        self.scene_started = false;
    }

    pub fn mark_device_lost(&mut self) {
        match self.status {
            DeviceStatus::Normal => {
                warn!("native device lost");
                self.stats.inc_device_losses();
                self.status = DeviceStatus::Lost;
                self.unresettable_polls = 0;
            }
            DeviceStatus::Resetting => self.status = DeviceStatus::Lost,
            DeviceStatus::Lost | DeviceStatus::Unrecoverable | DeviceStatus::Uninitialized => {}
        }
    }

    pub fn is_device_lost(&self) -> bool {
        !matches!(self.status, DeviceStatus::Normal)
    }

    /// Poll the native device for loss. Must be called by the owner at least once per frame.
    pub fn test_device_lost(&mut self, notify: bool, sink: &mut dyn DeviceEventSink) -> bool {
        let lost = match self.context.as_ref() {
            Some(ctx) => ctx.device.cooperative_level() != CooperativeLevel::Ok,
            // No device yet, so nothing to reset.
            None => true,
        };
        if lost && self.context.is_some() {
            let was_normal = self.status == DeviceStatus::Normal;
            self.mark_device_lost();
            if notify && was_normal {
                sink.device_lost();
            }
        }
        lost
    }

    /// Poll whether a lost device may be reset now. The driver can still be reinitializing.
    pub fn test_device_resettable(&mut self) -> bool {
        let Some(ctx) = self.context.as_ref() else {
            return false;
        };
        let level = ctx.device.cooperative_level();
        match level {
            CooperativeLevel::NotReset | CooperativeLevel::Hung => {
                self.unresettable_polls = 0;
                true
            }
            CooperativeLevel::Removed => {
                self.declare_unrecoverable("adapter removed");
                false
            }
            CooperativeLevel::Ok => false,
            CooperativeLevel::Lost => {
                self.unresettable_polls += 1;
                if self.status == DeviceStatus::Lost
                    && self.unresettable_polls >= self.config.max_unresettable_polls
                {
                    self.declare_unrecoverable("device never became resettable");
                }
                false
            }
        }
    }

    fn declare_unrecoverable(&mut self, reason: &str) {
        if self.status != DeviceStatus::Unrecoverable {
            error!(reason, "native device is unrecoverable");
            self.status = DeviceStatus::Unrecoverable;
        }
    }

    /// Reset a lost device. Every object created through it must already be released; external
    /// owners are asked to release theirs through `sink` first.
    ///
    /// On failure the device stays `Lost` and the caller may retry at the next frame boundary.
    pub fn reset_device(&mut self, sink: &mut dyn DeviceEventSink) -> Result<(), BackendError> {
        match self.status {
            DeviceStatus::Unrecoverable => {
                return Err(BackendError::Unrecoverable(
                    "device could not be reset".to_string(),
                ))
            }
            DeviceStatus::Uninitialized => {
                return Err(BackendError::InitializationFailure(
                    "reset before initialize".to_string(),
                ))
            }
            _ => {}
        }
        self.stats.inc_resets_attempted();
        self.status = DeviceStatus::Resetting;
        sink.release_device_resources();

        match self.reset_native() {
            Ok(()) => {
                self.reprobe_caps();
                self.status = DeviceStatus::Normal;
                self.unresettable_polls = 0;
                self.apply_device_defaults();
                self.stats.inc_resets_succeeded();
                info!("native device reset");
                Ok(())
            }
            Err(err) => {
                warn!(%err, "native device reset failed");
                self.status = DeviceStatus::Lost;
                Err(BackendError::DeviceLost)
            }
        }
    }

    fn reset_native(&mut self) -> Result<(), NativeError> {
        let params = self.present_parameters;
        let Some(ctx) = self.context.as_mut() else {
            return Err(NativeError::InvalidCall);
        };

        if !ctx.extended {
            match ctx.device.cooperative_level() {
                // The driver is not ready yet; the caller retries next frame.
                CooperativeLevel::Lost => return Err(NativeError::DeviceLost),
                CooperativeLevel::Removed => return Err(NativeError::DeviceRemoved),
                CooperativeLevel::Ok | CooperativeLevel::NotReset | CooperativeLevel::Hung => {}
            }
        }

        match ctx.device.reset(&params) {
            Ok(()) => Ok(()),
            Err(err @ (NativeError::DeviceRemoved | NativeError::DriverInternal)) => {
                // The old device is gone for good; build a fresh one on the same adapter.
                warn!(%err, "reset impossible; recreating native device");
                let (device, extended) = self.create_device().map_err(|_| err)?;
                if let Some(ctx) = self.context.as_mut() {
                    ctx.device = device;
                    ctx.extended = extended;
                }
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn reprobe_caps(&mut self) {
        let adapter = self.config.adapter;
        let device_type = self.config.device_type;
        let Ok(native) = self.driver.device_caps(adapter, device_type) else {
            // Keep the previous capability set; it described the same adapter.
            return;
        };
        let Some(ctx) = self.context.as_mut() else {
            return;
        };
        let identifier = ctx.caps.adapter.clone();
        let max_samples = ctx.caps.max_supported_samples;
        let mut caps = DeviceCaps::probe(ProbeInput {
            driver: &self.driver,
            adapter,
            device_type,
            native: &native,
            identifier,
            extended: ctx.extended,
        });
        caps.max_supported_samples = max_samples;
        probe_query_support(&mut ctx.device, &mut caps);
        ctx.caps = caps;
    }

    pub(crate) fn set_max_supported_samples(&mut self, samples: crate::native::SampleCount) {
        if let Some(ctx) = self.context.as_mut() {
            ctx.caps.max_supported_samples = samples;
        }
    }

    pub fn start_scene(&mut self) -> Result<(), BackendError> {
        if self.scene_started {
            return Ok(());
        }
        let (device, _) = self.usable()?;
        device
            .begin_scene()
            .map_err(|err| map_device_error(err, "BeginScene"))?;
        self.scene_started = true;
        Ok(())
    }

    pub fn end_scene(&mut self) -> Result<(), BackendError> {
        if !self.scene_started {
            return Ok(());
        }
        let (device, _) = self.usable()?;
        let result = device.end_scene();
        self.scene_started = false;
        result.map_err(|err| map_device_error(err, "EndScene"))
    }

    pub fn clamp_swap_interval(&self, requested: i32) -> Option<i32> {
        self.caps().map(|caps| caps.clamp_swap_interval(requested))
    }

    /// Pool for a texture created with `usage`.
    ///
    /// The extended device never loses `Default` resources, so everything goes there. Otherwise
    /// only render targets and depth-stencil textures must be `Default`; the rest is `Managed` and
    /// survives a reset without being released.
    pub fn texture_pool(&self, usage: ResourceUsage) -> MemoryPool {
        if self.is_extended()
            || usage.intersects(ResourceUsage::RENDER_TARGET | ResourceUsage::DEPTH_STENCIL)
        {
            MemoryPool::Default
        } else {
            MemoryPool::Managed
        }
    }

    /// Pool for a vertex or index buffer created with `usage`. Dynamic buffers are `Default`.
    pub fn buffer_pool(&self, usage: ResourceUsage) -> MemoryPool {
        if self.is_extended() || usage.contains(ResourceUsage::DYNAMIC) {
            MemoryPool::Default
        } else {
            MemoryPool::Managed
        }
    }
}

pub(crate) fn map_device_error(err: NativeError, what: &str) -> BackendError {
    if err.is_device_lost() {
        BackendError::DeviceLost
    } else {
        BackendError::UnsupportedConfiguration(format!("{what} failed: {err}"))
    }
}

/// Event/occlusion query support can only be discovered by creating one.
fn probe_query_support<Dev: NativeDevice>(device: &mut Dev, caps: &mut DeviceCaps) {
    let mut probe = |kind| match device.create_query(kind) {
        Ok(query) => {
            device.release_query(query);
            true
        }
        Err(_) => false,
    };
    caps.event_queries = probe(QueryKind::Event);
    caps.occlusion_queries = probe(QueryKind::Occlusion);
}

fn sleep(delay: Duration) {
    if !delay.is_zero() {
        std::thread::sleep(delay);
    }
}
