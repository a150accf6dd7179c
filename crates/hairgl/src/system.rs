//! Asset and instance lifecycle plus the per-frame verbs

use crate::arena::Arena;
use crate::{AssetId, HairError, InstanceId};
use hair_core::{HairAsset, HairAssetData, HairInstance, HairInstanceSettings};
use hair_gpu::{CpuDevice, Device};
use hair_math::Mat4;
use hair_renderer::{Light, RenderStage};
use hair_simulation::{register_cpu_kernel, SimulationStage};
use std::path::Path;

struct InstanceEntry {
    asset: AssetId,
    instance: HairInstance,
}

/// Owns the device, the shared assets and every instance created from them.
pub struct HairSystem<D: Device> {
    device: D,
    simulation: SimulationStage,
    renderer: RenderStage,
    assets: Arena<HairAsset>,
    instances: Arena<InstanceEntry>,
}

impl HairSystem<CpuDevice> {
    /// System on the host reference device, with the CPU strand solver registered.
    pub fn with_cpu_device() -> Result<Self, HairError> {
        let mut device = CpuDevice::new();
        register_cpu_kernel(&mut device);
        Self::new(device)
    }
}

impl<D: Device> HairSystem<D> {
    /// Builds every program. Any compile or link failure is an
    /// [`HairError::Initialization`].
    pub fn new(mut device: D) -> Result<Self, HairError> {
        let simulation = SimulationStage::new(&mut device)?;
        let renderer = match RenderStage::new(&mut device) {
            Ok(renderer) => renderer,
            Err(e) => {
                simulation.destroy(&mut device);
                return Err(e.into());
            }
        };
        log::info!("Hair system initialized");
        Ok(Self {
            device,
            simulation,
            renderer,
            assets: Arena::default(),
            instances: Arena::default(),
        })
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Parses, preprocesses and uploads the asset at `path`.
    pub fn load_asset(&mut self, path: impl AsRef<Path>) -> Result<AssetId, HairError> {
        let data = HairAssetData::load(path)?;
        Ok(self.load_asset_from_data(&data))
    }

    pub fn load_asset_from_data(&mut self, data: &HairAssetData) -> AssetId {
        let asset = HairAsset::upload(&mut self.device, data);
        AssetId::from_key(self.assets.insert(asset))
    }

    pub fn asset(&self, id: AssetId) -> Option<&HairAsset> {
        self.assets.get(id.key())
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    fn live_instances_of(&self, id: AssetId) -> usize {
        self.instances.values().filter(|e| e.asset == id).count()
    }

    /// Releases the asset. Every instance created from it must be destroyed
    /// first; otherwise the asset is kept and the misuse reported.
    pub fn destroy_asset(&mut self, id: AssetId) {
        let live = self.live_instances_of(id);
        debug_assert!(live == 0, "destroying {id} with {live} live instances");
        if live > 0 {
            log::error!("Refusing to destroy {} while {} live instances use it", id, live);
            return;
        }
        match self.assets.remove(id.key()) {
            Some(asset) => {
                asset.destroy(&mut self.device);
                log::info!("Destroyed {}", id);
            }
            None => log::warn!("destroy_asset: {} is not a live asset", id),
        }
    }

    /// New instance at the asset's rest pose, with default settings.
    pub fn create_instance(&mut self, asset_id: AssetId) -> Result<InstanceId, HairError> {
        let asset = self.assets.get(asset_id.key()).ok_or(HairError::UnknownAsset(asset_id))?;
        let instance = HairInstance::create(&mut self.device, asset);
        let id = InstanceId::from_key(self.instances.insert(InstanceEntry {
            asset: asset_id,
            instance,
        }));
        log::debug!("Created {} from {}", id, asset_id);
        Ok(id)
    }

    pub fn instance(&self, id: InstanceId) -> Option<&HairInstance> {
        self.instances.get(id.key()).map(|e| &e.instance)
    }

    pub fn instance_asset(&self, id: InstanceId) -> Option<AssetId> {
        self.instances.get(id.key()).map(|e| e.asset)
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn instance_settings(&self, id: InstanceId) -> Option<&HairInstanceSettings> {
        self.instance(id).map(|i| &i.settings)
    }

    /// Replaces the settings wholesale, effective from the next simulate or render.
    pub fn update_instance_settings(&mut self, id: InstanceId, settings: HairInstanceSettings) {
        match self.instances.get_mut(id.key()) {
            Some(entry) => entry.instance.settings = settings,
            None => log::warn!("update_instance_settings: {} is not a live instance", id),
        }
    }

    /// Scene lights used by every hair pass.
    pub fn set_lights(&mut self, lights: &[Light]) {
        self.renderer.set_lights(lights);
    }

    /// Advances the instance by one step of `time_step` seconds.
    pub fn simulate(&mut self, id: InstanceId, time_step: f32) {
        let Some(entry) = self.instances.get_mut(id.key()) else {
            log::warn!("simulate: {} is not a live instance", id);
            return;
        };
        let Some(asset) = self.assets.get(entry.asset.key()) else {
            log::error!("simulate: {} lost its asset {}", id, entry.asset);
            return;
        };
        self.simulation.simulate(&mut self.device, asset, &mut entry.instance, time_step);
    }

    /// Draws the instance's enabled passes. Never changes simulation state.
    pub fn render(&mut self, id: InstanceId, view: &Mat4, proj: &Mat4) {
        let Some(entry) = self.instances.get(id.key()) else {
            log::warn!("render: {} is not a live instance", id);
            return;
        };
        let Some(asset) = self.assets.get(entry.asset.key()) else {
            log::error!("render: {} lost its asset {}", id, entry.asset);
            return;
        };
        self.renderer.render(&mut self.device, asset, &entry.instance, view, proj);
    }

    pub fn destroy_instance(&mut self, id: InstanceId) {
        match self.instances.remove(id.key()) {
            Some(entry) => {
                entry.instance.destroy(&mut self.device);
                log::debug!("Destroyed {}", id);
            }
            None => log::warn!("destroy_instance: {} is not a live instance", id),
        }
    }

    /// Releases every instance, asset and program, returning the device.
    pub fn destroy(mut self) -> D {
        for entry in self.instances.drain() {
            entry.instance.destroy(&mut self.device);
        }
        for asset in self.assets.drain() {
            asset.destroy(&mut self.device);
        }
        self.simulation.destroy(&mut self.device);
        self.renderer.destroy(&mut self.device);
        self.device
    }
}
