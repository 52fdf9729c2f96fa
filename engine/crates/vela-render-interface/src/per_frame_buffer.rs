use std::marker::PhantomData;

use ash::vk;

use vela_gfx::error::GfxResult;
use vela_gfx::resources::buffer::GfxBufferCreateInfo;

use crate::handles::GfxBufferHandle;
use crate::resource_storage::{GfxDescriptorWrite, ResourceStorage};

/// host 每帧都会写入的数据（例如相机 uniform），每个 frames-in-flight 槽位一份
///
/// 一个 buffer 中放 `fif_count` 个实例，实例之间按照设备的 min offset alignment 对齐。
/// 只写入当前槽位的实例，GPU 仍在读取的其它槽位不会被覆盖。
pub struct PerFrameBuffer<T: bytemuck::Pod> {
    handle: GfxBufferHandle,
    fif_count: u32,
    _phantom: PhantomData<T>,
}
impl<T: bytemuck::Pod> PerFrameBuffer<T> {
    /// `usage` 包含 `STORAGE_BUFFER` 时使用 storage buffer 的对齐，否则使用 uniform buffer 的对齐
    pub fn new(
        storage: &mut ResourceStorage,
        fif_count: usize,
        usage: vk::BufferUsageFlags,
        name: impl AsRef<str>,
    ) -> GfxResult<Self> {
        let limits = storage.device().limits();
        let alignment = if usage.contains(vk::BufferUsageFlags::STORAGE_BUFFER) {
            limits.min_storage_buffer_offset_alignment
        } else {
            limits.min_uniform_buffer_offset_alignment
        };
        let fif_count = fif_count as u32;
        let info = GfxBufferCreateInfo::new(size_of::<T>() as vk::DeviceSize, fif_count, usage)
            .min_offset_alignment(alignment)
            .host_visible();
        let handle = storage.create_buffer(&info, name)?;
        Ok(Self {
            handle,
            fif_count,
            _phantom: PhantomData,
        })
    }

    #[inline]
    pub fn handle(&self) -> GfxBufferHandle {
        self.handle
    }

    #[inline]
    pub fn fif_count(&self) -> u32 {
        self.fif_count
    }

    /// 写入第 `slot` 份数据
    #[inline]
    pub fn write(&self, storage: &ResourceStorage, slot: usize, value: &T) -> GfxResult<()> {
        storage.get_buffer(self.handle)?.write_pod(value, slot as u32)
    }

    pub fn read(&self, storage: &ResourceStorage, slot: usize) -> GfxResult<T> {
        let buffer = storage.get_buffer(self.handle)?;
        let mut value = T::zeroed();
        buffer.read_from_buffer(bytemuck::bytes_of_mut(&mut value), slot as vk::DeviceSize * buffer.alignment_size())?;
        Ok(value)
    }

    /// 绑定第 `slot` 份数据
    #[inline]
    pub fn descriptor_write(&self, binding: u32, descriptor_type: vk::DescriptorType, slot: usize) -> GfxDescriptorWrite {
        GfxDescriptorWrite::Buffer {
            binding,
            descriptor_type,
            buffer: self.handle,
            instance: Some(slot as u32),
        }
    }

    pub fn destroy(self, storage: &mut ResourceStorage) -> GfxResult<()> {
        storage.destroy_buffer(self.handle)
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use vela_gfx::foundation::headless::{HeadlessDevice, HeadlessDeviceDesc};

    use super::*;

    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    struct CameraUbo {
        view_proj: [[f32; 4]; 4],
        position: [f32; 4],
    }

    #[test]
    fn test_slots_do_not_overlap() {
        let headless = Rc::new(HeadlessDevice::new(HeadlessDeviceDesc::default()));
        let mut storage = ResourceStorage::new(headless.clone());
        let ubo = PerFrameBuffer::<CameraUbo>::new(&mut storage, 3, vk::BufferUsageFlags::UNIFORM_BUFFER, "camera")
            .unwrap();

        let buffer = storage.get_buffer(ubo.handle()).unwrap();
        assert_eq!(buffer.alignment_size(), 256);
        assert_eq!(buffer.size(), 768);

        let camera = |v: f32| CameraUbo {
            view_proj: [[v; 4]; 4],
            position: [v, v, v, 1.0],
        };
        for slot in 0..3 {
            ubo.write(&storage, slot, &camera(slot as f32)).unwrap();
        }
        ubo.write(&storage, 1, &camera(9.0)).unwrap();

        assert_eq!(ubo.read(&storage, 0).unwrap(), camera(0.0));
        assert_eq!(ubo.read(&storage, 1).unwrap(), camera(9.0));
        assert_eq!(ubo.read(&storage, 2).unwrap(), camera(2.0));
        assert!(ubo.write(&storage, 3, &camera(1.0)).is_err());

        let info = storage.get_buffer(ubo.handle()).unwrap().descriptor_info_for_index(2).unwrap();
        assert_eq!((info.offset, info.range), (512, 256));

        ubo.destroy(&mut storage).unwrap();
        assert_eq!(storage.live_count(), 0);
    }
}
