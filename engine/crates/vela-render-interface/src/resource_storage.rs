use std::rc::Rc;

use ash::vk;

use vela_gfx::commands::command_buffer::GfxCommandBuffer;
use vela_gfx::descriptors::descriptor::{
    GfxDescriptorBinding, GfxDescriptorInfos, GfxDescriptorSet, GfxDescriptorSetLayout, GfxDescriptorUpdate,
};
use vela_gfx::error::{GfxError, GfxResult};
use vela_gfx::foundation::device::GfxDevice;
use vela_gfx::pipelines::pipeline::{GfxPipeline, GfxPipelineCreateInfo};
use vela_gfx::resources::buffer::{GfxBuffer, GfxBufferCreateInfo};
use vela_gfx::resources::image::{GfxAttachmentCreateInfo, GfxImage, GfxTextureCreateInfo};
use vela_gfx::resources::layout::{GfxIndexType, GfxVertexLayout};
use vela_gfx::resources::texture::{GfxTexture2D, GfxTexture3D};

use crate::handles::{
    GfxBufferHandle, GfxDescriptorSetHandle, GfxDescriptorSetLayoutHandle, GfxPipelineHandle, GfxTexture2DHandle,
    GfxTexture3DHandle,
};
use crate::resource_pool::GfxResourcePool;

/// descriptor 写入中引用的纹理
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GfxTextureRef {
    Texture2D(GfxTexture2DHandle),
    Texture3D(GfxTexture3DHandle),
}
impl From<GfxTexture2DHandle> for GfxTextureRef {
    fn from(handle: GfxTexture2DHandle) -> Self {
        Self::Texture2D(handle)
    }
}
impl From<GfxTexture3DHandle> for GfxTextureRef {
    fn from(handle: GfxTexture3DHandle) -> Self {
        Self::Texture3D(handle)
    }
}

/// 通过 handle 描述的一次 descriptor 写入，创建 descriptor set 时解析成原生句柄
#[derive(Clone, Debug)]
pub enum GfxDescriptorWrite {
    /// `instance` 为 `None` 时绑定整个 buffer，否则只绑定其中一个对齐后的实例
    Buffer {
        binding: u32,
        descriptor_type: vk::DescriptorType,
        buffer: GfxBufferHandle,
        instance: Option<u32>,
    },
    Image {
        binding: u32,
        descriptor_type: vk::DescriptorType,
        texture: GfxTextureRef,
        layout: vk::ImageLayout,
    },
    /// 从 array element 0 开始依次写入
    ImageArray {
        binding: u32,
        descriptor_type: vk::DescriptorType,
        textures: Vec<GfxTextureRef>,
        layout: vk::ImageLayout,
    },
    AccelerationStructure {
        binding: u32,
        structures: Vec<vk::AccelerationStructureKHR>,
    },
}
impl GfxDescriptorWrite {
    #[inline]
    pub fn uniform_buffer(binding: u32, buffer: GfxBufferHandle) -> Self {
        Self::Buffer {
            binding,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            buffer,
            instance: None,
        }
    }

    #[inline]
    pub fn storage_buffer(binding: u32, buffer: GfxBufferHandle) -> Self {
        Self::Buffer {
            binding,
            descriptor_type: vk::DescriptorType::STORAGE_BUFFER,
            buffer,
            instance: None,
        }
    }

    #[inline]
    pub fn combined_image_sampler(binding: u32, texture: impl Into<GfxTextureRef>) -> Self {
        Self::Image {
            binding,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            texture: texture.into(),
            layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    #[inline]
    pub fn binding(&self) -> u32 {
        match self {
            Self::Buffer { binding, .. }
            | Self::Image { binding, .. }
            | Self::ImageArray { binding, .. }
            | Self::AccelerationStructure { binding, .. } => *binding,
        }
    }
}

/// 所有 GPU 资源的唯一所有者
///
/// 外部只持有 [`GfxHandle`](crate::handles::GfxHandle)，通过 `get_*` 借用资源。
/// 每种资源一张表，id 在同一个 storage 内单调递增、不复用。
///
/// `destroy_*` 立即销毁资源，不做引用计数：调用者需要保证没有仍在执行的命令引用它。
/// storage 被 drop 时会先等待设备空闲，再按依赖的逆序销毁所有资源。
pub struct ResourceStorage {
    device: Rc<dyn GfxDevice>,

    descriptor_sets: GfxResourcePool<GfxDescriptorSet>,
    pipelines: GfxResourcePool<GfxPipeline>,
    descriptor_set_layouts: GfxResourcePool<GfxDescriptorSetLayout>,
    textures_2d: GfxResourcePool<GfxTexture2D>,
    textures_3d: GfxResourcePool<GfxTexture3D>,
    buffers: GfxResourcePool<GfxBuffer>,
}
// new & init
impl ResourceStorage {
    pub fn new(device: Rc<dyn GfxDevice>) -> Self {
        log::info!("resource storage created on {} device", device.backend_name());
        Self {
            device,
            descriptor_sets: GfxResourcePool::default(),
            pipelines: GfxResourcePool::default(),
            descriptor_set_layouts: GfxResourcePool::default(),
            textures_2d: GfxResourcePool::default(),
            textures_3d: GfxResourcePool::default(),
            buffers: GfxResourcePool::default(),
        }
    }
}
// destroy
impl ResourceStorage {
    /// 等待设备空闲之后销毁所有资源；之后创建的资源依然使用新的 id
    pub fn destroy_all(&mut self) {
        vela_crate_tools::profile_scope!("ResourceStorage::destroy_all");
        if let Err(e) = self.device.wait_idle() {
            log::error!("wait idle before destroying resources failed: {e}");
        }
        // set 引用 layout 与 buffer/texture，最先销毁
        self.descriptor_sets.clear();
        self.pipelines.clear();
        self.descriptor_set_layouts.clear();
        self.textures_3d.clear();
        self.textures_2d.clear();
        self.buffers.clear();
    }
}
impl Drop for ResourceStorage {
    fn drop(&mut self) {
        self.destroy_all();
    }
}
// getters
impl ResourceStorage {
    #[inline]
    pub fn device(&self) -> &Rc<dyn GfxDevice> {
        &self.device
    }

    /// 所有种类的存活资源总数
    pub fn live_count(&self) -> usize {
        self.buffers.len()
            + self.textures_2d.len()
            + self.textures_3d.len()
            + self.descriptor_set_layouts.len()
            + self.descriptor_sets.len()
            + self.pipelines.len()
    }
}
// Buffer API
impl ResourceStorage {
    /// 大小为 `align(instance_size, min_offset_alignment) * instance_count`
    pub fn create_buffer(&mut self, info: &GfxBufferCreateInfo, name: impl AsRef<str>) -> GfxResult<GfxBufferHandle> {
        let buffer = GfxBuffer::new(self.device.clone(), info, name)?;
        self.buffers.insert(buffer)
    }

    /// device local 的 vertex buffer，通过 staging buffer 上传，返回时数据已经可用
    pub fn create_vertex_buffer(
        &mut self,
        instance_size: vk::DeviceSize,
        instance_count: u32,
        data: &[u8],
        name: impl AsRef<str>,
    ) -> GfxResult<GfxBufferHandle> {
        self.create_staged_buffer(instance_size, instance_count, vk::BufferUsageFlags::VERTEX_BUFFER, data, name)
    }

    /// device local 的 index buffer，通过 staging buffer 上传，返回时数据已经可用
    pub fn create_index_buffer(
        &mut self,
        instance_size: vk::DeviceSize,
        instance_count: u32,
        data: &[u8],
        name: impl AsRef<str>,
    ) -> GfxResult<GfxBufferHandle> {
        self.create_staged_buffer(instance_size, instance_count, vk::BufferUsageFlags::INDEX_BUFFER, data, name)
    }

    #[inline]
    pub fn create_vertex_buffer_from<V: GfxVertexLayout>(
        &mut self,
        vertices: &[V],
        name: impl AsRef<str>,
    ) -> GfxResult<GfxBufferHandle> {
        self.create_vertex_buffer(
            size_of::<V>() as vk::DeviceSize,
            Self::count_of(vertices.len(), name.as_ref())?,
            bytemuck::cast_slice(vertices),
            name,
        )
    }

    #[inline]
    pub fn create_index_buffer_from<T: GfxIndexType>(
        &mut self,
        indices: &[T],
        name: impl AsRef<str>,
    ) -> GfxResult<GfxBufferHandle> {
        self.create_index_buffer(
            T::byte_size() as vk::DeviceSize,
            Self::count_of(indices.len(), name.as_ref())?,
            bytemuck::cast_slice(indices),
            name,
        )
    }

    fn count_of(len: usize, name: &str) -> GfxResult<u32> {
        u32::try_from(len)
            .map_err(|_| GfxError::InvalidParameter(format!("buffer `{name}`: {len} elements is too many")).logged())
    }

    fn create_staged_buffer(
        &mut self,
        instance_size: vk::DeviceSize,
        instance_count: u32,
        usage: vk::BufferUsageFlags,
        data: &[u8],
        name: impl AsRef<str>,
    ) -> GfxResult<GfxBufferHandle> {
        let name = name.as_ref();
        let info = GfxBufferCreateInfo::new(instance_size, instance_count, usage | vk::BufferUsageFlags::TRANSFER_SRC);
        let expected = info.buffer_size()?;
        if data.len() as vk::DeviceSize != expected {
            return Err(GfxError::InvalidParameter(format!(
                "buffer `{name}`: {} bytes given, {expected} expected",
                data.len()
            ))
            .logged());
        }
        let buffer = GfxBuffer::new_device_local_with_data(self.device.clone(), &info, data, name)?;
        self.buffers.insert(buffer)
    }

    /// 读回 buffer 的内容
    ///
    /// 映射的 buffer 直接读取；其余的 buffer 需要 `TRANSFER_SRC` usage，
    /// 先复制到一个 host visible 的回读 buffer，同步等待完成之后再读取
    pub fn read_back_buffer(&self, handle: GfxBufferHandle, offset: vk::DeviceSize, out: &mut [u8]) -> GfxResult<()> {
        let buffer = self.buffers.get(handle)?;
        if buffer.is_mapped() {
            return buffer.read_from_buffer(out, offset);
        }
        if out.is_empty() {
            return Ok(());
        }
        if !buffer.usage().contains(vk::BufferUsageFlags::TRANSFER_SRC) {
            return Err(GfxError::InvalidParameter(format!(
                "buffer `{}` cannot be read back without TRANSFER_SRC usage",
                buffer.name()
            ))
            .logged());
        }
        let len = out.len() as vk::DeviceSize;
        if offset.checked_add(len).is_none_or(|end| end > buffer.size()) {
            return Err(GfxError::OutOfBounds {
                name: buffer.name().to_string(),
                offset,
                len,
                size: buffer.size(),
            }
            .logged());
        }

        let readback = GfxBuffer::new(
            self.device.clone(),
            &GfxBufferCreateInfo::readback(len),
            format!("{}-readback", buffer.name()),
        )?;
        GfxCommandBuffer::one_time_exec(&self.device, &format!("read-back-{}", buffer.name()), |cmd| {
            cmd.cmd_copy_buffer(
                buffer,
                &readback,
                &[vk::BufferCopy {
                    src_offset: offset,
                    dst_offset: 0,
                    size: len,
                }],
            );
            Ok(())
        })?;
        readback.read_from_buffer(out, 0)
    }

    #[inline]
    pub fn get_buffer(&self, handle: GfxBufferHandle) -> GfxResult<&GfxBuffer> {
        self.buffers.get(handle)
    }

    pub fn destroy_buffer(&mut self, handle: GfxBufferHandle) -> GfxResult<()> {
        drop(self.buffers.remove(handle)?);
        Ok(())
    }
}
// Texture API
impl ResourceStorage {
    pub fn create_texture_2d(
        &mut self,
        info: &GfxTextureCreateInfo<'_>,
        name: impl AsRef<str>,
    ) -> GfxResult<GfxTexture2DHandle> {
        let texture = GfxTexture2D::new(self.device.clone(), info, name.as_ref())?;
        self.textures_2d.insert(texture)
    }

    pub fn create_texture_3d(
        &mut self,
        info: &GfxTextureCreateInfo<'_>,
        name: impl AsRef<str>,
    ) -> GfxResult<GfxTexture3DHandle> {
        let texture = GfxTexture3D::new(self.device.clone(), info, name.as_ref())?;
        self.textures_3d.insert(texture)
    }

    /// 内容未定义的 2D attachment，render graph 用来承载虚拟资源
    pub fn create_attachment(
        &mut self,
        info: &GfxAttachmentCreateInfo,
        name: impl AsRef<str>,
    ) -> GfxResult<GfxTexture2DHandle> {
        let texture = GfxTexture2D::new_attachment(self.device.clone(), info, name.as_ref())?;
        self.textures_2d.insert(texture)
    }

    #[inline]
    pub fn get_texture_2d(&self, handle: GfxTexture2DHandle) -> GfxResult<&GfxTexture2D> {
        self.textures_2d.get(handle)
    }

    #[inline]
    pub fn get_texture_3d(&self, handle: GfxTexture3DHandle) -> GfxResult<&GfxTexture3D> {
        self.textures_3d.get(handle)
    }

    /// 不区分维度，取出底层的 image
    pub fn get_image(&self, texture: GfxTextureRef) -> GfxResult<&GfxImage> {
        match texture {
            GfxTextureRef::Texture2D(handle) => self.textures_2d.get(handle).map(|t| &**t),
            GfxTextureRef::Texture3D(handle) => self.textures_3d.get(handle).map(|t| &**t),
        }
    }

    pub fn destroy_texture_2d(&mut self, handle: GfxTexture2DHandle) -> GfxResult<()> {
        drop(self.textures_2d.remove(handle)?);
        Ok(())
    }

    pub fn destroy_texture_3d(&mut self, handle: GfxTexture3DHandle) -> GfxResult<()> {
        drop(self.textures_3d.remove(handle)?);
        Ok(())
    }
}
// Descriptor API
impl ResourceStorage {
    /// binding index 重复时返回 [`GfxError::DuplicateBinding`]
    pub fn create_descriptor_set_layout(
        &mut self,
        bindings: &[GfxDescriptorBinding],
        name: impl AsRef<str>,
    ) -> GfxResult<GfxDescriptorSetLayoutHandle> {
        let layout = GfxDescriptorSetLayout::new(self.device.clone(), bindings, name)?;
        self.descriptor_set_layouts.insert(layout)
    }

    /// 从共享 pool 中分配 set 并一次性写入 `writes`
    ///
    /// pool 只有一个且大小固定，耗尽时返回 [`GfxError::DescriptorPoolExhausted`]，不会扩容或重试。
    /// 没有写入的 binding 保持未设置，shader 是否访问它们由调用者负责。
    pub fn create_descriptor_set(
        &mut self,
        layout: GfxDescriptorSetLayoutHandle,
        writes: &[GfxDescriptorWrite],
        name: impl AsRef<str>,
    ) -> GfxResult<GfxDescriptorSetHandle> {
        let layout = self.descriptor_set_layouts.get(layout)?;
        let updates = writes.iter().map(|w| self.resolve_write(w)).collect::<GfxResult<Vec<_>>>()?;
        let set = GfxDescriptorSet::new(self.device.clone(), layout, &updates, name)?;
        self.descriptor_sets.insert(set)
    }

    fn resolve_write(&self, write: &GfxDescriptorWrite) -> GfxResult<GfxDescriptorUpdate> {
        let image_info = |texture: GfxTextureRef, layout| -> GfxResult<vk::DescriptorImageInfo> {
            Ok(self.get_image(texture)?.descriptor_image_info(layout))
        };

        let (descriptor_type, infos) = match write {
            GfxDescriptorWrite::Buffer {
                descriptor_type,
                buffer,
                instance,
                ..
            } => {
                let buffer = self.buffers.get(*buffer)?;
                let info = match instance {
                    Some(index) => buffer.descriptor_info_for_index(*index)?,
                    None => buffer.descriptor_info(),
                };
                (*descriptor_type, GfxDescriptorInfos::Buffers(vec![info]))
            }
            GfxDescriptorWrite::Image {
                descriptor_type,
                texture,
                layout,
                ..
            } => (*descriptor_type, GfxDescriptorInfos::Images(vec![image_info(*texture, *layout)?])),
            GfxDescriptorWrite::ImageArray {
                descriptor_type,
                textures,
                layout,
                ..
            } => {
                let infos = textures.iter().map(|t| image_info(*t, *layout)).collect::<GfxResult<_>>()?;
                (*descriptor_type, GfxDescriptorInfos::Images(infos))
            }
            GfxDescriptorWrite::AccelerationStructure { structures, .. } => (
                vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
                GfxDescriptorInfos::AccelerationStructures(structures.clone()),
            ),
        };

        Ok(GfxDescriptorUpdate {
            binding: write.binding(),
            array_element: 0,
            descriptor_type,
            infos,
        })
    }

    #[inline]
    pub fn get_descriptor_set_layout(
        &self,
        handle: GfxDescriptorSetLayoutHandle,
    ) -> GfxResult<&GfxDescriptorSetLayout> {
        self.descriptor_set_layouts.get(handle)
    }

    #[inline]
    pub fn get_descriptor_set(&self, handle: GfxDescriptorSetHandle) -> GfxResult<&GfxDescriptorSet> {
        self.descriptor_sets.get(handle)
    }

    /// set 会归还给共享 pool
    pub fn destroy_descriptor_set(&mut self, handle: GfxDescriptorSetHandle) -> GfxResult<()> {
        drop(self.descriptor_sets.remove(handle)?);
        Ok(())
    }

    pub fn destroy_descriptor_set_layout(&mut self, handle: GfxDescriptorSetLayoutHandle) -> GfxResult<()> {
        drop(self.descriptor_set_layouts.remove(handle)?);
        Ok(())
    }
}
// Pipeline API
impl ResourceStorage {
    /// `set_layouts` 按 set index 排列，解析之后交给 [`GfxPipeline::new`]
    pub fn create_pipeline(
        &mut self,
        info: GfxPipelineCreateInfo,
        set_layouts: &[GfxDescriptorSetLayoutHandle],
        name: impl AsRef<str>,
    ) -> GfxResult<GfxPipelineHandle> {
        let vk_layouts = set_layouts
            .iter()
            .map(|h| self.descriptor_set_layouts.get(*h).map(GfxDescriptorSetLayout::handle))
            .collect::<GfxResult<Vec<_>>>()?;
        let info = if vk_layouts.is_empty() { info } else { info.set_layouts(&vk_layouts) };
        let pipeline = GfxPipeline::new(self.device.clone(), &info, name)?;
        self.pipelines.insert(pipeline)
    }

    #[inline]
    pub fn get_pipeline(&self, handle: GfxPipelineHandle) -> GfxResult<&GfxPipeline> {
        self.pipelines.get(handle)
    }

    pub fn destroy_pipeline(&mut self, handle: GfxPipelineHandle) -> GfxResult<()> {
        drop(self.pipelines.remove(handle)?);
        Ok(())
    }
}
