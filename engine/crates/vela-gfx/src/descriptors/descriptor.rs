use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use crate::error::{GfxError, GfxResult};
use crate::foundation::device::GfxDevice;

/// descriptor set layout 中的一个 binding
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxDescriptorBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub stage_flags: vk::ShaderStageFlags,
    /// 数组长度，普通 binding 为 1
    pub count: u32,
}
// new & init
impl GfxDescriptorBinding {
    #[inline]
    pub const fn new(
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
        count: u32,
    ) -> Self {
        Self { binding, descriptor_type, stage_flags, count }
    }

    #[inline]
    pub const fn uniform_buffer(binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        Self::new(binding, vk::DescriptorType::UNIFORM_BUFFER, stage_flags, 1)
    }

    #[inline]
    pub const fn storage_buffer(binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        Self::new(binding, vk::DescriptorType::STORAGE_BUFFER, stage_flags, 1)
    }

    #[inline]
    pub const fn combined_image_sampler(binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        Self::new(binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, stage_flags, 1)
    }

    #[inline]
    pub const fn storage_image(binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        Self::new(binding, vk::DescriptorType::STORAGE_IMAGE, stage_flags, 1)
    }

    #[inline]
    pub fn vk_binding(&self) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(self.binding)
            .descriptor_type(self.descriptor_type)
            .descriptor_count(self.count)
            .stage_flags(self.stage_flags)
    }
}

/// descriptor 的类别，决定写入时需要哪种 info
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GfxDescriptorClass {
    Buffer,
    Image,
    AccelerationStructure,
}
impl GfxDescriptorClass {
    pub fn of(ty: vk::DescriptorType) -> GfxResult<Self> {
        match ty {
            vk::DescriptorType::UNIFORM_BUFFER
            | vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
            | vk::DescriptorType::STORAGE_BUFFER
            | vk::DescriptorType::STORAGE_BUFFER_DYNAMIC => Ok(Self::Buffer),
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
            | vk::DescriptorType::SAMPLED_IMAGE
            | vk::DescriptorType::STORAGE_IMAGE
            | vk::DescriptorType::SAMPLER
            | vk::DescriptorType::INPUT_ATTACHMENT => Ok(Self::Image),
            vk::DescriptorType::ACCELERATION_STRUCTURE_KHR => Ok(Self::AccelerationStructure),
            other => Err(GfxError::InvalidParameter(format!("unsupported descriptor type {other:?}"))),
        }
    }
}

/// 已经解析成原生句柄的 descriptor 信息
#[derive(Clone, Debug)]
pub enum GfxDescriptorInfos {
    Buffers(Vec<vk::DescriptorBufferInfo>),
    Images(Vec<vk::DescriptorImageInfo>),
    AccelerationStructures(Vec<vk::AccelerationStructureKHR>),
}
impl GfxDescriptorInfos {
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Self::Buffers(infos) => infos.len(),
            Self::Images(infos) => infos.len(),
            Self::AccelerationStructures(infos) => infos.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn class(&self) -> GfxDescriptorClass {
        match self {
            Self::Buffers(_) => GfxDescriptorClass::Buffer,
            Self::Images(_) => GfxDescriptorClass::Image,
            Self::AccelerationStructures(_) => GfxDescriptorClass::AccelerationStructure,
        }
    }
}

/// 对一个 binding 的一次写入
#[derive(Clone, Debug)]
pub struct GfxDescriptorUpdate {
    pub binding: u32,
    pub array_element: u32,
    pub descriptor_type: vk::DescriptorType,
    pub infos: GfxDescriptorInfos,
}

/// 不可变的 descriptor set layout
///
/// bindings 按 binding index 排序保存，用来校验之后的写入
pub struct GfxDescriptorSetLayout {
    device: Rc<dyn GfxDevice>,
    handle: vk::DescriptorSetLayout,
    bindings: Vec<GfxDescriptorBinding>,
    name: String,
}
impl Drop for GfxDescriptorSetLayout {
    fn drop(&mut self) {
        log::debug!("destroy descriptor set layout: {}", self.name);
        self.device.destroy_descriptor_set_layout(self.handle);
    }
}
// new & init
impl GfxDescriptorSetLayout {
    /// binding index 重复属于构造错误
    pub fn new(device: Rc<dyn GfxDevice>, bindings: &[GfxDescriptorBinding], name: impl AsRef<str>) -> GfxResult<Self> {
        let name = name.as_ref();
        let bindings = bindings.iter().copied().sorted_by_key(|b| b.binding).collect_vec();

        if let Some((dup, _)) = bindings.iter().tuple_windows().find(|(a, b)| a.binding == b.binding) {
            return Err(GfxError::DuplicateBinding { layout: name.to_string(), binding: dup.binding }.logged());
        }
        if let Some(empty) = bindings.iter().find(|b| b.count == 0) {
            return Err(GfxError::InvalidParameter(format!(
                "descriptor set layout `{name}` binding {} has zero descriptors",
                empty.binding
            ))
            .logged());
        }
        for b in &bindings {
            GfxDescriptorClass::of(b.descriptor_type).map_err(GfxError::logged)?;
        }

        let vk_bindings = bindings.iter().map(GfxDescriptorBinding::vk_binding).collect_vec();
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);
        let handle = device.create_descriptor_set_layout(&create_info, name)?;
        log::debug!("create descriptor set layout `{name}` with {} bindings", bindings.len());

        Ok(Self {
            device,
            handle,
            bindings,
            name: name.to_string(),
        })
    }
}
// getters
impl GfxDescriptorSetLayout {
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.handle
    }

    #[inline]
    pub fn bindings(&self) -> &[GfxDescriptorBinding] {
        &self.bindings
    }

    #[inline]
    pub fn binding(&self, binding: u32) -> Option<&GfxDescriptorBinding> {
        self.bindings.iter().find(|b| b.binding == binding)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// 从共享 pool 中分配的 descriptor set，drop 时归还给 pool
pub struct GfxDescriptorSet {
    device: Rc<dyn GfxDevice>,
    handle: vk::DescriptorSet,
    layout: vk::DescriptorSetLayout,
    name: String,
}
impl Drop for GfxDescriptorSet {
    fn drop(&mut self) {
        log::debug!("free descriptor set: {}", self.name);
        self.device.free_descriptor_set(self.handle);
    }
}
// new & init
impl GfxDescriptorSet {
    /// 分配并一次性写入所有 binding
    ///
    /// 没有提供写入的 binding 保持未设置状态，shader 是否会访问它们由调用者负责
    pub fn new(
        device: Rc<dyn GfxDevice>,
        layout: &GfxDescriptorSetLayout,
        updates: &[GfxDescriptorUpdate],
        name: impl AsRef<str>,
    ) -> GfxResult<Self> {
        let name = name.as_ref();
        Self::validate_updates(layout, updates, name).map_err(GfxError::logged)?;

        for unset in layout.bindings().iter().filter(|b| updates.iter().all(|u| u.binding != b.binding)) {
            log::debug!("descriptor set `{name}`: binding {} left unset", unset.binding);
        }

        let handle = device.allocate_descriptor_set(layout.handle(), layout.name())?;
        let set = Self {
            device,
            handle,
            layout: layout.handle(),
            name: name.to_string(),
        };
        if !updates.is_empty() {
            set.device.update_descriptor_set(set.handle, updates);
        }
        Ok(set)
    }

    fn validate_updates(layout: &GfxDescriptorSetLayout, updates: &[GfxDescriptorUpdate], name: &str) -> GfxResult<()> {
        let mismatch = |binding: u32, reason: String| GfxError::BindingMismatch {
            set: name.to_string(),
            binding,
            reason,
        };

        for update in updates {
            let Some(binding) = layout.binding(update.binding) else {
                return Err(mismatch(update.binding, format!("not declared in layout `{}`", layout.name())));
            };
            if binding.descriptor_type != update.descriptor_type {
                return Err(mismatch(
                    update.binding,
                    format!("layout declares {:?} but write uses {:?}", binding.descriptor_type, update.descriptor_type),
                ));
            }
            if GfxDescriptorClass::of(update.descriptor_type)? != update.infos.class() {
                return Err(mismatch(update.binding, format!("{:?} infos cannot fill it", update.infos.class())));
            }
            if update.infos.is_empty() {
                return Err(mismatch(update.binding, "write carries no descriptors".to_string()));
            }
            let end = update.array_element as usize + update.infos.len();
            if end > binding.count as usize {
                return Err(mismatch(
                    update.binding,
                    format!("writes elements up to {end} but the binding holds {}", binding.count),
                ));
            }
        }
        Ok(())
    }
}
// getters
impl GfxDescriptorSet {
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSet {
        self.handle
    }

    #[inline]
    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::headless::{HeadlessDevice, HeadlessDeviceDesc};
    use crate::foundation::device::GfxDescriptorPoolSizes;

    fn device_with_sets(max_sets: u32) -> Rc<HeadlessDevice> {
        Rc::new(HeadlessDevice::new(HeadlessDeviceDesc {
            descriptor_pool: GfxDescriptorPoolSizes { max_sets, ..Default::default() },
            ..Default::default()
        }))
    }

    fn ubo_update(binding: u32) -> GfxDescriptorUpdate {
        GfxDescriptorUpdate {
            binding,
            array_element: 0,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            infos: GfxDescriptorInfos::Buffers(vec![vk::DescriptorBufferInfo::default().range(vk::WHOLE_SIZE)]),
        }
    }

    #[test]
    fn test_duplicate_binding_rejected() {
        let device = device_with_sets(4);
        let bindings = [
            GfxDescriptorBinding::uniform_buffer(0, vk::ShaderStageFlags::VERTEX),
            GfxDescriptorBinding::combined_image_sampler(0, vk::ShaderStageFlags::FRAGMENT),
        ];
        let err = GfxDescriptorSetLayout::new(device.clone(), &bindings, "dup").err().unwrap();
        assert!(matches!(err, GfxError::DuplicateBinding { binding: 0, .. }));
        // 失败时不能留下任何对象
        assert_eq!(device.live_object_count(), 0);
    }

    #[test]
    fn test_bindings_sorted() {
        let device = device_with_sets(4);
        let bindings = [
            GfxDescriptorBinding::combined_image_sampler(3, vk::ShaderStageFlags::FRAGMENT),
            GfxDescriptorBinding::uniform_buffer(1, vk::ShaderStageFlags::VERTEX),
        ];
        let layout = GfxDescriptorSetLayout::new(device, &bindings, "sorted").unwrap();
        assert_eq!(layout.bindings().iter().map(|b| b.binding).collect_vec(), vec![1, 3]);
        assert!(layout.binding(2).is_none());
    }

    #[test]
    fn test_pool_exhaustion_reported() {
        let device = device_with_sets(2);
        let layout = GfxDescriptorSetLayout::new(
            device.clone(),
            &[GfxDescriptorBinding::uniform_buffer(0, vk::ShaderStageFlags::VERTEX)],
            "camera",
        )
        .unwrap();

        let a = GfxDescriptorSet::new(device.clone(), &layout, &[ubo_update(0)], "a").unwrap();
        let _b = GfxDescriptorSet::new(device.clone(), &layout, &[ubo_update(0)], "b").unwrap();
        let err = GfxDescriptorSet::new(device.clone(), &layout, &[ubo_update(0)], "c").err().unwrap();
        assert!(matches!(err, GfxError::DescriptorPoolExhausted { ref layout } if layout == "camera"));

        // 归还之后可以再次分配
        drop(a);
        assert!(GfxDescriptorSet::new(device, &layout, &[ubo_update(0)], "d").is_ok());
    }

    #[test]
    fn test_write_validation() {
        let device = device_with_sets(4);
        let layout = GfxDescriptorSetLayout::new(
            device.clone(),
            &[GfxDescriptorBinding::uniform_buffer(0, vk::ShaderStageFlags::VERTEX)],
            "camera",
        )
        .unwrap();

        let undeclared = GfxDescriptorSet::new(device.clone(), &layout, &[ubo_update(5)], "x").err().unwrap();
        assert!(matches!(undeclared, GfxError::BindingMismatch { binding: 5, .. }));

        let mut wrong_type = ubo_update(0);
        wrong_type.descriptor_type = vk::DescriptorType::STORAGE_BUFFER;
        let err = GfxDescriptorSet::new(device.clone(), &layout, &[wrong_type], "y").err().unwrap();
        assert!(matches!(err, GfxError::BindingMismatch { binding: 0, .. }));

        let mut too_many = ubo_update(0);
        too_many.infos = GfxDescriptorInfos::Buffers(vec![vk::DescriptorBufferInfo::default(); 2]);
        let err = GfxDescriptorSet::new(device.clone(), &layout, &[too_many], "z").err().unwrap();
        assert!(matches!(err, GfxError::BindingMismatch { binding: 0, .. }));

        // 校验失败不会占用 pool
        assert_eq!(device.allocated_descriptor_sets(), 0);
    }
}
