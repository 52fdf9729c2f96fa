use std::rc::Rc;

use ash::vk;

use crate::basic::align::{align_up, is_valid_alignment};
use crate::commands::command_buffer::GfxCommandBuffer;
use crate::error::{GfxError, GfxResult};
use crate::foundation::device::{GfxBufferDesc, GfxDevice};

/// 创建 buffer 的参数
///
/// buffer 由 `instance_count` 个实例组成，每个实例占用 `alignment_size` 字节：
/// `instance_size` 向上对齐到 `min_offset_alignment`。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxBufferCreateInfo {
    pub instance_size: vk::DeviceSize,
    pub instance_count: u32,
    pub usage: vk::BufferUsageFlags,
    pub memory_props: vk::MemoryPropertyFlags,
    /// 必须是 2 的幂，1 表示紧密排列
    pub min_offset_alignment: vk::DeviceSize,
    /// 是否持久映射
    pub map: bool,
}
// new & init
impl GfxBufferCreateInfo {
    /// device local，紧密排列，不映射
    pub fn new(instance_size: vk::DeviceSize, instance_count: u32, usage: vk::BufferUsageFlags) -> Self {
        Self {
            instance_size,
            instance_count,
            usage,
            memory_props: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            min_offset_alignment: 1,
            map: false,
        }
    }

    /// host visible 的 staging buffer，作为 transfer 的 src
    pub fn stage(size: vk::DeviceSize) -> Self {
        Self::new(size, 1, vk::BufferUsageFlags::TRANSFER_SRC).host_visible()
    }

    /// host visible 的回读 buffer，作为 transfer 的 dst
    pub fn readback(size: vk::DeviceSize) -> Self {
        Self::new(size, 1, vk::BufferUsageFlags::TRANSFER_DST).host_visible()
    }

    /// builder
    #[inline]
    pub fn memory_props(mut self, memory_props: vk::MemoryPropertyFlags) -> Self {
        self.memory_props = memory_props;
        self
    }

    /// builder
    #[inline]
    pub fn min_offset_alignment(mut self, alignment: vk::DeviceSize) -> Self {
        self.min_offset_alignment = alignment;
        self
    }

    /// builder
    #[inline]
    pub fn mapped(mut self, map: bool) -> Self {
        self.map = map;
        self
    }

    /// builder: host visible + coherent，并且持久映射
    #[inline]
    pub fn host_visible(self) -> Self {
        self.memory_props(vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT).mapped(true)
    }
}
// tools
impl GfxBufferCreateInfo {
    /// 单个实例的跨度
    pub fn alignment_size(&self) -> GfxResult<vk::DeviceSize> {
        if !is_valid_alignment(self.min_offset_alignment) {
            return Err(GfxError::InvalidParameter(format!(
                "min_offset_alignment {} is not a power of two",
                self.min_offset_alignment
            ))
            .logged());
        }
        if self.instance_size == 0 {
            return Err(GfxError::InvalidParameter("buffer instance size is zero".to_string()).logged());
        }
        align_up(self.instance_size, self.min_offset_alignment).ok_or_else(|| {
            GfxError::InvalidParameter(format!(
                "buffer instance size overflows: {} aligned to {}",
                self.instance_size, self.min_offset_alignment
            ))
            .logged()
        })
    }

    /// 整个 buffer 的大小：`alignment_size * instance_count`
    pub fn buffer_size(&self) -> GfxResult<vk::DeviceSize> {
        if self.instance_count == 0 {
            return Err(GfxError::InvalidParameter("buffer instance count is zero".to_string()).logged());
        }
        let stride = self.alignment_size()?;
        stride.checked_mul(self.instance_count as vk::DeviceSize).ok_or_else(|| {
            GfxError::InvalidParameter(format!("buffer size overflows: {stride} * {}", self.instance_count)).logged()
        })
    }
}

/// 一块 buffer 以及它的内存
///
/// drop 时释放
pub struct GfxBuffer {
    device: Rc<dyn GfxDevice>,
    handle: vk::Buffer,
    info: GfxBufferCreateInfo,
    alignment_size: vk::DeviceSize,
    size: vk::DeviceSize,
    name: String,
}
impl Drop for GfxBuffer {
    fn drop(&mut self) {
        log::debug!("destroying buffer `{}`", self.name);
        self.device.destroy_buffer(self.handle);
    }
}
// new & init
impl GfxBuffer {
    pub fn new(device: Rc<dyn GfxDevice>, info: &GfxBufferCreateInfo, name: impl AsRef<str>) -> GfxResult<Self> {
        let name = name.as_ref();
        let alignment_size = info.alignment_size()?;
        let size = info.buffer_size()?;

        let handle = device.create_buffer(&GfxBufferDesc {
            size,
            usage: info.usage,
            memory_props: info.memory_props,
            alignment: info.min_offset_alignment,
            mapped: info.map,
            name,
        })?;
        log::debug!(
            "buffer `{name}` created: {} x {alignment_size} = {size} bytes, usage = {:?}",
            info.instance_count,
            info.usage
        );

        Ok(Self {
            device,
            handle,
            info: *info,
            alignment_size,
            size,
            name: name.to_string(),
        })
    }

    #[inline]
    pub fn new_stage_buffer(device: Rc<dyn GfxDevice>, size: vk::DeviceSize, name: impl AsRef<str>) -> GfxResult<Self> {
        Self::new(device, &GfxBufferCreateInfo::stage(size), name)
    }

    /// 创建 device local 的 buffer，并通过 staging buffer 上传 `data`
    ///
    /// 返回时 copy 已经执行完毕
    pub fn new_device_local_with_data(
        device: Rc<dyn GfxDevice>,
        info: &GfxBufferCreateInfo,
        data: &[u8],
        name: impl AsRef<str>,
    ) -> GfxResult<Self> {
        let mut info = *info;
        info.usage |= vk::BufferUsageFlags::TRANSFER_DST;
        info.memory_props = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        info.map = false;

        let buffer = Self::new(device, &info, name)?;
        buffer.transfer_data_sync(data)?;
        Ok(buffer)
    }
}
// getters
impl GfxBuffer {
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn alignment_size(&self) -> vk::DeviceSize {
        self.alignment_size
    }

    #[inline]
    pub fn instance_size(&self) -> vk::DeviceSize {
        self.info.instance_size
    }

    #[inline]
    pub fn instance_count(&self) -> u32 {
        self.info.instance_count
    }

    #[inline]
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.info.usage
    }

    #[inline]
    pub fn is_mapped(&self) -> bool {
        self.info.map
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.handle,
            offset: 0,
            range: vk::WHOLE_SIZE,
        }
    }

    /// 指向第 `index` 个实例
    pub fn descriptor_info_for_index(&self, index: u32) -> GfxResult<vk::DescriptorBufferInfo> {
        self.check_index(index)?;
        Ok(vk::DescriptorBufferInfo {
            buffer: self.handle,
            offset: index as vk::DeviceSize * self.alignment_size,
            range: self.alignment_size,
        })
    }
}
// tools
impl GfxBuffer {
    fn check_index(&self, index: u32) -> GfxResult<()> {
        if index >= self.info.instance_count {
            return Err(GfxError::InvalidParameter(format!(
                "buffer `{}` has {} instances, index {index} is out of range",
                self.name, self.info.instance_count
            ))
            .logged());
        }
        Ok(())
    }

    /// 通过映射的内存写入，写完自动 flush
    #[inline]
    pub fn write_to_buffer(&self, data: &[u8], offset: vk::DeviceSize) -> GfxResult<()> {
        self.device.write_buffer(self.handle, offset, data)
    }

    /// 写入第 `index` 个实例，数据不能超过 `instance_size`
    pub fn write_to_index(&self, data: &[u8], index: u32) -> GfxResult<()> {
        self.check_index(index)?;
        if data.len() as vk::DeviceSize > self.info.instance_size {
            return Err(GfxError::OutOfBounds {
                name: self.name.clone(),
                offset: 0,
                len: data.len() as vk::DeviceSize,
                size: self.info.instance_size,
            }
            .logged());
        }
        self.write_to_buffer(data, index as vk::DeviceSize * self.alignment_size)
    }

    #[inline]
    pub fn write_pod<T: bytemuck::Pod>(&self, value: &T, index: u32) -> GfxResult<()> {
        self.write_to_index(bytemuck::bytes_of(value), index)
    }

    #[inline]
    pub fn read_from_buffer(&self, out: &mut [u8], offset: vk::DeviceSize) -> GfxResult<()> {
        self.device.read_buffer(self.handle, offset, out)
    }

    /// 通过 staging buffer 把 data 传到 buffer 的起始位置，同步等待完成
    ///
    /// buffer 需要有 `TRANSFER_DST` usage
    pub fn transfer_data_sync(&self, data: &[u8]) -> GfxResult<()> {
        vela_crate_tools::profile_function!();
        if data.is_empty() {
            return Ok(());
        }
        if data.len() as vk::DeviceSize > self.size {
            return Err(GfxError::OutOfBounds {
                name: self.name.clone(),
                offset: 0,
                len: data.len() as vk::DeviceSize,
                size: self.size,
            }
            .logged());
        }

        let stage_buffer = Self::new_stage_buffer(
            self.device.clone(),
            data.len() as vk::DeviceSize,
            format!("{}-stage-buffer", self.name),
        )?;
        stage_buffer.write_to_buffer(data, 0)?;

        GfxCommandBuffer::one_time_exec(&self.device, &format!("upload-{}", self.name), |cmd| {
            cmd.cmd_copy_buffer(
                &stage_buffer,
                self,
                &[vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: 0,
                    size: data.len() as vk::DeviceSize,
                }],
            );
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::headless::{HeadlessDevice, HeadlessDeviceDesc};

    fn headless() -> (Rc<HeadlessDevice>, Rc<dyn GfxDevice>) {
        let headless = Rc::new(HeadlessDevice::new(HeadlessDeviceDesc::default()));
        let device: Rc<dyn GfxDevice> = headless.clone();
        (headless, device)
    }

    #[test]
    fn test_aligned_instance_stride() {
        let info =
            GfxBufferCreateInfo::new(64, 3, vk::BufferUsageFlags::UNIFORM_BUFFER).min_offset_alignment(256);
        assert_eq!(info.alignment_size().unwrap(), 256);
        assert_eq!(info.buffer_size().unwrap(), 768);

        let (headless, device) = headless();
        let buffer = GfxBuffer::new(device, &info, "camera").unwrap();
        assert_eq!(buffer.size(), 768);
        assert_eq!(headless.memory_used(), 768);

        let info = buffer.descriptor_info_for_index(2).unwrap();
        assert_eq!(info.offset, 512);
        assert_eq!(info.range, 256);
        assert!(buffer.descriptor_info_for_index(3).is_err());
    }

    #[test]
    fn test_invalid_alignment() {
        let info = GfxBufferCreateInfo::new(64, 1, vk::BufferUsageFlags::UNIFORM_BUFFER).min_offset_alignment(48);
        assert!(matches!(info.buffer_size(), Err(GfxError::InvalidParameter(_))));
        assert!(GfxBufferCreateInfo::new(0, 1, vk::BufferUsageFlags::UNIFORM_BUFFER).buffer_size().is_err());
        assert!(GfxBufferCreateInfo::new(4, 0, vk::BufferUsageFlags::UNIFORM_BUFFER).buffer_size().is_err());
    }

    #[test]
    fn test_oversized_instance_rejected() {
        let info = GfxBufferCreateInfo::new(u64::MAX - 10, 1, vk::BufferUsageFlags::UNIFORM_BUFFER)
            .min_offset_alignment(256);
        assert!(matches!(info.alignment_size(), Err(GfxError::InvalidParameter(_))));
        assert!(matches!(info.buffer_size(), Err(GfxError::InvalidParameter(_))));

        let info = GfxBufferCreateInfo::new(u64::MAX / 2, 3, vk::BufferUsageFlags::UNIFORM_BUFFER);
        assert!(matches!(info.buffer_size(), Err(GfxError::InvalidParameter(_))));

        let (headless, device) = headless();
        assert!(GfxBuffer::new(device, &info, "huge").is_err());
        assert_eq!(headless.memory_used(), 0);
    }

    #[test]
    fn test_write_to_index() {
        let (headless, device) = headless();
        let info = GfxBufferCreateInfo::new(8, 2, vk::BufferUsageFlags::UNIFORM_BUFFER)
            .min_offset_alignment(16)
            .host_visible();
        let buffer = GfxBuffer::new(device, &info, "per-frame").unwrap();
        buffer.write_pod(&[1u32, 2u32], 1).unwrap();

        let data = headless.buffer_data(buffer.handle()).unwrap();
        assert_eq!(&data[16..24], bytemuck::cast_slice::<u32, u8>(&[1, 2]));
        assert!(buffer.write_to_index(&[0; 9], 0).is_err());
    }

    #[test]
    fn test_staged_upload() {
        let (headless, device) = headless();
        let data = (0..32u8).collect::<Vec<_>>();
        let buffer = GfxBuffer::new_device_local_with_data(
            device,
            &GfxBufferCreateInfo::new(32, 1, vk::BufferUsageFlags::VERTEX_BUFFER),
            &data,
            "vertices",
        )
        .unwrap();

        assert_eq!(headless.buffer_data(buffer.handle()).unwrap(), data);
        // staging buffer 已经释放
        assert_eq!(headless.live_count_of("Buffer"), 1);
        assert!(!buffer.is_mapped());
    }
}
