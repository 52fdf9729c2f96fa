use std::ffi::CString;
use std::rc::Rc;

use ash::vk;

use crate::error::{GfxError, GfxResult};
use crate::foundation::device::GfxDevice;

/// SPIR-V 文件的第一个 word
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// 一个 shader stage 的源码：stage 类型 + SPIR-V + 入口函数
#[derive(Clone, Debug)]
pub struct GfxShaderStage {
    pub stage: vk::ShaderStageFlags,
    pub code: Vec<u32>,
    pub entry_point: CString,
    pub name: String,
}
impl GfxShaderStage {
    /// 入口函数默认为 `main`
    pub fn from_spirv(stage: vk::ShaderStageFlags, code: Vec<u32>, name: impl Into<String>) -> Self {
        Self {
            stage,
            code,
            entry_point: CString::from(c"main"),
            name: name.into(),
        }
    }

    /// 从 `.spv` 文件的字节加载
    ///
    /// 字节数必须是 4 的倍数，字节序由 `ash::util::read_spv` 处理
    pub fn from_bytes(stage: vk::ShaderStageFlags, bytes: &[u8], name: impl Into<String>) -> GfxResult<Self> {
        let name = name.into();
        let code = ash::util::read_spv(&mut std::io::Cursor::new(bytes)).map_err(|_| {
            GfxError::InvalidShaderCode {
                name: name.clone(),
                reason: "byte length is not a multiple of 4",
            }
            .logged()
        })?;
        Ok(Self::from_spirv(stage, code, name))
    }

    #[inline]
    pub fn entry_point(mut self, entry_point: &str) -> GfxResult<Self> {
        self.entry_point = CString::new(entry_point)
            .map_err(|_| GfxError::InvalidParameter(format!("entry point of `{}` contains NUL", self.name)))?;
        Ok(self)
    }

    /// 只做最基本的检查：非空，以及 magic number
    pub fn validate(&self) -> GfxResult<()> {
        if self.code.is_empty() {
            return Err(GfxError::InvalidShaderCode {
                name: self.name.clone(),
                reason: "empty code",
            }
            .logged());
        }
        if self.code[0] != SPIRV_MAGIC {
            return Err(GfxError::InvalidShaderCode {
                name: self.name.clone(),
                reason: "missing SPIR-V magic number",
            }
            .logged());
        }
        Ok(())
    }
}

/// 生命周期跟随 pipeline 的创建过程，pipeline 创建完成后即可 drop
pub struct GfxShaderModule {
    device: Rc<dyn GfxDevice>,
    handle: vk::ShaderModule,
    stage: vk::ShaderStageFlags,
}
impl Drop for GfxShaderModule {
    fn drop(&mut self) {
        self.device.destroy_shader_module(self.handle);
    }
}
// new & init
impl GfxShaderModule {
    pub fn new(device: Rc<dyn GfxDevice>, stage: &GfxShaderStage) -> GfxResult<Self> {
        stage.validate()?;
        let handle = device.create_shader_module(&stage.code, &stage.name)?;
        Ok(Self {
            device,
            handle,
            stage: stage.stage,
        })
    }
}
// getters
impl GfxShaderModule {
    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.handle
    }

    #[inline]
    pub fn stage(&self) -> vk::ShaderStageFlags {
        self.stage
    }
}

/// 测试用的最小 SPIR-V：只有 header
pub fn dummy_spirv() -> Vec<u32> {
    vec![SPIRV_MAGIC, 0x0001_0600, 0, 1, 0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::headless::{HeadlessDevice, HeadlessDeviceDesc};

    #[test]
    fn test_from_bytes() {
        let bytes = dummy_spirv().iter().flat_map(|w| w.to_le_bytes()).collect::<Vec<_>>();
        let stage = GfxShaderStage::from_bytes(vk::ShaderStageFlags::VERTEX, &bytes, "vs").unwrap();
        assert_eq!(stage.code, dummy_spirv());
        assert!(stage.validate().is_ok());

        let err = GfxShaderStage::from_bytes(vk::ShaderStageFlags::VERTEX, &bytes[..5], "vs").unwrap_err();
        assert!(matches!(err, GfxError::InvalidShaderCode { .. }));
    }

    #[test]
    fn test_invalid_code_rejected() {
        let device: Rc<dyn GfxDevice> = Rc::new(HeadlessDevice::new(HeadlessDeviceDesc::default()));
        let empty = GfxShaderStage::from_spirv(vk::ShaderStageFlags::FRAGMENT, vec![], "empty");
        assert!(GfxShaderModule::new(device.clone(), &empty).is_err());

        let garbage = GfxShaderStage::from_spirv(vk::ShaderStageFlags::FRAGMENT, vec![1, 2, 3], "garbage");
        assert!(matches!(
            GfxShaderModule::new(device.clone(), &garbage),
            Err(GfxError::InvalidShaderCode { reason: "missing SPIR-V magic number", .. })
        ));

        let ok = GfxShaderStage::from_spirv(vk::ShaderStageFlags::FRAGMENT, dummy_spirv(), "ok");
        let module = GfxShaderModule::new(device, &ok).unwrap();
        assert_eq!(module.stage(), vk::ShaderStageFlags::FRAGMENT);
    }
}
