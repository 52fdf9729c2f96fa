//! Pass 声明与执行上下文
//!
//! pass 在 setup 闭包中通过 [`RgPassBuilder`] 声明读写的资源，
//! 执行时回调拿到 [`RgPassContext`]，从中取得 command buffer 与解析后的物理资源。

use indexmap::IndexMap;

use vela_gfx::commands::command_buffer::GfxCommandBuffer;
use vela_gfx::error::{GfxError, GfxResult};
use vela_gfx::resources::buffer::GfxBuffer;
use vela_gfx::resources::image::GfxImage;
use vela_render_interface::resource_storage::ResourceStorage;

use crate::error::{RgError, RgResult};
use crate::resource::{RgPhysicalResource, RgResourceIdentity};
use crate::resource_state::{RgAccessType, RgPassKind, RgResourceState};

slotmap::new_key_type! {
    /// `add_pass` 返回的 pass id，可以用来移除 pass
    pub struct RgPassId;
}

/// pass 对某个资源的一次使用（同一个 pass 内的读写已合并）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgResourceUse {
    pub resource: RgResourceIdentity,
    pub state: RgResourceState,
    pub access: RgAccessType,
    pub is_write: bool,
}

/// builder 收集到的原始声明
struct RgDeclaredUse {
    resource: RgResourceIdentity,
    state: RgResourceState,
    access: Option<RgAccessType>,
    is_write: bool,
}

/// Pass 构建器
///
/// 在 `add_pass` 的 setup 闭包中使用，声明 Pass 的资源依赖。
pub struct RgPassBuilder {
    kind: RgPassKind,
    declared: Vec<RgDeclaredUse>,
}
impl RgPassBuilder {
    pub(crate) fn new(kind: RgPassKind) -> Self {
        Self {
            kind,
            declared: Vec::new(),
        }
    }

    #[inline]
    pub fn kind(&self) -> RgPassKind {
        self.kind
    }

    /// 声明以 `state` 读取资源，stage 与 access 由 pass 类型推导
    pub fn read(&mut self, resource: impl Into<RgResourceIdentity>, state: RgResourceState) -> &mut Self {
        self.declare(resource.into(), state, None, false)
    }

    /// 声明以 `state` 写入资源
    pub fn write(&mut self, resource: impl Into<RgResourceIdentity>, state: RgResourceState) -> &mut Self {
        self.declare(resource.into(), state, None, true)
    }

    /// 读取资源，并显式指定 stage 与 access
    pub fn read_with_access(
        &mut self,
        resource: impl Into<RgResourceIdentity>,
        state: RgResourceState,
        access: RgAccessType,
    ) -> &mut Self {
        self.declare(resource.into(), state, Some(access), false)
    }

    pub fn write_with_access(
        &mut self,
        resource: impl Into<RgResourceIdentity>,
        state: RgResourceState,
        access: RgAccessType,
    ) -> &mut Self {
        self.declare(resource.into(), state, Some(access), true)
    }

    fn declare(
        &mut self,
        resource: RgResourceIdentity,
        state: RgResourceState,
        access: Option<RgAccessType>,
        is_write: bool,
    ) -> &mut Self {
        self.declared.push(RgDeclaredUse {
            resource,
            state,
            access,
            is_write,
        });
        self
    }

    /// 校验声明，并把同一资源的读写合并为一次使用
    ///
    /// 合并后的顺序与第一次声明的顺序一致
    pub(crate) fn finish(self, pass: &str) -> RgResult<Vec<RgResourceUse>> {
        let mut merged: IndexMap<RgResourceIdentity, RgResourceUse> = IndexMap::new();

        for decl in self.declared {
            let invalid = |reason: &'static str| {
                RgError::InvalidUse {
                    pass: pass.to_string(),
                    resource: decl.resource.to_string(),
                    state: decl.state,
                    reason,
                }
                .logged()
            };

            if matches!(decl.state, RgResourceState::Uninitialized | RgResourceState::Present) {
                return Err(invalid("state can not be required by a pass"));
            }
            if decl.resource.is_buffer() && !decl.state.applies_to_buffer() {
                return Err(invalid("not a buffer state"));
            }
            if !decl.resource.is_buffer() && !decl.state.applies_to_image() {
                return Err(invalid("not an image state"));
            }
            let access = match decl.access {
                Some(access) => access,
                None => decl.state.access(self.kind, decl.is_write).ok_or_else(|| invalid("state is read-only"))?,
            };

            match merged.get_mut(&decl.resource) {
                Some(existing) if existing.state != decl.state => {
                    return Err(RgError::ConflictingStates {
                        pass: pass.to_string(),
                        resource: decl.resource.to_string(),
                        first: existing.state,
                        second: decl.state,
                    }
                    .logged());
                }
                Some(existing) => {
                    existing.access = existing.access.union(access);
                    existing.is_write |= decl.is_write;
                }
                None => {
                    merged.insert(
                        decl.resource.clone(),
                        RgResourceUse {
                            resource: decl.resource,
                            state: decl.state,
                            access,
                            is_write: decl.is_write,
                        },
                    );
                }
            }
        }

        Ok(merged.into_values().collect())
    }
}

/// pass 的录制回调
pub type RgPassCallback<'a> = Box<dyn FnMut(&RgPassContext<'_>) -> GfxResult<()> + 'a>;

/// 注册到 graph 中的 pass
pub(crate) struct RgPassNode<'a> {
    pub name: String,
    pub kind: RgPassKind,
    pub uses: Vec<RgResourceUse>,
    pub callback: RgPassCallback<'a>,
}

/// Pass 执行时的上下文
///
/// 提供 Pass 执行所需的资源访问和命令缓冲区。
pub struct RgPassContext<'a> {
    pub cmd: &'a GfxCommandBuffer,
    pub storage: &'a ResourceStorage,
    /// 当前的 frames-in-flight 槽位，用于选择 per-frame 数据
    pub frame_slot: usize,
    pub pass_name: &'a str,

    /// 这个 pass 声明过的资源
    pub(crate) resources: &'a [(RgResourceIdentity, RgPhysicalResource)],
}
impl RgPassContext<'_> {
    /// 获取声明过的资源对应的 storage handle
    pub fn resolve(&self, resource: &RgResourceIdentity) -> Option<RgPhysicalResource> {
        self.resources.iter().find(|(identity, _)| identity == resource).map(|(_, physical)| *physical)
    }

    /// 获取图像（包括虚拟资源绑定的 texture）
    pub fn image(&self, resource: impl Into<RgResourceIdentity>) -> GfxResult<&GfxImage> {
        let resource = resource.into();
        let texture = self
            .resolve(&resource)
            .and_then(|physical| physical.texture_ref())
            .ok_or_else(|| self.undeclared(&resource))?;
        self.storage.get_image(texture)
    }

    pub fn buffer(&self, resource: impl Into<RgResourceIdentity>) -> GfxResult<&GfxBuffer> {
        let resource = resource.into();
        let buffer = self
            .resolve(&resource)
            .and_then(|physical| physical.buffer())
            .ok_or_else(|| self.undeclared(&resource))?;
        self.storage.get_buffer(buffer)
    }

    /// 这个 pass 声明过的所有资源
    #[inline]
    pub fn resources(&self) -> &[(RgResourceIdentity, RgPhysicalResource)] {
        self.resources
    }

    fn undeclared(&self, resource: &RgResourceIdentity) -> GfxError {
        GfxError::InvalidParameter(format!("pass `{}` did not declare {resource}", self.pass_name)).logged()
    }
}

#[cfg(test)]
mod tests {
    use vela_render_interface::handles::{GfxBufferHandle, GfxTexture2DHandle};

    use super::*;

    #[test]
    fn test_read_and_write_merge() {
        let mut builder = RgPassBuilder::new(RgPassKind::Compute);
        builder
            .read("history", RgResourceState::General)
            .write("history", RgResourceState::General)
            .read(GfxBufferHandle::from_id(0), RgResourceState::UniformBuffer);
        let uses = builder.finish("taa").unwrap();

        assert_eq!(uses.len(), 2);
        assert_eq!(uses[0].resource, RgResourceIdentity::virtual_name("history"));
        assert!(uses[0].is_write);
        assert!(uses[0].access.is_write());
        assert!(!uses[1].is_write);
    }

    #[test]
    fn test_conflicting_states() {
        let mut builder = RgPassBuilder::new(RgPassKind::Graphics);
        builder
            .read("color", RgResourceState::ShaderReadOnly)
            .write("color", RgResourceState::ColorAttachment);
        assert!(matches!(builder.finish("blur"), Err(RgError::ConflictingStates { .. })));
    }

    #[test]
    fn test_invalid_uses() {
        let cases: [(RgResourceIdentity, RgResourceState, bool); 4] = [
            (GfxTexture2DHandle::from_id(0).into(), RgResourceState::ShaderReadOnly, true),
            (GfxBufferHandle::from_id(0).into(), RgResourceState::ColorAttachment, false),
            ("color".into(), RgResourceState::VertexBuffer, false),
            ("color".into(), RgResourceState::Present, false),
        ];
        for (resource, state, write) in cases {
            let mut builder = RgPassBuilder::new(RgPassKind::Graphics);
            if write {
                builder.write(resource, state);
            } else {
                builder.read(resource, state);
            }
            assert!(matches!(builder.finish("bad"), Err(RgError::InvalidUse { .. })), "{state:?}");
        }
    }
}
