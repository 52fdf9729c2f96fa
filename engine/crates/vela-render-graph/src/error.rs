use vela_gfx::error::GfxError;

use crate::resource_state::RgResourceState;

/// render graph 编译与执行中的错误
///
/// 声明错误在编译阶段整体失败，不会只应用其中一部分。
#[derive(Debug, thiserror::Error)]
pub enum RgError {
    #[error("cyclic pass dependency among: {}", passes.join(", "))]
    CyclicDependency { passes: Vec<String> },

    #[error("pass `{pass}` uses undeclared resource `{resource}`")]
    UndeclaredResource { pass: String, resource: String },

    #[error("pass name `{0}` is already used in this graph")]
    DuplicatePassName(String),

    #[error("pass `{pass}` declares `{resource}` in both {first:?} and {second:?}")]
    ConflictingStates {
        pass: String,
        resource: String,
        first: RgResourceState,
        second: RgResourceState,
    },

    #[error("pass `{pass}` cannot use `{resource}` as {state:?} ({reason})")]
    InvalidUse {
        pass: String,
        resource: String,
        state: RgResourceState,
        reason: &'static str,
    },

    #[error("virtual resource `{0}` has neither a bound texture nor an image desc")]
    UnboundVirtualResource(String),

    #[error(transparent)]
    Gfx(#[from] GfxError),
}

pub type RgResult<T> = Result<T, RgError>;

impl RgError {
    /// 在错误被抛出的位置打印日志，然后原样返回
    #[inline]
    pub fn logged(self) -> Self {
        log::error!("{self}");
        self
    }
}
