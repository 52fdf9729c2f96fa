use vela_gfx::error::{GfxError, GfxResult};

use crate::handles::{GfxHandle, GfxResourceKind};

/// 某一类资源的表：id 即下标
///
/// id 单调递增，销毁后对应的槽位保持为空，id 不会被复用。
/// 因此已经销毁的 handle 永远不会指向一个新的资源。
pub struct GfxResourcePool<T> {
    slots: Vec<Option<T>>,
    live: usize,
}
impl<T> Default for GfxResourcePool<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            live: 0,
        }
    }
}
impl<T: GfxResourceKind> GfxResourcePool<T> {
    pub fn insert(&mut self, resource: T) -> GfxResult<GfxHandle<T>> {
        let id = i32::try_from(self.slots.len()).map_err(|_| {
            GfxError::InvalidParameter(format!("{} id space exhausted", T::KIND)).logged()
        })?;
        self.slots.push(Some(resource));
        self.live += 1;
        Ok(GfxHandle::from_id(id))
    }

    fn stale(handle: GfxHandle<T>) -> GfxError {
        GfxError::StaleHandle {
            kind: T::KIND,
            id: handle.id(),
        }
        .logged()
    }

    pub fn get(&self, handle: GfxHandle<T>) -> GfxResult<&T> {
        usize::try_from(handle.id())
            .ok()
            .and_then(|idx| self.slots.get(idx))
            .and_then(Option::as_ref)
            .ok_or_else(|| Self::stale(handle))
    }

    pub fn get_mut(&mut self, handle: GfxHandle<T>) -> GfxResult<&mut T> {
        usize::try_from(handle.id())
            .ok()
            .and_then(|idx| self.slots.get_mut(idx))
            .and_then(Option::as_mut)
            .ok_or_else(|| Self::stale(handle))
    }

    /// 从表中移除并交还所有权
    pub fn remove(&mut self, handle: GfxHandle<T>) -> GfxResult<T> {
        let resource = usize::try_from(handle.id())
            .ok()
            .and_then(|idx| self.slots.get_mut(idx))
            .and_then(Option::take)
            .ok_or_else(|| Self::stale(handle))?;
        self.live -= 1;
        Ok(resource)
    }

    #[inline]
    pub fn contains(&self, handle: GfxHandle<T>) -> bool {
        usize::try_from(handle.id()).ok().and_then(|idx| self.slots.get(idx)).is_some_and(Option::is_some)
    }

    /// 存活的资源数量
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// 下一个将要分配的 id
    #[inline]
    pub fn next_id(&self) -> i32 {
        self.slots.len() as i32
    }

    pub fn iter(&self) -> impl Iterator<Item = (GfxHandle<T>, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|r| (GfxHandle::from_id(idx as i32), r)))
    }

    /// 按创建的逆序销毁所有资源，之后创建的资源仍然使用新的 id
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut().rev() {
            drop(slot.take());
        }
        self.live = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy(u32);
    impl GfxResourceKind for Dummy {
        const KIND: &'static str = "Dummy";
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut pool = GfxResourcePool::<Dummy>::default();
        let a = pool.insert(Dummy(1)).unwrap();
        let b = pool.insert(Dummy(2)).unwrap();
        assert_eq!((a.id(), b.id()), (0, 1));

        assert_eq!(pool.remove(a).unwrap().0, 1);
        let c = pool.insert(Dummy(3)).unwrap();
        assert_eq!(c.id(), 2);
        assert_eq!(pool.len(), 2);

        assert!(matches!(pool.get(a), Err(GfxError::StaleHandle { kind: "Dummy", id: 0 })));
        assert!(pool.remove(a).is_err());
        assert_eq!(pool.get(c).unwrap().0, 3);
    }

    #[test]
    fn test_invalid_handle_lookup() {
        let pool = GfxResourcePool::<Dummy>::default();
        assert!(pool.get(GfxHandle::INVALID).is_err());
        assert!(pool.get(GfxHandle::from_id(7)).is_err());
        assert!(!pool.contains(GfxHandle::INVALID));
    }

    #[test]
    fn test_clear_keeps_id_counter() {
        let mut pool = GfxResourcePool::<Dummy>::default();
        pool.insert(Dummy(0)).unwrap();
        pool.insert(Dummy(1)).unwrap();
        pool.clear();
        assert!(pool.is_empty());
        assert_eq!(pool.insert(Dummy(2)).unwrap().id(), 2);
        assert_eq!(pool.iter().count(), 1);
    }
}
