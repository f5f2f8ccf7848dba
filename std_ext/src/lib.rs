use std::sync::Arc;

use easy_ext::ext;

#[ext(ArcExt)]
pub impl<T: ?Sized> Arc<T> {
    #[must_use]
    fn clone_arc(&self) -> Self {
        Self::clone(self)
    }

    fn make_mut(&mut self) -> &mut T
    where
        T: Clone,
    {
        Self::make_mut(self)
    }
}
