use easy_ext::ext;
use typenum::{NonZero, Unsigned};

#[ext(U64Ext)]
pub impl u64 {
    #[inline]
    #[must_use]
    fn div_typenum<N: Unsigned + NonZero>(self) -> Self {
        self / N::U64
    }

    #[inline]
    #[must_use]
    fn mod_typenum<N: Unsigned + NonZero>(self) -> Self {
        self % N::U64
    }
}

#[ext(I64Ext)]
pub impl i64 {
    /// Adds a balance to a signed weight difference, failing instead of wrapping.
    #[inline]
    #[must_use]
    fn checked_add_gwei(self, gwei: u64) -> Option<Self>
    where
        Self: Sized,
    {
        self.checked_add(gwei.try_into().ok()?)
    }

    /// Subtracts a balance from a signed weight difference, failing instead of wrapping.
    #[inline]
    #[must_use]
    fn checked_sub_gwei(self, gwei: u64) -> Option<Self>
    where
        Self: Sized,
    {
        self.checked_sub(gwei.try_into().ok()?)
    }
}
