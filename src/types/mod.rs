mod base;
mod ctx;

pub use base::*;
pub use ctx::TypeInfo;

static_assertions::assert_eq_size!(DirectHandle, u32);
static_assertions::assert_eq_size!(IndirectHandle, u32);
static_assertions::assert_impl_all!(TypeInfo: Send, Sync);
