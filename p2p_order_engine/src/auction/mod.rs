//! The priority auction for the shared matching pool.
//!
//! Pool entries carry a premium (in basis points) that the auto-bump worker raises step by step until the entry is
//! taken, expires or reaches its cap. See [`crate::MempoolApi`] for the bump operations and [`pool_view`] for how the
//! pool is presented.
mod decay;
mod pool_view;

pub use decay::{boost_fee, FULL_FEE_SECS, ZERO_FEE_SECS};
pub use pool_view::{
    pool_view,
    sort_items,
    PoolFilter,
    PoolItem,
    PoolSort,
    EXPIRING_SOON_SECS,
    HIGH_PREMIUM_THRESHOLD,
    LARGE_AMOUNT_THRESHOLD,
};
