//! Identifier types shared by every crate in the shop workspace.

mod types;

pub use types::{CouponId, MemberId, OrderId, ProductId};
