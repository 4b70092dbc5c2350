//! Data Transfer Objects for REST request/response serialization.
//!
//! Money fields are integer minor currency units (e.g. cents).

pub mod clan_buy_dto;
pub mod flash_drop_dto;

pub use clan_buy_dto::*;
pub use flash_drop_dto::*;
