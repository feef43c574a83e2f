//! Common utilities for lapse.

pub use common::buffer2::Buffer2;
pub use common::parallel::{par_map_limited, par_rows_mut};
