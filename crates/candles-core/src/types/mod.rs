//! 핵심 타입 정의.

pub mod interval;
pub mod pair;
pub mod timestamp;

pub use interval::*;
pub use pair::*;
pub use timestamp::*;
