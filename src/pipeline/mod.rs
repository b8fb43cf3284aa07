//! Build pipeline: deciding where to resume and driving the remaining work.

mod decision;
mod engine;
mod mine;

pub use decision::*;
pub use engine::*;
pub use mine::*;
