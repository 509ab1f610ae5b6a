pub mod barrier;
mod common_util;
pub mod coordinator;
pub mod distributed;
pub mod double_array;
pub mod error;
pub mod incumbent;
pub mod link;
pub mod meta;
pub mod population;
pub mod result;
pub mod rng;
pub mod router;
pub mod worker;
