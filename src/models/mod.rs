pub mod enums;
pub mod metric;
pub mod report;

pub use enums::*;
pub use metric::*;
pub use report::*;
