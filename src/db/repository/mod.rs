pub mod key_value;
pub mod preference;

pub use key_value::*;
pub use preference::*;
