pub mod class;
pub mod user;
pub mod user_class;

pub use class::*;
pub use user::*;
pub use user_class::*;
