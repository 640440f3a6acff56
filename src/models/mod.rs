pub mod binding;
pub mod user;

pub use binding::Binding;
pub use user::User;
