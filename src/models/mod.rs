pub mod notification;
pub mod source;
