pub mod crypto;
pub mod html;
pub mod token;
