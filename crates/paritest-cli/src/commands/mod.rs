pub mod cases;
pub mod check;
pub mod compare;
pub mod features;
pub mod init;
pub mod pin_seed;
pub mod validate;
