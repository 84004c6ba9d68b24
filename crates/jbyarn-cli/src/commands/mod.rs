pub mod configure;
pub mod master;
