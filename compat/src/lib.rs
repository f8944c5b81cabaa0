extern crate self as nix_state_compat;

pub mod aterm;
pub mod conf;
pub mod derivation;
pub mod nixbase32;
pub mod nixhash;
pub mod store;
pub mod store_path;
