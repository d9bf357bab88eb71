//! Static readers for the obfuscated javascript embed pages ship with.
//! Nothing in here evaluates the script it is given.

pub mod escape;
pub mod packer;
