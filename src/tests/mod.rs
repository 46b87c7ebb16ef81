pub(crate) mod common;
mod trust_root;
