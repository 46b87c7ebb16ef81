//! Where signed provenance ends up: the public transparency log
//! ([`rekor`]) and the local attestation file ([`filesystem`]).

pub mod filesystem;
pub mod rekor;
