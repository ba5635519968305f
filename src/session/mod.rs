//! Session keys and the per-process session registry.

mod key;
mod registry;

pub use key::{
    create_key_generator, HandshakeContext, HandshakeError, PrincipalKeyGenerator,
    QueryParameterKeyGenerator, SessionKey, SessionKeyGenerator,
};
pub use registry::{RegistryStats, SessionRegistry};
