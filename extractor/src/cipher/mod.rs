pub mod substitution;
pub mod token;

pub use substitution::{decrypt, find_cipher_payload, CipherPayload};
pub use token::{generate_token, select_url, DomainConfig, DomainToken};
