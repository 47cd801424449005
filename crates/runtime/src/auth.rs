//! Challenge-response authentication string for `Identify`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

use autocast_protocol::AuthChallenge;

/// `base64(sha256(base64(sha256(password + salt)) + challenge))`
pub fn auth_response(password: &str, challenge: &AuthChallenge) -> String {
    let secret = STANDARD.encode(Sha256::digest(format!("{password}{}", challenge.salt)));
    STANDARD.encode(Sha256::digest(format!("{secret}{}", challenge.challenge)))
}
