use rand::Rng;

/// Symbols a short code is drawn from: `A-Z`, `a-z` and `0-9`.
pub const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Length of codes minted when nothing else is configured.
pub const DEFAULT_LENGTH: usize = 6;

// largest multiple of 62 that fits in a byte; anything at or above it is resampled
const REJECT_FROM: u8 = (u8::MAX as usize / ALPHABET.len() * ALPHABET.len()) as u8;

/// returns a random alphanumeric code of `len` characters.
///
/// Uniqueness is not checked here, the store does that when it inserts.
pub fn generate(len: usize) -> String {
    let mut rng = rand::rng();
    let mut code = String::with_capacity(len);
    let mut buf = [0u8; 16];
    while code.len() < len {
        rng.fill_bytes(&mut buf);
        for b in buf.iter().filter(|b| **b < REJECT_FROM) {
            if code.len() == len {
                break;
            }
            code.push(ALPHABET[*b as usize % ALPHABET.len()] as char);
        }
    }
    code
}

/// true when `code` could have been produced by [`generate`].
pub fn is_well_formed(code: &str) -> bool {
    !code.is_empty() && code.bytes().all(|b| b.is_ascii_alphanumeric())
}
