use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

pub const TOKEN_LEN: usize = 6;
pub const TOKEN_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

static VALIDATE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new("^[A-Z0-9]{6}$").unwrap());

/// Source of candidate survey tokens. Implementations never check uniqueness;
/// callers retry on collision.
pub trait TokenGenerator {
    fn generate(&mut self) -> String;
}

/// Uniform draws from [`TOKEN_ALPHABET`] using the thread-local RNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomTokens;

impl TokenGenerator for RandomTokens {
    fn generate(&mut self) -> String {
        generate()
    }
}

pub fn generate() -> String {
    let mut rng = rand::thread_rng();

    (0..TOKEN_LEN)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

/// Tokens are matched case-insensitively; this is the canonical form.
pub fn normalize(token: &str) -> String {
    token.trim().to_uppercase()
}

pub fn is_token(token: &str) -> bool {
    VALIDATE_TOKEN.is_match(token)
}
