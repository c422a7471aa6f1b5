use rand::Rng;

const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const LOWERCASE_ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Random lowercase letters and digits, valid inside any DNS-1123 name.
pub fn random_suffix(len: usize) -> String {
    random_from(LOWERCASE_ALPHANUMERIC, len)
}

/// Random lowercase letters only.
pub fn random_letters(len: usize) -> String {
    random_from(LOWERCASE, len)
}

fn random_from(charset: &[u8], len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| charset[rng.random_range(0..charset.len())] as char)
        .collect()
}
