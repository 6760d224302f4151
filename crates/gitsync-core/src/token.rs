const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of every generated token.
pub const TOKEN_LEN: usize = 32;

/// Generate a random base-36 marker used to tag a location inside document
/// text so it can be found again after a merge.
pub fn generate_token() -> String {
    let mut token = String::with_capacity(TOKEN_LEN);
    while token.len() < TOKEN_LEN {
        let mut n = uuid::Uuid::new_v4().as_u128();
        for _ in 0..16 {
            token.push(ALPHABET[(n % 36) as usize] as char);
            n /= 36;
        }
    }
    token.truncate(TOKEN_LEN);
    token
}
