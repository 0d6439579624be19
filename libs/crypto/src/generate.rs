use rand::distributions::Distribution;
use rand::{thread_rng, Rng};

/// Length of a server chosen password. Some getpass(3) implementations truncate
/// input at 8 characters, so a longer value could never be typed back in.
pub const GENERATED_PASSWORD_LEN: usize = 8;

/// Alphanumerics with the easily confused characters removed.
#[derive(Debug)]
pub struct DistinctAlpha;

impl Distribution<char> for DistinctAlpha {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> char {
        const RANGE: u32 = 55;
        const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ\
                abcdefghjkpqrstuvwxyz\
                0123456789";
        loop {
            let var = rng.next_u32() >> (32 - 6);
            if var < RANGE {
                return CHARSET[var as usize] as char;
            }
        }
    }
}

/// Generate a random password of [`GENERATED_PASSWORD_LEN`] characters.
pub fn generate_password() -> String {
    thread_rng()
        .sample_iter(&DistinctAlpha)
        .take(GENERATED_PASSWORD_LEN)
        .collect()
}
