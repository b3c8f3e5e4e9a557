//! Random identifiers: room codes and AI player ids.

use std::time::{SystemTime, UNIX_EPOCH};

use partyline_protocol::{PlayerId, RoomCode};
use rand::Rng;

use crate::{RoomConfig, RoomError};

/// Characters room codes are drawn from. `0 O 1 I` are left out so a
/// code read aloud or off a screen can't be mistyped.
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Returns `true` if `code` has the given length and only uses
/// [`ROOM_CODE_ALPHABET`]. Lower case is not valid; normalize first.
pub fn is_valid_room_code(code: &str, length: usize) -> bool {
    code.len() == length && code.bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b))
}

/// Draws collision-free room codes.
#[derive(Debug, Clone)]
pub struct CodeGenerator {
    length: usize,
    max_attempts: u32,
}

impl CodeGenerator {
    pub fn new(length: usize, max_attempts: u32) -> Self {
        Self {
            length,
            max_attempts,
        }
    }

    pub fn from_config(config: &RoomConfig) -> Self {
        Self::new(config.code_length, config.max_code_attempts)
    }

    /// Draws codes until one is not taken.
    ///
    /// # Errors
    /// Returns [`RoomError::CodeSpaceExhausted`] after `max_attempts`
    /// collisions in a row.
    pub fn generate(&self, is_taken: impl Fn(&RoomCode) -> bool) -> Result<RoomCode, RoomError> {
        self.generate_with(&mut rand::rng(), is_taken)
    }

    /// Same as [`generate`](Self::generate) with a caller-supplied RNG.
    pub fn generate_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        is_taken: impl Fn(&RoomCode) -> bool,
    ) -> Result<RoomCode, RoomError> {
        for _ in 0..self.max_attempts {
            let code = self.random_code(rng);
            if !is_taken(&code) {
                return Ok(code);
            }
        }
        Err(RoomError::CodeSpaceExhausted {
            attempts: self.max_attempts,
        })
    }

    fn random_code<R: Rng + ?Sized>(&self, rng: &mut R) -> RoomCode {
        let code = (0..self.length)
            .map(|_| ROOM_CODE_ALPHABET[rng.random_range(0..ROOM_CODE_ALPHABET.len())] as char)
            .collect();
        RoomCode(code)
    }
}

/// A fresh AI player id of the form `ai-<unix millis>-<9 base36 chars>`.
pub fn ai_player_id<R: Rng + ?Sized>(rng: &mut R) -> PlayerId {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let suffix: String = (0..9)
        .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
        .collect();
    PlayerId(format!("ai-{millis}-{suffix}"))
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::HashSet;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_generated_code_uses_alphabet_and_length() {
        let generator = CodeGenerator::new(6, 10);
        for _ in 0..200 {
            let code = generator.generate(|_| false).unwrap();
            assert!(is_valid_room_code(code.as_str(), 6), "bad code {code}");
        }
    }

    #[test]
    fn test_alphabet_excludes_confusable_characters() {
        for c in [b'0', b'O', b'1', b'I'] {
            assert!(!ROOM_CODE_ALPHABET.contains(&c));
        }
        assert_eq!(ROOM_CODE_ALPHABET.len(), 32);
    }

    #[test]
    fn test_generate_retries_on_collision() {
        let mut rng = StdRng::seed_from_u64(7);
        let generator = CodeGenerator::new(6, 10);
        let calls = Cell::new(0);

        // First two draws "collide".
        let code = generator
            .generate_with(&mut rng, |_| {
                calls.set(calls.get() + 1);
                calls.get() <= 2
            })
            .unwrap();

        assert_eq!(calls.get(), 3);
        assert_eq!(code.as_str().len(), 6);
    }

    #[test]
    fn test_generate_fails_loudly_when_saturated() {
        let generator = CodeGenerator::new(6, 25);
        let err = generator.generate(|_| true).unwrap_err();
        assert!(matches!(err, RoomError::CodeSpaceExhausted { attempts: 25 }));
    }

    #[test]
    fn test_generate_avoids_existing_codes() {
        let mut rng = StdRng::seed_from_u64(42);
        // One-character codes: only 32 possibilities, so collisions are
        // guaranteed to be exercised.
        let generator = CodeGenerator::new(1, 10_000);
        let mut taken = HashSet::new();
        for _ in 0..ROOM_CODE_ALPHABET.len() {
            let code = generator
                .generate_with(&mut rng, |c| taken.contains(c))
                .unwrap();
            assert!(taken.insert(code));
        }
        assert!(generator.generate_with(&mut rng, |c| taken.contains(c)).is_err());
    }

    #[test]
    fn test_is_valid_room_code() {
        assert!(is_valid_room_code("ABC234", 6));
        assert!(!is_valid_room_code("abc234", 6));
        assert!(!is_valid_room_code("ABC23", 6));
        assert!(!is_valid_room_code("ABCO23", 6), "O is excluded");
    }

    #[test]
    fn test_ai_player_id_format() {
        let mut rng = StdRng::seed_from_u64(1);
        let id = ai_player_id(&mut rng);
        let parts: Vec<&str> = id.as_str().split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ai");
        assert!(parts[1].parse::<u128>().is_ok());
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2].bytes().all(|b| BASE36.contains(&b)));
    }
}
