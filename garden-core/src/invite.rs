//! Invite code generation (spec §8) — short, human-typeable codes that must
//! be globally unique among active gardens.

use rand::Rng;

const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LEN: usize = 6;

/// Draw a single candidate code. Excludes visually ambiguous characters
/// (0/O, 1/I/L) the way the teacher's group-registration invite tokens do.
pub fn generate_candidate() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Draw candidates until `is_taken` reports one as free, up to `max_attempts`.
/// Collisions are expected to be rare (32^6 space) so a handful of retries
/// is enough; exhausting the budget means the caller should widen the
/// alphabet or investigate a stuck generator rather than loop forever.
pub async fn generate_unique<F, Fut>(max_attempts: u32, mut is_taken: F) -> anyhow::Result<String>
where
    F: FnMut(String) -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<bool>>,
{
    for _ in 0..max_attempts {
        let candidate = generate_candidate();
        if !is_taken(candidate.clone()).await? {
            return Ok(candidate);
        }
    }
    anyhow::bail!("exhausted {max_attempts} attempts generating a unique invite code")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_use_only_unambiguous_alphabet() {
        for _ in 0..100 {
            let code = generate_candidate();
            assert_eq!(code.len(), CODE_LEN);
            assert!(code.chars().all(|c| ALPHABET.contains(&(c as u8))));
        }
    }

    #[tokio::test]
    async fn generate_unique_retries_past_collisions() {
        use std::cell::Cell;
        use std::rc::Rc;

        let seen = Rc::new(Cell::new(0));
        let code = generate_unique(10, |_candidate| {
            let seen = seen.clone();
            async move {
                seen.set(seen.get() + 1);
                Ok(seen.get() < 3)
            }
        })
        .await
        .unwrap();
        assert_eq!(code.len(), CODE_LEN);
        assert_eq!(seen.get(), 3);
    }

    #[tokio::test]
    async fn generate_unique_errors_when_exhausted() {
        let result = generate_unique(3, |_| async { Ok(true) }).await;
        assert!(result.is_err());
    }
}
