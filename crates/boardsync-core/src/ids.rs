//! Provisional identifiers.
//!
//! Locally created projects and tasks get an id of the form
//! `temp-<epochMillis>-<6 base36 chars>` until the remote authority assigns
//! a real one. Any id with the `temp-` prefix is never sent to the remote
//! for update, delete, or move.

use std::cell::RefCell;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

pub const PROVISIONAL_PREFIX: &str = "temp-";

const SUFFIX_LEN: usize = 6;
const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// True when `id` has not yet been confirmed by the remote authority.
#[must_use]
pub fn is_provisional(id: &str) -> bool {
    id.starts_with(PROVISIONAL_PREFIX)
}

/// Generator for provisional ids and chat message ids.
#[derive(Debug)]
pub struct IdGenerator {
    rng: RefCell<StdRng>,
}

impl IdGenerator {
    #[must_use]
    pub fn from_entropy() -> Self {
        Self {
            rng: RefCell::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic generator for simulations and tests.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: RefCell::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// A fresh provisional id stamped with `now`.
    #[must_use]
    pub fn provisional(&self, now: DateTime<Utc>) -> String {
        let mut rng = self.rng.borrow_mut();
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| char::from(BASE36[rng.gen_range(0..BASE36.len())]))
            .collect();
        format!("{PROVISIONAL_PREFIX}{}-{suffix}", now.timestamp_millis())
    }

    /// A random (v4) message id.
    #[must_use]
    pub fn message_id(&self) -> Uuid {
        let bytes: [u8; 16] = self.rng.borrow_mut().r#gen();
        uuid::Builder::from_random_bytes(bytes).into_uuid()
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::from_entropy()
    }
}
