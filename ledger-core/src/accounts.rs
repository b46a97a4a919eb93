//! User registry with referral fields
//!
//! Registration resolves the optional referral code to the referrer's ID,
//! creates the user and an empty wallet, all inside one unit of work.

use crate::{
    storage::{cf, index, index_key},
    types::{User, UserId, Wallet},
    unit::UnitOfWork,
    Error, Result,
};
use chrono::{DateTime, Utc};
use rand::Rng;

/// Length of generated referral codes
pub const REFERRAL_CODE_LEN: usize = 8;

const REFERRAL_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const MAX_CODE_ATTEMPTS: usize = 32;

/// Normalize user-entered referral codes
pub fn normalize_referral_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

fn random_referral_code<R: Rng>(rng: &mut R) -> String {
    (0..REFERRAL_CODE_LEN)
        .map(|_| REFERRAL_ALPHABET[rng.gen_range(0..REFERRAL_ALPHABET.len())] as char)
        .collect()
}

/// Register a user and open their wallet
pub fn register_in(
    uow: &mut UnitOfWork<'_>,
    referral_code: Option<&str>,
    now: DateTime<Utc>,
) -> Result<User> {
    let referred_by = match referral_code {
        Some(code) => {
            let code = normalize_referral_code(code);
            let referrer: UserId = uow
                .get(cf::REFERRAL_CODES, code.as_bytes())?
                .ok_or(Error::UnknownReferralCode(code))?;
            Some(referrer)
        }
        None => None,
    };

    let mut rng = rand::thread_rng();
    let mut code = random_referral_code(&mut rng);
    let mut attempts = 1;
    while uow.contains(cf::REFERRAL_CODES, code.as_bytes())? {
        if attempts >= MAX_CODE_ATTEMPTS {
            return Err(Error::InvariantViolation(
                "Could not allocate a unique referral code".to_string(),
            ));
        }
        code = random_referral_code(&mut rng);
        attempts += 1;
    }

    let user = User {
        id: UserId::generate(),
        referral_code: code,
        referred_by,
        created_at: now,
    };

    uow.put(cf::USERS, user.id.as_bytes(), &user)?;
    uow.put(cf::REFERRAL_CODES, user.referral_code.as_bytes(), &user.id)?;
    uow.put(cf::WALLETS, user.id.as_bytes(), &Wallet::open(user.id, now))?;

    if let Some(referrer) = referred_by {
        uow.put_index(index_key(
            index::REFERRALS,
            &[referrer.as_bytes(), user.id.as_bytes()],
        ));
    }

    tracing::debug!(
        user_id = %user.id,
        referred_by = ?user.referred_by,
        "User staged"
    );

    Ok(user)
}

/// Load a user inside a unit of work
pub fn get_user_in(uow: &UnitOfWork<'_>, user_id: UserId) -> Result<User> {
    uow.get(cf::USERS, user_id.as_bytes())?
        .ok_or(Error::UserNotFound(user_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referral_code_shape() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let code = random_referral_code(&mut rng);
            assert_eq!(code.len(), REFERRAL_CODE_LEN);
            assert!(code.bytes().all(|b| REFERRAL_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_normalize_referral_code() {
        assert_eq!(normalize_referral_code("  ab12cd34 "), "AB12CD34");
    }
}
