use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Prefix shared by every generated voucher code
pub const CODE_PREFIX: &str = "LOKAL";

/// Characters used for the random part of a code. No `0 O 1 I` so codes
/// survive being read aloud or typed from a printed slip.
/// Exactly 32 symbols, so a byte maps onto it without modulo bias.
pub const CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of the random part of a code
pub const CODE_SUFFIX_LEN: usize = 6;

/// Why a voucher was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoucherReason {
    Gift,
    Birthday,
    Discount,
}

impl VoucherReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoucherReason::Gift => "gift",
            VoucherReason::Birthday => "birthday",
            VoucherReason::Discount => "discount",
        }
    }

    /// Short tag embedded in generated codes
    pub fn code_tag(&self) -> &'static str {
        match self {
            VoucherReason::Gift => "GIFT",
            VoucherReason::Birthday => "BDAY",
            VoucherReason::Discount => "DISC",
        }
    }

    /// Human-readable label used in notifications
    pub fn label(&self) -> &'static str {
        match self {
            VoucherReason::Gift => "gift voucher",
            VoucherReason::Birthday => "birthday voucher",
            VoucherReason::Discount => "discount voucher",
        }
    }
}

impl fmt::Display for VoucherReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown voucher reason '{0}'")]
pub struct UnknownReason(pub String);

impl FromStr for VoucherReason {
    type Err = UnknownReason;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gift" => Ok(VoucherReason::Gift),
            "birthday" => Ok(VoucherReason::Birthday),
            "discount" => Ok(VoucherReason::Discount),
            other => Err(UnknownReason(other.to_string())),
        }
    }
}

/// Display status derived from the stored fields at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoucherStatus {
    Active,
    Used,
    Expired,
}

/// Reason a voucher cannot be redeemed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RedeemRejection {
    #[error("voucher has already been redeemed")]
    AlreadyRedeemed,
    #[error("voucher has expired")]
    Expired,
}

/// A single-use reward code owned by one profile.
///
/// `used` moves from `false` to `true` exactly once and never back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voucher {
    pub code: String,
    pub user_id: Uuid,
    pub reason: VoucherReason,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub redeemed_by: Option<Uuid>,
}

impl Voucher {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now > exp)
    }

    /// Used wins over expired: a voucher redeemed before its expiry stays "used".
    pub fn status_at(&self, now: DateTime<Utc>) -> VoucherStatus {
        if self.used {
            VoucherStatus::Used
        } else if self.is_expired_at(now) {
            VoucherStatus::Expired
        } else {
            VoucherStatus::Active
        }
    }

    /// Check whether the voucher may transition to `used` at `now`.
    pub fn check_redeemable(&self, now: DateTime<Utc>) -> Result<(), RedeemRejection> {
        match self.status_at(now) {
            VoucherStatus::Active => Ok(()),
            VoucherStatus::Used => Err(RedeemRejection::AlreadyRedeemed),
            VoucherStatus::Expired => Err(RedeemRejection::Expired),
        }
    }
}

/// Normalize a scanned or typed code for lookup.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Build a code like `LOKAL-BDAY-7KQ2ZX` from random bytes.
pub fn code_from_bytes(reason: VoucherReason, bytes: &[u8; CODE_SUFFIX_LEN]) -> String {
    let suffix: String = bytes
        .iter()
        .map(|b| CODE_ALPHABET[(*b as usize) % CODE_ALPHABET.len()] as char)
        .collect();
    format!("{}-{}-{}", CODE_PREFIX, reason.code_tag(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn voucher(used: bool, expires_at: Option<DateTime<Utc>>) -> Voucher {
        Voucher {
            code: "LOKAL-GIFT-ABC234".to_string(),
            user_id: Uuid::new_v4(),
            reason: VoucherReason::Gift,
            description: None,
            created_at: Utc::now() - Duration::days(3),
            expires_at,
            used,
            used_at: None,
            redeemed_by: None,
        }
    }

    #[test]
    fn test_active_voucher_is_redeemable() {
        let now = Utc::now();
        let v = voucher(false, Some(now + Duration::days(1)));
        assert_eq!(v.status_at(now), VoucherStatus::Active);
        assert!(v.check_redeemable(now).is_ok());
    }

    #[test]
    fn test_no_expiry_is_redeemable() {
        let v = voucher(false, None);
        assert!(v.check_redeemable(Utc::now() + Duration::days(3650)).is_ok());
    }

    #[test]
    fn test_expired_voucher_rejected() {
        let now = Utc::now();
        let v = voucher(false, Some(now - Duration::days(1)));
        assert_eq!(v.check_redeemable(now), Err(RedeemRejection::Expired));
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let now = Utc::now();
        let v = voucher(false, Some(now));
        assert!(v.check_redeemable(now).is_ok());
        assert_eq!(
            v.check_redeemable(now + Duration::milliseconds(1)),
            Err(RedeemRejection::Expired)
        );
    }

    #[test]
    fn test_used_voucher_rejected_even_when_expired() {
        let now = Utc::now();
        let v = voucher(true, Some(now - Duration::days(1)));
        assert_eq!(v.status_at(now), VoucherStatus::Used);
        assert_eq!(
            v.check_redeemable(now),
            Err(RedeemRejection::AlreadyRedeemed)
        );
    }

    #[test]
    fn test_reason_round_trip_and_unknown() {
        for reason in [
            VoucherReason::Gift,
            VoucherReason::Birthday,
            VoucherReason::Discount,
        ] {
            assert_eq!(reason.as_str().parse::<VoucherReason>().unwrap(), reason);
        }
        assert_eq!(
            "freebie".parse::<VoucherReason>().unwrap_err(),
            UnknownReason("freebie".to_string())
        );
    }

    #[test]
    fn test_code_from_bytes_format() {
        let code = code_from_bytes(VoucherReason::Birthday, &[0, 1, 2, 31, 32, 255]);
        assert_eq!(code, "LOKAL-BDAY-ABC9A9");
    }

    #[test]
    fn test_code_alphabet_is_unambiguous() {
        for c in [b'0', b'O', b'1', b'I'] {
            assert!(!CODE_ALPHABET.contains(&c));
        }
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("  lokal-gift-xyz789\n"), "LOKAL-GIFT-XYZ789");
    }
}
