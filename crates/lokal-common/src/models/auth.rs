use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub exp: i64,
    pub iat: i64,
}

/// The authenticated caller of an operation.
///
/// Passed explicitly into every voucher operation. The role is not part of
/// the identity; it is looked up from the caller's profile on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
}

impl TryFrom<&Claims> for Identity {
    type Error = uuid::Error;

    fn try_from(claims: &Claims) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: claims.sub.parse()?,
            email: claims.email.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_from_claims() {
        let user_id = Uuid::new_v4();
        let claims = Claims {
            sub: user_id.to_string(),
            email: "barista@lokal.cafe".to_string(),
            exp: 0,
            iat: 0,
        };
        let identity = Identity::try_from(&claims).unwrap();
        assert_eq!(identity.user_id, user_id);
        assert_eq!(identity.email, "barista@lokal.cafe");
    }

    #[test]
    fn test_identity_from_claims_bad_subject() {
        let claims = Claims {
            sub: "not-a-uuid".to_string(),
            email: "x@y.z".to_string(),
            exp: 0,
            iat: 0,
        };
        assert!(Identity::try_from(&claims).is_err());
    }
}
